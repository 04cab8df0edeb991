//! Credential models: redacted secrets, the access/refresh pair, and session epochs.

pub mod pair;
pub mod secret;

pub use pair::*;
pub use secret::*;
