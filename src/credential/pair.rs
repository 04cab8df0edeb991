//! Access/refresh credential pair plus the session epoch that guards refresh writes.

// self
use crate::{_prelude::*, credential::TokenSecret};

/// Access and refresh credentials owned by a [`CredentialStore`](crate::store::CredentialStore).
///
/// Both halves are absent before the first sign-in and after a sign-out.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
	/// Short-lived credential attached to every request.
	pub access: Option<TokenSecret>,
	/// Longer-lived credential exchanged for a new access credential.
	pub refresh: Option<TokenSecret>,
}
impl CredentialPair {
	/// Creates a pair holding both credentials.
	pub fn new(access: impl Into<TokenSecret>, refresh: impl Into<TokenSecret>) -> Self {
		Self { access: Some(access.into()), refresh: Some(refresh.into()) }
	}

	/// Creates a pair that only carries an access credential.
	pub fn access_only(access: impl Into<TokenSecret>) -> Self {
		Self { access: Some(access.into()), refresh: None }
	}

	/// Returns true when neither credential is present.
	pub fn is_empty(&self) -> bool {
		self.access.is_none() && self.refresh.is_none()
	}
}

/// Monotonic tag identifying one authenticated session.
///
/// Sign-in and sign-out both advance the epoch; refresh rounds only write credentials back
/// when the store is still on the epoch they started from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionEpoch(u64);
impl SessionEpoch {
	/// Wraps a raw epoch value.
	pub const fn new(value: u64) -> Self {
		Self(value)
	}

	/// Returns the raw epoch value.
	pub const fn get(self) -> u64 {
		self.0
	}

	/// Returns the epoch that follows this one.
	pub const fn next(self) -> Self {
		Self(self.0.wrapping_add(1))
	}
}
impl Display for SessionEpoch {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "epoch-{}", self.0)
	}
}

/// Consistent view of a store: the pair and the epoch it belongs to, read atomically.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSnapshot {
	/// Stored credentials.
	pub pair: CredentialPair,
	/// Session the credentials belong to.
	pub epoch: SessionEpoch,
	/// Last time the pair was written, if ever.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub updated_at: Option<OffsetDateTime>,
}
