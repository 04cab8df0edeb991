//! Bearer-authenticated request pipeline for Rust services and clients.
//!
//! Every outbound request is decorated with the session's access credential. When responses
//! report an expired credential, concurrent callers are coalesced into a single refresh round,
//! and each of them replays its request exactly once with the new credential. A failed refresh
//! clears the session so the application can route back to sign-in.
//!
//! Start with [`dispatch::AuthClient`]; credentials live behind [`store::CredentialStore`], and
//! the refresh call itself is a pluggable [`refresh::RefreshExchange`].

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod classify;
pub mod config;
pub mod credential;
pub mod decorate;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod obs;
pub mod refresh;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		config::PipelineConfig,
		dispatch::{AuthClient, ReqwestAuthClient},
		http::ReqwestTransport,
		store::{CredentialStore, MemoryStore},
	};

	/// Builds a reqwest transport that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_transport() -> ReqwestTransport {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestTransport::with_client(client)
	}

	/// Constructs an [`AuthClient`] backed by an in-memory store and the reqwest transport used
	/// across integration tests.
	pub fn build_reqwest_test_client(
		config: PipelineConfig,
	) -> (ReqwestAuthClient, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn CredentialStore> = store_backend.clone();
		let client = AuthClient::with_transport(store, config, test_reqwest_transport())
			.expect("Failed to build AuthClient for tests.");

		(client, store_backend)
	}
}

mod _prelude {
	pub use std::{
		borrow::Cow,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::Result;
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
