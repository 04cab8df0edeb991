//! Pipeline configuration: refresh endpoint, authorization header shape, and the reserved
//! expiry code.
//!
//! [`PipelineConfig`] is plain data (`Serialize` + `Deserialize`) so applications can embed it
//! in their own configuration files; [`PipelineConfig::validate`] and the
//! [`PipelineConfigBuilder`] enforce the same invariants either way.

pub mod builder;

pub use builder::*;

// std
use std::time::Duration as StdDuration;
// self
use crate::{_prelude::*, classify::DEFAULT_EXPIRED_CODE};

/// Header used to carry the access credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthHeader {
	/// Header name, `Authorization` by default.
	pub name: String,
	/// Scheme prefix, `Bearer` by default; `None` sends the raw credential.
	pub scheme: Option<String>,
}
impl AuthHeader {
	/// Formats the header value for `token`.
	pub fn value_for(&self, token: &str) -> String {
		match &self.scheme {
			Some(scheme) => format!("{scheme} {token}"),
			None => token.to_owned(),
		}
	}
}
impl Default for AuthHeader {
	fn default() -> Self {
		Self { name: "Authorization".into(), scheme: Some("Bearer".into()) }
	}
}

/// Immutable pipeline configuration consumed by [`AuthClient`](crate::dispatch::AuthClient).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
	/// Endpoint that exchanges a refresh credential for a new access credential.
	pub refresh_endpoint: Url,
	/// JSON field carrying the refresh credential in the refresh request body.
	#[serde(default = "default_refresh_field")]
	pub refresh_field: String,
	/// Optional deadline for the refresh call.
	#[serde(default)]
	pub refresh_timeout: Option<StdDuration>,
	/// Header used to attach the access credential.
	#[serde(default)]
	pub auth_header: AuthHeader,
	/// Application code meaning "access credential invalid/expired".
	#[serde(default = "default_expired_code")]
	pub expired_code: i64,
}
impl PipelineConfig {
	/// Default JSON field carrying the refresh credential.
	pub const DEFAULT_REFRESH_FIELD: &'static str = "refreshToken";

	/// Creates a new builder for the provided refresh endpoint.
	pub fn builder(refresh_endpoint: Url) -> PipelineConfigBuilder {
		PipelineConfigBuilder::new(refresh_endpoint)
	}
}

fn default_refresh_field() -> String {
	PipelineConfig::DEFAULT_REFRESH_FIELD.into()
}

fn default_expired_code() -> i64 {
	DEFAULT_EXPIRED_CODE
}
