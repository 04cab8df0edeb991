//! Validated construction of [`PipelineConfig`] values.

// std
use std::time::Duration as StdDuration;
// crates.io
use url::Host;
// self
use crate::{
	_prelude::*,
	classify::DEFAULT_EXPIRED_CODE,
	config::{AuthHeader, PipelineConfig},
};

/// Errors raised while constructing or validating a [`PipelineConfig`].
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum PipelineConfigError {
	/// Refresh endpoint must use HTTPS unless it points at a loopback host.
	#[error("The refresh endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Header names must be non-empty HTTP tokens.
	#[error("Authorization header name `{name}` is not a valid HTTP token.")]
	InvalidHeaderName {
		/// Invalid header name.
		name: String,
	},
	/// Schemes must be non-empty and contain no whitespace or control characters.
	#[error("Authorization scheme `{scheme}` is invalid.")]
	InvalidScheme {
		/// Invalid scheme.
		scheme: String,
	},
	/// The refresh request needs a field to carry the credential.
	#[error("Refresh field name must not be empty.")]
	EmptyRefreshField,
	/// A zero refresh timeout would fail every refresh.
	#[error("Refresh timeout must be greater than zero.")]
	ZeroRefreshTimeout,
}

/// Builder for [`PipelineConfig`] values.
#[derive(Debug)]
pub struct PipelineConfigBuilder {
	/// Endpoint that exchanges refresh credentials.
	pub refresh_endpoint: Url,
	/// JSON field carrying the refresh credential.
	pub refresh_field: String,
	/// Optional refresh deadline.
	pub refresh_timeout: Option<StdDuration>,
	/// Header used to attach the access credential.
	pub auth_header: AuthHeader,
	/// Reserved expiry code.
	pub expired_code: i64,
}
impl PipelineConfigBuilder {
	/// Creates a new builder seeded with the refresh endpoint and defaults.
	pub fn new(refresh_endpoint: Url) -> Self {
		Self {
			refresh_endpoint,
			refresh_field: PipelineConfig::DEFAULT_REFRESH_FIELD.into(),
			refresh_timeout: None,
			auth_header: AuthHeader::default(),
			expired_code: DEFAULT_EXPIRED_CODE,
		}
	}

	/// Overrides the JSON field carrying the refresh credential.
	pub fn refresh_field(mut self, field: impl Into<String>) -> Self {
		self.refresh_field = field.into();

		self
	}

	/// Sets a deadline for the refresh call.
	pub fn refresh_timeout(mut self, timeout: StdDuration) -> Self {
		self.refresh_timeout = Some(timeout);

		self
	}

	/// Overrides the authorization header.
	pub fn auth_header(mut self, header: AuthHeader) -> Self {
		self.auth_header = header;

		self
	}

	/// Overrides the reserved expiry code.
	pub fn expired_code(mut self, code: i64) -> Self {
		self.expired_code = code;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<PipelineConfig, PipelineConfigError> {
		let config = PipelineConfig {
			refresh_endpoint: self.refresh_endpoint,
			refresh_field: self.refresh_field,
			refresh_timeout: self.refresh_timeout,
			auth_header: self.auth_header,
			expired_code: self.expired_code,
		};

		config.validate()?;

		Ok(config)
	}
}

impl PipelineConfig {
	/// Validates invariants for the configuration.
	pub fn validate(&self) -> Result<(), PipelineConfigError> {
		validate_endpoint(&self.refresh_endpoint)?;
		validate_header_name(&self.auth_header.name)?;

		if let Some(scheme) = &self.auth_header.scheme {
			validate_scheme(scheme)?;
		}
		if self.refresh_field.trim().is_empty() {
			return Err(PipelineConfigError::EmptyRefreshField);
		}
		if self.refresh_timeout.is_some_and(|timeout| timeout.is_zero()) {
			return Err(PipelineConfigError::ZeroRefreshTimeout);
		}

		Ok(())
	}
}

fn validate_endpoint(url: &Url) -> Result<(), PipelineConfigError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(PipelineConfigError::InsecureEndpoint { url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(addr)) => addr.is_loopback(),
		Some(Host::Ipv6(addr)) => addr.is_loopback(),
		None => false,
	}
}

fn validate_header_name(name: &str) -> Result<(), PipelineConfigError> {
	// RFC 9110 `token` characters.
	let valid = !name.is_empty()
		&& name.bytes().all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));

	if valid {
		Ok(())
	} else {
		Err(PipelineConfigError::InvalidHeaderName { name: name.to_owned() })
	}
}

fn validate_scheme(scheme: &str) -> Result<(), PipelineConfigError> {
	if scheme.is_empty() || scheme.chars().any(|c| c.is_whitespace() || c.is_control()) {
		Err(PipelineConfigError::InvalidScheme { scheme: scheme.to_owned() })
	} else {
		Ok(())
	}
}
