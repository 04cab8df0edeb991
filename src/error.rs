//! Pipeline-level error types shared across dispatch, refresh, and stores.

// self
use crate::{_prelude::*, classify::ClassifiedError, config::PipelineConfigError, http::ApiResponse};

/// Pipeline-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Terminal error returned by [`AuthClient::send`](crate::dispatch::AuthClient::send) and the
/// other public entry points.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeouts); never retried by the pipeline.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The remote service answered with a non-success status.
	#[error(transparent)]
	Rejected(#[from] ApiFailure),
}
impl Error {
	/// Returns the rejection when the remote service answered with a failure.
	pub fn as_rejection(&self) -> Option<&ApiFailure> {
		match self {
			Self::Rejected(failure) => Some(failure),
			_ => None,
		}
	}

	/// Returns true when the request failed with an expired-credential classification.
	///
	/// That holds both when no refresh was possible (the store is then cleared) and when the
	/// single replay after a successful refresh expired again (the refreshed pair stays stored).
	/// Check [`AuthClient::credentials`](crate::dispatch::AuthClient::credentials) to tell the two
	/// apart before routing the user back to sign-in.
	pub fn requires_sign_in(&self) -> bool {
		self.as_rejection().is_some_and(ApiFailure::is_expired)
	}
}

/// Failed response surfaced to the caller unchanged, together with its classification.
#[derive(Clone, Debug, ThisError)]
#[error("Remote service rejected the request with status {}: {classification}.", .response.status)]
pub struct ApiFailure {
	/// Response exactly as the transport returned it.
	pub response: ApiResponse,
	/// Classification computed for the response.
	pub classification: ClassifiedError,
}
impl ApiFailure {
	/// Pairs a response with its classification.
	pub fn new(response: ApiResponse, classification: ClassifiedError) -> Self {
		Self { response, classification }
	}

	/// Returns true when the failure was an expired access credential.
	pub fn is_expired(&self) -> bool {
		self.classification.is_expired()
	}
}

/// Configuration and construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Pipeline configuration failed validation.
	#[error(transparent)]
	Invalid(#[from] PipelineConfigError),
	/// OAuth 2.0 token endpoint URL is invalid.
	#[error("Token endpoint URL is invalid.")]
	InvalidTokenEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
}

/// Transport-level failures (network, IO, request construction).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The transport gave up waiting for a response.
	#[error("Request timed out.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// The request descriptor could not be turned into a wire request.
	#[error("Request could not be built: {message}.")]
	InvalidRequest {
		/// Human-readable reason.
		message: String,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_builder() {
			Self::InvalidRequest { message: e.to_string() }
		} else if e.is_timeout() {
			Self::Timeout { source: Box::new(e) }
		} else {
			Self::network(e)
		}
	}
}

/// Why a refresh round could not produce new credentials.
///
/// Refresh errors never reach request callers directly; the round resolves every waiter with
/// [`RetryDecision::DoNotRetry`](crate::refresh::RetryDecision::DoNotRetry) and the error is
/// recorded by the coordinator.
#[derive(Debug, ThisError)]
pub enum RefreshError {
	/// The store holds no refresh credential.
	#[error("No refresh credential is stored.")]
	MissingRefreshToken,
	/// The refresh call failed before a response arrived.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The refresh endpoint rejected the refresh credential.
	#[error("Refresh endpoint rejected the refresh credential: {reason}.")]
	Rejected {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Provider- or pipeline-supplied reason string.
		reason: String,
	},
	/// The refresh endpoint answered with a body that could not be parsed.
	#[error("Refresh endpoint returned a malformed response.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Credentials could not be read or written.
	#[error(transparent)]
	Storage(#[from] crate::store::StoreError),
}
impl RefreshError {
	/// HTTP status of the refresh response, when one was received.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. } | Self::MalformedResponse { status, .. } => *status,
			_ => None,
		}
	}
}
