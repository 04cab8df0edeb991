//! Failure classification for non-success responses.
//!
//! A classifier decides whether a failed response means "the access credential expired" (the
//! only failure the pipeline reacts to) or anything else, which is surfaced verbatim. The
//! classification is pure: it never touches the store, the transport, or the coordinator.

// crates.io
use serde::de::DeserializeOwned;
use serde_path_to_error::Track;
// self
use crate::{_prelude::*, http::ApiResponse};

/// JSON parse failure carrying the path of the first mismatch.
pub type PayloadError = serde_path_to_error::Error<serde_json::Error>;

/// Application code reserved by the remote service for an invalid/expired access credential.
pub const DEFAULT_EXPIRED_CODE: i64 = 4401;

/// Strategy hook that maps a failed response onto [`ClassifiedError`].
pub trait FailureClassifier: Send + Sync {
	/// Classifies a response whose status is outside `2xx`.
	fn classify(&self, response: &ApiResponse) -> ClassifiedError;
}

/// Meaningful failure kinds derived from a response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifiedError {
	/// The access credential is invalid or expired; a refresh may help.
	ExpiredAccessCredential {
		/// Message supplied by the remote service.
		message: String,
	},
	/// Any other failure; never retried.
	OtherFailure {
		/// Application code, or `None` when the body was not a structured failure payload.
		code: Option<i64>,
		/// Message supplied by the remote service, or the parse failure plus a body preview.
		message: String,
	},
}
impl ClassifiedError {
	/// Returns true for [`ClassifiedError::ExpiredAccessCredential`].
	pub fn is_expired(&self) -> bool {
		matches!(self, Self::ExpiredAccessCredential { .. })
	}

	/// Application code carried by the failure, when known.
	pub fn code(&self) -> Option<i64> {
		match self {
			Self::ExpiredAccessCredential { .. } => None,
			Self::OtherFailure { code, .. } => *code,
		}
	}

	/// Message carried by the failure.
	pub fn message(&self) -> &str {
		match self {
			Self::ExpiredAccessCredential { message } | Self::OtherFailure { message, .. } =>
				message,
		}
	}
}
impl Display for ClassifiedError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::ExpiredAccessCredential { message } =>
				write!(f, "access credential expired ({message})"),
			Self::OtherFailure { code: Some(code), message } => write!(f, "code {code} ({message})"),
			Self::OtherFailure { code: None, message } => write!(f, "unstructured failure ({message})"),
		}
	}
}

/// Structured failure payload produced by the remote service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePayload {
	/// Application-level code.
	pub code: i64,
	/// Success flag; failures normally carry `false`.
	#[serde(default)]
	pub success: bool,
	/// Human-readable message.
	#[serde(default)]
	pub message: String,
}
impl FailurePayload {
	/// Parses `body`, reporting the JSON path of the first mismatch on failure.
	pub fn parse(body: &[u8]) -> Result<Self, PayloadError> {
		parse_json_slice(body)
	}
}

/// Deserializes exactly one JSON value from `body`; trailing non-whitespace bytes are an error.
pub(crate) fn parse_json_slice<T>(body: &[u8]) -> Result<T, PayloadError>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);
	let value = serde_path_to_error::deserialize(&mut deserializer)?;

	deserializer.end().map_err(|e| serde_path_to_error::Error::new(Track::new().path(), e))?;

	Ok(value)
}

/// Default classifier keyed on a single reserved application code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodeClassifier {
	/// Code that means "access credential invalid/expired".
	pub expired_code: i64,
}
impl CodeClassifier {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a classifier for the provided reserved code.
	pub const fn new(expired_code: i64) -> Self {
		Self { expired_code }
	}
}
impl Default for CodeClassifier {
	fn default() -> Self {
		Self::new(DEFAULT_EXPIRED_CODE)
	}
}
impl FailureClassifier for CodeClassifier {
	fn classify(&self, response: &ApiResponse) -> ClassifiedError {
		match FailurePayload::parse(&response.body) {
			Ok(payload) if payload.code == self.expired_code =>
				ClassifiedError::ExpiredAccessCredential { message: payload.message },
			Ok(payload) =>
				ClassifiedError::OtherFailure { code: Some(payload.code), message: payload.message },
			Err(err) => ClassifiedError::OtherFailure {
				code: None,
				message: format!(
					"status {}: {err}; body: {}",
					response.status,
					truncate_preview(&response.text(), Self::BODY_PREVIEW_LIMIT)
				),
			},
		}
	}
}

fn truncate_preview(body: &str, limit: usize) -> String {
	if body.chars().count() <= limit {
		return body.to_owned();
	}

	let mut buf = body.chars().take(limit).collect::<String>();

	buf.push('…');

	buf
}
