//! Refresh exchanges: the single network call a refresh round performs.
//!
//! Exchanges always run on a bare transport. They never go through the request decorator or
//! the dispatcher, so a failing refresh can never trigger another refresh.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	classify::{self, CodeClassifier, FailureClassifier, PayloadError},
	config::PipelineConfig,
	credential::TokenSecret,
	error::RefreshError,
	http::{ApiRequest, ApiResponse, Transport},
};

/// Boxed future returned by [`RefreshExchange::exchange`].
pub type ExchangeFuture<'a> =
	Pin<Box<dyn Future<Output = Result<RefreshedCredentials, RefreshError>> + 'a + Send>>;

/// Exchanges a refresh credential for a new access credential.
pub trait RefreshExchange: Send + Sync {
	/// Performs exactly one refresh call for `refresh`.
	fn exchange<'a>(&'a self, refresh: &'a TokenSecret) -> ExchangeFuture<'a>;
}

/// Credentials returned by a successful exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshedCredentials {
	/// New access credential.
	pub access: TokenSecret,
	/// Rotated refresh credential; `None` keeps the stored one.
	pub refresh: Option<TokenSecret>,
}

/// Refresh exchange for APIs that take `{"<field>": "<refresh>"}` as a JSON `POST` body.
///
/// The response must carry `accessToken` (or `access_token`) and may carry a rotated
/// `refreshToken` (or `refresh_token`), either at the top level or inside a `data` envelope.
pub struct JsonRefreshExchange<T>
where
	T: ?Sized + Transport,
{
	transport: Arc<T>,
	endpoint: Url,
	field: String,
	timeout: Option<StdDuration>,
	classifier: Arc<dyn FailureClassifier>,
}
impl<T> JsonRefreshExchange<T>
where
	T: ?Sized + Transport,
{
	/// Creates an exchange posting to `endpoint` with the default field name.
	pub fn new(transport: impl Into<Arc<T>>, endpoint: Url) -> Self {
		Self {
			transport: transport.into(),
			endpoint,
			field: PipelineConfig::DEFAULT_REFRESH_FIELD.into(),
			timeout: None,
			classifier: Arc::new(CodeClassifier::default()),
		}
	}

	/// Creates an exchange from the refresh settings of `config`.
	pub fn from_config(transport: impl Into<Arc<T>>, config: &PipelineConfig) -> Self {
		let mut exchange = Self::new(transport, config.refresh_endpoint.clone())
			.with_field(config.refresh_field.clone())
			.with_classifier(Arc::new(CodeClassifier::new(config.expired_code)));

		exchange.timeout = config.refresh_timeout;

		exchange
	}

	/// Overrides the JSON field carrying the refresh credential.
	pub fn with_field(mut self, field: impl Into<String>) -> Self {
		self.field = field.into();

		self
	}

	/// Sets a deadline for the refresh call.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Overrides the classifier used to describe rejected refresh responses.
	pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
		self.classifier = classifier;

		self
	}

	fn build_request(&self, refresh: &TokenSecret) -> Result<ApiRequest, RefreshError> {
		let mut body = serde_json::Map::new();

		body.insert(self.field.clone(), serde_json::Value::String(refresh.expose().to_owned()));

		let mut request = ApiRequest::post(self.endpoint.clone())
			.with_header("accept", "application/json")
			.with_json(&body)?;

		request.timeout = self.timeout;

		Ok(request)
	}

	fn interpret(&self, response: ApiResponse) -> Result<RefreshedCredentials, RefreshError> {
		let status = Some(response.status);

		if !response.is_success() {
			let classification = self.classifier.classify(&response);

			return Err(RefreshError::Rejected { status, reason: classification.to_string() });
		}

		let payload = parse_refresh_payload(&response.body)
			.map_err(|source| RefreshError::MalformedResponse { source, status })?;

		if payload.access.is_empty() {
			return Err(RefreshError::Rejected {
				status,
				reason: "response carried an empty access credential".into(),
			});
		}

		Ok(RefreshedCredentials {
			access: TokenSecret::new(payload.access),
			refresh: payload.refresh.filter(|value| !value.is_empty()).map(TokenSecret::new),
		})
	}
}
impl<T> RefreshExchange for JsonRefreshExchange<T>
where
	T: ?Sized + Transport,
{
	fn exchange<'a>(&'a self, refresh: &'a TokenSecret) -> ExchangeFuture<'a> {
		Box::pin(async move {
			let request = self.build_request(refresh)?;
			let response = self.transport.send(request).await?;

			self.interpret(response)
		})
	}
}
impl<T> Debug for JsonRefreshExchange<T>
where
	T: ?Sized + Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("JsonRefreshExchange")
			.field("endpoint", &self.endpoint.as_str())
			.field("field", &self.field)
			.field("timeout", &self.timeout)
			.finish()
	}
}

#[derive(Debug, Deserialize)]
struct RefreshPayload {
	#[serde(rename = "accessToken", alias = "access_token")]
	access: String,
	#[serde(default, rename = "refreshToken", alias = "refresh_token")]
	refresh: Option<String>,
}

fn parse_refresh_payload(body: &[u8]) -> Result<RefreshPayload, PayloadError> {
	let mut value: serde_json::Value = classify::parse_json_slice(body)?;

	// Unwrap `{"data": {...}}` envelopes.
	if let Some(data) = value.get_mut("data").filter(|data| data.is_object()) {
		value = data.take();
	}

	serde_path_to_error::deserialize(value)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn parses_bare_camel_case_payload() {
		let payload = parse_refresh_payload(br#"{"accessToken":"a2","refreshToken":"r2"}"#)
			.expect("Bare payload should parse.");

		assert_eq!(payload.access, "a2");
		assert_eq!(payload.refresh.as_deref(), Some("r2"));
	}

	#[test]
	fn parses_enveloped_snake_case_payload() {
		let payload = parse_refresh_payload(
			br#"{"code":0,"success":true,"data":{"access_token":"a2"}}"#,
		)
		.expect("Enveloped payload should parse.");

		assert_eq!(payload.access, "a2");
		assert!(payload.refresh.is_none());
	}

	#[test]
	fn reports_path_of_missing_access_credential() {
		let err = parse_refresh_payload(br#"{"data":{"refreshToken":"r2"}}"#)
			.expect_err("Payload without an access credential should fail.");

		assert!(err.to_string().contains("accessToken"));
	}

	#[test]
	fn rejects_non_json_body() {
		assert!(parse_refresh_payload(b"<html>bad gateway</html>").is_err());
	}

	#[test]
	fn rejects_trailing_bytes_after_payload() {
		let err = parse_refresh_payload(br#"{"accessToken":"a2"}{"accessToken":"a3"}"#)
			.expect_err("Concatenated payloads should fail.");

		assert!(err.to_string().contains("trailing"));
	}
}
