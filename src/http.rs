//! Transport primitives for authenticated requests.
//!
//! The module exposes the crate-owned request/response descriptors ([`ApiRequest`],
//! [`ApiResponse`]) and the [`Transport`] trait, the pipeline's only dependency on an HTTP
//! stack. The pipeline never inspects connection pools, TLS, or payload encodings; it only
//! decorates descriptors before handing them to a transport and classifies the responses it
//! gets back.

// std
use std::time::Duration as StdDuration;
// self
use crate::{_prelude::*, error::TransportError};

/// Boxed future returned by [`Transport::send`].
///
/// The future is `Send + Sync` so a transport can also back the OAuth 2.0 refresh exchange,
/// whose HTTP client contract requires both.
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send + Sync>>;

/// Abstraction over HTTP clients able to execute a single request.
///
/// Implementations must be `Send + Sync + 'static` so one transport can back both the
/// decorated request path and the bare refresh exchange. A transport must not retry, decorate,
/// or follow authentication challenges on its own; any HTTP status is a successful
/// [`ApiResponse`], and only failures to obtain a response are [`TransportError`]s.
pub trait Transport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and resolves with whatever the remote side answered.
	fn send(&self, request: ApiRequest) -> TransportFuture<'_>;
}

/// HTTP methods understood by the pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// `GET`
	#[default]
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
	/// `HEAD`
	Head,
}
impl Method {
	/// Returns the canonical method token.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
			Method::Head => "HEAD",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for Method {
	type Err = TransportError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_uppercase().as_str() {
			"GET" => Ok(Method::Get),
			"POST" => Ok(Method::Post),
			"PUT" => Ok(Method::Put),
			"PATCH" => Ok(Method::Patch),
			"DELETE" => Ok(Method::Delete),
			"HEAD" => Ok(Method::Head),
			other => Err(TransportError::InvalidRequest {
				message: format!("Unsupported HTTP method `{other}`"),
			}),
		}
	}
}

/// Outgoing request descriptor.
///
/// Header names are matched case-insensitively by the helpers below; insertion order is kept
/// for everything else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URL.
	pub url: Url,
	/// Header name/value pairs.
	pub headers: Vec<(String, String)>,
	/// Optional request body.
	pub body: Option<Vec<u8>>,
	/// Per-request deadline enforced by transports that support one.
	pub timeout: Option<StdDuration>,
}
impl ApiRequest {
	/// Creates a body-less request.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: Vec::new(), body: None, timeout: None }
	}

	/// Shorthand for a `GET` request.
	pub fn get(url: Url) -> Self {
		Self::new(Method::Get, url)
	}

	/// Shorthand for a `POST` request.
	pub fn post(url: Url) -> Self {
		Self::new(Method::Post, url)
	}

	/// Appends a header, keeping any existing value with the same name.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Sets a header, replacing every existing value with the same name.
	pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
		let name = name.into();

		self.remove_header(&name);
		self.headers.push((name, value.into()));
	}

	/// Removes every header named `name`.
	pub fn remove_header(&mut self, name: &str) {
		self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
	}

	/// Returns the first value of header `name`.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(existing, _)| existing.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}

	/// Sets a raw body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Serializes `payload` as the JSON body and sets `content-type: application/json`.
	pub fn with_json<T>(mut self, payload: &T) -> Result<Self, TransportError>
	where
		T: ?Sized + Serialize,
	{
		let body = serde_json::to_vec(payload).map_err(|e| TransportError::InvalidRequest {
			message: format!("Failed to encode JSON body: {e}"),
		})?;

		self.set_header("content-type", "application/json");
		self.body = Some(body);

		Ok(self)
	}

	/// Sets a per-request deadline.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = Some(timeout);

		self
	}
}

/// Response descriptor returned by a [`Transport`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Header name/value pairs; values that are not valid UTF-8 are dropped by transports.
	pub headers: Vec<(String, String)>,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Creates a response with the provided status and body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: Vec::new(), body: body.into() }
	}

	/// Returns true for `2xx` statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns the first value of header `name`.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(existing, _)| existing.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}

	/// Lossy UTF-8 view of the body.
	pub fn text(&self) -> Cow<'_, str> {
		String::from_utf8_lossy(&self.body)
	}
}

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the endpoint, if available.
	pub status: Option<u16>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Redirects are followed according to the wrapped client's policy; configure a custom client
/// with [`ReqwestTransport::with_client`] when the API must not be redirected.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	fn build(&self, request: ApiRequest) -> Result<reqwest::Request, ReqwestError> {
		let method = match request.method {
			Method::Get => reqwest::Method::GET,
			Method::Post => reqwest::Method::POST,
			Method::Put => reqwest::Method::PUT,
			Method::Patch => reqwest::Method::PATCH,
			Method::Delete => reqwest::Method::DELETE,
			Method::Head => reqwest::Method::HEAD,
		};
		let mut builder = self.0.request(method, request.url);

		for (name, value) in request.headers {
			builder = builder.header(name, value);
		}
		if let Some(body) = request.body {
			builder = builder.body(body);
		}
		if let Some(timeout) = request.timeout {
			builder = builder.timeout(timeout);
		}

		builder.build()
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Transport for ReqwestTransport {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		let client = self.0.clone();
		let request = self.build(request);

		Box::pin(async move {
			let response = client.execute(request?).await?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let body = response.bytes().await?.to_vec();

			Ok(ApiResponse { status, headers, body })
		})
	}
}
