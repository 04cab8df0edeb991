//! Standard OAuth 2.0 `refresh_token` grant as a [`RefreshExchange`].

pub use oauth2;

// crates.io
use oauth2::{
	AsyncHttpClient, AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, HttpRequest, HttpResponse, RefreshToken, RequestTokenError, Scope,
	TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError},
	http::{HeaderName, HeaderValue, StatusCode},
};
// self
use crate::{
	_prelude::*,
	credential::TokenSecret,
	error::{ConfigError, RefreshError, TransportError},
	http::{ApiRequest, Method, ResponseMetadata, ResponseMetadataSlot, Transport},
	refresh::{ExchangeFuture, RefreshExchange, RefreshedCredentials},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// How the client authenticates against the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	/// HTTP Basic authentication with the client secret.
	#[default]
	ClientSecretBasic,
	/// Client credentials in the form body.
	ClientSecretPost,
	/// Public client; only `client_id` is sent.
	Public,
}

/// Refreshes through an OAuth 2.0 token endpoint using the `refresh_token` grant.
pub struct OAuth2RefreshExchange<T>
where
	T: ?Sized + Transport,
{
	oauth_client: ConfiguredBasicClient,
	transport: Arc<T>,
	scopes: Vec<String>,
}
impl<T> OAuth2RefreshExchange<T>
where
	T: ?Sized + Transport,
{
	/// Builds an exchange for `token_endpoint`.
	///
	/// `client_secret` is ignored for [`ClientAuthMethod::Public`].
	pub fn new(
		token_endpoint: &Url,
		client_id: &str,
		client_secret: Option<&str>,
		method: ClientAuthMethod,
		transport: impl Into<Arc<T>>,
	) -> Result<Self, ConfigError> {
		let token_url = TokenUrl::new(token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidTokenEndpoint { source })?;
		let mut oauth_client =
			BasicClient::new(ClientId::new(client_id.to_owned())).set_token_uri(token_url);

		let secret = if matches!(method, ClientAuthMethod::Public) { None } else { client_secret };

		if let Some(secret) = secret {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.to_owned()));
		}
		if !matches!(method, ClientAuthMethod::ClientSecretBasic) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client, transport: transport.into(), scopes: Vec::new() })
	}

	/// Requests `scopes` on every refresh.
	pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}
}
impl<T> RefreshExchange for OAuth2RefreshExchange<T>
where
	T: ?Sized + Transport,
{
	fn exchange<'a>(&'a self, refresh: &'a TokenSecret) -> ExchangeFuture<'a> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let handle =
				TransportHandle { transport: Arc::clone(&self.transport), slot: meta.clone() };
			let refresh_secret = RefreshToken::new(refresh.expose().to_owned());
			let mut request = self.oauth_client.exchange_refresh_token(&refresh_secret);

			for scope in &self.scopes {
				request = request.add_scope(Scope::new(scope.clone()));
			}

			let response = request
				.request_async(&handle)
				.await
				.map_err(|err| map_request_error(meta.take(), err))?;

			Ok(RefreshedCredentials {
				access: TokenSecret::new(response.access_token().secret().to_owned()),
				refresh: response
					.refresh_token()
					.map(|token| TokenSecret::new(token.secret().to_owned())),
			})
		})
	}
}
impl<T> Debug for OAuth2RefreshExchange<T>
where
	T: ?Sized + Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuth2RefreshExchange")
			.field("client_id", self.oauth_client.client_id())
			.field("scopes", &self.scopes)
			.finish()
	}
}

/// Adapts a [`Transport`] to the `oauth2` HTTP client contract, recording response metadata.
struct TransportHandle<T>
where
	T: ?Sized + Transport,
{
	transport: Arc<T>,
	slot: ResponseMetadataSlot,
}
impl<'c, T> AsyncHttpClient<'c> for TransportHandle<T>
where
	T: ?Sized + Transport,
{
	type Error = HttpClientError<TransportError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.slot.take();

			let request = api_request_from(request)?;
			let response = self.transport.send(request).await.map_err(Box::new)?;

			self.slot.store(ResponseMetadata { status: Some(response.status) });

			let status = StatusCode::from_u16(response.status).map_err(|e| {
				HttpClientError::Other(format!("Invalid HTTP status {}: {e}", response.status))
			})?;
			let mut http_response = HttpResponse::new(response.body);

			*http_response.status_mut() = status;

			for (name, value) in response.headers {
				if let (Ok(name), Ok(value)) =
					(HeaderName::try_from(name), HeaderValue::try_from(value))
				{
					http_response.headers_mut().append(name, value);
				}
			}

			Ok(http_response)
		})
	}
}

fn api_request_from(request: HttpRequest) -> Result<ApiRequest, HttpClientError<TransportError>> {
	let (parts, body) = request.into_parts();
	let method = parts.method.as_str().parse::<Method>().map_err(Box::new)?;
	let url = Url::parse(&parts.uri.to_string())
		.map_err(|e| HttpClientError::Other(format!("Invalid token endpoint URI: {e}")))?;
	let headers = parts
		.headers
		.iter()
		.filter_map(|(name, value)| {
			value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
		})
		.collect();

	Ok(ApiRequest { method, url, headers, body: (!body.is_empty()).then_some(body), timeout: None })
}

fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<TransportError>>,
) -> RefreshError {
	let status = meta.and_then(|value| value.status);

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(status, response),
		RequestTokenError::Request(error) => map_transport_error(error),
		RequestTokenError::Parse(source, _body) => RefreshError::MalformedResponse { source, status },
		RequestTokenError::Other(message) => RefreshError::Rejected {
			status,
			reason: format!("Token endpoint returned an unexpected response: {message}"),
		},
	}
}

fn map_server_response_error(status: Option<u16>, response: BasicErrorResponse) -> RefreshError {
	let reason = match response.error_description() {
		Some(description) => format!("{}: {description}", response.error().as_ref()),
		None => response.error().as_ref().to_owned(),
	};

	RefreshError::Rejected { status, reason }
}

fn map_transport_error(err: HttpClientError<TransportError>) -> RefreshError {
	match err {
		HttpClientError::Reqwest(inner) => RefreshError::Transport(*inner),
		HttpClientError::Http(inner) =>
			TransportError::InvalidRequest { message: inner.to_string() }.into(),
		HttpClientError::Io(inner) => TransportError::Io(inner).into(),
		HttpClientError::Other(message) => TransportError::InvalidRequest { message }.into(),
		_ => TransportError::InvalidRequest {
			message: "HTTP client error occurred while calling the token endpoint".into(),
		}
		.into(),
	}
}
