//! Authenticated request dispatch with one transparent retry after a coalesced refresh.

// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;
use crate::{
	_prelude::*,
	classify::{CodeClassifier, FailureClassifier},
	config::PipelineConfig,
	credential::{CredentialPair, CredentialSnapshot, SessionEpoch},
	decorate::{BearerDecorator, RequestDecorator},
	error::{ApiFailure, ConfigError},
	http::{ApiRequest, ApiResponse, Transport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	refresh::{
		JsonRefreshExchange, RefreshCoordinator, RefreshExchange, RefreshMetrics, RetryDecision,
	},
	store::CredentialStore,
};

/// [`AuthClient`] backed by the default reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestAuthClient = AuthClient<ReqwestTransport>;

/// Entry point for authenticated requests against one session.
///
/// Every request is decorated with the stored access credential. A failure classified as an
/// expired access credential joins the session's refresh round and, if the round succeeds, is
/// replayed exactly once with the new credential. Any other failure, transport errors included,
/// is returned untouched.
///
/// Clones share the store, the transport, and the refresh coordinator, so all clones belong to
/// the same session.
pub struct AuthClient<T>
where
	T: ?Sized + Transport,
{
	/// Transport used for both application requests and the default refresh exchange.
	pub transport: Arc<T>,
	/// Store holding the session credentials.
	pub store: Arc<dyn CredentialStore>,
	/// Validated pipeline configuration.
	pub config: PipelineConfig,
	decorator: Arc<dyn RequestDecorator>,
	classifier: Arc<dyn FailureClassifier>,
	coordinator: Arc<RefreshCoordinator>,
}
impl<T> AuthClient<T>
where
	T: ?Sized + Transport,
{
	/// Creates a client that sends through the caller-provided transport.
	///
	/// The configuration is validated; the default refresh exchange posts to
	/// [`PipelineConfig::refresh_endpoint`] through the same transport, undecorated.
	pub fn with_transport(
		store: Arc<dyn CredentialStore>,
		config: PipelineConfig,
		transport: impl Into<Arc<T>>,
	) -> Result<Self> {
		config.validate().map_err(ConfigError::from)?;

		let transport = transport.into();
		let exchange =
			Arc::new(<JsonRefreshExchange<T>>::from_config(Arc::clone(&transport), &config));
		let coordinator = Arc::new(RefreshCoordinator::new(Arc::clone(&store), exchange));

		Ok(Self {
			transport,
			store,
			decorator: Arc::new(BearerDecorator::new(config.auth_header.clone())),
			classifier: Arc::new(CodeClassifier::new(config.expired_code)),
			coordinator,
			config,
		})
	}

	/// Replaces the request decorator.
	pub fn with_decorator(mut self, decorator: Arc<dyn RequestDecorator>) -> Self {
		self.decorator = decorator;

		self
	}

	/// Replaces the failure classifier used on application responses.
	pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
		self.classifier = classifier;

		self
	}

	/// Replaces the refresh exchange, starting from a fresh coordinator.
	pub fn with_refresh_exchange(mut self, exchange: Arc<dyn RefreshExchange>) -> Self {
		self.coordinator = Arc::new(RefreshCoordinator::new(Arc::clone(&self.store), exchange));

		self
	}

	/// Coordinator shared by every clone of this client.
	pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
		&self.coordinator
	}

	/// Counters describing the session's refresh rounds.
	pub fn refresh_metrics(&self) -> &Arc<RefreshMetrics> {
		self.coordinator.metrics()
	}

	/// Returns the stored credentials and their session epoch.
	pub async fn credentials(&self) -> Result<CredentialSnapshot> {
		Ok(self.store.load().await?)
	}

	/// Installs a pair issued by an external sign-in and starts a new session epoch.
	///
	/// Waiters of a round started by the previous session resolve without a retry.
	pub async fn sign_in(&self, pair: CredentialPair) -> Result<SessionEpoch> {
		let epoch = self.store.replace(pair).await?;

		self.coordinator.invalidate();

		Ok(epoch)
	}

	/// Clears both credentials and releases every caller waiting on a refresh.
	///
	/// A refresh that completes afterwards cannot write its result back.
	pub async fn sign_out(&self) -> Result<SessionEpoch> {
		let cleared = self.store.clear().await;

		self.coordinator.invalidate();

		Ok(cleared?)
	}

	/// Sends `request` with the current access credential attached.
	///
	/// Returns the first successful response, or
	/// [`Error::Rejected`](crate::error::Error::Rejected) carrying the response the caller should
	/// act on: the original failure when no retry happened, otherwise the replay's failure.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		let span = FlowSpan::new(FlowKind::Request, "send");

		span.instrument(async move {
			obs::record_flow_outcome(FlowKind::Request, FlowOutcome::Attempt);

			let result = self.dispatch(request).await;

			match &result {
				Ok(_) => obs::record_flow_outcome(FlowKind::Request, FlowOutcome::Success),
				Err(_) => obs::record_flow_outcome(FlowKind::Request, FlowOutcome::Failure),
			}

			result
		})
		.await
	}

	async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse> {
		let response = self.send_decorated(request.clone()).await?;

		if response.is_success() {
			return Ok(response);
		}

		let classification = self.classifier.classify(&response);

		if !classification.is_expired() {
			return Err(ApiFailure::new(response, classification).into());
		}

		match self.coordinator.request_retry_decision().await {
			RetryDecision::Retry => {
				let replay = self.send_decorated(request).await?;

				if replay.is_success() {
					return Ok(replay);
				}

				// The replay is terminal; classification is informational only.
				let classification = self.classifier.classify(&replay);

				Err(ApiFailure::new(replay, classification).into())
			},
			RetryDecision::DoNotRetry => Err(ApiFailure::new(response, classification).into()),
		}
	}

	async fn send_decorated(&self, request: ApiRequest) -> Result<ApiResponse> {
		let access = self.store.access().await?;
		let request = self.decorator.decorate(request, access.as_ref());

		Ok(self.transport.send(request).await?)
	}
}
#[cfg(feature = "reqwest")]
impl AuthClient<ReqwestTransport> {
	/// Creates a client backed by a default reqwest transport.
	pub fn new(store: Arc<dyn CredentialStore>, config: PipelineConfig) -> Result<Self> {
		Self::with_transport(store, config, ReqwestTransport::default())
	}
}
impl<T> Clone for AuthClient<T>
where
	T: ?Sized + Transport,
{
	fn clone(&self) -> Self {
		Self {
			transport: Arc::clone(&self.transport),
			store: Arc::clone(&self.store),
			config: self.config.clone(),
			decorator: Arc::clone(&self.decorator),
			classifier: Arc::clone(&self.classifier),
			coordinator: Arc::clone(&self.coordinator),
		}
	}
}
impl<T> Debug for AuthClient<T>
where
	T: ?Sized + Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthClient")
			.field("refresh_endpoint", &self.config.refresh_endpoint.as_str())
			.field("auth_header", &self.config.auth_header.name)
			.field("coordinator", &self.coordinator)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		error::{Error, TransportError},
		http::TransportFuture,
		store::MemoryStore,
	};

	#[derive(Default)]
	struct Recorder(Mutex<Vec<ApiRequest>>);
	impl Transport for Recorder {
		fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
			self.0.lock().push(request);

			Box::pin(async { Ok(ApiResponse::new(200, b"{}".to_vec())) })
		}
	}

	struct Offline;
	impl Transport for Offline {
		fn send(&self, _request: ApiRequest) -> TransportFuture<'_> {
			Box::pin(async { Err(TransportError::InvalidRequest { message: "offline".into() }) })
		}
	}

	fn config() -> PipelineConfig {
		PipelineConfig::builder(
			Url::parse("https://api.example.com/auth/refresh").expect("Fixture URL should parse."),
		)
		.build()
		.expect("Fixture config should validate.")
	}

	fn request() -> ApiRequest {
		ApiRequest::get(Url::parse("https://api.example.com/me").expect("Fixture URL should parse."))
	}

	#[test]
	fn rejects_invalid_configuration() {
		let mut config = config();

		config.refresh_endpoint =
			Url::parse("http://api.example.com/auth/refresh").expect("Fixture URL should parse.");

		let result = <AuthClient<Recorder>>::with_transport(
			Arc::new(MemoryStore::default()),
			config,
			Recorder::default(),
		);

		assert!(matches!(result, Err(Error::Config(ConfigError::Invalid(_)))));
	}

	#[tokio::test]
	async fn attaches_stored_access_credential() {
		let store = Arc::new(MemoryStore::with_pair(CredentialPair::new("access-1", "refresh-1")));
		let client = <AuthClient<Recorder>>::with_transport(store, config(), Recorder::default())
			.expect("Client should build.");
		let response = client.send(request()).await.expect("Request should succeed.");
		let sent = client.transport.0.lock();

		assert_eq!(response.status, 200);
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0].header("authorization"), Some("Bearer access-1"));
	}

	#[tokio::test]
	async fn sends_undecorated_without_credentials() {
		let client = <AuthClient<Recorder>>::with_transport(
			Arc::new(MemoryStore::default()),
			config(),
			Recorder::default(),
		)
		.expect("Client should build.");

		client.send(request()).await.expect("Request should succeed.");

		assert!(client.transport.0.lock()[0].header("authorization").is_none());
	}

	#[tokio::test]
	async fn transport_errors_skip_refresh() {
		let store = Arc::new(MemoryStore::with_pair(CredentialPair::new("access-1", "refresh-1")));
		let client = <AuthClient<Offline>>::with_transport(store, config(), Offline)
			.expect("Client should build.");
		let err = client.send(request()).await.expect_err("Offline transport should fail.");

		assert!(matches!(err, Error::Transport(_)));
		assert_eq!(client.refresh_metrics().rounds(), 0);
	}

	#[tokio::test]
	async fn sign_out_clears_and_advances_epoch() {
		let store = Arc::new(MemoryStore::default());
		let client =
			<AuthClient<Recorder>>::with_transport(store.clone(), config(), Recorder::default())
				.expect("Client should build.");
		let signed_in = client
			.sign_in(CredentialPair::new("access-1", "refresh-1"))
			.await
			.expect("Sign-in should succeed.");
		let signed_out = client.sign_out().await.expect("Sign-out should succeed.");

		assert!(signed_out > signed_in);
		assert!(store.snapshot().pair.is_empty());
	}

	#[test]
	fn debug_output_never_contains_secrets() {
		let store = Arc::new(MemoryStore::with_pair(CredentialPair::new("access-1", "refresh-1")));
		let client = <AuthClient<Recorder>>::with_transport(store, config(), Recorder::default())
			.expect("Client should build.");
		let rendered = format!("{client:?}");

		assert!(rendered.contains("api.example.com"));
		assert!(!rendered.contains("access-1"));
	}
}
