#![cfg(feature = "reqwest")]

// std
use std::time::Duration as StdDuration;
// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use bearer_pipeline::{
	_preludet::*,
	classify::ClassifiedError,
	config::{AuthHeader, PipelineConfig},
	credential::{CredentialPair, TokenSecret},
	http::ApiRequest,
	store::{CredentialStore, MemoryStore},
};

const EXPIRED: &str = r#"{"code":4401,"success":false,"message":"access token expired"}"#;

fn config(server: &MockServer) -> PipelineConfig {
	PipelineConfig::builder(
		Url::parse(&server.url("/auth/refresh")).expect("Mock refresh endpoint should parse."),
	)
	.build()
	.expect("Pipeline config should validate for the mock server.")
}

fn profile_request(server: &MockServer) -> ApiRequest {
	ApiRequest::get(Url::parse(&server.url("/api/me")).expect("Mock API endpoint should parse."))
}

async fn seed(store: &MemoryStore, access: &str, refresh: Option<&str>) {
	let pair = match refresh {
		Some(refresh) => CredentialPair::new(access, refresh),
		None => CredentialPair::access_only(access),
	};

	store.replace(pair).await.expect("Seeding the memory store should succeed.");
}

fn stored(store: &MemoryStore) -> (Option<String>, Option<String>) {
	let pair = store.snapshot().pair;

	(
		pair.access.as_ref().map(TokenSecret::expose).map(str::to_owned),
		pair.refresh.as_ref().map(TokenSecret::expose).map(str::to_owned),
	)
}

#[tokio::test]
async fn attaches_bearer_header_to_successful_requests() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client(config(&server));

	seed(&store, "access-A", Some("refresh-R")).await;

	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/me").header("authorization", "Bearer access-A");
			then.status(200).header("content-type", "application/json").body(r#"{"id":1}"#);
		})
		.await;
	let response =
		client.send(profile_request(&server)).await.expect("Decorated request should succeed.");

	assert_eq!(response.status, 200);
	assert_eq!(response.text(), r#"{"id":1}"#);

	api.assert_calls_async(1).await;
}

#[tokio::test]
async fn non_expiry_failure_is_returned_without_refresh() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client(config(&server));

	seed(&store, "access-A", Some("refresh-R")).await;

	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/me");
			then.status(422)
				.header("content-type", "application/json")
				.body(r#"{"code":4400,"success":false,"message":"invalid field"}"#);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200).body(r#"{"accessToken":"never"}"#);
		})
		.await;
	let err = client
		.send(profile_request(&server))
		.await
		.expect_err("Application failures should surface to the caller.");
	let failure = err.as_rejection().expect("Failure should carry the original response.");

	assert_eq!(failure.response.status, 422);
	assert_eq!(
		failure.classification,
		ClassifiedError::OtherFailure { code: Some(4400), message: "invalid field".into() }
	);
	assert_eq!(client.refresh_metrics().rounds(), 0);
	assert_eq!(stored(&store).0.as_deref(), Some("access-A"));

	api.assert_calls_async(1).await;
	refresh.assert_calls_async(0).await;
}

#[tokio::test]
async fn expiry_refreshes_then_replays_once() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client(config(&server));

	seed(&store, "old-A", Some("old-R")).await;

	let stale = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/me").header("authorization", "Bearer old-A");
			then.status(401).header("content-type", "application/json").body(EXPIRED);
		})
		.await;
	let fresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/me").header("authorization", "Bearer new-A");
			then.status(200).body(r#"{"id":1}"#);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/auth/refresh")
				.header("content-type", "application/json")
				.json_body(json!({ "refreshToken": "old-R" }));
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"code":0,"data":{"accessToken":"new-A","refreshToken":"new-R"}}"#);
		})
		.await;
	let response =
		client.send(profile_request(&server)).await.expect("Replayed request should succeed.");

	assert_eq!(response.status, 200);
	assert_eq!(stored(&store), (Some("new-A".into()), Some("new-R".into())));
	assert_eq!(client.refresh_metrics().successes(), 1);

	stale.assert_calls_async(1).await;
	fresh.assert_calls_async(1).await;
	refresh.assert_calls_async(1).await;
}

#[tokio::test]
async fn second_expiry_after_replay_is_terminal() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client(config(&server));

	seed(&store, "old-A", Some("old-R")).await;

	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/me");
			then.status(401).header("content-type", "application/json").body(EXPIRED);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200).body(r#"{"accessToken":"new-A"}"#);
		})
		.await;
	let err = client
		.send(profile_request(&server))
		.await
		.expect_err("A second expiry must not trigger another refresh.");

	assert!(err.requires_sign_in());
	// Replay failed, but the refreshed pair stays in place.
	assert_eq!(stored(&store), (Some("new-A".into()), Some("old-R".into())));

	api.assert_calls_async(2).await;
	refresh.assert_calls_async(1).await;
}

#[tokio::test]
async fn refresh_rejection_clears_credentials() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client(config(&server));

	seed(&store, "old-A", Some("revoked-R")).await;

	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/me");
			then.status(401).header("content-type", "application/json").body(EXPIRED);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(401)
				.header("content-type", "application/json")
				.body(r#"{"code":4403,"success":false,"message":"refresh token revoked"}"#);
		})
		.await;
	let err = client
		.send(profile_request(&server))
		.await
		.expect_err("A failed refresh should surface the original failure.");
	let failure = err.as_rejection().expect("Failure should carry the original response.");

	assert_eq!(failure.response.status, 401);
	assert!(failure.is_expired());
	assert_eq!(stored(&store), (None, None));
	assert_eq!(client.refresh_metrics().failures(), 1);

	api.assert_calls_async(1).await;
	refresh.assert_calls_async(1).await;
}

#[tokio::test]
async fn malformed_refresh_response_clears_credentials() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client(config(&server));

	seed(&store, "old-A", Some("old-R")).await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/me");
			then.status(401).body(EXPIRED);
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200).body(r#"{"data":{"token":"missing-field"}}"#);
		})
		.await;

	let err = client.send(profile_request(&server)).await.expect_err("Refresh should fail.");

	assert!(err.requires_sign_in());
	assert_eq!(stored(&store), (None, None));
}

#[tokio::test]
async fn concurrent_expiries_share_one_refresh() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client(config(&server));

	seed(&store, "old-A", Some("old-R")).await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/me").header("authorization", "Bearer old-A");
			then.status(401).header("content-type", "application/json").body(EXPIRED);
		})
		.await;

	let fresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/me").header("authorization", "Bearer new-A");
			then.status(200).body(r#"{"id":1}"#);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200)
				.delay(StdDuration::from_millis(300))
				.header("content-type", "application/json")
				.body(r#"{"accessToken":"new-A","refreshToken":"new-R"}"#);
		})
		.await;
	let request = profile_request(&server);
	let results = tokio::join!(
		client.send(request.clone()),
		client.send(request.clone()),
		client.send(request.clone()),
		client.send(request.clone()),
		client.send(request),
	);

	for result in [results.0, results.1, results.2, results.3, results.4] {
		let response = result.expect("Every caller should succeed after the shared refresh.");

		assert_eq!(response.status, 200);
	}

	assert_eq!(client.refresh_metrics().exchanges(), 1);
	assert_eq!(stored(&store), (Some("new-A".into()), Some("new-R".into())));

	fresh.assert_calls_async(5).await;
	refresh.assert_calls_async(1).await;
}

#[tokio::test]
async fn missing_refresh_credential_fails_all_callers_without_network() {
	let server = MockServer::start_async().await;
	let (client, store) = build_reqwest_test_client(config(&server));

	seed(&store, "old-A", None).await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/me");
			then.status(401).header("content-type", "application/json").body(EXPIRED);
		})
		.await;

	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200).body(r#"{"accessToken":"never"}"#);
		})
		.await;
	let request = profile_request(&server);
	let (first, second, third) = tokio::join!(
		client.send(request.clone()),
		client.send(request.clone()),
		client.send(request),
	);

	for result in [first, second, third] {
		let err = result.expect_err("Callers must fail without a refresh credential.");

		assert!(err.requires_sign_in());
	}

	assert_eq!(stored(&store), (None, None));
	assert_eq!(client.refresh_metrics().exchanges(), 0);

	refresh.assert_calls_async(0).await;
}

#[tokio::test]
async fn custom_header_and_field_are_honored() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let config = PipelineConfig::builder(Url::parse(&server.url("/auth/refresh"))?)
		.refresh_field("token")
		.auth_header(AuthHeader { name: "x-session".into(), scheme: None })
		.build()?;
	let (client, store) = build_reqwest_test_client(config);

	seed(&store, "old-A", Some("old-R")).await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/me").header("x-session", "old-A");
			then.status(401).body(EXPIRED);
		})
		.await;

	let fresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/me").header("x-session", "new-A");
			then.status(204);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh").json_body(json!({ "token": "old-R" }));
			then.status(200).body(r#"{"access_token":"new-A"}"#);
		})
		.await;
	let response = client.send(profile_request(&server)).await?;

	assert_eq!(response.status, 204);

	fresh.assert_calls_async(1).await;
	refresh.assert_calls_async(1).await;

	Ok(())
}
