#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use oidc_broker::{
	authority::AuthorityConfig,
	broker::{AcquisitionRequest, ReqwestTokenBroker},
	config::{BrokerSettings, ClientConfig, RetryPolicy},
	credential::CredentialMaterial,
	error::{Error, TransientError},
	oauth::CLIENT_REQUEST_ID,
	url::Url,
};

const SCOPE: &str = "https://graph.microsoft.com/.default";
const TOKEN_PATH: &str = "/contoso/oauth2/v2.0/token";

fn broker(server: &MockServer, retry: RetryPolicy) -> ReqwestTokenBroker {
	let authority = Url::parse(&server.url("/contoso"))
		.expect("Mock authority URL should parse successfully.");
	let settings = BrokerSettings { retry, http_timeout_secs: 5, ..Default::default() };
	let config = ClientConfig::new("reqwest-client".parse().expect("Client id should be valid."))
		.with_credential(
			CredentialMaterial::client_secret("s3cr3t").expect("Secret fixture should be valid."),
		)
		.with_authority(AuthorityConfig::uri(authority))
		.with_settings(settings);

	ReqwestTokenBroker::new(config).expect("Reqwest broker should build.")
}

fn request() -> AcquisitionRequest {
	AcquisitionRequest::client_credentials([SCOPE]).expect("Request should validate.")
}

#[tokio::test]
async fn client_credentials_round_trip_over_http() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.header("content-type", "application/x-www-form-urlencoded")
				.header_exists(CLIENT_REQUEST_ID)
				.body_includes("grant_type=client_credentials")
				.body_includes("client_secret=s3cr3t");
			then.status(200).header("content-type", "application/json").body(
				r#"{"access_token":"http-token","token_type":"Bearer","expires_in":"3599"}"#,
			);
		})
		.await;
	let broker = broker(&server, RetryPolicy::default());
	let first = broker.acquire_token(request()).await.expect("Exchange should succeed.");
	let second = broker.acquire_token(request()).await.expect("Cached token should be reused.");

	assert_eq!(first.access_token.expose(), "http-token");
	assert_eq!(second.access_token, first.access_token);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn throttling_keeps_the_retry_after_hint() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(429)
				.header("content-type", "application/json")
				.header("retry-after", "7")
				.body(r#"{"error":"temporarily_unavailable","error_description":"Slow down."}"#);
		})
		.await;
	let retry = RetryPolicy { max_attempts: 2, initial_backoff_ms: 1, max_backoff_ms: 10 };
	let err = broker(&server, retry)
		.acquire_token(request())
		.await
		.expect_err("Throttled exchange should fail.");
	let Error::Transient(transient) = &err else {
		panic!("Expected a transient error, got {err:?}.");
	};

	assert_eq!(transient.retry_after(), Some(time::Duration::seconds(7)));
	assert!(err.correlation_id().is_some());

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn html_error_pages_are_transient() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(502).header("content-type", "text/html").body("<html>Bad Gateway</html>");
		})
		.await;
	let err = broker(&server, RetryPolicy::disabled())
		.acquire_token(request())
		.await
		.expect_err("Gateway failure should fail.");

	assert!(matches!(
		err,
		Error::Transient(TransientError::TokenEndpoint { status: Some(502), .. })
	));

	mock.assert_calls_async(1).await;
}
