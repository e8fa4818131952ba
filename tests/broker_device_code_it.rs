mod common;

// std
use std::{sync::Arc, time::Duration};
// crates.io
use parking_lot::Mutex;
use tokio::time::Instant;
// self
use common::{Reply, ScriptedHttpClient};
use oidc_broker::{
	broker::{AcquisitionRequest, GrantRequest},
	error::{ConfigError, Error},
	oauth::DEVICE_CODE_GRANT,
};

const SCOPE: &str = "User.Read";

fn device_code(expires_in: u32, interval: u32) -> Reply {
	Reply::ok(format!(
		r#"{{"device_code":"dc-secret","user_code":"ABCD-EFGH","verification_uri":"https://microsoft.com/devicelogin","expires_in":{expires_in},"interval":{interval}}}"#
	))
}

fn pending() -> Reply {
	Reply::error(400, r#"{"error":"authorization_pending","error_codes":[70016]}"#)
}

fn signed_in() -> Reply {
	let id_token = common::id_token("oid-1", "tenant-1", "ada@contoso.com");

	Reply::ok(common::user_token_body("device-token", "rt-1", &id_token))
}

fn request(grant: GrantRequest) -> AcquisitionRequest {
	AcquisitionRequest::new([SCOPE], grant).expect("Request should validate.")
}

#[tokio::test(start_paused = true)]
async fn polling_honors_interval_and_slow_down() {
	let http = ScriptedHttpClient::new([
		device_code(900, 5),
		pending(),
		Reply::error(400, r#"{"error":"slow_down"}"#),
		signed_in(),
	]);
	let broker = common::broker(common::config(), &http);
	let shown = Arc::new(Mutex::new(Vec::new()));
	let prompt = {
		let shown = shown.clone();

		GrantRequest::device_code(move |info| shown.lock().push(info.user_code.clone()))
	};
	let started = Instant::now();
	let token =
		broker.acquire_token(request(prompt)).await.expect("Device sign-in should succeed.");

	assert_eq!(token.access_token.expose(), "device-token");
	assert_eq!(*shown.lock(), vec!["ABCD-EFGH".to_owned()]);
	// 5s pending, 5s before the slow_down reply, then the widened 10s interval.
	assert!(started.elapsed() >= Duration::from_secs(20));
	assert_eq!(http.calls(), 4);

	let captured = http.captured();

	assert_eq!(
		captured[0].url,
		"https://login.microsoftonline.com/contoso/oauth2/v2.0/devicecode"
	);
	assert_eq!(captured[0].form["scope"], "User.Read offline_access openid profile");
	assert_eq!(captured[0].form["client_id"], common::CLIENT_ID);
	assert_eq!(captured[3].form["grant_type"], DEVICE_CODE_GRANT);
	assert_eq!(captured[3].form["device_code"], "dc-secret");
	assert_eq!(broker.accounts().await.expect("Accounts should list.").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn polling_stops_when_the_code_expires() {
	let http = ScriptedHttpClient::new([device_code(12, 5), pending(), pending(), pending()]);
	let broker = common::broker(common::config(), &http);
	let err = broker
		.acquire_token(request(GrantRequest::device_code(|_| ())))
		.await
		.expect_err("Expired code should fail.");

	assert_eq!(err.authentication().map(|details| details.code.as_str()), Some("expired_token"));
	assert_eq!(http.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn oversized_device_code_timings_fail_cleanly() {
	let lifetime = Reply::ok(
		r#"{"device_code":"dc","user_code":"U","verification_uri":"https://microsoft.com/devicelogin","expires_in":9223372036854775807}"#,
	);
	let http = ScriptedHttpClient::new([lifetime]);
	let broker = common::broker(common::config(), &http);
	let err = broker
		.acquire_token(request(GrantRequest::device_code(|_| ())))
		.await
		.expect_err("Unrepresentable lifetime should be rejected.");

	assert!(matches!(err, Error::Config(ConfigError::ExpiresInOutOfRange)));

	let interval = Reply::ok(
		r#"{"device_code":"dc","user_code":"U","verification_uri":"https://microsoft.com/devicelogin","expires_in":30,"interval":9223372036854775807}"#,
	);
	let http = ScriptedHttpClient::new([interval, pending()]);
	let broker = common::broker(common::config(), &http);
	let err = broker
		.acquire_token(request(GrantRequest::device_code(|_| ())))
		.await
		.expect_err("A code that outlives no poll should expire.");

	assert_eq!(err.authentication().map(|details| details.code.as_str()), Some("expired_token"));
	assert_eq!(http.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn declined_sign_in_is_access_denied() {
	let http = ScriptedHttpClient::new([
		device_code(900, 5),
		Reply::error(400, r#"{"error":"authorization_declined"}"#),
	]);
	let broker = common::broker(common::config(), &http);
	let err = broker
		.acquire_token(request(GrantRequest::device_code(|_| ())))
		.await
		.expect_err("Declined sign-in should fail.");

	assert!(matches!(err, Error::AccessDenied(_)));
	assert_eq!(http.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn polling_survives_transient_failures() {
	let http = ScriptedHttpClient::new([device_code(900, 5), Reply::Network, signed_in()]);
	let broker = common::broker(common::config(), &http);
	let token = broker
		.acquire_token(request(GrantRequest::device_code(|_| ())))
		.await
		.expect("Transient failure should not end polling.");

	assert_eq!(token.access_token.expose(), "device-token");
	assert_eq!(http.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn background_handle_exposes_the_code_and_finishes() {
	let http = ScriptedHttpClient::new([device_code(900, 5), pending(), signed_in()]);
	let broker = common::broker(common::config(), &http);
	let handle = broker
		.start_device_code(request(GrantRequest::DeviceCode { prompt: None }))
		.await
		.expect("Device code should be issued.");

	assert_eq!(handle.info().user_code, "ABCD-EFGH");
	assert_eq!(handle.info().verification_uri.as_str(), "https://microsoft.com/devicelogin");

	let token = handle.wait().await.expect("Background polling should succeed.");

	assert_eq!(token.access_token.expose(), "device-token");
	assert_eq!(broker.accounts().await.expect("Accounts should list.").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_handle_stores_nothing() {
	let http = ScriptedHttpClient::new([device_code(900, 5), pending(), pending(), signed_in()]);
	let broker = common::broker(common::config(), &http);
	let handle = broker
		.start_device_code(request(GrantRequest::DeviceCode { prompt: None }))
		.await
		.expect("Device code should be issued.");

	handle.cancel();

	let err = handle.wait().await.expect_err("Cancelled polling should fail.");

	assert!(matches!(err, Error::Cancelled));
	assert!(broker.accounts().await.expect("Accounts should list.").is_empty());
}

#[tokio::test]
async fn device_code_acquisition_needs_a_prompt() {
	let http = ScriptedHttpClient::default();
	let broker = common::broker(common::config(), &http);
	let err = broker
		.acquire_token(request(GrantRequest::DeviceCode { prompt: None }))
		.await
		.expect_err("Prompt-less acquisition should be rejected.");

	assert!(matches!(err, Error::Config(ConfigError::InvalidRequest { .. })));
	assert_eq!(http.calls(), 0);

	let err = broker
		.start_device_code(
			AcquisitionRequest::client_credentials([SCOPE]).expect("Request should validate."),
		)
		.await
		.expect_err("Non-device grants should be rejected.");

	assert!(matches!(err, Error::Config(ConfigError::InvalidRequest { .. })));
}
