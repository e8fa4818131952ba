mod common;

// std
use std::{fs, path::PathBuf, sync::Arc};
// crates.io
use uuid::Uuid;
// self
use common::{Reply, ScriptedHttpClient};
use oidc_broker::{
	broker::AcquisitionRequest,
	cache::{FileStore, StoreError},
	credential::CredentialMaterial,
	error::Error,
};

const SCOPE: &str = "https://graph.microsoft.com/.default";

fn snapshot_path() -> PathBuf {
	std::env::temp_dir().join(format!("oidc-broker-{}.json", Uuid::new_v4()))
}

fn broker_over(path: &PathBuf, http: &ScriptedHttpClient) -> common::ScriptedBroker {
	let store = FileStore::open(path).expect("File store should open.");
	let config = common::config()
		.with_credential(
			CredentialMaterial::client_secret("s3cr3t").expect("Secret fixture should be valid."),
		)
		.with_store(Arc::new(store));

	common::broker(config, http)
}

#[tokio::test]
async fn tokens_survive_a_restart() {
	let path = snapshot_path();
	let first_http = ScriptedHttpClient::new([Reply::ok(common::token_body("persisted", 3600))]);
	let first = broker_over(&path, &first_http);

	first
		.acquire_token(
			AcquisitionRequest::client_credentials([SCOPE]).expect("Request should validate."),
		)
		.await
		.expect("Initial acquisition should succeed.");

	let second_http = ScriptedHttpClient::default();
	let second = broker_over(&path, &second_http);
	let token = second
		.acquire_token(
			AcquisitionRequest::client_credentials([SCOPE]).expect("Request should validate."),
		)
		.await
		.expect("Reloaded token should be served from the snapshot.");

	assert_eq!(token.access_token.expose(), "persisted");
	assert_eq!(first_http.calls(), 1);
	assert_eq!(second_http.calls(), 0);

	second.clear_cache().await.expect("Clearing should succeed.");

	let third_http = ScriptedHttpClient::new([Reply::ok(common::token_body("fresh", 3600))]);
	let third = broker_over(&path, &third_http);
	let token = third
		.acquire_token(
			AcquisitionRequest::client_credentials([SCOPE]).expect("Request should validate."),
		)
		.await
		.expect("Cleared snapshot should trigger a new exchange.");

	assert_eq!(token.access_token.expose(), "fresh");
	assert_eq!(third_http.calls(), 1);

	fs::remove_file(&path).expect("Snapshot should be removable.");
}

#[test]
fn corrupt_snapshots_are_reported() {
	let path = snapshot_path();

	fs::write(&path, "{not json").expect("Corrupt snapshot should be written.");

	let err = FileStore::open(&path).expect_err("Corrupt snapshot should be rejected.");

	assert!(matches!(err, StoreError::Serialization { .. }));
	assert!(matches!(Error::from(err), Error::Storage(_)));

	fs::remove_file(&path).expect("Snapshot should be removable.");
}
