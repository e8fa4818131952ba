//! Acquires an app-only token with a client secret against a local mock authority, then shows
//! the second acquisition being served from the cache.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use oidc_broker::{
	authority::AuthorityConfig,
	broker::{AcquisitionRequest, ReqwestTokenBroker},
	config::ClientConfig,
	credential::CredentialMaterial,
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/contoso/oauth2/v2.0/token");
			then.status(200).header("content-type", "application/json").body(
				r#"{"access_token":"demo-access","token_type":"Bearer","expires_in":3599}"#,
			);
		})
		.await;
	let config = ClientConfig::new("demo-client".parse()?)
		.with_credential(CredentialMaterial::client_secret("super-secret")?)
		.with_authority(AuthorityConfig::uri(Url::parse(&server.url("/contoso"))?));
	let broker = ReqwestTokenBroker::new(config)?;
	let request = AcquisitionRequest::client_credentials(["https://graph.microsoft.com/.default"])?;
	let token = broker.acquire_token(request.clone()).await?;
	let cached = broker.acquire_token(request).await?;

	println!("Access token: {} (expires at {}).", token.access_token.expose(), token.expires_at);
	println!("Served from cache: {}.", cached.access_token == token.access_token);

	token_mock.assert_async().await;

	Ok(())
}
