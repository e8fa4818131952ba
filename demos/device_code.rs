//! Runs a device-code sign-in in the background against a local mock authority and prints the
//! code a user would enter.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use oidc_broker::{
	authority::AuthorityConfig,
	broker::{AcquisitionRequest, GrantRequest, ReqwestTokenBroker},
	config::ClientConfig,
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/contoso/oauth2/v2.0/devicecode");
			then.status(200).header("content-type", "application/json").body(
				r#"{
					"device_code": "demo-device-code",
					"user_code": "DEMO-CODE",
					"verification_uri": "https://microsoft.com/devicelogin",
					"expires_in": 900,
					"interval": 1
				}"#,
			);
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/contoso/oauth2/v2.0/token")
				.body_includes("device_code=demo-device-code");
			then.status(200).header("content-type", "application/json").body(
				r#"{"access_token":"demo-user-access","token_type":"Bearer","expires_in":3599}"#,
			);
		})
		.await;

	let config = ClientConfig::new("demo-public-client".parse()?)
		.with_authority(AuthorityConfig::uri(Url::parse(&server.url("/contoso"))?));
	let broker = ReqwestTokenBroker::new(config)?;
	let request =
		AcquisitionRequest::new(["User.Read"], GrantRequest::DeviceCode { prompt: None })?;
	let handle = broker.start_device_code(request).await?;

	println!("{}", handle.info().instructions());

	let token = handle.wait().await?;

	println!("Signed in; access token: {}.", token.access_token.expose());

	Ok(())
}
