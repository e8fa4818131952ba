//! Grant exchanges: one request/response exchange per grant type.
//!
//! [`FlowExecutor`] knows the client (id, credential, auth method) and the transport, but
//! nothing about caching. Each grant lives in its own module as an `impl FlowExecutor`
//! block; [`TokenBroker`](crate::broker::TokenBroker) decides which one to run and what
//! to store.

pub mod authorization_code;
pub mod device_code;

mod client_credentials;
mod common;
mod on_behalf_of;
mod refresh;
mod username_password;

pub use authorization_code::*;
pub use device_code::*;

// self
use crate::{
	_prelude::*,
	auth::ClientId,
	authority::AuthorityStrategy,
	config::{ClientConfig, RetryPolicy},
	credential::{ClientAuthMethod, CredentialMaterial},
	http::TokenHttpClient,
	oauth::{TokenEndpointClient, TransportErrorMapper},
};

/// Executes grant exchanges for one client over one transport.
pub struct FlowExecutor<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	endpoint: TokenEndpointClient<C, M>,
	client_id: ClientId,
	credential: Option<CredentialMaterial>,
	auth_method: ClientAuthMethod,
	retry: RetryPolicy,
}
impl<C, M> FlowExecutor<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an executor for the client described by `config`.
	pub fn new(
		config: &ClientConfig,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			endpoint: TokenEndpointClient {
				http_client: http_client.into(),
				mapper: mapper.into(),
				strategy: config.strategy.clone(),
				timeout: config.settings.http_timeout(),
			},
			client_id: config.client_id.clone(),
			credential: config.credential.clone(),
			auth_method: config.auth_method,
			retry: config.settings.retry.clone(),
		}
	}

	/// Client the executor acts for.
	pub fn client_id(&self) -> &ClientId {
		&self.client_id
	}

	/// Strategy classifying authority errors.
	pub fn strategy(&self) -> &Arc<dyn AuthorityStrategy> {
		&self.endpoint.strategy
	}

	/// Retry policy for idempotent exchanges.
	pub fn retry_policy(&self) -> &RetryPolicy {
		&self.retry
	}
}
impl<C, M> Clone for FlowExecutor<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			endpoint: self.endpoint.clone(),
			client_id: self.client_id.clone(),
			credential: self.credential.clone(),
			auth_method: self.auth_method,
			retry: self.retry.clone(),
		}
	}
}
impl<C, M> Debug for FlowExecutor<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FlowExecutor")
			.field("client_id", &self.client_id)
			.field("credential", &self.credential.as_ref().map(CredentialMaterial::kind))
			.field("auth_method", &self.auth_method)
			.field("retry", &self.retry)
			.field("timeout", &self.endpoint.timeout)
			.finish()
	}
}
