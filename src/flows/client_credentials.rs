//! App-only client credentials exchange.

// self
use crate::{
	_prelude::*,
	auth::{CachedToken, ScopeSet},
	authority::Authority,
	flows::{
		FlowExecutor,
		common::{self, ClientProof},
	},
	http::TokenHttpClient,
	oauth::{GrantType, TransportErrorMapper},
};

impl<C, M> FlowExecutor<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Performs the `client_credentials` grant; requires client credential material.
	pub async fn client_credentials(
		&self,
		authority: &Authority,
		scopes: &ScopeSet,
		correlation_id: &str,
	) -> Result<CachedToken> {
		let params = [("scope", scopes.normalized())];
		let response = self
			.exchange(
				authority,
				GrantType::ClientCredentials,
				ClientProof::Required,
				&params,
				correlation_id,
			)
			.await?;

		common::build_token(response, scopes, correlation_id, OffsetDateTime::now_utc())
	}
}
