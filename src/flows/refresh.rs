//! Refresh token exchange.

// self
use crate::{
	_prelude::*,
	auth::{CachedToken, ScopeSet, Secret},
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
	/// Redeems `refresh_token` for a new access token.
	///
	/// When the authority does not rotate the refresh token, the redeemed one is kept on
	/// the returned token so it stays usable.
	pub async fn refresh_token(
		&self,
		authority: &Authority,
		scopes: &ScopeSet,
		refresh_token: &Secret,
		correlation_id: &str,
	) -> Result<CachedToken> {
		let params = [
			("refresh_token", refresh_token.expose().to_owned()),
			("scope", scopes.with_reserved().normalized()),
		];
		let response = self
			.exchange(
				authority,
				GrantType::RefreshToken,
				ClientProof::IfConfigured,
				&params,
				correlation_id,
			)
			.await?;
		let mut token =
			common::build_token(response, scopes, correlation_id, OffsetDateTime::now_utc())?;

		if token.refresh_token.is_none() {
			token.refresh_token = Some(refresh_token.clone());
		}

		Ok(token)
	}
}
