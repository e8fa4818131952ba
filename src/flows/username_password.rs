//! Resource owner password credentials exchange for public clients.

// self
use crate::{
	_prelude::*,
	auth::{Account, CachedToken, ScopeSet, Secret},
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
	/// Performs the `password` grant without client credential material.
	///
	/// The account falls back to one keyed by `username` when the authority returns no id
	/// token.
	pub async fn username_password(
		&self,
		authority: &Authority,
		scopes: &ScopeSet,
		username: &str,
		password: &Secret,
		correlation_id: &str,
	) -> Result<CachedToken> {
		let params = [
			("username", username.to_owned()),
			("password", password.expose().to_owned()),
			("scope", scopes.with_reserved().normalized()),
		];
		let response = self
			.exchange(
				authority,
				GrantType::Password,
				ClientProof::Public,
				&params,
				correlation_id,
			)
			.await?;
		let mut token =
			common::build_token(response, scopes, correlation_id, OffsetDateTime::now_utc())?;

		if token.account.is_none() {
			token.account = Account::from_username(username, authority.tenant.clone()).ok();
		}

		Ok(token)
	}
}
