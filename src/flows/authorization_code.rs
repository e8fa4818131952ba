//! Authorization code exchange and the PKCE-protected authorize redirect that precedes it.

pub mod session;

pub use session::*;

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
	/// Builds the authorize URL with a fresh `state` and PKCE S256 challenge.
	pub fn start_authorization(
		&self,
		authority: &Authority,
		scopes: &ScopeSet,
		redirect_uri: Url,
	) -> Result<AuthorizationSession> {
		session::build_session(authority, &self.client_id, scopes.clone(), redirect_uri)
	}

	/// Redeems an authorization code.
	///
	/// Codes are single use: a replayed code fails with
	/// [`Error::InvalidGrant`] carrying the authority's description, and is never retried.
	pub async fn authorization_code(
		&self,
		authority: &Authority,
		scopes: &ScopeSet,
		code: &Secret,
		redirect_uri: &Url,
		pkce_verifier: Option<&Secret>,
		correlation_id: &str,
	) -> Result<CachedToken> {
		let mut params = vec![
			("code", code.expose().to_owned()),
			("redirect_uri", redirect_uri.to_string()),
			("scope", scopes.with_reserved().normalized()),
		];

		if let Some(verifier) = pkce_verifier {
			params.push(("code_verifier", verifier.expose().to_owned()));
		}

		let response = self
			.exchange(
				authority,
				GrantType::AuthorizationCode,
				ClientProof::IfConfigured,
				&params,
				correlation_id,
			)
			.await?;

		common::build_token(response, scopes, correlation_id, OffsetDateTime::now_utc())
	}
}
