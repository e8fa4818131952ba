//! On-behalf-of exchange of an inbound user assertion (JWT bearer grant).

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
	/// Exchanges `assertion` for a downstream token.
	///
	/// `assertion_type` becomes the `grant_type`; callers normally pass
	/// [`JWT_BEARER_GRANT`](crate::oauth::JWT_BEARER_GRANT). Never retried, since the
	/// authority may treat a replayed assertion as consumed.
	pub async fn on_behalf_of(
		&self,
		authority: &Authority,
		scopes: &ScopeSet,
		assertion: &Secret,
		assertion_type: &str,
		correlation_id: &str,
	) -> Result<CachedToken> {
		let params = [
			("grant_type", assertion_type.to_owned()),
			("assertion", assertion.expose().to_owned()),
			("requested_token_use", "on_behalf_of".to_owned()),
			("scope", scopes.normalized()),
		];
		let response = self
			.exchange(
				authority,
				GrantType::OnBehalfOf,
				ClientProof::Required,
				&params,
				correlation_id,
			)
			.await?;

		common::build_token(response, scopes, correlation_id, OffsetDateTime::now_utc())
	}
}
