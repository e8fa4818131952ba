//! Shared exchange plumbing: client authentication, retries, and response mapping.

// self
use crate::{
	_prelude::*,
	auth::{Account, CachedToken, ScopeSet},
	authority::Authority,
	error::{ConfigError, TransientError},
	flows::FlowExecutor,
	http::TokenHttpClient,
	oauth::{FormRequest, GrantType, TokenEndpointResponse, TransportErrorMapper},
	obs,
};

/// Largest `expires_in` accepted from an authority.
pub(crate) const MAX_EXPIRES_IN: i64 = i32::MAX as i64;

/// How an exchange proves the client's identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ClientProof {
	/// Credential material is mandatory (confidential-only grants).
	Required,
	/// Credential material is attached when configured.
	IfConfigured,
	/// Public-client exchange; only `client_id` is sent.
	Public,
}

impl<C, M> FlowExecutor<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds the form for one attempt; certificate assertions are signed fresh each time.
	pub(crate) fn token_request(
		&self,
		authority: &Authority,
		grant: GrantType,
		proof: ClientProof,
		params: &[(&'static str, String)],
	) -> Result<FormRequest> {
		let mut request = FormRequest::new(authority.token_endpoint.clone())
			.param("client_id", self.client_id.as_str())
			.param("grant_type", grant.as_str());

		match (&self.credential, proof) {
			(_, ClientProof::Public) => (),
			(None, ClientProof::IfConfigured) => (),
			(None, ClientProof::Required) =>
				return Err(ConfigError::MissingCredential { grant: grant_label(grant) }.into()),
			(Some(credential), _) => {
				let auth = credential.client_auth(
					&self.client_id,
					&authority.token_endpoint,
					self.auth_method,
				)?;

				for (key, value) in auth.form {
					request = request.param(key, value.expose());
				}

				request.authorization = auth.authorization;
			},
		}
		for (key, value) in params {
			request = request.param(key, value.as_str());
		}

		Ok(request)
	}

	/// Sends one attempt and stamps the correlation id on failures.
	pub(crate) async fn exchange_once(
		&self,
		authority: &Authority,
		grant: GrantType,
		proof: ClientProof,
		params: &[(&'static str, String)],
		correlation_id: &str,
	) -> Result<TokenEndpointResponse> {
		let request = self.token_request(authority, grant, proof, params)?;

		self.endpoint
			.send(grant, request, correlation_id)
			.await
			.map_err(|e| e.with_correlation_id(correlation_id))
	}

	/// Sends the exchange, retrying retryable failures of idempotent grants with backoff.
	pub(crate) async fn exchange(
		&self,
		authority: &Authority,
		grant: GrantType,
		proof: ClientProof,
		params: &[(&'static str, String)],
		correlation_id: &str,
	) -> Result<TokenEndpointResponse> {
		let mut attempt = 1;

		loop {
			match self.exchange_once(authority, grant, proof, params, correlation_id).await {
				Ok(response) => return Ok(response),
				Err(e)
					if grant.is_idempotent()
						&& e.is_retryable()
						&& attempt < self.retry.max_attempts =>
				{
					let delay = self.retry.delay_for(attempt, retry_hint(&e));

					obs::retry_event(attempt, delay, &e);
					tokio::time::sleep(delay).await;

					attempt += 1;
				},
				Err(e) => return Err(e),
			}
		}
	}
}

/// Converts a token endpoint response into a [`CachedToken`].
///
/// Granted scopes fall back to the requested ones when the authority omits `scope`.
pub(crate) fn build_token(
	response: TokenEndpointResponse,
	requested: &ScopeSet,
	correlation_id: &str,
	now: OffsetDateTime,
) -> Result<CachedToken> {
	let expires_in = response.expires_in.ok_or(ConfigError::MissingExpiresIn)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}
	if expires_in > MAX_EXPIRES_IN {
		return Err(ConfigError::ExpiresInOutOfRange.into());
	}

	let granted = match response.scope.as_deref().map(str::split_whitespace) {
		Some(scopes) => ScopeSet::new(scopes).map_err(ConfigError::from)?,
		None => ScopeSet::default(),
	};
	let granted = if granted.is_empty() { requested.clone() } else { granted };
	let account =
		response.id_token.as_ref().and_then(|raw| Account::from_id_token(raw.expose()).ok());
	let mut builder = CachedToken::builder(granted)
		.access_token(response.access_token.expose())
		.issued_at(now)
		.expires_in(Duration::seconds(expires_in))
		.account(account)
		.correlation_id(correlation_id);

	if let Some(token_type) = response.token_type {
		builder = builder.token_type(token_type);
	}
	if let Some(refresh_token) = response.refresh_token {
		builder = builder.refresh_token(refresh_token.expose());
	}
	if let Some(id_token) = response.id_token {
		builder = builder.id_token(id_token.expose());
	}

	builder.build().map_err(|e| ConfigError::from(e).into())
}

fn retry_hint(err: &Error) -> Option<std::time::Duration> {
	match err {
		Error::Transient(TransientError::TokenEndpoint { retry_after: Some(hint), .. }) =>
			std::time::Duration::try_from(*hint).ok(),
		_ => None,
	}
}

fn grant_label(grant: GrantType) -> &'static str {
	match grant {
		GrantType::ClientCredentials => "client_credentials",
		GrantType::OnBehalfOf => "on_behalf_of",
		GrantType::AuthorizationCode => "authorization_code",
		GrantType::Password => "password",
		GrantType::DeviceCode => "device_code",
		GrantType::RefreshToken => "refresh_token",
	}
}
