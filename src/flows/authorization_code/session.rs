//! Authorize redirect state: `state` nonce and PKCE pair.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, ScopeSet, Secret},
	authority::{Authority, AuthorityConfig, AuthorityError},
	broker::{AcquisitionRequest, GrantRequest},
	error::{AuthenticationError, ConfigError},
};

const STATE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// Authorize redirect metadata returned by `start_authorization`.
///
/// Keep the session until the redirect comes back, then call
/// [`AuthorizationSession::into_request`] with the returned `state` and `code`.
#[derive(Clone)]
pub struct AuthorizationSession {
	/// Requested scopes (without the reserved OIDC scopes).
	pub scope: ScopeSet,
	/// Opaque value that must round-trip through the redirect.
	pub state: String,
	/// Redirect URI embedded in the authorize URL.
	pub redirect_uri: Url,
	/// URL to send the user agent to.
	pub authorize_url: Url,
	/// Authority the session was started against; the code is only redeemable there.
	pub authority: Url,
	pkce: PkcePair,
}
impl AuthorizationSession {
	/// PKCE code challenge derived from the secret verifier.
	pub fn code_challenge(&self) -> &str {
		&self.pkce.challenge
	}

	/// PKCE challenge method (currently always `S256`).
	pub fn code_challenge_method(&self) -> PkceCodeChallengeMethod {
		self.pkce.method
	}

	/// Validates the `state` returned with the authorization redirect.
	pub fn validate_state(&self, returned_state: &str) -> Result<()> {
		if returned_state == self.state {
			Ok(())
		} else {
			Err(Error::InvalidGrant(
				AuthenticationError::new("invalid_state")
					.with_description("Authorization state mismatch"),
			))
		}
	}

	/// Validates `returned_state` and turns the redirect's `code` into a grant.
	pub fn into_grant(self, returned_state: &str, code: impl Into<String>) -> Result<GrantRequest> {
		self.validate_state(returned_state)?;

		let code = Secret::new(code);

		if code.is_blank() {
			return Err(ConfigError::invalid_request("authorization code is empty").into());
		}

		Ok(GrantRequest::AuthorizationCode {
			code,
			redirect_uri: self.redirect_uri,
			pkce_verifier: Some(self.pkce.verifier),
		})
	}

	/// Like [`AuthorizationSession::into_grant`], targeting the session's scopes and authority.
	pub fn into_request(
		self,
		returned_state: &str,
		code: impl Into<String>,
	) -> Result<AcquisitionRequest> {
		let scope = self.scope.clone();
		let authority = AuthorityConfig::uri(self.authority.clone());
		let grant = self.into_grant(returned_state, code)?;

		Ok(AcquisitionRequest::new(scope.iter(), grant)?.with_authority(authority))
	}
}
impl Debug for AuthorizationSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationSession")
			.field("scope", &self.scope)
			.field("state", &self.state)
			.field("redirect_uri", &self.redirect_uri)
			.field("authorize_url", &self.authorize_url)
			.field("authority", &self.authority)
			.field("code_challenge", &self.pkce.challenge)
			.field("code_challenge_method", &self.pkce.method)
			.finish()
	}
}

#[derive(Clone)]
struct PkcePair {
	verifier: Secret,
	challenge: String,
	method: PkceCodeChallengeMethod,
}
impl PkcePair {
	fn generate() -> Self {
		let verifier = random_string(PKCE_VERIFIER_LEN);
		let challenge = compute_pkce_challenge(&verifier);

		Self { verifier: Secret::new(verifier), challenge, method: PkceCodeChallengeMethod::S256 }
	}
}

pub(super) fn build_session(
	authority: &Authority,
	client_id: &ClientId,
	scope: ScopeSet,
	redirect_uri: Url,
) -> Result<AuthorizationSession> {
	let authority_uri = Url::parse(&authority.canonical).map_err(AuthorityError::from)?;
	let state = random_string(STATE_LEN);
	let pkce = PkcePair::generate();
	let authorize_url =
		build_authorize_url(authority, client_id, &redirect_uri, &scope, &state, &pkce);

	Ok(AuthorizationSession {
		scope,
		state,
		redirect_uri,
		authorize_url,
		authority: authority_uri,
		pkce,
	})
}

fn build_authorize_url(
	authority: &Authority,
	client_id: &ClientId,
	redirect_uri: &Url,
	scope: &ScopeSet,
	state: &str,
	pkce: &PkcePair,
) -> Url {
	let mut url = authority.authorize_endpoint.clone();

	url.query_pairs_mut()
		.append_pair("response_type", "code")
		.append_pair("response_mode", "query")
		.append_pair("client_id", client_id.as_str())
		.append_pair("redirect_uri", redirect_uri.as_str())
		.append_pair("scope", &scope.with_reserved().normalized())
		.append_pair("state", state)
		.append_pair("code_challenge", &pkce.challenge)
		.append_pair("code_challenge_method", pkce.method.as_str());

	url
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn compute_pkce_challenge(verifier: &str) -> String {
	URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::authority::{AuthorityConfig, AuthorityResolver, CloudInstance};

	fn session() -> AuthorizationSession {
		let authority = AuthorityResolver::new(None)
			.resolve(&AuthorityConfig::tenant_in(
				CloudInstance::AzurePublic,
				"contoso".parse().expect("Tenant fixture should be valid."),
			))
			.expect("Authority fixture should resolve.");

		build_session(
			&authority,
			&ClientId::new("client").expect("Client fixture should be valid."),
			ScopeSet::new(["User.Read"]).expect("Scope fixture should be valid."),
			Url::parse("http://localhost:8400/cb").expect("Redirect fixture should parse."),
		)
		.expect("Session should build.")
	}

	#[test]
	fn authorize_url_carries_state_and_challenge() {
		let session = session();
		let pairs = session.authorize_url.query_pairs().into_owned().collect::<HashMap<_, _>>();

		assert!(
			session
				.authorize_url
				.as_str()
				.starts_with("https://login.microsoftonline.com/contoso/oauth2/v2.0/authorize?")
		);
		assert_eq!(pairs.get("state"), Some(&session.state));
		assert_eq!(pairs.get("code_challenge").map(String::as_str), Some(session.code_challenge()));
		assert_eq!(pairs.get("code_challenge_method").map(String::as_str), Some("S256"));
		assert_eq!(
			pairs.get("scope").map(String::as_str),
			Some("User.Read offline_access openid profile")
		);
		assert_eq!(
			session.code_challenge(),
			compute_pkce_challenge(session.pkce.verifier.expose())
		);
	}

	#[test]
	fn state_validation_errors_on_mismatch() {
		let session = session();
		let state = session.state.clone();

		assert!(session.validate_state(&state).is_ok());

		let err = session.validate_state("other").expect_err("State mismatch should fail.");

		assert!(matches!(err, Error::InvalidGrant(_)));

		let request =
			session.into_request(&state, "code-123").expect("Matching state should redeem.");

		assert!(matches!(
			request.grant,
			GrantRequest::AuthorizationCode { pkce_verifier: Some(_), .. }
		));
		assert_eq!(
			request.authority.and_then(|config| config.authority_uri).map(String::from),
			Some("https://login.microsoftonline.com/contoso".to_owned())
		);
	}
}
