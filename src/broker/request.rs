//! Per-call acquisition requests.

// self
use crate::{
	_prelude::*,
	auth::{Account, ScopeSet, Secret},
	authority::AuthorityConfig,
	error::ConfigError,
	flows::DeviceCodeInfo,
	oauth::JWT_BEARER_GRANT,
	obs::FlowKind,
};

/// Callback that shows a device code to the user.
pub type DeviceCodePrompt = Arc<dyn Fn(&DeviceCodeInfo) + Send + Sync>;

/// Grant-specific inputs of an [`AcquisitionRequest`].
///
/// Each variant carries exactly the inputs its grant needs, so incompatible mixes (a
/// password next to an assertion, say) cannot be expressed.
#[derive(Clone)]
pub enum GrantRequest {
	/// App-only token using the client's own credential.
	ClientCredentials,
	/// Exchange an inbound user assertion for a downstream token.
	OnBehalfOf {
		/// Inbound access token or assertion.
		assertion: Secret,
		/// Assertion grant type URI.
		assertion_type: String,
	},
	/// Redeem an authorization code from the authorize redirect.
	AuthorizationCode {
		/// Single-use authorization code.
		code: Secret,
		/// Redirect URI used for the authorize request.
		redirect_uri: Url,
		/// PKCE verifier paired with the authorize request's challenge.
		pkce_verifier: Option<Secret>,
	},
	/// Resource owner password credentials (public client).
	UsernamePassword {
		/// Sign-in name.
		username: String,
		/// Password; never logged.
		password: Secret,
	},
	/// Device authorization; `prompt` shows the code to the user.
	DeviceCode {
		/// Display callback; only `start_device_code` works without one.
		prompt: Option<DeviceCodePrompt>,
	},
	/// Cached token or refresh for a known account; never prompts.
	Silent {
		/// Account to acquire for.
		account: Account,
	},
	/// Exchange a caller-held refresh token.
	RefreshToken {
		/// Refresh token to redeem.
		refresh_token: Secret,
	},
}
impl GrantRequest {
	/// On-behalf-of exchange with the default JWT bearer assertion type.
	pub fn on_behalf_of(assertion: impl Into<String>) -> Self {
		Self::OnBehalfOf {
			assertion: Secret::new(assertion),
			assertion_type: JWT_BEARER_GRANT.into(),
		}
	}

	/// Overrides the assertion type of an on-behalf-of request.
	pub fn with_assertion_type(mut self, assertion_type: impl Into<String>) -> Self {
		if let Self::OnBehalfOf { assertion_type: current, .. } = &mut self {
			*current = assertion_type.into();
		}

		self
	}

	/// Authorization code redemption.
	pub fn authorization_code(
		code: impl Into<String>,
		redirect_uri: Url,
		pkce_verifier: Option<String>,
	) -> Self {
		Self::AuthorizationCode {
			code: Secret::new(code),
			redirect_uri,
			pkce_verifier: pkce_verifier.map(Secret::new),
		}
	}

	/// Username and password sign-in.
	pub fn username_password(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self::UsernamePassword { username: username.into(), password: Secret::new(password) }
	}

	/// Device code sign-in that reports the code through `prompt`.
	pub fn device_code<F>(prompt: F) -> Self
	where
		F: 'static + Fn(&DeviceCodeInfo) + Send + Sync,
	{
		Self::DeviceCode { prompt: Some(Arc::new(prompt)) }
	}

	/// Silent acquisition for `account`.
	pub fn silent(account: Account) -> Self {
		Self::Silent { account }
	}

	/// Refresh token redemption.
	pub fn refresh_token(refresh_token: impl Into<String>) -> Self {
		Self::RefreshToken { refresh_token: Secret::new(refresh_token) }
	}

	/// Flow label used for spans and metrics.
	pub fn flow_kind(&self) -> FlowKind {
		match self {
			Self::ClientCredentials => FlowKind::ClientCredentials,
			Self::OnBehalfOf { .. } => FlowKind::OnBehalfOf,
			Self::AuthorizationCode { .. } => FlowKind::AuthorizationCode,
			Self::UsernamePassword { .. } => FlowKind::UsernamePassword,
			Self::DeviceCode { .. } => FlowKind::DeviceCode,
			Self::Silent { .. } => FlowKind::Silent,
			Self::RefreshToken { .. } => FlowKind::RefreshToken,
		}
	}

	fn validate(&self) -> Result<(), ConfigError> {
		let blank = |field: &str| ConfigError::invalid_request(format!("{field} cannot be empty"));

		match self {
			Self::OnBehalfOf { assertion, assertion_type } => {
				if assertion.is_blank() {
					return Err(blank("assertion"));
				}
				if assertion_type.trim().is_empty() {
					return Err(blank("assertion type"));
				}
			},
			Self::AuthorizationCode { code, pkce_verifier, .. } => {
				if code.is_blank() {
					return Err(blank("authorization code"));
				}
				if pkce_verifier.as_ref().is_some_and(Secret::is_blank) {
					return Err(blank("PKCE verifier"));
				}
			},
			Self::UsernamePassword { username, password } => {
				if username.trim().is_empty() {
					return Err(blank("username"));
				}
				if password.is_blank() {
					return Err(blank("password"));
				}
			},
			Self::RefreshToken { refresh_token } if refresh_token.is_blank() =>
				return Err(blank("refresh token")),
			_ => (),
		}

		Ok(())
	}
}
impl Debug for GrantRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::ClientCredentials => f.write_str("ClientCredentials"),
			Self::OnBehalfOf { assertion_type, .. } => f
				.debug_struct("OnBehalfOf")
				.field("assertion_type", assertion_type)
				.finish_non_exhaustive(),
			Self::AuthorizationCode { redirect_uri, pkce_verifier, .. } => f
				.debug_struct("AuthorizationCode")
				.field("redirect_uri", &redirect_uri.as_str())
				.field("pkce", &pkce_verifier.is_some())
				.finish_non_exhaustive(),
			Self::UsernamePassword { username, .. } => f
				.debug_struct("UsernamePassword")
				.field("username", username)
				.finish_non_exhaustive(),
			Self::DeviceCode { prompt } =>
				f.debug_struct("DeviceCode").field("prompt", &prompt.is_some()).finish(),
			Self::Silent { account } => f.debug_struct("Silent").field("account", account).finish(),
			Self::RefreshToken { .. } => f.debug_struct("RefreshToken").finish_non_exhaustive(),
		}
	}
}

/// One token acquisition, validated at construction and never persisted.
///
/// Fields are read-only outside the crate so a validated request stays valid.
#[derive(Clone, Debug)]
pub struct AcquisitionRequest {
	pub(crate) scopes: ScopeSet,
	pub(crate) grant: GrantRequest,
	pub(crate) authority: Option<AuthorityConfig>,
	pub(crate) force_refresh: bool,
	pub(crate) correlation_id: Uuid,
}
impl AcquisitionRequest {
	/// Validates `scopes` and the grant inputs.
	pub fn new<I, S>(scopes: I, grant: GrantRequest) -> Result<Self>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let scopes = ScopeSet::new(scopes).map_err(ConfigError::from)?;

		if scopes.is_empty() {
			return Err(ConfigError::invalid_request("at least one scope is required").into());
		}

		grant.validate()?;

		Ok(Self {
			scopes,
			grant,
			authority: None,
			force_refresh: false,
			correlation_id: Uuid::new_v4(),
		})
	}

	/// Shorthand for [`GrantRequest::ClientCredentials`].
	pub fn client_credentials<I, S>(scopes: I) -> Result<Self>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self::new(scopes, GrantRequest::ClientCredentials)
	}

	/// Targets a specific authority instead of the client default.
	pub fn with_authority(mut self, authority: AuthorityConfig) -> Self {
		self.authority = Some(authority);

		self
	}

	/// Bypasses the cache lookup.
	pub fn force_refresh(mut self) -> Self {
		self.force_refresh = true;

		self
	}

	/// Uses a caller-chosen correlation id.
	pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
		self.correlation_id = correlation_id;

		self
	}

	/// Requested scopes; never empty.
	pub fn scopes(&self) -> &ScopeSet {
		&self.scopes
	}

	/// Grant and its inputs.
	pub fn grant(&self) -> &GrantRequest {
		&self.grant
	}

	/// Per-request authority override; the client default applies when `None`.
	pub fn authority(&self) -> Option<&AuthorityConfig> {
		self.authority.as_ref()
	}

	/// Whether the cache lookup is skipped.
	pub fn is_force_refresh(&self) -> bool {
		self.force_refresh
	}

	/// Correlation id sent as `client-request-id` and attached to errors.
	pub fn correlation_id(&self) -> Uuid {
		self.correlation_id
	}
}
