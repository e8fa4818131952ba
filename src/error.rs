//! Broker-level error taxonomy shared across credentials, authorities, flows, and caches.
//!
//! [`Error`] is `Clone` so every caller joined on a single-flight exchange observes the
//! same failure; boxed sources are therefore held behind [`Arc`].

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn StdError + Send + Sync>;
type ParseError = Arc<serde_path_to_error::Error<serde_json::Error>>;

/// Canonical broker error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Client credential material is unusable.
	#[error(transparent)]
	InvalidCredential(#[from] crate::credential::CredentialError),
	/// Authority inputs could not be resolved into endpoints.
	#[error(transparent)]
	UnresolvableAuthority(#[from] crate::authority::AuthorityError),
	/// Token store failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::cache::StoreError,
	),
	/// Local configuration or request validation problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retried for idempotent grants.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Network failure (DNS, TCP, TLS, timeout); retried for idempotent grants.
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Authority rejected the grant (used or expired code, revoked refresh token).
	#[error("Authority rejected the grant: {0}.")]
	InvalidGrant(AuthenticationError),
	/// The user must interact (consent, MFA, re-login) before a token can be issued.
	#[error("User interaction is required: {0}.")]
	InteractionRequired(AuthenticationError),
	/// The user or the authority declined the request.
	#[error("Access was denied: {0}.")]
	AccessDenied(AuthenticationError),
	/// Any other authority-reported rejection.
	#[error("Authority rejected the request: {0}.")]
	Authentication(AuthenticationError),
	/// A background acquisition was cancelled before it finished.
	#[error("Token acquisition was cancelled.")]
	Cancelled,
}
impl Error {
	/// Returns `true` for failures that may succeed when the same exchange is repeated.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Transport(_) | Self::Transient(_))
	}

	/// Returns `true` when a caller-level fallback to an interactive flow is warranted.
	pub fn is_interaction_required(&self) -> bool {
		matches!(self, Self::InteractionRequired(_))
	}

	/// Authority-reported error details, for every [`AuthenticationError`] refinement.
	pub fn authentication(&self) -> Option<&AuthenticationError> {
		match self {
			Self::InvalidGrant(e)
			| Self::InteractionRequired(e)
			| Self::AccessDenied(e)
			| Self::Authentication(e) => Some(e),
			_ => None,
		}
	}

	/// Correlation id of the exchange that failed, when one was attempted.
	pub fn correlation_id(&self) -> Option<&str> {
		match self {
			Self::InvalidGrant(e)
			| Self::InteractionRequired(e)
			| Self::AccessDenied(e)
			| Self::Authentication(e) => e.correlation_id.as_deref(),
			Self::Transient(e) => e.correlation_id(),
			Self::Transport(e) => e.correlation_id(),
			_ => None,
		}
	}

	/// Stamps `id` on the error unless the authority already supplied its own.
	pub fn with_correlation_id(mut self, id: &str) -> Self {
		let slot = match &mut self {
			Self::InvalidGrant(e)
			| Self::InteractionRequired(e)
			| Self::AccessDenied(e)
			| Self::Authentication(e) => Some(&mut e.correlation_id),
			Self::Transient(e) => Some(e.correlation_slot()),
			Self::Transport(e) => Some(e.correlation_slot()),
			_ => None,
		};

		if let Some(slot) = slot.filter(|slot| slot.is_none()) {
			*slot = Some(id.to_owned());
		}

		self
	}
}

/// Error details reported by the authority's token endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthenticationError {
	/// OAuth `error` code (e.g. `invalid_grant`).
	pub code: String,
	/// OAuth `error_description`, verbatim.
	pub description: Option<String>,
	/// Numeric authority error codes (Entra `AADSTS` codes), if any.
	pub error_codes: Vec<u32>,
	/// Authority `suberror` hint, if any.
	pub suberror: Option<String>,
	/// Correlation id reported by the authority or stamped by the broker.
	pub correlation_id: Option<String>,
	/// HTTP status of the failing response.
	pub http_status: Option<u16>,
}
impl AuthenticationError {
	/// Creates an error for the provided OAuth error code.
	pub fn new(code: impl Into<String>) -> Self {
		Self { code: code.into(), ..Default::default() }
	}

	/// Attaches the OAuth `error_description`.
	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());

		self
	}

	/// Attaches a correlation id.
	pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
		self.correlation_id = Some(id.into());

		self
	}
}
impl Display for AuthenticationError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match &self.description {
			Some(description) => write!(f, "{}: {description}", self.code),
			None => f.write_str(&self.code),
		}
	}
}

/// Configuration and validation failures raised before or around an exchange.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// HTTP request construction failed.
	#[error("HTTP request could not be constructed.")]
	HttpRequest {
		/// Underlying `http` crate failure.
		#[source]
		source: Arc<oauth2::http::Error>,
	},
	/// Broker settings document could not be parsed.
	#[error("Broker settings are invalid.")]
	InvalidSettings {
		/// Structured parsing failure.
		#[source]
		source: ParseError,
	},
	/// Acquisition request mixes incompatible inputs or omits required ones.
	#[error("Acquisition request is invalid: {reason}.")]
	InvalidRequest {
		/// Human-readable reason.
		reason: String,
	},
	/// The grant needs client credential material but none is configured.
	#[error("The {grant} grant requires client credential material.")]
	MissingCredential {
		/// Grant label.
		grant: &'static str,
	},
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// An identifier failed validation.
	#[error("Identifier is invalid.")]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Cached token builder validation failed.
	#[error("Unable to build cached token.")]
	TokenBuild(#[from] crate::auth::CachedTokenBuilderError),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}

	/// Shorthand for [`ConfigError::InvalidRequest`].
	pub fn invalid_request(reason: impl Into<String>) -> Self {
		Self::InvalidRequest { reason: reason.into() }
	}
}
impl From<oauth2::http::Error> for ConfigError {
	fn from(e: oauth2::http::Error) -> Self {
		Self::HttpRequest { source: Arc::new(e) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary upstream failures (safe to retry).
#[derive(Clone, Debug, ThisError)]
pub enum TransientError {
	/// Authority returned a throttling, server-side, or otherwise unexpected response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
		/// Correlation id of the failing exchange.
		correlation_id: Option<String>,
	},
	/// Token endpoint responded with JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: ParseError,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Correlation id of the failing exchange.
		correlation_id: Option<String>,
	},
}
impl TransientError {
	/// Retry-After hint carried by the failure.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::TokenEndpoint { retry_after, .. } => *retry_after,
			Self::TokenResponseParse { .. } => None,
		}
	}

	fn correlation_id(&self) -> Option<&str> {
		match self {
			Self::TokenEndpoint { correlation_id, .. }
			| Self::TokenResponseParse { correlation_id, .. } => correlation_id.as_deref(),
		}
	}

	fn correlation_slot(&mut self) -> &mut Option<String> {
		match self {
			Self::TokenEndpoint { correlation_id, .. }
			| Self::TokenResponseParse { correlation_id, .. } => correlation_id,
		}
	}
}

/// Transport-level failures (network, IO, timeouts).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: SharedError,
		/// Correlation id of the failing exchange.
		correlation_id: Option<String>,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io {
		/// IO failure.
		#[source]
		source: Arc<std::io::Error>,
		/// Correlation id of the failing exchange.
		correlation_id: Option<String>,
	},
	/// The exchange exceeded the per-call timeout.
	#[error("Token endpoint did not respond within {timeout:?}.")]
	Timeout {
		/// Configured per-call timeout.
		timeout: std::time::Duration,
		/// Correlation id of the failing exchange.
		correlation_id: Option<String>,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Arc::new(src), correlation_id: None }
	}

	fn correlation_id(&self) -> Option<&str> {
		match self {
			Self::Network { correlation_id, .. }
			| Self::Io { correlation_id, .. }
			| Self::Timeout { correlation_id, .. } => correlation_id.as_deref(),
		}
	}

	fn correlation_slot(&mut self) -> &mut Option<String> {
		match self {
			Self::Network { correlation_id, .. }
			| Self::Io { correlation_id, .. }
			| Self::Timeout { correlation_id, .. } => correlation_id,
		}
	}
}
impl From<std::io::Error> for TransportError {
	fn from(e: std::io::Error) -> Self {
		Self::Io { source: Arc::new(e), correlation_id: None }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
