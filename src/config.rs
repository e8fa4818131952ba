//! Explicit client configuration and tunable broker settings.
//!
//! [`ClientConfig`] names the confidential or public client a broker acts for.
//! [`BrokerSettings`] carries the knobs that deployments usually keep in a JSON document
//! (timeouts, retry policy, clock skew, default authority); load it with
//! [`BrokerSettings::from_json`].

// self
use crate::{
	_prelude::*,
	auth::ClientId,
	authority::{AuthorityConfig, AuthorityStrategy, DefaultAuthorityStrategy},
	cache::{MemoryStore, TokenStore},
	credential::{ClientAuthMethod, CredentialMaterial},
	error::ConfigError,
};

/// Bounded exponential backoff applied to retryable exchanges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
	/// Total attempts, including the first one.
	pub max_attempts: u32,
	/// Delay before the second attempt, in milliseconds.
	pub initial_backoff_ms: u64,
	/// Upper bound for any single delay, in milliseconds; also caps `Retry-After` hints.
	pub max_backoff_ms: u64,
}
impl RetryPolicy {
	/// Policy that never retries.
	pub fn disabled() -> Self {
		Self { max_attempts: 1, ..Default::default() }
	}

	/// Delay to wait after failed attempt number `attempt` (1-based).
	///
	/// A server-provided `retry_after` hint replaces the computed backoff, capped at the
	/// policy maximum.
	pub fn delay_for(
		&self,
		attempt: u32,
		retry_after: Option<std::time::Duration>,
	) -> std::time::Duration {
		let max = std::time::Duration::from_millis(self.max_backoff_ms);

		if let Some(hint) = retry_after {
			return hint.min(max);
		}

		let factor = 1_u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);

		std::time::Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor)).min(max)
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self { max_attempts: 3, initial_backoff_ms: 200, max_backoff_ms: 2_000 }
	}
}

/// Tunable broker settings, deserializable from JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerSettings {
	/// Per-call network timeout, in seconds.
	pub http_timeout_secs: u64,
	/// Seconds subtracted from every token expiry when judging validity.
	pub clock_skew_secs: u32,
	/// Retry policy for idempotent exchanges.
	pub retry: RetryPolicy,
	/// Authority used when a request names none.
	pub default_authority: Option<AuthorityConfig>,
}
impl BrokerSettings {
	/// Parses settings from a JSON document, reporting the failing field path.
	pub fn from_json(json: &str) -> Result<Self, ConfigError> {
		let mut deserializer = serde_json::Deserializer::from_str(json);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|e| ConfigError::InvalidSettings { source: Arc::new(e) })
	}

	/// Per-call network timeout.
	pub fn http_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.http_timeout_secs)
	}

	/// Clock skew as a signed duration.
	pub fn clock_skew(&self) -> Duration {
		Duration::seconds(self.clock_skew_secs.into())
	}
}
impl Default for BrokerSettings {
	fn default() -> Self {
		Self {
			http_timeout_secs: 30,
			clock_skew_secs: 300,
			retry: RetryPolicy::default(),
			default_authority: None,
		}
	}
}

/// Everything a [`TokenBroker`](crate::broker::TokenBroker) needs to act for one client.
#[derive(Clone)]
pub struct ClientConfig {
	/// Application (client) id registered with the authority.
	pub client_id: ClientId,
	/// Client credential; `None` for public clients.
	pub credential: Option<CredentialMaterial>,
	/// Default authority; takes precedence over [`BrokerSettings::default_authority`].
	pub authority: Option<AuthorityConfig>,
	/// How client secrets are presented to the token endpoint.
	pub auth_method: ClientAuthMethod,
	/// Tunable settings.
	pub settings: BrokerSettings,
	/// Error classification and request decoration hooks.
	pub strategy: Arc<dyn AuthorityStrategy>,
	/// Token persistence backend.
	pub store: Arc<dyn TokenStore>,
}
impl ClientConfig {
	/// Configuration for `client_id` with default settings, strategy, and an in-memory store.
	pub fn new(client_id: ClientId) -> Self {
		Self {
			client_id,
			credential: None,
			authority: None,
			auth_method: ClientAuthMethod::default(),
			settings: BrokerSettings::default(),
			strategy: Arc::new(DefaultAuthorityStrategy),
			store: Arc::new(MemoryStore::default()),
		}
	}

	/// Attaches the confidential client credential.
	pub fn with_credential(mut self, credential: CredentialMaterial) -> Self {
		self.credential = Some(credential);

		self
	}

	/// Sets the default authority, overriding any authority in the settings.
	pub fn with_authority(mut self, authority: AuthorityConfig) -> Self {
		self.authority = Some(authority);

		self
	}

	/// Selects how client secrets are sent.
	pub fn with_auth_method(mut self, auth_method: ClientAuthMethod) -> Self {
		self.auth_method = auth_method;

		self
	}

	/// Replaces the tunable settings; an authority set with [`Self::with_authority`] is kept.
	pub fn with_settings(mut self, settings: BrokerSettings) -> Self {
		self.settings = settings;

		self
	}

	/// Replaces the authority strategy.
	pub fn with_strategy(mut self, strategy: Arc<dyn AuthorityStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Replaces the token store.
	pub fn with_store(mut self, store: Arc<dyn TokenStore>) -> Self {
		self.store = store;

		self
	}

	/// Authority used when a request names none.
	pub fn default_authority(&self) -> Option<&AuthorityConfig> {
		self.authority.as_ref().or(self.settings.default_authority.as_ref())
	}
}
impl Debug for ClientConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientConfig")
			.field("client_id", &self.client_id)
			.field("credential", &self.credential)
			.field("authority", &self.authority)
			.field("auth_method", &self.auth_method)
			.field("settings", &self.settings)
			.finish_non_exhaustive()
	}
}
