//! Immutable cached token record and its builder.

// self
use crate::{
	_prelude::*,
	auth::{Account, ScopeSet, token::secret::Secret},
};

/// Errors produced by [`CachedTokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CachedTokenBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when the expiry does not come after the issue instant.
	#[error("Expiry must be later than the issue instant.")]
	ExpiryNotAfterIssue,
}

/// Token issued by an authority, replaced whole and never partially updated.
///
/// A token serves requests while `now < expires_at - skew`; see [`CachedToken::is_valid_at`].
#[derive(Clone, Serialize, Deserialize)]
pub struct CachedToken {
	/// Access token secret.
	pub access_token: Secret,
	/// Token type reported by the authority (usually `Bearer`).
	pub token_type: String,
	/// Instant the broker received the token.
	pub issued_at: OffsetDateTime,
	/// Absolute expiry derived from `expires_in`.
	pub expires_at: OffsetDateTime,
	/// Scopes the authority granted.
	pub granted_scopes: ScopeSet,
	/// Refresh token, when one was issued.
	pub refresh_token: Option<Secret>,
	/// Raw OpenID Connect id token, when one was issued.
	pub id_token: Option<Secret>,
	/// Account the token belongs to; `None` for app-only tokens.
	pub account: Option<Account>,
	/// Correlation id of the exchange that produced the token.
	pub correlation_id: Option<String>,
}
impl CachedToken {
	/// Default clock skew subtracted from `expires_at` when judging validity.
	pub const DEFAULT_CLOCK_SKEW: Duration = Duration::minutes(5);

	/// Returns a builder for the provided granted scope set.
	pub fn builder(granted_scopes: ScopeSet) -> CachedTokenBuilder {
		CachedTokenBuilder::new(granted_scopes)
	}

	/// Returns `true` while `now` is strictly before `expires_at - skew`.
	pub fn is_valid_at(&self, now: OffsetDateTime, skew: Duration) -> bool {
		now < self.expires_at - skew
	}

	/// Convenience helper evaluated against the current UTC clock.
	pub fn is_valid(&self, skew: Duration) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc(), skew)
	}

	/// Remaining lifetime at `now`, clamped at zero.
	pub fn expires_in_at(&self, now: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - now;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}

	/// Returns `true` when the granted scopes cover every non-reserved requested scope.
	pub fn covers(&self, requested: &ScopeSet) -> bool {
		self.granted_scopes.covers(requested)
	}
}
impl Debug for CachedToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CachedToken")
			.field("access_token", &self.access_token)
			.field("token_type", &self.token_type)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("granted_scopes", &self.granted_scopes)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
			.field("account", &self.account)
			.field("correlation_id", &self.correlation_id)
			.finish()
	}
}

/// Builder for [`CachedToken`].
#[derive(Clone, Debug)]
pub struct CachedTokenBuilder {
	granted_scopes: ScopeSet,
	access_token: Option<Secret>,
	token_type: Option<String>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	refresh_token: Option<Secret>,
	id_token: Option<Secret>,
	account: Option<Account>,
	correlation_id: Option<String>,
}
impl CachedTokenBuilder {
	fn new(granted_scopes: ScopeSet) -> Self {
		Self {
			granted_scopes,
			access_token: None,
			token_type: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
			refresh_token: None,
			id_token: None,
			account: None,
			correlation_id: None,
		}
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(Secret::new(token));

		self
	}

	/// Overrides the token type (defaults to `Bearer`).
	pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = Some(token_type.into());

		self
	}

	/// Sets the issued-at instant (defaults to the current clock).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(Secret::new(token));

		self
	}

	/// Provides the raw id token.
	pub fn id_token(mut self, token: impl Into<String>) -> Self {
		self.id_token = Some(Secret::new(token));

		self
	}

	/// Attaches the account the token belongs to.
	pub fn account(mut self, account: Option<Account>) -> Self {
		self.account = account;

		self
	}

	/// Records the correlation id of the producing exchange.
	pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
		self.correlation_id = Some(id.into());

		self
	}

	/// Consumes the builder and produces a [`CachedToken`].
	pub fn build(self) -> Result<CachedToken, CachedTokenBuilderError> {
		let access_token =
			self.access_token.ok_or(CachedTokenBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(CachedTokenBuilderError::MissingExpiry),
		};

		if expires_at <= issued_at {
			return Err(CachedTokenBuilderError::ExpiryNotAfterIssue);
		}

		Ok(CachedToken {
			access_token,
			token_type: self.token_type.unwrap_or_else(|| "Bearer".into()),
			issued_at,
			expires_at,
			granted_scopes: self.granted_scopes,
			refresh_token: self.refresh_token,
			id_token: self.id_token,
			account: self.account,
			correlation_id: self.correlation_id,
		})
	}
}
