//! Signed-in account identity derived from OpenID Connect id tokens.
//!
//! The broker never validates id token signatures; the token arrived over TLS directly
//! from the authority's token endpoint and is only used to name the cache partition.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{
	_prelude::*,
	auth::{HomeAccountId, IdentifierError, TenantId},
};

/// Errors raised while deriving an [`Account`] from an id token.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum IdTokenError {
	/// The token is not a three-part compact JWT.
	#[error("Id token is not a compact JWT.")]
	Malformed,
	/// The payload segment is not valid base64url JSON.
	#[error("Id token payload could not be decoded: {message}.")]
	Payload {
		/// Decoder failure message.
		message: String,
	},
	/// A claim required to identify the account is missing.
	#[error("Id token is missing the {claim} claim.")]
	MissingClaim {
		/// Claim name.
		claim: &'static str,
	},
	/// A claim value is not a valid identifier.
	#[error(transparent)]
	InvalidIdentifier(#[from] IdentifierError),
}

/// Identity of a signed-in user, immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
	/// Stable cross-tenant identifier; partitions the user's cache entries.
	pub home_account_id: HomeAccountId,
	/// Tenant that issued the account's tokens.
	pub tenant_id: TenantId,
	/// Human-readable user identifier (UPN, email, or preferred username).
	pub username: String,
}
impl Account {
	/// Creates an account from already validated parts.
	pub fn new(
		home_account_id: HomeAccountId,
		tenant_id: TenantId,
		username: impl Into<String>,
	) -> Self {
		Self { home_account_id, tenant_id, username: username.into() }
	}

	/// Derives the account from the claims of a raw id token.
	///
	/// The home account id is `{oid}.{tid}`, falling back to `{sub}.{tid}` for tokens
	/// without an object id.
	pub fn from_id_token(raw: &str) -> Result<Self, IdTokenError> {
		let claims = IdTokenClaims::decode(raw)?;
		let tid = claims.tid.as_deref().ok_or(IdTokenError::MissingClaim { claim: "tid" })?;
		let object = claims
			.oid
			.as_deref()
			.or(claims.sub.as_deref())
			.ok_or(IdTokenError::MissingClaim { claim: "oid" })?;
		let home_account_id = HomeAccountId::new(format!("{object}.{tid}"))?;
		let tenant_id = TenantId::new(tid)?;
		let username = claims
			.preferred_username
			.or(claims.upn)
			.or(claims.email)
			.unwrap_or_else(|| object.to_owned());

		Ok(Self { home_account_id, tenant_id, username })
	}

	/// Builds a username-keyed account for exchanges that returned no id token.
	pub fn from_username(username: &str, tenant_id: TenantId) -> Result<Self, IdentifierError> {
		let home_account_id = HomeAccountId::new(format!("{username}.{tenant_id}"))?;

		Ok(Self { home_account_id, tenant_id, username: username.to_owned() })
	}
}

#[derive(Debug, Default, Deserialize)]
struct IdTokenClaims {
	oid: Option<String>,
	tid: Option<String>,
	sub: Option<String>,
	preferred_username: Option<String>,
	upn: Option<String>,
	email: Option<String>,
}
impl IdTokenClaims {
	fn decode(raw: &str) -> Result<Self, IdTokenError> {
		let mut segments = raw.split('.');
		let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
			(Some(_), Some(payload), Some(_), None) => payload,
			_ => return Err(IdTokenError::Malformed),
		};
		let bytes = URL_SAFE_NO_PAD
			.decode(payload.trim_end_matches('='))
			.map_err(|e| IdTokenError::Payload { message: e.to_string() })?;

		serde_json::from_slice(&bytes).map_err(|e| IdTokenError::Payload { message: e.to_string() })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn id_token(claims: &str) -> String {
		format!(
			"{}.{}.signature",
			URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#),
			URL_SAFE_NO_PAD.encode(claims)
		)
	}

	#[test]
	fn account_derives_home_id_from_oid_and_tid() {
		let raw = id_token(
			r#"{"oid":"00000000-0000-0000-66f3-3332eca7ea81","tid":"9188040d-6c67-4c5b-b112-36a304b66dad","preferred_username":"ada@contoso.com"}"#,
		);
		let account = Account::from_id_token(&raw).expect("Id token fixture should decode.");

		assert_eq!(
			account.home_account_id.as_str(),
			"00000000-0000-0000-66f3-3332eca7ea81.9188040d-6c67-4c5b-b112-36a304b66dad"
		);
		assert_eq!(account.tenant_id.as_str(), "9188040d-6c67-4c5b-b112-36a304b66dad");
		assert_eq!(account.username, "ada@contoso.com");
	}

	#[test]
	fn account_falls_back_to_sub_and_rejects_missing_tenant() {
		let raw = id_token(r#"{"sub":"subject-1","tid":"tenant-1"}"#);
		let account = Account::from_id_token(&raw).expect("Sub-only token should decode.");

		assert_eq!(account.home_account_id.as_str(), "subject-1.tenant-1");
		assert_eq!(account.username, "subject-1");
		assert_eq!(
			Account::from_id_token(&id_token(r#"{"oid":"x"}"#)),
			Err(IdTokenError::MissingClaim { claim: "tid" })
		);
		assert_eq!(Account::from_id_token("not-a-jwt"), Err(IdTokenError::Malformed));
	}
}
