//! Cache keys and partitions.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, HomeAccountId, ScopeSet, TenantId},
};

/// Identity a cached token was issued to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CacheSubject {
	/// App-only token (client credentials); no user.
	App,
	/// User token, partitioned by home account id.
	Account(HomeAccountId),
	/// On-behalf-of token, partitioned by a fingerprint of the inbound user assertion.
	Assertion(String),
}
impl CacheSubject {
	/// Subject for an on-behalf-of exchange of `assertion`.
	pub fn for_assertion(assertion: &str) -> Self {
		Self::Assertion(URL_SAFE_NO_PAD.encode(Sha256::digest(assertion.as_bytes())))
	}
}
impl Display for CacheSubject {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::App => f.write_str("app"),
			Self::Account(id) => write!(f, "account:{id}"),
			Self::Assertion(fingerprint) => write!(f, "assertion:{fingerprint}"),
		}
	}
}

/// Everything in a [`CacheKey`] except the scope set.
///
/// Lookups scan a partition for an entry whose granted scopes cover the request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CachePartition {
	/// Client the token was issued to.
	pub client_id: ClientId,
	/// Tenant of the resolved authority.
	pub tenant: TenantId,
	/// Canonical authority string.
	pub authority: String,
	/// App, account, or assertion subject.
	pub subject: CacheSubject,
}
impl CachePartition {
	/// Creates a partition.
	pub fn new(
		client_id: ClientId,
		tenant: TenantId,
		authority: impl Into<String>,
		subject: CacheSubject,
	) -> Self {
		Self { client_id, tenant, authority: authority.into(), subject }
	}

	/// Same partition re-targeted at another subject.
	pub fn with_subject(&self, subject: CacheSubject) -> Self {
		Self { subject, ..self.clone() }
	}
}
impl Display for CachePartition {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}|{}|{}", self.client_id, self.authority, self.subject)
	}
}

/// Uniquely identifies a cache slot: a partition plus the requested scope set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
	/// Client, tenant, authority, and subject.
	pub partition: CachePartition,
	/// Normalized requested scopes.
	pub scope: ScopeSet,
}
impl CacheKey {
	/// Creates a key.
	pub fn new(partition: CachePartition, scope: ScopeSet) -> Self {
		Self { partition, scope }
	}

	/// Slot identifier within the partition.
	pub fn slot(&self) -> String {
		self.scope.fingerprint()
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}|{}", self.partition, self.scope)
	}
}
