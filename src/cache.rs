//! Token cache: partitioned storage, coverage-aware lookups, and single-flight acquisition.
//!
//! [`TokenCache`] owns the lookup rules (validity with clock skew, scope coverage) and
//! the per-key single flight. Storage is delegated to a [`TokenStore`]; [`MemoryStore`]
//! is the default and [`FileStore`] persists a JSON snapshot.

pub mod file;
pub mod key;
pub mod memory;

mod flight;

pub use file::FileStore;
pub use key::*;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{Account, CachedToken, ScopeSet, Secret},
	cache::flight::FlightGroup,
	obs::{self, CacheOutcome},
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for cached tokens.
///
/// Implementations must make each operation atomic with respect to the others; the
/// cache never holds a store lock across calls.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Upserts the entry for `key`, replacing any previous token whole.
	fn save<'a>(&'a self, key: &'a CacheKey, token: CachedToken) -> StoreFuture<'a, ()>;

	/// Returns every entry held in `partition`.
	fn entries<'a>(&'a self, partition: &'a CachePartition) -> StoreFuture<'a, Vec<CacheEntry>>;

	/// Removes the entry for `key`, returning it when present.
	fn remove<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<CachedToken>>;

	/// Removes every entry of `partition`, returning how many were dropped.
	fn remove_partition<'a>(&'a self, partition: &'a CachePartition) -> StoreFuture<'a, usize>;

	/// Lists partitions that hold at least one entry.
	fn partitions(&self) -> StoreFuture<'_, Vec<CachePartition>>;

	/// Drops every entry.
	fn clear(&self) -> StoreFuture<'_, ()>;

	/// Drops entries expired at `now` that hold no refresh token, then empty partitions.
	///
	/// Returns how many entries were dropped.
	fn prune(&self, now: OffsetDateTime) -> StoreFuture<'_, usize>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// A stored token together with the requested scope set of its slot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry {
	/// Requested scopes the slot was stored under.
	pub scope: ScopeSet,
	/// Cached token.
	pub token: CachedToken,
}

// Why a lookup produced no token; surfaces only through observability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CacheMiss {
	NotFound,
	Expired,
	InsufficientScope,
}
impl From<CacheMiss> for CacheOutcome {
	fn from(miss: CacheMiss) -> Self {
		match miss {
			CacheMiss::NotFound => CacheOutcome::NotFound,
			CacheMiss::Expired => CacheOutcome::Expired,
			CacheMiss::InsufficientScope => CacheOutcome::InsufficientScope,
		}
	}
}

/// Thread-safe token cache with single-flight acquisition.
pub struct TokenCache {
	store: Arc<dyn TokenStore>,
	clock_skew: Duration,
	flights: FlightGroup<CacheKey, Result<CachedToken>>,
}
impl TokenCache {
	/// Creates a cache over `store` that treats tokens as expired `clock_skew` early.
	pub fn new(store: Arc<dyn TokenStore>, clock_skew: Duration) -> Self {
		Self { store, clock_skew, flights: FlightGroup::new() }
	}

	/// Underlying store.
	pub fn store_backend(&self) -> &Arc<dyn TokenStore> {
		&self.store
	}

	/// Clock skew subtracted from every expiry.
	pub fn clock_skew(&self) -> Duration {
		self.clock_skew
	}

	/// Returns the newest valid token in the key's partition covering the key's scopes.
	pub async fn lookup(&self, key: &CacheKey) -> Result<Option<CachedToken>> {
		self.lookup_at(key, OffsetDateTime::now_utc()).await
	}

	/// [`TokenCache::lookup`] evaluated at an explicit instant.
	pub async fn lookup_at(
		&self,
		key: &CacheKey,
		now: OffsetDateTime,
	) -> Result<Option<CachedToken>> {
		let entries = self.store.entries(&key.partition).await?;
		let outcome = select(entries, &key.scope, now, self.clock_skew);

		match &outcome {
			Ok(_) => {
				obs::record_cache_outcome(CacheOutcome::Hit);
				obs::cache_event(CacheOutcome::Hit, key);
			},
			Err(miss) => {
				obs::record_cache_outcome((*miss).into());
				obs::cache_event((*miss).into(), key);
			},
		}

		Ok(outcome.ok())
	}

	/// Upserts the token for `key`, first pruning dead entries from the store.
	pub async fn store(&self, key: &CacheKey, token: CachedToken) -> Result<()> {
		let pruned = self.store.prune(OffsetDateTime::now_utc()).await?;

		if pruned > 0 {
			obs::prune_event(pruned);
		}

		Ok(self.store.save(key, token).await?)
	}

	/// Removes the entry for `key`.
	pub async fn invalidate(&self, key: &CacheKey) -> Result<Option<CachedToken>> {
		Ok(self.store.remove(key).await?)
	}

	/// Returns a cached token for `key`, or runs `supplier` once across concurrent callers.
	///
	/// Every caller joined on the same key observes the same result, success or failure.
	/// The winner stores the token before the flight completes; a cancelled flight stores
	/// nothing.
	pub async fn get_or_acquire<F, Fut>(&self, key: &CacheKey, supplier: F) -> Result<CachedToken>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<CachedToken>>,
	{
		if let Some(hit) = self.lookup(key).await? {
			return Ok(hit);
		}

		self.flights
			.run(key.clone(), || async {
				if let Some(hit) = self.lookup(key).await? {
					return Ok(hit);
				}

				self.acquire_and_store(key, supplier).await
			})
			.await
	}

	/// Runs `supplier` under the key's single flight without consulting the cache.
	pub async fn refresh_with<F, Fut>(&self, key: &CacheKey, supplier: F) -> Result<CachedToken>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<CachedToken>>,
	{
		obs::record_cache_outcome(CacheOutcome::Bypassed);
		obs::cache_event(CacheOutcome::Bypassed, key);

		self.flights.run(key.clone(), || self.acquire_and_store(key, supplier)).await
	}

	/// Newest refresh token held anywhere in `partition`, regardless of scope or expiry.
	pub async fn refresh_token_for(&self, partition: &CachePartition) -> Result<Option<Secret>> {
		let entries = self.store.entries(partition).await?;

		Ok(entries
			.into_iter()
			.filter(|entry| entry.token.refresh_token.is_some())
			.max_by_key(|entry| entry.token.issued_at)
			.and_then(|entry| entry.token.refresh_token))
	}

	/// Strips a rejected refresh token from every entry of `partition` that holds it.
	pub async fn forget_refresh_token(
		&self,
		partition: &CachePartition,
		refresh_token: &Secret,
	) -> Result<()> {
		for entry in self.store.entries(partition).await? {
			if entry.token.refresh_token.as_ref() != Some(refresh_token) {
				continue;
			}

			let key = CacheKey::new(partition.clone(), entry.scope);
			let token = CachedToken { refresh_token: None, ..entry.token };

			self.store.save(&key, token).await?;
		}

		Ok(())
	}

	/// Accounts with at least one cached token.
	pub async fn accounts(&self) -> Result<Vec<Account>> {
		let mut accounts = Vec::<Account>::new();

		for partition in self.store.partitions().await? {
			if !matches!(partition.subject, CacheSubject::Account(_)) {
				continue;
			}

			for entry in self.store.entries(&partition).await? {
				if let Some(account) = entry.token.account.filter(|account| {
					!accounts.iter().any(|known| known.home_account_id == account.home_account_id)
				}) {
					accounts.push(account);
				}
			}
		}

		Ok(accounts)
	}

	/// Removes every entry of `account` across clients and authorities.
	pub async fn remove_account(&self, account: &Account) -> Result<usize> {
		let subject = CacheSubject::Account(account.home_account_id.clone());
		let mut removed = 0;

		for partition in self.store.partitions().await? {
			if partition.subject == subject {
				removed += self.store.remove_partition(&partition).await?;
			}
		}

		Ok(removed)
	}

	/// Drops every cached token.
	pub async fn clear(&self) -> Result<()> {
		Ok(self.store.clear().await?)
	}

	async fn acquire_and_store<F, Fut>(&self, key: &CacheKey, supplier: F) -> Result<CachedToken>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<CachedToken>>,
	{
		let token = supplier().await?;

		self.store(key, token.clone()).await?;

		Ok(token)
	}
}
impl Debug for TokenCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCache")
			.field("clock_skew", &self.clock_skew)
			.field("flights", &self.flights)
			.finish_non_exhaustive()
	}
}

/// Shared [`TokenStore::prune`] rule for map-backed stores.
pub(crate) fn prune_expired(
	map: &mut HashMap<CachePartition, HashMap<String, CacheEntry>>,
	now: OffsetDateTime,
) -> usize {
	let mut pruned = 0;

	map.retain(|_, slots| {
		let before = slots.len();

		slots.retain(|_, entry| {
			entry.token.refresh_token.is_some() || entry.token.expires_at > now
		});
		pruned += before - slots.len();

		!slots.is_empty()
	});

	pruned
}

fn select(
	entries: Vec<CacheEntry>,
	requested: &ScopeSet,
	now: OffsetDateTime,
	skew: Duration,
) -> Result<CachedToken, CacheMiss> {
	if entries.is_empty() {
		return Err(CacheMiss::NotFound);
	}

	let mut miss = CacheMiss::Expired;
	let mut best: Option<CachedToken> = None;

	for entry in entries {
		if !entry.token.is_valid_at(now, skew) {
			continue;
		}
		if !entry.token.covers(requested) {
			miss = CacheMiss::InsufficientScope;

			continue;
		}
		if best.as_ref().is_none_or(|current| entry.token.expires_at > current.expires_at) {
			best = Some(entry.token);
		}
	}

	best.ok_or(miss)
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::{ClientId, HomeAccountId, TenantId};

	fn partition(subject: CacheSubject) -> CachePartition {
		CachePartition::new(
			ClientId::new("client").expect("Client fixture should be valid."),
			TenantId::new("tenant").expect("Tenant fixture should be valid."),
			"https://login.microsoftonline.com/tenant",
			subject,
		)
	}

	fn scopes(values: &[&str]) -> ScopeSet {
		ScopeSet::new(values.iter().copied()).expect("Scope fixture should be valid.")
	}

	fn token(granted: &[&str], access: &str, expires_at: OffsetDateTime) -> CachedToken {
		CachedToken::builder(scopes(granted))
			.access_token(access)
			.issued_at(expires_at - Duration::hours(1))
			.expires_at(expires_at)
			.build()
			.expect("Token fixture should build.")
	}

	fn cache() -> TokenCache {
		TokenCache::new(Arc::new(MemoryStore::default()), CachedToken::DEFAULT_CLOCK_SKEW)
	}

	#[test]
	fn store_error_converts_into_broker_error_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let broker_error: Error = store_error.clone().into();

		assert!(matches!(broker_error, Error::Storage(_)));
		assert!(broker_error.to_string().contains("database unreachable"));

		let source = StdError::source(&broker_error)
			.expect("Broker error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[tokio::test]
	async fn stored_token_serves_scope_subsets() {
		let cache = cache();
		let stored_key =
			CacheKey::new(partition(CacheSubject::App), scopes(&["Mail.Read", "User.Read"]));
		let now = macros::datetime!(2025-01-01 00:00 UTC);

		cache
			.store(
				&stored_key,
				token(&["Mail.Read", "User.Read"], "wide", now + Duration::hours(1)),
			)
			.await
			.expect("Store should succeed.");

		let subset = CacheKey::new(partition(CacheSubject::App), scopes(&["user.read"]));
		let wider = CacheKey::new(partition(CacheSubject::App), scopes(&["Mail.Send"]));
		let other =
			CacheKey::new(partition(CacheSubject::for_assertion("x")), scopes(&["User.Read"]));

		assert_eq!(
			cache
				.lookup_at(&subset, now)
				.await
				.expect("Lookup should succeed.")
				.map(|token| token.access_token.expose().to_owned()),
			Some("wide".into())
		);
		assert!(cache.lookup_at(&wider, now).await.expect("Lookup should succeed.").is_none());
		assert!(cache.lookup_at(&other, now).await.expect("Lookup should succeed.").is_none());
	}

	#[tokio::test]
	async fn expiry_boundary_honors_skew() {
		let cache = cache();
		let key = CacheKey::new(partition(CacheSubject::App), scopes(&["api"]));
		let expires = macros::datetime!(2025-01-01 01:00 UTC);

		cache.store(&key, token(&["api"], "t", expires)).await.expect("Store should succeed.");

		assert!(
			cache
				.lookup_at(&key, expires - Duration::minutes(5) - Duration::seconds(1))
				.await
				.expect("Lookup should succeed.")
				.is_some()
		);
		assert!(
			cache
				.lookup_at(&key, expires - Duration::minutes(5))
				.await
				.expect("Lookup should succeed.")
				.is_none()
		);
	}

	#[test]
	fn selection_prefers_longest_lived_and_reports_misses() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let requested = scopes(&["api"]);
		let entry = |granted: &[&str], access: &str, hours: i64| CacheEntry {
			scope: scopes(granted),
			token: token(granted, access, now + Duration::hours(hours)),
		};

		assert_eq!(
			select(Vec::new(), &requested, now, Duration::ZERO).err(),
			Some(CacheMiss::NotFound)
		);
		assert_eq!(
			select(vec![entry(&["api"], "old", -1)], &requested, now, Duration::ZERO).err(),
			Some(CacheMiss::Expired)
		);
		assert_eq!(
			select(vec![entry(&["other"], "x", 1)], &requested, now, Duration::ZERO).err(),
			Some(CacheMiss::InsufficientScope)
		);

		let best = select(
			vec![entry(&["api"], "short", 1), entry(&["api", "extra"], "long", 2)],
			&requested,
			now,
			Duration::ZERO,
		)
		.expect("A covering token should be selected.");

		assert_eq!(best.access_token.expose(), "long");
	}

	#[tokio::test]
	async fn get_or_acquire_runs_supplier_once_for_concurrent_callers() {
		let cache = cache();
		let key = CacheKey::new(partition(CacheSubject::App), scopes(&["api"]));
		let calls = AtomicUsize::new(0);
		let supplier = || async {
			calls.fetch_add(1, Ordering::SeqCst);
			tokio::time::sleep(std::time::Duration::from_millis(20)).await;

			Ok(token(&["api"], "fresh", OffsetDateTime::now_utc() + Duration::hours(1)))
		};
		let (a, b) =
			tokio::join!(
				cache.get_or_acquire(&key, supplier),
				cache.get_or_acquire(&key, supplier)
			);

		assert_eq!(a.expect("First caller should succeed.").access_token.expose(), "fresh");
		assert_eq!(b.expect("Second caller should succeed.").access_token.expose(), "fresh");
		assert_eq!(calls.load(Ordering::SeqCst), 1);

		cache
			.get_or_acquire(&key, || async { unreachable!("Cached token should be served.") })
			.await
			.expect("Cached call should succeed.");
	}

	#[tokio::test]
	async fn failures_are_shared_and_not_cached() {
		let cache = cache();
		let key = CacheKey::new(partition(CacheSubject::App), scopes(&["api"]));
		let failing = || async {
			tokio::time::sleep(std::time::Duration::from_millis(10)).await;

			Err(crate::error::ConfigError::MissingExpiresIn.into())
		};
		let (a, b) =
			tokio::join!(cache.get_or_acquire(&key, failing), cache.get_or_acquire(&key, failing));

		assert!(a.is_err() && b.is_err());
		assert!(cache.lookup(&key).await.expect("Lookup should succeed.").is_none());
	}

	#[tokio::test]
	async fn storing_prunes_dead_assertion_partitions() {
		let store = Arc::new(MemoryStore::default());
		let cache = TokenCache::new(store.clone(), CachedToken::DEFAULT_CLOCK_SKEW);
		let past = OffsetDateTime::now_utc() - Duration::hours(1);
		let future = OffsetDateTime::now_utc() + Duration::hours(1);
		let user = partition(CacheSubject::for_assertion("user-1"));
		let dead = CacheKey::new(user.clone(), scopes(&["api"]));
		let mut resumable = token(&["profile"], "old", past);

		resumable.refresh_token = Some(Secret::new("rt"));

		cache.store(&dead, token(&["api"], "dead", past)).await.expect("Store should succeed.");
		cache
			.store(&CacheKey::new(user, scopes(&["profile"])), resumable)
			.await
			.expect("Store should succeed.");
		cache
			.store(
				&CacheKey::new(partition(CacheSubject::for_assertion("user-2")), scopes(&["api"])),
				token(&["api"], "live", future),
			)
			.await
			.expect("Store should succeed.");

		// The expired entry is gone; the one still holding a refresh token stays.
		assert_eq!(store.len(), 2);
		assert!(store.remove(&dead).await.expect("Remove should succeed.").is_none());
	}

	#[tokio::test]
	async fn refresh_tokens_accounts_and_removal() {
		let cache = cache();
		let home = HomeAccountId::new("oid.tid").expect("Home id fixture should be valid.");
		let account = Account::new(
			home.clone(),
			TenantId::new("tid").expect("Tenant fixture should be valid."),
			"ada@contoso.com",
		);
		let user = partition(CacheSubject::Account(home));
		let key = CacheKey::new(user.clone(), scopes(&["User.Read"]));
		let mut stored =
			token(&["User.Read"], "user", OffsetDateTime::now_utc() + Duration::hours(1));

		stored.refresh_token = Some(Secret::new("rt-1"));
		stored.account = Some(account.clone());

		cache.store(&key, stored).await.expect("Store should succeed.");

		assert_eq!(
			cache
				.refresh_token_for(&user)
				.await
				.expect("Refresh lookup should succeed.")
				.as_ref()
				.map(Secret::expose),
			Some("rt-1")
		);
		assert_eq!(cache.accounts().await.expect("Accounts should list."), vec![account.clone()]);

		cache
			.forget_refresh_token(&user, &Secret::new("rt-1"))
			.await
			.expect("Forgetting should succeed.");

		assert!(cache.refresh_token_for(&user).await.expect("Lookup should succeed.").is_none());
		assert!(cache.lookup(&key).await.expect("Lookup should succeed.").is_some());
		assert_eq!(cache.remove_account(&account).await.expect("Removal should succeed."), 1);
		assert!(cache.accounts().await.expect("Accounts should list.").is_empty());
	}
}
