//! Thread-safe in-memory [`TokenStore`], the broker's default backend.

// self
use crate::{
	_prelude::*,
	auth::CachedToken,
	cache::{self, CacheEntry, CacheKey, CachePartition, StoreError, StoreFuture, TokenStore},
};

type Slots = HashMap<String, CacheEntry>;
type StoreMap = Arc<RwLock<HashMap<CachePartition, Slots>>>;

/// Process-local storage keyed by partition, then by scope fingerprint.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of stored entries across all partitions.
	pub fn len(&self) -> usize {
		self.0.read().values().map(HashMap::len).sum()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn save_now(map: StoreMap, key: CacheKey, token: CachedToken) -> Result<(), StoreError> {
		let slot = key.slot();

		map.write()
			.entry(key.partition)
			.or_default()
			.insert(slot, CacheEntry { scope: key.scope, token });

		Ok(())
	}

	fn remove_now(map: StoreMap, key: CacheKey) -> Option<CachedToken> {
		let mut guard = map.write();
		let slots = guard.get_mut(&key.partition)?;
		let removed = slots.remove(&key.slot()).map(|entry| entry.token);

		if slots.is_empty() {
			guard.remove(&key.partition);
		}

		removed
	}
}
impl TokenStore for MemoryStore {
	fn save<'a>(&'a self, key: &'a CacheKey, token: CachedToken) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move { Self::save_now(map, key, token) })
	}

	fn entries<'a>(&'a self, partition: &'a CachePartition) -> StoreFuture<'a, Vec<CacheEntry>> {
		let entries = self
			.0
			.read()
			.get(partition)
			.map(|slots| slots.values().cloned().collect())
			.unwrap_or_default();

		Box::pin(async move { Ok(entries) })
	}

	fn remove<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<CachedToken>> {
		let map = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move { Ok(Self::remove_now(map, key)) })
	}

	fn remove_partition<'a>(&'a self, partition: &'a CachePartition) -> StoreFuture<'a, usize> {
		let removed = self.0.write().remove(partition).map(|slots| slots.len()).unwrap_or(0);

		Box::pin(async move { Ok(removed) })
	}

	fn partitions(&self) -> StoreFuture<'_, Vec<CachePartition>> {
		let partitions = self.0.read().keys().cloned().collect();

		Box::pin(async move { Ok(partitions) })
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		self.0.write().clear();

		Box::pin(async { Ok(()) })
	}

	fn prune(&self, now: OffsetDateTime) -> StoreFuture<'_, usize> {
		let pruned = cache::prune_expired(&mut self.0.write(), now);

		Box::pin(async move { Ok(pruned) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::{ClientId, ScopeSet, TenantId},
		cache::CacheSubject,
	};

	fn key(scopes: &[&str]) -> CacheKey {
		CacheKey::new(
			CachePartition::new(
				ClientId::new("client").expect("Client fixture should be valid."),
				TenantId::new("tenant").expect("Tenant fixture should be valid."),
				"https://login.microsoftonline.com/tenant",
				CacheSubject::App,
			),
			ScopeSet::new(scopes.iter().copied()).expect("Scope fixture should be valid."),
		)
	}

	fn token(key: &CacheKey, access: &str) -> CachedToken {
		CachedToken::builder(key.scope.clone())
			.access_token(access)
			.expires_in(Duration::hours(1))
			.build()
			.expect("Token fixture should build.")
	}

	#[tokio::test]
	async fn save_replaces_slot_whole() {
		let store = MemoryStore::default();
		let key = key(&["api"]);

		store.save(&key, token(&key, "first")).await.expect("First save should succeed.");
		store.save(&key, token(&key, "second")).await.expect("Second save should succeed.");

		let entries = store.entries(&key.partition).await.expect("Entries should load.");

		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].token.access_token.expose(), "second");
		assert_eq!(store.len(), 1);
	}

	#[tokio::test]
	async fn prune_keeps_refreshable_entries() {
		let store = MemoryStore::default();
		let api = key(&["api"]);
		let graph = key(&["graph"]);
		let mut refreshable = token(&graph, "g");

		refreshable.refresh_token = Some("rt".into());

		store.save(&api, token(&api, "a")).await.expect("Save should succeed.");
		store.save(&graph, refreshable).await.expect("Save should succeed.");

		let later = OffsetDateTime::now_utc() + Duration::hours(2);

		assert_eq!(store.prune(OffsetDateTime::now_utc()).await.expect("Prune should succeed."), 0);
		assert_eq!(store.prune(later).await.expect("Prune should succeed."), 1);
		assert_eq!(store.len(), 1);
		assert!(store.remove(&api).await.expect("Remove should succeed.").is_none());
	}

	#[tokio::test]
	async fn removing_last_slot_drops_partition() {
		let store = MemoryStore::default();
		let api = key(&["api"]);
		let graph = key(&["graph"]);

		store.save(&api, token(&api, "a")).await.expect("Save should succeed.");
		store.save(&graph, token(&graph, "g")).await.expect("Save should succeed.");

		assert!(store.remove(&api).await.expect("Remove should succeed.").is_some());
		assert_eq!(store.partitions().await.expect("Partitions should list.").len(), 1);
		assert!(store.remove(&graph).await.expect("Remove should succeed.").is_some());
		assert!(store.partitions().await.expect("Partitions should list.").is_empty());
		assert!(store.remove(&graph).await.expect("Remove should succeed.").is_none());
		assert!(store.is_empty());
	}
}
