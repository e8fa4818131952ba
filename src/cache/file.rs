//! File-backed [`TokenStore`] that survives process restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::CachedToken,
	cache::{self, CacheEntry, CacheKey, CachePartition, StoreError, StoreFuture, TokenStore},
};

type Slots = HashMap<String, CacheEntry>;

#[derive(Serialize, Deserialize)]
struct StoredPartition {
	partition: CachePartition,
	entries: Vec<CacheEntry>,
}

/// Persists every mutation to a JSON snapshot, replaced atomically via rename.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<HashMap<CachePartition, Slots>>>,
}
impl FileStore {
	/// Opens (or creates) a store at `path`, eagerly loading an existing snapshot.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Snapshot location.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<CachePartition, Slots>, StoreError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(HashMap::new());
		}

		let stored: Vec<StoredPartition> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		Ok(stored
			.into_iter()
			.map(|stored| {
				let slots = stored
					.entries
					.into_iter()
					.map(|entry| (entry.scope.fingerprint(), entry))
					.collect();

				(stored.partition, slots)
			})
			.collect())
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &HashMap<CachePartition, Slots>) -> Result<(), StoreError> {
		let snapshot = contents
			.iter()
			.map(|(partition, slots)| StoredPartition {
				partition: partition.clone(),
				entries: slots.values().cloned().collect(),
			})
			.collect::<Vec<_>>();
		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	// Changes a copy and swaps it in only after the snapshot is on disk.
	fn mutate<T>(
		&self,
		f: impl FnOnce(&mut HashMap<CachePartition, Slots>) -> T,
	) -> Result<T, StoreError> {
		let mut guard = self.inner.write();
		let mut next = guard.clone();
		let output = f(&mut next);

		self.persist_locked(&next)?;

		*guard = next;

		Ok(output)
	}

	fn prune_now(&self, now: OffsetDateTime) -> Result<usize, StoreError> {
		let mut guard = self.inner.write();
		let mut next = guard.clone();
		let pruned = cache::prune_expired(&mut next, now);

		if pruned > 0 {
			self.persist_locked(&next)?;

			*guard = next;
		}

		Ok(pruned)
	}
}
impl TokenStore for FileStore {
	fn save<'a>(&'a self, key: &'a CacheKey, token: CachedToken) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.mutate(|map| {
				map.entry(key.partition.clone())
					.or_default()
					.insert(key.slot(), CacheEntry { scope: key.scope.clone(), token });
			})
		})
	}

	fn entries<'a>(&'a self, partition: &'a CachePartition) -> StoreFuture<'a, Vec<CacheEntry>> {
		Box::pin(async move {
			Ok(self
				.inner
				.read()
				.get(partition)
				.map(|slots| slots.values().cloned().collect())
				.unwrap_or_default())
		})
	}

	fn remove<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<CachedToken>> {
		Box::pin(async move {
			self.mutate(|map| {
				let slots = map.get_mut(&key.partition)?;
				let removed = slots.remove(&key.slot()).map(|entry| entry.token);

				if slots.is_empty() {
					map.remove(&key.partition);
				}

				removed
			})
		})
	}

	fn remove_partition<'a>(&'a self, partition: &'a CachePartition) -> StoreFuture<'a, usize> {
		Box::pin(async move {
			self.mutate(|map| map.remove(partition).map(|slots| slots.len()).unwrap_or(0))
		})
	}

	fn partitions(&self) -> StoreFuture<'_, Vec<CachePartition>> {
		Box::pin(async move { Ok(self.inner.read().keys().cloned().collect()) })
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.mutate(HashMap::clear) })
	}

	fn prune(&self, now: OffsetDateTime) -> StoreFuture<'_, usize> {
		Box::pin(async move { self.prune_now(now) })
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// self
	use super::*;
	use crate::{
		auth::{ClientId, ScopeSet, TenantId},
		cache::CacheSubject,
	};

	fn temp_path() -> PathBuf {
		let unique = format!(
			"oidc_broker_file_store_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	fn build_entry() -> (CacheKey, CachedToken) {
		let partition = CachePartition::new(
			ClientId::new("client-demo").expect("Failed to build client fixture."),
			TenantId::new("tenant-demo").expect("Failed to build tenant fixture."),
			"https://login.microsoftonline.com/tenant-demo",
			CacheSubject::App,
		);
		let scope = ScopeSet::new(["api://demo/.default"]).expect("Failed to build scope fixture.");
		let token = CachedToken::builder(scope.clone())
			.access_token("access-token")
			.refresh_token("refresh-token")
			.expires_in(Duration::hours(1))
			.build()
			.expect("Failed to build file-store test token.");

		(CacheKey::new(partition, scope), token)
	}

	#[tokio::test]
	async fn save_and_reload_round_trip() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let (key, token) = build_entry();

		store.save(&key, token.clone()).await.expect("Failed to save fixture token.");
		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let entries =
			reopened.entries(&key.partition).await.expect("Failed to read reopened entries.");

		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].token.access_token.expose(), token.access_token.expose());
		assert_eq!(
			entries[0].token.refresh_token.as_ref().map(|secret| secret.expose()),
			Some("refresh-token")
		);
		assert_eq!(entries[0].scope, key.scope);

		reopened.clear().await.expect("Failed to clear file store.");

		let cleared = FileStore::open(&path).expect("Failed to reopen cleared snapshot.");

		assert!(cleared.partitions().await.expect("Failed to list partitions.").is_empty());

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[tokio::test]
	async fn pruning_rewrites_the_snapshot() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let (key, mut token) = build_entry();

		token.refresh_token = None;

		store.save(&key, token).await.expect("Failed to save fixture token.");

		let later = OffsetDateTime::now_utc() + Duration::hours(2);

		assert_eq!(store.prune(later).await.expect("Failed to prune store."), 1);

		let reopened = FileStore::open(&path).expect("Failed to reopen pruned snapshot.");

		assert!(reopened.partitions().await.expect("Failed to list partitions.").is_empty());

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[tokio::test]
	async fn failed_writes_leave_memory_unchanged() {
		let dir = temp_path().with_extension("d");
		let store = FileStore::open(dir.join("store.json")).expect("Failed to open file store.");
		let (key, token) = build_entry();

		fs::remove_dir_all(&dir).expect("Failed to remove store directory.");

		assert!(matches!(store.save(&key, token).await, Err(StoreError::Backend { .. })));
		assert!(store.partitions().await.expect("Failed to list partitions.").is_empty());
	}

	#[test]
	fn corrupt_snapshot_is_a_serialization_error() {
		let path = temp_path();

		fs::write(&path, b"{not json").expect("Failed to write corrupt snapshot.");

		assert!(matches!(FileStore::open(&path), Err(StoreError::Serialization { .. })));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}
}
