//! Key/value storage areas.
//!
//! Mirrors the extension storage model: three scopes addressed by string key,
//! each holding JSON values. [`MemoryStorage`] keeps everything in memory;
//! [`FileStorage`] persists `local` and `sync` to one JSON file each and keeps
//! `session` in memory so it dies with the process.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Storage scope, matching the browser's storage areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageScope {
	Local,
	Session,
	Sync,
}

impl fmt::Display for StorageScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StorageScope::Local => write!(f, "local"),
			StorageScope::Session => write!(f, "session"),
			StorageScope::Sync => write!(f, "sync"),
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
	#[error("storage I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("stored value is not valid JSON for the requested type: {0}")]
	Serde(#[from] serde_json::Error),

	#[error("storage backend error: {0}")]
	Backend(String),
}

/// Async key/value access over the three scopes.
#[async_trait]
pub trait StorageArea: Send + Sync {
	async fn get(&self, scope: StorageScope, key: &str) -> Result<Option<Value>, StorageError>;

	async fn set(&self, scope: StorageScope, key: &str, value: Value) -> Result<(), StorageError>;

	/// Removes `key`. Removing a missing key is not an error.
	async fn remove(&self, scope: StorageScope, key: &str) -> Result<(), StorageError>;
}

/// Typed facade over a shared [`StorageArea`].
#[derive(Clone)]
pub struct Storage {
	area: Arc<dyn StorageArea>,
}

impl Storage {
	pub fn new(area: Arc<dyn StorageArea>) -> Self {
		Self { area }
	}

	/// Convenience constructor over a fresh [`MemoryStorage`].
	pub fn in_memory() -> Self {
		Self::new(Arc::new(MemoryStorage::default()))
	}

	pub async fn get_json<T: DeserializeOwned>(&self, scope: StorageScope, key: &str) -> Result<Option<T>, StorageError> {
		match self.area.get(scope, key).await? {
			Some(value) => Ok(Some(serde_json::from_value(value)?)),
			None => Ok(None),
		}
	}

	pub async fn set_json<T: Serialize + ?Sized>(&self, scope: StorageScope, key: &str, value: &T) -> Result<(), StorageError> {
		let value = serde_json::to_value(value)?;
		self.area.set(scope, key, value).await
	}

	pub async fn remove(&self, scope: StorageScope, key: &str) -> Result<(), StorageError> {
		self.area.remove(scope, key).await
	}

	/// Returns the underlying area.
	pub fn area(&self) -> &Arc<dyn StorageArea> {
		&self.area
	}
}

impl fmt::Debug for Storage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Storage").finish_non_exhaustive()
	}
}

/// In-memory storage for tests and hosts without persistence.
#[derive(Debug, Default)]
pub struct MemoryStorage {
	entries: Mutex<HashMap<(StorageScope, String), Value>>,
}

impl MemoryStorage {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Number of stored keys across all scopes.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}
}

#[async_trait]
impl StorageArea for MemoryStorage {
	async fn get(&self, scope: StorageScope, key: &str) -> Result<Option<Value>, StorageError> {
		Ok(self.entries.lock().get(&(scope, key.to_string())).cloned())
	}

	async fn set(&self, scope: StorageScope, key: &str, value: Value) -> Result<(), StorageError> {
		self.entries.lock().insert((scope, key.to_string()), value);
		Ok(())
	}

	async fn remove(&self, scope: StorageScope, key: &str) -> Result<(), StorageError> {
		self.entries.lock().remove(&(scope, key.to_string()));
		Ok(())
	}
}

type Area = BTreeMap<String, Value>;

/// File-backed storage rooted at a directory.
///
/// `local` and `sync` map to `local.json` and `sync.json`; each write rewrites
/// the whole file through a temp file and rename.
#[derive(Debug)]
pub struct FileStorage {
	dir: PathBuf,
	areas: tokio::sync::Mutex<HashMap<StorageScope, Area>>,
}

impl FileStorage {
	/// Opens (creating if needed) a storage directory.
	///
	/// Unreadable or corrupt area files are logged and treated as empty.
	pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
		let dir = dir.into();
		tokio::fs::create_dir_all(&dir).await?;

		let mut areas = HashMap::new();
		for scope in [StorageScope::Local, StorageScope::Sync] {
			let path = area_path(&dir, scope).ok_or_else(|| StorageError::Backend(format!("scope {scope} is not file-backed")))?;
			areas.insert(scope, load_area(&path).await);
		}
		areas.insert(StorageScope::Session, Area::new());

		Ok(Self {
			dir,
			areas: tokio::sync::Mutex::new(areas),
		})
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	async fn flush(&self, scope: StorageScope, area: &Area) -> Result<(), StorageError> {
		let Some(path) = area_path(&self.dir, scope) else {
			return Ok(());
		};
		let json = serde_json::to_vec_pretty(area)?;
		let tmp = path.with_extension("json.tmp");
		tokio::fs::write(&tmp, json).await?;
		tokio::fs::rename(&tmp, &path).await?;
		debug!(target = "keyward.storage", %scope, path = %path.display(), keys = area.len(), "flushed storage area");
		Ok(())
	}
}

#[async_trait]
impl StorageArea for FileStorage {
	async fn get(&self, scope: StorageScope, key: &str) -> Result<Option<Value>, StorageError> {
		let areas = self.areas.lock().await;
		Ok(areas.get(&scope).and_then(|area| area.get(key)).cloned())
	}

	async fn set(&self, scope: StorageScope, key: &str, value: Value) -> Result<(), StorageError> {
		let mut areas = self.areas.lock().await;
		let mut next = areas.get(&scope).cloned().unwrap_or_default();
		next.insert(key.to_string(), value);
		self.flush(scope, &next).await?;
		areas.insert(scope, next);
		Ok(())
	}

	async fn remove(&self, scope: StorageScope, key: &str) -> Result<(), StorageError> {
		let mut areas = self.areas.lock().await;
		let mut next = areas.get(&scope).cloned().unwrap_or_default();
		if next.remove(key).is_none() {
			return Ok(());
		}
		self.flush(scope, &next).await?;
		areas.insert(scope, next);
		Ok(())
	}
}

fn area_path(dir: &Path, scope: StorageScope) -> Option<PathBuf> {
	match scope {
		StorageScope::Local => Some(dir.join("local.json")),
		StorageScope::Sync => Some(dir.join("sync.json")),
		StorageScope::Session => None,
	}
}

async fn load_area(path: &Path) -> Area {
	let content = match tokio::fs::read_to_string(path).await {
		Ok(content) => content,
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Area::new(),
		Err(err) => {
			warn!(target = "keyward.storage", path = %path.display(), error = %err, "failed to read storage area; starting empty");
			return Area::new();
		}
	};
	serde_json::from_str(&content).unwrap_or_else(|err| {
		warn!(target = "keyward.storage", path = %path.display(), error = %err, "corrupt storage area; starting empty");
		Area::new()
	})
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use tempfile::TempDir;

	use super::*;

	#[tokio::test]
	async fn scopes_are_isolated() {
		let storage = Storage::in_memory();
		storage.set_json(StorageScope::Local, "k", &"local").await.unwrap();
		storage.set_json(StorageScope::Session, "k", &"session").await.unwrap();

		assert_eq!(storage.get_json::<String>(StorageScope::Local, "k").await.unwrap().as_deref(), Some("local"));
		assert_eq!(storage.get_json::<String>(StorageScope::Session, "k").await.unwrap().as_deref(), Some("session"));
		assert_eq!(storage.get_json::<String>(StorageScope::Sync, "k").await.unwrap(), None);
	}

	#[tokio::test]
	async fn remove_missing_key_is_ok() {
		let storage = Storage::in_memory();
		storage.remove(StorageScope::Local, "missing").await.unwrap();
	}

	#[tokio::test]
	async fn typed_get_reports_shape_mismatch() {
		let storage = Storage::in_memory();
		storage.set_json(StorageScope::Local, "n", &json!({ "not": "a number" })).await.unwrap();
		let err = storage.get_json::<u64>(StorageScope::Local, "n").await.unwrap_err();
		assert!(matches!(err, StorageError::Serde(_)));
	}

	#[tokio::test]
	async fn file_storage_persists_local_but_not_session() {
		let tmp = TempDir::new().unwrap();
		{
			let storage = FileStorage::open(tmp.path()).await.unwrap();
			storage.set(StorageScope::Local, "signins", json!([1, 2])).await.unwrap();
			storage.set(StorageScope::Session, "credentials", json!({ "passcode": "x" })).await.unwrap();
		}

		let reopened = FileStorage::open(tmp.path()).await.unwrap();
		assert_eq!(reopened.get(StorageScope::Local, "signins").await.unwrap(), Some(json!([1, 2])));
		assert_eq!(reopened.get(StorageScope::Session, "credentials").await.unwrap(), None);
		assert!(tmp.path().join("local.json").exists());
	}

	#[tokio::test]
	async fn file_storage_remove_rewrites_area() {
		let tmp = TempDir::new().unwrap();
		let storage = FileStorage::open(tmp.path()).await.unwrap();
		storage.set(StorageScope::Sync, "a", json!(1)).await.unwrap();
		storage.remove(StorageScope::Sync, "a").await.unwrap();

		let raw = std::fs::read_to_string(tmp.path().join("sync.json")).unwrap();
		let parsed: Value = serde_json::from_str(&raw).unwrap();
		assert_eq!(parsed, json!({}));
	}

	#[tokio::test]
	async fn corrupt_area_file_loads_empty() {
		let tmp = TempDir::new().unwrap();
		std::fs::write(tmp.path().join("local.json"), "{ not json").unwrap();
		let storage = FileStorage::open(tmp.path()).await.unwrap();
		assert_eq!(storage.get(StorageScope::Local, "anything").await.unwrap(), None);
	}
}
