//! Controller identity persistence.
//!
//! The passcode and controller id are one record in the `session` scope, so
//! they are always written and removed together. The agent URL is not secret
//! and lives in the `local` scope.

use keyward_protocol::Passcode;
use keyward_runtime::{Storage, StorageError, StorageScope};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

pub const CREDENTIALS_KEY: &str = "credentials";
pub const AGENT_URL_KEY: &str = "agent-url";

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsRecord {
	#[serde(default)]
	passcode: Passcode,
	#[serde(default)]
	controller_id: String,
}

/// Everything needed to reconnect silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredentials {
	pub agent_url: Url,
	pub passcode: Passcode,
	pub controller_id: String,
}

/// Repository for the persisted controller identity.
#[derive(Debug, Clone)]
pub struct IdentityStore {
	storage: Storage,
}

impl IdentityStore {
	pub fn new(storage: Storage) -> Self {
		Self { storage }
	}

	/// Loads complete credentials.
	///
	/// Returns `None` unless passcode, controller id and agent URL are all
	/// present and non-empty. Malformed records are logged and ignored.
	pub async fn load(&self) -> Result<Option<StoredCredentials>, StorageError> {
		let Some(record) = self.load_record().await? else {
			return Ok(None);
		};
		if record.passcode.is_empty() || record.controller_id.trim().is_empty() {
			debug!(target = "keyward.identity", "stored credentials incomplete; ignoring");
			return Ok(None);
		}

		let Some(agent_url) = self.agent_url().await? else {
			debug!(target = "keyward.identity", "no stored agent url; cannot reconnect");
			return Ok(None);
		};

		Ok(Some(StoredCredentials {
			agent_url,
			passcode: record.passcode,
			controller_id: record.controller_id,
		}))
	}

	/// Persists passcode and controller id as one record, then the agent URL.
	///
	/// If the agent URL cannot be written, the previous record is put back so
	/// a failed save leaves stored credentials as they were.
	pub async fn save(&self, agent_url: &Url, passcode: &Passcode, controller_id: &str) -> Result<(), StorageError> {
		let previous = self.load_record().await?;
		let record = CredentialsRecord {
			passcode: passcode.clone(),
			controller_id: controller_id.to_string(),
		};
		self.storage.set_json(StorageScope::Session, CREDENTIALS_KEY, &record).await?;

		if let Err(err) = self.storage.set_json(StorageScope::Local, AGENT_URL_KEY, agent_url.as_str()).await {
			let restored = match &previous {
				Some(previous) => self.storage.set_json(StorageScope::Session, CREDENTIALS_KEY, previous).await,
				None => self.storage.remove(StorageScope::Session, CREDENTIALS_KEY).await,
			};
			if let Err(restore_err) = restored {
				warn!(target = "keyward.identity", error = %restore_err, "failed to restore previous credentials");
			}
			return Err(err);
		}

		debug!(target = "keyward.identity", %controller_id, "saved controller credentials");
		Ok(())
	}

	/// Removes passcode and controller id. The agent URL is kept.
	pub async fn clear(&self) -> Result<(), StorageError> {
		self.storage.remove(StorageScope::Session, CREDENTIALS_KEY).await
	}

	/// Last persisted controller id, if credentials are present.
	pub async fn controller_id(&self) -> Result<Option<String>, StorageError> {
		Ok(self
			.load_record()
			.await?
			.map(|record| record.controller_id)
			.filter(|id| !id.trim().is_empty()))
	}

	/// Last agent URL used for a successful connect.
	pub async fn agent_url(&self) -> Result<Option<Url>, StorageError> {
		let Some(raw) = self.storage.get_json::<String>(StorageScope::Local, AGENT_URL_KEY).await.or_else(ignore_malformed)? else {
			return Ok(None);
		};
		match Url::parse(&raw) {
			Ok(url) => Ok(Some(url)),
			Err(err) => {
				warn!(target = "keyward.identity", error = %err, "stored agent url is invalid; ignoring");
				Ok(None)
			}
		}
	}

	async fn load_record(&self) -> Result<Option<CredentialsRecord>, StorageError> {
		self.storage
			.get_json::<CredentialsRecord>(StorageScope::Session, CREDENTIALS_KEY)
			.await
			.or_else(ignore_malformed)
	}
}

fn ignore_malformed<T>(err: StorageError) -> Result<Option<T>, StorageError> {
	match err {
		StorageError::Serde(err) => {
			warn!(target = "keyward.identity", error = %err, "malformed identity record; ignoring");
			Ok(None)
		}
		other => Err(other),
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use async_trait::async_trait;
	use keyward_runtime::{MemoryStorage, StorageArea};
	use serde_json::{Value, json};

	use super::*;

	/// Storage whose `local` scope rejects writes.
	struct ReadOnlyLocal {
		inner: Arc<MemoryStorage>,
	}

	#[async_trait]
	impl StorageArea for ReadOnlyLocal {
		async fn get(&self, scope: StorageScope, key: &str) -> Result<Option<Value>, StorageError> {
			self.inner.get(scope, key).await
		}

		async fn set(&self, scope: StorageScope, key: &str, value: Value) -> Result<(), StorageError> {
			if scope == StorageScope::Local {
				return Err(StorageError::Backend("local area is read-only".into()));
			}
			self.inner.set(scope, key, value).await
		}

		async fn remove(&self, scope: StorageScope, key: &str) -> Result<(), StorageError> {
			self.inner.remove(scope, key).await
		}
	}

	fn read_only_local(inner: &Arc<MemoryStorage>) -> IdentityStore {
		IdentityStore::new(Storage::new(Arc::new(ReadOnlyLocal { inner: Arc::clone(inner) })))
	}

	fn agent_url() -> Url {
		Url::parse("http://example.com/agent").unwrap()
	}

	#[tokio::test]
	async fn save_then_load_round_trip() {
		let store = IdentityStore::new(Storage::in_memory());
		store.save(&agent_url(), &Passcode::new("test-passcode"), "test-controller-id").await.unwrap();

		let creds = store.load().await.unwrap().expect("credentials should load");
		assert_eq!(creds.agent_url, agent_url());
		assert_eq!(creds.passcode.expose(), "test-passcode");
		assert_eq!(creds.controller_id, "test-controller-id");
	}

	#[tokio::test]
	async fn dangling_controller_id_is_not_credentials() {
		let storage = Storage::in_memory();
		storage
			.set_json(StorageScope::Session, CREDENTIALS_KEY, &json!({ "controllerId": "test-controller-id" }))
			.await
			.unwrap();
		storage.set_json(StorageScope::Local, AGENT_URL_KEY, "http://example.com/agent").await.unwrap();

		let store = IdentityStore::new(storage);
		assert_eq!(store.load().await.unwrap(), None);
	}

	#[tokio::test]
	async fn clear_keeps_agent_url() {
		let store = IdentityStore::new(Storage::in_memory());
		store.save(&agent_url(), &Passcode::new("p"), "c").await.unwrap();
		store.clear().await.unwrap();

		assert_eq!(store.load().await.unwrap(), None);
		assert_eq!(store.controller_id().await.unwrap(), None);
		assert_eq!(store.agent_url().await.unwrap(), Some(agent_url()));
	}

	#[tokio::test]
	async fn malformed_record_loads_as_none() {
		let storage = Storage::in_memory();
		storage.set_json(StorageScope::Session, CREDENTIALS_KEY, &json!(["not", "a", "record"])).await.unwrap();
		let store = IdentityStore::new(storage);
		assert_eq!(store.load().await.unwrap(), None);
	}

	#[tokio::test]
	async fn failed_url_write_keeps_previous_credentials() {
		let inner = MemoryStorage::new();
		let plain = IdentityStore::new(Storage::new(inner.clone()));
		plain.save(&agent_url(), &Passcode::new("old-passcode"), "old-controller").await.unwrap();

		let other = Url::parse("http://other.example/agent").unwrap();
		let err = read_only_local(&inner).save(&other, &Passcode::new("new-passcode"), "new-controller").await.unwrap_err();
		assert!(matches!(err, StorageError::Backend(_)));

		let creds = plain.load().await.unwrap().expect("previous credentials should remain");
		assert_eq!(creds.passcode.expose(), "old-passcode");
		assert_eq!(creds.controller_id, "old-controller");
		assert_eq!(creds.agent_url, agent_url());
	}

	#[tokio::test]
	async fn failed_first_save_stores_nothing() {
		let inner = MemoryStorage::new();
		let store = read_only_local(&inner);

		assert!(store.save(&agent_url(), &Passcode::new("p"), "c").await.is_err());
		assert_eq!(store.controller_id().await.unwrap(), None);
		assert!(inner.is_empty());
	}
}
