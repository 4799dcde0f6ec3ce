//! Per-site signin records.
//!
//! The registry owns the ordered collection of [`SigninRecord`]s stored in the
//! `local` scope. Every mutation is applied to a copy, persisted, and only
//! then committed to the in-memory cache, so a failed write never leaves the
//! cache ahead of storage.

use keyward_protocol::{Identifier, SigninRecord};
use keyward_runtime::{Storage, StorageError, StorageScope};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RegistryError;

#[cfg(test)]
mod tests;

pub const SIGNINS_KEY: &str = "signins";

/// Owner of the signin collection.
pub struct SigninRegistry {
	storage: Storage,
	records: Mutex<Option<Vec<SigninRecord>>>,
}

impl SigninRegistry {
	pub fn new(storage: Storage) -> Self {
		Self {
			storage,
			records: Mutex::new(None),
		}
	}

	/// Returns all records in insertion order.
	pub async fn list(&self) -> Result<Vec<SigninRecord>, RegistryError> {
		let mut records = self.records.lock().await;
		Ok(self.loaded(&mut records).await?.clone())
	}

	/// Records a completed sign-in on `domain`.
	pub async fn create(&self, domain: &str, identifier: Identifier, auto_signin: bool) -> Result<(SigninRecord, Vec<SigninRecord>), RegistryError> {
		let mut records = self.records.lock().await;
		let mut next = self.loaded(&mut records).await?.clone();

		let now = crate::now_ms();
		let record = SigninRecord {
			id: Uuid::new_v4().to_string(),
			domain: normalize_domain(domain),
			identifier,
			auto_signin,
			created_at: now,
			updated_at: now,
		};
		if record.auto_signin {
			clear_other_auto_signins(&mut next, &record.domain, &record.id);
		}
		next.push(record.clone());

		self.commit(&mut records, next.clone()).await?;
		info!(target = "keyward.registry", id = %record.id, domain = %record.domain, "signin created");
		Ok((record, next))
	}

	/// Removes the record with `id`.
	///
	/// Returns `false` and the unchanged collection when no record matches.
	pub async fn delete(&self, id: &str) -> Result<(bool, Vec<SigninRecord>), RegistryError> {
		let mut records = self.records.lock().await;
		let current = self.loaded(&mut records).await?;
		if !current.iter().any(|record| record.id == id) {
			debug!(target = "keyward.registry", %id, "delete of unknown signin ignored");
			return Ok((false, current.clone()));
		}

		let next: Vec<SigninRecord> = current.iter().filter(|record| record.id != id).cloned().collect();
		self.commit(&mut records, next.clone()).await?;
		info!(target = "keyward.registry", %id, "signin deleted");
		Ok((true, next))
	}

	/// Applies the mutable fields of `update` to the record with the same id.
	///
	/// Enabling auto-signin disables it on the other records of that domain.
	/// An unknown id leaves the collection unchanged.
	pub async fn set_auto_signin(&self, update: &SigninRecord) -> Result<Vec<SigninRecord>, RegistryError> {
		let mut records = self.records.lock().await;
		let mut next = self.loaded(&mut records).await?.clone();

		let Some(index) = next.iter().position(|record| record.id == update.id) else {
			debug!(target = "keyward.registry", id = %update.id, "auto-signin update for unknown signin ignored");
			return Ok(next);
		};

		let record = &mut next[index];
		record.auto_signin = update.auto_signin;
		record.identifier = update.identifier.clone();
		record.updated_at = crate::now_ms();
		let (domain, id, enabled) = (record.domain.clone(), record.id.clone(), record.auto_signin);
		if enabled {
			clear_other_auto_signins(&mut next, &domain, &id);
		}

		self.commit(&mut records, next.clone()).await?;
		info!(target = "keyward.registry", %id, auto_signin = enabled, "auto-signin updated");
		Ok(next)
	}

	/// The record allowed to sign in on `domain` without confirmation.
	pub async fn auto_signin_for(&self, domain: &str) -> Result<Option<SigninRecord>, RegistryError> {
		let domain = normalize_domain(domain);
		let mut records = self.records.lock().await;
		Ok(self
			.loaded(&mut records)
			.await?
			.iter()
			.find(|record| record.auto_signin && record.domain == domain)
			.cloned())
	}

	/// Bumps `updated_at` of the record with `id`. Returns whether it exists.
	pub async fn touch(&self, id: &str) -> Result<bool, RegistryError> {
		let mut records = self.records.lock().await;
		let mut next = self.loaded(&mut records).await?.clone();
		let Some(record) = next.iter_mut().find(|record| record.id == id) else {
			return Ok(false);
		};
		record.updated_at = crate::now_ms();
		self.commit(&mut records, next).await?;
		Ok(true)
	}

	async fn loaded<'a>(&self, records: &'a mut Option<Vec<SigninRecord>>) -> Result<&'a Vec<SigninRecord>, StorageError> {
		if records.is_none() {
			let stored = match self.storage.get_json::<Vec<SigninRecord>>(StorageScope::Local, SIGNINS_KEY).await {
				Ok(stored) => stored.unwrap_or_default(),
				Err(StorageError::Serde(err)) => {
					warn!(target = "keyward.registry", error = %err, "stored signins are malformed; starting empty");
					Vec::new()
				}
				Err(err) => return Err(err),
			};
			debug!(target = "keyward.registry", count = stored.len(), "loaded signins");
			*records = Some(stored);
		}
		Ok(records.get_or_insert_with(Vec::new))
	}

	async fn commit(&self, records: &mut Option<Vec<SigninRecord>>, next: Vec<SigninRecord>) -> Result<(), StorageError> {
		self.storage.set_json(StorageScope::Local, SIGNINS_KEY, &next).await?;
		*records = Some(next);
		Ok(())
	}
}

fn clear_other_auto_signins(records: &mut [SigninRecord], domain: &str, keep_id: &str) {
	for record in records.iter_mut().filter(|record| record.domain == domain && record.id != keep_id) {
		record.auto_signin = false;
	}
}

fn normalize_domain(domain: &str) -> String {
	domain.trim().trim_end_matches('.').to_ascii_lowercase()
}
