use keyward_protocol::{Identifier, SigninRecord};
use keyward_runtime::{Storage, StorageScope};
use serde_json::json;

use super::*;

fn record(id: &str, domain: &str, auto_signin: bool) -> SigninRecord {
	SigninRecord {
		id: id.to_string(),
		domain: domain.to_string(),
		identifier: Identifier::new("alice", "EAlice"),
		auto_signin,
		created_at: 1,
		updated_at: 1,
	}
}

async fn seeded(records: &[SigninRecord]) -> (SigninRegistry, Storage) {
	let storage = Storage::in_memory();
	storage.set_json(StorageScope::Local, SIGNINS_KEY, records).await.unwrap();
	(SigninRegistry::new(storage.clone()), storage)
}

#[tokio::test]
async fn list_is_empty_without_stored_records() {
	let registry = SigninRegistry::new(Storage::in_memory());
	assert!(registry.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn list_preserves_insertion_order() {
	let (registry, _) = seeded(&[record("b", "y.com", false), record("a", "x.com", false)]).await;
	let ids: Vec<_> = registry.list().await.unwrap().into_iter().map(|r| r.id).collect();
	assert_eq!(ids, ["b", "a"]);

	let again: Vec<_> = registry.list().await.unwrap().into_iter().map(|r| r.id).collect();
	assert_eq!(ids, again);
}

#[tokio::test]
async fn delete_is_idempotent() {
	let (registry, storage) = seeded(&[record("a", "x.com", false), record("b", "x.com", false)]).await;

	let (deleted, remaining) = registry.delete("a").await.unwrap();
	assert!(deleted);
	assert_eq!(remaining, vec![record("b", "x.com", false)]);

	let (deleted, remaining) = registry.delete("a").await.unwrap();
	assert!(!deleted);
	assert_eq!(remaining, vec![record("b", "x.com", false)]);

	let stored: Vec<SigninRecord> = storage.get_json(StorageScope::Local, SIGNINS_KEY).await.unwrap().unwrap();
	assert_eq!(stored, remaining);
}

#[tokio::test]
async fn set_auto_signin_updates_matching_record() {
	let (registry, storage) = seeded(&[record("a", "x.com", false)]).await;

	let mut update = record("a", "x.com", true);
	update.domain = "ignored.example".into();
	let updated = registry.set_auto_signin(&update).await.unwrap();

	assert_eq!(updated.len(), 1);
	assert_eq!(updated[0].id, "a");
	assert_eq!(updated[0].domain, "x.com");
	assert!(updated[0].auto_signin);
	assert!(updated[0].updated_at > 1);

	let stored: Vec<SigninRecord> = storage.get_json(StorageScope::Local, SIGNINS_KEY).await.unwrap().unwrap();
	assert_eq!(stored, updated);
}

#[tokio::test]
async fn set_auto_signin_unknown_id_is_noop() {
	let original = vec![record("a", "x.com", false)];
	let (registry, _) = seeded(&original).await;

	let unchanged = registry.set_auto_signin(&record("zzz", "x.com", true)).await.unwrap();
	assert_eq!(unchanged, original);
	assert_eq!(registry.list().await.unwrap(), original);
}

#[tokio::test]
async fn enabling_auto_signin_disables_siblings_on_same_domain() {
	let (registry, _) = seeded(&[record("a", "x.com", true), record("b", "x.com", false), record("c", "y.com", true)]).await;

	let updated = registry.set_auto_signin(&record("b", "x.com", true)).await.unwrap();
	let flags: Vec<_> = updated.iter().map(|r| (r.id.as_str(), r.auto_signin)).collect();
	assert_eq!(flags, [("a", false), ("b", true), ("c", true)]);

	assert_eq!(registry.auto_signin_for("x.com").await.unwrap().map(|r| r.id), Some("b".to_string()));
}

#[tokio::test]
async fn create_appends_with_fresh_id() {
	let registry = SigninRegistry::new(Storage::in_memory());
	let (first, _) = registry.create("X.com", Identifier::new("alice", "EAlice"), false).await.unwrap();
	let (second, all) = registry.create("x.com", Identifier::new("bob", "EBob"), true).await.unwrap();

	assert_ne!(first.id, second.id);
	assert_eq!(first.domain, "x.com");
	assert_eq!(all.iter().map(|r| r.id.clone()).collect::<Vec<_>>(), vec![first.id, second.id.clone()]);
	assert_eq!(registry.auto_signin_for("x.com").await.unwrap().map(|r| r.id), Some(second.id));
}

#[tokio::test]
async fn touch_bumps_updated_at() {
	let (registry, _) = seeded(&[record("a", "x.com", false)]).await;
	assert!(registry.touch("a").await.unwrap());
	assert!(!registry.touch("missing").await.unwrap());
	assert!(registry.list().await.unwrap()[0].updated_at > 1);
}

#[tokio::test]
async fn malformed_storage_starts_empty() {
	let storage = Storage::in_memory();
	storage.set_json(StorageScope::Local, SIGNINS_KEY, &json!({ "not": "a list" })).await.unwrap();
	let registry = SigninRegistry::new(storage);
	assert!(registry.list().await.unwrap().is_empty());
}
