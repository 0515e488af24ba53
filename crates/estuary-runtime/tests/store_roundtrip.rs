//! Integration test: round-trip laws over both shipped adapters.
//!
//! create → find, batch create → find_all, define → describe, the compound
//! defaults, and persistence across reopening a filesystem-backed store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use estuary_core::schema::{augment, AttributeType, DeclaredAttributes, CREATED_AT};
use estuary_core::types::Record;
use estuary_core::StoreConfig;
use estuary_runtime::{Store, SyncStrategy};
use estuary_storage::{LocalAdapter, MemoryAdapter};

fn record(value: serde_json::Value) -> Record {
    value.as_object().cloned().unwrap()
}

fn user_declaration() -> DeclaredAttributes {
    [
        ("name".to_string(), AttributeType::String.into()),
        ("age".to_string(), AttributeType::Integer.into()),
    ]
    .into()
}

async fn memory_store() -> Store {
    let store = Store::new(Arc::new(MemoryAdapter::new()), StoreConfig::default());
    store.initialize().await.unwrap();
    store
}

async fn local_store(dir: &std::path::Path) -> Store {
    let adapter = LocalAdapter::new(dir).await.unwrap();
    let store = Store::new(
        Arc::new(adapter),
        StoreConfig::new().lock_poll_interval(Duration::from_millis(5)),
    );
    store.initialize().await.unwrap();
    store
}

#[tokio::test]
async fn test_create_then_find_by_primary_key() {
    let store = memory_store().await;
    store.define("users", &user_declaration()).await.unwrap();

    let created = store
        .create("users", record(json!({"name": "ada", "age": 36})))
        .await
        .unwrap();
    let id = created["id"].as_u64().unwrap();

    let found = store.find("users", id).await.unwrap().unwrap();
    assert_eq!(found, created);
    assert_eq!(found["name"], json!("ada"));
    assert!(found.contains_key(CREATED_AT));
}

#[tokio::test]
async fn test_create_each_then_find_all() {
    let store = memory_store().await;
    store.define("users", &user_declaration()).await.unwrap();

    let batch = vec![
        record(json!({"name": "ada"})),
        record(json!({"name": "bob"})),
        record(json!({"name": "cyd"})),
    ];
    let created = store.create_each("users", batch).await.unwrap();
    assert_eq!(created.len(), 3);

    let all = store.find_all("users", ()).await.unwrap();
    assert_eq!(all.len(), 3);
    for name in ["ada", "bob", "cyd"] {
        assert!(all.iter().any(|r| r["name"] == json!(name)));
    }
}

#[tokio::test]
async fn test_define_then_describe_matches_augmented_declaration() {
    let store = memory_store().await;
    let declared = user_declaration();
    store.define("users", &declared).await.unwrap();

    let described = store.describe("users").await.unwrap().unwrap();
    assert_eq!(described, augment(&declared, store.config()));
}

#[tokio::test]
async fn test_find_or_create_returns_existing() {
    let store = memory_store().await;
    store.define("users", &user_declaration()).await.unwrap();

    let first = store
        .find_or_create(
            "users",
            json!({"name": "ada"}),
            Some(record(json!({"name": "ada", "age": 36}))),
        )
        .await
        .unwrap();
    let second = store
        .find_or_create(
            "users",
            json!({"name": "ada"}),
            Some(record(json!({"name": "ada", "age": 99}))),
        )
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(second["age"], json!(36));
    assert_eq!(store.count("users", ()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_find_or_create_uses_where_clause_as_values() {
    let store = memory_store().await;
    store.define("users", &user_declaration()).await.unwrap();

    let created = store
        .find_or_create("users", json!({"name": "ada"}), None)
        .await
        .unwrap();
    assert_eq!(created["name"], json!("ada"));
    assert_eq!(store.count("users", ()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_find_or_create_each_skips_existing() {
    let store = memory_store().await;
    store.define("users", &user_declaration()).await.unwrap();
    store
        .create("users", record(json!({"name": "ada", "age": 36})))
        .await
        .unwrap();

    let attrs_to_check = vec!["name".to_string()];
    let results = store
        .find_or_create_each(
            "users",
            &attrs_to_check,
            vec![
                record(json!({"name": "ada", "age": 99})),
                record(json!({"name": "bob", "age": 25})),
            ],
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    // "ada" already existed; her age is untouched.
    assert_eq!(results[0]["age"], json!(36));
    assert_eq!(results[1]["name"], json!("bob"));
    assert_eq!(store.count("users", ()).await.unwrap(), 2);
}

#[tokio::test]
async fn test_local_adapter_end_to_end() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = local_store(tmp.path()).await;

    store.define("users", &user_declaration()).await.unwrap();
    store
        .create_each(
            "users",
            vec![
                record(json!({"name": "ada", "age": 36})),
                record(json!({"name": "bob", "age": 25})),
            ],
        )
        .await
        .unwrap();

    let found = store
        .find("users", json!({"name": "ada"}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found["age"], json!(36));

    store.destroy("users", json!({"name": "bob"})).await.unwrap();
    assert_eq!(store.count("users", ()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_local_store_survives_reopen() {
    let tmp = tempfile::TempDir::new().unwrap();
    {
        let store = local_store(tmp.path()).await;
        store.define("users", &user_declaration()).await.unwrap();
        store
            .create("users", record(json!({"name": "ada"})))
            .await
            .unwrap();
    }

    // A fresh store over the same directory sees everything.
    let store = local_store(tmp.path()).await;
    let all = store.find_all("users", ()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["name"], json!("ada"));
    assert!(store.describe("users").await.unwrap().is_some());
}

#[tokio::test]
async fn test_sync_alter_adds_attributes_on_local() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = local_store(tmp.path()).await;

    store
        .sync("users", &user_declaration(), SyncStrategy::Alter)
        .await
        .unwrap();
    store
        .create("users", record(json!({"name": "ada"})))
        .await
        .unwrap();

    // Two additions land in the same alter, so the adapter sees them
    // concurrently; both must survive.
    let mut target = user_declaration();
    target.insert("email".to_string(), AttributeType::String.into());
    target.insert("nickname".to_string(), AttributeType::String.into());
    store.sync("users", &target, SyncStrategy::Alter).await.unwrap();

    let attrs = store.describe("users").await.unwrap().unwrap();
    assert!(attrs.contains_key("email"));
    assert!(attrs.contains_key("nickname"));
    assert!(attrs.contains_key("name"));
    // Existing records survive.
    assert_eq!(store.count("users", ()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_lock_excludes_across_stores_sharing_a_directory() {
    let tmp = tempfile::TempDir::new().unwrap();

    // Two store instances with independent lock managers, sharing only the
    // backing directory — the shape of two processes on one store.
    let store_a = Arc::new(local_store(tmp.path()).await);
    let store_b = Arc::new(local_store(tmp.path()).await);

    let in_section = Arc::new(AtomicBool::new(false));
    let tasks: Vec<_> = [store_a, store_b]
        .into_iter()
        .map(|store| {
            let in_section = Arc::clone(&in_section);
            tokio::spawn(async move {
                store
                    .transaction("shared", || async {
                        assert!(
                            !in_section.swap(true, Ordering::SeqCst),
                            "critical sections overlapped across stores"
                        );
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        in_section.store(false, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }
}
