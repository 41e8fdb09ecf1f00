use std::time::Duration;

use tempfile::TempDir;
use zonegate::crypto::MasterKey;
use zonegate::db::{CredentialStore, SqliteStore, StoreConfig, StoreError};
use zonegate::permissions::NewPermission;

const RAW_KEY: &str = "0123456789abcdef0123456789abcdef";

fn master_key() -> MasterKey {
    MasterKey::parse(RAW_KEY).unwrap()
}

async fn memory_store() -> SqliteStore {
    SqliteStore::open(&StoreConfig::in_memory(), master_key())
        .await
        .unwrap()
}

fn txt_anywhere() -> NewPermission {
    NewPermission {
        zone_id: 0,
        record_types: vec!["TXT".into()],
        allowed_actions: vec![],
    }
}

#[tokio::test]
async fn scoped_token_resolves_with_its_permissions() {
    let store = memory_store().await;
    let token = store.create_token("acme ci", "zg_scoped", false).await.unwrap();
    let perm = store.add_permission(token.id, txt_anywhere()).await.unwrap();

    let key = store.lookup_key("zg_scoped").await.unwrap();
    assert_eq!(key.key_id, token.id);
    assert_eq!(key.key_name, "acme ci");
    assert!(!key.is_admin);
    assert!(!key.is_master);
    assert_eq!(key.permissions, vec![perm]);

    assert_eq!(store.get_token(token.id).await.unwrap(), token);
    assert_eq!(store.list_tokens().await.unwrap(), vec![token]);
}

#[tokio::test]
async fn unknown_and_near_miss_keys_are_not_found() {
    let store = memory_store().await;
    store.create_token("ci", "zg_scoped", false).await.unwrap();

    for presented in ["zg_scope", "zg_scoped0", "ZG_SCOPED", "nope"] {
        assert!(matches!(
            store.lookup_key(presented).await,
            Err(StoreError::NotFound)
        ));
    }
}

#[tokio::test]
async fn admin_tokens_resolve_to_full_access() {
    let store = memory_store().await;
    let admin = store.create_token("ops", "zg_admin", true).await.unwrap();
    let key = store.lookup_key("zg_admin").await.unwrap();
    assert!(key.is_admin);
    assert!(!key.is_master);
    assert_eq!(key.permissions.len(), 1);
    assert_eq!(key.permissions[0].zone_id, 0);
    assert!(key.permissions[0].record_types.is_empty());
    assert!(store.has_admin_token().await.unwrap());
    assert_eq!(key.key_id, admin.id);
}

#[tokio::test]
async fn duplicate_secrets_are_rejected() {
    let store = memory_store().await;
    store.create_token("one", "zg_same", false).await.unwrap();
    assert!(matches!(
        store.create_token("two", "zg_same", false).await,
        Err(StoreError::Duplicate)
    ));
}

#[tokio::test]
async fn deleting_a_token_cascades_to_its_permissions() {
    let store = memory_store().await;
    let token = store.create_token("ci", "zg_scoped", false).await.unwrap();
    store.add_permission(token.id, txt_anywhere()).await.unwrap();
    store
        .add_permission(
            token.id,
            NewPermission {
                zone_id: 42,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    store.delete_token(token.id).await.unwrap();

    let (remaining,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM permissions")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(remaining, 0);
    assert!(matches!(
        store.list_permissions(token.id).await,
        Err(StoreError::NotFound)
    ));
    assert!(matches!(
        store.delete_token(token.id).await,
        Err(StoreError::NotFound)
    ));
}

#[tokio::test]
async fn permissions_can_be_listed_and_removed() {
    let store = memory_store().await;
    let token = store.create_token("ci", "zg_scoped", false).await.unwrap();
    let first = store.add_permission(token.id, txt_anywhere()).await.unwrap();
    let second = store
        .add_permission(
            token.id,
            NewPermission {
                zone_id: 7,
                record_types: vec!["A".into(), "AAAA".into()],
                allowed_actions: vec!["add_record".into(), "delete_record".into()],
            },
        )
        .await
        .unwrap();

    assert_eq!(
        store.list_permissions(token.id).await.unwrap(),
        vec![first.clone(), second.clone()]
    );

    store.remove_permission(first.id).await.unwrap();
    assert_eq!(store.list_permissions(token.id).await.unwrap(), vec![second]);
    assert!(matches!(
        store.remove_permission(first.id).await,
        Err(StoreError::NotFound)
    ));
}

#[tokio::test]
async fn permission_input_is_validated() {
    let store = memory_store().await;
    let token = store.create_token("ci", "zg_scoped", false).await.unwrap();

    let bad = [
        NewPermission {
            zone_id: -1,
            ..Default::default()
        },
        NewPermission {
            zone_id: 1,
            record_types: vec!["ANY".into()],
            ..Default::default()
        },
        NewPermission {
            zone_id: 1,
            allowed_actions: vec!["delete_zone".into()],
            ..Default::default()
        },
    ];
    for perm in bad {
        assert!(matches!(
            store.add_permission(token.id, perm).await,
            Err(StoreError::Invalid(_))
        ));
    }
    assert!(matches!(
        store.add_permission(9999, txt_anywhere()).await,
        Err(StoreError::NotFound)
    ));
}

#[tokio::test]
async fn master_credential_is_encrypted_at_rest() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("zonegate.db");
    let store = SqliteStore::open(&StoreConfig::file(&path), master_key())
        .await
        .unwrap();

    let record = store.create_master_if_absent("real-upstream-key").await.unwrap();
    assert!(record.created);

    let rows: Vec<(String, String, Option<String>)> =
        sqlx::query_as("SELECT name, key_hash, secret_ciphertext FROM tokens")
            .fetch_all(store.pool())
            .await
            .unwrap();
    assert_eq!(rows.len(), 1);
    for (name, hash, sealed) in &rows {
        assert!(!name.contains("real-upstream-key"));
        assert!(!hash.contains("real-upstream-key"));
        let sealed = sealed.as_deref().unwrap();
        assert!(!sealed.contains("real-upstream-key"));
    }
    store.close().await.unwrap();

    let raw = std::fs::read(&path).unwrap();
    assert!(
        !raw.windows(b"real-upstream-key".len())
            .any(|w| w == b"real-upstream-key")
    );

    let reopened = SqliteStore::open(&StoreConfig::file(&path), master_key())
        .await
        .unwrap();
    assert_eq!(
        reopened.get_master_api_key().await.unwrap(),
        "real-upstream-key"
    );
    let key = reopened.lookup_key("real-upstream-key").await.unwrap();
    assert!(key.is_master);
    assert!(key.is_admin);
}

#[tokio::test]
async fn wrong_master_key_cannot_read_the_credential() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("zonegate.db");
    let store = SqliteStore::open(&StoreConfig::file(&path), master_key())
        .await
        .unwrap();
    store.create_master_if_absent("real-upstream-key").await.unwrap();
    store.close().await.unwrap();

    let other = MasterKey::parse("fedcba9876543210fedcba9876543210").unwrap();
    let reopened = SqliteStore::open(&StoreConfig::file(&path), other)
        .await
        .unwrap();
    let err = reopened.get_master_api_key().await.unwrap_err();
    assert!(matches!(err, StoreError::Crypto(_)));
    assert!(err.is_unavailable());
    assert!(matches!(
        reopened.lookup_key("real-upstream-key").await,
        Err(StoreError::NotFound)
    ));
}

#[tokio::test]
async fn master_key_is_not_found_before_bootstrap() {
    let store = memory_store().await;
    let err = store.get_master_api_key().await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound));
    assert!(!err.is_unavailable());
}

#[tokio::test]
async fn master_row_is_protected() {
    let store = memory_store().await;
    let record = store.create_master_if_absent("real-upstream-key").await.unwrap();

    assert!(matches!(
        store.delete_token(record.token.id).await,
        Err(StoreError::Invalid(_))
    ));
    assert!(matches!(
        store.add_permission(record.token.id, txt_anywhere()).await,
        Err(StoreError::Invalid(_))
    ));
    // the master is not an admin token for bootstrap-state purposes
    assert!(!store.has_admin_token().await.unwrap());
}

#[tokio::test]
async fn closed_store_fails_every_operation() {
    let store = memory_store().await;
    store.ping().await.unwrap();
    assert!(!store.is_closed());

    store.close().await.unwrap();
    store.close().await.unwrap();
    assert!(store.is_closed());

    assert!(matches!(store.ping().await, Err(StoreError::Closed)));
    assert!(matches!(
        store.lookup_key("zg_any").await,
        Err(StoreError::Closed)
    ));
    assert!(matches!(
        store.get_master_api_key().await,
        Err(StoreError::Closed)
    ));
    assert!(matches!(store.list_tokens().await, Err(StoreError::Closed)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn operations_are_bounded_by_the_timeout() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        op_timeout: Duration::from_millis(200),
        ..StoreConfig::file(dir.path().join("zonegate.db"))
    };
    let store = SqliteStore::open(&config, master_key()).await.unwrap();

    // hold the write lock from another connection
    let mut blocker = store.pool().acquire().await.unwrap();
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut *blocker)
        .await
        .unwrap();

    let err = store
        .create_token("ci", "zg_scoped", false)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Timeout(_)));
    assert!(err.is_unavailable());

    sqlx::query("ROLLBACK")
        .execute(&mut *blocker)
        .await
        .unwrap();
}
