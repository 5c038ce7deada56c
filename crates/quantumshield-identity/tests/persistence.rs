//! Snapshot persistence through the file store

mod common;

use std::path::Path;
use std::sync::Arc;

use common::fast_config;
use quantumshield_crypto::InMemoryVault;
use quantumshield_identity::{
    FileIdentityStore, IdentityError, IdentityId, IdentityManager, IdentityStore,
};
use tempfile::TempDir;

fn file_manager(dir: impl AsRef<Path>) -> IdentityManager {
    IdentityManager::new(fast_config().with_key_store_path(dir.as_ref())).unwrap()
}

fn external_manager(dir: &TempDir, vault: Arc<InMemoryVault>) -> IdentityManager {
    IdentityManager::builder()
        .config(fast_config().with_external_signing(true))
        .store(Arc::new(FileIdentityStore::new(dir.path())))
        .external_signer(vault)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_persist_and_reload_in_fresh_manager() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    let alice = manager.create("Alice").unwrap();
    manager.persist(alice.id).await.unwrap();

    let restarted = file_manager(&dir);
    assert!(!restarted.contains(alice.id));
    let loaded = restarted.load(alice.id).await.unwrap();
    assert_eq!(loaded, alice);

    // Keys survive the round trip
    let sig = restarted.sign(alice.id, b"after restart").unwrap();
    assert!(manager.verify(&alice.signing_key, b"after restart", &sig).unwrap());

    let bob = manager.create("Bob").unwrap();
    let package = manager.hybrid().encrypt(&alice.kem_key, b"still yours", Some(bob.id)).unwrap();
    assert_eq!(restarted.hybrid().decrypt(alice.id, &package).unwrap(), b"still yours");
}

#[tokio::test]
async fn test_snapshot_format() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    let alice = manager.create("Alice").unwrap();
    manager.persist(alice.id).await.unwrap();

    let path = dir.path().join(format!("{}.json", alice.id));
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

    assert_eq!(json["id"], alice.id.to_string());
    assert_eq!(json["name"], "Alice");
    let created = json["created_at"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(created).is_ok());

    let signing = &json["signing_keys"];
    assert_eq!(signing["public"]["algorithm"], "ML-DSA-44");
    assert_eq!(signing["public"]["bytes"], alice.signing_key.to_hex());
    assert_eq!(signing["private"]["custody"], "local");
    let key = signing["private"]["key"].as_str().unwrap();
    assert!(key.chars().all(|c| c.is_ascii_hexdigit()));

    assert_eq!(json["kem_keys"]["public"]["algorithm"], "ML-KEM-512");
    assert_eq!(json["kem_keys"]["private"]["custody"], "local");
}

#[cfg(unix)]
#[tokio::test]
async fn test_snapshot_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    let alice = manager.create("Alice").unwrap();
    manager.persist(alice.id).await.unwrap();

    let path = dir.path().join(format!("{}.json", alice.id));
    let mode = std::fs::metadata(path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[tokio::test]
async fn test_external_snapshot_holds_handle_only() {
    let dir = TempDir::new().unwrap();
    let vault = Arc::new(InMemoryVault::new());
    let manager = external_manager(&dir, vault.clone());
    let alice = manager.create("Alice").unwrap();
    assert!(manager.status(alice.id).unwrap().externally_managed);
    manager.persist(alice.id).await.unwrap();

    let path = dir.path().join(format!("{}.json", alice.id));
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let private = &json["signing_keys"]["private"];
    assert_eq!(private["custody"], "external");
    assert!(private["handle"].as_str().unwrap().starts_with("vault-"));
    assert!(private.get("key").is_none());
    assert_eq!(json["kem_keys"]["private"]["custody"], "local");

    // A fresh manager bound to the same vault can sign again
    let restarted = external_manager(&dir, vault.clone());
    restarted.load(alice.id).await.unwrap();
    let sig = restarted.sign(alice.id, b"vault signed").unwrap();
    assert!(restarted.verify(&alice.signing_key, b"vault signed", &sig).unwrap());
    assert_eq!(vault.sign_count(), 1);
}

#[tokio::test]
async fn test_load_missing_is_not_found() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    assert!(matches!(
        manager.load(IdentityId::generate()).await,
        Err(IdentityError::IdentityNotFound(_))
    ));
}

#[tokio::test]
async fn test_corrupted_snapshot_is_serialization_error() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    let alice = manager.create("Alice").unwrap();
    manager.persist(alice.id).await.unwrap();

    let path = dir.path().join(format!("{}.json", alice.id));
    std::fs::write(&path, "{ \"id\": ").unwrap();

    let restarted = file_manager(&dir);
    assert!(matches!(
        restarted.load(alice.id).await,
        Err(IdentityError::Serialization(_))
    ));
    assert!(!restarted.contains(alice.id));
}

#[tokio::test]
async fn test_list_ids_ignores_stray_files() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    let alice = manager.create("Alice").unwrap();
    let bob = manager.create("Bob").unwrap();
    manager.persist(alice.id).await.unwrap();
    manager.persist(bob.id).await.unwrap();
    std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
    std::fs::write(dir.path().join("not-an-id.json"), "{}").unwrap();

    let store = FileIdentityStore::new(dir.path());
    let mut expected = vec![alice.id, bob.id];
    expected.sort();
    assert_eq!(store.list_ids().await.unwrap(), expected);
}

#[tokio::test]
async fn test_purge_removes_snapshot() {
    let dir = TempDir::new().unwrap();
    let manager = file_manager(&dir);
    let alice = manager.create("Alice").unwrap();
    manager.persist(alice.id).await.unwrap();

    manager.purge(alice.id).await.unwrap();
    assert!(!manager.contains(alice.id));
    assert!(!dir.path().join(format!("{}.json", alice.id)).exists());
    assert!(matches!(
        manager.purge(alice.id).await,
        Err(IdentityError::IdentityNotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_persist_and_load() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(file_manager(&dir));

    let mut tasks = Vec::new();
    for i in 0..8 {
        let manager = manager.clone();
        tasks.push(tokio::spawn(async move {
            let handle = manager.create(&format!("identity-{i}")).unwrap();
            manager.persist(handle.id).await.unwrap();
            let loaded = manager.load(handle.id).await.unwrap();
            assert_eq!(loaded, handle);
            let sig = manager.sign(handle.id, b"concurrent").unwrap();
            assert!(manager.verify(&handle.signing_key, b"concurrent", &sig).unwrap());
            handle.id
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap());
    }
    ids.sort();

    let store = FileIdentityStore::new(dir.path());
    assert_eq!(store.list_ids().await.unwrap(), ids);
    assert_eq!(manager.len(), 8);
}

/// Signers, a rotation mark and persists all racing on one identity
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_identity_under_concurrent_use() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(file_manager(&dir));
    let alice = manager.create("Alice").unwrap();
    manager.persist(alice.id).await.unwrap();

    let mut tasks = Vec::new();
    for signer in 0..4 {
        let manager = Arc::clone(&manager);
        let alice = alice.clone();
        tasks.push(tokio::spawn(async move {
            for round in 0..8 {
                let message = format!("signer {signer} round {round}");
                let sig = manager.sign(alice.id, message.as_bytes()).unwrap();
                assert!(manager.verify(&alice.signing_key, message.as_bytes(), &sig).unwrap());
                tokio::task::yield_now().await;
            }
        }));
    }

    let marker = Arc::clone(&manager);
    let id = alice.id;
    tasks.push(tokio::spawn(async move {
        tokio::task::yield_now().await;
        marker.mark_rotation_due(id).unwrap();
    }));

    for _ in 0..4 {
        let manager = Arc::clone(&manager);
        let alice = alice.clone();
        let path = dir.path().to_path_buf();
        tasks.push(tokio::spawn(async move {
            for _ in 0..4 {
                manager.persist(alice.id).await.unwrap();

                // every snapshot on disk is whole and still signs as alice
                let reader = file_manager(&path);
                let loaded = reader.load(alice.id).await.unwrap();
                assert_eq!(loaded.signing_key, alice.signing_key);
                assert_eq!(loaded.kem_key, alice.kem_key);
                let sig = reader.sign(alice.id, b"from snapshot").unwrap();
                assert!(reader.verify(&alice.signing_key, b"from snapshot", &sig).unwrap());
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    manager.persist(alice.id).await.unwrap();
    let restarted = file_manager(&dir);
    assert_eq!(restarted.load(alice.id).await.unwrap(), alice);
    assert!(restarted.status(alice.id).unwrap().needs_rotation);
    assert_eq!(
        std::fs::read_dir(dir.path()).unwrap().count(),
        1,
        "no temporary files left behind"
    );
}
