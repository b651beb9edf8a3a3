//! S3/MinIO storage backend tests
//!
//! **Requirements**:
//! - MinIO or S3 must be running and accessible
//! - S3_ENDPOINT environment variable must be set (e.g., "http://localhost:9000")
//! - Tests will be skipped if S3_ENDPOINT is not configured
//!
//! **Running tests**:
//! ```bash
//! # With MinIO running via docker-compose
//! cargo test --test storage_tests
//! ```

use demix_server::storage::{config::StorageConfig, ObjectStore, S3Storage};
use futures::TryStreamExt;
use std::time::{SystemTime, UNIX_EPOCH};

const TEST_BUCKET: &str = "demix-storage-tests";

/// Setup helper that creates a store if MinIO is available
async fn setup_storage() -> Option<S3Storage> {
    if std::env::var("S3_ENDPOINT").is_err() {
        return None;
    }

    let storage = S3Storage::new(StorageConfig::from_env());
    match storage.ensure_bucket(TEST_BUCKET).await {
        Ok(_) => Some(storage),
        Err(e) => {
            eprintln!("Failed to reach storage: {}", e);
            None
        },
    }
}

/// Helper to generate a unique test key prefix
fn test_prefix(test_name: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("test/{}/{}", test_name, nanos)
}

#[tokio::test]
async fn test_ensure_bucket_is_idempotent() {
    let Some(storage) = setup_storage().await else {
        println!("Skipping test: S3_ENDPOINT not configured");
        return;
    };

    // setup_storage already created it
    assert!(!storage.ensure_bucket(TEST_BUCKET).await.unwrap());
    storage.ping().await.unwrap();
}

#[tokio::test]
async fn test_put_get_overwrite() {
    let Some(storage) = setup_storage().await else {
        println!("Skipping test: S3_ENDPOINT not configured");
        return;
    };
    let key = format!("{}/bass.mp3", test_prefix("put_get"));

    storage
        .put(TEST_BUCKET, &key, b"first".to_vec(), Some("audio/mpeg"))
        .await
        .unwrap();
    storage
        .put(TEST_BUCKET, &key, b"second".to_vec(), Some("audio/mpeg"))
        .await
        .unwrap();

    assert_eq!(storage.get(TEST_BUCKET, &key).await.unwrap(), b"second");
    assert!(storage.exists(TEST_BUCKET, &key).await.unwrap());

    storage.delete(TEST_BUCKET, &key).await.unwrap();
    assert!(!storage.exists(TEST_BUCKET, &key).await.unwrap());
}

#[tokio::test]
async fn test_missing_objects_are_not_found() {
    let Some(storage) = setup_storage().await else {
        println!("Skipping test: S3_ENDPOINT not configured");
        return;
    };
    let key = format!("{}/nothing.mp3", test_prefix("missing"));

    let get_err = storage.get(TEST_BUCKET, &key).await.unwrap_err();
    assert!(get_err.is_not_found());

    let delete_err = storage.delete(TEST_BUCKET, &key).await.unwrap_err();
    assert!(delete_err.is_not_found());
}

#[tokio::test]
async fn test_list_by_prefix() {
    let Some(storage) = setup_storage().await else {
        println!("Skipping test: S3_ENDPOINT not configured");
        return;
    };
    let prefix = test_prefix("list");

    for (part, size) in [("drums", 3), ("bass", 5)] {
        storage
            .put(TEST_BUCKET, &format!("{}/{}.mp3", prefix, part), vec![1; size], None)
            .await
            .unwrap();
    }

    let listed = storage.list(TEST_BUCKET, Some(&prefix)).await.unwrap();
    let keys: Vec<_> = listed.iter().map(|o| o.key.clone()).collect();
    assert_eq!(
        keys,
        vec![format!("{}/bass.mp3", prefix), format!("{}/drums.mp3", prefix)]
    );
    assert_eq!(listed[0].size, 5);

    for key in keys {
        storage.delete(TEST_BUCKET, &key).await.unwrap();
    }
}

#[tokio::test]
async fn test_file_transfers_and_streamed_reads() {
    let Some(storage) = setup_storage().await else {
        println!("Skipping test: S3_ENDPOINT not configured");
        return;
    };
    let key = format!("{}/vocals.mp3", test_prefix("streaming"));
    let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.mp3");
    tokio::fs::write(&source, &data).await.unwrap();

    let uploaded = storage
        .put_file(TEST_BUCKET, &key, &source, Some("audio/mpeg"))
        .await
        .unwrap();
    assert_eq!(uploaded.size, data.len() as i64);

    let chunks: Vec<_> = storage
        .get_stream(TEST_BUCKET, &key)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(chunks.concat(), data);

    let target = dir.path().join("target.mp3");
    let size = storage.get_to_file(TEST_BUCKET, &key, &target).await.unwrap();
    assert_eq!(size, data.len() as u64);
    assert_eq!(tokio::fs::read(&target).await.unwrap(), data);

    storage.delete(TEST_BUCKET, &key).await.unwrap();
}
