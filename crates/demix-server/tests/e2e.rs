//! End-to-end flow over HTTP and a running worker loop

use axum::http::StatusCode;
use demix_common::payload::encode_audio;
use demix_common::types::{TrackPart, TRACKS_BUCKET, WORK_CHANNEL};
use demix_server::queue::JobQueue;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod common;
use common::{fake_part_bytes, FakeEngine, TestApp};

#[tokio::test]
async fn test_submit_process_and_download() {
    let app = TestApp::new().await;
    let audio = b"ID3 a tiny song".to_vec();

    // Submit
    let submitted = app
        .post_json("/apiv1/separate", json!({ "mp3": encode_audio(&audio) }))
        .await;
    assert_eq!(submitted.status, StatusCode::OK);
    let hash = submitted.json()["hash"].as_str().unwrap().to_string();

    // Pending in the queue
    let queue = app.get("/apiv1/queue").await.json();
    let pending = queue["queue"].as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].as_str().unwrap().contains(&hash));

    // Worker drains the queue
    let worker = app.worker(FakeEngine::all_parts());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { worker.run(cancel).await }
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while app.store.object_count(TRACKS_BUCKET) < TrackPart::ALL.len() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    cancel.cancel();
    let summary = handle.await.unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(app.queue.len(WORK_CHANNEL).await.unwrap(), 0);

    // Listed once per part
    let songs = app.get("/apiv1/fetch_songs").await.json();
    let entries = songs["songs"].as_array().unwrap();
    assert_eq!(entries.len(), 4);
    assert!(entries.iter().all(|e| e["hash"] == hash.as_str()));

    // Download the bass part
    let bass = app
        .get(&format!("/apiv1/track/{}/track?track=bass", hash))
        .await;
    assert_eq!(bass.status, StatusCode::OK);
    assert_eq!(bass.body, fake_part_bytes(TrackPart::Bass, &audio));

    // Remove it, then it is gone
    let removed = app
        .get(&format!("/apiv1/remove/{}/track?track=bass", hash))
        .await;
    assert_eq!(removed.status, StatusCode::OK);
    let again = app
        .get(&format!("/apiv1/track/{}/track?track=bass", hash))
        .await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
}
