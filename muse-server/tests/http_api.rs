//! End-to-end tests: a real server on a loopback port, driven by raw HTTP
//! and by the sync engine's HTTP adapter.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use muse_core::{NoteDraft, Tag};
use muse_db::test_helpers::{create_test_local_pool, create_test_remote_pool};
use muse_server::{AppState, create_router};
use muse_sync::{Confirmation, HttpRemoteStore, RemoteStore, ScanFilter, SyncEngine};
use serde_json::{Value, json};

const API_KEY: &str = "test-key";

async fn spawn_server(api_key: Option<&str>) -> (SocketAddr, Arc<AppState>) {
    let db = create_test_remote_pool().await.unwrap();
    let state = Arc::new(AppState::new(db, api_key.map(str::to_string)));
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

fn notes_url(addr: SocketAddr) -> String {
    format!("http://{addr}/notes")
}

fn http_store(addr: SocketAddr) -> Arc<HttpRemoteStore> {
    Arc::new(HttpRemoteStore::new(&notes_url(addr), Some(API_KEY), Duration::from_secs(5)).unwrap())
}

async fn remote_tags(addr: SocketAddr) -> Vec<Tag> {
    reqwest::Client::new()
        .get(format!("http://{addr}/tags"))
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health_needs_no_key_but_notes_do() {
    let (addr, _) = spawn_server(Some(API_KEY)).await;
    let client = reqwest::Client::new();

    let health = client.get(format!("http://{addr}/health")).send().await.unwrap();
    assert_eq!(health.status(), 200);

    let denied = client.get(notes_url(addr)).send().await.unwrap();
    assert_eq!(denied.status(), 403);
    let body: Value = denied.json().await.unwrap();
    assert!(body["error"].is_string());

    let wrong = client
        .get(notes_url(addr))
        .header("x-api-key", "nope")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), 403);

    let allowed = client
        .get(notes_url(addr))
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 200);
}

#[tokio::test]
async fn test_bad_requests_get_error_bodies() {
    let (addr, _) = spawn_server(None).await;
    let client = reqwest::Client::new();

    let unknown = client
        .post(notes_url(addr))
        .json(&json!({"action": "dropTable", "note": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 400);
    let body: Value = unknown.json().await.unwrap();
    assert!(body["error"].is_string());

    let empty = client
        .post(notes_url(addr))
        .json(&json!({"action": "saveNote", "note": {"title": "t", "content": "  "}}))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 400);

    let missing = client
        .get(format!("{}/note_missing", notes_url(addr)))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn test_cors_preflight() {
    let (addr, _) = spawn_server(Some(API_KEY)).await;

    let response = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, notes_url(addr))
        .header("origin", "http://localhost:5173")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type,x-api-key")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    let methods = headers["access-control-allow-methods"].to_str().unwrap();
    assert!(methods.contains("DELETE"));
}

#[tokio::test]
async fn test_save_sync_and_delete_over_http() {
    let (addr, _) = spawn_server(Some(API_KEY)).await;
    let store = http_store(addr);

    let client = reqwest::Client::new();
    let legacy: Value = client
        .post(notes_url(addr))
        .header("x-api-key", API_KEY)
        .json(&json!({"action": "saveNote", "note": {"title": "old", "content": "c", "tag": "x"}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(legacy["tagIds"], json!(["x"]));
    assert!(legacy.get("tag").is_none());
    let legacy_id = legacy["id"].as_str().unwrap().to_string();
    assert!(legacy_id.starts_with("note_"));

    let fetched = store.get(&legacy_id).await.unwrap().unwrap();
    assert_eq!(fetched.tag_ids, vec!["x".to_string()]);
    assert!(store.get("note_missing").await.unwrap().is_none());

    let page = store.scan(ScanFilter::ModifiedAfter(0)).await.unwrap();
    assert_eq!(page.notes.len(), 1);
    let sync_timestamp = page.sync_timestamp.unwrap();
    assert!(sync_timestamp >= fetched.updated_at - 1);

    let later = store
        .scan(ScanFilter::ModifiedAfter(sync_timestamp + 1))
        .await
        .unwrap();
    assert!(later.notes.is_empty());

    store.delete(&legacy_id).await.unwrap();
    store.delete(&legacy_id).await.unwrap();
    assert!(store.scan(ScanFilter::All).await.unwrap().notes.is_empty());
    assert!(remote_tags(addr).await.is_empty());
}

#[tokio::test]
async fn test_clients_share_tags_through_server() {
    let (addr, _) = spawn_server(Some(API_KEY)).await;

    let first = SyncEngine::new(create_test_local_pool().await.unwrap(), http_store(addr));
    let second = SyncEngine::new(create_test_local_pool().await.unwrap(), http_store(addr));

    let a = first
        .save_note(NoteDraft::new("A", "one").with_tags("work, urgent"))
        .await
        .unwrap();
    assert!(a.committed_remotely);
    second
        .save_note(NoteDraft::new("B", "two").with_tags("work"))
        .await
        .unwrap();

    let tags = remote_tags(addr).await;
    let work = tags.iter().find(|t| t.name == "work").unwrap();
    assert_eq!(work.note_count, 2);

    first.sync_notes().await.unwrap();
    let local = first.list_tags().await.unwrap();
    let local_work = local.iter().find(|t| t.name == "work").unwrap();
    assert_eq!(local_work.id, work.id);
    assert_eq!(local_work.note_count, 2);

    let outcome = first
        .delete_note(&a.note.id, Confirmation::Affirmed)
        .await
        .unwrap();
    assert!(outcome.committed_remotely);

    let tags = remote_tags(addr).await;
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].name, "work");
    assert_eq!(tags[0].note_count, 1);
}

#[tokio::test]
async fn test_unreachable_server_then_recovery() {
    let dead_addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let local = create_test_local_pool().await.unwrap();

    let offline = SyncEngine::new(local.clone(), http_store(dead_addr));
    let outcome = offline
        .save_note(NoteDraft::new("A", "written offline").with_tags("work"))
        .await
        .unwrap();
    assert!(outcome.committed_locally);
    assert!(!outcome.committed_remotely);
    assert!(!offline.sync_notes().await.unwrap().completed);
    assert_eq!(offline.watermark().await.unwrap(), 0);

    let (addr, _) = spawn_server(Some(API_KEY)).await;
    let online = SyncEngine::new(local, http_store(addr));
    let report = online.sync_notes().await.unwrap();
    assert!(report.completed);
    assert_eq!(report.pushed, 1);

    let local_tags = online.list_tags().await.unwrap();
    assert_eq!(local_tags.len(), 1);
    assert_eq!(local_tags[0].note_count, 1);

    let tags = remote_tags(addr).await;
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].note_count, 1);

    online.sync_notes().await.unwrap();
    assert_eq!(online.list_tags().await.unwrap()[0].note_count, 1);
}
