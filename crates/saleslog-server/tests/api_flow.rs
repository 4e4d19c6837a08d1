use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use chrono::{TimeZone, Utc};
use saleslog_core::api::{ApiError, HttpTaskApi, TaskApi};
use saleslog_core::store::{StoreError, SyncState, TaskStore, WriteFailurePolicy};
use saleslog_server::{AppState, router, serve};
use saleslog_shared::{ErrorBody, TaskCreate, TaskDto, TaskPatch, TaskStatus, TaskType};
use tempfile::TempDir;
use tokio::net::TcpListener;

async fn start_server() -> (String, TempDir) {
    let temp = tempfile::tempdir().expect("tempdir");
    let state = Arc::new(AppState::open(temp.path()).expect("state"));
    let app = router(state, "http://localhost:3000").expect("router");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(serve(listener, app, std::future::pending()));
    (format!("http://{addr}"), temp)
}

fn create(entity: &str, day: u32, task_type: TaskType) -> TaskCreate {
    let at = Utc
        .with_ymd_and_hms(2024, 1, day, 15, 0, 0)
        .single()
        .expect("valid date");
    TaskCreate {
        entity_name: entity.to_string(),
        date: at,
        time: at,
        phone_number: "+1 555 0100".to_string(),
        contact_person: "Dana".to_string(),
        note: None,
        task_type,
        status: None,
    }
}

#[tokio::test]
async fn store_round_trips_through_the_server() {
    let (base_url, _data) = start_server().await;
    let api = HttpTaskApi::new(&base_url, None).expect("client");
    let store = TaskStore::new(Arc::new(api), WriteFailurePolicy::Rollback);

    assert_eq!(store.load().await.expect("load"), 0);

    let acme = store
        .create(&create("Acme", 5, TaskType::Meeting))
        .await
        .expect("create");
    assert_eq!(acme.status, TaskStatus::Open);
    assert_eq!(acme.id.len(), 32);

    let closed = store.toggle_status(&acme.id).await.expect("toggle");
    assert_eq!(closed.status, TaskStatus::Closed);
    assert_eq!(store.sync_state(&acme.id), Some(SyncState::Confirmed));

    let noted = store
        .set_note(&acme.id, "send the deck")
        .await
        .expect("note");
    assert_eq!(noted.note.as_deref(), Some("send the deck"));

    let copy = store
        .duplicate(&acme.id)
        .await
        .expect("duplicate")
        .expect("copy created");
    assert_ne!(copy.id, acme.id);
    assert_eq!(copy.entity_name, "Acme");
    assert_eq!(copy.status, TaskStatus::Closed);
    assert_eq!(copy.note.as_deref(), Some("send the deck"));

    let updated = store
        .update(
            &copy.id,
            &TaskPatch {
                entity_name: Some("Globex".to_string()),
                task_type: Some(TaskType::VideoCall),
                ..TaskPatch::default()
            },
        )
        .await
        .expect("update");
    assert_eq!(updated.entity_name, "Globex");
    assert_eq!(updated.contact_person, "Dana");

    let fresh = TaskStore::new(
        Arc::new(HttpTaskApi::new(&base_url, None).expect("client")),
        WriteFailurePolicy::Rollback,
    );
    assert_eq!(fresh.load().await.expect("reload"), 2);
    let reloaded = fresh.get(&copy.id).expect("copy persisted");
    assert_eq!(reloaded.task_type, TaskType::VideoCall);
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let (base_url, _data) = start_server().await;
    let api = HttpTaskApi::new(&base_url, None).expect("client");

    let err = api
        .set_status("missing", TaskStatus::Closed)
        .await
        .expect_err("missing task");
    assert_eq!(err, ApiError::NotFound("Task not found".to_string()));

    let store = TaskStore::new(Arc::new(api), WriteFailurePolicy::Rollback);
    let err = store
        .update("missing", &TaskPatch::default())
        .await
        .expect_err("missing task");
    assert!(matches!(err, StoreError::Api(ApiError::NotFound(_))));
}

#[tokio::test]
async fn invalid_payloads_are_rejected_with_error_body() {
    let (base_url, _data) = start_server().await;
    let api = HttpTaskApi::new(&base_url, None).expect("client");

    let err = api
        .create(&create("   ", 5, TaskType::Call))
        .await
        .expect_err("blank entity");
    assert_eq!(
        err,
        ApiError::Rejected {
            status: 400,
            message: "Unable to save task".to_string(),
        }
    );

    let response = reqwest::Client::new()
        .post(format!("{base_url}/api/tasks"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("send");
    assert_eq!(response.status().as_u16(), 400);
    let body: ErrorBody =
        serde_json::from_str(&response.text().await.expect("body")).expect("error body");
    assert_eq!(body.error, "Unable to save task");

    let saved = api
        .create(&create("Initech", 6, TaskType::Call))
        .await
        .expect("create");
    let response = reqwest::Client::new()
        .put(format!("{base_url}/api/task/status/{}", saved.id))
        .header("content-type", "application/json")
        .body(r#"{"status":"Pending"}"#)
        .send()
        .await
        .expect("send");
    assert_eq!(response.status().as_u16(), 400);
    let body: ErrorBody =
        serde_json::from_str(&response.text().await.expect("body")).expect("error body");
    assert_eq!(body.error, "Failed to update task status");
}

/// A backend that serves one task until `garbled` is set, then answers the
/// list with a body that is not JSON; task creation always fails with a
/// plain-text 500.
async fn start_misbehaving_backend(garbled: Arc<AtomicBool>) -> String {
    async fn list(State(garbled): State<Arc<AtomicBool>>) -> (StatusCode, String) {
        if garbled.load(Ordering::SeqCst) {
            return (StatusCode::OK, "not json".to_string());
        }
        let at = Utc
            .with_ymd_and_hms(2024, 1, 5, 9, 0, 0)
            .single()
            .expect("valid date");
        let task = TaskDto {
            id: "t1".to_string(),
            entity_name: "Acme".to_string(),
            date: at,
            time: at,
            phone_number: String::new(),
            contact_person: String::new(),
            note: None,
            task_type: TaskType::Call,
            status: TaskStatus::Open,
        };
        let body = serde_json::to_string(&vec![task]).expect("encode list");
        (StatusCode::OK, body)
    }

    let app = Router::new()
        .route("/api/list", get(list))
        .route(
            "/api/tasks",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "  database offline\n") }),
        )
        .with_state(garbled);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(serve(listener, app, std::future::pending()));
    format!("http://{addr}")
}

#[tokio::test]
async fn malformed_list_body_is_a_decode_error_and_keeps_collection() {
    let garbled = Arc::new(AtomicBool::new(false));
    let base_url = start_misbehaving_backend(garbled.clone()).await;
    let api = HttpTaskApi::new(&base_url, None).expect("client");
    let store = TaskStore::new(Arc::new(api), WriteFailurePolicy::Rollback);

    assert_eq!(store.load().await.expect("first load"), 1);
    let before = store.snapshot();

    garbled.store(true, Ordering::SeqCst);
    let err = store.load().await.expect_err("garbled body");
    assert!(matches!(err, StoreError::Api(ApiError::Decode(_))));
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn plain_text_error_body_becomes_the_message() {
    let base_url = start_misbehaving_backend(Arc::new(AtomicBool::new(false))).await;
    let api = HttpTaskApi::new(&base_url, None).expect("client");

    let err = api
        .create(&create("Acme", 5, TaskType::Call))
        .await
        .expect_err("server error");
    assert_eq!(
        err,
        ApiError::Rejected {
            status: 500,
            message: "database offline".to_string(),
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_creates_are_all_persisted() {
    let (base_url, _data) = start_server().await;
    let api = Arc::new(HttpTaskApi::new(&base_url, None).expect("client"));

    let mut handles = Vec::new();
    for day in 1..=8 {
        let api = api.clone();
        handles.push(tokio::spawn(async move {
            api.create(&create(&format!("Client {day}"), day, TaskType::Meeting))
                .await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("create");
    }

    let tasks = api.list().await.expect("list");
    assert_eq!(tasks.len(), 8);
}
