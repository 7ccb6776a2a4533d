//! In-process HTTP tests against the in-memory store and the mock backend.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use rinova_api::{build_router, ApiConfig, AppState};
use rinova_db::MemoryNoteRepository;
use rinova_inference::mock::MockGenerationBackend;
use rinova_inference::CodeExtractor;
use rinova_jobs::{ExtractionPipeline, MedicalNote, NewNote, NoteRepository, NoteStatus};

const E11_9: &str = r#"{"note_type":"Follow-up","icd10_codes":[{"code":"E11.9","description":"Type 2 diabetes","confidence":1.5}],"cpt_codes":[{"code":"","confidence":0.9}]}"#;

struct TestApp {
    repo: Arc<MemoryNoteRepository>,
    backend: MockGenerationBackend,
    router: Router,
}

impl TestApp {
    fn new(backend: MockGenerationBackend) -> Self {
        Self::with_config(backend, ApiConfig::default().with_rate_limit(false, 100, 60))
    }

    fn with_config(backend: MockGenerationBackend, config: ApiConfig) -> Self {
        let repo = Arc::new(MemoryNoteRepository::new());
        let extractor = CodeExtractor::new(Arc::new(backend.clone()));
        let pipeline = Arc::new(ExtractionPipeline::new(repo.clone(), extractor));
        let state = AppState::new(
            repo.clone(),
            repo.clone(),
            pipeline,
            Arc::new(backend.clone()),
            config,
        )
        .unwrap();
        Self {
            repo,
            backend,
            router: build_router(state),
        }
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(body)).await
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

fn stored(text: &str, status: NoteStatus, attempts: i32, age: Duration) -> MedicalNote {
    let created = Utc::now() - age;
    MedicalNote {
        id: Uuid::now_v7(),
        text: text.to_string(),
        source: "api".to_string(),
        patient_id: None,
        length: text.chars().count() as i32,
        status,
        extraction_attempts: attempts,
        last_attempt_at: (attempts > 0).then_some(created),
        last_error: None,
        extraction: None,
        created_at: created,
        updated_at: created,
    }
}

fn assert_envelope(body: &Value, code: u16) {
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["data"], Value::Null);
    assert_eq!(body["error"]["code"], json!(code));
    assert!(body["error"]["message"].as_str().is_some_and(|m| !m.is_empty()));
    assert!(body["error"]["timestamp"].is_string());
}

// =============================================================================
// EXTRACTION
// =============================================================================

#[tokio::test]
async fn test_extract_returns_sanitized_codes() {
    let app = TestApp::new(MockGenerationBackend::new().with_fixed_response(E11_9));

    let (status, body) = app
        .post("/api/v1/extract", json!({"medical_text": "Pt with DM2, A1c 7.2"}))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["error"], Value::Null);
    assert_eq!(body["data"]["note_type"], json!("follow-up"));
    assert_eq!(body["data"]["icd10_codes"][0]["code"], json!("E11.9"));
    assert_eq!(body["data"]["icd10_codes"][0]["confidence"], json!(1.0));
    assert_eq!(body["data"]["cpt_codes"], json!([]));

    let id: Uuid = serde_json::from_value(body["note_id"].clone()).unwrap();
    let note = app.repo.fetch(id).await.unwrap();
    assert_eq!(note.status, NoteStatus::Completed);
}

#[tokio::test]
async fn test_extract_rejects_empty_text_without_calling_model() {
    let app = TestApp::new(MockGenerationBackend::new());

    let (status, body) = app.post("/api/v1/extract", json!({"medical_text": ""})).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["note_id"], Value::Null);
    assert!(body["error"].as_str().unwrap().contains("Invalid input"));
    assert_eq!(app.backend.generate_call_count(), 0);
    assert!(app.repo.all().await.is_empty());
}

#[tokio::test]
async fn test_extract_with_malformed_body_keeps_response_shape() {
    let app = TestApp::new(MockGenerationBackend::new());

    let (status, body) = app.post("/api/v1/extract", json!({"note": "HTN"})).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["data"], Value::Null);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_extract_unusable_reply_is_bad_gateway() {
    let app = TestApp::new(MockGenerationBackend::new().with_fixed_response("I cannot help"));

    let (status, body) = app.post("/api/v1/extract", json!({"text": "HTN"})).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], json!(false));
    let id: Uuid = serde_json::from_value(body["note_id"].clone()).unwrap();
    assert_eq!(app.repo.fetch(id).await.unwrap().status, NoteStatus::Failed);
}

#[tokio::test]
async fn test_extract_unrecorded_result_is_not_success() {
    let app = TestApp::new(MockGenerationBackend::new().with_fixed_response(E11_9));
    app.repo.set_outcome_writes_failing(true);

    let (status, body) = app.post("/api/v1/extract", json!({"text": "DM2"})).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["data"], Value::Null);
    assert!(body["note_id"].is_string());
}

#[tokio::test(start_paused = true)]
async fn test_extract_timeout_is_gateway_timeout() {
    let app = TestApp::new(MockGenerationBackend::new().with_latency_ms(45_000));

    let (status, body) = app.post("/api/v1/extract", json!({"text": "HTN"})).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"], json!("Timed out after 30s"));
}

#[tokio::test(start_paused = true)]
async fn test_batch_isolates_timed_out_item() {
    let app = TestApp::new(
        MockGenerationBackend::new()
            .with_fixed_response(E11_9)
            .with_latency_for("second", 45_000),
    );

    let (status, body) = app
        .post(
            "/api/v1/extract/batch",
            json!({"texts": ["first note", "second note", "third note"]}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let items = body.as_array().unwrap();
    let flags: Vec<bool> = items
        .iter()
        .map(|i| i["success"].as_bool().unwrap())
        .collect();
    assert_eq!(flags, vec![true, false, true]);
    assert_eq!(items[1]["error"], json!("Timed out after 30s"));
    assert_eq!(items[1]["data"], Value::Null);
    assert!(items[1]["note_id"].is_string());
}

#[tokio::test]
async fn test_batch_over_limit_rejected() {
    let app = TestApp::new(MockGenerationBackend::new());
    let texts: Vec<String> = (0..51).map(|i| format!("note {i}")).collect();

    let (status, body) = app
        .post("/api/v1/extract/batch", json!({"texts": texts}))
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_envelope(&body, 422);
    assert_eq!(app.backend.generate_call_count(), 0);
}

#[tokio::test]
async fn test_empty_batch_returns_empty_list() {
    let app = TestApp::new(MockGenerationBackend::new());
    let (status, body) = app.post("/api/v1/extract/batch", json!({"texts": []})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

// =============================================================================
// NOTES AND SEARCH
// =============================================================================

#[tokio::test]
async fn test_list_notes_paginates() {
    let app = TestApp::new(MockGenerationBackend::new());
    for text in ["alpha", "beta", "gamma"] {
        app.repo.insert(NewNote::new(text)).await.unwrap();
    }

    let (status, body) = app.get("/api/v1/notes?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(3));
    assert_eq!(body["notes"].as_array().unwrap().len(), 2);
    assert_eq!(body["page"], json!({"current": 1, "size": 2, "total_pages": 2}));

    let (_, body) = app.get("/api/v1/notes?limit=2&offset=2").await;
    assert_eq!(body["notes"].as_array().unwrap().len(), 1);
    assert_eq!(body["page"]["current"], json!(2));
}

#[tokio::test]
async fn test_list_notes_filters_by_status() {
    let app = TestApp::new(MockGenerationBackend::new());
    app.repo
        .put(stored("old failure", NoteStatus::Failed, 1, Duration::hours(1)))
        .await;
    app.repo.insert(NewNote::new("fresh")).await.unwrap();

    let (status, body) = app.get("/api/v1/notes?status=failed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(1));
    assert_eq!(body["notes"][0]["status"], json!("failed"));
}

#[tokio::test]
async fn test_list_notes_rejects_bad_paging() {
    let app = TestApp::new(MockGenerationBackend::new());

    let (status, body) = app.get("/api/v1/notes?limit=0").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_envelope(&body, 422);

    let (status, body) = app.get("/api/v1/notes?start_date=someday").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_envelope(&body, 400);
}

#[tokio::test]
async fn test_list_notes_rejects_unrepresentable_relative_date() {
    let app = TestApp::new(MockGenerationBackend::new());

    for value in ["1000000000000d", "10000000000h", "99999999999999999999w"] {
        let (status, body) = app
            .get(&format!("/api/v1/notes?start_date={value}"))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "start_date={value}");
        assert_envelope(&body, 400);
    }

    let (status, _) = app
        .get("/api/v1/notes/dashboard?end_date=1000000000000d")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_note_status_codes() {
    let app = TestApp::new(MockGenerationBackend::new());
    let note = app.repo.insert(NewNote::new("HTN follow-up")).await.unwrap();

    let (status, body) = app.get(&format!("/api/v1/notes/{}", note.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], json!("HTN follow-up"));
    assert_eq!(body["status"], json!("pending"));

    let (status, body) = app.get("/api/v1/notes/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_envelope(&body, 400);

    let (status, body) = app.get(&format!("/api/v1/notes/{}", Uuid::now_v7())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_envelope(&body, 404);
}

#[tokio::test]
async fn test_search_requires_terms_and_matches_text() {
    let app = TestApp::new(MockGenerationBackend::new());
    app.repo
        .insert(NewNote::new("Started metformin 500mg"))
        .await
        .unwrap();
    app.repo.insert(NewNote::new("Ankle sprain")).await.unwrap();

    let (status, body) = app.get("/api/v1/search").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_envelope(&body, 422);

    let (status, _) = app.get("/api/v1/search?q=%25%25").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = app.get("/api/v1/search?q=Metformin").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(1));
    assert_eq!(body["notes"][0]["text"], json!("Started metformin 500mg"));
}

#[tokio::test]
async fn test_dashboard_on_empty_store() {
    let app = TestApp::new(MockGenerationBackend::new());

    let (status, body) = app.get("/api/v1/notes/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_notes"], json!(0));
    assert_eq!(body["success_rate"], json!(0.0));

    let (status, _) = app.get("/api/v1/notes/dashboard?top_codes=500").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_dashboard_counts_extracted_notes() {
    let app = TestApp::new(MockGenerationBackend::new().with_fixed_response(E11_9));
    app.post("/api/v1/extract", json!({"text": "DM2 follow-up"}))
        .await;

    let (status, body) = app.get("/api/v1/notes/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_notes"], json!(1));
    assert_eq!(body["top_codes"][0]["code"], json!("E11.9"));
}

#[tokio::test]
async fn test_reprocess_note() {
    let app = TestApp::new(MockGenerationBackend::new());
    let failed = stored("failed once", NoteStatus::Failed, 1, Duration::hours(1));
    let exhausted = stored("failed often", NoteStatus::Failed, 5, Duration::hours(1));
    let completed = stored("done", NoteStatus::Completed, 1, Duration::hours(1));
    for note in [&failed, &exhausted, &completed] {
        app.repo.put(note.clone()).await;
    }

    let (status, body) = app
        .post(&format!("/api/v1/notes/{}/reprocess", failed.id), json!({}))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], json!("pending"));

    let (status, body) = app
        .post(&format!("/api/v1/notes/{}/reprocess", exhausted.id), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_envelope(&body, 409);

    let (status, _) = app
        .post(&format!("/api/v1/notes/{}/reprocess", completed.id), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

// =============================================================================
// ADMIN
// =============================================================================

#[tokio::test]
async fn test_admin_stats_and_queue() {
    let app = TestApp::new(MockGenerationBackend::new());
    app.repo.insert(NewNote::new("queued")).await.unwrap();

    let (status, body) = app.get("/api/v1/admin/system/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_notes"], json!(1));
    assert_eq!(body["notes_last_24h"], json!(1));

    let (status, body) = app.get("/api/v1/admin/queue/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_performance_metrics_timeframe() {
    let app = TestApp::new(MockGenerationBackend::new());

    let (status, body) = app
        .get("/api/v1/admin/performance/metrics?timeframe=7d")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["timeframe"], json!("7d"));

    let (status, body) = app
        .get("/api/v1/admin/performance/metrics?timeframe=1y")
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_envelope(&body, 422);
}

#[tokio::test]
async fn test_cleanup_deletes_only_stale_unfinished_notes() {
    let app = TestApp::new(MockGenerationBackend::new());
    let old_failed = stored("old failed", NoteStatus::Failed, 1, Duration::days(60));
    let old_completed = stored("old done", NoteStatus::Completed, 1, Duration::days(60));
    let recent_failed = stored("new failed", NoteStatus::Failed, 1, Duration::days(1));
    for note in [&old_failed, &old_completed, &recent_failed] {
        app.repo.put(note.clone()).await;
    }

    let (status, body) = app
        .post("/api/v1/admin/maintenance/cleanup?days=3", json!({}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_envelope(&body, 422);

    let (status, body) = app
        .post(
            "/api/v1/admin/maintenance/cleanup?days=9223372036854775807",
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_envelope(&body, 422);
    assert_eq!(app.repo.all().await.len(), 3);

    let (status, body) = app
        .post("/api/v1/admin/maintenance/cleanup", json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], json!(1));

    assert!(app.repo.fetch(old_failed.id).await.is_err());
    assert!(app.repo.fetch(old_completed.id).await.is_ok());
    assert!(app.repo.fetch(recent_failed.id).await.is_ok());
}

#[tokio::test]
async fn test_bulk_reprocess_respects_attempt_budget() {
    let app = TestApp::new(MockGenerationBackend::new());
    app.repo
        .put(stored("retry me", NoteStatus::Failed, 2, Duration::hours(2)))
        .await;
    app.repo
        .put(stored("give up", NoteStatus::Failed, 5, Duration::hours(2)))
        .await;

    let (status, _) = app
        .post("/api/v1/admin/maintenance/reprocess?limit=0", json!({}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = app
        .post("/api/v1/admin/maintenance/reprocess?max_items=10", json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requeued"], json!(1));
    assert_eq!(body["max_attempts"], json!(5));
}

#[tokio::test]
async fn test_optimize_reports_store_size() {
    let app = TestApp::new(MockGenerationBackend::new());
    app.repo.insert(NewNote::new("queued")).await.unwrap();

    let (status, body) = app
        .post("/api/v1/admin/maintenance/optimize", json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], json!("Database optimization completed"));
    assert_eq!(body["stats"]["total_notes"], json!(1));

    app.repo.set_unavailable(true);
    let (status, body) = app
        .post("/api/v1/admin/maintenance/optimize", json!({}))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_envelope(&body, 500);
}

// =============================================================================
// SYSTEM AND MIDDLEWARE
// =============================================================================

#[tokio::test]
async fn test_root_banner() {
    let app = TestApp::new(MockGenerationBackend::new());
    let (status, body) = app.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], json!("Welcome to Rinova API"));
    assert_eq!(body["docs_url"], json!("/docs"));
}

#[tokio::test]
async fn test_health_reports_and_caches() {
    let app = TestApp::new(MockGenerationBackend::new());

    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("online"));
    assert_eq!(body["services"]["database"], json!("healthy"));

    // Served from cache while the store is down.
    app.repo.set_unavailable(true);
    let (status, cached) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cached["timestamp"], body["timestamp"]);
}

#[tokio::test]
async fn test_health_degraded_when_dependency_down() {
    let app = TestApp::new(MockGenerationBackend::new().with_health(false));
    app.repo.set_unavailable(true);

    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], json!("degraded"));
    assert!(body["services"]["database"]
        .as_str()
        .unwrap()
        .starts_with("unhealthy"));
    assert_eq!(
        body["services"]["inference"],
        json!("unhealthy: not reachable")
    );
}

#[tokio::test]
async fn test_rate_limit_returns_envelope() {
    let app = TestApp::with_config(
        MockGenerationBackend::new(),
        ApiConfig::default().with_rate_limit(true, 2, 60),
    );

    assert_eq!(app.get("/").await.0, StatusCode::OK);
    assert_eq!(app.get("/").await.0, StatusCode::OK);
    let (status, body) = app.get("/").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_envelope(&body, 429);
}

#[tokio::test]
async fn test_request_id_header_set() {
    let app = TestApp::new(MockGenerationBackend::new());
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let id = response.headers().get("x-request-id").unwrap();
    assert!(Uuid::parse_str(id.to_str().unwrap()).is_ok());
}

#[tokio::test]
async fn test_openapi_document_served() {
    let app = TestApp::new(MockGenerationBackend::new());
    let (status, body) = app.get("/api-docs/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/v1/extract"].is_object());
}
