use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt; // For `collect`
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tower::ServiceExt; // For `oneshot`

use server::diavgeia::DecisionCache;
use server::registry::{
    DecisionRecord, DecisionRegistry, RegistryError, RegistryQuery, RegistrySearchResponse,
};
use server::routes::create_router;
use server::share::{FileShare, MountedShare, ShareError, ShareSession};
use server::{AppState, database};

/// Registry double: serves from an in-memory map and counts every remote
/// invocation.
#[derive(Default)]
struct FakeRegistry {
    calls: AtomicUsize,
    decisions: HashMap<String, DecisionRecord>,
}

impl FakeRegistry {
    fn with_decision(ada: &str, subject: &str, issue_date: &str) -> Self {
        let mut registry = Self::default();
        registry.decisions.insert(
            ada.to_string(),
            DecisionRecord {
                ada: ada.to_string(),
                subject: subject.to_string(),
                issue_date: issue_date.to_string(),
                ..Default::default()
            },
        );
        registry
    }
}

#[async_trait]
impl DecisionRegistry for FakeRegistry {
    async fn get(&self, ada: &str) -> Result<DecisionRecord, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.decisions
            .get(ada)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(ada.to_string()))
    }

    async fn search(
        &self,
        _query: &RegistryQuery,
    ) -> Result<RegistrySearchResponse, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RegistrySearchResponse::default())
    }
}

/// Wraps the tempdir-backed share and counts session acquisitions, so
/// tests can assert that rejected paths never reach the share at all.
struct CountingShare {
    inner: MountedShare,
    connects: Arc<AtomicUsize>,
}

#[async_trait]
impl FileShare for CountingShare {
    async fn connect(&self) -> Result<Box<dyn ShareSession>, ShareError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.inner.connect().await
    }
}

struct TestApp {
    app: Router,
    pool: SqlitePool,
    registry: Arc<FakeRegistry>,
    share_connects: Arc<AtomicUsize>,
    share_dir: tempfile::TempDir,
}

/// Fresh in-memory database, fake registry and tempdir share per test.
async fn setup(registry: FakeRegistry) -> TestApp {
    let pool = SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory SQLite");
    database::apply_schema(&pool)
        .await
        .expect("Failed to apply schema in test DB");

    let registry = Arc::new(registry);
    let share_dir = tempfile::tempdir().expect("Failed to create share tempdir");
    let share_connects = Arc::new(AtomicUsize::new(0));

    let state = AppState {
        pool: pool.clone(),
        cache: DecisionCache::new(pool.clone(), registry.clone()),
        share: Arc::new(CountingShare {
            inner: MountedShare::new(share_dir.path().to_path_buf()),
            connects: share_connects.clone(),
        }),
        share_base_dir: "cases".to_string(),
        share_completed_dir: "completed".to_string(),
    };

    TestApp {
        app: create_router(state),
        pool,
        registry,
        share_connects,
        share_dir,
    }
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let test = setup(FakeRegistry::default()).await;

    let response = test
        .app
        .clone()
        .oneshot(empty_request("GET", "/api/health"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "ok": true }));
}

#[tokio::test]
async fn test_create_and_list_customers() {
    let test = setup(FakeRegistry::default()).await;

    // No code supplied: the next free integer string is assigned.
    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/customers",
            &json!({ "name": "Acme Ltd", "email": "office@acme.test" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["customer_code"], "1");
    assert_eq!(created["status"], "Active");

    let response = test
        .app
        .clone()
        .oneshot(empty_request("GET", "/api/customers"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    // Substring filter, case-insensitive, no match.
    let response = test
        .app
        .clone()
        .oneshot(empty_request("GET", "/api/customers?q=globex"))
        .await
        .unwrap();
    let listed = body_json(response).await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_customer_requires_name() {
    let test = setup(FakeRegistry::default()).await;

    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/customers",
            &json!({ "email": "nameless@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({ "error": "name required" }));
}

#[tokio::test]
async fn test_duplicate_case_number_is_rejected() {
    let test = setup(FakeRegistry::default()).await;
    let payload = json!({ "case_number": "C-1", "client_name": "Acme" });

    let response = test
        .app
        .clone()
        .oneshot(json_request("POST", "/api/cases", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = test
        .app
        .clone()
        .oneshot(json_request("POST", "/api/cases", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("case_number"));
}

#[tokio::test]
async fn test_create_case_auto_links_matching_customer() {
    let test = setup(FakeRegistry::default()).await;

    test.app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/customers",
            &json!({ "name": "Acme Ltd" }),
        ))
        .await
        .unwrap();

    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/cases",
            &json!({ "case_number": "C-100", "client_name": "Acme Ltd" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let case = body_json(response).await;
    assert_eq!(case["storage_folder_path"], "cases/C-100 - Acme Ltd");
    let case_id = case["id"].as_i64().unwrap();

    // Exactly one explicit link, pointing at the matching customer.
    let response = test
        .app
        .clone()
        .oneshot(empty_request(
            "GET",
            &format!("/api/cases/{case_id}/customers"),
        ))
        .await
        .unwrap();
    let customers = body_json(response).await;
    assert_eq!(customers.as_array().unwrap().len(), 1);
    assert_eq!(customers[0]["name"], "Acme Ltd");
}

#[tokio::test]
async fn test_set_case_customers_is_set_replace() {
    let test = setup(FakeRegistry::default()).await;

    let mut ids = Vec::new();
    for name in ["A", "B"] {
        let response = test
            .app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/customers",
                &json!({ "name": name }),
            ))
            .await
            .unwrap();
        ids.push(body_json(response).await["id"].as_i64().unwrap());
    }

    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/cases",
            &json!({
                "case_number": "C-1",
                "client_name": "Nobody",
                "customer_ids": ids,
            }),
        ))
        .await
        .unwrap();
    let case_id = body_json(response).await["id"].as_i64().unwrap();

    // Replace [a, b] with [b]: exactly one link must remain.
    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/cases/{case_id}/customers"),
            &json!({ "customer_ids": [ids[1]] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let customers = body_json(response).await;
    assert_eq!(customers.as_array().unwrap().len(), 1);
    assert_eq!(customers[0]["id"].as_i64().unwrap(), ids[1]);
}

#[tokio::test]
async fn test_case_details_include_tasks() {
    let test = setup(FakeRegistry::default()).await;

    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/cases",
            &json!({ "case_number": "C-7", "client_name": "Acme" }),
        ))
        .await
        .unwrap();
    let case_id = body_json(response).await["id"].as_i64().unwrap();

    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/cases/{case_id}/tasks"),
            &json!({
                "title": "Prepare filing",
                "start_iso": "2025-06-01T09:00:00Z",
                "end_iso": "2025-06-01T10:00:00Z",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = test
        .app
        .clone()
        .oneshot(empty_request(
            "GET",
            &format!("/api/cases/{case_id}/details"),
        ))
        .await
        .unwrap();
    let details = body_json(response).await;
    assert_eq!(details["case"]["case_number"], "C-7");
    assert_eq!(details["tasks"].as_array().unwrap().len(), 1);
    assert_eq!(details["tasks"][0]["case_id"].as_i64().unwrap(), case_id);
}

#[tokio::test]
async fn test_create_task_validation() {
    let test = setup(FakeRegistry::default()).await;

    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/tasks",
            &json!({ "title": "Missing times" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "title, start_iso, end_iso required" })
    );
}

#[tokio::test]
async fn test_fetch_decision_not_found_writes_nothing() {
    let test = setup(FakeRegistry::default()).await;

    let response = test
        .app
        .clone()
        .oneshot(empty_request("POST", "/api/diavgeia/fetch/ABC123"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "Decision with ADA ABC123 not found" })
    );

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM diavgeia_decisions")
        .fetch_one(&test.pool)
        .await
        .unwrap();
    assert_eq!(rows, 0);
}

#[tokio::test]
async fn test_fetch_decision_caches_and_later_reads_hit_the_cache() {
    let test = setup(FakeRegistry::with_decision("ADA-1", "Approval", "2024-05-01")).await;

    let response = test
        .app
        .clone()
        .oneshot(empty_request("POST", "/api/diavgeia/fetch/ADA-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let decision = body_json(response).await;
    assert_eq!(decision["ada"], "ADA-1");
    assert_eq!(decision["subject"], "Approval");
    assert_eq!(test.registry.calls.load(Ordering::SeqCst), 1);

    // The follow-up read is answered locally.
    let response = test
        .app
        .clone()
        .oneshot(empty_request("GET", "/api/diavgeia/decisions/ADA-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(test.registry.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cache_mode_search_stays_local() {
    let test = setup(FakeRegistry::with_decision("ADA-2", "Road works", "2024-04-02")).await;

    test.app
        .clone()
        .oneshot(empty_request("POST", "/api/diavgeia/fetch/ADA-2"))
        .await
        .unwrap();
    let calls_after_fetch = test.registry.calls.load(Ordering::SeqCst);

    let response = test
        .app
        .clone()
        .oneshot(empty_request("GET", "/api/diavgeia/search?q=Road"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(page["decisions"].as_array().unwrap().len(), 1);
    assert_eq!(page["info"]["source"], "cache");
    assert_eq!(page["info"]["total"], 1);

    // Cache mode must not have touched the registry.
    assert_eq!(test.registry.calls.load(Ordering::SeqCst), calls_after_fetch);
}

#[tokio::test]
async fn test_decision_link_lifecycle() {
    let test = setup(FakeRegistry::with_decision("ADA-3", "Grant", "2024-03-03")).await;

    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/cases",
            &json!({ "case_number": "C-3", "client_name": "Acme" }),
        ))
        .await
        .unwrap();
    let case_id = body_json(response).await["id"].as_i64().unwrap();

    // Linking an uncached decision is refused at the boundary.
    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/cases/{case_id}/diavgeia-links"),
            &json!({ "decision_ada": "ADA-3" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "Decision must be fetched/cached before linking" })
    );

    test.app
        .clone()
        .oneshot(empty_request("POST", "/api/diavgeia/fetch/ADA-3"))
        .await
        .unwrap();

    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/cases/{case_id}/diavgeia-links"),
            &json!({ "decision_ada": "ADA-3", "notes": "key ruling" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let link = body_json(response).await;
    let link_id = link["id"].as_i64().unwrap();
    assert_eq!(link["notes"], "key ruling");

    // Duplicate pair.
    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/cases/{case_id}/diavgeia-links"),
            &json!({ "decision_ada": "ADA-3" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "This decision is already linked to this case" })
    );

    // Listing carries the cached decision along.
    let response = test
        .app
        .clone()
        .oneshot(empty_request(
            "GET",
            &format!("/api/cases/{case_id}/diavgeia-links"),
        ))
        .await
        .unwrap();
    let links = body_json(response).await;
    assert_eq!(links.as_array().unwrap().len(), 1);
    assert_eq!(links[0]["decision"]["ada"], "ADA-3");

    let response = test
        .app
        .clone()
        .oneshot(empty_request(
            "DELETE",
            &format!("/api/cases/{case_id}/diavgeia-links/{link_id}"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "ok": true }));

    let response = test
        .app
        .clone()
        .oneshot(empty_request(
            "DELETE",
            &format!("/api/cases/{case_id}/diavgeia-links/{link_id}"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({ "error": "Link not found" }));
}

#[tokio::test]
async fn test_diavgeia_stats() {
    let test = setup(FakeRegistry::with_decision("ADA-4", "Stats", "2024-02-04")).await;

    test.app
        .clone()
        .oneshot(empty_request("POST", "/api/diavgeia/fetch/ADA-4"))
        .await
        .unwrap();

    let response = test
        .app
        .clone()
        .oneshot(empty_request("GET", "/api/diavgeia/stats"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stats = body_json(response).await;
    assert_eq!(stats["totalCached"], 1);
    assert_eq!(stats["linkedToCases"], 0);
}

#[tokio::test]
async fn test_file_round_trip_on_the_share() {
    let test = setup(FakeRegistry::default()).await;

    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/cases",
            &json!({ "case_number": "C-9", "client_name": "Acme Ltd" }),
        ))
        .await
        .unwrap();
    let case_id = body_json(response).await["id"].as_i64().unwrap();

    let response = test
        .app
        .clone()
        .oneshot(empty_request(
            "POST",
            &format!("/api/cases/{case_id}/files/ensure-folder"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["folder"], "cases/C-9 - Acme Ltd");
    assert!(test.share_dir.path().join("cases/C-9 - Acme Ltd").is_dir());

    // Upload with a name that needs sanitizing.
    let boundary = "test-boundary";
    let multipart_body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"sc?an*.pdf\"\r\n\
         Content-Type: application/pdf\r\n\r\n\
         fake pdf bytes\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/cases/{case_id}/files/upload"))
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(multipart_body))
        .unwrap();
    let response = test.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "ok": true, "savedAs": "scan.pdf" })
    );

    let response = test
        .app
        .clone()
        .oneshot(empty_request(
            "GET",
            &format!("/api/cases/{case_id}/files"),
        ))
        .await
        .unwrap();
    let listing = body_json(response).await;
    assert_eq!(listing["items"], json!([{ "name": "scan.pdf" }]));

    let response = test
        .app
        .clone()
        .oneshot(empty_request(
            "GET",
            &format!("/api/cases/{case_id}/files/download?name=scan.pdf"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"scan.pdf\""
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"fake pdf bytes");
}

#[tokio::test]
async fn test_download_requires_a_name() {
    let test = setup(FakeRegistry::default()).await;

    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/cases",
            &json!({ "case_number": "C-10", "client_name": "Acme" }),
        ))
        .await
        .unwrap();
    let case_id = body_json(response).await["id"].as_i64().unwrap();

    let response = test
        .app
        .clone()
        .oneshot(empty_request(
            "GET",
            &format!("/api/cases/{case_id}/files/download"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({ "error": "Missing name" }));
}

#[tokio::test]
async fn test_traversal_is_rejected_before_any_share_call() {
    let test = setup(FakeRegistry::default()).await;

    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/cases",
            &json!({ "case_number": "C-11", "client_name": "Acme" }),
        ))
        .await
        .unwrap();
    let case_id = body_json(response).await["id"].as_i64().unwrap();

    // Tamper with the stored folder path the way a hostile edit would.
    sqlx::query("UPDATE cases SET storage_folder_path = 'cases/../secrets' WHERE id = ?")
        .bind(case_id)
        .execute(&test.pool)
        .await
        .unwrap();

    for request in [
        empty_request("GET", &format!("/api/cases/{case_id}/files")),
        empty_request(
            "POST",
            &format!("/api/cases/{case_id}/files/ensure-folder"),
        ),
        empty_request(
            "GET",
            &format!("/api/cases/{case_id}/files/download?name=x.txt"),
        ),
    ] {
        let response = test.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, json!({ "error": "Invalid path" }));
    }

    // The guard fired before a single share session was opened.
    assert_eq!(test.share_connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_dashboard_metrics() {
    let test = setup(FakeRegistry::default()).await;

    test.app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/customers",
            &json!({ "name": "Acme Ltd" }),
        ))
        .await
        .unwrap();

    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/cases",
            &json!({ "case_number": "C-20", "client_name": "Acme Ltd" }),
        ))
        .await
        .unwrap();
    let open_case = body_json(response).await;

    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/cases",
            &json!({ "case_number": "C-21", "client_name": "Acme Ltd" }),
        ))
        .await
        .unwrap();
    let done_case = body_json(response).await;

    // Mark the second case completed.
    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/cases/{}", done_case["id"]),
            &json!({
                "case_number": "C-21",
                "client_name": "Acme Ltd",
                "status": "Completed",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Two archived case folders on the share.
    let completed = test.share_dir.path().join("completed");
    std::fs::create_dir_all(completed.join("old-1")).unwrap();
    std::fs::create_dir_all(completed.join("old-2")).unwrap();

    let response = test
        .app
        .clone()
        .oneshot(empty_request("GET", "/api/dashboard/metrics"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let metrics = body_json(response).await;
    assert_eq!(metrics["totalCustomers"], 1);
    assert_eq!(metrics["activeCases"], 1);
    assert_eq!(metrics["completedCases"], 2);
    assert_eq!(open_case["status"], "Open");
}

#[tokio::test]
async fn test_dashboard_metrics_without_completed_folder() {
    let test = setup(FakeRegistry::default()).await;

    // The completed folder does not exist on the share yet: count is 0,
    // not an error.
    let response = test
        .app
        .clone()
        .oneshot(empty_request("GET", "/api/dashboard/metrics"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let metrics = body_json(response).await;
    assert_eq!(metrics["completedCases"], 0);
}
