//! Integration tests for crm-leads API endpoints
//!
//! Each test runs the router against its own freshly initialized database
//! in a temporary directory.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use crm_common::db::init_database;
use crm_leads::{build_router, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

/// Test harness: router plus the directory that keeps its database alive
struct TestApp {
    _dir: TempDir,
    state: AppState,
    router: Router,
}

async fn setup_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("leadcrm.db")).await.unwrap();
    let state = AppState::new(pool);
    let router = build_router(state.clone());
    TestApp {
        _dir: dir,
        state,
        router,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Should read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Should parse JSON")
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().method("DELETE").uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn send_json(&self, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send_json("POST", uri, body).await
    }

    async fn create_counsellor(&self, employee_id: &str) -> i64 {
        let (status, body) = self
            .post(
                "/api/counsellors",
                json!({
                    "employee_id": employee_id,
                    "first_name": format!("Agent {}", employee_id),
                    "email": format!("{}@example.com", employee_id.to_lowercase()),
                    "department": "Sales"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_i64().unwrap()
    }

    async fn create_source(&self, name: &str) -> i64 {
        let (status, body) = self.post("/api/sources", json!({ "name": name })).await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_i64().unwrap()
    }

    async fn create_lead(&self, body: Value) -> Value {
        let (status, lead) = self.post("/api/leads", body).await;
        assert_eq!(status, StatusCode::CREATED, "{}", lead);
        lead
    }

    async fn owner_of(&self, lead_id: i64) -> Option<i64> {
        sqlx::query_scalar("SELECT assigned_counsellor_id FROM leads WHERE id = ?")
            .bind(lead_id)
            .fetch_one(&self.state.db)
            .await
            .unwrap()
    }
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup_app().await;

    let (status, body) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "crm-leads");
    assert_eq!(body["database"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_buildinfo_endpoint() {
    let app = setup_app().await;

    let (status, body) = app.get("/api/buildinfo").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["git_hash"].is_string());
    assert!(body["build_timestamp"].is_string());
}

// =============================================================================
// Leads
// =============================================================================

#[tokio::test]
async fn test_create_and_fetch_lead() {
    let app = setup_app().await;
    let source_id = app.create_source("Web Form").await;

    let lead = app
        .create_lead(json!({
            "first_name": "Ada",
            "last_name": "Lovelace",
            "email": "ada@example.com",
            "industry": "Technology",
            "source_id": source_id,
            "expected_value": 1200.0
        }))
        .await;

    assert_eq!(lead["status"], "NEW");
    assert_eq!(lead["priority"], "MEDIUM");
    assert!(lead["assigned_counsellor_id"].is_null());
    let code = lead["lead_code"].as_str().unwrap();
    assert!(crm_common::ids::is_lead_code(code), "bad lead code {}", code);

    let (status, detail) = app.get(&format!("/api/leads/{}", lead["id"])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["first_name"], "Ada");
    assert_eq!(detail["source_id"], source_id);
    assert_eq!(detail["activities"], json!([]));
    assert_eq!(detail["transfers"], json!([]));
}

#[tokio::test]
async fn test_create_lead_validation() {
    let app = setup_app().await;

    let (status, body) = app.post("/api/leads", json!({ "first_name": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("first_name"));

    let (status, _) = app
        .post("/api/leads", json!({ "first_name": "Ada", "expected_value": -1.0 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/api/leads", json!({ "first_name": "Ada", "source_id": 999 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_lead_is_404() {
    let app = setup_app().await;

    let (status, body) = app.get("/api/leads/42").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_list_leads_filters() {
    let app = setup_app().await;
    let counsellor = app.create_counsellor("E1").await;

    app.create_lead(json!({ "first_name": "Unowned" })).await;
    let owned = app
        .create_lead(json!({ "first_name": "Owned", "assigned_counsellor_id": counsellor }))
        .await;
    app.post(
        &format!("/api/leads/{}/status", owned["id"]),
        json!({ "status": "QUALIFIED" }),
    )
    .await;

    let (status, all) = app.get("/api/leads").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all["total_results"], 2);
    assert_eq!(all["page_size"], 100);

    let (_, unassigned) = app.get("/api/leads?unassigned=true").await;
    assert_eq!(unassigned["total_results"], 1);
    assert_eq!(unassigned["leads"][0]["first_name"], "Unowned");

    let (_, mine) = app.get(&format!("/api/leads?counsellor_id={}", counsellor)).await;
    assert_eq!(mine["total_results"], 1);

    let (_, qualified) = app.get("/api/leads?status=qualified").await;
    assert_eq!(qualified["total_results"], 1);
    assert_eq!(qualified["leads"][0]["first_name"], "Owned");

    let (status, _) = app.get("/api/leads?status=WON").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_leads_pagination() {
    let app = setup_app().await;
    for i in 0..105 {
        app.create_lead(json!({ "first_name": format!("Lead {}", i) })).await;
    }

    let (_, page1) = app.get("/api/leads?page=1").await;
    let (_, page2) = app.get("/api/leads?page=2").await;
    let (_, clamped) = app.get("/api/leads?page=50").await;

    assert_eq!(page1["total_pages"], 2);
    assert_eq!(page1["leads"].as_array().unwrap().len(), 100);
    assert_eq!(page2["leads"].as_array().unwrap().len(), 5);
    assert_eq!(clamped["page"], 2);
}

#[tokio::test]
async fn test_update_and_delete_lead() {
    let app = setup_app().await;
    let lead = app.create_lead(json!({ "first_name": "Ada" })).await;
    let uri = format!("/api/leads/{}", lead["id"]);

    let (status, updated) = app
        .send_json(
            "PUT",
            &uri,
            json!({ "first_name": "Ada", "company": "Analytical Engines", "priority": "HIGH" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["company"], "Analytical Engines");
    assert_eq!(updated["priority"], "HIGH");
    assert_eq!(updated["lead_code"], lead["lead_code"]);

    let (status, _) = app.delete(&uri).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get(&uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_status_validates_enumeration() {
    let app = setup_app().await;
    let lead = app.create_lead(json!({ "first_name": "Ada" })).await;
    let uri = format!("/api/leads/{}/status", lead["id"]);

    let (status, body) = app.post(&uri, json!({ "status": "CLOSED_WON" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CLOSED_WON");

    let (status, _) = app.post(&uri, json!({ "status": "SIGNED" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mark_lost_appends_reason() {
    let app = setup_app().await;
    let lead = app
        .create_lead(json!({ "first_name": "Ada", "notes": "Met at expo" }))
        .await;

    let (status, body) = app
        .post(
            &format!("/api/leads/{}/lost", lead["id"]),
            json!({ "reason": "Budget cut" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CLOSED_LOST");
    assert_eq!(body["notes"], "Met at expo\n\nLost Reason: Budget cut");
}

#[tokio::test]
async fn test_transfer_lead() {
    let app = setup_app().await;
    let from = app.create_counsellor("E1").await;
    let to = app.create_counsellor("E2").await;
    let lead = app
        .create_lead(json!({ "first_name": "Ada", "assigned_counsellor_id": from }))
        .await;
    let uri = format!("/api/leads/{}/transfer", lead["id"]);

    let (status, transfer) = app
        .post(&uri, json!({ "to_counsellor_id": to, "reason": "Territory" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", transfer);
    assert_eq!(transfer["from_counsellor_id"], from);
    assert_eq!(transfer["to_counsellor_id"], to);
    assert_eq!(transfer["admin_approved"], true);
    assert!(transfer["approved_at"].is_string());

    let (_, detail) = app.get(&format!("/api/leads/{}", lead["id"])).await;
    assert_eq!(detail["status"], "TRANSFERRED");
    assert_eq!(detail["assigned_counsellor_id"], to);
    assert_eq!(detail["previous_counsellor_id"], from);
    assert_eq!(detail["transfers"].as_array().unwrap().len(), 1);

    // Already owned by the target
    let (status, _) = app.post(&uri, json!({ "to_counsellor_id": to })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transfer_to_inactive_counsellor_conflicts() {
    let app = setup_app().await;
    let inactive = app.create_counsellor("E1").await;
    app.delete(&format!("/api/counsellors/{}", inactive)).await;
    let lead = app.create_lead(json!({ "first_name": "Ada" })).await;

    let (status, _) = app
        .post(
            &format!("/api/leads/{}/transfer", lead["id"]),
            json!({ "to_counsellor_id": inactive }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .post(
            &format!("/api/leads/{}/transfer", lead["id"]),
            json!({ "to_counsellor_id": 999 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_activity_sets_last_contact_date() {
    let app = setup_app().await;
    let counsellor = app.create_counsellor("E1").await;
    let lead = app
        .create_lead(json!({ "first_name": "Ada", "assigned_counsellor_id": counsellor }))
        .await;
    assert!(lead["last_contact_date"].is_null());

    let (status, activity) = app
        .post(
            &format!("/api/leads/{}/activities", lead["id"]),
            json!({ "activity_type": "CALL", "subject": "Intro call", "outcome": "Interested" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", activity);
    assert_eq!(activity["counsellor_id"], counsellor);

    let (_, detail) = app.get(&format!("/api/leads/{}", lead["id"])).await;
    assert!(detail["last_contact_date"].is_string());
    assert_eq!(detail["activities"][0]["subject"], "Intro call");
}

// =============================================================================
// Assignment
// =============================================================================

#[tokio::test]
async fn test_assignment_without_counsellors() {
    let app = setup_app().await;
    let lead = app.create_lead(json!({ "first_name": "Ada" })).await;

    let (status, body) = app
        .post("/api/assignments", json!({ "strategy": "round_robin" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assigned"], 0);
    assert_eq!(body["outcome"], "no_eligible_counsellors");
    assert!(body["message"].as_str().unwrap().contains("No active counsellors"));
    assert_eq!(app.owner_of(lead["id"].as_i64().unwrap()).await, None);
}

#[tokio::test]
async fn test_assignment_without_leads() {
    let app = setup_app().await;
    app.create_counsellor("E1").await;

    let (_, body) = app
        .post("/api/assignments", json!({ "strategy": "workload_balanced" }))
        .await;

    assert_eq!(body["assigned"], 0);
    assert_eq!(body["outcome"], "nothing_to_assign");
    assert_eq!(body["message"], "No unassigned leads found!");
}

#[tokio::test]
async fn test_round_robin_assignment() {
    let app = setup_app().await;
    let a = app.create_counsellor("E1").await;
    let b = app.create_counsellor("E2").await;
    let mut ids = Vec::new();
    for name in ["L1", "L2", "L3"] {
        ids.push(app.create_lead(json!({ "first_name": name })).await["id"].as_i64().unwrap());
    }

    let (status, body) = app
        .post("/api/assignments", json!({ "strategy": "round_robin" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assigned"], 3);
    assert_eq!(body["strategy"], "round_robin");
    assert_eq!(
        body["message"],
        "Successfully assigned 3 leads using Round Robin method!"
    );
    assert_eq!(app.owner_of(ids[0]).await, Some(a));
    assert_eq!(app.owner_of(ids[1]).await, Some(b));
    assert_eq!(app.owner_of(ids[2]).await, Some(a));
}

#[tokio::test]
async fn test_unknown_strategy_falls_back_to_round_robin() {
    let app = setup_app().await;
    app.create_counsellor("E1").await;
    app.create_lead(json!({ "first_name": "Ada" })).await;

    let (status, body) = app
        .post("/api/assignments", json!({ "strategy": "coin_flip" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["strategy"], "round_robin");
    assert_eq!(body["assigned"], 1);
}

#[tokio::test]
async fn test_assignment_without_body_uses_default_setting() {
    let app = setup_app().await;
    app.create_counsellor("E1").await;
    app.create_lead(json!({ "first_name": "Ada" })).await;
    crm_common::db::set_setting(&app.state.db, "default_assignment_strategy", "performance_based")
        .await
        .unwrap();

    let (status, body) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/assignments")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["strategy"], "performance_based");
    assert_eq!(body["assigned"], 1);
}

#[tokio::test]
async fn test_workload_balanced_prefers_lighter_counsellor() {
    let app = setup_app().await;
    let busy = app.create_counsellor("E1").await;
    let idle = app.create_counsellor("E2").await;
    for i in 0..3 {
        app.create_lead(json!({ "first_name": format!("Existing {}", i), "assigned_counsellor_id": busy }))
            .await;
    }
    let mut new_ids = Vec::new();
    for i in 0..3 {
        new_ids.push(
            app.create_lead(json!({ "first_name": format!("New {}", i) })).await["id"]
                .as_i64()
                .unwrap(),
        );
    }

    let (_, body) = app
        .post("/api/assignments", json!({ "strategy": "workload_balanced" }))
        .await;

    assert_eq!(body["assigned"], 3);
    for id in new_ids {
        assert_eq!(app.owner_of(id).await, Some(idle));
    }
}

#[tokio::test]
async fn test_assignment_never_touches_owned_or_inactive() {
    let app = setup_app().await;
    let active = app.create_counsellor("E1").await;
    let retired = app.create_counsellor("E2").await;
    let owned = app
        .create_lead(json!({ "first_name": "Kept", "assigned_counsellor_id": retired }))
        .await;
    app.delete(&format!("/api/counsellors/{}", retired)).await;
    let fresh = app.create_lead(json!({ "first_name": "Fresh" })).await;

    let (_, body) = app
        .post("/api/assignments", json!({ "strategy": "specialization_based" }))
        .await;

    assert_eq!(body["assigned"], 1);
    assert_eq!(app.owner_of(owned["id"].as_i64().unwrap()).await, Some(retired));
    assert_eq!(app.owner_of(fresh["id"].as_i64().unwrap()).await, Some(active));
}

#[tokio::test]
async fn test_assignment_summary() {
    let app = setup_app().await;
    let a = app.create_counsellor("E1").await;
    app.create_counsellor("E2").await;
    crm_common::db::set_setting(&app.state.db, "workload_low_max", "1")
        .await
        .unwrap();
    for i in 0..3 {
        app.create_lead(json!({ "first_name": format!("Owned {}", i), "assigned_counsellor_id": a }))
            .await;
    }
    app.create_lead(json!({ "first_name": "Waiting" })).await;

    let (status, body) = app.get("/api/assignments/summary").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unassigned_count"], 1);
    assert_eq!(body["active_counsellors_count"], 2);
    assert_eq!(body["avg_leads_per_counsellor"], 1.5);
    assert_eq!(body["oldest_unassigned_days"], 0);
    let workload = body["counsellor_workload"].as_array().unwrap();
    assert_eq!(workload[0]["lead_count"], 3);
    assert_eq!(workload[0]["workload_status"], "MEDIUM");
    assert_eq!(workload[1]["lead_count"], 0);
    assert_eq!(workload[1]["workload_status"], "LOW");
}

#[tokio::test]
async fn test_malformed_assignment_body_is_rejected() {
    let app = setup_app().await;
    app.create_counsellor("E1").await;
    let lead = app.create_lead(json!({ "first_name": "Ada" })).await;

    let (status, body) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/assignments")
                .header("content-type", "application/json")
                .body(Body::from("{\"strategy\": "))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Malformed"));

    let (status, _) = app.post("/api/assignments", json!({ "strategy": 5 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing ran
    assert_eq!(app.owner_of(lead["id"].as_i64().unwrap()).await, None);
}

#[tokio::test]
async fn test_performance_based_prefers_closed_won_history() {
    let app = setup_app().await;
    let busy = app.create_counsellor("E1").await;
    let closer = app.create_counsellor("E2").await;
    for name in ["Open 1", "Open 2"] {
        app.create_lead(json!({ "first_name": name, "assigned_counsellor_id": busy }))
            .await;
    }
    let won = app
        .create_lead(json!({ "first_name": "Won", "assigned_counsellor_id": closer }))
        .await;
    let (status, _) = app
        .post(
            &format!("/api/leads/{}/business", won["id"]),
            json!({ "title": "Annual plan", "value": 900.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let mut fresh = Vec::new();
    for name in ["New 1", "New 2"] {
        fresh.push(app.create_lead(json!({ "first_name": name })).await["id"].as_i64().unwrap());
    }

    let (status, body) = app
        .post("/api/assignments", json!({ "strategy": "performance_based" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assigned"], 2);
    for id in fresh {
        assert_eq!(app.owner_of(id).await, Some(closer));
    }
}

#[tokio::test]
async fn test_specialization_based_follows_industry_wins() {
    let app = setup_app().await;
    let retail = app.create_counsellor("E1").await;
    let finance = app.create_counsellor("E2").await;

    let won = app
        .create_lead(json!({
            "first_name": "Bank",
            "industry": "Finance",
            "assigned_counsellor_id": finance
        }))
        .await;
    app.post(
        &format!("/api/leads/{}/business", won["id"]),
        json!({ "title": "Treasury rollout", "value": 12000.0 }),
    )
    .await;
    let shop = app
        .create_lead(json!({
            "first_name": "Shop",
            "industry": "Retail",
            "assigned_counsellor_id": retail
        }))
        .await;
    app.post(
        &format!("/api/leads/{}/status", shop["id"]),
        json!({ "status": "CLOSED_WON" }),
    )
    .await;

    let finance_lead = app
        .create_lead(json!({ "first_name": "Fund", "industry": "Finance" }))
        .await;
    let retail_lead = app
        .create_lead(json!({ "first_name": "Store", "industry": "Retail" }))
        .await;

    let (_, body) = app
        .post("/api/assignments", json!({ "strategy": "specialization_based" }))
        .await;

    assert_eq!(body["assigned"], 2);
    assert_eq!(app.owner_of(finance_lead["id"].as_i64().unwrap()).await, Some(finance));
    assert_eq!(app.owner_of(retail_lead["id"].as_i64().unwrap()).await, Some(retail));
}

#[tokio::test]
async fn test_lead_claimed_mid_batch_is_skipped() {
    let app = setup_app().await;
    let counsellor = app.create_counsellor("E1").await;
    let first = app.create_lead(json!({ "first_name": "First" })).await["id"].as_i64().unwrap();
    let second = app.create_lead(json!({ "first_name": "Second" })).await["id"].as_i64().unwrap();

    // Writing the first lead also hands the second one out
    sqlx::query(&format!(
        r#"
        CREATE TRIGGER claim_second AFTER UPDATE OF assigned_counsellor_id ON leads
        WHEN NEW.id = {first}
        BEGIN
            UPDATE leads SET assigned_counsellor_id = NEW.assigned_counsellor_id WHERE id = {second};
        END
        "#
    ))
    .execute(&app.state.db)
    .await
    .unwrap();

    let (status, body) = app
        .post("/api/assignments", json!({ "strategy": "round_robin" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assigned"], 1);
    assert_eq!(body["skipped"], 1);
    assert_eq!(body["failed"], 0);
    assert_eq!(app.owner_of(first).await, Some(counsellor));
    assert_eq!(app.owner_of(second).await, Some(counsellor));
}

#[tokio::test]
async fn test_failed_write_does_not_stop_batch() {
    let app = setup_app().await;
    let counsellor = app.create_counsellor("E1").await;
    let mut ids = Vec::new();
    for name in ["L1", "L2", "L3"] {
        ids.push(app.create_lead(json!({ "first_name": name })).await["id"].as_i64().unwrap());
    }

    sqlx::query(&format!(
        r#"
        CREATE TRIGGER freeze_lead BEFORE UPDATE OF assigned_counsellor_id ON leads
        WHEN NEW.id = {}
        BEGIN
            SELECT RAISE(ABORT, 'lead is frozen');
        END
        "#,
        ids[1]
    ))
    .execute(&app.state.db)
    .await
    .unwrap();

    let (status, body) = app
        .post("/api/assignments", json!({ "strategy": "round_robin" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assigned"], 2);
    assert_eq!(body["skipped"], 0);
    assert_eq!(body["failed"], 1);
    // The batch committed around the failure
    assert_eq!(app.owner_of(ids[0]).await, Some(counsellor));
    assert_eq!(app.owner_of(ids[1]).await, None);
    assert_eq!(app.owner_of(ids[2]).await, Some(counsellor));
}

// =============================================================================
// Import
// =============================================================================

#[tokio::test]
async fn test_import_counts_bad_rows() {
    let app = setup_app().await;
    let source = app.create_source("Trade Show").await;

    let (status, body) = app
        .post(
            "/api/leads/import",
            json!({
                "source_id": source,
                "rows": [
                    { "first_name": "Ada", "industry": "Technology" },
                    { "last_name": "No First Name" },
                    { "first_name": "Bad Email", "email": "nope" },
                    { "first_name": "Grace" }
                ]
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["imported"], 2);
    assert_eq!(body["errors"], 2);
    assert!(body["assignment"].is_null());
    assert_eq!(body["message"], "Successfully imported 2 leads. 2 errors occurred.");

    let (_, list) = app.get("/api/leads").await;
    for lead in list["leads"].as_array().unwrap() {
        assert_eq!(lead["source_id"], source);
    }
}

#[tokio::test]
async fn test_import_with_fixed_counsellor_skips_auto_assign() {
    let app = setup_app().await;
    let source = app.create_source("Referral").await;
    let fixed = app.create_counsellor("E1").await;
    app.create_counsellor("E2").await;

    let (_, body) = app
        .post(
            "/api/leads/import",
            json!({
                "source_id": source,
                "assigned_counsellor_id": fixed,
                "auto_assign": true,
                "assignment_method": "round_robin",
                "rows": [{ "first_name": "Ada" }, { "first_name": "Grace" }]
            }),
        )
        .await;

    assert_eq!(body["imported"], 2);
    assert!(body["assignment"].is_null());
    for id in body["lead_ids"].as_array().unwrap() {
        assert_eq!(app.owner_of(id.as_i64().unwrap()).await, Some(fixed));
    }
}

#[tokio::test]
async fn test_import_auto_assign_only_touches_imported_rows() {
    let app = setup_app().await;
    let source = app.create_source("Referral").await;
    app.create_counsellor("E1").await;
    let older = app.create_lead(json!({ "first_name": "Older" })).await;

    let (_, body) = app
        .post(
            "/api/leads/import",
            json!({
                "source_id": source,
                "auto_assign": true,
                "assignment_method": "workload_balanced",
                "rows": [{ "first_name": "Ada" }, { "first_name": "Grace" }]
            }),
        )
        .await;

    assert_eq!(body["imported"], 2);
    assert_eq!(body["assignment"]["assigned"], 2);
    assert_eq!(body["assignment"]["strategy"], "workload_balanced");
    assert_eq!(app.owner_of(older["id"].as_i64().unwrap()).await, None);
}

#[tokio::test]
async fn test_import_auto_assign_without_counsellors() {
    let app = setup_app().await;
    let source = app.create_source("Referral").await;

    let (_, body) = app
        .post(
            "/api/leads/import",
            json!({ "source_id": source, "auto_assign": true, "rows": [{ "first_name": "Ada" }] }),
        )
        .await;

    assert_eq!(body["imported"], 1);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("no active counsellors found"));
}

#[tokio::test]
async fn test_import_rejects_unknown_source_and_oversized_batch() {
    let app = setup_app().await;

    let (status, _) = app
        .post("/api/leads/import", json!({ "source_id": 77, "rows": [] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let source = app.create_source("Referral").await;
    crm_common::db::set_setting(&app.state.db, "import_max_rows", "1")
        .await
        .unwrap();
    let (status, _) = app
        .post(
            "/api/leads/import",
            json!({ "source_id": source, "rows": [{ "first_name": "A" }, { "first_name": "B" }] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Counsellors and sources
// =============================================================================

#[tokio::test]
async fn test_counsellor_lifecycle() {
    let app = setup_app().await;
    let id = app.create_counsellor("E1").await;

    let (status, _) = app
        .post(
            "/api/counsellors",
            json!({ "employee_id": "E1", "first_name": "Dup", "email": "other@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, updated) = app
        .send_json(
            "PUT",
            &format!("/api/counsellors/{}", id),
            json!({ "department": "Enterprise" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["department"], "Enterprise");

    let (status, deactivated) = app.delete(&format!("/api/counsellors/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deactivated["is_active"], false);

    let (_, active) = app.get("/api/counsellors?active=true").await;
    assert_eq!(active, json!([]));
    let (_, all) = app.get("/api/counsellors").await;
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_counsellor_performance() {
    let app = setup_app().await;
    let a = app.create_counsellor("E1").await;
    let b = app.create_counsellor("E2").await;
    for status in ["CLOSED_WON", "NEW", "CLOSED_LOST", "CLOSED_WON"] {
        let lead = app
            .create_lead(json!({ "first_name": "Lead", "assigned_counsellor_id": a }))
            .await;
        app.post(&format!("/api/leads/{}/status", lead["id"]), json!({ "status": status }))
            .await;
    }

    let (status, body) = app.get("/api/counsellors/performance").await;

    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows[0]["counsellor_id"], a);
    assert_eq!(rows[0]["total_leads"], 4);
    assert_eq!(rows[0]["closed_won"], 2);
    assert_eq!(rows[0]["closed_lost"], 1);
    assert_eq!(rows[0]["conversion_rate"], 50.0);
    assert_eq!(rows[1]["counsellor_id"], b);
    assert_eq!(rows[1]["conversion_rate"], 0.0);
}

#[tokio::test]
async fn test_source_crud() {
    let app = setup_app().await;
    let id = app.create_source("Web Form").await;

    let (status, _) = app.post("/api/sources", json!({ "name": "Web Form" })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, renamed) = app
        .send_json(
            "PUT",
            &format!("/api/sources/{}", id),
            json!({ "name": "Website", "description": "Contact form" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["name"], "Website");

    let lead = app
        .create_lead(json!({ "first_name": "Ada", "source_id": id }))
        .await;
    let (status, _) = app.delete(&format!("/api/sources/{}", id)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, detail) = app.get(&format!("/api/leads/{}", lead["id"])).await;
    assert!(detail["source_id"].is_null());

    let (_, sources) = app.get("/api/sources").await;
    assert_eq!(sources, json!([]));
}

// =============================================================================
// Analytics
// =============================================================================

#[tokio::test]
async fn test_lead_analytics() {
    let app = setup_app().await;
    let lead = app.create_lead(json!({ "first_name": "Ada" })).await;
    app.create_lead(json!({ "first_name": "Grace" })).await;
    app.post(
        &format!("/api/leads/{}/status", lead["id"]),
        json!({ "status": "CONTACTED" }),
    )
    .await;

    let (status, body) = app.get("/api/analytics/leads").await;

    assert_eq!(status, StatusCode::OK);
    let statuses = body["status_data"].as_array().unwrap();
    assert_eq!(statuses.len(), 8);
    assert_eq!(statuses[0], json!({ "status": "NEW", "count": 1 }));
    assert_eq!(statuses[1], json!({ "status": "CONTACTED", "count": 1 }));

    let months = body["monthly_data"].as_array().unwrap();
    assert_eq!(months.len(), 6);
    assert_eq!(months[0]["leads"], 2);
    assert_eq!(months[1]["leads"], 0);
}

#[tokio::test]
async fn test_counsellor_analytics() {
    let app = setup_app().await;
    let counsellor = app.create_counsellor("E1").await;
    let other = app.create_counsellor("E2").await;
    let lead = app
        .create_lead(json!({ "first_name": "Ada", "assigned_counsellor_id": counsellor }))
        .await;
    app.create_lead(json!({ "first_name": "Grace", "assigned_counsellor_id": counsellor }))
        .await;
    app.create_lead(json!({ "first_name": "Linus", "assigned_counsellor_id": other }))
        .await;
    app.post(
        &format!("/api/leads/{}/status", lead["id"]),
        json!({ "status": "CONTACTED" }),
    )
    .await;
    app.post(
        &format!("/api/leads/{}/activities", lead["id"]),
        json!({ "activity_type": "EMAIL", "subject": "Brochure" }),
    )
    .await;

    let (status, body) = app
        .get(&format!("/api/counsellors/{}/analytics", counsellor))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["counsellor_id"], counsellor);
    let statuses = body["status_data"].as_array().unwrap();
    assert_eq!(statuses.len(), 8);
    assert_eq!(statuses[0], json!({ "status": "NEW", "count": 1 }));
    assert_eq!(statuses[1], json!({ "status": "CONTACTED", "count": 1 }));

    let months = body["monthly_activities"].as_array().unwrap();
    assert_eq!(months.len(), 6);
    assert_eq!(months[0]["activities"], 1);
    assert_eq!(months[1]["activities"], 0);

    let (status, _) = app.get("/api/counsellors/999/analytics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Follow-ups and transfer requests
// =============================================================================

#[tokio::test]
async fn test_follow_up_schedule_and_due_filter() {
    let app = setup_app().await;
    let overdue = app.create_lead(json!({ "first_name": "Overdue" })).await;
    let later = app.create_lead(json!({ "first_name": "Later" })).await;
    app.create_lead(json!({ "first_name": "Unscheduled" })).await;

    let (status, lead) = app
        .post(
            &format!("/api/leads/{}/follow-up", overdue["id"]),
            json!({ "follow_up_date": "2020-01-06T09:30:00Z" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", lead);
    assert_eq!(lead["next_follow_up"], "2020-01-06T09:30:00");

    app.post(
        &format!("/api/leads/{}/follow-up", later["id"]),
        json!({ "follow_up_date": "2999-01-01T00:00:00Z" }),
    )
    .await;

    let (_, due) = app.get("/api/leads?follow_up_due=true").await;
    assert_eq!(due["total_results"], 1);
    assert_eq!(due["leads"][0]["first_name"], "Overdue");

    // Clearing takes the lead off the due list
    let (status, lead) = app
        .post(
            &format!("/api/leads/{}/follow-up", overdue["id"]),
            json!({ "follow_up_date": null }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(lead["next_follow_up"].is_null());
    let (_, due) = app.get("/api/leads?follow_up_due=true").await;
    assert_eq!(due["total_results"], 0);

    let (status, _) = app
        .post("/api/leads/999/follow-up", json!({ "follow_up_date": null }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_transfer_request_waits_for_approval() {
    let app = setup_app().await;
    let from = app.create_counsellor("E1").await;
    let to = app.create_counsellor("E2").await;
    let lead = app
        .create_lead(json!({ "first_name": "Ada", "assigned_counsellor_id": from }))
        .await;
    let lead_id = lead["id"].as_i64().unwrap();
    let uri = format!("/api/leads/{}/transfer-requests", lead_id);

    let (status, request) = app
        .post(&uri, json!({ "to_counsellor_id": to, "reason": "Language" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", request);
    assert_eq!(request["admin_approved"], false);
    assert!(request["approved_at"].is_null());
    assert_eq!(request["from_counsellor_id"], from);
    assert_eq!(app.owner_of(lead_id).await, Some(from));

    let (status, _) = app.post(&uri, json!({ "to_counsellor_id": to })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, pending) = app.get("/api/transfers/pending").await;
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let transfer_uri = format!("/api/transfers/{}", request["id"]);
    let (status, approved) = app
        .post(&format!("{}/approve", transfer_uri), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", approved);
    assert_eq!(approved["admin_approved"], true);
    assert!(approved["approved_at"].is_string());

    let (_, detail) = app.get(&format!("/api/leads/{}", lead_id)).await;
    assert_eq!(detail["status"], "TRANSFERRED");
    assert_eq!(detail["assigned_counsellor_id"], to);
    assert_eq!(detail["previous_counsellor_id"], from);

    let (status, _) = app
        .post(&format!("{}/approve", transfer_uri), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app.delete(&transfer_uri).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, pending) = app.get("/api/transfers/pending").await;
    assert_eq!(pending, json!([]));
}

#[tokio::test]
async fn test_transfer_request_rejection_and_stale_approval() {
    let app = setup_app().await;
    let a = app.create_counsellor("E1").await;
    let b = app.create_counsellor("E2").await;
    let c = app.create_counsellor("E3").await;
    let lead = app
        .create_lead(json!({ "first_name": "Ada", "assigned_counsellor_id": a }))
        .await;
    let lead_id = lead["id"].as_i64().unwrap();

    let (_, request) = app
        .post(
            &format!("/api/leads/{}/transfer-requests", lead_id),
            json!({ "to_counsellor_id": b }),
        )
        .await;
    let transfer_uri = format!("/api/transfers/{}", request["id"]);
    let (status, _) = app.delete(&transfer_uri).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.delete(&transfer_uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.owner_of(lead_id).await, Some(a));

    // Lead moves elsewhere while a request is pending
    let (_, request) = app
        .post(
            &format!("/api/leads/{}/transfer-requests", lead_id),
            json!({ "to_counsellor_id": b }),
        )
        .await;
    app.post(
        &format!("/api/leads/{}/transfer", lead_id),
        json!({ "to_counsellor_id": c }),
    )
    .await;
    let (status, _) = app
        .post(&format!("/api/transfers/{}/approve", request["id"]), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.owner_of(lead_id).await, Some(c));

    let unowned = app.create_lead(json!({ "first_name": "Nobody" })).await;
    let (status, _) = app
        .post(
            &format!("/api/leads/{}/transfer-requests", unowned["id"]),
            json!({ "to_counsellor_id": b }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Businesses
// =============================================================================

#[tokio::test]
async fn test_create_business_closes_lead() {
    let app = setup_app().await;
    let counsellor = app.create_counsellor("E1").await;
    let lead = app
        .create_lead(json!({
            "first_name": "Ada",
            "assigned_counsellor_id": counsellor,
            "expected_value": 4000.0
        }))
        .await;

    let (status, business) = app
        .post(
            &format!("/api/leads/{}/business", lead["id"]),
            json!({
                "title": "Annual plan",
                "value": 5000.0,
                "start_date": "2026-01-01",
                "end_date": "2026-12-31",
                "payment_terms": "Net 30"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", business);
    let code = business["business_code"].as_str().unwrap();
    assert!(crm_common::ids::is_business_code(code), "bad business code {}", code);
    assert_eq!(business["counsellor_id"], counsellor);
    assert_eq!(business["status"], "ACTIVE");
    assert_eq!(business["start_date"], "2026-01-01");
    assert_eq!(business["value"], 5000.0);

    let (_, detail) = app.get(&format!("/api/leads/{}", lead["id"])).await;
    assert_eq!(detail["status"], "CLOSED_WON");
    assert_eq!(detail["actual_value"], 5000.0);
    assert_eq!(detail["expected_value"], 4000.0);
}

#[tokio::test]
async fn test_create_business_validation() {
    let app = setup_app().await;
    let counsellor = app.create_counsellor("E1").await;
    let owned = app
        .create_lead(json!({ "first_name": "Ada", "assigned_counsellor_id": counsellor }))
        .await;
    let unowned = app.create_lead(json!({ "first_name": "Grace" })).await;

    let (status, _) = app
        .post(
            &format!("/api/leads/{}/business", unowned["id"]),
            json!({ "title": "Deal", "value": 10.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/leads/{}/business", owned["id"]);
    let (status, _) = app.post(&uri, json!({ "title": " ", "value": 10.0 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.post(&uri, json!({ "title": "Deal", "value": -1.0 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .post(&uri, json!({ "title": "Deal", "end_date": "2000-01-01" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/api/leads/999/business", json!({ "title": "Deal" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Nothing was closed by the rejected requests
    let (_, detail) = app.get(&format!("/api/leads/{}", owned["id"])).await;
    assert_eq!(detail["status"], "NEW");
    assert!(detail["actual_value"].is_null());
}

#[tokio::test]
async fn test_business_list_detail_and_status() {
    let app = setup_app().await;
    let a = app.create_counsellor("E1").await;
    let b = app.create_counsellor("E2").await;
    let mut business_ids = Vec::new();
    for (name, owner) in [("Ada", a), ("Grace", a), ("Linus", b)] {
        let lead = app
            .create_lead(json!({ "first_name": name, "assigned_counsellor_id": owner }))
            .await;
        let (_, business) = app
            .post(
                &format!("/api/leads/{}/business", lead["id"]),
                json!({ "title": format!("{} deal", name), "value": 100.0 }),
            )
            .await;
        business_ids.push(business["id"].as_i64().unwrap());
    }

    let (status, updated) = app
        .post(
            &format!("/api/businesses/{}/status", business_ids[0]),
            json!({ "status": "completed" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", updated);
    assert_eq!(updated["status"], "COMPLETED");

    let (_, all) = app.get("/api/businesses").await;
    assert_eq!(all.as_array().unwrap().len(), 3);
    let (_, mine) = app.get(&format!("/api/businesses?counsellor_id={}", a)).await;
    assert_eq!(mine.as_array().unwrap().len(), 2);
    let (_, active) = app
        .get(&format!("/api/businesses?counsellor_id={}&status=ACTIVE", a))
        .await;
    assert_eq!(active.as_array().unwrap().len(), 1);
    assert_eq!(active[0]["title"], "Grace deal");

    let (status, _) = app.get("/api/businesses?status=PAUSED").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, detail) = app.get(&format!("/api/businesses/{}", business_ids[2])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["counsellor_id"], b);

    let (status, _) = app.get("/api/businesses/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .post(&format!("/api/businesses/{}/status", business_ids[1]), json!({ "status": "PAUSED" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .post("/api/businesses/999/status", json!({ "status": "CANCELLED" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
