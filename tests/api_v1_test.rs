/// Integration tests for the REST API v1 surface, served by the in-memory
/// repository: routing, actor and content-type guards, status codes and
/// error bodies.

use actix_web::{App, http::StatusCode, test, web};
use chrono::Duration;
use serde_json::{Value, json};

use safeops::handlers;
use safeops::models::alert::AlertType;
use safeops::repository::{MemoryRepository, ProtocolRepository};

mod common;
use common::*;

macro_rules! init_app {
    ($engine:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($engine.service))
                .service(web::scope("/api/v1").configure(handlers::api_v1::configure::<MemoryRepository>))
                .default_service(web::to(handlers::not_found)),
        )
        .await
    };
}

fn post(uri: &str, body: Value) -> test::TestRequest {
    test::TestRequest::post()
        .uri(uri)
        .insert_header(("x-actor-id", RESPONDER.to_string()))
        .set_json(body)
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

#[actix_rt::test]
async fn test_mutation_without_actor_is_unauthorized() {
    let engine = setup_engine();
    let alert_id = engine.alert(AlertType::Panic).await;
    let app = init_app!(engine);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/alerts/{alert_id}/executions"))
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "missing_actor");

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/alerts/{alert_id}/executions"))
        .insert_header(("x-actor-id", "-3"))
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_mutation_requires_json_content_type() {
    let engine = setup_engine();
    let alert_id = engine.alert(AlertType::Panic).await;
    let app = init_app!(engine);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/alerts/{alert_id}/executions"))
        .insert_header(("x-actor-id", "42"))
        .insert_header(("content-type", "application/x-www-form-urlencoded"))
        .set_payload("template_id=1")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_reads_need_no_actor_and_unknown_routes_are_json_404() {
    let engine = setup_engine();
    let app = init_app!(engine);

    let req = test::TestRequest::get().uri("/api/v1/catalog/fire").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["alert_type"], "fire");
    assert_eq!(body["steps"].as_array().map(Vec::len), Some(10));
    assert_eq!(body["steps"][0]["order"], 1);

    let req = test::TestRequest::get().uri("/nowhere").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "not_found");
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[actix_rt::test]
async fn test_template_crud_over_http() {
    let engine = setup_engine();
    let app = init_app!(engine);

    let req = post(
        &format!("/api/v1/orgs/{ORG_ID}/templates"),
        json!({
            "alert_type": "security_breach",
            "name": "Night shift breach",
            "sla_minutes": 12,
            "steps": [
                {"title": "Call supervisor", "is_required": true},
                {"title": "Check cameras", "order": 7}
            ]
        }),
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    let id = created["id"].as_i64().expect("id");
    assert_eq!(created["steps"][1]["order"], 2);
    assert_eq!(created["is_active"], true);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/orgs/{ORG_ID}/templates/active/security_breach"))
        .to_request();
    let active: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(active["id"], id);

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/templates/{id}"))
        .insert_header(("x-actor-id", "7"))
        .set_json(json!({"name": "Breach"}))
        .to_request();
    let updated: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated["name"], "Breach");

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/orgs/{ORG_ID}/templates?alert_type=security_breach&per_page=1"))
        .to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["per_page"], 1);
    assert_eq!(page["items"][0]["name"], "Breach");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/templates/{id}"))
        .insert_header(("x-actor-id", "7"))
        .insert_header(("content-type", "application/json"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::get().uri(&format!("/api/v1/templates/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/orgs/{ORG_ID}/templates/active/security_breach"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "not_found");
    assert!(body["error"].as_str().is_some_and(|e| e.contains("security_breach")));
}

#[actix_rt::test]
async fn test_template_list_survives_huge_page_number() {
    let engine = setup_engine();
    engine.panic_template().await;
    let app = init_app!(engine);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/orgs/{ORG_ID}/templates?page={}", i64::MAX))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page: Value = test::read_body_json(resp).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"], json!([]));
}

#[actix_rt::test]
async fn test_catalog_sla_matches_catalog_execution_sla() {
    let engine = setup_engine();
    let alert_id = engine.alert(AlertType::Panic).await;
    let app = init_app!(engine);

    let req = test::TestRequest::get().uri("/api/v1/catalog/panic").to_request();
    let catalog: Value = test::call_and_read_body_json(&app, req).await;

    let req = post(&format!("/api/v1/alerts/{alert_id}/executions"), json!({})).to_request();
    let execution: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(execution["template_id"], Value::Null);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/executions/{}/sla", execution["id"]))
        .to_request();
    let sla: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(sla["sla_minutes"], catalog["sla_minutes"]);
}

#[actix_rt::test]
async fn test_template_validation_and_seed_conflict() {
    let engine = setup_engine();
    let app = init_app!(engine);

    let req = post(
        &format!("/api/v1/orgs/{ORG_ID}/templates"),
        json!({"alert_type": "fire", "name": "Fire", "sla_minutes": 10, "steps": [{"title": " "}]}),
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["field"], "steps[0].title");

    let req = post(&format!("/api/v1/orgs/{ORG_ID}/templates/seed"), json!({})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let seeded: Value = test::read_body_json(resp).await;
    assert_eq!(seeded.as_array().map(Vec::len), Some(AlertType::KNOWN.len()));

    let req = post(&format!("/api/v1/orgs/{ORG_ID}/templates/seed"), json!({})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "active_template_exists");
}

// ---------------------------------------------------------------------------
// Executions
// ---------------------------------------------------------------------------

#[actix_rt::test]
async fn test_execution_lifecycle_over_http() {
    let engine = setup_engine();
    engine.panic_template().await;
    let alert_id = engine.alert(AlertType::Panic).await;
    let repo = engine.repo.clone();
    let clock = engine.clock.clone();
    let app = init_app!(engine);

    let req = post(&format!("/api/v1/alerts/{alert_id}/executions"), json!({})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let execution: Value = test::read_body_json(resp).await;
    let id = execution["id"].as_i64().expect("id");
    assert_eq!(execution["status"], "in_progress");

    let req = post(&format!("/api/v1/alerts/{alert_id}/executions"), json!({})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["existing_id"], id);

    for order in [1, 2] {
        let req = post(&format!("/api/v1/executions/{id}/steps/{order}"), json!({"notes": "done"})).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let req = post(&format!("/api/v1/executions/{id}/steps/9"), json!({})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = post(&format!("/api/v1/executions/{id}/close"), json!({})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "required_steps_incomplete");
    assert_eq!(body["steps"], json!([4]));

    let req = post(&format!("/api/v1/executions/{id}/escalate"), json!({"reason": "weapon seen", "escalate_to": "Police"}))
        .to_request();
    let escalated: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(escalated["status"], "escalated");
    assert_eq!(escalated["escalation"]["escalated_to"], "Police");

    clock.advance(Duration::minutes(6));
    let req = test::TestRequest::get().uri(&format!("/api/v1/executions/{id}")).to_request();
    let detail: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(detail["steps"].as_array().map(Vec::len), Some(4));
    assert_eq!(detail["closure_eligibility"]["missing_required"], json!([4]));
    assert_eq!(detail["sla"]["overdue"], true);

    let req = post(&format!("/api/v1/executions/{id}/steps/4"), json!({"evidence_ref": "p1"})).to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get().uri(&format!("/api/v1/executions/{id}/closure")).to_request();
    let eligibility: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(eligibility["can_close"], true);

    let req = post(&format!("/api/v1/executions/{id}/close"), json!({"notes": "Resolved"})).to_request();
    let closed: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(closed["status"], "closed");

    let req = post(&format!("/api/v1/executions/{id}/steps/3"), json!({})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "execution_closed");

    let req = test::TestRequest::get().uri(&format!("/api/v1/executions/{id}/sla")).to_request();
    let sla: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(sla["overdue"], false);
    assert_eq!(sla["seconds_remaining"], Value::Null);

    let req = test::TestRequest::get().uri(&format!("/api/v1/alerts/{alert_id}/executions")).to_request();
    let history: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(history.as_array().map(Vec::len), Some(1));

    let alert = repo.find_alert(alert_id).await.expect("alert").expect("exists");
    assert_eq!(alert.resolution_notes.as_deref(), Some("Resolved"));
    assert!(alert.resolved_at.is_some());
}

#[actix_rt::test]
async fn test_escalate_without_reason_is_bad_request() {
    let engine = setup_engine();
    let alert_id = engine.alert(AlertType::General).await;
    let execution = engine.service.start_execution(alert_id, RESPONDER, None).await.expect("start");
    let app = init_app!(engine);

    let req = post(&format!("/api/v1/executions/{}/escalate", execution.id), json!({"reason": ""})).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["field"], "reason");
}
