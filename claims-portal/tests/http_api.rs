use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use claims_portal::backend::{InMemoryBackend, InMemoryDocumentStore};
use claims_portal::models::PolicyHolder;
use claims_portal::{AppState, build_router};
use portal_flow::InMemorySessionStorage;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn app() -> Router {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_policy_holder(
        "00726281",
        PolicyHolder {
            id: "ph-1".to_string(),
            name: Some("Mary Kila".to_string()),
            has_bank_details: Some(true),
            ..Default::default()
        },
    );
    let state = AppState::new(
        backend.clone(),
        Arc::new(InMemoryDocumentStore::new()),
        backend,
        Arc::new(InMemorySessionStorage::new()),
        Duration::from_millis(10),
    );
    build_router(state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header("x-user-id", user);
    }
    if uri.starts_with("/admin") {
        request = request.header("x-user-role", "admin");
    }
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn health_is_public() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn missing_identity_points_to_sign_in() {
    let app = app();
    let (status, body) = send(&app, Method::POST, "/claims/sessions", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["redirect"], "/auth/sign-in");

    let (status, _) = send(&app, Method::GET, "/claims/types", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn claim_sheet_over_http() {
    let app = app();
    let (status, view) = send(
        &app,
        Method::POST,
        "/claims/sessions",
        Some("prov-1"),
        Some(json!({ "isPsna": false })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(view["stage"], "no_employee");
    let session_id = view["sessionId"].as_str().unwrap().to_string();
    let events = format!("/claims/sessions/{session_id}/events");

    let (status, outcome) = send(
        &app,
        Method::POST,
        &events,
        Some("prov-1"),
        Some(json!({ "type": "search_employee", "employee_number": "00726281" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["view"]["stage"], "selecting_claim_type");
    assert_eq!(outcome["view"]["employeeLookup"]["state"], "valid");

    let (status, outcome) = send(
        &app,
        Method::POST,
        &events,
        Some("prov-1"),
        Some(json!({ "type": "choose_claim_type", "code": "3" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["view"]["stage"], "main_form");

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/claims/sessions/{session_id}"),
        Some("prov-2"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, view) = send(
        &app,
        Method::DELETE,
        &format!("/claims/sessions/{session_id}"),
        Some("prov-1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["stage"], "no_employee");
    assert_eq!(view["draft"]["claimTypeCode"], Value::Null);

    let (status, _) = send(
        &app,
        Method::GET,
        "/claims/sessions/does-not-exist",
        Some("prov-1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn registration_over_http() {
    let app = app();
    let (status, registration) = send(
        &app,
        Method::POST,
        "/registrations",
        Some("prov-1"),
        Some(json!({ "kind": "private_practice" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(registration["status"], "draft");
    let id = registration["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/registrations/{id}/draft"),
        Some("prov-1"),
        Some(json!(["not", "an", "object"])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, draft) = send(
        &app,
        Method::PUT,
        &format!("/registrations/{id}/draft"),
        Some("prov-1"),
        Some(json!({ "practiceName": "Kila Clinic", "contact": { "phone": "call me" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(draft["fieldErrors"]["contact.phone"], "Invalid phone number");
    assert_eq!(draft["progress"]["completed"], 1);

    let (status, progress) = send(
        &app,
        Method::GET,
        &format!("/registrations/{id}/progress"),
        Some("prov-1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["completed"], 1);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/registrations/{id}/submit"),
        Some("prov-1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["fieldErrors"]["practiceType"], "Required");

    let (status, listed) = send(
        &app,
        Method::GET,
        "/admin/registrations?status=draft",
        Some("admin-1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let (status, _) = send(
        &app,
        Method::GET,
        "/admin/registrations?status=archived",
        Some("admin-1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/admin/registrations/{id}/approve"),
        Some("admin-1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn progress_badges_follow_query_position() {
    let app = app();
    let (_, registration) = send(
        &app,
        Method::POST,
        "/registrations",
        Some("prov-1"),
        Some(json!({ "kind": "private_practice" })),
    )
    .await;
    let id = registration["id"].as_str().unwrap().to_string();
    let progress = format!("/registrations/{id}/progress");

    let (status, report) = send(&app, Method::GET, &progress, Some("prov-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    let subsections = report["subsections"].as_array().unwrap().clone();
    assert!(subsections.iter().all(|s| s["showWarning"] == false));

    let (_, report) = send(
        &app,
        Method::GET,
        &format!("{progress}?currentStep=1"),
        Some("prov-1"),
        None,
    )
    .await;
    for subsection in report["subsections"].as_array().unwrap() {
        let past = subsection["stepIndex"] == 0;
        assert_eq!(subsection["showWarning"], past, "{subsection}");
    }

    let later = subsections
        .iter()
        .find(|s| s["stepIndex"] == 1)
        .and_then(|s| s["subsectionId"].as_str())
        .unwrap()
        .to_string();
    let (_, report) = send(
        &app,
        Method::GET,
        &format!("{progress}?visited={later}"),
        Some("prov-1"),
        None,
    )
    .await;
    let badges: Vec<&str> = report["subsections"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|s| s["showWarning"] == true)
        .filter_map(|s| s["subsectionId"].as_str())
        .collect();
    assert_eq!(badges, vec![later.as_str()]);
}

#[tokio::test]
async fn admin_routes_need_admin_role() {
    let app = app();
    let request = Request::builder()
        .method(Method::GET)
        .uri("/admin/registrations")
        .header("x-user-id", "prov-1")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
