use super::*;
use axum::{
    body::{self, Body},
    http::Request,
};
use shared::{error::ErrorCode, protocol::OutputState};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "csv-route-test-boundary";

fn test_app(max_upload_bytes: usize) -> (Router, TempDir) {
    let upload_root = tempfile::tempdir().expect("tempdir");
    let state = AppState {
        sessions: SessionRegistry::new(upload_root.path().to_path_buf(), Duration::hours(1)),
        max_upload_bytes,
    };
    (build_router(Arc::new(state)), upload_root)
}

fn cookie_from(response: &Response) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .expect("set-cookie")
        .to_string()
}

async fn start_session(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    cookie_from(&response)
}

fn upload_request(cookie: &str, filename: &str, contents: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"data_file\"; filename=\"{filename}\"\r\nContent-Type: text/csv\r\n\r\n{contents}\r\n--{BOUNDARY}--\r\n"
    );
    Request::post("/upload")
        .header(header::COOKIE, cookie)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .expect("request")
}

async fn upload(app: &Router, cookie: &str, filename: &str, contents: &str) {
    let response = app
        .clone()
        .oneshot(upload_request(cookie, filename, contents))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(header::LOCATION).expect("location"),
        "/"
    );
}

async fn set_header_flag(app: &Router, cookie: &str, header_on: bool) {
    let body = if header_on { "header=on" } else { "" };
    let request = Request::post("/header")
        .header(header::COOKIE, cookie)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

async fn snapshot(app: &Router, cookie: &str) -> SessionSnapshot {
    let request = Request::get("/api/session")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

async fn page(app: &Router, cookie: &str) -> String {
    let request = Request::get("/")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8")
}

fn table(output: OutputState) -> shared::protocol::TableView {
    match output {
        OutputState::Rendered { table, .. } => table,
        other => panic!("expected rendered output, got {other:?}"),
    }
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (app, _root) = test_app(1024);
    let response = app
        .oneshot(Request::get("/healthz").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn first_visit_starts_an_idle_session() {
    let (app, _root) = test_app(1024);
    let cookie = start_session(&app).await;
    assert!(cookie.starts_with("csv_session="));

    let snap = snapshot(&app, &cookie).await;
    assert!(snap.header);
    assert!(snap.data_file.is_none());
    assert_eq!(snap.output, OutputState::Idle);

    let html = page(&app, &cookie).await;
    assert!(html.contains("CSV File Uploader"));
    assert!(!html.contains("<table"));
    assert!(!html.contains("text-danger\">Error"));
}

#[tokio::test]
async fn upload_with_header_renders_table() {
    let (app, _root) = test_app(4096);
    let cookie = start_session(&app).await;
    upload(&app, &cookie, "people.csv", "name,age\nalice,30\nbob,41").await;

    let snap = snapshot(&app, &cookie).await;
    assert_eq!(snap.data_file.as_ref().map(|f| f.name.as_str()), Some("people.csv"));
    let view = table(snap.output);
    assert_eq!(view.columns, vec!["name", "age"]);
    assert_eq!(view.rows.len(), 2);

    let html = page(&app, &cookie).await;
    assert!(html.contains("<th>name</th><th>age</th>"));
    assert!(html.contains("<td>alice</td><td>30</td>"));
}

#[tokio::test]
async fn header_toggle_reparses_without_reupload() {
    let (app, _root) = test_app(4096);
    let cookie = start_session(&app).await;
    upload(&app, &cookie, "people.csv", "name,age\nalice,30\nbob,41").await;

    set_header_flag(&app, &cookie, false).await;
    let snap = snapshot(&app, &cookie).await;
    assert!(!snap.header);
    let view = table(snap.output);
    assert_eq!(view.columns, vec!["0", "1"]);
    assert_eq!(view.rows.len(), 3);

    set_header_flag(&app, &cookie, true).await;
    let view = table(snapshot(&app, &cookie).await.output);
    assert_eq!(view.rows.len(), 2);
}

#[tokio::test]
async fn second_upload_replaces_table() {
    let (app, _root) = test_app(4096);
    let cookie = start_session(&app).await;
    upload(&app, &cookie, "first.csv", "a,b\n1,2\n3,4").await;
    upload(&app, &cookie, "second.csv", "c\n9").await;

    let snap = snapshot(&app, &cookie).await;
    assert_eq!(snap.data_file.expect("file").name, "second.csv");
    let view = table(snap.output);
    assert_eq!(view.columns, vec!["c"]);
    assert_eq!(view.rows, vec![vec!["9".to_string()]]);
}

#[tokio::test]
async fn malformed_csv_shows_error_instead_of_table() {
    let (app, _root) = test_app(4096);
    let cookie = start_session(&app).await;
    upload(&app, &cookie, "broken.csv", "a,b\n1,\"never closed\n2,3").await;

    match snapshot(&app, &cookie).await.output {
        OutputState::Failed { error } => assert_eq!(error.code, ErrorCode::DataFormat),
        other => panic!("expected failure, got {other:?}"),
    }

    let html = page(&app, &cookie).await;
    assert!(html.contains("Error: Error tokenizing data."));
    assert!(!html.contains("<table"));
}

#[tokio::test]
async fn upload_without_file_is_rejected() {
    let (app, _root) = test_app(4096);
    let cookie = start_session(&app).await;
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nvalue\r\n--{BOUNDARY}--\r\n"
    );
    let request = Request::post("/upload")
        .header(header::COOKIE, cookie.as_str())
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(snapshot(&app, &cookie).await.output, OutputState::Idle);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let (app, _root) = test_app(64);
    let cookie = start_session(&app).await;
    let contents = "x\n".repeat(200);
    let response = app
        .clone()
        .oneshot(upload_request(&cookie, "big.csv", &contents))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn sessions_do_not_share_uploads() {
    let (app, _root) = test_app(4096);
    let alice = start_session(&app).await;
    let bob = start_session(&app).await;
    assert_ne!(alice, bob);

    upload(&app, &alice, "alice.csv", "a\n1").await;
    assert_eq!(snapshot(&app, &bob).await.output, OutputState::Idle);
}

#[tokio::test]
async fn unknown_cookie_gets_a_fresh_session() {
    let (app, _root) = test_app(1024);
    let request = Request::get("/")
        .header(
            header::COOKIE,
            format!("csv_session={}", SessionId::new_v4()),
        )
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_some());
}
