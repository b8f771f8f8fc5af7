use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        DefaultBodyLimit, Multipart, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Duration;
use shared::{
    domain::SessionId,
    protocol::{ServerEvent, SessionSnapshot},
};
use tokio::sync::broadcast::error::RecvError;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;
mod page;

use api::{
    internal, read_data_file, session_cookie, session_id_from_headers, store_upload, HeaderForm,
    HttpError,
};
use app_state::{AppState, SessionHandle, SessionRegistry};
use config::{load_settings, prepare_upload_root};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = load_settings();
    let upload_root = prepare_upload_root(settings.upload_root.as_deref())?;
    info!(upload_root = %upload_root.display(), "upload directory ready");

    let state = AppState {
        sessions: SessionRegistry::new(
            upload_root,
            Duration::seconds(settings.session_idle_ttl_seconds),
        ),
        max_upload_bytes: settings.max_upload_bytes,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    let max_upload_bytes = state.max_upload_bytes;
    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .route("/header", post(set_header))
        .route("/api/session", get(session_snapshot))
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Finds the caller's session from the cookie, starting a new one if needed.
/// The returned id is `Some` only when the response must set the cookie.
async fn open_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(SessionHandle, Option<SessionId>), HttpError> {
    let (id, handle, created) = state
        .sessions
        .resolve(session_id_from_headers(headers))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(internal(e))))?;
    Ok((handle, created.then_some(id)))
}

fn with_cookie(response: impl IntoResponse, new_session: Option<SessionId>) -> Response {
    let mut response = response.into_response();
    if let Some(id) = new_session {
        response
            .headers_mut()
            .insert(header::SET_COOKIE, session_cookie(id));
    }
    response
}

async fn index(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let (handle, new_session) = open_session(&state, &headers).await?;
    let snapshot = {
        let mut session = handle.lock().await;
        session.touch();
        session.snapshot()
    };
    Ok(with_cookie(Html(page::render_page(&snapshot)), new_session))
}

async fn upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, HttpError> {
    let (handle, new_session) = open_session(&state, &headers).await?;
    let file = read_data_file(&mut multipart).await?;

    {
        let mut session = handle.lock().await;
        session.touch();
        store_upload(&mut session, &file)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(e)))?;
    }
    Ok(with_cookie(Redirect::to("/"), new_session))
}

async fn set_header(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<HeaderForm>,
) -> Result<Response, HttpError> {
    let (handle, new_session) = open_session(&state, &headers).await?;
    {
        let mut session = handle.lock().await;
        session.touch();
        session.set_header(form.checked());
    }
    Ok(with_cookie(Redirect::to("/"), new_session))
}

async fn session_snapshot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let (handle, new_session) = open_session(&state, &headers).await?;
    let snapshot: SessionSnapshot = {
        let mut session = handle.lock().await;
        session.touch();
        session.snapshot()
    };
    Ok(with_cookie(Json(snapshot), new_session))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let (handle, new_session) = open_session(&state, &headers).await?;
    let response = ws.on_upgrade(move |socket| ws_connection(handle, socket));
    Ok(with_cookie(response, new_session))
}

async fn ws_connection(handle: SessionHandle, socket: WebSocket) {
    use futures::{SinkExt, StreamExt};

    // Subscribe before reading the output so no re-render slips between.
    let (mut events_rx, initial) = {
        let mut session = handle.lock().await;
        let events_rx = session.subscribe();
        let output = session.output();
        debug!(session = %session.id(), "output listener connected");
        (events_rx, ServerEvent::OutputUpdated { output })
    };
    drop(handle);

    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        if let Ok(text) = serde_json::to_string(&initial) {
            if sender.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                // Only the latest output matters; skipped renders are stale.
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "output listener lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
