use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, Method},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use habitat_shared::{Caller, IssueId};
use habitat_store::Issue;

use crate::access::{authenticate, AccessResolver};
use crate::config::ServerConfig;
use crate::engine::IssueEngine;
use crate::error::ServerError;
use crate::media::{MediaStore, RawImage};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<IssueEngine>,
    pub media: Arc<MediaStore>,
    pub access: Arc<dyn AccessResolver>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    async fn caller(&self, headers: &HeaderMap) -> Result<Caller, ServerError> {
        authenticate(headers, &self.config.principal_header, self.access.as_ref()).await
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let body_limit = state.config.max_request_body();

    Router::new()
        .route("/health", get(health_check))
        .route("/issues", get(list_issues))
        .route("/issues/create", post(create_issue))
        .route("/issues/confirm/:issue_id", post(confirm_issue))
        .route("/issues/close/:issue_id", post(close_issue))
        .route("/media/:id", get(media_download))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Residents get their own issues, every other role gets all of them.
async fn list_issues(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<Issue>>, ServerError> {
    let caller = state.caller(&headers).await?;
    let listing = state.engine.list_for(&caller).await?;
    Ok(Json(Vec::clone(&listing)))
}

async fn create_issue(
    headers: HeaderMap,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(), ServerError> {
    let caller = state.caller(&headers).await?;

    let mut content: Option<String> = None;
    let mut images = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "content" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| {
                        ServerError::BadRequest(format!("Failed to read content: {}", e))
                    })?;
                content = Some(text);
            }
            "images" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Failed to read image: {}", e)))?;
                let mut image = RawImage::new(data);
                image.file_name = file_name;
                image.content_type = content_type;
                images.push(image);
            }
            _ => {}
        }
    }

    let content = content.ok_or_else(|| {
        ServerError::BadRequest("Missing 'content' field in multipart form".to_string())
    })?;

    let issue = state.engine.submit(&caller, &content, images).await?;
    info!(issue_id = %issue.id, reporter = %caller.username, "Issue created via API");
    Ok(())
}

async fn confirm_issue(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(issue_id): Path<i64>,
) -> Result<(), ServerError> {
    let caller = state.caller(&headers).await?;
    state.engine.confirm(&caller, IssueId(issue_id)).await
}

async fn close_issue(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(issue_id): Path<i64>,
) -> Result<(), ServerError> {
    let caller = state.caller(&headers).await?;
    state.engine.close(&caller, IssueId(issue_id)).await
}

async fn media_download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServerError> {
    let data = state.media.get_image(id).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
