use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Request, State, rejection::JsonRejection},
    http::{
        HeaderName, Method, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use muse_core::{
    DeleteRequest, ErrorResponse, MessageResponse, Note, NoteAction, SyncCursor, SyncResponse,
    Tag, ValidationError, now_millis,
};
use muse_db::{DbError, NoteRepository, RemoteTagCounter, TagRepository};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn};

use crate::state::AppState;

const API_KEY_HEADER: &str = "x-api-key";

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Errors returned by the note endpoint, always as `{"error": ...}`
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Note not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Store(#[from] DbError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(e) => {
                error!("Note store error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Run the HTTP server
pub async fn run(state: Arc<AppState>, bind_addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Create the router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let notes = Router::new()
        .route(
            "/notes",
            get(list_notes_handler)
                .post(note_action_handler)
                .delete(delete_note_handler),
        )
        .route("/notes/{id}", get(get_note_handler))
        .route("/tags", get(list_tags_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .merge(notes)
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::OPTIONS, Method::POST, Method::GET, Method::DELETE])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static("x-amz-date"),
            AUTHORIZATION,
            HeaderName::from_static(API_KEY_HEADER),
            HeaderName::from_static("x-amz-security-token"),
        ])
}

async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if !state.is_authorized(presented) {
        warn!("Rejected {} {}: bad API key", request.method(), request.uri().path());
        return ApiError::Forbidden.into_response();
    }

    next.run(request).await
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /notes - `saveNote` or `syncNotes`
async fn note_action_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NoteAction>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(action) = payload?;

    match action {
        NoteAction::SaveNote { note } => {
            let saved = save_note(&state, note).await?;
            Ok(Json(saved).into_response())
        }
        NoteAction::SyncNotes { note } => {
            let response = sync_notes(&state, note).await?;
            Ok(Json(response).into_response())
        }
    }
}

async fn save_note(state: &AppState, note: Note) -> Result<Note, ApiError> {
    note.validate()?;

    let _guard = state.lock_writes().await;
    let saved = RemoteTagCounter::apply_save(state.db.pool(), note).await?;
    info!("Saved note {} ({} tags)", saved.id, saved.tag_ids.len());
    Ok(saved)
}

async fn sync_notes(state: &AppState, cursor: SyncCursor) -> Result<SyncResponse, ApiError> {
    let _guard = state.lock_writes().await;

    let scan_start = now_millis();
    let notes = NoteRepository::list_modified_after(state.db.pool(), cursor.last_sync).await?;
    debug!(
        "Sync scan after {} returned {} notes",
        cursor.last_sync,
        notes.len()
    );

    Ok(SyncResponse {
        notes,
        sync_timestamp: scan_start - 1,
    })
}

/// GET /notes - full scan
async fn list_notes_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Note>>, ApiError> {
    Ok(Json(NoteRepository::list(state.db.pool()).await?))
}

/// GET /notes/{id}
async fn get_note_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Note>, ApiError> {
    NoteRepository::get(state.db.pool(), &id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound(id))
}

/// DELETE /notes - body `{"id": ...}`; unknown ids succeed
async fn delete_note_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = payload?;

    let _guard = state.lock_writes().await;
    let existed = RemoteTagCounter::apply_delete(state.db.pool(), &request.id).await?;
    info!("Deleted note {} (existed: {})", request.id, existed);

    Ok(Json(MessageResponse {
        message: "Note deleted successfully".to_string(),
    }))
}

/// GET /tags
async fn list_tags_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Tag>>, ApiError> {
    Ok(Json(TagRepository::list(state.db.pool()).await?))
}
