//! HTTP router for the workspace API.
//!
//! Every handled request goes through the same pipeline: extract credentials,
//! ask the [`AuthAuthority`], locate the agent's workspace, then run the
//! operation, which resolves and confines its target before touching disk.
//! Request shapes the API does not define answer with a plain 404 before any
//! of that happens.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use protocol::{FileEntry, OkResponse, WorkspaceQuery};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::auth::{AuthAuthority, Credentials, StaticTokenAuthority};
use crate::config::{Config, DEFAULT_MAX_TEXT_BYTES};
use crate::error::{GatewayError, Result};
use crate::workspace::{AgentId, DirectoryLocator, Download, Workspace, WorkspaceLocator};

/// Path prefix of text endpoints under `/api/workspace`.
const TEXT_PREFIX: &str = "text/";

/// Path of the upload endpoint under `/api/workspace`.
const UPLOAD_PATH: &str = "upload";

/// Characters left unescaped in an RFC 5987 `filename*` value.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Decides whether callers are allowed in.
    authority: Arc<dyn AuthAuthority>,
    /// Maps agents to workspace roots.
    locator: Arc<dyn WorkspaceLocator>,
    /// Agent used when a request names none.
    default_agent: AgentId,
    /// Request body cap for multipart uploads.
    max_upload_bytes: u64,
    /// Request body cap for text writes, which are buffered whole.
    max_text_bytes: u64,
}

impl AppState {
    /// Create state from explicit collaborators.
    ///
    /// The text write cap defaults to the smaller of
    /// [`DEFAULT_MAX_TEXT_BYTES`] and `max_upload_bytes`.
    pub fn new(
        authority: Arc<dyn AuthAuthority>,
        locator: Arc<dyn WorkspaceLocator>,
        default_agent: AgentId,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            authority,
            locator,
            default_agent,
            max_upload_bytes,
            max_text_bytes: DEFAULT_MAX_TEXT_BYTES.min(max_upload_bytes),
        }
    }

    /// Override the text write cap.
    pub fn with_max_text_bytes(mut self, max_text_bytes: u64) -> Self {
        self.max_text_bytes = max_text_bytes;
        self
    }

    /// Create state backed by the static token authority and directory locator.
    pub fn from_config(config: &Config) -> std::result::Result<Self, crate::config::ConfigError> {
        Ok(Self::new(
            Arc::new(StaticTokenAuthority::from_config(&config.auth)),
            Arc::new(DirectoryLocator::new(&config.workspace.base_dir)),
            config.default_agent()?,
            config.workspace.max_upload_bytes,
        )
        .with_max_text_bytes(config.workspace.max_text_bytes))
    }

    /// Authorize the caller and locate the requested workspace.
    async fn open_workspace(&self, headers: &HeaderMap, query: &WorkspaceQuery) -> Result<Workspace> {
        let credentials = Credentials::from_request(headers, query);
        let principal = self
            .authority
            .authorize(&credentials)
            .await
            .map_err(|e| GatewayError::Unauthorized(e.to_string()))?;

        let agent = match query.agent_id.as_deref().filter(|id| !id.is_empty()) {
            Some(raw) => AgentId::parse(raw)?,
            None => self.default_agent.clone(),
        };

        let root = self.locator.locate(&agent).await?;
        debug!(agent = %agent, user = ?principal.username, "Opened workspace");

        Ok(Workspace::new(agent, root))
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/workspace", get(list_directory).fallback(not_found))
        .route(
            "/api/workspace/*rest",
            get(get_entry)
                .put(put_entry)
                .delete(delete_entry)
                .post(post_entry)
                .fallback(not_found),
        )
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// `GET /api/workspace?path=<dir>`
async fn list_directory(
    State(state): State<AppState>,
    Query(query): Query<WorkspaceQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<FileEntry>>> {
    let workspace = state.open_workspace(&headers, &query).await?;
    let entries = workspace.list(query.path.as_deref().unwrap_or("")).await?;
    Ok(Json(entries))
}

/// `GET /api/workspace/text/<name>` reads text, any other name downloads.
async fn get_entry(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    Query(query): Query<WorkspaceQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    let workspace = state.open_workspace(&headers, &query).await?;

    if let Some(name) = rest.strip_prefix(TEXT_PREFIX) {
        let text = workspace.read_text(name).await?;
        return Ok((
            [(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))],
            text,
        )
            .into_response());
    }

    let download = workspace.download(&rest).await?;
    Ok(download_response(download))
}

/// `PUT /api/workspace/text/<name>`
async fn put_entry(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    Query(query): Query<WorkspaceQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response> {
    let Some(name) = rest.strip_prefix(TEXT_PREFIX) else {
        return Ok(not_found().await.into_response());
    };

    let workspace = state.open_workspace(&headers, &query).await?;
    check_declared_length(&headers, state.max_text_bytes)?;
    let content = read_body(body, state.max_text_bytes).await?;

    workspace.write_text(name, &content).await?;
    info!(agent = %workspace.agent(), path = name, bytes = content.len(), "Saved text file");

    Ok(Json(OkResponse::ok()).into_response())
}

/// `DELETE /api/workspace/<name>`
async fn delete_entry(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    Query(query): Query<WorkspaceQuery>,
    headers: HeaderMap,
) -> Result<Json<OkResponse>> {
    let workspace = state.open_workspace(&headers, &query).await?;
    workspace.delete(&rest).await?;
    info!(agent = %workspace.agent(), path = %rest, "Deleted workspace entry");
    Ok(Json(OkResponse::ok()))
}

/// `POST /api/workspace/upload?path=<dir>`
async fn post_entry(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    Query(query): Query<WorkspaceQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response> {
    if rest != UPLOAD_PATH {
        return Ok(not_found().await.into_response());
    }

    let workspace = state.open_workspace(&headers, &query).await?;

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| GatewayError::BadRequest("missing multipart Content-Type".to_string()))?;
    let boundary = protocol::parse_boundary(content_type)?;
    check_declared_length(&headers, state.max_upload_bytes)?;

    let files = workspace
        .ingest(
            query.path.as_deref().unwrap_or(""),
            &boundary,
            body.into_data_stream(),
            state.max_upload_bytes,
        )
        .await?;

    Ok(Json(OkResponse::with_files(files)).into_response())
}

/// Reject bodies whose declared length already exceeds the cap.
fn check_declared_length(headers: &HeaderMap, limit: u64) -> Result<()> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    match declared {
        Some(len) if len > limit => Err(GatewayError::PayloadTooLarge { limit }),
        _ => Ok(()),
    }
}

/// Collect a request body, enforcing the size cap while streaming.
async fn read_body(body: Body, limit: u64) -> Result<Bytes> {
    let mut stream = std::pin::pin!(body.into_data_stream());
    let mut buffer = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| GatewayError::BadRequest(format!("failed to read request body: {e}")))?;
        if (buffer.len() + chunk.len()) as u64 > limit {
            return Err(GatewayError::PayloadTooLarge { limit });
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(buffer.freeze())
}

fn download_response(download: Download) -> Response {
    (
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (CONTENT_DISPOSITION, content_disposition(&download.file_name)),
            (CONTENT_LENGTH, HeaderValue::from(download.len)),
        ],
        Body::from_stream(download.stream),
    )
        .into_response()
}

/// `attachment` disposition carrying the file name.
///
/// The quoted `filename` is ASCII only, with `"` and `\` escaped; non-ASCII
/// names also get an RFC 5987 `filename*`.
fn content_disposition(file_name: &str) -> HeaderValue {
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '_' })
        .collect::<String>()
        .replace('\\', "\\\\")
        .replace('"', "\\\"");

    let mut value = format!("attachment; filename=\"{ascii}\"");
    if !file_name.is_ascii() {
        value.push_str("; filename*=UTF-8''");
        value.extend(utf8_percent_encode(file_name, ATTR_CHAR));
    }

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
