use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use crate::errors::PipelineError;
use crate::pipeline::{Pipelines, ProgressStream};
use crate::services::SourceDocument;
use crate::store::models::NewCompany;
use crate::store::{IdentityKind, WorkspaceUpdate};
use crate::util::is_safe_segment;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub pipelines: Pipelines,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ContextQuery {
    pub kind: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub question: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

const DEFAULT_ACTIVITY_LIMIT: usize = 5;

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    BadGateway(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Precondition(msg) => ApiError::Conflict(msg),
            e @ (PipelineError::TransientExternal { .. } | PipelineError::PermanentExternal(_)) => {
                ApiError::BadGateway(e.to_string())
            }
            e => ApiError::Internal(e.to_string()),
        }
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    tracing::error!(error = %err, "request failed");
    ApiError::Internal(err.to_string())
}

fn check_id(id: &str) -> Result<(), ApiError> {
    if is_safe_segment(id) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("Invalid workspace id: {:?}", id)))
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/workspaces", get(list_workspaces))
        .route("/api/workspaces/sync", post(sync_workspace))
        .route(
            "/api/workspaces/{id}",
            get(get_workspace).delete(delete_workspace),
        )
        .route("/api/workspaces/{id}/analyze", post(analyze))
        .route("/api/workspaces/{id}/generate", post(generate))
        .route("/api/workspaces/{id}/context", post(upload_context))
        .route("/api/workspaces/{id}/logo", post(upload_logo))
        .route("/api/workspaces/{id}/validate-identity", post(validate_identity))
        .route("/api/workspaces/{id}/inconsistencies", get(get_inconsistencies))
        .route("/api/workspaces/{id}/files", get(list_files))
        .route("/api/workspaces/{id}/files/{*path}", get(download_file))
        .route("/api/workspaces/{id}/chat", post(chat))
        .route("/api/companies", post(create_company))
        .route("/api/companies/{rfc}", get(get_company))
        .route("/api/stats", get(stats))
        .route("/api/activity", get(activity))
}

// ── Helpers ───────────────────────────────────────────────────────────

/// Read the multipart field named `file`.
async fn read_upload(mut multipart: Multipart) -> Result<SourceDocument, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest("Upload has no file name".into()))?;
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;
        return Ok(SourceDocument::new(
            &filename,
            content_type.as_deref(),
            bytes.to_vec(),
        ));
    }
    Err(ApiError::BadRequest("Missing multipart field 'file'".into()))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy", "service": "licita"}))
}

async fn list_workspaces(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let workspaces = state
        .pipelines
        .db()
        .call(|db| db.list_workspaces())
        .await
        .map_err(internal)?;
    Ok(Json(workspaces))
}

async fn sync_workspace(
    State(state): State<SharedState>,
    Json(update): Json<WorkspaceUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    check_id(&update.id)?;
    update
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("{:#}", e)))?;
    let id = update.id.clone();
    let outcome = state
        .pipelines
        .db()
        .call(move |db| db.upsert_workspace(&update))
        .await
        .map_err(internal)?;
    Ok(Json(json!({"status": "success", "id": id, "outcome": outcome})))
}

async fn get_workspace(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    check_id(&id)?;
    let lookup = id.clone();
    let workspace = state
        .pipelines
        .db()
        .call(move |db| db.get_workspace(&lookup))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::NotFound(format!("Workspace {} not found", id)))?;
    Ok(Json(workspace))
}

async fn delete_workspace(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    check_id(&id)?;
    if !state.pipelines.delete_workspace(&id).await? {
        return Err(ApiError::NotFound(format!("Workspace {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn analyze(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<ProgressStream, ApiError> {
    check_id(&id)?;
    let doc = read_upload(multipart).await?;
    Ok(state.pipelines.spawn_analysis(&id, doc))
}

async fn generate(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<ProgressStream, ApiError> {
    check_id(&id)?;
    Ok(state.pipelines.spawn_generation(&id))
}

async fn upload_context(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<ContextQuery>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    check_id(&id)?;
    if query.kind.trim().eq_ignore_ascii_case("logo") {
        return save_logo(&state, &id, multipart).await.map(IntoResponse::into_response);
    }
    let kind: IdentityKind = query.kind.parse().map_err(ApiError::BadRequest)?;
    let doc = read_upload(multipart).await?;
    Ok(state
        .pipelines
        .spawn_context(&id, kind, doc, query.force)
        .into_response())
}

async fn upload_logo(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    check_id(&id)?;
    save_logo(&state, &id, multipart).await
}

async fn save_logo(
    state: &AppState,
    id: &str,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let doc = read_upload(multipart).await?;
    let path = state
        .pipelines
        .files()
        .save_logo(id, &doc.filename, &doc.bytes)
        .await
        .map_err(internal)?;
    let logo_path = path.to_string_lossy().to_string();
    let update = WorkspaceUpdate::new(id).logo_path(&logo_path);
    state
        .pipelines
        .db()
        .call(move |db| db.upsert_workspace(&update))
        .await
        .map_err(internal)?;
    Ok(Json(json!({
        "status": "success",
        "msg": "Logo guardado y vinculado.",
        "logo_path": logo_path,
    })))
}

async fn validate_identity(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    check_id(&id)?;
    let report = state.pipelines.validate_identity(&id).await?;
    Ok(Json(report))
}

async fn get_inconsistencies(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    check_id(&id)?;
    match state.pipelines.files().read_inconsistencies(&id).await {
        Ok(Some(report)) => return Ok(Json(report)),
        Ok(None) => {}
        Err(e) => tracing::warn!(workspace_id = %id, error = %e, "unreadable inconsistencias.json"),
    }
    let lookup = id.clone();
    state
        .pipelines
        .db()
        .call(move |db| db.get_workspace(&lookup))
        .await
        .map_err(internal)?
        .and_then(|w| w.inconsistencias)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No identity report for workspace {}", id)))
}

async fn list_files(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    check_id(&id)?;
    let files = state.pipelines.files().list_files(&id).await.map_err(internal)?;
    Ok(Json(files))
}

async fn download_file(
    State(state): State<SharedState>,
    Path((id, file_path)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    check_id(&id)?;
    let path = state
        .pipelines
        .files()
        .resolve_file(&id, &file_path)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("File not found: {}", file_path)))?;

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to read file: {}", e)))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, mime.essence_str().to_string())],
        bytes,
    ))
}

async fn chat(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_id(&id)?;
    if req.question.trim().is_empty() {
        return Err(ApiError::BadRequest("Question must not be empty".into()));
    }
    let answer = state
        .pipelines
        .answer_question(&id, &req.question, &req.sources)
        .await?;
    Ok(Json(answer))
}

async fn create_company(
    State(state): State<SharedState>,
    Json(company): Json<NewCompany>,
) -> Result<impl IntoResponse, ApiError> {
    if company.rfc.trim().is_empty() || company.razon_social.trim().is_empty() {
        return Err(ApiError::BadRequest("rfc and razon_social are required".into()));
    }
    let rfc = company.rfc.clone();
    let created = state
        .pipelines
        .db()
        .call(move |db| db.create_company(&company))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::Conflict(format!("Company {} already exists", rfc)))?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_company(
    State(state): State<SharedState>,
    Path(rfc): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lookup = rfc.clone();
    let company = state
        .pipelines
        .db()
        .call(move |db| db.get_company(&lookup))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::NotFound(format!("Company {} not found", rfc)))?;
    Ok(Json(company))
}

async fn stats(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state
        .pipelines
        .db()
        .call(|db| db.stats())
        .await
        .map_err(internal)?;
    Ok(Json(stats))
}

async fn activity(
    State(state): State<SharedState>,
    Query(query): Query<ActivityQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT);
    let activity = state
        .pipelines
        .db()
        .call(move |db| db.recent_activity(limit))
        .await
        .map_err(internal)?;
    Ok(Json(activity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::errors::ServiceError;
    use crate::services::{
        DocumentRenderer, DocxPayload, ExtractionUpdate, LlmClient, Services, TextExtractor,
    };
    use crate::store::{DbHandle, StoreDb};

    const BOUNDARY: &str = "licita-test-boundary";

    struct FixedExtractor;

    #[async_trait]
    impl TextExtractor for FixedExtractor {
        async fn extract(
            &self,
            _doc: &SourceDocument,
            _timeout: Duration,
            _on_update: &(dyn Fn(ExtractionUpdate) + Send + Sync),
        ) -> Result<String, ServiceError> {
            Ok("texto extraído".to_string())
        }
    }

    struct FixedLlm(&'static str);

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn generate(
            &self,
            _prompt: &str,
            _json_format: bool,
            _timeout: Duration,
        ) -> Result<String, ServiceError> {
            Ok(self.0.to_string())
        }
    }

    struct FixedRenderer;

    #[async_trait]
    impl DocumentRenderer for FixedRenderer {
        async fn render(
            &self,
            _payload: &DocxPayload,
            _timeout: Duration,
        ) -> Result<Vec<u8>, ServiceError> {
            Ok(b"PK".to_vec())
        }
    }

    fn test_app_with_llm(answer: &'static str) -> (TempDir, Router) {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.server.stream_poll_interval_ms = 20;
        let services = Services {
            extractor: Arc::new(FixedExtractor),
            llm: Arc::new(FixedLlm(answer)),
            renderer: Arc::new(FixedRenderer),
        };
        let db = DbHandle::new(StoreDb::new_in_memory().unwrap());
        let pipelines = Pipelines::new(Arc::new(config), services, db);
        let state = Arc::new(AppState { pipelines });
        (dir, api_router().with_state(state))
    }

    fn test_app() -> (TempDir, Router) {
        test_app_with_llm(
            r#"{"convocante": "CFE", "numero_licitacion": "LA-1/2024", "objeto": "Obra civil"}"#,
        )
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_lines(body: Body) -> Vec<serde_json::Value> {
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_upload(uri: &str, filename: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
             Content-Type: text/plain\r\n\r\n{c}\r\n--{b}--\r\n",
            b = BOUNDARY,
            f = filename,
            c = content
        );
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (_dir, app) = test_app();
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_list_workspaces_empty() {
        let (_dir, app) = test_app();
        let response = app.oneshot(get("/api/workspaces")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let workspaces: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert!(workspaces.is_empty());
    }

    #[tokio::test]
    async fn test_sync_then_get_workspace() {
        let (_dir, app) = test_app();
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/workspaces/sync",
                json!({"id": "ws-1", "name": "Obra Norte"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["outcome"], "inserted");

        let response = app.oneshot(get("/api/workspaces/ws-1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let workspace: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(workspace["name"], "Obra Norte");
        assert_eq!(workspace["status"], "created");
    }

    #[tokio::test]
    async fn test_get_missing_workspace_is_404() {
        let (_dir, app) = test_app();
        let response = app.oneshot(get("/api/workspaces/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert!(body["error"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_sync_rejects_unsafe_id() {
        let (_dir, app) = test_app();
        let response = app
            .oneshot(post_json("/api/workspaces/sync", json!({"id": ".."})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sync_rejects_malformed_json_column() {
        let (_dir, app) = test_app();
        app.clone()
            .oneshot(post_json(
                "/api/workspaces/sync",
                json!({"id": "ws-1", "analysis": {"convocante": "CFE"}}),
            ))
            .await
            .unwrap();

        for analysis in [json!("not json"), json!(["x"])] {
            let response = app
                .clone()
                .oneshot(post_json(
                    "/api/workspaces/sync",
                    json!({"id": "ws-1", "analysis": analysis}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body: serde_json::Value = body_json(response.into_body()).await;
            assert!(body["error"].as_str().unwrap().contains("analysis"));
        }
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/workspaces/sync",
                json!({"id": "ws-1", "analysis": "{ }"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get("/api/workspaces/ws-1")).await.unwrap();
        let workspace: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(workspace["analysis"]["convocante"], "CFE");
    }

    #[tokio::test]
    async fn test_delete_workspace() {
        let (_dir, app) = test_app();
        app.clone()
            .oneshot(post_json("/api/workspaces/sync", json!({"id": "ws-1"})))
            .await
            .unwrap();

        let delete = || {
            Request::builder()
                .method("DELETE")
                .uri("/api/workspaces/ws-1")
                .body(Body::empty())
                .unwrap()
        };
        let response = app.clone().oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = app.oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_analyze_text_upload_streams_ndjson() {
        let (_dir, app) = test_app();
        let response = app
            .clone()
            .oneshot(post_upload(
                "/api/workspaces/ws-1/analyze",
                "bases.txt",
                "Licitación pública vía CompraNet",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            crate::pipeline::NDJSON_CONTENT_TYPE
        );

        let events = body_lines(response.into_body()).await;
        let last = events.last().unwrap();
        assert_eq!(last["status"], "complete");
        assert!(last["msg"].as_str().unwrap().contains("LA-1_2024"));
        assert_eq!(last["analysis"]["convocante"], "CFE");
        assert_eq!(last["profile"]["tender"]["objeto"], "Obra civil");
        let terminal = events
            .iter()
            .filter(|e| e["status"] == "complete" || e["status"] == "error")
            .count();
        assert_eq!(terminal, 1);

        let response = app.oneshot(get("/api/workspaces/ws-1")).await.unwrap();
        let workspace: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(workspace["status"], "analyzed");
        assert_eq!(workspace["sources"][0]["filename"], "bases.txt");
    }

    #[tokio::test]
    async fn test_analyze_without_file_field_is_400() {
        let (_dir, app) = test_app();
        let body = format!("--{b}--\r\n", b = BOUNDARY);
        let request = Request::builder()
            .method("POST")
            .uri("/api/workspaces/ws-1/analyze")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_generate_without_analysis_streams_single_error() {
        let (_dir, app) = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/api/workspaces/ws-1/generate")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let events = body_lines(response.into_body()).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["status"], "error");
        assert!(
            events[0]["msg"]
                .as_str()
                .unwrap()
                .contains("No se encontró un análisis previo")
        );
    }

    #[tokio::test]
    async fn test_context_rejects_unknown_kind() {
        let (_dir, app) = test_app();
        let response = app
            .oneshot(post_upload(
                "/api/workspaces/ws-1/context?kind=pasaporte",
                "doc.txt",
                "x",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_context_cif_from_text() {
        let (_dir, app) = test_app_with_llm(
            r#"{"rfc": "ACM010101AB1", "razon_social": "ACME S.A. DE C.V.", "tipo_persona": "Moral"}"#,
        );
        let response = app
            .clone()
            .oneshot(post_upload(
                "/api/workspaces/ws-1/context?kind=cif",
                "cif.txt",
                "CONSTANCIA DE SITUACION FISCAL ACME",
            ))
            .await
            .unwrap();
        let events = body_lines(response.into_body()).await;
        let last = events.last().unwrap();
        assert_eq!(last["status"], "complete");
        assert_eq!(last["msg"], "CIF procesado y vinculado.");
        assert_eq!(last["data"]["rfc"], "ACM010101AB1");
        assert!(last["validation"]["estado"].is_string());

        let response = app
            .oneshot(get("/api/workspaces/ws-1/inconsistencies"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_logo_upload_records_path() {
        let (_dir, app) = test_app();
        let response = app
            .clone()
            .oneshot(post_upload("/api/workspaces/ws-1/logo", "logo.png", "PNG"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert!(body["logo_path"].as_str().unwrap().ends_with("logo_logo.png"));

        let response = app.oneshot(get("/api/workspaces/ws-1")).await.unwrap();
        let workspace: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(workspace["logo_path"], body["logo_path"]);
    }

    #[tokio::test]
    async fn test_inconsistencies_missing_is_404() {
        let (_dir, app) = test_app();
        let response = app
            .oneshot(get("/api/workspaces/ws-1/inconsistencies"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_validate_identity_without_documents() {
        let (_dir, app) = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/api/workspaces/ws-1/validate-identity")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report: serde_json::Value = body_json(response.into_body()).await;
        assert!(report["inconsistencias"].is_array());
    }

    #[tokio::test]
    async fn test_files_listing_and_download() {
        let (_dir, app) = test_app();
        app.clone()
            .oneshot(post_upload("/api/workspaces/ws-1/logo", "logo.png", "PNG"))
            .await
            .unwrap();

        let response = app.clone().oneshot(get("/api/workspaces/ws-1/files")).await.unwrap();
        let files: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["name"], "logo_logo.png");

        let response = app
            .clone()
            .oneshot(get("/api/workspaces/ws-1/files/logo_logo.png"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"PNG");

        let response = app
            .clone()
            .oneshot(get("/api/workspaces/ws-1/files/missing.pdf"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(get("/api/workspaces/ws-1/files/..%2Fsecret"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_keyword_answer() {
        let (_dir, app) = test_app();
        let response = app
            .oneshot(post_json(
                "/api/workspaces/ws-1/chat",
                json!({"question": "¿Cuál es el RFC de la empresa?"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["source"], "keyword");
        assert!(body["answer"].as_str().unwrap().contains("RFC"));
    }

    #[tokio::test]
    async fn test_chat_falls_back_to_llm() {
        let (_dir, app) = test_app_with_llm("La obra es de construcción.");
        let response = app
            .oneshot(post_json(
                "/api/workspaces/ws-1/chat",
                json!({"question": "¿De qué trata?", "sources": ["bases.pdf"]}),
            ))
            .await
            .unwrap();
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["source"], "llm");
        assert_eq!(body["answer"], "La obra es de construcción.");
    }

    #[tokio::test]
    async fn test_chat_rejects_blank_question() {
        let (_dir, app) = test_app();
        let response = app
            .oneshot(post_json("/api/workspaces/ws-1/chat", json!({"question": "  "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_companies_and_stats() {
        let (_dir, app) = test_app();
        let company = json!({"razon_social": "ACME S.A.", "rfc": "ACM010101AB1"});
        let response = app
            .clone()
            .oneshot(post_json("/api/companies", company.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(post_json("/api/companies", company))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(get("/api/companies/ACM010101AB1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["razon_social"], "ACME S.A.");

        let response = app.clone().oneshot(get("/api/companies/NOPE")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.oneshot(get("/api/stats")).await.unwrap();
        let stats: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(stats["companies"], 1);
        assert_eq!(stats["bids"], 0);
    }

    #[tokio::test]
    async fn test_activity_after_analysis() {
        let (_dir, app) = test_app();
        let response = app
            .clone()
            .oneshot(post_upload("/api/workspaces/ws-1/analyze", "bases.txt", "texto"))
            .await
            .unwrap();
        body_lines(response.into_body()).await;

        let response = app.oneshot(get("/api/activity?limit=5")).await.unwrap();
        let activity: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0]["numero_licitacion"], "LA-1_2024");
    }

    #[test]
    fn test_pipeline_error_status_mapping() {
        let precondition: ApiError = PipelineError::Precondition("x".into()).into();
        assert!(matches!(precondition, ApiError::Conflict(_)));
        let external: ApiError = PipelineError::PermanentExternal(ServiceError::Timeout {
            service: "ollama".into(),
            secs: 1,
        })
        .into();
        assert!(matches!(external, ApiError::BadGateway(_)));
        let storage: ApiError = PipelineError::storage(anyhow::anyhow!("disk")).into();
        assert!(matches!(storage, ApiError::Internal(_)));
    }
}
