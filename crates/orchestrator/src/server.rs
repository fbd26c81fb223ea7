use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        multipart::{Multipart, MultipartRejection},
        rejection::QueryRejection,
        DefaultBodyLimit, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::dispatch::{dispatch, Algorithm, AlgorithmRequest};
use crate::engine::EngineRunner;
use crate::error::{OrchestratorError, Result};
use crate::parser::{parse_output, ResultSet};
use crate::source::{
    session_name, EdgeSpec, GraphSource, GraphStore, InteractiveGraph, NodeSpec, RawId,
};

pub const SESSION_HEADER: &str = "x-graph-session";

/// Shared state behind every handler.
pub struct GraphService {
    pub config: ServiceConfig,
    pub store: Arc<GraphStore>,
    pub runner: EngineRunner,
}

impl GraphService {
    pub fn new(config: ServiceConfig) -> Self {
        let store = Arc::new(GraphStore::from_config(&config));
        let runner = EngineRunner::new(config.engine_timeout);
        Self {
            config,
            store,
            runner,
        }
    }

    /// Resolve the graph, run the engine on it and parse what it printed.
    ///
    /// Scratch graphs live exactly as long as this call.
    pub async fn run(
        &self,
        session: &str,
        source: GraphSource,
        request: &AlgorithmRequest,
    ) -> Result<ResultSet> {
        let store = Arc::clone(&self.store);
        let owned_session = session.to_string();
        let graph = blocking(move || store.resolve(&owned_session, &source)).await?;
        let invocation = dispatch(&self.config.engine_bin, graph.path(), request)?;
        let output = self.runner.run(&invocation).await?;
        let results = parse_output(&output.stdout);
        info!(
            session,
            algorithm = %request.algorithm,
            vertices = results.len(),
            "run complete"
        );
        Ok(results)
    }
}

/// Run filesystem work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the router. Split from [`start_server`] so tests can mount it on any
/// listener.
pub fn router(service: Arc<GraphService>) -> Router {
    let body_limit = service.config.max_upload_bytes;
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/graph", get(graph_handler))
        .route("/api/algorithms", get(algorithms_handler))
        .route("/api/upload", post(upload_handler))
        .route("/api/run", get(run_default_handler).post(run_interactive_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Bind the configured address and serve until the process exits.
pub async fn start_server(config: ServiceConfig) -> anyhow::Result<()> {
    config.ensure_dirs()?;
    let addr = config.bind_addr;
    let service = Arc::new(GraphService::new(config));
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("dgraph orchestrator listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn session(headers: &HeaderMap) -> Result<String> {
    let raw = headers
        .get(SESSION_HEADER)
        .map(|v| {
            v.to_str()
                .map_err(|_| OrchestratorError::input("Session header is not valid ASCII"))
        })
        .transpose()?;
    session_name(raw)
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn graph_handler(
    State(service): State<Arc<GraphService>>,
    headers: HeaderMap,
) -> Result<Response> {
    let session = session(&headers)?;
    let store = Arc::clone(&service.store);
    let view = blocking(move || store.view(&session)).await?;
    Ok(Json(view).into_response())
}

async fn algorithms_handler() -> impl IntoResponse {
    let algorithms: Vec<_> = Algorithm::ALL
        .iter()
        .map(|a| json!({ "key": a, "arguments": a.arguments() }))
        .collect();
    Json(json!({ "algorithms": algorithms }))
}

fn upload_failure(err: OrchestratorError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(json!({ "success": false, "error": err.to_string() })),
    )
        .into_response()
}

async fn upload_handler(
    State(service): State<Arc<GraphService>>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    match upload(service, headers, multipart).await {
        Ok(response) => response,
        Err(err) => upload_failure(err),
    }
}

async fn upload(
    service: Arc<GraphService>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let session = session(&headers)?;
    let mut multipart = multipart
        .map_err(|e| OrchestratorError::input(format!("Expected a multipart upload: {}", e)))?;
    let contents = read_file_part(&mut multipart).await?;

    let store = Arc::clone(&service.store);
    let summary = blocking(move || store.install_upload(&session, &contents)).await?;

    Ok(Json(json!({
        "success": true,
        "nodes": summary.nodes,
        "edges": summary.edges,
        "skipped": summary.skipped,
    }))
    .into_response())
}

/// Take the part named `file`, or failing that the first part carrying a filename.
async fn read_file_part(multipart: &mut Multipart) -> Result<Bytes> {
    let malformed = |e: axum::extract::multipart::MultipartError| {
        OrchestratorError::input(format!("Malformed multipart body: {}", e))
    };

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let is_file_part = field.name() == Some("file") || field.file_name().is_some();
        if !is_file_part {
            continue;
        }
        match field.file_name() {
            Some(name) if !name.trim().is_empty() => {}
            _ => return Err(OrchestratorError::input("No selected file")),
        }
        return field.bytes().await.map_err(malformed);
    }
    Err(OrchestratorError::input("No file part"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunQuery {
    algorithm: Option<String>,
    source_node: Option<String>,
    walk_length: Option<u32>,
    num_walks: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunPayload {
    nodes: Vec<NodeSpec>,
    edges: Vec<EdgeSpec>,
    #[serde(default)]
    algorithm: Option<String>,
    #[serde(default)]
    source_node: Option<RawId>,
    #[serde(default)]
    walk_length: Option<u32>,
    #[serde(default)]
    num_walks: Option<u32>,
}

async fn run_default_handler(
    State(service): State<Arc<GraphService>>,
    headers: HeaderMap,
    query: std::result::Result<Query<RunQuery>, QueryRejection>,
) -> Result<Json<ResultSet>> {
    let session = session(&headers)?;
    let Query(query) =
        query.map_err(|e| OrchestratorError::input(format!("Invalid query: {}", e)))?;

    let request = AlgorithmRequest {
        algorithm: Algorithm::from_key(query.algorithm.as_deref())?,
        source_node: query.source_node,
        walk_length: query.walk_length,
        num_walks: query.num_walks,
    };
    let results = service.run(&session, GraphSource::Default, &request).await?;
    Ok(Json(results))
}

async fn run_interactive_handler(
    State(service): State<Arc<GraphService>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ResultSet>> {
    let session = session(&headers)?;
    let payload: RunPayload = serde_json::from_slice(&body)
        .map_err(|e| OrchestratorError::input(format!("Invalid run payload: {}", e)))?;

    let request = AlgorithmRequest {
        algorithm: Algorithm::from_key(payload.algorithm.as_deref())?,
        source_node: payload.source_node.map(|id| id.to_vertex().to_string()),
        walk_length: payload.walk_length,
        num_walks: payload.num_walks,
    };
    let source = GraphSource::Interactive(InteractiveGraph {
        nodes: payload.nodes,
        edges: payload.edges,
    });
    let results = service.run(&session, source, &request).await?;
    Ok(Json(results))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocking_work_returns_its_result() {
        let value = blocking(|| Ok::<_, OrchestratorError>(7)).await.unwrap();
        assert_eq!(value, 7);

        let err = blocking(|| Err::<(), _>(OrchestratorError::input("bad")))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn panicking_blocking_work_is_a_server_error() {
        let err = blocking(|| -> Result<()> { panic!("disk on fire") })
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Task(_)));
        assert_eq!(err.status_code(), 500);
    }
}
