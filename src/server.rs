//! HTTP tool server.
//!
//! Serves the [`ToolRegistry`] to an external agent loop, either as plain
//! JSON over REST or as MCP over Streamable HTTP. Both surfaces dispatch
//! through [`ToolRegistry::call`], so validation and logging are shared.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call a tool by name |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `*`    | `/mcp` | MCP Streamable HTTP endpoint |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "insufficient_days", "message": "Solicitud rechazada: ..." } }
//! ```
//!
//! Dispatch errors use `not_found` (404) and `bad_request` (400). Record
//! errors carry their own code and status (see
//! [`RecordError::code`](crate::records::RecordError::code)). Anything
//! else is `tool_error` (500).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::mcp::McpBridge;
use crate::records::RecordError;
use crate::tools::{ToolContext, ToolError, ToolInfo, ToolRegistry};

#[derive(Clone)]
struct AppState {
    ctx: ToolContext,
    tools: Arc<ToolRegistry>,
}

/// Bring the policy index up to date, then serve until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let ctx = ToolContext::open(Arc::new(config.clone())).await?;
    let tools = Arc::new(ToolRegistry::with_builtins());

    for t in tools.tools() {
        tracing::debug!(tool = t.name(), read_only = t.is_read_only(), "registered tool");
    }

    let app = router(ctx, tools);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "tool server listening");
    println!("HR assistant listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the application router. Exposed so tests can serve it on an
/// ephemeral port.
pub fn router(ctx: ToolContext, tools: Arc<ToolRegistry>) -> Router {
    let bridge = McpBridge::new(ctx.clone(), tools.clone());
    let mcp_service = StreamableHttpService::new(
        move || Ok(bridge.clone()),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig::default(),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .nest_service("/mcp", mcp_service)
        .layer(cors)
        .with_state(AppState { ctx, tools })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn tool_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "tool_error".to_string(),
        message: message.into(),
    }
}

/// Map a failed call to a status code.
///
/// Typed errors decide first; the message checks cover plain `anyhow`
/// errors raised by the retrieval tools.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    if let Some(e) = err.downcast_ref::<ToolError>() {
        return match e {
            ToolError::UnknownTool(_) => not_found(e.to_string()),
            ToolError::InvalidParams(_) => bad_request(format!("{}: {}", tool_name, e)),
        };
    }

    if let Some(e) = err.downcast_ref::<RecordError>() {
        return AppError {
            status: StatusCode::from_u16(e.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            code: e.code().to_string(),
            message: e.to_string(),
        };
    }

    let msg = err.to_string();
    if msg.contains("not found") {
        not_found(format!("{}: {}", tool_name, msg))
    } else if msg.contains("must not be empty") || msg.contains("must be at least") {
        bad_request(format!("{}: {}", tool_name, msg))
    } else {
        tool_error(format!("{}: {}", tool_name, msg))
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: state.tools.list(),
    })
}

// ============ POST /tools/{name} ============

/// An absent body is treated as `{}`.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    params: Option<Json<serde_json::Value>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let params = params
        .map(|Json(v)| v)
        .unwrap_or(serde_json::Value::Null);

    let result = state
        .tools
        .call(&name, params, &state.ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(serde_json::json!({ "result": result })))
}
