pub mod protocol;

use std::future::Future;
use std::path::PathBuf;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response as HttpResponse},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::engine::{QueueEngine, StatusReport};
use crate::error::{MiniqError, Result as MiniqResult};
use crate::scheduler::JobId;
use protocol::{Request, Response};

/// Build the HTTP router: a WebSocket endpoint at `/` plus a small REST view.
pub fn router(engine: QueueEngine) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(ws_handler))
        .route("/api/jobs", get(list_jobs_handler).post(submit_job_handler))
        .route(
            "/api/jobs/{id}",
            get(get_job_handler).delete(delete_job_handler),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// Serve requests on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    engine: QueueEngine,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(addr = %addr, "Starting miniq server");

    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Run one decoded request against the engine.
pub async fn handle_request(engine: &QueueEngine, request: Request) -> Response {
    let result = match request {
        Request::Submit {
            script,
            num_nodes,
            minutes,
            cwd,
        } => engine
            .submit(script, num_nodes, minutes, cwd)
            .await
            .map(StatusReport::Job),
        Request::Delete { id } => engine.delete(id).await.map(StatusReport::Job),
        Request::Status { id } => engine.status(id).await,
    };

    match result {
        Ok(report) => Response::ok(report),
        Err(e) => {
            tracing::debug!(error = %e, kind = e.kind(), "Request failed");
            Response::from(&e)
        }
    }
}

async fn respond(engine: &QueueEngine, text: &str) -> Response {
    match Request::parse(text) {
        Ok(request) => handle_request(engine, request).await,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected request");
            Response::from(&e)
        }
    }
}

async fn ws_handler(State(engine): State<QueueEngine>, ws: WebSocketUpgrade) -> HttpResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, engine))
}

async fn handle_socket(mut socket: WebSocket, engine: QueueEngine) {
    while let Some(message) = socket.recv().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "WebSocket receive failed");
                break;
            }
        };

        let reply = respond(&engine, text.as_str()).await;
        let body = match serde_json::to_string(&reply) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode reply");
                break;
            }
        };
        if socket.send(Message::Text(body.into())).await.is_err() {
            break;
        }
    }
}

fn http_status(err: &MiniqError) -> StatusCode {
    match err {
        MiniqError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        MiniqError::NotFound(_) => StatusCode::NOT_FOUND,
        MiniqError::QueueFull { .. } | MiniqError::DispatcherStopped => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn into_http(result: MiniqResult<StatusReport>) -> HttpResponse {
    match result {
        Ok(report) => (StatusCode::OK, Json(Response::ok(report))).into_response(),
        Err(e) => (http_status(&e), Json(Response::from(&e))).into_response(),
    }
}

/// Body of `POST /api/jobs`.
#[derive(Debug, Deserialize)]
struct SubmitJob {
    script: PathBuf,
    num_nodes: i64,
    minutes: i64,
    cwd: PathBuf,
}

async fn submit_job_handler(
    State(engine): State<QueueEngine>,
    Json(body): Json<SubmitJob>,
) -> HttpResponse {
    let result = engine
        .submit(body.script, body.num_nodes, body.minutes, body.cwd)
        .await;
    into_http(result.map(StatusReport::Job))
}

async fn list_jobs_handler(State(engine): State<QueueEngine>) -> HttpResponse {
    into_http(engine.status(None).await)
}

async fn get_job_handler(
    State(engine): State<QueueEngine>,
    Path(id): Path<JobId>,
) -> HttpResponse {
    into_http(engine.status(Some(id)).await)
}

async fn delete_job_handler(
    State(engine): State<QueueEngine>,
    Path(id): Path<JobId>,
) -> HttpResponse {
    into_http(engine.delete(id).await.map(StatusReport::Job))
}
