//! HTTP front end.
//!
//! Thin axum layer over `ProxyClient`: parse the body, run the
//! orchestrator, turn the result into a status and JSON body. Dropping
//! a handler future (caller disconnected) drops the in-flight upstream
//! call with it, so no further candidates are tried.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{debug, error, info};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::client::ProxyClient;
use crate::request::{ErrorBody, GenerateBody, GenerationResult, OutputBody};

const STATUS_PAGE: &str = r#"<h2>glproxy</h2>
<p>Status: Running</p>
<p>Endpoints:</p>
<ul>
  <li>GET /api/models</li>
  <li>POST /api/generate</li>
</ul>
<p><a href="/api/models" target="_blank">Test /api/models</a></p>
"#;

#[derive(Clone)]
struct AppState
{   client: Arc<ProxyClient>
}

/// Routes served by the proxy
pub fn router(client: Arc<ProxyClient>) -> Router
{   Router::new()
      .route("/", get(status_page))
      .route("/health", get(health_check))
      .route("/api/models", get(list_models))
      .route("/api/generate", post(generate))
      .with_state(AppState { client })
}

/// Serve until `cancel` fires
pub async fn serve(
  listener: TcpListener
, client: Arc<ProxyClient>
, cancel: CancellationToken
) -> std::io::Result<()>
{   let addr = listener.local_addr()?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, router(client))
      .with_graceful_shutdown(cancel.cancelled_owned())
      .await?;

    info!("Server shut down");
    Ok(())
}

fn status_code(code: u16) -> StatusCode
{   StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn error_response(code: u16, message: impl Into<String>) -> Response
{   (status_code(code), Json(ErrorBody::new(message))).into_response()
}

async fn status_page() -> Html<&'static str>
{   Html(STATUS_PAGE)
}

async fn health_check() -> impl IntoResponse
{   Json(serde_json::json!({
      "status": "ok"
    }))
}

async fn list_models(State(state): State<AppState>) -> Response
{   debug!("GET /api/models");
    match state.client.list_models().await
    {   Ok(body) => Json(body).into_response()
      , Err(e) => error_response(e.http_status(), e.public_message())
    }
}

async fn generate(State(state): State<AppState>, body: Bytes) -> Response
{   debug!("POST /api/generate");

    let body: GenerateBody = match serde_json::from_slice(&body)
    {   Ok(body) => body
      , Err(e) => {
          error!("Failed to parse request: {}", e);
          return error_response(400, format!("Invalid request body: {}", e));
        }
    };

    let request = match body.into_request(&state.client.config().sampling)
    {   Ok(request) => request
      , Err(e) => return error_response(e.http_status(), e.public_message())
    };

    match state.client.generate(&request).await
    {   GenerationResult::Output { output_text } => {
          Json(OutputBody { output_text }).into_response()
        }
      , GenerationResult::Failure { error_message, http_status } => {
          error_response(http_status, error_message)
        }
    }
}
