//! HTTP transport adapter.
//!
//! # Responsibilities
//! - Create the Axum router that feeds every request to [`Gateway::handle`]
//! - Buffer request bodies up to the configured limit
//! - Convert [`GatewayResponse`] back into an HTTP response
//! - Serve until the shutdown signal, then drain
//!
//! The gateway core never sees sockets; this module is the only place that does.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::http::gateway::Gateway;
use crate::http::response::GatewayResponse;
use crate::lifecycle::Shutdown;
use crate::security::headers::strip_hop_by_hop;

/// HTTP server in front of a gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            router: Self::build_router(gateway),
        }
    }

    fn build_router(gateway: Arc<Gateway>) -> Router {
        Router::new()
            .fallback(gateway_handler)
            .with_state(gateway)
            .layer(TraceLayer::new_for_http())
    }

    /// The router, for mounting next to other services or driving in tests.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(Shutdown::wait(shutdown))
            .await?;

        tracing::info!("Gateway listener stopped");
        Ok(())
    }
}

async fn gateway_handler(State(gateway): State<Arc<Gateway>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let limit = gateway.config().listener.max_body_bytes;

    let body = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, limit, "Rejected request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let response = gateway
        .handle(parts.method.clone(), path, parts.headers, body)
        .await;
    into_http_response(response)
}

fn into_http_response(response: GatewayResponse) -> Response {
    let body = response.body.to_bytes();
    let mut headers = response.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::CONTENT_LENGTH);
    if response.body.as_json().is_some() && !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    let mut http = Response::new(Body::from(body));
    *http.status_mut() = response.status;
    *http.headers_mut() = headers;
    http
}
