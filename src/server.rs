//! HTTP server.
//!
//! Every method and path is routed to the [`Dispatcher`]. An access-log
//! middleware writes one line per request, optionally with the request
//! headers and body.

use crate::config::{RuleSet, ServerSettings};
use crate::dispatcher::{Dispatcher, JSON_CONTENT_TYPE};
use crate::fixture::INTERNAL_ERROR_BODY;
use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Bytes of the request body written to the detailed access log.
const LOGGED_BODY_LIMIT: usize = 64 * 1024;

/// File-backed mock server.
pub struct MockServer {
    dispatcher: Arc<Dispatcher>,
}

impl MockServer {
    /// Create a server from resolved settings and the startup rule set.
    pub fn new(settings: ServerSettings, rules: &RuleSet) -> Self {
        let dispatcher = Dispatcher::new(settings, rules);

        info!(
            rules = dispatcher.matcher().len(),
            cors = dispatcher.settings().cors_enabled,
            static_dirs = ?dispatcher.settings().static_prefixes,
            data_dir = %dispatcher.settings().data_dir.display(),
            "Mock server initialized"
        );
        if dispatcher.matcher().is_empty() {
            info!("No override rules loaded, fixtures are served unmodified");
        }

        Self::from_dispatcher(Arc::new(dispatcher))
    }

    pub fn from_dispatcher(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Build the router with logging layers.
    pub fn router(&self) -> Router {
        let access_log_config = AccessLog {
            detailed: self.dispatcher.settings().detailed_logging,
        };

        Router::new()
            .fallback(dispatch)
            .with_state(self.dispatcher.clone())
            .layer(middleware::from_fn_with_state(access_log_config, access_log))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve requests on `listener` until Ctrl-C.
    pub async fn run(self, listener: TcpListener) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        info!(address = %addr, "Mock server listening");

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Mock server stopped");
        Ok(())
    }
}

async fn dispatch(State(dispatcher): State<Arc<Dispatcher>>, request: Request) -> Response {
    dispatcher.handle(request).await
}

#[derive(Debug, Clone, Copy)]
struct AccessLog {
    detailed: bool,
}

async fn access_log(State(config): State<AccessLog>, request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());

    if !config.detailed {
        let response = next.run(request).await;
        info!(
            remote = %remote,
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            elapsed = ?start.elapsed(),
            "Request handled"
        );
        return response;
    }

    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(remote = %remote, method = %method, path = %path, error = %e, "Failed to read request body");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(CONTENT_TYPE, JSON_CONTENT_TYPE)],
                INTERNAL_ERROR_BODY,
            )
                .into_response();
        }
    };

    let headers = parts
        .headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value.to_str().unwrap_or("<binary>")))
        .collect::<Vec<_>>()
        .join(", ");
    let body_text = logged_body(&bytes);

    let request = Request::from_parts(parts, Body::from(bytes));
    let response = next.run(request).await;

    info!(
        remote = %remote,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed = ?start.elapsed(),
        headers = %headers,
        body = %body_text,
        "Request handled"
    );
    response
}

/// The request body as logged: lossy UTF-8, cut after `LOGGED_BODY_LIMIT` bytes.
fn logged_body(bytes: &[u8]) -> String {
    if bytes.len() <= LOGGED_BODY_LIMIT {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    format!(
        "{}... ({} bytes)",
        String::from_utf8_lossy(&bytes[..LOGGED_BODY_LIMIT]),
        bytes.len()
    )
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
