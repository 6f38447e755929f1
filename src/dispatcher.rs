//! Request dispatch.
//!
//! Every request is classified into exactly one [`Route`] and answered by
//! that branch:
//!
//! 1. static assets under a configured directory prefix,
//! 2. CORS preflight (`OPTIONS` with CORS enabled),
//! 3. JSON fixture lookup by method and path.
//!
//! The effective override is resolved before classification. Its delay is
//! applied to every branch. Forced status and content type only affect
//! fixture responses.

use crate::config::{RuleSet, ServerSettings};
use crate::fixture::{
    load_fixture, FixtureError, FixtureKey, FixtureSource, FsFixtureSource, INTERNAL_ERROR_BODY,
};
use crate::matcher::{EffectiveOverride, RuleMatcher};
use axum::body::Body;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, ORIGIN,
};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::{debug, warn};

/// Content type of fixture and error responses when no rule forces one.
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

const CORS_ALLOW_HEADERS: &str = "Accept, Content-Type, Content-Length, Accept-Encoding";
const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";

/// Response strategy chosen for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Serve a file from the static directory named by `prefix`
    Static { prefix: String },
    /// Answer a CORS preflight
    Preflight,
    /// Look up a JSON fixture
    Fixture(FixtureKey),
}

/// Resolves overrides and answers requests.
///
/// Holds only read-only state and is shared between concurrent requests.
pub struct Dispatcher {
    settings: ServerSettings,
    matcher: RuleMatcher,
    fixtures: Arc<dyn FixtureSource>,
    static_files: ServeDir,
}

impl Dispatcher {
    /// Create a dispatcher reading fixtures from `settings.data_dir`.
    pub fn new(settings: ServerSettings, rules: &RuleSet) -> Self {
        let fixtures = Arc::new(FsFixtureSource::new(settings.data_dir.clone()));
        Self::with_source(settings, rules, fixtures)
    }

    /// Create a dispatcher with a custom fixture source.
    pub fn with_source(
        settings: ServerSettings,
        rules: &RuleSet,
        fixtures: Arc<dyn FixtureSource>,
    ) -> Self {
        let matcher = RuleMatcher::new(rules);
        let static_files = ServeDir::new(&settings.static_root);

        Self {
            settings,
            matcher,
            fixtures,
            static_files,
        }
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn matcher(&self) -> &RuleMatcher {
        &self.matcher
    }

    /// Pick the branch for a request. The first applicable branch wins.
    pub fn classify(&self, method: &Method, path: &str) -> Route {
        if let Some(prefix) = self.settings.static_prefix_for(path) {
            return Route::Static {
                prefix: prefix.to_string(),
            };
        }
        if self.settings.cors_enabled && method == Method::OPTIONS {
            return Route::Preflight;
        }
        Route::Fixture(FixtureKey::new(method.as_str(), path))
    }

    /// Total delay before answering a request on `route`.
    ///
    /// The uniform delay does not apply to static assets.
    pub fn delay_for(&self, route: &Route, effective: &EffectiveOverride) -> Duration {
        let rule_delay = effective.delay.unwrap_or_default();
        match route {
            Route::Static { .. } => rule_delay,
            _ => rule_delay + self.settings.uniform_delay(),
        }
    }

    /// Answer a request.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let path = decode_path(request.uri().path());
        let effective = self.matcher.resolve(&path);
        let route = self.classify(request.method(), &path);

        let delay = self.delay_for(&route, &effective);
        if !delay.is_zero() {
            debug!(path = %path, delay_ms = delay.as_millis() as u64, "Applying delay");
            tokio::time::sleep(delay).await;
        }

        match route {
            Route::Static { prefix } => {
                debug!(prefix = %prefix, path = %path, "Serving static asset");
                self.serve_static(request).await
            }
            Route::Preflight => preflight(request.headers()),
            Route::Fixture(key) => self.serve_fixture(&key, &effective, request.headers()).await,
        }
    }

    /// `ServeDir` percent-decodes the raw URI path itself, so it resolves the
    /// same path `classify` matched the prefix against.
    async fn serve_static(&self, request: Request<Body>) -> Response {
        match self.static_files.clone().oneshot(request).await {
            Ok(response) => response.map(Body::new),
            Err(never) => match never {},
        }
    }

    async fn serve_fixture(
        &self,
        key: &FixtureKey,
        effective: &EffectiveOverride,
        request_headers: &HeaderMap,
    ) -> Response {
        let (status, body) = match load_fixture(self.fixtures.as_ref(), key).await {
            Ok(document) => match serde_json::to_string(&document) {
                Ok(body) => (StatusCode::OK, body),
                Err(e) => {
                    warn!(method = key.method(), path = key.path(), error = %e, "Failed to serialize fixture");
                    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY.to_string())
                }
            },
            Err(err) => {
                if matches!(err, FixtureError::NotFound(_)) {
                    debug!(error = %err, "No fixture for request");
                } else {
                    warn!(error = %err, "Fixture could not be served");
                }
                (err.status(), err.body().to_string())
            }
        };

        // A forced status other than 200 replaces the lookup outcome's status, never its body.
        let status = match effective.status {
            Some(forced) if forced != StatusCode::OK => forced,
            _ => status,
        };
        let content_type = effective
            .content_type
            .clone()
            .unwrap_or_else(|| HeaderValue::from_static(JSON_CONTENT_TYPE));

        let mut response = (status, body).into_response();
        response.headers_mut().insert(CONTENT_TYPE, content_type);
        if self.settings.cors_enabled {
            apply_cors_headers(response.headers_mut(), request_headers);
        }
        response
    }
}

fn preflight(request_headers: &HeaderMap) -> Response {
    let mut response = (StatusCode::OK, [(CONTENT_TYPE, JSON_CONTENT_TYPE)]).into_response();
    apply_cors_headers(response.headers_mut(), request_headers);
    response
}

/// Add the CORS headers, echoing the request's `Origin`.
fn apply_cors_headers(headers: &mut HeaderMap, request_headers: &HeaderMap) {
    let origin = request_headers
        .get(ORIGIN)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(""));

    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
}

/// Percent-decode a URL path.
///
/// Invalid escapes are kept literally; invalid UTF-8 is replaced.
pub fn decode_path(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                decoded.push(byte);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&decoded).into_owned()
}
