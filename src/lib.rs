//! Fixture Mock Server
//!
//! A file-backed HTTP mock server. Requests are answered from JSON fixture
//! files selected by method and path, or from static asset directories, with
//! per-path overrides for latency, status code and content type.
//!
//! # Features
//!
//! - **Fixtures**: `GET /items` is answered with `data/get/items.json`
//! - **Static Assets**: paths under `/html/` (configurable) are served as files
//! - **Overrides**: regex-keyed rules force a delay, status or content type
//! - **CORS**: optional preflight answers and CORS response headers
//!
//! # Example Configuration
//!
//! ```json
//! [
//!   { "path": "^/orders", "delay": 500 },
//!   { "path": "/orders/\\d+$", "httpStatus": 503 },
//!   { "path": "\\.csv$", "contentType": "text/csv" }
//! ]
//! ```
//!
//! Each field is taken from the first matching rule that sets it, so a
//! request for `/orders/7` is delayed by 500ms and answered with 503.

pub mod config;
pub mod dispatcher;
pub mod fixture;
pub mod matcher;
pub mod server;

pub use config::{OverrideRule, RuleSet, ServerSettings};
pub use dispatcher::{Dispatcher, Route};
pub use matcher::{EffectiveOverride, RuleMatcher};
pub use server::MockServer;
