//! JSON fixture lookup.
//!
//! A fixture is the canned response for one (method, path) pair, stored at
//! `<data dir>/<lowercased method><path>.json`.

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{Map, Value};
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Body sent when no fixture exists for the request.
pub const NOT_FOUND_BODY: &str = r#"{"error": "File not found"}"#;

/// Body sent when a fixture exists but cannot be served.
pub const INTERNAL_ERROR_BODY: &str = r#"{"error": "Internal Server Error"}"#;

/// Identifies the fixture file for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureKey {
    method: String,
    path: String,
}

impl FixtureKey {
    /// Build a key from a request method and an already decoded path.
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_lowercase(),
            path: path.to_string(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// File location relative to the data directory.
    ///
    /// Returns `None` when the path would leave the data directory.
    pub fn relative_path(&self) -> Option<PathBuf> {
        let relative = PathBuf::from(format!("{}{}.json", self.method, self.path));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        (!escapes).then_some(relative)
    }
}

/// Errors from fixture lookup.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("fixture {} not found", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read fixture {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("fixture {} is not valid JSON: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("fixture {} is not a JSON object", .0.display())]
    NotAnObject(PathBuf),
}

impl FixtureError {
    /// Status code for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            FixtureError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Response body for this failure.
    pub fn body(&self) -> &'static str {
        match self {
            FixtureError::NotFound(_) => NOT_FOUND_BODY,
            _ => INTERNAL_ERROR_BODY,
        }
    }
}

/// Read access to fixture documents.
#[async_trait]
pub trait FixtureSource: Send + Sync {
    /// Read the raw bytes at a path relative to the fixture root.
    async fn read(&self, relative: &Path) -> io::Result<Vec<u8>>;
}

/// Fixtures stored on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsFixtureSource {
    root: PathBuf,
}

impl FsFixtureSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FixtureSource for FsFixtureSource {
    async fn read(&self, relative: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.root.join(relative)).await
    }
}

/// Load and validate the fixture for a key.
///
/// The document must be a JSON object. Storage is re-read on every call.
pub async fn load_fixture(
    source: &dyn FixtureSource,
    key: &FixtureKey,
) -> Result<Map<String, Value>, FixtureError> {
    let relative = key
        .relative_path()
        .ok_or_else(|| FixtureError::NotFound(PathBuf::from(key.path())))?;

    let raw = match source.read(&relative).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(FixtureError::NotFound(relative));
        }
        Err(source) => {
            return Err(FixtureError::Unreadable {
                path: relative,
                source,
            });
        }
    };

    match serde_json::from_slice::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(FixtureError::NotAnObject(relative)),
        Err(source) => Err(FixtureError::Malformed {
            path: relative,
            source,
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory fixture source keyed by relative path.
    #[derive(Default)]
    pub(crate) struct MemoryFixtureSource {
        files: HashMap<PathBuf, Vec<u8>>,
    }

    impl MemoryFixtureSource {
        pub(crate) fn with(mut self, relative: &str, content: &str) -> Self {
            self.files
                .insert(PathBuf::from(relative), content.as_bytes().to_vec());
            self
        }
    }

    #[async_trait]
    impl FixtureSource for MemoryFixtureSource {
        async fn read(&self, relative: &Path) -> io::Result<Vec<u8>> {
            self.files
                .get(relative)
                .cloned()
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
        }
    }

    #[test]
    fn test_key_lowercases_method() {
        let key = FixtureKey::new("GET", "/items");
        assert_eq!(key.method(), "get");
        assert_eq!(key.path(), "/items");
        assert_eq!(key.relative_path(), Some(PathBuf::from("get/items.json")));
    }

    #[test]
    fn test_key_for_nested_and_root_paths() {
        assert_eq!(
            FixtureKey::new("Post", "/api/v1/users").relative_path(),
            Some(PathBuf::from("post/api/v1/users.json"))
        );
        assert_eq!(
            FixtureKey::new("GET", "/").relative_path(),
            Some(PathBuf::from("get/.json"))
        );
    }

    #[test]
    fn test_key_rejects_traversal() {
        assert_eq!(FixtureKey::new("GET", "/../../etc/passwd").relative_path(), None);
        assert_eq!(FixtureKey::new("GET", "/a/../b").relative_path(), None);
    }

    #[tokio::test]
    async fn test_load_valid_object() {
        let source = MemoryFixtureSource::default().with("get/items.json", r#"{"a": 1}"#);
        let map = tokio_test::assert_ok!(load_fixture(&source, &FixtureKey::new("GET", "/items")).await);
        assert_eq!(Value::Object(map), serde_json::json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let source = MemoryFixtureSource::default();
        let err = load_fixture(&source, &FixtureKey::new("GET", "/nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, FixtureError::NotFound(_)));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.body(), NOT_FOUND_BODY);
    }

    #[tokio::test]
    async fn test_load_traversal_is_not_found() {
        let source = MemoryFixtureSource::default().with("secret.json", "{}");
        let err = load_fixture(&source, &FixtureKey::new("GET", "/../secret"))
            .await
            .unwrap_err();
        assert!(matches!(err, FixtureError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_load_malformed_is_internal_error() {
        let source = MemoryFixtureSource::default().with("get/bad.json", "{not json");
        let err = load_fixture(&source, &FixtureKey::new("GET", "/bad"))
            .await
            .unwrap_err();
        assert!(matches!(err, FixtureError::Malformed { .. }));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body(), INTERNAL_ERROR_BODY);
    }

    #[tokio::test]
    async fn test_load_array_is_rejected() {
        let source = MemoryFixtureSource::default().with("get/list.json", "[1, 2, 3]");
        let err = load_fixture(&source, &FixtureKey::new("GET", "/list"))
            .await
            .unwrap_err();
        assert!(matches!(err, FixtureError::NotAnObject(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_fs_source_reads_from_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("put/orders")).unwrap();
        std::fs::write(dir.path().join("put/orders/7.json"), r#"{"id": 7}"#).unwrap();

        let source = FsFixtureSource::new(dir.path());

        let map = load_fixture(&source, &FixtureKey::new("PUT", "/orders/7"))
            .await
            .unwrap();
        assert_eq!(map["id"], 7);

        let err = tokio_test::assert_err!(load_fixture(&source, &FixtureKey::new("PUT", "/orders/8")).await);
        assert!(matches!(err, FixtureError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fs_source_directory_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("get/folder.json")).unwrap();

        let source = FsFixtureSource::new(dir.path());
        let err = load_fixture(&source, &FixtureKey::new("GET", "/folder"))
            .await
            .unwrap_err();
        assert!(matches!(err, FixtureError::Unreadable { .. }));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
