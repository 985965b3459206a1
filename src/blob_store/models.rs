/// Object storage data models
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Suffix of the data blob artifact
pub const DATA_SUFFIX: &str = ".data";

/// Suffix of the metadata sidecar artifact
pub const META_SUFFIX: &str = ".meta";

/// Content type recorded when the uploader sends none
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Metadata sidecar persisted next to each data blob
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Response headers replayed verbatim on download
    pub headers: BTreeMap<String, String>,
}

impl ObjectMetadata {
    /// Metadata carrying only a `Content-Type` header
    pub fn with_content_type(content_type: &str) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        Self { headers }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("Content-Type").map(String::as_str)
    }
}

/// A stored object opened for reading
#[derive(Debug)]
pub struct StoredObject {
    pub file: tokio::fs::File,
    pub size: u64,
    pub metadata: ObjectMetadata,
}

/// Size and metadata of a stored object, without an open body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub size: u64,
    pub metadata: ObjectMetadata,
}

/// Data and metadata artifact paths for a resolved base location
pub fn artifact_paths(location: &Path) -> (PathBuf, PathBuf) {
    (
        with_suffix(location, DATA_SUFFIX),
        with_suffix(location, META_SUFFIX),
    )
}

fn with_suffix(location: &Path, suffix: &str) -> PathBuf {
    let mut raw = location.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}
