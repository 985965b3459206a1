/// Application context and dependency injection
use crate::{
    auth::UploadAuthorizer,
    blob_store::{DiskObjectStore, PathResolver},
    config::ServerConfig,
    error::UploadResult,
};
use std::sync::Arc;

/// Application context holding all shared services
///
/// Everything in here is read-only after startup; the filesystem is the only
/// shared mutable state between requests.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub resolver: Arc<PathResolver>,
    pub authorizer: Arc<UploadAuthorizer>,
    pub object_store: Arc<DiskObjectStore>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> UploadResult<Self> {
        // Validate configuration
        config.validate()?;

        // Storage root is created if missing and canonicalized once
        let resolver = PathResolver::new(&config.storage.data_root).await?;
        tracing::info!(root = ?resolver.root(), "storage root ready");

        let authorizer = UploadAuthorizer::new(config.authentication.secret_key.as_bytes());

        Ok(Self {
            config: Arc::new(config),
            resolver: Arc::new(resolver),
            authorizer: Arc::new(authorizer),
            object_store: Arc::new(DiskObjectStore::new()),
        })
    }
}
