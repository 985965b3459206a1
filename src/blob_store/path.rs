/// Confines client-supplied paths to the storage root
use crate::error::{UploadError, UploadResult};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Maps client paths onto locations under a fixed storage root
///
/// Resolution is lexical first: `.` segments and duplicate separators are
/// dropped, while `..` segments and absolute paths are rejected outright.
/// The filesystem is then consulted once: the deepest existing ancestor of
/// the candidate location is canonicalized and must still lie under the
/// root, so a symlinked directory pointing elsewhere counts as an escape.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Create a resolver, creating and canonicalizing the root directory
    pub async fn new(root: impl AsRef<Path>) -> UploadResult<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root).await.map_err(|e| {
            UploadError::Internal(format!("Failed to create storage root {:?}: {}", root, e))
        })?;
        let root = fs::canonicalize(root).await?;

        Ok(Self { root })
    }

    /// Canonical storage root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a client path to a base location strictly below the root
    pub async fn resolve(&self, client_path: &str) -> UploadResult<PathBuf> {
        let relative = normalize(client_path)?;
        let location = self.root.join(relative);
        self.confine_existing_ancestor(client_path, &location).await?;
        Ok(location)
    }

    async fn confine_existing_ancestor(
        &self,
        client_path: &str,
        location: &Path,
    ) -> UploadResult<()> {
        let mut ancestor = location.parent();

        while let Some(dir) = ancestor {
            match fs::canonicalize(dir).await {
                Ok(real) if real.starts_with(&self.root) => return Ok(()),
                Ok(real) => {
                    tracing::warn!(path = %client_path, resolved = ?real, "path escapes storage root via symlink");
                    return Err(escape(client_path));
                }
                Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                    ancestor = dir.parent();
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(escape(client_path))
    }
}

/// Lexically normalize a client path into a non-empty relative path
fn normalize(client_path: &str) -> UploadResult<PathBuf> {
    if client_path.contains('\0') {
        return Err(escape(client_path));
    }

    let mut relative = PathBuf::new();
    for component in Path::new(client_path).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(escape(client_path));
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(escape(client_path));
    }

    Ok(relative)
}

fn escape(client_path: &str) -> UploadError {
    UploadError::Escape(client_path.to_string())
}
