/// Disk-based object storage
use crate::{
    blob_store::{artifact_paths, ObjectInfo, ObjectMetadata, StoredObject},
    error::{UploadError, UploadResult},
};
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// Write buffer between the request body and the data file
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Disk storage backend
///
/// Objects are addressed by a base location already confined to the
/// storage root (see [`PathResolver`](super::PathResolver)).
#[derive(Debug, Clone)]
pub struct DiskObjectStore {
    buffer_size: usize,
}

impl Default for DiskObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskObjectStore {
    /// Create a new disk storage backend
    pub fn new() -> Self {
        Self {
            buffer_size: WRITE_BUFFER_SIZE,
        }
    }

    /// Store an object, reading exactly `declared_length` bytes from `body`
    ///
    /// Either both artifacts exist when this returns `Ok`, or neither was
    /// left behind by this call. Bytes past `declared_length` are ignored.
    /// A body that ends early or fails mid-stream is a truncation.
    pub async fn create<S, B, E>(
        &self,
        location: &Path,
        mut body: S,
        declared_length: u64,
        metadata: &ObjectMetadata,
    ) -> UploadResult<()>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
    {
        let (data_path, meta_path) = artifact_paths(location);

        if let Some(parent) = data_path.parent() {
            ensure_dir(parent).await?;
        }

        let file = create_exclusive(&data_path).await?;
        let mut pending = PendingObject::new(data_path);

        let mut writer = BufWriter::with_capacity(self.buffer_size, file);
        let received = copy_exact(&mut body, &mut writer, declared_length).await?;
        if received < declared_length {
            tracing::warn!(
                location = ?location,
                expected = declared_length,
                received,
                "upload truncated"
            );
            return Err(UploadError::Truncated {
                expected: declared_length,
                received,
            });
        }

        writer.flush().await?;
        writer.get_mut().sync_all().await?;

        let encoded = serde_json::to_vec(metadata)?;
        let mut meta_file = create_exclusive(&meta_path).await?;
        pending.meta_path = Some(meta_path);
        meta_file.write_all(&encoded).await?;
        meta_file.sync_all().await?;

        pending.commit();
        tracing::info!(location = ?location, size = declared_length, "object stored");
        Ok(())
    }

    /// Open a stored object for reading
    pub async fn load(&self, location: &Path) -> UploadResult<StoredObject> {
        let (data_path, meta_path) = artifact_paths(location);
        let metadata = read_metadata(&meta_path).await?;

        let file = File::open(&data_path)
            .await
            .map_err(|e| missing_or(e, &data_path))?;
        let size = file.metadata().await?.len();

        tracing::debug!(location = ?location, size, "object loaded");
        Ok(StoredObject {
            file,
            size,
            metadata,
        })
    }

    /// Size and metadata of a stored object without opening its body
    pub async fn stat(&self, location: &Path) -> UploadResult<ObjectInfo> {
        let (data_path, meta_path) = artifact_paths(location);
        let metadata = read_metadata(&meta_path).await?;

        let size = fs::metadata(&data_path)
            .await
            .map_err(|e| missing_or(e, &data_path))?
            .len();

        Ok(ObjectInfo { size, metadata })
    }
}

/// Artifacts created by an in-flight `create`
///
/// Dropping without `commit` removes whatever this attempt created, which
/// covers early returns, I/O errors and a cancelled request future alike.
/// It never touches files created by someone else.
struct PendingObject {
    data_path: PathBuf,
    meta_path: Option<PathBuf>,
    committed: bool,
}

impl PendingObject {
    fn new(data_path: PathBuf) -> Self {
        Self {
            data_path,
            meta_path: None,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingObject {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        // Drop cannot await, and a cancelled request must still leave nothing behind
        // once it returns, so the unlink happens inline.
        for path in std::iter::once(&self.data_path).chain(self.meta_path.as_ref()) {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = ?path, "removed partial artifact"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::error!(path = ?path, error = %e, "failed to remove partial artifact")
                }
            }
        }
    }
}

/// Copy up to `declared_length` bytes from `body` into `writer`
///
/// Returns the number of bytes written. A body error ends the copy the same
/// way end-of-stream does.
async fn copy_exact<S, B, E, W>(body: &mut S, writer: &mut W, declared_length: u64) -> io::Result<u64>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
    W: AsyncWrite + Unpin,
{
    let mut remaining = declared_length;

    while remaining > 0 {
        let chunk = match body.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "request body failed mid-upload");
                break;
            }
            None => break,
        };

        let bytes = chunk.as_ref();
        let take = bytes.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        writer.write_all(&bytes[..take]).await?;
        remaining -= take as u64;
    }

    Ok(declared_length - remaining)
}

async fn ensure_dir(dir: &Path) -> UploadResult<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o770);

    match builder.create(dir).await {
        Ok(()) => Ok(()),
        // A file already sits where a directory is needed
        Err(e) if matches!(e.kind(), ErrorKind::AlreadyExists | ErrorKind::NotADirectory) => {
            Err(UploadError::Conflict(format!("{:?} is not a directory", dir)))
        }
        Err(e) => Err(UploadError::Io(e)),
    }
}

async fn create_exclusive(path: &Path) -> UploadResult<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                tracing::warn!(path = ?path, "refusing to overwrite existing artifact");
                UploadError::Conflict(format!("{:?} already exists", path))
            } else {
                UploadError::Io(e)
            }
        })
}

async fn read_metadata(meta_path: &Path) -> UploadResult<ObjectMetadata> {
    let raw = fs::read(meta_path)
        .await
        .map_err(|e| missing_or(e, meta_path))?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Missing artifacts and missing parent directories both mean "no object"
fn missing_or(e: io::Error, path: &Path) -> UploadError {
    if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) {
        UploadError::NotFound(format!("{:?}", path))
    } else {
        UploadError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::time::Duration;
    use tempfile::tempdir;

    type Chunk = Result<Vec<u8>, io::Error>;

    fn body(chunks: &[&[u8]]) -> impl Stream<Item = Chunk> + Unpin {
        stream::iter(chunks.iter().map(|c| Ok(c.to_vec())).collect::<Vec<Chunk>>())
    }

    async fn read_all(object: StoredObject) -> Vec<u8> {
        use tokio::io::AsyncReadExt;
        let mut file = object.file;
        let mut data = Vec::new();
        file.read_to_end(&mut data).await.unwrap();
        data
    }

    #[tokio::test]
    async fn test_create_and_load_object() {
        let dir = tempdir().unwrap();
        let store = DiskObjectStore::new();
        let location = dir.path().join("abc").join("photo.jpg");
        let metadata = ObjectMetadata::with_content_type("image/jpeg");

        store
            .create(&location, body(&[b"hello ", b"world"]), 11, &metadata)
            .await
            .unwrap();

        assert!(dir.path().join("abc/photo.jpg.data").is_file());
        assert!(dir.path().join("abc/photo.jpg.meta").is_file());

        let object = store.load(&location).await.unwrap();
        assert_eq!(object.size, 11);
        assert_eq!(object.metadata, metadata);
        assert_eq!(read_all(object).await, b"hello world");
    }

    #[tokio::test]
    async fn test_metadata_sidecar_format() {
        let dir = tempdir().unwrap();
        let store = DiskObjectStore::new();
        let location = dir.path().join("doc.txt");

        store
            .create(&location, body(&[b"x"]), 1, &ObjectMetadata::with_content_type("text/plain"))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(dir.path().join("doc.txt.meta")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["headers"]["Content-Type"], "text/plain");
    }

    #[tokio::test]
    async fn test_second_create_conflicts_and_keeps_original() {
        let dir = tempdir().unwrap();
        let store = DiskObjectStore::new();
        let location = dir.path().join("file.bin");
        let metadata = ObjectMetadata::with_content_type("application/octet-stream");

        store
            .create(&location, body(&[b"first"]), 5, &metadata)
            .await
            .unwrap();

        let result = store
            .create(&location, body(&[b"second"]), 6, &ObjectMetadata::default())
            .await;
        assert!(matches!(result, Err(UploadError::Conflict(_))));

        let object = store.load(&location).await.unwrap();
        assert_eq!(object.metadata, metadata);
        assert_eq!(read_all(object).await, b"first");
    }

    #[tokio::test]
    async fn test_truncated_upload_leaves_nothing() {
        let dir = tempdir().unwrap();
        let store = DiskObjectStore::new();
        let location = dir.path().join("short.bin");

        let result = store
            .create(&location, body(&[&[7u8; 50]]), 100, &ObjectMetadata::default())
            .await;
        assert!(matches!(
            result,
            Err(UploadError::Truncated {
                expected: 100,
                received: 50
            })
        ));

        assert!(!dir.path().join("short.bin.data").exists());
        assert!(!dir.path().join("short.bin.meta").exists());
        assert!(matches!(
            store.load(&location).await,
            Err(UploadError::NotFound(_))
        ));

        // The slot is free again
        store
            .create(&location, body(&[&[7u8; 100]]), 100, &ObjectMetadata::default())
            .await
            .unwrap();
        assert_eq!(store.stat(&location).await.unwrap().size, 100);
    }

    #[tokio::test]
    async fn test_body_error_is_truncation() {
        let dir = tempdir().unwrap();
        let store = DiskObjectStore::new();
        let location = dir.path().join("broken.bin");

        let chunks: Vec<Chunk> = vec![
            Ok(b"partial".to_vec()),
            Err(io::Error::new(ErrorKind::ConnectionReset, "client went away")),
        ];
        let result = store
            .create(&location, stream::iter(chunks), 20, &ObjectMetadata::default())
            .await;

        assert!(matches!(result, Err(UploadError::Truncated { received: 7, .. })));
        assert!(!dir.path().join("broken.bin.data").exists());
    }

    #[tokio::test]
    async fn test_excess_body_is_ignored() {
        let dir = tempdir().unwrap();
        let store = DiskObjectStore::new();
        let location = dir.path().join("long.bin");

        store
            .create(&location, body(&[b"abc", b"defgh"]), 4, &ObjectMetadata::default())
            .await
            .unwrap();

        let object = store.load(&location).await.unwrap();
        assert_eq!(object.size, 4);
        assert_eq!(read_all(object).await, b"abcd");
    }

    #[tokio::test]
    async fn test_zero_length_object() {
        let dir = tempdir().unwrap();
        let store = DiskObjectStore::new();
        let location = dir.path().join("empty");

        store
            .create(&location, body(&[]), 0, &ObjectMetadata::default())
            .await
            .unwrap();

        assert_eq!(store.stat(&location).await.unwrap().size, 0);
    }

    #[tokio::test]
    async fn test_leftover_metadata_conflicts_without_touching_it() {
        let dir = tempdir().unwrap();
        let store = DiskObjectStore::new();
        let location = dir.path().join("orphan.bin");
        std::fs::write(dir.path().join("orphan.bin.meta"), b"{\"headers\":{}}").unwrap();

        let result = store
            .create(&location, body(&[b"data"]), 4, &ObjectMetadata::default())
            .await;

        assert!(matches!(result, Err(UploadError::Conflict(_))));
        assert!(!dir.path().join("orphan.bin.data").exists());
        assert!(dir.path().join("orphan.bin.meta").exists());
    }

    #[tokio::test]
    async fn test_blob_without_metadata_is_not_found() {
        let dir = tempdir().unwrap();
        let store = DiskObjectStore::new();
        let location = dir.path().join("half.bin");
        std::fs::write(dir.path().join("half.bin.data"), b"data").unwrap();

        assert!(matches!(store.load(&location).await, Err(UploadError::NotFound(_))));
        assert!(matches!(store.stat(&location).await, Err(UploadError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_metadata_without_blob_is_not_found() {
        let dir = tempdir().unwrap();
        let store = DiskObjectStore::new();
        let location = dir.path().join("half.bin");
        std::fs::write(dir.path().join("half.bin.meta"), b"{\"headers\":{}}").unwrap();

        assert!(matches!(store.load(&location).await, Err(UploadError::NotFound(_))));
        assert!(matches!(store.stat(&location).await, Err(UploadError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_an_error() {
        let dir = tempdir().unwrap();
        let store = DiskObjectStore::new();
        let location = dir.path().join("bad.bin");
        std::fs::write(dir.path().join("bad.bin.data"), b"data").unwrap();
        std::fs::write(dir.path().join("bad.bin.meta"), b"not json").unwrap();

        assert!(matches!(store.load(&location).await, Err(UploadError::Metadata(_))));
    }

    #[tokio::test]
    async fn test_missing_parent_is_not_found() {
        let dir = tempdir().unwrap();
        let store = DiskObjectStore::new();

        let result = store.stat(&dir.path().join("no/such/object")).await;
        assert!(matches!(result, Err(UploadError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_file_in_place_of_directory_conflicts() {
        let dir = tempdir().unwrap();
        let store = DiskObjectStore::new();
        std::fs::write(dir.path().join("plain"), b"").unwrap();

        let result = store
            .create(&dir.path().join("plain/child"), body(&[b"x"]), 1, &ObjectMetadata::default())
            .await;
        assert!(matches!(result, Err(UploadError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_concurrent_creates_have_one_winner() {
        let dir = tempdir().unwrap();
        let store = DiskObjectStore::new();
        let location = dir.path().join("race.bin");
        let first = vec![b'a'; 4096];
        let second = vec![b'b'; 4096];
        let metadata = ObjectMetadata::default();

        let (a, b) = tokio::join!(
            store.create(&location, body(&[&first]), 4096, &metadata),
            store.create(&location, body(&[&second]), 4096, &metadata),
        );

        let outcomes = [a.is_ok(), b.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        assert!(matches!(
            if a.is_ok() { b } else { a },
            Err(UploadError::Conflict(_))
        ));

        let data = read_all(store.load(&location).await.unwrap()).await;
        assert!(data == first || data == second);
    }

    #[tokio::test]
    async fn test_cancelled_create_removes_partial_blob() {
        let dir = tempdir().unwrap();
        let store = DiskObjectStore::new();
        let location = dir.path().join("stalled.bin");

        // First chunk arrives, then the client stalls forever
        let stalled = stream::iter(vec![Ok::<_, io::Error>(b"some".to_vec())])
            .chain(stream::pending());
        let result = tokio::time::timeout(
            Duration::from_millis(100),
            store.create(&location, stalled, 100, &ObjectMetadata::default()),
        )
        .await;

        assert!(result.is_err(), "create should still be waiting for data");
        assert!(!dir.path().join("stalled.bin.data").exists());
    }
}
