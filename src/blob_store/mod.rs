/// Object Storage System
///
/// Stores uploaded files on local disk as a pair of artifacts sharing one
/// base location: `<location>.data` holds the raw bytes and
/// `<location>.meta` holds the response headers to replay on download.
/// Exclusive file creation is the only concurrency guard.

pub mod disk;
pub mod models;
pub mod path;

pub use disk::DiskObjectStore;
pub use models::*;
pub use path::PathResolver;
