/// Upload, download and banner endpoints
use crate::{
    blob_store::{ObjectMetadata, DEFAULT_CONTENT_TYPE},
    context::AppContext,
    error::{UploadError, UploadResult},
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

pub const BANNER: &str = "Welcome to XMPP HTTP Upload. State your business.";

/// Build upload routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/", get(index)).route(
        "/*path",
        get(get_object).head(head_object).put(put_object),
    )
}

/// Query string of an upload URL
#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Verification token issued by the slot allocator
    pub v: Option<String>,
}

async fn index() -> &'static str {
    BANNER
}

/// Store an upload
///
/// The token in `v` must be the HMAC of the request path and its declared
/// `Content-Length`. Exactly that many bytes are read from the body.
async fn put_object(
    State(ctx): State<AppContext>,
    Path(path): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> UploadResult<impl IntoResponse> {
    let location = ctx.resolver.resolve(&path).await?;
    let declared_length = declared_length(&headers)?;

    let token = query.v.as_deref().unwrap_or("");
    if !ctx.authorizer.verify(&path, declared_length, token) {
        tracing::warn!(path = %path, size = declared_length, "rejected upload with invalid verification key");
        return Err(UploadError::Authorization);
    }

    if let Some(limit) = ctx.config.storage.max_upload_size {
        if declared_length > limit {
            tracing::warn!(path = %path, size = declared_length, limit, "upload exceeds size limit");
            return Err(UploadError::PayloadTooLarge {
                size: declared_length,
                limit,
            });
        }
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE);
    let metadata = ObjectMetadata::with_content_type(content_type);

    ctx.object_store
        .create(&location, body.into_data_stream(), declared_length, &metadata)
        .await?;

    Ok((StatusCode::CREATED, "Created"))
}

/// Report size and stored headers of an object
async fn head_object(
    State(ctx): State<AppContext>,
    Path(path): Path<String>,
) -> UploadResult<Response> {
    let location = ctx.resolver.resolve(&path).await?;
    let info = ctx.object_store.stat(&location).await?;

    let mut response = Response::new(Body::empty());
    response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(info.size));
    replay_headers(&mut response, &info.metadata);

    Ok(response)
}

/// Stream an object back with its stored headers
///
/// Supports a single `Range: bytes=...` request
async fn get_object(
    State(ctx): State<AppContext>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> UploadResult<Response> {
    let location = ctx.resolver.resolve(&path).await?;
    let object = ctx.object_store.load(&location).await?;
    let total_size = object.size;
    let mut file = object.file;

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_range(v, total_size));

    let mut response = match range {
        Some((start, end)) => {
            let length = end - start + 1;
            file.seek(SeekFrom::Start(start)).await?;

            let mut response =
                Response::new(Body::from_stream(ReaderStream::new(file.take(length))));
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            response
                .headers_mut()
                .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            response.headers_mut().insert(
                header::CONTENT_RANGE,
                HeaderValue::try_from(format!("bytes {}-{}/{}", start, end, total_size))
                    .map_err(|e| UploadError::Internal(e.to_string()))?,
            );
            response
        }
        None => {
            let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
            response
                .headers_mut()
                .insert(header::CONTENT_LENGTH, HeaderValue::from(total_size));
            response
        }
    };

    response
        .headers_mut()
        .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    replay_headers(&mut response, &object.metadata);

    Ok(response)
}

/// Parse the declared upload length; a missing header counts as zero
fn declared_length(headers: &HeaderMap) -> UploadResult<u64> {
    match headers.get(header::CONTENT_LENGTH) {
        None => Ok(0),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| UploadError::Validation("Invalid Content-Length".to_string())),
    }
}

/// Copy stored headers onto a response verbatim
fn replay_headers(response: &mut Response, metadata: &ObjectMetadata) {
    for (name, value) in &metadata.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => tracing::warn!(header = %name, "skipping unrepresentable stored header"),
        }
    }
}

/// Parse HTTP Range header
///
/// Returns (start, end) inclusive byte positions, or None if invalid
fn parse_range(range_header: &str, total_size: u64) -> Option<(u64, u64)> {
    // Expected format: "bytes=start-end" or "bytes=start-" or "bytes=-suffix"
    let range_spec = range_header.trim().strip_prefix("bytes=")?;

    if total_size == 0 || range_spec.contains(',') {
        return None;
    }

    let (start_str, end_str) = range_spec.split_once('-')?;

    if start_str.is_empty() {
        // Suffix range: "bytes=-500" (last 500 bytes)
        let suffix = end_str.parse::<u64>().ok()?;
        if suffix == 0 {
            return None;
        }
        return Some((total_size.saturating_sub(suffix), total_size - 1));
    }

    let start = start_str.parse::<u64>().ok()?;
    if start >= total_size {
        return None;
    }

    if end_str.is_empty() {
        // Open-ended range: "bytes=500-" (from 500 to end)
        return Some((start, total_size - 1));
    }

    // Complete range: "bytes=500-999", end clamped to the last byte
    let end = end_str.parse::<u64>().ok()?.min(total_size - 1);
    (start <= end).then_some((start, end))
}
