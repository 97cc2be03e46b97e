//! Shared file serving: range parsing and chunked streaming via
//! `ReaderStream`.

use std::path::Path;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

const CHUNK_SIZE: usize = 64 * 1024;

/// A single byte range from a `Range` header, before it is resolved
/// against the file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=a-b` or `bytes=a-`.
    From { start: u64, end: Option<u64> },
    /// `bytes=-n`: the last `n` bytes.
    Suffix(u64),
}

impl ByteRange {
    /// Resolve to an inclusive `(start, end)` pair, or `None` if the range
    /// cannot be satisfied for a file of `len` bytes.
    pub fn resolve(self, len: u64) -> Option<(u64, u64)> {
        if len == 0 {
            return None;
        }
        match self {
            ByteRange::From { start, end } => {
                let end = end.unwrap_or(len - 1).min(len - 1);
                (start <= end).then_some((start, end))
            }
            ByteRange::Suffix(0) => None,
            ByteRange::Suffix(n) => Some((len.saturating_sub(n), len - 1)),
        }
    }
}

/// Parse a `Range: bytes=...` header value. Multi-range requests are not
/// supported and yield `None`, which serves the whole file.
pub fn parse_range_header(value: &str) -> Option<ByteRange> {
    let spec = value.trim().strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (start_str, end_str) = spec.split_once('-')?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    if start_str.is_empty() {
        return Some(ByteRange::Suffix(end_str.parse().ok()?));
    }

    let start = start_str.parse().ok()?;
    let end = if end_str.is_empty() {
        None
    } else {
        Some(end_str.parse().ok()?)
    };
    Some(ByteRange::From { start, end })
}

/// Serve a file in 64 KiB chunks with Range support.
///
/// `content_type` and `cache_control` go into the response head before any
/// body bytes are produced. A missing file is [`hf_core::Error::NotFound`].
pub async fn serve_file_streaming(
    file_path: &Path,
    entity: &str,
    content_type: &'static str,
    cache_control: &'static str,
    range_header: Option<&str>,
) -> Result<Response, hf_core::Error> {
    let mut file = tokio::fs::File::open(file_path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            hf_core::Error::not_found(entity, file_path.display())
        } else {
            hf_core::Error::storage("open", file_path, e)
        }
    })?;
    let file_size = file
        .metadata()
        .await
        .map_err(|e| hf_core::Error::storage("stat", file_path, e))?
        .len();

    let head = [
        (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
        (header::CACHE_CONTROL, HeaderValue::from_static(cache_control)),
        (header::ACCEPT_RANGES, HeaderValue::from_static("bytes")),
    ];

    let Some(range) = range_header.and_then(parse_range_header) else {
        let body = Body::from_stream(ReaderStream::with_capacity(file, CHUNK_SIZE));
        return Ok((
            StatusCode::OK,
            head,
            [(header::CONTENT_LENGTH, file_size.to_string())],
            body,
        )
            .into_response());
    };

    let Some((start, end)) = range.resolve(file_size) else {
        return Ok((
            StatusCode::RANGE_NOT_SATISFIABLE,
            head,
            [(header::CONTENT_RANGE, format!("bytes */{file_size}"))],
            Body::empty(),
        )
            .into_response());
    };

    let length = end - start + 1;
    file.seek(std::io::SeekFrom::Start(start))
        .await
        .map_err(|e| hf_core::Error::storage("seek", file_path, e))?;
    let body = Body::from_stream(ReaderStream::with_capacity(file.take(length), CHUNK_SIZE));

    Ok((
        StatusCode::PARTIAL_CONTENT,
        head,
        [
            (
                header::CONTENT_RANGE,
                format!("bytes {start}-{end}/{file_size}"),
            ),
            (header::CONTENT_LENGTH, length.to_string()),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn parse_range_forms() {
        assert_eq!(
            parse_range_header("bytes=0-999"),
            Some(ByteRange::From {
                start: 0,
                end: Some(999)
            })
        );
        assert_eq!(
            parse_range_header("bytes=500-"),
            Some(ByteRange::From {
                start: 500,
                end: None
            })
        );
        assert_eq!(parse_range_header("bytes=-200"), Some(ByteRange::Suffix(200)));
    }

    #[test]
    fn parse_range_invalid() {
        assert!(parse_range_header("invalid").is_none());
        assert!(parse_range_header("bytes=abc-def").is_none());
        assert!(parse_range_header("bytes=0-1,4-5").is_none());
        assert!(parse_range_header("items=0-1").is_none());
    }

    #[test]
    fn resolve_clamps_and_rejects() {
        let r = |start, end| ByteRange::From { start, end };
        assert_eq!(r(0, Some(9)).resolve(100), Some((0, 9)));
        assert_eq!(r(90, Some(500)).resolve(100), Some((90, 99)));
        assert_eq!(r(10, None).resolve(100), Some((10, 99)));
        assert_eq!(r(100, None).resolve(100), None);
        assert_eq!(r(5, Some(2)).resolve(100), None);
        assert_eq!(ByteRange::Suffix(10).resolve(100), Some((90, 99)));
        assert_eq!(ByteRange::Suffix(500).resolve(100), Some((0, 99)));
        assert_eq!(ByteRange::Suffix(0).resolve(100), None);
        assert_eq!(r(0, None).resolve(0), None);
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec()
    }

    #[tokio::test]
    async fn serves_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index0.ts");
        std::fs::write(&path, b"0123456789").unwrap();

        let response = serve_file_streaming(&path, "segment", "video/MP2T", "max-age=60", None)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/MP2T");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "10");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "max-age=60");
        assert_eq!(body_bytes(response).await, b"0123456789");
    }

    #[tokio::test]
    async fn serves_partial_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index0.ts");
        std::fs::write(&path, b"0123456789").unwrap();

        let response = serve_file_streaming(
            &path,
            "segment",
            "video/MP2T",
            "no-cache",
            Some("bytes=2-5"),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 2-5/10");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "4");
        assert_eq!(body_bytes(response).await, b"2345");
    }

    #[tokio::test]
    async fn unsatisfiable_range_is_416() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index0.ts");
        std::fs::write(&path, b"0123456789").unwrap();

        let response = serve_file_streaming(
            &path,
            "segment",
            "video/MP2T",
            "no-cache",
            Some("bytes=20-"),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */10");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = serve_file_streaming(
            &dir.path().join("index.m3u8"),
            "manifest",
            "application/x-mpegURL",
            "no-cache",
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(err.http_status(), 404);
    }
}
