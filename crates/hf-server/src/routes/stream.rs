//! HLS playback handlers.
//!
//! Only published output under `hls/` is ever served, so a manifest request
//! before the transcode finishes (or after it failed) is a 404.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use axum::Extension;
use hf_core::MediaId;

use crate::context::AppContext;
use crate::error::{AppError, WithRequestId};
use crate::middleware::request_id::RequestId;
use crate::routes::streaming_helpers::serve_file_streaming;

pub const MANIFEST_CONTENT_TYPE: &str = "application/x-mpegURL";
pub const SEGMENT_CONTENT_TYPE: &str = "video/MP2T";

/// GET /media/{id}/stream/
pub async fn hls_manifest(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    manifest(&ctx, &raw_id, &headers).await.tag(&request_id)
}

async fn manifest(ctx: &AppContext, raw_id: &str, headers: &HeaderMap) -> hf_core::Result<Response> {
    let id: MediaId = raw_id.parse()?;
    serve_file_streaming(
        &ctx.store.manifest_path(id),
        "manifest",
        MANIFEST_CONTENT_TYPE,
        "no-cache",
        range(headers),
    )
    .await
}

/// GET /media/{id}/stream/{segment}
///
/// `segment` must be `index<N>.ts`; any other name is a 404.
pub async fn hls_segment(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    Path((raw_id, segment)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    segment_file(&ctx, &raw_id, &segment, &headers)
        .await
        .tag(&request_id)
}

async fn segment_file(
    ctx: &AppContext,
    raw_id: &str,
    segment: &str,
    headers: &HeaderMap,
) -> hf_core::Result<Response> {
    let id: MediaId = raw_id.parse()?;
    let path = ctx.store.segment_path(id, segment)?;
    serve_file_streaming(
        &path,
        "segment",
        SEGMENT_CONTENT_TYPE,
        "max-age=31536000",
        range(headers),
    )
    .await
}

fn range(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::RANGE).and_then(|v| v.to_str().ok())
}
