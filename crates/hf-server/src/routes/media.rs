//! Media ingestion and lifecycle handlers.
//!
//! - `POST /media/{id}/` stores the multipart `video` field and queues a
//!   transcode. The response is sent before the transcode finishes.
//! - `DELETE /media/{id}/` cancels any transcode and removes the item.
//! - `GET /media/{id}/status` reports the scheduler's view of the item.

use std::sync::Arc;

use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap};
use axum::{Extension, Json};
use futures::StreamExt;
use hf_core::events::EventPayload;
use hf_core::{Error, MediaId, MediaStatus};
use hf_store::{MediaLock, StoredSource};
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::{AppError, WithRequestId};
use crate::middleware::request_id::RequestId;
use crate::scheduler::TranscodeScheduler;

/// Multipart field carrying the video file.
pub const VIDEO_FIELD: &str = "video";

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

/// POST /media/{id}/
pub async fn upload_media(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    upload(&ctx, &raw_id, &headers, multipart)
        .await
        .tag(&request_id)
}

async fn upload(
    ctx: &AppContext,
    raw_id: &str,
    headers: &HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> hf_core::Result<Json<MessageResponse>> {
    let id: MediaId = raw_id.parse()?;

    let max_bytes = ctx.config.upload.max_bytes;
    if let Some(declared) = content_length(headers) {
        if declared > max_bytes {
            return Err(Error::BadRequest(format!(
                "upload of {declared} bytes exceeds the limit of {max_bytes} bytes"
            )));
        }
    }

    let mut multipart = multipart.map_err(|e| Error::BadRequest(e.body_text()))?;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(VIDEO_FIELD) {
            return store_upload(ctx, id, field).await;
        }
    }

    Err(Error::BadRequest(format!(
        "missing multipart field `{VIDEO_FIELD}`"
    )))
}

async fn store_upload(
    ctx: &AppContext,
    id: MediaId,
    field: Field<'_>,
) -> hf_core::Result<Json<MessageResponse>> {
    let file_name = field
        .file_name()
        .ok_or_else(|| Error::BadRequest(format!("field `{VIDEO_FIELD}` is not a file")))
        .and_then(hf_store::sanitize_file_name)?;

    // Stop a running transcode first; it holds the item lock.
    let mut superseded = SupersededJob {
        scheduler: Arc::clone(&ctx.scheduler),
        id,
        source: ctx.scheduler.cancel(id),
        _lock: None,
    };
    superseded._lock = Some(ctx.store.lock(id).await);

    // Nothing published is touched until the new source is safely on disk.
    let stored = persist_source(ctx, id, &file_name, field).await?;
    superseded.source = None;

    // The new transcode replaces `hls/` when it publishes; clearing now only
    // stops the stale output from being served meanwhile.
    if let Err(e) = ctx.store.clear_hls(id).await {
        tracing::warn!(media_id = %id, error = %e, "Failed to clear previous HLS output");
    }

    ctx.event_bus.broadcast(EventPayload::MediaUploaded {
        media_id: id,
        source_file: stored.file_name.clone(),
        bytes: stored.bytes,
    });
    ctx.scheduler.schedule(id, stored);

    Ok(MessageResponse::new("Successfully Uploaded File"))
}

/// A transcode cancelled by an upload still in progress.
///
/// Unless the upload stores its file, dropping this schedules the cancelled
/// source again, before the item lock is released.
struct SupersededJob {
    scheduler: Arc<TranscodeScheduler>,
    id: MediaId,
    source: Option<StoredSource>,
    _lock: Option<MediaLock>,
}

impl Drop for SupersededJob {
    fn drop(&mut self) {
        if let Some(source) = self.source.take() {
            tracing::info!(media_id = %self.id, "Upload abandoned; resuming previous transcode");
            self.scheduler.schedule(self.id, source);
        }
    }
}

async fn persist_source(
    ctx: &AppContext,
    id: MediaId,
    file_name: &str,
    field: Field<'_>,
) -> hf_core::Result<StoredSource> {
    let new_item = ctx.store.track_new_item(id).await;
    ctx.store.ensure_directory(id).await?;

    let body = field.map(|chunk| chunk.map_err(multipart_error));
    let stored = ctx.store.write_source_file(id, file_name, body).await?;
    new_item.commit();
    Ok(stored)
}

/// DELETE /media/{id}/
pub async fn delete_media(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    Path(raw_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    delete(&ctx, &raw_id).await.tag(&request_id)
}

async fn delete(ctx: &AppContext, raw_id: &str) -> hf_core::Result<Json<MessageResponse>> {
    let id: MediaId = raw_id.parse()?;

    ctx.scheduler.forget(id);
    {
        let _lock = ctx.store.lock(id).await;
        // An upload that held the lock may have queued a job meanwhile.
        ctx.scheduler.forget(id);
        ctx.store.remove_all(id).await?;
    }
    ctx.store.prune_lock(id);

    ctx.event_bus
        .broadcast(EventPayload::MediaDeleted { media_id: id });
    tracing::info!(media_id = %id, "Media deleted");

    Ok(MessageResponse::new("Successfully Deleted File"))
}

/// GET /media/{id}/status
pub async fn media_status(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    Path(raw_id): Path<String>,
) -> Result<Json<MediaStatus>, AppError> {
    raw_id
        .parse::<MediaId>()
        .and_then(|id| {
            ctx.scheduler
                .status(id)
                .ok_or_else(|| Error::not_found("media", id))
        })
        .map(Json)
        .tag(&request_id)
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn multipart_error(e: MultipartError) -> Error {
    Error::BadRequest(format!("malformed upload: {}", e.body_text()))
}
