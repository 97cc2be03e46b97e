use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::context::AppContext;

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_transcodes": ctx.scheduler.active_jobs(),
        "tools": {
            "ffmpeg": ctx.tools.is_available("ffmpeg"),
            "ffprobe": ctx.tools.is_available("ffprobe"),
        },
    }))
}
