//! Axum router construction.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Multipart reads honour this bound, so streamed bodies without a
    // Content-Length are cut off too.
    let upload_limit =
        DefaultBodyLimit::max(usize::try_from(ctx.config.upload.max_bytes).unwrap_or(usize::MAX));

    let media_routes = Router::new()
        .route(
            "/media/{id}/",
            post(routes::media::upload_media)
                .delete(routes::media::delete_media)
                .layer(upload_limit),
        )
        .route("/media/{id}/status", get(routes::media::media_status))
        .route("/media/{id}/stream/", get(routes::stream::hls_manifest))
        .route(
            "/media/{id}/stream/{segment}",
            get(routes::stream::hls_segment),
        );

    Router::new()
        .route_service("/", ServeFile::new(&ctx.config.server.index_page))
        .route("/health", get(routes::health::health))
        .route("/events", get(routes::events::events_handler))
        .merge(media_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ctx)
}
