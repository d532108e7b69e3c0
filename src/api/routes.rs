use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::{make_span_with_request_id, request_id_middleware};

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        // Ratings feeds
        .route("/feeds/ratings", post(handlers::create_ratings_feed))
        .route(
            "/feeds/ratings/:id",
            get(handlers::get_ratings_feed).delete(handlers::close_feed),
        )
        .route("/feeds/ratings/:id/more", post(handlers::load_more_ratings))
        .route("/feeds/ratings/:id/reset", post(handlers::reset_ratings_feed))
        .route("/ratings", post(handlers::rate))
        // Catalog feeds
        .route("/feeds/catalog", post(handlers::create_catalog_feed))
        .route(
            "/feeds/catalog/:id",
            get(handlers::get_catalog_feed).delete(handlers::close_feed),
        )
        .route("/feeds/catalog/:id/more", post(handlers::load_more_catalog))
        .route("/feeds/catalog/:id/query", put(handlers::switch_catalog_feed))
        .route("/feeds/catalog/:id/reset", post(handlers::reset_catalog_feed))
        .route(
            "/feeds/catalog/:id/favorites/:external_id",
            post(handlers::toggle_catalog_favorite),
        )
        // Favorites
        .route("/favorites", get(handlers::list_favorites))
        .route("/favorites/:kind/status", get(handlers::favorite_statuses))
        .route("/favorites/:kind/:id", post(handlers::toggle_favorite))
        // Watchlist
        .route("/watchlist", get(handlers::get_watchlist))
        .route("/watchlist/pick", get(handlers::pick_from_watchlist))
        .route("/watchlist/:kind/:id", post(handlers::toggle_watchlist))
}
