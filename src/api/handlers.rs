use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    CatalogCategory, EnrichedRecord, FavoriteStatus, LocalRecord, MediaKind, RatingRequest, Session,
};
use crate::services::{
    CatalogQuery, CatalogSnapshot, FavoritesFilter, FavoritesListing, RatingsFilter,
    RatingsSnapshot, WatchlistPick,
};

use super::AppState;

// Request/Response types

#[derive(Debug, Serialize)]
pub struct FeedCreatedResponse<S> {
    pub feed_id: Uuid,
    pub snapshot: S,
}

/// What a catalog feed should browse; a non-blank `query` means search
#[derive(Debug, Deserialize)]
pub struct CatalogFeedRequest {
    pub kind: MediaKind,
    #[serde(default)]
    pub category: Option<CatalogCategory>,
    #[serde(default)]
    pub query: Option<String>,
}

impl CatalogFeedRequest {
    fn catalog_query(&self) -> AppResult<CatalogQuery> {
        CatalogQuery::from_parts(self.category, self.query.as_deref())
    }
}

#[derive(Debug, Deserialize)]
pub struct FavoriteStatusQuery {
    /// Comma-separated catalog ids
    #[serde(default)]
    pub ids: String,
}

#[derive(Debug, Deserialize)]
pub struct WatchlistQuery {
    pub kind: Option<MediaKind>,
    #[serde(default)]
    pub weighted: bool,
}

#[derive(Debug, Serialize)]
pub struct WatchlistToggleResponse {
    pub external_id: String,
    pub kind: MediaKind,
    pub in_watchlist: bool,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Open a ratings feed and load its first page
pub async fn create_ratings_feed(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<(StatusCode, Json<FeedCreatedResponse<RatingsSnapshot>>)> {
    let (feed_id, feed) = state.open_ratings_feed(&session).await;

    if let Err(e) = feed.load_more(&session).await {
        state.close_feed(feed_id, &session).await?;
        return Err(e);
    }

    Ok((
        StatusCode::CREATED,
        Json(FeedCreatedResponse {
            feed_id,
            snapshot: feed.snapshot(&RatingsFilter::default()),
        }),
    ))
}

pub async fn get_ratings_feed(
    State(state): State<AppState>,
    session: Session,
    Path(feed_id): Path<Uuid>,
    Query(filter): Query<RatingsFilter>,
) -> AppResult<Json<RatingsSnapshot>> {
    let feed = state.ratings_feed(feed_id, &session).await?;
    Ok(Json(feed.snapshot(&filter)))
}

/// Load the next page of every collection that still has one
pub async fn load_more_ratings(
    State(state): State<AppState>,
    session: Session,
    Path(feed_id): Path<Uuid>,
    Query(filter): Query<RatingsFilter>,
) -> AppResult<Json<RatingsSnapshot>> {
    let feed = state.ratings_feed(feed_id, &session).await?;
    feed.load_more(&session).await?;
    Ok(Json(feed.snapshot(&filter)))
}

pub async fn reset_ratings_feed(
    State(state): State<AppState>,
    session: Session,
    Path(feed_id): Path<Uuid>,
    Query(filter): Query<RatingsFilter>,
) -> AppResult<Json<RatingsSnapshot>> {
    let feed = state.ratings_feed(feed_id, &session).await?;
    feed.reload(&session).await?;
    Ok(Json(feed.snapshot(&filter)))
}

/// Close a feed of either kind
pub async fn close_feed(
    State(state): State<AppState>,
    session: Session,
    Path(feed_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.close_feed(feed_id, &session).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Open a catalog list or search and load its first page
pub async fn create_catalog_feed(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<CatalogFeedRequest>,
) -> AppResult<(StatusCode, Json<FeedCreatedResponse<CatalogSnapshot>>)> {
    let query = request.catalog_query()?;
    let (feed_id, feed) = state
        .open_catalog_feed(&session, request.kind, query)
        .await?;

    if let Err(e) = feed.load_more(&session).await {
        state.close_feed(feed_id, &session).await?;
        return Err(e);
    }

    Ok((
        StatusCode::CREATED,
        Json(FeedCreatedResponse {
            feed_id,
            snapshot: feed.snapshot(),
        }),
    ))
}

pub async fn get_catalog_feed(
    State(state): State<AppState>,
    session: Session,
    Path(feed_id): Path<Uuid>,
) -> AppResult<Json<CatalogSnapshot>> {
    let feed = state.catalog_feed(feed_id, &session).await?;
    Ok(Json(feed.snapshot()))
}

pub async fn load_more_catalog(
    State(state): State<AppState>,
    session: Session,
    Path(feed_id): Path<Uuid>,
) -> AppResult<Json<CatalogSnapshot>> {
    let feed = state.catalog_feed(feed_id, &session).await?;
    feed.load_more(&session).await?;
    Ok(Json(feed.snapshot()))
}

/// Switch category, kind or search; a change starts over from page one
pub async fn switch_catalog_feed(
    State(state): State<AppState>,
    session: Session,
    Path(feed_id): Path<Uuid>,
    Json(request): Json<CatalogFeedRequest>,
) -> AppResult<Json<CatalogSnapshot>> {
    let feed = state.catalog_feed(feed_id, &session).await?;
    if feed.switch(request.kind, request.catalog_query()?)? {
        feed.load_more(&session).await?;
    }
    Ok(Json(feed.snapshot()))
}

pub async fn reset_catalog_feed(
    State(state): State<AppState>,
    session: Session,
    Path(feed_id): Path<Uuid>,
) -> AppResult<Json<CatalogSnapshot>> {
    let feed = state.catalog_feed(feed_id, &session).await?;
    feed.reload(&session).await?;
    Ok(Json(feed.snapshot()))
}

pub async fn toggle_catalog_favorite(
    State(state): State<AppState>,
    session: Session,
    Path((feed_id, external_id)): Path<(Uuid, String)>,
) -> AppResult<Json<FavoriteStatus>> {
    let feed = state.catalog_feed(feed_id, &session).await?;
    let is_favorite = feed.toggle_favorite(&session, &external_id).await?;
    Ok(Json(FavoriteStatus {
        external_id,
        is_favorite,
    }))
}

/// Create or update a rating
pub async fn rate(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<RatingRequest>,
) -> AppResult<(StatusCode, Json<LocalRecord>)> {
    request.validate()?;
    let stored = state.gateway.rate(&session, &request).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// The user's favorites with catalog details
pub async fn list_favorites(
    State(state): State<AppState>,
    session: Session,
    Query(filter): Query<FavoritesFilter>,
) -> AppResult<Json<FavoritesListing>> {
    let listing = state
        .favorite_list
        .load(&session, &filter, &state.request_token())
        .await?;
    Ok(Json(listing))
}

pub async fn favorite_statuses(
    State(state): State<AppState>,
    session: Session,
    Path(kind): Path<MediaKind>,
    Query(query): Query<FavoriteStatusQuery>,
) -> AppResult<Json<Vec<FavoriteStatus>>> {
    let ids: Vec<String> = query.ids.split(',').map(str::to_string).collect();
    let statuses = state
        .favorites
        .load(&session, kind, &ids, &state.request_token())
        .await?;
    Ok(Json(statuses))
}

pub async fn toggle_favorite(
    State(state): State<AppState>,
    session: Session,
    Path((kind, external_id)): Path<(MediaKind, String)>,
) -> AppResult<Json<FavoriteStatus>> {
    let status = state.favorites.toggle(&session, kind, &external_id).await?;
    Ok(Json(status))
}

/// Watchlist entries with catalog details
pub async fn get_watchlist(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<WatchlistQuery>,
) -> AppResult<Json<Vec<EnrichedRecord>>> {
    let items = state
        .watchlist
        .load(&session, query.kind, &state.request_token())
        .await?;
    Ok(Json(items))
}

pub async fn toggle_watchlist(
    State(state): State<AppState>,
    session: Session,
    Path((kind, external_id)): Path<(MediaKind, String)>,
) -> AppResult<Json<WatchlistToggleResponse>> {
    let in_watchlist = state.watchlist.toggle(&session, kind, &external_id).await?;
    Ok(Json(WatchlistToggleResponse {
        external_id,
        kind,
        in_watchlist,
    }))
}

/// Spin the watchlist roulette
pub async fn pick_from_watchlist(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<WatchlistQuery>,
) -> AppResult<Json<WatchlistPick>> {
    let picked = state
        .watchlist
        .pick(&session, query.kind, query.weighted, &state.request_token())
        .await?;
    Ok(Json(picked))
}
