/// Catalog gateway abstraction
///
/// Everything this service knows about movies, series, ratings, favorites and
/// the watchlist comes through the backend gateway. The trait keeps the
/// orchestration code transport-agnostic so it can be exercised against mocks.
use crate::{
    error::AppResult,
    models::{
        CatalogCategory, CatalogPage, ExternalDetail, FavoriteEntry, LocalRecord, MediaKind,
        PageResponse, RatingRequest, Session, WatchlistEntry,
    },
};

pub mod gateway;

pub use gateway::HttpGateway;

/// Operations consumed from the lms-filmes, lms-rating and lms-favorite services
///
/// Every call is made on behalf of the user identified by `session`.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogGateway: Send + Sync {
    /// Fetch the catalog description of one movie or series
    ///
    /// Fails with `NotFound` for unknown ids and with `Network`/`Timeout`
    /// when the gateway cannot be reached.
    async fn fetch_detail(
        &self,
        session: &Session,
        kind: MediaKind,
        external_id: &str,
    ) -> AppResult<ExternalDetail>;

    /// Fetch one page (1-based) of a curated catalog list
    async fn catalog_page(
        &self,
        session: &Session,
        kind: MediaKind,
        category: CatalogCategory,
        page: u32,
    ) -> AppResult<CatalogPage>;

    /// Fetch one page (1-based) of catalog search results
    async fn search_catalog(
        &self,
        session: &Session,
        kind: MediaKind,
        query: &str,
        page: u32,
    ) -> AppResult<CatalogPage>;

    /// Fetch one page (0-based) of the user's ratings of the given kind
    async fn fetch_rated_page(
        &self,
        session: &Session,
        kind: MediaKind,
        page: u32,
        size: u32,
    ) -> AppResult<PageResponse<LocalRecord>>;

    /// Create or update the user's rating; returns the stored record
    async fn rate(&self, session: &Session, request: &RatingRequest) -> AppResult<LocalRecord>;

    async fn favorite_status(
        &self,
        session: &Session,
        kind: MediaKind,
        external_id: &str,
    ) -> AppResult<bool>;

    /// Flip the favorite flag; returns the new state
    async fn toggle_favorite(
        &self,
        session: &Session,
        kind: MediaKind,
        external_id: &str,
    ) -> AppResult<bool>;

    /// Everything the user currently has favorited, in backend order
    async fn favorites(&self, session: &Session, kind: MediaKind)
        -> AppResult<Vec<FavoriteEntry>>;

    async fn watchlist(&self, session: &Session, kind: MediaKind)
        -> AppResult<Vec<WatchlistEntry>>;

    /// Add to or remove from the watchlist; returns whether the item is now listed
    async fn toggle_watchlist(
        &self,
        session: &Session,
        kind: MediaKind,
        external_id: &str,
    ) -> AppResult<bool>;
}
