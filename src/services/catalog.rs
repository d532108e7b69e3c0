use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{AppError, AppResult},
    models::{CatalogCategory, CatalogPage, EnrichedRecord, ExternalDetail, MediaKind, Session},
    services::{
        favorites::FavoriteStatusLoader,
        pager::{CollectionStatus, PageState},
        providers::CatalogGateway,
    },
};

/// What a catalog feed is currently browsing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CatalogQuery {
    Category { category: CatalogCategory },
    Search { query: String },
}

impl Default for CatalogQuery {
    fn default() -> Self {
        CatalogQuery::Category {
            category: CatalogCategory::Popular,
        }
    }
}

impl CatalogQuery {
    /// Search mode; the query is trimmed and must not be blank
    pub fn search(query: &str) -> AppResult<Self> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidInput("Search query is required".to_string()));
        }
        Ok(CatalogQuery::Search {
            query: query.to_string(),
        })
    }

    /// Builds the query from request fields; a non-blank search wins over a category
    pub fn from_parts(category: Option<CatalogCategory>, search: Option<&str>) -> AppResult<Self> {
        match search.map(str::trim) {
            Some(query) if !query.is_empty() => Self::search(query),
            _ => Ok(category
                .map(|category| CatalogQuery::Category { category })
                .unwrap_or_default()),
        }
    }

    fn validate(&self, kind: MediaKind) -> AppResult<()> {
        match self {
            CatalogQuery::Category { category } if !category.supports(kind) => {
                Err(AppError::InvalidInput(format!(
                    "Category {} is not available for {}",
                    category, kind
                )))
            }
            _ => Ok(()),
        }
    }
}

/// A catalog card with the user's favorite flag
#[derive(Debug, Clone, Serialize)]
pub struct CatalogItem {
    #[serde(flatten)]
    pub detail: ExternalDetail,
    pub is_favorite: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogSnapshot {
    pub kind: MediaKind,
    pub query: CatalogQuery,
    pub items: Vec<CatalogItem>,
    pub pages_loaded: u32,
    pub total_pages: u32,
    pub total_results: u64,
    pub has_more: bool,
    pub loading: bool,
}

/// What one `load_more` call added
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CatalogLoadedPage {
    pub page: u32,
    pub added: usize,
    pub last: bool,
}

struct CatalogState {
    kind: MediaKind,
    query: CatalogQuery,
    pages: PageState,
    total_pages: u32,
    total_results: u64,
    favorites: HashMap<String, bool>,
    /// Bumped on every reset so loads started before it never commit
    generation: u64,
}

impl CatalogState {
    fn new(kind: MediaKind, query: CatalogQuery, generation: u64) -> Self {
        Self {
            kind,
            query,
            pages: PageState::new(),
            total_pages: 0,
            total_results: 0,
            favorites: HashMap::new(),
            generation,
        }
    }
}

/// One browsable catalog list or search, paged on demand
///
/// Pages are 1-based as TMDB serves them. The list is exhausted once a page
/// reports `page >= total_pages`. Favorite flags are resolved for every new
/// item as its page lands.
pub struct CatalogFeed {
    gateway: Arc<dyn CatalogGateway>,
    favorites: FavoriteStatusLoader,
    state: Mutex<CatalogState>,
    cancel: CancellationToken,
}

/// Returns the collection to idle if a load ends without committing
struct InFlight<'a> {
    feed: &'a CatalogFeed,
    generation: u64,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.feed.state();
        if state.generation == self.generation {
            state.pages.abort_load();
        }
    }
}

impl CatalogFeed {
    pub fn new(
        gateway: Arc<dyn CatalogGateway>,
        favorites: FavoriteStatusLoader,
        kind: MediaKind,
        query: CatalogQuery,
    ) -> AppResult<Self> {
        query.validate(kind)?;

        Ok(Self {
            gateway,
            favorites,
            state: Mutex::new(CatalogState::new(kind, query, 0)),
            cancel: CancellationToken::new(),
        })
    }

    /// Tie the feed's lifetime to `parent`; cancelling it closes the feed
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    fn state(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn has_more(&self) -> bool {
        !self.state().pages.is_exhausted()
    }

    /// Browse something else; everything loaded so far is dropped
    ///
    /// Switching to what is already shown keeps the loaded pages. A load
    /// still in flight for the old query finishes with `Cancelled`.
    pub fn switch(&self, kind: MediaKind, query: CatalogQuery) -> AppResult<bool> {
        query.validate(kind)?;

        let mut state = self.state();
        if state.kind == kind && state.query == query {
            return Ok(false);
        }

        tracing::debug!(kind = %kind, query = ?query, "Catalog feed switched");

        let generation = state.generation + 1;
        *state = CatalogState::new(kind, query, generation);
        Ok(true)
    }

    /// Drop loaded pages and cached favorite flags, keeping the query
    pub fn reset(&self) {
        let mut state = self.state();
        let generation = state.generation + 1;
        let (kind, query) = (state.kind, state.query.clone());
        *state = CatalogState::new(kind, query, generation);
    }

    pub async fn reload(&self, session: &Session) -> AppResult<Option<CatalogLoadedPage>> {
        self.reset();
        self.load_more(session).await
    }

    /// Fetch the next page and resolve favorite flags for its new items
    ///
    /// `Ok(None)` once the list is exhausted; `Conflict` while another load is
    /// in flight.
    pub async fn load_more(&self, session: &Session) -> AppResult<Option<CatalogLoadedPage>> {
        if self.is_closed() {
            return Err(AppError::Cancelled);
        }

        let (kind, query, generation, page) = {
            let mut state = self.state();
            let Some(loaded) = state.pages.begin_load()? else {
                return Ok(None);
            };
            (state.kind, state.query.clone(), state.generation, loaded + 1)
        };
        let mut in_flight = InFlight {
            feed: self,
            generation,
            armed: true,
        };

        let fetch = async {
            match &query {
                CatalogQuery::Category { category } => {
                    self.gateway
                        .catalog_page(session, kind, *category, page)
                        .await
                }
                CatalogQuery::Search { query } => {
                    self.gateway.search_catalog(session, kind, query, page).await
                }
            }
        };

        let listing: AppResult<CatalogPage> = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(AppError::Cancelled),
            listing = fetch => listing,
        };
        let listing = listing.map_err(|e| {
            tracing::error!(error = %e, kind = %kind, page, "Failed to load catalog page");
            e
        })?;

        let new_ids: Vec<String> = {
            let state = self.state();
            listing
                .results
                .iter()
                .map(|detail| detail.id.to_string())
                .filter(|id| !state.favorites.contains_key(id))
                .collect()
        };
        let statuses = self
            .favorites
            .load(session, kind, &new_ids, &self.cancel)
            .await?;

        let mut state = self.state();
        if state.generation != generation {
            return Err(AppError::Cancelled);
        }

        let last = listing.is_last();
        state.total_pages = listing.total_pages;
        state.total_results = listing.total_results;
        state.favorites.extend(
            statuses
                .into_iter()
                .map(|status| (status.external_id, status.is_favorite)),
        );
        let added = state.pages.append_page(
            listing.results.into_iter().map(EnrichedRecord::from).collect(),
            last,
        );
        in_flight.armed = false;
        drop(state);

        tracing::info!(kind = %kind, page, added, last, "Catalog feed advanced");

        Ok(Some(CatalogLoadedPage { page, added, last }))
    }

    /// Flip the favorite flag of one item and remember the new state
    pub async fn toggle_favorite(&self, session: &Session, external_id: &str) -> AppResult<bool> {
        let kind = self.state().kind;
        let status = self.favorites.toggle(session, kind, external_id).await?;

        self.state()
            .favorites
            .insert(status.external_id, status.is_favorite);

        Ok(status.is_favorite)
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        let state = self.state();

        CatalogSnapshot {
            kind: state.kind,
            query: state.query.clone(),
            items: state
                .pages
                .items()
                .iter()
                .map(|item| CatalogItem {
                    is_favorite: state
                        .favorites
                        .get(&item.record.external_id)
                        .copied()
                        .unwrap_or(false),
                    detail: item.detail.clone(),
                })
                .collect(),
            pages_loaded: state.pages.pages_loaded(),
            total_pages: state.total_pages,
            total_results: state.total_results,
            has_more: !state.pages.is_exhausted(),
            loading: state.pages.status() == CollectionStatus::Loading,
        }
    }
}
