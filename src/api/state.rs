use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{MediaKind, Session};
use crate::services::{
    CatalogFeed, CatalogGateway, CatalogQuery, Enricher, FavoriteStatusLoader, Favorites,
    RatingsFeed, Watchlist,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<RwLock<AppStateInner>>,
    pub gateway: Arc<dyn CatalogGateway>,
    pub enricher: Enricher,
    pub favorites: FavoriteStatusLoader,
    pub favorite_list: Favorites,
    pub watchlist: Watchlist,
    pub page_size: u32,
    pub limits: FeedLimits,
    shutdown: CancellationToken,
}

/// Inner state that can be modified
#[derive(Default)]
pub struct AppStateInner {
    pub feeds: HashMap<Uuid, FeedEntry>,
}

/// Bounds on the feed registry
#[derive(Debug, Clone, Copy)]
pub struct FeedLimits {
    /// Feeds untouched for this long are closed by the sweeper
    pub idle_ttl: Duration,
    pub sweep_interval: Duration,
    /// Opening one more closes the owner's least recently used feed
    pub max_per_owner: usize,
}

impl FeedLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            idle_ttl: config.feed_idle_ttl(),
            sweep_interval: config.feed_sweep_interval(),
            max_per_owner: config.max_feeds_per_owner.max(1),
        }
    }
}

/// A registered feed
#[derive(Clone)]
pub enum Feed {
    Ratings(Arc<RatingsFeed>),
    Catalog(Arc<CatalogFeed>),
}

impl Feed {
    pub fn close(&self) {
        match self {
            Feed::Ratings(feed) => feed.close(),
            Feed::Catalog(feed) => feed.close(),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Feed::Ratings(_) => "Ratings feed",
            Feed::Catalog(_) => "Catalog feed",
        }
    }
}

/// A feed, the token of the session that opened it and when it was last used
pub struct FeedEntry {
    owner: String,
    last_access: Instant,
    pub feed: Feed,
}

impl AppState {
    pub fn new(gateway: Arc<dyn CatalogGateway>, config: &Config) -> Self {
        let enricher = Enricher::new(gateway.clone(), config.enrichment_options());

        Self {
            inner: Arc::new(RwLock::new(AppStateInner::default())),
            favorites: FavoriteStatusLoader::new(
                gateway.clone(),
                config.favorite_status_concurrency,
            ),
            favorite_list: Favorites::new(gateway.clone(), enricher.clone()),
            watchlist: Watchlist::new(gateway.clone(), enricher.clone()),
            enricher,
            gateway,
            page_size: config.page_size,
            limits: FeedLimits::from_config(config),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token for work scoped to a single request; fires on shutdown
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Cancel every open feed and in-flight request
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub async fn open_ratings_feed(&self, session: &Session) -> (Uuid, Arc<RatingsFeed>) {
        let feed = Arc::new(
            RatingsFeed::new(self.gateway.clone(), self.enricher.clone(), self.page_size)
                .with_parent(&self.shutdown),
        );
        let id = self.register(session, Feed::Ratings(feed.clone())).await;
        (id, feed)
    }

    pub async fn open_catalog_feed(
        &self,
        session: &Session,
        kind: MediaKind,
        query: CatalogQuery,
    ) -> AppResult<(Uuid, Arc<CatalogFeed>)> {
        let feed = Arc::new(
            CatalogFeed::new(self.gateway.clone(), self.favorites.clone(), kind, query)?
                .with_parent(&self.shutdown),
        );
        let id = self.register(session, Feed::Catalog(feed.clone())).await;
        Ok((id, feed))
    }

    async fn register(&self, session: &Session, feed: Feed) -> Uuid {
        let id = Uuid::new_v4();
        let label = feed.label();
        let owner = session.token();

        let mut inner = self.inner.write().await;

        let mut owned: Vec<(Uuid, Instant)> = inner
            .feeds
            .iter()
            .filter(|(_, entry)| entry.owner == owner)
            .map(|(id, entry)| (*id, entry.last_access))
            .collect();
        if owned.len() >= self.limits.max_per_owner {
            owned.sort_by_key(|(_, last_access)| *last_access);
            let excess = owned.len() + 1 - self.limits.max_per_owner;
            for (stale, _) in owned.into_iter().take(excess) {
                if let Some(entry) = inner.feeds.remove(&stale) {
                    entry.feed.close();
                    tracing::info!(feed_id = %stale, "Feed closed to make room for a new one");
                }
            }
        }

        inner.feeds.insert(
            id,
            FeedEntry {
                owner: owner.to_string(),
                last_access: Instant::now(),
                feed,
            },
        );

        tracing::info!(feed_id = %id, open_feeds = inner.feeds.len(), "{} opened", label);

        id
    }

    /// Look up a feed and mark it used; feeds owned by another session are reported as missing
    async fn touch(&self, id: Uuid, session: &Session) -> Option<Feed> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .feeds
            .get_mut(&id)
            .filter(|entry| entry.owner == session.token())?;
        entry.last_access = Instant::now();
        Some(entry.feed.clone())
    }

    pub async fn ratings_feed(&self, id: Uuid, session: &Session) -> AppResult<Arc<RatingsFeed>> {
        match self.touch(id, session).await {
            Some(Feed::Ratings(feed)) => Ok(feed),
            _ => Err(AppError::NotFound(format!("Ratings feed {}", id))),
        }
    }

    pub async fn catalog_feed(&self, id: Uuid, session: &Session) -> AppResult<Arc<CatalogFeed>> {
        match self.touch(id, session).await {
            Some(Feed::Catalog(feed)) => Ok(feed),
            _ => Err(AppError::NotFound(format!("Catalog feed {}", id))),
        }
    }

    /// Cancel and forget a feed of either kind
    pub async fn close_feed(&self, id: Uuid, session: &Session) -> AppResult<()> {
        let mut inner = self.inner.write().await;

        let owned = inner
            .feeds
            .get(&id)
            .is_some_and(|entry| entry.owner == session.token());
        if !owned {
            return Err(AppError::NotFound(format!("Feed {}", id)));
        }

        if let Some(entry) = inner.feeds.remove(&id) {
            entry.feed.close();
            tracing::info!(
                feed_id = %id,
                open_feeds = inner.feeds.len(),
                "{} closed",
                entry.feed.label()
            );
        }

        Ok(())
    }

    /// Close and drop every feed unused for at least `ttl`; returns how many went
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write().await;

        let before = inner.feeds.len();
        inner.feeds.retain(|id, entry| {
            let keep = now.saturating_duration_since(entry.last_access) < ttl;
            if !keep {
                entry.feed.close();
                tracing::debug!(feed_id = %id, "Idle feed evicted");
            }
            keep
        });

        before - inner.feeds.len()
    }

    pub async fn open_feeds(&self) -> usize {
        self.inner.read().await.feeds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::MockCatalogGateway;

    fn create_test_state(max_per_owner: usize) -> AppState {
        let config = Config {
            feed_idle_ttl_secs: 600,
            max_feeds_per_owner: max_per_owner,
            ..Config::default()
        };
        AppState::new(Arc::new(MockCatalogGateway::new()), &config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_feeds_expire_and_are_closed() {
        let state = create_test_state(1000);
        let ttl = state.limits.idle_ttl;

        let mut opened = Vec::new();
        for i in 0..1000 {
            let session = Session::new(format!("user-{}", i % 3));
            opened.push(state.open_ratings_feed(&session).await);
        }

        tokio::time::advance(ttl / 2).await;
        let active = Session::new("user-0");
        let (kept_id, kept) = &opened[0];
        state.ratings_feed(*kept_id, &active).await.unwrap();

        tokio::time::advance(ttl / 2).await;
        assert_eq!(state.evict_idle(ttl).await, 999);
        assert_eq!(state.open_feeds().await, 1);

        assert!(!kept.is_closed());
        assert!(opened[1..].iter().all(|(_, feed)| feed.is_closed()));
        assert!(matches!(
            state.ratings_feed(opened[1].0, &Session::new("user-1")).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_owner_cap_closes_least_recently_used() {
        let state = create_test_state(2);
        let session = Session::new("user");

        let (first_id, first) = state.open_ratings_feed(&session).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        let (second_id, second) = state.open_ratings_feed(&session).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        state.ratings_feed(first_id, &session).await.unwrap();

        let (_, third) = state.open_ratings_feed(&session).await;
        state.open_ratings_feed(&Session::new("someone-else")).await;

        assert!(second.is_closed());
        assert!(!first.is_closed());
        assert!(!third.is_closed());
        assert!(state.ratings_feed(second_id, &session).await.is_err());
        assert_eq!(state.open_feeds().await, 3);
    }

    #[tokio::test]
    async fn test_feed_kinds_are_not_interchangeable() {
        let state = create_test_state(8);
        let session = Session::new("user");

        let (id, _) = state
            .open_catalog_feed(&session, MediaKind::Movie, CatalogQuery::default())
            .await
            .unwrap();

        assert!(state.catalog_feed(id, &session).await.is_ok());
        assert!(matches!(
            state.ratings_feed(id, &session).await,
            Err(AppError::NotFound(_))
        ));

        state.close_feed(id, &session).await.unwrap();
        assert!(state.catalog_feed(id, &session).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_closes_open_feeds() {
        let state = create_test_state(8);
        let (_, feed) = state.open_ratings_feed(&Session::new("user")).await;

        state.shutdown();

        assert!(feed.is_closed());
    }
}
