use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{AppError, AppResult},
    models::{EnrichedRecord, MediaKind, Session},
    services::{
        enrichment::Enricher,
        pager::IncrementalPager,
        providers::CatalogGateway,
    },
};

/// Which collections a snapshot should include
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindFilter {
    #[default]
    All,
    Movie,
    #[serde(alias = "serie")]
    Series,
}

impl KindFilter {
    fn includes(&self, kind: MediaKind) -> bool {
        match self {
            KindFilter::All => true,
            KindFilter::Movie => kind == MediaKind::Movie,
            KindFilter::Series => kind == MediaKind::Series,
        }
    }
}

/// Client-side narrowing of the accumulated ratings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RatingsFilter {
    /// Case-insensitive substring of the catalog title
    #[serde(default)]
    pub query: Option<String>,
    /// Exact user score
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub kind: KindFilter,
}

impl RatingsFilter {
    pub fn matches(&self, item: &EnrichedRecord) -> bool {
        let matches_query = match self.query.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(query) => item
                .detail
                .title
                .to_lowercase()
                .contains(&query.to_lowercase()),
        };
        let matches_score = self.score.map_or(true, |score| item.record.score == Some(score));

        matches_query && matches_score && self.kind.includes(item.record.kind)
    }
}

/// Summary over everything accumulated so far, ignoring filters
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RatingsStats {
    pub total_movies: usize,
    pub total_series: usize,
    pub total_items: usize,
    pub average_movie_score: f64,
    pub average_series_score: f64,
    pub average_score: f64,
    pub movies_with_comments: usize,
    pub series_with_comments: usize,
}

impl RatingsStats {
    fn from_collections(movies: &[EnrichedRecord], series: &[EnrichedRecord]) -> Self {
        Self {
            total_movies: movies.len(),
            total_series: series.len(),
            total_items: movies.len() + series.len(),
            average_movie_score: average_score(movies.iter()),
            average_series_score: average_score(series.iter()),
            average_score: average_score(movies.iter().chain(series.iter())),
            movies_with_comments: movies.iter().filter(|m| m.record.has_comment()).count(),
            series_with_comments: series.iter().filter(|s| s.record.has_comment()).count(),
        }
    }
}

/// Mean user score rounded to one decimal; unscored items count as zero
fn average_score<'a>(items: impl Iterator<Item = &'a EnrichedRecord>) -> f64 {
    let (sum, count) = items.fold((0.0, 0usize), |(sum, count), item| {
        (sum + item.record.score.unwrap_or(0.0), count + 1)
    });
    if count == 0 {
        return 0.0;
    }
    (sum / count as f64 * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Serialize)]
pub struct RatingsSnapshot {
    pub movies: Vec<EnrichedRecord>,
    pub series: Vec<EnrichedRecord>,
    pub has_more_movies: bool,
    pub has_more_series: bool,
    pub has_more: bool,
    pub loading: bool,
    pub stats: RatingsStats,
}

/// What one `load_more` call added to a collection
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoadedPage {
    pub kind: MediaKind,
    pub page: u32,
    pub added: usize,
    pub last: bool,
}

/// The user's rated movies and rated series, paged independently
///
/// Lives as long as the view that shows it. Closing the feed cancels any
/// load still in flight so stale pages never land.
pub struct RatingsFeed {
    gateway: Arc<dyn CatalogGateway>,
    enricher: Enricher,
    page_size: u32,
    pager: Mutex<IncrementalPager<MediaKind>>,
    cancel: CancellationToken,
}

/// Returns the pager to idle if a load ends without committing
struct InFlight<'a> {
    feed: &'a RatingsFeed,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.feed.pager().abort_load();
        }
    }
}

impl RatingsFeed {
    pub fn new(gateway: Arc<dyn CatalogGateway>, enricher: Enricher, page_size: u32) -> Self {
        Self {
            gateway,
            enricher,
            page_size: page_size.max(1),
            pager: Mutex::new(IncrementalPager::new(MediaKind::all())),
            cancel: CancellationToken::new(),
        }
    }

    /// Tie the feed's lifetime to `parent`; cancelling it closes the feed
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    fn pager(&self) -> MutexGuard<'_, IncrementalPager<MediaKind>> {
        self.pager.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop in-flight loads; the feed accepts no further pages
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn has_more(&self) -> bool {
        self.pager().has_more()
    }

    /// Fetch and merge the next page of every collection that is not exhausted
    ///
    /// Rejected with `Conflict` while another load is in flight. A failure to
    /// obtain any page aborts the whole load and leaves the accumulated state
    /// untouched; per-item detail failures only degrade those items.
    pub async fn load_more(&self, session: &Session) -> AppResult<Vec<LoadedPage>> {
        if self.is_closed() {
            return Err(AppError::Cancelled);
        }

        let claimed = self.pager().begin_load()?;
        if claimed.is_empty() {
            return Ok(Vec::new());
        }
        let mut in_flight = InFlight {
            feed: self,
            armed: true,
        };

        let fetches = claimed.iter().map(|(kind, page)| {
            self.gateway
                .fetch_rated_page(session, *kind, *page, self.page_size)
        });

        let pages = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(AppError::Cancelled),
            pages = try_join_all(fetches) => pages,
        };
        let pages = pages.map_err(|e| {
            tracing::error!(error = %e, "Failed to load rated page");
            e
        })?;

        let enrichments = claimed.iter().zip(pages).map(|((kind, page), response)| {
            let kind = *kind;
            let page = *page;
            async move {
                let items = self
                    .enricher
                    .enrich(session, response.content, &self.cancel)
                    .await?;
                Ok::<_, AppError>((kind, page, items, response.last))
            }
        });
        let enriched = try_join_all(enrichments).await?;

        let mut pager = self.pager();
        let mut loaded = Vec::with_capacity(enriched.len());
        for (kind, page, items, last) in enriched {
            if let Some(state) = pager.collection_mut(kind) {
                let added = state.append_page(items, last);
                loaded.push(LoadedPage {
                    kind,
                    page,
                    added,
                    last,
                });
            }
        }
        in_flight.armed = false;
        drop(pager);

        tracing::info!(
            pages = loaded.len(),
            added = loaded.iter().map(|p| p.added).sum::<usize>(),
            "Ratings feed advanced"
        );

        Ok(loaded)
    }

    /// Drop everything accumulated so far
    pub fn reset(&self) -> AppResult<()> {
        let mut pager = self.pager();
        if pager.is_loading() {
            return Err(AppError::Conflict(
                "A page load is already in progress".to_string(),
            ));
        }
        pager.reset();
        Ok(())
    }

    /// Start over from the first page of both collections
    pub async fn reload(&self, session: &Session) -> AppResult<Vec<LoadedPage>> {
        self.reset()?;
        self.load_more(session).await
    }

    pub fn snapshot(&self, filter: &RatingsFilter) -> RatingsSnapshot {
        let pager = self.pager();

        let movies = pager
            .collection(MediaKind::Movie)
            .map(|state| state.items())
            .unwrap_or_default();
        let series = pager
            .collection(MediaKind::Series)
            .map(|state| state.items())
            .unwrap_or_default();

        let open = |kind: MediaKind| {
            pager
                .collection(kind)
                .is_some_and(|state| !state.is_exhausted())
        };

        RatingsSnapshot {
            movies: movies.iter().filter(|m| filter.matches(m)).cloned().collect(),
            series: series.iter().filter(|s| filter.matches(s)).cloned().collect(),
            has_more_movies: open(MediaKind::Movie),
            has_more_series: open(MediaKind::Series),
            has_more: pager.has_more(),
            loading: pager.is_loading(),
            stats: RatingsStats::from_collections(movies, series),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExternalDetail, LocalRecord, PageResponse};
    use crate::services::enrichment::{fallback_detail, EnrichmentOptions};
    use crate::services::providers::MockCatalogGateway;
    use crate::services::retry::testing::RecordingDelay;

    fn rating(id: &str, kind: MediaKind, score: f64) -> LocalRecord {
        LocalRecord {
            title: Some(format!("Local {}", id)),
            score: Some(score),
            ..LocalRecord::new(id, kind)
        }
    }

    fn detail(kind: MediaKind, id: &str) -> ExternalDetail {
        ExternalDetail {
            title: format!("Title {}", id),
            fallback: false,
            ..fallback_detail(&LocalRecord::new(id, kind))
        }
    }

    fn feed(mock: MockCatalogGateway) -> RatingsFeed {
        let gateway: Arc<dyn CatalogGateway> = Arc::new(mock);
        let enricher = Enricher::new(gateway.clone(), EnrichmentOptions::default())
            .with_delay(Arc::new(RecordingDelay::default()));
        RatingsFeed::new(gateway, enricher, 2)
    }

    fn page(records: Vec<LocalRecord>, last: bool) -> PageResponse<LocalRecord> {
        PageResponse {
            content: records,
            last,
        }
    }

    #[tokio::test]
    async fn test_initial_load_fills_both_collections() {
        let mut mock = MockCatalogGateway::new();
        mock.expect_fetch_rated_page()
            .withf(|_, kind, page, size| *kind == MediaKind::Movie && *page == 0 && *size == 2)
            .times(1)
            .returning(|_, kind, _, _| {
                Ok(page(
                    vec![rating("1", kind, 8.0), rating("2", kind, 6.0)],
                    false,
                ))
            });
        mock.expect_fetch_rated_page()
            .withf(|_, kind, page, _| *kind == MediaKind::Series && *page == 0)
            .times(1)
            .returning(|_, kind, _, _| Ok(page(vec![rating("10", kind, 9.0)], true)));
        mock.expect_fetch_detail()
            .returning(|_, kind, id| Ok(detail(kind, id)));

        let feed = feed(mock);
        let loaded = feed.load_more(&Session::new("token")).await.unwrap();

        assert_eq!(loaded.len(), 2);
        let snapshot = feed.snapshot(&RatingsFilter::default());
        assert_eq!(snapshot.movies.len(), 2);
        assert_eq!(snapshot.series.len(), 1);
        assert!(snapshot.has_more_movies);
        assert!(!snapshot.has_more_series);
        assert!(snapshot.has_more);
        assert!(!snapshot.loading);
        assert_eq!(snapshot.stats.total_items, 3);
        assert_eq!(snapshot.stats.average_movie_score, 7.0);
        assert_eq!(snapshot.stats.average_score, 7.7);
    }

    #[tokio::test]
    async fn test_load_more_only_advances_open_collections() {
        let mut mock = MockCatalogGateway::new();
        mock.expect_fetch_rated_page()
            .withf(|_, kind, page, _| *kind == MediaKind::Movie && *page == 0)
            .times(1)
            .returning(|_, kind, _, _| Ok(page(vec![rating("1", kind, 5.0)], false)));
        mock.expect_fetch_rated_page()
            .withf(|_, kind, _, _| *kind == MediaKind::Series)
            .times(1)
            .returning(|_, _, _, _| Ok(page(vec![], true)));
        mock.expect_fetch_rated_page()
            .withf(|_, kind, page, _| *kind == MediaKind::Movie && *page == 1)
            .times(1)
            .returning(|_, kind, _, _| {
                Ok(page(
                    vec![rating("1", kind, 5.0), rating("3", kind, 4.0)],
                    true,
                ))
            });
        mock.expect_fetch_detail()
            .returning(|_, kind, id| Ok(detail(kind, id)));

        let feed = feed(mock);
        let session = Session::new("token");

        feed.load_more(&session).await.unwrap();
        let loaded = feed.load_more(&session).await.unwrap();

        assert_eq!(
            loaded,
            vec![LoadedPage {
                kind: MediaKind::Movie,
                page: 1,
                added: 1,
                last: true,
            }]
        );
        assert!(!feed.has_more());
        assert!(feed.load_more(&session).await.unwrap().is_empty());

        let ids: Vec<String> = feed
            .snapshot(&RatingsFilter::default())
            .movies
            .into_iter()
            .map(|m| m.record.external_id)
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[tokio::test]
    async fn test_page_failure_propagates_and_keeps_state() {
        let mut mock = MockCatalogGateway::new();
        mock.expect_fetch_rated_page()
            .withf(|_, kind, _, _| *kind == MediaKind::Movie)
            .returning(|_, kind, _, _| Ok(page(vec![rating("1", kind, 5.0)], false)));
        mock.expect_fetch_rated_page()
            .withf(|_, kind, _, _| *kind == MediaKind::Series)
            .returning(|_, _, _, _| Err(AppError::Network("connection reset".to_string())));
        mock.expect_fetch_detail().never();

        let feed = feed(mock);
        let result = feed.load_more(&Session::new("token")).await;

        assert!(matches!(result, Err(AppError::Network(_))));
        let snapshot = feed.snapshot(&RatingsFilter::default());
        assert!(snapshot.movies.is_empty());
        assert!(!snapshot.loading);
        assert!(snapshot.has_more);
    }

    #[tokio::test]
    async fn test_closed_feed_rejects_loads() {
        let mut mock = MockCatalogGateway::new();
        mock.expect_fetch_rated_page().never();

        let feed = feed(mock);
        feed.close();

        let result = feed.load_more(&Session::new("token")).await;
        assert!(matches!(result, Err(AppError::Cancelled)));
    }

    /// Holds every page fetch open until the test releases it
    struct GatedGateway {
        gate: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl CatalogGateway for GatedGateway {
        async fn fetch_detail(
            &self,
            _session: &Session,
            kind: MediaKind,
            external_id: &str,
        ) -> AppResult<ExternalDetail> {
            Ok(detail(kind, external_id))
        }

        async fn catalog_page(
            &self,
            _: &Session,
            _: MediaKind,
            _: crate::models::CatalogCategory,
            _: u32,
        ) -> AppResult<crate::models::CatalogPage> {
            Err(AppError::Internal("not used".to_string()))
        }

        async fn search_catalog(
            &self,
            _: &Session,
            _: MediaKind,
            _: &str,
            _: u32,
        ) -> AppResult<crate::models::CatalogPage> {
            Err(AppError::Internal("not used".to_string()))
        }

        async fn fetch_rated_page(
            &self,
            _session: &Session,
            kind: MediaKind,
            _page: u32,
            _size: u32,
        ) -> AppResult<PageResponse<LocalRecord>> {
            self.gate.notified().await;
            Ok(page(vec![rating("1", kind, 7.0)], false))
        }

        async fn rate(&self, _: &Session, _: &crate::models::RatingRequest) -> AppResult<LocalRecord> {
            Err(AppError::Internal("not used".to_string()))
        }

        async fn favorite_status(&self, _: &Session, _: MediaKind, _: &str) -> AppResult<bool> {
            Ok(false)
        }

        async fn toggle_favorite(&self, _: &Session, _: MediaKind, _: &str) -> AppResult<bool> {
            Ok(false)
        }

        async fn favorites(
            &self,
            _: &Session,
            _: MediaKind,
        ) -> AppResult<Vec<crate::models::FavoriteEntry>> {
            Ok(Vec::new())
        }

        async fn watchlist(
            &self,
            _: &Session,
            _: MediaKind,
        ) -> AppResult<Vec<crate::models::WatchlistEntry>> {
            Ok(Vec::new())
        }

        async fn toggle_watchlist(&self, _: &Session, _: MediaKind, _: &str) -> AppResult<bool> {
            Ok(false)
        }
    }

    fn gated_feed() -> (Arc<GatedGateway>, RatingsFeed) {
        let gateway = Arc::new(GatedGateway {
            gate: tokio::sync::Notify::new(),
        });
        let shared: Arc<dyn CatalogGateway> = gateway.clone();
        let enricher = Enricher::new(shared.clone(), EnrichmentOptions::default());
        (gateway, RatingsFeed::new(shared, enricher, 20))
    }

    #[tokio::test]
    async fn test_concurrent_load_is_rejected() {
        let (gateway, feed) = gated_feed();
        let session = Session::new("token");

        let mut first = tokio_test::task::spawn(feed.load_more(&session));
        assert!(first.poll().is_pending());
        assert!(feed.snapshot(&RatingsFilter::default()).loading);

        assert!(matches!(
            feed.load_more(&session).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            feed.reload(&session).await,
            Err(AppError::Conflict(_))
        ));

        gateway.gate.notify_waiters();
        assert!(first.is_woken());
        let loaded = match first.poll() {
            std::task::Poll::Ready(result) => result.unwrap(),
            std::task::Poll::Pending => panic!("first load should complete"),
        };
        assert_eq!(loaded.len(), 2);

        let snapshot = feed.snapshot(&RatingsFilter::default());
        assert!(!snapshot.loading);
        assert_eq!(snapshot.stats.total_items, 2);
    }

    #[tokio::test]
    async fn test_abandoned_load_releases_the_pager() {
        let (_gateway, feed) = gated_feed();
        let session = Session::new("token");

        let mut first = tokio_test::task::spawn(feed.load_more(&session));
        assert!(first.poll().is_pending());
        drop(first);

        assert!(!feed.snapshot(&RatingsFilter::default()).loading);
        assert!(feed.has_more());
    }

    #[test]
    fn test_filter_matches_query_score_and_kind() {
        let mut record = rating("1", MediaKind::Movie, 8.0);
        record.comment = Some("great".to_string());
        let item = EnrichedRecord {
            detail: ExternalDetail {
                title: "The Matrix".to_string(),
                ..fallback_detail(&record)
            },
            record,
        };

        let by_query = RatingsFilter {
            query: Some("matrix".to_string()),
            ..Default::default()
        };
        assert!(by_query.matches(&item));

        let by_score = RatingsFilter {
            score: Some(7.0),
            ..Default::default()
        };
        assert!(!by_score.matches(&item));

        let by_kind = RatingsFilter {
            kind: KindFilter::Series,
            ..Default::default()
        };
        assert!(!by_kind.matches(&item));

        let blank_query = RatingsFilter {
            query: Some("   ".to_string()),
            score: Some(8.0),
            kind: KindFilter::Movie,
        };
        assert!(blank_query.matches(&item));
    }

    #[test]
    fn test_average_score_rounding() {
        let items: Vec<EnrichedRecord> = [9.0, 8.0, 8.0]
            .iter()
            .enumerate()
            .map(|(i, score)| {
                let record = rating(&i.to_string(), MediaKind::Movie, *score);
                EnrichedRecord {
                    detail: fallback_detail(&record),
                    record,
                }
            })
            .collect();

        assert_eq!(average_score(items.iter()), 8.3);
        assert_eq!(average_score(std::iter::empty()), 0.0);
    }
}
