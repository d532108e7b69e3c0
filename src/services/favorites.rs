use std::{collections::HashSet, sync::Arc};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    error::AppResult,
    models::{EnrichedRecord, FavoriteStatus, LocalRecord, MediaKind, Session},
    services::{concurrency::map_with_concurrency, enrichment::Enricher, providers::CatalogGateway},
};

/// Bulk favorite lookups for a screen full of cards
#[derive(Clone)]
pub struct FavoriteStatusLoader {
    gateway: Arc<dyn CatalogGateway>,
    concurrency: usize,
}

impl FavoriteStatusLoader {
    pub fn new(gateway: Arc<dyn CatalogGateway>, concurrency: usize) -> Self {
        Self {
            gateway,
            concurrency,
        }
    }

    /// Looks up each distinct id once, keeping first-seen order
    ///
    /// A failed lookup reports the item as not favorited. Blank ids are skipped.
    pub async fn load(
        &self,
        session: &Session,
        kind: MediaKind,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> AppResult<Vec<FavoriteStatus>> {
        let mut seen = HashSet::new();
        let unique: Vec<&str> = ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty() && seen.insert(*id))
            .collect();

        let statuses = map_with_concurrency(&unique, self.concurrency, cancel, |id| async move {
            let is_favorite = match self.gateway.favorite_status(session, kind, id).await {
                Ok(flag) => flag,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        external_id = %id,
                        kind = %kind,
                        "Favorite status lookup failed"
                    );
                    false
                }
            };
            Ok(FavoriteStatus {
                external_id: id.to_string(),
                is_favorite,
            })
        })
        .await?;

        tracing::debug!(kind = %kind, count = statuses.len(), "Favorite statuses loaded");

        Ok(statuses)
    }

    pub async fn toggle(
        &self,
        session: &Session,
        kind: MediaKind,
        external_id: &str,
    ) -> AppResult<FavoriteStatus> {
        let is_favorite = self
            .gateway
            .toggle_favorite(session, kind, external_id)
            .await?;

        Ok(FavoriteStatus {
            external_id: external_id.to_string(),
            is_favorite,
        })
    }
}

/// Narrowing applied to the favorites listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FavoritesFilter {
    /// Case-insensitive substring of the title or original title
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub kind: Option<MediaKind>,
}

impl FavoritesFilter {
    pub fn matches(&self, item: &EnrichedRecord) -> bool {
        if self.kind.is_some_and(|kind| kind != item.record.kind) {
            return false;
        }

        match self.query.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(query) => {
                let query = query.to_lowercase();
                std::iter::once(&item.detail.title)
                    .chain(item.detail.original_title.as_ref())
                    .any(|title| title.to_lowercase().contains(&query))
            }
        }
    }
}

/// The user's favorites with catalog details; totals ignore the filter
#[derive(Debug, Clone, Serialize)]
pub struct FavoritesListing {
    pub movies: Vec<EnrichedRecord>,
    pub series: Vec<EnrichedRecord>,
    pub total_movies: usize,
    pub total_series: usize,
    pub total_items: usize,
}

#[derive(Clone)]
pub struct Favorites {
    gateway: Arc<dyn CatalogGateway>,
    enricher: Enricher,
}

impl Favorites {
    pub fn new(gateway: Arc<dyn CatalogGateway>, enricher: Enricher) -> Self {
        Self { gateway, enricher }
    }

    /// Both favorites lists, enriched in one pass
    ///
    /// A failed detail lookup degrades that item only; a failed list aborts.
    pub async fn load(
        &self,
        session: &Session,
        filter: &FavoritesFilter,
        cancel: &CancellationToken,
    ) -> AppResult<FavoritesListing> {
        let lists = try_join_all(
            MediaKind::all()
                .into_iter()
                .map(|kind| self.gateway.favorites(session, kind)),
        )
        .await?;
        let records: Vec<LocalRecord> = lists
            .into_iter()
            .flatten()
            .map(LocalRecord::from)
            .collect();

        tracing::info!(entries = records.len(), "Favorites loaded");

        let (movies, series): (Vec<EnrichedRecord>, Vec<EnrichedRecord>) = self
            .enricher
            .enrich(session, records, cancel)
            .await?
            .into_iter()
            .partition(|item| item.record.kind == MediaKind::Movie);

        Ok(FavoritesListing {
            total_movies: movies.len(),
            total_series: series.len(),
            total_items: movies.len() + series.len(),
            movies: movies.into_iter().filter(|m| filter.matches(m)).collect(),
            series: series.into_iter().filter(|s| filter.matches(s)).collect(),
        })
    }
}
