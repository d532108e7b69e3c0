use std::sync::Arc;

use futures::future::try_join_all;
use rand::distr::{weighted::WeightedIndex, Distribution};
use rand::Rng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{AppError, AppResult},
    models::{EnrichedRecord, LocalRecord, MediaKind, Session},
    services::{enrichment::Enricher, providers::CatalogGateway},
};

/// Frames shown by the roulette before it settles
pub const SPIN_FRAMES: usize = 16;

/// A roulette result: the frames in display order, ending on the pick
#[derive(Debug, Clone, Serialize)]
pub struct WatchlistPick {
    pub pick: EnrichedRecord,
    pub spin: Vec<EnrichedRecord>,
}

#[derive(Clone)]
pub struct Watchlist {
    gateway: Arc<dyn CatalogGateway>,
    enricher: Enricher,
}

impl Watchlist {
    pub fn new(gateway: Arc<dyn CatalogGateway>, enricher: Enricher) -> Self {
        Self { gateway, enricher }
    }

    /// Watchlist entries with catalog details; both kinds when `kind` is `None`
    pub async fn load(
        &self,
        session: &Session,
        kind: Option<MediaKind>,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<EnrichedRecord>> {
        let kinds: Vec<MediaKind> = match kind {
            Some(kind) => vec![kind],
            None => MediaKind::all().to_vec(),
        };

        let lists = try_join_all(kinds.iter().map(|k| self.gateway.watchlist(session, *k))).await?;
        let records: Vec<LocalRecord> = lists
            .into_iter()
            .flatten()
            .map(LocalRecord::from)
            .collect();

        tracing::info!(entries = records.len(), "Watchlist loaded");

        self.enricher.enrich(session, records, cancel).await
    }

    /// Add or remove an item; returns whether it is now listed
    pub async fn toggle(
        &self,
        session: &Session,
        kind: MediaKind,
        external_id: &str,
    ) -> AppResult<bool> {
        self.gateway
            .toggle_watchlist(session, kind, external_id)
            .await
    }

    pub async fn pick(
        &self,
        session: &Session,
        kind: Option<MediaKind>,
        weighted: bool,
        cancel: &CancellationToken,
    ) -> AppResult<WatchlistPick> {
        let items = self.load(session, kind, cancel).await?;
        let picked = pick_from(&items, weighted, &mut rand::rng())?;

        tracing::info!(
            external_id = %picked.pick.record.external_id,
            kind = %picked.pick.record.kind,
            weighted,
            "Watchlist pick"
        );

        Ok(picked)
    }
}

/// Draw the roulette frames from `items`
///
/// Every item is equally likely unless `weighted`, in which case the catalog
/// vote average is the weight, floored at 1 so unrated items stay in play.
pub fn pick_from<R: Rng + ?Sized>(
    items: &[EnrichedRecord],
    weighted: bool,
    rng: &mut R,
) -> AppResult<WatchlistPick> {
    if items.is_empty() {
        return Err(AppError::InvalidInput("watchlist is empty".to_string()));
    }

    let weights = items.iter().map(|item| {
        if weighted {
            item.detail.vote_average.unwrap_or(0.0).max(1.0)
        } else {
            1.0
        }
    });
    let distribution = WeightedIndex::new(weights)
        .map_err(|e| AppError::Internal(format!("Invalid watchlist weights: {}", e)))?;

    let spin: Vec<EnrichedRecord> = (0..SPIN_FRAMES)
        .map(|_| items[distribution.sample(rng)].clone())
        .collect();
    let pick = spin[SPIN_FRAMES - 1].clone();

    Ok(WatchlistPick { pick, spin })
}
