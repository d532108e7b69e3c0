use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    error::{AppError, AppResult},
    models::{EnrichedRecord, ExternalDetail, LocalRecord, Session},
    services::{
        concurrency::map_with_concurrency,
        providers::CatalogGateway,
        retry::{fetch_with_retry, Delay, RetryPolicy, TokioDelay},
    },
};

/// Tuning for detail hydration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrichmentOptions {
    /// Detail fetches in flight at once
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self {
            concurrency: 6,
            retry: RetryPolicy::default(),
        }
    }
}

/// Joins local records with their catalog details
///
/// Individual lookups never fail the batch: a record without a usable id, or
/// whose lookup still fails after retries, gets a detail synthesized from its
/// own fields (see [`fallback_detail`]).
#[derive(Clone)]
pub struct Enricher {
    gateway: Arc<dyn CatalogGateway>,
    delay: Arc<dyn Delay>,
    options: EnrichmentOptions,
}

impl Enricher {
    pub fn new(gateway: Arc<dyn CatalogGateway>, options: EnrichmentOptions) -> Self {
        Self {
            gateway,
            delay: Arc::new(TokioDelay),
            options,
        }
    }

    /// Replace the timer used between retries
    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    pub fn options(&self) -> &EnrichmentOptions {
        &self.options
    }

    /// Returns one enriched record per input, in input order
    ///
    /// Only fails when `cancel` fires, in which case the partial result is dropped.
    pub async fn enrich(
        &self,
        session: &Session,
        records: Vec<LocalRecord>,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<EnrichedRecord>> {
        let details = map_with_concurrency(
            &records,
            self.options.concurrency,
            cancel,
            |record| self.detail_for(session, record, cancel),
        )
        .await?;

        let enriched: Vec<EnrichedRecord> = records
            .into_iter()
            .zip(details)
            .map(|(record, detail)| EnrichedRecord { record, detail })
            .collect();

        let degraded = enriched.iter().filter(|r| r.is_degraded()).count();
        if degraded > 0 {
            tracing::warn!(
                total = enriched.len(),
                degraded,
                "Enriched batch with fallback details"
            );
        } else {
            tracing::debug!(total = enriched.len(), "Enriched batch");
        }

        Ok(enriched)
    }

    async fn detail_for(
        &self,
        session: &Session,
        record: &LocalRecord,
        cancel: &CancellationToken,
    ) -> AppResult<ExternalDetail> {
        let Some(external_id) = record.lookup_id() else {
            tracing::debug!(kind = %record.kind, "Record has no catalog id, using fallback");
            return Ok(fallback_detail(record));
        };

        let fetched = fetch_with_retry(&self.options.retry, self.delay.as_ref(), cancel, || {
            self.gateway.fetch_detail(session, record.kind, external_id)
        })
        .await;

        match fetched {
            Ok(detail) => Ok(detail),
            Err(AppError::Cancelled) => Err(AppError::Cancelled),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    external_id = %external_id,
                    kind = %record.kind,
                    "Detail lookup failed, using fallback"
                );
                Ok(fallback_detail(record))
            }
        }
    }
}

/// Best-effort detail built only from what the local record already knows
pub fn fallback_detail(record: &LocalRecord) -> ExternalDetail {
    let title = record
        .title
        .clone()
        .unwrap_or_else(|| record.kind.unknown_title().to_string());

    ExternalDetail {
        id: record.external_id.trim().parse().unwrap_or(0),
        kind: record.kind,
        original_title: Some(title.clone()),
        title,
        overview: None,
        poster_path: record.poster_path.clone(),
        backdrop_path: None,
        release_date: None,
        vote_average: record.score.filter(|score| *score > 0.0),
        genres: Vec::new(),
        cast: Vec::new(),
        fallback: true,
    }
}
