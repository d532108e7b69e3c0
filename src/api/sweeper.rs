//! Periodic eviction of idle feeds
//!
//! Runs on a fixed interval until the application shuts down. Evicted feeds
//! are closed, so a load still running on one ends with `Cancelled`.

use super::AppState;

pub async fn run(state: AppState) {
    let cancel = state.request_token();
    let limits = state.limits;

    tracing::info!(
        idle_ttl_secs = limits.idle_ttl.as_secs(),
        interval_secs = limits.sweep_interval.as_secs(),
        "Feed sweeper started"
    );

    let mut interval = tokio::time::interval(limits.sweep_interval);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Feed sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                let evicted = state.evict_idle(limits.idle_ttl).await;
                if evicted > 0 {
                    let open_feeds = state.open_feeds().await;
                    tracing::info!(evicted, open_feeds, "Idle feeds evicted");
                } else {
                    tracing::debug!("No idle feeds to evict");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    use crate::config::Config;
    use crate::models::Session;
    use crate::services::providers::MockCatalogGateway;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_until_shutdown() {
        let config = Config {
            feed_idle_ttl_secs: 300,
            feed_sweep_interval_secs: 60,
            ..Config::default()
        };
        let state = AppState::new(Arc::new(MockCatalogGateway::new()), &config);

        let (_, idle) = state.open_ratings_feed(&Session::new("user-a")).await;
        let (busy_id, busy) = state.open_ratings_feed(&Session::new("user-b")).await;

        let sweeper = tokio::spawn(run(state.clone()));

        for _ in 0..6 {
            tokio::time::sleep(Duration::from_secs(60)).await;
            state
                .ratings_feed(busy_id, &Session::new("user-b"))
                .await
                .unwrap();
        }

        assert!(idle.is_closed());
        assert!(!busy.is_closed());
        assert_eq!(state.open_feeds().await, 1);

        state.shutdown();
        sweeper.await.unwrap();
        assert!(busy.is_closed());
    }
}
