use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};

/// Applies `transform` to every item with at most `limit` calls in flight
///
/// `min(limit, items.len())` workers share one cursor; each claims the next
/// unclaimed index and keeps the result paired with it, so the returned vector
/// is in input order whatever the completion order. Workers are polled on the
/// calling task rather than spawned.
///
/// The first transform error aborts the whole mapping. Once `cancel` fires,
/// workers stop claiming indices and the mapping fails with
/// [`AppError::Cancelled`].
pub async fn map_with_concurrency<'a, T, R, F, Fut>(
    items: &'a [T],
    limit: usize,
    cancel: &CancellationToken,
    transform: F,
) -> AppResult<Vec<R>>
where
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = AppResult<R>>,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let worker_count = limit.max(1).min(items.len());
    let cursor = AtomicUsize::new(0);

    let cursor = &cursor;
    let transform = &transform;

    let workers = (0..worker_count).map(|_| async move {
        let mut produced = Vec::new();
        loop {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            let index = cursor.fetch_add(1, Ordering::Relaxed);
            let Some(item) = items.get(index) else {
                break;
            };
            produced.push((index, transform(item).await?));
        }
        Ok::<_, AppError>(produced)
    });

    let batches = try_join_all(workers).await?;

    let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(items.len()).collect();
    for (index, result) in batches.into_iter().flatten() {
        slots[index] = Some(result);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| AppError::Internal(format!("No result produced for index {}", index)))
        })
        .collect()
}
