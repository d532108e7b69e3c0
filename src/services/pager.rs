use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    models::{EnrichedRecord, RecordKey},
};

/// Lifecycle of one paged collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionStatus {
    Idle,
    Loading,
    Exhausted,
}

/// Accumulated pages of one collection
///
/// Items keep server page order and are never reordered or removed except by
/// [`PageState::reset`]. No two items share a [`RecordKey`].
#[derive(Debug, Clone)]
pub struct PageState {
    items: Vec<EnrichedRecord>,
    seen: HashSet<RecordKey>,
    pages_loaded: u32,
    status: CollectionStatus,
}

impl Default for PageState {
    fn default() -> Self {
        Self::new()
    }
}

impl PageState {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            seen: HashSet::new(),
            pages_loaded: 0,
            status: CollectionStatus::Idle,
        }
    }

    /// Drop everything and start again from the first page
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Claim the next load; returns the page index to request
    ///
    /// `Ok(None)` when the collection is exhausted, `Conflict` when a load is
    /// already in flight.
    pub fn begin_load(&mut self) -> AppResult<Option<u32>> {
        match self.status {
            CollectionStatus::Loading => Err(AppError::Conflict(
                "A page load is already in progress".to_string(),
            )),
            CollectionStatus::Exhausted => Ok(None),
            CollectionStatus::Idle => {
                self.status = CollectionStatus::Loading;
                Ok(Some(self.pages_loaded))
            }
        }
    }

    /// Give up on an in-flight load without touching the accumulated items
    pub fn abort_load(&mut self) {
        if self.status == CollectionStatus::Loading {
            self.status = CollectionStatus::Idle;
        }
    }

    /// Merge a page; returns how many items were actually new
    ///
    /// Exhaustion is sticky: once a last page has been seen only `reset`
    /// makes the collection loadable again.
    pub fn append_page(&mut self, new_items: Vec<EnrichedRecord>, is_last_page: bool) -> usize {
        let before = self.items.len();

        for item in new_items {
            if self.seen.insert(item.key()) {
                self.items.push(item);
            }
        }

        self.pages_loaded += 1;
        self.status = if is_last_page || self.status == CollectionStatus::Exhausted {
            CollectionStatus::Exhausted
        } else {
            CollectionStatus::Idle
        };

        self.items.len() - before
    }

    pub fn items(&self) -> &[EnrichedRecord] {
        &self.items
    }

    pub fn status(&self) -> CollectionStatus {
        self.status
    }

    pub fn is_exhausted(&self) -> bool {
        self.status == CollectionStatus::Exhausted
    }

    pub fn is_loading(&self) -> bool {
        self.status == CollectionStatus::Loading
    }

    pub fn pages_loaded(&self) -> u32 {
        self.pages_loaded
    }
}

/// Several independently paged collections behind one "load more" control
#[derive(Debug, Clone)]
pub struct IncrementalPager<C: Ord> {
    collections: BTreeMap<C, PageState>,
}

impl<C: Ord + Copy> IncrementalPager<C> {
    pub fn new(collections: impl IntoIterator<Item = C>) -> Self {
        Self {
            collections: collections
                .into_iter()
                .map(|c| (c, PageState::new()))
                .collect(),
        }
    }

    pub fn reset(&mut self) {
        self.collections.values_mut().for_each(PageState::reset);
    }

    pub fn collection(&self, id: C) -> Option<&PageState> {
        self.collections.get(&id)
    }

    pub fn collection_mut(&mut self, id: C) -> Option<&mut PageState> {
        self.collections.get_mut(&id)
    }

    /// True while any tracked collection can still grow
    pub fn has_more(&self) -> bool {
        self.collections.values().any(|state| !state.is_exhausted())
    }

    pub fn is_loading(&self) -> bool {
        self.collections.values().any(PageState::is_loading)
    }

    /// Claim the next page of every collection that still has one
    ///
    /// All-or-nothing: if any collection is mid-load nothing is claimed and
    /// `Conflict` is returned, so only one load per pager is ever in flight.
    pub fn begin_load(&mut self) -> AppResult<Vec<(C, u32)>> {
        if self.is_loading() {
            return Err(AppError::Conflict(
                "A page load is already in progress".to_string(),
            ));
        }

        let mut claimed = Vec::new();
        for (id, state) in self.collections.iter_mut() {
            if let Some(page) = state.begin_load()? {
                claimed.push((*id, page));
            }
        }
        Ok(claimed)
    }

    pub fn abort_load(&mut self) {
        self.collections.values_mut().for_each(PageState::abort_load);
    }
}
