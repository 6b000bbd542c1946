//! Lazily evaluated, sliceable search results.
//!
//! A [`SearchResults`] value holds a window `[start, stop)` over the hits of
//! one compiled search. Slicing composes windows without touching the engine;
//! the first call that needs objects (`results`, `get`, `len`) sends the final
//! window and caches what came back.

pub mod engine;

use std::fmt;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::object::ObjectRef;

pub use engine::{EngineResultFetcher, ScrollGuard};

/// A resolved hit with the engine's score, when the backend computes one.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub object: ObjectRef,
    pub score: Option<f64>,
}

/// Executes a compiled search for a window of hits.
pub trait ResultFetcher: Send + Sync + fmt::Debug {
    /// Objects for hits `start..stop` (`stop = None` means to the end), in engine order.
    fn fetch(&self, start: usize, stop: Option<usize>) -> Result<Vec<SearchHit>>;

    /// Number of hits of the whole, unsliced search.
    fn count(&self) -> Result<usize>;
}

/// A lazily evaluated window over the hits of one search.
///
/// Slicing composes windows without sending anything; the first call that
/// needs hits fetches the composed window once and caches it.
pub struct SearchResults {
    fetcher: Option<Arc<dyn ResultFetcher>>,
    start: usize,
    stop: Option<usize>,
    hits_cache: Mutex<Option<Vec<SearchHit>>>,
    count_cache: Mutex<Option<usize>>,
}

impl fmt::Debug for SearchResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchResults")
            .field("start", &self.start)
            .field("stop", &self.stop)
            .field("cached", &self.hits_cache.lock().is_some())
            .finish()
    }
}

impl SearchResults {
    /// Create new results over every hit `fetcher` can return.
    pub fn new(fetcher: Arc<dyn ResultFetcher>) -> Self {
        SearchResults {
            fetcher: Some(fetcher),
            start: 0,
            stop: None,
            hits_cache: Mutex::new(None),
            count_cache: Mutex::new(None),
        }
    }

    /// Results that never issue a request, for blank queries and unindexed types.
    pub fn empty() -> Self {
        SearchResults {
            fetcher: None,
            start: 0,
            stop: None,
            hits_cache: Mutex::new(Some(Vec::new())),
            count_cache: Mutex::new(Some(0)),
        }
    }

    /// Offset of the window within the whole search.
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn stop(&self) -> Option<usize> {
        self.stop
    }

    fn derive(&self, start: usize, stop: Option<usize>) -> SearchResults {
        SearchResults {
            fetcher: self.fetcher.clone(),
            start,
            stop,
            hits_cache: Mutex::new(None),
            count_cache: Mutex::new(None),
        }
    }

    /// Narrow the window. Offsets are relative to the current window; the
    /// stop bound is applied before the start bound.
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> SearchResults {
        let relative_start = match range.start_bound() {
            Bound::Included(s) => Some(*s),
            Bound::Excluded(s) => Some(s + 1),
            Bound::Unbounded => None,
        };
        let relative_stop = match range.end_bound() {
            Bound::Included(e) => Some(e + 1),
            Bound::Excluded(e) => Some(*e),
            Bound::Unbounded => None,
        };

        let mut start = self.start;
        let mut stop = self.stop;
        if let Some(relative_stop) = relative_stop {
            let candidate = self.start + relative_stop;
            stop = Some(stop.map_or(candidate, |s| s.min(candidate)));
        }
        if let Some(relative_start) = relative_start {
            let candidate = self.start + relative_start;
            start = stop.map_or(candidate, |s| s.min(candidate));
        }

        let sliced = self.derive(start, stop);
        if let Some(cached) = self.hits_cache.lock().as_ref() {
            let from = (start - self.start).min(cached.len());
            let to = stop
                .map_or(cached.len(), |s| (s - self.start).min(cached.len()))
                .max(from);
            *sliced.hits_cache.lock() = Some(cached[from..to].to_vec());
        }
        sliced
    }

    /// Resolved hits of the window, fetched on first use.
    pub fn hits(&self) -> Result<Vec<SearchHit>> {
        let mut cache = self.hits_cache.lock();
        if let Some(hits) = cache.as_ref() {
            return Ok(hits.clone());
        }
        let hits = match &self.fetcher {
            Some(fetcher) => fetcher.fetch(self.start, self.stop)?,
            None => Vec::new(),
        };
        *cache = Some(hits.clone());
        Ok(hits)
    }

    /// Objects in the window, in engine order; fetches them.
    pub fn results(&self) -> Result<Vec<ObjectRef>> {
        Ok(self.hits()?.into_iter().map(|hit| hit.object).collect())
    }

    /// Object at `index` within the window.
    pub fn get(&self, index: usize) -> Result<Option<ObjectRef>> {
        if let Some(hits) = self.hits_cache.lock().as_ref() {
            return Ok(hits.get(index).map(|hit| hit.object.clone()));
        }
        let position = self.start + index;
        if self.stop.is_some_and(|stop| position >= stop) {
            return Ok(None);
        }
        Ok(self
            .derive(position, Some(position + 1))
            .results()?
            .into_iter()
            .next())
    }

    /// Number of resolved objects in the window; fetches them.
    pub fn len(&self) -> Result<usize> {
        Ok(self.hits()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of hits in the window, from the engine's count when nothing is
    /// cached yet. Hits whose objects no longer exist are still counted.
    pub fn count(&self) -> Result<usize> {
        let mut count_cache = self.count_cache.lock();
        if let Some(count) = *count_cache {
            return Ok(count);
        }
        if let Some(hits) = self.hits_cache.lock().as_ref() {
            *count_cache = Some(hits.len());
            return Ok(hits.len());
        }

        let total = match &self.fetcher {
            Some(fetcher) => fetcher.count()?,
            None => 0,
        };
        let mut count = total.saturating_sub(self.start);
        if let Some(stop) = self.stop {
            count = count.min(stop - self.start);
        }
        *count_cache = Some(count);
        Ok(count)
    }
}
