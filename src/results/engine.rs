//! Result fetching against a search engine.
//!
//! Windows that fit in one page are fetched with a plain `from`/`size`
//! request. Unbounded windows and windows larger than a page go through the
//! cursor protocol: whole pages before the window start are skipped through
//! cursor calls without resolving their objects, and the cursor is released
//! when fetching ends, on success or error.

use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use serde_json::Value;

use crate::engine::{EngineClient, Hit, SearchRequest};
use crate::error::{Result, SearchGateError};
use crate::mapping::Dialect;
use crate::object::ObjectStore;
use crate::results::{ResultFetcher, SearchHit};

/// Releases a server-side cursor when dropped.
pub struct ScrollGuard<'a> {
    client: &'a dyn EngineClient,
    scroll_id: String,
}

impl<'a> ScrollGuard<'a> {
    pub fn new(client: &'a dyn EngineClient, scroll_id: String) -> Self {
        ScrollGuard { client, scroll_id }
    }

    pub fn id(&self) -> &str {
        &self.scroll_id
    }

    /// Engines may hand out a new cursor id with every page.
    pub fn update(&mut self, scroll_id: Option<String>) {
        if let Some(id) = scroll_id {
            self.scroll_id = id;
        }
    }
}

impl Drop for ScrollGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.client.clear_scroll(&self.scroll_id) {
            warn!("Failed to release cursor {}: {e}", self.scroll_id);
        }
    }
}

/// Fetches hits for one compiled search and resolves them against the object store.
pub struct EngineResultFetcher {
    client: Arc<dyn EngineClient>,
    store: Arc<dyn ObjectStore>,
    dialect: Arc<dyn Dialect>,
    index: String,
    type_id: String,
    query: Value,
    sort: Option<Value>,
    page_size: usize,
    scroll_keep_alive: String,
}

impl fmt::Debug for EngineResultFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineResultFetcher")
            .field("index", &self.index)
            .field("type_id", &self.type_id)
            .field("query", &self.query)
            .field("sort", &self.sort)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl EngineResultFetcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn EngineClient>,
        store: Arc<dyn ObjectStore>,
        dialect: Arc<dyn Dialect>,
        index: String,
        type_id: String,
        query: Value,
        sort: Option<Value>,
        page_size: usize,
        scroll_keep_alive: String,
    ) -> Self {
        EngineResultFetcher {
            client,
            store,
            dialect,
            index,
            type_id,
            query,
            sort,
            page_size: page_size.max(1),
            scroll_keep_alive,
        }
    }

    fn request(&self) -> SearchRequest {
        let mut request =
            SearchRequest::new(self.index.clone(), self.query.clone()).sort(self.sort.clone());
        self.dialect.decorate_search_body(&mut request.extra);
        request
    }

    /// Resolve one page of hits with a single store lookup. Hits whose object
    /// no longer exists are dropped; duplicates are kept.
    fn resolve(&self, hits: &[Hit]) -> Result<Vec<SearchHit>> {
        let pks: Vec<String> = hits.iter().map(|hit| hit.pk.clone()).collect();
        let objects = self.store.resolve(&self.type_id, &pks)?;
        let resolved: Vec<SearchHit> = hits
            .iter()
            .filter_map(|hit| {
                objects.get(&hit.pk).map(|object| SearchHit {
                    object: object.clone(),
                    score: Some(hit.score),
                })
            })
            .collect();
        if resolved.len() < hits.len() {
            debug!(
                "{} of {} hits in {} have no live object",
                hits.len() - resolved.len(),
                hits.len(),
                self.index
            );
        }
        Ok(resolved)
    }

    fn fetch_page(&self, start: usize, limit: usize) -> Result<Vec<SearchHit>> {
        let request = self.request().from(start).size(limit);
        debug!("Searching {} from {start} size {limit}", self.index);
        let response = self.client.search(&request)?;
        self.resolve(&response.hits)
    }

    fn fetch_scrolling(&self, start: usize, limit: Option<usize>) -> Result<Vec<SearchHit>> {
        let offset_supported = self.dialect.scroll_supports_offset();
        let mut request = self
            .request()
            .size(self.page_size)
            .scroll(self.scroll_keep_alive.clone());
        let mut skip = start;
        if offset_supported && start > 0 {
            request = request.from(start);
            skip = 0;
        }

        debug!(
            "Scrolling {} from {start} in pages of {}",
            self.index, self.page_size
        );
        let response = self.client.search(&request)?;
        let scroll_id = response.scroll_id.ok_or_else(|| {
            SearchGateError::backend(format!("{} returned no cursor id", self.index))
        })?;
        let mut guard = ScrollGuard::new(self.client.as_ref(), scroll_id);

        let mut results = Vec::new();
        let mut taken = 0;
        let mut page = response.hits;
        while !page.is_empty() {
            if skip >= page.len() {
                skip -= page.len();
            } else {
                // The window is counted in engine hits, not in resolved objects.
                let mut window = &page[skip..];
                if let Some(limit) = limit {
                    window = &window[..window.len().min(limit - taken)];
                }
                taken += window.len();
                results.extend(self.resolve(window)?);
                skip = 0;
                if limit.is_some_and(|limit| taken >= limit) {
                    break;
                }
            }

            let next = self.client.scroll(guard.id(), &self.scroll_keep_alive)?;
            guard.update(next.scroll_id);
            page = next.hits;
        }

        Ok(results)
    }
}

impl ResultFetcher for EngineResultFetcher {
    fn fetch(&self, start: usize, stop: Option<usize>) -> Result<Vec<SearchHit>> {
        let limit = stop.map(|stop| stop.saturating_sub(start));
        match limit {
            Some(0) => Ok(Vec::new()),
            Some(limit) if limit <= self.page_size => self.fetch_page(start, limit),
            _ => self.fetch_scrolling(start, limit),
        }
    }

    fn count(&self) -> Result<usize> {
        let total = self.client.count(&self.index, &self.query)?;
        Ok(usize::try_from(total).unwrap_or(usize::MAX))
    }
}
