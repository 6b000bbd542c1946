//! Backend facade.
//!
//! A [`SearchBackend`] wires the field model, the query compiler, the result
//! stream and the rebuilder together for one configured engine, or evaluates
//! searches in process for the database backend. Callers see the same
//! `search`, `autocomplete`, indexing and rebuild operations either way.

pub mod config;
pub mod database;
pub mod elasticsearch;

use std::collections::HashSet;
use std::fmt;
use std::slice;
use std::sync::Arc;

use log::debug;

use crate::engine::EngineClient;
use crate::error::{Result, SearchGateError};
use crate::index::SearchIndex;
use crate::object::{ObjectRef, ObjectStore, Searchable};
use crate::query::{CompileMode, SearchOptions, SearchQuery, SearchScope};
use crate::rebuild::IndexRebuilder;
use crate::results::SearchResults;
use crate::schema::TypeRegistry;

pub use config::{
    BackendConfig, BackendKind, ClientSettings, DEFAULT_BACKEND, DatabaseCapabilities, HostConfig, SearchSettings,
    deep_merge,
};
pub use database::DatabaseBackend;
pub use elasticsearch::EngineBackend;

pub trait SearchBackend: Send + Sync + fmt::Debug {
    /// Name the backend is configured under.
    fn name(&self) -> &str;

    fn config(&self) -> &BackendConfig;

    fn registry(&self) -> &Arc<TypeRegistry>;

    /// Compile and run a validated, non-trivial request.
    fn execute(
        &self,
        scope: &SearchScope,
        query: SearchQuery,
        options: SearchOptions,
        mode: CompileMode,
    ) -> Result<SearchResults>;

    fn search(
        &self,
        scope: &SearchScope,
        query: SearchQuery,
        options: SearchOptions,
    ) -> Result<SearchResults> {
        self.dispatch(scope, query, options, CompileMode::Search)
    }

    /// Prefix search over the partial-match fields.
    fn autocomplete(
        &self,
        scope: &SearchScope,
        query: SearchQuery,
        options: SearchOptions,
    ) -> Result<SearchResults> {
        self.dispatch(scope, query, options, CompileMode::Autocomplete)
    }

    /// Short-circuits types that are not indexed and blank queries to empty
    /// results without sending anything.
    fn dispatch(
        &self,
        scope: &SearchScope,
        query: SearchQuery,
        options: SearchOptions,
        mode: CompileMode,
    ) -> Result<SearchResults> {
        let info = self.registry().get(&scope.type_id)?;
        if !info.is_indexed() {
            debug!("{} is not indexed, returning no results", scope.type_id);
            return Ok(SearchResults::empty());
        }
        if query.is_blank() {
            return Ok(SearchResults::empty());
        }
        self.execute(scope, query, options, mode)
    }

    fn get_index_for_model(&self, type_id: &str) -> Result<Arc<dyn SearchIndex>>;

    fn get_index_for_object(&self, obj: &dyn Searchable) -> Result<Arc<dyn SearchIndex>> {
        self.get_index_for_model(obj.type_id())
    }

    /// Every distinct index holding an indexed type.
    fn all_indexes(&self) -> Result<Vec<Arc<dyn SearchIndex>>> {
        let mut seen = HashSet::new();
        let mut indexes = Vec::new();
        for info in self.registry().indexed_types() {
            let index = self.get_index_for_model(info.type_id())?;
            if seen.insert(index.name().to_string()) {
                indexes.push(index);
            }
        }
        Ok(indexes)
    }

    /// The rebuilder for an index, or `None` when the backend has nothing to rebuild.
    fn rebuilder_for(&self, index_name: &str) -> Result<Option<Box<dyn IndexRebuilder>>>;

    fn add(&self, obj: &ObjectRef) -> Result<()> {
        if !self.registry().is_indexed(obj.type_id()) {
            return Ok(());
        }
        self.get_index_for_object(obj.as_ref())?
            .add_items(obj.type_id(), slice::from_ref(obj))
    }

    fn add_bulk(&self, type_id: &str, objs: &[ObjectRef]) -> Result<()> {
        if !self.registry().is_indexed(type_id) {
            return Ok(());
        }
        self.get_index_for_model(type_id)?.add_items(type_id, objs)
    }

    fn delete(&self, obj: &dyn Searchable) -> Result<()> {
        if !self.registry().is_indexed(obj.type_id()) {
            return Ok(());
        }
        self.get_index_for_object(obj)?.delete_item(obj)
    }

    fn refresh_indexes(&self) -> Result<()> {
        for index in self.all_indexes()? {
            index.refresh()?;
        }
        Ok(())
    }

    fn reset_indexes(&self) -> Result<()> {
        for index in self.all_indexes()? {
            index.reset()?;
        }
        Ok(())
    }
}

type ClientFactory =
    dyn Fn(&str, &ClientSettings) -> Result<Arc<dyn EngineClient>> + Send + Sync;

/// Builds configured backends.
///
/// Engine backends get their client from the client factory, so the HTTP
/// transport stays outside the crate. The factory receives the backend's
/// hosts and request timeout.
pub struct BackendFactory {
    settings: SearchSettings,
    registry: Arc<TypeRegistry>,
    store: Arc<dyn ObjectStore>,
    capabilities: DatabaseCapabilities,
    client_factory: Option<Box<ClientFactory>>,
}

impl fmt::Debug for BackendFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendFactory")
            .field("settings", &self.settings)
            .field("capabilities", &self.capabilities)
            .field("client_factory", &self.client_factory.is_some())
            .finish()
    }
}

impl BackendFactory {
    pub fn new(
        settings: SearchSettings,
        registry: Arc<TypeRegistry>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        BackendFactory {
            settings,
            registry,
            store,
            capabilities: DatabaseCapabilities::default(),
            client_factory: None,
        }
    }

    pub fn capabilities(mut self, capabilities: DatabaseCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn client_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&str, &ClientSettings) -> Result<Arc<dyn EngineClient>> + Send + Sync + 'static,
    {
        self.client_factory = Some(Box::new(factory));
        self
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn create(&self, name: &str) -> Result<Arc<dyn SearchBackend>> {
        let config = self.settings.get(name)?.clone();
        if config.backend == BackendKind::Database {
            return Ok(Arc::new(DatabaseBackend::new(
                name,
                config,
                self.registry.clone(),
                self.store.clone(),
                self.capabilities,
            )));
        }

        let factory = self.client_factory.as_ref().ok_or_else(|| {
            SearchGateError::config(format!(
                "Backend \"{name}\" needs an engine client but none was provided"
            ))
        })?;
        let client = factory(name, &config.client_settings()?)?;
        Ok(Arc::new(EngineBackend::new(
            name,
            config,
            self.registry.clone(),
            self.store.clone(),
            client,
        )?))
    }

    pub fn create_default(&self) -> Result<Arc<dyn SearchBackend>> {
        self.create(DEFAULT_BACKEND)
    }

    /// Every configured backend, or only those mirroring object writes.
    pub fn create_all(&self, with_auto_update: bool) -> Result<Vec<Arc<dyn SearchBackend>>> {
        let names: Vec<&str> = if with_auto_update {
            self.settings.auto_update_names()
        } else {
            self.settings.names().collect()
        };
        names.into_iter().map(|name| self.create(name)).collect()
    }
}
