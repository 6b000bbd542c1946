//! Backend for Elasticsearch and OpenSearch clusters.

use std::fmt;
use std::sync::Arc;

use log::debug;
use serde_json::Value;

use crate::backend::SearchBackend;
use crate::backend::config::BackendConfig;
use crate::engine::EngineClient;
use crate::error::{Result, SearchGateError};
use crate::index::{EngineIndex, SearchIndex, index_name_for};
use crate::mapping::{Dialect, ScrollOffsetOverride, dialect_for};
use crate::object::ObjectStore;
use crate::query::{CompileMode, SearchOptions, SearchQuery, SearchQueryCompiler, SearchScope};
use crate::rebuild::{AtomicRebuilder, IndexRebuilder, SimpleRebuilder};
use crate::results::{EngineResultFetcher, SearchResults};
use crate::schema::TypeRegistry;

pub struct EngineBackend {
    name: String,
    config: BackendConfig,
    registry: Arc<TypeRegistry>,
    store: Arc<dyn ObjectStore>,
    client: Arc<dyn EngineClient>,
    dialect: Arc<dyn Dialect>,
    index_settings: Value,
}

impl fmt::Debug for EngineBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBackend")
            .field("name", &self.name)
            .field("kind", &self.dialect.kind())
            .field("index_prefix", &self.config.index_prefix)
            .finish()
    }
}

impl EngineBackend {
    pub fn new<S: Into<String>>(
        name: S,
        config: BackendConfig,
        registry: Arc<TypeRegistry>,
        store: Arc<dyn ObjectStore>,
        client: Arc<dyn EngineClient>,
    ) -> Result<Self> {
        let name = name.into();
        let kind = config.backend.engine_kind().ok_or_else(|| {
            SearchGateError::config(format!("Backend \"{name}\" is not an engine backend"))
        })?;
        config.validate()?;

        let mut dialect = dialect_for(kind);
        if let Some(supported) = config.scroll_supports_offset {
            dialect = Arc::new(ScrollOffsetOverride::new(dialect, supported));
        }
        let index_settings = config.merged_index_settings(dialect.as_ref());

        Ok(EngineBackend {
            name,
            config,
            registry,
            store,
            client,
            dialect,
            index_settings,
        })
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    pub fn client(&self) -> &Arc<dyn EngineClient> {
        &self.client
    }

    /// Name of the index (an alias once atomically rebuilt) holding `type_id`.
    pub fn index_name(&self, type_id: &str) -> Result<String> {
        index_name_for(&self.registry, &self.config.index_prefix, type_id)
    }

    fn engine_index(&self, name: String) -> EngineIndex {
        EngineIndex::new(
            self.client.clone(),
            self.registry.clone(),
            self.dialect.clone(),
            name,
            self.index_settings.clone(),
        )
    }
}

impl SearchBackend for EngineBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    fn execute(
        &self,
        scope: &SearchScope,
        query: SearchQuery,
        options: SearchOptions,
        mode: CompileMode,
    ) -> Result<SearchResults> {
        let compiler = match mode {
            CompileMode::Search => SearchQueryCompiler::new(
                &self.registry,
                self.dialect.as_ref(),
                scope,
                query,
                options,
            )?,
            CompileMode::Autocomplete => SearchQueryCompiler::autocomplete(
                &self.registry,
                self.dialect.as_ref(),
                scope,
                query,
                options,
            )?,
        };
        let document = compiler.compile()?;
        let index = self.index_name(&scope.type_id)?;
        debug!("Compiled {mode:?} request on {index}: {}", document.query);

        let fetcher = EngineResultFetcher::new(
            self.client.clone(),
            self.store.clone(),
            self.dialect.clone(),
            index,
            scope.type_id.clone(),
            document.query,
            document.sort,
            self.config.page_size,
            self.config.scroll_keep_alive.clone(),
        );
        Ok(SearchResults::new(Arc::new(fetcher)))
    }

    fn get_index_for_model(&self, type_id: &str) -> Result<Arc<dyn SearchIndex>> {
        Ok(Arc::new(self.engine_index(self.index_name(type_id)?)))
    }

    fn rebuilder_for(&self, index_name: &str) -> Result<Option<Box<dyn IndexRebuilder>>> {
        let index = self.engine_index(index_name.to_string());
        Ok(Some(if self.config.atomic_rebuild {
            Box::new(AtomicRebuilder::new(self.client.clone(), index))
        } else {
            Box::new(SimpleRebuilder::new(index))
        }))
    }
}
