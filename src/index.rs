//! Physical indices.
//!
//! An engine backend keeps one index per inheritance root, named
//! `<index_prefix><app>_<model>` after the root type. Every type of the tree
//! registers its mapping into that index and documents are built with the
//! mapping of the object's concrete type.

use std::collections::HashMap;
use std::fmt::Debug;
use std::slice;
use std::sync::Arc;

use log::{debug, info};
use serde_json::{Value, json};

use crate::engine::EngineClient;
use crate::error::Result;
use crate::mapping::{Dialect, Mapping};
use crate::object::{ObjectRef, Searchable};
use crate::schema::TypeRegistry;

/// Name of the index holding `type_id`.
pub fn index_name_for(registry: &TypeRegistry, prefix: &str, type_id: &str) -> Result<String> {
    let info = registry.get(type_id)?;
    let root = registry.get(info.root())?;
    Ok(format!("{prefix}{}", root.definition().table_name()))
}

/// Write side of one physical or logical index.
pub trait SearchIndex: Send + Sync + Debug {
    /// Identifies the index within its backend.
    fn name(&self) -> &str;

    /// Register the mapping of a type.
    fn add_model(&self, type_id: &str) -> Result<()>;

    fn add_item(&self, obj: &ObjectRef) -> Result<()> {
        self.add_items(obj.type_id(), slice::from_ref(obj))
    }

    /// Write a batch of objects declared as `type_id` (or its subtypes).
    fn add_items(&self, type_id: &str, items: &[ObjectRef]) -> Result<()>;

    fn delete_item(&self, obj: &dyn Searchable) -> Result<()>;

    /// Make recent writes visible to searches.
    fn refresh(&self) -> Result<()>;

    /// Drop all data and mappings.
    fn reset(&self) -> Result<()>;
}

/// An index living in a search engine.
#[derive(Debug, Clone)]
pub struct EngineIndex {
    client: Arc<dyn EngineClient>,
    registry: Arc<TypeRegistry>,
    dialect: Arc<dyn Dialect>,
    name: String,
    settings: Value,
}

impl EngineIndex {
    pub fn new(
        client: Arc<dyn EngineClient>,
        registry: Arc<TypeRegistry>,
        dialect: Arc<dyn Dialect>,
        name: String,
        settings: Value,
    ) -> Self {
        EngineIndex {
            client,
            registry,
            dialect,
            name,
            settings,
        }
    }

    /// Whether a concrete index exists under this name.
    pub fn exists(&self) -> Result<bool> {
        self.client.index_exists(&self.name)
    }

    /// Create the index with the dialect settings and no mappings yet.
    pub fn create(&self) -> Result<()> {
        info!("Creating index {}", self.name);
        self.client.create_index(
            &self.name,
            &json!({"settings": self.settings, "mappings": {"properties": {}}}),
        )
    }

    /// Delete the index and its documents.
    pub fn delete(&self) -> Result<()> {
        info!("Deleting index {}", self.name);
        self.client.delete_index(&self.name)
    }

    /// The same index under another name, sharing client and settings.
    pub fn renamed(&self, name: String) -> EngineIndex {
        EngineIndex {
            name,
            ..self.clone()
        }
    }
}

impl SearchIndex for EngineIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_model(&self, type_id: &str) -> Result<()> {
        let mapping = Mapping::new(&self.registry, self.dialect.as_ref(), type_id)?;
        debug!("Registering mapping of {type_id} in {}", self.name);
        self.client.put_mapping(&self.name, &mapping.build_mapping())
    }

    fn add_items(&self, type_id: &str, items: &[ObjectRef]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut mappings: HashMap<&str, Mapping<'_>> = HashMap::new();
        let mut documents = Vec::with_capacity(items.len());
        for item in items {
            let concrete = item.type_id();
            let mapping = match mappings.get(concrete) {
                Some(mapping) => *mapping,
                None => {
                    let mapping = Mapping::new(&self.registry, self.dialect.as_ref(), concrete)?;
                    mappings.insert(concrete, mapping);
                    mapping
                }
            };
            documents.push((mapping.document_id(item.as_ref()), mapping.build_document(item.as_ref())));
        }

        debug!(
            "Writing {} documents of {type_id} to {}",
            documents.len(),
            self.name
        );
        self.client.bulk_index(&self.name, &documents)
    }

    fn delete_item(&self, obj: &dyn Searchable) -> Result<()> {
        self.client.delete_document(&self.name, &obj.pk())
    }

    fn refresh(&self) -> Result<()> {
        self.client.refresh(&self.name)
    }

    fn reset(&self) -> Result<()> {
        if self.exists()? {
            self.delete()?;
        }
        self.create()
    }
}

/// Index of a backend that stores nothing of its own.
#[derive(Debug, Clone, Default)]
pub struct NullIndex;

impl SearchIndex for NullIndex {
    fn name(&self) -> &str {
        "default"
    }

    fn add_model(&self, _type_id: &str) -> Result<()> {
        Ok(())
    }

    fn add_items(&self, _type_id: &str, _items: &[ObjectRef]) -> Result<()> {
        Ok(())
    }

    fn delete_item(&self, _obj: &dyn Searchable) -> Result<()> {
        Ok(())
    }

    fn refresh(&self) -> Result<()> {
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        Ok(())
    }
}
