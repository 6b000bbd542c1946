//! Rebuilders for one logical index.
//!
//! A rebuilder moves through `Idle -> Started -> Populating -> Finished`.
//! [`AtomicRebuilder`] builds a shadow index under a fresh name and swaps the
//! logical name (an alias) over to it in one step, so readers see either the
//! old or the new index. [`SimpleRebuilder`] resets the live index in place.

use std::fmt::Debug;
use std::sync::Arc;

use log::info;
use uuid::Uuid;

use crate::engine::EngineClient;
use crate::error::{Result, SearchGateError};
use crate::index::{EngineIndex, SearchIndex};
use crate::object::ObjectRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildState {
    Idle,
    Started,
    Populating,
    Finished,
}

pub trait IndexRebuilder: Send + Debug {
    fn state(&self) -> RebuildState;

    /// Create the index that receives the rebuilt data.
    fn start(&mut self) -> Result<Arc<dyn SearchIndex>>;

    fn add_model(&mut self, type_id: &str) -> Result<()>;

    fn add_items(&mut self, type_id: &str, items: &[ObjectRef]) -> Result<()>;

    /// Make the rebuilt index the live one.
    fn finish(&mut self) -> Result<()>;
}

fn expect_state(current: RebuildState, allowed: &[RebuildState], operation: &str) -> Result<()> {
    if allowed.contains(&current) {
        Ok(())
    } else {
        Err(SearchGateError::invalid_operation(format!(
            "Cannot {operation} a rebuild in state {current:?}"
        )))
    }
}

const POPULATING: &[RebuildState] = &[RebuildState::Started, RebuildState::Populating];

/// Rebuilds by resetting the live index in place.
#[derive(Debug)]
pub struct SimpleRebuilder {
    index: EngineIndex,
    state: RebuildState,
}

impl SimpleRebuilder {
    pub fn new(index: EngineIndex) -> Self {
        SimpleRebuilder {
            index,
            state: RebuildState::Idle,
        }
    }
}

impl IndexRebuilder for SimpleRebuilder {
    fn state(&self) -> RebuildState {
        self.state
    }

    fn start(&mut self) -> Result<Arc<dyn SearchIndex>> {
        expect_state(self.state, &[RebuildState::Idle], "start")?;
        self.index.reset()?;
        self.state = RebuildState::Started;
        Ok(Arc::new(self.index.clone()))
    }

    fn add_model(&mut self, type_id: &str) -> Result<()> {
        expect_state(self.state, POPULATING, "add a model to")?;
        self.index.add_model(type_id)?;
        self.state = RebuildState::Populating;
        Ok(())
    }

    fn add_items(&mut self, type_id: &str, items: &[ObjectRef]) -> Result<()> {
        expect_state(self.state, POPULATING, "add items to")?;
        self.index.add_items(type_id, items)?;
        self.state = RebuildState::Populating;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        expect_state(self.state, POPULATING, "finish")?;
        self.index.refresh()?;
        self.state = RebuildState::Finished;
        Ok(())
    }
}

/// Rebuilds into a shadow index and swaps the alias over to it.
#[derive(Debug)]
pub struct AtomicRebuilder {
    client: Arc<dyn EngineClient>,
    alias: EngineIndex,
    shadow: Option<EngineIndex>,
    state: RebuildState,
}

impl AtomicRebuilder {
    pub fn new(client: Arc<dyn EngineClient>, alias: EngineIndex) -> Self {
        AtomicRebuilder {
            client,
            alias,
            shadow: None,
            state: RebuildState::Idle,
        }
    }

    /// Name of the shadow index, once started.
    pub fn shadow_name(&self) -> Option<&str> {
        self.shadow.as_ref().map(|index| index.name())
    }

    fn shadow(&self) -> Result<&EngineIndex> {
        self.shadow
            .as_ref()
            .ok_or_else(|| SearchGateError::invalid_operation("Rebuild has not been started"))
    }
}

impl IndexRebuilder for AtomicRebuilder {
    fn state(&self) -> RebuildState {
        self.state
    }

    fn start(&mut self) -> Result<Arc<dyn SearchIndex>> {
        expect_state(self.state, &[RebuildState::Idle], "start")?;
        let suffix = Uuid::new_v4().simple().to_string();
        let name = format!("{}_{}", self.alias.name(), &suffix[..7]);
        let shadow = self.alias.renamed(name);
        shadow.create()?;
        self.shadow = Some(shadow.clone());
        self.state = RebuildState::Started;
        Ok(Arc::new(shadow))
    }

    fn add_model(&mut self, type_id: &str) -> Result<()> {
        expect_state(self.state, POPULATING, "add a model to")?;
        self.shadow()?.add_model(type_id)?;
        self.state = RebuildState::Populating;
        Ok(())
    }

    fn add_items(&mut self, type_id: &str, items: &[ObjectRef]) -> Result<()> {
        expect_state(self.state, POPULATING, "add items to")?;
        self.shadow()?.add_items(type_id, items)?;
        self.state = RebuildState::Populating;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        expect_state(self.state, POPULATING, "finish")?;
        let shadow = self.shadow()?.clone();
        let alias = self.alias.name();
        shadow.refresh()?;

        let previous = self.client.get_alias(alias)?;
        let mut legacy = Vec::new();
        if previous.is_empty() && self.client.index_exists(alias)? {
            info!("Replacing concrete index {alias} with an alias");
            legacy.push(alias.to_string());
        }

        self.client
            .update_aliases(alias, &previous, shadow.name(), &legacy)?;
        let current = self.client.get_alias(alias)?;
        if !current.iter().any(|name| name == shadow.name()) {
            return Err(SearchGateError::inconsistent(format!(
                "Alias {alias} does not point to {} after the swap (points to {current:?})",
                shadow.name()
            )));
        }
        info!("Alias {alias} now points to {}", shadow.name());

        for old in previous.iter().filter(|name| *name != shadow.name()) {
            self.client.delete_index(old)?;
        }

        self.state = RebuildState::Finished;
        Ok(())
    }
}
