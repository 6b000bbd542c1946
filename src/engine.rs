//! Engine access.
//!
//! [`EngineClient`] is the seam between the search layer and a running engine.
//! [`MemoryEngine`] implements it in process and interprets the request bodies
//! the compiler produces, which makes it the engine used by the command line
//! tool and by the tests.

pub mod analysis;
pub mod client;
pub mod memory;

pub use client::{EngineClient, Hit, SearchRequest, SearchResponse};
pub use memory::MemoryEngine;
