//! Collaborator interfaces and in-memory backends.
//!
//! The engine owns no durable state. Everything it reads comes through the
//! traits in this module; [`memory`] provides reference implementations.

pub mod memory;
mod traits;

pub use memory::{Fixture, InMemoryAliasTable, InMemoryGraph, InMemoryRecordSource, InMemoryStores, InMemoryVectorIndex};
pub use traits::{
    AliasResolver, DocumentHit, ExtractedMention, ExtractionCapability, GraphReader, RecordKind, RecordSource,
    RolePolicyStore, StructuredRecord, VectorIndex,
};
