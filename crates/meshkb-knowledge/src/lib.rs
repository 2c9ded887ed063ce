#![warn(missing_docs)]

//! meshkb-knowledge: the replicated data model and its thread-safe access API.
//!
//! A [`record::KnowledgeRecord`] is a tagged value plus the replication
//! metadata (Lamport clock, quality, write quality) used to resolve
//! conflicting writes. Records only exist as entries in a
//! [`store::KnowledgeStore`], which serializes all access behind a single
//! lock and tracks the set of keys modified since the last synchronization
//! pass.
//!
//! The [`filters`] module provides the ordered, user-supplied
//! transformation/drop stages applied on the send, receive, and rebroadcast
//! paths. The [`interpreter`] module declares the interface the engine
//! consumes to evaluate trigger logic; expression internals are out of scope.

/// The ordered filter pipeline applied to outgoing and incoming records.
pub mod filters;
/// Interface to the external expression interpreter.
pub mod interpreter;
/// Knowledge values and records.
pub mod record;
/// The thread-safe knowledge store.
pub mod store;

pub use filters::{AggregateFilter, FilterChain, FilterContext, FilterOperation, RecordFilter};
pub use record::{KnowledgeMap, KnowledgeRecord, KnowledgeValue};
pub use store::{KnowledgeStore, MergeOutcome, SetOptions, SetOutcome};
