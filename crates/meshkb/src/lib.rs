#![warn(missing_docs)]

//! Meshkb: a small public API facade for the workspace.
//!
//! This crate provides a clean, stable surface that re-exports the most
//! commonly used types for building decentralized knowledge-sharing apps:
//!
//! - The store and its records (`KnowledgeStore`, `KnowledgeRecord`)
//! - The transport session (`TransportOrchestrator`, `Settings`)
//! - Core configuration (`Config`)
//!
//! Example
//! ```ignore
//! use std::sync::Arc;
//! use meshkb::prelude::*;
//! use meshkb::BufferedSender;
//!
//! let config = Config { domain: "fleet".to_owned(), ..Config::default() };
//! let store = Arc::new(KnowledgeStore::new());
//! let mut transport = TransportOrchestrator::new(
//!     "127.0.0.1:4150",
//!     Settings::new(config),
//!     Arc::clone(&store),
//!     Box::new(BufferedSender::new()),
//! );
//!
//! // Write locally, then push the modified set to other participants.
//! store.set("pose.x", 4);
//! transport.send().unwrap();
//!
//! // Feed received datagrams back in:
//! // transport.receive(peer_addr, &datagram).unwrap();
//! ```

// Core config and the physical transport seam
pub use meshkb_core::config::Config;
pub use meshkb_core::error::{ErrorKind, Result};
pub use meshkb_core::transport::{BufferedSender, DatagramSender};
// Knowledge: records, store, filters
pub use meshkb_knowledge::{
    filters::{FilterChain, FilterContext, FilterOperation},
    record::{KnowledgeMap, KnowledgeRecord, KnowledgeValue},
    store::{KnowledgeStore, MergeOutcome, SetOptions, SetOutcome},
};
// Protocol: the wire layer, for callers inspecting raw messages
pub use meshkb_protocol::{
    codec::{DecodedMessage, MessageDecoder, MessageEncoder},
    header::{Header, MessageHeader, MessageType},
};
// Transport: the session orchestrator and its policy surface
pub use meshkb_transport::{
    ReceiveOutcome, RejectReason, Settings, TransportEvent, TransportOrchestrator,
};

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{
        Config, KnowledgeRecord, KnowledgeStore, KnowledgeValue, ReceiveOutcome, Settings,
        TransportEvent, TransportOrchestrator,
    };
}
