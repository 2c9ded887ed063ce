#![warn(missing_docs)]

//! meshkb-protocol: the wire layer of the knowledge synchronization engine.
//!
//! This crate owns everything between a batch of knowledge records and the
//! bytes a datagram transport carries:
//! - [`header`]: the three message header variants and their fixed layouts
//! - [`codec`]: big-endian encoding and fail-closed decoding of whole messages
//! - [`fragmentation`]: splitting oversized messages and reassembling them
//! - [`bandwidth`]: sliding-window byte-rate measurement
//! - [`scheduler`]: the drop/admit decision applied before each send
//!
//! Nothing in this crate touches the knowledge store or holds locks; callers
//! hand in snapshots and receive decoded maps back.

/// Sliding-window bandwidth measurement.
pub mod bandwidth;
/// Message encoding and decoding.
pub mod codec;
/// Fragmentation of oversized messages and their reassembly.
pub mod fragmentation;
/// The three on-wire header variants.
pub mod header;
/// The per-send admit/drop decision.
pub mod scheduler;

pub use bandwidth::BandwidthMonitor;
pub use codec::{DecodedMessage, MessageDecoder, MessageEncoder};
pub use fragmentation::{FragmentAssembler, FragmentOutcome};
pub use header::{
    FragmentHeader, Header, MessageHeader, MessageType, ReducedHeader, FRAGMENT_HEADER_SIZE,
    FULL_HEADER_SIZE, REDUCED_HEADER_SIZE,
};
pub use scheduler::PacketScheduler;
