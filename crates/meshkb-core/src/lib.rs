#![warn(missing_docs)]

//! meshkb-core: foundational types and utilities.
//!
//! This crate provides the minimal set of core utilities shared across all
//! layers of the knowledge synchronization engine:
//! - Configuration types
//! - Error handling
//! - Protocol constants
//! - The physical transport abstraction
//!
//! Protocol-specific logic lives in specialized crates:
//! - `meshkb-knowledge`: knowledge records, the thread-safe store, filters
//! - `meshkb-protocol`: wire codec, fragmentation, bandwidth, scheduling
//! - `meshkb-transport`: QoS settings and the transport orchestrator

/// Protocol constants shared across layers.
pub mod constants {
    /// Length of the on-wire message identifier field.
    pub const IDENTIFIER_LENGTH: usize = 8;
    /// Identifier carried by full-header messages. Only the first seven
    /// bytes are compared on receive; the eighth is a NUL terminator.
    pub const FULL_IDENTIFIER: &[u8; 8] = b"MKBA1.0\0";
    /// Identifier carried by reduced-header messages.
    pub const REDUCED_IDENTIFIER: &[u8; 8] = b"mkbr1.0\0";
    /// Identifier carried by fragment-header messages.
    pub const FRAGMENT_IDENTIFIER: &[u8; 8] = b"MFRG1.0\0";
    /// Fixed width of the domain field in full and fragment headers.
    pub const DOMAIN_MAX_LENGTH: usize = 32;
    /// Fixed width of the originator (host:port) field.
    pub const ORIGINATOR_MAX_LENGTH: usize = 64;
    /// Hard ceiling on any encoded message, fragmented or not (512 KB).
    pub const MAX_PACKET_SIZE: usize = 512_000;
    /// Default send buffer / maximum datagram size.
    pub const DEFAULT_QUEUE_LENGTH: usize = 64 * 1024;
    /// Default number of in-flight reassembly entries kept per transport.
    pub const DEFAULT_FRAGMENT_QUEUE_LENGTH: usize = 5;
    /// Default sliding window for bandwidth measurement, in seconds.
    pub const DEFAULT_BANDWIDTH_WINDOW_SECS: u64 = 10;
}

/// Configuration options for a transport session.
pub mod config;
/// Error types and results.
pub mod error;
/// Physical transport abstraction for pluggable I/O.
pub mod transport;
