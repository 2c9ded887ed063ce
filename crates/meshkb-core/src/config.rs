use std::{default::Default, time::Duration};

use crate::constants::{
    DEFAULT_BANDWIDTH_WINDOW_SECS, DEFAULT_FRAGMENT_QUEUE_LENGTH, DEFAULT_QUEUE_LENGTH,
};

#[derive(Clone, Debug)]
/// Configuration options that tune a transport session.
///
/// A `Config` is immutable for the lifetime of the session it configures;
/// it is owned by the transport orchestrator and read-only to every other
/// component.
pub struct Config {
    /// Logical namespace this agent participates in. Messages from other
    /// domains are rejected on receive.
    pub domain: String,
    /// Max encoded message size in bytes; larger messages are fragmented.
    pub queue_length: usize,
    /// Max number of in-flight fragment reassembly entries. Inserting past
    /// this capacity evicts the oldest incomplete entry.
    pub fragment_queue_length: usize,
    /// Time-to-live stamped on outgoing messages (0 = never rebroadcast).
    pub rebroadcast_ttl: u8,
    /// Max TTL this process will participate in when rebroadcasting
    /// received messages (0 = do not rebroadcast at all).
    pub participant_ttl: u8,
    /// Outgoing bandwidth limit in bytes/sec (0 = unlimited).
    pub send_bandwidth_limit: u64,
    /// Combined send + receive bandwidth limit in bytes/sec (0 = unlimited).
    pub total_bandwidth_limit: u64,
    /// Max tolerated message age in seconds before a received message is
    /// rejected (0 = disabled). Compared against the header timestamp.
    pub deadline_secs: u64,
    /// Sliding window over which bandwidth is measured.
    pub bandwidth_window: Duration,
    /// Send reduced headers, omitting domain/originator/quality/ttl. Only
    /// valid when both ends share an out-of-band trust assumption.
    pub send_reduced_header: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            domain: String::new(),
            queue_length: DEFAULT_QUEUE_LENGTH,
            fragment_queue_length: DEFAULT_FRAGMENT_QUEUE_LENGTH,
            rebroadcast_ttl: 0,  // No rebroadcasting by default
            participant_ttl: 0,  // Do not forward other agents' messages
            send_bandwidth_limit: 0,  // Unlimited
            total_bandwidth_limit: 0, // Unlimited
            deadline_secs: 0,         // No latency deadline
            bandwidth_window: Duration::from_secs(DEFAULT_BANDWIDTH_WINDOW_SECS),
            send_reduced_header: false,
        }
    }
}
