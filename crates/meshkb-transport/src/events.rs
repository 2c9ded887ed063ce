//! Observable transport events.
//!
//! The orchestrator optionally pushes one event per processed packet or
//! send attempt into a channel the application drains at its own pace.
//! Dropping the receiver silently disables emission.

/// Why a received message was rejected without touching the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// The payload failed to decode; none of it was applied.
    MalformedMessage,
    /// The identifier matched no known header variant.
    UnknownIdentifier,
    /// A fragment chunk with this number was already held.
    DuplicateFragment,
    /// The message's originator is this process.
    SelfOriginated,
    /// The immediate sender is banned or outside the trusted set.
    UntrustedPeer,
    /// The message's originator is banned or outside the trusted set.
    UntrustedOriginator,
    /// The message was built for a different domain.
    DomainMismatch,
    /// The message is older than the configured latency deadline.
    DeadlineExceeded,
    /// The transport is shutting down.
    ShuttingDown,
}

/// Events emitted by the transport orchestrator.
#[derive(Debug)]
pub enum TransportEvent {
    /// A message was decoded, filtered, and merged into the store.
    MessageApplied {
        /// Originator of the message.
        originator: String,
        /// Records that replaced local state.
        accepted: usize,
        /// Records rejected by the conflict-resolution rule.
        rejected: usize,
    },
    /// A message was rejected before any merge.
    MessageRejected {
        /// Why the message was thrown away.
        reason: RejectReason,
    },
    /// A fragment was stored; its message is still incomplete.
    FragmentStored {
        /// Originator of the fragmented message.
        originator: String,
        /// Clock identifying the fragmented message.
        clock: u64,
    },
    /// A batch of modified records went out on the wire.
    MessageSent {
        /// Total bytes handed to the physical transport.
        bytes: usize,
        /// Number of packets (1 unless the message was fragmented).
        packets: usize,
    },
    /// The scheduler refused a send because a bandwidth limit was exceeded.
    SendDropped {
        /// Size of the encoded message that was dropped.
        bytes: usize,
    },
}
