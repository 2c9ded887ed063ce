#![warn(missing_docs)]

//! meshkb-transport: the session layer of the knowledge synchronization
//! engine.
//!
//! A [`orchestrator::TransportOrchestrator`] ties a knowledge store to a
//! physical datagram transport: it drains the store's modified set into
//! encoded messages on the send path, and walks each received datagram
//! through decode, fragment reassembly, trust and domain validation, the
//! filter chains, the conflict-resolution merge, and an optional
//! rebroadcast. [`settings::Settings`] is the session's policy surface;
//! [`events::TransportEvent`] is its observability feed.

/// Observable transport events.
pub mod events;
/// The transport orchestrator.
pub mod orchestrator;
/// Quality-of-service settings for one transport session.
pub mod settings;
/// Wall-clock abstraction used for timestamps and deadlines.
pub mod time;

pub use events::{RejectReason, TransportEvent};
pub use orchestrator::{ReceiveOutcome, TransportOrchestrator};
pub use settings::Settings;
pub use time::{FixedClock, SystemClock, WallClock};
