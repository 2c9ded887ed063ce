//! The transport orchestrator.
//!
//! One orchestrator owns one transport session: it drains the store's
//! modified set into outgoing messages, and walks every received datagram
//! through decode, reassembly, validation, filtering, merge, and
//! rebroadcast. The store lock is never held across filter or trigger
//! callbacks; they receive a plain store handle and re-enter the public
//! API.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, warn};

use meshkb_core::{
    constants::MAX_PACKET_SIZE,
    error::{DecodingErrorKind, ErrorKind, Result},
    transport::DatagramSender,
};
use meshkb_knowledge::{
    filters::{FilterContext, FilterOperation},
    record::{max_quality, KnowledgeMap},
    store::{KnowledgeStore, MergeOutcome, SetOptions},
};
use meshkb_protocol::{
    bandwidth::BandwidthMonitor,
    codec::{DecodedMessage, MessageDecoder, MessageEncoder},
    fragmentation::{fragment_message, FragmentAssembler, FragmentOutcome},
    header::{FragmentHeader, Header, MessageHeader, MessageType, ReducedHeader},
    scheduler::PacketScheduler,
};

use crate::{
    events::{RejectReason, TransportEvent},
    settings::Settings,
    time::{SystemClock, WallClock},
};

/// What happened to one received datagram.
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// The message reached the store.
    Applied {
        /// Records that replaced local state.
        accepted: usize,
        /// Records the conflict-resolution rule turned away.
        rejected: usize,
        /// Records actually forwarded to other participants.
        rebroadcast: KnowledgeMap,
    },
    /// A fragment was stored; its message is still incomplete.
    FragmentStored,
    /// The datagram was discarded before any merge.
    Rejected(RejectReason),
}

/// Drives one transport session over a pluggable datagram sink.
pub struct TransportOrchestrator {
    id: String,
    settings: Settings,
    store: Arc<KnowledgeStore>,
    sender: Box<dyn DatagramSender>,
    send_monitor: BandwidthMonitor,
    receive_monitor: BandwidthMonitor,
    scheduler: PacketScheduler,
    assembler: FragmentAssembler,
    clock: Box<dyn WallClock>,
    events: Option<Sender<TransportEvent>>,
    shutting_down: bool,
}

impl TransportOrchestrator {
    /// Creates an orchestrator identified as `id` (host:port) writing to
    /// `sender`.
    pub fn new(
        id: impl Into<String>,
        settings: Settings,
        store: Arc<KnowledgeStore>,
        sender: Box<dyn DatagramSender>,
    ) -> Self {
        let window = settings.config.bandwidth_window;
        let send_limit = settings.config.send_bandwidth_limit;
        let fragment_queue = settings.config.fragment_queue_length;
        Self {
            id: id.into(),
            settings,
            store,
            sender,
            send_monitor: BandwidthMonitor::new(window),
            receive_monitor: BandwidthMonitor::new(window),
            scheduler: PacketScheduler::new(send_limit),
            assembler: FragmentAssembler::new(fragment_queue),
            clock: Box::new(SystemClock),
            events: None,
            shutting_down: false,
        }
    }

    /// Replaces the wall clock. Tests pin time with this.
    pub fn with_clock(mut self, clock: Box<dyn WallClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Creates and returns the event channel. Events are emitted from this
    /// call on; dropping the receiver disables them again.
    pub fn event_receiver(&mut self) -> Receiver<TransportEvent> {
        let (sender, receiver) = unbounded();
        self.events = Some(sender);
        receiver
    }

    /// The store this orchestrator synchronizes.
    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    /// Mutable access to the session's policy surface.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// This process's originator identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The send-side admit/drop counters.
    pub fn scheduler(&self) -> &PacketScheduler {
        &self.scheduler
    }

    /// Marks the session as shutting down and wakes any blocked waiters.
    /// Subsequent sends fail and subsequent receives are rejected.
    pub fn shutdown(&mut self) {
        self.shutting_down = true;
        self.store.signal();
    }

    /// Whether [`TransportOrchestrator::shutdown`] has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// Processes one datagram received from `peer` (the immediate sender,
    /// not necessarily the originator).
    pub fn receive(&mut self, peer: &str, payload: &[u8]) -> Result<ReceiveOutcome> {
        if self.shutting_down {
            return Ok(self.reject(RejectReason::ShuttingDown));
        }
        // Counted once per datagram; reassembled messages are not
        // re-counted when their bytes are processed a second time.
        self.receive_monitor.add(payload.len() as u64);

        if !self.settings.is_peer_trusted(peer) {
            return Ok(self.reject(RejectReason::UntrustedPeer));
        }
        self.process_packet(payload)
    }

    /// Encodes and transmits every record modified since the last call.
    ///
    /// Returns the number of bytes put on the wire: 0 when nothing was
    /// modified, the filters removed every record, or a bandwidth limit
    /// forced a drop. The modified set is consumed either way.
    pub fn send(&mut self) -> Result<usize> {
        if self.shutting_down {
            return Err(ErrorKind::ShuttingDown);
        }
        let modified = self.store.take_modified();
        if modified.is_empty() {
            return Ok(0);
        }

        let mut batch: KnowledgeMap = modified.into_iter().collect();
        let mut context = self.filter_context(FilterOperation::Sending, "", 0);
        self.settings.send_filters.apply(&mut batch, &mut context);
        for (key, record) in context.take_side_channel() {
            batch.insert(key, record);
        }
        if batch.is_empty() {
            debug!("send filters removed every record, nothing to transmit");
            return Ok(0);
        }

        let encoded = if self.settings.config.send_reduced_header {
            let header = ReducedHeader {
                message_type: MessageType::MultiAssign as u32,
                clock: self.store.clock(),
                ..ReducedHeader::default()
            };
            MessageEncoder::encode_reduced(&header, &batch)?
        } else {
            let header = self.outgoing_header(&batch);
            MessageEncoder::encode(&header, &batch)?
        };
        self.transmit(encoded)
    }

    fn process_packet(&mut self, payload: &[u8]) -> Result<ReceiveOutcome> {
        let decoded = match MessageDecoder::decode(payload) {
            Ok(decoded) => decoded,
            Err(ErrorKind::DecodingError(DecodingErrorKind::UnknownIdentifier)) => {
                warn!(len = payload.len(), "datagram carries no known identifier");
                return Ok(self.reject(RejectReason::UnknownIdentifier));
            }
            Err(err) => {
                warn!(%err, "discarding malformed message");
                return Ok(self.reject(RejectReason::MalformedMessage));
            }
        };
        match decoded {
            DecodedMessage::Fragment { header, chunk } => self.process_fragment(header, chunk),
            DecodedMessage::Batch { header, records } => self.process_batch(header, records),
        }
    }

    fn process_fragment(
        &mut self,
        header: FragmentHeader,
        chunk: Vec<u8>,
    ) -> Result<ReceiveOutcome> {
        if let Some(reason) = self.validate(&header.message) {
            return Ok(self.reject(reason));
        }
        if header.message.size as usize > MAX_PACKET_SIZE {
            warn!(
                declared = header.message.size,
                "fragmented message declares an impossible total size"
            );
            return Ok(self.reject(RejectReason::MalformedMessage));
        }

        match self.assembler.insert(&header, chunk) {
            FragmentOutcome::Stored => {
                self.emit(TransportEvent::FragmentStored {
                    originator: header.message.originator.clone(),
                    clock: header.message.clock,
                });
                Ok(ReceiveOutcome::FragmentStored)
            }
            FragmentOutcome::Duplicate => Ok(self.reject(RejectReason::DuplicateFragment)),
            FragmentOutcome::Complete(message) => {
                debug!(
                    originator = %header.message.originator,
                    clock = header.message.clock,
                    bytes = message.len(),
                    "reassembled fragmented message"
                );
                self.process_packet(&message)
            }
        }
    }

    fn process_batch(&mut self, header: Header, records: KnowledgeMap) -> Result<ReceiveOutcome> {
        let (originator, timestamp, ttl) = match &header {
            Header::Full(header) => {
                if let Some(reason) = self.validate(header) {
                    return Ok(self.reject(reason));
                }
                (header.originator.clone(), header.timestamp, header.ttl)
            }
            // Reduced headers carry no identity; trust was established
            // out of band and there is nothing further to validate.
            Header::Reduced(_) => (String::new(), 0, 0),
            Header::Fragment(_) => return Ok(self.reject(RejectReason::MalformedMessage)),
        };

        let config = &self.settings.config;
        let combined =
            self.send_monitor.bytes_per_second() + self.receive_monitor.bytes_per_second();
        let bandwidth_exceeded = self.send_monitor.is_violated(config.send_bandwidth_limit)
            || (config.total_bandwidth_limit > 0
                && combined > config.total_bandwidth_limit as f64);
        // A bandwidth violation, or a TTL above what this participant will
        // carry, drops the forward but never the merge.
        let dropped = bandwidth_exceeded || ttl > config.participant_ttl;
        let rebroadcast_allowed = !dropped && ttl > 0 && config.participant_ttl > 0;

        // The rebroadcast chain later sees the records as they arrived,
        // before the receive chain has had a chance to rewrite them.
        let pristine =
            if rebroadcast_allowed { records.clone() } else { KnowledgeMap::new() };

        let mut working = records;
        let mut context = self.filter_context(FilterOperation::Receiving, &originator, timestamp);
        self.settings.receive_filters.apply(&mut working, &mut context);
        let side_channel = context.take_side_channel();

        let mut accepted = 0;
        let mut rejected = 0;
        for (key, record) in &working {
            match self.store.merge_remote(key, record, false) {
                MergeOutcome::Applied => accepted += 1,
                MergeOutcome::RejectedStale | MergeOutcome::RejectedLowQuality => rejected += 1,
            }
        }

        // Knowledge synthesized by the receive chain becomes this process's
        // own: written locally so the next synchronization pass carries it.
        for (key, record) in side_channel {
            let options =
                SetOptions { quality: Some(record.quality), force: true, ..SetOptions::default() };
            self.store.set_with(&key, record.value, &options);
        }

        if let Some(trigger) = self.settings.on_data_received.as_mut() {
            trigger.evaluate(&self.store);
        }
        self.store.signal();

        let mut forwarded = KnowledgeMap::new();
        if rebroadcast_allowed {
            let mut rebroadcast = pristine;
            let mut context =
                self.filter_context(FilterOperation::Rebroadcasting, &originator, timestamp);
            self.settings.rebroadcast_filters.apply(&mut rebroadcast, &mut context);
            for (key, record) in context.take_side_channel() {
                rebroadcast.insert(key, record);
            }

            if !rebroadcast.is_empty() {
                if let Header::Full(original) = &header {
                    let mut out = original.clone();
                    out.ttl = ttl - 1;
                    out.quality = max_quality(rebroadcast.values());
                    let encoded = MessageEncoder::encode(&out, &rebroadcast)?;
                    if self.transmit(encoded)? > 0 {
                        forwarded = rebroadcast;
                    }
                }
            }
        }

        debug!(%originator, accepted, rejected, forwarded = forwarded.len(), "applied message");
        self.emit(TransportEvent::MessageApplied {
            originator: originator.clone(),
            accepted,
            rejected,
        });
        Ok(ReceiveOutcome::Applied { accepted, rejected, rebroadcast: forwarded })
    }

    /// Policy checks shared by full messages and fragments. `None` means
    /// the header passed.
    fn validate(&self, header: &MessageHeader) -> Option<RejectReason> {
        if header.originator == self.id {
            return Some(RejectReason::SelfOriginated);
        }
        if !self.settings.is_originator_trusted(&header.originator) {
            return Some(RejectReason::UntrustedOriginator);
        }
        if header.domain != self.settings.config.domain {
            return Some(RejectReason::DomainMismatch);
        }
        let deadline = self.settings.config.deadline_secs;
        if deadline > 0 && self.clock.now_secs().saturating_sub(header.timestamp) > deadline {
            return Some(RejectReason::DeadlineExceeded);
        }
        None
    }

    /// Puts one encoded message on the wire, fragmenting when it exceeds
    /// the queue length. Returns 0 if a bandwidth limit forced a drop.
    fn transmit(&mut self, encoded: Vec<u8>) -> Result<usize> {
        if encoded.len() > MAX_PACKET_SIZE {
            return Err(ErrorKind::AllocationFailure(encoded.len()));
        }

        let config = &self.settings.config;
        let combined =
            self.send_monitor.bytes_per_second() + self.receive_monitor.bytes_per_second();
        if config.total_bandwidth_limit > 0 && combined > config.total_bandwidth_limit as f64 {
            debug!(
                limit = config.total_bandwidth_limit,
                rate = combined,
                "total bandwidth limit exceeded, dropping send"
            );
            self.emit(TransportEvent::SendDropped { bytes: encoded.len() });
            return Ok(0);
        }
        if !self.scheduler.try_admit(&self.send_monitor) {
            self.emit(TransportEvent::SendDropped { bytes: encoded.len() });
            return Ok(0);
        }

        let packets = if encoded.len() > self.settings.config.queue_length {
            fragment_message(&encoded, self.settings.config.queue_length)?
        } else {
            vec![encoded]
        };

        let mut bytes = 0;
        let count = packets.len();
        for packet in packets {
            bytes += self.sender.send(&packet)?;
            self.send_monitor.add(packet.len() as u64);
        }
        debug!(bytes, packets = count, "transmitted message");
        self.emit(TransportEvent::MessageSent { bytes, packets: count });
        Ok(bytes)
    }

    fn outgoing_header(&self, batch: &KnowledgeMap) -> MessageHeader {
        let config = &self.settings.config;
        MessageHeader {
            size: 0,
            domain: config.domain.clone(),
            originator: self.id.clone(),
            // single-record Assign exists on the wire for compatibility;
            // this implementation always batches
            message_type: MessageType::MultiAssign,
            updates: 0,
            quality: max_quality(batch.values()),
            clock: self.store.clock(),
            timestamp: self.clock.now_secs(),
            ttl: config.rebroadcast_ttl,
        }
    }

    fn filter_context(
        &self,
        operation: FilterOperation,
        originator: &str,
        timestamp: u64,
    ) -> FilterContext {
        let mut context = FilterContext::new(operation);
        context.receive_bandwidth = self.receive_monitor.bytes_per_second();
        context.send_bandwidth = self.send_monitor.bytes_per_second();
        context.message_timestamp = timestamp;
        context.current_time = self.clock.now_secs();
        context.originator = originator.to_owned();
        context.domain = self.settings.config.domain.clone();
        context
    }

    fn reject(&self, reason: RejectReason) -> ReceiveOutcome {
        debug!(?reason, "rejecting datagram");
        self.emit(TransportEvent::MessageRejected { reason });
        ReceiveOutcome::Rejected(reason)
    }

    fn emit(&self, event: TransportEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshkb_core::{config::Config, transport::BufferedSender};
    use meshkb_knowledge::record::KnowledgeRecord;

    fn orchestrator(config: Config) -> TransportOrchestrator {
        TransportOrchestrator::new(
            "127.0.0.1:4150",
            Settings::new(config),
            Arc::new(KnowledgeStore::new()),
            Box::new(BufferedSender::new()),
        )
    }

    #[test]
    fn test_send_with_nothing_modified_is_a_no_op() {
        let mut transport = orchestrator(Config::default());
        assert_eq!(transport.send().unwrap(), 0);
    }

    #[test]
    fn test_send_after_shutdown_fails() {
        let mut transport = orchestrator(Config::default());
        transport.store().set("k", 1);
        transport.shutdown();
        assert!(matches!(transport.send(), Err(ErrorKind::ShuttingDown)));
    }

    #[test]
    fn test_receive_after_shutdown_is_rejected() {
        let mut transport = orchestrator(Config::default());
        transport.shutdown();
        let outcome = transport.receive("10.0.0.1:4150", &[0u8; 64]).unwrap();
        assert!(matches!(outcome, ReceiveOutcome::Rejected(RejectReason::ShuttingDown)));
    }

    #[test]
    fn test_garbage_datagram_is_rejected_not_fatal() {
        let mut transport = orchestrator(Config::default());
        let outcome = transport.receive("10.0.0.1:4150", &[7u8; 200]).unwrap();
        assert!(matches!(
            outcome,
            ReceiveOutcome::Rejected(RejectReason::UnknownIdentifier)
        ));
        // the session keeps working afterwards
        transport.store().set("k", 1);
        assert!(transport.send().unwrap() > 0);
    }

    #[test]
    fn test_send_filters_can_swallow_the_batch() {
        let mut transport = orchestrator(Config::default());
        transport
            .settings_mut()
            .send_filters
            .add_record_filter(|_: &str, _: KnowledgeRecord, _: &mut FilterContext| {
                None::<KnowledgeRecord>
            });

        transport.store().set("k", 1);
        assert_eq!(transport.send().unwrap(), 0);
        // the modified set was still consumed
        assert_eq!(transport.store().modified_len(), 0);
    }

    #[test]
    fn test_banned_peer_rejected_before_decode() {
        let mut transport = orchestrator(Config::default());
        transport.settings_mut().banned_peers.insert("10.0.0.9:1".to_owned());
        let outcome = transport.receive("10.0.0.9:1", &[0u8; 32]).unwrap();
        assert!(matches!(outcome, ReceiveOutcome::Rejected(RejectReason::UntrustedPeer)));
    }
}
