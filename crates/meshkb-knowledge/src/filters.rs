//! The ordered filter pipeline.
//!
//! Three independently-configured chains (send, receive, rebroadcast) shape
//! what leaves and enters this process. Each chain runs its per-record
//! filters in order, then its aggregate filters over the surviving map.
//! Filters may synthesize derived knowledge by appending new key/record
//! pairs to the context's side channel; the orchestrator folds those into
//! the working set once the chain completes.

use crate::record::{KnowledgeMap, KnowledgeRecord};

/// The path a filter invocation is running on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOperation {
    /// Outbound: records snapshotted from the modified set.
    Sending,
    /// Inbound: records decoded from a received message.
    Receiving,
    /// Inbound records being considered for re-propagation.
    Rebroadcasting,
}

/// Context handed to every filter invocation.
///
/// Filters never receive the store lock; bandwidth figures and timestamps
/// are sampled by the orchestrator before the chain runs.
#[derive(Debug)]
pub struct FilterContext {
    /// Which chain is running.
    pub operation: FilterOperation,
    /// Current inbound byte rate, bytes/sec.
    pub receive_bandwidth: f64,
    /// Current outbound byte rate, bytes/sec.
    pub send_bandwidth: f64,
    /// Wall-clock timestamp carried by the message being processed
    /// (0 on the send path).
    pub message_timestamp: u64,
    /// Wall-clock seconds at the time the chain started.
    pub current_time: u64,
    /// Originator of the message being processed ("" on the send path).
    pub originator: String,
    /// Domain this transport participates in.
    pub domain: String,
    side_channel: KnowledgeMap,
}

impl FilterContext {
    /// Creates a context for the given operation with zeroed bandwidth and
    /// time fields. The orchestrator fills the rest in.
    pub fn new(operation: FilterOperation) -> Self {
        Self {
            operation,
            receive_bandwidth: 0.0,
            send_bandwidth: 0.0,
            message_timestamp: 0,
            current_time: 0,
            originator: String::new(),
            domain: String::new(),
            side_channel: KnowledgeMap::new(),
        }
    }

    /// Appends a wholly new key/record pair to the side channel. Entries
    /// are merged into the working set after the chain completes.
    pub fn add_record(&mut self, key: impl Into<String>, record: KnowledgeRecord) {
        self.side_channel.insert(key.into(), record);
    }

    /// Removes and returns all side-channel entries.
    pub fn take_side_channel(&mut self) -> KnowledgeMap {
        std::mem::take(&mut self.side_channel)
    }
}

/// A per-record transformation or drop stage.
pub trait RecordFilter: Send {
    /// Transforms one record. Returning `None` removes the key from the
    /// working set before the next filter runs.
    fn filter(
        &mut self,
        key: &str,
        record: KnowledgeRecord,
        context: &mut FilterContext,
    ) -> Option<KnowledgeRecord>;
}

impl<F> RecordFilter for F
where
    F: FnMut(&str, KnowledgeRecord, &mut FilterContext) -> Option<KnowledgeRecord> + Send,
{
    fn filter(
        &mut self,
        key: &str,
        record: KnowledgeRecord,
        context: &mut FilterContext,
    ) -> Option<KnowledgeRecord> {
        self(key, record, context)
    }
}

/// A whole-map stage run after all per-record filters. May add or remove
/// entries in place.
pub trait AggregateFilter: Send {
    /// Mutates the working set in place.
    fn filter(&mut self, records: &mut KnowledgeMap, context: &mut FilterContext);
}

impl<F> AggregateFilter for F
where
    F: FnMut(&mut KnowledgeMap, &mut FilterContext) + Send,
{
    fn filter(&mut self, records: &mut KnowledgeMap, context: &mut FilterContext) {
        self(records, context)
    }
}

/// An ordered chain of per-record filters followed by aggregate filters.
#[derive(Default)]
pub struct FilterChain {
    record_filters: Vec<Box<dyn RecordFilter>>,
    aggregate_filters: Vec<Box<dyn AggregateFilter>>,
}

impl FilterChain {
    /// Creates an empty chain that passes everything through.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a per-record filter to the end of the chain.
    pub fn add_record_filter(&mut self, filter: impl RecordFilter + 'static) {
        self.record_filters.push(Box::new(filter));
    }

    /// Appends an aggregate filter to the end of the chain.
    pub fn add_aggregate_filter(&mut self, filter: impl AggregateFilter + 'static) {
        self.aggregate_filters.push(Box::new(filter));
    }

    /// Whether the chain has no stages at all.
    pub fn is_empty(&self) -> bool {
        self.record_filters.is_empty() && self.aggregate_filters.is_empty()
    }

    /// Runs the per-record stages over one record. Returns `None` if any
    /// stage dropped it.
    pub fn apply_record(
        &mut self,
        key: &str,
        record: KnowledgeRecord,
        context: &mut FilterContext,
    ) -> Option<KnowledgeRecord> {
        let mut current = record;
        for filter in &mut self.record_filters {
            match filter.filter(key, current, context) {
                Some(next) => current = next,
                None => return None,
            }
        }
        Some(current)
    }

    /// Runs the aggregate stages over the working set in place.
    pub fn apply_aggregate(&mut self, records: &mut KnowledgeMap, context: &mut FilterContext) {
        for filter in &mut self.aggregate_filters {
            filter.filter(records, context);
        }
    }

    /// Runs the full chain over a working set: per-record stages first,
    /// dropped keys removed, then aggregate stages.
    pub fn apply(&mut self, records: &mut KnowledgeMap, context: &mut FilterContext) {
        if !self.record_filters.is_empty() {
            let working = std::mem::take(records);
            for (key, record) in working {
                if let Some(kept) = self.apply_record(&key, record, context) {
                    records.insert(key, kept);
                }
            }
        }
        self.apply_aggregate(records, context);
    }
}
