//! The thread-safe knowledge store.
//!
//! All access goes through a single internal lock so that a merge-then-signal
//! sequence is atomic with respect to concurrent local writers. The lock is
//! never held across user callbacks: filters and triggers receive a
//! `&KnowledgeStore` handle and re-enter through the public API.

use std::{
    collections::{HashMap, HashSet},
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::record::{KnowledgeRecord, KnowledgeValue};

/// Options controlling a local write.
#[derive(Clone, Debug)]
pub struct SetOptions {
    /// Amount the global Lamport counter advances on an accepted write.
    pub clock_increment: u64,
    /// Quality to write with. `None` uses the key's configured write quality.
    pub quality: Option<u32>,
    /// Apply the write even if the key's current quality is higher.
    pub force: bool,
    /// Whether the write should be picked up by the next synchronization
    /// pass. Process-local state is written with `sync: false`.
    pub sync: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self { clock_increment: 1, quality: None, force: false, sync: true }
    }
}

/// Result of a local write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetOutcome {
    /// The write was applied.
    Applied,
    /// The key was empty.
    RejectedEmptyKey,
    /// The key's current quality exceeds the quality of this write.
    RejectedLowQuality,
}

/// Result of merging a record that arrived over the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The remote record replaced the local one.
    Applied,
    /// The remote clock is older than the local clock.
    RejectedStale,
    /// Clocks are equal but the remote quality is lower.
    RejectedLowQuality,
}

#[derive(Default)]
struct StoreInner {
    map: HashMap<String, KnowledgeRecord>,
    /// Process-wide Lamport counter.
    clock: u64,
    /// Keys changed since the last synchronization pass.
    modified: HashSet<String>,
    /// Bumped on every accepted mutation; lets waiters detect changes
    /// without missing signals.
    generation: u64,
}

/// A mapping from string key to [`KnowledgeRecord`], shared between caller
/// threads and the transport orchestrator.
///
/// `get` never fails: absent keys read as a default (integer zero, clock
/// zero) record. Writes go through [`KnowledgeStore::set_with`] for local
/// mutations and [`KnowledgeStore::merge_remote`] for records arriving off
/// the wire; the latter applies the conflict-resolution rule that keeps
/// independently-running replicas convergent.
#[derive(Default)]
pub struct KnowledgeStore {
    inner: Mutex<StoreInner>,
    changed: Condvar,
}

impl KnowledgeStore {
    /// Creates an empty store with a zeroed Lamport counter.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A panicking writer leaves the map intact; keep serving.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a copy of the record stored at `key`, or a default record if
    /// the key does not exist. Never an error.
    pub fn get(&self, key: &str) -> KnowledgeRecord {
        self.lock().map.get(key).cloned().unwrap_or_default()
    }

    /// Writes `value` to `key` with default options (increment 1, the key's
    /// write quality, no force, synchronized).
    pub fn set<V: Into<KnowledgeValue>>(&self, key: &str, value: V) -> SetOutcome {
        self.set_with(key, value.into(), &SetOptions::default())
    }

    /// Writes `value` to `key`.
    ///
    /// The write is rejected when the key's current quality exceeds the
    /// quality this write carries, unless `options.force` is set. An
    /// accepted write advances the global Lamport counter by
    /// `options.clock_increment`, stamps the record with the new counter
    /// value, and adds the key to the modified set unless the write is
    /// process-local (`options.sync` false or a `.`-prefixed key).
    pub fn set_with(&self, key: &str, value: KnowledgeValue, options: &SetOptions) -> SetOutcome {
        if key.is_empty() {
            return SetOutcome::RejectedEmptyKey;
        }

        let mut inner = self.lock();
        let record = inner.map.entry(key.to_owned()).or_default();
        let quality = options.quality.unwrap_or(record.write_quality);

        if !options.force && quality < record.quality {
            return SetOutcome::RejectedLowQuality;
        }

        record.value = value;
        record.quality = quality;
        inner.clock += options.clock_increment;
        let clock = inner.clock;
        // entry borrow ended above; re-borrow to stamp the clock
        if let Some(record) = inner.map.get_mut(key) {
            record.clock = clock;
        }

        if options.sync && !key.starts_with('.') {
            inner.modified.insert(key.to_owned());
        }

        self.bump(&mut inner);
        SetOutcome::Applied
    }

    /// Merges a record that arrived over the network.
    ///
    /// The remote record replaces the local one iff `force` is set, OR its
    /// clock is strictly greater, OR clocks are equal and its quality is
    /// greater than or equal to the local quality. Equal clock and equal
    /// quality accepts: last writer wins on ties. This is the sole
    /// conflict-resolution rule in the system.
    pub fn merge_remote(&self, key: &str, record: &KnowledgeRecord, force: bool) -> MergeOutcome {
        let mut inner = self.lock();

        if let Some(local) = inner.map.get(key) {
            if !force {
                if record.clock < local.clock {
                    tracing::trace!(
                        key,
                        remote_clock = record.clock,
                        local_clock = local.clock,
                        "rejecting stale remote record"
                    );
                    return MergeOutcome::RejectedStale;
                }
                if record.clock == local.clock && record.quality < local.quality {
                    tracing::trace!(
                        key,
                        remote_quality = record.quality,
                        local_quality = local.quality,
                        "rejecting low-quality remote record"
                    );
                    return MergeOutcome::RejectedLowQuality;
                }
            }
        }

        let write_quality =
            inner.map.get(key).map(|local| local.write_quality).unwrap_or(record.quality);
        let mut accepted = record.clone();
        // the local write priority for the key is ours, not the sender's
        accepted.write_quality = write_quality;
        inner.map.insert(key.to_owned(), accepted);

        // Lamport receive rule: jump past the remote clock.
        inner.clock = inner.clock.max(record.clock) + 1;

        if !key.starts_with('.') {
            inner.modified.insert(key.to_owned());
        }

        self.bump(&mut inner);
        MergeOutcome::Applied
    }

    /// Snapshots and clears the modified set, returning the keys changed
    /// since the last synchronization pass together with their records.
    pub fn take_modified(&self) -> Vec<(String, KnowledgeRecord)> {
        let mut inner = self.lock();
        let keys: Vec<String> = inner.modified.drain().collect();
        keys.into_iter()
            .filter_map(|key| {
                let record = inner.map.get(&key).cloned();
                record.map(|record| (key, record))
            })
            .collect()
    }

    /// Number of keys awaiting synchronization.
    pub fn modified_len(&self) -> usize {
        self.lock().modified.len()
    }

    /// Current value of the process-wide Lamport counter.
    pub fn clock(&self) -> u64 {
        self.lock().clock
    }

    /// Quality of the last write to `key` (0 if the key does not exist).
    pub fn get_quality(&self, key: &str) -> u32 {
        self.lock().map.get(key).map(|r| r.quality).unwrap_or(0)
    }

    /// Sets the priority this process writes `key` with.
    pub fn set_write_quality(&self, key: &str, quality: u32) {
        self.lock().map.entry(key.to_owned()).or_default().write_quality = quality;
    }

    /// Number of keys in the store.
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.lock().map.is_empty()
    }

    /// Whether `key` exists in the store.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().map.contains_key(key)
    }

    /// Wakes all blocked waiters without mutating any record. Used by the
    /// transport to announce status changes.
    pub fn signal(&self) {
        let mut inner = self.lock();
        self.bump(&mut inner);
    }

    /// Blocks until any accepted mutation occurs or `timeout` elapses.
    /// Returns `true` if woken by a mutation, `false` on timeout.
    ///
    /// Callers implementing "wait until expression is true" re-evaluate
    /// their expression after each wakeup and loop.
    pub fn wait_for_change(&self, timeout: Duration) -> bool {
        let inner = self.lock();
        let generation = inner.generation;
        let (_inner, result) = self
            .changed
            .wait_timeout_while(inner, timeout, |inner| inner.generation == generation)
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out()
    }

    fn bump(&self, inner: &mut MutexGuard<'_, StoreInner>) {
        inner.generation = inner.generation.wrapping_add(1);
        self.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use super::*;

    #[test]
    fn test_get_missing_key_returns_default() {
        let store = KnowledgeStore::new();
        let record = store.get("absent");
        assert_eq!(record.value, KnowledgeValue::Integer(0));
        assert_eq!(record.clock, 0);
        assert_eq!(record.quality, 0);
    }

    #[test]
    fn test_set_advances_clock_and_marks_modified() {
        let store = KnowledgeStore::new();
        assert_eq!(store.set("position", 42), SetOutcome::Applied);
        assert_eq!(store.clock(), 1);
        assert_eq!(store.get("position").clock, 1);
        assert_eq!(store.modified_len(), 1);

        assert_eq!(store.set("position", 43), SetOutcome::Applied);
        assert_eq!(store.clock(), 2);
        assert_eq!(store.get("position").clock, 2);
    }

    #[test]
    fn test_set_empty_key_rejected() {
        let store = KnowledgeStore::new();
        assert_eq!(store.set("", 1), SetOutcome::RejectedEmptyKey);
    }

    #[test]
    fn test_local_keys_not_synchronized() {
        let store = KnowledgeStore::new();
        store.set(".scratch", 7);
        assert_eq!(store.modified_len(), 0);

        let options = SetOptions { sync: false, ..SetOptions::default() };
        store.set_with("status", 1.into(), &options);
        assert_eq!(store.modified_len(), 0);
    }

    #[test]
    fn test_set_respects_write_quality() {
        let store = KnowledgeStore::new();
        let options = SetOptions { quality: Some(10), ..SetOptions::default() };
        store.set_with("target", 1.into(), &options);
        assert_eq!(store.get_quality("target"), 10);

        // default write quality for the key is 0, below the stored 10
        assert_eq!(store.set("target", 2), SetOutcome::RejectedLowQuality);
        assert_eq!(store.get("target").value, KnowledgeValue::Integer(1));

        // raising the write quality lets the write through
        store.set_write_quality("target", 10);
        assert_eq!(store.set("target", 2), SetOutcome::Applied);
        assert_eq!(store.get("target").value, KnowledgeValue::Integer(2));

        // force overrides the quality check entirely
        let forced = SetOptions { quality: Some(0), force: true, ..SetOptions::default() };
        assert_eq!(store.set_with("target", 3.into(), &forced), SetOutcome::Applied);
        assert_eq!(store.get("target").value, KnowledgeValue::Integer(3));
    }

    #[test]
    fn test_merge_newer_clock_wins() {
        let store = KnowledgeStore::new();
        store.set("k", 1);
        let local_clock = store.get("k").clock;

        let remote = KnowledgeRecord::new(2.into(), local_clock + 5, 0);
        assert_eq!(store.merge_remote("k", &remote, false), MergeOutcome::Applied);
        assert_eq!(store.get("k").value, KnowledgeValue::Integer(2));
        assert_eq!(store.get("k").clock, local_clock + 5);
        // global counter jumped past the remote clock
        assert!(store.clock() > local_clock + 5);
    }

    #[test]
    fn test_merge_stale_clock_rejected() {
        let store = KnowledgeStore::new();
        let newer = KnowledgeRecord::new(1.into(), 10, 0);
        assert_eq!(store.merge_remote("k", &newer, false), MergeOutcome::Applied);

        let stale = KnowledgeRecord::new(2.into(), 9, 100);
        assert_eq!(store.merge_remote("k", &stale, false), MergeOutcome::RejectedStale);
        assert_eq!(store.get("k").value, KnowledgeValue::Integer(1));
    }

    #[test]
    fn test_merge_equal_clock_quality_tiebreak() {
        let store = KnowledgeStore::new();
        let low = KnowledgeRecord::new(1.into(), 5, 7);
        let high = KnowledgeRecord::new(2.into(), 5, 3);

        assert_eq!(store.merge_remote("k", &low, false), MergeOutcome::Applied);
        // equal clock, lower quality
        assert_eq!(store.merge_remote("k", &high, false), MergeOutcome::RejectedLowQuality);
        assert_eq!(store.get("k").value, KnowledgeValue::Integer(1));

        // equal clock, equal quality: last writer wins
        let tie = KnowledgeRecord::new(9.into(), 5, 7);
        assert_eq!(store.merge_remote("k", &tie, false), MergeOutcome::Applied);
        assert_eq!(store.get("k").value, KnowledgeValue::Integer(9));
    }

    #[test]
    fn test_merge_force_overrides_everything() {
        let store = KnowledgeStore::new();
        let newer = KnowledgeRecord::new(1.into(), 10, 10);
        store.merge_remote("k", &newer, false);

        let stale = KnowledgeRecord::new(2.into(), 1, 0);
        assert_eq!(store.merge_remote("k", &stale, true), MergeOutcome::Applied);
        assert_eq!(store.get("k").value, KnowledgeValue::Integer(2));
    }

    #[test]
    fn test_merge_preserves_local_write_quality() {
        let store = KnowledgeStore::new();
        store.set_write_quality("k", 42);
        let remote = KnowledgeRecord { write_quality: 99, ..KnowledgeRecord::new(1.into(), 5, 5) };
        store.merge_remote("k", &remote, false);
        assert_eq!(store.get("k").write_quality, 42);
    }

    #[test]
    fn test_take_modified_clears_set() {
        let store = KnowledgeStore::new();
        store.set("a", 1);
        store.set("b", 2);

        let mut modified = store.take_modified();
        modified.sort_by(|x, y| x.0.cmp(&y.0));
        assert_eq!(modified.len(), 2);
        assert_eq!(modified[0].0, "a");
        assert_eq!(modified[1].0, "b");

        assert_eq!(store.modified_len(), 0);
        assert!(store.take_modified().is_empty());
    }

    #[test]
    fn test_wait_for_change_wakes_on_set() {
        let store = Arc::new(KnowledgeStore::new());
        let writer = Arc::clone(&store);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.set("event", 1);
        });

        assert!(store.wait_for_change(Duration::from_secs(5)));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_for_change_times_out() {
        let store = KnowledgeStore::new();
        assert!(!store.wait_for_change(Duration::from_millis(10)));
    }

    #[test]
    fn test_concurrent_merges_serialize() {
        let store = Arc::new(KnowledgeStore::new());
        let mut handles = Vec::new();

        for clock in 1..=8u64 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let record = KnowledgeRecord::new((clock as i64).into(), clock, 0);
                store.merge_remote("k", &record, false);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // the highest clock always wins regardless of interleaving
        assert_eq!(store.get("k").clock, 8);
        assert_eq!(store.get("k").value, KnowledgeValue::Integer(8));
    }
}
