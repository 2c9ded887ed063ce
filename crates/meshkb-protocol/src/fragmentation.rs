//! Fragmentation of oversized messages and their reassembly.
//!
//! Fragmenting operates on the already-encoded message: the byte buffer is
//! split into chunks and each chunk is shipped behind a fragment header
//! copied from the original full header. The size field of every fragment
//! carries the total reassembled length and the updates field carries the
//! fragment count; the trailing update number orders the chunks.
//!
//! Reassembly keys in-flight messages by (originator, clock). The set of
//! in-flight entries is bounded; inserting past capacity evicts the oldest
//! incomplete entry, never the one being inserted into.

use std::collections::BTreeMap;

use tracing::debug;

use meshkb_core::error::{ErrorKind, Result};

use crate::{
    codec::{DecodedMessage, MessageDecoder},
    header::{FragmentHeader, FRAGMENT_HEADER_SIZE},
};

/// Splits an encoded full message into fragment packets no larger than
/// `max_fragment_size` bytes each.
pub fn fragment_message(encoded: &[u8], max_fragment_size: usize) -> Result<Vec<Vec<u8>>> {
    if max_fragment_size <= FRAGMENT_HEADER_SIZE {
        return Err(ErrorKind::AllocationFailure(max_fragment_size));
    }
    let header = match MessageDecoder::decode(encoded)? {
        DecodedMessage::Batch { header: crate::header::Header::Full(header), .. } => header,
        _ => return Err(ErrorKind::InvalidTransport),
    };

    let chunk_size = max_fragment_size - FRAGMENT_HEADER_SIZE;
    let chunks: Vec<&[u8]> = encoded.chunks(chunk_size).collect();

    let mut fragments = Vec::with_capacity(chunks.len());
    for (number, chunk) in chunks.iter().enumerate() {
        let mut message = header.clone();
        message.size = encoded.len() as u64;
        message.updates = chunks.len() as u32;
        let fragment_header = FragmentHeader { message, update_number: number as u32 };

        let mut packet = Vec::with_capacity(FRAGMENT_HEADER_SIZE + chunk.len());
        fragment_header.encode_into(&mut packet)?;
        packet.extend_from_slice(chunk);
        fragments.push(packet);
    }
    Ok(fragments)
}

/// The result of handing one fragment to the assembler.
#[derive(Debug, PartialEq)]
pub enum FragmentOutcome {
    /// The chunk was stored; the message is still incomplete.
    Stored,
    /// A chunk with this number was already held; nothing changed.
    Duplicate,
    /// The final chunk arrived; the value is the reassembled encoding.
    Complete(Vec<u8>),
}

struct ReassemblyEntry {
    originator: String,
    clock: u64,
    declared_total: Option<u64>,
    chunks: BTreeMap<u32, Vec<u8>>,
}

impl ReassemblyEntry {
    fn held_bytes(&self) -> u64 {
        self.chunks.values().map(|c| c.len() as u64).sum()
    }
}

/// Reassembles fragmented messages, bounding the number in flight.
///
/// Entries are kept in insertion order; the front is always the oldest and
/// is the one evicted when capacity is reached.
pub struct FragmentAssembler {
    capacity: usize,
    entries: Vec<ReassemblyEntry>,
}

impl FragmentAssembler {
    /// Creates an assembler holding at most `capacity` in-flight messages.
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: Vec::new() }
    }

    /// Number of in-flight reassembly entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no reassembly is in flight.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stores one fragment chunk. Returns the reassembled message once all
    /// bytes of a message are held.
    pub fn insert(&mut self, header: &FragmentHeader, chunk: Vec<u8>) -> FragmentOutcome {
        let index = match self.position_of(&header.message.originator, header.message.clock) {
            Some(index) => index,
            None => {
                if self.entries.len() >= self.capacity {
                    let evicted = self.entries.remove(0);
                    debug!(
                        originator = %evicted.originator,
                        clock = evicted.clock,
                        held = evicted.held_bytes(),
                        "fragment queue full, evicting oldest incomplete message"
                    );
                }
                self.entries.push(ReassemblyEntry {
                    originator: header.message.originator.clone(),
                    clock: header.message.clock,
                    declared_total: None,
                    chunks: BTreeMap::new(),
                });
                self.entries.len() - 1
            }
        };

        let entry = &mut self.entries[index];
        if entry.chunks.contains_key(&header.update_number) {
            return FragmentOutcome::Duplicate;
        }
        entry.chunks.insert(header.update_number, chunk);
        if header.update_number == 0 {
            entry.declared_total = Some(header.message.size);
        }

        if entry.declared_total == Some(entry.held_bytes()) {
            let entry = self.entries.remove(index);
            let mut message = Vec::new();
            for chunk in entry.chunks.into_values() {
                message.extend_from_slice(&chunk);
            }
            FragmentOutcome::Complete(message)
        } else {
            FragmentOutcome::Stored
        }
    }

    fn position_of(&self, originator: &str, clock: u64) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.originator == originator && entry.clock == clock)
    }
}
