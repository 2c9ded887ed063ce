//! The three on-wire header variants.
//!
//! Every message starts with a fixed-size header: an 8-byte total size, an
//! 8-byte identifier naming the variant, then variant-specific fields. The
//! identifier is what receivers sniff to pick a decoder; only its first
//! seven bytes are compared so the trailing NUL never participates.
//!
//! All integer fields are big-endian. The domain and originator fields are
//! fixed-width, NUL-padded UTF-8.

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use meshkb_core::{
    constants::{
        DOMAIN_MAX_LENGTH, FRAGMENT_IDENTIFIER, FULL_IDENTIFIER, IDENTIFIER_LENGTH,
        ORIGINATOR_MAX_LENGTH, REDUCED_IDENTIFIER,
    },
    error::{DecodingErrorKind, Result},
};

/// Encoded size of a full header in bytes.
pub const FULL_HEADER_SIZE: usize =
    8 + IDENTIFIER_LENGTH + DOMAIN_MAX_LENGTH + ORIGINATOR_MAX_LENGTH + 4 + 4 + 4 + 8 + 8 + 1;
/// Encoded size of a reduced header in bytes.
pub const REDUCED_HEADER_SIZE: usize = 8 + IDENTIFIER_LENGTH + 4 + 4 + 8;
/// Encoded size of a fragment header in bytes.
pub const FRAGMENT_HEADER_SIZE: usize = FULL_HEADER_SIZE + 4;

/// The kind of payload a message carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageType {
    /// A single-record assignment.
    Assign = 1,
    /// A batch of record assignments.
    MultiAssign = 2,
}

impl TryFrom<u32> for MessageType {
    type Error = DecodingErrorKind;

    fn try_from(value: u32) -> std::result::Result<Self, DecodingErrorKind> {
        match value {
            1 => Ok(MessageType::Assign),
            2 => Ok(MessageType::MultiAssign),
            _ => Err(DecodingErrorKind::UnknownMessageType),
        }
    }
}

/// The full header carried by ordinary knowledge messages.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageHeader {
    /// Total encoded size of the message, header included. Patched into the
    /// buffer after the payload is written.
    pub size: u64,
    /// Domain the sender participates in.
    pub domain: String,
    /// host:port identity of the process that built the message.
    pub originator: String,
    /// Payload kind.
    pub message_type: MessageType,
    /// Number of records in the payload.
    pub updates: u32,
    /// Maximum quality across the batched records.
    pub quality: u32,
    /// Sender's Lamport clock when the message was built.
    pub clock: u64,
    /// Wall-clock seconds since the epoch at send time.
    pub timestamp: u64,
    /// Remaining rebroadcast hops.
    pub ttl: u8,
}

impl Default for MessageHeader {
    fn default() -> Self {
        Self {
            size: 0,
            domain: String::new(),
            originator: String::new(),
            message_type: MessageType::MultiAssign,
            updates: 0,
            quality: 0,
            clock: 0,
            timestamp: 0,
            ttl: 0,
        }
    }
}

impl MessageHeader {
    /// Appends the encoded header to `buffer`. The size field is written
    /// as-is; callers patch it once the payload length is known.
    pub fn encode_into(&self, buffer: &mut Vec<u8>) -> std::io::Result<()> {
        buffer.write_u64::<BigEndian>(self.size)?;
        buffer.write_all(FULL_IDENTIFIER)?;
        write_fixed(buffer, &self.domain, DOMAIN_MAX_LENGTH)?;
        write_fixed(buffer, &self.originator, ORIGINATOR_MAX_LENGTH)?;
        buffer.write_u32::<BigEndian>(self.message_type as u32)?;
        buffer.write_u32::<BigEndian>(self.updates)?;
        buffer.write_u32::<BigEndian>(self.quality)?;
        buffer.write_u64::<BigEndian>(self.clock)?;
        buffer.write_u64::<BigEndian>(self.timestamp)?;
        buffer.write_u8(self.ttl)?;
        Ok(())
    }

    /// Decodes a full header from the cursor, identifier included.
    pub fn decode_from(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let size = read_u64(cursor)?;
        let mut identifier = [0u8; IDENTIFIER_LENGTH];
        read_exact(cursor, &mut identifier)?;
        if !identifier_matches(&identifier, FULL_IDENTIFIER) {
            return Err(DecodingErrorKind::UnknownIdentifier.into());
        }
        let domain = read_fixed(cursor, DOMAIN_MAX_LENGTH)?;
        let originator = read_fixed(cursor, ORIGINATOR_MAX_LENGTH)?;
        let message_type = MessageType::try_from(read_u32(cursor)?)?;
        let updates = read_u32(cursor)?;
        let quality = read_u32(cursor)?;
        let clock = read_u64(cursor)?;
        let timestamp = read_u64(cursor)?;
        let ttl = read_u8(cursor)?;
        Ok(Self { size, domain, originator, message_type, updates, quality, clock, timestamp, ttl })
    }
}

/// The reduced header used when both ends share an out-of-band trust
/// assumption. Omits domain, originator, quality, timestamp, and TTL.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReducedHeader {
    /// Total encoded size of the message, header included.
    pub size: u64,
    /// Payload kind as a raw tag; see [`MessageType`].
    pub message_type: u32,
    /// Number of records in the payload.
    pub updates: u32,
    /// Sender's Lamport clock when the message was built.
    pub clock: u64,
}

impl ReducedHeader {
    /// Appends the encoded header to `buffer`.
    pub fn encode_into(&self, buffer: &mut Vec<u8>) -> std::io::Result<()> {
        buffer.write_u64::<BigEndian>(self.size)?;
        buffer.write_all(REDUCED_IDENTIFIER)?;
        buffer.write_u32::<BigEndian>(self.message_type)?;
        buffer.write_u32::<BigEndian>(self.updates)?;
        buffer.write_u64::<BigEndian>(self.clock)?;
        Ok(())
    }

    /// Decodes a reduced header from the cursor, identifier included.
    pub fn decode_from(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let size = read_u64(cursor)?;
        let mut identifier = [0u8; IDENTIFIER_LENGTH];
        read_exact(cursor, &mut identifier)?;
        if !identifier_matches(&identifier, REDUCED_IDENTIFIER) {
            return Err(DecodingErrorKind::UnknownIdentifier.into());
        }
        let message_type = read_u32(cursor)?;
        MessageType::try_from(message_type)?;
        let updates = read_u32(cursor)?;
        let clock = read_u64(cursor)?;
        Ok(Self { size, message_type, updates, clock })
    }
}

/// The header carried by one fragment of an oversized message.
///
/// Layout is the full header with the fragment identifier in place of the
/// full identifier and a trailing fragment sequence number. The size field
/// of every fragment carries the total reassembled message size, not the
/// fragment's own length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FragmentHeader {
    /// The shared full-header fields, copied from the original message.
    pub message: MessageHeader,
    /// Zero-based position of this fragment's chunk.
    pub update_number: u32,
}

impl FragmentHeader {
    /// Appends the encoded header to `buffer`.
    pub fn encode_into(&self, buffer: &mut Vec<u8>) -> std::io::Result<()> {
        buffer.write_u64::<BigEndian>(self.message.size)?;
        buffer.write_all(FRAGMENT_IDENTIFIER)?;
        write_fixed(buffer, &self.message.domain, DOMAIN_MAX_LENGTH)?;
        write_fixed(buffer, &self.message.originator, ORIGINATOR_MAX_LENGTH)?;
        buffer.write_u32::<BigEndian>(self.message.message_type as u32)?;
        buffer.write_u32::<BigEndian>(self.message.updates)?;
        buffer.write_u32::<BigEndian>(self.message.quality)?;
        buffer.write_u64::<BigEndian>(self.message.clock)?;
        buffer.write_u64::<BigEndian>(self.message.timestamp)?;
        buffer.write_u8(self.message.ttl)?;
        buffer.write_u32::<BigEndian>(self.update_number)?;
        Ok(())
    }

    /// Decodes a fragment header from the cursor, identifier included.
    pub fn decode_from(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let size = read_u64(cursor)?;
        let mut identifier = [0u8; IDENTIFIER_LENGTH];
        read_exact(cursor, &mut identifier)?;
        if !identifier_matches(&identifier, FRAGMENT_IDENTIFIER) {
            return Err(DecodingErrorKind::UnknownIdentifier.into());
        }
        let domain = read_fixed(cursor, DOMAIN_MAX_LENGTH)?;
        let originator = read_fixed(cursor, ORIGINATOR_MAX_LENGTH)?;
        let message_type = MessageType::try_from(read_u32(cursor)?)?;
        let updates = read_u32(cursor)?;
        let quality = read_u32(cursor)?;
        let clock = read_u64(cursor)?;
        let timestamp = read_u64(cursor)?;
        let ttl = read_u8(cursor)?;
        let update_number = read_u32(cursor)?;
        Ok(Self {
            message: MessageHeader {
                size,
                domain,
                originator,
                message_type,
                updates,
                quality,
                clock,
                timestamp,
                ttl,
            },
            update_number,
        })
    }
}

/// A decoded header of any variant.
#[derive(Clone, Debug, PartialEq)]
pub enum Header {
    /// Ordinary knowledge message.
    Full(MessageHeader),
    /// Trust-assumed message with the short header.
    Reduced(ReducedHeader),
    /// One fragment of an oversized message.
    Fragment(FragmentHeader),
}

impl Header {
    /// Returns the Lamport clock the sender stamped on the message.
    pub fn clock(&self) -> u64 {
        match self {
            Header::Full(h) => h.clock,
            Header::Reduced(h) => h.clock,
            Header::Fragment(h) => h.message.clock,
        }
    }

    /// Returns the declared record count.
    pub fn updates(&self) -> u32 {
        match self {
            Header::Full(h) => h.updates,
            Header::Reduced(h) => h.updates,
            Header::Fragment(h) => h.message.updates,
        }
    }

    /// Returns the encoded size of this header variant.
    pub fn encoded_size(&self) -> usize {
        match self {
            Header::Full(_) => FULL_HEADER_SIZE,
            Header::Reduced(_) => REDUCED_HEADER_SIZE,
            Header::Fragment(_) => FRAGMENT_HEADER_SIZE,
        }
    }
}

/// Checks an identifier field against an expected identifier, comparing the
/// first seven bytes only.
fn identifier_matches(field: &[u8; IDENTIFIER_LENGTH], expected: &[u8; IDENTIFIER_LENGTH]) -> bool {
    field[..IDENTIFIER_LENGTH - 1] == expected[..IDENTIFIER_LENGTH - 1]
}

/// Checks whether a raw buffer starts with a reduced-header message.
pub fn is_reduced_message(buffer: &[u8]) -> bool {
    buffer_identifier_matches(buffer, REDUCED_IDENTIFIER)
}

/// Checks whether a raw buffer starts with a full-header message.
pub fn is_full_message(buffer: &[u8]) -> bool {
    buffer_identifier_matches(buffer, FULL_IDENTIFIER)
}

/// Checks whether a raw buffer starts with a fragment-header message.
pub fn is_fragment_message(buffer: &[u8]) -> bool {
    buffer_identifier_matches(buffer, FRAGMENT_IDENTIFIER)
}

fn buffer_identifier_matches(buffer: &[u8], expected: &[u8; IDENTIFIER_LENGTH]) -> bool {
    let start = 8;
    let end = start + IDENTIFIER_LENGTH - 1;
    buffer.len() >= end && buffer[start..end] == expected[..IDENTIFIER_LENGTH - 1]
}

fn write_fixed(buffer: &mut Vec<u8>, value: &str, width: usize) -> std::io::Result<()> {
    let bytes = value.as_bytes();
    let copied = bytes.len().min(width);
    buffer.write_all(&bytes[..copied])?;
    for _ in copied..width {
        buffer.write_u8(0)?;
    }
    Ok(())
}

fn read_fixed(cursor: &mut Cursor<&[u8]>, width: usize) -> Result<String> {
    let mut field = vec![0u8; width];
    read_exact(cursor, &mut field)?;
    let end = field.iter().position(|&b| b == 0).unwrap_or(width);
    field.truncate(end);
    String::from_utf8(field).map_err(|_| DecodingErrorKind::InvalidString.into())
}

fn read_exact(cursor: &mut Cursor<&[u8]>, target: &mut [u8]) -> Result<()> {
    cursor.read_exact(target).map_err(|_| DecodingErrorKind::Truncated.into())
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8> {
    cursor.read_u8().map_err(|_| DecodingErrorKind::Truncated.into())
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32> {
    cursor.read_u32::<BigEndian>().map_err(|_| DecodingErrorKind::Truncated.into())
}

fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64> {
    cursor.read_u64::<BigEndian>().map_err(|_| DecodingErrorKind::Truncated.into())
}
