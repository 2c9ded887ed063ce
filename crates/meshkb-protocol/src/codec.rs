//! Message encoding and decoding.
//!
//! A message is a header followed by `updates` records, each encoded as a
//! length-prefixed key, a type tag, the value payload, and the record's
//! clock and quality. Decoding is fail-closed: any malformed field aborts
//! the whole message, applying none of it.

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use meshkb_core::error::{DecodingErrorKind, Result};
use meshkb_knowledge::record::{
    KnowledgeMap, KnowledgeRecord, KnowledgeValue, TAG_BINARY, TAG_DOUBLE, TAG_INTEGER, TAG_STRING,
};

use crate::header::{
    is_fragment_message, is_full_message, is_reduced_message, FragmentHeader, Header,
    MessageHeader, ReducedHeader,
};

/// A fully decoded incoming message.
#[derive(Debug)]
pub enum DecodedMessage {
    /// A full or reduced message carrying a batch of records.
    Batch {
        /// The decoded header.
        header: Header,
        /// The decoded records, keyed by knowledge key.
        records: KnowledgeMap,
    },
    /// One fragment of an oversized message; the chunk is an opaque byte
    /// slice of the original encoding.
    Fragment {
        /// The fragment header.
        header: FragmentHeader,
        /// This fragment's slice of the reassembled message.
        chunk: Vec<u8>,
    },
}

/// Serializes record batches into wire messages.
pub struct MessageEncoder;

impl MessageEncoder {
    /// Encodes a batch under a full header. The header's `updates` and
    /// `size` fields are stamped by the encoder; everything else is taken
    /// from `header` as given.
    pub fn encode(header: &MessageHeader, records: &KnowledgeMap) -> Result<Vec<u8>> {
        let mut stamped = header.clone();
        stamped.updates = records.len() as u32;
        stamped.size = 0;

        let mut buffer = Vec::new();
        stamped.encode_into(&mut buffer)?;
        for (key, record) in records {
            Self::encode_record_into(&mut buffer, key, record)?;
        }
        Self::patch_size(&mut buffer);
        Ok(buffer)
    }

    /// Encodes a batch under a reduced header.
    pub fn encode_reduced(header: &ReducedHeader, records: &KnowledgeMap) -> Result<Vec<u8>> {
        let mut stamped = header.clone();
        stamped.updates = records.len() as u32;
        stamped.size = 0;

        let mut buffer = Vec::new();
        stamped.encode_into(&mut buffer)?;
        for (key, record) in records {
            Self::encode_record_into(&mut buffer, key, record)?;
        }
        Self::patch_size(&mut buffer);
        Ok(buffer)
    }

    /// Appends one record to the buffer.
    fn encode_record_into(
        buffer: &mut Vec<u8>,
        key: &str,
        record: &KnowledgeRecord,
    ) -> std::io::Result<()> {
        buffer.write_u32::<BigEndian>(key.len() as u32)?;
        buffer.write_all(key.as_bytes())?;
        buffer.write_u32::<BigEndian>(record.value.type_tag())?;
        match &record.value {
            KnowledgeValue::Integer(v) => buffer.write_i64::<BigEndian>(*v)?,
            KnowledgeValue::Double(v) => buffer.write_f64::<BigEndian>(*v)?,
            KnowledgeValue::String(s) => {
                buffer.write_u32::<BigEndian>(s.len() as u32)?;
                buffer.write_all(s.as_bytes())?;
            }
            KnowledgeValue::Binary(b) => {
                buffer.write_u32::<BigEndian>(b.len() as u32)?;
                buffer.write_all(b)?;
            }
        }
        buffer.write_u64::<BigEndian>(record.clock)?;
        buffer.write_u32::<BigEndian>(record.quality)?;
        Ok(())
    }

    /// Patches the total message size into the leading size field.
    fn patch_size(buffer: &mut [u8]) {
        let total = buffer.len() as u64;
        buffer[..8].copy_from_slice(&total.to_be_bytes());
    }
}

/// Deserializes wire messages back into headers and record batches.
pub struct MessageDecoder;

impl MessageDecoder {
    /// Sniffs the identifier and decodes the whole message. Reduced is
    /// tried first as the cheapest to reject, then full, then fragment.
    pub fn decode(buffer: &[u8]) -> Result<DecodedMessage> {
        if is_reduced_message(buffer) {
            let mut cursor = Cursor::new(buffer);
            let header = ReducedHeader::decode_from(&mut cursor)?;
            let records = Self::decode_records(&mut cursor, header.updates)?;
            Ok(DecodedMessage::Batch { header: Header::Reduced(header), records })
        } else if is_full_message(buffer) {
            let mut cursor = Cursor::new(buffer);
            let header = MessageHeader::decode_from(&mut cursor)?;
            let records = Self::decode_records(&mut cursor, header.updates)?;
            Ok(DecodedMessage::Batch { header: Header::Full(header), records })
        } else if is_fragment_message(buffer) {
            let mut cursor = Cursor::new(buffer);
            let header = FragmentHeader::decode_from(&mut cursor)?;
            let chunk = buffer[cursor.position() as usize..].to_vec();
            Ok(DecodedMessage::Fragment { header, chunk })
        } else {
            Err(DecodingErrorKind::UnknownIdentifier.into())
        }
    }

    /// Decodes exactly `updates` records from the cursor.
    fn decode_records(cursor: &mut Cursor<&[u8]>, updates: u32) -> Result<KnowledgeMap> {
        let mut records = KnowledgeMap::new();
        for _ in 0..updates {
            let (key, record) = Self::decode_record(cursor)?;
            records.insert(key, record);
        }
        Ok(records)
    }

    /// Decodes one record at the cursor.
    fn decode_record(cursor: &mut Cursor<&[u8]>) -> Result<(String, KnowledgeRecord)> {
        let key = read_string(cursor)?;
        let tag = read_u32(cursor)?;
        let value = match tag {
            TAG_INTEGER => KnowledgeValue::Integer(
                cursor.read_i64::<BigEndian>().map_err(|_| DecodingErrorKind::Truncated)?,
            ),
            TAG_DOUBLE => KnowledgeValue::Double(
                cursor.read_f64::<BigEndian>().map_err(|_| DecodingErrorKind::Truncated)?,
            ),
            TAG_STRING => KnowledgeValue::String(read_string(cursor)?),
            TAG_BINARY => KnowledgeValue::Binary(read_bytes(cursor)?),
            _ => return Err(DecodingErrorKind::UnknownValueType.into()),
        };
        let clock = read_u64(cursor)?;
        let quality = read_u32(cursor)?;
        Ok((key, KnowledgeRecord::new(value, clock, quality)))
    }
}

/// Reads a length-prefixed byte run, checking the declared length against
/// the remaining buffer before allocating.
fn read_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let len = read_u32(cursor)? as usize;
    let remaining = cursor.get_ref().len().saturating_sub(cursor.position() as usize);
    if len > remaining {
        return Err(DecodingErrorKind::LengthOverrun.into());
    }
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes).map_err(|_| DecodingErrorKind::Truncated)?;
    Ok(bytes)
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    String::from_utf8(read_bytes(cursor)?).map_err(|_| DecodingErrorKind::InvalidString.into())
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32> {
    cursor.read_u32::<BigEndian>().map_err(|_| DecodingErrorKind::Truncated.into())
}

fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64> {
    cursor.read_u64::<BigEndian>().map_err(|_| DecodingErrorKind::Truncated.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{MessageType, FULL_HEADER_SIZE};

    fn sample_records() -> KnowledgeMap {
        let mut records = KnowledgeMap::new();
        records.insert("pose.x".to_owned(), KnowledgeRecord::new(1.5.into(), 4, 2));
        records.insert("status".to_owned(), KnowledgeRecord::new("ready".into(), 5, 0));
        records.insert("count".to_owned(), KnowledgeRecord::new(17.into(), 6, 1));
        records.insert("blob".to_owned(), KnowledgeRecord::new(vec![0u8, 255, 3].into(), 7, 0));
        records
    }

    fn sample_header() -> MessageHeader {
        MessageHeader {
            domain: "fleet".to_owned(),
            originator: "192.168.1.5:4150".to_owned(),
            message_type: MessageType::MultiAssign,
            quality: 2,
            clock: 7,
            timestamp: 1_700_000_000,
            ttl: 1,
            ..MessageHeader::default()
        }
    }

    #[test]
    fn test_full_message_round_trip() {
        let records = sample_records();
        let encoded = MessageEncoder::encode(&sample_header(), &records).unwrap();

        match MessageDecoder::decode(&encoded).unwrap() {
            DecodedMessage::Batch { header: Header::Full(header), records: decoded } => {
                assert_eq!(header.domain, "fleet");
                assert_eq!(header.updates, 4);
                assert_eq!(header.size, encoded.len() as u64);
                assert_eq!(decoded, records);
            }
            other => panic!("expected full batch, got {other:?}"),
        }
    }

    #[test]
    fn test_reduced_message_round_trip() {
        let records = sample_records();
        let header = ReducedHeader { message_type: 2, clock: 11, ..ReducedHeader::default() };
        let encoded = MessageEncoder::encode_reduced(&header, &records).unwrap();

        match MessageDecoder::decode(&encoded).unwrap() {
            DecodedMessage::Batch { header: Header::Reduced(header), records: decoded } => {
                assert_eq!(header.clock, 11);
                assert_eq!(header.updates, 4);
                assert_eq!(decoded, records);
            }
            other => panic!("expected reduced batch, got {other:?}"),
        }
    }

    #[test]
    fn test_record_metadata_survives() {
        let mut records = KnowledgeMap::new();
        records.insert("k".to_owned(), KnowledgeRecord::new(9.into(), 33, 5));

        let encoded = MessageEncoder::encode(&sample_header(), &records).unwrap();
        match MessageDecoder::decode(&encoded).unwrap() {
            DecodedMessage::Batch { records: decoded, .. } => {
                let record = &decoded["k"];
                assert_eq!(record.clock, 33);
                assert_eq!(record.quality, 5);
            }
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_identifier_rejected() {
        let mut encoded = MessageEncoder::encode(&sample_header(), &sample_records()).unwrap();
        encoded[8..16].copy_from_slice(b"BOGUS0.0");
        assert!(MessageDecoder::decode(&encoded).is_err());
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let encoded = MessageEncoder::encode(&sample_header(), &sample_records()).unwrap();
        let truncated = &encoded[..encoded.len() - 3];
        assert!(MessageDecoder::decode(truncated).is_err());
    }

    #[test]
    fn test_length_overrun_rejected_before_allocation() {
        let mut records = KnowledgeMap::new();
        records.insert("k".to_owned(), KnowledgeRecord::new("v".into(), 1, 0));
        let mut encoded = MessageEncoder::encode(&sample_header(), &records).unwrap();

        // Inflate the key length field far past the buffer.
        let key_len_offset = FULL_HEADER_SIZE;
        encoded[key_len_offset..key_len_offset + 4]
            .copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(MessageDecoder::decode(&encoded).is_err());
    }

    #[test]
    fn test_unknown_value_tag_rejected() {
        let mut records = KnowledgeMap::new();
        records.insert("k".to_owned(), KnowledgeRecord::new(1.into(), 1, 0));
        let mut encoded = MessageEncoder::encode(&sample_header(), &records).unwrap();

        // Type tag sits after the header, the key length, and the key.
        let tag_offset = FULL_HEADER_SIZE + 4 + 1;
        encoded[tag_offset..tag_offset + 4].copy_from_slice(&200u32.to_be_bytes());
        assert!(MessageDecoder::decode(&encoded).is_err());
    }

    #[test]
    fn test_malformed_record_aborts_whole_batch() {
        // Two records; corrupting the first must reject both.
        let mut records = KnowledgeMap::new();
        records.insert("a".to_owned(), KnowledgeRecord::new(1.into(), 1, 0));
        records.insert("b".to_owned(), KnowledgeRecord::new(2.into(), 1, 0));
        let mut encoded = MessageEncoder::encode(&sample_header(), &records).unwrap();

        let tag_offset = FULL_HEADER_SIZE + 4 + 1;
        encoded[tag_offset..tag_offset + 4].copy_from_slice(&200u32.to_be_bytes());
        assert!(MessageDecoder::decode(&encoded).is_err());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let records = sample_records();
        let first = MessageEncoder::encode(&sample_header(), &records).unwrap();
        let second = MessageEncoder::encode(&sample_header(), &records).unwrap();
        assert_eq!(first, second);
    }
}
