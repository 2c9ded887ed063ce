//! Knowledge values and records.

use std::collections::BTreeMap;

/// An ordered mapping from key to record, used by the filter pipeline and
/// the outbound batching path. Ordering keeps encoded batches deterministic.
pub type KnowledgeMap = BTreeMap<String, KnowledgeRecord>;

/// A single knowledge value.
///
/// The discriminant values match the on-wire type tags; see
/// [`KnowledgeValue::type_tag`].
#[derive(Clone, Debug, PartialEq)]
pub enum KnowledgeValue {
    /// 64-bit signed integer.
    Integer(i64),
    /// UTF-8 string.
    String(String),
    /// Double-precision float.
    Double(f64),
    /// Opaque binary blob.
    Binary(Vec<u8>),
}

/// Wire tag for integer values.
pub const TAG_INTEGER: u32 = 0;
/// Wire tag for string values.
pub const TAG_STRING: u32 = 1;
/// Wire tag for double values.
pub const TAG_DOUBLE: u32 = 2;
/// Wire tag for binary values.
pub const TAG_BINARY: u32 = 3;

impl KnowledgeValue {
    /// Returns the on-wire type tag for this value.
    pub fn type_tag(&self) -> u32 {
        match self {
            KnowledgeValue::Integer(_) => TAG_INTEGER,
            KnowledgeValue::String(_) => TAG_STRING,
            KnowledgeValue::Double(_) => TAG_DOUBLE,
            KnowledgeValue::Binary(_) => TAG_BINARY,
        }
    }

    /// Checks whether the value is logically true. Integers and doubles are
    /// true when non-zero; strings and blobs are true when non-empty.
    pub fn is_true(&self) -> bool {
        match self {
            KnowledgeValue::Integer(v) => *v != 0,
            KnowledgeValue::String(s) => !s.is_empty(),
            KnowledgeValue::Double(v) => *v != 0.0,
            KnowledgeValue::Binary(b) => !b.is_empty(),
        }
    }

    /// Inverse of [`KnowledgeValue::is_true`].
    pub fn is_false(&self) -> bool {
        !self.is_true()
    }
}

impl Default for KnowledgeValue {
    fn default() -> Self {
        KnowledgeValue::Integer(0)
    }
}

impl From<i64> for KnowledgeValue {
    fn from(v: i64) -> Self {
        KnowledgeValue::Integer(v)
    }
}

impl From<f64> for KnowledgeValue {
    fn from(v: f64) -> Self {
        KnowledgeValue::Double(v)
    }
}

impl From<&str> for KnowledgeValue {
    fn from(v: &str) -> Self {
        KnowledgeValue::String(v.to_owned())
    }
}

impl From<String> for KnowledgeValue {
    fn from(v: String) -> Self {
        KnowledgeValue::String(v)
    }
}

impl From<Vec<u8>> for KnowledgeValue {
    fn from(v: Vec<u8>) -> Self {
        KnowledgeValue::Binary(v)
    }
}

/// An entry in the knowledge store: a value plus replication metadata.
///
/// `clock` and `quality` describe the write that produced the current value,
/// wherever it originated. `write_quality` is the priority this process uses
/// when it writes the key itself, independent of the held value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KnowledgeRecord {
    /// The stored value.
    pub value: KnowledgeValue,
    /// Lamport clock of the write that produced `value`.
    pub clock: u64,
    /// Quality (writer-assigned priority) of the write that produced `value`.
    pub quality: u32,
    /// Priority this process writes the key with.
    pub write_quality: u32,
}

impl KnowledgeRecord {
    /// Creates a record holding `value` with the given replication metadata.
    pub fn new(value: KnowledgeValue, clock: u64, quality: u32) -> Self {
        Self { value, clock, quality, write_quality: quality }
    }

    /// Checks whether the held value is logically true.
    pub fn is_true(&self) -> bool {
        self.value.is_true()
    }
}

/// Returns the maximum quality across a batch of records.
///
/// Used to stamp the header quality of an outgoing message.
pub fn max_quality<'a, I>(records: I) -> u32
where
    I: IntoIterator<Item = &'a KnowledgeRecord>,
{
    records.into_iter().map(|r| r.quality).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_truthiness() {
        assert!(KnowledgeValue::Integer(5).is_true());
        assert!(KnowledgeValue::Integer(0).is_false());
        assert!(KnowledgeValue::Double(0.5).is_true());
        assert!(KnowledgeValue::Double(0.0).is_false());
        assert!(KnowledgeValue::from("x").is_true());
        assert!(KnowledgeValue::from("").is_false());
        assert!(KnowledgeValue::Binary(vec![1]).is_true());
        assert!(KnowledgeValue::Binary(vec![]).is_false());
    }

    #[test]
    fn test_type_tags_are_stable() {
        // These tags are on-wire values and must never change.
        assert_eq!(KnowledgeValue::Integer(0).type_tag(), 0);
        assert_eq!(KnowledgeValue::from("").type_tag(), 1);
        assert_eq!(KnowledgeValue::Double(0.0).type_tag(), 2);
        assert_eq!(KnowledgeValue::Binary(vec![]).type_tag(), 3);
    }

    #[test]
    fn test_max_quality() {
        let records = vec![
            KnowledgeRecord::new(1.into(), 0, 3),
            KnowledgeRecord::new(2.into(), 0, 7),
            KnowledgeRecord::new(3.into(), 0, 5),
        ];
        assert_eq!(max_quality(&records), 7);
        assert_eq!(max_quality(std::iter::empty()), 0);
    }
}
