//! Partition-scoped cache keys.
//!
//! A `DocumentKey` cannot be built without a partition, so a lookup can
//! never reach a document in another partition by accident.

use appdata_core::Partition;

/// Separator byte between the partition discriminant and the document id.
const SEPARATOR: u8 = 0xFF;

/// Cache key for one document.
///
/// # Binary Format
///
/// - Byte 0: partition discriminant
/// - Byte 1: separator (0xFF, never valid UTF-8)
/// - Bytes 2..: document id as UTF-8
///
/// Keys sort by partition first, so a prefix scan walks one partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    partition: Partition,
    document_id: String,
}

impl DocumentKey {
    pub fn new(partition: Partition, document_id: impl Into<String>) -> Self {
        Self {
            partition,
            document_id: document_id.into(),
        }
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Encode this key for byte-keyed storage.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 + self.document_id.len());
        bytes.extend_from_slice(&Self::partition_prefix(self.partition));
        bytes.extend_from_slice(self.document_id.as_bytes());
        bytes
    }

    /// Decode a key produced by [`DocumentKey::encode`].
    ///
    /// Returns `None` for short input, a missing separator, an unknown
    /// partition byte or a non-UTF-8 document id.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 2 || bytes[1] != SEPARATOR {
            return None;
        }
        let partition = byte_to_partition(bytes[0])?;
        let document_id = std::str::from_utf8(&bytes[2..]).ok()?;
        Some(Self::new(partition, document_id))
    }

    /// Prefix shared by every key in `partition`.
    pub fn partition_prefix(partition: Partition) -> [u8; 2] {
        [partition_to_byte(partition), SEPARATOR]
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.partition, self.document_id)
    }
}

fn partition_to_byte(partition: Partition) -> u8 {
    match partition {
        Partition::User => 0,
        Partition::ReadOnly => 1,
    }
}

fn byte_to_partition(byte: u8) -> Option<Partition> {
    match byte {
        0 => Some(Partition::User),
        1 => Some(Partition::ReadOnly),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let key = DocumentKey::new(Partition::ReadOnly, "abc");
        assert_eq!(key.encode(), vec![1, 0xFF, b'a', b'b', b'c']);
    }

    #[test]
    fn test_decode_encoded_key() {
        let key = DocumentKey::new(Partition::User, "doc-ü-1");
        assert_eq!(DocumentKey::decode(&key.encode()), Some(key));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(DocumentKey::decode(&[]), None);
        assert_eq!(DocumentKey::decode(&[0]), None);
        assert_eq!(DocumentKey::decode(&[0, 0, b'a']), None);
        assert_eq!(DocumentKey::decode(&[9, 0xFF, b'a']), None);
        assert_eq!(DocumentKey::decode(&[0, 0xFF, 0xC3]), None);
    }

    #[test]
    fn test_partition_prefix_isolation() {
        let user = DocumentKey::new(Partition::User, "same").encode();
        let app = DocumentKey::new(Partition::ReadOnly, "same").encode();
        assert_ne!(user, app);
        assert!(user.starts_with(&DocumentKey::partition_prefix(Partition::User)));
        assert!(!app.starts_with(&DocumentKey::partition_prefix(Partition::User)));
    }

    #[test]
    fn test_display() {
        assert_eq!(DocumentKey::new(Partition::User, "x").to_string(), "user/x");
    }
}
