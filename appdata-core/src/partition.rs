//! Partitions and the write-permission rule attached to them.

use crate::{DataError, DataResult, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User partition.
/// An authenticated user can read/write documents in this partition.
pub const USER_DOCUMENTS_PARTITION: &str = "user";

/// Application partition.
/// Everyone can read documents in this partition. Writes are rejected.
pub const APP_DOCUMENTS_PARTITION: &str = "readonly";

/// Document partition namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Partition {
    /// Read/write documents owned by the signed-in user.
    #[serde(rename = "user")]
    User,
    /// Application-wide documents, read-only through this client.
    #[serde(rename = "readonly")]
    ReadOnly,
}

impl Partition {
    /// The wire name of this partition.
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::User => USER_DOCUMENTS_PARTITION,
            Partition::ReadOnly => APP_DOCUMENTS_PARTITION,
        }
    }

    /// Whether this client may write to the partition.
    pub fn is_writable(&self) -> bool {
        matches!(self, Partition::User)
    }

    /// Reject `operation` if it writes and the partition is read-only.
    ///
    /// This is the single place the read-only rule lives; every write path
    /// goes through it before touching the network.
    pub fn ensure_allowed(&self, operation: DocumentOperation) -> DataResult<()> {
        if operation.is_write() && !self.is_writable() {
            return Err(DataError::Permission {
                partition: self.as_str().to_string(),
                operation: operation.as_str().to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Partition {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            USER_DOCUMENTS_PARTITION => Ok(Partition::User),
            APP_DOCUMENTS_PARTITION => Ok(Partition::ReadOnly),
            other => Err(ValidationError::UnknownPartition {
                value: other.to_string(),
            }),
        }
    }
}

/// The document operations exposed by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentOperation {
    Read,
    List,
    Create,
    Replace,
    Delete,
}

impl DocumentOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentOperation::Read => "read",
            DocumentOperation::List => "list",
            DocumentOperation::Create => "create",
            DocumentOperation::Replace => "replace",
            DocumentOperation::Delete => "delete",
        }
    }

    /// Whether the operation mutates remote state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            DocumentOperation::Create | DocumentOperation::Replace | DocumentOperation::Delete
        )
    }
}

impl fmt::Display for DocumentOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_round_trip_names() {
        assert_eq!("user".parse::<Partition>().unwrap(), Partition::User);
        assert_eq!("readonly".parse::<Partition>().unwrap(), Partition::ReadOnly);
        assert_eq!(Partition::User.to_string(), "user");
        assert_eq!(Partition::ReadOnly.to_string(), "readonly");
    }

    #[test]
    fn test_unknown_partition_rejected() {
        let err = "shared".parse::<Partition>().unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownPartition {
                value: "shared".to_string()
            }
        );
    }

    #[test]
    fn test_readonly_rejects_writes_only() {
        let ro = Partition::ReadOnly;
        assert!(ro.ensure_allowed(DocumentOperation::Read).is_ok());
        assert!(ro.ensure_allowed(DocumentOperation::List).is_ok());
        for op in [
            DocumentOperation::Create,
            DocumentOperation::Replace,
            DocumentOperation::Delete,
        ] {
            match ro.ensure_allowed(op) {
                Err(DataError::Permission { partition, operation }) => {
                    assert_eq!(partition, "readonly");
                    assert_eq!(operation, op.as_str());
                }
                other => panic!("expected permission error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_user_partition_allows_everything() {
        for op in [
            DocumentOperation::Read,
            DocumentOperation::List,
            DocumentOperation::Create,
            DocumentOperation::Replace,
            DocumentOperation::Delete,
        ] {
            assert!(Partition::User.ensure_allowed(op).is_ok());
        }
    }

    #[test]
    fn test_partition_serde_uses_wire_names() {
        let json = serde_json::to_string(&Partition::ReadOnly).unwrap();
        assert_eq!(json, "\"readonly\"");
        let back: Partition = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(back, Partition::User);
    }
}
