use thiserror::Error;

use crate::core::vpn::PartitionId;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Index {index} out of range (limit {len})")]
    OutOfRange { index: u64, len: u64 },

    #[error("Invariant violation in partition {partition}: {detail}")]
    InvariantViolation { partition: PartitionId, detail: String },

    #[error("Partition {partition} is full: obtain a new partition and retry")]
    PartitionFull { partition: PartitionId },

    #[error("Page {page} of partition {partition} is not allocated")]
    UnallocatedPage { partition: PartitionId, page: u32 },

    #[error("Offset for page {page} of partition {partition} already committed")]
    AlreadyCommitted { partition: PartitionId, page: u32 },

    #[error("Unknown partition: {0}")]
    UnknownPartition(PartitionId),

    #[error("Partition already exists: {0}")]
    AlreadyExists(PartitionId),

    #[error("Invalid page size: expected {expected} bytes, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("Batch size mismatch: {pages} pages but {buffers} buffers")]
    SizeMismatch { pages: usize, buffers: usize },

    #[error("Corrupt global metadata: {0}")]
    CorruptMetadata(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Expected control-flow signals the caller can act on and retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StorageError::PartitionFull { .. })
    }

    /// Protocol or argument misuse by the caller. Never retried internally.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            StorageError::OutOfRange { .. }
                | StorageError::InvalidPageSize { .. }
                | StorageError::UnknownPartition(_)
                | StorageError::AlreadyExists(_)
                | StorageError::UnallocatedPage { .. }
                | StorageError::AlreadyCommitted { .. }
                | StorageError::SizeMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
