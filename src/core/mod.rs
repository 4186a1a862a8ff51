//! Storage core: bit vectors, on-disk layout, partitions and the engine facade

pub mod bits;
pub mod config;
pub mod engine;
pub mod error;
pub mod io;
pub mod layout;
pub mod metadata;
pub mod partition;
pub mod vpn;

pub use bits::BitVector;
pub use config::EngineConfig;
pub use engine::{EngineStats, StorageEngine};
pub use error::{Result, StorageError};
pub use metadata::{GlobalMetadata, GlobalMetadataStore};
pub use partition::{CommitOutcome, PartitionStats, PartitionStore};
pub use vpn::{PageIndex, PartitionId, VirtualPageNumber, UNASSIGNED_PARTITION, VPN_BASE};
