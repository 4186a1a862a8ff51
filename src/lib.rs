//! # Shardpage - Partitioned Paged Storage Engine
//!
//! `shardpage` stores fixed-size pages across many independent partitions on
//! local disk. Writer lanes allocate and fill pages; a reader consumes them and
//! commits its offset, which frees them.
//!
//! - **Bitmap allocation**: one bit per data page, lowest free page first
//! - **Durable data pages**: every data page write is synced before returning
//! - **Virtual page numbers**: `partition * 10^10 + page` addresses any page
//! - **Lane hand-off**: full partitions are swapped for fresh ones through a
//!   single global metadata page
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shardpage::{Result, StorageEngineBuilder};
//!
//! # fn main() -> Result<()> {
//! let engine = StorageEngineBuilder::new()
//!     .root("/var/lib/shardpage")
//!     .page_size(4096)
//!     .build()?;
//!
//! // Open the partitions bound to the writer lanes
//! engine.bootstrap()?;
//!
//! if let Some(vpn) = engine.allocate_page(0)? {
//!     engine.write_page(vpn, &[0xAB; 4096])?;
//!
//!     let mut out = vec![0u8; 4096];
//!     engine.read_page(vpn, &mut out)?;
//!     engine.free_page(vpn)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Handling a full partition
//!
//! ```rust,no_run
//! use shardpage::{Result, StorageEngine};
//!
//! # fn lane(engine: &StorageEngine, current: u16) -> Result<()> {
//! if engine.allocate_page(current)?.is_none() {
//!     let next = engine.metadata().next_available_partition();
//!     engine.allocate_partition(next)?;
//!     engine.retarget_lane(current, next)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## On-disk layout
//!
//! ```text
//! <root>/
//! ├── meta                    global metadata page
//! ├── partition-0/
//! │   ├── writer.part         master | bitmap | data x D | bitmap | data x D ...
//! │   └── reader.idx          master | bitmap | bitmap ...
//! └── partition-1/
//!     └── ...
//! ```

pub mod core;

pub use crate::core::{
    bits::BitVector,
    config::EngineConfig,
    engine::{EngineStats, StorageEngine},
    error::{Result, StorageError},
    metadata::{GlobalMetadata, GlobalMetadataStore},
    partition::{CommitOutcome, PartitionStats, PartitionStore},
    vpn::{PageIndex, PartitionId, VirtualPageNumber, UNASSIGNED_PARTITION, VPN_BASE},
};

use std::path::PathBuf;
use tracing::info;

/// Builder for configuring a [`StorageEngine`]
///
/// # Examples
///
/// ```rust,no_run
/// use shardpage::StorageEngineBuilder;
///
/// # fn main() -> shardpage::Result<()> {
/// let engine = StorageEngineBuilder::new()
///     .root("./data")
///     .writer_lanes(8)
///     .max_partitions(256)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct StorageEngineBuilder {
    root: Option<PathBuf>,
    config_file: Option<PathBuf>,
    page_size: Option<usize>,
    writer_lanes: Option<u16>,
    max_partitions: Option<u16>,
    bitmap_pages: Option<u16>,
}

impl StorageEngineBuilder {
    pub fn new() -> Self {
        StorageEngineBuilder {
            root: None,
            config_file: None,
            page_size: None,
            writer_lanes: None,
            max_partitions: None,
            bitmap_pages: None,
        }
    }

    /// Root directory holding the metadata file and partition directories
    pub fn root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Load settings from a TOML file; explicit builder settings win
    pub fn config_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_file = Some(path.into());
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn writer_lanes(mut self, lanes: u16) -> Self {
        self.writer_lanes = Some(lanes);
        self
    }

    pub fn max_partitions(mut self, max: u16) -> Self {
        self.max_partitions = Some(max);
        self
    }

    /// Bitmap pages per partition (capacity is `bitmap_pages * D`)
    pub fn bitmap_pages(mut self, pages: u16) -> Self {
        self.bitmap_pages = Some(pages);
        self
    }

    /// Resolve the final configuration without opening anything
    pub fn config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config_file {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };

        if let Some(root) = &self.root {
            config.root_dir = root.clone();
        }
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }
        if let Some(lanes) = self.writer_lanes {
            config.writer_lanes = lanes;
        }
        if let Some(max) = self.max_partitions {
            config.max_partitions = max;
        }
        if let Some(pages) = self.bitmap_pages {
            config.bitmap_pages = pages;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn build(self) -> Result<StorageEngine> {
        let config = self.config()?;
        info!("Building storage engine at {:?}", config.root_dir);
        StorageEngine::open(config)
    }
}

impl Default for StorageEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
