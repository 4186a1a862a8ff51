//! Engine configuration
//!
//! All capacity constants live here rather than as hidden magic numbers.
//! A config can be built in code, through `StorageEngineBuilder`, or loaded
//! from TOML:
//!
//! ```toml
//! root_dir = "/var/lib/shardpage"
//! page_size = 4096
//! writer_lanes = 4
//! max_partitions = 128
//! bitmap_pages = 1
//! ```

use crate::core::error::{Result, StorageError};
use crate::core::layout::{self, READABLE_BITMAP_OFFSET};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const DEFAULT_WRITER_LANES: u16 = 4;
pub const DEFAULT_MAX_PARTITIONS: u16 = 128;
pub const DEFAULT_BITMAP_PAGES: u16 = 1;

const MIN_PAGE_SIZE: usize = 256;
// 16 KiB would need 65536 pages per bitmap, one more than the master counter holds
const MAX_PAGE_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the `meta` file and one `partition-<n>` directory per partition
    pub root_dir: PathBuf,

    /// Page size in bytes (unit of all I/O)
    pub page_size: usize,

    /// Number of writer lanes (active slots in global metadata)
    pub writer_lanes: u16,

    /// Capacity of the readable bitmap; partition ids must stay below this
    pub max_partitions: u16,

    /// Writer/reader bitmap pages per partition
    pub bitmap_pages: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            root_dir: PathBuf::from("shardpage-db"),
            page_size: DEFAULT_PAGE_SIZE,
            writer_lanes: DEFAULT_WRITER_LANES,
            max_partitions: DEFAULT_MAX_PARTITIONS,
            bitmap_pages: DEFAULT_BITMAP_PAGES,
        }
    }
}

impl EngineConfig {
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Self {
        EngineConfig {
            root_dir: root_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Data pages addressable by one bitmap page: `(P / 2) * 8`.
    ///
    /// Two bits of address space are reserved per data page; only the first
    /// half of each bitmap page is used.
    pub fn data_pages_per_bitmap(&self) -> u32 {
        ((self.page_size / 2) * 8) as u32
    }

    /// Data pages one partition can hold across all its bitmap pages
    pub fn partition_capacity(&self) -> u32 {
        self.data_pages_per_bitmap() * self.bitmap_pages as u32
    }

    /// Bytes needed for the readable bitmap (one bit per partition)
    pub fn readable_bitmap_len(&self) -> usize {
        (self.max_partitions as usize).div_ceil(8)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.root_dir.join("meta")
    }

    pub fn partition_dir(&self, partition: u16) -> PathBuf {
        self.root_dir.join(format!("partition-{}", partition))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.page_size.is_power_of_two()
            || self.page_size < MIN_PAGE_SIZE
            || self.page_size > MAX_PAGE_SIZE
        {
            return Err(StorageError::InvalidConfig(format!(
                "page_size {} must be a power of two in [{}, {}]",
                self.page_size, MIN_PAGE_SIZE, MAX_PAGE_SIZE
            )));
        }

        if self.writer_lanes == 0 {
            return Err(StorageError::InvalidConfig(
                "writer_lanes must be at least 1".to_string(),
            ));
        }

        if layout::slot_table_len(self.writer_lanes) > READABLE_BITMAP_OFFSET {
            return Err(StorageError::InvalidConfig(format!(
                "{} writer lanes overlap the readable bitmap at byte {}",
                self.writer_lanes, READABLE_BITMAP_OFFSET
            )));
        }

        if self.max_partitions == 0 {
            return Err(StorageError::InvalidConfig(
                "max_partitions must be at least 1".to_string(),
            ));
        }

        if self.max_partitions > crate::core::vpn::UNASSIGNED_PARTITION {
            return Err(StorageError::InvalidConfig(format!(
                "max_partitions {} collides with the unassigned lane marker",
                self.max_partitions
            )));
        }

        if READABLE_BITMAP_OFFSET + self.readable_bitmap_len() > self.page_size {
            return Err(StorageError::InvalidConfig(format!(
                "readable bitmap for {} partitions does not fit in a {} byte page",
                self.max_partitions, self.page_size
            )));
        }

        if (self.writer_lanes as u32) > self.max_partitions as u32 {
            return Err(StorageError::InvalidConfig(format!(
                "{} writer lanes need at least as many partitions (max {})",
                self.writer_lanes, self.max_partitions
            )));
        }

        if self.bitmap_pages == 0 {
            return Err(StorageError::InvalidConfig(
                "bitmap_pages must be at least 1".to_string(),
            ));
        }

        // Master counters are 16-bit
        if self.partition_capacity() > u16::MAX as u32 {
            return Err(StorageError::InvalidConfig(format!(
                "partition capacity {} exceeds the 16-bit master counter",
                self.partition_capacity()
            )));
        }

        Ok(())
    }
}
