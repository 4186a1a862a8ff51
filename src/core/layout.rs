//! On-disk layout helpers
//!
//! Every byte offset used by the engine is computed here.
//!
//! ```text
//! Writer region (per partition)
//! ┌──────────────┬──────────────┬──────────────────┬──────────────┬─────
//! │ master page  │ bitmap pg 0  │ D data pages     │ bitmap pg 1  │ ...
//! │ u16 counter  │ D bits used  │ pages 0..D       │              │
//! └──────────────┴──────────────┴──────────────────┴──────────────┴─────
//!
//! Reader region (per partition)
//! ┌──────────────┬──────────────┬──────────────┬─────
//! │ master page  │ bitmap pg 0  │ bitmap pg 1  │ ...
//! └──────────────┴──────────────┴──────────────┴─────
//!
//! Global metadata page
//! [0, 2W)            active lane slots (u16 each)
//! [2W, 2W+2)         next available partition (u16)
//! [160, 160+M/8)     readable bitmap (1 bit per partition, MSB-first)
//! ```
//!
//! All integers are big-endian.

use crate::core::config::EngineConfig;
use crate::core::error::{Result, StorageError};
use crate::core::vpn::PageIndex;

/// Master counter page is always page 0 of a region
pub const MASTER_PAGE_OFFSET: u64 = 0;

/// Byte offset of the readable bitmap inside the global metadata page
pub const READABLE_BITMAP_OFFSET: usize = 160;

/// Bytes used by the slot table plus the next-partition counter
pub fn slot_table_len(writer_lanes: u16) -> usize {
    writer_lanes as usize * 2 + 2
}

pub fn slot_offset(lane: usize) -> usize {
    lane * 2
}

pub fn next_partition_offset(writer_lanes: u16) -> usize {
    writer_lanes as usize * 2
}

pub fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

pub fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

/// Full master page carrying `count` in its first two bytes
pub fn encode_counter_page(count: u16, page_size: usize) -> Vec<u8> {
    let mut page = vec![0u8; page_size];
    write_u16(&mut page, 0, count);
    page
}

pub fn decode_counter_page(page: &[u8]) -> Result<u16> {
    if page.len() < 2 {
        return Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "Insufficient bytes for master counter",
        )));
    }
    Ok(read_u16(page, 0))
}

/// Page geometry of one partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionLayout {
    pub page_size: usize,
    /// `D`: data pages tracked by one bitmap page
    pub pages_per_bitmap: u32,
    pub bitmap_pages: u16,
}

impl PartitionLayout {
    pub fn from_config(config: &EngineConfig) -> Self {
        PartitionLayout {
            page_size: config.page_size,
            pages_per_bitmap: config.data_pages_per_bitmap(),
            bitmap_pages: config.bitmap_pages,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.pages_per_bitmap * self.bitmap_pages as u32
    }

    /// `(bitmap page, bit within that page)` for a page index
    pub fn locate(&self, page: PageIndex) -> (usize, usize) {
        (
            (page / self.pages_per_bitmap) as usize,
            (page % self.pages_per_bitmap) as usize,
        )
    }

    pub fn page_index(&self, bitmap: usize, bit: usize) -> PageIndex {
        bitmap as u32 * self.pages_per_bitmap + bit as u32
    }

    /// Writer bitmap page `i`: after the master page and `i` earlier groups of
    /// (bitmap page + D data pages)
    pub fn writer_bitmap_offset(&self, bitmap: usize) -> u64 {
        (1 + bitmap as u64 * (self.pages_per_bitmap as u64 + 1)) * self.page_size as u64
    }

    /// `(2 + page / D + page) * P`
    pub fn data_page_offset(&self, page: PageIndex) -> u64 {
        let page = page as u64;
        (2 + page / self.pages_per_bitmap as u64 + page) * self.page_size as u64
    }

    pub fn reader_bitmap_offset(&self, bitmap: usize) -> u64 {
        (1 + bitmap as u64) * self.page_size as u64
    }
}
