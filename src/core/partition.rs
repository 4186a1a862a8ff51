//! Per-partition page store
//!
//! A partition owns two region files:
//!
//! - the writer region: master counter, writer bitmap page(s), data pages
//! - the reader region: master counter, reader bitmap page(s)
//!
//! Each data page slot carries two independent bits. The writer bit moves
//! `Free -> Allocated` and never back; the reader bit moves `NotReady -> Ready`
//! when a written page is handed to the reader and back to `NotReady` when the
//! reader commits its offset.
//!
//! Counters are always recomputed from the bitmaps after a mutation instead of
//! being incremented, so a counter left stale by a crash between the bitmap
//! write and the counter write is corrected by the next mutation of that region.
//!
//! The store is not internally synchronized: one writer and one reader per
//! partition, and callers must not mutate the same store from two threads.

use crate::core::bits::BitVector;
use crate::core::config::EngineConfig;
use crate::core::error::{Result, StorageError};
use crate::core::io::RegionFile;
use crate::core::layout::{
    decode_counter_page, encode_counter_page, PartitionLayout, MASTER_PAGE_OFFSET,
};
use crate::core::vpn::{PageIndex, PartitionId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const WRITER_FILE: &str = "writer.part";
const READER_FILE: &str = "reader.idx";

/// Result of a successful offset commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Other pages are still waiting for the reader
    Pending,
    /// The reader bitmap is now empty
    Drained,
}

/// Point-in-time counters of one partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStats {
    pub partition: PartitionId,
    pub allocated_pages: u16,
    pub unread_pages: u16,
    pub capacity: u32,
}

/// Which of the two regions an operation touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Writer,
    Reader,
}

pub struct PartitionStore {
    id: PartitionId,
    layout: PartitionLayout,
    writer: RegionFile,
    reader: RegionFile,
    writer_counter: u16,
    writer_bitmaps: Vec<BitVector>,
    reader_counter: u16,
    reader_bitmaps: Vec<BitVector>,
}

impl PartitionStore {
    /// Open partition `id` under the configured root
    ///
    /// Empty regions are initialised with zero counters and zeroed bitmap
    /// pages; existing regions are loaded from disk.
    pub fn open(config: &EngineConfig, id: PartitionId) -> Result<Self> {
        let dir = config.partition_dir(id);
        std::fs::create_dir_all(&dir)?;

        let layout = PartitionLayout::from_config(config);
        let mut writer = RegionFile::open_or_create(dir.join(WRITER_FILE), layout.page_size)?;
        let mut reader = RegionFile::open_or_create(dir.join(READER_FILE), layout.page_size)?;

        let (writer_counter, writer_bitmaps) = load_region(&mut writer, &layout, Side::Writer)?;
        let (reader_counter, reader_bitmaps) = load_region(&mut reader, &layout, Side::Reader)?;

        let store = PartitionStore {
            id,
            layout,
            writer,
            reader,
            writer_counter,
            writer_bitmaps,
            reader_counter,
            reader_bitmaps,
        };

        if store.writer_counter as u64 != store.popcount(Side::Writer) {
            warn!(
                "Partition {} writer counter {} is stale (bitmap holds {})",
                id,
                store.writer_counter,
                store.popcount(Side::Writer)
            );
        }
        if store.reader_counter as u64 != store.popcount(Side::Reader) {
            warn!(
                "Partition {} reader counter {} is stale (bitmap holds {})",
                id,
                store.reader_counter,
                store.popcount(Side::Reader)
            );
        }

        info!(
            "Opened partition {}: {} allocated, {} unread",
            id, store.writer_counter, store.reader_counter
        );
        Ok(store)
    }

    /// Allocate the lowest free data page
    ///
    /// Returns `PartitionFull` once the writer counter reaches capacity; the
    /// caller is responsible for moving to a new partition. A counter that
    /// reports room while no writer bitmap has a zero bit is an
    /// `InvariantViolation` and is not repaired here.
    pub fn allocate(&mut self) -> Result<PageIndex> {
        if self.writer_counter as u32 >= self.layout.capacity() {
            return Err(StorageError::PartitionFull { partition: self.id });
        }

        let d = self.layout.pages_per_bitmap as usize;
        let free = self.writer_bitmaps.iter().enumerate().find_map(|(i, bitmap)| {
            bitmap
                .first_zero_from(0)
                .filter(|&bit| bit < d)
                .map(|bit| (i, bit))
        });

        let (bitmap, bit) = free.ok_or_else(|| StorageError::InvariantViolation {
            partition: self.id,
            detail: format!(
                "writer counter {} reports free pages but every bitmap is full",
                self.writer_counter
            ),
        })?;

        self.update_bit(Side::Writer, bitmap, bit, true)?;

        let page = self.layout.page_index(bitmap, bit);
        debug!("Partition {} allocated page {}", self.id, page);
        Ok(page)
    }

    /// Write one full page and force it durable
    pub fn write(&mut self, page: PageIndex, bytes: &[u8]) -> Result<()> {
        self.check_page_size(bytes.len())?;
        self.check_page(page)?;
        if !self.is_allocated(page) {
            return Err(StorageError::UnallocatedPage {
                partition: self.id,
                page,
            });
        }

        let offset = self.layout.data_page_offset(page);
        self.writer.write_page_durable(offset, bytes)?;
        debug!("Partition {} wrote page {}", self.id, page);
        Ok(())
    }

    /// Read one full page into `out`
    ///
    /// The page must be allocated and handed to the reader.
    pub fn read(&mut self, page: PageIndex, out: &mut [u8]) -> Result<()> {
        self.check_page_size(out.len())?;
        self.check_page(page)?;
        if !self.is_readable(page) || !self.is_allocated(page) {
            return Err(StorageError::UnallocatedPage {
                partition: self.id,
                page,
            });
        }

        let offset = self.layout.data_page_offset(page);
        self.writer.read_page_at(offset, out)?;
        debug!("Partition {} read page {}", self.id, page);
        Ok(())
    }

    /// Hand a written page to the reader (idempotent)
    pub fn mark_page_readable(&mut self, page: PageIndex) -> Result<()> {
        self.check_page(page)?;
        if !self.is_allocated(page) {
            return Err(StorageError::UnallocatedPage {
                partition: self.id,
                page,
            });
        }
        if self.is_readable(page) {
            return Ok(());
        }

        let (bitmap, bit) = self.layout.locate(page);
        self.update_bit(Side::Reader, bitmap, bit, true)
    }

    /// Reader-side free: clear the reader bit of a consumed page
    ///
    /// Committing a page whose reader bit is already clear is a double free
    /// and fails with `AlreadyCommitted`.
    pub fn commit_offset(&mut self, page: PageIndex) -> Result<CommitOutcome> {
        self.check_page(page)?;
        if !self.is_readable(page) {
            return Err(StorageError::AlreadyCommitted {
                partition: self.id,
                page,
            });
        }

        let (bitmap, bit) = self.layout.locate(page);
        self.update_bit(Side::Reader, bitmap, bit, false)?;

        debug!(
            "Partition {} committed page {}, {} unread",
            self.id, page, self.reader_counter
        );

        if self.reader_counter == 0 {
            Ok(CommitOutcome::Drained)
        } else {
            Ok(CommitOutcome::Pending)
        }
    }

    /// Lowest page `>= from` waiting for the reader
    pub fn next_readable_page(&self, from: PageIndex) -> Option<PageIndex> {
        if from >= self.layout.capacity() {
            return None;
        }

        let d = self.layout.pages_per_bitmap as usize;
        let (first, start) = self.layout.locate(from);
        (first..self.reader_bitmaps.len()).find_map(|i| {
            let start = if i == first { start } else { 0 };
            self.reader_bitmaps[i]
                .first_one_from(start)
                .filter(|&bit| bit < d)
                .map(|bit| self.layout.page_index(i, bit))
        })
    }

    /// Consistency check: counters match bitmaps and every unread page is allocated
    pub fn verify(&self) -> Result<()> {
        let allocated = self.popcount(Side::Writer);
        if self.writer_counter as u64 != allocated {
            return Err(self.violation(format!(
                "writer counter {} but writer bitmap holds {}",
                self.writer_counter, allocated
            )));
        }

        let unread = self.popcount(Side::Reader);
        if self.reader_counter as u64 != unread {
            return Err(self.violation(format!(
                "reader counter {} but reader bitmap holds {}",
                self.reader_counter, unread
            )));
        }

        for (i, (writer, reader)) in self
            .writer_bitmaps
            .iter()
            .zip(&self.reader_bitmaps)
            .enumerate()
        {
            let orphan = writer
                .as_bytes()
                .iter()
                .zip(reader.as_bytes())
                .position(|(w, r)| r & !w != 0);
            if let Some(byte) = orphan {
                return Err(self.violation(format!(
                    "reader bit set without writer bit in bitmap {} near bit {}",
                    i,
                    byte * 8
                )));
            }
        }

        Ok(())
    }

    pub fn id(&self) -> PartitionId {
        self.id
    }

    pub fn writer_counter(&self) -> u16 {
        self.writer_counter
    }

    pub fn reader_counter(&self) -> u16 {
        self.reader_counter
    }

    pub fn capacity(&self) -> u32 {
        self.layout.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.writer_counter as u32 >= self.layout.capacity()
    }

    pub fn has_unread_pages(&self) -> bool {
        self.reader_counter > 0
    }

    pub fn is_allocated(&self, page: PageIndex) -> bool {
        self.bit(Side::Writer, page)
    }

    pub fn is_readable(&self, page: PageIndex) -> bool {
        self.bit(Side::Reader, page)
    }

    pub fn stats(&self) -> PartitionStats {
        PartitionStats {
            partition: self.id,
            allocated_pages: self.writer_counter,
            unread_pages: self.reader_counter,
            capacity: self.layout.capacity(),
        }
    }

    /// Force both regions durable, including bitmap and counter pages
    pub fn sync(&mut self) -> Result<()> {
        self.writer.sync()?;
        self.reader.sync()
    }

    fn bitmaps(&self, side: Side) -> &[BitVector] {
        match side {
            Side::Writer => &self.writer_bitmaps,
            Side::Reader => &self.reader_bitmaps,
        }
    }

    fn bit(&self, side: Side, page: PageIndex) -> bool {
        if page >= self.layout.capacity() {
            return false;
        }
        let (bitmap, bit) = self.layout.locate(page);
        self.bitmaps(side)[bitmap].get(bit).unwrap_or(false)
    }

    fn popcount(&self, side: Side) -> u64 {
        self.bitmaps(side).iter().map(BitVector::count_set_bits).sum()
    }

    /// Flip one bit and persist the bitmap page, then the master counter page
    ///
    /// The in-memory bitmap and counter only change once both writes have
    /// succeeded. A failure between the two writes leaves a stale counter on
    /// disk, which the next mutation of this region rewrites.
    fn update_bit(&mut self, side: Side, bitmap: usize, bit: usize, value: bool) -> Result<()> {
        let mut updated = self.bitmaps(side)[bitmap].clone();
        updated.set(bit, value)?;

        let counter = self
            .bitmaps(side)
            .iter()
            .enumerate()
            .map(|(i, b)| {
                if i == bitmap {
                    updated.count_set_bits()
                } else {
                    b.count_set_bits()
                }
            })
            .sum::<u64>() as u16;

        let page_size = self.layout.page_size;
        let (file, offset) = match side {
            Side::Writer => (&mut self.writer, self.layout.writer_bitmap_offset(bitmap)),
            Side::Reader => (&mut self.reader, self.layout.reader_bitmap_offset(bitmap)),
        };
        file.write_page_at(offset, updated.as_bytes())?;
        file.write_page_at(MASTER_PAGE_OFFSET, &encode_counter_page(counter, page_size))?;

        match side {
            Side::Writer => {
                self.writer_bitmaps[bitmap] = updated;
                self.writer_counter = counter;
            }
            Side::Reader => {
                self.reader_bitmaps[bitmap] = updated;
                self.reader_counter = counter;
            }
        }
        Ok(())
    }

    fn check_page(&self, page: PageIndex) -> Result<()> {
        if page >= self.layout.capacity() {
            return Err(StorageError::OutOfRange {
                index: page as u64,
                len: self.layout.capacity() as u64,
            });
        }
        Ok(())
    }

    fn check_page_size(&self, len: usize) -> Result<()> {
        if len != self.layout.page_size {
            return Err(StorageError::InvalidPageSize {
                expected: self.layout.page_size,
                actual: len,
            });
        }
        Ok(())
    }

    fn violation(&self, detail: String) -> StorageError {
        StorageError::InvariantViolation {
            partition: self.id,
            detail,
        }
    }
}

/// Load (or initialise) one region's counter and bitmap pages
fn load_region(
    file: &mut RegionFile,
    layout: &PartitionLayout,
    side: Side,
) -> Result<(u16, Vec<BitVector>)> {
    let offset_of = |i: usize| match side {
        Side::Writer => layout.writer_bitmap_offset(i),
        Side::Reader => layout.reader_bitmap_offset(i),
    };

    if file.is_empty()? {
        let zeroed = vec![0u8; layout.page_size];
        file.write_page_at(MASTER_PAGE_OFFSET, &encode_counter_page(0, layout.page_size))?;
        for i in 0..layout.bitmap_pages as usize {
            file.write_page_at(offset_of(i), &zeroed)?;
        }
        let bitmaps = (0..layout.bitmap_pages)
            .map(|_| BitVector::zeroed(layout.page_size))
            .collect();
        return Ok((0, bitmaps));
    }

    let counter = decode_counter_page(&file.read_page_or_zeroed(MASTER_PAGE_OFFSET)?)?;
    let bitmaps = (0..layout.bitmap_pages as usize)
        .map(|i| file.read_page_or_zeroed(offset_of(i)).map(BitVector::from_bytes))
        .collect::<Result<Vec<_>>>()?;
    Ok((counter, bitmaps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(temp: &TempDir) -> EngineConfig {
        let mut config = EngineConfig::new(temp.path());
        config.page_size = 256;
        config
    }

    #[test]
    fn test_open_initialises_regions() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        let store = PartitionStore::open(&config, 0).unwrap();

        assert_eq!(store.writer_counter(), 0);
        assert_eq!(store.reader_counter(), 0);
        assert_eq!(store.capacity(), 1024);
        assert!(!store.is_full());

        let dir = config.partition_dir(0);
        // master + one bitmap page each
        assert_eq!(std::fs::metadata(dir.join(WRITER_FILE)).unwrap().len(), 512);
        assert_eq!(std::fs::metadata(dir.join(READER_FILE)).unwrap().len(), 512);
    }

    #[test]
    fn test_allocate_lowest_first() {
        let temp = TempDir::new().unwrap();
        let mut store = PartitionStore::open(&config(&temp), 0).unwrap();

        for expected in 0..20 {
            assert_eq!(store.allocate().unwrap(), expected);
        }
        assert_eq!(store.writer_counter(), 20);
        assert!(store.is_allocated(19));
        assert!(!store.is_allocated(20));
        store.verify().unwrap();
    }

    #[test]
    fn test_partition_full() {
        let temp = TempDir::new().unwrap();
        let mut store = PartitionStore::open(&config(&temp), 2).unwrap();

        for _ in 0..1024 {
            store.allocate().unwrap();
        }
        assert!(store.is_full());
        assert!(matches!(
            store.allocate(),
            Err(StorageError::PartitionFull { partition: 2 })
        ));
    }

    #[test]
    fn test_multiple_bitmap_pages() {
        let temp = TempDir::new().unwrap();
        let mut config = config(&temp);
        config.bitmap_pages = 2;
        let mut store = PartitionStore::open(&config, 0).unwrap();
        assert_eq!(store.capacity(), 2048);

        for expected in 0..2048 {
            assert_eq!(store.allocate().unwrap(), expected);
        }
        assert!(matches!(
            store.allocate(),
            Err(StorageError::PartitionFull { .. })
        ));

        // page in the second group round-trips
        let data = vec![0x5Au8; 256];
        store.write(1500, &data).unwrap();
        store.mark_page_readable(1500).unwrap();
        let mut out = vec![0u8; 256];
        store.read(1500, &mut out).unwrap();
        assert_eq!(out, data);
        store.verify().unwrap();
    }

    #[test]
    fn test_write_read_round_trip() {
        let temp = TempDir::new().unwrap();
        let mut store = PartitionStore::open(&config(&temp), 0).unwrap();

        let page = store.allocate().unwrap();
        let data: Vec<u8> = (0..256).map(|i| i as u8).collect();
        store.write(page, &data).unwrap();
        store.mark_page_readable(page).unwrap();

        let mut out = vec![0u8; 256];
        store.read(page, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_write_unallocated_page() {
        let temp = TempDir::new().unwrap();
        let mut store = PartitionStore::open(&config(&temp), 0).unwrap();

        assert!(matches!(
            store.write(3, &[0u8; 256]),
            Err(StorageError::UnallocatedPage { page: 3, .. })
        ));
    }

    #[test]
    fn test_page_beyond_capacity_rejected() {
        let temp = TempDir::new().unwrap();
        let mut store = PartitionStore::open(&config(&temp), 0).unwrap();
        store.allocate().unwrap();

        assert!(matches!(
            store.write(5000, &[0u8; 256]),
            Err(StorageError::OutOfRange { index: 5000, len: 1024 })
        ));
        let mut out = vec![0u8; 256];
        assert!(matches!(
            store.read(1024, &mut out),
            Err(StorageError::OutOfRange { index: 1024, .. })
        ));
        assert!(matches!(
            store.mark_page_readable(u32::MAX),
            Err(StorageError::OutOfRange { .. })
        ));
        assert!(matches!(
            store.commit_offset(1024),
            Err(StorageError::OutOfRange { .. })
        ));
        assert_eq!(store.reader_counter(), 0);
    }

    #[test]
    fn test_failed_bitmap_write_leaves_state_unchanged() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        let writer_path = config.partition_dir(0).join(WRITER_FILE);
        let reader_path = config.partition_dir(0).join(READER_FILE);
        let mut store = PartitionStore::open(&config, 0).unwrap();
        assert_eq!(store.allocate().unwrap(), 0);
        store.mark_page_readable(0).unwrap();

        // read-only handles make every write fail with an I/O error
        store.writer = RegionFile::open_read_only(&writer_path, 256).unwrap();
        assert!(matches!(store.allocate(), Err(StorageError::Io(_))));
        assert_eq!(store.writer_counter(), 1);
        assert!(!store.is_allocated(1));

        store.reader = RegionFile::open_read_only(&reader_path, 256).unwrap();
        assert!(matches!(store.commit_offset(0), Err(StorageError::Io(_))));
        assert!(store.is_readable(0));
        assert_eq!(store.reader_counter(), 1);

        // the retry hands out the same page instead of skipping it
        store.writer = RegionFile::open_or_create(&writer_path, 256).unwrap();
        store.reader = RegionFile::open_or_create(&reader_path, 256).unwrap();
        assert_eq!(store.allocate().unwrap(), 1);
        assert_eq!(store.commit_offset(0).unwrap(), CommitOutcome::Drained);
        store.verify().unwrap();
        drop(store);

        let store = PartitionStore::open(&config, 0).unwrap();
        assert_eq!(store.writer_counter(), 2);
        assert_eq!(store.reader_counter(), 0);
        store.verify().unwrap();
    }

    #[test]
    fn test_invalid_page_size() {
        let temp = TempDir::new().unwrap();
        let mut store = PartitionStore::open(&config(&temp), 0).unwrap();
        let page = store.allocate().unwrap();

        assert!(matches!(
            store.write(page, &[0u8; 100]),
            Err(StorageError::InvalidPageSize {
                expected: 256,
                actual: 100
            })
        ));
        let mut out = vec![0u8; 4096];
        assert!(matches!(
            store.read(page, &mut out),
            Err(StorageError::InvalidPageSize { .. })
        ));
    }

    #[test]
    fn test_read_requires_reader_bit() {
        let temp = TempDir::new().unwrap();
        let mut store = PartitionStore::open(&config(&temp), 0).unwrap();
        let page = store.allocate().unwrap();
        store.write(page, &[1u8; 256]).unwrap();

        let mut out = vec![0u8; 256];
        assert!(matches!(
            store.read(page, &mut out),
            Err(StorageError::UnallocatedPage { .. })
        ));
    }

    #[test]
    fn test_mark_page_readable_idempotent() {
        let temp = TempDir::new().unwrap();
        let mut store = PartitionStore::open(&config(&temp), 0).unwrap();
        let page = store.allocate().unwrap();

        store.mark_page_readable(page).unwrap();
        store.mark_page_readable(page).unwrap();
        assert_eq!(store.reader_counter(), 1);

        assert!(matches!(
            store.mark_page_readable(page + 1),
            Err(StorageError::UnallocatedPage { .. })
        ));
    }

    #[test]
    fn test_commit_offset_double_free() {
        let temp = TempDir::new().unwrap();
        let mut store = PartitionStore::open(&config(&temp), 0).unwrap();
        let first = store.allocate().unwrap();
        let second = store.allocate().unwrap();
        store.mark_page_readable(first).unwrap();
        store.mark_page_readable(second).unwrap();

        assert_eq!(store.commit_offset(first).unwrap(), CommitOutcome::Pending);
        assert!(matches!(
            store.commit_offset(first),
            Err(StorageError::AlreadyCommitted { page: 0, .. })
        ));
        assert_eq!(store.commit_offset(second).unwrap(), CommitOutcome::Drained);
        assert_eq!(store.reader_counter(), 0);
        // writer capacity is not returned
        assert_eq!(store.writer_counter(), 2);
    }

    #[test]
    fn test_next_readable_page() {
        let temp = TempDir::new().unwrap();
        let mut config = config(&temp);
        config.bitmap_pages = 2;
        let mut store = PartitionStore::open(&config, 0).unwrap();

        for _ in 0..1100 {
            store.allocate().unwrap();
        }
        assert_eq!(store.next_readable_page(0), None);

        store.mark_page_readable(7).unwrap();
        store.mark_page_readable(1050).unwrap();
        assert_eq!(store.next_readable_page(0), Some(7));
        assert_eq!(store.next_readable_page(7), Some(7));
        assert_eq!(store.next_readable_page(8), Some(1050));
        assert_eq!(store.next_readable_page(1051), None);
        assert_eq!(store.next_readable_page(10_000), None);
    }

    #[test]
    fn test_reopen_preserves_state() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        {
            let mut store = PartitionStore::open(&config, 4).unwrap();
            for _ in 0..3 {
                let page = store.allocate().unwrap();
                store.write(page, &[page as u8 + 1; 256]).unwrap();
                store.mark_page_readable(page).unwrap();
            }
            store.commit_offset(0).unwrap();
        }

        let mut store = PartitionStore::open(&config, 4).unwrap();
        assert_eq!(store.writer_counter(), 3);
        assert_eq!(store.reader_counter(), 2);
        assert!(!store.is_readable(0));
        store.verify().unwrap();

        let mut out = vec![0u8; 256];
        store.read(2, &mut out).unwrap();
        assert_eq!(out, vec![3u8; 256]);
        assert_eq!(store.allocate().unwrap(), 3);
    }

    #[test]
    fn test_desynced_counter_is_invariant_violation() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        {
            let mut store = PartitionStore::open(&config, 0).unwrap();
            for _ in 0..1024 {
                store.allocate().unwrap();
            }
        }

        // Counter page claims room while the bitmap is saturated
        let path = config.partition_dir(0).join(WRITER_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0..2].copy_from_slice(&5u16.to_be_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let mut store = PartitionStore::open(&config, 0).unwrap();
        assert!(matches!(
            store.verify(),
            Err(StorageError::InvariantViolation { .. })
        ));
        assert!(matches!(
            store.allocate(),
            Err(StorageError::InvariantViolation { partition: 0, .. })
        ));
    }

    #[test]
    fn test_stale_counter_self_heals_on_allocation() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        {
            let mut store = PartitionStore::open(&config, 0).unwrap();
            for _ in 0..10 {
                store.allocate().unwrap();
            }
        }

        // Simulate a crash between the bitmap write and the counter write
        let path = config.partition_dir(0).join(WRITER_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0..2].copy_from_slice(&9u16.to_be_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let mut store = PartitionStore::open(&config, 0).unwrap();
        assert_eq!(store.writer_counter(), 9);
        assert_eq!(store.allocate().unwrap(), 10);
        assert_eq!(store.writer_counter(), 11);
        store.verify().unwrap();
    }

    #[test]
    fn test_stats() {
        let temp = TempDir::new().unwrap();
        let mut store = PartitionStore::open(&config(&temp), 6).unwrap();
        let page = store.allocate().unwrap();
        store.mark_page_readable(page).unwrap();

        let stats = store.stats();
        assert_eq!(stats.partition, 6);
        assert_eq!(stats.allocated_pages, 1);
        assert_eq!(stats.unread_pages, 1);
        assert_eq!(stats.capacity, 1024);
    }
}
