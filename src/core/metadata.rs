//! Global metadata page
//!
//! A single page at the root of the database directory recording which
//! partition each writer lane is bound to, the next partition number to hand
//! out, and which partitions hold pages a reader should drain.
//!
//! Every mutation rewrites the complete page in one write call, so a reader of
//! the file never observes half of a slot replacement. Concurrent callers are
//! serialized by a mutex because each call is a read-modify-write of the page.

use crate::core::bits::BitVector;
use crate::core::config::EngineConfig;
use crate::core::error::{Result, StorageError};
use crate::core::io::RegionFile;
use crate::core::layout::{self, MASTER_PAGE_OFFSET, READABLE_BITMAP_OFFSET};
use crate::core::vpn::{PartitionId, UNASSIGNED_PARTITION};
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Decoded contents of the metadata page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalMetadata {
    /// Slot `i` holds the partition currently assigned to writer lane `i`
    pub active_slots: Vec<PartitionId>,

    /// Source of new partition numbers; never decreases
    pub next_available_partition: u16,

    /// One bit per partition id; set means "has pages a reader should drain"
    pub readable: BitVector,
}

impl GlobalMetadata {
    /// Fresh metadata: lanes bound to `0..W`, next partition `W`, nothing readable
    pub fn initial(config: &EngineConfig) -> Self {
        GlobalMetadata {
            active_slots: (0..config.writer_lanes).collect(),
            next_available_partition: config.writer_lanes,
            readable: BitVector::zeroed(config.readable_bitmap_len()),
        }
    }

    pub fn is_readable(&self, partition: PartitionId) -> bool {
        self.readable.get(partition as usize).unwrap_or(false)
    }

    pub fn to_page(&self, page_size: usize) -> Vec<u8> {
        let mut page = vec![0u8; page_size];
        for (lane, &partition) in self.active_slots.iter().enumerate() {
            layout::write_u16(&mut page, layout::slot_offset(lane), partition);
        }
        let lanes = self.active_slots.len() as u16;
        layout::write_u16(
            &mut page,
            layout::next_partition_offset(lanes),
            self.next_available_partition,
        );

        let bitmap = self.readable.as_bytes();
        page[READABLE_BITMAP_OFFSET..READABLE_BITMAP_OFFSET + bitmap.len()]
            .copy_from_slice(bitmap);
        page
    }

    /// Decode and bounds-check a metadata page
    pub fn from_page(page: &[u8], config: &EngineConfig) -> Result<Self> {
        if page.len() < config.page_size {
            return Err(StorageError::CorruptMetadata(format!(
                "metadata page is {} bytes, expected {}",
                page.len(),
                config.page_size
            )));
        }

        let max = config.max_partitions;
        let mut seen = HashSet::new();
        let mut active_slots = Vec::with_capacity(config.writer_lanes as usize);

        for lane in 0..config.writer_lanes as usize {
            let partition = layout::read_u16(page, layout::slot_offset(lane));
            if partition != UNASSIGNED_PARTITION {
                if partition >= max {
                    return Err(StorageError::CorruptMetadata(format!(
                        "lane {} holds partition {} (max {})",
                        lane, partition, max
                    )));
                }
                if !seen.insert(partition) {
                    return Err(StorageError::CorruptMetadata(format!(
                        "partition {} bound to more than one lane",
                        partition
                    )));
                }
            }
            active_slots.push(partition);
        }

        let next_available_partition =
            layout::read_u16(page, layout::next_partition_offset(config.writer_lanes));
        if next_available_partition >= UNASSIGNED_PARTITION {
            return Err(StorageError::CorruptMetadata(format!(
                "next available partition {} out of range",
                next_available_partition
            )));
        }

        let len = config.readable_bitmap_len();
        let readable = BitVector::from_bytes(
            page[READABLE_BITMAP_OFFSET..READABLE_BITMAP_OFFSET + len].to_vec(),
        );
        if let Some(bit) = readable.first_one_from(max as usize) {
            return Err(StorageError::CorruptMetadata(format!(
                "readable bit {} set beyond {} partitions",
                bit, max
            )));
        }

        Ok(GlobalMetadata {
            active_slots,
            next_available_partition,
            readable,
        })
    }
}

struct MetadataInner {
    meta: GlobalMetadata,
    file: RegionFile,
}

impl MetadataInner {
    /// Write `next` as the whole page, then adopt it in memory
    fn commit(&mut self, next: GlobalMetadata, page_size: usize) -> Result<()> {
        self.file
            .write_page_at(MASTER_PAGE_OFFSET, &next.to_page(page_size))?;
        self.meta = next;
        Ok(())
    }
}

/// Owner of the global metadata page
pub struct GlobalMetadataStore {
    inner: Mutex<MetadataInner>,
    page_size: usize,
    max_partitions: u16,
}

impl GlobalMetadataStore {
    /// Load the metadata page, initialising and persisting it if the file is empty
    pub fn open(config: &EngineConfig) -> Result<Self> {
        let mut file = RegionFile::open_or_create(config.meta_path(), config.page_size)?;
        let len = file.len()?;

        let meta = if len == 0 {
            let meta = GlobalMetadata::initial(config);
            file.write_page_at(MASTER_PAGE_OFFSET, &meta.to_page(config.page_size))?;
            info!(
                "Initialised global metadata with {} lanes at {:?}",
                config.writer_lanes,
                file.path()
            );
            meta
        } else if len < config.page_size as u64 {
            return Err(StorageError::CorruptMetadata(format!(
                "metadata file is {} bytes, shorter than one page",
                len
            )));
        } else {
            let mut page = vec![0u8; config.page_size];
            file.read_page_at(MASTER_PAGE_OFFSET, &mut page)?;
            let meta = GlobalMetadata::from_page(&page, config)?;
            info!(
                "Loaded global metadata: lanes {:?}, next partition {}",
                meta.active_slots, meta.next_available_partition
            );
            meta
        };

        Ok(GlobalMetadataStore {
            inner: Mutex::new(MetadataInner { meta, file }),
            page_size: config.page_size,
            max_partitions: config.max_partitions,
        })
    }

    /// Rebind every lane holding `old` to `new`
    ///
    /// A no-op when `new` is already bound to some lane, which keeps
    /// rehydration after a restart idempotent. Otherwise advances the next
    /// available partition to `max(current, new) + 1`, marks `new` readable,
    /// and rewrites the whole page once.
    pub fn reassign_slot(&self, old: PartitionId, new: PartitionId) -> Result<()> {
        self.check_partition(new)?;

        let mut inner = self.inner.lock();
        if inner.meta.active_slots.contains(&new) {
            warn!("Partition {} is already active, ignoring reassignment", new);
            return Ok(());
        }

        let mut next = inner.meta.clone();
        let mut replaced = 0;
        for slot in next.active_slots.iter_mut().filter(|s| **s == old) {
            *slot = new;
            replaced += 1;
        }

        let counter = next.next_available_partition.max(new).saturating_add(1);
        next.next_available_partition = counter.min(UNASSIGNED_PARTITION - 1);
        next.readable.set(new as usize, true)?;
        inner.commit(next, self.page_size)?;

        info!(
            "Reassigned {} lane(s) from partition {} to {}, next available {}",
            replaced, old, new, inner.meta.next_available_partition
        );
        Ok(())
    }

    /// Set the readable bit of `partition` and persist the page
    pub fn mark_readable(&self, partition: PartitionId) -> Result<()> {
        self.set_readable(partition, true)
    }

    /// Clear the readable bit of `partition` and persist the page
    pub fn mark_not_readable(&self, partition: PartitionId) -> Result<()> {
        self.set_readable(partition, false)
    }

    fn set_readable(&self, partition: PartitionId, value: bool) -> Result<()> {
        self.check_partition(partition)?;

        let mut inner = self.inner.lock();
        let mut next = inner.meta.clone();
        next.readable.set(partition as usize, value)?;
        inner.commit(next, self.page_size)?;
        debug!("Partition {} readable = {}", partition, value);
        Ok(())
    }

    pub fn is_readable(&self, partition: PartitionId) -> bool {
        self.inner.lock().meta.is_readable(partition)
    }

    /// Lowest readable partition id `>= from`
    pub fn next_readable_partition(&self, from: PartitionId) -> Option<PartitionId> {
        let inner = self.inner.lock();
        inner
            .meta
            .readable
            .first_one_from(from as usize)
            .filter(|&p| p < self.max_partitions as usize)
            .map(|p| p as PartitionId)
    }

    pub fn active_slots(&self) -> Vec<PartitionId> {
        self.inner.lock().meta.active_slots.clone()
    }

    pub fn next_available_partition(&self) -> u16 {
        self.inner.lock().meta.next_available_partition
    }

    /// Copy of the current in-memory metadata
    pub fn snapshot(&self) -> GlobalMetadata {
        self.inner.lock().meta.clone()
    }

    /// Force the metadata page durable
    pub fn sync(&self) -> Result<()> {
        self.inner.lock().file.sync()
    }

    fn check_partition(&self, partition: PartitionId) -> Result<()> {
        if partition >= self.max_partitions {
            return Err(StorageError::OutOfRange {
                index: partition as u64,
                len: self.max_partitions as u64,
            });
        }
        Ok(())
    }
}
