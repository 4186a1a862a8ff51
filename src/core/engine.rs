//! Storage engine facade
//!
//! Translates virtual page numbers into `(partition, page)` pairs, owns the
//! partition table and routes lane hand-offs through the global metadata.
//!
//! The partition table is safe for concurrent registration from many lanes.
//! Each partition sits behind its own mutex so a shared engine can hand out
//! `&mut` access. Lock order is partition first, then global metadata.

use crate::core::config::EngineConfig;
use crate::core::error::{Result, StorageError};
use crate::core::metadata::GlobalMetadataStore;
use crate::core::partition::{CommitOutcome, PartitionStats, PartitionStore};
use crate::core::vpn::{PageIndex, PartitionId, VirtualPageNumber, UNASSIGNED_PARTITION};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

type SharedPartition = Arc<Mutex<PartitionStore>>;

/// Snapshot of engine-wide counters, suitable for a periodic monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub active_slots: Vec<PartitionId>,
    pub next_available_partition: u16,
    pub readable_partitions: Vec<PartitionId>,
    pub partitions: Vec<PartitionStats>,
}

impl EngineStats {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn allocated_pages(&self) -> u64 {
        self.partitions.iter().map(|p| p.allocated_pages as u64).sum()
    }

    pub fn unread_pages(&self) -> u64 {
        self.partitions.iter().map(|p| p.unread_pages as u64).sum()
    }
}

pub struct StorageEngine {
    config: EngineConfig,
    metadata: GlobalMetadataStore,
    partitions: RwLock<HashMap<PartitionId, SharedPartition>>,
    open_lock: Mutex<()>,
}

impl StorageEngine {
    /// Open the engine rooted at `config.root_dir`
    ///
    /// Loads (or initialises) the global metadata. No partition is registered
    /// yet; see [`StorageEngine::allocate_partition`] and
    /// [`StorageEngine::bootstrap`].
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.root_dir)?;

        let metadata = GlobalMetadataStore::open(&config)?;
        info!(
            "Opened storage engine at {:?} (page size {}, {} lanes)",
            config.root_dir, config.page_size, config.writer_lanes
        );

        Ok(StorageEngine {
            config,
            metadata,
            partitions: RwLock::new(HashMap::new()),
            open_lock: Mutex::new(()),
        })
    }

    /// Register every partition named by the metadata page
    ///
    /// Covers the partitions bound to a lane and those still flagged readable,
    /// loading their on-disk state. Already registered partitions are skipped,
    /// so calling this again after a restart is harmless. Returns the ids that
    /// were newly registered.
    pub fn bootstrap(&self) -> Result<Vec<PartitionId>> {
        let meta = self.metadata.snapshot();
        let mut wanted: BTreeSet<PartitionId> = meta
            .active_slots
            .iter()
            .copied()
            .filter(|&p| p != UNASSIGNED_PARTITION)
            .collect();

        let mut from = 0usize;
        while let Some(p) = meta.readable.first_one_from(from) {
            if p >= self.config.max_partitions as usize {
                break;
            }
            wanted.insert(p as PartitionId);
            from = p + 1;
        }

        let mut registered = Vec::new();
        for id in wanted {
            match self.allocate_partition(id) {
                Ok(id) => registered.push(id),
                Err(StorageError::AlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
        }

        info!("Bootstrapped partitions {:?}", registered);
        Ok(registered)
    }

    /// Open partition `id` and add it to the partition table
    ///
    /// Creates the partition's regions when absent, loads them otherwise.
    /// Fails with `AlreadyExists` if `id` is already registered.
    pub fn allocate_partition(&self, id: PartitionId) -> Result<PartitionId> {
        if id >= self.config.max_partitions {
            return Err(StorageError::OutOfRange {
                index: id as u64,
                len: self.config.max_partitions as u64,
            });
        }

        // one open at a time; the table lock covers only lookup and insert
        let _opening = self.open_lock.lock();
        if self.partitions.read().contains_key(&id) {
            return Err(StorageError::AlreadyExists(id));
        }

        let store = PartitionStore::open(&self.config, id)?;
        match self.partitions.write().entry(id) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(store)));
                info!("Registered partition {}", id);
                Ok(id)
            }
        }
    }

    /// Move every lane bound to `old` onto `new`
    ///
    /// Used by a writer lane whose partition reported full. Idempotent when
    /// `new` is already bound to a lane.
    pub fn retarget_lane(&self, old: PartitionId, new: PartitionId) -> Result<()> {
        self.metadata.reassign_slot(old, new)
    }

    /// Allocate a page in `partition`
    ///
    /// Returns `Ok(None)` when the partition is full: the caller must obtain a
    /// new partition (`allocate_partition` + `retarget_lane`) and retry. The
    /// engine never does this on its own.
    pub fn allocate_page(&self, partition: PartitionId) -> Result<Option<VirtualPageNumber>> {
        let store = self.partition(partition)?;
        let result = store.lock().allocate();
        match result {
            Ok(page) => Ok(Some(VirtualPageNumber::encode(partition, page))),
            Err(StorageError::PartitionFull { .. }) => {
                info!("Partition {} is full", partition);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Write a page durably and hand it to the reader
    pub fn write_page(&self, vpn: VirtualPageNumber, bytes: &[u8]) -> Result<()> {
        let (partition, page) = vpn.decode()?;
        let store = self.partition(partition)?;
        let mut store = store.lock();
        store.write(page, bytes)?;
        store.mark_page_readable(page)?;

        // readable bit only changes under the partition lock
        if !self.metadata.is_readable(partition) {
            self.metadata.mark_readable(partition)?;
        }
        debug!("Wrote {}", vpn);
        Ok(())
    }

    pub fn read_page(&self, vpn: VirtualPageNumber, out: &mut [u8]) -> Result<()> {
        let (partition, page) = vpn.decode()?;
        let store = self.partition(partition)?;
        let result = store.lock().read(page, out);
        result
    }

    /// Write a batch; the page and buffer counts must match
    ///
    /// Pages are written in order and the first failure stops the batch.
    /// Pages written before the failure stay written.
    pub fn write_pages<B: AsRef<[u8]>>(&self, pages: &[VirtualPageNumber], bufs: &[B]) -> Result<()> {
        check_batch(pages.len(), bufs.len())?;
        for (&vpn, buf) in pages.iter().zip(bufs) {
            self.write_page(vpn, buf.as_ref())?;
        }
        Ok(())
    }

    /// Read a batch; the page and buffer counts must match
    pub fn read_pages<B: AsMut<[u8]>>(&self, pages: &[VirtualPageNumber], bufs: &mut [B]) -> Result<()> {
        check_batch(pages.len(), bufs.len())?;
        for (&vpn, buf) in pages.iter().zip(bufs.iter_mut()) {
            self.read_page(vpn, buf.as_mut())?;
        }
        Ok(())
    }

    /// Commit the reader offset for a page
    ///
    /// When this drains the partition, its readable bit in the global
    /// metadata is cleared.
    pub fn free_page(&self, vpn: VirtualPageNumber) -> Result<CommitOutcome> {
        let (partition, page) = vpn.decode()?;
        let store = self.partition(partition)?;
        let mut store = store.lock();
        let outcome = store.commit_offset(page)?;

        if outcome == CommitOutcome::Drained {
            self.metadata.mark_not_readable(partition)?;
            info!("Partition {} drained", partition);
        }
        Ok(outcome)
    }

    /// Lowest unread page of `partition` at or after page `from`
    pub fn next_readable_page(
        &self,
        partition: PartitionId,
        from: PageIndex,
    ) -> Result<Option<VirtualPageNumber>> {
        let store = self.partition(partition)?;
        let next = store.lock().next_readable_page(from);
        Ok(next.map(|page| VirtualPageNumber::encode(partition, page)))
    }

    /// Lowest partition id `>= from` flagged readable in the global metadata
    pub fn next_readable_partition(&self, from: PartitionId) -> Option<PartitionId> {
        self.metadata.next_readable_partition(from)
    }

    /// Run the consistency check over every registered partition
    pub fn verify(&self) -> Result<()> {
        for store in self.shared_partitions() {
            store.lock().verify()?;
        }
        Ok(())
    }

    pub fn stats(&self) -> EngineStats {
        let meta = self.metadata.snapshot();
        let mut partitions: Vec<PartitionStats> = self
            .shared_partitions()
            .iter()
            .map(|store| store.lock().stats())
            .collect();
        partitions.sort_by_key(|s| s.partition);

        let readable_partitions = (0..self.config.max_partitions)
            .filter(|&p| meta.is_readable(p))
            .collect();

        EngineStats {
            active_slots: meta.active_slots,
            next_available_partition: meta.next_available_partition,
            readable_partitions,
            partitions,
        }
    }

    /// Force metadata, bitmap and counter pages durable
    pub fn sync_all(&self) -> Result<()> {
        for store in self.shared_partitions() {
            store.lock().sync()?;
        }
        self.metadata.sync()
    }

    /// Registered partition ids, ascending
    pub fn partition_ids(&self) -> Vec<PartitionId> {
        let mut ids: Vec<PartitionId> = self.partitions.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn active_slots(&self) -> Vec<PartitionId> {
        self.metadata.active_slots()
    }

    pub fn metadata(&self) -> &GlobalMetadataStore {
        &self.metadata
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    fn partition(&self, id: PartitionId) -> Result<SharedPartition> {
        self.partitions
            .read()
            .get(&id)
            .cloned()
            .ok_or(StorageError::UnknownPartition(id))
    }

    fn shared_partitions(&self) -> Vec<SharedPartition> {
        self.partitions.read().values().cloned().collect()
    }
}

fn check_batch(pages: usize, buffers: usize) -> Result<()> {
    if pages != buffers {
        return Err(StorageError::SizeMismatch { pages, buffers });
    }
    Ok(())
}
