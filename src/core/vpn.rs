//! Virtual page numbers
//!
//! The only address type exposed across the engine boundary. A VPN packs a
//! partition id and a page index into one integer:
//!
//! ```text
//! vpn = partition * VPN_BASE + page      (0 <= page < VPN_BASE)
//! ```

use crate::core::error::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Partition number. Stored on disk as a 16-bit value.
pub type PartitionId = u16;

/// Page index inside one partition
pub type PageIndex = u32;

/// Strictly larger than any legal page index
pub const VPN_BASE: u64 = 10_000_000_000;

/// Slot marker for "no partition bound to this lane yet"
pub const UNASSIGNED_PARTITION: PartitionId = 0x8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VirtualPageNumber(u64);

impl VirtualPageNumber {
    /// Never produced by `encode`; for callers that need a flat sentinel
    pub const INVALID: VirtualPageNumber = VirtualPageNumber(u64::MAX);

    pub fn encode(partition: PartitionId, page: PageIndex) -> Self {
        VirtualPageNumber(partition as u64 * VPN_BASE + page as u64)
    }

    /// Split into `(partition, page)`
    ///
    /// Fails with `OutOfRange` when either component does not fit its type,
    /// so a stray raw value can never alias a real page.
    pub fn decode(self) -> Result<(PartitionId, PageIndex)> {
        let partition = PartitionId::try_from(self.partition()).map_err(|_| {
            StorageError::OutOfRange {
                index: self.partition(),
                len: PartitionId::MAX as u64 + 1,
            }
        })?;
        let page = PageIndex::try_from(self.page()).map_err(|_| StorageError::OutOfRange {
            index: self.page(),
            len: PageIndex::MAX as u64 + 1,
        })?;
        Ok((partition, page))
    }

    /// Raw partition component (`vpn / VPN_BASE`)
    pub fn partition(self) -> u64 {
        self.0 / VPN_BASE
    }

    /// Raw page component (`vpn % VPN_BASE`)
    pub fn page(self) -> u64 {
        self.0 % VPN_BASE
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID && self.decode().is_ok()
    }

    pub fn from_raw(raw: u64) -> Self {
        VirtualPageNumber(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<VirtualPageNumber> for u64 {
    fn from(vpn: VirtualPageNumber) -> u64 {
        vpn.0
    }
}

impl fmt::Display for VirtualPageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.partition(), self.page())
    }
}
