//! Page-granular disk I/O for one region file

use crate::core::error::{Result, StorageError};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// One backing file (a writer region, a reader region, or the metadata file)
///
/// Every write covers whole pages and is issued as a single `write_all`.
pub struct RegionFile {
    file: File,
    path: PathBuf,
    page_size: usize,
}

impl RegionFile {
    /// Open the file, creating it empty if it does not exist
    pub fn open_or_create<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        Ok(RegionFile {
            file,
            path: path.as_ref().to_path_buf(),
            page_size,
        })
    }

    /// Open an existing file without write access; every write fails with `Io`
    pub fn open_read_only<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(&path)?;

        Ok(RegionFile {
            file,
            path: path.as_ref().to_path_buf(),
            page_size,
        })
    }

    /// Current file length in bytes
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Read one page at a byte offset
    pub fn read_page_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.check_size(buf.len())?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Read one page, treating bytes past end-of-file as zeros
    pub fn read_page_or_zeroed(&mut self, offset: u64) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; self.page_size];
        let len = self.len()?;
        if offset >= len {
            return Ok(buffer);
        }

        self.file.seek(SeekFrom::Start(offset))?;
        let available = ((len - offset) as usize).min(self.page_size);
        self.file.read_exact(&mut buffer[..available])?;
        Ok(buffer)
    }

    /// Write one page at a byte offset (no flush to stable storage)
    pub fn write_page_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.check_size(data.len())?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.flush()?;
        Ok(())
    }

    /// Write one page and force it durable before returning
    pub fn write_page_durable(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.write_page_at(offset, data)?;
        self.file.sync_data()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sync all writes to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn check_size(&self, len: usize) -> Result<()> {
        if len != self.page_size {
            return Err(StorageError::InvalidPageSize {
                expected: self.page_size,
                actual: len,
            });
        }
        Ok(())
    }
}
