//! Relation files holding fixed-size records.
//!
//! A relation file is a sequence of record pages, each packing as many
//! fixed-size records as fit after a small header. Records are identified
//! by `Rid` (page number + slot) and never move once written, which is what
//! lets a secondary index point at them.
//!
//! Page layout:
//! ```text
//! +--------------------+ 0
//! | record_count: u16  |
//! | reserved           |
//! +--------------------+ 8
//! | record 0           |
//! | record 1           |
//! | ...                |
//! +--------------------+ PAGE_SIZE
//! ```

use crate::bufmgr::BufferManager;
use crate::file::PagedFile;
use bytes::Bytes;
use oxbow_common::page::{PageNo, INVALID_PAGE_NO, PAGE_SIZE};
use oxbow_common::{OxbowError, Result, StorageConfig};
use std::sync::Arc;

/// Size of the record page header in bytes.
const RECORD_PAGE_HEADER: usize = 8;

/// Identifier of a record within a relation file.
///
/// A `page_no` of 0 marks "no record"; index leaf slots use that as their
/// occupancy test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rid {
    /// Page holding the record.
    pub page_no: PageNo,
    /// Slot number within the page.
    pub slot_no: u16,
}

impl Rid {
    /// On-disk size: page_no (4) + slot_no (2) + padding (2).
    pub const SIZE: usize = 8;

    /// The "no record" sentinel.
    pub const INVALID: Rid = Rid {
        page_no: INVALID_PAGE_NO,
        slot_no: 0,
    };

    /// Creates a new record ID.
    pub fn new(page_no: PageNo, slot_no: u16) -> Self {
        Self { page_no, slot_no }
    }

    /// Returns true if this names a real record.
    pub fn is_valid(&self) -> bool {
        self.page_no != INVALID_PAGE_NO
    }

    /// Serializes to the on-disk form.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.page_no.to_le_bytes());
        buf[4..6].copy_from_slice(&self.slot_no.to_le_bytes());
        buf
    }

    /// Deserializes from the on-disk form.
    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            page_no: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            slot_no: u16::from_le_bytes([buf[4], buf[5]]),
        }
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_no, self.slot_no)
    }
}

/// A relation file of fixed-size records with buffer pool caching.
pub struct RelationFile {
    /// Relation name (also the file name within the data directory).
    name: String,
    /// Size of every record in bytes.
    record_size: usize,
    /// Records that fit on one page.
    records_per_page: u16,
    /// The underlying paged file.
    file: Arc<PagedFile>,
    /// Buffer manager for page access.
    bufmgr: Arc<BufferManager>,
}

impl RelationFile {
    /// Creates a new relation file in the configured data directory.
    pub fn create(
        config: &StorageConfig,
        bufmgr: &Arc<BufferManager>,
        name: &str,
        record_size: usize,
    ) -> Result<Self> {
        let file = PagedFile::create(&config.data_dir.join(name), config.fsync_enabled)?;
        Self::with_file(bufmgr, name, record_size, file)
    }

    /// Opens an existing relation file.
    pub fn open(
        config: &StorageConfig,
        bufmgr: &Arc<BufferManager>,
        name: &str,
        record_size: usize,
    ) -> Result<Self> {
        let file = PagedFile::open(&config.data_dir.join(name), config.fsync_enabled)?;
        Self::with_file(bufmgr, name, record_size, file)
    }

    fn with_file(
        bufmgr: &Arc<BufferManager>,
        name: &str,
        record_size: usize,
        file: PagedFile,
    ) -> Result<Self> {
        let max = PAGE_SIZE - RECORD_PAGE_HEADER;
        if record_size == 0 || record_size > max {
            return Err(OxbowError::RecordTooLarge {
                size: record_size,
                max,
            });
        }

        let file = Arc::new(file);
        bufmgr.register_file(&file);

        Ok(Self {
            name: name.to_string(),
            record_size,
            records_per_page: (max / record_size) as u16,
            file,
            bufmgr: Arc::clone(bufmgr),
        })
    }

    /// Returns the relation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fixed record size.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Returns the number of records that fit on one page.
    pub fn records_per_page(&self) -> u16 {
        self.records_per_page
    }

    fn record_offset(&self, slot_no: u16) -> usize {
        RECORD_PAGE_HEADER + slot_no as usize * self.record_size
    }

    fn record_count(data: &[u8]) -> u16 {
        u16::from_le_bytes([data[0], data[1]])
    }

    fn set_record_count(data: &mut [u8], count: u16) {
        data[0..2].copy_from_slice(&count.to_le_bytes());
    }

    /// Appends a record, returning its record ID.
    pub fn insert_record(&self, record: &[u8]) -> Result<Rid> {
        if record.len() != self.record_size {
            return Err(OxbowError::RecordTooLarge {
                size: record.len(),
                max: self.record_size,
            });
        }

        // Try the last page first
        let last_page = self.file.num_pages();
        if last_page != INVALID_PAGE_NO {
            let frame = self.bufmgr.fetch_page(&self.file, last_page)?;
            let count = Self::record_count(&**frame.read_data());
            if count < self.records_per_page {
                let offset = self.record_offset(count);
                {
                    let mut data = frame.write_data();
                    data[offset..offset + self.record_size].copy_from_slice(record);
                    Self::set_record_count(&mut **data, count + 1);
                }
                self.bufmgr.unpin_page(&self.file, last_page, true);
                return Ok(Rid::new(last_page, count));
            }
            self.bufmgr.unpin_page(&self.file, last_page, false);
        }

        // Last page full (or no pages yet): start a new one
        let (page_no, frame) = self.bufmgr.alloc_page(&self.file)?;
        let offset = self.record_offset(0);
        {
            let mut data = frame.write_data();
            data[offset..offset + self.record_size].copy_from_slice(record);
            Self::set_record_count(&mut **data, 1);
        }
        self.bufmgr.unpin_page(&self.file, page_no, true);
        Ok(Rid::new(page_no, 0))
    }

    /// Reads the record named by `rid`.
    pub fn get_record(&self, rid: Rid) -> Result<Bytes> {
        let frame = self.bufmgr.fetch_page(&self.file, rid.page_no)?;
        let result = {
            let data = frame.read_data();
            let count = Self::record_count(&**data);
            if rid.slot_no >= count {
                Err(OxbowError::RecordNotFound(rid.to_string()))
            } else {
                let offset = self.record_offset(rid.slot_no);
                Ok(Bytes::copy_from_slice(
                    &data[offset..offset + self.record_size],
                ))
            }
        };
        self.bufmgr.unpin_page(&self.file, rid.page_no, false);
        result
    }

    /// Starts a sequential scan over all records.
    pub fn scan(&self) -> RelationScan<'_> {
        RelationScan {
            relation: self,
            next_page: 1,
            next_slot: 0,
        }
    }

    /// Flushes all dirty pages of this relation to disk.
    pub fn flush(&self) -> Result<()> {
        self.bufmgr.flush_file(&self.file)
    }
}

/// Sequential scan over a relation file, yielding `(Rid, record)` pairs.
///
/// `next_entry` fails with `EndOfFile` once the last record has been
/// returned; callers treat that as normal completion.
pub struct RelationScan<'a> {
    relation: &'a RelationFile,
    next_page: PageNo,
    next_slot: u16,
}

impl RelationScan<'_> {
    /// Returns the next record and its ID, or `EndOfFile` when exhausted.
    pub fn next_entry(&mut self) -> Result<(Rid, Bytes)> {
        loop {
            if self.next_page > self.relation.file.num_pages() {
                return Err(OxbowError::EndOfFile);
            }

            let frame = self
                .relation
                .bufmgr
                .fetch_page(&self.relation.file, self.next_page)?;

            let entry = {
                let data = frame.read_data();
                let count = RelationFile::record_count(&**data);
                if self.next_slot < count {
                    let offset = self.relation.record_offset(self.next_slot);
                    Some(Bytes::copy_from_slice(
                        &data[offset..offset + self.relation.record_size],
                    ))
                } else {
                    None
                }
            };
            self.relation
                .bufmgr
                .unpin_page(&self.relation.file, self.next_page, false);

            match entry {
                Some(record) => {
                    let rid = Rid::new(self.next_page, self.next_slot);
                    self.next_slot += 1;
                    return Ok((rid, record));
                }
                None => {
                    self.next_page += 1;
                    self.next_slot = 0;
                }
            }
        }
    }
}
