//! Buffer manager routing page access through the buffer pool.
//!
//! All page I/O goes through the pool: pages are fetched into frames,
//! pinned while a caller reads or mutates them, marked dirty on unpin, and
//! written back lazily on eviction or explicitly on `flush_file`.

use crate::file::PagedFile;
use log::debug;
use oxbow_buffer::{BufferFrame, BufferPool, BufferPoolConfig};
use oxbow_common::page::{PageId, PageNo, PAGE_SIZE};
use oxbow_common::{OxbowError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Buffer manager: the pinning page cache shared by all storage components.
///
/// Every `alloc_page`/`fetch_page` pins the returned frame; the caller must
/// match each pin with exactly one `unpin_page` carrying the correct dirty
/// flag. Unpinned dirty pages are written back when evicted and on
/// `flush_file`.
pub struct BufferManager {
    /// The frame pool.
    pool: BufferPool,
    /// Open files by file ID, so evicted dirty pages can be written back.
    files: Mutex<HashMap<u32, Arc<PagedFile>>>,
}

impl BufferManager {
    /// Creates a buffer manager with the given pool configuration.
    pub fn new(config: BufferPoolConfig) -> Self {
        Self {
            pool: BufferPool::new(config),
            files: Mutex::new(HashMap::new()),
        }
    }

    /// Registers an open file so its evicted pages can be written back.
    pub fn register_file(&self, file: &Arc<PagedFile>) {
        self.files.lock().insert(file.file_id(), Arc::clone(file));
    }

    /// Forgets a file registration. Dirty pages must be flushed first.
    pub fn unregister_file(&self, file_id: u32) {
        self.files.lock().remove(&file_id);
    }

    /// Returns the underlying pool's statistics.
    pub fn stats(&self) -> oxbow_buffer::BufferPoolStats {
        self.pool.stats()
    }

    /// Writes an evicted dirty page back to its owning file.
    fn write_back(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let file = self
            .files
            .lock()
            .get(&page_id.file_id)
            .cloned()
            .ok_or(OxbowError::PageNotFound {
                file_id: page_id.file_id,
                page_no: page_id.page_no,
            })?;
        file.write_page(page_id.page_no, data)
    }

    /// Allocates a new page in the file and pins it in the pool.
    ///
    /// The returned frame is zeroed. The caller must unpin it.
    pub fn alloc_page(&self, file: &PagedFile) -> Result<(PageNo, &BufferFrame)> {
        let page_no = file.allocate_page()?;
        let page_id = PageId::new(file.file_id(), page_no);

        let (frame, evicted) = self.pool.new_page(page_id)?;
        if let Some(ev) = evicted {
            self.write_back(ev.page_id, &ev.data)?;
        }

        debug!("allocated page {}", page_id);
        Ok((page_no, frame))
    }

    /// Fetches a page, pinning it in the pool.
    ///
    /// Reads from disk on a pool miss. The caller must unpin the frame.
    pub fn fetch_page(&self, file: &PagedFile, page_no: PageNo) -> Result<&BufferFrame> {
        let page_id = PageId::new(file.file_id(), page_no);

        if let Some(frame) = self.pool.fetch_page(page_id) {
            return Ok(frame);
        }

        let disk_data = file.read_page(page_no)?;
        let (frame, evicted) = self.pool.load_page(page_id, &disk_data)?;
        if let Some(ev) = evicted {
            self.write_back(ev.page_id, &ev.data)?;
        }

        Ok(frame)
    }

    /// Returns the frame of a page the caller already holds pinned,
    /// without adding another pin.
    pub fn pinned_page(&self, file: &PagedFile, page_no: PageNo) -> Result<&BufferFrame> {
        let page_id = PageId::new(file.file_id(), page_no);
        self.pool.peek_page(page_id).ok_or(OxbowError::PageNotFound {
            file_id: page_id.file_id,
            page_no,
        })
    }

    /// Unpins a page, recording whether the caller modified it.
    pub fn unpin_page(&self, file: &PagedFile, page_no: PageNo, dirty: bool) {
        let page_id = PageId::new(file.file_id(), page_no);
        self.pool.unpin_page(page_id, dirty);
    }

    /// Writes all of a file's dirty pages through to disk and fsyncs.
    pub fn flush_file(&self, file: &PagedFile) -> Result<()> {
        let flushed = self
            .pool
            .flush_file(file.file_id(), |page_id, data| {
                let buf: &[u8; PAGE_SIZE] = data
                    .try_into()
                    .map_err(|_| OxbowError::Internal("bad page buffer size".to_string()))?;
                file.write_page(page_id.page_no, buf)
            })?;
        file.sync()?;
        debug!("flushed {} pages of file {}", flushed, file.file_id());
        Ok(())
    }
}
