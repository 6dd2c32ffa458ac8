//! Buffer pool manager.

use crate::frame::{BufferFrame, FrameId};
use crate::page_table::PageTable;
use crate::replacer::ClockReplacer;
use log::debug;
use oxbow_common::page::{PageId, PAGE_SIZE};
use oxbow_common::{OxbowError, Result};
use parking_lot::Mutex;

/// A dirty page that was evicted from the buffer pool.
///
/// The caller must write this to disk to prevent data loss; the pool itself
/// performs no I/O.
#[derive(Debug)]
pub struct EvictedPage {
    pub page_id: PageId,
    pub data: Box<[u8; PAGE_SIZE]>,
}

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { num_frames: 1024 }
    }
}

/// Buffer pool manager.
///
/// Manages a fixed-size pool of page frames with:
/// - Page ID to frame ID mapping
/// - Free frame list for new pages
/// - Clock replacement for eviction
/// - Pin counting so in-use pages are never evicted
pub struct BufferPool {
    /// Configuration.
    config: BufferPoolConfig,
    /// Array of buffer frames.
    frames: Vec<BufferFrame>,
    /// Page ID to frame ID mapping.
    page_table: PageTable,
    /// List of free frame IDs.
    free_list: Mutex<Vec<FrameId>>,
    /// Page replacement policy.
    replacer: ClockReplacer,
}

impl BufferPool {
    /// Creates a new buffer pool.
    pub fn new(config: BufferPoolConfig) -> Self {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames)
            .map(|i| BufferFrame::new(FrameId(i as u32)))
            .collect();

        // All frames start in the free list
        let free_list: Vec<_> = (0..num_frames).map(|i| FrameId(i as u32)).collect();

        Self {
            config,
            frames,
            page_table: PageTable::new(num_frames),
            free_list: Mutex::new(free_list),
            replacer: ClockReplacer::new(num_frames),
        }
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Returns the number of pages currently in the pool.
    pub fn page_count(&self) -> usize {
        self.page_table.len()
    }

    /// Checks if a page is resident in the buffer pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.page_table.contains(page_id)
    }

    /// Fetches a page from the buffer pool.
    ///
    /// Returns None if the page is not resident. The page is pinned before
    /// being returned.
    #[inline]
    pub fn fetch_page(&self, page_id: PageId) -> Option<&BufferFrame> {
        let frame_id = self.page_table.get(page_id)?;
        let frame = &self.frames[frame_id.0 as usize];
        frame.pin();
        self.replacer.record_access(frame_id);
        Some(frame)
    }

    /// Returns the frame holding a page the caller already has pinned,
    /// without adding another pin.
    ///
    /// Intended for cursors that keep one page pinned across calls (an
    /// index scan); the pin guarantees the page cannot have been evicted.
    #[inline]
    pub fn peek_page(&self, page_id: PageId) -> Option<&BufferFrame> {
        let frame_id = self.page_table.get(page_id)?;
        Some(&self.frames[frame_id.0 as usize])
    }

    /// Allocates a frame for a new page.
    ///
    /// Tries the free list first, then evicts. Returns the frame ID and
    /// any evicted dirty page that must be flushed by the caller.
    fn allocate_frame(&self) -> Result<(FrameId, Option<EvictedPage>)> {
        {
            let mut free_list = self.free_list.lock();
            if let Some(frame_id) = free_list.pop() {
                return Ok((frame_id, None));
            }
        }

        let victim_id = self
            .replacer
            .evict(|fid| self.frames[fid.0 as usize].pin_count() == 0);

        if let Some(victim_id) = victim_id {
            let frame = &self.frames[victim_id.0 as usize];

            // Capture evicted page data if dirty
            let evicted = if frame.is_dirty() {
                frame.page_id().map(|page_id| {
                    let data_guard = frame.read_data();
                    let mut data = Box::new([0u8; PAGE_SIZE]);
                    data.copy_from_slice(&**data_guard);
                    EvictedPage { page_id, data }
                })
            } else {
                None
            };

            if let Some(old_page_id) = frame.page_id() {
                debug!("evicting page {} from {}", old_page_id, victim_id);
                self.page_table.remove(old_page_id);
            }

            return Ok((victim_id, evicted));
        }

        Err(OxbowError::BufferPoolFull)
    }

    /// Installs a fresh zeroed page into the buffer pool.
    ///
    /// If the page is already resident, returns the existing frame. The
    /// page is pinned before being returned, along with any dirty page
    /// that was evicted to make room.
    pub fn new_page(&self, page_id: PageId) -> Result<(&BufferFrame, Option<EvictedPage>)> {
        if let Some(frame_id) = self.page_table.get(page_id) {
            let frame = &self.frames[frame_id.0 as usize];
            frame.pin();
            self.replacer.record_access(frame_id);
            return Ok((frame, None));
        }

        let (frame_id, evicted) = self.allocate_frame()?;

        let frame = &self.frames[frame_id.0 as usize];
        frame.reset();
        frame.set_page_id(Some(page_id));
        frame.pin();

        self.page_table.insert(page_id, frame_id);

        Ok((frame, evicted))
    }

    /// Loads page data read from disk into the buffer pool.
    ///
    /// The page is pinned before being returned.
    pub fn load_page(
        &self,
        page_id: PageId,
        data: &[u8],
    ) -> Result<(&BufferFrame, Option<EvictedPage>)> {
        let (frame, evicted) = self.new_page(page_id)?;
        frame.copy_from(data);
        Ok((frame, evicted))
    }

    /// Unpins a page in the buffer pool.
    ///
    /// Once the pin count drops to zero the page becomes evictable.
    /// Returns false if the page is not resident.
    #[inline]
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        if let Some(frame_id) = self.page_table.get(page_id) {
            let frame = &self.frames[frame_id.0 as usize];

            if is_dirty {
                frame.set_dirty(true);
            }

            frame.unpin();
            return true;
        }
        false
    }

    /// Flushes a single page through the provided callback if it is dirty.
    ///
    /// Returns true if the page was flushed.
    pub fn flush_page<F>(&self, page_id: PageId, mut flush_fn: F) -> Result<bool>
    where
        F: FnMut(PageId, &[u8]) -> Result<()>,
    {
        if let Some(frame_id) = self.page_table.get(page_id) {
            let frame = &self.frames[frame_id.0 as usize];

            if frame.is_dirty() {
                let data = frame.read_data();
                flush_fn(page_id, &**data)?;
                frame.set_dirty(false);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Flushes all dirty pages belonging to one file.
    ///
    /// Returns the number of pages flushed.
    pub fn flush_file<F>(&self, file_id: u32, mut flush_fn: F) -> Result<usize>
    where
        F: FnMut(PageId, &[u8]) -> Result<()>,
    {
        self.flush_matching(|page_id| page_id.file_id == file_id, &mut flush_fn)
    }

    /// Flushes all dirty pages.
    ///
    /// Returns the number of pages flushed.
    pub fn flush_all<F>(&self, mut flush_fn: F) -> Result<usize>
    where
        F: FnMut(PageId, &[u8]) -> Result<()>,
    {
        self.flush_matching(|_| true, &mut flush_fn)
    }

    fn flush_matching<P, F>(&self, pred: P, flush_fn: &mut F) -> Result<usize>
    where
        P: Fn(PageId) -> bool,
        F: FnMut(PageId, &[u8]) -> Result<()>,
    {
        // Collect first to avoid holding the page table lock during flush
        let mut candidates = Vec::new();
        self.page_table.for_each(|page_id, frame_id| {
            if pred(page_id) {
                candidates.push((page_id, frame_id));
            }
            true
        });

        let mut flushed = 0;
        for (page_id, frame_id) in candidates {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_dirty() {
                let data = frame.read_data();
                flush_fn(page_id, &**data)?;
                frame.set_dirty(false);
                flushed += 1;
            }
        }

        Ok(flushed)
    }

    /// Removes a page from the buffer pool.
    ///
    /// Returns false if the page is pinned or not resident.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        if let Some(frame_id) = self.page_table.remove(page_id) {
            let frame = &self.frames[frame_id.0 as usize];

            // Cannot delete a pinned page; re-insert the mapping
            if frame.is_pinned() {
                self.page_table.insert(page_id, frame_id);
                return false;
            }

            self.replacer.remove(frame_id);
            frame.reset();
            self.free_list.lock().push(frame_id);

            return true;
        }
        false
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let mut pinned_count = 0;
        let mut dirty_count = 0;

        self.page_table.for_each(|_, frame_id| {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_pinned() {
                pinned_count += 1;
            }
            if frame.is_dirty() {
                dirty_count += 1;
            }
            true
        });

        BufferPoolStats {
            total_frames: self.config.num_frames,
            free_frames: self.free_count(),
            used_frames: self.page_table.len(),
            pinned_frames: pinned_count,
            dirty_frames: dirty_count,
        }
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Number of free frames.
    pub free_frames: usize,
    /// Number of frames with pages.
    pub used_frames: usize,
    /// Number of pinned frames.
    pub pinned_frames: usize,
    /// Number of dirty frames.
    pub dirty_frames: usize,
}
