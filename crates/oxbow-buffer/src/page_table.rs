//! Page table mapping resident page IDs to buffer frames.

use crate::frame::FrameId;
use oxbow_common::page::PageId;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Page table mapping PageId to FrameId for all pages resident in the pool.
pub struct PageTable {
    map: RwLock<HashMap<PageId, FrameId>>,
}

impl PageTable {
    /// Creates a new page table sized for the given number of frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            map: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Looks up a page ID and returns its frame ID if resident.
    #[inline]
    pub fn get(&self, page_id: PageId) -> Option<FrameId> {
        self.map.read().get(&page_id).copied()
    }

    /// Returns true if the page is resident.
    #[inline]
    pub fn contains(&self, page_id: PageId) -> bool {
        self.map.read().contains_key(&page_id)
    }

    /// Inserts a mapping, replacing any previous one.
    #[inline]
    pub fn insert(&self, page_id: PageId, frame_id: FrameId) {
        self.map.write().insert(page_id, frame_id);
    }

    /// Removes a mapping, returning the frame it pointed to.
    #[inline]
    pub fn remove(&self, page_id: PageId) -> Option<FrameId> {
        self.map.write().remove(&page_id)
    }

    /// Returns the number of resident pages.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Returns true if no pages are resident.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Calls `f` for every resident (page, frame) pair. Iteration stops
    /// early if `f` returns false.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(PageId, FrameId) -> bool,
    {
        for (&page_id, &frame_id) in self.map.read().iter() {
            if !f(page_id, frame_id) {
                break;
            }
        }
    }
}
