//! Node capacities for integer-keyed B+ tree pages.

use crate::relation::Rid;
use oxbow_common::page::PAGE_SIZE;

/// Size of a key on a node page.
pub(crate) const KEY_SIZE: usize = std::mem::size_of::<i32>();

/// Size of a page number on a node page.
pub(crate) const PAGE_NO_SIZE: usize = std::mem::size_of::<u32>();

/// Number of (key, RID) slots in a leaf page.
//                       sibling ptr                  key        rid
pub const LEAF_CAPACITY: usize = (PAGE_SIZE - PAGE_NO_SIZE) / (KEY_SIZE + Rid::SIZE);

/// Number of separator key slots in an internal page (which holds one more
/// child pointer than keys).
//                          level       extra page_no              key        page_no
pub const NODE_CAPACITY: usize =
    (PAGE_SIZE - KEY_SIZE - PAGE_NO_SIZE) / (KEY_SIZE + PAGE_NO_SIZE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacities() {
        assert_eq!(LEAF_CAPACITY, 682);
        assert_eq!(NODE_CAPACITY, 1023);
    }

    #[test]
    fn test_leaf_layout_fits_page() {
        let used = LEAF_CAPACITY * KEY_SIZE + LEAF_CAPACITY * Rid::SIZE + PAGE_NO_SIZE;
        assert!(used <= PAGE_SIZE);
    }

    #[test]
    fn test_internal_layout_fits_page() {
        let used = KEY_SIZE + NODE_CAPACITY * KEY_SIZE + (NODE_CAPACITY + 1) * PAGE_NO_SIZE;
        assert!(used <= PAGE_SIZE);
    }
}
