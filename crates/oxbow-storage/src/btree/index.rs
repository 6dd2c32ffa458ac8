//! The B+ tree index: lifecycle, insertion, and range scans.

use super::constants::LEAF_CAPACITY;
use super::page::{internal, leaf, meta};
use super::types::{key_admitted, LeafEntry, RangeOp, Separator};
use crate::bufmgr::BufferManager;
use crate::file::PagedFile;
use crate::relation::{RelationFile, Rid};
use log::{debug, info};
use oxbow_buffer::BufferFrame;
use oxbow_common::page::{PageNo, INVALID_PAGE_NO};
use oxbow_common::{KeyType, OxbowError, Result, StorageConfig};
use std::sync::Arc;

/// State of the single in-flight range scan.
struct ScanState {
    low: i32,
    low_op: RangeOp,
    high: i32,
    high_op: RangeOp,
    /// Leaf currently positioned on; held pinned while the scan is active.
    page_no: PageNo,
    /// Slot to examine on the next `scan_next` call.
    next_entry: usize,
    /// Set once the sibling chain ran out and the last leaf was unpinned.
    reached_end: bool,
}

/// A persistent B+ tree index over one integer attribute of a relation.
///
/// The index lives in its own paged file named
/// `"<relation>.<attr_byte_offset>"`. Opening constructs the in-memory
/// state from the meta page; creating builds the file and bulk-loads it by
/// scanning the base relation. At most one range scan is active at a time;
/// starting a new scan implicitly ends the previous one.
pub struct BTreeIndex {
    /// Canonical index file name.
    index_name: String,
    /// The index file.
    file: Arc<PagedFile>,
    /// Buffer manager all page access goes through.
    bufmgr: Arc<BufferManager>,
    /// Byte offset of the key within a record.
    attr_byte_offset: usize,
    /// Datatype of the indexed attribute.
    key_type: KeyType,
    /// Page number of the meta page (the file's first page).
    meta_page_no: PageNo,
    /// Current root page number.
    root_page_no: PageNo,
    /// Whether the root is still a leaf (true until the first root split).
    root_is_leaf: bool,
    /// The in-flight scan, if any.
    scan: Option<ScanState>,
}

impl BTreeIndex {
    /// Opens the index for `relation` over the attribute at
    /// `attr_byte_offset`, creating and bulk-loading it if the index file
    /// does not exist yet.
    pub fn new(
        config: &StorageConfig,
        bufmgr: Arc<BufferManager>,
        relation: &RelationFile,
        attr_byte_offset: usize,
        key_type: KeyType,
    ) -> Result<Self> {
        if key_type != KeyType::Integer {
            return Err(OxbowError::UnsupportedKeyType(key_type));
        }

        let index_name = format!("{}.{}", relation.name(), attr_byte_offset);
        let path = config.data_dir.join(&index_name);

        match PagedFile::open(&path, config.fsync_enabled) {
            Ok(file) => {
                Self::open_existing(bufmgr, relation, attr_byte_offset, key_type, index_name, file)
            }
            Err(OxbowError::FileNotFound(_)) => {
                let file = PagedFile::create(&path, config.fsync_enabled)?;
                Self::create_new(bufmgr, relation, attr_byte_offset, key_type, index_name, file)
            }
            Err(e) => Err(e),
        }
    }

    fn open_existing(
        bufmgr: Arc<BufferManager>,
        relation: &RelationFile,
        attr_byte_offset: usize,
        key_type: KeyType,
        index_name: String,
        file: PagedFile,
    ) -> Result<Self> {
        let file = Arc::new(file);
        bufmgr.register_file(&file);

        let meta_page_no = file.first_page_no();
        if meta_page_no == INVALID_PAGE_NO {
            return Err(OxbowError::BadIndexInfo(format!(
                "index file {} has no meta page",
                index_name
            )));
        }

        let frame = bufmgr.fetch_page(&file, meta_page_no)?;
        let (stored_name, stored_offset, stored_tag, root_page_no) = {
            let data = frame.read_data();
            (
                meta::relation_name(&**data),
                meta::attr_byte_offset(&**data),
                meta::key_type_tag(&**data),
                meta::root_page_no(&**data),
            )
        };
        bufmgr.unpin_page(&file, meta_page_no, false);

        let name_bytes = relation.name().as_bytes();
        let truncated = &name_bytes[..name_bytes.len().min(meta::RELATION_NAME_LEN)];
        let expected_name = String::from_utf8_lossy(truncated).into_owned();
        if stored_name != expected_name {
            return Err(OxbowError::BadIndexInfo(format!(
                "relation name mismatch: expected {}, found {}",
                expected_name, stored_name
            )));
        }
        if stored_offset != attr_byte_offset as i32 {
            return Err(OxbowError::BadIndexInfo(format!(
                "attribute offset mismatch: expected {}, found {}",
                attr_byte_offset, stored_offset
            )));
        }
        if KeyType::from_i32(stored_tag) != Some(key_type) {
            return Err(OxbowError::BadIndexInfo(format!(
                "key type mismatch: expected {}, found tag {}",
                key_type, stored_tag
            )));
        }

        // The initial root is the page allocated right after the meta page
        // at creation; the root moves off it on the first root split and
        // never returns, so equality means the root is still a leaf.
        let first_root_page_no = meta_page_no + 1;

        info!("opened index {} (root page {})", index_name, root_page_no);
        Ok(Self {
            index_name,
            file,
            bufmgr,
            attr_byte_offset,
            key_type,
            meta_page_no,
            root_page_no,
            root_is_leaf: root_page_no == first_root_page_no,
            scan: None,
        })
    }

    fn create_new(
        bufmgr: Arc<BufferManager>,
        relation: &RelationFile,
        attr_byte_offset: usize,
        key_type: KeyType,
        index_name: String,
        file: PagedFile,
    ) -> Result<Self> {
        let file = Arc::new(file);
        bufmgr.register_file(&file);

        let (meta_page_no, meta_frame) = bufmgr.alloc_page(&file)?;
        let (root_page_no, root_frame) = bufmgr.alloc_page(&file)?;

        {
            let mut data = root_frame.write_data();
            leaf::init(&mut **data);
        }
        {
            let mut data = meta_frame.write_data();
            meta::init(
                &mut **data,
                relation.name(),
                attr_byte_offset as i32,
                key_type.as_i32(),
                root_page_no,
            );
        }

        bufmgr.unpin_page(&file, meta_page_no, true);
        bufmgr.unpin_page(&file, root_page_no, true);

        let mut index = Self {
            index_name,
            file,
            bufmgr,
            attr_byte_offset,
            key_type,
            meta_page_no,
            root_page_no,
            root_is_leaf: true,
            scan: None,
        };
        index.bulk_load(relation)?;
        Ok(index)
    }

    /// Fills a freshly created index by scanning the base relation.
    fn bulk_load(&mut self, relation: &RelationFile) -> Result<()> {
        let mut count = 0u64;
        let mut scan = relation.scan();
        loop {
            match scan.next_entry() {
                Ok((rid, record)) => {
                    let field = record.get(self.attr_byte_offset..).ok_or({
                        OxbowError::KeyTooShort {
                            expected: self.attr_byte_offset + 4,
                            actual: record.len(),
                        }
                    })?;
                    self.insert_entry(field, rid)?;
                    count += 1;
                }
                Err(OxbowError::EndOfFile) => break,
                Err(e) => return Err(e),
            }
        }
        self.bufmgr.flush_file(&self.file)?;
        info!("built index {} over {} records", self.index_name, count);
        Ok(())
    }

    /// Returns the canonical index file name.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Returns the byte offset of the indexed attribute.
    pub fn attr_byte_offset(&self) -> usize {
        self.attr_byte_offset
    }

    /// Returns the datatype of the indexed attribute.
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Returns the current root page number.
    pub fn root_page_no(&self) -> PageNo {
        self.root_page_no
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Inserts a `(key, rid)` entry.
    ///
    /// The key is the 32-bit little-endian integer at the start of `key`
    /// (callers pass `&record[attr_byte_offset..]`). Descends to the target
    /// leaf and inserts in order; full nodes split on the way back up, and
    /// a root split grows the tree by one level.
    pub fn insert_entry(&mut self, key: &[u8], rid: Rid) -> Result<()> {
        if key.len() < 4 {
            return Err(OxbowError::KeyTooShort {
                expected: 4,
                actual: key.len(),
            });
        }
        let key_val = i32::from_le_bytes([key[0], key[1], key[2], key[3]]);
        let entry = LeafEntry { key: key_val, rid };

        let root = self.root_page_no;
        let root_is_leaf = self.root_is_leaf;
        let propagated = self.find_space(root, &entry, root_is_leaf)?;
        // A root split is absorbed by new_root inside the split path, so
        // nothing ever propagates out of the top frame.
        debug_assert!(propagated.is_none());
        Ok(())
    }

    /// Recursive descent: finds the leaf for `entry`, inserts, and absorbs
    /// any separator bubbling up from a child split.
    ///
    /// The page is pinned for the duration of the frame and unpinned on
    /// every exit path: dirty when this node was modified, clean when the
    /// insertion happened entirely below it. Returns the separator the
    /// caller must absorb, if this node itself split.
    fn find_space(
        &mut self,
        page_no: PageNo,
        entry: &LeafEntry,
        is_leaf: bool,
    ) -> Result<Option<Separator>> {
        let bufmgr = Arc::clone(&self.bufmgr);
        let frame = bufmgr.fetch_page(&self.file, page_no)?;

        if is_leaf {
            let full = {
                let data = frame.read_data();
                leaf::is_full(&**data)
            };
            if !full {
                {
                    let mut data = frame.write_data();
                    leaf::insert_ordered(&mut **data, entry);
                }
                bufmgr.unpin_page(&self.file, page_no, true);
                Ok(None)
            } else {
                self.split_leaf(page_no, frame, entry)
            }
        } else {
            let (child_no, child_is_leaf) = {
                let data = frame.read_data();
                let idx = internal::child_index(&**data, entry.key);
                (internal::child(&**data, idx), internal::level(&**data) == 1)
            };

            match self.find_space(child_no, entry, child_is_leaf)? {
                None => {
                    bufmgr.unpin_page(&self.file, page_no, false);
                    Ok(None)
                }
                Some(sep) => {
                    let full = {
                        let data = frame.read_data();
                        internal::is_full(&**data)
                    };
                    if !full {
                        {
                            let mut data = frame.write_data();
                            internal::insert_ordered(&mut **data, &sep);
                        }
                        bufmgr.unpin_page(&self.file, page_no, true);
                        Ok(None)
                    } else {
                        self.split_internal(page_no, frame, &sep)
                    }
                }
            }
        }
    }

    /// Splits a full leaf, producing the separator for the parent.
    ///
    /// Takes over the pin on `old_frame` and unpins both halves dirty. If
    /// the leaf was the root, the split is absorbed here by growing a new
    /// root and nothing propagates.
    fn split_leaf(
        &mut self,
        old_page_no: PageNo,
        old_frame: &BufferFrame,
        entry: &LeafEntry,
    ) -> Result<Option<Separator>> {
        let bufmgr = Arc::clone(&self.bufmgr);
        let (new_page_no, new_frame) = bufmgr.alloc_page(&self.file)?;

        let sep_key = {
            let mut old_data = old_frame.write_data();
            let mut new_data = new_frame.write_data();
            leaf::split(&mut **old_data, &mut **new_data, new_page_no, entry)
        };
        let sep = Separator {
            key: sep_key,
            page_no: new_page_no,
        };

        bufmgr.unpin_page(&self.file, old_page_no, true);
        bufmgr.unpin_page(&self.file, new_page_no, true);

        if old_page_no == self.root_page_no {
            self.new_root(old_page_no, &sep)?;
            Ok(None)
        } else {
            Ok(Some(sep))
        }
    }

    /// Splits a full internal node, producing the separator for the parent.
    fn split_internal(
        &mut self,
        old_page_no: PageNo,
        old_frame: &BufferFrame,
        pending: &Separator,
    ) -> Result<Option<Separator>> {
        let bufmgr = Arc::clone(&self.bufmgr);
        let (new_page_no, new_frame) = bufmgr.alloc_page(&self.file)?;

        let promoted = {
            let mut old_data = old_frame.write_data();
            let mut new_data = new_frame.write_data();
            internal::split(&mut **old_data, &mut **new_data, pending)
        };
        let sep = Separator {
            key: promoted,
            page_no: new_page_no,
        };

        bufmgr.unpin_page(&self.file, old_page_no, true);
        bufmgr.unpin_page(&self.file, new_page_no, true);

        if old_page_no == self.root_page_no {
            self.new_root(old_page_no, &sep)?;
            Ok(None)
        } else {
            Ok(Some(sep))
        }
    }

    /// Grows the tree: installs a new root over the split halves of the old
    /// one and repoints the meta page at it.
    fn new_root(&mut self, left_child: PageNo, sep: &Separator) -> Result<()> {
        let bufmgr = Arc::clone(&self.bufmgr);
        let (new_root_no, root_frame) = bufmgr.alloc_page(&self.file)?;

        {
            let mut data = root_frame.write_data();
            // The new root's children are leaves exactly when the old root
            // still was one.
            internal::init_root(
                &mut **data,
                self.root_is_leaf,
                sep.key,
                left_child,
                sep.page_no,
            );
        }

        let meta_frame = bufmgr.fetch_page(&self.file, self.meta_page_no)?;
        {
            let mut data = meta_frame.write_data();
            meta::set_root_page_no(&mut **data, new_root_no);
        }
        bufmgr.unpin_page(&self.file, self.meta_page_no, true);
        bufmgr.unpin_page(&self.file, new_root_no, true);

        debug!(
            "index {}: root split, new root page {}",
            self.index_name, new_root_no
        );
        self.root_page_no = new_root_no;
        self.root_is_leaf = false;
        Ok(())
    }

    // =========================================================================
    // Range scans
    // =========================================================================

    /// Begins a range scan bounded by `low_op`/`high_op`.
    ///
    /// Any scan already in progress is ended first. Fails with
    /// `BadScanRange` if `low > high`, `BadOpcodes` unless the lower bound
    /// uses GT/GTE and the upper LT/LTE, and `NoSuchKeyFound` if no key in
    /// the index is admitted. On success the scan is positioned on the
    /// first qualifying entry and its leaf stays pinned until the scan ends
    /// or moves on.
    pub fn start_scan(
        &mut self,
        low: i32,
        low_op: RangeOp,
        high: i32,
        high_op: RangeOp,
    ) -> Result<()> {
        if self.scan.is_some() {
            self.end_scan()?;
        }

        if low > high {
            return Err(OxbowError::BadScanRange { low, high });
        }
        if !matches!(low_op, RangeOp::Gt | RangeOp::Gte)
            || !matches!(high_op, RangeOp::Lt | RangeOp::Lte)
        {
            return Err(OxbowError::BadOpcodes);
        }

        let bufmgr = Arc::clone(&self.bufmgr);

        // Descend to the leaf that could hold the first qualifying key.
        // When an internal node reports level 1 its chosen child is a leaf,
        // which ends the descent.
        let mut page_no = self.root_page_no;
        if !self.root_is_leaf {
            loop {
                let frame = bufmgr.fetch_page(&self.file, page_no)?;
                let (next, children_are_leaves) = {
                    let data = frame.read_data();
                    let idx = internal::scan_child_index(&**data, low);
                    (internal::child(&**data, idx), internal::level(&**data) == 1)
                };
                bufmgr.unpin_page(&self.file, page_no, false);
                page_no = next;
                if children_are_leaves {
                    break;
                }
            }
        }

        // Walk the sibling chain until a slot passes both bounds.
        loop {
            let frame = bufmgr.fetch_page(&self.file, page_no)?;
            let (found, right_sib) = {
                let data = frame.read_data();
                let mut found = None;
                for i in 0..LEAF_CAPACITY {
                    if !leaf::slot_used(&**data, i) {
                        break;
                    }
                    if key_admitted(leaf::key(&**data, i), low, low_op, high, high_op) {
                        found = Some(i);
                        break;
                    }
                }
                (found, leaf::right_sibling(&**data))
            };

            match found {
                Some(next_entry) => {
                    // The leaf stays pinned for the scan's lifetime.
                    self.scan = Some(ScanState {
                        low,
                        low_op,
                        high,
                        high_op,
                        page_no,
                        next_entry,
                        reached_end: false,
                    });
                    return Ok(());
                }
                None => {
                    bufmgr.unpin_page(&self.file, page_no, false);
                    if right_sib == INVALID_PAGE_NO {
                        return Err(OxbowError::NoSuchKeyFound);
                    }
                    page_no = right_sib;
                }
            }
        }
    }

    /// Returns the RID of the next entry matching the scan.
    ///
    /// Fails with `ScanNotInitialized` when no scan is active and with
    /// `IndexScanCompleted` once the matching entries are exhausted, either
    /// by crossing the upper bound or by running off the rightmost leaf.
    pub fn scan_next(&mut self) -> Result<Rid> {
        let bufmgr = Arc::clone(&self.bufmgr);
        let state = self.scan.as_mut().ok_or(OxbowError::ScanNotInitialized)?;

        if state.reached_end {
            return Err(OxbowError::IndexScanCompleted);
        }

        // Page exhausted: hop to the right sibling, keeping exactly one
        // leaf pinned. At the rightmost leaf the pin is released and the
        // scan parks in its end state.
        {
            let frame = bufmgr.pinned_page(&self.file, state.page_no)?;
            let (exhausted, right_sib) = {
                let data = frame.read_data();
                (
                    state.next_entry == LEAF_CAPACITY
                        || !leaf::slot_used(&**data, state.next_entry),
                    leaf::right_sibling(&**data),
                )
            };
            if exhausted {
                bufmgr.unpin_page(&self.file, state.page_no, false);
                if right_sib == INVALID_PAGE_NO {
                    state.reached_end = true;
                    return Err(OxbowError::IndexScanCompleted);
                }
                bufmgr.fetch_page(&self.file, right_sib)?;
                state.page_no = right_sib;
                state.next_entry = 0;
            }
        }

        let frame = bufmgr.pinned_page(&self.file, state.page_no)?;
        let data = frame.read_data();
        let key = leaf::key(&**data, state.next_entry);
        if key_admitted(key, state.low, state.low_op, state.high, state.high_op) {
            let rid = leaf::rid(&**data, state.next_entry);
            state.next_entry += 1;
            Ok(rid)
        } else {
            // Upper bound crossed; the leaf stays pinned until end_scan.
            Err(OxbowError::IndexScanCompleted)
        }
    }

    /// Ends the in-flight scan, releasing its pinned leaf.
    pub fn end_scan(&mut self) -> Result<()> {
        let state = self.scan.take().ok_or(OxbowError::ScanNotInitialized)?;
        if !state.reached_end {
            self.bufmgr.unpin_page(&self.file, state.page_no, false);
        }
        Ok(())
    }
}

impl Drop for BTreeIndex {
    /// Ends any scan and flushes the index file. Never panics; close-time
    /// failures are swallowed.
    fn drop(&mut self) {
        if let Some(state) = self.scan.take() {
            if !state.reached_end {
                self.bufmgr.unpin_page(&self.file, state.page_no, false);
            }
        }
        let _ = self.bufmgr.flush_file(&self.file);
        self.bufmgr.unregister_file(self.file.file_id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxbow_buffer::BufferPoolConfig;
    use tempfile::tempdir;

    struct TestEnv {
        config: StorageConfig,
        bufmgr: Arc<BufferManager>,
        _dir: tempfile::TempDir,
    }

    fn test_env(num_frames: usize) -> TestEnv {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            buffer_pool_frames: num_frames,
            fsync_enabled: false,
        };
        let bufmgr = Arc::new(BufferManager::new(BufferPoolConfig { num_frames }));
        TestEnv {
            config,
            bufmgr,
            _dir: dir,
        }
    }

    /// Record layout used by the tests: 4 pad bytes, then the i32 key.
    const ATTR_OFFSET: usize = 4;
    const RECORD_SIZE: usize = 16;

    fn make_record(key: i32) -> [u8; RECORD_SIZE] {
        let mut record = [0u8; RECORD_SIZE];
        record[ATTR_OFFSET..ATTR_OFFSET + 4].copy_from_slice(&key.to_le_bytes());
        record
    }

    fn build_index(env: &TestEnv, name: &str, keys: &[i32]) -> (BTreeIndex, Vec<(i32, Rid)>) {
        let relation =
            RelationFile::create(&env.config, &env.bufmgr, name, RECORD_SIZE).unwrap();
        let mut inserted = Vec::with_capacity(keys.len());
        for &key in keys {
            let rid = relation.insert_record(&make_record(key)).unwrap();
            inserted.push((key, rid));
        }
        let index = BTreeIndex::new(
            &env.config,
            Arc::clone(&env.bufmgr),
            &relation,
            ATTR_OFFSET,
            KeyType::Integer,
        )
        .unwrap();
        (index, inserted)
    }

    fn collect_rids(index: &mut BTreeIndex) -> Vec<Rid> {
        let mut rids = Vec::new();
        loop {
            match index.scan_next() {
                Ok(rid) => rids.push(rid),
                Err(OxbowError::IndexScanCompleted) => break,
                Err(e) => panic!("unexpected scan error: {}", e),
            }
        }
        rids
    }

    #[test]
    fn test_index_name() {
        let env = test_env(128);
        let (index, _) = build_index(&env, "orders", &[1, 2, 3]);
        assert_eq!(index.index_name(), "orders.4");
        assert_eq!(index.attr_byte_offset(), ATTR_OFFSET);
        assert_eq!(index.key_type(), KeyType::Integer);
    }

    #[test]
    fn test_rejects_non_integer_key_type() {
        let env = test_env(128);
        let relation =
            RelationFile::create(&env.config, &env.bufmgr, "orders", RECORD_SIZE).unwrap();
        let result = BTreeIndex::new(
            &env.config,
            Arc::clone(&env.bufmgr),
            &relation,
            ATTR_OFFSET,
            KeyType::Double,
        );
        assert!(matches!(result, Err(OxbowError::UnsupportedKeyType(_))));
    }

    #[test]
    fn test_empty_index_scan_fails() {
        let env = test_env(128);
        let (mut index, _) = build_index(&env, "orders", &[]);

        let result = index.start_scan(0, RangeOp::Gte, 100, RangeOp::Lte);
        assert!(matches!(result, Err(OxbowError::NoSuchKeyFound)));
    }

    #[test]
    fn test_single_leaf_scan() {
        let env = test_env(128);
        let (mut index, inserted) = build_index(&env, "orders", &[5, 1, 3, 2, 4]);

        index.start_scan(1, RangeOp::Gte, 5, RangeOp::Lte).unwrap();
        let rids = collect_rids(&mut index);
        index.end_scan().unwrap();

        // RIDs come back in ascending key order
        let mut expected: Vec<(i32, Rid)> = inserted;
        expected.sort_by_key(|(k, _)| *k);
        let expected_rids: Vec<Rid> = expected.into_iter().map(|(_, rid)| rid).collect();
        assert_eq!(rids, expected_rids);
    }

    #[test]
    fn test_scan_bounds_strictness() {
        let env = test_env(128);
        let keys: Vec<i32> = (0..20).collect();
        let (mut index, inserted) = build_index(&env, "orders", &keys);

        let rid_for = |k: i32| inserted[k as usize].1;

        index.start_scan(5, RangeOp::Gt, 10, RangeOp::Lt).unwrap();
        let rids = collect_rids(&mut index);
        index.end_scan().unwrap();
        assert_eq!(rids, (6..10).map(rid_for).collect::<Vec<_>>());

        index.start_scan(5, RangeOp::Gte, 10, RangeOp::Lte).unwrap();
        let rids = collect_rids(&mut index);
        index.end_scan().unwrap();
        assert_eq!(rids, (5..=10).map(rid_for).collect::<Vec<_>>());
    }

    #[test]
    fn test_scan_validation_errors() {
        let env = test_env(128);
        let (mut index, _) = build_index(&env, "orders", &[1, 2, 3]);

        assert!(matches!(
            index.start_scan(10, RangeOp::Gte, 5, RangeOp::Lte),
            Err(OxbowError::BadScanRange { low: 10, high: 5 })
        ));
        assert!(matches!(
            index.start_scan(0, RangeOp::Lt, 10, RangeOp::Gt),
            Err(OxbowError::BadOpcodes)
        ));
        assert!(matches!(
            index.start_scan(0, RangeOp::Gte, 10, RangeOp::Gte),
            Err(OxbowError::BadOpcodes)
        ));
    }

    #[test]
    fn test_scan_next_without_scan() {
        let env = test_env(128);
        let (mut index, _) = build_index(&env, "orders", &[1]);

        assert!(matches!(
            index.scan_next(),
            Err(OxbowError::ScanNotInitialized)
        ));
        assert!(matches!(index.end_scan(), Err(OxbowError::ScanNotInitialized)));
    }

    #[test]
    fn test_first_leaf_split() {
        let env = test_env(128);
        // One more key than fits in a leaf forces the first split
        let keys: Vec<i32> = (0..=LEAF_CAPACITY as i32).collect();
        let (mut index, inserted) = build_index(&env, "orders", &keys);

        // The root moved off the initial root page
        assert_ne!(index.root_page_no(), 2);

        index
            .start_scan(0, RangeOp::Gte, LEAF_CAPACITY as i32, RangeOp::Lte)
            .unwrap();
        let rids = collect_rids(&mut index);
        index.end_scan().unwrap();

        assert_eq!(rids.len(), LEAF_CAPACITY + 1);
        let expected_rids: Vec<Rid> = inserted.iter().map(|(_, rid)| *rid).collect();
        assert_eq!(rids, expected_rids);
    }

    #[test]
    fn test_descending_insert_scans_ascending() {
        let env = test_env(256);
        let keys: Vec<i32> = (0..2000).rev().collect();
        let (mut index, inserted) = build_index(&env, "orders", &keys);

        index
            .start_scan(-1, RangeOp::Gt, 2000, RangeOp::Lt)
            .unwrap();
        let rids = collect_rids(&mut index);
        index.end_scan().unwrap();

        assert_eq!(rids.len(), 2000);
        // Keys were inserted descending, so the emitted order reverses
        // the insertion order.
        let mut expected: Vec<(i32, Rid)> = inserted;
        expected.sort_by_key(|(k, _)| *k);
        let expected_rids: Vec<Rid> = expected.into_iter().map(|(_, rid)| rid).collect();
        assert_eq!(rids, expected_rids);
    }

    #[test]
    fn test_duplicate_keys_all_emitted() {
        let env = test_env(128);
        let keys = vec![7, 7, 7, 3, 7, 3];
        let (mut index, _) = build_index(&env, "orders", &keys);

        index.start_scan(3, RangeOp::Gte, 7, RangeOp::Lte).unwrap();
        let rids = collect_rids(&mut index);
        index.end_scan().unwrap();

        assert_eq!(rids.len(), 6);
        // Every RID appears exactly once
        let mut unique = rids.clone();
        unique.sort_by_key(|r| (r.page_no, r.slot_no));
        unique.dedup();
        assert_eq!(unique.len(), 6);
    }

    #[test]
    fn test_restart_scan_implicitly_ends_previous() {
        let env = test_env(128);
        let keys: Vec<i32> = (0..100).collect();
        let (mut index, inserted) = build_index(&env, "orders", &keys);

        index.start_scan(0, RangeOp::Gte, 10, RangeOp::Lte).unwrap();
        index.scan_next().unwrap();
        index.scan_next().unwrap();

        // No end_scan in between
        index.start_scan(20, RangeOp::Gte, 30, RangeOp::Lte).unwrap();
        let rids = collect_rids(&mut index);
        index.end_scan().unwrap();

        let expected_rids: Vec<Rid> = (20..=30).map(|k| inserted[k as usize].1).collect();
        assert_eq!(rids, expected_rids);
    }

    #[test]
    fn test_scan_next_after_completion_keeps_failing() {
        let env = test_env(128);
        let (mut index, _) = build_index(&env, "orders", &[1, 2]);

        index.start_scan(1, RangeOp::Gte, 2, RangeOp::Lte).unwrap();
        index.scan_next().unwrap();
        index.scan_next().unwrap();

        for _ in 0..3 {
            assert!(matches!(
                index.scan_next(),
                Err(OxbowError::IndexScanCompleted)
            ));
        }
        index.end_scan().unwrap();
    }

    #[test]
    fn test_scan_lower_bound_above_all_keys() {
        let env = test_env(256);
        let keys: Vec<i32> = (0..1500).collect();
        let (mut index, _) = build_index(&env, "orders", &keys);

        let result = index.start_scan(5000, RangeOp::Gte, 6000, RangeOp::Lte);
        assert!(matches!(result, Err(OxbowError::NoSuchKeyFound)));
    }

    #[test]
    fn test_steady_state_insert_after_build() {
        let env = test_env(128);
        let (mut index, _) = build_index(&env, "orders", &[10, 20, 30]);

        let rid = Rid::new(9, 9);
        index.insert_entry(&15i32.to_le_bytes(), rid).unwrap();

        index.start_scan(15, RangeOp::Gte, 15, RangeOp::Lte).unwrap();
        let rids = collect_rids(&mut index);
        index.end_scan().unwrap();
        assert_eq!(rids, vec![rid]);
    }

    #[test]
    fn test_insert_key_too_short() {
        let env = test_env(128);
        let (mut index, _) = build_index(&env, "orders", &[]);

        let result = index.insert_entry(&[1, 2], Rid::new(1, 0));
        assert!(matches!(result, Err(OxbowError::KeyTooShort { .. })));
    }

    #[test]
    fn test_persistence_across_reopen() {
        let env = test_env(256);
        let keys: Vec<i32> = (0..1000).rev().collect();

        let relation =
            RelationFile::create(&env.config, &env.bufmgr, "orders", RECORD_SIZE).unwrap();
        let mut inserted = Vec::new();
        for &key in &keys {
            let rid = relation.insert_record(&make_record(key)).unwrap();
            inserted.push((key, rid));
        }

        {
            let _index = BTreeIndex::new(
                &env.config,
                Arc::clone(&env.bufmgr),
                &relation,
                ATTR_OFFSET,
                KeyType::Integer,
            )
            .unwrap();
            // Dropped here: scan ended, file flushed
        }

        let mut index = BTreeIndex::new(
            &env.config,
            Arc::clone(&env.bufmgr),
            &relation,
            ATTR_OFFSET,
            KeyType::Integer,
        )
        .unwrap();

        index.start_scan(100, RangeOp::Gte, 199, RangeOp::Lte).unwrap();
        let rids = collect_rids(&mut index);
        index.end_scan().unwrap();

        let mut expected: Vec<(i32, Rid)> = inserted
            .into_iter()
            .filter(|(k, _)| (100..=199).contains(k))
            .collect();
        expected.sort_by_key(|(k, _)| *k);
        let expected_rids: Vec<Rid> = expected.into_iter().map(|(_, rid)| rid).collect();
        assert_eq!(rids, expected_rids);
    }

    #[test]
    fn test_open_with_mismatched_meta_fails() {
        let env = test_env(128);
        let (index, _) = build_index(&env, "orders", &[1, 2, 3]);
        drop(index);

        // Masquerade the orders index as one for a different relation
        std::fs::copy(
            env.config.data_dir.join("orders.4"),
            env.config.data_dir.join("returns.4"),
        )
        .unwrap();

        let returns =
            RelationFile::create(&env.config, &env.bufmgr, "returns", RECORD_SIZE).unwrap();
        let result = BTreeIndex::new(
            &env.config,
            Arc::clone(&env.bufmgr),
            &returns,
            ATTR_OFFSET,
            KeyType::Integer,
        );
        assert!(matches!(result, Err(OxbowError::BadIndexInfo(_))));
    }

    #[test]
    fn test_pins_released_after_operations() {
        let env = test_env(128);
        let keys: Vec<i32> = (0..2000).collect();
        let (mut index, _) = build_index(&env, "orders", &keys);

        // After construction nothing is pinned
        assert_eq!(env.bufmgr.stats().pinned_frames, 0);

        index.insert_entry(&5000i32.to_le_bytes(), Rid::new(9, 1)).unwrap();
        assert_eq!(env.bufmgr.stats().pinned_frames, 0);

        // An active scan holds exactly one page pinned
        index.start_scan(0, RangeOp::Gte, 100, RangeOp::Lte).unwrap();
        assert_eq!(env.bufmgr.stats().pinned_frames, 1);
        index.scan_next().unwrap();
        assert_eq!(env.bufmgr.stats().pinned_frames, 1);

        index.end_scan().unwrap();
        assert_eq!(env.bufmgr.stats().pinned_frames, 0);

        // A scan that runs off the rightmost leaf releases its pin
        index.start_scan(1990, RangeOp::Gte, 99999, RangeOp::Lte).unwrap();
        let _ = collect_rids(&mut index);
        assert_eq!(env.bufmgr.stats().pinned_frames, 0);
        index.end_scan().unwrap();
        assert_eq!(env.bufmgr.stats().pinned_frames, 0);
    }

    #[test]
    fn test_failed_scan_leaves_nothing_pinned() {
        let env = test_env(128);
        let (mut index, _) = build_index(&env, "orders", &[1, 2, 3]);

        let _ = index.start_scan(10, RangeOp::Gte, 5, RangeOp::Lte);
        let _ = index.start_scan(0, RangeOp::Lt, 10, RangeOp::Gt);
        let _ = index.start_scan(100, RangeOp::Gte, 200, RangeOp::Lte);
        assert_eq!(env.bufmgr.stats().pinned_frames, 0);
    }
}
