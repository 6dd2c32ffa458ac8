//! Paged file abstraction for page-level file I/O.

use oxbow_common::page::{PageNo, INVALID_PAGE_NO, PAGE_SIZE};
use oxbow_common::{OxbowError, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

/// Process-wide counter handing out unique file IDs to opened files.
static NEXT_FILE_ID: AtomicU32 = AtomicU32::new(1);

/// A file accessed as a sequence of fixed-size pages.
///
/// Pages are numbered from 1; offset on disk is `(page_no - 1) * PAGE_SIZE`.
/// Page number 0 is the "no such page" sentinel, so it never addresses real
/// data. Each open file carries a unique `file_id` under which the buffer
/// pool keys its pages.
pub struct PagedFile {
    /// Unique ID assigned at open time.
    file_id: u32,
    /// Path to the file.
    path: PathBuf,
    /// Enable fsync after writes.
    fsync_enabled: bool,
    /// The file handle and page count.
    inner: Mutex<FileInner>,
}

struct FileInner {
    file: File,
    num_pages: u32,
}

impl PagedFile {
    /// Creates a new paged file. Fails if the file already exists.
    pub fn create(path: &Path, fsync_enabled: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    OxbowError::FileExists(path.to_path_buf())
                } else {
                    OxbowError::Io(e)
                }
            })?;

        Ok(Self {
            file_id: NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed),
            path: path.to_path_buf(),
            fsync_enabled,
            inner: Mutex::new(FileInner { file, num_pages: 0 }),
        })
    }

    /// Opens an existing paged file. Fails with `FileNotFound` if missing.
    pub fn open(path: &Path, fsync_enabled: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    OxbowError::FileNotFound(path.to_path_buf())
                } else {
                    OxbowError::Io(e)
                }
            })?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self {
            file_id: NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed),
            path: path.to_path_buf(),
            fsync_enabled,
            inner: Mutex::new(FileInner { file, num_pages }),
        })
    }

    /// Returns the unique file ID.
    #[inline]
    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of the first page, or `INVALID_PAGE_NO` if the
    /// file holds no pages yet.
    pub fn first_page_no(&self) -> PageNo {
        if self.inner.lock().num_pages == 0 {
            INVALID_PAGE_NO
        } else {
            1
        }
    }

    /// Returns the number of pages in the file.
    pub fn num_pages(&self) -> u32 {
        self.inner.lock().num_pages
    }

    /// Reads a page from disk.
    pub fn read_page(&self, page_no: PageNo) -> Result<[u8; PAGE_SIZE]> {
        let mut inner = self.inner.lock();

        if page_no == INVALID_PAGE_NO || page_no > inner.num_pages {
            return Err(OxbowError::PageNotFound {
                file_id: self.file_id,
                page_no,
            });
        }

        let offset = (page_no as u64 - 1) * (PAGE_SIZE as u64);
        inner.file.seek(SeekFrom::Start(offset))?;

        let mut buffer = [0u8; PAGE_SIZE];
        inner.file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    /// Writes a page to disk.
    pub fn write_page(&self, page_no: PageNo, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut inner = self.inner.lock();

        if page_no == INVALID_PAGE_NO {
            return Err(OxbowError::PageNotFound {
                file_id: self.file_id,
                page_no,
            });
        }

        let offset = (page_no as u64 - 1) * (PAGE_SIZE as u64);
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(data)?;

        if self.fsync_enabled {
            inner.file.sync_all()?;
        }

        if page_no > inner.num_pages {
            inner.num_pages = page_no;
        }

        Ok(())
    }

    /// Allocates a new page at the end of the file.
    ///
    /// The page is zero-filled on disk. Returns its page number.
    pub fn allocate_page(&self) -> Result<PageNo> {
        let mut inner = self.inner.lock();

        let page_no = inner.num_pages + 1;
        let offset = (page_no as u64 - 1) * (PAGE_SIZE as u64);
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(&[0u8; PAGE_SIZE])?;

        if self.fsync_enabled {
            inner.file.sync_all()?;
        }

        inner.num_pages = page_no;
        Ok(page_no)
    }

    /// Flushes pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }
}

impl std::fmt::Debug for PagedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedFile")
            .field("file_id", &self.file_id)
            .field("path", &self.path)
            .field("num_pages", &self.num_pages())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paged_file_create_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.oxb");

        let file = PagedFile::create(&path, false).unwrap();
        assert_eq!(file.num_pages(), 0);
        assert_eq!(file.first_page_no(), INVALID_PAGE_NO);
        drop(file);

        let file = PagedFile::open(&path, false).unwrap();
        assert_eq!(file.num_pages(), 0);
    }

    #[test]
    fn test_paged_file_create_twice_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.oxb");

        PagedFile::create(&path, false).unwrap();
        let result = PagedFile::create(&path, false);
        assert!(matches!(result, Err(OxbowError::FileExists(_))));
    }

    #[test]
    fn test_paged_file_open_missing_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.oxb");

        let result = PagedFile::open(&path, false);
        assert!(matches!(result, Err(OxbowError::FileNotFound(_))));
    }

    #[test]
    fn test_paged_file_allocate() {
        let dir = tempdir().unwrap();
        let file = PagedFile::create(&dir.path().join("t.oxb"), false).unwrap();

        assert_eq!(file.allocate_page().unwrap(), 1);
        assert_eq!(file.allocate_page().unwrap(), 2);
        assert_eq!(file.num_pages(), 2);
        assert_eq!(file.first_page_no(), 1);
    }

    #[test]
    fn test_paged_file_write_read() {
        let dir = tempdir().unwrap();
        let file = PagedFile::create(&dir.path().join("t.oxb"), false).unwrap();

        let page_no = file.allocate_page().unwrap();

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xAB;
        data[100] = 0xCD;
        data[PAGE_SIZE - 1] = 0xEF;
        file.write_page(page_no, &data).unwrap();

        let read_data = file.read_page(page_no).unwrap();
        assert_eq!(read_data[0], 0xAB);
        assert_eq!(read_data[100], 0xCD);
        assert_eq!(read_data[PAGE_SIZE - 1], 0xEF);
    }

    #[test]
    fn test_paged_file_read_invalid_page() {
        let dir = tempdir().unwrap();
        let file = PagedFile::create(&dir.path().join("t.oxb"), false).unwrap();

        file.allocate_page().unwrap();

        assert!(matches!(
            file.read_page(INVALID_PAGE_NO),
            Err(OxbowError::PageNotFound { .. })
        ));
        assert!(matches!(
            file.read_page(99),
            Err(OxbowError::PageNotFound { .. })
        ));
    }

    #[test]
    fn test_paged_file_allocated_page_is_zeroed() {
        let dir = tempdir().unwrap();
        let file = PagedFile::create(&dir.path().join("t.oxb"), false).unwrap();

        let page_no = file.allocate_page().unwrap();
        let data = file.read_page(page_no).unwrap();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_paged_file_unique_ids() {
        let dir = tempdir().unwrap();
        let f1 = PagedFile::create(&dir.path().join("a.oxb"), false).unwrap();
        let f2 = PagedFile::create(&dir.path().join("b.oxb"), false).unwrap();
        assert_ne!(f1.file_id(), f2.file_id());
    }

    #[test]
    fn test_paged_file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.oxb");
        let page_no;

        {
            let file = PagedFile::create(&path, true).unwrap();
            page_no = file.allocate_page().unwrap();

            let mut data = [0u8; PAGE_SIZE];
            data[0] = 0xFF;
            file.write_page(page_no, &data).unwrap();
        }

        {
            let file = PagedFile::open(&path, true).unwrap();
            assert_eq!(file.num_pages(), 1);
            let read_data = file.read_page(page_no).unwrap();
            assert_eq!(read_data[0], 0xFF);
        }
    }
}
