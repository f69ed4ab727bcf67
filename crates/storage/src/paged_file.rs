use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use common::{DbError, DbResult};

/// The file descriptor page (page 0) every paged file carries: `page_size`
/// and `num_pages`, both encoded as big-endian `u64`s in the page's first 16
/// bytes. The remainder of page 0 is unused padding.
const FILE_HEADER_LEN: usize = 16;

/// Fixed-size block storage shared by table files and B+-tree index files.
/// Page 0 is a self-describing header (`page_size`, `num_pages`); pages 1..
/// are owned by the caller (`Table`/`BTreeIndex`), which lays out its own
/// chained-page structure on top.
#[derive(Debug)]
pub struct PagedFile {
    file: File,
    path: PathBuf,
    page_size: u64,
    num_pages: u64,
}

impl PagedFile {
    /// Create a new paged file at `path` with `page_size` bytes per page,
    /// writing the page 0 header. Fails if a file already exists there.
    pub fn create(path: &Path, page_size: u64) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        let mut pf = Self {
            file,
            path: path.to_path_buf(),
            page_size,
            num_pages: 1,
        };
        pf.file.set_len(page_size)?;
        pf.write_header()?;
        Ok(pf)
    }

    /// Open an existing paged file, reading back its page 0 header.
    pub fn open(path: &Path) -> DbResult<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut header = vec![0u8; FILE_HEADER_LEN];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header)?;
        let page_size = u64::from_be_bytes(header[0..8].try_into().unwrap());
        let num_pages = u64::from_be_bytes(header[8..16].try_into().unwrap());
        Ok(Self {
            file,
            path: path.to_path_buf(),
            page_size,
            num_pages,
        })
    }

    /// Flush and drop the underlying file handle.
    pub fn close(mut self) -> DbResult<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Delete a closed paged file from disk.
    pub fn remove(path: &Path) -> DbResult<()> {
        fs::remove_file(path)?;
        Ok(())
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn num_pages(&self) -> u64 {
        self.num_pages
    }

    fn write_header(&mut self) -> DbResult<()> {
        let mut buf = vec![0u8; self.page_size as usize];
        buf[0..8].copy_from_slice(&self.page_size.to_be_bytes());
        buf[8..16].copy_from_slice(&self.num_pages.to_be_bytes());
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    /// Read a full page's raw bytes.
    pub fn read_page(&mut self, page_id: u64) -> DbResult<Vec<u8>> {
        if page_id >= self.num_pages {
            return Err(DbError::OpenTableFailed { cause: None });
        }
        let mut buf = vec![0u8; self.page_size as usize];
        self.file
            .seek(SeekFrom::Start(page_id * self.page_size))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Overwrite a full page's raw bytes. `data` must be exactly `page_size`
    /// bytes.
    pub fn write_page(&mut self, page_id: u64, data: &[u8]) -> DbResult<()> {
        debug_assert_eq!(data.len() as u64, self.page_size);
        self.file
            .seek(SeekFrom::Start(page_id * self.page_size))?;
        self.file.write_all(data)?;
        Ok(())
    }

    /// Append a new zero-initialized page and return its id.
    pub fn allocate_page(&mut self) -> DbResult<u64> {
        let id = self.num_pages;
        self.num_pages += 1;
        self.file.set_len(self.num_pages * self.page_size)?;
        self.write_header()?;
        let zeros = vec![0u8; self.page_size as usize];
        self.write_page(id, &zeros)?;
        Ok(id)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl buffer::PageStore for PagedFile {
    fn page_size(&self) -> u64 {
        PagedFile::page_size(self)
    }

    fn num_pages(&self) -> u64 {
        PagedFile::num_pages(self)
    }

    fn allocate_page(&mut self) -> DbResult<u64> {
        PagedFile::allocate_page(self)
    }

    fn read_page(&mut self, id: u64) -> DbResult<Vec<u8>> {
        PagedFile::read_page(self, id)
    }

    fn write_page(&mut self, id: u64, data: &[u8]) -> DbResult<()> {
        PagedFile::write_page(self, id, data)
    }
}
