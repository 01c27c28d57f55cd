//! The disk manager. Owns the data file and the log file; all I/O is
//! synchronous and an I/O error is fatal to the caller.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use crate::{PageId, PAGE_SIZE};

struct LogFile {
    file: File,
    size: u64,
}

pub struct DiskManager {
    db_file: Mutex<File>,
    log_file: Mutex<LogFile>,
    next_page_id: AtomicI32,
}

impl DiskManager {
    /// Opens (or creates) the data file and the log file.
    pub fn open<P: AsRef<Path>>(db_path: P, log_path: P) -> io::Result<Self> {
        let db_ref = db_path.as_ref();
        crate::strata_debug_log!("[DiskManager::open] Opening data file at: {db_ref:?}");
        if let Some(parent) = db_ref.parent() {
            create_dir_all(parent)?;
        }
        let db_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(db_ref)?;

        let file_size = db_file.metadata()?.len();
        let next_page_id = (file_size / PAGE_SIZE as u64) as PageId;
        crate::strata_debug_log!(
            "[DiskManager::open] Data file size: {file_size}, next_page_id: {next_page_id}"
        );

        let log_ref = log_path.as_ref();
        let log_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(log_ref)?;
        let log_size = log_file.metadata()?.len();

        Ok(Self {
            db_file: Mutex::new(db_file),
            log_file: Mutex::new(LogFile {
                file: log_file,
                size: log_size,
            }),
            next_page_id: AtomicI32::new(next_page_id),
        })
    }

    /// Reads one page into `buf`. A page past the end of the file (or a
    /// short read at the tail) comes back zero-filled.
    pub fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> io::Result<()> {
        crate::strata_debug_log!("[DiskManager::read_page] Reading page_id: {page_id}");
        let mut file = self.db_file.lock().unwrap();
        let offset = page_id as u64 * PAGE_SIZE as u64;
        if offset >= file.metadata()?.len() {
            buf.fill(0);
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut read = 0;
        while read < PAGE_SIZE {
            let n = file.read(&mut buf[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }
        if read < PAGE_SIZE {
            buf[read..].fill(0);
        }
        Ok(())
    }

    pub fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> io::Result<()> {
        crate::strata_debug_log!("[DiskManager::write_page] Writing page_id: {page_id}");
        let mut file = self.db_file.lock().unwrap();
        let offset = page_id as u64 * PAGE_SIZE as u64;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        file.sync_all()?;
        // Writing past the end (recovery re-creating pages) moves the
        // allocator watermark so those ids are never handed out again.
        self.next_page_id.fetch_max(page_id + 1, Ordering::SeqCst);
        Ok(())
    }

    /// Allocates a fresh page id. Ids are assigned monotonically and
    /// deallocated ids are never reused.
    pub fn allocate_page(&self) -> PageId {
        let page_id = self.next_page_id.fetch_add(1, Ordering::SeqCst);
        crate::strata_debug_log!("[DiskManager::allocate_page] Allocated page_id: {page_id}");
        page_id
    }

    pub fn deallocate_page(&self, _page_id: PageId) {}

    /// Appends `buf` to the log file and syncs it. Once this returns, the
    /// bytes are durable.
    pub fn write_log(&self, buf: &[u8]) -> io::Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let mut log = self.log_file.lock().unwrap();
        let offset = log.size;
        log.file.seek(SeekFrom::Start(offset))?;
        log.file.write_all(buf)?;
        log.file.sync_all()?;
        log.size += buf.len() as u64;
        Ok(())
    }

    /// Reads up to `buf.len()` log bytes starting at `offset`. Returns the
    /// number of bytes read; 0 means end of log.
    pub fn read_log(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut log = self.log_file.lock().unwrap();
        if offset >= log.size {
            return Ok(0);
        }

        log.file.seek(SeekFrom::Start(offset))?;
        let mut read = 0;
        while read < buf.len() {
            let n = log.file.read(&mut buf[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }
        Ok(read)
    }

    /// Size of the log file in bytes.
    pub fn log_size(&self) -> u64 {
        self.log_file.lock().unwrap().size
    }

    pub fn shut_down(&self) -> io::Result<()> {
        self.db_file.lock().unwrap().sync_all()?;
        self.log_file.lock().unwrap().file.sync_all()?;
        Ok(())
    }
}
