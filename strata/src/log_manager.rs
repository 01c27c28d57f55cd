//! The log manager: a double-buffered, group-committing append pipeline.
//!
//! Appenders serialize records into `log_buffer` under the latch. A
//! dedicated flush thread wakes on demand (buffer full, explicit flush,
//! eviction interlock) or on a timeout, swaps the two buffers, writes the
//! full one out, and advances the persistent LSN. A caller that observes
//! `persistent_lsn() >= lsn` may treat the record as durable.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crate::disk::DiskManager;
use crate::log_record::LogRecord;
use crate::{Config, Lsn, INVALID_LSN};

struct LogBuffers {
    log_buffer: Vec<u8>,
    flush_buffer: Vec<u8>,
    next_lsn: Lsn,
    need_flush: bool,
}

pub struct LogManager {
    disk: Arc<DiskManager>,
    buffers: Mutex<LogBuffers>,
    /// Wakes the flush thread.
    flush_cv: Condvar,
    /// Wakes appenders blocked on a full buffer and `flush()` waiters.
    append_cv: Condvar,
    persistent_lsn: AtomicI32,
    running: AtomicBool,
    flush_thread: Mutex<Option<thread::JoinHandle<()>>>,
    buffer_capacity: usize,
    log_timeout: Duration,
}

impl LogManager {
    pub fn new(config: &Config, disk: Arc<DiskManager>) -> Self {
        Self {
            disk,
            buffers: Mutex::new(LogBuffers {
                log_buffer: Vec::with_capacity(config.log_buffer_size),
                flush_buffer: Vec::with_capacity(config.log_buffer_size),
                next_lsn: 0,
                need_flush: false,
            }),
            flush_cv: Condvar::new(),
            append_cv: Condvar::new(),
            persistent_lsn: AtomicI32::new(INVALID_LSN),
            running: AtomicBool::new(false),
            flush_thread: Mutex::new(None),
            buffer_capacity: config.log_buffer_size,
            log_timeout: config.log_timeout,
        }
    }

    /// Highest LSN durably on disk.
    pub fn persistent_lsn(&self) -> Lsn {
        self.persistent_lsn.load(Ordering::SeqCst)
    }

    /// Next LSN that will be assigned.
    pub fn next_lsn(&self) -> Lsn {
        self.buffers.lock().unwrap().next_lsn
    }

    /// Continues the LSN sequence after recovery: records below `next_lsn`
    /// already sit in the log file, so they count as durable.
    pub fn set_next_lsn(&self, next_lsn: Lsn) {
        let mut buffers = self.buffers.lock().unwrap();
        buffers.next_lsn = next_lsn;
        self.persistent_lsn.store(next_lsn - 1, Ordering::SeqCst);
    }

    /// Assigns the record its LSN and serializes it into the log buffer,
    /// blocking while the buffer has no room.
    pub fn append_log_record(&self, record: &mut LogRecord) -> Lsn {
        debug_assert!(record.size as usize <= self.buffer_capacity);
        let mut buffers = self.buffers.lock().unwrap();

        while buffers.log_buffer.len() + record.size as usize > self.buffer_capacity {
            buffers.need_flush = true;
            self.flush_cv.notify_one();
            buffers = self.append_cv.wait(buffers).unwrap();
        }

        record.lsn = buffers.next_lsn;
        buffers.next_lsn += 1;
        record.serialize_into(&mut buffers.log_buffer);
        record.lsn
    }

    /// Forces everything appended so far to disk before returning.
    pub fn flush(&self) {
        let mut buffers = self.buffers.lock().unwrap();
        if !self.running.load(Ordering::SeqCst) {
            Self::write_out(&mut buffers, &self.disk, &self.persistent_lsn);
            buffers.need_flush = false;
            return;
        }

        buffers.need_flush = true;
        self.flush_cv.notify_one();
        while buffers.need_flush {
            buffers = self.append_cv.wait(buffers).unwrap();
        }
    }

    /// Starts the background flush thread. Idempotent.
    pub fn run_flush_thread(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let lm = Arc::clone(self);
        let handle = thread::spawn(move || {
            while lm.running.load(Ordering::SeqCst) {
                let buffers = lm.buffers.lock().unwrap();
                let (mut buffers, _timeout) = lm
                    .flush_cv
                    .wait_timeout_while(buffers, lm.log_timeout, |b| {
                        !b.need_flush && lm.running.load(Ordering::SeqCst)
                    })
                    .unwrap();

                LogManager::write_out(&mut buffers, &lm.disk, &lm.persistent_lsn);
                buffers.need_flush = false;
                lm.append_cv.notify_all();
            }
        });
        *self.flush_thread.lock().unwrap() = Some(handle);
    }

    /// Stops and joins the flush thread, draining anything still buffered.
    pub fn stop_flush_thread(&self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        self.flush_cv.notify_all();
        if was_running {
            if let Some(handle) = self.flush_thread.lock().unwrap().take() {
                let _ = handle.join();
            }
        }

        let mut buffers = self.buffers.lock().unwrap();
        Self::write_out(&mut buffers, &self.disk, &self.persistent_lsn);
        buffers.need_flush = false;
        self.append_cv.notify_all();
    }

    /// Swaps the buffers and writes the full one. Called with the latch
    /// held; appenders queue on the latch for the duration of the write.
    fn write_out(buffers: &mut LogBuffers, disk: &DiskManager, persistent_lsn: &AtomicI32) {
        if buffers.log_buffer.is_empty() {
            return;
        }

        let durable_lsn = buffers.next_lsn - 1;
        let LogBuffers {
            log_buffer,
            flush_buffer,
            ..
        } = buffers;
        std::mem::swap(log_buffer, flush_buffer);

        // A lost WAL write is fatal.
        disk.write_log(flush_buffer).expect("log write failed");
        flush_buffer.clear();
        persistent_lsn.store(durable_lsn, Ordering::SeqCst);
    }
}

impl Drop for LogManager {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            self.stop_flush_thread();
        }
    }
}
