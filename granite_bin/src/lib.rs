//! Granite database driver: catalog, query operators, and the
//! startup/shutdown glue that wires recovery in front of the storage
//! engine.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use strata::buffer_pool::BufferPoolManager;
use strata::disk::DiskManager;
use strata::log_manager::LogManager;
use strata::log_recovery::LogRecovery;
use strata::transaction::TransactionManager;
use strata::Config;

pub mod catalog;
pub mod errors;
pub mod executor;
pub mod types;

pub fn debug_logs_enabled() -> bool {
    std::env::var_os("GRANITE_DEBUG_LOG").is_some()
}

#[macro_export]
macro_rules! granite_debug_log {
    ($($arg:tt)*) => {
        if $crate::debug_logs_enabled() {
            println!($($arg)*);
        }
    };
}

/// The assembled engine. Construction runs recovery before anything else
/// touches the data file; shutdown drains the log and the pool.
pub struct Database {
    pub disk: Arc<DiskManager>,
    pub bpm: Arc<BufferPoolManager>,
    pub log: Option<Arc<LogManager>>,
    pub tm: TransactionManager,
    pub catalog: Mutex<catalog::Catalog>,
}

impl Database {
    /// Opens (or creates) the database. If logging is enabled and a log
    /// exists, replays it (redo, then undo of losers) before starting the
    /// flush thread and accepting work.
    pub fn open<P: AsRef<Path>>(config: &Config, db_path: P, log_path: P) -> io::Result<Self> {
        let disk = Arc::new(DiskManager::open(db_path, log_path)?);
        let log = config
            .enable_logging
            .then(|| Arc::new(LogManager::new(config, Arc::clone(&disk))));
        let bpm = Arc::new(BufferPoolManager::new(
            config,
            Arc::clone(&disk),
            log.clone(),
        ));

        if config.enable_logging && disk.log_size() > 0 {
            crate::granite_debug_log!("[Database::open] Log present, running recovery");
            let mut recovery =
                LogRecovery::new(Arc::clone(&disk), Arc::clone(&bpm), config.log_buffer_size);
            recovery.redo()?;
            recovery.undo()?;
            bpm.flush_all_pages()?;
            if let Some(log) = &log {
                log.set_next_lsn(recovery.max_lsn() + 1);
            }
            crate::granite_debug_log!(
                "[Database::open] Recovery done, next LSN {}",
                recovery.max_lsn() + 1
            );
        }

        if let Some(log) = &log {
            log.run_flush_thread();
        }

        let tm = TransactionManager::new(1, log.clone());
        let catalog = Mutex::new(catalog::Catalog::new(Arc::clone(&bpm), log.clone()));

        Ok(Self {
            disk,
            bpm,
            log,
            tm,
            catalog,
        })
    }

    /// Stops the flush thread (forcing a final flush), writes out every
    /// dirty page, and syncs the files.
    pub fn shutdown(&self) -> io::Result<()> {
        if let Some(log) = &self.log {
            log.stop_flush_thread();
        }
        self.bpm.flush_all_pages()?;
        self.disk.shut_down()
    }
}
