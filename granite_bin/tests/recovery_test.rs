use std::sync::Arc;
use std::time::Duration;

use strata::buffer_pool::BufferPoolManager;
use strata::log_manager::LogManager;
use strata::log_recovery::LogRecovery;
use strata::table_heap::TableHeap;
use strata::transaction::TransactionManager;
use strata::{Config, DiskManager, Rid, Tuple};
use tempfile::tempdir;

fn test_config() -> Config {
    Config {
        buffer_pool_size: 16,
        log_buffer_size: 16 * 1024,
        log_timeout: Duration::from_millis(50),
        enable_logging: true,
        ..Config::default()
    }
}

fn open_stack(
    dir: &tempfile::TempDir,
) -> (Arc<DiskManager>, Arc<LogManager>, Arc<BufferPoolManager>) {
    let config = test_config();
    let disk = Arc::new(
        DiskManager::open(dir.path().join("test.db"), dir.path().join("test.log")).unwrap(),
    );
    let log = Arc::new(LogManager::new(&config, Arc::clone(&disk)));
    let bpm = Arc::new(BufferPoolManager::new(
        &config,
        Arc::clone(&disk),
        Some(Arc::clone(&log)),
    ));
    (disk, log, bpm)
}

/// Begin txn 7, insert "A" at rid (0, 0), crash without committing or
/// flushing pages. Redo reinstalls the tuple, undo vacates it.
#[test]
fn uncommitted_insert_is_undone() {
    let dir = tempdir().unwrap();
    {
        let (_disk, log, bpm) = open_stack(&dir);
        log.run_flush_thread();
        let tm = TransactionManager::new(1, Some(Arc::clone(&log)));

        let mut txn = tm.begin_with_id(7);
        let heap = TableHeap::create(Arc::clone(&bpm), Some(Arc::clone(&log)), &mut txn).unwrap();
        assert_eq!(heap.first_page_id(), 0);

        let rid = heap
            .insert_tuple(&Tuple::new(b"A".to_vec()), &mut txn)
            .unwrap()
            .unwrap();
        assert_eq!(rid, Rid::new(0, 0));

        // No commit. The log reaches disk; the pages never do.
        log.stop_flush_thread();
    }

    // Restart over the same files.
    let (disk, _log, bpm) = open_stack(&dir);
    let mut recovery = LogRecovery::new(disk, Arc::clone(&bpm), test_config().log_buffer_size);

    recovery.redo().unwrap();
    {
        let guard = bpm.fetch_page(0).unwrap().unwrap();
        assert_eq!(guard.read().get_tuple(0), Some(&b"A"[..]));
    }

    recovery.undo().unwrap();
    {
        let guard = bpm.fetch_page(0).unwrap().unwrap();
        assert_eq!(guard.read().get_tuple(0), None);
    }
}

#[test]
fn committed_insert_survives_crash() {
    let dir = tempdir().unwrap();
    let first_page_id;
    {
        let (_disk, log, bpm) = open_stack(&dir);
        log.run_flush_thread();
        let tm = TransactionManager::new(1, Some(Arc::clone(&log)));

        let mut txn = tm.begin();
        let heap = TableHeap::create(Arc::clone(&bpm), Some(Arc::clone(&log)), &mut txn).unwrap();
        first_page_id = heap.first_page_id();
        heap.insert_tuple(&Tuple::new(b"kept".to_vec()), &mut txn)
            .unwrap()
            .unwrap();
        tm.commit(&mut txn);

        // Crash: pages are never flushed.
        log.stop_flush_thread();
    }

    let (disk, _log, bpm) = open_stack(&dir);
    let mut recovery = LogRecovery::new(disk, Arc::clone(&bpm), test_config().log_buffer_size);
    recovery.redo().unwrap();
    recovery.undo().unwrap();

    let heap = TableHeap::open(Arc::clone(&bpm), None, first_page_id);
    let rows: Vec<_> = heap.iter().map(|r| r.unwrap().1.data).collect();
    assert_eq!(rows, vec![b"kept".to_vec()]);
}

#[test]
fn mixed_transactions_keep_winners_only() {
    let dir = tempdir().unwrap();
    let first_page_id;
    {
        let (_disk, log, bpm) = open_stack(&dir);
        log.run_flush_thread();
        let tm = TransactionManager::new(1, Some(Arc::clone(&log)));

        let mut setup = tm.begin();
        let heap = TableHeap::create(Arc::clone(&bpm), Some(Arc::clone(&log)), &mut setup).unwrap();
        first_page_id = heap.first_page_id();
        tm.commit(&mut setup);

        let mut winner = tm.begin();
        heap.insert_tuple(&Tuple::new(b"winner-1".to_vec()), &mut winner)
            .unwrap()
            .unwrap();
        let mut loser = tm.begin();
        heap.insert_tuple(&Tuple::new(b"loser-1".to_vec()), &mut loser)
            .unwrap()
            .unwrap();
        heap.insert_tuple(&Tuple::new(b"winner-2".to_vec()), &mut winner)
            .unwrap()
            .unwrap();
        heap.insert_tuple(&Tuple::new(b"loser-2".to_vec()), &mut loser)
            .unwrap()
            .unwrap();
        tm.commit(&mut winner);

        log.stop_flush_thread();
    }

    let (disk, _log, bpm) = open_stack(&dir);
    let mut recovery = LogRecovery::new(disk, Arc::clone(&bpm), test_config().log_buffer_size);
    recovery.redo().unwrap();
    recovery.undo().unwrap();

    let heap = TableHeap::open(Arc::clone(&bpm), None, first_page_id);
    let rows: Vec<_> = heap.iter().map(|r| r.unwrap().1.data).collect();
    assert_eq!(rows, vec![b"winner-1".to_vec(), b"winner-2".to_vec()]);
}

#[test]
fn update_and_delete_are_undone() {
    let dir = tempdir().unwrap();
    let first_page_id;
    let victim_rid;
    let updated_rid;
    {
        let (_disk, log, bpm) = open_stack(&dir);
        log.run_flush_thread();
        let tm = TransactionManager::new(1, Some(Arc::clone(&log)));

        let mut setup = tm.begin();
        let heap = TableHeap::create(Arc::clone(&bpm), Some(Arc::clone(&log)), &mut setup).unwrap();
        first_page_id = heap.first_page_id();
        updated_rid = heap
            .insert_tuple(&Tuple::new(b"original".to_vec()), &mut setup)
            .unwrap()
            .unwrap();
        victim_rid = heap
            .insert_tuple(&Tuple::new(b"survives".to_vec()), &mut setup)
            .unwrap()
            .unwrap();
        tm.commit(&mut setup);
        bpm.flush_all_pages().unwrap();

        // A loser transaction mutates both rows, then the process dies.
        let mut loser = tm.begin();
        heap.update_tuple(updated_rid, &Tuple::new(b"clobber!".to_vec()), &mut loser)
            .unwrap();
        heap.mark_delete(victim_rid, &mut loser).unwrap();
        log.flush();

        log.stop_flush_thread();
    }

    let (disk, _log, bpm) = open_stack(&dir);
    let mut recovery = LogRecovery::new(disk, Arc::clone(&bpm), test_config().log_buffer_size);
    recovery.redo().unwrap();
    recovery.undo().unwrap();

    let heap = TableHeap::open(Arc::clone(&bpm), None, first_page_id);
    assert_eq!(
        heap.get_tuple(updated_rid).unwrap(),
        Some(Tuple::new(b"original".to_vec()))
    );
    assert_eq!(
        heap.get_tuple(victim_rid).unwrap(),
        Some(Tuple::new(b"survives".to_vec()))
    );
}

/// Running redo + undo twice must land in the same state as once.
#[test]
fn recovery_is_idempotent() {
    let dir = tempdir().unwrap();
    let first_page_id;
    {
        let (_disk, log, bpm) = open_stack(&dir);
        log.run_flush_thread();
        let tm = TransactionManager::new(1, Some(Arc::clone(&log)));

        let mut committed = tm.begin();
        let heap =
            TableHeap::create(Arc::clone(&bpm), Some(Arc::clone(&log)), &mut committed).unwrap();
        first_page_id = heap.first_page_id();
        heap.insert_tuple(&Tuple::new(b"stays".to_vec()), &mut committed)
            .unwrap()
            .unwrap();
        tm.commit(&mut committed);

        let mut loser = tm.begin();
        heap.insert_tuple(&Tuple::new(b"goes".to_vec()), &mut loser)
            .unwrap()
            .unwrap();
        log.flush();
        log.stop_flush_thread();
    }

    let collect = |bpm: &Arc<BufferPoolManager>| {
        let heap = TableHeap::open(Arc::clone(bpm), None, first_page_id);
        heap.iter().map(|r| r.unwrap().1.data).collect::<Vec<_>>()
    };

    let (disk, _log, bpm) = open_stack(&dir);
    let buffer_size = test_config().log_buffer_size;

    let mut recovery = LogRecovery::new(Arc::clone(&disk), Arc::clone(&bpm), buffer_size);
    recovery.redo().unwrap();
    recovery.undo().unwrap();
    let after_once = collect(&bpm);
    bpm.flush_all_pages().unwrap();

    let mut recovery = LogRecovery::new(Arc::clone(&disk), Arc::clone(&bpm), buffer_size);
    recovery.redo().unwrap();
    recovery.undo().unwrap();
    let after_twice = collect(&bpm);

    assert_eq!(after_once, vec![b"stays".to_vec()]);
    assert_eq!(after_once, after_twice);
}

/// Evicting a dirty page must force the log past the page's LSN first.
#[test]
fn eviction_forces_log_ahead_of_page() {
    let dir = tempdir().unwrap();
    // A long timeout keeps the background flush out of the way: only the
    // eviction interlock may advance the persistent LSN here.
    let config = Config {
        buffer_pool_size: 1,
        log_timeout: Duration::from_secs(60),
        ..test_config()
    };
    let disk = Arc::new(
        DiskManager::open(dir.path().join("test.db"), dir.path().join("test.log")).unwrap(),
    );
    let log = Arc::new(LogManager::new(&config, Arc::clone(&disk)));
    let bpm = Arc::new(BufferPoolManager::new(
        &config,
        Arc::clone(&disk),
        Some(Arc::clone(&log)),
    ));
    log.run_flush_thread();

    let tm = TransactionManager::new(1, Some(Arc::clone(&log)));
    let mut txn = tm.begin();
    let heap = TableHeap::create(Arc::clone(&bpm), Some(Arc::clone(&log)), &mut txn).unwrap();
    heap.insert_tuple(&Tuple::new(b"forces wal".to_vec()), &mut txn)
        .unwrap()
        .unwrap();

    let page_lsn = {
        let guard = bpm.fetch_page(heap.first_page_id()).unwrap().unwrap();
        let lsn = guard.read().lsn();
        lsn
    };
    assert!(page_lsn > log.persistent_lsn());

    // The only frame is taken by a new page; the dirty heap page is
    // evicted and the WAL interlock must have flushed first.
    let _guard = bpm.new_page().unwrap().unwrap();
    assert!(log.persistent_lsn() >= page_lsn);

    log.stop_flush_thread();
}
