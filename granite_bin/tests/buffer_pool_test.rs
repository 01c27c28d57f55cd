use std::sync::Arc;

use rand::{Rng, SeedableRng};
use strata::{BufferPoolManager, Config, DiskManager, PAGE_SIZE};
use tempfile::tempdir;

fn make_disk(dir: &tempfile::TempDir) -> Arc<DiskManager> {
    Arc::new(
        DiskManager::open(dir.path().join("test.db"), dir.path().join("test.log")).unwrap(),
    )
}

fn make_pool(disk: &Arc<DiskManager>, size: usize) -> BufferPoolManager {
    let config = Config {
        buffer_pool_size: size,
        enable_logging: false,
        ..Config::default()
    };
    BufferPoolManager::new(&config, Arc::clone(disk), None)
}

fn write_str(guard: &strata::PageGuard<'_>, s: &str) {
    let mut page = guard.write();
    page.data[..s.len()].copy_from_slice(s.as_bytes());
}

fn read_str(guard: &strata::PageGuard<'_>, len: usize) -> Vec<u8> {
    guard.read().data[..len].to_vec()
}

#[test]
fn pool_capacity() {
    let dir = tempdir().unwrap();
    let disk = make_disk(&dir);
    let bpm = make_pool(&disk, 10);

    let mut guards = Vec::new();
    for i in 0..10 {
        let guard = bpm.new_page().unwrap().expect("pool has room");
        assert_eq!(guard.page_id(), i);
        guards.push(guard);
    }

    // Every frame pinned: no new page.
    assert!(bpm.new_page().unwrap().is_none());

    // Unpin page 0 dirty; the next new page takes its frame.
    write_str(&guards[0], "evict me");
    guards.remove(0);
    let guard = bpm.new_page().unwrap().expect("one frame was freed");
    assert_eq!(guard.page_id(), 10);
}

#[test]
fn persist_and_restart() {
    let strings = [
        "Hello",
        "World",
        "This",
        "Is",
        "A",
        "Persistent Start Test",
        "For",
        "Buffer Pool Manager",
        "In",
        "DBMS",
    ];

    let dir = tempdir().unwrap();
    let disk = make_disk(&dir);
    {
        let bpm = make_pool(&disk, 10);
        for (i, s) in strings.iter().enumerate() {
            let guard = bpm.new_page().unwrap().unwrap();
            assert_eq!(guard.page_id(), i as i32);
            write_str(&guard, s);
        }
        bpm.flush_all_pages().unwrap();
    }

    let bpm = make_pool(&disk, 10);
    for (i, s) in strings.iter().enumerate() {
        let guard = bpm.fetch_page(i as i32).unwrap().unwrap();
        assert_eq!(read_str(&guard, s.len()), s.as_bytes());
    }
}

#[test]
fn binary_data_round_trip() {
    let dir = tempdir().unwrap();
    let disk = make_disk(&dir);
    let bpm = make_pool(&disk, 10);

    let mut rng = rand::rngs::StdRng::seed_from_u64(15645);
    let mut random_binary_data = [0u8; PAGE_SIZE];
    rng.fill(&mut random_binary_data[..]);
    random_binary_data[PAGE_SIZE / 2] = 0;
    random_binary_data[PAGE_SIZE - 1] = 0;

    {
        let guard = bpm.new_page().unwrap().unwrap();
        assert_eq!(guard.page_id(), 0);
        guard.write().data.copy_from_slice(&random_binary_data);
    }

    // Push page 0 out of the pool.
    for _ in 0..10 {
        let _ = bpm.new_page().unwrap().unwrap();
    }

    let guard = bpm.fetch_page(0).unwrap().unwrap();
    assert_eq!(guard.read().data[..], random_binary_data[..]);
}

#[test]
fn dirty_semantics() {
    let dir = tempdir().unwrap();
    let disk = make_disk(&dir);
    let bpm = make_pool(&disk, 1);

    {
        let guard = bpm.new_page().unwrap().unwrap();
        assert_eq!(guard.page_id(), 0);
        assert_eq!(bpm.is_dirty(0), Some(false));
        write_str(&guard, "Database");
    }
    assert_eq!(bpm.is_dirty(0), Some(true));

    {
        let guard = bpm.fetch_page(0).unwrap().unwrap();
        assert_eq!(read_str(&guard, 8), b"Database");
        assert_eq!(bpm.is_dirty(0), Some(true));
    }

    // Page 1 evicts page 0 (flushing it), gets dirtied and deleted.
    {
        let guard = bpm.new_page().unwrap().unwrap();
        assert_eq!(guard.page_id(), 1);
        write_str(&guard, "DBMS");
    }
    assert!(bpm.delete_page(1).unwrap());

    let guard = bpm.fetch_page(0).unwrap().unwrap();
    assert_eq!(bpm.is_dirty(0), Some(false));
    assert_eq!(read_str(&guard, 8), b"Database");
}

#[test]
fn unpin_and_delete_error_paths() {
    let dir = tempdir().unwrap();
    let disk = make_disk(&dir);
    let bpm = make_pool(&disk, 2);

    let guard = bpm.new_page().unwrap().unwrap();
    let id = guard.page_id();

    // Pinned pages cannot be deleted.
    assert!(!bpm.delete_page(id).unwrap());
    drop(guard);

    // Unpinning a page with no pins, or a non-resident page, fails.
    assert!(!bpm.unpin_page(id, false));
    assert!(!bpm.unpin_page(12345, false));

    // Flushing a non-resident page reports false.
    assert!(!bpm.flush_page(12345).unwrap());

    assert!(bpm.delete_page(id).unwrap());
}

#[test]
fn pinned_pages_survive_pressure() {
    let dir = tempdir().unwrap();
    let disk = make_disk(&dir);
    let bpm = make_pool(&disk, 3);

    let keeper = bpm.new_page().unwrap().unwrap();
    write_str(&keeper, "pinned");

    // Churn the two remaining frames hard.
    for _ in 0..20 {
        let _ = bpm.new_page().unwrap().unwrap();
    }

    assert_eq!(read_str(&keeper, 6), b"pinned");
    assert_eq!(bpm.pin_count(keeper.page_id()), Some(1));
}
