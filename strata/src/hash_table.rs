//! A persistent linear-probing hash index over the buffer pool.
//!
//! Keys hash to a slot; probing walks bucket by bucket, rolling over block
//! pages (and wrapping) until the terminating condition of the operation.
//! The occupied bit is a tombstone, so probe chains survive removals. A
//! full sweep on insert triggers a doubling resize.
//!
//! Latching: the table latch is held shared by get/insert/remove and
//! exclusively by resize, so a reader overlapping a resize sees the old or
//! the new table in its entirety. Block pages are latched one at a time;
//! the latch is released before the probe crosses to the next block.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use crate::buffer_pool::BufferPoolManager;
use crate::hash_page::{block_capacity, BlockPageMut, BlockPageRef, MAX_BLOCK_PAGES};
use crate::transaction::Transaction;
use crate::PageId;

fn all_frames_pinned() -> io::Error {
    io::Error::other("all pages are pinned")
}

/// Key equality as seen by the table. Supplied by the caller; the default
/// just defers to `PartialEq`.
pub trait KeyComparator<K>: Clone {
    fn compare_eq(&self, lhs: &K, rhs: &K) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyComparator;

impl<K: PartialEq> KeyComparator<K> for DefaultKeyComparator {
    fn compare_eq(&self, lhs: &K, rhs: &K) -> bool {
        lhs == rhs
    }
}

pub struct LinearProbeHashTable<K, V, C = DefaultKeyComparator> {
    bpm: Arc<BufferPoolManager>,
    header_page_id: PageId,
    comparator: C,
    table_latch: RwLock<()>,
    _marker: PhantomData<(K, V)>,
}

impl<K, V, C> LinearProbeHashTable<K, V, C>
where
    K: Copy + Hash,
    V: Copy + PartialEq,
    C: KeyComparator<K>,
{
    /// Creates a table with at least `num_buckets` slots, rounded up to
    /// whole block pages.
    pub fn new(
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        num_buckets: usize,
    ) -> io::Result<Self> {
        let slots_per_block = block_capacity::<K, V>();
        let block_count = num_buckets.div_ceil(slots_per_block).max(1);
        assert!(block_count <= MAX_BLOCK_PAGES);

        let header_guard = bpm.new_page()?.ok_or_else(all_frames_pinned)?;
        let header_page_id = header_guard.page_id();
        {
            let mut header = header_guard.write();
            header.init_hash_header_page(header_page_id);
            header.set_hash_header_size(block_count);
        }

        for _ in 0..block_count {
            let block_guard = bpm.new_page()?.ok_or_else(all_frames_pinned)?;
            BlockPageMut::<K, V>::new(&mut block_guard.write()).reset();
            header_guard
                .write()
                .hash_add_block_page_id(block_guard.page_id());
        }

        crate::strata_debug_log!(
            "[LinearProbeHashTable::new] Header page {header_page_id}, {block_count} block pages"
        );
        drop(header_guard);
        Ok(Self {
            bpm,
            header_page_id,
            comparator,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        })
    }

    /// Reattaches to a table persisted under `header_page_id`.
    pub fn open(bpm: Arc<BufferPoolManager>, comparator: C, header_page_id: PageId) -> Self {
        Self {
            bpm,
            header_page_id,
            comparator,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        }
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    /// Total slot capacity.
    pub fn size(&self) -> io::Result<usize> {
        let _latch = self.table_latch.read().unwrap();
        let header_guard = self
            .bpm
            .fetch_page(self.header_page_id)?
            .ok_or_else(all_frames_pinned)?;
        let blocks = header_guard.read().hash_num_block_pages();
        Ok(blocks * block_capacity::<K, V>())
    }

    /// Collects every value stored under `key`.
    pub fn get_value(
        &self,
        _txn: Option<&Transaction>,
        key: &K,
        result: &mut Vec<V>,
    ) -> io::Result<bool> {
        let _latch = self.table_latch.read().unwrap();
        let header_guard = self
            .bpm
            .fetch_page(self.header_page_id)?
            .ok_or_else(all_frames_pinned)?;

        let slots_per_block = block_capacity::<K, V>();
        let num_blocks = header_guard.read().hash_num_block_pages();
        let total_slots = slots_per_block * num_blocks;
        let start = self.hash_of(key) % total_slots;

        let found_before = result.len();
        let mut current = start;
        let mut probed = 0;
        'sweep: while probed < total_slots {
            let block_index = current / slots_per_block;
            let block_page_id = header_guard.read().hash_block_page_id(block_index);
            let block_guard = self
                .bpm
                .fetch_page(block_page_id)?
                .ok_or_else(all_frames_pinned)?;
            let page = block_guard.read();
            let block = BlockPageRef::<K, V>::new(&page);

            while probed < total_slots && current / slots_per_block == block_index {
                let bucket = current % slots_per_block;
                if !block.is_occupied(bucket) {
                    break 'sweep;
                }
                if block.is_readable(bucket)
                    && self.comparator.compare_eq(key, &block.key_at(bucket))
                {
                    result.push(block.value_at(bucket));
                }
                current = (current + 1) % total_slots;
                probed += 1;
            }
        }

        Ok(result.len() > found_before)
    }

    /// Inserts `(key, value)`. False iff the exact pair already exists. A
    /// table with no free slot on the probe path is resized and the insert
    /// retried.
    pub fn insert(&self, _txn: Option<&Transaction>, key: &K, value: &V) -> io::Result<bool> {
        loop {
            let current_size;
            {
                let _latch = self.table_latch.read().unwrap();
                let header_guard = self
                    .bpm
                    .fetch_page(self.header_page_id)?
                    .ok_or_else(all_frames_pinned)?;

                let slots_per_block = block_capacity::<K, V>();
                let num_blocks = header_guard.read().hash_num_block_pages();
                let total_slots = slots_per_block * num_blocks;
                let start = self.hash_of(key) % total_slots;

                let mut current = start;
                let mut probed = 0;
                while probed < total_slots {
                    let block_index = current / slots_per_block;
                    let block_page_id = header_guard.read().hash_block_page_id(block_index);
                    let block_guard = self
                        .bpm
                        .fetch_page(block_page_id)?
                        .ok_or_else(all_frames_pinned)?;
                    let mut page = block_guard.write();
                    let mut block = BlockPageMut::<K, V>::new(&mut page);

                    while probed < total_slots && current / slots_per_block == block_index {
                        let bucket = current % slots_per_block;
                        if block.insert(bucket, *key, *value) {
                            return Ok(true);
                        }
                        if self.comparator.compare_eq(key, &block.key_at(bucket))
                            && *value == block.value_at(bucket)
                        {
                            // The pair already lives here.
                            return Ok(false);
                        }
                        current = (current + 1) % total_slots;
                        probed += 1;
                    }
                }
                current_size = total_slots;
            }

            // Full sweep without a claimable slot: grow and try again.
            self.resize(current_size)?;
        }
    }

    /// Removes `(key, value)`. False if the pair is not present.
    pub fn remove(&self, _txn: Option<&Transaction>, key: &K, value: &V) -> io::Result<bool> {
        let _latch = self.table_latch.read().unwrap();
        let header_guard = self
            .bpm
            .fetch_page(self.header_page_id)?
            .ok_or_else(all_frames_pinned)?;

        let slots_per_block = block_capacity::<K, V>();
        let num_blocks = header_guard.read().hash_num_block_pages();
        let total_slots = slots_per_block * num_blocks;
        let start = self.hash_of(key) % total_slots;

        let mut current = start;
        let mut probed = 0;
        while probed < total_slots {
            let block_index = current / slots_per_block;
            let block_page_id = header_guard.read().hash_block_page_id(block_index);
            let block_guard = self
                .bpm
                .fetch_page(block_page_id)?
                .ok_or_else(all_frames_pinned)?;
            let mut page = block_guard.write();
            let mut block = BlockPageMut::<K, V>::new(&mut page);

            while probed < total_slots && current / slots_per_block == block_index {
                let bucket = current % slots_per_block;
                if !block.is_occupied(bucket) {
                    return Ok(false);
                }
                if self.comparator.compare_eq(key, &block.key_at(bucket))
                    && *value == block.value_at(bucket)
                {
                    if block.is_readable(bucket) {
                        block.remove(bucket);
                        return Ok(true);
                    }
                    // Tombstoned: already removed.
                    return Ok(false);
                }
                current = (current + 1) % total_slots;
                probed += 1;
            }
        }
        Ok(false)
    }

    /// Doubles the table from `initial_size` slots, migrating every
    /// readable entry (tombstones are not copied). The new block pages are
    /// made durable first; rewriting the header page in place is the
    /// commit point, after which the old block pages are deleted.
    pub fn resize(&self, initial_size: usize) -> io::Result<()> {
        let _latch = self.table_latch.write().unwrap();
        let slots_per_block = block_capacity::<K, V>();

        let header_guard = self
            .bpm
            .fetch_page(self.header_page_id)?
            .ok_or_else(all_frames_pinned)?;
        let old_block_ids: Vec<PageId> = {
            let header = header_guard.read();
            (0..header.hash_num_block_pages())
                .map(|i| header.hash_block_page_id(i))
                .collect()
        };

        // A racing insert may have resized first.
        if old_block_ids.len() * slots_per_block > initial_size {
            return Ok(());
        }

        let new_block_count = (2 * initial_size).div_ceil(slots_per_block).max(1);
        assert!(new_block_count <= MAX_BLOCK_PAGES);
        crate::strata_debug_log!(
            "[LinearProbeHashTable::resize] {initial_size} slots -> {} blocks",
            new_block_count
        );

        let mut new_block_ids = Vec::with_capacity(new_block_count);
        for _ in 0..new_block_count {
            let block_guard = self.bpm.new_page()?.ok_or_else(all_frames_pinned)?;
            BlockPageMut::<K, V>::new(&mut block_guard.write()).reset();
            new_block_ids.push(block_guard.page_id());
        }

        for &old_id in &old_block_ids {
            let old_guard = self.bpm.fetch_page(old_id)?.ok_or_else(all_frames_pinned)?;
            let old_page = old_guard.read();
            let old_block = BlockPageRef::<K, V>::new(&old_page);
            for bucket in 0..slots_per_block {
                if old_block.is_readable(bucket) {
                    self.insert_into_blocks(
                        &new_block_ids,
                        &old_block.key_at(bucket),
                        &old_block.value_at(bucket),
                    )?;
                }
            }
        }

        // Durability order: blocks first, then the header as the pivot.
        for &id in &new_block_ids {
            self.bpm.flush_page(id)?;
        }
        {
            let mut header = header_guard.write();
            header.init_hash_header_page(self.header_page_id);
            header.set_hash_header_size(new_block_count);
            for &id in &new_block_ids {
                header.hash_add_block_page_id(id);
            }
        }
        self.bpm.flush_page(self.header_page_id)?;

        for &id in &old_block_ids {
            self.bpm.delete_page(id)?;
        }
        Ok(())
    }

    /// Plain probing insert against an explicit block set; used only by
    /// resize, where the migrated entries are known to be distinct.
    fn insert_into_blocks(&self, block_ids: &[PageId], key: &K, value: &V) -> io::Result<()> {
        let slots_per_block = block_capacity::<K, V>();
        let total_slots = slots_per_block * block_ids.len();
        let start = self.hash_of(key) % total_slots;

        let mut current = start;
        let mut probed = 0;
        while probed < total_slots {
            let block_index = current / slots_per_block;
            let block_guard = self
                .bpm
                .fetch_page(block_ids[block_index])?
                .ok_or_else(all_frames_pinned)?;
            let mut page = block_guard.write();
            let mut block = BlockPageMut::<K, V>::new(&mut page);

            while probed < total_slots && current / slots_per_block == block_index {
                let bucket = current % slots_per_block;
                if block.insert(bucket, *key, *value) {
                    return Ok(());
                }
                current = (current + 1) % total_slots;
                probed += 1;
            }
        }
        Err(io::Error::other("hash table resize ran out of slots"))
    }

    fn hash_of(&self, key: &K) -> usize {
        // Fixed-key SipHash, stable across restarts.
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as usize
    }
}
