use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use strata::buffer_pool::BufferPoolManager;
use strata::hash_table::{DefaultKeyComparator, LinearProbeHashTable};
use strata::tmp_tuple_page::TmpTuple;
use strata::PageId;

use super::Executor;
use crate::errors::ExecutionError;
use crate::types::{decode_row, encode_row, Row, Schema};

fn all_frames_pinned() -> std::io::Error {
    std::io::Error::other("all pages are pinned")
}

/// Hash join. `init` drains the left child, spilling each row into scratch
/// pages and indexing its handle in a persistent linear-probe hash table
/// keyed by a hash of the join columns. `next` probes with right rows and
/// rechecks the join keys on each candidate, so hash collisions cannot
/// produce false matches.
pub struct HashJoinExecutor<'a> {
    left: Box<dyn Executor + 'a>,
    right: Box<dyn Executor + 'a>,
    left_keys: Vec<usize>,
    right_keys: Vec<usize>,
    bpm: Arc<BufferPoolManager>,
    schema: Schema,
    left_schema: Schema,
    jht: Option<LinearProbeHashTable<u64, TmpTuple, DefaultKeyComparator>>,
    scratch_pages: Vec<PageId>,
    pending: VecDeque<Row>,
}

impl<'a> HashJoinExecutor<'a> {
    pub fn new(
        left: Box<dyn Executor + 'a>,
        right: Box<dyn Executor + 'a>,
        left_keys: Vec<usize>,
        right_keys: Vec<usize>,
        bpm: Arc<BufferPoolManager>,
    ) -> Self {
        let mut schema = left.schema().clone();
        schema.extend(right.schema().iter().cloned());
        let left_schema = left.schema().clone();

        Self {
            left,
            right,
            left_keys,
            right_keys,
            bpm,
            schema,
            left_schema,
            jht: None,
            scratch_pages: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    fn hash_keys(row: &Row, keys: &[usize]) -> u64 {
        let mut hasher = DefaultHasher::new();
        for &idx in keys {
            row[idx].hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Spills an encoded left row into the newest scratch page, growing the
    /// scratch chain when it fills up.
    fn spill(&mut self, bytes: &[u8]) -> Result<TmpTuple, ExecutionError> {
        if let Some(&page_id) = self.scratch_pages.last() {
            let guard = self.bpm.fetch_page(page_id)?.ok_or_else(all_frames_pinned)?;
            let inserted = guard.write().tmp_tuple_insert(bytes);
            if let Some(handle) = inserted {
                return Ok(handle);
            }
        }

        let guard = self.bpm.new_page()?.ok_or_else(all_frames_pinned)?;
        let page_id = guard.page_id();
        self.scratch_pages.push(page_id);
        let mut page = guard.write();
        page.init_tmp_tuple_page(page_id);
        page.tmp_tuple_insert(bytes).ok_or_else(|| {
            ExecutionError::GenericError("build-side tuple exceeds scratch page".to_string())
        })
    }
}

impl<'a> Executor for HashJoinExecutor<'a> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn init(&mut self) -> Result<(), ExecutionError> {
        self.left.init()?;
        self.right.init()?;

        let jht = LinearProbeHashTable::new(Arc::clone(&self.bpm), DefaultKeyComparator, 256)?;
        while let Some(row) = self.left.next()? {
            let handle = self.spill(&encode_row(&row))?;
            let hash = Self::hash_keys(&row, &self.left_keys);
            jht.insert(None, &hash, &handle)?;
        }
        self.jht = Some(jht);
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>, ExecutionError> {
        let jht = self.jht.as_ref().ok_or_else(|| {
            ExecutionError::GenericError("hash join probed before init".to_string())
        })?;

        loop {
            if let Some(row) = self.pending.pop_front() {
                return Ok(Some(row));
            }

            let Some(right_row) = self.right.next()? else {
                return Ok(None);
            };

            let hash = Self::hash_keys(&right_row, &self.right_keys);
            let mut handles = Vec::new();
            jht.get_value(None, &hash, &mut handles)?;

            for handle in handles {
                let guard = self
                    .bpm
                    .fetch_page(handle.page_id)?
                    .ok_or_else(all_frames_pinned)?;
                let page = guard.read();
                let bytes = page.tmp_tuple_get(handle.offset).ok_or_else(|| {
                    ExecutionError::GenericError("dangling scratch-tuple handle".to_string())
                })?;
                let left_row = decode_row(bytes, &self.left_schema).ok_or_else(|| {
                    ExecutionError::TupleDecode("spilled build row does not decode".to_string())
                })?;

                let keys_match = self
                    .left_keys
                    .iter()
                    .zip(&self.right_keys)
                    .all(|(&l, &r)| left_row[l] == right_row[r]);
                if keys_match {
                    let mut joined = left_row;
                    joined.extend(right_row.iter().cloned());
                    self.pending.push_back(joined);
                }
            }
        }
    }
}

impl<'a> Drop for HashJoinExecutor<'a> {
    fn drop(&mut self) {
        for &page_id in &self.scratch_pages {
            let _ = self.bpm.delete_page(page_id);
        }
    }
}
