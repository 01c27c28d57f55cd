//! Manages the buffer pool: a bounded set of in-memory frames caching disk
//! pages, with pin/unpin accounting, victim selection, and the WAL
//! interlock (a dirty page never reaches disk before the log covering it).

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, RwLock};

use parking_lot::RwLock as ParkingRwLock;

use crate::config::{Config, ReplacementPolicy};
use crate::disk::DiskManager;
use crate::log_manager::LogManager;
use crate::replacer::{ClockReplacer, LruReplacer, Replacer};
use crate::{FrameId, Page, PageId, INVALID_PAGE_ID};

#[derive(Debug, Clone, Copy)]
struct FrameMeta {
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
}

impl FrameMeta {
    fn vacant() -> Self {
        Self {
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            is_dirty: false,
        }
    }
}

struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: Vec<FrameId>,
    meta: Vec<FrameMeta>,
    replacer: Box<dyn Replacer>,
}

/// The buffer pool manager.
pub struct BufferPoolManager {
    frames: Vec<ParkingRwLock<Page>>,
    state: RwLock<PoolState>,
    disk: Arc<DiskManager>,
    log: Option<Arc<LogManager>>,
}

/// An RAII pin on a page. `read`/`write` take the per-page latch; dropping
/// the guard unpins exactly once.
pub struct PageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page_id: PageId,
    frame_id: FrameId,
}

impl<'a> PageGuard<'a> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, Page> {
        self.bpm.frames[self.frame_id].read()
    }

    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, Page> {
        self.bpm.state.write().unwrap().meta[self.frame_id].is_dirty = true;
        self.bpm.frames[self.frame_id].write()
    }
}

impl<'a> Drop for PageGuard<'a> {
    fn drop(&mut self) {
        self.bpm.unpin_page(self.page_id, false);
    }
}

impl BufferPoolManager {
    pub fn new(config: &Config, disk: Arc<DiskManager>, log: Option<Arc<LogManager>>) -> Self {
        let size = config.buffer_pool_size;
        let mut frames = Vec::with_capacity(size);
        for _ in 0..size {
            frames.push(ParkingRwLock::new(Page::new(INVALID_PAGE_ID)));
        }
        // Victims pop from the back, so frame 0 goes out first.
        let free_list: Vec<FrameId> = (0..size).rev().collect();

        let replacer: Box<dyn Replacer> = match config.replacement_policy {
            ReplacementPolicy::Clock => Box::new(ClockReplacer::new(size)),
            ReplacementPolicy::Lru => Box::new(LruReplacer::new(size)),
        };

        Self {
            frames,
            state: RwLock::new(PoolState {
                page_table: HashMap::new(),
                free_list,
                meta: vec![FrameMeta::vacant(); size],
                replacer,
            }),
            disk,
            log,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    /// Pins the page, loading it from disk if it is not resident. `None`
    /// means every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> io::Result<Option<PageGuard<'_>>> {
        let mut state = self.state.write().unwrap();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            state.meta[frame_id].pin_count += 1;
            if state.meta[frame_id].pin_count == 1 {
                state.replacer.pin(frame_id);
            }
            return Ok(Some(PageGuard {
                bpm: self,
                page_id,
                frame_id,
            }));
        }

        let Some(frame_id) = self.acquire_victim_frame(&mut state)? else {
            crate::strata_debug_log!("[BufferPool::fetch_page] No victim for page {page_id}");
            return Ok(None);
        };

        state.page_table.insert(page_id, frame_id);
        state.meta[frame_id] = FrameMeta {
            page_id,
            pin_count: 1,
            is_dirty: false,
        };
        {
            let mut frame = self.frames[frame_id].write();
            frame.id = page_id;
            self.disk.read_page(page_id, &mut frame.data)?;
        }

        Ok(Some(PageGuard {
            bpm: self,
            page_id,
            frame_id,
        }))
    }

    /// Allocates a fresh page id and pins a zeroed frame for it. `None`
    /// means every frame is pinned (no page id is consumed in that case).
    pub fn new_page(&self) -> io::Result<Option<PageGuard<'_>>> {
        let mut state = self.state.write().unwrap();

        let Some(frame_id) = self.acquire_victim_frame(&mut state)? else {
            crate::strata_debug_log!("[BufferPool::new_page] All frames pinned");
            return Ok(None);
        };

        let page_id = self.disk.allocate_page();
        state.page_table.insert(page_id, frame_id);
        state.meta[frame_id] = FrameMeta {
            page_id,
            pin_count: 1,
            is_dirty: false,
        };
        *self.frames[frame_id].write() = Page::new(page_id);

        Ok(Some(PageGuard {
            bpm: self,
            page_id,
            frame_id,
        }))
    }

    /// Drops one pin. Fails if the page is not resident or not pinned. The
    /// dirty flag is OR-ed in, never cleared here.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.state.write().unwrap();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };

        let meta = &mut state.meta[frame_id];
        if meta.pin_count == 0 {
            return false;
        }
        meta.is_dirty |= is_dirty;
        meta.pin_count -= 1;
        if meta.pin_count == 0 {
            state.replacer.unpin(frame_id);
        }
        true
    }

    /// Writes the page out if dirty and clears the dirty flag. Pin count is
    /// untouched. Returns false if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> io::Result<bool> {
        let mut state = self.state.write().unwrap();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(false);
        };

        if state.meta[frame_id].is_dirty {
            self.write_frame(frame_id, page_id)?;
            state.meta[frame_id].is_dirty = false;
        }
        Ok(true)
    }

    pub fn flush_all_pages(&self) -> io::Result<()> {
        let mut state = self.state.write().unwrap();
        let resident: Vec<(PageId, FrameId)> =
            state.page_table.iter().map(|(&p, &f)| (p, f)).collect();
        for (page_id, frame_id) in resident {
            if state.meta[frame_id].is_dirty {
                self.write_frame(frame_id, page_id)?;
                state.meta[frame_id].is_dirty = false;
            }
        }
        Ok(())
    }

    /// Removes the page from the pool and deallocates it on disk. True if
    /// the page was not resident or was successfully deleted; false if it
    /// is still pinned.
    pub fn delete_page(&self, page_id: PageId) -> io::Result<bool> {
        let mut state = self.state.write().unwrap();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            self.disk.deallocate_page(page_id);
            return Ok(true);
        };

        if state.meta[frame_id].pin_count > 0 {
            return Ok(false);
        }

        self.disk.deallocate_page(page_id);
        state.page_table.remove(&page_id);
        state.replacer.pin(frame_id);
        state.meta[frame_id] = FrameMeta::vacant();
        *self.frames[frame_id].write() = Page::new(INVALID_PAGE_ID);
        state.free_list.push(frame_id);
        Ok(true)
    }

    /// Dirty flag of a resident page, if any.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let state = self.state.read().unwrap();
        let &frame_id = state.page_table.get(&page_id)?;
        Some(state.meta[frame_id].is_dirty)
    }

    /// Pin count of a resident page, if any.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.read().unwrap();
        let &frame_id = state.page_table.get(&page_id)?;
        Some(state.meta[frame_id].pin_count)
    }

    /// Free list first, then the replacer. A dirty victim is written back
    /// (behind the WAL interlock) before the frame is handed out.
    fn acquire_victim_frame(&self, state: &mut PoolState) -> io::Result<Option<FrameId>> {
        if let Some(frame_id) = state.free_list.pop() {
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = state.replacer.victim() else {
            return Ok(None);
        };

        let evicted = state.meta[frame_id];
        debug_assert_eq!(evicted.pin_count, 0);
        if evicted.is_dirty {
            self.write_frame(frame_id, evicted.page_id)?;
        }
        state.page_table.remove(&evicted.page_id);
        state.meta[frame_id] = FrameMeta::vacant();
        Ok(Some(frame_id))
    }

    /// Writes a frame's bytes to disk, forcing the log first when the
    /// page's LSN is not yet durable.
    fn write_frame(&self, frame_id: FrameId, page_id: PageId) -> io::Result<()> {
        let frame = self.frames[frame_id].read();
        if let Some(log) = &self.log {
            if frame.lsn() > log.persistent_lsn() {
                log.flush();
            }
        }
        self.disk.write_page(page_id, &frame.data)
    }
}
