//! Slotted table-heap page layout.
//!
//! ```text
//! | PageId (4) | LSN (4) | PrevPageId (4) | NextPageId (4)
//! | FreeSpacePointer (4) | TupleCount (4)
//! | Slot_0 (offset 4, size 4) | Slot_1 | ... ->   free   <- ... | Tuple_1 | Tuple_0 |
//! ```
//!
//! The slot directory grows from the header, tuple bytes grow from the page
//! tail. Bit 31 of a slot's size marks the tuple deleted; a size of zero
//! marks the slot itself free for reuse.

use crate::{Lsn, Page, PageId, SlotNum, INVALID_LSN, INVALID_PAGE_ID, PAGE_SIZE};

pub const TABLE_PAGE_HEADER_SIZE: usize = std::mem::size_of::<TablePageHeader>();
pub const TUPLE_SLOT_SIZE: usize = std::mem::size_of::<TupleSlot>();

/// Deleted-tuple flag carried in the high bit of a slot's size field.
pub const DELETE_MASK: u32 = 1 << 31;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct TablePageHeader {
    pub page_id: PageId,
    pub lsn: Lsn,
    pub prev_page_id: PageId,
    pub next_page_id: PageId,
    pub free_space_pointer: u32,
    pub tuple_count: u32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
struct TupleSlot {
    offset: u32,
    size: u32,
}

impl Page {
    /// Formats this page as an empty table page linked after `prev_page_id`.
    pub fn init_table_page(&mut self, page_id: PageId, prev_page_id: PageId) {
        self.write_table_header(&TablePageHeader {
            page_id,
            lsn: INVALID_LSN,
            prev_page_id,
            next_page_id: INVALID_PAGE_ID,
            free_space_pointer: PAGE_SIZE as u32,
            tuple_count: 0,
        });
    }

    pub fn read_table_header(&self) -> TablePageHeader {
        unsafe { std::ptr::read_unaligned(self.data.as_ptr() as *const TablePageHeader) }
    }

    pub fn write_table_header(&mut self, header: &TablePageHeader) {
        unsafe {
            std::ptr::write_unaligned(self.data.as_mut_ptr() as *mut TablePageHeader, *header);
        }
    }

    pub fn prev_page_id(&self) -> PageId {
        self.read_table_header().prev_page_id
    }

    pub fn next_page_id(&self) -> PageId {
        self.read_table_header().next_page_id
    }

    pub fn set_prev_page_id(&mut self, prev_page_id: PageId) {
        let mut header = self.read_table_header();
        header.prev_page_id = prev_page_id;
        self.write_table_header(&header);
    }

    pub fn set_next_page_id(&mut self, next_page_id: PageId) {
        let mut header = self.read_table_header();
        header.next_page_id = next_page_id;
        self.write_table_header(&header);
    }

    pub fn tuple_count(&self) -> u32 {
        self.read_table_header().tuple_count
    }

    pub fn free_space_remaining(&self) -> usize {
        let header = self.read_table_header();
        header.free_space_pointer as usize
            - TABLE_PAGE_HEADER_SIZE
            - TUPLE_SLOT_SIZE * header.tuple_count as usize
    }

    fn read_slot(&self, slot: SlotNum) -> TupleSlot {
        let offset = TABLE_PAGE_HEADER_SIZE + TUPLE_SLOT_SIZE * slot as usize;
        unsafe { std::ptr::read_unaligned(self.data.as_ptr().add(offset) as *const TupleSlot) }
    }

    fn write_slot(&mut self, slot: SlotNum, entry: &TupleSlot) {
        let offset = TABLE_PAGE_HEADER_SIZE + TUPLE_SLOT_SIZE * slot as usize;
        unsafe {
            std::ptr::write_unaligned(
                self.data.as_mut_ptr().add(offset) as *mut TupleSlot,
                *entry,
            );
        }
    }

    /// Inserts tuple bytes into the first free slot (reusing a vacated one
    /// if possible) and returns the slot number, or `None` when the page
    /// cannot hold the tuple.
    pub fn insert_tuple(&mut self, tuple: &[u8]) -> Option<SlotNum> {
        if tuple.is_empty() {
            return None;
        }

        let mut header = self.read_table_header();
        let reuse = (0..header.tuple_count).find(|&s| self.read_slot(s).size == 0);
        let needed = tuple.len() + if reuse.is_none() { TUPLE_SLOT_SIZE } else { 0 };
        if self.free_space_remaining() < needed {
            return None;
        }

        header.free_space_pointer -= tuple.len() as u32;
        let offset = header.free_space_pointer;
        let slot = match reuse {
            Some(s) => s,
            None => {
                let s = header.tuple_count;
                header.tuple_count += 1;
                s
            }
        };
        self.write_table_header(&header);
        self.data[offset as usize..offset as usize + tuple.len()].copy_from_slice(tuple);
        self.write_slot(
            slot,
            &TupleSlot {
                offset,
                size: tuple.len() as u32,
            },
        );
        Some(slot)
    }

    /// Restores tuple bytes into an exact slot. The slot must be vacant (or
    /// be the next fresh slot); used when undo puts a deleted tuple back
    /// where it lived.
    pub fn insert_tuple_at(&mut self, slot: SlotNum, tuple: &[u8]) -> bool {
        if tuple.is_empty() {
            return false;
        }

        let mut header = self.read_table_header();
        if slot < header.tuple_count {
            if self.read_slot(slot).size != 0 {
                return false;
            }
            if self.free_space_remaining() < tuple.len() {
                return false;
            }
        } else if slot == header.tuple_count {
            if self.free_space_remaining() < tuple.len() + TUPLE_SLOT_SIZE {
                return false;
            }
            header.tuple_count += 1;
        } else {
            return false;
        }

        header.free_space_pointer -= tuple.len() as u32;
        let offset = header.free_space_pointer;
        self.write_table_header(&header);
        self.data[offset as usize..offset as usize + tuple.len()].copy_from_slice(tuple);
        self.write_slot(
            slot,
            &TupleSlot {
                offset,
                size: tuple.len() as u32,
            },
        );
        true
    }

    /// Tuple bytes at `slot`, or `None` if the slot is vacant or the tuple
    /// is marked deleted.
    pub fn get_tuple(&self, slot: SlotNum) -> Option<&[u8]> {
        if slot >= self.tuple_count() {
            return None;
        }
        let entry = self.read_slot(slot);
        if entry.size == 0 || entry.size & DELETE_MASK != 0 {
            return None;
        }
        Some(&self.data[entry.offset as usize..(entry.offset + entry.size) as usize])
    }

    /// Tuple bytes at `slot` regardless of the delete mark.
    pub fn get_tuple_raw(&self, slot: SlotNum) -> Option<&[u8]> {
        if slot >= self.tuple_count() {
            return None;
        }
        let entry = self.read_slot(slot);
        if entry.size == 0 {
            return None;
        }
        let size = entry.size & !DELETE_MASK;
        Some(&self.data[entry.offset as usize..entry.offset as usize + size as usize])
    }

    pub fn is_deleted(&self, slot: SlotNum) -> bool {
        slot < self.tuple_count() && self.read_slot(slot).size & DELETE_MASK != 0
    }

    /// Sets the delete mark. Returns false if the slot is vacant.
    pub fn mark_delete(&mut self, slot: SlotNum) -> bool {
        if slot >= self.tuple_count() {
            return false;
        }
        let mut entry = self.read_slot(slot);
        if entry.size == 0 {
            return false;
        }
        entry.size |= DELETE_MASK;
        self.write_slot(slot, &entry);
        true
    }

    /// Clears the delete mark. Returns false if the slot is vacant.
    pub fn rollback_delete(&mut self, slot: SlotNum) -> bool {
        if slot >= self.tuple_count() {
            return false;
        }
        let mut entry = self.read_slot(slot);
        if entry.size == 0 {
            return false;
        }
        entry.size &= !DELETE_MASK;
        self.write_slot(slot, &entry);
        true
    }

    /// Physically removes the tuple, compacting the data area. The slot
    /// entry stays behind, vacant, so other slot numbers are stable.
    pub fn apply_delete(&mut self, slot: SlotNum) -> bool {
        if slot >= self.tuple_count() {
            return false;
        }
        let entry = self.read_slot(slot);
        if entry.size == 0 {
            return false;
        }
        let size = entry.size & !DELETE_MASK;

        self.remove_tuple_bytes(entry.offset, size);
        self.write_slot(slot, &TupleSlot { offset: 0, size: 0 });
        true
    }

    /// Replaces the tuple at `slot` in place, keeping its slot number.
    /// Returns false if the slot is vacant, deleted, or the page cannot
    /// hold the new image.
    pub fn update_tuple(&mut self, slot: SlotNum, new_tuple: &[u8]) -> bool {
        if new_tuple.is_empty() || slot >= self.tuple_count() {
            return false;
        }
        let entry = self.read_slot(slot);
        if entry.size == 0 || entry.size & DELETE_MASK != 0 {
            return false;
        }

        if new_tuple.len() == entry.size as usize {
            let offset = entry.offset as usize;
            self.data[offset..offset + new_tuple.len()].copy_from_slice(new_tuple);
            return true;
        }

        if new_tuple.len() > entry.size as usize
            && new_tuple.len() - entry.size as usize > self.free_space_remaining()
        {
            return false;
        }

        self.remove_tuple_bytes(entry.offset, entry.size);

        let mut header = self.read_table_header();
        header.free_space_pointer -= new_tuple.len() as u32;
        let offset = header.free_space_pointer;
        self.write_table_header(&header);
        self.data[offset as usize..offset as usize + new_tuple.len()].copy_from_slice(new_tuple);
        self.write_slot(
            slot,
            &TupleSlot {
                offset,
                size: new_tuple.len() as u32,
            },
        );
        true
    }

    /// The slot `insert_tuple` would claim for a tuple of `len` bytes, or
    /// `None` when the page cannot hold it. Lets callers know the rid
    /// before mutating anything.
    pub fn find_insert_slot(&self, len: usize) -> Option<SlotNum> {
        if len == 0 {
            return None;
        }
        let count = self.tuple_count();
        let reuse = (0..count).find(|&s| self.read_slot(s).size == 0);
        let needed = len + if reuse.is_none() { TUPLE_SLOT_SIZE } else { 0 };
        if self.free_space_remaining() < needed {
            return None;
        }
        Some(reuse.unwrap_or(count))
    }

    /// Whether `update_tuple` with a `new_len`-byte image would succeed.
    pub fn can_update_tuple(&self, slot: SlotNum, new_len: usize) -> bool {
        if new_len == 0 || slot >= self.tuple_count() {
            return false;
        }
        let entry = self.read_slot(slot);
        if entry.size == 0 || entry.size & DELETE_MASK != 0 {
            return false;
        }
        new_len <= entry.size as usize || new_len - entry.size as usize <= self.free_space_remaining()
    }

    /// First non-vacant, non-deleted slot at or after `start`.
    pub fn next_occupied_slot(&self, start: SlotNum) -> Option<SlotNum> {
        (start..self.tuple_count()).find(|&s| {
            let entry = self.read_slot(s);
            entry.size != 0 && entry.size & DELETE_MASK == 0
        })
    }

    /// Shifts the data area to reclaim `[offset, offset + size)` and fixes
    /// up every slot that pointed below the hole.
    fn remove_tuple_bytes(&mut self, offset: u32, size: u32) {
        let mut header = self.read_table_header();
        let fsp = header.free_space_pointer as usize;
        self.data
            .copy_within(fsp..offset as usize, fsp + size as usize);

        header.free_space_pointer += size;
        let count = header.tuple_count;
        self.write_table_header(&header);

        for s in 0..count {
            let mut other = self.read_slot(s);
            if other.size != 0 && other.offset < offset {
                other.offset += size;
                self.write_slot(s, &other);
            }
        }
    }
}
