//! Write-only scratch pages for spilled tuples (the hash-join build side).
//!
//! ```text
//! | PageId (4) | LSN (4) | FreeSpacePointer (4) | (free) | Size_1 | Data_1 | Size_0 | Data_0 |
//! ```
//!
//! Records are length-prefixed and allocated from the tail; a record is
//! addressed by a [`TmpTuple`] handle and is never individually freed —
//! the whole page is thrown away when the consumer is done.

use crate::{Page, PageId, PAGE_SIZE};

const OFFSET_FREE_SPACE: usize = 8;
const TMP_TUPLE_PAGE_HEADER_SIZE: usize = 12;
const SIZE_PREFIX: usize = 4;

/// Handle to a spilled record: which scratch page, at which byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct TmpTuple {
    pub page_id: PageId,
    pub offset: u32,
}

impl Page {
    /// Formats this page as an empty scratch page.
    pub fn init_tmp_tuple_page(&mut self, page_id: PageId) {
        self.data[0..4].copy_from_slice(&page_id.to_le_bytes());
        self.set_tmp_free_space_pointer(PAGE_SIZE as u32);
    }

    fn tmp_free_space_pointer(&self) -> u32 {
        u32::from_le_bytes(
            self.data[OFFSET_FREE_SPACE..OFFSET_FREE_SPACE + 4]
                .try_into()
                .unwrap(),
        )
    }

    fn set_tmp_free_space_pointer(&mut self, ptr: u32) {
        self.data[OFFSET_FREE_SPACE..OFFSET_FREE_SPACE + 4].copy_from_slice(&ptr.to_le_bytes());
    }

    /// Appends a record, returning its handle, or `None` when the page is
    /// out of space.
    pub fn tmp_tuple_insert(&mut self, record: &[u8]) -> Option<TmpTuple> {
        let fsp = self.tmp_free_space_pointer() as usize;
        if fsp - TMP_TUPLE_PAGE_HEADER_SIZE < record.len() + SIZE_PREFIX {
            return None;
        }

        let data_at = fsp - record.len();
        self.data[data_at..fsp].copy_from_slice(record);
        let prefix_at = data_at - SIZE_PREFIX;
        self.data[prefix_at..data_at].copy_from_slice(&(record.len() as u32).to_le_bytes());
        self.set_tmp_free_space_pointer(prefix_at as u32);

        Some(TmpTuple {
            page_id: self.id,
            offset: prefix_at as u32,
        })
    }

    /// Reads the record behind a handle's offset.
    pub fn tmp_tuple_get(&self, offset: u32) -> Option<&[u8]> {
        let prefix_at = offset as usize;
        if prefix_at + SIZE_PREFIX > PAGE_SIZE {
            return None;
        }
        let len =
            u32::from_le_bytes(self.data[prefix_at..prefix_at + SIZE_PREFIX].try_into().unwrap())
                as usize;
        let data_at = prefix_at + SIZE_PREFIX;
        if data_at + len > PAGE_SIZE {
            return None;
        }
        Some(&self.data[data_at..data_at + len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_read_back() {
        let mut page = Page::new(5);
        page.init_tmp_tuple_page(5);

        let a = page.tmp_tuple_insert(b"left tuple").unwrap();
        let b = page.tmp_tuple_insert(b"another").unwrap();
        assert_eq!(a.page_id, 5);
        assert!(b.offset < a.offset);

        assert_eq!(page.tmp_tuple_get(a.offset), Some(&b"left tuple"[..]));
        assert_eq!(page.tmp_tuple_get(b.offset), Some(&b"another"[..]));
    }

    #[test]
    fn fills_up() {
        let mut page = Page::new(0);
        page.init_tmp_tuple_page(0);
        let record = [9u8; 500];
        let mut handles = Vec::new();
        while let Some(handle) = page.tmp_tuple_insert(&record) {
            handles.push(handle);
        }
        assert_eq!(handles.len(), (PAGE_SIZE - 12) / 504);
        for handle in handles {
            assert_eq!(page.tmp_tuple_get(handle.offset), Some(&record[..]));
        }
    }
}
