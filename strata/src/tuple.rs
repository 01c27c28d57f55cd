use bytes::{Buf, BufMut};

use crate::{PageId, SlotNum, INVALID_PAGE_ID};

/// A record identifier: which page, which slot. 8 bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Rid {
    pub page_id: PageId,
    pub slot: SlotNum,
}

impl Rid {
    pub const SERIALIZED_SIZE: usize = 8;

    pub fn new(page_id: PageId, slot: SlotNum) -> Self {
        Self { page_id, slot }
    }

    pub fn invalid() -> Self {
        Self {
            page_id: INVALID_PAGE_ID,
            slot: 0,
        }
    }

    pub fn serialize_into(&self, buf: &mut impl BufMut) {
        buf.put_i32_le(self.page_id);
        buf.put_u32_le(self.slot);
    }

    pub fn deserialize(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < Self::SERIALIZED_SIZE {
            return None;
        }
        let page_id = buf.get_i32_le();
        let slot = buf.get_u32_le();
        Some(Self { page_id, slot })
    }
}

/// An owned tuple image. On the wire it is length-prefixed: a u32 byte
/// count followed by the raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tuple {
    pub data: Vec<u8>,
}

impl Tuple {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the length-prefixed wire form.
    pub fn serialized_size(&self) -> usize {
        4 + self.data.len()
    }

    pub fn serialize_into(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.data.len() as u32);
        buf.put_slice(&self.data);
    }

    pub fn deserialize(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < 4 {
            return None;
        }
        let len = buf.get_u32_le() as usize;
        if buf.remaining() < len {
            return None;
        }
        let mut data = vec![0u8; len];
        buf.copy_to_slice(&mut data);
        Some(Self { data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rid_and_tuple_wire_forms() {
        let mut buf = Vec::new();
        Rid::new(3, 7).serialize_into(&mut buf);
        let tuple = Tuple::new(b"granite".to_vec());
        tuple.serialize_into(&mut buf);

        let mut slice = &buf[..];
        assert_eq!(Rid::deserialize(&mut slice), Some(Rid::new(3, 7)));
        assert_eq!(Tuple::deserialize(&mut slice), Some(tuple));
        assert_eq!(slice.len(), 0);
    }

    #[test]
    fn truncated_tuple_is_rejected() {
        let mut buf = Vec::new();
        Tuple::new(vec![1, 2, 3, 4]).serialize_into(&mut buf);
        let mut short = &buf[..buf.len() - 1];
        assert_eq!(Tuple::deserialize(&mut short), None);
    }
}
