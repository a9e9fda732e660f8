use crate::{Arena, Cell, Handle, Result, StringHandle, Tag, VmError};

// header: immediate(byte length, StringHeader), followed by the bytes packed
// little endian into ceil(len / 8) data cells

impl Arena {
    pub fn alloc_string(&mut self, text: &str) -> Result<StringHandle> {
        let bytes = text.as_bytes();
        let len = i64::try_from(bytes.len())
            .map_err(|_| VmError::ArenaExhausted {
                capacity: self.capacity(),
            })?;
        let header = self.alloc(Cell::immediate(len, Tag::StringHeader))?;
        for chunk in bytes.chunks(8) {
            let mut word = [0u8; 8];
            word[..chunk.len()].copy_from_slice(chunk);
            self.alloc(Cell::from_raw(u64::from_le_bytes(word)))?;
        }
        Ok(Handle::new(header))
    }

    pub fn read_string(&self, string: StringHandle) -> Result<String> {
        let header = self.read(string.addr())?;
        if header.tag()? != Tag::StringHeader {
            return Err(VmError::InvalidTag(header.tag_byte()));
        }
        let len = usize::try_from(header.payload())
            .map_err(|_| VmError::InvalidAddress(string.addr()))?;
        let mut bytes = Vec::with_capacity(len);
        let mut addr = string.addr();
        while bytes.len() < len {
            addr += 1;
            let word = self.read(addr)?.raw().to_le_bytes();
            let take = (len - bytes.len()).min(8);
            bytes.extend_from_slice(&word[..take]);
        }
        String::from_utf8(bytes)
            .map_err(|_| VmError::InvalidAddress(string.addr()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArenaCreateInfo;

    fn arena() -> Arena {
        Arena::new(&ArenaCreateInfo { capacity: 64 }).unwrap()
    }

    #[test]
    fn strings_span_cells() {
        let mut arena = arena();
        let text = "redis-cluster-node";
        let before = arena.top();
        let handle = arena.alloc_string(text).unwrap();
        assert_eq!(arena.top(), before + 1 + 3);
        assert_eq!(arena.read_string(handle).unwrap(), text);
    }

    #[test]
    fn empty_and_multibyte_strings() {
        let mut arena = arena();
        let empty = arena.alloc_string("").unwrap();
        let multi = arena.alloc_string("größe").unwrap();
        assert_eq!(arena.read_string(empty).unwrap(), "");
        assert_eq!(arena.read_string(multi).unwrap(), "größe");
    }
}
