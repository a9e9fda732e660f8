use crate::{
    Arena, BlockHandle, Cell, EntryHandle, Handle, Result, Tag, Value, VmError,
    tagged::embed,
};

// header: object(first entry, last entry, BlockHeader)
// entry:  item(slot, next entry)
// slot:   embedded cell with the low bit set, otherwise `addr << 1`

impl Arena {
    pub fn alloc_block(&mut self) -> Result<BlockHandle> {
        let addr = self.alloc(Cell::object(0, 0, Tag::BlockHeader))?;
        Ok(Handle::new(addr))
    }

    fn block_header(&self, block: BlockHandle) -> Result<Cell> {
        let header = self.read(block.addr())?;
        match header.tag()? {
            Tag::BlockHeader => Ok(header),
            _ => Err(VmError::InvalidTag(header.tag_byte())),
        }
    }

    pub fn block_append(
        &mut self,
        block: BlockHandle,
        value: Value,
    ) -> Result<EntryHandle> {
        let header = self.block_header(block)?;
        let cell = value.to_cell();
        let slot = match embed(cell) {
            Some(slot) => slot,
            None => self.alloc(cell)? << 1,
        };
        let entry = self.alloc(Cell::item(slot, 0))?;

        let (mut first, last) = (header.val(), header.ptr());
        if last == 0 {
            first = entry;
        } else {
            let tail = self.read(last)?;
            self.write(last, Cell::item(tail.high(), entry))?;
        }
        let header = Cell::object(first, entry, Tag::BlockHeader);
        self.write(block.addr(), header)?;
        Ok(Handle::new(entry))
    }

    /// null handle for an empty block
    pub fn block_first(&self, block: BlockHandle) -> Result<EntryHandle> {
        Ok(Handle::new(self.block_header(block)?.val()))
    }

    /// value stored at `entry` and the entry following it
    pub fn entry(&self, entry: EntryHandle) -> Result<(Value, EntryHandle)> {
        if entry.is_null() {
            return Err(VmError::InvalidAddress(0));
        }
        let item = self.read(entry.addr())?;
        let slot = item.high();
        let cell = if slot & 1 == 1 {
            Cell::from_raw(u64::from(slot >> 1))
        } else {
            self.read(slot >> 1)?
        };
        Ok((Value::from_cell(cell)?, Handle::new(item.low())))
    }

    pub fn block_iter(&self, block: BlockHandle) -> Result<BlockIter<'_>> {
        Ok(BlockIter {
            arena: self,
            next: self.block_first(block)?,
            remaining: self.top(),
        })
    }

    pub fn block_values(&self, block: BlockHandle) -> Result<Vec<Value>> {
        self.block_iter(block)?.collect()
    }

    pub fn block_len(&self, block: BlockHandle) -> Result<usize> {
        let mut len = 0;
        for value in self.block_iter(block)? {
            value?;
            len += 1;
        }
        Ok(len)
    }
}

pub struct BlockIter<'a> {
    arena: &'a Arena,
    next: EntryHandle,
    /// a chain can't hold more entries than there are cells
    remaining: usize,
}

impl Iterator for BlockIter<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next.is_null() {
            return None;
        }
        if self.remaining == 0 {
            let at = self.next.addr();
            self.next = Handle::null();
            return Some(Err(VmError::CyclicChain(at)));
        }
        self.remaining -= 1;
        match self.arena.entry(self.next) {
            Ok((value, next)) => {
                self.next = next;
                Some(Ok(value))
            }
            Err(err) => {
                self.next = Handle::null();
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArenaCreateInfo;

    fn arena() -> Arena {
        Arena::new(&ArenaCreateInfo { capacity: 256 }).unwrap()
    }

    #[test]
    fn empty_block_has_no_last() {
        let mut arena = arena();
        let block = arena.alloc_block().unwrap();
        let header = arena.read(block.addr()).unwrap();
        assert_eq!(header.ptr(), 0);
        assert!(arena.block_first(block).unwrap().is_null());
        assert_eq!(arena.block_len(block).unwrap(), 0);
    }

    #[test]
    fn append_keeps_insertion_order() {
        let mut arena = arena();
        let block = arena.alloc_block().unwrap();
        arena.block_append(block, Value::Integer(1)).unwrap();
        arena.block_append(block, Value::Boolean(true)).unwrap();
        arena.block_append(block, Value::Integer(-3)).unwrap();
        assert_eq!(
            arena.block_values(block).unwrap(),
            vec![Value::Integer(1), Value::Boolean(true), Value::Integer(-3)]
        );
        let header = arena.read(block.addr()).unwrap();
        assert_ne!(header.ptr(), 0);
    }

    #[test]
    fn small_values_are_embedded() {
        let mut arena = arena();
        let block = arena.alloc_block().unwrap();
        let before = arena.top();
        arena.block_append(block, Value::Integer(5)).unwrap();
        assert_eq!(arena.top(), before + 1);
        arena.block_append(block, Value::Integer(-5)).unwrap();
        assert_eq!(arena.top(), before + 3);
    }

    #[test]
    fn nested_blocks_are_stored_by_reference() {
        let mut arena = arena();
        let outer = arena.alloc_block().unwrap();
        let inner = arena.alloc_block().unwrap();
        arena.block_append(outer, Value::Block(inner)).unwrap();
        arena.block_append(inner, Value::Integer(9)).unwrap();
        let values = arena.block_values(outer).unwrap();
        let nested = values[0].as_block().unwrap();
        let values = arena.block_values(nested).unwrap();
        assert_eq!(values, vec![Value::Integer(9)]);
    }

    #[test]
    fn looping_entries_are_reported() {
        let mut arena = arena();
        let block = arena.alloc_block().unwrap();
        let entry = arena.block_append(block, Value::Integer(1)).unwrap();
        let item = arena.read(entry.addr()).unwrap();
        let looped = Cell::item(item.high(), entry.addr());
        arena.write(entry.addr(), looped).unwrap();
        assert_eq!(
            arena.block_len(block),
            Err(VmError::CyclicChain(entry.addr()))
        );
    }

    #[test]
    fn non_block_header_is_rejected() {
        let mut arena = arena();
        let addr = arena.alloc(Value::Integer(1).to_cell()).unwrap();
        assert!(arena.block_append(Handle::new(addr), Value::None).is_err());
    }
}
