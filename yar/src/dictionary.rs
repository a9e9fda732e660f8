use crate::{
    Arena, Cell, DictHandle, Handle, Result, SlotHandle, Symbol, Tag, Value,
    VmError,
};

// header: object(first entry, last entry, DictHeader)
// entry:  item(symval, next entry)
// symval: item(value cell, symbol), the slot a map binding points at

impl Arena {
    pub fn alloc_dictionary(&mut self) -> Result<DictHandle> {
        let addr = self.alloc(Cell::object(0, 0, Tag::DictHeader))?;
        Ok(Handle::new(addr))
    }

    fn dict_header(&self, dict: DictHandle) -> Result<Cell> {
        let header = self.read(dict.addr())?;
        match header.tag()? {
            Tag::DictHeader => Ok(header),
            _ => Err(VmError::InvalidTag(header.tag_byte())),
        }
    }

    pub fn dict_find(
        &self,
        dict: DictHandle,
        symbol: Symbol,
    ) -> Result<Option<SlotHandle>> {
        for slot in self.dict_iter(dict)? {
            let (sym, slot) = slot?;
            if sym == symbol {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    /// Upsert. An existing slot is overwritten in place so words already
    /// bound to it observe the new value.
    pub fn dict_put(
        &mut self,
        dict: DictHandle,
        symbol: Symbol,
        value: Value,
    ) -> Result<SlotHandle> {
        if let Some(slot) = self.dict_find(dict, symbol)? {
            self.set_slot_value(slot, value)?;
            return Ok(slot);
        }

        let header = self.dict_header(dict)?;
        let value_addr = self.alloc(value.to_cell())?;
        let symval = self.alloc(Cell::item(value_addr, symbol.id()))?;
        let entry = self.alloc(Cell::item(symval, 0))?;

        let (mut first, last) = (header.val(), header.ptr());
        if last == 0 {
            first = entry;
        } else {
            let tail = self.read(last)?;
            self.write(last, Cell::item(tail.high(), entry))?;
        }
        let header = Cell::object(first, entry, Tag::DictHeader);
        self.write(dict.addr(), header)?;
        Ok(Handle::new(symval))
    }

    pub fn dict_get(
        &self,
        dict: DictHandle,
        symbol: Symbol,
    ) -> Result<Option<Value>> {
        match self.dict_find(dict, symbol)? {
            Some(slot) => self.slot_value(slot).map(Some),
            None => Ok(None),
        }
    }

    pub fn slot_value(&self, slot: SlotHandle) -> Result<Value> {
        let symval = self.read(slot.addr())?;
        Value::from_cell(self.read(symval.high())?)
    }

    pub fn slot_symbol(&self, slot: SlotHandle) -> Result<Symbol> {
        Ok(Symbol::from_id(self.read(slot.addr())?.low()))
    }

    pub fn set_slot_value(
        &mut self,
        slot: SlotHandle,
        value: Value,
    ) -> Result<()> {
        let symval = self.read(slot.addr())?;
        self.write(symval.high(), value.to_cell())
    }

    pub fn dict_iter(&self, dict: DictHandle) -> Result<DictIter<'_>> {
        Ok(DictIter {
            arena: self,
            next: self.dict_header(dict)?.val(),
            remaining: self.top(),
        })
    }

    pub fn dict_len(&self, dict: DictHandle) -> Result<usize> {
        let mut len = 0;
        for slot in self.dict_iter(dict)? {
            slot?;
            len += 1;
        }
        Ok(len)
    }
}

/// Yields `(symbol, slot)` pairs in insertion order
pub struct DictIter<'a> {
    arena: &'a Arena,
    next: u32,
    remaining: usize,
}

impl DictIter<'_> {
    fn read_entry(&self) -> Result<(Symbol, SlotHandle, u32)> {
        let entry = self.arena.read(self.next)?;
        let symval = self.arena.read(entry.high())?;
        let symbol = Symbol::from_id(symval.low());
        Ok((symbol, Handle::new(entry.high()), entry.low()))
    }
}

impl Iterator for DictIter<'_> {
    type Item = Result<(Symbol, SlotHandle)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == 0 {
            return None;
        }
        if self.remaining == 0 {
            let at = self.next;
            self.next = 0;
            return Some(Err(VmError::CyclicChain(at)));
        }
        self.remaining -= 1;
        match self.read_entry() {
            Ok((symbol, slot, next)) => {
                self.next = next;
                Some(Ok((symbol, slot)))
            }
            Err(err) => {
                self.next = 0;
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
    fn find_on_miss_is_none() {
        let mut arena = arena();
        let dict = arena.alloc_dictionary().unwrap();
        assert_eq!(arena.dict_find(dict, Symbol::from_id(1)).unwrap(), None);
    }

    #[test]
    fn put_is_upsert() {
        let mut arena = arena();
        let dict = arena.alloc_dictionary().unwrap();
        let sym = Symbol::from_id(3);
        let first = arena.dict_put(dict, sym, Value::Integer(1)).unwrap();
        let second = arena.dict_put(dict, sym, Value::Integer(2)).unwrap();
        assert_eq!(first, second);
        assert_eq!(arena.dict_len(dict).unwrap(), 1);
        assert_eq!(
            arena.dict_get(dict, sym).unwrap(),
            Some(Value::Integer(2))
        );
    }

    #[test]
    fn entries_keep_insertion_order() {
        let mut arena = arena();
        let dict = arena.alloc_dictionary().unwrap();
        for id in [4, 2, 9] {
            let value = Value::Integer(i64::from(id));
            arena.dict_put(dict, Symbol::from_id(id), value).unwrap();
        }
        let symbols = arena
            .dict_iter(dict)
            .unwrap()
            .map(|slot| slot.unwrap().0.id())
            .collect::<Vec<_>>();
        assert_eq!(symbols, vec![4, 2, 9]);
    }

    #[test]
    fn looping_entries_end_the_walk() {
        let mut arena = arena();
        let dict = arena.alloc_dictionary().unwrap();
        let slot = arena
            .dict_put(dict, Symbol::from_id(1), Value::Integer(1))
            .unwrap();
        let entry = arena.read(dict.addr()).unwrap().val();
        arena.write(entry, Cell::item(slot.addr(), entry)).unwrap();
        assert_eq!(arena.dict_len(dict), Err(VmError::CyclicChain(entry)));
        assert_eq!(
            arena.dict_find(dict, Symbol::from_id(2)),
            Err(VmError::CyclicChain(entry))
        );
    }

    #[test]
    fn slot_knows_its_symbol() {
        let mut arena = arena();
        let dict = arena.alloc_dictionary().unwrap();
        let slot = arena
            .dict_put(dict, Symbol::from_id(7), Value::Boolean(false))
            .unwrap();
        assert_eq!(arena.slot_symbol(slot).unwrap(), Symbol::from_id(7));
        arena.set_slot_value(slot, Value::None).unwrap();
        assert_eq!(arena.slot_value(slot).unwrap(), Value::None);
    }
}
