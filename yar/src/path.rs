use crate::{Arena, Cell, Handle, PathHandle, Result, Symbol, Tag, VmError};

// entry: object(symbol, next entry, PathEntry)

impl Arena {
    /// Builds the segment chain for `a/b/c`, returns the head entry.
    pub fn alloc_path(&mut self, segments: &[Symbol]) -> Result<PathHandle> {
        let mut next = 0;
        for symbol in segments.iter().rev() {
            next = self.alloc(Cell::object(symbol.id(), next, Tag::PathEntry))?;
        }
        Ok(Handle::new(next))
    }

    pub fn path_entry(
        &self,
        entry: PathHandle,
    ) -> Result<(Symbol, PathHandle)> {
        let cell = self.read(entry.addr())?;
        match cell.tag()? {
            Tag::PathEntry => {
                Ok((Symbol::from_id(cell.val()), Handle::new(cell.ptr())))
            }
            _ => Err(VmError::InvalidTag(cell.tag_byte())),
        }
    }

    pub fn path_segments(&self, first: PathHandle) -> Result<Vec<Symbol>> {
        let mut segments = Vec::new();
        let mut next = first;
        while !next.is_null() {
            if segments.len() >= self.top() {
                return Err(VmError::CyclicChain(next.addr()));
            }
            let (symbol, following) = self.path_entry(next)?;
            segments.push(symbol);
            next = following;
        }
        Ok(segments)
    }
}
