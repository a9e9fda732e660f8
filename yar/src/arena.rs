use crate::{Cell, MAX_ADDRESS, Result, VmError};

pub const DEFAULT_ARENA_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ArenaCreateInfo {
    /// number of cells, including the reserved null cell
    pub capacity: usize,
}

impl Default for ArenaCreateInfo {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_ARENA_CAPACITY,
        }
    }
}

/// Append only cell store. Address 0 is reserved as null, nothing is ever
/// freed or moved, so addresses stay valid for the lifetime of the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arena {
    cells: Vec<Cell>,
    capacity: usize,
}

impl Arena {
    pub fn new(info: &ArenaCreateInfo) -> Result<Self> {
        let capacity = info.capacity;
        if capacity < 2 || capacity > MAX_ADDRESS as usize + 1 {
            return Err(VmError::ArenaExhausted { capacity });
        }
        let mut cells = Vec::with_capacity(capacity);
        cells.push(Cell::NULL);
        Ok(Self { cells, capacity })
    }

    /// rebuild from saved cells, `cells[0]` must be the null cell
    pub(crate) fn from_cells(
        cells: Vec<Cell>,
        capacity: usize,
    ) -> Option<Self> {
        let valid = capacity <= MAX_ADDRESS as usize + 1
            && !cells.is_empty()
            && cells.len() <= capacity
            && cells[0].is_null();
        valid.then_some(Self { cells, capacity })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// high water mark, the next address to be handed out
    #[inline]
    pub fn top(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn alloc(&mut self, cell: Cell) -> Result<u32> {
        if self.cells.len() >= self.capacity {
            return Err(VmError::ArenaExhausted {
                capacity: self.capacity,
            });
        }
        let addr = self.cells.len();
        self.cells.push(cell);
        // capacity is clamped to the address space at construction
        Ok(addr as u32)
    }

    #[inline]
    pub fn read(&self, addr: u32) -> Result<Cell> {
        self.cells
            .get(addr as usize)
            .copied()
            .ok_or(VmError::InvalidAddress(addr))
    }

    pub fn write(&mut self, addr: u32, cell: Cell) -> Result<()> {
        if addr == 0 {
            return Err(VmError::NullWrite);
        }
        let slot = self
            .cells
            .get_mut(addr as usize)
            .ok_or(VmError::InvalidAddress(addr))?;
        *slot = cell;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(capacity: usize) -> Arena {
        Arena::new(&ArenaCreateInfo { capacity }).unwrap()
    }

    #[test]
    fn address_zero_is_reserved() {
        let mut arena = arena(8);
        let first = arena.alloc(Cell::from_raw(7)).unwrap();
        assert_eq!(first, 1);
        assert_eq!(arena.read(0).unwrap(), Cell::NULL);
        assert_eq!(arena.write(0, Cell::from_raw(1)), Err(VmError::NullWrite));
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut arena = arena(3);
        arena.alloc(Cell::NULL).unwrap();
        arena.alloc(Cell::NULL).unwrap();
        assert_eq!(
            arena.alloc(Cell::NULL),
            Err(VmError::ArenaExhausted { capacity: 3 })
        );
        assert_eq!(arena.top(), 3);
    }

    #[test]
    fn reads_past_top_fail() {
        let arena = arena(8);
        assert_eq!(arena.read(5), Err(VmError::InvalidAddress(5)));
    }

    #[test]
    fn capacity_is_clamped_to_address_space() {
        let info = ArenaCreateInfo {
            capacity: MAX_ADDRESS as usize + 2,
        };
        assert!(Arena::new(&info).is_err());
    }
}
