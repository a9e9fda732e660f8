use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::RwLock;

use crate::{Result, VmError};

/// Interned identifier, ids start at 1 and are handed out sequentially
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    #[inline]
    pub(crate) const fn from_id(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct SymbolTableImpl {
    // index = id - 1
    names: Vec<Arc<str>>,
    mappings: HashMap<Arc<str>, Symbol>,
}

impl SymbolTableImpl {
    fn get_or_add(&mut self, name: &str) -> Option<Symbol> {
        if let Some(&symbol) = self.mappings.get(name) {
            return Some(symbol);
        }
        let id = u32::try_from(self.names.len() + 1).ok()?;
        let symbol = Symbol(id);
        let interned = Arc::<str>::from(name);
        self.names.push(interned.clone());
        self.mappings.insert(interned, symbol);
        Some(symbol)
    }

    fn name(&self, symbol: Symbol) -> Option<Arc<str>> {
        let index = usize::try_from(symbol.0).ok()?.checked_sub(1)?;
        self.names.get(index).cloned()
    }
}

/// Symbol table and its inverse map, shared between a frozen vm and its forks
#[derive(Debug, Clone, Default)]
pub struct SymbolTable(Arc<RwLock<SymbolTableImpl>>);

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, name: &str) -> Result<Symbol> {
        if let Some(&symbol) = self.0.read().mappings.get(name) {
            return Ok(symbol);
        }
        self.0.write().get_or_add(name).ok_or(VmError::SymbolTableFull)
    }

    /// lookup without interning
    pub fn get(&self, name: &str) -> Option<Symbol> {
        self.0.read().mappings.get(name).copied()
    }

    pub fn name(&self, symbol: Symbol) -> Option<Arc<str>> {
        self.0.read().name(symbol)
    }

    /// name for diagnostics, falls back to the raw id
    pub fn display(&self, symbol: Symbol) -> String {
        match self.name(symbol) {
            Some(name) => name.to_string(),
            None => symbol.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.0.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// names in id order
    pub fn names(&self) -> Vec<Arc<str>> {
        self.0.read().names.clone()
    }

    /// rebuild from names in id order, used by snapshot loading
    pub(crate) fn from_names<I, S>(names: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = SymbolTableImpl::default();
        for (index, name) in names.into_iter().enumerate() {
            let symbol = table.get_or_add(name.as_ref())?;
            // duplicates would shift every later id
            if usize::try_from(symbol.0).ok()? != index + 1 {
                return None;
            }
        }
        Some(Self(Arc::new(RwLock::new(table))))
    }
}
