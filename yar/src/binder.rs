use std::collections::{HashSet, VecDeque};

use log::trace;

use crate::{
    Arena, Binding, BindingHandle, BlockHandle, DictHandle, Handle, Result,
    Symbol, Value, Vm,
};

/// Resolves a symbol to the storage it should be bound to. `create` is set
/// for set-words. Returning `None` leaves the word's current binding alone,
/// which is how an inner scope falls through to whatever an enclosing bind
/// already resolved.
pub trait Scope {
    fn resolve(
        &mut self,
        vm: &mut Vm,
        symbol: Symbol,
        create: bool,
    ) -> Result<Option<Binding>>;

    /// Whether a word that is already bound to `current` is looked up
    /// again. Scopes that only fill gaps return `false`.
    fn replaces(&self, current: Binding, create: bool) -> bool {
        let _ = (current, create);
        true
    }
}

impl<F> Scope for F
where
    F: FnMut(&mut Vm, Symbol, bool) -> Result<Option<Binding>>,
{
    fn resolve(
        &mut self,
        vm: &mut Vm,
        symbol: Symbol,
        create: bool,
    ) -> Result<Option<Binding>> {
        self(vm, symbol, create)
    }
}

/// Dictionary backed scope, used for the root environment and for objects
#[derive(Debug, Clone, Copy)]
pub struct DictScope {
    dict: DictHandle,
    auto_create: bool,
}

impl DictScope {
    /// set-words seen for the first time get a fresh `none` slot
    pub fn root(dict: DictHandle) -> Self {
        Self {
            dict,
            auto_create: true,
        }
    }

    /// only resolves symbols that already have a field
    pub fn object(dict: DictHandle) -> Self {
        Self {
            dict,
            auto_create: false,
        }
    }
}

impl Scope for DictScope {
    /// The root only binds what nothing else has claimed. An object takes
    /// over dictionary bindings and its own fields, but leaves the
    /// parameters of an enclosing procedure alone.
    fn replaces(&self, current: Binding, create: bool) -> bool {
        if self.auto_create {
            return false;
        }
        create || matches!(current, Binding::Map(_))
    }

    fn resolve(
        &mut self,
        vm: &mut Vm,
        symbol: Symbol,
        create: bool,
    ) -> Result<Option<Binding>> {
        if let Some(slot) = vm.heap().dict_find(self.dict, symbol)? {
            return Ok(Some(Binding::Map(slot)));
        }
        if create && self.auto_create {
            let slot = vm.heap_mut()?.dict_put(self.dict, symbol, Value::None)?;
            return Ok(Some(Binding::Map(slot)));
        }
        Ok(None)
    }
}

/// Procedure parameters, parameter `i` of `n` lives at `fp + i - n`
#[derive(Debug, Clone)]
pub struct FrameScope {
    params: Vec<Symbol>,
}

impl FrameScope {
    pub fn new(params: Vec<Symbol>) -> Self {
        Self { params }
    }

    pub fn stack_size(&self) -> usize {
        self.params.len()
    }
}

impl Scope for FrameScope {
    fn resolve(
        &mut self,
        _vm: &mut Vm,
        symbol: Symbol,
        _create: bool,
    ) -> Result<Option<Binding>> {
        let Some(index) = self.params.iter().position(|&p| p == symbol) else {
            return Ok(None);
        };
        let offset = index as i64 - self.params.len() as i64;
        Ok(i32::try_from(offset).ok().map(Binding::Stack))
    }
}

/// The single reused slot of `foreach` and `repeat`
#[derive(Debug, Clone, Copy)]
pub struct LoopScope {
    pub symbol: Symbol,
    pub offset: i32,
}

impl Scope for LoopScope {
    fn resolve(
        &mut self,
        _vm: &mut Vm,
        symbol: Symbol,
        _create: bool,
    ) -> Result<Option<Binding>> {
        Ok((symbol == self.symbol).then_some(Binding::Stack(self.offset)))
    }
}

impl Arena {
    pub fn alloc_binding(
        &mut self,
        binding: Option<Binding>,
    ) -> Result<BindingHandle> {
        let cell = binding.map(Binding::to_cell).unwrap_or_default();
        Ok(Handle::new(self.alloc(cell)?))
    }

    pub fn binding(&self, handle: BindingHandle) -> Result<Option<Binding>> {
        Binding::from_cell(self.read(handle.addr())?)
    }
}

impl Vm {
    /// Walks `block` and every block nested in it once, asking `scope`
    /// for the binding of each word.
    pub fn bind_with(
        &mut self,
        block: BlockHandle,
        scope: &mut dyn Scope,
    ) -> Result<()> {
        // worklist instead of recursion, nesting depth is up to the source
        let mut pending = VecDeque::from([block]);
        // blocks can contain themselves through `append`
        let mut seen = HashSet::from([block.addr()]);
        while let Some(block) = pending.pop_front() {
            for value in self.heap().block_values(block)? {
                match value {
                    Value::Block(inner) => {
                        if seen.insert(inner.addr()) {
                            pending.push_back(inner);
                        }
                    }
                    Value::SetWord(word) => {
                        self.bind_cell(word.binding, word.symbol, scope, true)?;
                    }
                    Value::Word(word)
                    | Value::GetWord(word)
                    | Value::Quote(word) => {
                        let (handle, symbol) = (word.binding, word.symbol);
                        self.bind_cell(handle, symbol, scope, false)?;
                    }
                    Value::Path(path) | Value::GetPath(path) => {
                        let (head, _) = self.heap().path_entry(path.first)?;
                        self.bind_cell(path.binding, head, scope, false)?;
                    }
                    Value::None
                    | Value::Integer(_)
                    | Value::Boolean(_)
                    | Value::String(_)
                    | Value::Dictionary(_)
                    | Value::Native(_)
                    | Value::Proc(_) => {}
                }
            }
        }
        Ok(())
    }

    /// Current binding of a word. A frozen vm keeps the bindings it
    /// resolves itself in a private table, the shared arena is never
    /// written.
    pub fn binding_of(&self, handle: BindingHandle) -> Result<Option<Binding>> {
        if let Some(&binding) = self.rebound.get(&handle.addr()) {
            return Ok(Some(binding));
        }
        self.heap().binding(handle)
    }

    fn bind_cell(
        &mut self,
        handle: BindingHandle,
        symbol: Symbol,
        scope: &mut dyn Scope,
        create: bool,
    ) -> Result<()> {
        let current = self.binding_of(handle)?;
        if current.is_some_and(|current| !scope.replaces(current, create)) {
            return Ok(());
        }
        let Some(binding) = scope.resolve(self, symbol, create)? else {
            return Ok(());
        };
        if current == Some(binding) {
            return Ok(());
        }
        trace!(
            "bind {} -> {:?}",
            self.symbols().display(symbol),
            binding
        );
        if self.is_frozen() {
            self.rebound.insert(handle.addr(), binding);
            return Ok(());
        }
        self.heap_mut()?.write(handle.addr(), binding.to_cell())
    }
}
