use std::{collections::HashMap, fmt, sync::Arc};

use log::{debug, warn};

use crate::{
    Arena, ArenaCreateInfo, Binding, BlockHandle, DictHandle, DictScope,
    EntryHandle, Handle, NativeEntry, Proc, Result, Stack, Symbol,
    SymbolTable, Value, VmError, core_package,
};

pub const DEFAULT_STACK_SIZE: usize = 128;
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;
pub const DEFAULT_MAX_NESTING: usize = 512;

#[derive(Debug, Clone)]
pub struct VmCreateInfo {
    pub arena: ArenaCreateInfo,
    /// value stack capacity
    pub stack_size: usize,
    /// nesting limit for procedure calls
    pub max_call_depth: usize,
    /// how deep argument evaluation may nest inside one call
    pub max_nesting: usize,
}

impl Default for VmCreateInfo {
    fn default() -> Self {
        Self {
            arena: ArenaCreateInfo::default(),
            stack_size: DEFAULT_STACK_SIZE,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }
}

/// One evaluation context. The arena, symbols and natives are shared by
/// reference with forks once the vm is frozen; the stack and cursor are
/// always private.
pub struct Vm {
    arena: Arc<Arena>,
    symbols: SymbolTable,
    pub(crate) natives: Arc<Vec<NativeEntry>>,
    root: DictHandle,
    frozen: bool,

    pub(crate) stack: Stack,
    /// frame pointer, stack bindings are relative to it
    pub(crate) fp: usize,
    /// cursor, the next entry to evaluate
    pub(crate) pc: EntryHandle,
    pub(crate) call_depth: usize,
    pub(crate) nesting: usize,
    /// bindings a frozen vm resolved for itself, keyed by binding cell
    pub(crate) rebound: HashMap<u32, Binding>,
    pub(crate) result: Value,
    pub(crate) info: VmCreateInfo,
}

/// Evaluation state saved around host entry points
#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    depth: usize,
    fp: usize,
    pc: EntryHandle,
    call_depth: usize,
    nesting: usize,
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("cells", &self.arena.top())
            .field("symbols", &self.symbols.len())
            .field("natives", &self.natives.len())
            .field("root", &self.root)
            .field("frozen", &self.frozen)
            .field("depth", &self.stack.depth())
            .field("fp", &self.fp)
            .field("rebound", &self.rebound.len())
            .finish()
    }
}

impl Vm {
    /// Creates a vm whose root dictionary holds `true`, `false` and the
    /// `core` package.
    pub fn new(info: &VmCreateInfo) -> Result<Self> {
        let mut arena = Arena::new(&info.arena)?;
        let root = arena.alloc_dictionary()?;
        let mut vm = Self::from_parts(
            arena,
            SymbolTable::new(),
            Vec::new(),
            root,
            info.clone(),
        );

        vm.load_package(&core_package(), root)?;
        for (name, value) in [("true", true), ("false", false)] {
            let symbol = vm.intern(name)?;
            vm.heap_mut()?
                .dict_put(root, symbol, Value::Boolean(value))?;
        }
        debug!(
            "vm booted: {} cells, {} natives",
            vm.heap().top(),
            vm.natives.len()
        );
        Ok(vm)
    }

    pub(crate) fn from_parts(
        arena: Arena,
        symbols: SymbolTable,
        natives: Vec<NativeEntry>,
        root: DictHandle,
        info: VmCreateInfo,
    ) -> Self {
        Self {
            arena: Arc::new(arena),
            symbols,
            natives: Arc::new(natives),
            root,
            frozen: false,
            stack: Stack::new(info.stack_size),
            fp: 0,
            pc: Handle::null(),
            call_depth: 0,
            nesting: 0,
            rebound: HashMap::new(),
            result: Value::None,
            info,
        }
    }

    #[inline]
    pub fn heap(&self) -> &Arena {
        &self.arena
    }

    /// Mutable arena access, refused once the vm is frozen
    pub fn heap_mut(&mut self) -> Result<&mut Arena> {
        if self.frozen {
            return Err(VmError::ReadOnlyViolation);
        }
        Arc::get_mut(&mut self.arena).ok_or(VmError::ReadOnlyViolation)
    }

    #[inline]
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Interns `name`. A frozen vm can still look up names it already knows.
    pub fn intern(&self, name: &str) -> Result<Symbol> {
        if self.frozen {
            return self.symbols.get(name).ok_or(VmError::ReadOnlyViolation);
        }
        self.symbols.intern(name)
    }

    #[inline]
    pub fn root(&self) -> DictHandle {
        self.root
    }

    #[inline]
    pub fn info(&self) -> &VmCreateInfo {
        &self.info
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Marks the vm read only, every later allocation or write against it
    /// fails with `ReadOnlyViolation`. There is no way back.
    pub fn freeze(&mut self) {
        if !self.frozen {
            debug!("vm frozen at {} cells", self.heap().top());
        }
        self.frozen = true;
    }

    /// A new frozen vm over the same arena with its own stack preloaded
    /// with `stack`. The frame pointer sits on top of the preloaded
    /// values, so they are the arguments of whatever `run_proc` runs.
    pub fn fork(&self, stack: &[Value]) -> Result<Vm> {
        if !self.frozen {
            return Err(VmError::NotFrozen);
        }
        let stack = Stack::with_values(self.info.stack_size, stack)?;
        debug!("fork with {} stack values", stack.depth());
        Ok(Self {
            arena: Arc::clone(&self.arena),
            symbols: self.symbols.clone(),
            natives: Arc::clone(&self.natives),
            root: self.root,
            frozen: true,
            fp: stack.depth(),
            stack,
            pc: Handle::null(),
            call_depth: 0,
            nesting: 0,
            rebound: HashMap::new(),
            result: Value::None,
            info: self.info.clone(),
        })
    }

    /// Freezes this vm and returns a second frozen handle to the same
    /// state, the base that request handlers fork from.
    pub fn clone_frozen(&mut self) -> Result<Vm> {
        self.freeze();
        self.fork(&[])
    }

    #[inline]
    pub fn stack_depth(&self) -> usize {
        self.stack.depth()
    }

    #[inline]
    pub fn stack_values(&self) -> &[Value] {
        self.stack.values()
    }

    /// Result of the most recent step
    #[inline]
    pub fn last_result(&self) -> Value {
        self.result
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            depth: self.stack.depth(),
            fp: self.fp,
            pc: self.pc,
            call_depth: self.call_depth,
            nesting: self.nesting,
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.stack.truncate(checkpoint.depth);
        self.fp = checkpoint.fp;
        self.pc = checkpoint.pc;
        self.call_depth = checkpoint.call_depth;
        self.nesting = checkpoint.nesting;
    }

    /// Runs `f`, putting the evaluation state back if it fails
    fn guarded<F>(&mut self, f: F) -> Result<Value>
    where
        F: FnOnce(&mut Vm) -> Result<Value>,
    {
        let checkpoint = self.checkpoint();
        let result = f(self);
        if result.is_err() {
            self.restore(checkpoint);
        }
        result
    }

    /// Binds `block` against the root dictionary
    pub fn bind(&mut self, block: BlockHandle) -> Result<()> {
        let mut scope = DictScope::root(self.root);
        self.bind_with(block, &mut scope)
    }

    pub fn bind_and_run(&mut self, block: BlockHandle) -> Result<Value> {
        self.guarded(|vm| {
            vm.bind(block)?;
            vm.run_block(block)
        })
    }

    /// Parses, binds and runs one command
    pub fn execute(&mut self, source: &str) -> Result<Value> {
        let result = self
            .parse(source)
            .and_then(|block| self.bind_and_run(block));
        match &result {
            Ok(value) => {
                if log::log_enabled!(log::Level::Debug) {
                    let rendered = self.to_string(*value)?;
                    debug!("execute {source:?} -> {rendered}");
                }
            }
            Err(err) => warn!("execute {source:?} failed: {err}"),
        }
        result
    }

    /// Reads a root dictionary entry without interning `name`
    pub fn lookup(&self, name: &str) -> Result<Option<Value>> {
        match self.symbols.get(name) {
            Some(symbol) => self.heap().dict_get(self.root, symbol),
            None => Ok(None),
        }
    }

    /// Calls a procedure with host supplied arguments
    pub fn call(&mut self, proc: Proc, args: &[Value]) -> Result<Value> {
        self.guarded(|vm| vm.enter(proc, args))
    }

    /// Runs a procedure body against the current frame. On a fork the frame
    /// is the preloaded stack, so its values are the arguments.
    pub fn run_proc(&mut self, proc: Proc) -> Result<Value> {
        if self.fp < proc.stack_size as usize {
            return Err(VmError::StackUnderflow);
        }
        if self.call_depth >= self.info.max_call_depth {
            return Err(VmError::CallDepthExceeded);
        }
        self.guarded(|vm| {
            vm.call_depth += 1;
            let result = vm.run(proc.first);
            vm.call_depth -= 1;
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NativeContext, Package};

    fn vm() -> Vm {
        Vm::new(&VmCreateInfo::default()).unwrap()
    }

    fn eval(source: &str) -> Result<Value> {
        vm().execute(source)
    }

    #[test]
    fn scenarios() {
        assert_eq!(eval("add 1 2").unwrap(), Value::Integer(3));
        assert_eq!(eval("add add 1 2 3").unwrap(), Value::Integer(6));
        assert_eq!(
            eval("x: fn [n] [add n 10] x 5").unwrap(),
            Value::Integer(15)
        );
        assert_eq!(
            eval("sum: fn [n] [either gt n 1 [add n sum sub n 1] [n]] sum 100")
                .unwrap(),
            Value::Integer(5050)
        );
        assert_eq!(
            eval("o: make-object [a: 42 b: make-object [c: 55]] o/b/c")
                .unwrap(),
            Value::Integer(55)
        );
    }

    #[test]
    fn boots_with_booleans_and_core() {
        let vm = vm();
        assert_eq!(vm.lookup("true").unwrap(), Some(Value::Boolean(true)));
        assert_eq!(vm.lookup("false").unwrap(), Some(Value::Boolean(false)));
        assert!(matches!(vm.lookup("add").unwrap(), Some(Value::Native(_))));
        assert_eq!(vm.lookup("never-interned").unwrap(), None);
    }

    #[test]
    fn determinism_across_vms() {
        let source = "
            fib: fn [n] [either lt n 2 [n] [add fib sub n 1 fib sub n 2]]
            o: make-object [v: fib 15]
            o/v
        ";
        let a = eval(source).unwrap();
        let b = eval(source).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, Value::Integer(610));
    }

    #[test]
    fn upsert_keeps_entry_count() {
        let mut vm = vm();
        let root = vm.root();
        let before = vm.heap().dict_len(root).unwrap();
        vm.execute("k: 1").unwrap();
        vm.execute("k: 2").unwrap();
        assert_eq!(vm.heap().dict_len(root).unwrap(), before + 1);
        assert_eq!(vm.lookup("k").unwrap(), Some(Value::Integer(2)));
    }

    #[test]
    fn bound_blocks_rerun_without_rebinding() {
        let mut vm = vm();
        let block = vm.parse("f: fn [a b] [mul a b] f 6 7").unwrap();
        let first = vm.bind_and_run(block).unwrap();
        let second = vm.run_block(block).unwrap();
        assert_eq!(first, Value::Integer(42));
        assert_eq!(first, second);
    }

    #[test]
    fn frozen_vms_reject_writes() {
        let mut vm = vm();
        vm.execute("g: 1").unwrap();
        vm.freeze();
        assert_eq!(vm.execute("g: 2"), Err(VmError::ReadOnlyViolation));
        assert!(matches!(vm.heap_mut(), Err(VmError::ReadOnlyViolation)));
        assert_eq!(vm.intern("brand-new"), Err(VmError::ReadOnlyViolation));
        assert!(vm.intern("g").is_ok());
        assert_eq!(vm.lookup("g").unwrap(), Some(Value::Integer(1)));
    }

    #[test]
    fn fork_requires_freeze() {
        let vm = vm();
        assert!(matches!(vm.fork(&[]), Err(VmError::NotFrozen)));
    }

    #[test]
    fn forks_run_concurrently_without_cross_talk() {
        let mut base = vm();
        base.execute("sum: fn [x y] [add x y]").unwrap();
        let proc = base.lookup("sum").unwrap().unwrap().as_proc().unwrap();
        let shared = base.clone_frozen().unwrap();
        assert!(base.is_frozen());

        let jobs = [
            ([42, 41], 83),
            ([10, 20], 30),
            ([-5, 5], 0),
            ([1000, 1], 1001),
        ];
        std::thread::scope(|scope| {
            let handles = jobs
                .iter()
                .map(|&([x, y], expected)| {
                    let args = [Value::Integer(x), Value::Integer(y)];
                    let mut fork = shared.fork(&args).unwrap();
                    scope.spawn(move || {
                        for _ in 0..100 {
                            let result = fork.run_proc(proc).unwrap();
                            assert_eq!(result, Value::Integer(expected));
                        }
                        assert_eq!(fork.stack_values(), &args[..]);
                    })
                })
                .collect::<Vec<_>>();
            for handle in handles {
                handle.join().unwrap();
            }
        });
    }

    #[test]
    fn forks_cannot_write_shared_state() {
        let mut base = vm();
        base.execute("counter: 0 bump: fn [] [counter: add counter 1]")
            .unwrap();
        let bump = base.lookup("bump").unwrap().unwrap().as_proc().unwrap();
        base.freeze();
        let mut fork = base.fork(&[]).unwrap();
        assert_eq!(fork.run_proc(bump), Err(VmError::ReadOnlyViolation));
        assert_eq!(base.lookup("counter").unwrap(), Some(Value::Integer(0)));
    }

    #[test]
    fn run_proc_needs_its_arguments() {
        let mut base = vm();
        base.execute("pair: fn [a b] [a]").unwrap();
        let pair = base.lookup("pair").unwrap().unwrap().as_proc().unwrap();
        base.freeze();
        let mut fork = base.fork(&[Value::Integer(1)]).unwrap();
        assert_eq!(fork.run_proc(pair), Err(VmError::StackUnderflow));
    }

    #[test]
    fn host_calls() {
        let mut vm = vm();
        vm.execute("scale: fn [k v] [mul k v]").unwrap();
        let scale = vm.lookup("scale").unwrap().unwrap().as_proc().unwrap();
        let args = [Value::Integer(3), Value::Integer(14)];
        assert_eq!(vm.call(scale, &args).unwrap(), Value::Integer(42));
        assert_eq!(vm.stack_depth(), 0);
        assert_eq!(
            vm.call(scale, &args[..1]),
            Err(VmError::MissingArgument)
        );
    }

    #[test]
    fn failures_leave_the_vm_usable() {
        let mut vm = vm();
        vm.execute("f: fn [a] [add a undefined-thing]").unwrap();
        assert_eq!(
            vm.execute("f 1"),
            Err(VmError::UnboundSymbol("undefined-thing".to_string()))
        );
        assert_eq!(vm.stack_depth(), 0);
        assert_eq!(vm.execute("f: fn [a] [a] f 9").unwrap(), Value::Integer(9));
        assert!(matches!(vm.execute("[unclosed"), Err(VmError::Parse(_))));
    }

    #[test]
    fn arena_exhaustion_is_reported() {
        let info = VmCreateInfo {
            arena: ArenaCreateInfo { capacity: 600 },
            ..VmCreateInfo::default()
        };
        let mut vm = Vm::new(&info).unwrap();
        let result = vm.execute("xs: [] repeat i 1000 [append xs i]");
        assert_eq!(result, Err(VmError::ArenaExhausted { capacity: 600 }));
        assert!(Vm::new(&VmCreateInfo {
            arena: ArenaCreateInfo { capacity: 8 },
            ..VmCreateInfo::default()
        })
        .is_err());
    }

    fn node_count(ctx: &mut NativeContext<'_>) -> Result<Value> {
        let nodes = ctx.next_block()?;
        let len = ctx.vm.heap().block_len(nodes)?;
        Value::integer(len as i64)
    }

    #[test]
    fn cluster_module() {
        let mut vm = vm();
        let host = Package::new("host").with_native("node-count", node_count);
        vm.load_package_object(&host).unwrap();
        vm.execute(
            "
            cluster: make-object [
                nodes: []
                init: fn [] [append nodes \"localhost:63001\"]
                docker-service: fn [name image] [append nodes name]
            ]
            ",
        )
        .unwrap();
        let result = vm
            .execute(
                "cluster/init cluster/docker-service \"redis\" \"redis:7\"
                 host/node-count cluster/nodes",
            )
            .unwrap();
        assert_eq!(result, Value::Integer(2));
        let nodes = vm.execute("cluster/nodes").unwrap();
        assert_eq!(
            vm.to_string(nodes).unwrap(),
            "[\"localhost:63001\" \"redis\"]"
        );
    }
}
