use log::trace;

use crate::{
    Binding, BindingHandle, BlockHandle, EntryHandle, LoopScope, NativeContext,
    NativeIndex, PathRef, Proc, Result, Symbol, Value, Vm, VmError, WordRef,
};

impl Vm {
    /// Runs entries from `first` until the end of their block and returns
    /// the last result. The caller's cursor is restored afterwards.
    pub fn run(&mut self, first: EntryHandle) -> Result<Value> {
        let saved = self.pc;
        self.pc = first;
        let mut result = Ok(Value::None);
        while !self.pc.is_null() {
            result = self.step();
            if result.is_err() {
                break;
            }
        }
        self.pc = saved;
        result
    }

    pub fn run_block(&mut self, block: BlockHandle) -> Result<Value> {
        let first = self.heap().block_first(block)?;
        self.run(first)
    }

    /// Evaluates one item at the cursor and records it as the last result
    pub fn step(&mut self) -> Result<Value> {
        let value = self.next()?;
        self.result = value;
        Ok(value)
    }

    /// Evaluates the next item at the cursor. Natives pull their arguments
    /// through here, so arity is just the number of calls they make.
    pub fn next(&mut self) -> Result<Value> {
        let value = self.next_raw()?;
        // `add add add ...` nests here once per word
        if self.nesting >= self.info.max_nesting {
            return Err(VmError::NestingTooDeep);
        }
        self.nesting += 1;
        let result = self.eval(value);
        self.nesting -= 1;
        result
    }

    /// Reads the next item without evaluating it
    pub fn next_raw(&mut self) -> Result<Value> {
        if self.pc.is_null() {
            return Err(VmError::MissingArgument);
        }
        let (value, next) = self.heap().entry(self.pc)?;
        self.pc = next;
        Ok(value)
    }

    fn eval(&mut self, value: Value) -> Result<Value> {
        match value {
            Value::None
            | Value::Integer(_)
            | Value::Boolean(_)
            | Value::String(_)
            | Value::Block(_)
            | Value::Dictionary(_) => Ok(value),
            Value::Word(word) => {
                let bound = self.word_value(word)?;
                self.invoke(bound)
            }
            Value::GetWord(word) => self.word_value(word),
            Value::SetWord(word) => {
                let binding = self.bound(word.binding, word.symbol)?;
                let value = self.next()?;
                self.store_binding(binding, value)?;
                Ok(value)
            }
            Value::Quote(word) => Ok(Value::Word(word)),
            Value::Native(_) | Value::Proc(_) => self.invoke(value),
            Value::Path(path) => {
                let bound = self.path_value(path)?;
                self.invoke(bound)
            }
            Value::GetPath(path) => self.path_value(path),
        }
    }

    /// Calls executable values with the current cursor as argument source,
    /// everything else is returned as is.
    fn invoke(&mut self, value: Value) -> Result<Value> {
        match value {
            Value::Native(index) => self.call_native(index),
            Value::Proc(proc) => {
                let size = proc.stack_size as usize;
                let mut args = Vec::with_capacity(size);
                // arguments are evaluated before the frame moves, so the
                // caller's own stack offsets still resolve while they run
                for _ in 0..size {
                    args.push(self.next()?);
                }
                self.enter(proc, &args)
            }
            other => Ok(other),
        }
    }

    fn call_native(&mut self, index: NativeIndex) -> Result<Value> {
        let entry = self.natives.get(index.0 as usize).ok_or_else(|| {
            VmError::UnknownNativeFunction(format!("#{}", index.0))
        })?;
        let func = entry.func;
        trace!("native {}", entry.name);
        let mut context = NativeContext::new(self);
        func(&mut context)
    }

    /// Pushes a frame for `proc`, runs its body and pops the frame again.
    pub(crate) fn enter(
        &mut self,
        proc: Proc,
        args: &[Value],
    ) -> Result<Value> {
        if args.len() != proc.stack_size as usize {
            return Err(VmError::MissingArgument);
        }
        if self.call_depth >= self.info.max_call_depth {
            return Err(VmError::CallDepthExceeded);
        }
        let base = self.stack.depth();
        let saved_fp = self.fp;
        for &arg in args {
            if let Err(err) = self.stack.push(arg) {
                self.stack.truncate(base);
                return Err(err);
            }
        }
        self.fp = self.stack.depth();
        self.call_depth += 1;

        let result = self.run(proc.first);

        self.call_depth -= 1;
        self.fp = saved_fp;
        self.stack.truncate(base);
        result
    }

    /// Pushes one slot for a loop word, binds `symbol` inside `body` to it
    /// and hands the absolute slot index to `f`.
    pub(crate) fn with_loop_slot<F>(
        &mut self,
        symbol: Symbol,
        body: BlockHandle,
        f: F,
    ) -> Result<Value>
    where
        F: FnOnce(&mut Vm, usize) -> Result<Value>,
    {
        let base = self.stack.depth();
        let offset = i32::try_from(base.saturating_sub(self.fp))
            .map_err(|_| VmError::StackOverflow)?;
        self.bind_with(body, &mut LoopScope { symbol, offset })?;
        self.stack.push(Value::None)?;
        let result = f(self, base);
        self.stack.truncate(base);
        result
    }

    pub(crate) fn set_stack_slot(
        &mut self,
        index: usize,
        value: Value,
    ) -> Result<()> {
        self.stack.set(index, value)
    }

    fn unbound(&self, symbol: Symbol) -> VmError {
        VmError::UnboundSymbol(self.symbols().display(symbol))
    }

    fn bound(&self, handle: BindingHandle, symbol: Symbol) -> Result<Binding> {
        let binding = self.binding_of(handle)?;
        binding.ok_or_else(|| self.unbound(symbol))
    }

    fn stack_index(&self, offset: i32) -> Result<usize> {
        let index = self.fp as i64 + i64::from(offset);
        usize::try_from(index)
            .ok()
            .filter(|&index| index < self.stack.depth())
            .ok_or(VmError::StackUnderflow)
    }

    pub(crate) fn load_binding(&self, binding: Binding) -> Result<Value> {
        match binding {
            Binding::Map(slot) => self.heap().slot_value(slot),
            Binding::Stack(offset) => {
                let index = self.stack_index(offset)?;
                self.stack.get(index).ok_or(VmError::StackUnderflow)
            }
        }
    }

    pub(crate) fn store_binding(
        &mut self,
        binding: Binding,
        value: Value,
    ) -> Result<()> {
        match binding {
            Binding::Map(slot) => self.heap_mut()?.set_slot_value(slot, value),
            Binding::Stack(offset) => {
                let index = self.stack_index(offset)?;
                self.stack.set(index, value)
            }
        }
    }

    /// Value a word is bound to, never invoked
    pub fn word_value(&self, word: WordRef) -> Result<Value> {
        let binding = self.bound(word.binding, word.symbol)?;
        self.load_binding(binding)
    }

    /// Walks a path, each segment after the head is looked up in the
    /// dictionary produced by the previous one. A missing field is `none`.
    pub fn path_value(&self, path: PathRef) -> Result<Value> {
        let (head, mut next) = self.heap().path_entry(path.first)?;
        let binding = self.bound(path.binding, head)?;
        let mut value = self.load_binding(binding)?;
        let mut steps = 0;
        while !next.is_null() {
            steps += 1;
            if steps > self.heap().top() {
                return Err(VmError::CyclicChain(next.addr()));
            }
            let (symbol, following) = self.heap().path_entry(next)?;
            let dict = value.as_dictionary()?;
            match self.heap().dict_get(dict, symbol)? {
                Some(field) => value = field,
                None => {
                    trace!("path miss on {}", self.symbols().display(symbol));
                    return Ok(Value::None);
                }
            }
            next = following;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Value, Vm, VmCreateInfo, VmError};

    fn vm() -> Vm {
        Vm::new(&VmCreateInfo::default()).unwrap()
    }

    fn eval(source: &str) -> Result<Value, VmError> {
        let mut vm = vm();
        vm.execute(source)
    }

    #[test]
    fn literals_evaluate_to_themselves() {
        assert_eq!(eval("1 2 3").unwrap(), Value::Integer(3));
        assert_eq!(eval("true").unwrap(), Value::Boolean(true));
        assert!(matches!(eval("[a b]").unwrap(), Value::Block(_)));
    }

    #[test]
    fn empty_program_is_none() {
        assert_eq!(eval("").unwrap(), Value::None);
    }

    #[test]
    fn set_word_returns_stored_value() {
        let mut vm = vm();
        assert_eq!(vm.execute("x: 5").unwrap(), Value::Integer(5));
        assert_eq!(vm.lookup("x").unwrap(), Some(Value::Integer(5)));
        assert_eq!(vm.execute("x: add x 1 x").unwrap(), Value::Integer(6));
    }

    #[test]
    fn unbound_word_is_a_fault() {
        assert_eq!(
            eval("nope"),
            Err(VmError::UnboundSymbol("nope".to_string()))
        );
    }

    #[test]
    fn get_word_does_not_invoke() {
        let value = eval("sum: fn [a b] [add a b] :sum").unwrap();
        assert!(matches!(value, Value::Proc(_)));
        assert!(matches!(eval(":add").unwrap(), Value::Native(_)));
    }

    #[test]
    fn quote_yields_the_word() {
        assert!(matches!(eval("'anything").unwrap(), Value::Word(_)));
    }

    #[test]
    fn missing_argument() {
        assert_eq!(eval("add 1"), Err(VmError::MissingArgument));
    }

    #[test]
    fn type_mismatch_on_cast() {
        assert_eq!(
            eval("add 1 true"),
            Err(VmError::TypeMismatch {
                expected: "integer",
                found: "boolean",
            })
        );
    }

    #[test]
    fn procs_do_not_disturb_caller_offsets() {
        let source = "
            f: fn [a b] [sub a b]
            g: fn [x y] [add f x y f y x]
            g 10 3
        ";
        assert_eq!(eval(source).unwrap(), Value::Integer(0));
        let source = "
            f: fn [a] [add a 1]
            g: fn [x y] [add x f y]
            g 10 3
        ";
        assert_eq!(eval(source).unwrap(), Value::Integer(14));
    }

    #[test]
    fn set_word_on_a_parameter_writes_the_frame() {
        let source = "f: fn [n] [n: add n 1 add n n] f 4";
        assert_eq!(eval(source).unwrap(), Value::Integer(10));
    }

    #[test]
    fn runaway_recursion_is_bounded() {
        let mut vm = vm();
        let result = vm.execute("loop: fn [n] [loop n] loop 1");
        assert!(matches!(
            result,
            Err(VmError::CallDepthExceeded
                | VmError::StackOverflow
                | VmError::NestingTooDeep)
        ));
        assert_eq!(vm.stack_depth(), 0);
        assert_eq!(vm.execute("add 1 1").unwrap(), Value::Integer(2));
    }

    #[test]
    fn argument_nesting_is_bounded() {
        let mut vm = vm();
        let source =
            format!("{}1{}", "add ".repeat(1000), " 1".repeat(1000));
        assert_eq!(vm.execute(&source), Err(VmError::NestingTooDeep));
        assert_eq!(vm.stack_depth(), 0);
        assert_eq!(vm.execute("add add 1 2 3").unwrap(), Value::Integer(6));

        let shallow =
            format!("{}1{}", "add ".repeat(100), " 1".repeat(100));
        assert_eq!(vm.execute(&shallow).unwrap(), Value::Integer(101));
    }

    #[test]
    fn path_soft_and_hard_failures() {
        let mut vm = vm();
        vm.execute("o: make-object [a: 1 n: 2]").unwrap();
        assert_eq!(vm.execute("o/missing").unwrap(), Value::None);
        assert_eq!(
            vm.execute("o/a/b"),
            Err(VmError::TypeMismatch {
                expected: "dictionary",
                found: "integer",
            })
        );
        assert_eq!(
            vm.execute("p/a"),
            Err(VmError::UnboundSymbol("p".to_string()))
        );
    }

    #[test]
    fn paths_invoke_executables() {
        let mut vm = vm();
        vm.execute("m: make-object [inc: fn [x] [add x 1]]").unwrap();
        assert_eq!(vm.execute("m/inc 41").unwrap(), Value::Integer(42));
        assert!(matches!(vm.execute(":m/inc").unwrap(), Value::Proc(_)));
    }

    #[test]
    fn last_result_is_recorded() {
        let mut vm = vm();
        vm.execute("add 2 2").unwrap();
        assert_eq!(vm.last_result(), Value::Integer(4));
    }
}
