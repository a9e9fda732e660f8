use crate::{BlockHandle, DictHandle, Package, Result, Value, Vm};

mod control;
mod io;
mod math;
mod object;
mod series;

/// What a native sees of the running vm. Arguments are pulled from the
/// caller's cursor, each `next*` call consumes one.
pub struct NativeContext<'vm> {
    pub vm: &'vm mut Vm,
}

pub type NativeFn = fn(&mut NativeContext<'_>) -> Result<Value>;

impl<'vm> NativeContext<'vm> {
    #[inline]
    pub fn new(vm: &'vm mut Vm) -> Self {
        Self { vm }
    }

    /// next argument, evaluated
    #[inline]
    pub fn next(&mut self) -> Result<Value> {
        self.vm.next()
    }

    /// next argument as written in the source
    #[inline]
    pub fn next_raw(&mut self) -> Result<Value> {
        self.vm.next_raw()
    }

    pub fn next_integer(&mut self) -> Result<i64> {
        self.next()?.as_integer()
    }

    pub fn next_boolean(&mut self) -> Result<bool> {
        self.next()?.as_boolean()
    }

    pub fn next_block(&mut self) -> Result<BlockHandle> {
        self.next()?.as_block()
    }

    pub fn next_dictionary(&mut self) -> Result<DictHandle> {
        self.next()?.as_dictionary()
    }
}

#[derive(Clone, Copy)]
pub struct NativeDesc {
    pub name: &'static str,
    pub func: NativeFn,
}

impl NativeDesc {
    pub const fn new(name: &'static str, func: NativeFn) -> Self {
        Self { name, func }
    }
}

const CORE: &[NativeDesc] = &[
    NativeDesc::new("add", math::add),
    NativeDesc::new("sub", math::sub),
    NativeDesc::new("mul", math::mul),
    NativeDesc::new("gt", math::gt),
    NativeDesc::new("lt", math::lt),
    NativeDesc::new("eq", math::eq),
    NativeDesc::new("either", control::either),
    NativeDesc::new("fn", control::function),
    NativeDesc::new("do", control::run),
    NativeDesc::new("foreach", control::foreach),
    NativeDesc::new("repeat", control::repeat),
    NativeDesc::new("make-object", object::make_object),
    NativeDesc::new("in", object::in_object),
    NativeDesc::new("get", object::get),
    NativeDesc::new("none", object::none),
    NativeDesc::new("append", series::append),
    NativeDesc::new("length", series::length),
    NativeDesc::new("print", io::print),
];

/// The package every vm boots with, installed into the root dictionary
pub fn core_package() -> Package {
    let mut package = Package::new("core");
    for desc in CORE {
        package.add_native(desc.name, desc.func);
    }
    package
}
