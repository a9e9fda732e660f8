use std::{collections::HashMap, sync::Arc};

use log::debug;

use crate::{DictHandle, NativeFn, NativeIndex, Result, Value, Vm, VmError};

/// A named group of natives, installed under the package name as prefix
/// (`core/add`) in the native table.
#[derive(Clone)]
pub struct Package {
    name: String,
    natives: Vec<(String, NativeFn)>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            natives: Vec::new(),
        }
    }

    pub fn add_native(&mut self, name: impl Into<String>, func: NativeFn) {
        self.natives.push((name.into(), func));
    }

    pub fn with_native(
        mut self,
        name: impl Into<String>,
        func: NativeFn,
    ) -> Self {
        self.add_native(name, func);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn natives(&self) -> impl Iterator<Item = (&str, NativeFn)> {
        self.natives.iter().map(|(name, func)| (name.as_str(), *func))
    }

    pub fn qualified(&self, native: &str) -> String {
        format!("{}/{}", self.name, native)
    }
}

/// Entry of a vm's native table, the index is what native values store
#[derive(Clone)]
pub struct NativeEntry {
    pub name: Arc<str>,
    pub func: NativeFn,
}

/// Host side name to function map, used to re-resolve natives of a loaded
/// snapshot against the functions of the running binary.
#[derive(Clone, Default)]
pub struct FunctionTable(HashMap<String, NativeFn>);

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_packages<'a>(
        packages: impl IntoIterator<Item = &'a Package>,
    ) -> Self {
        let mut table = Self::new();
        for package in packages {
            table.add_package(package);
        }
        table
    }

    pub fn add_package(&mut self, package: &Package) {
        for (name, func) in package.natives() {
            self.insert(package.qualified(name), func);
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, func: NativeFn) {
        self.0.insert(name.into(), func);
    }

    pub fn get(&self, name: &str) -> Option<NativeFn> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Vm {
    /// Appends to the native table, a name that is already present keeps
    /// its index and gets the new function.
    pub(crate) fn add_native(
        &mut self,
        name: &str,
        func: NativeFn,
    ) -> Result<NativeIndex> {
        if self.is_frozen() {
            return Err(VmError::ReadOnlyViolation);
        }
        let natives = Arc::make_mut(&mut self.natives);
        if let Some(index) = natives.iter().position(|n| &*n.name == name) {
            natives[index].func = func;
            return index_of(index);
        }
        let index = index_of(natives.len())?;
        natives.push(NativeEntry {
            name: Arc::from(name),
            func,
        });
        Ok(index)
    }

    /// Installs a single native into the root dictionary under `name`
    pub fn register_native(
        &mut self,
        name: &str,
        func: NativeFn,
    ) -> Result<Value> {
        let index = self.add_native(name, func)?;
        let symbol = self.intern(name)?;
        let root = self.root();
        let value = Value::Native(index);
        self.heap_mut()?.dict_put(root, symbol, value)?;
        Ok(value)
    }

    /// Installs every native of `package` into `dict` under its short name
    pub fn load_package(
        &mut self,
        package: &Package,
        dict: DictHandle,
    ) -> Result<()> {
        debug!(
            "loading package {} ({} natives)",
            package.name(),
            package.natives.len()
        );
        for (name, func) in package.natives() {
            let index = self.add_native(&package.qualified(name), func)?;
            let symbol = self.intern(name)?;
            self.heap_mut()?
                .dict_put(dict, symbol, Value::Native(index))?;
        }
        Ok(())
    }

    /// Installs `package` into a fresh dictionary stored in the root under
    /// the package name, so its natives are reachable as `name/native`.
    pub fn load_package_object(
        &mut self,
        package: &Package,
    ) -> Result<DictHandle> {
        let dict = self.heap_mut()?.alloc_dictionary()?;
        self.load_package(package, dict)?;
        let symbol = self.intern(package.name())?;
        let root = self.root();
        self.heap_mut()?
            .dict_put(root, symbol, Value::Dictionary(dict))?;
        Ok(dict)
    }

    /// Qualified name of a native, `None` for an index outside the table
    pub fn native_name(&self, index: NativeIndex) -> Option<Arc<str>> {
        self.natives.get(index.0 as usize).map(|n| n.name.clone())
    }

    /// Function table holding this vm's current natives
    pub fn function_table(&self) -> FunctionTable {
        let mut table = FunctionTable::new();
        for native in self.natives.iter() {
            table.insert(native.name.to_string(), native.func);
        }
        table
    }
}

fn index_of(index: usize) -> Result<NativeIndex> {
    u32::try_from(index)
        .map(NativeIndex)
        .map_err(|_| VmError::UnknownNativeFunction(index.to_string()))
}
