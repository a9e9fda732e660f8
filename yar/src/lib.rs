mod arena;
mod binder;
mod block;
mod dictionary;
mod error;
mod format;
mod image;
mod interning;
mod interpreter;
mod package;
mod parser;
mod path;
mod primitives;
mod stack;
mod strings;
mod tagged;
mod vm;

pub use arena::*;
pub use binder::*;
pub use block::BlockIter;
pub use dictionary::DictIter;
pub use error::*;
pub use interning::*;
pub use package::*;
pub use parser::*;
pub use primitives::{NativeContext, NativeDesc, NativeFn, core_package};
pub use stack::*;
pub use tagged::*;
pub use vm::*;
