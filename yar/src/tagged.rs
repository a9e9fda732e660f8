//! Cell: raw 64 bit word as stored in the arena, low 8 bits are the tag
//!
//! Handle<T>: arena address typed by the structural role it points at,
//! the type checker keeps a block header from being used as a binding cell
//!
//! Value: decoded cell, the sum type every dispatch point matches on
//!
//! Layouts:
//! ```text
//! immediate  |            payload (56)            | tag (8) |
//! object     |     val (32)     |    ptr (24)     | tag (8) |
//! item       |     high (32)    |        low (32)           |
//! ```
use std::{fmt, marker::PhantomData};

use crate::{Result, Symbol, VmError};

pub const TAG_MASK: u64 = 0xff;

/// Largest address an object cell can hold in its 24 bit pointer field.
pub const MAX_ADDRESS: u32 = (1 << 24) - 1;

pub const MIN_INTEGER: i64 = -(1 << 55);
pub const MAX_INTEGER: i64 = (1 << 55) - 1;

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Tag {
    None = 0x00,
    Integer = 0x01,
    Boolean = 0x02,
    String = 0x03,
    Block = 0x04,
    Word = 0x05,
    GetWord = 0x06,
    SetWord = 0x07,
    Quote = 0x08,
    Dictionary = 0x09,
    Path = 0x0a,
    GetPath = 0x0b,
    Native = 0x0c,
    Proc = 0x0d,

    // structural cells, never decoded as values
    BlockHeader = 0x20,
    DictHeader = 0x21,
    StringHeader = 0x22,
    PathEntry = 0x23,

    MapBinding = 0x30,
    StackBinding = 0x31,
}

impl Tag {
    pub fn from_u8(raw: u8) -> Option<Self> {
        let tag = match raw {
            0x00 => Self::None,
            0x01 => Self::Integer,
            0x02 => Self::Boolean,
            0x03 => Self::String,
            0x04 => Self::Block,
            0x05 => Self::Word,
            0x06 => Self::GetWord,
            0x07 => Self::SetWord,
            0x08 => Self::Quote,
            0x09 => Self::Dictionary,
            0x0a => Self::Path,
            0x0b => Self::GetPath,
            0x0c => Self::Native,
            0x0d => Self::Proc,
            0x20 => Self::BlockHeader,
            0x21 => Self::DictHeader,
            0x22 => Self::StringHeader,
            0x23 => Self::PathEntry,
            0x30 => Self::MapBinding,
            0x31 => Self::StackBinding,
            _ => return None,
        };
        Some(tag)
    }
}

#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct Cell(u64);

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cell({:016x})", self.0)
    }
}

impl Cell {
    pub const NULL: Self = Self(0);

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn tag_byte(self) -> u8 {
        (self.0 & TAG_MASK) as u8
    }

    pub fn tag(self) -> Result<Tag> {
        let raw = self.tag_byte();
        Tag::from_u8(raw).ok_or(VmError::InvalidTag(raw))
    }

    #[inline]
    pub fn immediate(payload: i64, tag: Tag) -> Self {
        Self((payload.cast_unsigned() << 8) | tag as u64)
    }

    /// sign extending read of the 56 bit payload
    #[inline]
    pub fn payload(self) -> i64 {
        self.0.cast_signed() >> 8
    }

    #[inline]
    pub fn object(val: u32, ptr: u32, tag: Tag) -> Self {
        debug_assert!(ptr <= MAX_ADDRESS, "object pointer exceeds 24 bits");
        Self((u64::from(val) << 32) | (u64::from(ptr) << 8) | tag as u64)
    }

    #[inline]
    pub fn val(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub fn ptr(self) -> u32 {
        ((self.0 >> 8) & u64::from(MAX_ADDRESS)) as u32
    }

    #[inline]
    pub fn item(high: u32, low: u32) -> Self {
        Self((u64::from(high) << 32) | u64::from(low))
    }

    #[inline]
    pub fn high(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub fn low(self) -> u32 {
        self.0 as u32
    }
}

/// Typed arena address, `0` is null
pub struct Handle<T> {
    addr: u32,
    _marker: PhantomData<fn() -> T>,
}

// manual impls, deriving would put bounds on the marker type
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl<T> Eq for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.addr)
    }
}

impl<T> Handle<T> {
    #[inline]
    pub const fn new(addr: u32) -> Self {
        Self {
            addr,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub const fn null() -> Self {
        Self::new(0)
    }

    #[inline]
    pub const fn addr(self) -> u32 {
        self.addr
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.addr == 0
    }
}

pub enum BlockHeader {}
pub enum BlockEntry {}
pub enum DictHeader {}
pub enum DictSlot {}
pub enum BindingCell {}
pub enum PathEntry {}
pub enum StringHeader {}

pub type BlockHandle = Handle<BlockHeader>;
pub type EntryHandle = Handle<BlockEntry>;
pub type DictHandle = Handle<DictHeader>;
/// symbol/value pair of a dictionary, the target of a map binding
pub type SlotHandle = Handle<DictSlot>;
pub type BindingHandle = Handle<BindingCell>;
pub type PathHandle = Handle<PathEntry>;
pub type StringHandle = Handle<StringHeader>;

/// Symbol reference of the word family
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WordRef {
    pub symbol: Symbol,
    pub binding: BindingHandle,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PathRef {
    /// binding of the head segment
    pub binding: BindingHandle,
    pub first: PathHandle,
}

/// A closure: frame size plus the first entry of the body.
/// Arguments come from the caller's cursor, nothing is captured.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Proc {
    pub stack_size: u32,
    pub first: EntryHandle,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NativeIndex(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Value {
    #[default]
    None,
    Integer(i64),
    Boolean(bool),
    String(StringHandle),
    Block(BlockHandle),
    Word(WordRef),
    GetWord(WordRef),
    SetWord(WordRef),
    Quote(WordRef),
    Dictionary(DictHandle),
    Path(PathRef),
    GetPath(PathRef),
    Native(NativeIndex),
    Proc(Proc),
}

impl Value {
    pub fn integer(value: i64) -> Result<Self> {
        if (MIN_INTEGER..=MAX_INTEGER).contains(&value) {
            Ok(Self::Integer(value))
        } else {
            Err(VmError::IntegerOverflow)
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Integer(_) => "integer",
            Self::Boolean(_) => "boolean",
            Self::String(_) => "string",
            Self::Block(_) => "block",
            Self::Word(_) => "word",
            Self::GetWord(_) => "get-word",
            Self::SetWord(_) => "set-word",
            Self::Quote(_) => "quote",
            Self::Dictionary(_) => "dictionary",
            Self::Path(_) => "path",
            Self::GetPath(_) => "get-path",
            Self::Native(_) => "native",
            Self::Proc(_) => "proc",
        }
    }

    #[inline]
    pub fn is_executable(&self) -> bool {
        matches!(self, Self::Native(_) | Self::Proc(_))
    }

    fn mismatch(&self, expected: &'static str) -> VmError {
        VmError::TypeMismatch {
            expected,
            found: self.kind_name(),
        }
    }

    pub fn as_integer(self) -> Result<i64> {
        match self {
            Self::Integer(value) => Ok(value),
            other => Err(other.mismatch("integer")),
        }
    }

    pub fn as_boolean(self) -> Result<bool> {
        match self {
            Self::Boolean(value) => Ok(value),
            other => Err(other.mismatch("boolean")),
        }
    }

    pub fn as_block(self) -> Result<BlockHandle> {
        match self {
            Self::Block(block) => Ok(block),
            other => Err(other.mismatch("block")),
        }
    }

    pub fn as_dictionary(self) -> Result<DictHandle> {
        match self {
            Self::Dictionary(dict) => Ok(dict),
            other => Err(other.mismatch("dictionary")),
        }
    }

    /// any member of the word family
    pub fn as_word(self) -> Result<WordRef> {
        match self {
            Self::Word(word)
            | Self::GetWord(word)
            | Self::SetWord(word)
            | Self::Quote(word) => Ok(word),
            other => Err(other.mismatch("word")),
        }
    }

    pub fn as_proc(self) -> Result<Proc> {
        match self {
            Self::Proc(proc) => Ok(proc),
            other => Err(other.mismatch("proc")),
        }
    }

    pub fn to_cell(self) -> Cell {
        match self {
            Self::None => Cell::NULL,
            Self::Integer(value) => Cell::immediate(value, Tag::Integer),
            Self::Boolean(value) => {
                Cell::immediate(i64::from(value), Tag::Boolean)
            }
            Self::String(s) => Cell::object(0, s.addr(), Tag::String),
            Self::Block(b) => Cell::object(0, b.addr(), Tag::Block),
            Self::Word(w) => word_cell(w, Tag::Word),
            Self::GetWord(w) => word_cell(w, Tag::GetWord),
            Self::SetWord(w) => word_cell(w, Tag::SetWord),
            Self::Quote(w) => word_cell(w, Tag::Quote),
            Self::Dictionary(d) => Cell::object(0, d.addr(), Tag::Dictionary),
            Self::Path(p) => path_cell(p, Tag::Path),
            Self::GetPath(p) => path_cell(p, Tag::GetPath),
            Self::Native(index) => {
                Cell::immediate(i64::from(index.0), Tag::Native)
            }
            Self::Proc(proc) => {
                Cell::object(proc.stack_size, proc.first.addr(), Tag::Proc)
            }
        }
    }

    pub fn from_cell(cell: Cell) -> Result<Self> {
        let value = match cell.tag()? {
            Tag::None => Self::None,
            Tag::Integer => Self::Integer(cell.payload()),
            Tag::Boolean => Self::Boolean(cell.payload() != 0),
            Tag::String => Self::String(Handle::new(cell.ptr())),
            Tag::Block => Self::Block(Handle::new(cell.ptr())),
            Tag::Word => Self::Word(word_of(cell)),
            Tag::GetWord => Self::GetWord(word_of(cell)),
            Tag::SetWord => Self::SetWord(word_of(cell)),
            Tag::Quote => Self::Quote(word_of(cell)),
            Tag::Dictionary => Self::Dictionary(Handle::new(cell.ptr())),
            Tag::Path => Self::Path(path_of(cell)),
            Tag::GetPath => Self::GetPath(path_of(cell)),
            Tag::Native => {
                let index = u32::try_from(cell.payload())
                    .map_err(|_| VmError::InvalidTag(cell.tag_byte()))?;
                Self::Native(NativeIndex(index))
            }
            Tag::Proc => Self::Proc(Proc {
                stack_size: cell.val(),
                first: Handle::new(cell.ptr()),
            }),
            _ => return Err(VmError::InvalidTag(cell.tag_byte())),
        };
        Ok(value)
    }
}

fn word_cell(word: WordRef, tag: Tag) -> Cell {
    Cell::object(word.symbol.id(), word.binding.addr(), tag)
}

fn word_of(cell: Cell) -> WordRef {
    WordRef {
        symbol: Symbol::from_id(cell.val()),
        binding: Handle::new(cell.ptr()),
    }
}

fn path_cell(path: PathRef, tag: Tag) -> Cell {
    Cell::object(path.binding.addr(), path.first.addr(), tag)
}

fn path_of(cell: Cell) -> PathRef {
    PathRef {
        binding: Handle::new(cell.val()),
        first: Handle::new(cell.ptr()),
    }
}

/// Where a word's value lives
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Binding {
    /// dictionary slot, global or object scoped
    Map(SlotHandle),
    /// offset relative to the frame pointer
    Stack(i32),
}

impl Binding {
    pub fn to_cell(self) -> Cell {
        match self {
            Self::Map(slot) => {
                Cell::immediate(i64::from(slot.addr()), Tag::MapBinding)
            }
            Self::Stack(offset) => {
                Cell::immediate(i64::from(offset), Tag::StackBinding)
            }
        }
    }

    /// `None` for an unbound (zero) cell
    pub fn from_cell(cell: Cell) -> Result<Option<Self>> {
        if cell.is_null() {
            return Ok(None);
        }
        let tag = cell.tag()?;
        let binding = match tag {
            Tag::MapBinding => {
                let addr = u32::try_from(cell.payload())
                    .map_err(|_| VmError::InvalidTag(cell.tag_byte()))?;
                Self::Map(Handle::new(addr))
            }
            Tag::StackBinding => {
                let offset = i32::try_from(cell.payload())
                    .map_err(|_| VmError::InvalidTag(cell.tag_byte()))?;
                Self::Stack(offset)
            }
            _ => return Err(VmError::InvalidTag(cell.tag_byte())),
        };
        Ok(Some(binding))
    }
}

/// Block entry slot for `cell`: small immediates are embedded with the
/// low bit set, everything else needs its own cell.
pub(crate) fn embed(cell: Cell) -> Option<u32> {
    let embeddable = matches!(
        Tag::from_u8(cell.tag_byte()),
        Some(Tag::None | Tag::Integer | Tag::Boolean | Tag::Native)
    );
    if !embeddable {
        return None;
    }
    let raw = u32::try_from(cell.raw()).ok()?;
    if raw >= 1 << 31 {
        return None;
    }
    Some((raw << 1) | 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_integers_keep_their_sign() {
        let cell = Value::Integer(-42).to_cell();
        assert_eq!(cell.tag().unwrap(), Tag::Integer);
        assert_eq!(Value::from_cell(cell).unwrap(), Value::Integer(-42));
    }

    #[test]
    fn integer_range_is_56_bits() {
        assert!(Value::integer(MAX_INTEGER).is_ok());
        assert!(Value::integer(MIN_INTEGER).is_ok());
        assert_eq!(
            Value::integer(MAX_INTEGER + 1),
            Err(VmError::IntegerOverflow)
        );
    }

    #[test]
    fn object_layout_fields_do_not_overlap() {
        let cell = Cell::object(u32::MAX, MAX_ADDRESS, Tag::Proc);
        assert_eq!(cell.val(), u32::MAX);
        assert_eq!(cell.ptr(), MAX_ADDRESS);
        assert_eq!(cell.tag().unwrap(), Tag::Proc);
    }

    #[test]
    fn only_small_immediates_embed() {
        assert!(embed(Value::Integer(7).to_cell()).is_some());
        assert!(embed(Value::Boolean(true).to_cell()).is_some());
        assert!(embed(Value::Integer(-1).to_cell()).is_none());
        assert!(embed(Value::Integer(1 << 40).to_cell()).is_none());
        assert!(embed(Value::Block(Handle::new(3)).to_cell()).is_none());
    }

    #[test]
    fn bindings_distinguish_unbound() {
        assert_eq!(Binding::from_cell(Cell::NULL).unwrap(), None);
        let stack = Binding::Stack(-2);
        assert_eq!(Binding::from_cell(stack.to_cell()).unwrap(), Some(stack));
        let map = Binding::Map(Handle::new(99));
        assert_eq!(Binding::from_cell(map.to_cell()).unwrap(), Some(map));
    }

    #[test]
    fn structural_tags_are_not_values() {
        let header = Cell::object(1, 2, Tag::BlockHeader);
        assert_eq!(
            Value::from_cell(header),
            Err(VmError::InvalidTag(Tag::BlockHeader as u8))
        );
    }
}
