use thiserror::Error;

pub type Result<T, E = VmError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    UnterminatedBlock,
    UnterminatedString,
    UnexpectedClose,
    InvalidToken(String),
    IntegerOutOfRange(String),
}

/// Malformed source text, `offset` is a byte offset into the source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at byte {offset}: {kind}")]
pub struct ParseError {
    pub offset: usize,
    pub kind: ParseErrorKind,
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnterminatedBlock => f.write_str("unterminated block"),
            Self::UnterminatedString => f.write_str("unterminated string"),
            Self::UnexpectedClose => f.write_str("unexpected `]`"),
            Self::InvalidToken(token) => write!(f, "invalid token `{token}`"),
            Self::IntegerOutOfRange(token) => {
                write!(f, "integer `{token}` out of range")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("unbound symbol `{0}`")]
    UnboundSymbol(String),
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("write against a frozen vm")]
    ReadOnlyViolation,
    #[error("arena exhausted ({capacity} cells)")]
    ArenaExhausted { capacity: usize },
    #[error("unknown native function `{0}`")]
    UnknownNativeFunction(String),
    #[error("stack overflow")]
    StackOverflow,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("unexpected end of block")]
    MissingArgument,
    #[error("invalid address {0:#x}")]
    InvalidAddress(u32),
    #[error("invalid cell tag {0:#04x}")]
    InvalidTag(u8),
    #[error("write to null address")]
    NullWrite,
    #[error("vm must be frozen before forking")]
    NotFrozen,
    #[error("symbol table full")]
    SymbolTableFull,
    #[error("call depth exceeded")]
    CallDepthExceeded,
    #[error("nesting too deep")]
    NestingTooDeep,
    #[error("linked entries loop back at {0:#x}")]
    CyclicChain(u32),
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid snapshot magic")]
    BadMagic,
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
    #[error("corrupt snapshot: {0}")]
    Corrupt(&'static str),
    #[error("unknown native function `{0}`")]
    UnknownNativeFunction(String),
    #[error(transparent)]
    Vm(#[from] VmError),
}
