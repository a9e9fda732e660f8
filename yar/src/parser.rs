use crate::{
    BlockHandle, MAX_INTEGER, ParseError, ParseErrorKind, PathRef, Result,
    Value, Vm, WordRef,
};

/// Byte offset tokenizer over program text. Tokens are separated by
/// whitespace, `[`, `]` and `"` are tokens of their own.
#[derive(Debug, Clone)]
pub struct Parser<'a> {
    source: &'a str,
    offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedToken<'a> {
    Open,
    Close,
    Integer(i64),
    String(&'a str),
    Word(&'a str),
    GetWord(&'a str),
    SetWord(&'a str),
    Quote(&'a str),
    Path(Vec<&'a str>),
    GetPath(Vec<&'a str>),
}

impl<'a> Parser<'a> {
    #[inline]
    pub fn new(source: &'a str) -> Self {
        Self { source, offset: 0 }
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.offset >= self.source.len()
    }

    #[inline]
    fn current(&self) -> Option<u8> {
        self.source.as_bytes().get(self.offset).copied()
    }

    #[inline]
    fn is_delimiter(c: u8) -> bool {
        c.is_ascii_whitespace() || matches!(c, b'[' | b']' | b'"')
    }

    #[inline]
    pub fn skip_whitespace(&mut self) {
        while self.current().is_some_and(|c| c.is_ascii_whitespace()) {
            self.offset += 1;
        }
    }

    /// Next token with the byte offset it starts at
    pub fn next_token(
        &mut self,
    ) -> Result<Option<(usize, ParsedToken<'a>)>, ParseError> {
        self.skip_whitespace();
        let start = self.offset;
        let Some(c) = self.current() else {
            return Ok(None);
        };

        let token = match c {
            b'[' => {
                self.offset += 1;
                ParsedToken::Open
            }
            b']' => {
                self.offset += 1;
                ParsedToken::Close
            }
            b'"' => {
                self.offset += 1;
                while self.current().is_some_and(|c| c != b'"') {
                    self.offset += 1;
                }
                if self.is_done() {
                    return Err(ParseError {
                        offset: start,
                        kind: ParseErrorKind::UnterminatedString,
                    });
                }
                let text = &self.source[start + 1..self.offset];
                self.offset += 1;
                ParsedToken::String(text)
            }
            _ => {
                while self.current().is_some_and(|c| !Self::is_delimiter(c)) {
                    self.offset += 1;
                }
                let text = &self.source[start..self.offset];
                classify(text).map_err(|kind| ParseError {
                    offset: start,
                    kind,
                })?
            }
        };
        Ok(Some((start, token)))
    }
}

fn is_ident(text: &str) -> bool {
    !text.is_empty()
        && !text.starts_with(|c: char| c.is_ascii_digit())
        && !text.contains([':', '/', '\''])
}

fn segments(text: &str) -> Option<Vec<&str>> {
    let segments = text.split('/').collect::<Vec<_>>();
    segments.iter().all(|s| is_ident(s)).then_some(segments)
}

fn classify(text: &str) -> Result<ParsedToken<'_>, ParseErrorKind> {
    let invalid = || ParseErrorKind::InvalidToken(text.to_string());

    if text.starts_with(|c: char| c.is_ascii_digit()) {
        // no sign prefixes, `-` is an ordinary word character
        if !text.bytes().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        return match text.parse::<i64>() {
            Ok(value) if value <= MAX_INTEGER => {
                Ok(ParsedToken::Integer(value))
            }
            _ => Err(ParseErrorKind::IntegerOutOfRange(text.to_string())),
        };
    }

    if let Some(name) = text.strip_prefix('\'') {
        return is_ident(name)
            .then_some(ParsedToken::Quote(name))
            .ok_or_else(invalid);
    }

    if let Some(rest) = text.strip_prefix(':') {
        if is_ident(rest) {
            return Ok(ParsedToken::GetWord(rest));
        }
        return match rest.contains('/').then(|| segments(rest)).flatten() {
            Some(segments) => Ok(ParsedToken::GetPath(segments)),
            None => Err(invalid()),
        };
    }

    if let Some(name) = text.strip_suffix(':') {
        return is_ident(name)
            .then_some(ParsedToken::SetWord(name))
            .ok_or_else(invalid);
    }

    if is_ident(text) {
        return Ok(ParsedToken::Word(text));
    }
    match text.contains('/').then(|| segments(text)).flatten() {
        Some(segments) => Ok(ParsedToken::Path(segments)),
        None => Err(invalid()),
    }
}

impl Vm {
    /// Parses program text into a fresh, unbound block.
    pub fn parse(&mut self, source: &str) -> Result<BlockHandle> {
        let mut parser = Parser::new(source);
        let root = self.heap_mut()?.alloc_block()?;
        // open blocks with the offset of their `[`
        let mut open = vec![(0, root)];

        while let Some((offset, token)) = parser.next_token()? {
            let value = match token {
                ParsedToken::Open => {
                    let block = self.heap_mut()?.alloc_block()?;
                    open.push((offset, block));
                    continue;
                }
                ParsedToken::Close => {
                    if open.len() == 1 {
                        return Err(ParseError {
                            offset,
                            kind: ParseErrorKind::UnexpectedClose,
                        }
                        .into());
                    }
                    match open.pop() {
                        Some((_, block)) => Value::Block(block),
                        None => continue,
                    }
                }
                token => self.token_value(token)?,
            };
            let target = match open.last() {
                Some(&(_, block)) => block,
                None => root,
            };
            self.heap_mut()?.block_append(target, value)?;
        }

        if open.len() > 1 {
            let offset = open.last().map_or(0, |&(offset, _)| offset);
            return Err(ParseError {
                offset,
                kind: ParseErrorKind::UnterminatedBlock,
            }
            .into());
        }
        Ok(root)
    }

    fn token_value(&mut self, token: ParsedToken<'_>) -> Result<Value> {
        let value = match token {
            ParsedToken::Integer(value) => Value::Integer(value),
            ParsedToken::String(text) => {
                Value::String(self.heap_mut()?.alloc_string(text)?)
            }
            ParsedToken::Word(name) => Value::Word(self.new_word(name)?),
            ParsedToken::GetWord(name) => Value::GetWord(self.new_word(name)?),
            ParsedToken::SetWord(name) => Value::SetWord(self.new_word(name)?),
            ParsedToken::Quote(name) => Value::Quote(self.new_word(name)?),
            ParsedToken::Path(segments) => {
                Value::Path(self.new_path(&segments)?)
            }
            ParsedToken::GetPath(segments) => {
                Value::GetPath(self.new_path(&segments)?)
            }
            ParsedToken::Open | ParsedToken::Close => Value::None,
        };
        Ok(value)
    }

    fn new_word(&mut self, name: &str) -> Result<WordRef> {
        let symbol = self.intern(name)?;
        let binding = self.heap_mut()?.alloc_binding(None)?;
        Ok(WordRef { symbol, binding })
    }

    fn new_path(&mut self, segments: &[&str]) -> Result<PathRef> {
        let symbols = segments
            .iter()
            .map(|name| self.intern(name))
            .collect::<Result<Vec<_>>>()?;
        let heap = self.heap_mut()?;
        let binding = heap.alloc_binding(None)?;
        let first = heap.alloc_path(&symbols)?;
        Ok(PathRef { binding, first })
    }
}
