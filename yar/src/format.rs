use std::fmt::Write;

use crate::{Result, Symbol, Value, Vm};

/// Nesting limit for rendering, blocks may contain themselves
const DEFAULT_MAX_DEPTH: usize = 16;

impl Vm {
    /// Source like rendering: strings are quoted, blocks bracketed.
    pub fn to_string(&self, value: Value) -> Result<String> {
        let mut out = String::new();
        self.mold_into(&mut out, value, 0, DEFAULT_MAX_DEPTH)?;
        Ok(out)
    }

    /// Rendering for `print`: strings as their text, the top level block
    /// without brackets.
    pub fn form(&self, value: Value) -> Result<String> {
        match value {
            Value::String(string) => self.heap().read_string(string),
            Value::Block(block) => {
                let mut out = String::new();
                for (i, item) in self.heap().block_iter(block)?.enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    self.mold_into(&mut out, item?, 1, DEFAULT_MAX_DEPTH)?;
                }
                Ok(out)
            }
            other => self.to_string(other),
        }
    }

    fn symbol_name(&self, symbol: Symbol) -> String {
        self.symbols().display(symbol)
    }

    fn mold_into(
        &self,
        out: &mut String,
        value: Value,
        depth: usize,
        max_depth: usize,
    ) -> Result<()> {
        // writing into a String cannot fail
        let _ = match value {
            Value::None => write!(out, "none"),
            Value::Integer(n) => write!(out, "{n}"),
            Value::Boolean(b) => write!(out, "{b}"),
            Value::String(string) => {
                write!(out, "\"{}\"", self.heap().read_string(string)?)
            }
            Value::Block(block) => {
                if depth >= max_depth {
                    out.push_str("[...]");
                    return Ok(());
                }
                out.push('[');
                for (i, item) in self.heap().block_iter(block)?.enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    self.mold_into(out, item?, depth + 1, max_depth)?;
                }
                out.push(']');
                Ok(())
            }
            Value::Word(word)
            | Value::GetWord(word)
            | Value::SetWord(word)
            | Value::Quote(word) => {
                let name = self.symbol_name(word.symbol);
                match value {
                    Value::GetWord(_) => write!(out, ":{name}"),
                    Value::SetWord(_) => write!(out, "{name}:"),
                    Value::Quote(_) => write!(out, "'{name}"),
                    _ => write!(out, "{name}"),
                }
            }
            Value::Dictionary(dict) => {
                if depth >= max_depth {
                    out.push_str("#[...]");
                    return Ok(());
                }
                out.push_str("#[");
                for (i, slot) in self.heap().dict_iter(dict)?.enumerate() {
                    let (symbol, slot) = slot?;
                    if i > 0 {
                        out.push(' ');
                    }
                    let _ = write!(out, "{}: ", self.symbol_name(symbol));
                    let field = self.heap().slot_value(slot)?;
                    self.mold_into(out, field, depth + 1, max_depth)?;
                }
                out.push(']');
                Ok(())
            }
            Value::Path(path) | Value::GetPath(path) => {
                if matches!(value, Value::GetPath(_)) {
                    out.push(':');
                }
                let segments = self.heap().path_segments(path.first)?;
                let names = segments
                    .into_iter()
                    .map(|symbol| self.symbol_name(symbol))
                    .collect::<Vec<_>>();
                write!(out, "{}", names.join("/"))
            }
            Value::Native(index) => match self.native_name(index) {
                Some(name) => write!(out, "<native {name}>"),
                None => write!(out, "<native #{}>", index.0),
            },
            Value::Proc(proc) => write!(out, "<proc {}>", proc.stack_size),
        };
        Ok(())
    }
}
