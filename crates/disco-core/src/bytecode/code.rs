//! Code unit model: the instruction buffer plus its side tables.

use std::fmt::{self, Write as _};
use std::hash::{Hash, Hasher};
use std::mem;
use std::sync::Arc;

use bitflags::bitflags;

#[cfg(feature = "serde")]
use serde::Serialize;

bitflags! {
    /// Compiler flags recorded on a code unit (`co_flags`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CodeFlags: u32 {
        /// Locals are stored in fast slots.
        const OPTIMIZED   = 0x0001;
        /// A new locals dict is created for each frame.
        const NEWLOCALS   = 0x0002;
        /// Accepts `*args`.
        const VARARGS     = 0x0004;
        /// Accepts `**kwargs`.
        const VARKEYWORDS = 0x0008;
        /// Nested scope.
        const NESTED      = 0x0010;
        /// Generator body.
        const GENERATOR   = 0x0020;
        /// No free or cell variables.
        const NOFREE      = 0x0040;
    }
}

impl CodeFlags {
    /// Display name of a single flag bit, if known.
    pub fn bit_name(bit: u32) -> Option<&'static str> {
        Self::from_bits(bit)
            .filter(|f| f.bits().count_ones() == 1)
            .and_then(|f| f.iter_names().next().map(|(name, _)| name))
    }
}

/// Values that can live in the constant pool.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Value {
    /// `None` literal.
    None,
    /// Boolean literal.
    Bool(bool),
    /// Machine-sized integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Text string.
    Str(String),
    /// Raw byte string.
    Bytes(Vec<u8>),
    /// Tuple of constants.
    Tuple(Vec<Value>),
    /// `...`
    Ellipsis,
    /// Nested code unit; surfaced as an opaque value, never expanded.
    Code(Arc<CodeUnit>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) | (Value::Ellipsis, Value::Ellipsis) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Code(a), Value::Code(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Value::None | Value::Ellipsis => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Bytes(bytes) => bytes.hash(state),
            Value::Tuple(items) => items.hash(state),
            Value::Code(code) => {
                code.name.hash(state);
                code.code.hash(state);
            }
        }
    }
}

impl Value {
    /// Text content, if this is a text string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Generic textual representation (`repr`).
    pub fn repr(&self) -> String {
        let mut out = String::new();
        let _ = self.write_repr(&mut out);
        out
    }

    fn write_repr(&self, out: &mut String) -> fmt::Result {
        match self {
            Value::None => out.write_str("None"),
            Value::Bool(true) => out.write_str("True"),
            Value::Bool(false) => out.write_str("False"),
            Value::Int(i) => write!(out, "{i}"),
            Value::Float(x) => write_float(out, *x),
            Value::Str(s) => write_quoted(out, s.chars(), ""),
            Value::Bytes(b) => write_quoted(out, b.iter().map(|&c| char::from(c)), "b"),
            Value::Ellipsis => out.write_str("Ellipsis"),
            Value::Tuple(items) => {
                out.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_repr(out)?;
                }
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
                Ok(())
            }
            Value::Code(code) => write!(
                out,
                "<code object {}, file \"{}\", line {}>",
                code.name, code.filename, code.firstlineno
            ),
        }
    }
}

fn write_float(out: &mut String, x: f64) -> fmt::Result {
    if x.is_nan() {
        out.write_str("nan")
    } else if x.is_infinite() {
        out.write_str(if x > 0.0 { "inf" } else { "-inf" })
    } else {
        write!(out, "{x:?}")
    }
}

/// Quoted literal; a `b` prefix means every char is a byte and non-ASCII is escaped.
fn write_quoted(out: &mut String, chars: impl Iterator<Item = char> + Clone, prefix: &str) -> fmt::Result {
    let bytes = prefix == "b";
    let quote = if chars.clone().any(|c| c == '\'') && !chars.clone().any(|c| c == '"') { '"' } else { '\'' };
    out.push_str(prefix);
    out.push(quote);
    for c in chars {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_ascii_control() || (bytes && !c.is_ascii()) => write!(out, "\\x{:02x}", c as u32)?,
            c => out.push(c),
        }
    }
    out.push(quote);
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            other => f.write_str(&other.repr()),
        }
    }
}

impl From<&str> for Value { fn from(v: &str) -> Self { Value::Str(v.to_owned()) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::Str(v) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::Float(v) } }
impl From<CodeUnit> for Value { fn from(v: CodeUnit) -> Self { Value::Code(Arc::new(v)) } }

/// Compiled block: instruction buffer and side tables.
///
/// Built once by whoever extracts it, then only read. Share it behind an
/// `Arc` to decode from several places at once.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CodeUnit {
    /// Unit name (`co_name`).
    pub name: String,
    /// Source file name (`co_filename`).
    pub filename: String,
    /// Positional argument count.
    pub argcount: u32,
    /// Number of local slots.
    pub nlocals: u32,
    /// Maximum evaluation stack depth.
    pub stacksize: u32,
    /// Raw flag bits, see [`CodeFlags`].
    pub flags: u32,
    /// Packed instruction stream.
    pub code: Vec<u8>,
    /// Constant pool.
    pub consts: Vec<Value>,
    /// Global / attribute names.
    pub names: Vec<String>,
    /// Local variable names.
    pub varnames: Vec<String>,
    /// Cell variable names.
    pub cellvars: Vec<String>,
    /// Free variable names.
    pub freevars: Vec<String>,
    /// Line of the first source line of the block.
    pub firstlineno: u32,
    /// Compressed `(byte delta, line delta)` table.
    pub lnotab: Vec<(u8, u8)>,
}

impl Default for CodeUnit {
    fn default() -> Self {
        Self {
            name: "<module>".into(),
            filename: "<disassembly>".into(),
            argcount: 0,
            nlocals: 0,
            stacksize: 0,
            flags: 0,
            code: Vec::new(),
            consts: Vec::new(),
            names: Vec::new(),
            varnames: Vec::new(),
            cellvars: Vec::new(),
            freevars: Vec::new(),
            firstlineno: 1,
            lnotab: Vec::new(),
        }
    }
}

impl CodeUnit {
    /// Unit wrapping a bare instruction buffer, without side tables.
    pub fn from_code(code: impl Into<Vec<u8>>) -> Self {
        Self { code: code.into(), ..Self::default() }
    }

    /// Flags as a typed set (unknown bits retained).
    pub fn code_flags(&self) -> CodeFlags { CodeFlags::from_bits_retain(self.flags) }

    /// Rebuilds a compressed line table from a flat byte string (`co_lnotab`).
    ///
    /// A trailing odd byte carries no pair and is ignored.
    pub fn lnotab_from_bytes(bytes: &[u8]) -> Vec<(u8, u8)> {
        bytes.chunks_exact(2).map(|p| (p[0], p[1])).collect()
    }

    /// Flat byte string form of the line table.
    pub fn lnotab_bytes(&self) -> Vec<u8> {
        self.lnotab.iter().flat_map(|&(b, l)| [b, l]).collect()
    }
}
