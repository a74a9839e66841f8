//! Input resolution: turning what the caller has into a [`CodeUnit`].
//!
//! Inputs form a closed set ([`CodeSource`]) matched once at the boundary.
//! Source text needs a compiler, plugged in as a [`CompileFn`] hook; none is
//! bundled here.

use std::fmt::Write;
use std::sync::Arc;

use crate::bytecode::code::CodeUnit;
use crate::bytecode::disasm::{disassemble, disassemble_raw};
use crate::{DisError, DisResult};

/// Compilation mode requested from the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileMode {
    /// Single expression.
    Eval,
    /// Statement sequence.
    Exec,
}

/// Compiler hook: `(source, filename, mode) -> unit`.
pub type CompileFn = fn(source: &str, filename: &str, mode: CompileMode) -> DisResult<CodeUnit>;

/// Anything the disassembler can be pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeSource {
    /// A compiled unit.
    Compiled(Arc<CodeUnit>),
    /// A named callable wrapping a unit (function or method).
    Callable {
        /// Callable name.
        name: String,
        /// Wrapped body.
        code: Arc<CodeUnit>,
    },
    /// Bare instruction buffer without side tables.
    Raw(Vec<u8>),
    /// Source text, needs a compiler.
    Source(String),
    /// Named members (class or module body).
    Namespace(Vec<(String, CodeSource)>),
}

impl CodeSource {
    /// Short kind name used in error messages.
    pub const fn kind(&self) -> &'static str {
        match self {
            CodeSource::Compiled(_) => "code",
            CodeSource::Callable { .. } => "function",
            CodeSource::Raw(_) => "bytes",
            CodeSource::Source(_) => "str",
            CodeSource::Namespace(_) => "namespace",
        }
    }

    /// Members rendered by [`dis`] when listing a namespace.
    const fn has_code(&self) -> bool {
        matches!(self, CodeSource::Compiled(_) | CodeSource::Callable { .. } | CodeSource::Namespace(_))
    }
}

impl From<CodeUnit> for CodeSource {
    fn from(unit: CodeUnit) -> Self { CodeSource::Compiled(Arc::new(unit)) }
}

fn compile(source: &str, filename: &str, compiler: Option<CompileFn>) -> DisResult<CodeUnit> {
    let compiler = compiler.ok_or_else(|| DisError::unsupported("str"))?;
    match compiler(source, filename, CompileMode::Eval) {
        Err(DisError::Compile(_reason)) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(reason = %_reason, "not an expression, compiling as statements");
            compiler(source, filename, CompileMode::Exec)
        }
        other => other,
    }
}

/// The unit behind `source`.
///
/// Namespaces hold several units and never resolve to one.
pub fn resolve_code_unit(source: &CodeSource, compiler: Option<CompileFn>) -> DisResult<Arc<CodeUnit>> {
    match source {
        CodeSource::Compiled(code) | CodeSource::Callable { code, .. } => Ok(Arc::clone(code)),
        CodeSource::Raw(bytes) => Ok(Arc::new(CodeUnit::from_code(bytes.clone()))),
        CodeSource::Source(text) => compile(text, "<disassembly>", compiler).map(Arc::new),
        CodeSource::Namespace(_) => Err(DisError::unsupported(source.kind())),
    }
}

/// Listing for any input; namespaces list each member carrying code,
/// sorted by name, failures reported inline as `Sorry: ...`.
pub fn dis(source: &CodeSource, compiler: Option<CompileFn>) -> DisResult<String> {
    match source {
        CodeSource::Compiled(code) | CodeSource::Callable { code, .. } => disassemble(code, None),
        CodeSource::Raw(bytes) => disassemble_raw(bytes, None),
        CodeSource::Source(text) => disassemble(&compile(text, "<dis>", compiler)?, None),
        CodeSource::Namespace(members) => {
            let mut members: Vec<_> = members.iter().filter(|(_, m)| m.has_code()).collect();
            members.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = String::new();
            for (name, member) in members {
                let _ = writeln!(out, "Disassembly of {name}:");
                match dis(member, compiler) {
                    Ok(text) => out.push_str(&text),
                    Err(err) => {
                        let _ = writeln!(out, "Sorry: {err}");
                    }
                }
                out.push('\n');
            }
            Ok(out)
        }
    }
}

/// Frame of a captured traceback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    /// Unit executing in the frame.
    pub code: Arc<CodeUnit>,
    /// Offset of the last attempted instruction.
    pub lasti: usize,
}

/// Captured traceback, outermost frame first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Traceback {
    /// Frames, outermost first.
    pub frames: Vec<TraceFrame>,
}

impl Traceback {
    /// Innermost frame (where the error was raised).
    pub fn innermost(&self) -> Option<&TraceFrame> { self.frames.last() }
}

/// Listing of the innermost frame with `-->` at its last instruction.
pub fn disassemble_traceback(tb: Option<&Traceback>) -> DisResult<String> {
    let frame = tb.and_then(Traceback::innermost).ok_or(DisError::NoTraceback)?;
    disassemble(&frame.code, Some(frame.lasti))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::code::Value;

    fn ret_none() -> CodeUnit {
        CodeUnit { code: vec![100, 0, 0, 83], consts: vec![Value::None], ..CodeUnit::default() }
    }

    fn statements_only(source: &str, filename: &str, mode: CompileMode) -> DisResult<CodeUnit> {
        match mode {
            CompileMode::Eval => Err(DisError::Compile(format!("invalid syntax: {source}"))),
            CompileMode::Exec => Ok(CodeUnit { filename: filename.into(), ..ret_none() }),
        }
    }

    #[test]
    fn compiled_and_callable_share_the_unit() {
        let unit = Arc::new(ret_none());
        let callable = CodeSource::Callable { name: "f".into(), code: Arc::clone(&unit) };
        assert!(Arc::ptr_eq(&resolve_code_unit(&callable, None).unwrap(), &unit));
    }

    #[test]
    fn source_falls_back_to_statements() {
        let unit = resolve_code_unit(&CodeSource::Source("x = 1".into()), Some(statements_only)).unwrap();
        assert_eq!(unit.filename, "<disassembly>");
    }

    #[test]
    fn unsupported_inputs() {
        assert_eq!(
            resolve_code_unit(&CodeSource::Source("1".into()), None),
            Err(DisError::unsupported("str"))
        );
        let err = resolve_code_unit(&CodeSource::Namespace(vec![]), None).unwrap_err();
        assert_eq!(err.to_string(), "don't know how to disassemble namespace objects");
    }

    #[test]
    fn namespace_listing_is_sorted_and_reports_failures() {
        let ns = CodeSource::Namespace(vec![
            ("zeta".into(), ret_none().into()),
            ("data".into(), CodeSource::Raw(vec![83])),
            ("alpha".into(), CodeSource::Compiled(Arc::new(CodeUnit::from_code([6])))),
        ]);
        let text = dis(&ns, None).unwrap();
        assert_eq!(
            text,
            "Disassembly of alpha:\n\
             Sorry: unknown opcode 6 at offset 0\n\
             \n\
             Disassembly of zeta:\n\
             \x20 1           0 LOAD_CONST               0 (None)\n\
             \x20             3 RETURN_VALUE\n\
             \n"
        );
    }

    #[test]
    fn traceback_marks_last_instruction() {
        assert_eq!(disassemble_traceback(None), Err(DisError::NoTraceback));
        assert_eq!(disassemble_traceback(Some(&Traceback::default())), Err(DisError::NoTraceback));
        let tb = Traceback { frames: vec![TraceFrame { code: Arc::new(ret_none()), lasti: 3 }] };
        let text = disassemble_traceback(Some(&tb)).unwrap();
        assert!(text.lines().nth(1).unwrap().starts_with("    -->       3 RETURN_VALUE"));
    }
}
