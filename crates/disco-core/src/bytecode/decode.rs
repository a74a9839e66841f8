//! Primary decoding pass: packed buffer → [`Instruction`] records.
//!
//! [`Instructions`] is a lazy, finite iterator. Every call to
//! [`decode_instructions`] builds a fresh one; nothing is shared between two
//! decodes of the same unit.

use std::borrow::Cow;
use std::iter::FusedIterator;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::bytecode::code::CodeUnit;
use crate::bytecode::disasm::{code_info, write_listing};
use crate::bytecode::labels::{collect_targets, JumpTargets};
use crate::bytecode::lines::{decode_line_table, LineMap};
use crate::bytecode::opcode::instruction_size;
use crate::bytecode::operand::{resolve_operand, OperandValue, SideTables};
use crate::bytecode::scan::{Scan, Scanned};
use crate::DisResult;

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Instruction {
    /// Mnemonic.
    pub opname: &'static str,
    /// Numeric opcode.
    pub opcode: u8,
    /// Combined operand, present iff the opcode carries one.
    pub arg: Option<u32>,
    /// Resolved operand (the raw operand when no side table applies).
    pub argval: Option<OperandValue>,
    /// Human readable operand text (may be empty).
    pub argrepr: String,
    /// Offset of the opcode byte.
    pub offset: usize,
    /// Source line started at this offset, if any.
    pub starts_line: Option<u32>,
    /// Some branch lands here.
    pub is_jump_target: bool,
}

impl Instruction {
    /// Encoded size in bytes (1 or 3).
    pub const fn size(&self) -> usize { instruction_size(self.opcode) }

    /// Offset of the next instruction.
    pub const fn next_offset(&self) -> usize { self.offset + self.size() }
}

/// Lazy decode over one buffer.
///
/// Yields `Err` once, at the failing instruction, then stops.
#[derive(Debug, Clone)]
pub struct Instructions<'a> {
    scan: Scan<'a>,
    tables: SideTables<'a>,
    lines: Cow<'a, LineMap>,
    targets: JumpTargets,
    line_offset: i32,
    emitted: usize,
    done: bool,
}

impl<'a> Instructions<'a> {
    fn new(code: &'a [u8], tables: SideTables<'a>, lines: Cow<'a, LineMap>, line_offset: i32) -> Self {
        // A malformed buffer fails the pre-pass at the same instruction the
        // main scan will fail on, so its error is reported by the scan.
        let (targets, _) = collect_targets(code);
        #[cfg(feature = "tracing")]
        tracing::debug!(len = code.len(), targets = targets.len(), lines = lines.len(), "decode start");
        Self { scan: Scan::new(code), tables, lines, targets, line_offset, emitted: 0, done: false }
    }

    /// Jump targets found by the pre-pass (up to the first structural error).
    pub fn jump_targets(&self) -> &JumpTargets { &self.targets }

    fn build(&self, s: Scanned) -> DisResult<Instruction> {
        let (argval, argrepr) = match s.arg {
            Some(arg) => resolve_operand(s.info.class, arg, &self.tables, s.offset, s.next_offset())?,
            None => (None, String::new()),
        };
        Ok(Instruction {
            opname: s.info.name,
            opcode: s.info.opcode,
            arg: s.arg,
            argval,
            argrepr,
            offset: s.offset,
            starts_line: self.lines.get(&s.offset).map(|&l| l.saturating_add_signed(self.line_offset)),
            is_jump_target: self.targets.contains(&s.offset),
        })
    }
}

impl Iterator for Instructions<'_> {
    type Item = DisResult<Instruction>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let Some(scanned) = self.scan.next() else {
            self.done = true;
            #[cfg(feature = "tracing")]
            tracing::debug!(instructions = self.emitted, "decode finished");
            return None;
        };
        let item = scanned.and_then(|s| self.build(s));
        match &item {
            Ok(_) => self.emitted += 1,
            Err(_err) => {
                self.done = true;
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_err, after = self.emitted, "decode aborted");
            }
        }
        Some(item)
    }
}

impl FusedIterator for Instructions<'_> {}

/// Decodes `unit` against all of its side tables.
pub fn decode_instructions(unit: &CodeUnit) -> Instructions<'_> { decode_instructions_with(unit, 0) }

/// Like [`decode_instructions`], shifting every reported line by `line_offset`.
pub fn decode_instructions_with(unit: &CodeUnit, line_offset: i32) -> Instructions<'_> {
    let lines = decode_line_table(unit.firstlineno, &unit.lnotab);
    Instructions::new(&unit.code, SideTables::of(unit), Cow::Owned(lines), line_offset)
}

/// Decodes a bare buffer. Missing tables leave operands raw; without a line
/// map no instruction starts a line.
pub fn decode_bytes<'a>(code: &'a [u8], tables: SideTables<'a>, lines: Option<&'a LineMap>) -> Instructions<'a> {
    let lines = lines.map_or_else(|| Cow::Owned(LineMap::new()), Cow::Borrowed);
    Instructions::new(code, tables, lines, 0)
}

/// Reusable view over a unit: line map computed once, fresh decode per
/// [`Bytecode::iter`].
#[derive(Debug, Clone)]
pub struct Bytecode {
    unit: Arc<CodeUnit>,
    lines: LineMap,
    line_offset: i32,
    lineno_width: usize,
    current: Option<usize>,
}

impl Bytecode {
    /// Builds the view.
    pub fn new(unit: impl Into<Arc<CodeUnit>>) -> Self {
        let unit = unit.into();
        let lines = decode_line_table(unit.firstlineno, &unit.lnotab);
        Self { unit, lines, line_offset: 0, lineno_width: 3, current: None }
    }

    /// Shifts reported lines by `line_offset`.
    #[must_use]
    pub fn with_line_offset(mut self, line_offset: i32) -> Self {
        self.line_offset = line_offset;
        self
    }

    /// Width of the line number column in [`Bytecode::display_code`]; 0 hides it.
    #[must_use]
    pub fn with_lineno_width(mut self, width: usize) -> Self {
        self.lineno_width = width;
        self
    }

    /// Marks the instruction at `offset` as current in [`Bytecode::display_code`].
    #[must_use]
    pub fn with_current_offset(mut self, offset: usize) -> Self {
        self.current = Some(offset);
        self
    }

    /// Underlying unit.
    pub fn unit(&self) -> &CodeUnit { &self.unit }

    /// Materialized line starts.
    pub fn line_starts(&self) -> &LineMap { &self.lines }

    /// Fresh decode.
    pub fn iter(&self) -> Instructions<'_> {
        Instructions::new(&self.unit.code, SideTables::of(&self.unit), Cow::Borrowed(&self.lines), self.line_offset)
    }

    /// Metadata summary, see [`code_info`].
    pub fn info(&self) -> String { code_info(&self.unit) }

    /// Full listing.
    pub fn display_code(&self) -> DisResult<String> {
        let mut out = String::new();
        write_listing(&mut out, self.iter(), self.lineno_width, self.current)?;
        Ok(out)
    }
}

impl<'a> IntoIterator for &'a Bytecode {
    type Item = DisResult<Instruction>;
    type IntoIter = Instructions<'a>;

    fn into_iter(self) -> Self::IntoIter { self.iter() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::code::Value;
    use crate::DisError;
    use pretty_assertions::assert_eq;

    fn unit(code: Vec<u8>) -> CodeUnit {
        CodeUnit {
            code,
            consts: vec![Value::None, Value::from("hello")],
            names: vec!["print".into()],
            varnames: vec!["x".into()],
            lnotab: vec![(3, 1)],
            ..CodeUnit::default()
        }
    }

    #[test]
    fn records_carry_lines_targets_and_operands() {
        // 0 LOAD_FAST x ; 3 POP_JUMP_IF_FALSE 9 ; 6 LOAD_CONST 'hello' ; 9 RETURN_VALUE
        let u = unit(vec![124, 0, 0, 114, 9, 0, 100, 1, 0, 83]);
        let instrs: Vec<_> = decode_instructions(&u).collect::<DisResult<_>>().unwrap();
        assert_eq!(instrs.len(), 4);
        assert_eq!(instrs[0].starts_line, Some(1));
        assert_eq!(instrs[1].starts_line, Some(2));
        assert_eq!(instrs[1].argrepr, "9");
        assert_eq!(instrs[2].argval, Some(OperandValue::Const(Value::from("hello"))));
        assert_eq!(instrs[2].argrepr, "hello");
        assert!(instrs[3].is_jump_target);
        assert_eq!(instrs[3].arg, None);
        assert_eq!(instrs[3].argval, None);
        assert_eq!(instrs[3].next_offset(), u.code.len());
    }

    #[test]
    fn line_offset_shifts_starts() {
        let u = unit(vec![9, 83]);
        let lines: Vec<_> = decode_instructions_with(&u, 10).map(|i| i.unwrap().starts_line).collect();
        assert_eq!(lines, vec![Some(11), None]);
        let lines: Vec<_> = decode_instructions_with(&u, -5).map(|i| i.unwrap().starts_line).collect();
        assert_eq!(lines, vec![Some(0), None]);
    }

    #[test]
    fn error_arrives_after_good_prefix_then_stops() {
        let u = unit(vec![9, 100, 7, 0, 83]);
        let mut it = decode_instructions(&u);
        assert_eq!(it.next().map(|r| r.map(|i| i.opname)), Some(Ok("NOP")));
        assert_eq!(
            it.next(),
            Some(Err(DisError::OperandIndexOutOfRange {
                table: crate::SideTable::Constants,
                index: 7,
                len: 2,
                offset: 1
            }))
        );
        assert_eq!(it.next(), None);
    }

    #[test]
    fn raw_buffers_decode_without_tables() {
        let code = [100, 5, 0, 116, 2, 0];
        let instrs: Vec<_> = decode_bytes(&code, SideTables::default(), None).collect::<DisResult<_>>().unwrap();
        assert_eq!(instrs[0].argval, Some(OperandValue::Int(5)));
        assert_eq!(instrs[1].argrepr, "2");
        assert!(instrs.iter().all(|i| i.starts_line.is_none()));
    }

    #[test]
    fn bytecode_view_restarts() {
        let view = Bytecode::new(unit(vec![124, 0, 0, 83]));
        let first: Vec<_> = view.iter().collect();
        let second: Vec<_> = (&view).into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(view.line_starts().len(), 2);
    }
}
