//! Operand resolution against the code unit's side tables.

use std::fmt;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::bytecode::code::{CodeUnit, Value};
use crate::bytecode::opcode::{OperandClass, CMP_OP};
use crate::{DisError, DisResult};

/// Side table an operand indexes into (used in error reports).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SideTable {
    /// Constant pool.
    Constants,
    /// Global / attribute names.
    Names,
    /// Local variable names.
    Locals,
    /// Cell variables followed by free variables.
    Cells,
    /// Comparison operators.
    Comparisons,
}

impl fmt::Display for SideTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SideTable::Constants => "constants",
            SideTable::Names => "names",
            SideTable::Locals => "varnames",
            SideTable::Cells => "cell/free names",
            SideTable::Comparisons => "comparison operators",
        })
    }
}

/// Borrowed view of the tables operands resolve against.
///
/// A missing table (`None`) leaves operands of that class unresolved: the
/// raw integer is reported instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct SideTables<'a> {
    /// Constant pool.
    pub consts: Option<&'a [Value]>,
    /// Name table.
    pub names: Option<&'a [String]>,
    /// Local variable names.
    pub varnames: Option<&'a [String]>,
    /// `(cellvars, freevars)`, indexed as their concatenation.
    pub cells: Option<(&'a [String], &'a [String])>,
}

impl<'a> SideTables<'a> {
    /// All tables of `unit`.
    pub fn of(unit: &'a CodeUnit) -> Self {
        Self {
            consts: Some(&unit.consts),
            names: Some(&unit.names),
            varnames: Some(&unit.varnames),
            cells: Some((&unit.cellvars, &unit.freevars)),
        }
    }

    fn cell(&self, index: usize) -> Option<Option<&'a String>> {
        self.cells.map(|(cellvars, freevars)| match index.checked_sub(cellvars.len()) {
            None => cellvars.get(index),
            Some(free) => freevars.get(free),
        })
    }

    fn cells_len(&self) -> usize { self.cells.map_or(0, |(c, f)| c.len() + f.len()) }
}

/// Resolved operand value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(rename_all = "snake_case"))]
pub enum OperandValue {
    /// Constant pool entry.
    Const(Value),
    /// Name from the name, local or cell/free tables.
    Name(String),
    /// Comparison operator.
    Compare(&'static str),
    /// Branch destination computed from a relative operand.
    Offset(usize),
    /// Raw integer operand.
    Int(u32),
}

impl fmt::Display for OperandValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperandValue::Const(v) => v.fmt(f),
            OperandValue::Name(s) => f.write_str(s),
            OperandValue::Compare(s) => f.write_str(s),
            OperandValue::Offset(n) => n.fmt(f),
            OperandValue::Int(n) => n.fmt(f),
        }
    }
}

fn lookup<T>(table: SideTable, entries: &[T], index: u32, offset: usize) -> DisResult<&T> {
    entries.get(index as usize).ok_or(DisError::OperandIndexOutOfRange {
        table,
        index,
        len: entries.len(),
        offset,
    })
}

fn named(name: &str) -> (Option<OperandValue>, String) {
    (Some(OperandValue::Name(name.to_owned())), name.to_owned())
}

fn raw(arg: u32) -> (Option<OperandValue>, String) {
    (Some(OperandValue::Int(arg)), arg.to_string())
}

/// Resolves `arg` for an instruction of `class` at `offset`.
///
/// `following` is the offset right after the instruction; relative branches
/// count from there. Returns `(resolved value, display text)`.
pub fn resolve_operand(
    class: OperandClass,
    arg: u32,
    tables: &SideTables<'_>,
    offset: usize,
    following: usize,
) -> DisResult<(Option<OperandValue>, String)> {
    let resolved = match class {
        OperandClass::None => (None, String::new()),
        OperandClass::ConstantRef => match tables.consts {
            Some(consts) => {
                let value = lookup(SideTable::Constants, consts, arg, offset)?;
                let text = value.as_str().map_or_else(|| value.repr(), str::to_owned);
                (Some(OperandValue::Const(value.clone())), text)
            }
            None => raw(arg),
        },
        OperandClass::NameRef => match tables.names {
            Some(names) => named(lookup(SideTable::Names, names, arg, offset)?),
            None => raw(arg),
        },
        OperandClass::LocalRef => match tables.varnames {
            Some(varnames) => named(lookup(SideTable::Locals, varnames, arg, offset)?),
            None => raw(arg),
        },
        OperandClass::FreeRef => match tables.cell(arg as usize) {
            Some(Some(name)) => named(name),
            Some(None) => {
                return Err(DisError::OperandIndexOutOfRange {
                    table: SideTable::Cells,
                    index: arg,
                    len: tables.cells_len(),
                    offset,
                })
            }
            None => raw(arg),
        },
        OperandClass::ComparisonOp => {
            let op = *lookup(SideTable::Comparisons, &CMP_OP, arg, offset)?;
            (Some(OperandValue::Compare(op)), op.to_owned())
        }
        OperandClass::RelativeJump => {
            let target = following + arg as usize;
            (Some(OperandValue::Offset(target)), format!("to {target}"))
        }
        OperandClass::AbsoluteJump | OperandClass::Generic | OperandClass::ExtendedArg => raw(arg),
    };
    Ok(resolved)
}
