//! Textual presentation of decoded instructions and unit metadata.
//!
//! Pure functions over [`Instruction`] / [`CodeUnit`]; nothing here touches
//! the packed format directly.

use std::fmt::Write;

use crate::bytecode::code::{CodeFlags, CodeUnit};
use crate::bytecode::decode::{decode_bytes, decode_instructions, Instruction};
use crate::bytecode::operand::SideTables;
use crate::DisResult;

/// Formats one listing row.
///
/// `lineno_width == 0` omits the line number column; `mark_as_current`
/// inserts the `-->` arrow.
pub fn format_instruction(instr: &Instruction, lineno_width: usize, mark_as_current: bool) -> String {
    let mut fields: Vec<String> = Vec::with_capacity(7);
    if lineno_width > 0 {
        fields.push(match instr.starts_line {
            Some(line) => format!("{line:>lineno_width$}"),
            None => " ".repeat(lineno_width),
        });
    }
    fields.push(if mark_as_current { "-->" } else { "   " }.to_owned());
    fields.push(if instr.is_jump_target { ">>" } else { "  " }.to_owned());
    fields.push(format!("{:>4}", instr.offset));
    fields.push(format!("{:<20}", instr.opname));
    if let Some(arg) = instr.arg {
        fields.push(format!("{arg:>5}"));
        if !instr.argrepr.is_empty() {
            fields.push(format!("({})", instr.argrepr));
        }
    }
    let mut row = fields.join(" ");
    row.truncate(row.trim_end().len());
    row
}

pub(crate) fn write_listing<I>(out: &mut String, instrs: I, lineno_width: usize, lasti: Option<usize>) -> DisResult<()>
where
    I: IntoIterator<Item = DisResult<Instruction>>,
{
    for instr in instrs {
        let instr = instr?;
        if lineno_width > 0 && instr.starts_line.is_some() && instr.offset > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "{}", format_instruction(&instr, lineno_width, lasti == Some(instr.offset)));
    }
    Ok(())
}

/// Full listing of `unit`, `-->` at `lasti`.
pub fn disassemble(unit: &CodeUnit, lasti: Option<usize>) -> DisResult<String> {
    let mut out = String::new();
    write_listing(&mut out, decode_instructions(unit), 3, lasti)?;
    Ok(out)
}

/// Listing of a bare buffer: no side tables, no line column.
pub fn disassemble_raw(code: &[u8], lasti: Option<usize>) -> DisResult<String> {
    let mut out = String::new();
    write_listing(&mut out, decode_bytes(code, SideTables::default(), None), 0, lasti)?;
    Ok(out)
}

/// Flag names joined by `, `; unknown bits in hex, `0x0` when empty.
pub fn pretty_flags(flags: u32) -> String {
    if flags == 0 {
        return "0x0".into();
    }
    (0..32)
        .map(|shift| 1u32 << shift)
        .filter(|bit| flags & bit != 0)
        .map(|bit| CodeFlags::bit_name(bit).map_or_else(|| format!("{bit:#x}"), str::to_owned))
        .collect::<Vec<_>>()
        .join(", ")
}

fn push_table<T: std::fmt::Display>(lines: &mut Vec<String>, title: &str, entries: impl IntoIterator<Item = T>) {
    let rows: Vec<String> = entries.into_iter().enumerate().map(|(i, e)| format!("{i:>4}: {e}")).collect();
    if !rows.is_empty() {
        lines.push(title.to_owned());
        lines.extend(rows);
    }
}

/// Multi-line metadata summary (name, counts, flags, tables).
pub fn code_info(unit: &CodeUnit) -> String {
    let mut lines = vec![
        format!("Name:              {}", unit.name),
        format!("Filename:          {}", unit.filename),
        format!("Argument count:    {}", unit.argcount),
        format!("Number of locals:  {}", unit.nlocals),
        format!("Stack size:        {}", unit.stacksize),
        format!("Flags:             {}", pretty_flags(unit.flags)),
    ];
    push_table(&mut lines, "Constants:", unit.consts.iter().map(|c| c.repr()));
    push_table(&mut lines, "Names:", &unit.names);
    push_table(&mut lines, "Variable names:", &unit.varnames);
    push_table(&mut lines, "Free variables:", &unit.freevars);
    push_table(&mut lines, "Cell variables:", &unit.cellvars);
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::code::Value;
    use crate::bytecode::operand::OperandValue;
    use pretty_assertions::assert_eq;

    fn instr() -> Instruction {
        Instruction {
            opname: "LOAD_CONST",
            opcode: 100,
            arg: Some(0),
            argval: Some(OperandValue::Const(Value::None)),
            argrepr: "None".into(),
            offset: 12,
            starts_line: Some(7),
            is_jump_target: true,
        }
    }

    #[test]
    fn row_columns() {
        assert_eq!(
            format_instruction(&instr(), 3, false),
            "  7     >>   12 LOAD_CONST               0 (None)"
        );
        assert_eq!(
            format_instruction(&instr(), 0, true),
            "--> >>   12 LOAD_CONST               0 (None)"
        );
    }

    #[test]
    fn row_without_operand_is_trimmed() {
        let i = Instruction {
            opname: "RETURN_VALUE",
            opcode: 83,
            arg: None,
            argval: None,
            argrepr: String::new(),
            starts_line: None,
            is_jump_target: false,
            ..instr()
        };
        assert_eq!(format_instruction(&i, 3, false), "             12 RETURN_VALUE");
    }

    #[test]
    fn flags_rendering() {
        assert_eq!(pretty_flags(0), "0x0");
        assert_eq!(pretty_flags(0x43), "OPTIMIZED, NEWLOCALS, NOFREE");
        assert_eq!(pretty_flags(0x21 | 0x100), "OPTIMIZED, GENERATOR, 0x100");
    }

    #[test]
    fn info_lists_only_populated_tables() {
        let unit = CodeUnit {
            name: "f".into(),
            filename: "m.py".into(),
            argcount: 1,
            nlocals: 1,
            stacksize: 2,
            flags: 0x43,
            consts: vec![Value::None, Value::from("hi")],
            varnames: vec!["x".into()],
            ..CodeUnit::default()
        };
        assert_eq!(
            code_info(&unit),
            "Name:              f\n\
             Filename:          m.py\n\
             Argument count:    1\n\
             Number of locals:  1\n\
             Stack size:        2\n\
             Flags:             OPTIMIZED, NEWLOCALS, NOFREE\n\
             Constants:\n\
             \x20  0: None\n\
             \x20  1: 'hi'\n\
             Variable names:\n\
             \x20  0: x"
        );
    }

    #[test]
    fn listing_separates_source_lines() {
        // line 1: LOAD_CONST None ; line 2: RETURN_VALUE
        let unit = CodeUnit { code: vec![100, 0, 0, 83], consts: vec![Value::None], lnotab: vec![(3, 1)], ..CodeUnit::default() };
        let text = disassemble(&unit, Some(3)).unwrap();
        assert_eq!(
            text,
            "  1           0 LOAD_CONST               0 (None)\n\
             \n\
             \x20 2 -->       3 RETURN_VALUE\n"
        );
    }

    #[test]
    fn raw_listing_has_no_line_column() {
        assert_eq!(disassemble_raw(&[113, 0, 0], None).unwrap(), "    >>    0 JUMP_ABSOLUTE            0 (0)\n");
    }
}
