//! Tiny assembler used to build fixtures for tests, benches and the CLI.
//!
//! One instruction per line, operands as plain integers:
//!
//! ```text
//! ; comment
//! LOAD_CONST 0
//! POP_JUMP_IF_FALSE 70000   ; gets an EXTENDED_ARG prefix
//! RETURN_VALUE
//! ```
//!
//! Operands are not resolved: `LOAD_CONST 0` means constant index 0.

use crate::bytecode::opcode::{opcode_by_name, EXTENDED_ARG, HAVE_ARGUMENT};
use crate::{ByteWriter, DisError, DisResult};

/// Assembles `source` into a packed instruction buffer.
pub fn assemble(source: &str) -> DisResult<Vec<u8>> {
    let mut out = ByteWriter::new();

    for (idx, raw_line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split(';').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        let mut words = line.split_whitespace();
        let (Some(mnemonic), operand, None) = (words.next(), words.next(), words.next()) else {
            return Err(DisError::corrupted(format!("ligne {line_no}: trop d'opérandes: `{line}`")));
        };
        let opcode = opcode_by_name(&mnemonic.to_ascii_uppercase())
            .ok_or_else(|| DisError::corrupted(format!("ligne {line_no}: mnémonique inconnue `{mnemonic}`")))?;

        match (opcode >= HAVE_ARGUMENT, operand) {
            (false, None) => out.write_u8(opcode),
            (true, Some(text)) => {
                let arg = text
                    .parse::<u32>()
                    .map_err(|_| DisError::corrupted(format!("ligne {line_no}: opérande invalide `{text}`")))?;
                if arg > 0xFFFF {
                    out.write_u8(EXTENDED_ARG);
                    out.write_u16_le((arg >> 16) as u16);
                }
                out.write_u8(opcode);
                out.write_u16_le((arg & 0xFFFF) as u16);
            }
            (true, None) => {
                return Err(DisError::corrupted(format!("ligne {line_no}: `{mnemonic}` attend une opérande")));
            }
            (false, Some(_)) => {
                return Err(DisError::corrupted(format!("ligne {line_no}: `{mnemonic}` ne prend pas d'opérande")));
            }
        }
    }

    Ok(out.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_plain_and_operand_opcodes() {
        let code = assemble("LOAD_CONST 0\n; skip\n\n  pop_top  \nRETURN_VALUE ; done\n").unwrap();
        assert_eq!(code, vec![100, 0, 0, 1, 83]);
    }

    #[test]
    fn wide_operands_get_a_prefix() {
        assert_eq!(assemble("JUMP_ABSOLUTE 65540").unwrap(), vec![145, 1, 0, 113, 4, 0]);
    }

    #[test]
    fn rejects_bad_lines() {
        assert!(assemble("FROB").is_err());
        assert!(assemble("LOAD_CONST").is_err());
        assert!(assemble("RETURN_VALUE 1").is_err());
        assert!(assemble("LOAD_CONST 1 2").is_err());
        assert!(assemble("LOAD_CONST -1").is_err());
    }
}
