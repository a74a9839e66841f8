//! Validation and lookup helpers used by tooling and bytecode assertions.

use std::collections::BTreeSet;

use crate::bytecode::code::CodeUnit;
use crate::bytecode::decode::{decode_instructions, Instruction};
use crate::bytecode::labels::find_jump_targets;
use crate::bytecode::operand::OperandValue;
use crate::{DisError, DisResult};

/// Structural validation of a unit.
///
/// Decodes the whole buffer, then checks that instructions tile it and that
/// every branch lands on an instruction start.
pub fn validate_unit(unit: &CodeUnit) -> DisResult<()> {
    let mut starts = BTreeSet::new();
    let mut expected = 0;
    for instr in decode_instructions(unit) {
        let instr = instr?;
        if instr.offset != expected {
            return Err(DisError::corrupted(format!(
                "instruction at {} does not follow the one ending at {expected}",
                instr.offset
            )));
        }
        starts.insert(instr.offset);
        expected = instr.next_offset();
    }
    if expected != unit.code.len() {
        return Err(DisError::corrupted(format!("decoded {expected} of {} bytes", unit.code.len())));
    }
    if let Some(target) = find_jump_targets(&unit.code)?.into_iter().find(|t| !starts.contains(t)) {
        return Err(DisError::corrupted(format!("jump target {target} is not an instruction start")));
    }
    Ok(())
}

/// First instruction named `opname`, optionally also matching `argval`.
pub fn find_instruction(unit: &CodeUnit, opname: &str, argval: Option<&OperandValue>) -> DisResult<Option<Instruction>> {
    for instr in decode_instructions(unit) {
        let instr = instr?;
        if instr.opname == opname && argval.is_none_or(|v| instr.argval.as_ref() == Some(v)) {
            return Ok(Some(instr));
        }
    }
    Ok(None)
}

/// True when [`find_instruction`] finds a match.
pub fn contains_instruction(unit: &CodeUnit, opname: &str, argval: Option<&OperandValue>) -> DisResult<bool> {
    find_instruction(unit, opname, argval).map(|found| found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::code::Value;

    fn unit(code: Vec<u8>) -> CodeUnit {
        CodeUnit { code, consts: vec![Value::None, Value::Int(3)], names: vec!["x".into()], ..CodeUnit::default() }
    }

    #[test]
    fn well_formed_unit_validates() {
        assert_eq!(validate_unit(&unit(vec![100, 1, 0, 114, 0, 0, 83])), Ok(()));
    }

    #[test]
    fn mid_instruction_target_is_rejected() {
        let err = validate_unit(&unit(vec![113, 1, 0, 83])).unwrap_err();
        assert_eq!(err, DisError::corrupted("jump target 1 is not an instruction start"));
    }

    #[test]
    fn decode_errors_propagate() {
        assert_eq!(
            validate_unit(&unit(vec![100])),
            Err(DisError::TruncatedInstruction { offset: 0, needed: 2, available: 0 })
        );
    }

    #[test]
    fn lookups_by_name_and_value() {
        let u = unit(vec![100, 0, 0, 100, 1, 0, 90, 0, 0]);
        let hit = find_instruction(&u, "LOAD_CONST", Some(&OperandValue::Const(Value::Int(3)))).unwrap();
        assert_eq!(hit.map(|i| i.offset), Some(3));
        assert_eq!(contains_instruction(&u, "STORE_NAME", None), Ok(true));
        assert_eq!(
            contains_instruction(&u, "STORE_NAME", Some(&OperandValue::Name("y".into()))),
            Ok(false)
        );
        assert_eq!(contains_instruction(&u, "RETURN_VALUE", None), Ok(false));
    }
}
