//! Jump target pre-pass (`findlabels`).
//!
//! Runs before decoding so that every emitted instruction can report whether
//! something branches to it without look-ahead.

use std::collections::BTreeSet;

use crate::bytecode::opcode::OperandClass;
use crate::bytecode::scan::{Scan, Scanned};
use crate::{DisError, DisResult};

/// Set of branch target offsets.
pub type JumpTargets = BTreeSet<usize>;

fn target_of(s: &Scanned) -> Option<usize> {
    let arg = s.arg? as usize;
    match s.info.class {
        OperandClass::RelativeJump => Some(s.next_offset() + arg),
        OperandClass::AbsoluteJump => Some(arg),
        _ => None,
    }
}

/// Collects targets up to the first structural error, returning it alongside.
///
/// The decoder uses this lenient form so that a malformed tail surfaces in
/// order, after the instructions before it were yielded.
pub(crate) fn collect_targets(code: &[u8]) -> (JumpTargets, Option<DisError>) {
    let mut targets = JumpTargets::new();
    for item in Scan::new(code) {
        match item {
            Ok(s) => targets.extend(target_of(&s)),
            Err(e) => return (targets, Some(e)),
        }
    }
    (targets, None)
}

/// Every offset reachable by a relative or absolute branch.
pub fn find_jump_targets(code: &[u8]) -> DisResult<JumpTargets> {
    match collect_targets(code) {
        (targets, None) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(len = code.len(), targets = targets.len(), "jump targets collected");
            Ok(targets)
        }
        (_, Some(err)) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_targets_count_from_following_instruction() {
        // 0 SETUP_LOOP +4 ; 3 POP_TOP ; 4 JUMP_FORWARD +0 ; 7 RETURN_VALUE
        let code = [120, 4, 0, 1, 110, 0, 0, 83];
        assert_eq!(find_jump_targets(&code), Ok(JumpTargets::from([7])));
    }

    #[test]
    fn absolute_targets_and_duplicates() {
        // 0 POP_JUMP_IF_FALSE 6 ; 3 JUMP_ABSOLUTE 6 ; 6 RETURN_VALUE
        let code = [114, 6, 0, 113, 6, 0, 83];
        assert_eq!(find_jump_targets(&code), Ok(JumpTargets::from([6])));
    }

    #[test]
    fn extended_targets_use_the_full_operand() {
        // EXTENDED_ARG 1 ; JUMP_ABSOLUTE 4 → 65540
        let code = [145, 1, 0, 113, 4, 0];
        assert_eq!(find_jump_targets(&code), Ok(JumpTargets::from([65_540])));
    }

    #[test]
    fn non_branch_operands_are_ignored() {
        let code = [100, 9, 0, 124, 3, 0, 83];
        assert!(find_jump_targets(&code).unwrap().is_empty());
    }

    #[test]
    fn malformed_buffer_fails_but_lenient_scan_keeps_prefix() {
        let code = [113, 0, 0, 114];
        assert_eq!(
            find_jump_targets(&code),
            Err(DisError::TruncatedInstruction { offset: 3, needed: 2, available: 0 })
        );
        let (targets, err) = collect_targets(&code);
        assert_eq!(targets, JumpTargets::from([0]));
        assert!(err.is_some());
    }
}
