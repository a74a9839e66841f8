//! Static opcode table for the packed CPython 2.7 instruction set.
//!
//! Pure data: every opcode maps to its mnemonic and to the class that says
//! how its raw operand is resolved. Opcodes at or above [`HAVE_ARGUMENT`]
//! carry a two-byte little-endian operand.

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::DisError;

/// First opcode that carries an operand.
pub const HAVE_ARGUMENT: u8 = 90;

/// Pseudo-opcode widening the next operand by 16 high-order bits.
pub const EXTENDED_ARG: u8 = 145;

/// Size in bytes of an instruction with / without operand.
pub const fn instruction_size(opcode: u8) -> usize {
    if opcode >= HAVE_ARGUMENT { 3 } else { 1 }
}

/// Comparison operator display table, indexed by the COMPARE_OP operand.
pub const CMP_OP: [&str; 12] = [
    "<", "<=", "==", "!=", ">", ">=", "in", "not in", "is", "is not", "exception match", "BAD",
];

/// How an opcode's raw operand is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(rename_all = "kebab-case"))]
pub enum OperandClass {
    /// No operand.
    None,
    /// Index into the constant pool.
    ConstantRef,
    /// Index into the name table.
    NameRef,
    /// Index into the local variable names.
    LocalRef,
    /// Index into cell variables, then free variables.
    FreeRef,
    /// Index into [`CMP_OP`].
    ComparisonOp,
    /// Branch relative to the following instruction.
    RelativeJump,
    /// Branch to an absolute offset.
    AbsoluteJump,
    /// High bits for the next operand.
    ExtendedArg,
    /// Plain integer operand.
    Generic,
}

impl OperandClass {
    /// True for both branch classes.
    pub const fn is_jump(self) -> bool {
        matches!(self, OperandClass::RelativeJump | OperandClass::AbsoluteJump)
    }
}

/// Table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
    /// Numeric opcode.
    pub opcode: u8,
    /// Mnemonic.
    pub name: &'static str,
    /// Operand class.
    pub class: OperandClass,
}

/// Opcode byte with no table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown opcode {0}")]
pub struct UnknownOpcode(pub u8);

impl UnknownOpcode {
    /// Attaches the offset where the byte was read.
    pub fn at(self, offset: usize) -> DisError {
        DisError::UnknownOpcode { opcode: self.0, offset }
    }
}

use OperandClass as C;

const OPCODES: &[(u8, &str, OperandClass)] = &[
    (0, "STOP_CODE", C::None),
    (1, "POP_TOP", C::None),
    (2, "ROT_TWO", C::None),
    (3, "ROT_THREE", C::None),
    (4, "DUP_TOP", C::None),
    (5, "ROT_FOUR", C::None),
    (9, "NOP", C::None),
    (10, "UNARY_POSITIVE", C::None),
    (11, "UNARY_NEGATIVE", C::None),
    (12, "UNARY_NOT", C::None),
    (13, "UNARY_CONVERT", C::None),
    (15, "UNARY_INVERT", C::None),
    (19, "BINARY_POWER", C::None),
    (20, "BINARY_MULTIPLY", C::None),
    (21, "BINARY_DIVIDE", C::None),
    (22, "BINARY_MODULO", C::None),
    (23, "BINARY_ADD", C::None),
    (24, "BINARY_SUBTRACT", C::None),
    (25, "BINARY_SUBSCR", C::None),
    (26, "BINARY_FLOOR_DIVIDE", C::None),
    (27, "BINARY_TRUE_DIVIDE", C::None),
    (28, "INPLACE_FLOOR_DIVIDE", C::None),
    (29, "INPLACE_TRUE_DIVIDE", C::None),
    (30, "SLICE+0", C::None),
    (31, "SLICE+1", C::None),
    (32, "SLICE+2", C::None),
    (33, "SLICE+3", C::None),
    (40, "STORE_SLICE+0", C::None),
    (41, "STORE_SLICE+1", C::None),
    (42, "STORE_SLICE+2", C::None),
    (43, "STORE_SLICE+3", C::None),
    (50, "DELETE_SLICE+0", C::None),
    (51, "DELETE_SLICE+1", C::None),
    (52, "DELETE_SLICE+2", C::None),
    (53, "DELETE_SLICE+3", C::None),
    (54, "STORE_MAP", C::None),
    (55, "INPLACE_ADD", C::None),
    (56, "INPLACE_SUBTRACT", C::None),
    (57, "INPLACE_MULTIPLY", C::None),
    (58, "INPLACE_DIVIDE", C::None),
    (59, "INPLACE_MODULO", C::None),
    (60, "STORE_SUBSCR", C::None),
    (61, "DELETE_SUBSCR", C::None),
    (62, "BINARY_LSHIFT", C::None),
    (63, "BINARY_RSHIFT", C::None),
    (64, "BINARY_AND", C::None),
    (65, "BINARY_XOR", C::None),
    (66, "BINARY_OR", C::None),
    (67, "INPLACE_POWER", C::None),
    (68, "GET_ITER", C::None),
    (70, "PRINT_EXPR", C::None),
    (71, "PRINT_ITEM", C::None),
    (72, "PRINT_NEWLINE", C::None),
    (73, "PRINT_ITEM_TO", C::None),
    (74, "PRINT_NEWLINE_TO", C::None),
    (75, "INPLACE_LSHIFT", C::None),
    (76, "INPLACE_RSHIFT", C::None),
    (77, "INPLACE_AND", C::None),
    (78, "INPLACE_XOR", C::None),
    (79, "INPLACE_OR", C::None),
    (80, "BREAK_LOOP", C::None),
    (81, "WITH_CLEANUP", C::None),
    (82, "LOAD_LOCALS", C::None),
    (83, "RETURN_VALUE", C::None),
    (84, "IMPORT_STAR", C::None),
    (85, "EXEC_STMT", C::None),
    (86, "YIELD_VALUE", C::None),
    (87, "POP_BLOCK", C::None),
    (88, "END_FINALLY", C::None),
    (89, "BUILD_CLASS", C::None),
    (90, "STORE_NAME", C::NameRef),
    (91, "DELETE_NAME", C::NameRef),
    (92, "UNPACK_SEQUENCE", C::Generic),
    (93, "FOR_ITER", C::RelativeJump),
    (94, "LIST_APPEND", C::Generic),
    (95, "STORE_ATTR", C::NameRef),
    (96, "DELETE_ATTR", C::NameRef),
    (97, "STORE_GLOBAL", C::NameRef),
    (98, "DELETE_GLOBAL", C::NameRef),
    (99, "DUP_TOPX", C::Generic),
    (100, "LOAD_CONST", C::ConstantRef),
    (101, "LOAD_NAME", C::NameRef),
    (102, "BUILD_TUPLE", C::Generic),
    (103, "BUILD_LIST", C::Generic),
    (104, "BUILD_SET", C::Generic),
    (105, "BUILD_MAP", C::Generic),
    (106, "LOAD_ATTR", C::NameRef),
    (107, "COMPARE_OP", C::ComparisonOp),
    (108, "IMPORT_NAME", C::NameRef),
    (109, "IMPORT_FROM", C::NameRef),
    (110, "JUMP_FORWARD", C::RelativeJump),
    (111, "JUMP_IF_FALSE_OR_POP", C::AbsoluteJump),
    (112, "JUMP_IF_TRUE_OR_POP", C::AbsoluteJump),
    (113, "JUMP_ABSOLUTE", C::AbsoluteJump),
    (114, "POP_JUMP_IF_FALSE", C::AbsoluteJump),
    (115, "POP_JUMP_IF_TRUE", C::AbsoluteJump),
    (116, "LOAD_GLOBAL", C::NameRef),
    (119, "CONTINUE_LOOP", C::AbsoluteJump),
    (120, "SETUP_LOOP", C::RelativeJump),
    (121, "SETUP_EXCEPT", C::RelativeJump),
    (122, "SETUP_FINALLY", C::RelativeJump),
    (124, "LOAD_FAST", C::LocalRef),
    (125, "STORE_FAST", C::LocalRef),
    (126, "DELETE_FAST", C::LocalRef),
    (130, "RAISE_VARARGS", C::Generic),
    (131, "CALL_FUNCTION", C::Generic),
    (132, "MAKE_FUNCTION", C::Generic),
    (133, "BUILD_SLICE", C::Generic),
    (134, "MAKE_CLOSURE", C::Generic),
    (135, "LOAD_CLOSURE", C::FreeRef),
    (136, "LOAD_DEREF", C::FreeRef),
    (137, "STORE_DEREF", C::FreeRef),
    (140, "CALL_FUNCTION_VAR", C::Generic),
    (141, "CALL_FUNCTION_KW", C::Generic),
    (142, "CALL_FUNCTION_VAR_KW", C::Generic),
    (143, "SETUP_WITH", C::RelativeJump),
    (145, "EXTENDED_ARG", C::ExtendedArg),
    (146, "SET_ADD", C::Generic),
    (147, "MAP_ADD", C::Generic),
];

static TABLE: [Option<OpInfo>; 256] = build_table();

const fn build_table() -> [Option<OpInfo>; 256] {
    let mut table: [Option<OpInfo>; 256] = [None; 256];
    let mut i = 0;
    while i < OPCODES.len() {
        let (opcode, name, class) = OPCODES[i];
        table[opcode as usize] = Some(OpInfo { opcode, name, class });
        i += 1;
    }
    table
}

/// Table entry for `opcode`.
pub fn op_info(opcode: u8) -> Result<OpInfo, UnknownOpcode> {
    TABLE[opcode as usize].ok_or(UnknownOpcode(opcode))
}

/// Operand class and mnemonic of `opcode`.
pub fn classify_opcode(opcode: u8) -> Result<(OperandClass, &'static str), UnknownOpcode> {
    op_info(opcode).map(|info| (info.class, info.name))
}

/// Reverse lookup by mnemonic.
pub fn opcode_by_name(name: &str) -> Option<u8> {
    OPCODES.iter().find(|(_, n, _)| *n == name).map(|&(op, _, _)| op)
}

/// Every known opcode entry, in opcode order.
pub fn all_opcodes() -> impl Iterator<Item = OpInfo> {
    TABLE.iter().filter_map(|e| *e)
}

fn class_is(opcode: u8, class: OperandClass) -> bool {
    matches!(op_info(opcode), Ok(info) if info.class == class)
}

/// Opcode reads the constant pool.
pub fn has_const(opcode: u8) -> bool { class_is(opcode, OperandClass::ConstantRef) }
/// Opcode reads the name table.
pub fn has_name(opcode: u8) -> bool { class_is(opcode, OperandClass::NameRef) }
/// Opcode is a relative branch.
pub fn has_jrel(opcode: u8) -> bool { class_is(opcode, OperandClass::RelativeJump) }
/// Opcode is an absolute branch.
pub fn has_jabs(opcode: u8) -> bool { class_is(opcode, OperandClass::AbsoluteJump) }
/// Opcode reads the local variable names.
pub fn has_local(opcode: u8) -> bool { class_is(opcode, OperandClass::LocalRef) }
/// Opcode reads cell/free variable names.
pub fn has_free(opcode: u8) -> bool { class_is(opcode, OperandClass::FreeRef) }
/// Opcode reads the comparison table.
pub fn has_compare(opcode: u8) -> bool { class_is(opcode, OperandClass::ComparisonOp) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_values_are_stable() {
        assert_eq!(opcode_by_name("LOAD_CONST"), Some(100));
        assert_eq!(opcode_by_name("RETURN_VALUE"), Some(83));
        assert_eq!(opcode_by_name("EXTENDED_ARG"), Some(EXTENDED_ARG));
        assert_eq!(opcode_by_name("NOPE"), None);
    }

    #[test]
    fn classification() {
        assert_eq!(classify_opcode(100), Ok((OperandClass::ConstantRef, "LOAD_CONST")));
        assert_eq!(classify_opcode(1), Ok((OperandClass::None, "POP_TOP")));
        assert_eq!(classify_opcode(110), Ok((OperandClass::RelativeJump, "JUMP_FORWARD")));
        assert_eq!(classify_opcode(113), Ok((OperandClass::AbsoluteJump, "JUMP_ABSOLUTE")));
        assert_eq!(classify_opcode(145), Ok((OperandClass::ExtendedArg, "EXTENDED_ARG")));
        assert_eq!(classify_opcode(6), Err(UnknownOpcode(6)));
        assert_eq!(classify_opcode(255), Err(UnknownOpcode(255)));
    }

    #[test]
    fn operand_presence_follows_threshold() {
        for info in all_opcodes() {
            let takes_operand = info.class != OperandClass::None;
            assert_eq!(takes_operand, info.opcode >= HAVE_ARGUMENT, "{}", info.name);
        }
    }

    #[test]
    fn membership_predicates() {
        assert!(has_const(100));
        assert!(has_name(116));
        assert!(has_jrel(93) && has_jrel(143));
        assert!(has_jabs(114) && !has_jabs(110));
        assert!(has_local(124));
        assert!(has_free(136));
        assert!(has_compare(107));
        assert_eq!(CMP_OP[7], "not in");
    }
}
