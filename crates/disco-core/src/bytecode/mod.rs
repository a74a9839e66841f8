//! Bytecode helpers: code unit model, opcode table, decoders and presentation.
//!
//! The decoding engine is split the same way the data flows: two independent
//! pre-passes (`lines`, `labels`) and the authoritative instruction pass
//! (`decode`), which only looks their results up.

/// Code unit and constant values.
pub mod code;
/// Static opcode → operand class table.
pub mod opcode;
pub mod scan;
pub mod lines;
pub mod labels;
pub mod operand;
pub mod decode;
pub mod disasm;
pub mod source;
pub mod helpers;
pub mod asm;
