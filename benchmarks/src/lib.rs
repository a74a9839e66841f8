//! Fixtures synthétiques partagées par les benches disco.
//!
//! Tout est auto-contenu : les unités sont assemblées en mémoire, pas de
//! corpus externe.

use disco_core::{assemble, CodeUnit, Value};

/// Corps d'une boucle `while` typique (14 instructions dont 11 à opérande, deux sauts).
const LOOP_BODY: &str = "
    LOAD_FAST 0
    LOAD_CONST 1
    COMPARE_OP 0
    POP_JUMP_IF_FALSE {exit}
    LOAD_GLOBAL 0
    LOAD_FAST 0
    CALL_FUNCTION 1
    POP_TOP
    LOAD_FAST 0
    LOAD_CONST 2
    BINARY_ADD
    STORE_FAST 0
    JUMP_ABSOLUTE {head}
    POP_BLOCK
";

const BLOCK_LEN: usize = 11 * 3 + 3;

/// Unité de `blocks` boucles enchaînées, une ligne source par instruction.
pub fn synthetic_unit(blocks: usize) -> CodeUnit {
    let mut text = String::new();
    let mut head = 0usize;
    for _ in 0..blocks {
        // POP_BLOCK est le dernier octet du bloc
        let exit = head + BLOCK_LEN - 1;
        text.push_str(&LOOP_BODY.replace("{exit}", &exit.to_string()).replace("{head}", &head.to_string()));
        head += BLOCK_LEN;
    }
    text.push_str("LOAD_CONST 0\nRETURN_VALUE\n");

    let code = assemble(&text).unwrap_or_default();
    let instructions = blocks * 14 + 2;
    let mut lnotab = Vec::with_capacity(instructions);
    let mut offset = 0usize;
    let mut prev = 0usize;
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let size = if line.contains(' ') { 3 } else { 1 };
        lnotab.push(((offset - prev) as u8, 1));
        prev = offset;
        offset += size;
    }

    CodeUnit {
        name: "hot".into(),
        filename: "bench.py".into(),
        argcount: 1,
        nlocals: 1,
        stacksize: 4,
        flags: 0x43,
        code,
        consts: vec![Value::None, Value::Int(1_000), Value::Int(1)],
        names: vec!["print".into()],
        varnames: vec!["i".into()],
        firstlineno: 1,
        lnotab,
        ..CodeUnit::default()
    }
}
