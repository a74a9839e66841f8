//! disco-core : décodage du flux d'instructions empaqueté (CPython 2.x)
//!
//! Fournit :
//! - `CodeUnit`, `Value`, `CodeFlags` : l'unité compilée et ses tables annexes
//! - `classify_opcode` : table statique opcode → (classe d'opérande, mnémonique)
//! - `decode_line_table` : décompression de la table delta offset → ligne
//! - `find_jump_targets` : passe indépendante des cibles de saut
//! - `decode_instructions` : itérateur paresseux d'`Instruction`
//! - Présentation (`disassemble`, `code_info`, `pretty_flags`), résolution
//!   d'entrée (`CodeSource`), assembleur minimal pour les fixtures
//! - IO mémoire (little-endian) : `ByteWriter`, `ByteReader`
//! - Erreurs `DisError` + alias `DisResult<T>`
//!
//! Features :
//! - `serde` (par défaut) : `Serialize` sur les enregistrements exposés
//! - `tracing` (par défaut) : traces de décodage

#![deny(missing_docs)]
#![forbid(unsafe_code)]

/* ─────────────────────────── Imports ─────────────────────────── */

use std::borrow::Cow;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/* ─────────────────────────── Modules publics ─────────────────────────── */

/// Primitives de bytecode (unité, table d'opcodes, décodeurs, présentation).
pub mod bytecode;

pub use bytecode::{
    asm::assemble,
    code::{CodeFlags, CodeUnit, Value},
    decode::{decode_bytes, decode_instructions, decode_instructions_with, Bytecode, Instruction, Instructions},
    disasm::{code_info, disassemble, disassemble_raw, format_instruction, pretty_flags},
    helpers::{contains_instruction, find_instruction, validate_unit},
    labels::{find_jump_targets, JumpTargets},
    lines::{decode_line_table, LineMap, LineStarts},
    opcode::{classify_opcode, opcode_by_name, OperandClass, EXTENDED_ARG, HAVE_ARGUMENT},
    operand::{resolve_operand, OperandValue, SideTable, SideTables},
    source::{dis, disassemble_traceback, resolve_code_unit, CodeSource, CompileFn, CompileMode, TraceFrame, Traceback},
};

/* ─────────────────────────── Résultat commun ─────────────────────────── */

/// Alias résultat commun au core.
pub type DisResult<T> = core::result::Result<T, DisError>;

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreurs du décodage et des collaborateurs directs.
///
/// Toutes sont terminales pour le décodage en cours : aucun repli silencieux.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisError {
    /// Octet d'opcode absent de la table des classes d'opérandes.
    #[error("unknown opcode {opcode} at offset {offset}")]
    UnknownOpcode {
        /// Octet lu.
        opcode: u8,
        /// Offset de l'instruction fautive.
        offset: usize,
    },

    /// Opérande hors de la table annexe qu'elle indexe.
    #[error("operand {index} out of range for {table} (len {len}) at offset {offset}")]
    OperandIndexOutOfRange {
        /// Table consultée.
        table: SideTable,
        /// Index demandé.
        index: u32,
        /// Taille de la table.
        len: usize,
        /// Offset de l'instruction fautive.
        offset: usize,
    },

    /// Le buffer se termine au milieu d'une instruction, ou avec des bits
    /// EXTENDED_ARG non nuls jamais consommés.
    #[error("truncated instruction at offset {offset}: need {needed} more bytes, {available} available")]
    TruncatedInstruction {
        /// Offset de l'instruction incomplète.
        offset: usize,
        /// Octets attendus après l'opcode.
        needed: usize,
        /// Octets réellement disponibles.
        available: usize,
    },

    /// Opérande accumulée au-delà de 32 bits (EXTENDED_ARG en chaîne).
    #[error("extended operand overflows 32 bits at offset {offset}")]
    ExtendedArgOverflow {
        /// Offset du préfixe fautif.
        offset: usize,
    },

    /// Entrée qui ne se résout pas en unité compilée.
    #[error("don't know how to disassemble {kind} objects")]
    UnsupportedInputKind {
        /// Nature de l'entrée refusée.
        kind: Cow<'static, str>,
    },

    /// Aucun traceback disponible à désassembler.
    #[error("no last traceback to disassemble")]
    NoTraceback,

    /// Échec du compilateur branché en collaborateur.
    #[error("compile error: {0}")]
    Compile(String),

    /// Fin de buffer inattendue (lecteur d'octets).
    #[error("unexpected EOF: need {needed} bytes at {at}")]
    UnexpectedEof {
        /// Nombre d'octets manquants.
        needed: u64,
        /// Offset où l'erreur s'est produite.
        at: u64,
    },

    /// Données corrompues (CRC / format).
    #[error("corrupted: {0}")]
    Corrupted(Cow<'static, str>),
}

impl DisError {
    /// Construit une erreur « corrompu ».
    pub fn corrupted(msg: impl Into<Cow<'static, str>>) -> Self { DisError::Corrupted(msg.into()) }

    /// Construit une erreur « entrée non supportée ».
    pub fn unsupported(kind: impl Into<Cow<'static, str>>) -> Self {
        DisError::UnsupportedInputKind { kind: kind.into() }
    }

    /// Offset de l'instruction en cause, si l'erreur en porte un.
    pub fn offset(&self) -> Option<usize> {
        match *self {
            DisError::UnknownOpcode { offset, .. }
            | DisError::OperandIndexOutOfRange { offset, .. }
            | DisError::TruncatedInstruction { offset, .. }
            | DisError::ExtendedArgOverflow { offset } => Some(offset),
            _ => None,
        }
    }
}

/* ─────────────────────────── Byte Writer (LE) ─────────────────────────── */

/// Buffer d'écriture (croît automatiquement).
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Crée un writer vide.
    pub fn new() -> Self { Self { buf: Vec::new() } }
    /// Accès en lecture au contenu.
    pub fn as_slice(&self) -> &[u8] { &self.buf }
    /// Récupère le buffer (consomme).
    pub fn into_vec(self) -> Vec<u8> { self.buf }
    /// Ajoute des octets bruts.
    pub fn write_bytes(&mut self, bytes: &[u8]) { self.buf.extend_from_slice(bytes); }
    /// Écrit un octet.
    pub fn write_u8(&mut self, v: u8) { self.buf.push(v); }
    /// Écrit un u16 little-endian.
    pub fn write_u16_le(&mut self, v: u16) {
        let mut b = [0u8; 2];
        LittleEndian::write_u16(&mut b, v);
        self.write_bytes(&b);
    }
    /// Écrit un u32 little-endian.
    pub fn write_u32_le(&mut self, v: u32) {
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, v);
        self.write_bytes(&b);
    }
    /// Écrit un i64 little-endian.
    pub fn write_i64_le(&mut self, v: i64) {
        let mut b = [0u8; 8];
        LittleEndian::write_i64(&mut b, v);
        self.write_bytes(&b);
    }
    /// Écrit un f64 little-endian.
    pub fn write_f64_le(&mut self, v: f64) {
        let mut b = [0u8; 8];
        LittleEndian::write_f64(&mut b, v);
        self.write_bytes(&b);
    }
    /// Écrit une longueur en u32 LE ; refuse tout ce qui dépasse `u32::MAX`.
    pub fn write_len(&mut self, len: usize) -> DisResult<()> {
        let len = u32::try_from(len).map_err(|_| DisError::corrupted("length does not fit in u32"))?;
        self.write_u32_le(len);
        Ok(())
    }
    /// Écrit une chaîne préfixée par sa longueur (u32 LE).
    pub fn write_str(&mut self, s: &str) -> DisResult<()> {
        self.write_len(s.len())?;
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

/* ─────────────────────────── Byte Reader (LE) ─────────────────────────── */

/// Lecteur séquentiel sur un slice d'octets (helpers LE).
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    off: usize,
}

impl<'a> ByteReader<'a> {
    /// Construit un lecteur.
    pub fn new(data: &'a [u8]) -> Self { Self { data, off: 0 } }
    /// Offset courant.
    pub fn offset(&self) -> usize { self.off }
    /// Taille restante.
    pub fn remaining(&self) -> usize { self.data.len().saturating_sub(self.off) }

    /// Lit `n` octets (ou erreur si EOF).
    pub fn read_bytes(&mut self, n: usize) -> DisResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(DisError::UnexpectedEof { needed: n as u64, at: self.off as u64 });
        }
        let start = self.off;
        self.off += n;
        Ok(&self.data[start..self.off])
    }

    /// Lit un fourcc brut.
    pub fn read_fourcc(&mut self) -> DisResult<[u8; 4]> {
        let b = self.read_bytes(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    /// Lit un octet.
    pub fn read_u8(&mut self) -> DisResult<u8> { Ok(self.read_bytes(1)?[0]) }

    /// Lit un u16 LE.
    pub fn read_u16_le(&mut self) -> DisResult<u16> { Ok(LittleEndian::read_u16(self.read_bytes(2)?)) }

    /// Lit un u32 LE.
    pub fn read_u32_le(&mut self) -> DisResult<u32> { Ok(LittleEndian::read_u32(self.read_bytes(4)?)) }

    /// Lit un i64 LE.
    pub fn read_i64_le(&mut self) -> DisResult<i64> { Ok(LittleEndian::read_i64(self.read_bytes(8)?)) }

    /// Lit un f64 LE.
    pub fn read_f64_le(&mut self) -> DisResult<f64> { Ok(LittleEndian::read_f64(self.read_bytes(8)?)) }

    /// Lit une chaîne UTF-8 préfixée par sa longueur (u32 LE).
    pub fn read_str(&mut self) -> DisResult<String> {
        let len = self.read_u32_le()? as usize;
        let bytes = self.read_bytes(len)?;
        core::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DisError::corrupted("invalid UTF-8"))
    }
}

/* ─────────────────────────── Prélude (reexports utiles) ─────────────────────────── */

/// Prélude pratique pour importer les types/funcs clés du crate.
pub mod prelude {
    /// Réexports utiles pour une importation rapide.
    pub use super::{
        classify_opcode, decode_instructions, decode_line_table, find_jump_targets, ByteReader,
        ByteWriter, Bytecode, CodeSource, CodeUnit, DisError, DisResult, Instruction, OperandClass,
        OperandValue, Value,
    };
}

/* ─────────────────────────── Tests ─────────────────────────── */
