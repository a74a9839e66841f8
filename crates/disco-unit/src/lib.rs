//! disco-unit : conteneur binaire persistant pour `CodeUnit`
//!
//! Format :
//! ```text
//! Header: "DISCO\0" (6 bytes) + version u16 LE
//! [Section*]
//!   section = TAG[4] + len u32 LE + payload
//! Dernière section: "CRCC" + u32 (CRC32 IEEE sur tout après le header)
//! ```
//!
//! Sections :
//! - "META" : nom, fichier, argcount, nlocals, stacksize, flags, firstlineno
//! - "CODE" : flux d'instructions brut
//! - "CNST" : constantes étiquetées (les unités imbriquées sont des conteneurs complets)
//! - "NAME" / "VARS" / "CELL" / "FREE" : tables de noms (len u32 + bytes)
//! - "LNOT" : table de lignes, paires d'octets (longueur paire)
//!
//! Les sections inconnues sont ignorées.
//!
//! API :
//! - `to_bytes()` / `from_bytes()`
//! - `write_file()`, `read_file()`

#![deny(missing_docs)]
#![forbid(unsafe_code)]

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use disco_core::{ByteReader, ByteWriter, CodeUnit, DisError, DisResult, Value};
use thiserror::Error;

/* ─────────────────────────── Constantes ─────────────────────────── */

/// Magic en tête de conteneur.
pub const MAGIC: &[u8; 6] = b"DISCO\0";

/// Version courante du format.
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = MAGIC.len() + 2;

/// Profondeur maximale des unités imbriquées dans "CNST".
const MAX_NESTING: usize = 64;

/// Tags de sections (fourcc big-endian).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionTag {
    /// META : métadonnées de l'unité
    META = u32::from_be_bytes(*b"META"),
    /// CODE : instructions
    CODE = u32::from_be_bytes(*b"CODE"),
    /// CNST : constantes
    CNST = u32::from_be_bytes(*b"CNST"),
    /// NAME : noms globaux / attributs
    NAME = u32::from_be_bytes(*b"NAME"),
    /// VARS : noms locaux
    VARS = u32::from_be_bytes(*b"VARS"),
    /// CELL : variables cellules
    CELL = u32::from_be_bytes(*b"CELL"),
    /// FREE : variables libres
    FREE = u32::from_be_bytes(*b"FREE"),
    /// LNOT : table de lignes compressée
    LNOT = u32::from_be_bytes(*b"LNOT"),
    /// CRCC : somme de contrôle finale
    CRCC = u32::from_be_bytes(*b"CRCC"),
}

impl SectionTag {
    const ALL: [SectionTag; 9] = [
        SectionTag::META,
        SectionTag::CODE,
        SectionTag::CNST,
        SectionTag::NAME,
        SectionTag::VARS,
        SectionTag::CELL,
        SectionTag::FREE,
        SectionTag::LNOT,
        SectionTag::CRCC,
    ];

    /// Renvoie le fourcc sous forme de 4 octets big-endian.
    pub const fn to_be_bytes(self) -> [u8; 4] { (self as u32).to_be_bytes() }

    /// Lit un tag depuis 4 octets big-endian (`None` si inconnu).
    pub fn from_be_bytes(b: [u8; 4]) -> Option<Self> {
        let raw = u32::from_be_bytes(b);
        Self::ALL.into_iter().find(|t| *t as u32 == raw)
    }
}

/// Étiquettes des valeurs de la section "CNST".
mod value_tag {
    pub const NONE: u8 = 0;
    pub const BOOL: u8 = 1;
    pub const INT: u8 = 2;
    pub const FLOAT: u8 = 3;
    pub const STR: u8 = 4;
    pub const BYTES: u8 = 5;
    pub const TUPLE: u8 = 6;
    pub const ELLIPSIS: u8 = 7;
    pub const CODE: u8 = 8;
}

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreurs des helpers fichiers.
#[derive(Debug, Error)]
pub enum UnitError {
    /// Contenu invalide (magic, CRC, sections…).
    #[error(transparent)]
    Format(#[from] DisError),

    /// Erreur d'E/S sur le chemin donné.
    #[error("io error on {}: {source}", path.display())]
    Io {
        /// Chemin concerné.
        path: PathBuf,
        /// Cause.
        #[source]
        source: io::Error,
    },
}

/// Alias résultat des helpers fichiers.
pub type UnitResult<T> = Result<T, UnitError>;

/* ─────────────────────────── Écriture ─────────────────────────── */

fn write_section(w: &mut ByteWriter, tag: SectionTag, payload: &[u8]) -> DisResult<()> {
    w.write_bytes(&tag.to_be_bytes());
    w.write_len(payload.len())?;
    w.write_bytes(payload);
    Ok(())
}

fn write_names(w: &mut ByteWriter, tag: SectionTag, names: &[String]) -> DisResult<()> {
    if names.is_empty() {
        return Ok(());
    }
    let mut buf = ByteWriter::new();
    for s in names {
        buf.write_str(s)?;
    }
    write_section(w, tag, buf.as_slice())
}

fn write_value(buf: &mut ByteWriter, value: &Value) -> DisResult<()> {
    match value {
        Value::None => buf.write_u8(value_tag::NONE),
        Value::Bool(b) => {
            buf.write_u8(value_tag::BOOL);
            buf.write_u8(u8::from(*b));
        }
        Value::Int(i) => {
            buf.write_u8(value_tag::INT);
            buf.write_i64_le(*i);
        }
        Value::Float(x) => {
            buf.write_u8(value_tag::FLOAT);
            buf.write_f64_le(*x);
        }
        Value::Str(s) => {
            buf.write_u8(value_tag::STR);
            buf.write_str(s)?;
        }
        Value::Bytes(bytes) => {
            buf.write_u8(value_tag::BYTES);
            buf.write_len(bytes.len())?;
            buf.write_bytes(bytes);
        }
        Value::Tuple(items) => {
            buf.write_u8(value_tag::TUPLE);
            buf.write_len(items.len())?;
            for item in items {
                write_value(buf, item)?;
            }
        }
        Value::Ellipsis => buf.write_u8(value_tag::ELLIPSIS),
        Value::Code(code) => {
            let nested = to_bytes(code)?;
            buf.write_u8(value_tag::CODE);
            buf.write_len(nested.len())?;
            buf.write_bytes(&nested);
        }
    }
    Ok(())
}

/// Sérialise une unité (CRC32 en fin de conteneur).
///
/// Échoue si une chaîne, une table ou une section dépasse `u32::MAX` octets.
pub fn to_bytes(unit: &CodeUnit) -> DisResult<Vec<u8>> {
    let mut w = ByteWriter::new();

    // Magic + version
    w.write_bytes(MAGIC);
    w.write_u16_le(FORMAT_VERSION);

    // META
    let mut meta = ByteWriter::new();
    meta.write_str(&unit.name)?;
    meta.write_str(&unit.filename)?;
    meta.write_u32_le(unit.argcount);
    meta.write_u32_le(unit.nlocals);
    meta.write_u32_le(unit.stacksize);
    meta.write_u32_le(unit.flags);
    meta.write_u32_le(unit.firstlineno);
    write_section(&mut w, SectionTag::META, meta.as_slice())?;

    // CODE (toujours présent, même vide)
    write_section(&mut w, SectionTag::CODE, &unit.code)?;

    // CNST
    if !unit.consts.is_empty() {
        let mut buf = ByteWriter::new();
        for value in &unit.consts {
            write_value(&mut buf, value)?;
        }
        write_section(&mut w, SectionTag::CNST, buf.as_slice())?;
    }

    write_names(&mut w, SectionTag::NAME, &unit.names)?;
    write_names(&mut w, SectionTag::VARS, &unit.varnames)?;
    write_names(&mut w, SectionTag::CELL, &unit.cellvars)?;
    write_names(&mut w, SectionTag::FREE, &unit.freevars)?;

    // LNOT
    if !unit.lnotab.is_empty() {
        write_section(&mut w, SectionTag::LNOT, &unit.lnotab_bytes())?;
    }

    // CRC32 sur tout sauf magic/version
    let mut out = w.into_vec();
    let crc = crc32fast::hash(&out[HEADER_LEN..]);
    out.extend_from_slice(&SectionTag::CRCC.to_be_bytes());
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(out)
}

/* ─────────────────────────── Lecture ─────────────────────────── */

fn read_names(payload: &[u8]) -> DisResult<Vec<String>> {
    let mut r = ByteReader::new(payload);
    let mut names = Vec::new();
    while r.remaining() > 0 {
        names.push(r.read_str()?);
    }
    Ok(names)
}

fn read_value(r: &mut ByteReader<'_>, depth: usize) -> DisResult<Value> {
    let value = match r.read_u8()? {
        value_tag::NONE => Value::None,
        value_tag::BOOL => Value::Bool(r.read_u8()? != 0),
        value_tag::INT => Value::Int(r.read_i64_le()?),
        value_tag::FLOAT => Value::Float(r.read_f64_le()?),
        value_tag::STR => Value::Str(r.read_str()?),
        value_tag::BYTES => {
            let len = r.read_u32_le()? as usize;
            Value::Bytes(r.read_bytes(len)?.to_vec())
        }
        value_tag::TUPLE => {
            let count = r.read_u32_le()?;
            let mut items = Vec::new();
            for _ in 0..count {
                items.push(read_value(r, depth)?);
            }
            Value::Tuple(items)
        }
        value_tag::ELLIPSIS => Value::Ellipsis,
        value_tag::CODE => {
            if depth >= MAX_NESTING {
                return Err(DisError::corrupted("nested code units too deep"));
            }
            let len = r.read_u32_le()? as usize;
            Value::Code(Arc::new(decode_unit(r.read_bytes(len)?, depth + 1)?))
        }
        other => return Err(DisError::corrupted(format!("unknown constant tag {other}"))),
    };
    Ok(value)
}

fn read_meta(payload: &[u8], unit: &mut CodeUnit) -> DisResult<()> {
    let mut r = ByteReader::new(payload);
    unit.name = r.read_str()?;
    unit.filename = r.read_str()?;
    unit.argcount = r.read_u32_le()?;
    unit.nlocals = r.read_u32_le()?;
    unit.stacksize = r.read_u32_le()?;
    unit.flags = r.read_u32_le()?;
    unit.firstlineno = r.read_u32_le()?;
    Ok(())
}

fn decode_unit(data: &[u8], depth: usize) -> DisResult<CodeUnit> {
    let mut r = ByteReader::new(data);
    if r.read_bytes(MAGIC.len())? != MAGIC {
        return Err(DisError::corrupted("invalid DISCO magic"));
    }
    let version = r.read_u16_le()?;
    if version != FORMAT_VERSION {
        return Err(DisError::corrupted(format!("unsupported container version {version}")));
    }

    // Passe 1 : découpage des sections et vérification du CRC avant toute lecture.
    let mut sections = Vec::new();
    let mut checked = false;
    while r.remaining() > 0 {
        let body_end = r.offset();
        let raw = r.read_fourcc()?;
        if SectionTag::from_be_bytes(raw) == Some(SectionTag::CRCC) {
            let expected = r.read_u32_le()?;
            if crc32fast::hash(&data[HEADER_LEN..body_end]) != expected {
                return Err(DisError::corrupted("CRC32 mismatch"));
            }
            if r.remaining() > 0 {
                return Err(DisError::corrupted("trailing bytes after CRCC"));
            }
            checked = true;
            break;
        }
        let len = r.read_u32_le()? as usize;
        sections.push((raw, r.read_bytes(len)?));
    }
    if !checked {
        return Err(DisError::corrupted("missing CRCC trailer"));
    }

    // Passe 2 : contenu.
    let mut unit = CodeUnit::default();
    for (raw, payload) in sections {
        match SectionTag::from_be_bytes(raw) {
            Some(SectionTag::META) => read_meta(payload, &mut unit)?,
            Some(SectionTag::CODE) => unit.code = payload.to_vec(),
            Some(SectionTag::CNST) => {
                let mut rr = ByteReader::new(payload);
                while rr.remaining() > 0 {
                    unit.consts.push(read_value(&mut rr, depth)?);
                }
            }
            Some(SectionTag::NAME) => unit.names = read_names(payload)?,
            Some(SectionTag::VARS) => unit.varnames = read_names(payload)?,
            Some(SectionTag::CELL) => unit.cellvars = read_names(payload)?,
            Some(SectionTag::FREE) => unit.freevars = read_names(payload)?,
            Some(SectionTag::LNOT) => {
                if payload.len() % 2 != 0 {
                    return Err(DisError::corrupted("odd-length line table"));
                }
                unit.lnotab = CodeUnit::lnotab_from_bytes(payload);
            }
            Some(SectionTag::CRCC) | None => {
                #[cfg(feature = "tracing")]
                tracing::debug!(tag = %String::from_utf8_lossy(&raw), len = payload.len(), "skipping unknown section");
            }
        }
    }
    Ok(unit)
}

/// Reconstruit une unité à partir d'octets (CRC vérifié).
pub fn from_bytes(data: &[u8]) -> DisResult<CodeUnit> { decode_unit(data, 0) }

/* ─────────────────────────── Fichiers ─────────────────────────── */

/// Écrit une unité dans un fichier.
pub fn write_file<P: AsRef<Path>>(path: P, unit: &CodeUnit) -> UnitResult<()> {
    let path = path.as_ref();
    let bytes = to_bytes(unit)?;
    fs::write(path, bytes).map_err(|source| UnitError::Io { path: path.to_path_buf(), source })
}

/// Lit une unité depuis un fichier.
pub fn read_file<P: AsRef<Path>>(path: P) -> UnitResult<CodeUnit> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| UnitError::Io { path: path.to_path_buf(), source })?;
    #[cfg(feature = "tracing")]
    tracing::debug!(path = %path.display(), len = bytes.len(), "reading container");
    Ok(from_bytes(&bytes)?)
}

/* ─────────────────────────── Tests ─────────────────────────── */
