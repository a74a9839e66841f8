//! Structural scan of the packed instruction stream.
//!
//! Both the jump target pre-pass and the main decoder walk the buffer with
//! [`Scan`], so operand width handling and extended-argument accumulation
//! exist in exactly one place.

use byteorder::{ByteOrder, LittleEndian};

use crate::bytecode::opcode::{instruction_size, op_info, OpInfo, EXTENDED_ARG, HAVE_ARGUMENT};
use crate::{DisError, DisResult};

/// Extended-argument accumulator carried from one instruction to the next.
///
/// Holds the pre-shifted high bits of the last `EXTENDED_ARG` prefix (0 when
/// clear) and the offset of that prefix. The next operand-bearing opcode
/// absorbs the bits; opcodes without operand leave them in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtendedArg {
    high: u32,
    origin: usize,
}

impl ExtendedArg {
    /// Fresh accumulator.
    pub const fn new() -> Self { Self { high: 0, origin: 0 } }

    /// True when no high bits are waiting.
    pub const fn is_clear(&self) -> bool { self.high == 0 }

    /// Merges the pending high bits into `word` and returns the combined
    /// operand (`None` for opcodes without operand, which keep the bits).
    pub fn absorb(&mut self, offset: usize, opcode: u8, word: Option<u16>) -> DisResult<Option<u32>> {
        let Some(word) = word else {
            return Ok(None);
        };
        let combined = self.high | u32::from(word);
        self.high = 0;
        if opcode == EXTENDED_ARG {
            // the shift below would drop the top half
            if combined > 0xFFFF {
                return Err(DisError::ExtendedArgOverflow { offset });
            }
            #[cfg(feature = "tracing")]
            tracing::trace!(offset, combined, "extended-arg prefix");
            self.high = combined << 16;
            self.origin = offset;
        }
        Ok(Some(combined))
    }

    /// End-of-buffer check: non-zero bits left waiting are a truncation,
    /// reported at the prefix that produced them.
    pub fn finish(&self) -> DisResult<()> {
        if self.is_clear() {
            Ok(())
        } else {
            Err(DisError::TruncatedInstruction { offset: self.origin, needed: 1, available: 0 })
        }
    }
}

/// One instruction as laid out in the buffer, operand merged but unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scanned {
    /// Offset of the opcode byte.
    pub offset: usize,
    /// Table entry for the opcode.
    pub info: OpInfo,
    /// Combined operand (extended bits included), if the opcode takes one.
    pub arg: Option<u32>,
}

impl Scanned {
    /// Encoded size in bytes.
    pub const fn size(&self) -> usize { instruction_size(self.info.opcode) }
    /// Offset of the instruction that follows.
    pub const fn next_offset(&self) -> usize { self.offset + self.size() }
}

/// Forward scan over a buffer; stops after the first error.
#[derive(Debug, Clone)]
pub struct Scan<'a> {
    code: &'a [u8],
    pos: usize,
    ext: ExtendedArg,
    done: bool,
}

impl<'a> Scan<'a> {
    /// Starts at offset 0 with a clear accumulator.
    pub fn new(code: &'a [u8]) -> Self { Self { code, pos: 0, ext: ExtendedArg::new(), done: false } }

    fn step(&mut self) -> DisResult<Scanned> {
        let offset = self.pos;
        let opcode = self.code[offset];
        let info = op_info(opcode).map_err(|e| e.at(offset))?;
        let word = if opcode >= HAVE_ARGUMENT {
            let bytes = self.code.get(offset + 1..offset + 3).ok_or(DisError::TruncatedInstruction {
                offset,
                needed: 2,
                available: self.code.len() - offset - 1,
            })?;
            Some(LittleEndian::read_u16(bytes))
        } else {
            None
        };
        let arg = self.ext.absorb(offset, opcode, word)?;
        self.pos = offset + instruction_size(opcode);
        Ok(Scanned { offset, info, arg })
    }
}

impl Iterator for Scan<'_> {
    type Item = DisResult<Scanned>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.pos >= self.code.len() {
            self.done = true;
            return self.ext.finish().err().map(Err);
        }
        let item = self.step();
        self.done = item.is_err();
        Some(item)
    }
}

impl core::iter::FusedIterator for Scan<'_> {}
