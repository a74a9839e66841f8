//! Line table decompression (`co_lnotab` → offset/line starts).
//!
//! The table is a flat run of unsigned `(byte delta, line delta)` pairs.
//! Runs of bytes belonging to the same line collapse into one emission at
//! the first offset of the run; a line change takes effect only once the
//! byte span it follows has been stepped over.
//!
//! Line deltas are unsigned: later format revisions that allow lines to move
//! backward are not supported.

use std::iter::FusedIterator;

use indexmap::IndexMap;

/// Offset → starting line, in emission order.
pub type LineMap = IndexMap<usize, u32>;

/// Lazy `(offset, line)` sequence over a compressed table.
///
/// Cheap to clone; a clone restarts from where the original stands.
#[derive(Debug, Clone)]
pub struct LineStarts<'a> {
    pairs: core::slice::Iter<'a, (u8, u8)>,
    offset: usize,
    line: u32,
    last: Option<u32>,
    finished: bool,
}

impl<'a> LineStarts<'a> {
    /// Starts decoding `lnotab` from `firstlineno`.
    pub fn new(firstlineno: u32, lnotab: &'a [(u8, u8)]) -> Self {
        Self { pairs: lnotab.iter(), offset: 0, line: firstlineno, last: None, finished: false }
    }
}

impl Iterator for LineStarts<'_> {
    type Item = (usize, u32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        for &(byte_incr, line_incr) in self.pairs.by_ref() {
            let mut emitted = None;
            if byte_incr != 0 {
                if self.last != Some(self.line) {
                    emitted = Some((self.offset, self.line));
                    self.last = Some(self.line);
                }
                self.offset += usize::from(byte_incr);
            }
            self.line = self.line.saturating_add(u32::from(line_incr));
            if emitted.is_some() {
                return emitted;
            }
        }
        self.finished = true;
        (self.last != Some(self.line)).then_some((self.offset, self.line))
    }
}

impl FusedIterator for LineStarts<'_> {}

/// Materializes [`LineStarts`] (last value wins).
pub fn decode_line_table(firstlineno: u32, lnotab: &[(u8, u8)]) -> LineMap {
    LineStarts::new(firstlineno, lnotab).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_table_emits_first_line() {
        let starts: Vec<_> = LineStarts::new(7, &[]).collect();
        assert_eq!(starts, vec![(0, 7)]);
    }

    #[test]
    fn zero_byte_delta_only_moves_the_line() {
        let starts: Vec<_> = LineStarts::new(1, &[(0, 1)]).collect();
        assert_eq!(starts, vec![(0, 2)]);
    }

    #[test]
    fn typical_function_body() {
        // line 1 → 6 bytes, line 2 → 9 bytes, line 4 → rest
        let starts: Vec<_> = LineStarts::new(1, &[(6, 1), (9, 2)]).collect();
        assert_eq!(starts, vec![(0, 1), (6, 2), (15, 4)]);
    }

    #[test]
    fn large_byte_spans_coalesce() {
        // a span over 255 bytes is split into (255, 0) + (n, k)
        let starts: Vec<_> = LineStarts::new(10, &[(255, 0), (45, 3), (3, 1)]).collect();
        assert_eq!(starts, vec![(0, 10), (300, 13), (303, 14)]);
    }

    #[test]
    fn large_line_jumps_coalesce() {
        let starts: Vec<_> = LineStarts::new(1, &[(0, 255), (4, 45), (2, 0)]).collect();
        assert_eq!(starts, vec![(0, 256), (4, 301)]);
    }

    #[test]
    fn mapping_and_restart() {
        let table = [(3, 1), (4, 1)];
        let map = decode_line_table(5, &table);
        assert_eq!(map.get(&0), Some(&5));
        assert_eq!(map.get(&3), Some(&6));
        assert_eq!(map.get(&7), Some(&7));
        assert_eq!(decode_line_table(5, &table), map);
    }
}
