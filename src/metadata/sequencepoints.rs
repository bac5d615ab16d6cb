//! Per-method sequence point tables.
//!
//! A [`SequencePointIndex`] maps IL offsets of one method to source ranges. It is built once
//! when the module's symbols load, either from the parallel arrays a symbol reader hands out
//! ([`SequencePointArrays`]) or from a Portable PDB `MethodDebugInformation` blob, and is
//! dropped with the module.
//!
//! # Portable PDB blob format
//!
//! ```text
//! Blob    ::= header SequencePointRecord (SequencePointRecord | DocumentRecord)*
//! header  ::= LocalSignature:uint [InitialDocument:uint]
//! Point   ::= δIL:uint ΔLines:uint ΔColumns:(uint|int) δStartLine:(uint|int) δStartColumn:(uint|int)
//! Hidden  ::= δIL:uint 0 0
//! Document::= 0 Document:uint
//! ```
//!
//! `InitialDocument` is only present when the method's own document column is nil. The first
//! record stores its IL offset and start position as absolute values; later visible points
//! store signed deltas relative to the previous visible point. `ΔColumns` is unsigned when
//! `ΔLines` is zero. Hidden points carry the reserved line `0xFEEFEE`.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use corscope::metadata::{sequencepoints::SequencePointIndex, token::Token};
//!
//! let documents: Vec<Arc<str>> = vec![Arc::from("/src/Program.cs")];
//! // LocalSignature=0, point at IL 0: lines 10..10, columns 9..24
//! let blob = [0x00, 0x00, 0x00, 0x0F, 0x0A, 0x09];
//! let index = SequencePointIndex::from_portable_pdb(Token::new(0x0600_0001), &blob, Some(1), &documents)?;
//! let point = index.lookup(0x04).unwrap();
//! assert_eq!((point.start_line, point.start_column, point.end_column), (10, 9, 24));
//! # Ok::<(), corscope::Error>(())
//! ```

use std::{ops::Range, sync::Arc};

use crate::{blob::Parser, metadata::token::Token, Result};

/// Line number the compilers emit for IL with no user-visible source.
pub const HIDDEN_LINE: u32 = 0x00FE_EFEE;

/// End of the last step range of a method.
pub const END_OF_METHOD: u32 = i32::MAX as u32;

/// One IL offset to source range mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequencePoint {
    /// IL offset within the method
    pub offset: u32,
    /// First line, 1-based
    pub start_line: u32,
    /// First column, 1-based
    pub start_column: u32,
    /// Last line
    pub end_line: u32,
    /// Column after the last character
    pub end_column: u32,
    /// Owning document, by URL
    pub document: Arc<str>,
}

impl SequencePoint {
    /// Returns true for the reserved no-source line.
    #[must_use]
    pub fn is_special(&self) -> bool {
        self.start_line == HIDDEN_LINE
    }

    /// Returns true if `(line, column)` in `document` lies within this point.
    ///
    /// The document comparison ignores ASCII case. At the start line only columns before
    /// `start_column` are rejected; at the end line only columns after `end_column`.
    #[must_use]
    pub fn is_inside(&self, document: &str, line: u32, column: u32) -> bool {
        if !self.document.eq_ignore_ascii_case(document) {
            return false;
        }
        if line < self.start_line || (line == self.start_line && column < self.start_column) {
            return false;
        }
        if line > self.end_line || (line == self.end_line && column > self.end_column) {
            return false;
        }
        true
    }

    /// Returns true if this point contains the start position of `other`.
    #[must_use]
    pub fn contains_start_of(&self, other: &SequencePoint) -> bool {
        self.is_inside(&other.document, other.start_line, other.start_column)
    }

    /// Returns true if both points belong to the same document.
    #[must_use]
    pub fn same_document(&self, document: &str) -> bool {
        self.document.eq_ignore_ascii_case(document)
    }
}

/// Parallel per-point arrays as produced by a symbol reader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequencePointArrays {
    /// IL offsets
    pub offsets: Vec<u32>,
    /// Document URL of each point
    pub documents: Vec<Arc<str>>,
    /// Start lines
    pub lines: Vec<u32>,
    /// Start columns
    pub columns: Vec<u32>,
    /// End lines
    pub end_lines: Vec<u32>,
    /// End columns
    pub end_columns: Vec<u32>,
}

/// The sorted sequence points of one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencePointIndex {
    method: Token,
    points: Vec<SequencePoint>,
}

impl SequencePointIndex {
    /// Build an index; points are ordered by offset, keeping the reader's order for ties.
    #[must_use]
    pub fn new(method: Token, mut points: Vec<SequencePoint>) -> Self {
        points.sort_by_key(|point| point.offset);
        SequencePointIndex { method, points }
    }

    /// Build an index from parallel arrays.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the arrays differ in length.
    pub fn from_arrays(method: Token, arrays: &SequencePointArrays) -> Result<Self> {
        let count = arrays.offsets.len();
        let lengths = [
            arrays.documents.len(),
            arrays.lines.len(),
            arrays.columns.len(),
            arrays.end_lines.len(),
            arrays.end_columns.len(),
        ];
        if lengths.iter().any(|len| *len != count) {
            return Err(malformed_error!(
                "Sequence point arrays of {} differ in length - {} vs {:?}",
                method,
                count,
                lengths
            ));
        }

        let points = (0..count)
            .map(|i| SequencePoint {
                offset: arrays.offsets[i],
                start_line: arrays.lines[i],
                start_column: arrays.columns[i],
                end_line: arrays.end_lines[i],
                end_column: arrays.end_columns[i],
                document: arrays.documents[i].clone(),
            })
            .collect();

        Ok(SequencePointIndex::new(method, points))
    }

    /// Parse a Portable PDB sequence point blob.
    ///
    /// `initial_document` is the method's document row, `None` if the column is nil and the
    /// blob header names it. `documents[n - 1]` is the URL of document row `n`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown document rows or non-monotonic
    /// offsets, and cursor errors for truncated blobs.
    pub fn from_portable_pdb(
        method: Token,
        blob: &[u8],
        initial_document: Option<u32>,
        documents: &[Arc<str>],
    ) -> Result<Self> {
        let document_url = |row: u32| -> Result<Arc<str>> {
            row.checked_sub(1)
                .and_then(|index| documents.get(index as usize))
                .cloned()
                .ok_or_else(|| malformed_error!("Unknown document row {}", row))
        };

        let mut parser = Parser::new(blob);
        let _local_signature = parser.read_compressed_uint()?;
        let mut document = match initial_document {
            Some(row) => document_url(row)?,
            None => document_url(parser.read_compressed_uint()?)?,
        };

        let mut points = Vec::new();
        let mut offset = 0u32;
        let mut previous_visible: Option<(u32, u32)> = None;
        let mut first = true;

        while parser.has_more_data() {
            let offset_delta = parser.read_compressed_uint()?;
            if offset_delta == 0 && !first {
                document = document_url(parser.read_compressed_uint()?)?;
                continue;
            }

            offset = if first {
                offset_delta
            } else {
                offset
                    .checked_add(offset_delta)
                    .ok_or_else(|| malformed_error!("IL offset overflow in {}", method))?
            };
            first = false;

            let delta_lines = parser.read_compressed_uint()?;
            let delta_columns = if delta_lines == 0 {
                i64::from(parser.read_compressed_uint()?)
            } else {
                i64::from(parser.read_compressed_int()?)
            };

            if delta_lines == 0 && delta_columns == 0 {
                points.push(SequencePoint {
                    offset,
                    start_line: HIDDEN_LINE,
                    start_column: 0,
                    end_line: HIDDEN_LINE,
                    end_column: 0,
                    document: document.clone(),
                });
                continue;
            }

            let (start_line, start_column) = match previous_visible {
                None => (parser.read_compressed_uint()?, parser.read_compressed_uint()?),
                Some((line, column)) => {
                    let line = i64::from(line) + i64::from(parser.read_compressed_int()?);
                    let column = i64::from(column) + i64::from(parser.read_compressed_int()?);
                    (clamp_position(line)?, clamp_position(column)?)
                }
            };
            previous_visible = Some((start_line, start_column));

            points.push(SequencePoint {
                offset,
                start_line,
                start_column,
                end_line: start_line.saturating_add(delta_lines),
                end_column: clamp_position(i64::from(start_column) + delta_columns)?,
                document: document.clone(),
            });
        }

        Ok(SequencePointIndex::new(method, points))
    }

    /// The method these points belong to.
    #[must_use]
    pub fn method(&self) -> Token {
        self.method
    }

    /// All points, ordered by offset.
    #[must_use]
    pub fn points(&self) -> &[SequencePoint] {
        &self.points
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the method has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The last point at or before `offset`, special or not.
    #[must_use]
    pub fn point_at(&self, offset: u32) -> Option<&SequencePoint> {
        let count = self.points.partition_point(|point| point.offset <= offset);
        count.checked_sub(1).map(|index| &self.points[index])
    }

    /// The nearest point with source for `offset`.
    ///
    /// Walks backward from the last point at or before `offset` past special points; if none
    /// is found, the first visible point after `offset` is returned.
    #[must_use]
    pub fn lookup(&self, offset: u32) -> Option<&SequencePoint> {
        let count = self.points.partition_point(|point| point.offset <= offset);
        self.points[..count]
            .iter()
            .rev()
            .find(|point| !point.is_special())
            .or_else(|| self.points[count..].iter().find(|point| !point.is_special()))
    }

    /// Points containing `(line, column)` in `document`, in offset order.
    #[must_use]
    pub fn find_containing(&self, document: &str, line: u32, column: u32) -> Vec<&SequencePoint> {
        self.points
            .iter()
            .filter(|point| point.is_inside(document, line, column))
            .collect()
    }

    /// The IL range a source-level step from `offset` must cover.
    ///
    /// The range runs from the offset of the point before the first point past `offset` (or
    /// 0) to that point's offset; past the last point it runs to [`END_OF_METHOD`].
    #[must_use]
    pub fn step_range(&self, offset: u32) -> Option<Range<u32>> {
        match self.points.iter().position(|point| point.offset > offset) {
            Some(0) => Some(0..self.points[0].offset),
            Some(next) => Some(self.points[next - 1].offset..self.points[next].offset),
            None => self
                .points
                .last()
                .map(|last| last.offset..END_OF_METHOD),
        }
    }
}

fn clamp_position(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| malformed_error!("Source position out of range - {}", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(offset: u32, line: u32, column: u32, end_line: u32, end_column: u32) -> SequencePoint {
        SequencePoint {
            offset,
            start_line: line,
            start_column: column,
            end_line,
            end_column,
            document: Arc::from("/src/a.cs"),
        }
    }

    fn index() -> SequencePointIndex {
        SequencePointIndex::new(
            Token::new(0x0600_0001),
            vec![
                point(0x00, 10, 5, 10, 6),
                point(0x01, 11, 9, 11, 30),
                point(0x0A, HIDDEN_LINE, 0, HIDDEN_LINE, 0),
                point(0x10, 12, 9, 12, 20),
                point(0x18, 13, 5, 13, 6),
            ],
        )
    }

    #[test]
    fn find_containing_positions() {
        let index = index();
        let offsets = |line, column| -> Vec<u32> {
            index
                .find_containing("/src/a.cs", line, column)
                .iter()
                .map(|point| point.offset)
                .collect()
        };

        assert_eq!(offsets(11, 15), vec![0x01]);
        assert_eq!(offsets(12, 9), vec![0x10]);
        assert_eq!(offsets(12, 20), vec![0x10]);
        assert!(offsets(12, 21).is_empty());
        assert!(offsets(12, 8).is_empty());
        assert!(offsets(20, 1).is_empty());
        assert!(index.find_containing("/src/b.cs", 11, 15).is_empty());
    }

    #[test]
    fn find_containing_overlapping_points() {
        let index = SequencePointIndex::new(
            Token::new(0x0600_0002),
            vec![
                point(0x00, 20, 9, 24, 10),
                point(0x06, 22, 13, 22, 40),
                point(0x0C, 22, 20, 22, 30),
            ],
        );

        let found = index.find_containing("/src/a.cs", 22, 25);
        let offsets: Vec<u32> = found.iter().map(|point| point.offset).collect();
        assert_eq!(offsets, vec![0x00, 0x06, 0x0C]);

        let innermost = found
            .iter()
            .copied()
            .reduce(|best, point| if best.contains_start_of(point) { point } else { best })
            .unwrap();
        assert_eq!(innermost.offset, 0x0C);
        assert_eq!(index.find_containing("/src/a.cs", 22, 15).len(), 2);
    }

    #[test]
    fn containment_edges() {
        let sp = point(0, 12, 9, 14, 20);
        assert!(sp.is_inside("/src/a.cs", 12, 9));
        assert!(!sp.is_inside("/src/a.cs", 12, 8));
        assert!(sp.is_inside("/src/a.cs", 13, 0));
        assert!(sp.is_inside("/src/a.cs", 14, 20));
        assert!(!sp.is_inside("/src/a.cs", 14, 21));
        assert!(!sp.is_inside("/src/a.cs", 11, 50));
        assert!(sp.is_inside("/SRC/A.CS", 12, 10));
        assert!(!sp.is_inside("/src/b.cs", 12, 10));
    }

    #[test]
    fn lookup_skips_special_points() {
        let index = index();
        assert_eq!(index.lookup(0x05).unwrap().start_line, 11);
        assert_eq!(index.lookup(0x0C).unwrap().start_line, 11);
        assert!(index.point_at(0x0C).unwrap().is_special());
        assert_eq!(index.lookup(0x40).unwrap().start_line, 13);
    }

    #[test]
    fn lookup_walks_forward_when_nothing_before() {
        let index = SequencePointIndex::new(
            Token::new(0x0600_0002),
            vec![
                point(0x00, HIDDEN_LINE, 0, HIDDEN_LINE, 0),
                point(0x06, 20, 1, 20, 10),
            ],
        );
        assert_eq!(index.lookup(0x02).unwrap().start_line, 20);
        assert!(index.point_at(0x02).unwrap().is_special());
    }

    #[test]
    fn step_ranges() {
        let index = index();
        assert_eq!(index.step_range(0x00), Some(0x00..0x01));
        assert_eq!(index.step_range(0x05), Some(0x01..0x0A));
        assert_eq!(index.step_range(0x12), Some(0x10..0x18));
        assert_eq!(index.step_range(0x30), Some(0x18..END_OF_METHOD));

        let empty = SequencePointIndex::new(Token::new(0x0600_0003), Vec::new());
        assert_eq!(empty.step_range(0), None);
    }

    #[test]
    fn arrays_must_agree() {
        let mut arrays = SequencePointArrays {
            offsets: vec![4, 0],
            documents: vec![Arc::from("a.cs"), Arc::from("a.cs")],
            lines: vec![2, 1],
            columns: vec![1, 1],
            end_lines: vec![2, 1],
            end_columns: vec![5, 5],
        };
        let index = SequencePointIndex::from_arrays(Token::new(0x0600_0001), &arrays).unwrap();
        assert_eq!(index.points()[0].start_line, 1);

        arrays.end_columns.pop();
        assert!(SequencePointIndex::from_arrays(Token::new(0x0600_0001), &arrays).is_err());
    }

    #[test]
    fn portable_pdb_blob() {
        let documents: Vec<Arc<str>> = vec![Arc::from("/src/a.cs"), Arc::from("/src/b.cs")];
        let blob = [
            0x00, // local signature
            0x01, // initial document
            0x00, 0x00, 0x04, 0x0A, 0x05, // IL 0: line 10, columns 5..9
            0x03, 0x00, 0x00, // IL 3: hidden
            0x02, 0x02, 0x06, 0x04, 0x04, // IL 5: lines 12..14, start column 7, end column 10
            0x00, 0x02, // document 2
            0x01, 0x00, 0x02, 0x02, 0x7F, // IL 6: line 13, column 6..8
        ];

        let index =
            SequencePointIndex::from_portable_pdb(Token::new(0x0600_0001), &blob, None, &documents)
                .unwrap();
        let points = index.points();
        assert_eq!(points.len(), 4);

        assert_eq!(points[0].offset, 0);
        assert_eq!((points[0].start_line, points[0].start_column), (10, 5));
        assert_eq!((points[0].end_line, points[0].end_column), (10, 9));

        assert!(points[1].is_special());
        assert_eq!(points[1].offset, 3);

        assert_eq!(points[2].offset, 5);
        assert_eq!((points[2].start_line, points[2].start_column), (12, 7));
        assert_eq!((points[2].end_line, points[2].end_column), (14, 10));

        assert_eq!(points[3].offset, 6);
        assert_eq!(&*points[3].document, "/src/b.cs");
        assert_eq!((points[3].start_line, points[3].start_column), (13, 6));
        assert_eq!(points[3].end_column, 8);
    }

    #[test]
    fn portable_pdb_unknown_document() {
        let documents: Vec<Arc<str>> = vec![Arc::from("/src/a.cs")];
        assert!(SequencePointIndex::from_portable_pdb(
            Token::new(0x0600_0001),
            &[0x00, 0x05, 0x00, 0x00, 0x01, 0x01, 0x01],
            None,
            &documents
        )
        .is_err());
    }
}
