//! Conversion between byte offsets and line/character positions.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Zero-based line/character position. `character` counts bytes from the line start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Zero-based line number.
    pub line: usize,
    /// Zero-based byte offset within the line.
    pub character: usize,
}

impl Position {
    /// Creates a new position.
    #[must_use]
    pub const fn new(line: usize, character: usize) -> Self {
        Self { line, character }
    }
}

impl std::fmt::Display for Position {
    /// Formats as one-based `line:column`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.character + 1)
    }
}

/// Finds the index of an element in a sorted slice.
///
/// The comparator returns [`Ordering::Less`] if the searched element lies
/// before the given one, [`Ordering::Greater`] if it lies after it and
/// [`Ordering::Equal`] on a hit.
pub fn binary_search_index<T>(
    items: &[T],
    mut compare: impl FnMut(&T, usize) -> Ordering,
) -> Option<usize> {
    let mut start = 0;
    let mut end = items.len();
    while start < end {
        let mid = start + (end - start) / 2;
        match compare(&items[mid], mid) {
            Ordering::Less => end = mid,
            Ordering::Greater => start = mid + 1,
            Ordering::Equal => return Some(mid),
        }
    }
    None
}

/// Maps offsets to positions and back for one source text.
///
/// Lines are split on `\n` only; a `\r` before it is part of the line.
#[derive(Debug, Clone)]
pub struct PositionConverter {
    line_starts: Vec<usize>,
    len: usize,
}

impl PositionConverter {
    /// Precomputes line start offsets for `source`.
    #[must_use]
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            line_starts,
            len: source.len(),
        }
    }

    /// Number of lines, counting an empty line after a trailing line break.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// End offset of a line's span, i.e. the next line's start or the text length.
    fn line_end(&self, line: usize) -> usize {
        self.line_starts.get(line + 1).copied().unwrap_or(self.len)
    }

    /// Converts a line/character position to an absolute offset.
    ///
    /// Returns `None` if the line does not exist or the character lies beyond
    /// the line's span (a line's span includes its own line break).
    #[must_use]
    pub fn position_to_offset(&self, position: Position) -> Option<usize> {
        let start = *self.line_starts.get(position.line)?;
        let offset = start.checked_add(position.character)?;
        (offset < self.line_end(position.line)).then_some(offset)
    }

    /// Converts an absolute offset to a line/character position.
    ///
    /// The end of the text maps to the end of the last line; any offset past
    /// it returns `None`.
    #[must_use]
    pub fn offset_to_position(&self, offset: usize) -> Option<Position> {
        if offset == self.len {
            let line = self.line_starts.len() - 1;
            return Some(Position::new(line, offset - self.line_starts[line]));
        }
        let line = binary_search_index(&self.line_starts, |&start, line| {
            if offset < start {
                Ordering::Less
            } else if offset >= self.line_end(line) {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        })?;
        Some(Position::new(line, offset - self.line_starts[line]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "first\nsecond line\n\nlast";

    #[test]
    fn test_binary_search_index() {
        let items = [1, 3, 5, 7, 9];
        assert_eq!(binary_search_index(&items, |v, _| 7.cmp(v)), Some(3));
        assert_eq!(binary_search_index(&items, |v, _| 1.cmp(v)), Some(0));
        assert_eq!(binary_search_index(&items, |v, _| 4.cmp(v)), None);
        assert_eq!(binary_search_index::<i32>(&[], |v, _| 4.cmp(v)), None);
    }

    #[test]
    fn test_offset_to_position() {
        let converter = PositionConverter::new(TEXT);
        assert_eq!(converter.offset_to_position(0), Some(Position::new(0, 0)));
        assert_eq!(converter.offset_to_position(5), Some(Position::new(0, 5)));
        assert_eq!(converter.offset_to_position(6), Some(Position::new(1, 0)));
        assert_eq!(converter.offset_to_position(9), Some(Position::new(1, 3)));
        assert_eq!(converter.offset_to_position(18), Some(Position::new(2, 0)));
        assert_eq!(converter.offset_to_position(19), Some(Position::new(3, 0)));
        assert_eq!(
            converter.offset_to_position(TEXT.len()),
            Some(Position::new(3, 4))
        );
        assert_eq!(converter.offset_to_position(TEXT.len() + 1), None);
    }

    #[test]
    fn test_position_to_offset_bounds() {
        let converter = PositionConverter::new(TEXT);
        assert_eq!(converter.position_to_offset(Position::new(1, 0)), Some(6));
        assert_eq!(converter.position_to_offset(Position::new(2, 0)), Some(18));
        assert_eq!(converter.position_to_offset(Position::new(2, 1)), None);
        assert_eq!(converter.position_to_offset(Position::new(0, 6)), None);
        assert_eq!(converter.position_to_offset(Position::new(3, 3)), Some(22));
        assert_eq!(converter.position_to_offset(Position::new(3, 4)), None);
        assert_eq!(converter.position_to_offset(Position::new(4, 0)), None);
    }

    #[test]
    fn test_round_trip_all_positions() {
        let converter = PositionConverter::new(TEXT);
        for (line, content) in TEXT.split('\n').enumerate() {
            for character in 0..content.len() {
                let position = Position::new(line, character);
                let offset = converter
                    .position_to_offset(position)
                    .expect("valid position");
                assert_eq!(converter.offset_to_position(offset), Some(position));
            }
        }
    }

    #[test]
    fn test_crlf_is_part_of_line() {
        let converter = PositionConverter::new("a\r\nb");
        assert_eq!(converter.line_count(), 2);
        assert_eq!(converter.offset_to_position(1), Some(Position::new(0, 1)));
        assert_eq!(converter.offset_to_position(3), Some(Position::new(1, 0)));
    }

    #[test]
    fn test_display_is_one_based() {
        assert_eq!(Position::new(0, 4).to_string(), "1:5");
    }
}
