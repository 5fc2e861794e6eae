//! Text sources and edit descriptions consumed by the parser.
//!
//! The parser never assumes one contiguous string: it only asks an [`Input`]
//! for the chunk starting at a position. Offsets are UTF-8 byte offsets.

use std::borrow::Cow;

use stratum_errors::{Error, Result};
pub use text_size::{TextRange, TextSize};

/// Read-only view of a document. The content must not change while a parse
/// that reads it is alive.
pub trait Input {
    /// Length of the document in bytes.
    fn len(&self) -> u32;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the text starting at `pos` up to the end of the chunk that
    /// contains it. Must be non-empty when `pos < len()`. `pos` must be a
    /// char boundary.
    fn chunk(&self, pos: u32) -> &str;

    /// Whether `pos` lies between two chars (or at either end).
    fn is_char_boundary(&self, pos: u32) -> bool;

    /// Whether chunk boundaries always fall on line breaks.
    fn line_chunks(&self) -> bool {
        false
    }

    /// Reads the text between `from` and `to`.
    fn read(&self, from: u32, to: u32) -> Cow<'_, str> {
        let mut pos = from;
        let mut result = String::new();
        while pos < to {
            let chunk = self.chunk(pos);
            if chunk.is_empty() {
                break;
            }
            let take = chunk.len().min((to - pos) as usize);
            result.push_str(&chunk[..take]);
            pos += take as u32;
        }
        Cow::Owned(result)
    }
}

impl Input for str {
    fn len(&self) -> u32 {
        str::len(self) as u32
    }

    fn chunk(&self, pos: u32) -> &str {
        &self[pos as usize..]
    }

    fn is_char_boundary(&self, pos: u32) -> bool {
        str::is_char_boundary(self, pos as usize)
    }

    fn read(&self, from: u32, to: u32) -> Cow<'_, str> {
        Cow::Borrowed(&self[from as usize..to as usize])
    }
}

impl Input for String {
    fn len(&self) -> u32 {
        self.as_str().len() as u32
    }

    fn chunk(&self, pos: u32) -> &str {
        &self[pos as usize..]
    }

    fn is_char_boundary(&self, pos: u32) -> bool {
        self.as_str().is_char_boundary(pos as usize)
    }

    fn read(&self, from: u32, to: u32) -> Cow<'_, str> {
        Cow::Borrowed(&self[from as usize..to as usize])
    }
}

impl<T: Input + ?Sized> Input for &T {
    fn len(&self) -> u32 {
        (**self).len()
    }

    fn chunk(&self, pos: u32) -> &str {
        (**self).chunk(pos)
    }

    fn is_char_boundary(&self, pos: u32) -> bool {
        (**self).is_char_boundary(pos)
    }

    fn line_chunks(&self) -> bool {
        (**self).line_chunks()
    }

    fn read(&self, from: u32, to: u32) -> Cow<'_, str> {
        (**self).read(from, to)
    }
}

/// A document stored as a sequence of pieces, like the leaves of a rope.
#[derive(Debug, Clone, Default)]
pub struct ChunkedInput {
    pieces: Vec<Box<str>>,
    /// Start offset of every piece.
    starts: Vec<u32>,
    len: u32,
}

impl ChunkedInput {
    pub fn new<I, S>(pieces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Box<str>>,
    {
        let mut input = Self::default();
        for piece in pieces {
            let piece = piece.into();
            if piece.is_empty() {
                continue;
            }
            input.starts.push(input.len);
            input.len += piece.len() as u32;
            input.pieces.push(piece);
        }
        input
    }

    /// Splits `text` into pieces of at most `size` bytes, on char boundaries.
    pub fn split(text: &str, size: usize) -> Self {
        let mut pieces = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            let mut at = size.max(1).min(rest.len());
            while !rest.is_char_boundary(at) {
                at += 1;
            }
            let (piece, tail) = rest.split_at(at);
            pieces.push(piece);
            rest = tail;
        }
        Self::new(pieces)
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }
}

impl Input for ChunkedInput {
    fn len(&self) -> u32 {
        self.len
    }

    fn chunk(&self, pos: u32) -> &str {
        if pos >= self.len {
            return "";
        }
        let index = self.starts.partition_point(|&start| start <= pos) - 1;
        &self.pieces[index][(pos - self.starts[index]) as usize..]
    }

    fn is_char_boundary(&self, pos: u32) -> bool {
        if pos >= self.len {
            return pos == self.len;
        }
        let index = self.starts.partition_point(|&start| start <= pos) - 1;
        self.pieces[index].is_char_boundary((pos - self.starts[index]) as usize)
    }
}

/// One edit: `[from_a, to_a)` in the old document became `[from_b, to_b)` in
/// the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangedRange {
    pub from_a: u32,
    pub to_a: u32,
    pub from_b: u32,
    pub to_b: u32,
}

impl ChangedRange {
    pub fn new(from_a: u32, to_a: u32, from_b: u32, to_b: u32) -> Self {
        Self { from_a, to_a, from_b, to_b }
    }

    /// An edit replacing `[from, to)` with `inserted` bytes of text.
    pub fn replace(from: u32, to: u32, inserted: u32) -> Self {
        Self { from_a: from, to_a: to, from_b: from, to_b: from + inserted }
    }
}

/// Validates the ranges a parse of `input` is restricted to. An empty list
/// means the whole document.
pub fn check_ranges(ranges: &[TextRange], input: &dyn Input) -> Result<Vec<TextRange>> {
    let len = input.len();
    if ranges.is_empty() {
        return Ok(vec![TextRange::up_to(TextSize::new(len))]);
    }
    let mut prev_end = 0u32;
    for (i, range) in ranges.iter().enumerate() {
        let (from, to) = (u32::from(range.start()), u32::from(range.end()));
        if i > 0 && from < prev_end {
            return Err(Error::InvalidRanges(format!(
                "range {from}..{to} overlaps or precedes the previous range"
            )));
        }
        if to > len {
            return Err(Error::InvalidRanges(format!(
                "range {from}..{to} extends past the end of the document ({len})"
            )));
        }
        if !input.is_char_boundary(from) || !input.is_char_boundary(to) {
            return Err(Error::InvalidRanges(format!("range {from}..{to} splits a character")));
        }
        prev_end = to;
    }
    Ok(ranges.to_vec())
}

/// Checks that `pos` is a position in a document of length `len`.
pub fn check_position(pos: u32, len: u32) -> Result<u32> {
    if pos > len {
        return Err(Error::InvalidPosition { pos, len });
    }
    Ok(pos)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn chunked_input_reads_across_pieces() {
        let input = ChunkedInput::new(["hel", "lo w", "orld"]);
        assert_eq!(input.len(), 11);
        assert_eq!(input.chunk(0), "hel");
        assert_eq!(input.chunk(4), "o w");
        assert_eq!(input.chunk(7), "orld");
        assert_eq!(input.chunk(11), "");
        assert_eq!(input.read(2, 9), "llo wor");
    }

    #[test]
    fn split_respects_char_boundaries() {
        let input = ChunkedInput::split("aé€b", 2);
        let mut text = String::new();
        let mut pos = 0;
        while pos < input.len() {
            let chunk = input.chunk(pos);
            text.push_str(chunk);
            pos += chunk.len() as u32;
        }
        assert_eq!(text, "aé€b");
        assert!(input.piece_count() > 1);
    }

    #[test]
    fn str_input_read_borrows() {
        let text = "abc def";
        assert!(matches!(Input::read(text, 4, 7), Cow::Borrowed("def")));
    }

    #[test]
    fn ranges_are_validated() {
        let text = "0123456789";
        let full = check_ranges(&[], &text).unwrap();
        assert_eq!(full, vec![TextRange::new(0.into(), 10.into())]);

        let overlapping = [TextRange::new(0.into(), 5.into()), TextRange::new(3.into(), 8.into())];
        assert!(matches!(check_ranges(&overlapping, &text), Err(Error::InvalidRanges(_))));

        let past_end = [TextRange::new(2.into(), 12.into())];
        assert!(matches!(check_ranges(&past_end, &text), Err(Error::InvalidRanges(_))));
    }

    #[test]
    fn ranges_must_not_split_characters() {
        let text = "é+1";
        let inside = [TextRange::new(1.into(), 3.into())];
        assert!(matches!(check_ranges(&inside, &text), Err(Error::InvalidRanges(_))));
        let whole = [TextRange::new(0.into(), 3.into())];
        assert_eq!(check_ranges(&whole, &text).unwrap(), whole.to_vec());

        let chunked = ChunkedInput::split("aé€b", 2);
        assert!(!chunked.is_char_boundary(2));
        assert!(chunked.is_char_boundary(3));
        assert!(chunked.is_char_boundary(chunked.len()));
        assert!(!chunked.is_char_boundary(chunked.len() + 1));
        let inside = [TextRange::new(0.into(), 4.into())];
        assert!(matches!(check_ranges(&inside, &chunked), Err(Error::InvalidRanges(_))));
    }

    #[test]
    fn positions_are_checked_against_the_length() {
        assert_eq!(check_position(10, 10), Ok(10));
        assert_eq!(check_position(11, 10), Err(Error::InvalidPosition { pos: 11, len: 10 }));
    }
}
