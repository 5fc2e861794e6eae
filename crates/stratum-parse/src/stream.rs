use std::borrow::Cow;

use stratum_inputs::{Input, TextRange};

/// The token a tokenizer is building. Positions are document offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TokenState {
    pub(crate) start: u32,
    pub(crate) value: Option<u32>,
    pub(crate) end: u32,
    /// One past the furthest position read while scanning.
    pub(crate) look_ahead: u32,
}

impl TokenState {
    fn new(start: u32) -> Self {
        Self { start, value: None, end: start, look_ahead: start + 1 }
    }
}

/// A character reader over the parsed ranges of a document, handed to
/// tokenizers. Gaps between ranges are invisible: advancing past the end of
/// one range continues at the start of the next.
pub struct InputStream<'a> {
    input: &'a dyn Input,
    ranges: Box<[(u32, u32)]>,
    range_index: usize,
    pos: u32,
    next: Option<char>,
    end: u32,
    pub(crate) token: TokenState,
}

impl<'a> InputStream<'a> {
    /// `ranges` must be sorted and non-empty.
    pub(crate) fn new(input: &'a dyn Input, ranges: &[TextRange]) -> Self {
        let ranges: Box<[(u32, u32)]> =
            ranges.iter().map(|r| (u32::from(r.start()), u32::from(r.end()))).collect();
        let pos = ranges[0].0;
        let end = ranges[ranges.len() - 1].1;
        let mut stream =
            Self { input, ranges, range_index: 0, pos, next: None, end, token: TokenState::new(pos) };
        stream.read_next();
        stream
    }

    /// The character at the current position, `None` at the end of input.
    pub fn next(&self) -> Option<char> {
        self.next
    }

    pub fn pos(&self) -> u32 {
        self.pos
    }

    /// End of the last parsed range.
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Where the token being read starts.
    pub fn token_start(&self) -> u32 {
        self.token.start
    }

    /// Moves past the current character and returns the new one.
    pub fn advance(&mut self) -> Option<char> {
        let next = self.next?;
        let (_, range_to) = self.ranges[self.range_index];
        self.pos += next.len_utf8() as u32;
        if self.pos >= range_to {
            if self.range_index == self.ranges.len() - 1 {
                return self.set_done();
            }
            self.range_index += 1;
            self.pos = self.ranges[self.range_index].0;
        }
        if self.pos >= self.token.look_ahead {
            self.token.look_ahead = self.pos + 1;
        }
        self.read_next()
    }

    /// Looks `n` characters past the current one without moving.
    pub fn peek(&mut self, n: usize) -> Option<char> {
        let mut pos = self.pos;
        let mut index = self.range_index;
        for _ in 0..n {
            let ch = self.char_at(pos, index)?;
            pos += ch.len_utf8() as u32;
            if pos >= self.ranges[index].1 {
                index += 1;
                pos = self.ranges.get(index)?.0;
            }
        }
        let ch = self.char_at(pos, index)?;
        if pos >= self.token.look_ahead {
            self.token.look_ahead = pos + 1;
        }
        Some(ch)
    }

    /// Accepts a token of type `term` ending at the current position.
    pub fn accept_token(&mut self, term: u32) {
        self.token.value = Some(term);
        self.token.end = self.pos;
    }

    /// Accepts a token of type `term` ending at `end`.
    pub fn accept_token_to(&mut self, term: u32, end: u32) {
        self.token.value = Some(term);
        self.token.end = end;
    }

    /// Reads the text between two document positions, leaving out the gaps
    /// between parsed ranges.
    pub fn read(&self, from: u32, to: u32) -> Cow<'a, str> {
        let (range_from, range_to) = self.ranges[self.range_index];
        if from >= range_from && to <= range_to {
            return self.input.read(from, to);
        }
        let mut result = String::new();
        for &(start, end) in self.ranges.iter() {
            if start >= to {
                break;
            }
            if end > from {
                result.push_str(&self.input.read(start.max(from), end.min(to)));
            }
        }
        Cow::Owned(result)
    }

    /// Moves to `pos` and starts a fresh token there.
    pub(crate) fn reset(&mut self, pos: u32) -> &mut Self {
        self.token = TokenState::new(pos);
        if self.pos != pos {
            self.pos = pos;
            if pos >= self.end {
                self.set_done();
                return self;
            }
            while pos < self.ranges[self.range_index].0 && self.range_index > 0 {
                self.range_index -= 1;
            }
            while pos >= self.ranges[self.range_index].1 {
                self.range_index += 1;
            }
            self.read_next();
        }
        self
    }

    /// Moves `pos` into the parsed ranges.
    pub(crate) fn clip_pos(&self, pos: u32) -> u32 {
        let (from, to) = self.ranges[self.range_index];
        if pos >= from && pos < to {
            return pos;
        }
        self.ranges.iter().find(|&&(_, to)| to > pos).map_or(self.end, |&(from, _)| pos.max(from))
    }

    /// The position after the character at `pos`, used to skip one
    /// character of unrecognized input.
    pub(crate) fn char_end(&self, pos: u32) -> u32 {
        let width = self.input.chunk(pos).chars().next().map_or(1, char::len_utf8);
        self.clip_pos(pos + width as u32).min(self.end)
    }

    fn char_at(&self, pos: u32, index: usize) -> Option<char> {
        if pos >= self.ranges[index].1 {
            return None;
        }
        self.input.chunk(pos).chars().next()
    }

    fn read_next(&mut self) -> Option<char> {
        self.next = self.char_at(self.pos, self.range_index);
        self.next
    }

    fn set_done(&mut self) -> Option<char> {
        self.pos = self.end;
        self.range_index = self.ranges.len() - 1;
        self.next = None;
        None
    }
}

#[cfg(test)]
mod tests {
    use stratum_inputs::{ChunkedInput, TextSize};

    use super::*;

    fn range(from: u32, to: u32) -> TextRange {
        TextRange::new(TextSize::new(from), TextSize::new(to))
    }

    #[test]
    fn reads_across_chunks() {
        let input = ChunkedInput::new(["ab", "cé", "d"]);
        let mut stream = InputStream::new(&input, &[range(0, input.len())]);
        let mut seen = String::new();
        while let Some(ch) = stream.next() {
            seen.push(ch);
            stream.advance();
        }
        assert_eq!(seen, "abcéd");
        assert_eq!(stream.pos(), 6);
    }

    #[test]
    fn skips_gaps_between_ranges() {
        let text = "one two three";
        let mut stream = InputStream::new(&text, &[range(0, 3), range(8, 13)]);
        let mut seen = String::new();
        while let Some(ch) = stream.next() {
            seen.push(ch);
            stream.advance();
        }
        assert_eq!(seen, "onethree");
        assert_eq!(stream.read(1, 10), "neth");
        assert_eq!(stream.clip_pos(5), 8);
        assert_eq!(stream.clip_pos(20), 13);
    }

    #[test]
    fn peeking_records_look_ahead() {
        let text = "abcdef";
        let mut stream = InputStream::new(&text, &[range(0, 6)]);
        stream.reset(1);
        assert_eq!(stream.peek(2), Some('d'));
        assert_eq!(stream.token.look_ahead, 4);
        assert_eq!(stream.next(), Some('b'));
        stream.accept_token(7);
        assert_eq!(stream.token.value, Some(7));
        assert_eq!(stream.token.end, 1);
        assert_eq!(stream.peek(9), None);
    }

    #[test]
    fn char_end_respects_multibyte_characters() {
        let text = "aéb";
        let stream = InputStream::new(&text, &[range(0, 4)]);
        assert_eq!(stream.char_end(1), 3);
        assert_eq!(stream.char_end(3), 4);
    }
}
