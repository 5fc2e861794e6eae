//! Error and diagnostic types shared by the parsing crates.
//!
//! Configuration problems (bad tables, bad ranges, bad positions) surface as
//! [`Error`] values. Syntax problems never do: they are recorded as error
//! nodes in the produced tree and can be listed as [`Diagnostic`]s.

use std::fmt::Display;

pub use annotate_snippets::Renderer;
use annotate_snippets::{Level, Snippet};
pub use text_size::TextRange;

/// Errors raised synchronously to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("parse table version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("malformed parse table: {0}")]
    MalformedTable(String),

    #[error("invalid parse ranges: {0}")]
    InvalidRanges(String),

    #[error("position {pos} is outside of the document (length {len})")]
    InvalidPosition { pos: u32, len: u32 },

    #[error("can't move the stop position forward (from {current} to {requested})")]
    StopAtMovedForward { current: u32, requested: u32 },

    #[error("no parse at {pos}")]
    NoParse { pos: u32 },

    #[error("unknown term `{0}`")]
    UnknownTerm(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A syntax error located in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    message: String,
    range: TextRange,
}

impl Diagnostic {
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn range(&self) -> TextRange {
        self.range
    }

    pub fn error(message: impl Into<String>, range: TextRange) -> Self {
        Self { message: message.into(), range }
    }

    pub fn render<'a>(
        &'a self,
        renderer: &'a Renderer,
        path: &'a str,
        text: &'a str,
    ) -> impl Display + 'a {
        let message = Level::Error.title(&self.message).snippet(
            Snippet::source(text)
                .origin(path)
                .annotation(Level::Error.span(self.range.into()).label("here"))
                .fold(true),
        );
        renderer.render(message)
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;
    use text_size::TextSize;

    use super::*;

    #[test]
    fn error_messages() {
        let err = Error::VersionMismatch { expected: 1, found: 7 };
        expect!["parse table version mismatch: expected 1, found 7"].assert_eq(&err.to_string());

        let err = Error::StopAtMovedForward { current: 3, requested: 10 };
        expect!["can't move the stop position forward (from 3 to 10)"]
            .assert_eq(&err.to_string());
    }

    #[test]
    fn render_points_at_range() {
        let text = "1 + + 2\n";
        let diagnostic =
            Diagnostic::error("unexpected token", TextRange::at(TextSize::new(4), TextSize::new(1)));
        let rendered = diagnostic.render(&Renderer::plain(), "input.txt", text).to_string();

        assert!(rendered.contains("unexpected token"));
        assert!(rendered.contains("input.txt"));
        assert!(rendered.contains("here"));
    }
}
