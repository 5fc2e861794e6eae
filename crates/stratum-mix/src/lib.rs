//! Mixed-language parsing: a host parser's tree gets the trees of nested
//! parsers mounted onto the nodes that contain another language.

mod mixed;
mod mount;
mod skipping;

#[cfg(test)]
mod tests;

pub use mixed::{MixedParse, MixedParser, NestedParse, parse_mixed};
pub use skipping::SkippingParser;
