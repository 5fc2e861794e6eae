use stratum_errors::Diagnostic;
use text_size::{TextRange, TextSize};

use crate::tree::Tree;

/// Lists the error nodes of `tree` as diagnostics, in document order.
/// Empty error nodes mark places where something was missing.
pub fn collect_diagnostics(tree: &Tree) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    tree.iterate(
        0,
        tree.length(),
        |node| {
            if node.ty().is_error() {
                let range = TextRange::new(TextSize::new(node.from()), TextSize::new(node.to()));
                let message = if range.is_empty() { "missing syntax" } else { "unexpected input" };
                diagnostics.push(Diagnostic::error(message, range));
            }
            true
        },
        |_| {},
    );
    diagnostics
}
