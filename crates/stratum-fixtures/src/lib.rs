//! Small grammars with hand-assembled tables, shared by tests and
//! benchmarks.
//!
//! Each module exposes its term ids and a `grammar` constructor. The tables
//! are known to be valid, so the constructors panic instead of returning
//! errors.

use stratum_tree::{NodeFlags, NodeType, PropMap};

pub mod arithmetic;
pub mod keywords;
pub mod list;
pub mod template;

fn node(id: u32, name: &str) -> NodeType {
    NodeType::define(id as u16, name, NodeFlags::empty(), PropMap::new())
}

fn error_node() -> NodeType {
    NodeType::define(0, "⚠", NodeFlags::ERROR, PropMap::new())
}

fn top_node(id: u32, name: &str) -> NodeType {
    NodeType::define(id as u16, name, NodeFlags::TOP, PropMap::new())
}

/// `count` terms, `+`-separated, each a number with one to three digits.
pub fn sum(count: usize) -> String {
    let mut text = String::new();
    for i in 0..count {
        if i > 0 {
            text.push_str(if i % 7 == 0 { " + " } else { "+" });
        }
        text.push_str(&((i * 37) % 1000).to_string());
    }
    text
}
