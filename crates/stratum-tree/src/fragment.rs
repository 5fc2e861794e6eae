use stratum_errors::{Error, Result};
use stratum_inputs::ChangedRange;

use crate::tree::Tree;

/// Default minimum distance between changes for the text between them to
/// remain reusable.
pub const DEFAULT_MIN_GAP: u32 = 128;

/// A piece of an old tree that is still valid for the range `from..to` of
/// the current document. A node at document position `p` is found at
/// `p + offset` in `tree`.
#[derive(Clone, Debug)]
pub struct TreeFragment {
    pub from: u32,
    pub to: u32,
    pub tree: Tree,
    pub offset: i64,
    open_start: bool,
    open_end: bool,
}

impl TreeFragment {
    pub fn new(from: u32, to: u32, tree: Tree, offset: i64, open_start: bool, open_end: bool) -> Self {
        Self { from, to, tree, offset, open_start, open_end }
    }

    /// Whether the start of the fragment was cut by a change, so nodes
    /// touching it may not be reused.
    pub fn open_start(&self) -> bool {
        self.open_start
    }

    /// Whether the end of the fragment was cut by a change or by a partial
    /// parse.
    pub fn open_end(&self) -> bool {
        self.open_end
    }

    /// Makes a fragment list for a freshly parsed `tree`, keeping the old
    /// fragments that extend past it. `partial` marks a tree that does not
    /// cover the whole document.
    pub fn add_tree(tree: Tree, fragments: &[Self], partial: bool) -> Vec<Self> {
        let length = tree.length();
        let mut result = vec![Self::new(0, length, tree, 0, false, partial)];
        result.extend(fragments.iter().filter(|f| f.to > length).cloned());
        result
    }

    /// Checks that `fragments` can seed a parse of a document of length
    /// `len`: each fragment lies inside the document and inside its tree, and
    /// fragments are sorted by start. A partial tree's fragment may overlap
    /// the fragments after it.
    pub fn check(fragments: &[Self], len: u32) -> Result<()> {
        let mut prev_from = 0;
        for f in fragments {
            let invalid = |why: &str| {
                Err(Error::InvalidRanges(format!("fragment {}..{} {why}", f.from, f.to)))
            };
            if f.from > f.to {
                return invalid("is reversed");
            }
            if f.to > len {
                return invalid(&format!("extends past the end of the document ({len})"));
            }
            if f.from < prev_from {
                return invalid("starts before the previous fragment");
            }
            if i64::from(f.from) + f.offset < 0
                || i64::from(f.to) + f.offset > i64::from(f.tree.length())
            {
                return invalid("does not map into its tree");
            }
            prev_from = f.from;
        }
        Ok(())
    }

    /// Maps fragments through a set of sorted, non-overlapping changes
    /// (expressed in old-document positions for `from_a..to_a`). Parts of
    /// fragments within `min_gap` of a change are dropped.
    pub fn apply_changes(fragments: &[Self], changes: &[ChangedRange], min_gap: u32) -> Vec<Self> {
        if changes.is_empty() {
            return fragments.to_vec();
        }
        let mut result = Vec::new();
        let mut rest = fragments.iter();
        let mut next_fragment = rest.next();
        let mut pos: i64 = 0;
        let mut off: i64 = 0;
        for i in 0..=changes.len() {
            let change = changes.get(i);
            let next_pos = change.map_or(i64::from(u32::MAX), |c| i64::from(c.from_a));
            if next_pos - pos >= i64::from(min_gap) {
                while let Some(fragment) = next_fragment {
                    if i64::from(fragment.from) >= next_pos {
                        break;
                    }
                    let (from, to) = (i64::from(fragment.from), i64::from(fragment.to));
                    let cut = if pos >= from || next_pos <= to || off != 0 {
                        let cut_from = from.max(pos) - off;
                        let cut_to = to.min(next_pos) - off;
                        (cut_from < cut_to).then(|| {
                            Self::new(
                                cut_from as u32,
                                cut_to as u32,
                                fragment.tree.clone(),
                                fragment.offset + off,
                                i > 0,
                                change.is_some(),
                            )
                        })
                    } else {
                        Some(fragment.clone())
                    };
                    result.extend(cut);
                    if to > next_pos {
                        break;
                    }
                    next_fragment = rest.next();
                }
            }
            let Some(change) = change else { break };
            pos = i64::from(change.to_a);
            off = i64::from(change.to_a) - i64::from(change.to_b);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn spans(fragments: &[TreeFragment]) -> Vec<(u32, u32, i64, bool, bool)> {
        fragments.iter().map(|f| (f.from, f.to, f.offset, f.open_start(), f.open_end())).collect()
    }

    fn tree(length: u32) -> Tree {
        Tree::new(crate::NodeType::none(), Vec::new(), Vec::new(), length)
    }

    #[test]
    fn add_tree_covers_the_tree() {
        let fragments = TreeFragment::add_tree(tree(100), &[], false);
        assert_eq!(spans(&fragments), vec![(0, 100, 0, false, false)]);
    }

    #[test]
    fn changes_cut_fragments() {
        let fragments = TreeFragment::add_tree(tree(1000), &[], false);
        // Replace 500..510 with 20 bytes.
        let changed =
            TreeFragment::apply_changes(&fragments, &[ChangedRange::replace(500, 510, 20)], 128);
        assert_eq!(
            spans(&changed),
            vec![(0, 500, 0, false, true), (520, 1010, -10, true, false)]
        );
    }

    #[test]
    fn small_gaps_are_dropped() {
        let fragments = TreeFragment::add_tree(tree(300), &[], false);
        let changes = [ChangedRange::replace(100, 101, 1), ChangedRange::replace(150, 151, 1)];
        let changed = TreeFragment::apply_changes(&fragments, &changes, 128);
        assert_eq!(spans(&changed), vec![(151, 300, 0, true, false)]);
    }

    #[test]
    fn fragments_are_validated() {
        let fragments = TreeFragment::add_tree(tree(100), &[], false);
        assert_eq!(TreeFragment::check(&fragments, 100), Ok(()));
        assert!(matches!(TreeFragment::check(&fragments, 99), Err(Error::InvalidRanges(_))));

        let unsorted = vec![
            TreeFragment::new(50, 60, tree(100), 0, false, false),
            TreeFragment::new(10, 20, tree(100), 0, false, false),
        ];
        assert!(matches!(TreeFragment::check(&unsorted, 100), Err(Error::InvalidRanges(_))));

        let shifted = vec![TreeFragment::new(50, 60, tree(100), 45, false, false)];
        assert!(matches!(TreeFragment::check(&shifted, 100), Err(Error::InvalidRanges(_))));

        let changed =
            TreeFragment::apply_changes(&fragments, &[ChangedRange::replace(40, 50, 2)], 16);
        assert_eq!(TreeFragment::check(&changed, 92), Ok(()));
    }

    #[test]
    fn no_changes_keeps_fragments() {
        let fragments = TreeFragment::add_tree(tree(10), &[], true);
        let changed = TreeFragment::apply_changes(&fragments, &[], 128);
        assert_eq!(spans(&changed), spans(&fragments));
    }
}
