use stratum_tree::{DEFAULT_BUFFER_LENGTH, DEFAULT_LOOK_AHEAD_MARGIN};

/// Tuning knobs of the parser. The recovery and pruning thresholds are
/// heuristics; changing them changes which error recovery wins, never
/// whether a tree is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseConfig {
    /// Maximum length of a node stored in a flat tree buffer. Incremental
    /// reuse only kicks in for documents longer than four times this.
    pub buffer_length: u32,
    /// Fail with [`stratum_errors::Error::NoParse`] instead of recovering.
    pub strict: bool,
    pub max_stack_count: usize,
    /// Number of rounds recovery stays active after it starts.
    pub recover_distance: u32,
    pub max_remaining_per_step: usize,
    /// Stacks whose buffers both exceed this length are pruned against
    /// each other even when their states differ.
    pub min_buffer_length_prune: usize,
    pub force_reduce_limit: usize,
    /// Stack depth (in frames) that triggers forced reductions...
    pub cut_depth: usize,
    /// ...down to this depth.
    pub cut_to: usize,
    pub max_left_assoc_reductions: u32,
    /// Reductions at least this long count towards the left-associative
    /// reduction limit.
    pub min_big_reduction: u32,
    /// Look-ahead closer than this to a token end is not recorded.
    pub lookahead_margin: u32,
    pub insert_penalty: i32,
    pub delete_penalty: i32,
    pub reduce_penalty: i32,
    pub max_insert_states: usize,
    pub max_insert_stack_depth: usize,
    pub dampen_insert_stack_depth: usize,
}

impl ParseConfig {
    pub const DEFAULT: Self = Self {
        buffer_length: DEFAULT_BUFFER_LENGTH,
        strict: false,
        max_stack_count: 12,
        recover_distance: 5,
        max_remaining_per_step: 3,
        min_buffer_length_prune: 500,
        force_reduce_limit: 10,
        cut_depth: 2800,
        cut_to: 2000,
        max_left_assoc_reductions: 300,
        min_big_reduction: 2000,
        lookahead_margin: DEFAULT_LOOK_AHEAD_MARGIN,
        insert_penalty: 200,
        delete_penalty: 190,
        reduce_penalty: 100,
        max_insert_states: 4,
        max_insert_stack_depth: 100,
        dampen_insert_stack_depth: 40,
    };

    pub const fn with_buffer_length(mut self, buffer_length: u32) -> Self {
        self.buffer_length = buffer_length;
        self
    }

    pub const fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub const fn with_max_stack_count(mut self, count: usize) -> Self {
        self.max_stack_count = count;
        self
    }

    pub const fn with_recover_distance(mut self, distance: u32) -> Self {
        self.recover_distance = distance;
        self
    }

    pub const fn with_cut_depth(mut self, cut_depth: usize, cut_to: usize) -> Self {
        self.cut_depth = cut_depth;
        self.cut_to = cut_to;
        self
    }

    pub const fn with_big_reductions(mut self, min_size: u32, max_count: u32) -> Self {
        self.min_big_reduction = min_size;
        self.max_left_assoc_reductions = max_count;
        self
    }

    pub const fn with_lookahead_margin(mut self, margin: u32) -> Self {
        self.lookahead_margin = margin;
        self
    }

    /// Sets the score penalties for inserting a token, deleting input, and
    /// forcing an invalid reduction.
    pub const fn with_penalties(mut self, insert: i32, delete: i32, reduce: i32) -> Self {
        self.insert_penalty = insert;
        self.delete_penalty = delete;
        self.reduce_penalty = reduce;
        self
    }
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
