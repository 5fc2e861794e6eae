use std::collections::VecDeque;

use stratum_errors::{Error, Result};
use stratum_inputs::{Input, TextRange, check_position};
use stratum_tree::{BuildConfig, NodeProp, PartialParse, Subtree, Tree, TreeFragment, build};
use tracing::{debug, trace};

use crate::cache::{MainToken, TokenCache};
use crate::fragments::FragmentCursor;
use crate::grammar::Grammar;
use crate::stack::{ERR, ParseCx, Stack};
use crate::stream::InputStream;
use crate::table::{STATE_ACCEPTING, VALUE_MASK};

/// A parse in progress. Every call to [`PartialParse::advance`] moves all
/// live stacks forward by one token.
pub struct Parse<'a> {
    cx: ParseCx<'a>,
    tokens: TokenCache,
    stacks: Vec<Stack>,
    /// Rounds left before recovery mode ends. Zero when not recovering.
    recovering: u32,
    fragments: Option<FragmentCursor>,
    min_stack_pos: u32,
    stopped_at: Option<u32>,
    doc_len: u32,
}

impl<'a> Parse<'a> {
    /// `ranges` must already be validated and non-empty.
    pub(crate) fn new(
        grammar: Grammar,
        input: &'a dyn Input,
        fragments: &[TreeFragment],
        ranges: &[TextRange],
    ) -> Self {
        let start = u32::from(ranges[0].start());
        let stream = InputStream::new(input, ranges);
        let reuse = !fragments.is_empty()
            && stream.end() - start > grammar.config().buffer_length.saturating_mul(4);
        let fragments = reuse
            .then(|| FragmentCursor::new(fragments.to_vec(), grammar.config().lookahead_margin));
        let tokens = TokenCache::new(&grammar);
        let mut cx = ParseCx::new(grammar, stream, start);
        let top = cx.grammar.top().0;
        let stack = Stack::start(&mut cx, top, start);
        Self {
            cx,
            tokens,
            stacks: vec![stack],
            recovering: 0,
            fragments,
            min_stack_pos: start,
            stopped_at: None,
            doc_len: input.len(),
        }
    }

    /// Runs one step of `stack`: reuses a node, reduces, or applies the
    /// actions of the next token. With `branches`, extra actions fork the
    /// stack; forks that moved go into the first list, the others into the
    /// second. Returns false when the stack cannot continue.
    fn advance_stack(
        &mut self,
        stack: &mut Stack,
        branches: Option<(&mut Vec<Stack>, &mut VecDeque<Stack>)>,
    ) -> bool {
        let start = stack.pos;
        let grammar = self.cx.grammar.clone();
        let tables = grammar.tables();

        if self.stopped_at.is_some_and(|stop| start > stop) {
            return stack.force_reduce(&mut self.cx);
        }

        if let Some(fragments) = &mut self.fragments {
            let strict_hash = match (stack.context, grammar.context()) {
                (Some(context), Some(tracker)) if tracker.strict() => Some(context.hash),
                _ => None,
            };
            let mut cached = fragments.node_at(start);
            while let Some(node) = cached {
                let id = u32::from(node.ty().id());
                let same_type = grammar.node_type(id).is_some_and(|ty| ty == node.ty());
                let target = if same_type { tables.get_goto(stack.state, id, false) } else { None };
                let context_ok = strict_hash.is_none_or(|hash| {
                    node.prop(NodeProp::CONTEXT_HASH).copied().unwrap_or(0) == hash
                });
                if let Some(target) = target.filter(|_| node.length() > 0 && context_ok) {
                    stack.use_node(&mut self.cx, &node, target);
                    debug!(node = node.ty().name(), from = start, to = stack.pos, "reused node");
                    return true;
                }
                cached = match (node.children().first(), node.positions().first()) {
                    (Some(Subtree::Tree(inner)), Some(0)) => Some(inner.clone()),
                    _ => None,
                };
            }
        }

        let default = tables.default_reduce(stack.state);
        if default > 0 {
            stack.reduce(&mut self.cx, default);
            trace!(state = stack.state, term = grammar.term_name(default & VALUE_MASK), "default reduce");
            return true;
        }

        let config = self.cx.config;
        if stack.depth >= config.cut_depth {
            while stack.depth > config.cut_to && stack.force_reduce(&mut self.cx) {}
        }

        let actions = self.tokens.get_actions(stack, &mut self.cx);
        let main_start = self.tokens.main_token.map(|main| main.start);
        let Some((new_stacks, split)) = branches else {
            let Some(action) = actions.first() else { return false };
            stack.apply(&mut self.cx, action.action, action.term, main_start.unwrap_or(stack.pos), action.end);
            return true;
        };
        let Some((last, rest)) = actions.split_last() else { return false };
        for action in rest {
            let mut fork = stack.split(&mut self.cx);
            let token_start = main_start.unwrap_or(fork.pos);
            fork.apply(&mut self.cx, action.action, action.term, token_start, action.end);
            trace!(action = action.action, term = action.term, pos = fork.pos, "split stack");
            if fork.pos > start {
                new_stacks.push(fork);
            } else {
                split.push_back(fork);
            }
        }
        stack.apply(&mut self.cx, last.action, last.term, main_start.unwrap_or(stack.pos), last.end);
        trace!(action = last.action, term = last.term, pos = stack.pos, "apply");
        true
    }

    /// Advances `stack` until it consumes input. Gives the stack back when
    /// it gets stuck first.
    fn advance_fully(&mut self, mut stack: Stack, new_stacks: &mut Vec<Stack>) -> Option<Stack> {
        let pos = stack.pos;
        loop {
            if !self.advance_stack(&mut stack, None) {
                return Some(stack);
            }
            if stack.pos > pos {
                push_stack_dedup(stack, new_stacks, &self.cx);
                return None;
            }
        }
    }

    /// Tries to get stuck stacks going again. Returns a stack to finish the
    /// parse with when one reached the end of the input.
    fn run_recovery(
        &mut self,
        stopped: Vec<(Stack, MainToken)>,
        new_stacks: &mut Vec<Stack>,
    ) -> Option<Stack> {
        let mut finished: Option<Stack> = None;
        let mut restarted = false;
        for (mut stack, token) in stopped {
            if stack.dead_end(&self.cx) {
                if restarted {
                    continue;
                }
                restarted = true;
                stack.restart(&mut self.cx);
                trace!(pos = stack.pos, "restarted stack");
                match self.advance_fully(stack, new_stacks) {
                    None => continue,
                    Some(stuck) => stack = stuck,
                }
            }

            let mut force = stack.split(&mut self.cx);
            for _ in 0..self.cx.config.force_reduce_limit {
                if !force.force_reduce(&mut self.cx) {
                    break;
                }
                trace!(pos = force.pos, state = force.state, "force reduce");
                match self.advance_fully(force, new_stacks) {
                    None => break,
                    Some(stuck) => force = stuck,
                }
            }

            for insert in stack.recover_by_insert(&mut self.cx, token.value) {
                trace!(state = insert.state, "recover by insert");
                let _ = self.advance_fully(insert, new_stacks);
            }

            if self.cx.stream.end() > stack.pos {
                let (mut term, mut end) = (token.value, token.end);
                if end == stack.pos {
                    end = self.cx.stream.char_end(stack.pos);
                    term = ERR;
                }
                stack.recover_by_delete(&mut self.cx, term, end);
                trace!(from = token.start, to = end, "recover by delete");
                push_stack_dedup(stack, new_stacks, &self.cx);
            } else if finished.as_ref().is_none_or(|f| f.score < stack.score) {
                finished = Some(stack);
            }
        }
        finished
    }

    fn stack_to_tree(&mut self, mut stack: Stack) -> Tree {
        stack.close(&mut self.cx);
        let cx = &self.cx;
        let grammar = &cx.grammar;
        let mut config = BuildConfig::new(grammar.node_set(), grammar.top().1 as u16);
        config.max_buffer_length = cx.config.buffer_length;
        config.reused = &cx.reused;
        config.min_repeat_type = grammar.min_repeat_term() as u16;
        config.look_ahead_margin = cx.config.lookahead_margin;
        config.start = cx.start;
        config.length = Some(stack.pos - cx.start);
        let tree = build(stack.buffer_cursor(cx), &config);
        debug!(length = tree.length(), score = stack.score, reused = cx.reused.len(), "finished parse");
        tree
    }

    fn prune(&self, stacks: &mut Vec<Stack>) {
        let cx = &self.cx;
        let min_prune = cx.config.min_buffer_length_prune;
        let mut i = 0;
        'outer: while i + 1 < stacks.len() {
            let mut j = i + 1;
            while j < stacks.len() {
                let (a, b) = (&stacks[i], &stacks[j]);
                let (a_len, b_len) = (a.buffer_len(cx), b.buffer_len(cx));
                if a.same_state(b, cx) || (a_len > min_prune && b_len > min_prune) {
                    let keep_first = if a.score != b.score { a.score > b.score } else { a_len > b_len };
                    if keep_first {
                        stacks.remove(j);
                        continue;
                    }
                    stacks.remove(i);
                    continue 'outer;
                }
                j += 1;
            }
            i += 1;
        }
    }
}

impl PartialParse for Parse<'_> {
    fn advance(&mut self) -> Result<Option<Tree>> {
        let _span = tracing::trace_span!("parse", pos = self.min_stack_pos).entered();
        let mut queue: VecDeque<Stack> = std::mem::take(&mut self.stacks).into();
        let pos = self.min_stack_pos;
        let mut new_stacks: Vec<Stack> = Vec::new();
        let mut stopped: Vec<(Stack, MainToken)> = Vec::new();

        let config = self.cx.config;
        if self.cx.big_reduction_count > config.max_left_assoc_reductions && queue.len() == 1 {
            let stack = &mut queue[0];
            let limit = self.cx.last_big_reduction_start;
            while stack.force_reduce(&mut self.cx)
                && stack.top_start(&self.cx).zip(limit).is_some_and(|(start, limit)| start >= limit)
            {}
            self.cx.big_reduction_count = 0;
            self.cx.last_big_reduction_size = 0;
        }

        while let Some(mut stack) = queue.pop_front() {
            loop {
                self.tokens.main_token = None;
                if stack.pos > pos {
                    new_stacks.push(stack);
                    break;
                }
                if !self.advance_stack(&mut stack, Some((&mut new_stacks, &mut queue))) {
                    let token = self.tokens.main_token(&stack, &self.cx);
                    stopped.push((stack, token));
                    break;
                }
            }
        }
        trace!(pos, live = new_stacks.len(), stopped = stopped.len(), "round");

        if new_stacks.is_empty() {
            let end = self.cx.stream.end();
            let tables = self.cx.grammar.tables();
            let mut best: Option<usize> = None;
            for (i, (stack, _)) in stopped.iter().enumerate() {
                let at_end = stack.pos == end || self.stopped_at.is_some_and(|stop| stack.pos > stop);
                if at_end
                    && tables.has_flag(stack.state, STATE_ACCEPTING)
                    && best.is_none_or(|b| stopped[b].0.score < stack.score)
                {
                    best = Some(i);
                }
            }
            if let Some(best) = best {
                let (stack, _) = stopped.swap_remove(best);
                return Ok(Some(self.stack_to_tree(stack)));
            }
            if config.strict {
                return Err(Error::NoParse { pos });
            }
            if self.recovering == 0 {
                debug!(pos, stacks = stopped.len(), "starting error recovery");
                self.recovering = config.recover_distance;
            }
        }

        if self.recovering > 0 && !stopped.is_empty() {
            let past_stop =
                self.stopped_at.is_some_and(|stop| stopped[0].0.pos > stop);
            let finished = if past_stop {
                Some(stopped.swap_remove(0).0)
            } else {
                self.run_recovery(stopped, &mut new_stacks)
            };
            if let Some(mut finished) = finished {
                finished.force_all(&mut self.cx);
                debug!(pos = finished.pos, "forced finish");
                return Ok(Some(self.stack_to_tree(finished)));
            }
        }

        if self.recovering > 0 {
            let max_remaining = if self.recovering == 1 {
                1
            } else {
                self.recovering as usize * config.max_remaining_per_step
            };
            if new_stacks.len() > max_remaining {
                new_stacks.sort_by(|a, b| b.score.cmp(&a.score));
                new_stacks.truncate(max_remaining);
                debug!(kept = max_remaining, "pruned recovering stacks");
            }
            if new_stacks.iter().any(|s| s.reduce_pos > pos) {
                self.recovering -= 1;
            }
        } else if new_stacks.len() > 1 {
            let before = new_stacks.len();
            self.prune(&mut new_stacks);
            new_stacks.truncate(config.max_stack_count);
            if new_stacks.len() < before {
                debug!(before, after = new_stacks.len(), "merged stacks");
            }
        }

        let Some(min_pos) = new_stacks.iter().map(|s| s.pos).min() else {
            return Err(Error::NoParse { pos });
        };
        self.min_stack_pos = min_pos;
        self.stacks = new_stacks;
        Ok(None)
    }

    fn parsed_pos(&self) -> u32 {
        self.min_stack_pos
    }

    fn stop_at(&mut self, pos: u32) -> Result<()> {
        check_position(pos, self.doc_len)?;
        if let Some(current) = self.stopped_at {
            if current < pos {
                return Err(Error::StopAtMovedForward { current, requested: pos });
            }
        }
        self.stopped_at = Some(pos);
        Ok(())
    }

    fn stopped_at(&self) -> Option<u32> {
        self.stopped_at
    }
}

/// Adds `stack` unless an equivalent one is already there, keeping the
/// better scoring of the two.
fn push_stack_dedup(stack: Stack, new_stacks: &mut Vec<Stack>, cx: &ParseCx<'_>) {
    for other in new_stacks.iter_mut() {
        if other.pos == stack.pos && other.same_state(&stack, cx) {
            if other.score < stack.score {
                *other = stack;
            }
            return;
        }
    }
    new_stacks.push(stack);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use stratum_inputs::TextSize;
    use stratum_tree::{NodeFlags, NodeSet, NodeType, PropMap};

    use super::*;
    use crate::config::ParseConfig;
    use crate::grammar::GrammarSpec;
    use crate::table::{TableBuilder, reduce};
    use crate::tokens::{DfaState, TokenGroup, Tokenizer};

    const SUM: u32 = 1;
    const E: u32 = 2;
    const NUMBER: u32 = 3;
    const PLUS: u32 = 4;
    const EOF: u32 = 5;

    /// Sums of digits. The ambiguous variant keeps both the shift and the
    /// reduction on `+` after a right operand.
    fn sums(ambiguous: bool) -> Grammar {
        let ty = |id, name: &str| NodeType::define(id, name, NodeFlags::empty(), PropMap::new());
        let node_set = NodeSet::new(vec![
            NodeType::define(0, "⚠", NodeFlags::ERROR, PropMap::new()),
            NodeType::define(SUM as u16, "Sum", NodeFlags::TOP, PropMap::new()),
            ty(E as u16, "E"),
            ty(NUMBER as u16, "Number"),
            ty(PLUS as u16, "+"),
        ]);
        let tokenizer = TokenGroup::new(vec![
            DfaState::new(vec![], vec![('0', '9', 1), ('+', '+', 2)]),
            DfaState::new(vec![NUMBER], vec![]),
            DfaState::new(vec![PLUS], vec![]),
        ])
        .unwrap();

        let mut tables = TableBuilder::new();
        let start = tables.state();
        let number = tables.state();
        let left = tables.state();
        let plus = tables.state();
        let right = tables.state();
        tables.shift(start, NUMBER, number).goto(start, E, left);
        tables.default_reduce(number, reduce(E, 1)).forced_reduce(number, reduce(E, 1));
        tables.accepting(left).shift(left, PLUS, plus);
        tables.shift(plus, NUMBER, number).goto(plus, E, right);
        tables.forced_reduce(right, reduce(E, 3));
        if ambiguous {
            tables.shift(right, PLUS, plus).reduce(right, PLUS, E, 3).reduce(right, EOF, E, 3);
        } else {
            tables.default_reduce(right, reduce(E, 3));
        }

        let tokenizers: Vec<Arc<dyn Tokenizer>> = vec![Arc::new(tokenizer)];
        Grammar::new(GrammarSpec::new(tables.finish(), node_set, tokenizers, (start, SUM), EOF)).unwrap()
    }

    /// Parses `text` to completion, calling `round` after every step that
    /// did not finish.
    fn parse_in_rounds(grammar: &Grammar, text: &str, mut round: impl FnMut(&Parse<'_>)) -> Tree {
        let ranges = [TextRange::new(TextSize::new(0), TextSize::new(text.len() as u32))];
        let mut parse = Parse::new(grammar.clone(), &text, &[], &ranges);
        loop {
            if let Some(tree) = parse.advance().unwrap() {
                return tree;
            }
            round(&parse);
        }
    }

    #[test]
    fn live_stacks_are_capped() {
        let text = "1+2+3+4+5+6+7+8+9";
        let grammar = sums(true);
        let mut most = 0;
        let tree = parse_in_rounds(&grammar, text, |parse| most = most.max(parse.stacks.len()));
        assert!(most > 2, "at most {most} stacks were live");

        let capped = grammar.configure(ParseConfig::DEFAULT.with_max_stack_count(2));
        let mut capped_most = 0;
        let capped_tree =
            parse_in_rounds(&capped, text, |parse| capped_most = capped_most.max(parse.stacks.len()));
        assert!(capped_most <= 2, "{capped_most} stacks were live");
        assert_eq!(capped_tree.length(), tree.length());
        assert!(!capped_tree.to_string().contains('⚠'), "{capped_tree}");
    }

    #[test]
    fn long_left_associative_chains_trip_the_reduction_limit() {
        let text = "1+2+3+4+5+6+7+8+9";
        let mut counts = Vec::new();
        let plain = parse_in_rounds(&sums(false), text, |parse| counts.push(parse.cx.big_reduction_count));
        assert!(counts.iter().all(|&count| count == 0), "{counts:?}");

        let limited = sums(false).configure(ParseConfig::DEFAULT.with_big_reductions(4, 2));
        let mut counts = Vec::new();
        let tree = parse_in_rounds(&limited, text, |parse| counts.push(parse.cx.big_reduction_count));
        assert!(counts.windows(2).any(|w| w[0] > 2 && w[1] < w[0]), "{counts:?}");
        assert!(counts.iter().all(|&count| count <= 3), "{counts:?}");
        assert_eq!(tree.to_string(), plain.to_string());
    }

    #[test]
    fn stop_positions_past_the_document_are_rejected() {
        let text = "1+2";
        let ranges = [TextRange::new(TextSize::new(0), TextSize::new(3))];
        let mut parse = Parse::new(sums(false), &text, &[], &ranges);
        assert_eq!(parse.stop_at(4), Err(Error::InvalidPosition { pos: 4, len: 3 }));
        assert_eq!(parse.stopped_at(), None);
        parse.stop_at(3).unwrap();
    }
}
