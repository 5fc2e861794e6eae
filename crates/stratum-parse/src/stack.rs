//! Parse stacks.
//!
//! Frames live in an arena shared by every stack of a parse and are never
//! modified after being pushed, so splitting a stack only copies its top
//! handle. Emitted nodes go into buffer segments, also arena-allocated: a
//! stack appends to its own segment and reads the earlier part of the
//! buffer through the parent chain.

use la_arena::{Arena, Idx};
use stratum_tree::{BufferCursor, CONTEXT_RECORD, LOOK_AHEAD_RECORD, NodeType, Tree};

use crate::config::ParseConfig;
use crate::context::{ContextTracker, StackContext};
use crate::grammar::Grammar;
use crate::stream::InputStream;
use crate::table::{
    GOTO_FLAG, REPEAT_FLAG, SLOT_ACTIONS, SLOT_FORCED_REDUCE, STATE_ACCEPTING, STATE_SKIPPED,
    STAY_FLAG, VALUE_MASK, is_reduce, reduce, reduce_depth,
};

/// The error term, also the id of the error node type.
pub(crate) const ERR: u32 = 0;

#[derive(Debug)]
pub(crate) struct Frame {
    /// State the stack was in before this frame was pushed.
    state: u32,
    start: u32,
    buffer_pos: usize,
    parent: Option<Idx<Frame>>,
}

#[derive(Debug)]
pub(crate) struct BufferSegment {
    data: Vec<i32>,
    /// Buffer position of `data[0]`.
    base: usize,
    parent: Option<Idx<BufferSegment>>,
}

/// State shared by all stacks of one parse.
pub(crate) struct ParseCx<'a> {
    pub(crate) grammar: Grammar,
    pub(crate) config: ParseConfig,
    pub(crate) stream: InputStream<'a>,
    /// Frames and buffer segments are shared between forks and never freed
    /// individually. Both arenas grow for the life of one parse and are
    /// released together when it is dropped, so memory use is linear in the
    /// parsed length plus the work done on discarded forks.
    pub(crate) frames: Arena<Frame>,
    pub(crate) buffers: Arena<BufferSegment>,
    pub(crate) reused: Vec<Tree>,
    /// Start of the first parsed range.
    pub(crate) start: u32,
    pub(crate) big_reduction_count: u32,
    pub(crate) last_big_reduction_start: Option<u32>,
    pub(crate) last_big_reduction_size: u32,
}

impl<'a> ParseCx<'a> {
    pub(crate) fn new(grammar: Grammar, stream: InputStream<'a>, start: u32) -> Self {
        Self {
            config: *grammar.config(),
            grammar,
            stream,
            frames: Arena::new(),
            buffers: Arena::new(),
            reused: Vec::new(),
            start,
            big_reduction_count: 0,
            last_big_reduction_start: None,
            last_big_reduction_size: 0,
        }
    }
}

fn ancestor(frames: &Arena<Frame>, mut frame: Option<Idx<Frame>>, distance: usize) -> Option<Idx<Frame>> {
    for _ in 0..distance {
        frame = frames[frame?].parent;
    }
    frame
}

/// One candidate derivation.
#[derive(Debug)]
pub(crate) struct Stack {
    pub(crate) state: u32,
    top: Option<Idx<Frame>>,
    /// Number of frames below `state`.
    pub(crate) depth: usize,
    /// End of the last non-skipped token, where reductions end.
    pub(crate) reduce_pos: u32,
    pub(crate) pos: u32,
    pub(crate) score: i32,
    buffer: Idx<BufferSegment>,
    pub(crate) context: Option<StackContext>,
    pub(crate) look_ahead: u32,
}

impl Stack {
    pub(crate) fn start(cx: &mut ParseCx<'_>, state: u32, pos: u32) -> Self {
        let buffer = cx.buffers.alloc(BufferSegment { data: Vec::new(), base: 0, parent: None });
        let context =
            cx.grammar.context().map(|tracker| StackContext::new(&**tracker, tracker.start()));
        Self {
            state,
            top: None,
            depth: 0,
            reduce_pos: pos,
            pos,
            score: 0,
            buffer,
            context,
            look_ahead: 0,
        }
    }

    pub(crate) fn view<'s>(&'s self, cx: &'s ParseCx<'_>) -> StackView<'s> {
        StackView::new(self, &cx.frames, &cx.grammar)
    }

    /// Start position of the topmost frame.
    pub(crate) fn top_start(&self, cx: &ParseCx<'_>) -> Option<u32> {
        self.top.map(|top| cx.frames[top].start)
    }

    /// Length of the part of the buffer this stack owns.
    pub(crate) fn buffer_len(&self, cx: &ParseCx<'_>) -> usize {
        cx.buffers[self.buffer].data.len()
    }

    fn buffer_end(&self, cx: &ParseCx<'_>) -> usize {
        let segment = &cx.buffers[self.buffer];
        segment.base + segment.data.len()
    }

    pub(crate) fn push_state(&mut self, cx: &mut ParseCx<'_>, state: u32, start: u32) {
        let buffer_pos = self.buffer_end(cx);
        let frame = Frame { state: self.state, start, buffer_pos, parent: self.top };
        self.top = Some(cx.frames.alloc(frame));
        self.depth += 1;
        self.state = state;
    }

    pub(crate) fn reduce(&mut self, cx: &mut ParseCx<'_>, action: u32) {
        let depth = reduce_depth(action);
        let term = action & VALUE_MASK;

        let look_ahead_record = self.reduce_pos + cx.config.lookahead_margin < self.pos;
        if look_ahead_record {
            self.set_look_ahead(cx, self.pos);
        }
        self.score += cx.grammar.dynamic_precedence(term);

        if depth == 0 {
            // Nothing is popped: the new node is empty and sits on top.
            let state = cx.grammar.tables().get_goto(self.state, term, true).unwrap_or(self.state);
            self.push_state(cx, state, self.reduce_pos);
            if term < cx.grammar.min_repeat_term() {
                let size = if look_ahead_record { 8 } else { 4 };
                self.store_node(cx, term, self.reduce_pos, self.reduce_pos, size, true);
            }
            self.reduce_context(cx, term, self.reduce_pos);
            return;
        }

        // Stay reductions also drop the frame of the skipped content and
        // the frame of the state they return to.
        let stay = action & STAY_FLAG != 0;
        let distance = if stay { depth + 1 } else { depth - 1 };
        let target = ancestor(&cx.frames, self.top, distance);
        let (start, buffer_base) =
            target.map_or((cx.start, 0), |f| (cx.frames[f].start, cx.frames[f].buffer_pos));

        let size = self.reduce_pos.saturating_sub(start);
        if size >= cx.config.min_big_reduction
            && !cx.grammar.node_type(term).is_some_and(NodeType::is_anonymous)
        {
            if cx.last_big_reduction_start == Some(start) {
                cx.big_reduction_count += 1;
                cx.last_big_reduction_size = size;
            } else if cx.last_big_reduction_size < size {
                cx.big_reduction_count = 1;
                cx.last_big_reduction_start = Some(start);
                cx.last_big_reduction_size = size;
            }
        }

        let count = (self.buffer_end(cx) - buffer_base) as i32;
        if term < cx.grammar.min_repeat_term() || action & REPEAT_FLAG != 0 {
            let end = if cx.grammar.tables().has_flag(self.state, STATE_SKIPPED) {
                self.pos
            } else {
                self.reduce_pos
            };
            self.store_node(cx, term, start, end, count + 4, true);
        }

        if stay {
            let above = ancestor(&cx.frames, self.top, depth);
            self.state = above.map_or(self.state, |f| cx.frames[f].state);
        } else {
            let base = target.map_or(cx.grammar.top().0, |f| cx.frames[f].state);
            self.state = cx.grammar.tables().get_goto(base, term, true).unwrap_or(self.state);
        }
        self.top = target;
        self.depth = self.depth.saturating_sub(distance);
        if target.is_none() {
            self.depth = 0;
        }
        self.reduce_context(cx, term, start);
    }

    /// Appends a node record. With `must_sink`, the record is placed before
    /// any trailing skipped nodes that end after it.
    pub(crate) fn store_node(
        &mut self,
        cx: &mut ParseCx<'_>,
        term: u32,
        start: u32,
        end: u32,
        mut size: i32,
        must_sink: bool,
    ) {
        let emitted_since_push = self.top.is_none_or(|f| cx.frames[f].buffer_pos < self.buffer_end(cx));
        if term == ERR && emitted_since_push {
            // Merge with or drop next to an adjacent error node.
            let segment = &mut cx.buffers[self.buffer];
            let top = segment.data.len();
            if top > 0 {
                let data = &mut segment.data;
                if data[top - 4] == ERR as i32 && data[top - 1] > -1 {
                    if start == end {
                        return;
                    }
                    if data[top - 2] >= start as i32 {
                        data[top - 2] = end as i32;
                        return;
                    }
                }
            } else if let Some(parent) = segment.parent {
                let offset = segment.base;
                let parent = &cx.buffers[parent];
                let top = offset - parent.base;
                if start == end
                    && top > 0
                    && parent.data[top - 4] == ERR as i32
                    && parent.data[top - 1] > -1
                {
                    return;
                }
            }
        }

        let record = [term as i32, start as i32, end as i32, size];
        let data = &mut cx.buffers[self.buffer].data;
        if !must_sink || self.pos == end {
            data.extend(record);
            return;
        }
        let mut index = data.len();
        data.extend([0; 4]);
        if index > 0 && (data[index - 4] != ERR as i32 || data[index - 1] < 0) {
            let mut must_move = false;
            let mut scan = index;
            while scan > 0 && data[scan - 2] > end as i32 {
                if data[scan - 1] >= 0 {
                    must_move = true;
                    break;
                }
                scan -= 4;
            }
            if must_move {
                while index > 0 && data[index - 2] > end as i32 {
                    data.copy_within(index - 4..index, index);
                    index -= 4;
                    if size > 4 {
                        size -= 4;
                    }
                }
            }
        }
        data[index..index + 4].copy_from_slice(&[term as i32, start as i32, end as i32, size]);
    }

    pub(crate) fn shift(&mut self, cx: &mut ParseCx<'_>, action: u32, term: u32, start: u32, end: u32) {
        let max_node = cx.grammar.max_node();
        if action & GOTO_FLAG != 0 {
            self.push_state(cx, action & VALUE_MASK, self.pos);
        } else if action & STAY_FLAG == 0 {
            let next = action & VALUE_MASK;
            if end > self.pos || term <= max_node {
                self.pos = end;
                if !cx.grammar.tables().has_flag(next, STATE_SKIPPED) {
                    self.reduce_pos = end;
                }
            }
            self.push_state(cx, next, start);
            self.shift_context(cx, term, start);
            if term <= max_node {
                cx.buffers[self.buffer].data.extend([term as i32, start as i32, end as i32, 4]);
            }
        } else {
            // A skipped token that leaves the state unchanged.
            self.pos = end;
            self.shift_context(cx, term, start);
            if term <= max_node {
                cx.buffers[self.buffer].data.extend([term as i32, start as i32, end as i32, 4]);
            }
        }
    }

    pub(crate) fn apply(&mut self, cx: &mut ParseCx<'_>, action: u32, term: u32, start: u32, end: u32) {
        if is_reduce(action) {
            self.reduce(cx, action);
        } else {
            self.shift(cx, action, term, start, end);
        }
    }

    /// Pushes a whole node from an earlier tree as if it had just been
    /// reduced.
    pub(crate) fn use_node(&mut self, cx: &mut ParseCx<'_>, tree: &Tree, next: u32) {
        let index = match cx.reused.last() {
            Some(last) if last.ptr_eq(tree) => cx.reused.len() - 1,
            _ => {
                cx.reused.push(tree.clone());
                cx.reused.len() - 1
            }
        };
        let start = self.pos;
        self.pos = start + tree.length();
        self.reduce_pos = self.pos;
        self.push_state(cx, next, start);
        cx.buffers[self.buffer].data.extend([index as i32, start as i32, self.pos as i32, -1]);
        self.update_context_with(cx, start, |tracker, value, view, input| {
            tracker.reuse(value, tree, view, input)
        });
    }

    /// Forks the stack. The part of the buffer after `reduce_pos` may still
    /// be reordered, so it is copied instead of shared.
    pub(crate) fn split(&self, cx: &mut ParseCx<'_>) -> Self {
        let segment = &cx.buffers[self.buffer];
        let mut off = segment.data.len();
        while off > 0 && segment.data[off - 2] > self.reduce_pos as i32 {
            off -= 4;
        }
        let data = segment.data[off..].to_vec();
        let base = segment.base + off;
        let mut parent = Some(self.buffer);
        while let Some(p) = parent {
            if cx.buffers[p].base != base {
                break;
            }
            parent = cx.buffers[p].parent;
        }
        let buffer = cx.buffers.alloc(BufferSegment { data, base, parent });
        Self {
            state: self.state,
            top: self.top,
            depth: self.depth,
            reduce_pos: self.reduce_pos,
            pos: self.pos,
            score: self.score,
            buffer,
            context: self.context,
            look_ahead: self.look_ahead,
        }
    }

    /// Skips the input up to `next_end` as an error node.
    pub(crate) fn recover_by_delete(&mut self, cx: &mut ParseCx<'_>, next: u32, next_end: u32) {
        let is_node = next <= cx.grammar.max_node();
        if is_node {
            self.store_node(cx, next, self.pos, next_end, 4, false);
        }
        self.store_node(cx, ERR, self.pos, next_end, if is_node { 8 } else { 4 }, false);
        self.pos = next_end;
        self.reduce_pos = next_end;
        self.score -= cx.config.delete_penalty;
    }

    pub(crate) fn can_shift(&self, cx: &ParseCx<'_>, term: u32) -> bool {
        self.view(cx).can_shift(term)
    }

    /// Pretends a token was missing: returns stacks that moved into the
    /// states reachable by one shift, each with an empty error node.
    pub(crate) fn recover_by_insert(&self, cx: &mut ParseCx<'_>, next: u32) -> Vec<Self> {
        let config = cx.config;
        if self.depth >= config.max_insert_stack_depth {
            return Vec::new();
        }

        let tables = cx.grammar.tables();
        let mut next_states = tables.next_states(self.state);
        if next_states.len() > config.max_insert_states
            || self.depth >= config.dampen_insert_stack_depth
        {
            let mut best: Vec<(u32, u32)> = next_states
                .iter()
                .copied()
                .filter(|&(_, s)| s != self.state && tables.has_action(s, next) != 0)
                .collect();
            if self.depth < config.dampen_insert_stack_depth {
                for &(term, s) in &next_states {
                    if best.len() >= config.max_insert_states {
                        break;
                    }
                    if !best.iter().any(|&(_, b)| b == s) {
                        best.push((term, s));
                    }
                }
            }
            next_states = best;
        }

        let mut result = Vec::new();
        for (term, state) in next_states {
            if result.len() >= config.max_insert_states {
                break;
            }
            if state == self.state {
                continue;
            }
            let mut stack = self.split(cx);
            stack.push_state(cx, state, self.pos);
            stack.store_node(cx, ERR, stack.pos, stack.pos, 4, true);
            stack.shift_context(cx, term, self.pos);
            stack.reduce_pos = self.pos;
            stack.score -= config.insert_penalty;
            result.push(stack);
        }
        result
    }

    /// Applies the state's forced reduction, falling back to any reduction
    /// the stack can complete. Returns false when there is none.
    pub(crate) fn force_reduce(&mut self, cx: &mut ParseCx<'_>) -> bool {
        let tables = cx.grammar.tables();
        let mut action = tables.slot(self.state, SLOT_FORCED_REDUCE);
        if !is_reduce(action) {
            return false;
        }
        if !tables.valid_action(self.state, action) {
            let depth = reduce_depth(action);
            let term = action & VALUE_MASK;
            let base = if depth == 0 {
                Some(self.state)
            } else {
                ancestor(&cx.frames, self.top, depth - 1).map(|f| cx.frames[f].state)
            };
            if base.and_then(|base| tables.get_goto(base, term, false)).is_none() {
                match self.find_forced_reduction(cx) {
                    Some(backup) => action = backup,
                    None => return false,
                }
            }
            self.store_node(cx, ERR, self.pos, self.pos, 4, true);
            self.score -= cx.config.reduce_penalty;
        }
        self.reduce_pos = self.pos;
        self.reduce(cx, action);
        true
    }

    /// Looks through the states reachable from here for a reduction that
    /// is valid on the current stack.
    fn find_forced_reduction(&self, cx: &ParseCx<'_>) -> Option<u32> {
        fn explore(
            stack: &Stack,
            cx: &ParseCx<'_>,
            seen: &mut Vec<u32>,
            state: u32,
            depth: usize,
        ) -> Option<u32> {
            if seen.contains(&state) {
                return None;
            }
            seen.push(state);
            let tables = cx.grammar.tables();
            tables.all_actions(state, |action| {
                if action & (STAY_FLAG | GOTO_FLAG) != 0 {
                    None
                } else if is_reduce(action) {
                    let depth = reduce_depth(action).checked_sub(depth)?;
                    if depth <= 1 {
                        return None;
                    }
                    let term = action & VALUE_MASK;
                    let target = ancestor(&cx.frames, stack.top, depth - 1)?;
                    tables
                        .get_goto(cx.frames[target].state, term, false)
                        .map(|_| reduce(term, depth as u32))
                } else {
                    explore(stack, cx, seen, action & VALUE_MASK, depth + 1)
                }
            })
        }
        explore(self, cx, &mut Vec::new(), self.state, 0)
    }

    /// Reduces until the stack is in an accepting state.
    pub(crate) fn force_all(&mut self, cx: &mut ParseCx<'_>) {
        while !cx.grammar.tables().has_flag(self.state, STATE_ACCEPTING) {
            if !self.force_reduce(cx) {
                self.store_node(cx, ERR, self.pos, self.pos, 4, true);
                break;
            }
        }
    }

    /// A stack one frame deep in a state with nothing to do.
    pub(crate) fn dead_end(&self, cx: &ParseCx<'_>) -> bool {
        if self.depth != 1 {
            return false;
        }
        let tables = cx.grammar.tables();
        tables.entries(tables.slot(self.state, SLOT_ACTIONS)).next().is_none()
            && tables.default_reduce(self.state) == 0
    }

    /// Drops the stack back to the start state, marking the spot with an
    /// error node.
    pub(crate) fn restart(&mut self, cx: &mut ParseCx<'_>) {
        self.store_node(cx, ERR, self.pos, self.pos, 4, true);
        let bottom = ancestor(&cx.frames, self.top, self.depth.saturating_sub(1));
        if let Some(bottom) = bottom {
            self.state = cx.frames[bottom].state;
        }
        self.top = None;
        self.depth = 0;
    }

    pub(crate) fn same_state(&self, other: &Self, cx: &ParseCx<'_>) -> bool {
        if self.state != other.state || self.depth != other.depth {
            return false;
        }
        let (mut a, mut b) = (self.top, other.top);
        while let (Some(x), Some(y)) = (a, b) {
            if x == y {
                return true;
            }
            let (x, y) = (&cx.frames[x], &cx.frames[y]);
            if x.state != y.state {
                return false;
            }
            (a, b) = (x.parent, y.parent);
        }
        true
    }

    fn shift_context(&mut self, cx: &mut ParseCx<'_>, term: u32, start: u32) {
        self.update_context_with(cx, start, |tracker, value, view, input| {
            tracker.shift(value, term, view, input)
        });
    }

    fn reduce_context(&mut self, cx: &mut ParseCx<'_>, term: u32, start: u32) {
        self.update_context_with(cx, start, |tracker, value, view, input| {
            tracker.reduce(value, term, view, input)
        });
    }

    fn update_context_with(
        &mut self,
        cx: &mut ParseCx<'_>,
        start: u32,
        f: impl FnOnce(&dyn ContextTracker, u64, &StackView<'_>, &mut InputStream<'_>) -> u64,
    ) {
        let Some(current) = self.context else { return };
        let ParseCx { grammar, frames, stream, .. } = cx;
        let Some(tracker) = grammar.context() else { return };
        let view = StackView { stack: self, frames, grammar };
        let value = f(&**tracker, current.value, &view, stream.reset(start));
        if value != current.value {
            let next = StackContext::new(&**tracker, value);
            if next.hash != current.hash {
                self.emit_context(cx);
            }
            self.context = Some(next);
        }
    }

    fn emit_context(&mut self, cx: &mut ParseCx<'_>) {
        let Some(context) = self.context else { return };
        let data = &mut cx.buffers[self.buffer].data;
        if data.last() != Some(&CONTEXT_RECORD) {
            data.extend([context.hash as i32, self.pos as i32, self.pos as i32, CONTEXT_RECORD]);
        }
    }

    fn emit_look_ahead(&mut self, cx: &mut ParseCx<'_>) {
        let data = &mut cx.buffers[self.buffer].data;
        if data.last() != Some(&LOOK_AHEAD_RECORD) {
            data.extend([self.look_ahead as i32, self.pos as i32, self.pos as i32, LOOK_AHEAD_RECORD]);
        }
    }

    pub(crate) fn set_look_ahead(&mut self, cx: &mut ParseCx<'_>, look_ahead: u32) {
        if look_ahead > self.look_ahead {
            self.emit_look_ahead(cx);
            self.look_ahead = look_ahead;
        }
    }

    /// Flushes pending context and look-ahead records before building.
    pub(crate) fn close(&mut self, cx: &mut ParseCx<'_>) {
        if cx.grammar.context().is_some_and(|tracker| tracker.strict()) {
            self.emit_context(cx);
        }
        if self.look_ahead > 0 {
            self.emit_look_ahead(cx);
        }
    }

    pub(crate) fn buffer_cursor<'c>(&self, cx: &'c ParseCx<'_>) -> StackBufferCursor<'c> {
        StackBufferCursor::new(&cx.buffers, self.buffer)
    }
}

/// Reads a stack's buffer backwards across its segments.
#[derive(Clone)]
pub(crate) struct StackBufferCursor<'c> {
    buffers: &'c Arena<BufferSegment>,
    segment: Idx<BufferSegment>,
    pos: usize,
    index: usize,
}

impl<'c> StackBufferCursor<'c> {
    fn new(buffers: &'c Arena<BufferSegment>, segment: Idx<BufferSegment>) -> Self {
        let data = &buffers[segment];
        let mut cursor =
            Self { buffers, segment, pos: data.base + data.data.len(), index: data.data.len() };
        if cursor.index == 0 {
            cursor.maybe_next();
        }
        cursor
    }

    fn maybe_next(&mut self) {
        let current = &self.buffers[self.segment];
        if let Some(next) = current.parent {
            self.index = current.base - self.buffers[next].base;
            self.segment = next;
        }
    }

    fn slot(&self, offset: usize) -> i32 {
        self.buffers[self.segment].data[self.index - offset]
    }
}

impl BufferCursor for StackBufferCursor<'_> {
    fn pos(&self) -> usize {
        self.pos
    }

    fn id(&self) -> i32 {
        self.slot(4)
    }

    fn start(&self) -> u32 {
        self.slot(3) as u32
    }

    fn end(&self) -> u32 {
        self.slot(2) as u32
    }

    fn size(&self) -> i32 {
        self.slot(1)
    }

    fn next(&mut self) {
        self.index -= 4;
        self.pos -= 4;
        if self.index == 0 {
            self.maybe_next();
        }
    }
}

/// Read-only access to a stack for tokenizers and context trackers.
pub struct StackView<'s> {
    stack: &'s Stack,
    frames: &'s Arena<Frame>,
    grammar: &'s Grammar,
}

impl<'s> StackView<'s> {
    pub(crate) fn new(stack: &'s Stack, frames: &'s Arena<Frame>, grammar: &'s Grammar) -> Self {
        Self { stack, frames, grammar }
    }

    pub fn state(&self) -> u32 {
        self.stack.state
    }

    pub fn pos(&self) -> u32 {
        self.stack.pos
    }

    pub fn depth(&self) -> usize {
        self.stack.depth
    }

    /// The context value, when the grammar tracks one.
    pub fn context(&self) -> Option<u64> {
        self.stack.context.map(|cx| cx.value)
    }

    pub fn grammar(&self) -> &Grammar {
        self.grammar
    }

    /// Whether the stack could shift `term` after running the reductions
    /// it would need first. The stack itself is left untouched.
    pub fn can_shift(&self, term: u32) -> bool {
        let tables = self.grammar.tables();
        let mut state = self.stack.state;
        let mut top = self.stack.top;
        // Frames pushed during the simulation, above `top`.
        let mut pushed: Vec<u32> = Vec::new();
        loop {
            let default = tables.default_reduce(state);
            let action = if default != 0 { default } else { tables.has_action(state, term) };
            if action == 0 {
                return false;
            }
            if !is_reduce(action) {
                return true;
            }
            let depth = reduce_depth(action);
            if depth == 0 {
                pushed.push(state);
            } else {
                for _ in 1..depth {
                    if pushed.pop().is_none() {
                        top = top.and_then(|f| self.frames[f].parent);
                    }
                }
            }
            let base = match pushed.last() {
                Some(&state) => state,
                None => top.map_or(self.grammar.top().0, |f| self.frames[f].state),
            };
            match tables.get_goto(base, action & VALUE_MASK, true) {
                Some(next) => state = next,
                None => return false,
            }
        }
    }
}
