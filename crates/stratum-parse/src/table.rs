//! Encoded parse tables.
//!
//! A table is three flat `u32` arrays:
//!
//! * `states`: [`STATE_SIZE`] slots per state (flags, action list offset,
//!   skip list offset, tokenizer mask, default reduction, forced reduction).
//! * `data`: action lists, `(term, action)` pairs ended by a
//!   `(SEQ_END, 0)` pair. A `SEQ_OTHER` term, always last, matches any
//!   terminal when nothing else did.
//! * `goto`: `goto[0]` holds the number of terms, `goto[term + 1]` the offset
//!   of that term's groups (zero when the term has none). A group is
//!   `(count << 1 | last, target, states...)`; the last group also serves
//!   as the fallback for loose lookups.
//!
//! An action word stores a state or term in its low 16 bits. With
//! [`REDUCE_FLAG`] set it is a reduction whose depth sits above
//! [`REDUCE_DEPTH_SHIFT`].

use rustc_hash::FxHashMap;
use stratum_errors::{Error, Result};

pub const TABLE_VERSION: u32 = 1;

pub const VALUE_MASK: u32 = 0xffff;
pub const REDUCE_FLAG: u32 = 1 << 16;
/// On reductions: a repeat term reduction `R -> R R` that must be stored.
pub const REPEAT_FLAG: u32 = 1 << 17;
/// On shifts: push the target state without consuming anything.
pub const GOTO_FLAG: u32 = 1 << 17;
/// On shifts: consume a skipped token and stay in the current state. On
/// reductions: reduce past the skipped-content frame and return to the
/// state below it.
pub const STAY_FLAG: u32 = 1 << 18;
pub const REDUCE_DEPTH_SHIFT: u32 = 19;

pub const SEQ_END: u32 = 0xffff;
pub const SEQ_OTHER: u32 = 0xfffe;

pub const STATE_SIZE: usize = 6;

pub(crate) const SLOT_FLAGS: usize = 0;
pub(crate) const SLOT_ACTIONS: usize = 1;
pub(crate) const SLOT_SKIP: usize = 2;
pub(crate) const SLOT_TOKENIZER_MASK: usize = 3;
pub(crate) const SLOT_DEFAULT_REDUCE: usize = 4;
pub(crate) const SLOT_FORCED_REDUCE: usize = 5;

/// State flag: the state was entered by shifting skipped content.
pub const STATE_SKIPPED: u32 = 1;
/// State flag: the parse may finish in this state.
pub const STATE_ACCEPTING: u32 = 2;

pub const fn shift(state: u32) -> u32 {
    state
}

pub const fn goto_shift(state: u32) -> u32 {
    state | GOTO_FLAG
}

pub const fn stay() -> u32 {
    STAY_FLAG
}

pub const fn reduce(term: u32, depth: u32) -> u32 {
    term | REDUCE_FLAG | (depth << REDUCE_DEPTH_SHIFT)
}

pub const fn repeat(term: u32, depth: u32) -> u32 {
    reduce(term, depth) | REPEAT_FLAG
}

pub const fn stay_reduce(term: u32, depth: u32) -> u32 {
    reduce(term, depth) | STAY_FLAG
}

pub(crate) const fn is_reduce(action: u32) -> bool {
    action & REDUCE_FLAG != 0
}

pub(crate) const fn reduce_depth(action: u32) -> usize {
    (action >> REDUCE_DEPTH_SHIFT) as usize
}

/// The serialized form of a grammar's automaton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTables {
    pub version: u32,
    pub states: Box<[u32]>,
    pub data: Box<[u32]>,
    pub goto: Box<[u32]>,
}

impl ParseTables {
    pub fn new(states: Vec<u32>, data: Vec<u32>, goto: Vec<u32>) -> Self {
        Self {
            version: TABLE_VERSION,
            states: states.into_boxed_slice(),
            data: data.into_boxed_slice(),
            goto: goto.into_boxed_slice(),
        }
    }

    pub fn state_count(&self) -> usize {
        self.states.len() / STATE_SIZE
    }

    pub(crate) fn slot(&self, state: u32, slot: usize) -> u32 {
        self.states[state as usize * STATE_SIZE + slot]
    }

    pub fn has_flag(&self, state: u32, flag: u32) -> bool {
        self.slot(state, SLOT_FLAGS) & flag != 0
    }

    pub fn default_reduce(&self, state: u32) -> u32 {
        self.slot(state, SLOT_DEFAULT_REDUCE)
    }

    pub fn tokenizer_mask(&self, state: u32) -> u32 {
        self.slot(state, SLOT_TOKENIZER_MASK)
    }

    /// Iterates the `(term, action)` pairs of the list at `offset`.
    pub(crate) fn entries(&self, offset: u32) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.data[offset as usize..]
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
            .take_while(|&(term, _)| term != SEQ_END)
    }

    /// The first action `state` takes on `term`, including skip actions.
    /// Returns zero when there is none.
    pub fn has_action(&self, state: u32, term: u32) -> u32 {
        for slot in [SLOT_ACTIONS, SLOT_SKIP] {
            for (next, action) in self.entries(self.slot(state, slot)) {
                if next == term || next == 0 || next == SEQ_OTHER {
                    return action;
                }
            }
        }
        0
    }

    /// Calls `f` on the default reduction and every regular action of
    /// `state` until it returns something.
    pub fn all_actions<T>(&self, state: u32, mut f: impl FnMut(u32) -> Option<T>) -> Option<T> {
        let default = self.default_reduce(state);
        if default != 0 {
            if let Some(result) = f(default) {
                return Some(result);
            }
        }
        self.entries(self.slot(state, SLOT_ACTIONS)).find_map(|(_, action)| f(action))
    }

    pub fn valid_action(&self, state: u32, action: u32) -> bool {
        self.all_actions(state, |a| (a == action).then_some(())).is_some()
    }

    /// `(term, target)` pairs for the plain shifts out of `state`, one per
    /// target state.
    pub fn next_states(&self, state: u32) -> Vec<(u32, u32)> {
        let mut result: Vec<(u32, u32)> = Vec::new();
        for (term, action) in self.entries(self.slot(state, SLOT_ACTIONS)) {
            if action & (REDUCE_FLAG | STAY_FLAG) != 0 || term == SEQ_OTHER {
                continue;
            }
            let target = action & VALUE_MASK;
            if !result.iter().any(|&(_, s)| s == target) {
                result.push((term, target));
            }
        }
        result
    }

    /// The state reached from `state` after reducing to `term`. A loose
    /// lookup falls back to the term's default target.
    pub fn get_goto(&self, state: u32, term: u32, loose: bool) -> Option<u32> {
        let table = &self.goto;
        if term >= table[0] {
            return None;
        }
        let mut pos = table[term as usize + 1] as usize;
        if pos == 0 {
            return None;
        }
        loop {
            let tag = table[pos];
            let last = tag & 1 == 1;
            let target = table[pos + 1];
            pos += 2;
            if last && loose {
                return Some(target);
            }
            let end = pos + (tag >> 1) as usize;
            if table[pos..end].contains(&state) {
                return Some(target);
            }
            if last {
                return None;
            }
            pos = end;
        }
    }

    /// Checks that every offset and state reference stays in bounds.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.version != TABLE_VERSION {
            return Err(Error::VersionMismatch { expected: TABLE_VERSION, found: self.version });
        }
        if self.states.is_empty() || self.states.len() % STATE_SIZE != 0 {
            return Err(malformed(format!("state table length {}", self.states.len())));
        }
        let state_count = self.state_count() as u32;
        let check_target = |action: u32| {
            if action & (REDUCE_FLAG | STAY_FLAG) == 0 && action & VALUE_MASK >= state_count {
                Err(malformed(format!("action {action:#x} targets a missing state")))
            } else {
                Ok(())
            }
        };
        for state in 0..state_count {
            for slot in [SLOT_ACTIONS, SLOT_SKIP] {
                let offset = self.slot(state, slot) as usize;
                let terminated = self.data.get(offset..).is_some_and(|rest| {
                    rest.chunks_exact(2).any(|pair| pair[0] == SEQ_END)
                });
                if !terminated {
                    return Err(malformed(format!(
                        "state {state}: action list at {offset} is out of bounds or unterminated"
                    )));
                }
                for (_, action) in self.entries(offset as u32) {
                    check_target(action)?;
                }
            }
        }
        self.validate_goto(state_count)
    }

    fn validate_goto(&self, state_count: u32) -> Result<()> {
        let table = &self.goto;
        let Some(&term_count) = table.first() else {
            return Err(malformed("empty goto table".to_owned()));
        };
        if table.len() <= term_count as usize {
            return Err(malformed("goto table shorter than its term index".to_owned()));
        }
        for term in 0..term_count as usize {
            let mut pos = table[term + 1] as usize;
            if pos == 0 {
                continue;
            }
            loop {
                let (Some(&tag), Some(&target)) = (table.get(pos), table.get(pos + 1)) else {
                    return Err(malformed(format!("goto group for term {term} out of bounds")));
                };
                let end = pos + 2 + (tag >> 1) as usize;
                if target >= state_count || end > table.len() {
                    return Err(malformed(format!("goto group for term {term} is invalid")));
                }
                if tag & 1 == 1 {
                    break;
                }
                pos = end;
            }
        }
        Ok(())
    }
}

fn malformed(message: String) -> Error {
    Error::MalformedTable(message)
}

#[derive(Default)]
struct StateDef {
    flags: u32,
    actions: Vec<(u32, u32)>,
    skip: Vec<(u32, u32)>,
    tokenizers: u32,
    default_reduce: u32,
    forced_reduce: u32,
}

/// Assembles [`ParseTables`] for a hand-written automaton.
#[derive(Default)]
pub struct TableBuilder {
    states: Vec<StateDef>,
    gotos: Vec<(u32, u32, u32)>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a state that uses the first tokenizer.
    pub fn state(&mut self) -> u32 {
        self.states.push(StateDef { tokenizers: 1, ..StateDef::default() });
        (self.states.len() - 1) as u32
    }

    pub fn action(&mut self, state: u32, term: u32, action: u32) -> &mut Self {
        self.states[state as usize].actions.push((term, action));
        self
    }

    pub fn shift(&mut self, state: u32, term: u32, target: u32) -> &mut Self {
        self.action(state, term, shift(target))
    }

    pub fn reduce(&mut self, state: u32, term: u32, reduced: u32, depth: u32) -> &mut Self {
        self.action(state, term, reduce(reduced, depth))
    }

    /// Action taken on any terminal without an entry of its own.
    pub fn otherwise(&mut self, state: u32, action: u32) -> &mut Self {
        self.action(state, SEQ_OTHER, action)
    }

    /// Actions for skipped tokens, tried after the regular actions.
    pub fn skip(&mut self, state: u32, term: u32, action: u32) -> &mut Self {
        self.states[state as usize].skip.push((term, action));
        self
    }

    pub fn default_reduce(&mut self, state: u32, action: u32) -> &mut Self {
        self.states[state as usize].default_reduce = action;
        self
    }

    pub fn forced_reduce(&mut self, state: u32, action: u32) -> &mut Self {
        self.states[state as usize].forced_reduce = action;
        self
    }

    pub fn accepting(&mut self, state: u32) -> &mut Self {
        self.states[state as usize].flags |= STATE_ACCEPTING;
        self
    }

    pub fn skipped(&mut self, state: u32) -> &mut Self {
        self.states[state as usize].flags |= STATE_SKIPPED;
        self
    }

    /// Selects the tokenizers (bit `i` for tokenizer `i`) active in `state`.
    pub fn tokenizers(&mut self, state: u32, mask: u32) -> &mut Self {
        self.states[state as usize].tokenizers = mask;
        self
    }

    pub fn goto(&mut self, from: u32, term: u32, target: u32) -> &mut Self {
        self.gotos.push((term, from, target));
        self
    }

    pub fn finish(self) -> ParseTables {
        let mut data = Vec::new();
        let mut lists: FxHashMap<Vec<u32>, u32> = FxHashMap::default();
        let mut list = |entries: &[(u32, u32)]| {
            let mut encoded: Vec<u32> = entries.iter().flat_map(|&(t, a)| [t, a]).collect();
            encoded.extend([SEQ_END, 0]);
            *lists.entry(encoded).or_insert_with_key(|encoded| {
                let offset = data.len() as u32;
                data.extend_from_slice(encoded);
                offset
            })
        };

        let mut states = Vec::with_capacity(self.states.len() * STATE_SIZE);
        for state in &self.states {
            let actions = list(&state.actions);
            let skip = list(&state.skip);
            states.extend([
                state.flags,
                actions,
                skip,
                state.tokenizers,
                state.default_reduce,
                state.forced_reduce,
            ]);
        }

        ParseTables::new(states, data, encode_goto(self.gotos))
    }
}

fn encode_goto(mut gotos: Vec<(u32, u32, u32)>) -> Vec<u32> {
    let term_count = gotos.iter().map(|&(term, ..)| term + 1).max().unwrap_or(0);
    let mut table = vec![0; term_count as usize + 1];
    table[0] = term_count;
    gotos.sort_unstable();
    gotos.dedup();

    for term in 0..term_count {
        let mut groups: Vec<(u32, Vec<u32>)> = Vec::new();
        for &(_, from, target) in gotos.iter().filter(|g| g.0 == term) {
            match groups.iter_mut().find(|(t, _)| *t == target) {
                Some((_, states)) => states.push(from),
                None => groups.push((target, vec![from])),
            }
        }
        if groups.is_empty() {
            continue;
        }
        // The most common target becomes the loose fallback.
        let widest = (0..groups.len()).max_by_key(|&i| (groups[i].1.len(), usize::MAX - i));
        if let Some(widest) = widest {
            let fallback = groups.remove(widest);
            groups.push(fallback);
        }
        table[term as usize + 1] = table.len() as u32;
        let count = groups.len();
        for (i, (target, states)) in groups.into_iter().enumerate() {
            let last = u32::from(i + 1 == count);
            table.push((states.len() as u32) << 1 | last);
            table.push(target);
            table.extend(states);
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;

    fn sample() -> ParseTables {
        let mut builder = TableBuilder::new();
        let s0 = builder.state();
        let s1 = builder.state();
        let s2 = builder.state();
        builder.shift(s0, 3, s1).reduce(s1, 5, 2, 1).accepting(s2);
        builder.goto(s0, 2, s2).goto(s1, 2, s2).goto(s2, 2, s1);
        builder.skip(s0, 6, stay());
        builder.finish()
    }

    #[test]
    fn identical_lists_are_shared() {
        let tables = sample();
        expect!["[0, 0, 4, 1, 0, 0, 0, 8, 12, 1, 0, 0, 2, 12, 12, 1, 0, 0]"]
            .assert_eq(&format!("{:?}", tables.states));
        expect!["[3, 1, 65535, 0, 6, 262144, 65535, 0, 5, 589826, 65535, 0, 65535, 0]"]
            .assert_eq(&format!("{:?}", tables.data));
    }

    #[test]
    fn lookups() {
        let tables = sample();
        assert_eq!(tables.has_action(0, 3), 1);
        assert_eq!(tables.has_action(0, 6), STAY_FLAG);
        assert_eq!(tables.has_action(0, 5), 0);
        assert!(tables.valid_action(1, reduce(2, 1)));
        assert!(!tables.valid_action(1, reduce(2, 2)));
        assert_eq!(tables.next_states(0), [(3, 1)]);
        assert!(tables.has_flag(2, STATE_ACCEPTING));
        assert!(!tables.has_flag(1, STATE_ACCEPTING));
    }

    #[test]
    fn goto_falls_back_to_widest_group() {
        let tables = sample();
        assert_eq!(tables.get_goto(0, 2, false), Some(2));
        assert_eq!(tables.get_goto(2, 2, false), Some(1));
        assert_eq!(tables.get_goto(1, 2, false), Some(2));
        assert_eq!(tables.get_goto(7, 2, false), None);
        assert_eq!(tables.get_goto(7, 2, true), Some(2));
        assert_eq!(tables.get_goto(0, 1, true), None);
        assert_eq!(tables.get_goto(0, 9, true), None);
    }

    #[test]
    fn validation_rejects_bad_tables() {
        let mut tables = sample();
        assert!(tables.validate().is_ok());

        tables.version = 0;
        assert!(matches!(tables.validate(), Err(Error::VersionMismatch { expected: 1, found: 0 })));

        let mut tables = sample();
        tables.data[1] = 40;
        assert!(matches!(tables.validate(), Err(Error::MalformedTable(_))));

        let mut tables = sample();
        let last = tables.goto.len() - 1;
        tables.goto[last] = 99;
        assert!(tables.validate().is_ok());
        tables.goto[4] = 99;
        assert!(matches!(tables.validate(), Err(Error::MalformedTable(_))));
    }
}
