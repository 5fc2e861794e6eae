use std::fmt;

use stratum_errors::{Error, Result};

use crate::stack::StackView;
use crate::stream::InputStream;

/// Reads one token at the stream's position by calling
/// [`InputStream::accept_token`]. Accepting nothing means no token.
pub trait Tokenizer: Send + Sync {
    fn token(&self, input: &mut InputStream<'_>, stack: &StackView<'_>);

    /// The result depends on the parse state, so it may not be cached
    /// across stacks at the same position.
    fn contextual(&self) -> bool {
        false
    }

    /// Still consulted when an earlier tokenizer already produced a token.
    fn fallback(&self) -> bool {
        false
    }

    /// Its tokens are added to those of later tokenizers instead of
    /// replacing them.
    fn extend(&self) -> bool {
        false
    }
}

/// One state of a token automaton.
#[derive(Debug, Clone)]
pub struct DfaState {
    /// Terms accepted in this state, in order of preference.
    accept: Box<[u32]>,
    /// Sorted, inclusive character ranges and their target states.
    edges: Box<[(char, char, u32)]>,
}

impl DfaState {
    pub fn new(accept: Vec<u32>, mut edges: Vec<(char, char, u32)>) -> Self {
        edges.sort_unstable_by_key(|&(from, ..)| from);
        Self { accept: accept.into_boxed_slice(), edges: edges.into_boxed_slice() }
    }

    fn step(&self, ch: char) -> Option<u32> {
        let index = self.edges.partition_point(|&(_, to, _)| to < ch);
        self.edges.get(index).filter(|&&(from, ..)| from <= ch).map(|&(.., target)| target)
    }
}

/// A table-driven tokenizer. Runs its automaton from state 0 and keeps
/// the longest match. When a state accepts several terms, the first one
/// the stack can shift wins, or the first listed if none can.
#[derive(Debug, Clone)]
pub struct TokenGroup {
    states: Box<[DfaState]>,
}

impl TokenGroup {
    /// Fails when the automaton is empty or an edge leads to a missing
    /// state.
    pub fn new(states: Vec<DfaState>) -> Result<Self> {
        let count = states.len() as u32;
        if count == 0 {
            return Err(Error::MalformedTable("token automaton without states".to_owned()));
        }
        for (index, state) in states.iter().enumerate() {
            if let Some(&(from, _, target)) = state.edges.iter().find(|&&(.., t)| t >= count) {
                return Err(Error::MalformedTable(format!(
                    "token state {index} has an edge on {from:?} to missing state {target}"
                )));
            }
        }
        Ok(Self { states: states.into_boxed_slice() })
    }
}

impl Tokenizer for TokenGroup {
    fn token(&self, input: &mut InputStream<'_>, stack: &StackView<'_>) {
        let mut state = &self.states[0];
        loop {
            let preferred = match state.accept.as_ref() {
                [] => None,
                [only] => Some(*only),
                terms => terms.iter().copied().find(|&t| stack.can_shift(t)).or(Some(terms[0])),
            };
            if let Some(term) = preferred {
                input.accept_token(term);
            }
            let Some(next) = input.next().and_then(|ch| state.step(ch)) else { break };
            state = &self.states[next as usize];
            input.advance();
        }
    }
}

/// Flags of an [`ExternalTokenizer`], see [`Tokenizer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenizerOptions {
    pub contextual: bool,
    pub fallback: bool,
    pub extend: bool,
}

type TokenFn = dyn Fn(&mut InputStream<'_>, &StackView<'_>) + Send + Sync;

/// A tokenizer written as a plain function.
pub struct ExternalTokenizer {
    token: Box<TokenFn>,
    options: TokenizerOptions,
}

impl ExternalTokenizer {
    pub fn new(token: impl Fn(&mut InputStream<'_>, &StackView<'_>) + Send + Sync + 'static) -> Self {
        Self::with_options(TokenizerOptions::default(), token)
    }

    pub fn with_options(
        options: TokenizerOptions,
        token: impl Fn(&mut InputStream<'_>, &StackView<'_>) + Send + Sync + 'static,
    ) -> Self {
        Self { token: Box::new(token), options }
    }
}

impl Tokenizer for ExternalTokenizer {
    fn token(&self, input: &mut InputStream<'_>, stack: &StackView<'_>) {
        (self.token)(input, stack);
    }

    fn contextual(&self) -> bool {
        self.options.contextual
    }

    fn fallback(&self) -> bool {
        self.options.fallback
    }

    fn extend(&self) -> bool {
        self.options.extend
    }
}

impl fmt::Debug for ExternalTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalTokenizer").field("options", &self.options).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_are_searched_by_range() {
        let state = DfaState::new(vec![], vec![('a', 'z', 1), ('0', '9', 2), ('_', '_', 3)]);
        assert_eq!(state.step('q'), Some(1));
        assert_eq!(state.step('0'), Some(2));
        assert_eq!(state.step('_'), Some(3));
        assert_eq!(state.step('A'), None);
        assert_eq!(state.step('~'), None);
    }

    #[test]
    fn token_groups_check_their_targets() {
        assert!(TokenGroup::new(vec![]).is_err());
        let error = TokenGroup::new(vec![DfaState::new(vec![], vec![('a', 'a', 1)])]).unwrap_err();
        assert_eq!(
            error.to_string(),
            "malformed parse table: token state 0 has an edge on 'a' to missing state 1"
        );
        let group = TokenGroup::new(vec![
            DfaState::new(vec![], vec![('a', 'a', 1)]),
            DfaState::new(vec![3], vec![]),
        ]);
        assert!(group.is_ok());
    }
}
