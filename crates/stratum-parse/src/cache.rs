use crate::grammar::{Grammar, SpecializeKind};
use crate::stack::{ERR, ParseCx, Stack, StackView};
use crate::table::{SEQ_OTHER, SLOT_ACTIONS, SLOT_SKIP};
use crate::tokens::Tokenizer;

/// The last token a tokenizer produced, with the key it was produced for.
#[derive(Debug, Clone, Copy, Default)]
struct CachedToken {
    start: Option<u32>,
    value: u32,
    end: u32,
    extended: Option<u32>,
    look_ahead: u32,
    mask: u32,
    context: u32,
}

/// The token that decided the actions of the last stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MainToken {
    pub(crate) value: u32,
    pub(crate) start: u32,
    pub(crate) end: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingAction {
    pub(crate) action: u32,
    pub(crate) term: u32,
    pub(crate) end: u32,
}

/// Remembers one token per tokenizer, so stacks at the same position in
/// compatible states do not scan the same characters again.
pub(crate) struct TokenCache {
    tokens: Vec<CachedToken>,
    pub(crate) main_token: Option<MainToken>,
    actions: Vec<PendingAction>,
}

impl TokenCache {
    pub(crate) fn new(grammar: &Grammar) -> Self {
        Self {
            tokens: vec![CachedToken::default(); grammar.tokenizers().len()],
            main_token: None,
            actions: Vec::new(),
        }
    }

    /// Reads the next token for `stack` and returns the actions it allows.
    pub(crate) fn get_actions(&mut self, stack: &mut Stack, cx: &mut ParseCx<'_>) -> Vec<PendingAction> {
        self.actions.clear();
        let grammar = cx.grammar.clone();
        let mask = grammar.tables().tokenizer_mask(stack.state);
        let context = stack.context.map_or(0, |context| context.hash);
        let mut main = None;
        let mut look_ahead = 0;

        for (i, tokenizer) in grammar.tokenizers().iter().enumerate() {
            if mask & (1 << i) == 0 || (main.is_some() && !tokenizer.fallback()) {
                continue;
            }
            let cached = self.tokens[i];
            let token = if tokenizer.contextual()
                || cached.start != Some(stack.pos)
                || cached.mask != mask
                || cached.context != context
            {
                let token = CachedToken { mask, context, ..read_token(&**tokenizer, stack, cx, &grammar) };
                self.tokens[i] = token;
                token
            } else {
                cached
            };

            if token.look_ahead > token.end + cx.config.lookahead_margin {
                look_ahead = look_ahead.max(token.look_ahead);
            }
            if token.value != ERR {
                let before = self.actions.len();
                if let Some(extended) = token.extended {
                    self.add_actions(stack, cx, extended, token.end);
                }
                self.add_actions(stack, cx, token.value, token.end);
                if !tokenizer.extend() {
                    main = Some(MainToken {
                        value: token.value,
                        start: token.start.unwrap_or(stack.pos),
                        end: token.end,
                    });
                    if self.actions.len() > before {
                        break;
                    }
                }
            }
        }

        if look_ahead > 0 {
            stack.set_look_ahead(cx, look_ahead);
        }
        if main.is_none() && stack.pos == cx.stream.end() {
            let eof = MainToken { value: grammar.eof_term(), start: stack.pos, end: stack.pos };
            self.add_actions(stack, cx, eof.value, eof.end);
            main = Some(eof);
        }
        self.main_token = main;
        self.actions.clone()
    }

    /// The token that stopped `stack`, or a one-character error token when
    /// no tokenizer matched.
    pub(crate) fn main_token(&self, stack: &Stack, cx: &ParseCx<'_>) -> MainToken {
        if let Some(main) = self.main_token {
            return main;
        }
        let end = cx.stream.end();
        if stack.pos >= end {
            MainToken { value: cx.grammar.eof_term(), start: stack.pos, end: stack.pos }
        } else {
            MainToken { value: ERR, start: stack.pos, end: cx.stream.char_end(stack.pos) }
        }
    }

    fn add_actions(&mut self, stack: &Stack, cx: &ParseCx<'_>, token: u32, end: u32) {
        let tables = cx.grammar.tables();
        for slot in [SLOT_ACTIONS, SLOT_SKIP] {
            for (term, action) in tables.entries(tables.slot(stack.state, slot)) {
                if term == token || (term == SEQ_OTHER && self.actions.is_empty()) {
                    self.put_action(PendingAction { action, term: token, end });
                }
            }
        }
    }

    fn put_action(&mut self, action: PendingAction) {
        if !self.actions.iter().any(|a| a.action == action.action) {
            self.actions.push(action);
        }
    }
}

fn read_token(
    tokenizer: &dyn Tokenizer,
    stack: &Stack,
    cx: &mut ParseCx<'_>,
    grammar: &Grammar,
) -> CachedToken {
    let start = cx.stream.clip_pos(stack.pos);
    let ParseCx { frames, stream, .. } = cx;
    tokenizer.token(stream.reset(start), &StackView::new(stack, frames, grammar));
    let state = cx.stream.token;

    let mut token = CachedToken {
        start: Some(start),
        value: ERR,
        end: state.end,
        look_ahead: state.look_ahead,
        ..CachedToken::default()
    };
    match state.value {
        Some(value) => {
            token.value = value;
            let text = cx.stream.read(state.start, state.end);
            match grammar.specialize(value, &text) {
                Some((SpecializeKind::Replace, term)) => token.value = term,
                Some((SpecializeKind::Extend, term)) => token.extended = Some(term),
                None => {}
            }
        }
        None => token.end = cx.stream.char_end(start),
    }
    token
}
