use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use stratum_errors::{Error, Result};
use stratum_inputs::{Input, TextRange, check_ranges};
use stratum_tree::{NodeProp, NodeSet, NodeType, PartialParse, Parser, TreeFragment};

use crate::config::ParseConfig;
use crate::context::ContextTracker;
use crate::parse::Parse;
use crate::table::ParseTables;
use crate::tokens::Tokenizer;

/// What a specializer does with the token it matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecializeKind {
    /// The token becomes the specialized term.
    Replace,
    /// The specialized term is tried alongside the original token.
    Extend,
}

/// Maps the text of tokens of type `term` to other terms, typically to
/// turn identifiers into keywords.
#[derive(Debug, Clone)]
pub struct Specializer {
    pub term: u32,
    pub kind: SpecializeKind,
    pub words: FxHashMap<Box<str>, u32>,
}

impl Specializer {
    pub fn new<'w>(
        term: u32,
        kind: SpecializeKind,
        words: impl IntoIterator<Item = (&'w str, u32)>,
    ) -> Self {
        Self { term, kind, words: words.into_iter().map(|(w, t)| (w.into(), t)).collect() }
    }
}

/// Everything needed to build a [`Grammar`].
pub struct GrammarSpec {
    pub tables: ParseTables,
    pub node_set: NodeSet,
    pub tokenizers: Vec<Arc<dyn Tokenizer>>,
    /// Start state and the term of the top node.
    pub top: (u32, u32),
    pub eof_term: u32,
    /// Terms from here up to the end of the node set are repeat helpers.
    pub min_repeat_term: u32,
    pub dynamic_precedences: FxHashMap<u32, i32>,
    pub specializers: Vec<Specializer>,
    pub context: Option<Arc<dyn ContextTracker>>,
    /// Names of terms that are not node types.
    pub term_names: FxHashMap<u32, Box<str>>,
}

impl GrammarSpec {
    pub fn new(
        tables: ParseTables,
        node_set: NodeSet,
        tokenizers: Vec<Arc<dyn Tokenizer>>,
        top: (u32, u32),
        eof_term: u32,
    ) -> Self {
        Self {
            tables,
            min_repeat_term: node_set.len() as u32,
            node_set,
            tokenizers,
            top,
            eof_term,
            dynamic_precedences: FxHashMap::default(),
            specializers: Vec::new(),
            context: None,
            term_names: FxHashMap::default(),
        }
    }
}

#[derive(Clone)]
struct GrammarData {
    tables: Arc<ParseTables>,
    node_set: NodeSet,
    tokenizers: Arc<[Arc<dyn Tokenizer>]>,
    top: (u32, u32),
    eof_term: u32,
    max_node: u32,
    min_repeat_term: u32,
    dynamic_precedences: Arc<FxHashMap<u32, i32>>,
    specializers: Arc<[Specializer]>,
    context: Option<Arc<dyn ContextTracker>>,
    term_names: Arc<FxHashMap<u32, Box<str>>>,
    config: ParseConfig,
}

/// A loaded grammar. Cheap to clone, and usable from several threads.
#[derive(Clone)]
pub struct Grammar(Arc<GrammarData>);

impl Grammar {
    /// Validates the tables against the rest of the grammar.
    pub fn new(spec: GrammarSpec) -> Result<Self> {
        spec.tables.validate()?;
        let malformed = |message: String| Err(Error::MalformedTable(message));

        let node_count = spec.node_set.len() as u32;
        if node_count == 0 || !spec.node_set.types()[0].is_error() {
            return malformed("node type 0 must be the error type".to_owned());
        }
        let (top_state, top_term) = spec.top;
        if top_state as usize >= spec.tables.state_count() {
            return malformed(format!("top state {top_state} does not exist"));
        }
        if top_term >= node_count {
            return malformed(format!("top term {top_term} is not a node type"));
        }
        if spec.eof_term < node_count {
            return malformed(format!("end-of-file term {} is a node type", spec.eof_term));
        }
        if spec.min_repeat_term > node_count {
            return malformed(format!("repeat terms start past the node set at {}", spec.min_repeat_term));
        }
        if spec.tokenizers.len() > 32 {
            return malformed(format!("{} tokenizers, at most 32 are supported", spec.tokenizers.len()));
        }
        let tokenizer_bits = if spec.tokenizers.len() == 32 {
            u32::MAX
        } else {
            (1u32 << spec.tokenizers.len()) - 1
        };
        for state in 0..spec.tables.state_count() as u32 {
            let mask = spec.tables.tokenizer_mask(state);
            if mask & !tokenizer_bits != 0 {
                return malformed(format!("state {state} uses missing tokenizers ({mask:#b})"));
            }
        }

        Ok(Self(Arc::new(GrammarData {
            tables: Arc::new(spec.tables),
            max_node: node_count - 1,
            node_set: spec.node_set,
            tokenizers: spec.tokenizers.into(),
            top: spec.top,
            eof_term: spec.eof_term,
            min_repeat_term: spec.min_repeat_term,
            dynamic_precedences: Arc::new(spec.dynamic_precedences),
            specializers: spec.specializers.into(),
            context: spec.context,
            term_names: Arc::new(spec.term_names),
            config: ParseConfig::DEFAULT,
        })))
    }

    /// A copy of the grammar that parses with `config`.
    pub fn configure(&self, config: ParseConfig) -> Self {
        Self(Arc::new(GrammarData { config, ..(*self.0).clone() }))
    }

    /// A copy of the grammar whose node types carry `prop` wherever
    /// `source` returns a value.
    pub fn with_prop<T: Send + Sync + 'static>(
        &self,
        prop: NodeProp<T>,
        source: impl Fn(&NodeType) -> Option<T>,
    ) -> Self {
        let node_set = self.0.node_set.extend(prop, source);
        Self(Arc::new(GrammarData { node_set, ..(*self.0).clone() }))
    }

    pub fn config(&self) -> &ParseConfig {
        &self.0.config
    }

    pub fn tables(&self) -> &ParseTables {
        &self.0.tables
    }

    pub fn node_set(&self) -> &NodeSet {
        &self.0.node_set
    }

    pub fn node_type(&self, term: u32) -> Option<&NodeType> {
        u16::try_from(term).ok().and_then(|id| self.0.node_set.types().get(usize::from(id)))
    }

    pub fn tokenizers(&self) -> &[Arc<dyn Tokenizer>] {
        &self.0.tokenizers
    }

    pub fn context(&self) -> Option<&Arc<dyn ContextTracker>> {
        self.0.context.as_ref()
    }

    pub fn top(&self) -> (u32, u32) {
        self.0.top
    }

    pub fn eof_term(&self) -> u32 {
        self.0.eof_term
    }

    /// The highest term that is also a node type.
    pub fn max_node(&self) -> u32 {
        self.0.max_node
    }

    pub fn min_repeat_term(&self) -> u32 {
        self.0.min_repeat_term
    }

    pub fn dynamic_precedence(&self, term: u32) -> i32 {
        self.0.dynamic_precedences.get(&term).copied().unwrap_or(0)
    }

    /// Looks the text of a `term` token up in the specializers.
    pub fn specialize(&self, term: u32, text: &str) -> Option<(SpecializeKind, u32)> {
        self.0
            .specializers
            .iter()
            .filter(|s| s.term == term)
            .find_map(|s| s.words.get(text).map(|&special| (s.kind, special)))
    }

    pub fn term_name(&self, term: u32) -> Option<&str> {
        match self.0.term_names.get(&term) {
            Some(name) => Some(name),
            None => self.node_type(term).map(NodeType::name),
        }
    }

    /// Finds a term by name.
    pub fn term(&self, name: &str) -> Result<u32> {
        self.0
            .term_names
            .iter()
            .find(|(_, n)| &***n == name)
            .map(|(&term, _)| term)
            .or_else(|| self.0.node_set.find(name).map(|ty| u32::from(ty.id())))
            .ok_or_else(|| Error::UnknownTerm(name.to_owned()))
    }
}

impl Parser for Grammar {
    fn create_parse<'a>(
        &self,
        input: &'a dyn Input,
        fragments: &[TreeFragment],
        ranges: &[TextRange],
    ) -> Result<Box<dyn PartialParse + 'a>> {
        let ranges = check_ranges(ranges, input)?;
        TreeFragment::check(fragments, input.len())?;
        Ok(Box::new(Parse::new(self.clone(), input, fragments, &ranges)))
    }
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("states", &self.0.tables.state_count())
            .field("node_types", &self.0.node_set.len())
            .field("tokenizers", &self.0.tokenizers.len())
            .field("config", &self.0.config)
            .finish()
    }
}
