use super::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    Value,
    Type,
    Macro,
    Lifetime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamespaceFilter {
    Only(Namespace),
    Unfiltered,
}

impl NamespaceFilter {
    pub fn admits(self, namespace: Namespace) -> bool {
        match self {
            NamespaceFilter::Only(expected) => expected == namespace,
            NamespaceFilter::Unfiltered => true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Local,
    Function,
    Constant,
    Static,
    Struct,
    Enum,
    Variant,
    Trait,
    TypeAlias,
    Module,
    Field,
    Method,
    Macro,
    Primitive,
    Lifetime,
}

/// A name known to a scope provider. `accessible` is already resolved
/// against the requesting scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub namespace: Namespace,
    pub kind: SymbolKind,
    pub detail: Option<String>,
    pub accessible: bool,
}

impl Symbol {
    pub fn new(name: impl Into<String>, namespace: Namespace, kind: SymbolKind) -> Self {
        Self {
            name: name.into(),
            namespace,
            kind,
            detail: None,
            accessible: true,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_access(mut self, accessible: bool) -> Self {
        self.accessible = accessible;
        self
    }
}

/// Where a request was made: the enclosing module path (`crate`,
/// `crate::a::b`) and the byte offset in the file.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScopeHandle {
    pub module: String,
    pub offset: usize,
}

impl ScopeHandle {
    pub fn new(module: impl Into<String>, offset: usize) -> Self {
        Self {
            module: module.into(),
            offset,
        }
    }

    pub fn root(offset: usize) -> Self {
        Self::new(ROOT_MODULE, offset)
    }
}

pub const ROOT_MODULE: &str = "crate";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expectation {
    Fragment(FragmentKind),
    Literal(TokenKind),
}

/// Expectations at the caret, unioned over every rule, in the order they
/// were first found.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpectationSet {
    items: Vec<Expectation>,
}

impl ExpectationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, expectation: Expectation) -> bool {
        if self.items.contains(&expectation) {
            return false;
        }
        self.items.push(expectation);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Expectation> {
        self.items.iter()
    }

    pub fn fragments(&self) -> impl Iterator<Item = FragmentKind> + '_ {
        self.items.iter().filter_map(|item| match item {
            Expectation::Fragment(kind) => Some(*kind),
            Expectation::Literal(_) => None,
        })
    }

    pub fn literals(&self) -> impl Iterator<Item = &TokenKind> {
        self.items.iter().filter_map(|item| match item {
            Expectation::Literal(kind) => Some(kind),
            Expectation::Fragment(_) => None,
        })
    }

    pub fn expects_fragment(&self, kind: FragmentKind) -> bool {
        self.fragments().any(|found| found == kind)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateOrigin {
    /// Ordinary member or path completion.
    FullExpression,
    /// A symbol admitted by an expected fragment kind.
    MacroFragment,
    /// A literal token of a macro rule, or a keyword a fragment can start with.
    MacroLiteral,
    LastResort,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub display_text: String,
    pub insert_text: String,
    pub fragment_kinds: Vec<FragmentKind>,
    pub origin: CandidateOrigin,
    pub namespace: Option<Namespace>,
    pub detail: Option<String>,
}

impl Candidate {
    pub fn from_symbol(symbol: &Symbol, origin: CandidateOrigin) -> Self {
        Self {
            display_text: symbol.name.clone(),
            insert_text: symbol.name.clone(),
            fragment_kinds: Vec::new(),
            origin,
            namespace: Some(symbol.namespace),
            detail: symbol.detail.clone(),
        }
    }

    pub fn keyword(text: impl Into<String>, origin: CandidateOrigin) -> Self {
        let text = text.into();
        Self {
            display_text: text.clone(),
            insert_text: text,
            fragment_kinds: Vec::new(),
            origin,
            namespace: None,
            detail: None,
        }
    }

    pub fn justified_by(mut self, kind: Option<FragmentKind>) -> Self {
        if let Some(kind) = kind {
            if !self.fragment_kinds.contains(&kind) {
                self.fragment_kinds.push(kind);
            }
        }
        self
    }
}

/// Candidates de-duplicated by display text. A repeated candidate keeps its
/// first position and accumulates the fragment kinds that justified it.
#[derive(Debug, Default)]
pub struct CandidateList {
    items: Vec<Candidate>,
    index: HashMap<String, usize>,
}

impl CandidateList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, candidate: Candidate) {
        match self.index.get(&candidate.display_text) {
            Some(&idx) => {
                let existing = &mut self.items[idx];
                for kind in candidate.fragment_kinds {
                    if !existing.fragment_kinds.contains(&kind) {
                        existing.fragment_kinds.push(kind);
                    }
                }
            }
            None => {
                self.index
                    .insert(candidate.display_text.clone(), self.items.len());
                self.items.push(candidate);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self, limit: Option<usize>) -> Vec<Candidate> {
        let mut items = self.items;
        if let Some(limit) = limit {
            items.truncate(limit);
        }
        items
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    FullExpression,
    PartialMatch,
    LastResort,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LastResortReason {
    UnresolvedMacro,
    MalformedInput,
    CaretInLiteral,
    NoRuleReachedCaret,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceEvent {
    StrategyFired(Strategy),
    LastResort(LastResortReason),
    Context(SyntacticContext),
    RulePruned { rule: usize },
    RuleBudgetExhausted { rule: usize, steps: usize },
}

/// What happened while serving one request. Returned with the result so
/// callers can check which strategy produced the candidates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestTrace {
    events: Vec<TraceEvent>,
}

impl RequestTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: TraceEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn strategies(&self) -> Vec<Strategy> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TraceEvent::StrategyFired(strategy) => Some(*strategy),
                _ => None,
            })
            .collect()
    }

    pub fn last_resort_reason(&self) -> Option<LastResortReason> {
        self.events.iter().find_map(|event| match event {
            TraceEvent::LastResort(reason) => Some(*reason),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub candidates: Vec<Candidate>,
    pub trace: RequestTrace,
}

impl CompletionOutcome {
    /// The strategy that produced the candidates.
    pub fn strategy(&self) -> Option<Strategy> {
        self.trace.strategies().first().copied()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.candidates
            .iter()
            .map(|candidate| candidate.display_text.as_str())
            .collect()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.candidates
            .iter()
            .any(|candidate| candidate.display_text == label)
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("completion request was cancelled")]
pub struct Cancelled;
