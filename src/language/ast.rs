use crate::language::{
    span::Span,
    token::{Delimiter, TokenKind},
};
use std::{fmt, str::FromStr};

#[derive(Clone, Debug, PartialEq)]
pub struct MacroDefinition {
    pub name: String,
    pub rules: Vec<MacroRule>,
    pub span: Span,
}

impl MacroDefinition {
    pub fn new(name: impl Into<String>, rules: Vec<MacroRule>, span: Span) -> Self {
        Self {
            name: name.into(),
            rules,
            span,
        }
    }

    /// A definition whose rules could not be read. Completion treats it like
    /// an unresolved macro.
    pub fn without_rules(name: impl Into<String>, span: Span) -> Self {
        Self::new(name, Vec::new(), span)
    }

    pub fn has_rules(&self) -> bool {
        !self.rules.is_empty()
    }
}

/// One matcher of a macro. The transcriber is irrelevant to matching and is
/// not kept.
#[derive(Clone, Debug, PartialEq)]
pub struct MacroRule {
    pub pattern: Vec<PatternElement>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PatternElement {
    Literal(TokenKind),
    Metavar {
        name: String,
        kind: FragmentKind,
    },
    Group {
        delimiter: Delimiter,
        elements: Vec<PatternElement>,
    },
    Repetition {
        elements: Vec<PatternElement>,
        separator: Option<TokenKind>,
        kleene: RepetitionKind,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RepetitionKind {
    /// `?`
    ZeroOrOne,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
}

impl RepetitionKind {
    pub fn from_token(kind: &TokenKind) -> Option<Self> {
        match kind {
            TokenKind::Question => Some(RepetitionKind::ZeroOrOne),
            TokenKind::Star => Some(RepetitionKind::ZeroOrMore),
            TokenKind::Plus => Some(RepetitionKind::OneOrMore),
            _ => None,
        }
    }

    pub fn may_skip(self) -> bool {
        !matches!(self, RepetitionKind::OneOrMore)
    }

    pub fn may_repeat(self) -> bool {
        !matches!(self, RepetitionKind::ZeroOrOne)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FragmentKind {
    Expr,
    Ty,
    Ident,
    Pat,
    Block,
    Stmt,
    Path,
    Meta,
    Lifetime,
    Vis,
    Literal,
    Tt,
    Item,
}

impl FragmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FragmentKind::Expr => "expr",
            FragmentKind::Ty => "ty",
            FragmentKind::Ident => "ident",
            FragmentKind::Pat => "pat",
            FragmentKind::Block => "block",
            FragmentKind::Stmt => "stmt",
            FragmentKind::Path => "path",
            FragmentKind::Meta => "meta",
            FragmentKind::Lifetime => "lifetime",
            FragmentKind::Vis => "vis",
            FragmentKind::Literal => "literal",
            FragmentKind::Tt => "tt",
            FragmentKind::Item => "item",
        }
    }

    /// Fragments that always span exactly one token tree (or, for `literal`,
    /// a possibly negated literal) and therefore end unambiguously.
    pub fn is_single_tree(self) -> bool {
        matches!(
            self,
            FragmentKind::Ident
                | FragmentKind::Lifetime
                | FragmentKind::Block
                | FragmentKind::Tt
                | FragmentKind::Literal
        )
    }

    pub fn may_be_empty(self) -> bool {
        matches!(self, FragmentKind::Vis)
    }
}

impl FromStr for FragmentKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let kind = match value {
            "expr" | "expr_2021" => FragmentKind::Expr,
            "ty" => FragmentKind::Ty,
            "ident" => FragmentKind::Ident,
            "pat" | "pat_param" => FragmentKind::Pat,
            "block" => FragmentKind::Block,
            "stmt" => FragmentKind::Stmt,
            "path" => FragmentKind::Path,
            "meta" => FragmentKind::Meta,
            "lifetime" => FragmentKind::Lifetime,
            "vis" => FragmentKind::Vis,
            "literal" => FragmentKind::Literal,
            "tt" => FragmentKind::Tt,
            "item" => FragmentKind::Item,
            other => return Err(format!("unknown fragment specifier `{other}`")),
        };
        Ok(kind)
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
