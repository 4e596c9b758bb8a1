//! Recognizers for the fragment kinds a metavariable can capture.
//!
//! The matcher never needs a syntax tree, only the answer to "do these
//! tokens form one complete fragment, a prefix of one, or neither". Each
//! recognizer is a small recursive-descent pass over a token slice that
//! reports running out of input separately from a hard mismatch.

use crate::language::{
    ast::FragmentKind,
    token::{Token, TokenKind},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FragmentFit {
    /// The slice is exactly one instance of the fragment.
    Complete,
    /// The slice is a proper prefix of some instance.
    Incomplete,
    /// No extension of the slice is an instance.
    Mismatch,
}

impl FragmentFit {
    pub fn is_viable(self) -> bool {
        !matches!(self, FragmentFit::Mismatch)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stop {
    Incomplete,
    Mismatch,
}

type Step = Result<(), Stop>;

static GT: TokenKind = TokenKind::Gt;

const RESERVED: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "dyn", "else", "enum", "extern", "false",
    "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref",
    "return", "static", "struct", "trait", "true", "type", "unsafe", "use", "where", "while",
];

const PATH_KEYWORDS: &[&str] = &["self", "Self", "super", "crate"];

pub fn is_reserved(word: &str) -> bool {
    RESERVED.contains(&word)
}

/// Classifies `tokens` against the grammar of `kind`.
pub fn check_fragment(kind: FragmentKind, tokens: &[Token]) -> FragmentFit {
    let mut parser = FragmentParser::new(tokens);
    let step = match kind {
        FragmentKind::Expr => parser.expr(),
        FragmentKind::Ty => parser.ty(),
        FragmentKind::Ident => parser.ident(),
        FragmentKind::Pat => parser.pat(),
        FragmentKind::Block => parser.block(),
        FragmentKind::Stmt => parser.stmt(),
        FragmentKind::Path => parser.path(PathMode::Type),
        FragmentKind::Meta => parser.meta(),
        FragmentKind::Lifetime => parser.lifetime(),
        FragmentKind::Vis => parser.vis(),
        FragmentKind::Literal => parser.literal(),
        FragmentKind::Tt => parser.tt(),
        FragmentKind::Item => parser.item(),
    };
    match step {
        Ok(()) if parser.at_end() => FragmentFit::Complete,
        Ok(()) => FragmentFit::Mismatch,
        Err(Stop::Incomplete) => FragmentFit::Incomplete,
        Err(Stop::Mismatch) => FragmentFit::Mismatch,
    }
}

/// Whether a fragment of `kind` may be directly followed by `next`. Kinds
/// that can consume an unbounded number of tokens only end before a token
/// of their follow set, so the end of such a fragment is unambiguous.
pub fn can_follow(kind: FragmentKind, next: &TokenKind) -> bool {
    use TokenKind::*;
    if next.close_delimiter().is_some() {
        return true;
    }
    match kind {
        FragmentKind::Item
        | FragmentKind::Block
        | FragmentKind::Ident
        | FragmentKind::Lifetime
        | FragmentKind::Literal
        | FragmentKind::Meta
        | FragmentKind::Tt => true,
        FragmentKind::Stmt | FragmentKind::Expr => matches!(next, FatArrow | Comma | Semi),
        FragmentKind::Pat => {
            matches!(next, FatArrow | Comma | Eq) || next.is_ident("if") || next.is_ident("in")
        }
        FragmentKind::Path | FragmentKind::Ty => {
            matches!(
                next,
                LBrace | LBracket | Comma | FatArrow | Colon | Eq | Gt | Shr | Semi | Pipe
            ) || next.is_ident("as")
                || next.is_ident("where")
        }
        FragmentKind::Vis => match next {
            Comma => true,
            Identifier(word) => word != "priv",
            other => can_begin_type(other),
        },
    }
}

pub fn can_begin_type(kind: &TokenKind) -> bool {
    match kind {
        TokenKind::Identifier(word) => {
            !is_reserved(word)
                || matches!(word.as_str(), "fn" | "unsafe" | "extern" | "impl" | "dyn" | "for")
        }
        TokenKind::LParen
        | TokenKind::LBracket
        | TokenKind::Ampersand
        | TokenKind::AmpersandAmpersand
        | TokenKind::Star
        | TokenKind::Bang
        | TokenKind::Underscore
        | TokenKind::Lt
        | TokenKind::Shl
        | TokenKind::ColonColon
        | TokenKind::Question
        | TokenKind::Lifetime(_) => true,
        _ => false,
    }
}

pub fn can_begin_expr(kind: &TokenKind) -> bool {
    match kind {
        TokenKind::Identifier(word) => {
            !is_reserved(word)
                || matches!(
                    word.as_str(),
                    "true"
                        | "false"
                        | "if"
                        | "match"
                        | "loop"
                        | "while"
                        | "for"
                        | "unsafe"
                        | "async"
                        | "move"
                        | "return"
                        | "break"
                        | "continue"
                        | "let"
                        | "const"
                )
        }
        TokenKind::Lifetime(_)
        | TokenKind::LParen
        | TokenKind::LBracket
        | TokenKind::LBrace
        | TokenKind::Minus
        | TokenKind::Bang
        | TokenKind::Star
        | TokenKind::Ampersand
        | TokenKind::AmpersandAmpersand
        | TokenKind::Pipe
        | TokenKind::PipePipe
        | TokenKind::DotDot
        | TokenKind::DotDotEq
        | TokenKind::Lt
        | TokenKind::Shl
        | TokenKind::ColonColon
        | TokenKind::Hash => true,
        other => other.is_literal(),
    }
}

/// What the tokens before the caret look like when read as ordinary code,
/// independent of any macro grammar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyntacticContext {
    /// `<expr> . █`: the caret continues a field or method access.
    MemberAccess { receiver: Vec<String> },
    /// `a::b:: █`: the caret continues a path.
    PathSegment { qualifier: Vec<String> },
}

/// Recognizes member-access and path continuations at the end of `tokens`,
/// the caret's innermost group up to the caret.
pub fn probe_partial_expression(tokens: &[Token]) -> Option<SyntacticContext> {
    let statement = trailing_statement(tokens);
    let (last, before) = statement.split_last()?;
    match last.kind {
        TokenKind::Dot => {
            let receiver = chain_before(before, &TokenKind::Dot);
            if receiver.is_empty() {
                return None;
            }
            check_fragment(FragmentKind::Expr, statement)
                .is_viable()
                .then_some(SyntacticContext::MemberAccess { receiver })
        }
        TokenKind::ColonColon => {
            let qualifier = chain_before(before, &TokenKind::ColonColon);
            if qualifier.is_empty() {
                return None;
            }
            let viable = check_fragment(FragmentKind::Expr, statement).is_viable()
                || check_fragment(FragmentKind::Ty, statement).is_viable();
            viable.then_some(SyntacticContext::PathSegment { qualifier })
        }
        _ => None,
    }
}

/// Tokens after the last `,`, `;` or `=>` that is not nested in a group.
fn trailing_statement(tokens: &[Token]) -> &[Token] {
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, token) in tokens.iter().enumerate() {
        if token.kind.open_delimiter().is_some() {
            depth += 1;
        } else if token.kind.close_delimiter().is_some() {
            depth = depth.saturating_sub(1);
        } else if depth == 0
            && matches!(
                token.kind,
                TokenKind::Comma | TokenKind::Semi | TokenKind::FatArrow
            )
        {
            start = idx + 1;
        }
    }
    &tokens[start..]
}

fn chain_before(tokens: &[Token], separator: &TokenKind) -> Vec<String> {
    let mut segments = Vec::new();
    let mut idx = tokens.len();
    while idx > 0 {
        match &tokens[idx - 1].kind {
            TokenKind::Identifier(name) => segments.push(name.clone()),
            TokenKind::Integer(index) if separator == &TokenKind::Dot => segments.push(index.clone()),
            _ => break,
        }
        idx -= 1;
        if idx > 0 && &tokens[idx - 1].kind == separator {
            idx -= 1;
        } else {
            break;
        }
    }
    segments.reverse();
    segments
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum PathMode {
    /// Generic arguments need a turbofish (`::<`).
    Expr,
    /// Generic arguments follow a segment directly.
    Type,
}

struct FragmentParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    /// The current token is a `>>` whose first `>` closed a generic list.
    split_gt: bool,
}

impl<'a> FragmentParser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            split_gt: false,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len() && !self.split_gt
    }

    fn peek(&self) -> Option<&'a TokenKind> {
        if self.split_gt {
            return Some(&GT);
        }
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_n(&self, n: usize) -> Option<&'a TokenKind> {
        if n == 0 {
            return self.peek();
        }
        self.tokens.get(self.pos + n).map(|t| &t.kind)
    }

    /// The token `n` places ahead. Running off the end of the slice means
    /// more input may still arrive, so it is never a mismatch.
    fn lookahead(&self, n: usize) -> Result<&'a TokenKind, Stop> {
        self.peek_n(n).ok_or(Stop::Incomplete)
    }

    fn bump(&mut self) {
        if self.split_gt {
            self.split_gt = false;
        }
        self.pos += 1;
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == Some(kind)
    }

    fn check_ident(&self, word: &str) -> bool {
        self.peek().is_some_and(|kind| kind.is_ident(word))
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, word: &str) -> bool {
        if self.check_ident(word) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Step {
        match self.peek() {
            None => Err(Stop::Incomplete),
            Some(found) if found == kind => {
                self.bump();
                Ok(())
            }
            Some(_) => Err(Stop::Mismatch),
        }
    }

    fn expect_ident_word(&mut self, word: &str) -> Step {
        self.expect(&TokenKind::ident(word))
    }

    /// Consumes one `>`, splitting a `>>` when two generic lists close at once.
    fn expect_gt(&mut self) -> Step {
        match self.peek() {
            None => Err(Stop::Incomplete),
            Some(TokenKind::Gt) => {
                self.bump();
                Ok(())
            }
            Some(TokenKind::Shr) => {
                self.split_gt = true;
                Ok(())
            }
            Some(_) => Err(Stop::Mismatch),
        }
    }

    fn require(&self) -> Result<&'a TokenKind, Stop> {
        self.peek().ok_or(Stop::Incomplete)
    }

    /// Skips the delimited group starting at the current token.
    fn skip_group(&mut self) -> Step {
        let Some(open) = self.require()?.open_delimiter() else {
            return Err(Stop::Mismatch);
        };
        let mut stack = vec![open];
        self.bump();
        while let Some(top) = stack.last().copied() {
            let kind = self.require()?;
            if let Some(delimiter) = kind.open_delimiter() {
                stack.push(delimiter);
            } else if let Some(delimiter) = kind.close_delimiter() {
                if delimiter != top {
                    return Err(Stop::Mismatch);
                }
                stack.pop();
            }
            self.bump();
        }
        Ok(())
    }

    fn ident(&mut self) -> Step {
        match self.require()? {
            TokenKind::Identifier(_) => {
                self.bump();
                Ok(())
            }
            _ => Err(Stop::Mismatch),
        }
    }

    fn lifetime(&mut self) -> Step {
        match self.require()? {
            TokenKind::Lifetime(_) => {
                self.bump();
                Ok(())
            }
            _ => Err(Stop::Mismatch),
        }
    }

    fn literal(&mut self) -> Step {
        self.eat(&TokenKind::Minus);
        match self.require()? {
            kind if kind.is_literal() => {
                self.bump();
                Ok(())
            }
            TokenKind::Identifier(word) if word == "true" || word == "false" => {
                self.bump();
                Ok(())
            }
            _ => Err(Stop::Mismatch),
        }
    }

    fn tt(&mut self) -> Step {
        let kind = self.require()?;
        if kind.open_delimiter().is_some() {
            return self.skip_group();
        }
        if kind.close_delimiter().is_some() {
            return Err(Stop::Mismatch);
        }
        self.bump();
        Ok(())
    }

    fn block(&mut self) -> Step {
        if !self.check(&TokenKind::LBrace) {
            self.require()?;
            return Err(Stop::Mismatch);
        }
        self.skip_group()
    }

    fn vis(&mut self) -> Step {
        if !self.eat_ident("pub") {
            return Ok(());
        }
        if self.check(&TokenKind::LParen) {
            let next = self.lookahead(1)?;
            if ["crate", "self", "super", "in"].iter().any(|w| next.is_ident(w)) {
                return self.skip_group();
            }
        }
        Ok(())
    }

    fn meta(&mut self) -> Step {
        self.path(PathMode::Expr)?;
        match self.peek() {
            Some(kind) if kind.open_delimiter().is_some() => self.skip_group(),
            Some(TokenKind::Eq) => {
                self.bump();
                self.expr()
            }
            _ => Ok(()),
        }
    }

    fn path_segment_word(&self) -> Option<bool> {
        match self.peek()? {
            TokenKind::Identifier(word) => {
                Some(!is_reserved(word) || PATH_KEYWORDS.contains(&word.as_str()))
            }
            _ => Some(false),
        }
    }

    fn path(&mut self, mode: PathMode) -> Step {
        if self.check(&TokenKind::Lt) || self.check(&TokenKind::Shl) {
            self.qualified_self()?;
        } else {
            self.eat(&TokenKind::ColonColon);
            self.path_segment(mode)?;
        }
        while self.eat(&TokenKind::ColonColon) {
            if mode == PathMode::Expr && self.check(&TokenKind::Lt) {
                self.generic_args()?;
                continue;
            }
            self.path_segment(mode)?;
        }
        Ok(())
    }

    fn path_segment(&mut self, mode: PathMode) -> Step {
        match self.path_segment_word() {
            None => return Err(Stop::Incomplete),
            Some(false) => return Err(Stop::Mismatch),
            Some(true) => self.bump(),
        }
        if mode == PathMode::Type {
            if self.check(&TokenKind::Lt) {
                self.generic_args()?;
            } else if self.check(&TokenKind::LParen) {
                // `Fn(A, B) -> C` sugar
                self.skip_group()?;
                if self.eat(&TokenKind::Arrow) {
                    self.ty_no_bounds()?;
                }
            }
        }
        Ok(())
    }

    /// `<T as Trait>` at the start of a qualified path.
    fn qualified_self(&mut self) -> Step {
        if self.check(&TokenKind::Shl) {
            return Err(Stop::Mismatch);
        }
        self.expect(&TokenKind::Lt)?;
        self.ty()?;
        if self.eat_ident("as") {
            self.path(PathMode::Type)?;
        }
        self.expect_gt()?;
        if !self.check(&TokenKind::ColonColon) {
            self.require()?;
            return Err(Stop::Mismatch);
        }
        Ok(())
    }

    fn generic_args(&mut self) -> Step {
        self.expect(&TokenKind::Lt)?;
        loop {
            let kind = self.require()?;
            match kind {
                TokenKind::Gt | TokenKind::Shr => return self.expect_gt(),
                TokenKind::Lifetime(_) => self.bump(),
                TokenKind::LBrace => self.skip_group()?,
                TokenKind::Minus => {
                    self.bump();
                    self.literal()?;
                }
                kind if kind.is_literal() => self.bump(),
                TokenKind::Identifier(_)
                    if matches!(self.peek_n(1), Some(TokenKind::Eq | TokenKind::Colon)) =>
                {
                    self.bump();
                    if self.eat(&TokenKind::Eq) {
                        self.ty()?;
                    } else {
                        self.bump();
                        self.bounds()?;
                    }
                }
                _ => self.ty()?,
            }
            if !self.eat(&TokenKind::Comma) {
                return self.expect_gt();
            }
        }
    }

    fn bounds(&mut self) -> Step {
        loop {
            match self.require()? {
                TokenKind::Lifetime(_) => self.bump(),
                TokenKind::Question => {
                    self.bump();
                    self.path(PathMode::Type)?;
                }
                TokenKind::LParen => self.skip_group()?,
                TokenKind::Identifier(word) if word == "for" => {
                    self.bump();
                    self.generic_args()?;
                    self.path(PathMode::Type)?;
                }
                _ => self.path(PathMode::Type)?,
            }
            if !self.eat(&TokenKind::Plus) {
                return Ok(());
            }
        }
    }

    fn ty(&mut self) -> Step {
        self.ty_no_bounds()
    }

    fn ty_no_bounds(&mut self) -> Step {
        match self.require()? {
            TokenKind::LParen => {
                self.bump();
                if self.eat(&TokenKind::RParen) {
                    return Ok(());
                }
                loop {
                    self.ty()?;
                    if self.eat(&TokenKind::Comma) {
                        if self.eat(&TokenKind::RParen) {
                            return Ok(());
                        }
                        continue;
                    }
                    return self.expect(&TokenKind::RParen);
                }
            }
            TokenKind::LBracket => {
                self.bump();
                self.ty()?;
                if self.eat(&TokenKind::Semi) {
                    self.expr()?;
                }
                self.expect(&TokenKind::RBracket)
            }
            TokenKind::Ampersand | TokenKind::AmpersandAmpersand => {
                self.bump();
                if matches!(self.peek(), Some(TokenKind::Lifetime(_))) {
                    self.bump();
                }
                self.eat_ident("mut");
                self.ty_no_bounds()
            }
            TokenKind::Star => {
                self.bump();
                if !(self.eat_ident("const") || self.eat_ident("mut")) {
                    self.require()?;
                    return Err(Stop::Mismatch);
                }
                self.ty_no_bounds()
            }
            TokenKind::Bang | TokenKind::Underscore => {
                self.bump();
                Ok(())
            }
            TokenKind::Identifier(word) => match word.as_str() {
                "impl" | "dyn" => {
                    self.bump();
                    self.bounds()
                }
                "for" => {
                    self.bump();
                    self.generic_args()?;
                    self.ty_no_bounds()
                }
                "fn" | "unsafe" | "extern" => {
                    self.eat_ident("unsafe");
                    if self.eat_ident("extern") && matches!(self.peek(), Some(TokenKind::String(_))) {
                        self.bump();
                    }
                    self.expect_ident_word("fn")?;
                    if !self.check(&TokenKind::LParen) {
                        self.require()?;
                        return Err(Stop::Mismatch);
                    }
                    self.skip_group()?;
                    if self.eat(&TokenKind::Arrow) {
                        self.ty_no_bounds()?;
                    }
                    Ok(())
                }
                _ => self.path(PathMode::Type),
            },
            TokenKind::Lt | TokenKind::Shl | TokenKind::ColonColon => self.path(PathMode::Type),
            _ => Err(Stop::Mismatch),
        }
    }

    fn pat(&mut self) -> Step {
        self.eat(&TokenKind::Pipe);
        self.pat_no_top_alt()?;
        while self.eat(&TokenKind::Pipe) {
            self.pat_no_top_alt()?;
        }
        Ok(())
    }

    fn pat_no_top_alt(&mut self) -> Step {
        match self.require()? {
            TokenKind::Underscore | TokenKind::DotDot => {
                self.bump();
                Ok(())
            }
            TokenKind::Ampersand | TokenKind::AmpersandAmpersand => {
                self.bump();
                self.eat_ident("mut");
                self.pat_no_top_alt()
            }
            TokenKind::LParen => self.pat_list(&TokenKind::RParen),
            TokenKind::LBracket => self.pat_list(&TokenKind::RBracket),
            TokenKind::Minus => {
                self.literal()?;
                self.pat_range_tail()
            }
            kind if kind.is_literal() => {
                self.bump();
                self.pat_range_tail()
            }
            TokenKind::Identifier(word) if word == "ref" || word == "mut" || word == "box" => {
                if word == "box" {
                    self.bump();
                    return self.pat_no_top_alt();
                }
                self.eat_ident("ref");
                self.eat_ident("mut");
                self.ident()?;
                if self.eat(&TokenKind::At) {
                    self.pat_no_top_alt()?;
                }
                Ok(())
            }
            TokenKind::Identifier(word) if word == "true" || word == "false" => {
                self.bump();
                Ok(())
            }
            _ => {
                let start = self.pos;
                self.path(PathMode::Expr)?;
                let single_ident = self.pos == start + 1;
                match self.peek() {
                    Some(TokenKind::At) if single_ident => {
                        self.bump();
                        self.pat_no_top_alt()
                    }
                    Some(TokenKind::LParen) => self.pat_list(&TokenKind::RParen),
                    Some(TokenKind::LBrace) => self.skip_group(),
                    Some(TokenKind::Bang) => {
                        self.bump();
                        self.skip_group()
                    }
                    _ => self.pat_range_tail(),
                }
            }
        }
    }

    fn pat_list(&mut self, close: &TokenKind) -> Step {
        self.bump();
        loop {
            if self.eat(close) {
                return Ok(());
            }
            self.pat()?;
            if !self.eat(&TokenKind::Comma) {
                return self.expect(close);
            }
        }
    }

    fn pat_range_tail(&mut self) -> Step {
        if self.eat(&TokenKind::DotDotEq) || self.eat(&TokenKind::DotDotDot) {
            return match self.require()? {
                TokenKind::Minus => self.literal(),
                kind if kind.is_literal() => {
                    self.bump();
                    Ok(())
                }
                _ => self.path(PathMode::Expr),
            };
        }
        if self.eat(&TokenKind::DotDot) {
            match self.peek() {
                Some(kind) if kind.is_literal() => self.bump(),
                Some(TokenKind::Minus) => self.literal()?,
                _ => {}
            }
        }
        Ok(())
    }

    fn stmt(&mut self) -> Step {
        let Some(kind) = self.peek() else {
            return Err(Stop::Incomplete);
        };
        if kind.is_ident("let") {
            self.bump();
            self.pat()?;
            if self.eat(&TokenKind::Colon) {
                self.ty()?;
            }
            if self.eat(&TokenKind::Eq) {
                self.expr()?;
                if self.eat_ident("else") {
                    self.block()?;
                }
            }
            return Ok(());
        }
        if self.starts_item()? {
            return self.item();
        }
        self.expr()
    }

    fn starts_item(&self) -> Result<bool, Stop> {
        let starts = match self.peek() {
            Some(TokenKind::Hash) => true,
            Some(TokenKind::Identifier(word)) => match word.as_str() {
                "fn" | "struct" | "enum" | "union" | "trait" | "impl" | "mod" | "use" | "static"
                | "type" | "pub" | "extern" | "macro_rules" => true,
                "const" => self.lookahead(1)? != &TokenKind::LBrace,
                "unsafe" | "async" => {
                    let next = self.lookahead(1)?;
                    ["fn", "impl", "trait", "extern"].iter().any(|w| next.is_ident(w))
                }
                _ => false,
            },
            _ => false,
        };
        Ok(starts)
    }

    fn item(&mut self) -> Step {
        while self.check(&TokenKind::Hash) {
            self.bump();
            self.eat(&TokenKind::Bang);
            if !self.check(&TokenKind::LBracket) {
                self.require()?;
                return Err(Stop::Mismatch);
            }
            self.skip_group()?;
        }
        self.vis()?;
        loop {
            let matched = ["default", "unsafe", "async"]
                .iter()
                .any(|word| self.check_ident(word));
            let const_fn = self.check_ident("const") && {
                let next = self.lookahead(1)?;
                next.is_ident("fn") || next.is_ident("unsafe")
            };
            if matched || const_fn {
                self.bump();
            } else {
                break;
            }
        }
        if self.check_ident("extern") {
            self.bump();
            if matches!(self.peek(), Some(TokenKind::String(_))) {
                self.bump();
            }
            if self.check(&TokenKind::LBrace) {
                return self.skip_group();
            }
        }
        let Some(TokenKind::Identifier(keyword)) = self.peek() else {
            self.require()?;
            return Err(Stop::Mismatch);
        };
        match keyword.as_str() {
            "fn" => {
                self.bump();
                self.ident()?;
                self.item_body(true)
            }
            "struct" | "enum" | "union" | "trait" | "impl" | "mod" => {
                self.bump();
                self.item_body(true)
            }
            "use" | "const" | "static" | "type" | "crate" => {
                self.bump();
                self.item_body(false)
            }
            "macro_rules" => {
                self.bump();
                self.expect(&TokenKind::Bang)?;
                self.ident()?;
                let braced = self.check(&TokenKind::LBrace);
                self.skip_group()?;
                if !braced {
                    self.expect(&TokenKind::Semi)?;
                }
                Ok(())
            }
            word if !is_reserved(word) => {
                self.path(PathMode::Expr)?;
                self.expect(&TokenKind::Bang)?;
                let braced = self.check(&TokenKind::LBrace);
                self.skip_group()?;
                if !braced {
                    self.expect(&TokenKind::Semi)?;
                }
                Ok(())
            }
            _ => Err(Stop::Mismatch),
        }
    }

    /// Consumes up to the end of an item: a `;`, or for brace-bodied items
    /// the first top-level `{ ... }`.
    fn item_body(&mut self, ends_with_brace: bool) -> Step {
        loop {
            let kind = self.require()?;
            if kind == &TokenKind::Semi {
                self.bump();
                return Ok(());
            }
            if kind == &TokenKind::LBrace {
                self.skip_group()?;
                if ends_with_brace {
                    return Ok(());
                }
                continue;
            }
            if kind.open_delimiter().is_some() {
                self.skip_group()?;
                continue;
            }
            if kind.close_delimiter().is_some() {
                return Err(Stop::Mismatch);
            }
            self.bump();
        }
    }

    fn expr(&mut self) -> Step {
        self.expr_bp(0, true)
    }

    fn expr_no_struct(&mut self) -> Step {
        self.expr_bp(0, false)
    }

    fn expr_bp(&mut self, min_prec: u8, allow_struct: bool) -> Step {
        self.prefix_expr(allow_struct)?;
        loop {
            let Some(kind) = self.peek() else {
                return Ok(());
            };
            let Some((prec, right_assoc)) = infix_precedence(kind) else {
                return Ok(());
            };
            if prec < min_prec {
                return Ok(());
            }
            let is_cast = kind.is_ident("as");
            let is_range = matches!(kind, TokenKind::DotDot | TokenKind::DotDotEq);
            self.bump();
            if is_cast {
                self.ty_no_bounds()?;
                continue;
            }
            if is_range {
                if self.peek().is_some_and(can_begin_expr) {
                    self.expr_bp(prec + 1, allow_struct)?;
                }
                continue;
            }
            let next_prec = if right_assoc { prec } else { prec + 1 };
            self.expr_bp(next_prec, allow_struct)?;
        }
    }

    fn prefix_expr(&mut self, allow_struct: bool) -> Step {
        match self.require()? {
            TokenKind::Minus | TokenKind::Bang | TokenKind::Star => {
                self.bump();
                self.expr_bp(PREFIX_PREC, allow_struct)
            }
            TokenKind::Ampersand | TokenKind::AmpersandAmpersand => {
                self.bump();
                self.eat_ident("mut");
                self.expr_bp(PREFIX_PREC, allow_struct)
            }
            TokenKind::DotDot | TokenKind::DotDotEq => {
                self.bump();
                if self.peek().is_some_and(can_begin_expr) {
                    self.expr_bp(RANGE_PREC + 1, allow_struct)?;
                }
                Ok(())
            }
            TokenKind::Pipe | TokenKind::PipePipe => self.closure(),
            TokenKind::Identifier(word) if word == "move" => self.closure(),
            TokenKind::Identifier(word)
                if word == "return" || word == "break" || word == "continue" =>
            {
                let is_continue = word == "continue";
                self.bump();
                if matches!(self.peek(), Some(TokenKind::Lifetime(_))) {
                    self.bump();
                }
                if !is_continue && self.peek().is_some_and(can_begin_expr) {
                    self.expr_bp(0, allow_struct)?;
                }
                Ok(())
            }
            _ => {
                self.primary(allow_struct)?;
                self.postfix()
            }
        }
    }

    fn postfix(&mut self) -> Step {
        loop {
            match self.peek() {
                Some(TokenKind::Question) => self.bump(),
                Some(TokenKind::Dot) => {
                    self.bump();
                    match self.require()? {
                        TokenKind::Identifier(_) => {
                            self.bump();
                            if self.check(&TokenKind::ColonColon) {
                                self.bump();
                                self.generic_args()?;
                            }
                            if self.check(&TokenKind::LParen) {
                                self.expr_list(&TokenKind::RParen)?;
                            }
                        }
                        TokenKind::Integer(_) | TokenKind::Float(_) => self.bump(),
                        _ => return Err(Stop::Mismatch),
                    }
                }
                Some(TokenKind::LParen) => self.expr_list(&TokenKind::RParen)?,
                Some(TokenKind::LBracket) => {
                    self.bump();
                    self.expr()?;
                    self.expect(&TokenKind::RBracket)?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn expr_list(&mut self, close: &TokenKind) -> Step {
        self.bump();
        loop {
            if self.eat(close) {
                return Ok(());
            }
            self.expr()?;
            if !self.eat(&TokenKind::Comma) {
                return self.expect(close);
            }
        }
    }

    fn primary(&mut self, allow_struct: bool) -> Step {
        let kind = self.require()?;
        match kind {
            kind if kind.is_literal() => {
                self.bump();
                Ok(())
            }
            TokenKind::LParen => self.expr_list(&TokenKind::RParen),
            TokenKind::LBracket => {
                self.bump();
                if self.eat(&TokenKind::RBracket) {
                    return Ok(());
                }
                self.expr()?;
                if self.eat(&TokenKind::Semi) {
                    self.expr()?;
                    return self.expect(&TokenKind::RBracket);
                }
                loop {
                    if !self.eat(&TokenKind::Comma) {
                        return self.expect(&TokenKind::RBracket);
                    }
                    if self.eat(&TokenKind::RBracket) {
                        return Ok(());
                    }
                    self.expr()?;
                }
            }
            TokenKind::LBrace => self.skip_group(),
            TokenKind::Hash => {
                self.bump();
                if !self.check(&TokenKind::LBracket) {
                    self.require()?;
                    return Err(Stop::Mismatch);
                }
                self.skip_group()?;
                self.primary(allow_struct)
            }
            TokenKind::Lifetime(_) => {
                self.bump();
                self.expect(&TokenKind::Colon)?;
                match self.require()? {
                    TokenKind::LBrace => self.skip_group(),
                    TokenKind::Identifier(word)
                        if word == "loop" || word == "while" || word == "for" =>
                    {
                        self.primary(allow_struct)
                    }
                    _ => Err(Stop::Mismatch),
                }
            }
            TokenKind::Identifier(word) => match word.as_str() {
                "true" | "false" => {
                    self.bump();
                    Ok(())
                }
                "if" => self.if_expr(),
                "match" => {
                    self.bump();
                    self.expr_no_struct()?;
                    self.block()
                }
                "loop" => {
                    self.bump();
                    self.block()
                }
                "while" => {
                    self.bump();
                    self.condition()?;
                    self.block()
                }
                "for" => {
                    self.bump();
                    self.pat()?;
                    self.expect_ident_word("in")?;
                    self.expr_no_struct()?;
                    self.block()
                }
                "unsafe" | "async" | "const" => {
                    self.bump();
                    self.eat_ident("move");
                    self.block()
                }
                "let" => {
                    self.bump();
                    self.pat()?;
                    self.expect(&TokenKind::Eq)?;
                    self.expr_bp(LET_SCRUTINEE_PREC, allow_struct)
                }
                word if is_reserved(word) && !PATH_KEYWORDS.contains(&word) => {
                    Err(Stop::Mismatch)
                }
                _ => self.path_expr(allow_struct),
            },
            TokenKind::Lt | TokenKind::ColonColon => self.path_expr(allow_struct),
            _ => Err(Stop::Mismatch),
        }
    }

    fn path_expr(&mut self, allow_struct: bool) -> Step {
        self.path(PathMode::Expr)?;
        match self.peek() {
            Some(TokenKind::Bang) => {
                if self.lookahead(1)?.open_delimiter().is_none() {
                    return Ok(());
                }
                self.bump();
                self.skip_group()
            }
            Some(TokenKind::LBrace) if allow_struct => self.skip_group(),
            _ => Ok(()),
        }
    }

    fn condition(&mut self) -> Step {
        if self.eat_ident("let") {
            self.pat()?;
            self.expect(&TokenKind::Eq)?;
            return self.expr_no_struct();
        }
        self.expr_no_struct()
    }

    fn if_expr(&mut self) -> Step {
        self.expect_ident_word("if")?;
        self.condition()?;
        self.block()?;
        if self.eat_ident("else") {
            if self.check_ident("if") {
                return self.if_expr();
            }
            return self.block();
        }
        Ok(())
    }

    fn closure(&mut self) -> Step {
        self.eat_ident("move");
        if !self.eat(&TokenKind::PipePipe) {
            self.expect(&TokenKind::Pipe)?;
            loop {
                if self.eat(&TokenKind::Pipe) {
                    break;
                }
                self.pat_no_top_alt()?;
                if self.eat(&TokenKind::Colon) {
                    self.ty_no_bounds()?;
                }
                if !self.eat(&TokenKind::Comma) {
                    self.expect(&TokenKind::Pipe)?;
                    break;
                }
            }
        }
        if self.eat(&TokenKind::Arrow) {
            self.ty_no_bounds()?;
            return self.block();
        }
        self.expr()
    }
}

const RANGE_PREC: u8 = 2;
const LET_SCRUTINEE_PREC: u8 = 5;
const PREFIX_PREC: u8 = 13;

/// Binding power of infix operators, and whether they associate to the right.
fn infix_precedence(kind: &TokenKind) -> Option<(u8, bool)> {
    use TokenKind::*;
    let entry = match kind {
        Eq | PlusEq | MinusEq | StarEq | SlashEq | PercentEq | CaretEq | AmpersandEq | PipeEq
        | ShlEq | ShrEq => (1, true),
        DotDot | DotDotEq => (RANGE_PREC, false),
        PipePipe => (3, false),
        AmpersandAmpersand => (4, false),
        EqEq | BangEq | Lt | LtEq | Gt | GtEq => (5, false),
        Pipe => (6, false),
        Caret => (7, false),
        Ampersand => (8, false),
        Shl | Shr => (9, false),
        Plus | Minus => (10, false),
        Star | Slash | Percent => (11, false),
        Identifier(word) if word == "as" => (12, false),
        _ => return None,
    };
    Some(entry)
}
