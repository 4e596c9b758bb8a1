use crate::language::{
    ast::{FragmentKind, MacroDefinition, MacroRule, PatternElement, RepetitionKind},
    errors::{MacroDefError, SyntaxError},
    lexer::lex,
    span::Span,
    token::{Token, TokenKind},
};

/// Parses a single `macro_rules!` or `macro` definition from source text.
pub fn parse_macro_definition(source: &str) -> Result<MacroDefinition, MacroDefError> {
    let tokens = lex(source).map_err(|errors| {
        let first = errors
            .into_iter()
            .next()
            .map(|err| SyntaxError::new(err.message, err.span))
            .unwrap_or_else(|| SyntaxError::new("Invalid macro definition", Span::default()));
        MacroDefError::from_syntax("<unknown>", first)
    })?;
    parse_macro_tokens(&tokens)
}

pub fn parse_macro_tokens(tokens: &[Token]) -> Result<MacroDefinition, MacroDefError> {
    let mut parser = DefinitionParser::new(tokens);
    parser
        .parse()
        .map_err(|err| MacroDefError::from_syntax(parser.name.clone(), err))
}

/// Token ranges of every macro definition found in a token stream, in
/// source order. Each range covers the definition from its introducing
/// keyword through its closing delimiter.
pub fn find_macro_definitions(tokens: &[Token]) -> Vec<std::ops::Range<usize>> {
    let mut found = Vec::new();
    let mut idx = 0;
    while idx < tokens.len() {
        let end = match &tokens[idx].kind {
            TokenKind::Identifier(word) if word == "macro_rules" => {
                if matches!(tokens.get(idx + 1).map(|t| &t.kind), Some(TokenKind::Bang))
                    && matches!(tokens.get(idx + 2).map(|t| &t.kind), Some(TokenKind::Identifier(_)))
                {
                    group_end(tokens, idx + 3)
                } else {
                    None
                }
            }
            TokenKind::Identifier(word) if word == "macro" => {
                match tokens.get(idx + 1).map(|t| &t.kind) {
                    Some(TokenKind::Identifier(_)) => match tokens.get(idx + 2).map(|t| &t.kind) {
                        Some(TokenKind::LParen) => {
                            group_end(tokens, idx + 2).and_then(|close| group_end(tokens, close + 1))
                        }
                        Some(TokenKind::LBrace) => group_end(tokens, idx + 2),
                        _ => None,
                    },
                    _ => None,
                }
            }
            _ => None,
        };
        match end {
            Some(close) => {
                found.push(idx..close + 1);
                idx = close + 1;
            }
            None => idx += 1,
        }
    }
    found
}

/// Index of the delimiter closing the group opened at `open`.
pub fn group_end(tokens: &[Token], open: usize) -> Option<usize> {
    tokens.get(open)?.kind.open_delimiter()?;
    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate().skip(open) {
        if token.kind.open_delimiter().is_some() {
            depth += 1;
        } else if token.kind.close_delimiter().is_some() {
            depth -= 1;
            if depth == 0 {
                return Some(idx);
            }
        }
    }
    None
}

pub(crate) fn tokens_span(tokens: &[Token]) -> Span {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => first.span.join(last.span),
        _ => Span::default(),
    }
}

struct DefinitionParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    name: String,
}

impl<'a> DefinitionParser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            name: String::from("<unknown>"),
        }
    }

    fn parse(&mut self) -> Result<MacroDefinition, SyntaxError> {
        let start = self.current_span_start();
        let rules = if self.matches_ident("macro_rules") {
            self.expect(TokenKind::Bang)?;
            self.name = self.expect_identifier("Expected macro name after `macro_rules!`")?;
            let close = self.expect_open_delimiter("Expected macro body")?;
            self.parse_rules(close)?
        } else if self.matches_ident("macro") {
            self.name = self.expect_identifier("Expected macro name after `macro`")?;
            if self.check(&TokenKind::LParen) {
                let rule_start = self.current_span_start();
                self.advance();
                let pattern = self.parse_pattern(TokenKind::RParen)?;
                self.skip_transcriber()?;
                vec![MacroRule {
                    pattern,
                    span: Span::new(rule_start, self.last_span_end(rule_start)),
                }]
            } else {
                self.expect(TokenKind::LBrace)?;
                self.parse_rules(TokenKind::RBrace)?
            }
        } else {
            return Err(self
                .error_here("Expected `macro_rules!` or `macro`")
                .with_help("declarative macros start with `macro_rules! name { ... }`"));
        };
        Ok(MacroDefinition::new(
            self.name.clone(),
            rules,
            Span::new(start, self.last_span_end(start)),
        ))
    }

    fn parse_rules(&mut self, close: TokenKind) -> Result<Vec<MacroRule>, SyntaxError> {
        let mut rules = Vec::new();
        loop {
            if self.matches(&close) {
                break;
            }
            if self.is_eof() {
                return Err(self.error_here("Unclosed macro body"));
            }
            let rule_start = self.current_span_start();
            let matcher_close = self.expect_open_delimiter("Expected a macro matcher")?;
            let pattern = self.parse_pattern(matcher_close)?;
            if !self.matches(&TokenKind::FatArrow) {
                return Err(self
                    .error_here("Expected `=>` after macro matcher")
                    .with_help("each rule is written `(matcher) => { transcriber }`"));
            }
            self.skip_transcriber()?;
            rules.push(MacroRule {
                pattern,
                span: Span::new(rule_start, self.last_span_end(rule_start)),
            });
            if !self.matches(&TokenKind::Semi) {
                self.matches(&TokenKind::Comma);
            }
        }
        Ok(rules)
    }

    fn parse_pattern(&mut self, close: TokenKind) -> Result<Vec<PatternElement>, SyntaxError> {
        let mut elements = Vec::new();
        loop {
            let Some(token) = self.tokens.get(self.pos) else {
                return Err(self.error_here(&format!("Expected `{}` to close matcher", close)));
            };
            if token.kind == close {
                self.advance();
                return Ok(elements);
            }
            if token.kind.close_delimiter().is_some() {
                return Err(self.error_here(&format!("Mismatched `{}` in matcher", token.kind)));
            }
            if let Some(delimiter) = token.kind.open_delimiter() {
                self.advance();
                let inner = self.parse_pattern(delimiter.close())?;
                elements.push(PatternElement::Group {
                    delimiter,
                    elements: inner,
                });
                continue;
            }
            if token.kind == TokenKind::Dollar {
                self.advance();
                elements.push(self.parse_dollar()?);
                continue;
            }
            elements.push(PatternElement::Literal(token.kind.clone()));
            self.advance();
        }
    }

    fn parse_dollar(&mut self) -> Result<PatternElement, SyntaxError> {
        let Some(token) = self.tokens.get(self.pos) else {
            return Err(self.error_here("Expected metavariable after `$`"));
        };
        match &token.kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                if !self.matches(&TokenKind::Colon) {
                    return Err(self
                        .error_here(&format!("Missing fragment specifier for `${name}`"))
                        .with_help(format!("write `${name}:expr`, `${name}:ty`, ...")));
                }
                let spec_span = self.current_span();
                let spec = self.expect_identifier("Expected fragment specifier")?;
                let kind = spec
                    .parse::<FragmentKind>()
                    .map_err(|message| SyntaxError::new(message, spec_span))?;
                Ok(PatternElement::Metavar { name, kind })
            }
            kind => match kind.open_delimiter() {
                Some(delimiter) => {
                    self.advance();
                    let elements = self.parse_pattern(delimiter.close())?;
                    let (separator, kleene) = self.parse_kleene()?;
                    Ok(PatternElement::Repetition {
                        elements,
                        separator,
                        kleene,
                    })
                }
                None => Err(self.error_here("Expected metavariable or repetition after `$`")),
            },
        }
    }

    fn parse_kleene(&mut self) -> Result<(Option<TokenKind>, RepetitionKind), SyntaxError> {
        let Some(token) = self.tokens.get(self.pos) else {
            return Err(self.error_here("Expected repetition operator"));
        };
        if let Some(kleene) = RepetitionKind::from_token(&token.kind) {
            self.advance();
            return Ok((None, kleene));
        }
        if token.kind.open_delimiter().is_some() || token.kind.close_delimiter().is_some() {
            return Err(self
                .error_here("Delimiters cannot separate repetitions")
                .with_help("use `*`, `+` or `?` after the repeated group"));
        }
        let separator = token.kind.clone();
        self.advance();
        match self.tokens.get(self.pos).map(|t| &t.kind) {
            Some(TokenKind::Star) => {
                self.advance();
                Ok((Some(separator), RepetitionKind::ZeroOrMore))
            }
            Some(TokenKind::Plus) => {
                self.advance();
                Ok((Some(separator), RepetitionKind::OneOrMore))
            }
            Some(TokenKind::Question) => Err(self
                .error_here("The `?` repetition operator does not take a separator")),
            _ => Err(self.error_here("Expected `*` or `+` after repetition separator")),
        }
    }

    fn skip_transcriber(&mut self) -> Result<(), SyntaxError> {
        if !self
            .tokens
            .get(self.pos)
            .is_some_and(|token| token.kind.open_delimiter().is_some())
        {
            return Err(self.error_here("Expected macro transcriber"));
        }
        match group_end(self.tokens, self.pos) {
            Some(close) => {
                self.pos = close + 1;
                Ok(())
            }
            None => Err(self.error_here("Unclosed macro transcriber")),
        }
    }

    fn expect_open_delimiter(&mut self, msg: &str) -> Result<TokenKind, SyntaxError> {
        match self.tokens.get(self.pos).and_then(|t| t.kind.open_delimiter()) {
            Some(delimiter) => {
                self.advance();
                Ok(delimiter.close())
            }
            None => Err(self.error_here(msg)),
        }
    }

    fn expect_identifier(&mut self, msg: &str) -> Result<String, SyntaxError> {
        match self.tokens.get(self.pos).map(|t| &t.kind) {
            Some(TokenKind::Identifier(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here(msg)),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), SyntaxError> {
        if self.matches(&kind) {
            Ok(())
        } else {
            Err(self.error_here(&format!("Expected `{}`", kind)))
        }
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn matches_ident(&mut self, word: &str) -> bool {
        if self
            .tokens
            .get(self.pos)
            .is_some_and(|token| token.kind.is_ident(word))
        {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        matches!(self.tokens.get(self.pos), Some(token) if &token.kind == kind)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or_else(|| self.tokens.last().map(|t| t.span).unwrap_or_default())
    }

    fn current_span_start(&self) -> usize {
        self.current_span().start
    }

    fn last_span_end(&self, fallback: usize) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|idx| self.tokens.get(idx))
            .map(|t| t.span.end)
            .unwrap_or(fallback)
    }

    fn error_here(&self, message: &str) -> SyntaxError {
        SyntaxError::new(message.to_string(), self.current_span())
    }
}
