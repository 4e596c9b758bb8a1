use crate::language::{
    span::Span,
    token::{Token, TokenKind},
};
use miette::{Diagnostic, SourceSpan};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char as nom_char, one_of, satisfy},
    combinator::{opt, recognize},
    sequence::{pair, tuple},
    IResult,
};
use thiserror::Error;

#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
#[error("{message}")]
#[diagnostic(code(macro_complete::lex))]
pub struct LexError {
    pub message: String,
    pub span: Span,
    #[label("here")]
    pub source_span: SourceSpan,
}

impl LexError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            source_span: (span.start, span.len()).into(),
        }
    }
}

pub fn lex(source: &str) -> Result<Vec<Token>, Vec<LexError>> {
    let (tokens, errors) = lex_lossy(source);
    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

/// Tokenizes as much as possible, returning whatever was recognized next to
/// the errors. Used where a file is mid-edit and still has to be navigated.
pub fn lex_lossy(source: &str) -> (Vec<Token>, Vec<LexError>) {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    src: &'a str,
    offset: usize,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            offset: 0,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn run(mut self) -> (Vec<Token>, Vec<LexError>) {
        while let Some(ch) = self.current() {
            let rest = self.rest();
            match ch {
                '/' if rest.starts_with("//") => self.eat_line_comment(),
                '/' if rest.starts_with("/*") => self.eat_block_comment(),
                ch if ch.is_whitespace() => self.bump(ch.len_utf8()),
                '"' => self.lex_string(self.offset, 0, false),
                '\'' => self.lex_quote(),
                'b' if rest.starts_with("b\"") => self.lex_string(self.offset, 1, true),
                'b' if rest.starts_with("b'") => self.lex_byte(),
                'b' if rest.starts_with("br\"") || rest.starts_with("br#") => {
                    self.lex_raw_string(self.offset, 2, true)
                }
                'r' if rest.starts_with("r\"") || rest.starts_with("r#\"") || rest.starts_with("r##") => {
                    self.lex_raw_string(self.offset, 1, false)
                }
                ch if ch.is_ascii_digit() => self.lex_number(),
                ch if ch.is_alphabetic() || ch == '_' => self.lex_identifier(),
                _ => self.lex_symbol(),
            }
        }
        (self.tokens, self.errors)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.offset..]
    }

    fn current(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self, len: usize) {
        self.offset = (self.offset + len).min(self.src.len());
    }

    fn push_token(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token::new(kind, Span::new(start, end)));
    }

    fn error(&mut self, start: usize, end: usize, message: impl Into<String>) {
        self.errors.push(LexError::new(message, Span::new(start, end)));
    }

    fn eat_line_comment(&mut self) {
        let len = self.rest().find('\n').unwrap_or(self.rest().len());
        self.bump(len);
    }

    fn eat_block_comment(&mut self) {
        let start = self.offset;
        self.bump(2);
        let mut depth = 1usize;
        while depth > 0 {
            let rest = self.rest();
            if rest.is_empty() {
                self.error(start, self.offset, "Unterminated block comment");
                return;
            }
            if rest.starts_with("/*") {
                depth += 1;
                self.bump(2);
            } else if rest.starts_with("*/") {
                depth -= 1;
                self.bump(2);
            } else {
                let width = rest.chars().next().map(char::len_utf8).unwrap_or(1);
                self.bump(width);
            }
        }
    }

    fn lex_identifier(&mut self) {
        let start = self.offset;
        match raw_or_plain_identifier(self.rest()) {
            Ok((remaining, text)) => {
                let end = self.src.len() - remaining.len();
                self.offset = end;
                let kind = if text == "_" {
                    TokenKind::Underscore
                } else {
                    TokenKind::Identifier(text.to_string())
                };
                self.push_token(kind, start, end);
            }
            Err(_) => {
                self.bump(1);
                self.error(start, self.offset, "Invalid identifier");
            }
        }
    }

    fn lex_number(&mut self) {
        let start = self.offset;
        match number(self.rest()) {
            Ok((remaining, (text, is_float))) => {
                let end = self.src.len() - remaining.len();
                self.offset = end;
                let kind = if is_float {
                    TokenKind::Float(text.to_string())
                } else {
                    TokenKind::Integer(text.to_string())
                };
                self.push_token(kind, start, end);
            }
            Err(_) => {
                self.bump(1);
                self.error(start, self.offset, "Invalid numeric literal");
            }
        }
    }

    /// Scans a quoted literal starting `prefix` bytes after `start`. The
    /// contents are kept verbatim; delimiters inside never become tokens.
    fn lex_string(&mut self, start: usize, prefix: usize, byte: bool) {
        self.bump(prefix + 1);
        let mut escaped = false;
        while let Some(ch) = self.current() {
            self.bump(ch.len_utf8());
            match ch {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => {
                    let text = self.src[start..self.offset].to_string();
                    let kind = if byte {
                        TokenKind::ByteString(text)
                    } else {
                        TokenKind::String(text)
                    };
                    self.push_token(kind, start, self.offset);
                    return;
                }
                _ => escaped = false,
            }
        }
        self.error(start, self.offset, "Unterminated string literal");
    }

    fn lex_raw_string(&mut self, start: usize, prefix: usize, byte: bool) {
        self.bump(prefix);
        let hashes = self.rest().chars().take_while(|ch| *ch == '#').count();
        self.bump(hashes);
        if self.current() != Some('"') {
            self.error(start, self.offset, "Invalid raw string literal");
            return;
        }
        self.bump(1);
        let closing = format!("\"{}", "#".repeat(hashes));
        match self.rest().find(&closing) {
            Some(idx) => {
                self.bump(idx + closing.len());
                let text = self.src[start..self.offset].to_string();
                let kind = if byte {
                    TokenKind::ByteString(text)
                } else {
                    TokenKind::String(text)
                };
                self.push_token(kind, start, self.offset);
            }
            None => {
                self.offset = self.src.len();
                self.error(start, self.offset, "Unterminated raw string literal");
            }
        }
    }

    fn lex_byte(&mut self) {
        let start = self.offset;
        self.bump(1);
        match self.scan_char_body() {
            Some(()) => {
                let text = self.src[start..self.offset].to_string();
                self.push_token(TokenKind::Byte(text), start, self.offset);
            }
            None => self.error(start, self.offset, "Unterminated byte literal"),
        }
    }

    /// Disambiguates `'a'` (char) from `'a` (lifetime or label).
    fn lex_quote(&mut self) {
        let start = self.offset;
        let mut chars = self.rest().chars().skip(1);
        let first = chars.next();
        let second = chars.next();
        let is_lifetime = match (first, second) {
            (_, Some('\'')) => false,
            (Some(ch), _) => ch.is_alphabetic() || ch == '_',
            _ => false,
        };
        if is_lifetime {
            self.bump(1);
            let ident_start = self.offset;
            match raw_or_plain_identifier(self.rest()) {
                Ok((remaining, _)) => {
                    self.offset = self.src.len() - remaining.len();
                    let text = format!("'{}", &self.src[ident_start..self.offset]);
                    self.push_token(TokenKind::Lifetime(text), start, self.offset);
                }
                Err(_) => self.error(start, self.offset, "Invalid lifetime"),
            }
            return;
        }
        match self.scan_char_body() {
            Some(()) => {
                let text = self.src[start..self.offset].to_string();
                self.push_token(TokenKind::Char(text), start, self.offset);
            }
            None => self.error(start, self.offset, "Unterminated character literal"),
        }
    }

    /// Consumes `'x'` / `'\n'` / `'\u{..}'` starting at the opening quote.
    fn scan_char_body(&mut self) -> Option<()> {
        self.bump(1);
        match self.current()? {
            '\\' => {
                self.bump(1);
                let escaped = self.current()?;
                self.bump(escaped.len_utf8());
                if escaped == 'u' && self.current() == Some('{') {
                    let close = self.rest().find('}')?;
                    self.bump(close + 1);
                }
            }
            '\'' | '\n' => return None,
            ch => self.bump(ch.len_utf8()),
        }
        if self.current() == Some('\'') {
            self.bump(1);
            Some(())
        } else {
            None
        }
    }

    fn lex_symbol(&mut self) {
        let start = self.offset;
        match punctuation(self.rest()) {
            Ok((remaining, text)) => {
                let end = self.src.len() - remaining.len();
                self.offset = end;
                match punctuation_kind(text) {
                    Some(kind) => self.push_token(kind, start, end),
                    None => self.error(start, end, format!("Unexpected character '{}'", text)),
                }
            }
            Err(_) => {
                let width = self.current().map(char::len_utf8).unwrap_or(1);
                self.bump(width);
                let text = &self.src[start..self.offset];
                self.error(start, self.offset, format!("Unexpected character '{}'", text));
            }
        }
    }
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

fn plain_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|ch| ch.is_alphabetic() || ch == '_'),
        take_while(is_ident_continue),
    ))(input)
}

fn raw_or_plain_identifier(input: &str) -> IResult<&str, &str> {
    alt((recognize(pair(tag("r#"), plain_identifier)), plain_identifier))(input)
}

fn digits(input: &str) -> IResult<&str, &str> {
    take_while1(|ch: char| ch.is_ascii_digit() || ch == '_')(input)
}

fn radix_number(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        nom_char('0'),
        one_of("xXoObB"),
        take_while1(|ch: char| ch.is_ascii_hexdigit() || ch == '_'),
        take_while(is_ident_continue),
    )))(input)
}

/// Returns the literal text and whether it denotes a float.
fn number(input: &str) -> IResult<&str, (&str, bool)> {
    if let Ok((rest, text)) = radix_number(input) {
        return Ok((rest, (text, false)));
    }
    let (rest, (_, fraction, exponent, suffix)) = tuple((
        digits,
        opt(recognize(tuple((
            nom_char('.'),
            satisfy(|ch| ch.is_ascii_digit()),
            take_while(|ch: char| ch.is_ascii_digit() || ch == '_'),
        )))),
        opt(recognize(tuple((one_of("eE"), opt(one_of("+-")), digits)))),
        take_while(is_ident_continue),
    ))(input)?;
    let consumed = input.len() - rest.len();
    let is_float = fraction.is_some() || exponent.is_some() || suffix.starts_with('f');
    Ok((rest, (&input[..consumed], is_float)))
}

fn punctuation(input: &str) -> IResult<&str, &str> {
    alt((
        alt((tag("<<="), tag(">>="), tag("..="), tag("..."))),
        alt((
            tag("::"),
            tag("->"),
            tag("=>"),
            tag("=="),
            tag("!="),
            tag("<="),
            tag(">="),
            tag("&&"),
            tag("||"),
            tag("<<"),
            tag(">>"),
            tag("+="),
            tag("-="),
            tag("*="),
            tag("/="),
            tag("%="),
            tag("^="),
            tag("&="),
            tag("|="),
            tag(".."),
        )),
        recognize(one_of("+-*/%^!&|=<>@.,;:?~#$()[]{}")),
    ))(input)
}

fn punctuation_kind(text: &str) -> Option<TokenKind> {
    let kind = match text {
        "<<=" => TokenKind::ShlEq,
        ">>=" => TokenKind::ShrEq,
        "..=" => TokenKind::DotDotEq,
        "..." => TokenKind::DotDotDot,
        "::" => TokenKind::ColonColon,
        "->" => TokenKind::Arrow,
        "=>" => TokenKind::FatArrow,
        "==" => TokenKind::EqEq,
        "!=" => TokenKind::BangEq,
        "<=" => TokenKind::LtEq,
        ">=" => TokenKind::GtEq,
        "&&" => TokenKind::AmpersandAmpersand,
        "||" => TokenKind::PipePipe,
        "<<" => TokenKind::Shl,
        ">>" => TokenKind::Shr,
        "+=" => TokenKind::PlusEq,
        "-=" => TokenKind::MinusEq,
        "*=" => TokenKind::StarEq,
        "/=" => TokenKind::SlashEq,
        "%=" => TokenKind::PercentEq,
        "^=" => TokenKind::CaretEq,
        "&=" => TokenKind::AmpersandEq,
        "|=" => TokenKind::PipeEq,
        ".." => TokenKind::DotDot,
        "+" => TokenKind::Plus,
        "-" => TokenKind::Minus,
        "*" => TokenKind::Star,
        "/" => TokenKind::Slash,
        "%" => TokenKind::Percent,
        "^" => TokenKind::Caret,
        "!" => TokenKind::Bang,
        "&" => TokenKind::Ampersand,
        "|" => TokenKind::Pipe,
        "=" => TokenKind::Eq,
        "<" => TokenKind::Lt,
        ">" => TokenKind::Gt,
        "@" => TokenKind::At,
        "." => TokenKind::Dot,
        "," => TokenKind::Comma,
        ";" => TokenKind::Semi,
        ":" => TokenKind::Colon,
        "?" => TokenKind::Question,
        "~" => TokenKind::Tilde,
        "#" => TokenKind::Hash,
        "$" => TokenKind::Dollar,
        "(" => TokenKind::LParen,
        ")" => TokenKind::RParen,
        "[" => TokenKind::LBracket,
        "]" => TokenKind::RBracket,
        "{" => TokenKind::LBrace,
        "}" => TokenKind::RBrace,
        _ => return None,
    };
    Some(kind)
}
