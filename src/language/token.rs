use crate::language::span::Span;
use std::{borrow::Cow, fmt};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Surface tokens as a declarative macro sees them. Keywords are plain
/// identifiers; literal payloads keep their source text.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier(String),
    Lifetime(String),
    Integer(String),
    Float(String),
    String(String),
    ByteString(String),
    Char(String),
    Byte(String),

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Bang,
    Ampersand,
    Pipe,
    AmpersandAmpersand,
    PipePipe,
    Shl,
    Shr,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    CaretEq,
    AmpersandEq,
    PipeEq,
    ShlEq,
    ShrEq,
    Eq,
    EqEq,
    BangEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    At,
    Underscore,
    Dot,
    DotDot,
    DotDotDot,
    DotDotEq,
    Comma,
    Semi,
    Colon,
    ColonColon,
    Question,
    Tilde,
    Hash,
    Dollar,

    Arrow,    // ->
    FatArrow, // =>

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Delimiter {
    Paren,
    Bracket,
    Brace,
}

impl Delimiter {
    pub fn open(self) -> TokenKind {
        match self {
            Delimiter::Paren => TokenKind::LParen,
            Delimiter::Bracket => TokenKind::LBracket,
            Delimiter::Brace => TokenKind::LBrace,
        }
    }

    pub fn close(self) -> TokenKind {
        match self {
            Delimiter::Paren => TokenKind::RParen,
            Delimiter::Bracket => TokenKind::RBracket,
            Delimiter::Brace => TokenKind::RBrace,
        }
    }
}

impl TokenKind {
    pub fn ident(name: impl Into<String>) -> Self {
        TokenKind::Identifier(name.into())
    }

    pub fn is_ident(&self, name: &str) -> bool {
        matches!(self, TokenKind::Identifier(value) if value == name)
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            TokenKind::Identifier(name) => Some(name),
            _ => None,
        }
    }

    pub fn open_delimiter(&self) -> Option<Delimiter> {
        match self {
            TokenKind::LParen => Some(Delimiter::Paren),
            TokenKind::LBracket => Some(Delimiter::Bracket),
            TokenKind::LBrace => Some(Delimiter::Brace),
            _ => None,
        }
    }

    pub fn close_delimiter(&self) -> Option<Delimiter> {
        match self {
            TokenKind::RParen => Some(Delimiter::Paren),
            TokenKind::RBracket => Some(Delimiter::Bracket),
            TokenKind::RBrace => Some(Delimiter::Brace),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TokenKind::Integer(_)
                | TokenKind::Float(_)
                | TokenKind::String(_)
                | TokenKind::ByteString(_)
                | TokenKind::Char(_)
                | TokenKind::Byte(_)
        )
    }

    /// Tokens whose text can still grow while the user types: completion
    /// treats one of these ending exactly at the caret as the caret token.
    pub fn is_word_like(&self) -> bool {
        matches!(
            self,
            TokenKind::Identifier(_)
                | TokenKind::Lifetime(_)
                | TokenKind::Integer(_)
                | TokenKind::Underscore
        )
    }

    pub fn text(&self) -> Cow<'static, str> {
        let fixed = match self {
            TokenKind::Identifier(text)
            | TokenKind::Lifetime(text)
            | TokenKind::Integer(text)
            | TokenKind::Float(text)
            | TokenKind::String(text)
            | TokenKind::ByteString(text)
            | TokenKind::Char(text)
            | TokenKind::Byte(text) => return Cow::Owned(text.clone()),
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Caret => "^",
            TokenKind::Bang => "!",
            TokenKind::Ampersand => "&",
            TokenKind::Pipe => "|",
            TokenKind::AmpersandAmpersand => "&&",
            TokenKind::PipePipe => "||",
            TokenKind::Shl => "<<",
            TokenKind::Shr => ">>",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::StarEq => "*=",
            TokenKind::SlashEq => "/=",
            TokenKind::PercentEq => "%=",
            TokenKind::CaretEq => "^=",
            TokenKind::AmpersandEq => "&=",
            TokenKind::PipeEq => "|=",
            TokenKind::ShlEq => "<<=",
            TokenKind::ShrEq => ">>=",
            TokenKind::Eq => "=",
            TokenKind::EqEq => "==",
            TokenKind::BangEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::LtEq => "<=",
            TokenKind::Gt => ">",
            TokenKind::GtEq => ">=",
            TokenKind::At => "@",
            TokenKind::Underscore => "_",
            TokenKind::Dot => ".",
            TokenKind::DotDot => "..",
            TokenKind::DotDotDot => "...",
            TokenKind::DotDotEq => "..=",
            TokenKind::Comma => ",",
            TokenKind::Semi => ";",
            TokenKind::Colon => ":",
            TokenKind::ColonColon => "::",
            TokenKind::Question => "?",
            TokenKind::Tilde => "~",
            TokenKind::Hash => "#",
            TokenKind::Dollar => "$",
            TokenKind::Arrow => "->",
            TokenKind::FatArrow => "=>",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
        };
        Cow::Borrowed(fixed)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}
