use crate::language::span::Span;
use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
    pub help: Option<String>,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn to_source_span(&self) -> SourceSpan {
        (self.span.start, self.span.len()).into()
    }
}

/// A macro definition that could not be turned into matchable rules.
#[derive(Clone, Debug, Error, Diagnostic)]
#[error("malformed macro definition `{name}`: {message}")]
#[diagnostic(code(macro_complete::macro_definition))]
pub struct MacroDefError {
    pub name: String,
    pub message: String,
    #[label("{message}")]
    pub span: SourceSpan,
    #[help]
    pub help: Option<String>,
}

impl MacroDefError {
    pub fn from_syntax(name: impl Into<String>, err: SyntaxError) -> Self {
        Self {
            name: name.into(),
            span: err.to_source_span(),
            message: err.message,
            help: err.help,
        }
    }
}
