use crate::language::{errors::MacroDefError, lexer::LexError};
use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
pub struct SourceDiagnostic {
    #[source_code]
    src: NamedSource,
    #[label("{label}")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    message: String,
    label: String,
}

impl SourceDiagnostic {
    pub fn from_macro_error(src: NamedSource, err: &MacroDefError) -> Self {
        Self {
            src,
            span: err.span,
            help: err.help.clone(),
            message: err.to_string(),
            label: err.message.clone(),
        }
    }

    pub fn from_lex_error(src: NamedSource, err: &LexError) -> Self {
        Self {
            src,
            span: err.source_span,
            help: None,
            message: err.message.clone(),
            label: String::from("here"),
        }
    }
}

pub fn render_macro_errors(path: &Path, source: &str, errors: &[MacroDefError]) -> Vec<String> {
    errors
        .iter()
        .map(|err| {
            let src = NamedSource::new(path.display().to_string(), source.to_string());
            format!("{:?}", Report::new(SourceDiagnostic::from_macro_error(src, err)))
        })
        .collect()
}

pub fn emit_macro_errors(path: &Path, source: &str, errors: &[MacroDefError]) {
    for rendered in render_macro_errors(path, source, errors) {
        eprintln!("{rendered}");
    }
}

pub fn emit_lex_errors(path: &Path, source: &str, errors: &[LexError]) {
    for err in errors {
        let src = NamedSource::new(path.display().to_string(), source.to_string());
        eprintln!("{:?}", Report::new(SourceDiagnostic::from_lex_error(src, err)));
    }
}

pub fn report_io_error(path: &Path, error: &std::io::Error) {
    eprintln!("Failed to access {}: {}", path.display(), error);
}
