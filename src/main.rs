use clap::Parser;
use macro_complete::{
    config::CompletionConfig,
    diagnostics::{emit_lex_errors, emit_macro_errors, report_io_error},
    language::{lexer::lex_lossy, registry::MacroRegistry},
    lsp::{complete_at, completion::NeverCancelled, text::offset_to_line_col, ScopeIndex},
};
use std::{fs, path::PathBuf, process};
use tracing_subscriber::EnvFilter;

/// Completes a partially typed macro argument in a Rust source file.
#[derive(Parser)]
#[command(name = "macro-complete")]
#[command(version)]
#[command(about = "Completion inside partially typed macro arguments")]
struct Cli {
    /// Source file to complete in
    file: PathBuf,

    /// Caret position as a byte offset into the file
    #[arg(required_unless_present = "marker", conflicts_with = "marker")]
    offset: Option<usize>,

    /// Text marking the caret; removed from the source before completing
    #[arg(long, value_parser = clap::builder::NonEmptyStringValueParser::new())]
    marker: Option<String>,

    /// TOML file with a `[completion]` table
    #[arg(long)]
    config: Option<PathBuf>,

    /// Step budget per macro rule, overriding the configuration
    #[arg(long)]
    budget: Option<usize>,
}

enum CaretArg {
    Offset(usize),
    Marker(String),
}

impl Cli {
    fn caret(&self) -> CaretArg {
        match (&self.marker, self.offset) {
            (Some(marker), _) => CaretArg::Marker(marker.clone()),
            (None, offset) => CaretArg::Offset(offset.unwrap_or_default()),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("MACRO_COMPLETE_LOG")
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    process::exit(run(cli));
}

fn run(options: Cli) -> i32 {
    let mut source = match fs::read_to_string(&options.file) {
        Ok(source) => source,
        Err(err) => {
            report_io_error(&options.file, &err);
            return 1;
        }
    };

    let caret = match options.caret() {
        CaretArg::Offset(offset) => {
            if offset > source.len() || !source.is_char_boundary(offset) {
                eprintln!(
                    "offset {offset} is not a character boundary in {}",
                    options.file.display()
                );
                return 1;
            }
            offset
        }
        CaretArg::Marker(marker) => match source.find(&marker) {
            Some(offset) => {
                source.replace_range(offset..offset + marker.len(), "");
                offset
            }
            None => {
                eprintln!("marker `{marker}` not found in {}", options.file.display());
                return 1;
            }
        },
    };

    let mut config = match &options.config {
        Some(path) => match CompletionConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{:?}", miette::Report::new(err));
                return 1;
            }
        },
        None => CompletionConfig::default(),
    };
    if let Some(budget) = options.budget {
        config = config.with_step_budget(budget);
    }

    let (_, lex_errors) = lex_lossy(&source);
    emit_lex_errors(&options.file, &source, &lex_errors);
    let registry = MacroRegistry::build(&source);
    emit_macro_errors(&options.file, &source, registry.errors());
    let index = ScopeIndex::scan(&source);

    match complete_at(&source, caret, &registry, &index, &config, &NeverCancelled) {
        Ok(Some(outcome)) => {
            if let Some(strategy) = outcome.strategy() {
                println!("strategy: {strategy:?}");
            }
            for candidate in &outcome.candidates {
                match &candidate.detail {
                    Some(detail) => println!("{}\t{}", candidate.display_text, detail),
                    None => println!("{}", candidate.display_text),
                }
            }
            0
        }
        Ok(None) => {
            let (line, col) = offset_to_line_col(&source, caret);
            eprintln!(
                "{}:{}:{} is not inside a macro invocation",
                options.file.display(),
                line + 1,
                col + 1
            );
            1
        }
        Err(err) => {
            eprintln!("{err}");
            1
        }
    }
}
