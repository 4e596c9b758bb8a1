use miette::Diagnostic;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const DEFAULT_STEP_BUDGET: usize = 4096;

/// Tuning for completion requests. Every key of the `[completion]` table is
/// optional:
///
/// ```toml
/// [completion]
/// step_budget = 4096
/// max_candidates = 50
/// keyword_candidates = true
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompletionConfig {
    /// Search steps one rule may spend before it is given up.
    pub step_budget: usize,
    pub max_candidates: Option<usize>,
    /// Offer keywords that can start an expected fragment.
    pub keyword_candidates: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            step_budget: DEFAULT_STEP_BUDGET,
            max_candidates: None,
            keyword_candidates: true,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawConfigFile {
    completion: CompletionConfig,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config {}: {error}", path.display())]
    #[diagnostic(code(macro_complete::config::io))]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("failed to parse config {}: {message}", path.display())]
    #[diagnostic(
        code(macro_complete::config::parse),
        help("settings live under a `[completion]` table")
    )]
    Parse { path: PathBuf, message: String },
}

impl CompletionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        Self::from_toml(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: error.to_string(),
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        let raw: RawConfigFile = toml::from_str(content)?;
        Ok(raw.completion)
    }

    pub fn with_step_budget(mut self, step_budget: usize) -> Self {
        self.step_budget = step_budget;
        self
    }
}
