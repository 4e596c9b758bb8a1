#![allow(clippy::collapsible_if)]

pub mod config;
pub mod diagnostics;
pub mod language;
pub mod lsp;

#[cfg(test)]
mod tests;
