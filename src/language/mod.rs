pub mod ast;
pub mod errors;
pub mod fragments;
pub mod lexer;
pub mod macro_rules;
pub mod registry;
pub mod span;
pub mod token;

#[cfg(test)]
mod tests;
