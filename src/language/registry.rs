use crate::language::{
    ast::MacroDefinition,
    errors::{MacroDefError, SyntaxError},
    lexer::lex_lossy,
    macro_rules::{find_macro_definitions, parse_macro_tokens, tokens_span},
    token::Token,
};
use std::collections::HashMap;

/// Every declarative macro defined in a source file, by name.
#[derive(Debug, Default)]
pub struct MacroRegistry {
    macros: HashMap<String, MacroDefinition>,
    order: Vec<String>,
    errors: Vec<MacroDefError>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans `source` for `macro_rules!` and `macro` definitions. Malformed
    /// definitions are kept without rules and reported through `errors()`.
    pub fn build(source: &str) -> Self {
        let (tokens, _) = lex_lossy(source);
        Self::from_tokens(&tokens)
    }

    pub fn from_tokens(tokens: &[Token]) -> Self {
        let mut registry = Self::new();
        for range in find_macro_definitions(tokens) {
            let slice = &tokens[range];
            match parse_macro_tokens(slice) {
                Ok(def) => registry.insert(def),
                Err(err) => {
                    tracing::warn!(macro_name = %err.name, error = %err.message, "malformed macro definition");
                    let span = tokens_span(slice);
                    let name = err.name.clone();
                    registry.errors.push(err);
                    registry.insert(MacroDefinition::without_rules(name, span));
                }
            }
        }
        registry
    }

    /// Registers `def`. A second definition under the same name is reported
    /// and the first one stays in effect.
    pub fn insert(&mut self, def: MacroDefinition) {
        if let Some(existing) = self.macros.get(&def.name) {
            let err = SyntaxError::new(format!("macro `{}` already defined", def.name), def.span)
                .with_help(format!(
                    "the first definition starts at byte {}",
                    existing.span.start
                ));
            self.errors.push(MacroDefError::from_syntax(def.name.clone(), err));
            return;
        }
        self.order.push(def.name.clone());
        self.macros.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<&MacroDefinition> {
        let name = name.rsplit("::").next().unwrap_or(name);
        self.macros.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    pub fn errors(&self) -> &[MacroDefError] {
        &self.errors
    }
}
