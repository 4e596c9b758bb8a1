use super::*;
use crate::language::registry::MacroRegistry;
use std::sync::atomic::{AtomicBool, Ordering};

/// Answers "which names can be written here". Implementations resolve
/// visibility themselves and report it through `Symbol::accessible`.
pub trait ScopeProvider {
    fn symbols(&self, filter: NamespaceFilter, scope: &ScopeHandle) -> Vec<Symbol>;

    /// Fields and methods reachable through `receiver.`, where `receiver`
    /// is a chain such as `["config", "paths"]`.
    fn members(&self, receiver: &[String], scope: &ScopeHandle) -> Vec<Symbol>;

    /// Names reachable through `qualifier::`.
    fn path_members(&self, qualifier: &[String], scope: &ScopeHandle) -> Vec<Symbol>;
}

pub trait MacroResolver {
    fn resolve(&self, name: &str, scope: &ScopeHandle) -> Option<&MacroDefinition>;
}

impl MacroResolver for MacroRegistry {
    fn resolve(&self, name: &str, _scope: &ScopeHandle) -> Option<&MacroDefinition> {
        self.get(name)
    }
}

impl MacroResolver for HashMap<String, MacroDefinition> {
    fn resolve(&self, name: &str, _scope: &ScopeHandle) -> Option<&MacroDefinition> {
        self.get(name)
    }
}

/// Polled between rule attempts and between search steps. A request that
/// observes cancellation stops with `Cancelled`.
pub trait Cancellation {
    fn is_cancelled(&self) -> bool;
}

impl Cancellation for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancelled;

impl Cancellation for NeverCancelled {
    fn is_cancelled(&self) -> bool {
        false
    }
}

pub(crate) fn check_cancelled(cancel: &dyn Cancellation) -> Result<(), Cancelled> {
    if cancel.is_cancelled() {
        Err(Cancelled)
    } else {
        Ok(())
    }
}
