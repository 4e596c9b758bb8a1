use crate::{
    config::CompletionConfig,
    language::{
        ast::{FragmentKind, MacroDefinition},
        fragments::SyntacticContext,
        token::{Token, TokenKind},
    },
};
use std::collections::HashMap;
use thiserror::Error;

use super::text::{identifier_prefix_slice, is_keyword_like, prefix_matches};

mod dispatch;
mod invocation;
mod last_resort;
mod matcher;
mod resolve;
mod scope;
mod segment;
#[cfg(test)]
mod tests;
mod types;

pub use dispatch::{complete_at, Completer};
pub use invocation::locate_invocation;
pub use last_resort::last_resort_candidates;
pub use matcher::{CompiledRule, PartialMatcher};
pub use resolve::resolve_expectations;
pub use scope::{Cancellation, MacroResolver, NeverCancelled, ScopeProvider};
pub use segment::{segment, Invocation, SegmentError, Segmentation};
pub use types::{
    Cancelled, Candidate, CandidateList, CandidateOrigin, CompletionOutcome, Expectation,
    ExpectationSet, LastResortReason, Namespace, NamespaceFilter, RequestTrace, ScopeHandle,
    Strategy, Symbol, SymbolKind, TraceEvent, ROOT_MODULE,
};

use scope::check_cancelled;
