pub mod analysis;
pub mod completion;
pub mod text;

pub use analysis::{ScopeIndex, ScopeIndexBuilder};
pub use completion::{
    complete_at, Candidate, CandidateOrigin, CompletionOutcome, Completer, Invocation, RequestTrace,
    Strategy, TraceEvent,
};
