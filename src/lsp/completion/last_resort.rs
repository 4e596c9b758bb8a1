use super::*;

/// Every accessible name, of any namespace, that starts with the identifier
/// text right before the caret. Used when no macro rule can say what belongs
/// at the caret.
pub fn last_resort_candidates(
    invocation: &Invocation,
    provider: &dyn ScopeProvider,
    config: &CompletionConfig,
) -> Vec<Candidate> {
    let prefix = identifier_prefix_slice(&invocation.argument, invocation.caret);
    let mut list = CandidateList::new();
    for symbol in provider.symbols(NamespaceFilter::Unfiltered, &invocation.scope) {
        if symbol.accessible && prefix_matches(&symbol.name, prefix) {
            list.push(Candidate::from_symbol(&symbol, CandidateOrigin::LastResort));
        }
    }
    tracing::debug!(
        prefix = prefix.unwrap_or_default(),
        candidates = list.len(),
        "last-resort completion"
    );
    list.into_vec(config.max_candidates)
}
