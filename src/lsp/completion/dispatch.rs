use super::*;
use crate::language::fragments::probe_partial_expression;

/// Serves completion requests inside macro arguments. Each request runs
/// exactly one strategy: ordinary completion when the text before the caret
/// already reads as a member access or path, matching against the macro's
/// rules otherwise, and the last-resort lookup when neither applies.
pub struct Completer<'a> {
    resolver: &'a dyn MacroResolver,
    provider: &'a dyn ScopeProvider,
    config: CompletionConfig,
}

impl<'a> Completer<'a> {
    pub fn new(resolver: &'a dyn MacroResolver, provider: &'a dyn ScopeProvider) -> Self {
        Self {
            resolver,
            provider,
            config: CompletionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CompletionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }

    pub fn complete(
        &self,
        invocation: &Invocation,
        cancel: &dyn Cancellation,
    ) -> Result<CompletionOutcome, Cancelled> {
        check_cancelled(cancel)?;
        let mut trace = RequestTrace::new();

        let Some(def) = self
            .resolver
            .resolve(&invocation.macro_name, &invocation.scope)
            .filter(|def| def.has_rules())
        else {
            return Ok(self.last_resort(invocation, LastResortReason::UnresolvedMacro, trace));
        };

        let segmentation = match invocation.segment() {
            Ok(segmentation) => segmentation,
            Err(err) => {
                tracing::debug!(macro_name = %invocation.macro_name, error = %err, "cannot segment macro argument");
                let reason = match err {
                    SegmentError::CaretInLiteral => LastResortReason::CaretInLiteral,
                    SegmentError::Malformed(_) => LastResortReason::MalformedInput,
                };
                return Ok(self.last_resort(invocation, reason, trace));
            }
        };

        if let Some(context) = probe_partial_expression(segmentation.local_tokens()) {
            return Ok(self.full_expression(invocation, &segmentation, context, trace));
        }

        let matcher = PartialMatcher::for_segmentation(&segmentation, self.config.step_budget, cancel);
        let expectations = matcher.run(def, &mut trace)?;
        if expectations.is_empty() {
            return Ok(self.last_resort(invocation, LastResortReason::NoRuleReachedCaret, trace));
        }

        tracing::debug!(
            macro_name = %def.name,
            strategy = "partial",
            expectations = expectations.len(),
            depth = segmentation.depth(),
            group_offset = segmentation.local_offset(),
            "completing macro argument"
        );
        trace.push(TraceEvent::StrategyFired(Strategy::PartialMatch));
        let candidates = resolve_expectations(
            &expectations,
            segmentation.prefix(),
            &invocation.scope,
            self.provider,
            &self.config,
        );
        Ok(CompletionOutcome { candidates, trace })
    }

    fn full_expression(
        &self,
        invocation: &Invocation,
        segmentation: &Segmentation,
        context: SyntacticContext,
        mut trace: RequestTrace,
    ) -> CompletionOutcome {
        tracing::debug!(macro_name = %invocation.macro_name, strategy = "full", context = ?context, "completing macro argument");
        trace.push(TraceEvent::StrategyFired(Strategy::FullExpression));
        let symbols = match &context {
            SyntacticContext::MemberAccess { receiver } => {
                self.provider.members(receiver, &invocation.scope)
            }
            SyntacticContext::PathSegment { qualifier } => {
                self.provider.path_members(qualifier, &invocation.scope)
            }
        };
        trace.push(TraceEvent::Context(context));
        let prefix = segmentation.prefix();
        let mut list = CandidateList::new();
        for symbol in symbols {
            if symbol.accessible && prefix_matches(&symbol.name, prefix) {
                list.push(Candidate::from_symbol(&symbol, CandidateOrigin::FullExpression));
            }
        }
        CompletionOutcome {
            candidates: list.into_vec(self.config.max_candidates),
            trace,
        }
    }

    fn last_resort(
        &self,
        invocation: &Invocation,
        reason: LastResortReason,
        mut trace: RequestTrace,
    ) -> CompletionOutcome {
        tracing::debug!(macro_name = %invocation.macro_name, strategy = "last-resort", reason = ?reason, "completing macro argument");
        trace.push(TraceEvent::StrategyFired(Strategy::LastResort));
        trace.push(TraceEvent::LastResort(reason));
        let candidates = last_resort_candidates(invocation, self.provider, &self.config);
        CompletionOutcome { candidates, trace }
    }
}

/// Completes at byte `caret` of `source`, when the caret sits inside a macro
/// invocation's argument.
pub fn complete_at(
    source: &str,
    caret: usize,
    resolver: &dyn MacroResolver,
    provider: &dyn ScopeProvider,
    config: &CompletionConfig,
    cancel: &dyn Cancellation,
) -> Result<Option<CompletionOutcome>, Cancelled> {
    let Some(invocation) = locate_invocation(source, caret) else {
        return Ok(None);
    };
    Completer::new(resolver, provider)
        .with_config(config.clone())
        .complete(&invocation, cancel)
        .map(Some)
}
