//! Matching of partially typed macro arguments against every rule of a
//! macro at once.
//!
//! Each rule's pattern is flattened into a list of matcher locations, with
//! groups becoming their delimiter tokens and repetitions becoming jump
//! locations. A search state is then just a location and a token index, so
//! the depth-first search can remember every state it has already expanded
//! and never repeat a sub-search. Repetition counts need no extra state: a
//! `+` repetition enters its body without a skip edge, and a `?` repetition
//! has no back edge.

use super::*;
use crate::language::{
    ast::{MacroRule, PatternElement, RepetitionKind},
    fragments::{can_follow, check_fragment, FragmentFit},
};
use std::collections::HashSet;

#[derive(Clone, Debug, PartialEq, Eq)]
enum MatcherLoc {
    Token(TokenKind),
    MetaVar(FragmentKind),
    /// Start of a repetition. The body begins at the next location.
    Sequence {
        kleene: RepetitionKind,
        idx_after: usize,
    },
    /// End of one repetition of the body.
    SequenceKleeneOp {
        kleene: RepetitionKind,
        idx_first: usize,
        idx_after: usize,
        has_separator: bool,
    },
    /// Separator between two repetitions; jumps back to the body.
    SequenceSep {
        separator: TokenKind,
        idx_first: usize,
    },
    Eof,
}

#[derive(Clone, Debug)]
pub struct CompiledRule {
    locs: Vec<MatcherLoc>,
}

impl CompiledRule {
    pub fn compile(rule: &MacroRule) -> Self {
        let mut locs = Vec::new();
        compute_locs(&rule.pattern, &mut locs);
        locs.push(MatcherLoc::Eof);
        Self { locs }
    }

    pub fn len(&self) -> usize {
        self.locs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locs.is_empty()
    }
}

fn compute_locs(elements: &[PatternElement], locs: &mut Vec<MatcherLoc>) {
    for element in elements {
        match element {
            PatternElement::Literal(kind) => locs.push(MatcherLoc::Token(kind.clone())),
            PatternElement::Metavar { kind, .. } => locs.push(MatcherLoc::MetaVar(*kind)),
            PatternElement::Group {
                delimiter,
                elements,
            } => {
                locs.push(MatcherLoc::Token(delimiter.open()));
                compute_locs(elements, locs);
                locs.push(MatcherLoc::Token(delimiter.close()));
            }
            PatternElement::Repetition {
                elements,
                separator,
                kleene,
            } => {
                let idx_seq = locs.len();
                locs.push(MatcherLoc::Sequence {
                    kleene: *kleene,
                    idx_after: 0,
                });
                let idx_first = locs.len();
                compute_locs(elements, locs);
                let idx_kleene = locs.len();
                locs.push(MatcherLoc::SequenceKleeneOp {
                    kleene: *kleene,
                    idx_first,
                    idx_after: 0,
                    has_separator: separator.is_some(),
                });
                if let Some(separator) = separator {
                    locs.push(MatcherLoc::SequenceSep {
                        separator: separator.clone(),
                        idx_first,
                    });
                }
                let after = locs.len();
                if let MatcherLoc::Sequence { idx_after, .. } = &mut locs[idx_seq] {
                    *idx_after = after;
                }
                if let MatcherLoc::SequenceKleeneOp { idx_after, .. } = &mut locs[idx_kleene] {
                    *idx_after = after;
                }
            }
        }
    }
}

/// One search state: a location in a compiled rule and the index of the
/// next unconsumed token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct MatchState {
    loc: usize,
    pos: usize,
}

/// An expectation together with the token index where the fragment or
/// literal it describes begins.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Anchored {
    expectation: Expectation,
    anchor: usize,
}

#[derive(Debug)]
enum RuleOutcome {
    Reached(Vec<Anchored>),
    Pruned,
    BudgetExhausted(usize),
}

pub struct PartialMatcher<'a> {
    tokens: &'a [Token],
    /// The partially typed word under the caret and its text up to the caret.
    caret_word: Option<(&'a Token, &'a str)>,
    budget: usize,
    cancel: &'a dyn Cancellation,
}

impl<'a> PartialMatcher<'a> {
    pub fn new(tokens: &'a [Token], budget: usize, cancel: &'a dyn Cancellation) -> Self {
        Self {
            tokens,
            caret_word: None,
            budget,
            cancel,
        }
    }

    /// Matches the tokens before the caret, taking the word under the caret
    /// into account when deciding what it may continue.
    pub fn for_segmentation(
        segmentation: &'a Segmentation,
        budget: usize,
        cancel: &'a dyn Cancellation,
    ) -> Self {
        let caret_word = segmentation
            .caret_token
            .as_ref()
            .map(|token| (token, segmentation.prefix.as_str()));
        Self {
            caret_word,
            ..Self::new(&segmentation.pre_caret, budget, cancel)
        }
    }

    /// Whether the typed word can be the start of literal `kind`.
    fn word_starts(&self, kind: &TokenKind) -> bool {
        match self.caret_word {
            Some((_, prefix)) => kind.text().starts_with(prefix),
            None => true,
        }
    }

    /// Expectations at the end of `tokens`, unioned over all rules of
    /// `def`. When rules disagree about where the text at the caret
    /// started, only the expectations anchored latest are kept: the rules
    /// that matched more of the input as literal structure win.
    pub fn run(
        &self,
        def: &MacroDefinition,
        trace: &mut RequestTrace,
    ) -> Result<ExpectationSet, Cancelled> {
        let mut found: Vec<Anchored> = Vec::new();
        for (rule_idx, rule) in def.rules.iter().enumerate() {
            check_cancelled(self.cancel)?;
            let compiled = CompiledRule::compile(rule);
            match self.match_rule(&compiled)? {
                RuleOutcome::Reached(anchored) => {
                    tracing::trace!(
                        macro_name = %def.name,
                        rule = rule_idx,
                        expectations = anchored.len(),
                        "rule reached the caret"
                    );
                    found.extend(anchored);
                }
                RuleOutcome::Pruned => {
                    tracing::trace!(macro_name = %def.name, rule = rule_idx, "rule pruned");
                    trace.push(TraceEvent::RulePruned { rule: rule_idx });
                }
                RuleOutcome::BudgetExhausted(steps) => {
                    tracing::debug!(
                        macro_name = %def.name,
                        rule = rule_idx,
                        steps,
                        "step budget exhausted, rule skipped"
                    );
                    trace.push(TraceEvent::RuleBudgetExhausted {
                        rule: rule_idx,
                        steps,
                    });
                }
            }
        }

        let mut expectations = ExpectationSet::new();
        if let Some(latest) = found.iter().map(|item| item.anchor).max() {
            for item in found.into_iter().filter(|item| item.anchor == latest) {
                expectations.insert(item.expectation);
            }
        }
        Ok(expectations)
    }

    fn match_rule(&self, rule: &CompiledRule) -> Result<RuleOutcome, Cancelled> {
        let caret = self.tokens.len();
        let mut steps = 0usize;
        let mut visited: HashSet<MatchState> = HashSet::new();
        let mut stack = vec![MatchState { loc: 0, pos: 0 }];
        let mut anchored: Vec<Anchored> = Vec::new();

        while let Some(state) = stack.pop() {
            if !visited.insert(state) {
                continue;
            }
            steps += 1;
            if steps > self.budget {
                return Ok(RuleOutcome::BudgetExhausted(steps));
            }
            check_cancelled(self.cancel)?;

            let mut next: Vec<MatchState> = Vec::new();
            match &rule.locs[state.loc] {
                MatcherLoc::Token(kind) => {
                    if state.pos == caret {
                        if self.word_starts(kind) {
                            push_unique(&mut anchored, Expectation::Literal(kind.clone()), caret);
                        }
                    } else if &self.tokens[state.pos].kind == kind {
                        next.push(MatchState {
                            loc: state.loc + 1,
                            pos: state.pos + 1,
                        });
                    }
                }
                MatcherLoc::SequenceSep {
                    separator,
                    idx_first,
                } => {
                    if state.pos == caret {
                        if self.word_starts(separator) {
                            push_unique(&mut anchored, Expectation::Literal(separator.clone()), caret);
                        }
                    } else if &self.tokens[state.pos].kind == separator {
                        next.push(MatchState {
                            loc: *idx_first,
                            pos: state.pos + 1,
                        });
                    }
                }
                MatcherLoc::MetaVar(kind) => {
                    if kind.may_be_empty() {
                        next.push(MatchState {
                            loc: state.loc + 1,
                            pos: state.pos,
                        });
                    }
                    if state.pos == caret {
                        push_unique(&mut anchored, Expectation::Fragment(*kind), caret);
                    } else {
                        let (splits, halted) = self.fragment_splits(*kind, state.pos, &mut steps);
                        if steps > self.budget {
                            return Ok(RuleOutcome::BudgetExhausted(steps));
                        }
                        next.extend(splits.into_iter().map(|end| MatchState {
                            loc: state.loc + 1,
                            pos: end,
                        }));
                        if halted {
                            push_unique(&mut anchored, Expectation::Fragment(*kind), state.pos);
                        }
                    }
                }
                MatcherLoc::Sequence { kleene, idx_after } => {
                    next.push(MatchState {
                        loc: state.loc + 1,
                        pos: state.pos,
                    });
                    if kleene.may_skip() {
                        next.push(MatchState {
                            loc: *idx_after,
                            pos: state.pos,
                        });
                    }
                }
                MatcherLoc::SequenceKleeneOp {
                    kleene,
                    idx_first,
                    idx_after,
                    has_separator,
                } => {
                    if kleene.may_repeat() {
                        let again = if *has_separator {
                            state.loc + 1
                        } else {
                            *idx_first
                        };
                        next.push(MatchState {
                            loc: again,
                            pos: state.pos,
                        });
                    }
                    next.push(MatchState {
                        loc: *idx_after,
                        pos: state.pos,
                    });
                }
                MatcherLoc::Eof => {}
            }
            // Reverse so the first listed alternative is explored first.
            stack.extend(next.into_iter().rev());
        }

        if anchored.is_empty() {
            Ok(RuleOutcome::Pruned)
        } else {
            Ok(RuleOutcome::Reached(anchored))
        }
    }

    /// Legal end indices for a `kind` fragment starting at `start`, and
    /// whether the caret falls inside the fragment instead. With a word under
    /// the caret the fragment still holds the caret when it can absorb that
    /// word, even if the tokens before the caret already complete it.
    fn fragment_splits(&self, kind: FragmentKind, start: usize, steps: &mut usize) -> (Vec<usize>, bool) {
        let caret = self.tokens.len();
        let mut splits = Vec::new();
        let mut reaches_caret = false;
        let mut viable_at_caret = false;
        for end in start + 1..=caret {
            *steps += 1;
            if *steps > self.budget {
                break;
            }
            let fit = check_fragment(kind, &self.tokens[start..end]);
            match fit {
                FragmentFit::Mismatch => break,
                FragmentFit::Complete => {
                    let legal = end == caret
                        || kind.is_single_tree()
                        || can_follow(kind, &self.tokens[end].kind);
                    if legal {
                        splits.push(end);
                        reaches_caret |= end == caret;
                    }
                }
                FragmentFit::Incomplete => {}
            }
            if end == caret {
                viable_at_caret = fit.is_viable();
            }
            if kind.is_single_tree() && fit == FragmentFit::Complete {
                break;
            }
        }
        if !viable_at_caret {
            return (splits, false);
        }
        let halted = match self.caret_word {
            Some((word, _)) => {
                *steps += 1;
                let mut extended = self.tokens[start..].to_vec();
                extended.push(word.clone());
                check_fragment(kind, &extended).is_viable()
            }
            None => !reaches_caret,
        };
        (splits, halted)
    }
}

fn push_unique(anchored: &mut Vec<Anchored>, expectation: Expectation, anchor: usize) {
    let item = Anchored {
        expectation,
        anchor,
    };
    if !anchored.contains(&item) {
        anchored.push(item);
    }
}
