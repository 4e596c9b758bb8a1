use super::*;
use crate::{
    language::{macro_rules::parse_macro_definition, registry::MacroRegistry, span::Span},
    lsp::analysis::{ScopeIndex, ScopeIndexBuilder, Visibility},
};
use std::sync::atomic::AtomicBool;

const CARET: &str = "/*caret*/";

/// Removes the caret marker and returns the text with its byte offset.
fn with_caret(text: &str) -> (String, usize) {
    let offset = text.find(CARET).expect("test text has a caret marker");
    (text.replacen(CARET, "", 1), offset)
}

fn invocation(macro_name: &str, argument: &str) -> Invocation {
    let (argument, caret) = with_caret(argument);
    Invocation::new(macro_name, argument, caret, ScopeHandle::new(ROOT_MODULE, 50))
}

fn expectations_for(definition: &str, argument: &str) -> (ExpectationSet, RequestTrace) {
    let def = parse_macro_definition(definition).expect("definition parses");
    let (argument, caret) = with_caret(argument);
    let segmentation = segment(&argument, caret).expect("argument segments");
    let mut trace = RequestTrace::new();
    let found = PartialMatcher::for_segmentation(&segmentation, 4096, &NeverCancelled)
        .run(&def, &mut trace)
        .expect("not cancelled");
    (found, trace)
}

fn scope() -> ScopeIndex {
    ScopeIndexBuilder::new()
        .local("iii", Some("i32"), Span::new(0, 100), 10)
        .local("s", Some("S"), Span::new(0, 100), 10)
        .item("crate", "S", Namespace::Type, SymbolKind::Struct, Visibility::Private)
        .item("crate", "make", Namespace::Value, SymbolKind::Function, Visibility::Private)
        .item("crate", "helper", Namespace::Macro, SymbolKind::Macro, Visibility::Crate)
        .item("crate::other", "Hidden", Namespace::Type, SymbolKind::Struct, Visibility::Private)
        .field("S", "crate", "ii", "i32", Visibility::Private)
        .build()
}

fn root_scope() -> ScopeHandle {
    ScopeHandle::new(ROOT_MODULE, 50)
}

fn labels(candidates: &[Candidate]) -> Vec<&str> {
    candidates.iter().map(|c| c.display_text.as_str()).collect()
}

fn strategy_count(outcome: &CompletionOutcome) -> usize {
    outcome.trace.strategies().len()
}

#[test]
fn segment_splits_off_the_word_under_the_caret() {
    let seg = segment("foo i", 5).expect("segments");
    assert_eq!(seg.pre_caret.len(), 1);
    assert_eq!(seg.pre_caret[0].kind, TokenKind::ident("foo"));
    assert_eq!(seg.prefix(), Some("i"));
    assert!(seg.caret_token.is_some());
    assert_eq!(seg.caret_index(), 1);
}

#[test]
fn segment_after_whitespace_has_no_prefix() {
    let seg = segment("foo ", 4).expect("segments");
    assert_eq!(seg.pre_caret.len(), 1);
    assert_eq!(seg.prefix(), None);
    assert!(seg.caret_token.is_none());
}

#[test]
fn segment_caret_in_the_middle_of_a_word_keeps_the_left_part() {
    let seg = segment("alpha", 2).expect("segments");
    assert!(seg.pre_caret.is_empty());
    assert_eq!(seg.prefix(), Some("al"));
}

#[test]
fn segment_tracks_open_groups() {
    let seg = segment("a(b, [c", 7).expect("segments");
    assert_eq!(seg.depth(), 2);
    assert_eq!(seg.open_groups, vec![1, 4]);
    assert!(seg.local_tokens().is_empty());
    assert_eq!(seg.prefix(), Some("c"));

    let seg = segment("x(b, c", 6).expect("segments");
    assert_eq!(seg.depth(), 1);
    assert_eq!(
        seg.local_tokens()
            .iter()
            .map(|t| t.kind.clone())
            .collect::<Vec<_>>(),
        vec![TokenKind::ident("b"), TokenKind::Comma]
    );
    assert_eq!(seg.local_offset(), 2);
}

#[test]
fn segment_ignores_text_after_the_caret() {
    let seg = segment("a, b, i, d", 7).expect("segments");
    assert_eq!(seg.pre_caret.len(), 4);
    assert_eq!(seg.prefix(), Some("i"));
}

#[test]
fn segment_rejects_carets_inside_literals() {
    assert_eq!(segment("\"abc", 2), Err(SegmentError::CaretInLiteral));
    assert_eq!(segment("\"abc\" x", 2), Err(SegmentError::CaretInLiteral));
    assert_eq!(segment("'x'", 1), Err(SegmentError::CaretInLiteral));
}

#[test]
fn segment_rejects_unbalanced_input_before_the_caret() {
    assert!(matches!(segment("a ) b", 5), Err(SegmentError::Malformed(_))));
    assert!(matches!(segment("(]", 2), Err(SegmentError::Malformed(_))));
}

#[test]
fn segment_tolerates_errors_after_the_caret() {
    let seg = segment("a, \"unterminated", 1).expect("error after caret is ignored");
    assert_eq!(seg.prefix(), Some("a"));
}

#[test]
fn matcher_unions_fragment_and_literal_expectations() {
    let (found, _) = expectations_for(
        "macro_rules! m { ($e:expr, foo) => (1); (foo $t:ty) => (1); }",
        "f/*caret*/",
    );
    assert!(found.expects_fragment(FragmentKind::Expr));
    assert!(!found.expects_fragment(FragmentKind::Ty));
    assert_eq!(
        found.literals().cloned().collect::<Vec<_>>(),
        vec![TokenKind::ident("foo")]
    );
}

#[test]
fn matcher_expects_both_kinds_after_a_shared_prefix() {
    let (found, _) = expectations_for(
        "macro_rules! m { ($i:ident $e:expr, foo) => (1); ($i:ident $t:ty, bar) => (1); }",
        "foo i/*caret*/",
    );
    assert!(found.expects_fragment(FragmentKind::Expr));
    assert!(found.expects_fragment(FragmentKind::Ty));
}

#[test]
fn matcher_prefers_fragments_that_start_later() {
    let (found, _) = expectations_for(
        "macro_rules! m { (foo * $e:ty, b) => (1); ($e:expr, a) => (1); }",
        "foo * i/*caret*/",
    );
    assert!(found.expects_fragment(FragmentKind::Ty));
    assert!(
        !found.expects_fragment(FragmentKind::Expr),
        "the expr fragment starts at `foo` and loses to the ty fragment at the caret"
    );
}

#[test]
fn matcher_reports_a_fragment_the_caret_is_inside() {
    let (found, trace) = expectations_for("macro_rules! m { ($e:expr, a) => (1); }", "foo * i/*caret*/");
    assert_eq!(found.fragments().collect::<Vec<_>>(), vec![FragmentKind::Expr]);
    assert!(trace.events().is_empty());
}

#[test]
fn matcher_walks_separated_repetitions() {
    let (found, _) = expectations_for(
        "macro_rules! m { ($($e:expr),+ =>) => (1); }",
        "a, b, i/*caret*/, d",
    );
    assert!(found.expects_fragment(FragmentKind::Expr));
}

#[test]
fn matcher_treats_every_repetition_slot_alike() {
    let def = "macro_rules! m { ($($e:expr),+ =>) => (1); }";
    for argument in ["i/*caret*/, b", "a, b, i/*caret*/, d", "a, b, i/*caret*/ =>"] {
        let (found, _) = expectations_for(def, argument);
        assert_eq!(
            found.fragments().collect::<Vec<_>>(),
            vec![FragmentKind::Expr],
            "in `{argument}`"
        );
        assert_eq!(found.literals().count(), 0, "in `{argument}`");
    }
}

#[test]
fn matcher_keeps_a_fragment_the_typed_word_continues() {
    let def = "macro_rules! m { ($e:expr, foo) => (1); }";
    for argument in ["a..i/*caret*/", "return i/*caret*/", "..i/*caret*/"] {
        let (found, _) = expectations_for(def, argument);
        assert_eq!(
            found.fragments().collect::<Vec<_>>(),
            vec![FragmentKind::Expr],
            "in `{argument}`"
        );
        assert_eq!(found.literals().count(), 0, "`,` cannot start with `i` in `{argument}`");
    }
}

#[test]
fn matcher_keeps_literals_the_typed_word_can_start() {
    let (found, _) = expectations_for("macro_rules! m { ($e:expr, foo) => (1); }", "a, f/*caret*/");
    assert_eq!(
        found.literals().cloned().collect::<Vec<_>>(),
        vec![TokenKind::ident("foo")]
    );

    let (found, _) = expectations_for("macro_rules! m { ($e:expr, foo) => (1); }", "a /*caret*/");
    assert_eq!(
        found.literals().cloned().collect::<Vec<_>>(),
        vec![TokenKind::Comma]
    );
}

#[test]
fn matcher_reads_through_nested_macro_calls() {
    let cases = [
        ("macro_rules! m { ($e:expr, foo) => (1); }", "vec![1, i/*caret*/", FragmentKind::Expr),
        ("macro_rules! m { ($e:expr, foo) => (1); }", "format!(\"{}\", i/*caret*/", FragmentKind::Expr),
        ("macro_rules! m { ($s:stmt) => (1); }", "let v = vec![i/*caret*/", FragmentKind::Stmt),
        ("macro_rules! m { ($i:item) => (1); }", "pub(crate) fn foo() { i/*caret*/", FragmentKind::Item),
    ];
    for (def, argument, kind) in cases {
        let (found, trace) = expectations_for(def, argument);
        assert_eq!(found.fragments().collect::<Vec<_>>(), vec![kind], "in `{argument}`");
        assert!(trace.events().is_empty(), "rule pruned for `{argument}`");
    }
}

#[test]
fn matcher_reaches_literals_after_restricted_visibility() {
    let (found, _) = expectations_for(
        "macro_rules! m { ($v:vis struct $n:ident) => (); }",
        "pub(crate) s/*caret*/",
    );
    assert!(found.literals().any(|kind| kind.is_ident("struct")));
    assert!(!found.expects_fragment(FragmentKind::Vis));
}

#[test]
fn matcher_offers_separator_or_terminator_after_a_repetition() {
    let (found, _) = expectations_for("macro_rules! m { ($($e:expr),+ =>) => (1); }", "a, b /*caret*/");
    let literals: Vec<_> = found.literals().cloned().collect();
    assert!(literals.contains(&TokenKind::Comma), "got {literals:?}");
    assert!(literals.contains(&TokenKind::FatArrow), "got {literals:?}");
}

#[test]
fn optional_repetitions_match_at_most_once() {
    let (found, trace) =
        expectations_for("macro_rules! m { ($($a:ident)? , $b:ty) => (1); }", "x y , /*caret*/");
    assert!(found.is_empty());
    assert_eq!(trace.events(), &[TraceEvent::RulePruned { rule: 0 }]);

    let (found, _) =
        expectations_for("macro_rules! m { ($($a:ident)* , $b:ty) => (1); }", "x y , /*caret*/");
    assert!(found.expects_fragment(FragmentKind::Ty));
}

#[test]
fn one_or_more_repetitions_need_one_match() {
    let (found, _) = expectations_for("macro_rules! m { ($($a:ident)+ ; $b:ty) => (1); }", "; /*caret*/");
    assert!(found.is_empty());
}

#[test]
fn matcher_descends_into_groups() {
    let (found, _) = expectations_for(
        "macro_rules! m { (#[foo] fn $i:ident () $b:block) => (); }",
        "#[foo] fn /*caret*/",
    );
    assert!(found.expects_fragment(FragmentKind::Ident));

    let (found, _) = expectations_for(
        "macro_rules! m { (#[foo] fn $i:ident () $b:block) => (); }",
        "#[foo] fn bar ( /*caret*/",
    );
    assert_eq!(
        found.literals().cloned().collect::<Vec<_>>(),
        vec![TokenKind::RParen]
    );
}

#[test]
fn vis_fragments_can_be_skipped() {
    let (found, _) = expectations_for("macro_rules! m { ($v:vis struct $n:ident) => (); }", "/*caret*/");
    assert!(found.expects_fragment(FragmentKind::Vis));
    assert!(found.literals().any(|kind| kind.is_ident("struct")));
}

#[test]
fn matcher_gives_up_a_rule_when_the_budget_runs_out() {
    let def = parse_macro_definition("macro_rules! m { ($e:expr, foo) => (1); }").expect("parses");
    let seg = segment("a + b + c, f", 12).expect("segments");
    let mut trace = RequestTrace::new();
    let found = PartialMatcher::new(&seg.pre_caret, 1, &NeverCancelled)
        .run(&def, &mut trace)
        .expect("not cancelled");
    assert!(found.is_empty());
    assert!(
        matches!(trace.events(), [TraceEvent::RuleBudgetExhausted { rule: 0, .. }]),
        "got {:?}",
        trace.events()
    );
}

#[test]
fn matcher_observes_cancellation() {
    let def = parse_macro_definition("macro_rules! m { ($e:expr, foo) => (1); }").expect("parses");
    let cancel = AtomicBool::new(true);
    let mut trace = RequestTrace::new();
    let result = PartialMatcher::new(&[], 4096, &cancel).run(&def, &mut trace);
    assert_eq!(result, Err(Cancelled));
}

#[test]
fn compiled_rules_flatten_groups_and_repetitions() {
    let def = parse_macro_definition("macro_rules! m { ($($e:expr),* [x]) => (); }").expect("parses");
    // Sequence, expr, kleene op, separator, `[`, `x`, `]`, eof
    assert_eq!(CompiledRule::compile(&def.rules[0]).len(), 8);
}

#[test]
fn resolver_maps_fragments_to_namespaces() {
    let index = scope();
    let mut expected = ExpectationSet::new();
    expected.insert(Expectation::Fragment(FragmentKind::Ty));
    let candidates = resolve_expectations(
        &expected,
        Some("i"),
        &root_scope(),
        &index,
        &CompletionConfig::default(),
    );
    let found = labels(&candidates);
    assert!(found.contains(&"i32"), "got {found:?}");
    assert!(!found.contains(&"iii"), "got {found:?}");

    let mut expected = ExpectationSet::new();
    expected.insert(Expectation::Fragment(FragmentKind::Expr));
    let candidates = resolve_expectations(
        &expected,
        Some("i"),
        &root_scope(),
        &index,
        &CompletionConfig::default(),
    );
    let found = labels(&candidates);
    assert!(found.contains(&"iii"), "got {found:?}");
    assert!(!found.contains(&"i32"), "got {found:?}");
}

#[test]
fn resolver_offers_types_for_blocks_and_statements() {
    let index = scope();
    for kind in [FragmentKind::Block, FragmentKind::Stmt] {
        let mut expected = ExpectationSet::new();
        expected.insert(Expectation::Fragment(kind));
        let candidates = resolve_expectations(
            &expected,
            None,
            &root_scope(),
            &index,
            &CompletionConfig::default(),
        );
        let found = labels(&candidates);
        assert!(found.contains(&"S"), "{kind:?} got {found:?}");
        assert!(found.contains(&"iii"), "{kind:?} got {found:?}");
        assert!(found.contains(&"let"), "{kind:?} got {found:?}");
    }
}

#[test]
fn resolver_skips_inaccessible_symbols() {
    let index = scope();
    let mut expected = ExpectationSet::new();
    expected.insert(Expectation::Fragment(FragmentKind::Ty));
    let candidates = resolve_expectations(
        &expected,
        Some("H"),
        &root_scope(),
        &index,
        &CompletionConfig::default(),
    );
    assert!(!labels(&candidates).contains(&"Hidden"));
}

#[test]
fn resolver_offers_identifier_literals_only() {
    let mut expected = ExpectationSet::new();
    expected.insert(Expectation::Literal(TokenKind::ident("foo")));
    expected.insert(Expectation::Literal(TokenKind::Comma));
    let candidates = resolve_expectations(
        &expected,
        None,
        &root_scope(),
        &scope(),
        &CompletionConfig::default(),
    );
    assert_eq!(labels(&candidates), vec!["foo"]);
    assert_eq!(candidates[0].origin, CandidateOrigin::MacroLiteral);
}

#[test]
fn resolver_merges_duplicates_across_fragment_kinds() {
    let mut expected = ExpectationSet::new();
    expected.insert(Expectation::Fragment(FragmentKind::Expr));
    expected.insert(Expectation::Fragment(FragmentKind::Ident));
    let candidates = resolve_expectations(
        &expected,
        Some("iii"),
        &root_scope(),
        &scope(),
        &CompletionConfig::default(),
    );
    assert_eq!(labels(&candidates), vec!["iii"]);
    assert_eq!(
        candidates[0].fragment_kinds,
        vec![FragmentKind::Expr, FragmentKind::Ident]
    );
}

#[test]
fn resolver_keywords_follow_configuration() {
    let mut expected = ExpectationSet::new();
    expected.insert(Expectation::Fragment(FragmentKind::Vis));
    let candidates = resolve_expectations(
        &expected,
        None,
        &root_scope(),
        &scope(),
        &CompletionConfig::default(),
    );
    assert_eq!(labels(&candidates), vec!["pub", "pub(crate)", "pub(super)"]);

    let config = CompletionConfig {
        keyword_candidates: false,
        ..CompletionConfig::default()
    };
    let candidates = resolve_expectations(&expected, None, &root_scope(), &scope(), &config);
    assert!(candidates.is_empty());
}

#[test]
fn resolver_truncates_to_max_candidates() {
    let mut expected = ExpectationSet::new();
    expected.insert(Expectation::Fragment(FragmentKind::Ty));
    let config = CompletionConfig {
        max_candidates: Some(3),
        ..CompletionConfig::default()
    };
    let candidates = resolve_expectations(&expected, None, &root_scope(), &scope(), &config);
    assert_eq!(candidates.len(), 3);
}

#[test]
fn last_resort_uses_the_identifier_before_the_caret() {
    let candidates = last_resort_candidates(
        &invocation("unknown", "let a: ma/*caret*/"),
        &scope(),
        &CompletionConfig::default(),
    );
    assert_eq!(labels(&candidates), vec!["make"]);
    assert_eq!(candidates[0].origin, CandidateOrigin::LastResort);
}

#[test]
fn dispatcher_falls_back_for_unresolved_macros() {
    let registry = MacroRegistry::new();
    let index = scope();
    let outcome = Completer::new(&registry, &index)
        .complete(&invocation("missing", "ii/*caret*/"), &NeverCancelled)
        .expect("not cancelled");
    assert_eq!(outcome.strategy(), Some(Strategy::LastResort));
    assert_eq!(outcome.trace.last_resort_reason(), Some(LastResortReason::UnresolvedMacro));
    assert_eq!(strategy_count(&outcome), 1);
    assert!(outcome.contains("iii"));
}

#[test]
fn dispatcher_treats_rule_less_definitions_as_unresolved() {
    let registry = MacroRegistry::build("macro_rules! m { ($x:nope) => (); }");
    let index = scope();
    let outcome = Completer::new(&registry, &index)
        .complete(&invocation("m", "i/*caret*/"), &NeverCancelled)
        .expect("not cancelled");
    assert_eq!(outcome.trace.last_resort_reason(), Some(LastResortReason::UnresolvedMacro));
}

#[test]
fn dispatcher_falls_back_on_malformed_arguments() {
    let registry = MacroRegistry::build("macro_rules! m { ($e:expr) => (); }");
    let index = scope();
    let completer = Completer::new(&registry, &index);

    let outcome = completer
        .complete(&invocation("m", "a ) i/*caret*/"), &NeverCancelled)
        .expect("not cancelled");
    assert_eq!(outcome.trace.last_resort_reason(), Some(LastResortReason::MalformedInput));
    assert_eq!(strategy_count(&outcome), 1);

    let outcome = completer
        .complete(&invocation("m", "\"i/*caret*/"), &NeverCancelled)
        .expect("not cancelled");
    assert_eq!(outcome.trace.last_resort_reason(), Some(LastResortReason::CaretInLiteral));
    assert_eq!(strategy_count(&outcome), 1);
}

#[test]
fn dispatcher_runs_full_completion_for_member_access() {
    let registry = MacroRegistry::build("macro_rules! m { ($e:expr, foo) => (); }");
    let index = scope();
    let outcome = Completer::new(&registry, &index)
        .complete(&invocation("m", "foo.bar(a * s./*caret*/) + baz"), &NeverCancelled)
        .expect("not cancelled");
    assert_eq!(outcome.strategy(), Some(Strategy::FullExpression));
    assert_eq!(outcome.labels(), vec!["ii"]);
    assert!(outcome.trace.events().contains(&TraceEvent::Context(
        SyntacticContext::MemberAccess {
            receiver: vec!["s".into()],
        }
    )));
    assert_eq!(strategy_count(&outcome), 1);
}

#[test]
fn dispatcher_matches_rules_otherwise() {
    let registry = MacroRegistry::build("macro_rules! m { ($e:expr, foo) => (); ($t:ty, bar) => (); }");
    let index = scope();
    let outcome = Completer::new(&registry, &index)
        .complete(&invocation("m", "i/*caret*/"), &NeverCancelled)
        .expect("not cancelled");
    assert_eq!(outcome.strategy(), Some(Strategy::PartialMatch));
    assert!(outcome.contains("iii"));
    assert!(outcome.contains("i32"));
    assert_eq!(strategy_count(&outcome), 1);
}

#[test]
fn dispatcher_falls_back_when_no_rule_reaches_the_caret() {
    let registry = MacroRegistry::build("macro_rules! m { (#[foo] fn $i:ident) => (); }");
    let index = scope();
    let outcome = Completer::new(&registry, &index)
        .complete(&invocation("m", "#[test] fn ma/*caret*/"), &NeverCancelled)
        .expect("not cancelled");
    assert_eq!(outcome.trace.last_resort_reason(), Some(LastResortReason::NoRuleReachedCaret));
    assert!(outcome
        .trace
        .events()
        .contains(&TraceEvent::RulePruned { rule: 0 }));
    assert_eq!(outcome.labels(), vec!["make"]);
    assert_eq!(strategy_count(&outcome), 1);
}

#[test]
fn dispatcher_returns_cancelled_before_doing_work() {
    let registry = MacroRegistry::build("macro_rules! m { ($e:expr) => (); }");
    let index = scope();
    let cancel = AtomicBool::new(true);
    let result = Completer::new(&registry, &index).complete(&invocation("m", "i/*caret*/"), &cancel);
    assert_eq!(result, Err(Cancelled));
}

#[test]
fn locates_the_innermost_invocation() {
    let (source, caret) = with_caret("fn main() { outer!(a, inner![b, c/*caret*/], d); }");
    let found = locate_invocation(&source, caret).expect("caret is inside an invocation");
    assert_eq!(found.macro_name, "inner");
    assert_eq!(found.argument, "b, c");
    assert_eq!(found.caret, 4);
    assert_eq!(found.scope.module, ROOT_MODULE);
    assert_eq!(found.scope.offset, caret);
}

#[test]
fn locates_unclosed_invocations_up_to_the_end_of_file() {
    let (source, caret) = with_caret("fn main() { m!(x, y/*caret*/");
    let found = locate_invocation(&source, caret).expect("caret is inside an invocation");
    assert_eq!(found.macro_name, "m");
    assert_eq!(found.argument, "x, y");
}

#[test]
fn invocation_scope_names_the_enclosing_module() {
    let (source, caret) = with_caret("mod a { mod b { fn f() { m!(x/*caret*/) } } } mod c {}");
    let found = locate_invocation(&source, caret).expect("caret is inside an invocation");
    assert_eq!(found.scope.module, "crate::a::b");
}

#[test]
fn no_invocation_outside_macro_arguments() {
    let (source, caret) = with_caret("fn main() { m!(x); let a = 1/*caret*/; }");
    assert!(locate_invocation(&source, caret).is_none());
}
