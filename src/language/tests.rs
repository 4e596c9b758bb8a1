use crate::language::{
    ast::{FragmentKind, PatternElement, RepetitionKind},
    fragments::{can_follow, check_fragment, probe_partial_expression, FragmentFit, SyntacticContext},
    lexer::{lex, lex_lossy},
    macro_rules::{find_macro_definitions, parse_macro_definition},
    registry::MacroRegistry,
    token::{Delimiter, Token, TokenKind},
};

fn kinds(source: &str) -> Vec<TokenKind> {
    lex(source)
        .expect("source should lex")
        .into_iter()
        .map(|token| token.kind)
        .collect()
}

fn tokens(source: &str) -> Vec<Token> {
    lex(source).expect("source should lex")
}

fn fit(kind: FragmentKind, source: &str) -> FragmentFit {
    check_fragment(kind, &tokens(source))
}

#[test]
fn lexes_member_access_inside_call() {
    assert_eq!(
        kinds("foo.bar(a * s.)"),
        vec![
            TokenKind::ident("foo"),
            TokenKind::Dot,
            TokenKind::ident("bar"),
            TokenKind::LParen,
            TokenKind::ident("a"),
            TokenKind::Star,
            TokenKind::ident("s"),
            TokenKind::Dot,
            TokenKind::RParen,
        ]
    );
}

#[test]
fn lexes_compound_punctuation_greedily() {
    assert_eq!(
        kinds("a::b => c >>= d ..= e"),
        vec![
            TokenKind::ident("a"),
            TokenKind::ColonColon,
            TokenKind::ident("b"),
            TokenKind::FatArrow,
            TokenKind::ident("c"),
            TokenKind::ShrEq,
            TokenKind::ident("d"),
            TokenKind::DotDotEq,
            TokenKind::ident("e"),
        ]
    );
}

#[test]
fn distinguishes_lifetimes_from_chars() {
    assert_eq!(
        kinds("'a 'b' 'static"),
        vec![
            TokenKind::Lifetime("'a".into()),
            TokenKind::Char("'b'".into()),
            TokenKind::Lifetime("'static".into()),
        ]
    );
}

#[test]
fn skips_comments() {
    assert_eq!(
        kinds("a // line\n /* block /* nested */ */ b"),
        vec![TokenKind::ident("a"), TokenKind::ident("b")]
    );
}

#[test]
fn token_spans_are_byte_offsets() {
    let toks = tokens("  foo::bar");
    assert_eq!(toks[0].span.range(), 2..5);
    assert_eq!(toks[1].span.range(), 5..7);
    assert_eq!(toks[2].span.range(), 7..10);
}

#[test]
fn lossy_lexing_keeps_tokens_before_an_unterminated_string() {
    let (toks, errors) = lex_lossy("foo(\"bar");
    assert_eq!(errors.len(), 1, "expected one lexical error");
    assert_eq!(toks[0].kind, TokenKind::ident("foo"));
    assert_eq!(toks[1].kind, TokenKind::LParen);
    assert!(lex("foo(\"bar").is_err());
}

#[test]
fn parses_macro_rules_with_several_rules() {
    let def = parse_macro_definition(
        "macro_rules! my_macro {
            ($ e:expr, foo) => (1);
            (foo $ t:ty) => { 2 };
        }",
    )
    .expect("definition parses");
    assert_eq!(def.name, "my_macro");
    assert_eq!(def.rules.len(), 2);
    assert_eq!(
        def.rules[0].pattern,
        vec![
            PatternElement::Metavar {
                name: "e".into(),
                kind: FragmentKind::Expr,
            },
            PatternElement::Literal(TokenKind::Comma),
            PatternElement::Literal(TokenKind::ident("foo")),
        ]
    );
    assert_eq!(
        def.rules[1].pattern,
        vec![
            PatternElement::Literal(TokenKind::ident("foo")),
            PatternElement::Metavar {
                name: "t".into(),
                kind: FragmentKind::Ty,
            },
        ]
    );
}

#[test]
fn parses_repetitions_with_separators() {
    let def = parse_macro_definition("macro_rules! list { ($($e:expr),+ =>) => (1); }")
        .expect("definition parses");
    assert_eq!(
        def.rules[0].pattern,
        vec![
            PatternElement::Repetition {
                elements: vec![PatternElement::Metavar {
                    name: "e".into(),
                    kind: FragmentKind::Expr,
                }],
                separator: Some(TokenKind::Comma),
                kleene: RepetitionKind::OneOrMore,
            },
            PatternElement::Literal(TokenKind::FatArrow),
        ]
    );
}

#[test]
fn parses_nested_groups_in_matchers() {
    let def = parse_macro_definition("macro_rules! attr { (#[foo] fn $i:ident () $b:block) => (); }")
        .expect("definition parses");
    let pattern = &def.rules[0].pattern;
    assert_eq!(pattern[0], PatternElement::Literal(TokenKind::Hash));
    assert_eq!(
        pattern[1],
        PatternElement::Group {
            delimiter: Delimiter::Bracket,
            elements: vec![PatternElement::Literal(TokenKind::ident("foo"))],
        }
    );
    assert_eq!(
        pattern[4],
        PatternElement::Group {
            delimiter: Delimiter::Paren,
            elements: Vec::new(),
        }
    );
}

#[test]
fn parses_macro_two_point_oh_single_rule_form() {
    let def = parse_macro_definition("macro my_macro($ e:expr, foo) { 1 }").expect("definition parses");
    assert_eq!(def.name, "my_macro");
    assert_eq!(def.rules.len(), 1);
    assert_eq!(def.rules[0].pattern.len(), 3);
}

#[test]
fn rejects_unknown_fragment_specifiers() {
    let err = parse_macro_definition("macro_rules! bad { ($x:expression) => (); }")
        .expect_err("unknown specifier must fail");
    assert_eq!(err.name, "bad");
    assert!(
        err.message.contains("expression"),
        "error should name the specifier, got: {}",
        err.message
    );
}

#[test]
fn finds_every_definition_in_a_file() {
    let toks = tokens(
        "macro_rules! a { () => () }
         fn main() {}
         macro b($x:tt) { $x }",
    );
    assert_eq!(find_macro_definitions(&toks).len(), 2);
}

#[test]
fn expr_fragment_fits() {
    assert_eq!(fit(FragmentKind::Expr, "a"), FragmentFit::Complete);
    assert_eq!(fit(FragmentKind::Expr, "a *"), FragmentFit::Incomplete);
    assert_eq!(fit(FragmentKind::Expr, "a * b"), FragmentFit::Complete);
    assert_eq!(fit(FragmentKind::Expr, "foo.bar(a * s."), FragmentFit::Incomplete);
    assert_eq!(fit(FragmentKind::Expr, "S { ii: 42 }"), FragmentFit::Complete);
    assert_eq!(fit(FragmentKind::Expr, "a ,"), FragmentFit::Mismatch);
    assert_eq!(fit(FragmentKind::Expr, ")"), FragmentFit::Mismatch);
}

#[test]
fn ty_fragment_fits() {
    assert_eq!(fit(FragmentKind::Ty, "i32"), FragmentFit::Complete);
    assert_eq!(fit(FragmentKind::Ty, "Vec<u8>"), FragmentFit::Complete);
    assert_eq!(fit(FragmentKind::Ty, "Vec<"), FragmentFit::Incomplete);
    assert_eq!(fit(FragmentKind::Ty, "HashMap<String, Vec<u8>>"), FragmentFit::Complete);
    assert_eq!(fit(FragmentKind::Ty, "&'a mut"), FragmentFit::Incomplete);
    assert_eq!(fit(FragmentKind::Ty, "1"), FragmentFit::Mismatch);
}

#[test]
fn single_tree_fragments() {
    assert_eq!(fit(FragmentKind::Ident, "foo"), FragmentFit::Complete);
    assert_eq!(fit(FragmentKind::Ident, "foo bar"), FragmentFit::Mismatch);
    assert_eq!(fit(FragmentKind::Lifetime, "'a"), FragmentFit::Complete);
    assert_eq!(fit(FragmentKind::Literal, "-1"), FragmentFit::Complete);
    assert_eq!(fit(FragmentKind::Literal, "-"), FragmentFit::Incomplete);
    assert_eq!(fit(FragmentKind::Block, "{ let a = 1; }"), FragmentFit::Complete);
    assert_eq!(fit(FragmentKind::Block, "{ let a"), FragmentFit::Incomplete);
    assert_eq!(fit(FragmentKind::Tt, "(a b c)"), FragmentFit::Complete);
}

#[test]
fn running_out_of_lookahead_is_incomplete() {
    assert_eq!(fit(FragmentKind::Vis, "pub ("), FragmentFit::Incomplete);
    assert_eq!(fit(FragmentKind::Vis, "pub (crate"), FragmentFit::Incomplete);
    assert_eq!(fit(FragmentKind::Item, "pub ("), FragmentFit::Incomplete);
    assert_eq!(fit(FragmentKind::Item, "pub(crate) fn foo() {"), FragmentFit::Incomplete);
    assert_eq!(fit(FragmentKind::Expr, "vec !"), FragmentFit::Incomplete);
    assert_eq!(fit(FragmentKind::Expr, "format ! (\"{}\","), FragmentFit::Incomplete);
    assert_eq!(fit(FragmentKind::Stmt, "let v = vec !"), FragmentFit::Incomplete);
    assert_eq!(fit(FragmentKind::Pat, "Some !"), FragmentFit::Incomplete);
    for word in ["const", "unsafe", "async"] {
        assert_eq!(fit(FragmentKind::Stmt, word), FragmentFit::Incomplete, "stmt `{word}`");
        assert_eq!(fit(FragmentKind::Item, word), FragmentFit::Incomplete, "item `{word}`");
    }
}

#[test]
fn macro_calls_complete_expressions() {
    assert_eq!(fit(FragmentKind::Expr, "vec![1, 2]"), FragmentFit::Complete);
    assert_eq!(fit(FragmentKind::Expr, "a ! b"), FragmentFit::Mismatch);
    assert_eq!(fit(FragmentKind::Item, "pub(crate) fn foo() {}"), FragmentFit::Complete);
    assert_eq!(fit(FragmentKind::Stmt, "const X: u8 = 1;"), FragmentFit::Complete);
    assert_eq!(fit(FragmentKind::Stmt, "unsafe { x }"), FragmentFit::Complete);
}

#[test]
fn vis_fragment_may_be_empty() {
    assert_eq!(check_fragment(FragmentKind::Vis, &[]), FragmentFit::Complete);
    assert_eq!(fit(FragmentKind::Vis, "pub"), FragmentFit::Complete);
    assert_eq!(fit(FragmentKind::Vis, "pub(crate)"), FragmentFit::Complete);
}

#[test]
fn follow_sets_bound_open_ended_fragments() {
    assert!(can_follow(FragmentKind::Expr, &TokenKind::Comma));
    assert!(can_follow(FragmentKind::Expr, &TokenKind::FatArrow));
    assert!(!can_follow(FragmentKind::Expr, &TokenKind::Star));
    assert!(!can_follow(FragmentKind::Expr, &TokenKind::ident("foo")));
    assert!(can_follow(FragmentKind::Ty, &TokenKind::ident("as")));
    assert!(can_follow(FragmentKind::Ty, &TokenKind::LBrace));
    assert!(!can_follow(FragmentKind::Ty, &TokenKind::Plus));
    assert!(can_follow(FragmentKind::Pat, &TokenKind::ident("if")));
    assert!(!can_follow(FragmentKind::Pat, &TokenKind::Pipe));
    assert!(can_follow(FragmentKind::Ident, &TokenKind::Star));
    assert!(can_follow(FragmentKind::Expr, &TokenKind::RParen));
}

#[test]
fn probe_recognizes_member_access() {
    let toks = tokens("a * s.");
    assert_eq!(
        probe_partial_expression(&toks),
        Some(SyntacticContext::MemberAccess {
            receiver: vec!["s".into()],
        })
    );
    let toks = tokens("x, config.paths.");
    assert_eq!(
        probe_partial_expression(&toks),
        Some(SyntacticContext::MemberAccess {
            receiver: vec!["config".into(), "paths".into()],
        })
    );
}

#[test]
fn probe_recognizes_path_segments() {
    let toks = tokens("std::collections::");
    assert_eq!(
        probe_partial_expression(&toks),
        Some(SyntacticContext::PathSegment {
            qualifier: vec!["std".into(), "collections".into()],
        })
    );
}

#[test]
fn probe_ignores_other_positions() {
    assert_eq!(probe_partial_expression(&tokens("foo *")), None);
    assert_eq!(probe_partial_expression(&tokens("")), None);
    assert_eq!(probe_partial_expression(&tokens("let a:")), None);
    assert_eq!(probe_partial_expression(&tokens(".")), None);
}

#[test]
fn registry_collects_definitions_and_reports_duplicates() {
    let registry = MacroRegistry::build(
        "macro_rules! first { ($e:expr) => ($e); }
         macro_rules! second { () => (); }
         macro_rules! first { ($t:ty) => (); }",
    );
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.names().collect::<Vec<_>>(), vec!["first", "second"]);
    assert_eq!(registry.errors().len(), 1, "duplicate should be reported");
    let first = registry.get("first").expect("first is registered");
    assert_eq!(
        first.rules[0].pattern,
        vec![PatternElement::Metavar {
            name: "e".into(),
            kind: FragmentKind::Expr,
        }],
        "the first definition stays in effect"
    );
}

#[test]
fn registry_keeps_malformed_definitions_without_rules() {
    let registry = MacroRegistry::build("macro_rules! broken { ($x:nope) => (); }");
    let def = registry.get("broken").expect("broken is registered");
    assert!(!def.has_rules());
    assert_eq!(registry.errors().len(), 1);
}

#[test]
fn registry_resolves_path_qualified_names() {
    let registry = MacroRegistry::build("macro_rules! m { () => (); }");
    assert!(registry.get("crate::m").is_some());
    assert!(registry.get("other").is_none());
}
