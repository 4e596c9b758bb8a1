use crate::{
    language::lexer::lex_lossy,
    lsp::{
        analysis::{module_path_at, visible_from, ScopeIndex, Visibility},
        completion::{Namespace, NamespaceFilter, ScopeHandle, ScopeProvider, Symbol, SymbolKind},
    },
};

const CARET: &str = "/*caret*/";

fn scan(code: &str) -> (ScopeIndex, ScopeHandle) {
    let offset = code.find(CARET).expect("fixture has a caret marker");
    let source = code.replacen(CARET, "", 1);
    let (tokens, _) = lex_lossy(&source);
    let handle = ScopeHandle::new(module_path_at(&tokens, offset), offset);
    (ScopeIndex::scan(&source), handle)
}

fn accessible(symbols: &[Symbol]) -> Vec<&str> {
    symbols
        .iter()
        .filter(|symbol| symbol.accessible)
        .map(|symbol| symbol.name.as_str())
        .collect()
}

#[test]
fn locals_are_visible_after_their_statement() {
    let (index, here) = scan(
        "fn main() {
            let early = 1;
            /*caret*/
            let late = 2;
        }",
    );
    let symbols = index.symbols(NamespaceFilter::Only(Namespace::Value), &here);
    let names = accessible(&symbols);
    assert!(names.contains(&"early"), "got {names:?}");
    assert!(!names.contains(&"late"), "got {names:?}");
}

#[test]
fn locals_do_not_leak_out_of_their_block() {
    let (index, here) = scan(
        "fn main() {
            { let inner = 1; }
            /*caret*/
        }",
    );
    let symbols = index.symbols(NamespaceFilter::Unfiltered, &here);
    let names = accessible(&symbols);
    assert!(!names.contains(&"inner"), "got {names:?}");
}

#[test]
fn parameters_and_pattern_bindings_are_locals() {
    let (index, here) = scan(
        "fn run(count: usize, (left, right): (u8, u8)) {
            if let Some(found) = lookup() {
                for item in list {
                    /*caret*/
                }
            }
        }",
    );
    let symbols = index.symbols(NamespaceFilter::Only(Namespace::Value), &here);
    let names = accessible(&symbols);
    for expected in ["count", "left", "right", "found", "item", "run"] {
        assert!(names.contains(&expected), "missing {expected} in {names:?}");
    }
}

#[test]
fn innermost_locals_come_first() {
    let (index, here) = scan(
        "fn main() {
            let value = 1;
            let value = 2;
            /*caret*/
        }",
    );
    let locals: Vec<_> = index
        .symbols(NamespaceFilter::Only(Namespace::Value), &here)
        .into_iter()
        .filter(|symbol| symbol.kind == SymbolKind::Local)
        .map(|symbol| symbol.name)
        .collect();
    assert_eq!(locals, vec!["value", "value"]);
    assert_eq!(index.visible_locals(here.offset).len(), 2);
}

#[test]
fn items_of_child_modules_are_not_in_scope() {
    let (index, here) = scan(
        "struct Here;
        mod child { pub struct There; }
        fn main() { /*caret*/ }",
    );
    let symbols = index.symbols(NamespaceFilter::Only(Namespace::Type), &here);
    let names = accessible(&symbols);
    assert!(names.contains(&"Here"));
    assert!(names.contains(&"child"));
    assert!(!names.contains(&"There"));
    assert!(
        symbols.iter().any(|symbol| symbol.name == "There" && !symbol.accessible),
        "items elsewhere are still reported as inaccessible"
    );
}

#[test]
fn imports_bring_items_into_scope() {
    let (index, here) = scan(
        "use std::collections::HashMap;
        use shapes::{Circle as Round, *};
        mod shapes { pub struct Circle; pub struct Square; }
        fn main() { /*caret*/ }",
    );
    let symbols = index.symbols(NamespaceFilter::Only(Namespace::Type), &here);
    let names = accessible(&symbols);
    for expected in ["HashMap", "Round", "Square", "Circle", "Option", "i32"] {
        assert!(names.contains(&expected), "missing {expected} in {names:?}");
    }
    assert!(!names.contains(&"Rc"), "got {names:?}");
}

#[test]
fn private_items_of_other_modules_stay_hidden_through_imports() {
    let (index, here) = scan(
        "use inner::Secret;
        mod inner { struct Secret; }
        fn main() { /*caret*/ }",
    );
    let symbols = index.symbols(NamespaceFilter::Unfiltered, &here);
    let names = accessible(&symbols);
    assert!(!names.contains(&"Secret"), "got {names:?}");
}

#[test]
fn members_follow_field_types() {
    let (index, here) = scan(
        "struct Paths { root: String }
        struct Config { paths: Paths, verbose: bool }
        impl Config {
            fn load() -> Config { todo!() }
            pub fn describe(&self) -> String { /*caret*/ }
        }
        fn main() {
            let config = Config::load();
        }",
    );
    let members = index.members(&["self".to_string()], &here);
    let names = accessible(&members);
    assert!(names.contains(&"paths"));
    assert!(names.contains(&"verbose"));
    assert!(names.contains(&"describe"));

    let nested = index.members(&["self".to_string(), "paths".to_string()], &here);
    assert_eq!(accessible(&nested), vec!["root"]);
}

#[test]
fn constructor_calls_give_locals_a_type() {
    let (index, here) = scan(
        "struct Config { verbose: bool }
        impl Config { fn new() -> Self { todo!() } }
        fn main() {
            let config = Config::new();
            /*caret*/
        }",
    );
    let symbols = index.members(&["config".to_string()], &here);
    let names = accessible(&symbols);
    assert!(names.contains(&"verbose"), "got {names:?}");
}

#[test]
fn private_fields_are_hidden_outside_their_module() {
    let (index, here) = scan(
        "mod model {
            pub struct Point { pub x: i32, y: i32 }
        }
        fn main() {
            let p: model::Point = todo!();
            /*caret*/
        }",
    );
    let symbols = index.members(&["p".to_string()], &here);
    let names = accessible(&symbols);
    assert_eq!(names, vec!["x"]);
}

#[test]
fn path_members_list_module_items_and_variants() {
    let (index, here) = scan(
        "mod a { pub mod b { pub fn f() {} fn g() {} } }
        enum Shape { Circle, Square }
        fn main() { /*caret*/ }",
    );
    let symbols = index.path_members(&["a".into(), "b".into()], &here);
    let names = accessible(&symbols);
    assert_eq!(names, vec!["f"]);

    let symbols = index.path_members(&["Shape".into()], &here);

    let names = accessible(&symbols);
    assert_eq!(names, vec!["Circle", "Square"]);

    let symbols = index.path_members(&["std".into(), "rc".into()], &here);

    let names = accessible(&symbols);
    assert!(names.contains(&"Rc"), "got {names:?}");
}

#[test]
fn module_path_follows_nested_mod_blocks() {
    let source = "mod a { mod b { fn f() {} } fn g() {} } fn h() {}";
    let (tokens, _) = lex_lossy(source);
    let in_f = source.find("fn f").expect("fn f");
    let in_g = source.find("fn g").expect("fn g");
    let in_h = source.find("fn h").expect("fn h");
    assert_eq!(module_path_at(&tokens, in_f), "crate::a::b");
    assert_eq!(module_path_at(&tokens, in_g), "crate::a");
    assert_eq!(module_path_at(&tokens, in_h), "crate");
}

#[test]
fn visibility_rules() {
    assert!(visible_from("crate::a", Visibility::Public, "crate::b"));
    assert!(visible_from("crate::a", Visibility::Private, "crate::a::inner"));
    assert!(!visible_from("crate::a", Visibility::Private, "crate"));
    assert!(visible_from("crate::a::b", Visibility::Super, "crate::a"));
    assert!(!visible_from("crate::a::b", Visibility::Super, "crate::c"));
    assert!(visible_from("crate::a::b", Visibility::Crate, "crate::c"));
}

#[test]
fn macros_live_in_their_own_namespace() {
    let (index, here) = scan(
        "macro_rules! shout { () => () }
        fn main() { /*caret*/ }",
    );
    let symbols = index.symbols(NamespaceFilter::Only(Namespace::Macro), &here);
    let names = accessible(&symbols);
    assert!(names.contains(&"shout"));
    assert!(names.contains(&"println"));
    assert!(!names.contains(&"main"));
}
