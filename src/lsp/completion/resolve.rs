use super::*;

const STATEMENT_KEYWORDS: &[&str] = &[
    "let", "if", "match", "loop", "while", "for", "return", "break", "continue", "unsafe",
];

const ITEM_KEYWORDS: &[&str] = &[
    "fn",
    "struct",
    "enum",
    "trait",
    "impl",
    "mod",
    "use",
    "const",
    "static",
    "type",
    "pub",
    "extern",
    "macro_rules",
];

const VISIBILITY_KEYWORDS: &[&str] = &["pub", "pub(crate)", "pub(super)"];

const LITERAL_KEYWORDS: &[&str] = &["true", "false"];

/// The scope query a fragment kind maps to, plus the keywords that may
/// start an instance of it.
struct FragmentQuery {
    filters: &'static [NamespaceFilter],
    keywords: &'static [&'static [&'static str]],
}

fn fragment_query(kind: FragmentKind) -> FragmentQuery {
    use Namespace::*;
    use NamespaceFilter::*;
    let (filters, keywords): (&'static [NamespaceFilter], &'static [&'static [&'static str]]) =
        match kind {
            FragmentKind::Expr => (&[Only(Value)], &[]),
            FragmentKind::Ty | FragmentKind::Path => (&[Only(Type)], &[]),
            FragmentKind::Ident | FragmentKind::Pat | FragmentKind::Tt | FragmentKind::Meta => {
                (&[Unfiltered], &[])
            }
            FragmentKind::Block => (&[Only(Value), Only(Type)], &[STATEMENT_KEYWORDS]),
            FragmentKind::Stmt => (
                &[Only(Value), Only(Type)],
                &[STATEMENT_KEYWORDS, ITEM_KEYWORDS],
            ),
            FragmentKind::Item => (&[Only(Macro)], &[ITEM_KEYWORDS]),
            FragmentKind::Lifetime => (&[Only(Lifetime)], &[&["'static"]]),
            FragmentKind::Vis => (&[], &[VISIBILITY_KEYWORDS]),
            FragmentKind::Literal => (&[], &[LITERAL_KEYWORDS]),
        };
    FragmentQuery { filters, keywords }
}

/// Turns the expectations at the caret into candidates visible from
/// `scope`, filtered by the partially typed `prefix`.
pub fn resolve_expectations(
    expectations: &ExpectationSet,
    prefix: Option<&str>,
    scope: &ScopeHandle,
    provider: &dyn ScopeProvider,
    config: &CompletionConfig,
) -> Vec<Candidate> {
    let mut list = CandidateList::new();
    for expectation in expectations.iter() {
        match expectation {
            Expectation::Literal(kind) => {
                if !is_keyword_like(kind) {
                    continue;
                }
                let text = kind.text();
                if prefix_matches(&text, prefix) {
                    list.push(Candidate::keyword(text, CandidateOrigin::MacroLiteral));
                }
            }
            Expectation::Fragment(kind) => {
                let query = fragment_query(*kind);
                for filter in query.filters {
                    for symbol in provider.symbols(*filter, scope) {
                        if !symbol.accessible || !prefix_matches(&symbol.name, prefix) {
                            continue;
                        }
                        list.push(
                            Candidate::from_symbol(&symbol, CandidateOrigin::MacroFragment)
                                .justified_by(Some(*kind)),
                        );
                    }
                }
                if !config.keyword_candidates {
                    continue;
                }
                for keyword in query.keywords.iter().flat_map(|group| group.iter()) {
                    if prefix_matches(keyword, prefix) {
                        list.push(
                            Candidate::keyword(*keyword, CandidateOrigin::MacroLiteral)
                                .justified_by(Some(*kind)),
                        );
                    }
                }
            }
        }
    }
    tracing::debug!(
        expectations = expectations.len(),
        candidates = list.len(),
        "resolved fragment expectations"
    );
    list.into_vec(config.max_candidates)
}
