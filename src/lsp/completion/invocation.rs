use super::*;
use crate::{
    language::{lexer::lex_lossy, macro_rules::group_end},
    lsp::analysis::module_path_at,
};

/// Finds the innermost `name!(...)`, `name![...]` or `name!{...}` whose
/// argument contains `caret`. An invocation whose group is never closed
/// extends to the end of the source.
pub fn locate_invocation(source: &str, caret: usize) -> Option<Invocation> {
    let caret = caret.min(source.len());
    let (tokens, _) = lex_lossy(source);
    let mut innermost: Option<(String, usize, usize)> = None;
    for idx in 0..tokens.len() {
        let TokenKind::Identifier(name) = &tokens[idx].kind else {
            continue;
        };
        if name == "macro_rules" {
            continue;
        }
        if tokens.get(idx + 1).map(|t| &t.kind) != Some(&TokenKind::Bang) {
            continue;
        }
        let Some(open) = tokens.get(idx + 2) else {
            continue;
        };
        if open.kind.open_delimiter().is_none() || open.span.end > caret {
            continue;
        }
        let arg_end = group_end(&tokens, idx + 2)
            .map(|close| tokens[close].span.start)
            .unwrap_or(source.len());
        if caret > arg_end {
            continue;
        }
        innermost = Some((name.clone(), open.span.end, arg_end));
    }

    let (macro_name, start, end) = innermost?;
    let argument = source.get(start..end)?.to_string();
    let scope = ScopeHandle::new(module_path_at(&tokens, caret), caret);
    tracing::trace!(macro_name = %macro_name, start, end, "located macro invocation");
    Some(Invocation::new(macro_name, argument, caret - start, scope))
}
