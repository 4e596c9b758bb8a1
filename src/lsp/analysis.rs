//! An in-memory scope provider built from a single Rust source file.
//!
//! The scanner reads items, imports and `let` bindings straight from the
//! token stream. It does not type-check anything: local types come from
//! annotations and from struct literal or constructor initializers.

use crate::{
    language::{
        fragments::is_reserved,
        lexer::lex_lossy,
        macro_rules::group_end,
        span::Span,
        token::{Token, TokenKind},
    },
    lsp::completion::{
        Namespace, NamespaceFilter, ScopeHandle, ScopeProvider, Symbol, SymbolKind, ROOT_MODULE,
    },
};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Crate,
    Super,
    Private,
}

#[derive(Clone, Debug)]
pub struct ItemDecl {
    pub symbol: Symbol,
    pub visibility: Visibility,
}

#[derive(Clone, Debug)]
pub struct MemberDecl {
    pub symbol: Symbol,
    pub visibility: Visibility,
    pub module: String,
    /// Declared type of a field, used to follow receiver chains.
    pub ty: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Import {
    pub path: Vec<String>,
    pub alias: Option<String>,
    pub glob: bool,
}

#[derive(Clone, Debug)]
pub struct LocalDecl {
    pub name: String,
    pub ty: Option<String>,
    pub scope: Span,
    pub available_from: usize,
}

#[derive(Clone, Debug, Default)]
struct ModuleScope {
    items: Vec<ItemDecl>,
    imports: Vec<Import>,
}

const MAX_IMPORT_DEPTH: usize = 8;

const PRIMITIVES: &[&str] = &[
    "bool", "char", "str", "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64",
    "u128", "usize", "f32", "f64",
];

const PRELUDE_TYPES: &[&str] = &["Option", "Result", "Vec", "String", "Box"];
const PRELUDE_TRAITS: &[&str] = &["Clone", "Copy", "Default", "Iterator", "ToString"];
const PRELUDE_VALUES: &[&str] = &["Some", "None", "Ok", "Err"];
const PRELUDE_MACROS: &[&str] = &["assert", "assert_eq", "format", "panic", "println", "vec"];

const STD_MODULES: &[(&str, &[&str])] = &[
    ("std::collections", &["BTreeMap", "BTreeSet", "HashMap", "HashSet", "VecDeque"]),
    ("std::rc", &["Rc", "Weak"]),
    ("std::sync", &["Arc", "Mutex", "RwLock"]),
    ("std::cell", &["Cell", "RefCell"]),
];

#[derive(Clone, Debug)]
pub struct ScopeIndex {
    modules: BTreeMap<String, ModuleScope>,
    members: HashMap<String, Vec<MemberDecl>>,
    locals: Vec<LocalDecl>,
    prelude: Vec<Symbol>,
}

impl Default for ScopeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeIndex {
    /// An index holding only the crate root, the prelude, the primitive
    /// types and a few `std` modules.
    pub fn new() -> Self {
        let mut prelude = Vec::new();
        for name in PRIMITIVES {
            prelude.push(Symbol::new(*name, Namespace::Type, SymbolKind::Primitive));
        }
        for name in PRELUDE_TYPES {
            prelude.push(Symbol::new(*name, Namespace::Type, SymbolKind::Struct));
        }
        for name in PRELUDE_TRAITS {
            prelude.push(Symbol::new(*name, Namespace::Type, SymbolKind::Trait));
        }
        for name in PRELUDE_VALUES {
            prelude.push(Symbol::new(*name, Namespace::Value, SymbolKind::Variant));
        }
        for name in PRELUDE_MACROS {
            prelude.push(Symbol::new(*name, Namespace::Macro, SymbolKind::Macro));
        }

        let mut modules = BTreeMap::new();
        modules.insert(ROOT_MODULE.to_string(), ModuleScope::default());
        modules.insert("std".to_string(), ModuleScope::default());
        for (path, names) in STD_MODULES {
            let scope = ModuleScope {
                items: names
                    .iter()
                    .map(|name| ItemDecl {
                        symbol: Symbol::new(*name, Namespace::Type, SymbolKind::Struct),
                        visibility: Visibility::Public,
                    })
                    .collect(),
                imports: Vec::new(),
            };
            modules.insert(path.to_string(), scope);
        }
        Self {
            modules,
            members: HashMap::new(),
            locals: Vec::new(),
            prelude,
        }
    }

    pub fn scan(source: &str) -> Self {
        let (tokens, errors) = lex_lossy(source);
        if !errors.is_empty() {
            tracing::debug!(errors = errors.len(), "scanning source with lexical errors");
        }
        let mut index = Self::new();
        let mut scanner = Scanner {
            tokens: &tokens,
            source_len: source.len(),
            index: &mut index,
        };
        scanner.scan_items(0, tokens.len(), ROOT_MODULE);
        scanner.scan_locals();
        tracing::debug!(
            modules = index.modules.len(),
            locals = index.locals.len(),
            "scanned scope index"
        );
        index
    }

    pub fn add_module(&mut self, path: &str) {
        let mut current = String::new();
        for segment in path.split("::") {
            if !current.is_empty() {
                current.push_str("::");
            }
            current.push_str(segment);
            self.modules.entry(current.clone()).or_default();
        }
    }

    pub fn add_item(&mut self, module: &str, symbol: Symbol, visibility: Visibility) {
        self.add_module(module);
        if let Some(scope) = self.modules.get_mut(module) {
            scope.items.push(ItemDecl { symbol, visibility });
        }
    }

    pub fn add_import(&mut self, module: &str, import: Import) {
        self.add_module(module);
        if let Some(scope) = self.modules.get_mut(module) {
            if !scope.imports.contains(&import) {
                scope.imports.push(import);
            }
        }
    }

    pub fn add_member(&mut self, owner: &str, member: MemberDecl) {
        self.members.entry(owner.to_string()).or_default().push(member);
    }

    pub fn add_local(&mut self, local: LocalDecl) {
        self.locals.push(local);
    }

    /// Locals whose block contains `offset` and that are declared before
    /// it, innermost first.
    pub fn visible_locals(&self, offset: usize) -> Vec<&LocalDecl> {
        let mut visible: Vec<&LocalDecl> = self
            .locals
            .iter()
            .filter(|local| scope_contains(local.scope, offset))
            .filter(|local| offset >= local.available_from)
            .collect();
        visible.sort_by(|a, b| b.available_from.cmp(&a.available_from));
        visible
    }

    fn module_items(&self, module: &str) -> &[ItemDecl] {
        self.modules
            .get(module)
            .map(|scope| scope.items.as_slice())
            .unwrap_or_default()
    }

    /// Resolves a module path written inside `from`.
    fn resolve_module(&self, path: &[String], from: &str) -> Option<String> {
        self.resolve_module_at(path, from, 0)
    }

    fn resolve_module_at(&self, path: &[String], from: &str, depth: usize) -> Option<String> {
        if depth > MAX_IMPORT_DEPTH {
            return None;
        }
        let (first, rest) = path.split_first()?;
        let mut current = match first.as_str() {
            "crate" => ROOT_MODULE.to_string(),
            "self" => from.to_string(),
            "super" => parent_module(from)?.to_string(),
            "std" | "core" | "alloc" => "std".to_string(),
            name => {
                let child = format!("{from}::{name}");
                let top = format!("{ROOT_MODULE}::{name}");
                if self.modules.contains_key(&child) {
                    child
                } else if self.modules.contains_key(&top) {
                    top
                } else {
                    self.imported_module(name, from, depth + 1)?
                }
            }
        };
        for segment in rest {
            current = match segment.as_str() {
                "super" => parent_module(&current)?.to_string(),
                "self" => current,
                name => format!("{current}::{name}"),
            };
        }
        self.modules.contains_key(&current).then_some(current)
    }

    /// A module brought into `from` by a non-glob `use`.
    fn imported_module(&self, name: &str, from: &str, depth: usize) -> Option<String> {
        let scope = self.modules.get(from)?;
        scope.imports.iter().find_map(|import| {
            if import.glob {
                return None;
            }
            let path = import_target_path(import);
            let local_name = import.alias.as_deref().or(path.last().map(String::as_str))?;
            if local_name != name {
                return None;
            }
            self.resolve_module_at(path, from, depth)
                .filter(|resolved| resolved != from)
        })
    }

    fn items_named<'s>(&'s self, module: &str, name: &'s str) -> impl Iterator<Item = &'s ItemDecl> {
        self.module_items(module)
            .iter()
            .filter(move |item| item.symbol.name == name)
    }

    fn imported_symbols(&self, import: &Import, requester: &str) -> Vec<Symbol> {
        let mut symbols = Vec::new();
        if import.glob {
            if let Some(target) = self.resolve_module(&import.path, requester) {
                for item in self.module_items(&target) {
                    let accessible = visible_from(&target, item.visibility, requester);
                    symbols.push(item.symbol.clone().with_access(accessible));
                }
            } else if let Some(owner) = import.path.last() {
                for member in self.members.get(owner).into_iter().flatten() {
                    if member.symbol.kind == SymbolKind::Variant {
                        symbols.push(member.symbol.clone());
                    }
                }
            }
            return symbols;
        }

        let path = import_target_path(import);
        let Some((name, parent)) = path.split_last() else {
            return symbols;
        };
        let local_name = import.alias.clone().unwrap_or_else(|| name.clone());
        if local_name == "_" {
            return symbols;
        }
        if let Some(target) = self.resolve_module(parent, requester) {
            for item in self.items_named(&target, name) {
                let mut symbol = item.symbol.clone();
                symbol.name = local_name.clone();
                symbol.accessible = visible_from(&target, item.visibility, requester);
                symbols.push(symbol);
            }
            if !symbols.is_empty() {
                return symbols;
            }
        }
        if let Some(module) = self.resolve_module(path, requester) {
            if module != requester {
                symbols.push(Symbol::new(local_name, Namespace::Type, SymbolKind::Module));
            }
        }
        symbols
    }

    fn local_type(&self, name: &str, offset: usize) -> Option<String> {
        self.visible_locals(offset)
            .into_iter()
            .find(|local| local.name == name)
            .and_then(|local| local.ty.clone())
    }

    fn member_symbols(&self, owner: &str, requester: &str, keep: impl Fn(SymbolKind) -> bool) -> Vec<Symbol> {
        self.members
            .get(owner)
            .into_iter()
            .flatten()
            .filter(|member| keep(member.symbol.kind))
            .map(|member| {
                let accessible = visible_from(&member.module, member.visibility, requester);
                member.symbol.clone().with_access(accessible)
            })
            .collect()
    }
}

impl ScopeProvider for ScopeIndex {
    fn symbols(&self, filter: NamespaceFilter, scope: &ScopeHandle) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = Vec::new();
        for local in self.visible_locals(scope.offset) {
            let mut symbol = Symbol::new(local.name.clone(), Namespace::Value, SymbolKind::Local);
            if let Some(ty) = &local.ty {
                symbol = symbol.with_detail(ty.clone());
            }
            symbols.push(symbol);
        }
        if let Some(module) = self.modules.get(&scope.module) {
            symbols.extend(module.items.iter().map(|item| item.symbol.clone()));
            for import in &module.imports {
                symbols.extend(self.imported_symbols(import, &scope.module));
            }
        }
        symbols.extend(self.prelude.iter().cloned());

        // Everything else the index knows about is reported, but not as
        // accessible from here.
        let reachable: HashSet<(String, Namespace)> = symbols
            .iter()
            .filter(|symbol| symbol.accessible)
            .map(|symbol| (symbol.name.clone(), symbol.namespace))
            .collect();
        for (path, module) in &self.modules {
            if path == &scope.module {
                continue;
            }
            for item in &module.items {
                let key = (item.symbol.name.clone(), item.symbol.namespace);
                if !reachable.contains(&key) {
                    symbols.push(item.symbol.clone().with_access(false));
                }
            }
        }

        symbols.retain(|symbol| filter.admits(symbol.namespace));
        symbols
    }

    fn members(&self, receiver: &[String], scope: &ScopeHandle) -> Vec<Symbol> {
        let Some((first, rest)) = receiver.split_first() else {
            return Vec::new();
        };
        let Some(mut ty) = self.local_type(first, scope.offset) else {
            return Vec::new();
        };
        for segment in rest {
            let next = self
                .members
                .get(&ty)
                .and_then(|members| members.iter().find(|m| &m.symbol.name == segment))
                .and_then(|member| member.ty.clone());
            match next {
                Some(next) => ty = next,
                None => return Vec::new(),
            }
        }
        self.member_symbols(&ty, &scope.module, |kind| {
            matches!(kind, SymbolKind::Field | SymbolKind::Method)
        })
    }

    fn path_members(&self, qualifier: &[String], scope: &ScopeHandle) -> Vec<Symbol> {
        if let Some(module) = self.resolve_module(qualifier, &scope.module) {
            return self
                .module_items(&module)
                .iter()
                .map(|item| {
                    let accessible = visible_from(&module, item.visibility, &scope.module);
                    item.symbol.clone().with_access(accessible)
                })
                .collect();
        }
        let Some(owner) = qualifier.last() else {
            return Vec::new();
        };
        self.member_symbols(owner, &scope.module, |kind| {
            matches!(
                kind,
                SymbolKind::Variant | SymbolKind::Method | SymbolKind::Constant
            )
        })
    }
}

/// Builds a [`ScopeIndex`] by hand, for callers that already know what is
/// in scope.
#[derive(Debug, Default)]
pub struct ScopeIndexBuilder {
    index: ScopeIndex,
}

impl ScopeIndexBuilder {
    pub fn new() -> Self {
        Self {
            index: ScopeIndex::new(),
        }
    }

    pub fn module(mut self, path: &str) -> Self {
        self.index.add_module(path);
        self
    }

    pub fn item(
        mut self,
        module: &str,
        name: &str,
        namespace: Namespace,
        kind: SymbolKind,
        visibility: Visibility,
    ) -> Self {
        self.index
            .add_item(module, Symbol::new(name, namespace, kind), visibility);
        self
    }

    /// Adds `use <path>;` to `module`. A path ending in `*` is a glob.
    pub fn import(mut self, module: &str, path: &str, alias: Option<&str>) -> Self {
        let mut segments: Vec<String> = path.split("::").map(str::to_string).collect();
        let glob = segments.last().is_some_and(|last| last == "*");
        if glob {
            segments.pop();
        }
        self.index.add_import(
            module,
            Import {
                path: segments,
                alias: alias.map(str::to_string),
                glob,
            },
        );
        self
    }

    pub fn local(mut self, name: &str, ty: Option<&str>, scope: Span, available_from: usize) -> Self {
        self.index.add_local(LocalDecl {
            name: name.to_string(),
            ty: ty.map(str::to_string),
            scope,
            available_from,
        });
        self
    }

    pub fn field(mut self, owner: &str, module: &str, name: &str, ty: &str, visibility: Visibility) -> Self {
        self.index.add_member(
            owner,
            MemberDecl {
                symbol: Symbol::new(name, Namespace::Value, SymbolKind::Field).with_detail(ty),
                visibility,
                module: module.to_string(),
                ty: Some(ty.to_string()),
            },
        );
        self
    }

    pub fn build(self) -> ScopeIndex {
        self.index
    }
}

pub fn scope_contains(scope: Span, offset: usize) -> bool {
    offset >= scope.start && offset < scope.end
}

pub fn parent_module(module: &str) -> Option<&str> {
    module.rfind("::").map(|idx| &module[..idx])
}

fn is_within(module: &str, ancestor: &str) -> bool {
    module == ancestor
        || (module.starts_with(ancestor) && module[ancestor.len()..].starts_with("::"))
}

/// Whether an item declared in `declared_in` with `visibility` can be named
/// from `requester`.
pub fn visible_from(declared_in: &str, visibility: Visibility, requester: &str) -> bool {
    match visibility {
        Visibility::Public => true,
        Visibility::Crate => !declared_in.starts_with("std") || requester.starts_with("std"),
        Visibility::Super => is_within(requester, parent_module(declared_in).unwrap_or(declared_in)),
        Visibility::Private => is_within(requester, declared_in),
    }
}

/// `use a::b::{self}` names the module `a::b` itself.
fn import_target_path(import: &Import) -> &[String] {
    match import.path.split_last() {
        Some((last, parent)) if last == "self" => parent,
        _ => &import.path,
    }
}

/// Module path (`crate::a::b`) of the innermost inline `mod` block
/// containing `offset`.
pub fn module_path_at(tokens: &[Token], offset: usize) -> String {
    let mut path = vec![ROOT_MODULE.to_string()];
    let mut idx = 0;
    while idx + 2 < tokens.len() {
        let is_mod = tokens[idx].kind.is_ident("mod") && tokens[idx + 2].kind == TokenKind::LBrace;
        let name = tokens[idx + 1].kind.as_ident();
        match (is_mod, name) {
            (true, Some(name)) => {
                let open = &tokens[idx + 2];
                let close = group_end(tokens, idx + 2);
                let closes_after = close.map_or(true, |close| offset <= tokens[close].span.start);
                if open.span.end <= offset && closes_after {
                    path.push(name.to_string());
                    idx += 3;
                } else {
                    idx = close.map_or(idx + 3, |close| close + 1);
                }
            }
            _ => idx += 1,
        }
    }
    path.join("::")
}

struct Scanner<'a> {
    tokens: &'a [Token],
    source_len: usize,
    index: &'a mut ScopeIndex,
}

impl<'a> Scanner<'a> {
    fn kind(&self, idx: usize) -> Option<&'a TokenKind> {
        self.tokens.get(idx).map(|t| &t.kind)
    }

    fn ident(&self, idx: usize) -> Option<&'a str> {
        self.kind(idx).and_then(TokenKind::as_ident)
    }

    fn is(&self, idx: usize, kind: &TokenKind) -> bool {
        self.kind(idx) == Some(kind)
    }

    fn close_of(&self, open: usize) -> usize {
        group_end(self.tokens, open).unwrap_or(self.tokens.len().saturating_sub(1))
    }

    fn end_offset_of(&self, close: usize) -> usize {
        self.tokens
            .get(close)
            .filter(|token| token.kind.close_delimiter().is_some())
            .map(|token| token.span.end)
            .unwrap_or(self.source_len)
    }

    /// First index at or after `from` holding one of `stops`, outside any
    /// nested group, bounded by `end`.
    fn find_top_level(&self, from: usize, end: usize, stops: &[TokenKind]) -> Option<usize> {
        let mut idx = from;
        while idx < end {
            let kind = self.kind(idx)?;
            if stops.contains(kind) {
                return Some(idx);
            }
            if kind.open_delimiter().is_some() {
                idx = self.close_of(idx) + 1;
                continue;
            }
            if kind.close_delimiter().is_some() {
                return None;
            }
            idx += 1;
        }
        None
    }

    fn visibility(&self, idx: usize) -> (Visibility, usize) {
        if self.ident(idx) != Some("pub") {
            return (Visibility::Private, idx);
        }
        if self.is(idx + 1, &TokenKind::LParen) {
            let scope = match self.ident(idx + 2) {
                Some("crate") => Some(Visibility::Crate),
                Some("super") => Some(Visibility::Super),
                Some("self") => Some(Visibility::Private),
                Some("in") => Some(Visibility::Crate),
                _ => None,
            };
            if let Some(visibility) = scope {
                return (visibility, self.close_of(idx + 1) + 1);
            }
        }
        (Visibility::Public, idx + 1)
    }

    fn scan_items(&mut self, start: usize, end: usize, module: &str) {
        self.index.add_module(module);
        let mut idx = start;
        while idx < end {
            let Some(kind) = self.kind(idx) else {
                return;
            };
            if kind == &TokenKind::Hash {
                idx += 1;
                if self.is(idx, &TokenKind::Bang) {
                    idx += 1;
                }
                if self.is(idx, &TokenKind::LBracket) {
                    idx = self.close_of(idx) + 1;
                }
                continue;
            }
            if kind.open_delimiter().is_some() {
                idx = self.close_of(idx) + 1;
                continue;
            }
            if kind.as_ident().is_none() {
                idx += 1;
                continue;
            }
            idx = self.scan_item(idx, end, module).unwrap_or(idx + 1);
        }
    }

    /// Records the item starting at `start`, if any, and returns the index
    /// just past it.
    fn scan_item(&mut self, start: usize, end: usize, module: &str) -> Option<usize> {
        let (visibility, mut idx) = self.visibility(start);
        loop {
            match self.ident(idx) {
                Some("unsafe" | "async" | "default") => idx += 1,
                Some("const") if matches!(self.ident(idx + 1), Some("fn" | "unsafe")) => idx += 1,
                Some("extern") if !matches!(self.ident(idx + 1), Some("crate")) => {
                    idx += 1;
                    if matches!(self.kind(idx), Some(TokenKind::String(_))) {
                        idx += 1;
                    }
                }
                _ => break,
            }
        }
        let keyword = self.ident(idx)?;
        let item = |name: &str, namespace, kind| (Symbol::new(name, namespace, kind), visibility);
        match keyword {
            "mod" => {
                let name = self.ident(idx + 1)?;
                let (symbol, vis) = item(name, Namespace::Type, SymbolKind::Module);
                self.index.add_item(module, symbol, vis);
                let child = format!("{module}::{name}");
                self.index.add_module(&child);
                if self.is(idx + 2, &TokenKind::LBrace) {
                    let close = self.close_of(idx + 2);
                    self.scan_items(idx + 3, close.min(end), &child);
                    return Some(close + 1);
                }
                Some(idx + 2)
            }
            "fn" => {
                let name = self.ident(idx + 1)?;
                let (symbol, vis) = item(name, Namespace::Value, SymbolKind::Function);
                self.index.add_item(module, symbol, vis);
                Some(self.scan_fn(idx + 2, end, None))
            }
            "struct" | "union" => {
                let name = self.ident(idx + 1)?.to_string();
                let (symbol, vis) = item(&name, Namespace::Type, SymbolKind::Struct);
                self.index.add_item(module, symbol, vis);
                let body = self.find_top_level(
                    idx + 2,
                    end,
                    &[TokenKind::LBrace, TokenKind::LParen, TokenKind::Semi],
                )?;
                match self.kind(body)? {
                    TokenKind::LBrace => {
                        let close = self.close_of(body);
                        self.scan_fields(&name, module, body + 1, close);
                        Some(close + 1)
                    }
                    TokenKind::LParen => {
                        let (symbol, vis) = item(&name, Namespace::Value, SymbolKind::Struct);
                        self.index.add_item(module, symbol, vis);
                        let close = self.close_of(body);
                        Some(self.find_top_level(close + 1, end, &[TokenKind::Semi])? + 1)
                    }
                    _ => {
                        let (symbol, vis) = item(&name, Namespace::Value, SymbolKind::Struct);
                        self.index.add_item(module, symbol, vis);
                        Some(body + 1)
                    }
                }
            }
            "enum" => {
                let name = self.ident(idx + 1)?.to_string();
                let (symbol, vis) = item(&name, Namespace::Type, SymbolKind::Enum);
                self.index.add_item(module, symbol, vis);
                let body = self.find_top_level(idx + 2, end, &[TokenKind::LBrace])?;
                let close = self.close_of(body);
                self.scan_variants(&name, module, body + 1, close);
                Some(close + 1)
            }
            "trait" | "type" => {
                let name = self.ident(idx + 1)?;
                let kind = if keyword == "trait" {
                    SymbolKind::Trait
                } else {
                    SymbolKind::TypeAlias
                };
                let (symbol, vis) = item(name, Namespace::Type, kind);
                self.index.add_item(module, symbol, vis);
                self.skip_item_body(idx + 2, end)
            }
            "const" | "static" => {
                let mut name_idx = idx + 1;
                if self.ident(name_idx) == Some("mut") {
                    name_idx += 1;
                }
                let name = self.ident(name_idx)?;
                if name == "_" {
                    return self.skip_item_body(name_idx + 1, end);
                }
                let kind = if keyword == "const" {
                    SymbolKind::Constant
                } else {
                    SymbolKind::Static
                };
                let mut symbol = Symbol::new(name, Namespace::Value, kind);
                if self.is(name_idx + 1, &TokenKind::Colon) {
                    if let Some(ty) = self.type_name(name_idx + 2, end) {
                        symbol = symbol.with_detail(ty);
                    }
                }
                self.index.add_item(module, symbol, visibility);
                self.skip_item_body(name_idx + 1, end)
            }
            "impl" => self.scan_impl(idx + 1, end, module),
            "use" => {
                let semi = self
                    .find_top_level(idx + 1, end, &[TokenKind::Semi])
                    .unwrap_or(end);
                let mut imports = Vec::new();
                self.parse_use_tree(idx + 1, semi, Vec::new(), &mut imports);
                for import in imports {
                    self.index.add_import(module, import);
                }
                Some(semi + 1)
            }
            "macro_rules" if self.is(idx + 1, &TokenKind::Bang) => {
                let name = self.ident(idx + 2)?;
                self.index.add_item(
                    module,
                    Symbol::new(name, Namespace::Macro, SymbolKind::Macro),
                    Visibility::Crate,
                );
                if self.kind(idx + 3)?.open_delimiter().is_some() {
                    return Some(self.close_of(idx + 3) + 1);
                }
                Some(idx + 3)
            }
            _ => None,
        }
    }

    fn skip_item_body(&self, from: usize, end: usize) -> Option<usize> {
        let stop = self.find_top_level(from, end, &[TokenKind::Semi, TokenKind::LBrace])?;
        if self.is(stop, &TokenKind::LBrace) {
            return Some(self.close_of(stop) + 1);
        }
        Some(stop + 1)
    }

    /// Scans a function from just after its name: parameters become locals
    /// of the body. Returns the index past the function.
    fn scan_fn(&mut self, from: usize, end: usize, self_ty: Option<&str>) -> usize {
        let Some(params_open) = self.find_top_level(from, end, &[TokenKind::LParen]) else {
            return from;
        };
        let params_close = self.close_of(params_open);
        let Some(body) =
            self.find_top_level(params_close + 1, end, &[TokenKind::LBrace, TokenKind::Semi])
        else {
            return params_close + 1;
        };
        if self.is(body, &TokenKind::Semi) {
            return body + 1;
        }
        let body_close = self.close_of(body);
        let scope = Span::new(self.tokens[body].span.start, self.end_offset_of(body_close));
        let available_from = self.tokens[body].span.end;
        for (part_start, part_end) in self.split_top_level(params_open + 1, params_close) {
            let colon = (part_start..part_end).find(|&idx| self.is(idx, &TokenKind::Colon));
            let pattern_end = colon.unwrap_or(part_end);
            let ty = colon.and_then(|colon| self.type_name(colon + 1, part_end));
            for name in self.pattern_bindings(part_start, pattern_end) {
                let ty = if name == "self" {
                    self_ty.map(str::to_string)
                } else {
                    ty.clone()
                };
                self.index.add_local(LocalDecl {
                    name,
                    ty,
                    scope,
                    available_from,
                });
            }
        }
        body_close + 1
    }

    fn scan_fields(&mut self, owner: &str, module: &str, start: usize, end: usize) {
        for (part_start, part_end) in self.split_top_level(start, end) {
            let mut idx = part_start;
            while self.is(idx, &TokenKind::Hash) {
                idx = self.close_of(idx + 1) + 1;
            }
            let (visibility, idx) = self.visibility(idx);
            let (Some(name), true) = (self.ident(idx), self.is(idx + 1, &TokenKind::Colon)) else {
                continue;
            };
            let ty = self.type_name(idx + 2, part_end);
            let mut symbol = Symbol::new(name, Namespace::Value, SymbolKind::Field);
            if let Some(ty) = &ty {
                symbol = symbol.with_detail(ty.clone());
            }
            self.index.add_member(
                owner,
                MemberDecl {
                    symbol,
                    visibility,
                    module: module.to_string(),
                    ty,
                },
            );
        }
    }

    fn scan_variants(&mut self, owner: &str, module: &str, start: usize, end: usize) {
        for (part_start, _) in self.split_top_level(start, end) {
            let mut idx = part_start;
            while self.is(idx, &TokenKind::Hash) {
                idx = self.close_of(idx + 1) + 1;
            }
            if let Some(name) = self.ident(idx) {
                self.index.add_member(
                    owner,
                    MemberDecl {
                        symbol: Symbol::new(name, Namespace::Value, SymbolKind::Variant),
                        visibility: Visibility::Public,
                        module: module.to_string(),
                        ty: None,
                    },
                );
            }
        }
    }

    fn scan_impl(&mut self, from: usize, end: usize, module: &str) -> Option<usize> {
        let mut idx = from;
        if self.is(idx, &TokenKind::Lt) {
            idx = self.skip_angle(idx);
        }
        let body = self.find_top_level(idx, end, &[TokenKind::LBrace])?;
        let for_idx = (idx..body).find(|&i| self.ident(i) == Some("for"));
        let ty_start = for_idx.map(|i| i + 1).unwrap_or(idx);
        let self_ty = self.type_name(ty_start, body)?;
        let close = self.close_of(body);

        let mut inner = body + 1;
        while inner < close {
            let (visibility, after_vis) = self.visibility(inner);
            let mut kw = after_vis;
            while matches!(self.ident(kw), Some("unsafe" | "async" | "default"))
                || (self.ident(kw) == Some("const") && self.ident(kw + 1) == Some("fn"))
            {
                kw += 1;
            }
            match self.ident(kw) {
                Some("fn") => {
                    let Some(name) = self.ident(kw + 1) else {
                        inner = kw + 1;
                        continue;
                    };
                    self.index.add_member(
                        &self_ty,
                        MemberDecl {
                            symbol: Symbol::new(name, Namespace::Value, SymbolKind::Method)
                                .with_detail(format!("fn {name}(..)")),
                            visibility,
                            module: module.to_string(),
                            ty: None,
                        },
                    );
                    inner = self.scan_fn(kw + 2, close, Some(&self_ty));
                }
                Some("const") => {
                    if let Some(name) = self.ident(kw + 1) {
                        self.index.add_member(
                            &self_ty,
                            MemberDecl {
                                symbol: Symbol::new(name, Namespace::Value, SymbolKind::Constant),
                                visibility,
                                module: module.to_string(),
                                ty: None,
                            },
                        );
                    }
                    inner = self
                        .find_top_level(kw + 1, close, &[TokenKind::Semi])
                        .map_or(close, |semi| semi + 1);
                }
                _ => {
                    inner = match self.kind(inner) {
                        Some(kind) if kind.open_delimiter().is_some() => self.close_of(inner) + 1,
                        _ => inner + 1,
                    };
                }
            }
        }
        Some(close + 1)
    }

    fn skip_angle(&self, open: usize) -> usize {
        let mut depth = 0usize;
        let mut idx = open;
        while let Some(kind) = self.kind(idx) {
            match kind {
                TokenKind::Lt => depth += 1,
                TokenKind::Gt => depth = depth.saturating_sub(1),
                TokenKind::Shr => depth = depth.saturating_sub(2),
                TokenKind::LBrace | TokenKind::Semi => return idx,
                _ => {}
            }
            idx += 1;
            if depth == 0 {
                return idx;
            }
        }
        idx
    }

    /// Comma-separated parts of `start..end`, ignoring commas in nested
    /// groups and generic argument lists.
    fn split_top_level(&self, start: usize, end: usize) -> Vec<(usize, usize)> {
        let mut parts = Vec::new();
        let mut part_start = start;
        let mut angle = 0usize;
        let mut idx = start;
        while idx < end {
            match self.kind(idx) {
                None => break,
                Some(kind) if kind.open_delimiter().is_some() => {
                    idx = self.close_of(idx) + 1;
                    continue;
                }
                Some(TokenKind::Lt) => angle += 1,
                Some(TokenKind::Gt) => angle = angle.saturating_sub(1),
                Some(TokenKind::Shr) => angle = angle.saturating_sub(2),
                Some(TokenKind::Comma) if angle == 0 => {
                    if part_start < idx {
                        parts.push((part_start, idx));
                    }
                    part_start = idx + 1;
                }
                _ => {}
            }
            idx += 1;
        }
        if part_start < end.min(self.tokens.len()) {
            parts.push((part_start, end.min(self.tokens.len())));
        }
        parts
    }

    /// The nominal type named by the type starting at `start`: references
    /// and pointers are looked through, generic arguments dropped.
    fn type_name(&self, start: usize, end: usize) -> Option<String> {
        let mut idx = start;
        let mut name = None;
        while idx < end {
            match self.kind(idx)? {
                TokenKind::Ampersand | TokenKind::AmpersandAmpersand | TokenKind::Star => {}
                TokenKind::Lifetime(_) => {}
                TokenKind::Identifier(word) if matches!(word.as_str(), "mut" | "const" | "dyn" | "impl") => {}
                TokenKind::Identifier(word) => {
                    name = Some(word.clone());
                    if !self.is(idx + 1, &TokenKind::ColonColon) {
                        break;
                    }
                    idx += 1;
                }
                TokenKind::ColonColon => {}
                _ => break,
            }
            idx += 1;
        }
        name
    }

    /// Names bound by the pattern in `start..end`.
    fn pattern_bindings(&self, start: usize, end: usize) -> Vec<String> {
        let mut names = Vec::new();
        for idx in start..end.min(self.tokens.len()) {
            let Some(word) = self.ident(idx) else {
                continue;
            };
            if matches!(word, "mut" | "ref" | "box") || (is_reserved(word) && word != "self") {
                continue;
            }
            if word.starts_with(|ch: char| ch.is_ascii_uppercase()) {
                continue;
            }
            let followed_by_path = matches!(
                self.kind(idx + 1),
                Some(TokenKind::ColonColon | TokenKind::LParen | TokenKind::LBrace | TokenKind::Colon | TokenKind::Bang)
            );
            let preceded_by_path = idx > start && self.is(idx - 1, &TokenKind::ColonColon);
            if followed_by_path || preceded_by_path {
                continue;
            }
            names.push(word.to_string());
        }
        names
    }

    fn parse_use_tree(&self, start: usize, end: usize, prefix: Vec<String>, out: &mut Vec<Import>) {
        let mut path = prefix;
        let mut idx = start;
        if self.is(idx, &TokenKind::ColonColon) {
            idx += 1;
        }
        while idx < end {
            match self.kind(idx) {
                Some(TokenKind::Identifier(segment)) => {
                    path.push(segment.clone());
                    idx += 1;
                    if self.is(idx, &TokenKind::ColonColon) {
                        idx += 1;
                        continue;
                    }
                    let alias = if self.ident(idx) == Some("as") {
                        self.kind(idx + 1).map(|kind| kind.text().into_owned())
                    } else {
                        None
                    };
                    out.push(Import {
                        path,
                        alias,
                        glob: false,
                    });
                    return;
                }
                Some(TokenKind::Star) => {
                    out.push(Import {
                        path,
                        alias: None,
                        glob: true,
                    });
                    return;
                }
                Some(TokenKind::LBrace) => {
                    let close = self.close_of(idx);
                    for (part_start, part_end) in self.split_top_level(idx + 1, close) {
                        self.parse_use_tree(part_start, part_end, path.clone(), out);
                    }
                    return;
                }
                _ => return,
            }
        }
    }

    /// Records `let` bindings and `for` loop variables with the block they
    /// are visible in.
    fn scan_locals(&mut self) {
        let tokens = self.tokens;
        let mut blocks: Vec<usize> = Vec::new();
        for (idx, token) in tokens.iter().enumerate() {
            let kind = &token.kind;
            if kind == &TokenKind::LBrace {
                blocks.push(idx);
                continue;
            }
            if kind == &TokenKind::RBrace {
                blocks.pop();
                continue;
            }
            if kind.is_ident("let") {
                let conditional = idx > 0
                    && (matches!(self.ident(idx - 1), Some("if" | "while"))
                        || self.is(idx - 1, &TokenKind::AmpersandAmpersand));
                self.scan_let(idx, blocks.last().copied(), conditional);
            } else if kind.is_ident("for") {
                self.scan_for(idx);
            }
        }
    }

    fn block_span(&self, open: Option<usize>) -> Span {
        match open {
            Some(open) => Span::new(
                self.tokens[open].span.start,
                self.end_offset_of(self.close_of(open)),
            ),
            None => Span::new(0, self.source_len),
        }
    }

    fn scan_let(&mut self, let_idx: usize, block: Option<usize>, conditional: bool) {
        let end = self.tokens.len();
        let stop = self
            .find_top_level(let_idx + 1, end, &[TokenKind::Colon, TokenKind::Eq, TokenKind::Semi])
            .unwrap_or(end);
        let names = self.pattern_bindings(let_idx + 1, stop);
        if names.is_empty() {
            return;
        }
        let mut ty = None;
        if self.is(stop, &TokenKind::Colon) {
            ty = self.type_name(stop + 1, end);
        }
        let eq = if self.is(stop, &TokenKind::Eq) {
            Some(stop)
        } else {
            self.find_top_level(stop, end, &[TokenKind::Eq, TokenKind::Semi])
                .filter(|&idx| self.is(idx, &TokenKind::Eq))
        };
        if ty.is_none() && names.len() == 1 {
            ty = eq.and_then(|eq| self.initializer_type(eq + 1));
        }

        let (scope, available_from) = if conditional {
            let Some(open) = self.find_top_level(let_idx + 1, end, &[TokenKind::LBrace]) else {
                return;
            };
            (self.block_span(Some(open)), self.tokens[open].span.end)
        } else {
            let scope = self.block_span(block);
            let available_from = self
                .find_top_level(let_idx + 1, end, &[TokenKind::Semi])
                .map(|semi| self.tokens[semi].span.end)
                .unwrap_or(scope.end);
            (scope, available_from)
        };
        for name in names {
            self.index.add_local(LocalDecl {
                name,
                ty: ty.clone(),
                scope,
                available_from,
            });
        }
    }

    /// Type of `Path { .. }`, `Path(..)` or `Path::ctor(..)` initializers.
    fn initializer_type(&self, start: usize) -> Option<String> {
        let mut segments = Vec::new();
        let mut idx = start;
        while let Some(word) = self.ident(idx) {
            segments.push(word);
            if !self.is(idx + 1, &TokenKind::ColonColon) {
                break;
            }
            idx += 2;
        }
        let last = *segments.last()?;
        let starts_upper = |word: &str| word.starts_with(|ch: char| ch.is_ascii_uppercase());
        match self.kind(idx + 1) {
            Some(TokenKind::LBrace) | Some(TokenKind::LParen) if starts_upper(last) => {
                Some(last.to_string())
            }
            Some(TokenKind::LParen) if segments.len() >= 2 => {
                let owner = segments[segments.len() - 2];
                starts_upper(owner).then(|| owner.to_string())
            }
            _ => None,
        }
    }

    fn scan_for(&mut self, for_idx: usize) {
        let end = self.tokens.len();
        let header_end = self
            .find_top_level(for_idx + 1, end, &[TokenKind::LBrace, TokenKind::Semi])
            .unwrap_or(end);
        let Some(in_idx) = (for_idx + 1..header_end).find(|&idx| self.ident(idx) == Some("in"))
        else {
            return;
        };
        let Some(open) = self.find_top_level(in_idx + 1, end, &[TokenKind::LBrace]) else {
            return;
        };
        let scope = self.block_span(Some(open));
        let available_from = self.tokens[open].span.end;
        for name in self.pattern_bindings(for_idx + 1, in_idx) {
            self.index.add_local(LocalDecl {
                name,
                ty: None,
                scope,
                available_from,
            });
        }
    }
}
