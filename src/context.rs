//! Context Manager: owns every build's [`Context`] (one parsed symbol graph
//! plus its ordered `.conf` stack), routes document URIs to an owning
//! context, and is the seam the LSP adapter calls through for every
//! `kconfig/*` operation.

use std::collections::HashMap;

use indexmap::IndexMap;
use thiserror::Error;
use tower_lsp::lsp_types as lsp;

use crate::ast::{TypeKind, Value};
use crate::conf::{self, ConfEntry};
use crate::definition;
use crate::diagnostics::{self, COMMAND_LINE_URI};
use crate::env::{Env, EnvGuard};
use crate::graph::{self, FileSource, GraphError, MenuItem, MenuNodeId, SymbolGraph, Warning};
use crate::menu;
use crate::resolve;

/// The three core-specific RPC error conditions, modeled
/// independently of `tower_lsp`'s error type — `server.rs` is the only
/// place these get translated to a JSON-RPC error object.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown node: {0}")]
    UnknownNode(String),
    #[error("menu id is from a stale parse version")]
    Desync,
    #[error("{file}:{line}: error: {message}")]
    ParsingFailed { file: String, line: u32, message: String },
}

impl From<GraphError> for CoreError {
    fn from(e: GraphError) -> CoreError {
        match e {
            GraphError::ParsingFailed { loc, message } => CoreError::ParsingFailed {
                file: loc.file,
                line: loc.line,
                message,
            },
        }
    }
}

/// One `.conf` file in a context's ordered stack.
#[derive(Debug, Clone)]
pub struct ConfFileState {
    pub path: String,
    pub uri: lsp::Url,
    pub entries: Vec<ConfEntry>,
    pub text: String,
}

/// A single build instance: a parsed symbol graph, its layered `.conf`
/// stack, and the bookkeeping the manager needs to invalidate stale menu
/// ids and route diagnostics.
#[derive(Debug)]
pub struct Context {
    pub id: u32,
    pub root: String,
    pub env: Env,
    pub conf_files: Vec<ConfFileState>,
    pub graph: SymbolGraph,
    pub parse_version: u64,
    pub focused_menu: MenuNodeId,
    /// Warnings produced while applying the `.conf` stack (undefined
    /// assignment, override, redundant) — reset on every `loadConfig`,
    /// distinct from `graph.warnings` which only change on reparse.
    pub conf_warnings: Vec<Warning>,
}

impl Context {
    fn recompute(&mut self) {
        let mut warnings = Vec::new();
        for (i, cf) in self.conf_files.iter().enumerate() {
            conf::apply_entries(&mut self.graph, &cf.entries, Some(&cf.path), i == 0, &mut warnings);
        }
        self.conf_warnings = warnings;
        resolve::resolve_all(&mut self.graph);
        resolve::resolve_choices(&mut self.graph);
    }

    /// All warnings (parser/evaluator) attributable to files, bucketed
    /// together with live diagnostics per `.conf` file, plus the synthetic
    /// command-line bucket.
    pub fn all_diagnostics(&self) -> HashMap<lsp::Url, Vec<lsp::Diagnostic>> {
        let mut out: HashMap<lsp::Url, Vec<lsp::Diagnostic>> = HashMap::new();

        for cf in &self.conf_files {
            let lines = crate::ast::LineIndex::new(&cf.text);
            let findings = diagnostics::check_entries(&self.graph, &cf.entries, &cf.uri, &lines);
            out.entry(cf.uri.clone())
                .or_default()
                .extend(findings.into_iter().map(|f| f.diagnostic));
        }

        let mut all_warnings = self.graph.warnings.clone();
        all_warnings.extend(self.conf_warnings.clone());
        for (uri_str, diags) in diagnostics::bucket_warnings(&all_warnings) {
            let uri = path_to_uri(&uri_str);
            out.entry(uri).or_default().extend(diags);
        }

        // Every conf file publishes at least an empty list, clearing stale
        // diagnostics on the client when a problem is fixed.
        for cf in &self.conf_files {
            out.entry(cf.uri.clone()).or_default();
        }
        out.entry(path_to_uri(COMMAND_LINE_URI)).or_default();
        out
    }
}

/// Turn a plain path or the synthetic command-line bucket name into a URI,
/// falling back to a `file://` literal when `Url::from_file_path` can't
/// make sense of a relative or synthetic path (e.g. in-memory test fixtures).
pub fn path_to_uri(path: &str) -> lsp::Url {
    if let Ok(uri) = lsp::Url::parse(path) {
        return uri;
    }
    lsp::Url::from_file_path(path)
        .unwrap_or_else(|_| lsp::Url::parse(&format!("file:///{}", path.trim_start_matches('/'))).unwrap())
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolItem {
    pub name: String,
    pub visible: bool,
    pub kind: TypeKind,
    pub help: Option<String>,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum MenuEntryKind {
    Symbol { name: String, type_kind: TypeKind, value: String },
    Choice,
    Menu,
    Comment,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuEntryDescriptor {
    pub id: String,
    pub depth: u32,
    pub prompt: Option<String>,
    pub is_menuconfig: bool,
    #[serde(flatten)]
    pub kind: MenuEntryKind,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuDescriptor {
    pub id: String,
    pub name: Option<String>,
    pub items: Vec<MenuEntryDescriptor>,
}

/// Owns every build, routes document URIs to the context that owns them,
/// and exposes the context operation set.
#[derive(Debug, Default)]
pub struct ContextManager {
    contexts: IndexMap<u32, Context>,
    next_id: u32,
    mru: Option<u32>,
}

impl ContextManager {
    pub fn new() -> ContextManager {
        ContextManager {
            contexts: IndexMap::new(),
            next_id: 0,
            mru: None,
        }
    }

    pub fn get(&self, id: u32) -> Option<&Context> {
        self.contexts.get(&id)
    }

    /// The context that owns `uri`: the MRU context if it has a `.conf`
    /// file at that URI, else the first (iteration-order stable) context
    /// whose `.conf` list contains it.
    pub fn owning_context(&self, uri: &lsp::Url) -> Option<u32> {
        if let Some(mru) = self.mru {
            if let Some(ctx) = self.contexts.get(&mru) {
                if ctx.conf_files.iter().any(|cf| &cf.uri == uri) {
                    return Some(mru);
                }
            }
        }
        self.contexts
            .iter()
            .find(|(_, ctx)| ctx.conf_files.iter().any(|cf| &cf.uri == uri))
            .map(|(&id, _)| id)
    }

    /// `addBuild`: parse the Kconfig tree, prepend the board defconfig (if
    /// the environment names one), and layer every `.conf` file in order.
    pub fn add_build(
        &mut self,
        root: String,
        conf_paths: Vec<String>,
        env: Env,
        source: &dyn FileSource,
    ) -> Result<u32, CoreError> {
        let _guard = EnvGuard::apply(&env);
        let graph = graph::build_graph(&root, &env, source)?;

        let mut all_paths = Vec::new();
        if let Some(board) = conf::board_defconfig_path(&env) {
            all_paths.push(board);
        }
        all_paths.extend(conf_paths);

        let mut conf_files = Vec::new();
        for path in all_paths {
            let text = source.read(&path).unwrap_or_default();
            let entries = conf::parse_conf(&text);
            conf_files.push(ConfFileState {
                uri: path_to_uri(&path),
                path,
                entries,
                text,
            });
        }

        let id = self.next_id;
        self.next_id += 1;
        let top = graph.top;
        let mut ctx = Context {
            id,
            root,
            env,
            conf_files,
            graph,
            parse_version: 1,
            focused_menu: top,
            conf_warnings: Vec::new(),
        };
        ctx.recompute();
        self.contexts.insert(id, ctx);
        self.mru = Some(id);
        Ok(id)
    }

    /// A Kconfig-tree change: discard and rebuild the
    /// symbol graph, bump the parse version (invalidating every previously
    /// issued node id), then re-layer the unchanged `.conf` stack.
    pub fn reparse(&mut self, id: u32, source: &dyn FileSource) -> Result<(), CoreError> {
        let ctx = self.contexts.get_mut(&id).ok_or_else(|| CoreError::UnknownNode(id.to_string()))?;
        let _guard = EnvGuard::apply(&ctx.env);
        let graph = graph::build_graph(&ctx.root, &ctx.env, source)?;
        ctx.graph = graph;
        ctx.parse_version += 1;
        ctx.focused_menu = ctx.graph.top;
        ctx.recompute();
        Ok(())
    }

    /// `loadConfig`: re-read every `.conf` file's text, reset every
    /// symbol's user value, and re-layer from scratch. Idempotent per
    /// Idempotent: running it twice with unchanged files on disk produces
    /// identical diagnostics.
    pub fn load_config(&mut self, id: u32, source: &dyn FileSource) -> Result<(), CoreError> {
        let ctx = self.contexts.get_mut(&id).ok_or_else(|| CoreError::UnknownNode(id.to_string()))?;
        for cf in ctx.conf_files.iter_mut() {
            cf.text = source.read(&cf.path).unwrap_or_default();
            cf.entries = conf::parse_conf(&cf.text);
        }
        for sym in ctx.graph.symbols.iter_mut() {
            sym.user_value = None;
        }
        ctx.recompute();
        Ok(())
    }

    /// `setVal`: set or unset a single symbol's user value in memory. Does
    /// not touch disk and does not bump the parse version — menu ids stay
    /// valid across this operation.
    pub fn set_val(&mut self, id: u32, name: &str, value: Option<String>) -> Result<(), CoreError> {
        let ctx = self.contexts.get_mut(&id).ok_or_else(|| CoreError::UnknownNode(id.to_string()))?;
        let Some(sym_id) = ctx.graph.lookup(name) else {
            return Ok(());
        };
        match value {
            Some(raw) => {
                let kind = conf::infer_literal_kind(&raw);
                ctx.graph.symbol_mut(sym_id).user_value = Some(conf::parse_literal(&raw, kind));
            }
            None => ctx.graph.symbol_mut(sym_id).user_value = None,
        }
        resolve::resolve_all(&mut ctx.graph);
        resolve::resolve_choices(&mut ctx.graph);
        Ok(())
    }

    pub fn symbol_search(&self, id: u32, prefix: &str) -> Vec<SymbolItem> {
        let Some(ctx) = self.contexts.get(&id) else {
            return Vec::new();
        };
        let needle = prefix.to_ascii_uppercase();
        ctx.graph
            .symbols
            .iter()
            .filter(|s| needle.is_empty() || s.name.to_ascii_uppercase().starts_with(&needle))
            .map(|s| {
                let sym_id = ctx.graph.lookup(&s.name).expect("symbol indexed by its own name");
                let first_node = s.nodes.first().map(|&n| ctx.graph.node(n));
                SymbolItem {
                    name: s.name.clone(),
                    visible: resolve::visibility(&ctx.graph, sym_id) != crate::ast::Tri::No,
                    kind: s.kind,
                    help: first_node.and_then(|n| n.help.clone()),
                    prompt: first_node.and_then(|n| n.prompt.as_ref().map(|(t, _)| t.clone())),
                }
            })
            .collect()
    }

    /// `setMenu`: resolve a stable node id (or the empty string, meaning
    /// "top") and describe what an interactive front end would show there.
    pub fn set_menu(&mut self, id: u32, node_id: &str) -> Result<MenuDescriptor, CoreError> {
        let ctx = self.contexts.get_mut(&id).ok_or_else(|| CoreError::UnknownNode(node_id.to_string()))?;
        let resolved = if node_id.is_empty() {
            ctx.graph.top
        } else {
            menu::resolve(&ctx.graph, ctx.parse_version, node_id)?
        };
        ctx.focused_menu = resolved;
        Ok(describe_menu(ctx, resolved))
    }

    pub fn locations_of(&self, id: u32, name: &str) -> Vec<lsp::Location> {
        match self.contexts.get(&id) {
            Some(ctx) => definition::locations_for_symbol(ctx, name),
            None => Vec::new(),
        }
    }

    /// Quick fixes offered over `range` in the `.conf` file at `uri`, for
    /// `textDocument/codeAction`.
    pub fn code_actions(&self, id: u32, uri: &lsp::Url, range: lsp::Range) -> Vec<lsp::CodeAction> {
        let Some(ctx) = self.contexts.get(&id) else {
            return Vec::new();
        };
        let Some(cf) = ctx.conf_files.iter().find(|cf| &cf.uri == uri) else {
            return Vec::new();
        };
        let lines = crate::ast::LineIndex::new(&cf.text);
        diagnostics::check_entries(&ctx.graph, &cf.entries, uri, &lines)
            .into_iter()
            .filter(|f| ranges_intersect(f.diagnostic.range, range))
            .flat_map(|f| f.actions)
            .collect()
    }

    pub fn all_diagnostics(&self, id: u32) -> HashMap<lsp::Url, Vec<lsp::Diagnostic>> {
        match self.contexts.get(&id) {
            Some(ctx) => ctx.all_diagnostics(),
            None => HashMap::new(),
        }
    }

    /// The context that owns `uri`, whether it's one of the `.conf` stack
    /// files or the context's Kconfig root itself.
    pub fn context_for_document(&self, uri: &lsp::Url) -> Option<u32> {
        if let Some(id) = self.owning_context(uri) {
            return Some(id);
        }
        self.contexts
            .iter()
            .find(|(_, ctx)| &path_to_uri(&ctx.root) == uri)
            .map(|(&id, _)| id)
    }

    pub fn touch_mru(&mut self, id: u32) {
        if self.contexts.contains_key(&id) {
            self.mru = Some(id);
        }
    }

    pub fn ids(&self) -> Vec<u32> {
        self.contexts.keys().copied().collect()
    }
}

fn pos_le(a: lsp::Position, b: lsp::Position) -> bool {
    (a.line, a.character) <= (b.line, b.character)
}

fn ranges_intersect(a: lsp::Range, b: lsp::Range) -> bool {
    pos_le(a.start, b.end) && pos_le(b.start, a.end)
}

fn describe_menu(ctx: &Context, node: MenuNodeId) -> MenuDescriptor {
    let own_id = menu::node_id(&ctx.graph, ctx.parse_version, node);
    let name = ctx
        .graph
        .node(node)
        .prompt
        .as_ref()
        .map(|(t, _)| t.clone())
        .or_else(|| ctx.graph.mainmenu.clone());

    let items = menu::list_items(&ctx.graph, node)
        .into_iter()
        .filter(|item| menu::is_visible(&ctx.graph, item.node))
        .map(|item| {
            let n = ctx.graph.node(item.node);
            let kind = match &n.item {
                MenuItem::Symbol(sid) => {
                    let sym = ctx.graph.symbol(*sid);
                    let value = sym
                        .computed_value
                        .clone()
                        .unwrap_or_else(|| Value::zero_for(sym.kind));
                    MenuEntryKind::Symbol {
                        name: sym.name.clone(),
                        type_kind: sym.kind,
                        value: value.display_str(),
                    }
                }
                MenuItem::Choice(_) => MenuEntryKind::Choice,
                MenuItem::Menu => MenuEntryKind::Menu,
                MenuItem::Comment => MenuEntryKind::Comment,
                MenuItem::Top => MenuEntryKind::Menu,
            };
            MenuEntryDescriptor {
                id: menu::node_id(&ctx.graph, ctx.parse_version, item.node),
                depth: item.depth,
                prompt: n.prompt.as_ref().map(|(t, _)| t.clone()),
                is_menuconfig: n.is_menuconfig,
                kind,
            }
        })
        .collect();

    MenuDescriptor { id: own_id, name, items }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;

    struct MemSource(Mutex<StdHashMap<String, String>>);
    impl FileSource for MemSource {
        fn read(&self, path: &str) -> std::io::Result<String> {
            self.0
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string()))
        }
        fn is_dir(&self, _path: &str) -> bool {
            false
        }
    }

    fn mem(files: &[(&str, &str)]) -> MemSource {
        MemSource(Mutex::new(
            files.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        ))
    }

    #[test]
    fn add_build_resolves_user_value() {
        let src = mem(&[
            ("/proj/Kconfig", "config FOO\n\tbool \"Enable foo\"\n"),
            ("/proj/prj.conf", "CONFIG_FOO=y\n"),
        ]);
        let mut mgr = ContextManager::new();
        let id = mgr
            .add_build("/proj/Kconfig".into(), vec!["/proj/prj.conf".into()], Env::new(), &src)
            .unwrap();
        let ctx = mgr.get(id).unwrap();
        let sym = ctx.graph.lookup("FOO").unwrap();
        assert_eq!(ctx.graph.symbol(sym).computed_value, Some(Value::Tri(crate::ast::Tri::Yes)));
    }

    #[test]
    fn set_menu_then_reparse_desyncs_old_id() {
        let src = mem(&[("/proj/Kconfig", "config FOO\n\tbool \"f\"\n")]);
        let mut mgr = ContextManager::new();
        let id = mgr.add_build("/proj/Kconfig".into(), vec![], Env::new(), &src).unwrap();
        let top = mgr.set_menu(id, "").unwrap();
        let item_id = top.items[0].id.clone();

        mgr.reparse(id, &src).unwrap();
        assert!(matches!(mgr.set_menu(id, &item_id), Err(CoreError::Desync)));
    }

    #[test]
    fn set_val_does_not_bump_parse_version() {
        let src = mem(&[("/proj/Kconfig", "config FOO\n\tbool \"f\"\n")]);
        let mut mgr = ContextManager::new();
        let id = mgr.add_build("/proj/Kconfig".into(), vec![], Env::new(), &src).unwrap();
        let version_before = mgr.get(id).unwrap().parse_version;
        mgr.set_val(id, "FOO", Some("y".into())).unwrap();
        assert_eq!(mgr.get(id).unwrap().parse_version, version_before);
        let ctx = mgr.get(id).unwrap();
        let sym = ctx.graph.lookup("FOO").unwrap();
        assert_eq!(ctx.graph.symbol(sym).computed_value, Some(Value::Tri(crate::ast::Tri::Yes)));
    }

    #[test]
    fn owning_context_prefers_mru() {
        let src = mem(&[
            ("/a/Kconfig", "config A\n\tbool \"a\"\n"),
            ("/a/a.conf", ""),
            ("/b/Kconfig", "config B\n\tbool \"b\"\n"),
            ("/b/b.conf", ""),
        ]);
        let mut mgr = ContextManager::new();
        let a = mgr.add_build("/a/Kconfig".into(), vec!["/a/a.conf".into()], Env::new(), &src).unwrap();
        let _b = mgr.add_build("/b/Kconfig".into(), vec!["/b/b.conf".into()], Env::new(), &src).unwrap();
        mgr.touch_mru(a);
        let uri = path_to_uri("/a/a.conf");
        assert_eq!(mgr.owning_context(&uri), Some(a));
    }
}
