//! Symbol Graph: turns a parsed entry tree (and everything it `source`s) into
//! an arena of symbols, menu nodes, and choices addressed by stable integer
//! ids, rather than owning pointers between nodes — Kconfig dependency
//! expressions can and do form cycles.

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use crate::ast::*;
use crate::env::{expand_vars, Env};
use crate::lexer::Lexer;
use crate::parser;

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(SymbolId);
arena_id!(MenuNodeId);
arena_id!(ChoiceId);

/// A location in a declaration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: TypeKind,
    /// Menu nodes at which this symbol was declared, in declaration order.
    pub nodes: Vec<MenuNodeId>,
    /// OR of each declaration site's enclosing condition.
    pub direct_dep: Option<Expr>,
    pub defaults: Vec<DefaultAttr>,
    pub selects: Vec<SelectImplyAttr>,
    pub implies: Vec<SelectImplyAttr>,
    pub ranges: Vec<RangeAttr>,
    pub user_value: Option<Value>,
    pub computed_value: Option<Value>,
}

impl Symbol {
    fn new(name: String) -> Symbol {
        Symbol {
            name,
            kind: TypeKind::Unknown,
            nodes: Vec::new(),
            direct_dep: None,
            defaults: Vec::new(),
            selects: Vec::new(),
            implies: Vec::new(),
            ranges: Vec::new(),
            user_value: None,
            computed_value: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum MenuItem {
    Symbol(SymbolId),
    Choice(ChoiceId),
    Menu,
    Comment,
    Top,
}

#[derive(Debug, Clone)]
pub struct MenuNode {
    pub item: MenuItem,
    pub prompt: Option<(String, Option<Expr>)>,
    pub help: Option<String>,
    pub parent: Option<MenuNodeId>,
    pub first_child: Option<MenuNodeId>,
    pub next_sibling: Option<MenuNodeId>,
    pub is_menuconfig: bool,
    /// Conjunction of all enclosing `if`/menu conditions at this site.
    pub dep: Option<Expr>,
    /// `menu`'s own `visible if` clause; `None` for every other kind.
    pub visible_if: Option<Expr>,
    pub loc: Location,
}

#[derive(Debug, Clone)]
pub struct Choice {
    pub menu_node: MenuNodeId,
    pub kind: TypeKind,
    pub members: Vec<SymbolId>,
    pub defaults: Vec<DefaultAttr>,
    pub is_optional: bool,
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("{loc}: error: {message}")]
    ParsingFailed { loc: Location, message: String },
}

/// Strips a GCC-style `file:line: error: ` prefix from an underlying error
/// message before it's re-wrapped in a `GraphError`.
fn strip_gcc_prefix(message: &str) -> String {
    if let Some(rest) = message.find(": error: ").map(|idx| &message[idx + ": error: ".len()..]) {
        if message[..message.find(": error: ").unwrap()].contains(':') {
            return rest.to_string();
        }
    }
    message.to_string()
}

/// Resolves `source`/`osource` paths to text, abstracting over real
/// filesystem access so the parser can transparently read unsaved
/// in-editor buffers.
pub trait FileSource {
    fn read(&self, path: &str) -> std::io::Result<String>;
    fn is_dir(&self, path: &str) -> bool;
}

/// The simplest possible `FileSource`: reads straight from disk.
pub struct DiskSource;

impl FileSource for DiskSource {
    fn read(&self, path: &str) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn is_dir(&self, path: &str) -> bool {
        std::path::Path::new(path).is_dir()
    }
}

#[derive(Debug, Clone)]
pub struct Warning {
    /// `None` for a warning with no attributable file (routed to the
    /// command-line diagnostics bucket).
    pub file: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct SymbolGraph {
    pub symbols: Vec<Symbol>,
    pub symbol_index: IndexMap<String, SymbolId>,
    pub menu_nodes: Vec<MenuNode>,
    pub choices: Vec<Choice>,
    pub top: MenuNodeId,
    /// Ordered list of MENU-kind node ids, indexed by the stable-id scheme.
    pub menu_order: Vec<MenuNodeId>,
    /// Ordered list of choice ids, indexed by the stable-id scheme.
    pub choice_order: Vec<ChoiceId>,
    /// Ordered list of COMMENT-kind node ids, indexed by the stable-id scheme.
    pub comment_order: Vec<MenuNodeId>,
    pub mainmenu: Option<String>,
    pub warnings: Vec<Warning>,
}

impl SymbolGraph {
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.symbol_index.get(name).copied()
    }

    pub fn node(&self, id: MenuNodeId) -> &MenuNode {
        &self.menu_nodes[id.index()]
    }

    pub fn choice(&self, id: ChoiceId) -> &Choice {
        &self.choices[id.index()]
    }

    /// Children of `node`, in declaration order.
    pub fn children(&self, node: MenuNodeId) -> Vec<MenuNodeId> {
        let mut out = Vec::new();
        let mut cur = self.node(node).first_child;
        while let Some(id) = cur {
            out.push(id);
            cur = self.node(id).next_sibling;
        }
        out
    }
}

struct Builder<'a> {
    source: &'a dyn FileSource,
    env: &'a Env,
    symbols: Vec<Symbol>,
    symbol_index: IndexMap<String, SymbolId>,
    menu_nodes: Vec<MenuNode>,
    choices: Vec<Choice>,
    menu_order: Vec<MenuNodeId>,
    choice_order: Vec<ChoiceId>,
    comment_order: Vec<MenuNodeId>,
    mainmenu: Option<String>,
    warnings: Vec<Warning>,
}

impl<'a> Builder<'a> {
    fn get_or_create_symbol(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.symbol_index.get(name) {
            return id;
        }
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol::new(name.to_string()));
        self.symbol_index.insert(name.to_string(), id);
        id
    }

    fn push_node(&mut self, node: MenuNode) -> MenuNodeId {
        let id = MenuNodeId(self.menu_nodes.len() as u32);
        match &node.item {
            MenuItem::Menu => self.menu_order.push(id),
            MenuItem::Comment => self.comment_order.push(id),
            MenuItem::Choice(choice_id) => self.choice_order.push(*choice_id),
            _ => {}
        }
        self.menu_nodes.push(node);
        id
    }

    /// Link `child` as the last sibling of `parent`'s child list.
    fn link_child(&mut self, parent: MenuNodeId, child: MenuNodeId, last_sibling: &mut Option<MenuNodeId>) {
        self.menu_nodes[child.index()].parent = Some(parent);
        match last_sibling {
            Some(prev) => self.menu_nodes[prev.index()].next_sibling = Some(child),
            None => self.menu_nodes[parent.index()].first_child = Some(child),
        }
        *last_sibling = Some(child);
    }

    fn cond_of(stack: &[Expr]) -> Option<Expr> {
        stack
            .iter()
            .cloned()
            .reduce(|a, b| Expr::And(Box::new(a), Box::new(b)))
    }

    fn build_entries(
        &mut self,
        entries: &[Entry],
        file: &str,
        lines: &LineIndex,
        cond_stack: &mut Vec<Expr>,
        parent: MenuNodeId,
    ) -> Result<(), GraphError> {
        let mut last_sibling = self.menu_nodes[parent.index()].first_child;
        // Find the current tail so repeated calls (e.g. sourced files
        // appending into the same parent) keep appending, not overwriting.
        while let Some(next) = last_sibling.and_then(|id| self.menu_nodes[id.index()].next_sibling) {
            last_sibling = Some(next);
        }

        for entry in entries {
            match entry {
                Entry::Config(c) | Entry::MenuConfig(c) => {
                    let is_menuconfig = matches!(entry, Entry::MenuConfig(_));
                    let line = lines.line_col(c.span.start).0 + 1;
                    let sym_id = self.get_or_create_symbol(&c.name);
                    let node = self.build_config_node(
                        c,
                        sym_id,
                        is_menuconfig,
                        cond_stack,
                        Location {
                            file: file.to_string(),
                            line,
                        },
                    );
                    let node_dep = node.dep.clone();
                    let node_id = self.push_node(node);
                    self.symbols[sym_id.index()].nodes.push(node_id);
                    self.accumulate_direct_dep(sym_id, node_dep);
                    self.link_child(parent, node_id, &mut last_sibling);
                }
                Entry::Choice(ch) => {
                    let line = lines.line_col(ch.span.start).0 + 1;
                    let choice_node = self.build_choice(ch, cond_stack, file, lines, line)?;
                    self.link_child(parent, choice_node, &mut last_sibling);
                }
                Entry::Comment(c) => {
                    let line = lines.line_col(c.span.start).0 + 1;
                    let node = MenuNode {
                        item: MenuItem::Comment,
                        prompt: Some((c.prompt.clone(), Self::cond_of(cond_stack))),
                        help: None,
                        parent: None,
                        first_child: None,
                        next_sibling: None,
                        is_menuconfig: false,
                        dep: Self::cond_of(cond_stack),
                        visible_if: None,
                        loc: Location {
                            file: file.to_string(),
                            line,
                        },
                    };
                    let node_id = self.push_node(node);
                    self.link_child(parent, node_id, &mut last_sibling);
                }
                Entry::Menu(m) => {
                    let line = lines.line_col(m.span.start).0 + 1;
                    let mut depends = None;
                    let mut visible_if = None;
                    for attr in &m.attributes {
                        match attr {
                            Attribute::DependsOn(d) => {
                                depends = Some(match depends {
                                    Some(prev) => Expr::And(Box::new(prev), Box::new(d.expr.clone())),
                                    None => d.expr.clone(),
                                })
                            }
                            Attribute::VisibleIf(v) => visible_if = Some(v.expr.clone()),
                            _ => {}
                        }
                    }
                    let node = MenuNode {
                        item: MenuItem::Menu,
                        prompt: Some((m.prompt.clone(), None)),
                        help: None,
                        parent: None,
                        first_child: None,
                        next_sibling: None,
                        is_menuconfig: true,
                        dep: Self::cond_of(cond_stack),
                        visible_if,
                        loc: Location {
                            file: file.to_string(),
                            line,
                        },
                    };
                    let node_id = self.push_node(node);
                    self.link_child(parent, node_id, &mut last_sibling);

                    if let Some(d) = depends {
                        cond_stack.push(d);
                    }
                    self.build_entries(&m.entries, file, lines, cond_stack, node_id)?;
                    if depends.is_some() {
                        cond_stack.pop();
                    }
                }
                Entry::If(i) => {
                    cond_stack.push(i.condition.clone());
                    self.build_entries(&i.entries, file, lines, cond_stack, parent)?;
                    cond_stack.pop();
                }
                Entry::Source(s) => {
                    self.build_source(s, cond_stack, parent, &mut last_sibling)?;
                }
                Entry::MainMenu(m) => {
                    self.mainmenu = Some(m.prompt.clone());
                }
            }
        }
        Ok(())
    }

    fn build_config_node(
        &mut self,
        c: &ConfigEntry,
        sym_id: SymbolId,
        is_menuconfig: bool,
        cond_stack: &[Expr],
        loc: Location,
    ) -> MenuNode {
        let mut prompt = None;
        let mut help = None;
        for attr in &c.attributes {
            match attr {
                Attribute::Type(t) => {
                    self.symbols[sym_id.index()].kind = t.kind;
                    if let Some(p) = &t.prompt {
                        prompt = Some((p.text.clone(), p.condition.clone()));
                    }
                }
                Attribute::Prompt(p) => prompt = Some((p.text.clone(), p.condition.clone())),
                Attribute::Default(d) => self.symbols[sym_id.index()].defaults.push(d.clone()),
                Attribute::DefType(d) => {
                    self.symbols[sym_id.index()].kind = d.kind;
                    self.symbols[sym_id.index()].defaults.push(DefaultAttr {
                        value: d.value.clone(),
                        condition: d.condition.clone(),
                        span: d.span,
                    });
                }
                Attribute::DependsOn(_) => {}
                Attribute::Select(s) => self.symbols[sym_id.index()].selects.push(s.clone()),
                Attribute::Imply(s) => self.symbols[sym_id.index()].implies.push(s.clone()),
                Attribute::VisibleIf(_) => {}
                Attribute::Range(r) => self.symbols[sym_id.index()].ranges.push(r.clone()),
                Attribute::Help(h) => help = Some(h.text.clone()),
                Attribute::Modules(_) | Attribute::Transitional(_) | Attribute::Optional(_) => {}
            }
        }
        let own_depends = c.attributes.iter().find_map(|a| match a {
            Attribute::DependsOn(d) => Some(d.expr.clone()),
            _ => None,
        });
        let mut dep_parts: Vec<Expr> = cond_stack.to_vec();
        if let Some(d) = own_depends {
            dep_parts.push(d);
        }
        MenuNode {
            item: MenuItem::Symbol(sym_id),
            prompt,
            help,
            parent: None,
            first_child: None,
            next_sibling: None,
            is_menuconfig,
            dep: Self::cond_of(&dep_parts),
            visible_if: None,
            loc,
        }
    }

    fn accumulate_direct_dep(&mut self, sym_id: SymbolId, this_dep: Option<Expr>) {
        let sym = &mut self.symbols[sym_id.index()];
        sym.direct_dep = match (sym.direct_dep.take(), this_dep) {
            (None, d) => d,
            (Some(prev), None) => Some(prev),
            (Some(prev), Some(d)) => Some(Expr::Or(Box::new(prev), Box::new(d))),
        };
    }

    fn build_choice(
        &mut self,
        ch: &ChoiceEntry,
        cond_stack: &mut Vec<Expr>,
        file: &str,
        lines: &LineIndex,
        line: u32,
    ) -> Result<MenuNodeId, GraphError> {
        let mut prompt = None;
        let mut kind = TypeKind::Bool;
        let mut defaults = Vec::new();
        let mut is_optional = false;
        let mut help = None;
        let mut depends = None;
        for attr in &ch.attributes {
            match attr {
                Attribute::Prompt(p) => prompt = Some((p.text.clone(), p.condition.clone())),
                Attribute::Type(t) => {
                    kind = t.kind;
                    if let Some(p) = &t.prompt {
                        prompt = Some((p.text.clone(), p.condition.clone()));
                    }
                }
                Attribute::Default(d) => defaults.push(d.clone()),
                Attribute::Optional(_) => is_optional = true,
                Attribute::Help(h) => help = Some(h.text.clone()),
                Attribute::DependsOn(d) => {
                    depends = Some(match depends {
                        Some(prev) => Expr::And(Box::new(prev), Box::new(d.expr.clone())),
                        None => d.expr.clone(),
                    })
                }
                _ => {}
            }
        }

        let choice_id = ChoiceId(self.choices.len() as u32);
        // Placeholder; menu_node id is filled in once the node is pushed.
        self.choices.push(Choice {
            menu_node: MenuNodeId(0),
            kind,
            members: Vec::new(),
            defaults: defaults.clone(),
            is_optional,
        });

        let node = MenuNode {
            item: MenuItem::Choice(choice_id),
            prompt,
            help,
            parent: None,
            first_child: None,
            next_sibling: None,
            is_menuconfig: true,
            dep: Self::cond_of(cond_stack),
            visible_if: None,
            loc: Location {
                file: file.to_string(),
                line,
            },
        };
        let node_id = self.push_node(node);
        self.choices[choice_id.0 as usize].menu_node = node_id;

        if let Some(d) = depends.clone() {
            cond_stack.push(d);
        }
        self.build_entries(&ch.entries, file, lines, cond_stack, node_id)?;
        if depends.is_some() {
            cond_stack.pop();
        }

        for child in self.children_of(node_id) {
            if let MenuItem::Symbol(sid) = &self.menu_nodes[child.index()].item {
                let sid = *sid;
                if matches!(self.symbols[sid.index()].kind, TypeKind::Bool | TypeKind::Tristate) {
                    self.choices[choice_id.0 as usize].members.push(sid);
                }
            }
        }

        Ok(node_id)
    }

    fn children_of(&self, node: MenuNodeId) -> Vec<MenuNodeId> {
        let mut out = Vec::new();
        let mut cur = self.menu_nodes[node.index()].first_child;
        while let Some(id) = cur {
            out.push(id);
            cur = self.menu_nodes[id.index()].next_sibling;
        }
        out
    }

    fn build_source(
        &mut self,
        s: &SourceEntry,
        cond_stack: &mut Vec<Expr>,
        parent: MenuNodeId,
        last_sibling: &mut Option<MenuNodeId>,
    ) -> Result<(), GraphError> {
        let mut expand_warnings = Vec::new();
        let path = expand_vars(&s.path, self.env, &mut expand_warnings);
        for w in expand_warnings {
            self.warnings.push(Warning {
                file: None,
                message: format!("undefined environment variable: {}", w.name),
            });
        }

        if self.source.is_dir(&path) {
            return Err(GraphError::ParsingFailed {
                loc: Location {
                    file: path.clone(),
                    line: 0,
                },
                message: format!("{} is a directory", path),
            });
        }

        let text = match self.source.read(&path) {
            Ok(t) => t,
            Err(e) => {
                if s.optional {
                    return Ok(());
                }
                return Err(GraphError::ParsingFailed {
                    loc: Location {
                        file: path.clone(),
                        line: 0,
                    },
                    message: strip_gcc_prefix(&e.to_string()),
                });
            }
        };

        let tokens = Lexer::new(&text).tokenize();
        let result = parser::parse(&text, tokens);
        let sourced_lines = LineIndex::new(&text);
        for d in &result.diagnostics {
            if d.severity == DiagSeverity::Warning {
                self.warnings.push(Warning {
                    file: Some(path.clone()),
                    message: d.message.clone(),
                });
            }
        }
        self.build_entries(&result.file.entries, &path, &sourced_lines, cond_stack, parent)?;
        // re-link the caller's tail after appending the sourced entries
        let mut cur = *last_sibling;
        if cur.is_none() {
            cur = self.menu_nodes[parent.index()].first_child;
        }
        while let Some(next) = cur.and_then(|id| self.menu_nodes[id.index()].next_sibling) {
            cur = Some(next);
        }
        *last_sibling = cur;
        Ok(())
    }
}

/// Build a symbol graph from `root_path`, following every `source`/`osource`
/// directive it reaches.
pub fn build_graph(root_path: &str, env: &Env, source: &dyn FileSource) -> Result<SymbolGraph, GraphError> {
    if source.is_dir(root_path) {
        return Err(GraphError::ParsingFailed {
            loc: Location {
                file: root_path.to_string(),
                line: 0,
            },
            message: format!("{} is a directory", root_path),
        });
    }
    let text = source.read(root_path).map_err(|e| GraphError::ParsingFailed {
        loc: Location {
            file: root_path.to_string(),
            line: 0,
        },
        message: strip_gcc_prefix(&e.to_string()),
    })?;

    let tokens = Lexer::new(&text).tokenize();
    let result = parser::parse(&text, tokens);
    let lines = LineIndex::new(&text);

    let mut builder = Builder {
        source,
        env,
        symbols: Vec::new(),
        symbol_index: IndexMap::new(),
        menu_nodes: Vec::new(),
        choices: Vec::new(),
        menu_order: Vec::new(),
        choice_order: Vec::new(),
        comment_order: Vec::new(),
        mainmenu: None,
        warnings: Vec::new(),
    };

    let top = MenuNodeId(0);
    builder.menu_nodes.push(MenuNode {
        item: MenuItem::Top,
        prompt: None,
        help: None,
        parent: None,
        first_child: None,
        next_sibling: None,
        is_menuconfig: true,
        dep: None,
        visible_if: None,
        loc: Location {
            file: root_path.to_string(),
            line: 0,
        },
    });

    for d in &result.diagnostics {
        if d.severity == DiagSeverity::Warning {
            builder.warnings.push(Warning {
                file: Some(root_path.to_string()),
                message: d.message.clone(),
            });
        } else {
            let (line, _) = lines.line_col(d.span.start);
            return Err(GraphError::ParsingFailed {
                loc: Location {
                    file: root_path.to_string(),
                    line,
                },
                message: d.message.clone(),
            });
        }
    }

    let mut cond_stack = Vec::new();
    builder.build_entries(&result.file.entries, root_path, &lines, &mut cond_stack, top)?;

    Ok(SymbolGraph {
        symbols: builder.symbols,
        symbol_index: builder.symbol_index,
        menu_nodes: builder.menu_nodes,
        choices: builder.choices,
        top,
        menu_order: builder.menu_order,
        choice_order: builder.choice_order,
        comment_order: builder.comment_order,
        mainmenu: builder.mainmenu,
        warnings: builder.warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MemSource(Mutex<HashMap<String, String>>);

    impl FileSource for MemSource {
        fn read(&self, path: &str) -> std::io::Result<String> {
            self.0
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string()))
        }

        fn is_dir(&self, path: &str) -> bool {
            path.ends_with('/')
        }
    }

    fn mem(files: &[(&str, &str)]) -> MemSource {
        MemSource(Mutex::new(
            files.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        ))
    }

    #[test]
    fn builds_simple_symbol() {
        let src = mem(&[(
            "Kconfig",
            "config FOO\n\tbool \"Enable foo\"\n\thelp\n\t  Turns on foo\n",
        )]);
        let env = Env::new();
        let graph = build_graph("Kconfig", &env, &src).unwrap();
        let id = graph.lookup("FOO").unwrap();
        let sym = graph.symbol(id);
        assert_eq!(sym.kind, TypeKind::Bool);
        assert_eq!(sym.nodes.len(), 1);
        let node = graph.node(sym.nodes[0]);
        assert_eq!(node.prompt.as_ref().unwrap().0, "Enable foo");
        assert_eq!(node.help.as_deref(), Some("Turns on foo\n"));
    }

    #[test]
    fn missing_mandatory_source_is_fatal() {
        let src = mem(&[("Kconfig", "source \"missing\"\n")]);
        let env = Env::new();
        let err = build_graph("Kconfig", &env, &src).unwrap_err();
        assert!(matches!(err, GraphError::ParsingFailed { .. }));
    }

    #[test]
    fn missing_optional_source_is_silent() {
        let src = mem(&[("Kconfig", "osource \"missing\"\nconfig BAR\n\tbool\n")]);
        let env = Env::new();
        let graph = build_graph("Kconfig", &env, &src).unwrap();
        assert!(graph.lookup("BAR").is_some());
    }

    #[test]
    fn choice_collects_bool_members() {
        let src = mem(&[(
            "Kconfig",
            "choice\n\tprompt \"pick one\"\n\tbool\nconfig A\n\tbool \"a\"\nconfig B\n\tbool \"b\"\nendchoice\n",
        )]);
        let env = Env::new();
        let graph = build_graph("Kconfig", &env, &src).unwrap();
        assert_eq!(graph.choices.len(), 1);
        assert_eq!(graph.choices[0].members.len(), 2);
    }
}
