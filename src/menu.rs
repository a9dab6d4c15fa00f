//! Menu Navigator: exposes the symbol graph as the hierarchical menu an
//! interactive `menuconfig` would show, and the stable node-id scheme used
//! to address it across requests.

use crate::ast::Tri;
use crate::context::CoreError;
use crate::eval::eval_tri;
use crate::graph::{MenuItem, MenuNodeId, SymbolGraph};

/// One entry in a flattened menu listing, with its indentation depth.
#[derive(Debug, Clone, Copy)]
pub struct MenuItemView {
    pub node: MenuNodeId,
    pub depth: u32,
}

/// The items shown when `node` (a menuconfig or the top node) is opened:
/// its direct children, with every run of non-menuconfig descendants
/// inlined into the same listing at increasing indentation, stopping at
/// the next menuconfig boundary.
pub fn list_items(graph: &SymbolGraph, node: MenuNodeId) -> Vec<MenuItemView> {
    let mut out = Vec::new();
    collect(graph, node, 0, &mut out);
    out
}

fn collect(graph: &SymbolGraph, node: MenuNodeId, depth: u32, out: &mut Vec<MenuItemView>) {
    for child in graph.children(node) {
        out.push(MenuItemView { node: child, depth });
        if !graph.node(child).is_menuconfig {
            collect(graph, child, depth + 1, out);
        }
    }
}

/// A node is visible iff it has a prompt whose condition (AND'd with the
/// node's own enclosing dependency) evaluates non-zero, and — for MENU
/// markers only — its `visible if` clause also evaluates non-zero.
pub fn is_visible(graph: &SymbolGraph, node: MenuNodeId) -> bool {
    let n = graph.node(node);
    let prompt_tri = match &n.prompt {
        Some((_, cond)) => {
            let dep = n.dep.as_ref().map(|d| eval_tri(graph, d)).unwrap_or(Tri::Yes);
            let c = cond.as_ref().map(|c| eval_tri(graph, c)).unwrap_or(Tri::Yes);
            dep.and(c)
        }
        None => return false,
    };
    if prompt_tri == Tri::No {
        return false;
    }
    if matches!(n.item, MenuItem::Menu) {
        if let Some(vis) = &n.visible_if {
            if eval_tri(graph, vis) == Tri::No {
                return false;
            }
        }
    }
    true
}

/// A parsed `<version>@<kind>@<payload>` stable node identifier, before it's
/// been checked against the context's current parse version.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ParsedKind {
    MainMenu,
    Menu(usize),
    Choice(usize),
    Comment(usize),
    Symbol(String, usize),
}

/// Build the stable identifier for `node` under parse `version`.
pub fn node_id(graph: &SymbolGraph, version: u64, node: MenuNodeId) -> String {
    match &graph.node(node).item {
        MenuItem::Top => format!("{}@MAINMENU@", version),
        MenuItem::Menu => {
            let idx = graph.menu_order.iter().position(|&m| m == node).unwrap_or(0);
            format!("{}@MENU@{}", version, idx)
        }
        MenuItem::Comment => {
            let idx = graph.comment_order.iter().position(|&m| m == node).unwrap_or(0);
            format!("{}@COMMENT@{}", version, idx)
        }
        MenuItem::Choice(cid) => {
            let idx = graph.choice_order.iter().position(|&c| c == *cid).unwrap_or(0);
            format!("{}@CHOICE@{}", version, idx)
        }
        MenuItem::Symbol(sid) => {
            let sym = graph.symbol(*sid);
            let node_idx = sym.nodes.iter().position(|&nid| nid == node).unwrap_or(0);
            format!("{}@SYM@{}@{}", version, sym.name, node_idx)
        }
    }
}

fn parse_id(id: &str) -> Option<(u64, ParsedKind)> {
    let mut parts = id.splitn(3, '@');
    let version: u64 = parts.next()?.parse().ok()?;
    let kind = parts.next()?;
    let payload = parts.next().unwrap_or("");
    let parsed = match kind {
        "MAINMENU" => ParsedKind::MainMenu,
        "MENU" => ParsedKind::Menu(payload.parse().ok()?),
        "CHOICE" => ParsedKind::Choice(payload.parse().ok()?),
        "COMMENT" => ParsedKind::Comment(payload.parse().ok()?),
        "SYM" => {
            let (name, idx) = payload.rsplit_once('@')?;
            ParsedKind::Symbol(name.to_string(), idx.parse().ok()?)
        }
        _ => return None,
    };
    Some((version, parsed))
}

/// Resolve a stable node id back to a live `MenuNodeId`. A version mismatch
/// against `current_version` is the desync signal; any other
/// failure to resolve is an unknown node.
pub fn resolve(graph: &SymbolGraph, current_version: u64, id: &str) -> Result<MenuNodeId, CoreError> {
    let (version, parsed) = parse_id(id).ok_or_else(|| CoreError::UnknownNode(id.to_string()))?;
    if version != current_version {
        return Err(CoreError::Desync);
    }
    let unknown = || CoreError::UnknownNode(id.to_string());
    match parsed {
        ParsedKind::MainMenu => Ok(graph.top),
        ParsedKind::Menu(i) => graph.menu_order.get(i).copied().ok_or_else(unknown),
        ParsedKind::Comment(i) => graph.comment_order.get(i).copied().ok_or_else(unknown),
        ParsedKind::Choice(i) => {
            let cid = graph.choice_order.get(i).copied().ok_or_else(unknown)?;
            Ok(graph.choice(cid).menu_node)
        }
        ParsedKind::Symbol(name, idx) => {
            let sid = graph.lookup(&name).ok_or_else(unknown)?;
            graph.symbol(sid).nodes.get(idx).copied().ok_or_else(unknown)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Env;
    use crate::graph::{build_graph, FileSource};
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
        fn is_dir(&self, _path: &str) -> bool {
            false
        }
    }

    fn graph_from(text: &str) -> SymbolGraph {
        let mut m = HashMap::new();
        m.insert("Kconfig".to_string(), text.to_string());
        let src = MemSource(Mutex::new(m));
        build_graph("Kconfig", &Env::new(), &src).unwrap()
    }

    #[test]
    fn menuconfig_boundary_stops_inlining() {
        let graph = graph_from(
            "menuconfig MOD\n\tbool \"mod\"\nconfig CHILD\n\tbool \"c\"\n\tdepends on MOD\n",
        );
        let items = list_items(&graph, graph.top);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].depth, 0);
    }

    #[test]
    fn node_id_roundtrips_through_resolve() {
        let graph = graph_from("config FOO\n\tbool \"f\"\n");
        let items = list_items(&graph, graph.top);
        let id = node_id(&graph, 1, items[0].node);
        assert_eq!(resolve(&graph, 1, &id).unwrap(), items[0].node);
    }

    #[test]
    fn stale_version_is_desync() {
        let graph = graph_from("config FOO\n\tbool \"f\"\n");
        let items = list_items(&graph, graph.top);
        let id = node_id(&graph, 1, items[0].node);
        assert!(matches!(resolve(&graph, 2, &id), Err(CoreError::Desync)));
    }
}
