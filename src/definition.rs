//! Go-to-definition: resolves the identifier under the cursor to every
//! declaration site of that symbol in the Kconfig tree.

use tower_lsp::lsp_types as lsp;

use crate::ast::LineIndex;
use crate::context::{path_to_uri, Context};
use crate::text::{strip_config_prefix, word_at_offset};

/// Every declaration site of `name`, as LSP locations. A symbol declared in
/// more than one `config` block (conditional redeclaration) gets one
/// location per site, each pointing at the start of its declaration line —
/// the graph keeps only the line, not a name span, for declaration sites.
pub fn locations_for_symbol(ctx: &Context, name: &str) -> Vec<lsp::Location> {
    let Some(id) = ctx.graph.lookup(name) else {
        return Vec::new();
    };
    ctx.graph
        .symbol(id)
        .nodes
        .iter()
        .map(|&node| {
            let loc = &ctx.graph.node(node).loc;
            let line = loc.line.saturating_sub(1);
            lsp::Location {
                uri: path_to_uri(&loc.file),
                range: lsp::Range {
                    start: lsp::Position::new(line, 0),
                    end: lsp::Position::new(line, 0),
                },
            }
        })
        .collect()
}

/// `textDocument/definition` over the `.conf` or Kconfig buffer `text`, at
/// `pos`. Strips a leading `CONFIG_` before lookup so it works from either
/// side (a `.conf` assignment or a `depends on`/`select` reference).
pub fn goto_definition(ctx: &Context, text: &str, pos: lsp::Position) -> Option<lsp::GotoDefinitionResponse> {
    let lines = LineIndex::new(text);
    let offset = lines.offset(pos.line, pos.character);
    let word = word_at_offset(text, offset)?;
    let name = strip_config_prefix(&word);

    let locations = locations_for_symbol(ctx, name);
    match locations.len() {
        0 => None,
        1 => Some(lsp::GotoDefinitionResponse::Scalar(locations.into_iter().next().unwrap())),
        _ => Some(lsp::GotoDefinitionResponse::Array(locations)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextManager;
    use crate::env::Env;
    use crate::graph::FileSource;
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

    #[test]
    fn finds_single_declaration() {
        let mut files = HashMap::new();
        files.insert("Kconfig".to_string(), "config FOO\n\tbool \"f\"\n".to_string());
        let src = MemSource(Mutex::new(files));
        let mut mgr = ContextManager::new();
        let id = mgr.add_build("Kconfig".into(), vec![], Env::new(), &src).unwrap();
        let ctx = mgr.get(id).unwrap();

        let resp = goto_definition(ctx, "depends on FOO\n", lsp::Position::new(0, 12));
        assert!(matches!(resp, Some(lsp::GotoDefinitionResponse::Scalar(_))));
    }

    #[test]
    fn unknown_symbol_yields_nothing() {
        let mut files = HashMap::new();
        files.insert("Kconfig".to_string(), "config FOO\n\tbool \"f\"\n".to_string());
        let src = MemSource(Mutex::new(files));
        let mut mgr = ContextManager::new();
        let id = mgr.add_build("Kconfig".into(), vec![], Env::new(), &src).unwrap();
        let ctx = mgr.get(id).unwrap();

        assert!(goto_definition(ctx, "depends on BAR\n", lsp::Position::new(0, 12)).is_none());
    }
}
