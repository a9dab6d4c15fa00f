//! Completion: Kconfig keywords everywhere, plus symbol names at positions
//! that take one (`depends on`, `select`, `imply`, a `.conf` prefix) or
//! when the user has already typed a partial `CONFIG_`/bare name
//! or when the user has already typed a partial name.

use tower_lsp::lsp_types as lsp;

use crate::ast::LineIndex;
use crate::context::Context;
use crate::text::{prefix_at_offset, strip_config_prefix};

pub fn complete(ctx: &Context, text: &str, pos: lsp::Position) -> Option<lsp::CompletionResponse> {
    let lines = LineIndex::new(text);
    let offset = lines.offset(pos.line, pos.character);
    let prefix = prefix_at_offset(text, offset);

    let mut items: Vec<lsp::CompletionItem> = Vec::new();

    for kw in KEYWORDS {
        if prefix.is_empty() || kw.starts_with(prefix.as_str()) {
            items.push(lsp::CompletionItem {
                label: kw.to_string(),
                kind: Some(lsp::CompletionItemKind::KEYWORD),
                ..Default::default()
            });
        }
    }

    let bare_prefix = strip_config_prefix(&prefix);
    let symbol_position = prefix.is_empty() && is_symbol_position(text, offset);
    for sym in &ctx.graph.symbols {
        if sym.name.starts_with(bare_prefix) || symbol_position {
            let detail = sym
                .nodes
                .iter()
                .find_map(|&n| ctx.graph.node(n).prompt.as_ref().map(|(t, _)| t.clone()));
            items.push(lsp::CompletionItem {
                label: sym.name.clone(),
                kind: Some(lsp::CompletionItemKind::CONSTANT),
                detail,
                ..Default::default()
            });
        }
    }

    if items.is_empty() {
        None
    } else {
        Some(lsp::CompletionResponse::Array(items))
    }
}

fn is_symbol_position(source: &str, offset: usize) -> bool {
    let line_start = source[..offset].rfind('\n').map_or(0, |p| p + 1);
    let before = source[line_start..offset].trim_start();
    before.starts_with("depends on ") || before.starts_with("select ") || before.starts_with("imply ")
}

const KEYWORDS: &[&str] = &[
    "config",
    "menuconfig",
    "choice",
    "endchoice",
    "comment",
    "menu",
    "endmenu",
    "if",
    "endif",
    "source",
    "mainmenu",
    "bool",
    "tristate",
    "string",
    "hex",
    "int",
    "prompt",
    "default",
    "def_bool",
    "def_tristate",
    "depends",
    "select",
    "imply",
    "visible",
    "range",
    "help",
    "modules",
    "transitional",
    "optional",
];

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

    fn ctx_with(text: &str) -> (ContextManager, u32) {
        let mut files = HashMap::new();
        files.insert("Kconfig".to_string(), text.to_string());
        let src = MemSource(Mutex::new(files));
        let mut mgr = ContextManager::new();
        let id = mgr.add_build("Kconfig".into(), vec![], Env::new(), &src).unwrap();
        (mgr, id)
    }

    #[test]
    fn depends_on_position_suggests_symbols() {
        let (mgr, id) = ctx_with("config FOO\n\tbool \"f\"\nconfig BAR\n\tbool \"b\"\n\tdepends on \n");
        let ctx = mgr.get(id).unwrap();
        let text = "config BAR\n\tbool \"b\"\n\tdepends on \n";
        let resp = complete(ctx, text, lsp::Position::new(2, 13)).unwrap();
        let labels: Vec<String> = match resp {
            lsp::CompletionResponse::Array(items) => items.into_iter().map(|i| i.label).collect(),
            _ => Vec::new(),
        };
        assert!(labels.contains(&"FOO".to_string()));
    }

    #[test]
    fn empty_prefix_elsewhere_only_suggests_keywords() {
        let (mgr, id) = ctx_with("config FOO\n\tbool \"f\"\n");
        let ctx = mgr.get(id).unwrap();
        let resp = complete(ctx, "\n", lsp::Position::new(0, 0)).unwrap();
        let labels: Vec<String> = match resp {
            lsp::CompletionResponse::Array(items) => items.into_iter().map(|i| i.label).collect(),
            _ => Vec::new(),
        };
        assert!(labels.contains(&"config".to_string()));
        assert!(!labels.contains(&"FOO".to_string()));
    }
}
