//! Diagnostic Engine: the fixed four-check pipeline run over every `.conf`
//! entry, plus attribution of parser/evaluator warnings to
//! their owning file or the synthetic command-line bucket.

use std::collections::HashMap;

use tower_lsp::lsp_types::{self as lsp, DiagnosticSeverity};

use crate::ast::{Expr, LineIndex, Span, Tri, TypeKind, Value};
use crate::conf::{parse_literal, ConfEntry};
use crate::eval::{missing_deps_tri, missing_deps_value};
use crate::graph::{Symbol, SymbolGraph, SymbolId, Warning};
use crate::resolve::default_value;

/// URI under which warnings with no attributable file are published
/// over a `.conf` file's entries.
pub const COMMAND_LINE_URI: &str = "file:///command-line";

/// A diagnostic plus the quick fixes offered alongside it.
pub struct Finding {
    pub diagnostic: lsp::Diagnostic,
    pub actions: Vec<lsp::CodeAction>,
}

/// Run the pipeline over every entry whose name resolves to a known symbol.
/// Entries naming an undefined symbol are skipped here — that case is one of
/// the parser/evaluator warnings handled by [`bucket_warnings`].
pub fn check_entries(
    graph: &SymbolGraph,
    entries: &[ConfEntry],
    uri: &lsp::Url,
    lines: &LineIndex,
) -> Vec<Finding> {
    let by_name: HashMap<&str, &ConfEntry> =
        entries.iter().map(|e| (e.name.as_str(), e)).collect();

    entries
        .iter()
        .filter_map(|entry| {
            let id = graph.lookup(&entry.name)?;
            check_entry(graph, entry, id, &by_name, uri, lines)
        })
        .collect()
}

fn check_entry(
    graph: &SymbolGraph,
    entry: &ConfEntry,
    id: SymbolId,
    by_name: &HashMap<&str, &ConfEntry>,
    uri: &lsp::Url,
    lines: &LineIndex,
) -> Option<Finding> {
    let sym = graph.symbol(id);
    check_type(sym, entry, uri, lines)
        .or_else(|| check_assignment(graph, sym, entry, id, by_name, uri, lines))
        .or_else(|| check_visibility(graph, id, entry, uri, lines))
        .or_else(|| check_defaults(graph, id, entry, uri, lines))
}

fn kind_matches(sym_kind: TypeKind, entry_kind: TypeKind) -> bool {
    match sym_kind {
        TypeKind::Bool | TypeKind::Tristate => entry_kind == TypeKind::Bool,
        TypeKind::String => entry_kind == TypeKind::String,
        TypeKind::Hex => entry_kind == TypeKind::Hex,
        TypeKind::Int => entry_kind == TypeKind::Int,
        TypeKind::Unknown => true,
    }
}

/// Check 1: the `.conf` literal's inferred type against the symbol's
/// declared type.
fn check_type(sym: &Symbol, entry: &ConfEntry, uri: &lsp::Url, lines: &LineIndex) -> Option<Finding> {
    if kind_matches(sym.kind, entry.inferred) {
        return None;
    }

    let range = span_range(lines, entry.value_span);
    let message = format!("Invalid type. Expected {}", sym.kind.as_str());
    let mut actions = Vec::new();

    // Only an int/hex symbol fed the other numeric literal is mechanically
    // convertible; every other mismatch (e.g. a string assigned to a bool)
    // has no sensible rewrite.
    let numeric_cross = matches!(entry.inferred, TypeKind::Int | TypeKind::Hex)
        && matches!(sym.kind, TypeKind::Int | TypeKind::Hex);
    if numeric_cross {
        let n = parse_numeric_literal(&entry.raw_value);
        let converted = match sym.kind {
            TypeKind::Hex => format!("0x{:x}", n),
            TypeKind::Int => n.to_string(),
            _ => unreachable!(),
        };
        actions.push(replace_fix(
            uri,
            format!("Convert value to {}", sym.kind.as_str()),
            range,
            converted,
        ));
    }

    Some(Finding {
        diagnostic: diag(range, DiagnosticSeverity::ERROR, message, None),
        actions,
    })
}

/// Check 2: does the symbol's resolved value actually match what this entry
/// asked for? Skipped entirely for symbols with no prompt anywhere — those
/// are `check_visibility`'s case even when their resolved value also differs.
fn check_assignment(
    graph: &SymbolGraph,
    sym: &Symbol,
    entry: &ConfEntry,
    id: SymbolId,
    by_name: &HashMap<&str, &ConfEntry>,
    uri: &lsp::Url,
    lines: &LineIndex,
) -> Option<Finding> {
    let has_prompt = sym.nodes.iter().any(|n| graph.node(*n).prompt.is_some());
    if !has_prompt {
        return None;
    }

    let requested = parse_literal(&entry.raw_value, entry.inferred);
    let resolved = sym
        .computed_value
        .clone()
        .unwrap_or_else(|| Value::zero_for(sym.kind));
    if requested == resolved {
        return None;
    }

    let message_body = match &resolved {
        Value::Str(s) if s.is_empty() => format!("CONFIG_{} couldn't be set", sym.name),
        _ => format!(
            "CONFIG_{} was assigned {}, but got {}",
            sym.name,
            requested.display_str(),
            resolved.display_str()
        ),
    };

    let missing: Vec<&Expr> = match sym.kind {
        TypeKind::Bool | TypeKind::Tristate => sym
            .direct_dep
            .as_ref()
            .map(|d| missing_deps_tri(graph, d, requested.as_tri()))
            .unwrap_or_default(),
        _ => sym
            .direct_dep
            .as_ref()
            .map(|d| missing_deps_value(graph, d))
            .unwrap_or_default(),
    };

    let message = if missing.is_empty() {
        message_body
    } else {
        let names: Vec<String> = missing.iter().map(|e| expr_display(e)).collect();
        format!("{} (missing: {})", message_body, names.join(", "))
    };

    let range = entry_range(lines, entry);
    let mut actions = Vec::new();

    // Only plain symbol conjuncts ("depends on FOO") get an enable quick
    // fix; compound conjuncts like `!FOO` or `FOO || BAR` only show up in
    // the message text.
    let fixable: Vec<&str> = missing
        .iter()
        .filter_map(|e| match e {
            Expr::Symbol(name, _) => Some(name.as_str()),
            _ => None,
        })
        .collect();

    for name in &fixable {
        actions.push(enable_dependency_fix(uri, entry, name, by_name, lines));
    }
    if fixable.len() >= 2 {
        actions.push(compound_enable_fix(uri, entry, &fixable, by_name, lines));
    }
    actions.push(remove_entry_fix(uri, entry));

    Some(Finding {
        diagnostic: diag(range, DiagnosticSeverity::WARNING, message, None),
        actions,
    })
}

/// Check 3: a symbol with no prompt anywhere cannot hold a user value at
/// all. Prompted symbols whose dependencies are merely unmet are
/// `check_assignment`'s case, not this one.
fn check_visibility(
    graph: &SymbolGraph,
    id: SymbolId,
    entry: &ConfEntry,
    uri: &lsp::Url,
    lines: &LineIndex,
) -> Option<Finding> {
    let sym = graph.symbol(id);
    let has_prompt = sym.nodes.iter().any(|n| graph.node(*n).prompt.is_some());
    if has_prompt {
        return None;
    }
    let range = entry_range(lines, entry);
    let message = format!("Symbol CONFIG_{} cannot be set (has no prompt)", sym.name);
    Some(Finding {
        diagnostic: diag(range, DiagnosticSeverity::WARNING, message, None),
        actions: vec![remove_entry_fix(uri, entry)],
    })
}

/// Check 4: an entry that just restates what the symbol would resolve to
/// with no user value at all.
fn check_defaults(
    graph: &SymbolGraph,
    id: SymbolId,
    entry: &ConfEntry,
    uri: &lsp::Url,
    lines: &LineIndex,
) -> Option<Finding> {
    let requested = parse_literal(&entry.raw_value, entry.inferred);
    let bare_default = default_value(graph, id);
    if requested != bare_default {
        return None;
    }

    let range = entry_range(lines, entry);
    let message = format!("Value is {} by default", bare_default.display_str());
    let diagnostic = lsp::Diagnostic {
        range,
        severity: Some(DiagnosticSeverity::HINT),
        tags: Some(vec![lsp::DiagnosticTag::UNNECESSARY]),
        source: Some("kconfig-lsp".into()),
        message,
        ..Default::default()
    };
    Some(Finding {
        diagnostic,
        actions: vec![delete_fix(uri, "Remove redundant entry".into(), line_delete_range(entry.line))],
    })
}

/// Render an expression conjunct for a diagnostic message — not a full
/// pretty-printer, just enough to name what's missing.
fn expr_display(e: &Expr) -> String {
    match e {
        Expr::Symbol(name, _) => name.clone(),
        Expr::StringLit(s, _) => format!("\"{}\"", s),
        Expr::Paren(inner) => format!("({})", expr_display(inner)),
        Expr::Not(inner) => format!("!{}", expr_display(inner)),
        Expr::And(a, b) => format!("{} && {}", expr_display(a), expr_display(b)),
        Expr::Or(a, b) => format!("{} || {}", expr_display(a), expr_display(b)),
        Expr::Eq(a, b) => format!("{} = {}", expr_display(a), expr_display(b)),
        Expr::NotEq(a, b) => format!("{} != {}", expr_display(a), expr_display(b)),
        Expr::Less(a, b) => format!("{} < {}", expr_display(a), expr_display(b)),
        Expr::LessEq(a, b) => format!("{} <= {}", expr_display(a), expr_display(b)),
        Expr::Greater(a, b) => format!("{} > {}", expr_display(a), expr_display(b)),
        Expr::GreaterEq(a, b) => format!("{} >= {}", expr_display(a), expr_display(b)),
    }
}

fn parse_numeric_literal(raw: &str) -> i64 {
    let s = raw.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).unwrap_or(0);
    }
    s.parse::<i64>().unwrap_or(0)
}

fn span_range(lines: &LineIndex, span: Span) -> lsp::Range {
    let (l0, c0) = lines.line_col(span.start);
    let (l1, c1) = lines.line_col(span.end);
    lsp::Range {
        start: lsp::Position::new(l0, c0),
        end: lsp::Position::new(l1, c1),
    }
}

fn entry_range(lines: &LineIndex, entry: &ConfEntry) -> lsp::Range {
    span_range(lines, entry.name_span.merge(entry.value_span))
}

/// The whole line an entry sits on, including its trailing newline, so a
/// "remove" fix leaves no blank line behind.
fn line_delete_range(line_1based: u32) -> lsp::Range {
    let line0 = line_1based - 1;
    lsp::Range {
        start: lsp::Position::new(line0, 0),
        end: lsp::Position::new(line0 + 1, 0),
    }
}

fn insert_point(entry: &ConfEntry) -> lsp::Position {
    lsp::Position::new(entry.line - 1, 0)
}

fn diag(
    range: lsp::Range,
    severity: DiagnosticSeverity,
    message: String,
    tags: Option<Vec<lsp::DiagnosticTag>>,
) -> lsp::Diagnostic {
    lsp::Diagnostic {
        range,
        severity: Some(severity),
        tags,
        source: Some("kconfig-lsp".into()),
        message,
        ..Default::default()
    }
}

fn quick_fix(uri: &lsp::Url, title: String, edits: Vec<lsp::TextEdit>) -> lsp::CodeAction {
    let mut changes = HashMap::new();
    changes.insert(uri.clone(), edits);
    lsp::CodeAction {
        title,
        kind: Some(lsp::CodeActionKind::QUICKFIX),
        edit: Some(lsp::WorkspaceEdit {
            changes: Some(changes),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn replace_fix(uri: &lsp::Url, title: String, range: lsp::Range, new_text: String) -> lsp::CodeAction {
    quick_fix(uri, title, vec![lsp::TextEdit { range, new_text }])
}

fn delete_fix(uri: &lsp::Url, title: String, range: lsp::Range) -> lsp::CodeAction {
    quick_fix(uri, title, vec![lsp::TextEdit { range, new_text: String::new() }])
}

fn remove_entry_fix(uri: &lsp::Url, entry: &ConfEntry) -> lsp::CodeAction {
    delete_fix(uri, "Remove entry".into(), line_delete_range(entry.line))
}

/// "Enable CONFIG_D": if `D` already has a `.conf` entry, rewrite its value
/// to `y`; otherwise insert a fresh `CONFIG_D=y` line above the failing
/// entry.
fn enable_dependency_fix(
    uri: &lsp::Url,
    entry: &ConfEntry,
    name: &str,
    by_name: &HashMap<&str, &ConfEntry>,
    lines: &LineIndex,
) -> lsp::CodeAction {
    let title = format!("Enable CONFIG_{}", name);
    match by_name.get(name) {
        Some(dep_entry) => replace_fix(uri, title, span_range(lines, dep_entry.value_span), "y".into()),
        None => quick_fix(
            uri,
            title,
            vec![lsp::TextEdit {
                range: lsp::Range {
                    start: insert_point(entry),
                    end: insert_point(entry),
                },
                new_text: format!("CONFIG_{}=y\n", name),
            }],
        ),
    }
}

/// The compound "enable everything" fix. Dependencies with their own entry
/// get an independent replace edit; dependencies with no entry share one
/// insertion point above the failing line, so they're built as a single
/// edit with the conjuncts processed in reverse so the final text still
/// reads in declaration order (inserting at a fixed point puts the last
/// thing inserted on top).
fn compound_enable_fix(
    uri: &lsp::Url,
    entry: &ConfEntry,
    fixable: &[&str],
    by_name: &HashMap<&str, &ConfEntry>,
    lines: &LineIndex,
) -> lsp::CodeAction {
    let mut edits = Vec::new();
    let mut inserted = String::new();
    for name in fixable.iter().rev() {
        match by_name.get(*name) {
            Some(dep_entry) => edits.push(lsp::TextEdit {
                range: span_range(lines, dep_entry.value_span),
                new_text: "y".into(),
            }),
            None => inserted = format!("CONFIG_{}=y\n{}", name, inserted),
        }
    }
    if !inserted.is_empty() {
        let point = insert_point(entry);
        edits.push(lsp::TextEdit {
            range: lsp::Range { start: point, end: point },
            new_text: inserted,
        });
    }
    quick_fix(
        uri,
        format!("Enable {} entries to resolve dependencies", fixable.len()),
        edits,
    )
}

/// Attribute parser/evaluator warnings (undefined assignment, override,
/// redundant) to their originating file, falling back to the synthetic
/// command-line bucket for warnings with no file at all.
pub fn bucket_warnings(warnings: &[Warning]) -> HashMap<String, Vec<lsp::Diagnostic>> {
    let mut buckets: HashMap<String, Vec<lsp::Diagnostic>> = HashMap::new();
    for w in warnings {
        let key = w.file.clone().unwrap_or_else(|| COMMAND_LINE_URI.to_string());
        buckets.entry(key).or_default().push(diag(
            lsp::Range::default(),
            DiagnosticSeverity::WARNING,
            w.message.clone(),
            None,
        ));
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::parse_conf;
    use crate::env::Env;
    use crate::graph::{build_graph, FileSource};
    use crate::resolve::{resolve_all, resolve_choices};
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

    fn graph_from(text: &str) -> SymbolGraph {
        let mut m = StdHashMap::new();
        m.insert("Kconfig".to_string(), text.to_string());
        let src = MemSource(Mutex::new(m));
        build_graph("Kconfig", &Env::new(), &src).unwrap()
    }

    fn uri() -> lsp::Url {
        lsp::Url::parse("file:///tmp/test.conf").unwrap()
    }

    #[test]
    fn type_mismatch_offers_conversion() {
        let graph = graph_from("config NUM\n\tint \"n\"\n");
        let conf_text = "CONFIG_NUM=0x10\n";
        let entries = parse_conf(conf_text);
        let lines = LineIndex::new(conf_text);
        let findings = check_entries(&graph, &entries, &uri(), &lines);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].diagnostic.message.starts_with("Invalid type"));
        assert_eq!(findings[0].actions.len(), 1);
        assert_eq!(findings[0].actions[0].title, "Convert value to int");
    }

    #[test]
    fn missing_dependency_offers_compound_fix() {
        let mut graph = graph_from(
            "config A\n\tbool \"a\"\nconfig B\n\tbool \"b\"\nconfig BAR\n\tbool \"bar\"\n\tdepends on A && B\n",
        );
        let conf_text = "CONFIG_BAR=y\n";
        let entries = parse_conf(conf_text);
        let mut warnings = Vec::new();
        crate::conf::apply_entries(&mut graph, &entries, None, true, &mut warnings);
        resolve_all(&mut graph);
        resolve_choices(&mut graph);

        let lines = LineIndex::new(conf_text);
        let findings = check_entries(&graph, &entries, &uri(), &lines);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].diagnostic.message.contains("missing: A && B") || findings[0].diagnostic.message.contains("missing: A, B"));
        let titles: Vec<&str> = findings[0].actions.iter().map(|a| a.title.as_str()).collect();
        assert!(titles.contains(&"Enable CONFIG_A"));
        assert!(titles.contains(&"Enable CONFIG_B"));
        assert!(titles.iter().any(|t| t.starts_with("Enable 2 entries")));
        assert!(titles.contains(&"Remove entry"));
    }

    #[test]
    fn invisible_symbol_flags_no_prompt() {
        let mut graph = graph_from("config HIDDEN\n\tbool\n");
        let conf_text = "CONFIG_HIDDEN=y\n";
        let entries = parse_conf(conf_text);
        let mut warnings = Vec::new();
        crate::conf::apply_entries(&mut graph, &entries, None, true, &mut warnings);
        resolve_all(&mut graph);
        resolve_choices(&mut graph);

        let lines = LineIndex::new(conf_text);
        let findings = check_entries(&graph, &entries, &uri(), &lines);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].diagnostic.message.contains("has no prompt"));
    }

    #[test]
    fn redundant_default_is_hinted() {
        let mut graph = graph_from("config FOO\n\tbool \"f\"\n\tdefault y\n");
        let conf_text = "CONFIG_FOO=y\n";
        let entries = parse_conf(conf_text);
        let mut warnings = Vec::new();
        crate::conf::apply_entries(&mut graph, &entries, None, true, &mut warnings);
        resolve_all(&mut graph);
        resolve_choices(&mut graph);

        let lines = LineIndex::new(conf_text);
        let findings = check_entries(&graph, &entries, &uri(), &lines);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].diagnostic.severity, Some(DiagnosticSeverity::HINT));
        assert_eq!(findings[0].diagnostic.tags, Some(vec![lsp::DiagnosticTag::UNNECESSARY]));
    }

    #[test]
    fn bucket_warnings_routes_fileless_to_command_line() {
        let warnings = vec![Warning { file: None, message: "undefined symbol CONFIG_X assigned".into() }];
        let buckets = bucket_warnings(&warnings);
        assert!(buckets.contains_key(COMMAND_LINE_URI));
    }
}
