//! Assignment Layer: parses `.conf` files into [`ConfEntry`] records and
//! applies them, in order, to a [`SymbolGraph`]'s user values.

use std::sync::OnceLock;

use regex::Regex;

use crate::ast::{LineIndex, Span, Tri, TypeKind, Value};
use crate::env::Env;
use crate::graph::{SymbolGraph, Warning};

#[derive(Debug, Clone)]
pub struct ConfEntry {
    pub name: String,
    pub raw_value: String,
    pub name_span: Span,
    pub value_span: Span,
    pub line: u32,
    pub inferred: TypeKind,
}

fn entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^[ \t]*CONFIG_(\w+)[ \t]*=[ \t]*("(?:[^"])*"|\w+)"#).unwrap())
}

fn hex_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^0x[a-fA-F0-9]+$").unwrap())
}

fn int_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+$").unwrap())
}

/// Literal-type inference from a `.conf` right-hand side.
pub fn infer_literal_kind(raw: &str) -> TypeKind {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return TypeKind::String;
    }
    if raw == "y" || raw == "n" || raw == "m" {
        return TypeKind::Bool;
    }
    if hex_regex().is_match(raw) {
        return TypeKind::Hex;
    }
    if int_regex().is_match(raw) {
        return TypeKind::Int;
    }
    TypeKind::Unknown
}

/// Parse a raw `.conf` literal into a `Value`, given its inferred kind.
pub fn parse_literal(raw: &str, inferred: TypeKind) -> Value {
    match inferred {
        TypeKind::String => Value::Str(raw.trim_matches('"').to_string()),
        TypeKind::Bool => Value::Tri(match raw {
            "y" => Tri::Yes,
            "m" => Tri::Mod,
            _ => Tri::No,
        }),
        TypeKind::Hex => {
            let digits = raw.trim_start_matches("0x").trim_start_matches("0X");
            Value::Hex(i64::from_str_radix(digits, 16).unwrap_or(0))
        }
        TypeKind::Int => Value::Int(raw.parse().unwrap_or(0)),
        TypeKind::Tristate | TypeKind::Unknown => Value::Str(raw.to_string()),
    }
}

/// Parse every `CONFIG_X=value` line in `text`. Non-matching lines are
/// ignored silently.
pub fn parse_conf(text: &str) -> Vec<ConfEntry> {
    let lines = LineIndex::new(text);
    let mut out = Vec::new();
    let mut offset = 0usize;
    for raw_line in text.split_inclusive('\n') {
        if let Some(caps) = entry_regex().captures(raw_line) {
            let name_m = caps.get(1).unwrap();
            let value_m = caps.get(2).unwrap();
            let raw_value = value_m.as_str().to_string();
            let inferred = infer_literal_kind(&raw_value);
            let (line, _) = lines.line_col(offset);
            out.push(ConfEntry {
                name: name_m.as_str().to_string(),
                raw_value,
                name_span: Span::new(offset + name_m.start(), offset + name_m.end()),
                value_span: Span::new(offset + value_m.start(), offset + value_m.end()),
                line: line + 1,
                inferred,
            });
        }
        offset += raw_line.len();
    }
    out
}

/// Apply `entries` to `graph`'s user values. `replace` clears every prior
/// user value first (first `.conf` file in the stack); otherwise later
/// values simply overwrite earlier ones.
pub fn apply_entries(
    graph: &mut SymbolGraph,
    entries: &[ConfEntry],
    file: Option<&str>,
    replace: bool,
    warnings: &mut Vec<Warning>,
) {
    if replace {
        for sym in graph.symbols.iter_mut() {
            sym.user_value = None;
        }
    }
    for entry in entries {
        let Some(id) = graph.lookup(&entry.name) else {
            warnings.push(Warning {
                file: file.map(|s| s.to_string()),
                message: format!("undefined symbol CONFIG_{} assigned", entry.name),
            });
            continue;
        };
        let value = parse_literal(&entry.raw_value, entry.inferred);
        let sym = graph.symbol_mut(id);
        match &sym.user_value {
            Some(prev) if *prev == value => {
                warnings.push(Warning {
                    file: file.map(|s| s.to_string()),
                    message: format!("CONFIG_{} set more than once, redundant", entry.name),
                });
            }
            Some(_) => {
                warnings.push(Warning {
                    file: file.map(|s| s.to_string()),
                    message: format!(
                        "CONFIG_{} set more than once, overriding previous value",
                        entry.name
                    ),
                });
            }
            None => {}
        }
        sym.user_value = Some(value);
    }
}

/// `<BOARD_DIR>/<BOARD>_defconfig`, prepended ahead of the user's own
/// `.conf` files.
pub fn board_defconfig_path(env: &Env) -> Option<String> {
    let board_dir = env.get("BOARD_DIR")?;
    let board = env.get("BOARD")?;
    if board_dir.is_empty() || board.is_empty() {
        return None;
    }
    Some(format!("{}/{}_defconfig", board_dir, board))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_and_bare_values() {
        let entries = parse_conf("CONFIG_NAME=\"hi\"\nCONFIG_FOO=y\n# comment\nCONFIG_NUM=0x10\n");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, "NAME");
        assert_eq!(entries[0].inferred, TypeKind::String);
        assert_eq!(entries[1].inferred, TypeKind::Bool);
        assert_eq!(entries[2].inferred, TypeKind::Hex);
    }

    #[test]
    fn ignores_non_matching_lines() {
        let entries = parse_conf("not an assignment\nCONFIG_X=1\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "X");
        assert_eq!(entries[0].inferred, TypeKind::Int);
    }

    #[test]
    fn value_span_covers_quotes() {
        let entries = parse_conf("CONFIG_A=\"abc\"\n");
        let e = &entries[0];
        assert_eq!(&"CONFIG_A=\"abc\"\n"[e.value_span.start..e.value_span.end], "\"abc\"");
    }
}
