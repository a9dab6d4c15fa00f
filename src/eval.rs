//! Expression evaluation: turns an `Expr` tree into a tri-value or a string
//! under a symbol graph's current values.

use crate::ast::{Expr, Tri, TypeKind, Value};
use crate::graph::SymbolGraph;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalValue {
    Tri(Tri),
    Str(String),
}

impl EvalValue {
    pub fn as_tri(&self) -> Tri {
        match self {
            EvalValue::Tri(t) => *t,
            EvalValue::Str(s) => {
                if s.is_empty() {
                    Tri::No
                } else {
                    Tri::Yes
                }
            }
        }
    }
}

/// The value a symbol currently evaluates to, as a leaf in an expression.
/// Falls back to `computed_value`, then the type's zero, for symbols that
/// have not been resolved yet.
///
/// `y`, `m`, and `n` are not ordinary identifiers: like kconfiglib's
/// constant symbols, they denote the tristate literals directly and are
/// never looked up in the graph, so `default y` doesn't depend on some
/// symbol named `y` happening to be undeclared.
fn symbol_leaf(graph: &SymbolGraph, name: &str) -> EvalValue {
    match name {
        "y" => return EvalValue::Tri(Tri::Yes),
        "m" => return EvalValue::Tri(Tri::Mod),
        "n" => return EvalValue::Tri(Tri::No),
        _ => {}
    }
    match graph.lookup(name) {
        Some(id) => {
            let sym = graph.symbol(id);
            match sym.computed_value.as_ref().or(sym.user_value.as_ref()) {
                Some(Value::Tri(t)) => EvalValue::Tri(*t),
                Some(Value::Str(s)) => EvalValue::Str(s.clone()),
                Some(Value::Int(n)) => EvalValue::Str(n.to_string()),
                Some(Value::Hex(n)) => EvalValue::Str(format!("0x{:x}", n)),
                None => match sym.kind {
                    TypeKind::String | TypeKind::Int | TypeKind::Hex | TypeKind::Unknown => {
                        EvalValue::Str(String::new())
                    }
                    TypeKind::Bool | TypeKind::Tristate => EvalValue::Tri(Tri::No),
                },
            }
        }
        // An undeclared symbol referenced in an expression is always `n`/empty.
        None => EvalValue::Tri(Tri::No),
    }
}

/// Evaluate `expr` to a tri-value (for boolean contexts: dependencies,
/// visibility, select/imply conditions).
pub fn eval_tri(graph: &SymbolGraph, expr: &Expr) -> Tri {
    eval_value(graph, expr).as_tri()
}

/// Evaluate `expr` to its full value, preserving string comparisons.
pub fn eval_value(graph: &SymbolGraph, expr: &Expr) -> EvalValue {
    match expr {
        Expr::Symbol(name, _) => symbol_leaf(graph, name),
        Expr::StringLit(s, _) => EvalValue::Str(s.clone()),
        Expr::Paren(e) => eval_value(graph, e),
        Expr::Not(e) => EvalValue::Tri(eval_tri(graph, e).not()),
        Expr::And(a, b) => EvalValue::Tri(eval_tri(graph, a).and(eval_tri(graph, b))),
        Expr::Or(a, b) => EvalValue::Tri(eval_tri(graph, a).or(eval_tri(graph, b))),
        Expr::Eq(a, b) => EvalValue::Tri(bool_tri(compare(graph, a, b) == std::cmp::Ordering::Equal)),
        Expr::NotEq(a, b) => EvalValue::Tri(bool_tri(compare(graph, a, b) != std::cmp::Ordering::Equal)),
        Expr::Less(a, b) => EvalValue::Tri(bool_tri(compare(graph, a, b) == std::cmp::Ordering::Less)),
        Expr::LessEq(a, b) => EvalValue::Tri(bool_tri(compare(graph, a, b) != std::cmp::Ordering::Greater)),
        Expr::Greater(a, b) => EvalValue::Tri(bool_tri(compare(graph, a, b) == std::cmp::Ordering::Greater)),
        Expr::GreaterEq(a, b) => EvalValue::Tri(bool_tri(compare(graph, a, b) != std::cmp::Ordering::Less)),
    }
}

fn bool_tri(b: bool) -> Tri {
    if b { Tri::Yes } else { Tri::No }
}

/// Numeric parse of a symbol/literal operand, for numeric comparisons.
/// Tries decimal first, then hex with or without a `0x` prefix (symbols of
/// hex type commonly store their string value without the prefix).
fn as_number(s: &str) -> Option<i64> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    s.parse::<i64>().ok().or_else(|| i64::from_str_radix(s, 16).ok())
}

fn operand_kind(graph: &SymbolGraph, expr: &Expr) -> TypeKind {
    if let Expr::Symbol(name, _) = expr {
        if let Some(id) = graph.lookup(name) {
            return graph.symbol(id).kind;
        }
    }
    TypeKind::Unknown
}

/// Compare two operands: numeric order if both are int/hex typed, else
/// lexicographic string order.
fn compare(graph: &SymbolGraph, a: &Expr, b: &Expr) -> std::cmp::Ordering {
    let va = eval_value(graph, a);
    let vb = eval_value(graph, b);
    let both_numeric = matches!(operand_kind(graph, a), TypeKind::Int | TypeKind::Hex)
        && matches!(operand_kind(graph, b), TypeKind::Int | TypeKind::Hex);

    let sa = render(&va);
    let sb = render(&vb);
    if both_numeric {
        if let (Some(na), Some(nb)) = (as_number(&sa), as_number(&sb)) {
            return na.cmp(&nb);
        }
    }
    sa.cmp(&sb)
}

fn render(v: &EvalValue) -> String {
    match v {
        EvalValue::Tri(t) => t.as_str().to_string(),
        EvalValue::Str(s) => s.clone(),
    }
}

/// Evaluate `expr` and parse it as a number (decimal or `0x`-prefixed hex),
/// for range-clause bounds.
pub fn eval_number(graph: &SymbolGraph, expr: &Expr) -> Option<i64> {
    as_number(&render(&eval_value(graph, expr)))
}

/// Decompose an expression into its top-level AND conjuncts.
fn split_and<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::And(a, b) => {
            split_and(a, out);
            split_and(b, out);
        }
        Expr::Paren(e) => split_and(e, out),
        other => out.push(other),
    }
}

/// The conjuncts of `dep` whose current evaluation is strictly below
/// `requested` (bool/tristate) — drives the "Enable CONFIG_X" quick fixes.
pub fn missing_deps_tri<'e>(graph: &SymbolGraph, dep: &'e Expr, requested: Tri) -> Vec<&'e Expr> {
    let mut conjuncts = Vec::new();
    split_and(dep, &mut conjuncts);
    conjuncts
        .into_iter()
        .filter(|c| eval_tri(graph, c) < requested)
        .collect()
}

/// Same decomposition for string/int/hex symbols: a conjunct is "missing"
/// when it evaluates to zero/empty.
pub fn missing_deps_value<'e>(graph: &SymbolGraph, dep: &'e Expr) -> Vec<&'e Expr> {
    let mut conjuncts = Vec::new();
    split_and(dep, &mut conjuncts);
    conjuncts
        .into_iter()
        .filter(|c| eval_tri(graph, c) == Tri::No)
        .collect()
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
    fn tristate_literals_are_not_symbol_lookups() {
        let graph = graph_from("config A\n\tbool \"a\"\n");
        assert_eq!(eval_tri(&graph, &Expr::Symbol("y".into(), Default::default())), Tri::Yes);
        assert_eq!(eval_tri(&graph, &Expr::Symbol("m".into(), Default::default())), Tri::Mod);
        assert_eq!(eval_tri(&graph, &Expr::Symbol("n".into(), Default::default())), Tri::No);
    }

    #[test]
    fn unset_bool_evaluates_no() {
        let graph = graph_from("config A\n\tbool \"a\"\n");
        let id = graph.lookup("A").unwrap();
        let expr = Expr::Symbol("A".into(), Default::default());
        assert_eq!(eval_tri(&graph, &expr), Tri::No);
        let _ = id;
    }

    #[test]
    fn and_is_min_or_is_max() {
        let mut graph = graph_from("config A\n\tbool \"a\"\nconfig B\n\tbool \"b\"\n");
        let a = graph.lookup("A").unwrap();
        graph.symbol_mut(a).computed_value = Some(Value::Tri(Tri::Yes));
        let expr_and = Expr::And(
            Box::new(Expr::Symbol("A".into(), Default::default())),
            Box::new(Expr::Symbol("B".into(), Default::default())),
        );
        assert_eq!(eval_tri(&graph, &expr_and), Tri::No);
        let expr_or = Expr::Or(
            Box::new(Expr::Symbol("A".into(), Default::default())),
            Box::new(Expr::Symbol("B".into(), Default::default())),
        );
        assert_eq!(eval_tri(&graph, &expr_or), Tri::Yes);
    }

    #[test]
    fn missing_deps_reports_unset_conjuncts() {
        let mut graph = graph_from("config A\n\tbool \"a\"\nconfig B\n\tbool \"b\"\n");
        let a = graph.lookup("A").unwrap();
        graph.symbol_mut(a).computed_value = Some(Value::Tri(Tri::Yes));
        let dep = Expr::And(
            Box::new(Expr::Symbol("A".into(), Default::default())),
            Box::new(Expr::Symbol("B".into(), Default::default())),
        );
        let missing = missing_deps_tri(&graph, &dep, Tri::Yes);
        assert_eq!(missing.len(), 1);
        assert!(matches!(*missing[0], Expr::Symbol(ref name, _) if name == "B"));
    }
}
