//! Value Resolver: derives each symbol's effective value from its user
//! value, defaults, dependencies, range clamps, and select/imply reverse
//! dependencies.

use crate::ast::{Tri, TypeKind, Value};
use crate::eval::{eval_number, eval_tri, eval_value, EvalValue};
use crate::graph::{Symbol, SymbolGraph, SymbolId};

/// Recompute every symbol's `computed_value` in place. Idempotent: running
/// it twice on unchanged user values/defaults produces the same result.
pub fn resolve_all(graph: &mut SymbolGraph) {
    let ids: Vec<SymbolId> = (0..graph.symbols.len()).map(|i| SymbolId(i as u32)).collect();

    for &id in &ids {
        let value = resolve_direct(graph, id);
        graph.symbol_mut(id).computed_value = Some(value);
    }

    apply_reverse_deps(graph, &ids);
}

/// Resolution order: user value (if visible & dependencies hold),
/// else first matching default, else the type's zero, clamped by range.
fn resolve_direct(graph: &SymbolGraph, id: SymbolId) -> Value {
    let sym = graph.symbol(id);
    let kind = sym.kind;
    let dep_tri = sym
        .direct_dep
        .as_ref()
        .map(|d| eval_tri(graph, d))
        .unwrap_or(Tri::Yes);
    let visible = visibility(graph, id);

    if let Some(user) = sym.user_value.clone() {
        let satisfies = match kind {
            TypeKind::Bool | TypeKind::Tristate => {
                let want = user.as_tri();
                visible.min(dep_tri) >= want
            }
            _ => visible != Tri::No && dep_tri != Tri::No,
        };
        if satisfies {
            return clamp_range(graph, id, user);
        }
    }

    default_value(graph, id)
}

/// The value a symbol takes with no user assignment at all: first matching
/// default, else the type's zero, clamped by range. Used both as
/// `resolve_direct`'s fallback tail and by the diagnostic engine's
/// `check_defaults` to detect a `.conf` entry that just restates it.
pub fn default_value(graph: &SymbolGraph, id: SymbolId) -> Value {
    let sym = graph.symbol(id);
    let kind = sym.kind;
    for d in &sym.defaults {
        let holds = d
            .condition
            .as_ref()
            .map(|c| eval_tri(graph, c) != Tri::No)
            .unwrap_or(true);
        if holds {
            let v = eval_value(graph, &d.value);
            return clamp_range(graph, id, coerce(kind, v));
        }
    }

    clamp_range(graph, id, Value::zero_for(kind))
}

/// Visibility: the maximum tri-value of any of the symbol's prompt
/// conditions, each itself gated by its node's enclosing dependency.
pub fn visibility(graph: &SymbolGraph, id: SymbolId) -> Tri {
    let sym = graph.symbol(id);
    let mut vis = Tri::No;
    for &node_id in &sym.nodes {
        let node = graph.node(node_id);
        if let Some((_, cond)) = &node.prompt {
            let node_dep = node.dep.as_ref().map(|d| eval_tri(graph, d)).unwrap_or(Tri::Yes);
            let prompt_cond = cond.as_ref().map(|c| eval_tri(graph, c)).unwrap_or(Tri::Yes);
            vis = vis.or(node_dep.and(prompt_cond));
        }
    }
    vis
}

fn coerce(kind: TypeKind, v: EvalValue) -> Value {
    match kind {
        TypeKind::Bool | TypeKind::Tristate => Value::Tri(v.as_tri()),
        TypeKind::Int => Value::Int(parse_int(&render_str(&v))),
        TypeKind::Hex => Value::Hex(parse_int(&render_str(&v))),
        TypeKind::String | TypeKind::Unknown => match v {
            EvalValue::Str(s) => Value::Str(s),
            EvalValue::Tri(t) => Value::Str(t.as_str().to_string()),
        },
    }
}

fn render_str(v: &EvalValue) -> String {
    match v {
        EvalValue::Str(s) => s.clone(),
        EvalValue::Tri(t) => t.as_str().to_string(),
    }
}

fn parse_int(s: &str) -> i64 {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).unwrap_or(0);
    }
    s.parse::<i64>()
        .or_else(|_| i64::from_str_radix(s, 16))
        .unwrap_or(0)
}

fn clamp_range(graph: &SymbolGraph, id: SymbolId, value: Value) -> Value {
    let sym = graph.symbol(id);
    match value {
        Value::Int(n) => match active_range(graph, sym) {
            Some((lo, hi)) => Value::Int(n.clamp(lo, hi)),
            None => Value::Int(n),
        },
        Value::Hex(n) => match active_range(graph, sym) {
            Some((lo, hi)) => Value::Hex(n.clamp(lo, hi)),
            None => Value::Hex(n),
        },
        other => other,
    }
}

fn active_range(graph: &SymbolGraph, sym: &Symbol) -> Option<(i64, i64)> {
    for r in &sym.ranges {
        let holds = r
            .condition
            .as_ref()
            .map(|c| eval_tri(graph, c) != Tri::No)
            .unwrap_or(true);
        if holds {
            let lo = eval_number(graph, &r.low)?;
            let hi = eval_number(graph, &r.high)?;
            return Some((lo, hi));
        }
    }
    None
}

/// Reverse-dependency propagation: selects force a floor on the target's value;
/// implies raise it only when nothing stronger already applies, since
/// implied symbols can still be overridden by their own unmet dependencies.
fn apply_reverse_deps(graph: &mut SymbolGraph, ids: &[SymbolId]) {
    let mut select_bump = vec![Tri::No; graph.symbols.len()];
    let mut imply_bump = vec![Tri::No; graph.symbols.len()];

    for &id in ids {
        let sym = graph.symbol(id);
        let self_val = sym
            .computed_value
            .as_ref()
            .map(|v| v.as_tri())
            .unwrap_or(Tri::No);
        let selects = sym.selects.clone();
        let implies = sym.implies.clone();

        for sel in &selects {
            if let Some(target) = graph.lookup(&sel.symbol) {
                let cond_tri = sel
                    .condition
                    .as_ref()
                    .map(|c| eval_tri(graph, c))
                    .unwrap_or(Tri::Yes);
                let contributed = self_val.and(cond_tri);
                select_bump[target.index()] = select_bump[target.index()].or(contributed);
            }
        }
        for imp in &implies {
            if let Some(target) = graph.lookup(&imp.symbol) {
                let cond_tri = imp
                    .condition
                    .as_ref()
                    .map(|c| eval_tri(graph, c))
                    .unwrap_or(Tri::Yes);
                let contributed = self_val.and(cond_tri);
                imply_bump[target.index()] = imply_bump[target.index()].or(contributed);
            }
        }
    }

    for &id in ids {
        let bump = select_bump[id.index()].or(imply_bump[id.index()]);
        if bump == Tri::No {
            continue;
        }
        let sym = graph.symbol_mut(id);
        match sym.computed_value.take() {
            Some(Value::Tri(t)) => sym.computed_value = Some(Value::Tri(t.or(bump))),
            other => sym.computed_value = other.or(Some(Value::Tri(bump))),
        }
    }
}

/// Choice resolution: for a bool choice at most one member may be `y`; for
/// a tristate choice any number of members may be `m` but at most one `y`.
/// Called after `resolve_all` to enforce the invariant across all choices.
pub fn resolve_choices(graph: &mut SymbolGraph) {
    let choice_ids: Vec<usize> = (0..graph.choices.len()).collect();
    for ci in choice_ids {
        let members = graph.choices[ci].members.clone();
        let kind = graph.choices[ci].kind;

        let mut yes_winner: Option<SymbolId> = None;
        for &m in &members {
            let is_user_yes = matches!(
                graph.symbol(m).user_value,
                Some(Value::Tri(Tri::Yes))
            );
            if is_user_yes {
                yes_winner = Some(m);
                break;
            }
        }
        if yes_winner.is_none() {
            for &m in &members {
                if matches!(graph.symbol(m).computed_value, Some(Value::Tri(Tri::Yes))) {
                    yes_winner = Some(m);
                    break;
                }
            }
        }
        if yes_winner.is_none() {
            if let Some(&first) = members.first() {
                yes_winner = Some(first);
            }
        }

        for &m in &members {
            let cur = graph.symbol(m).computed_value.clone();
            let new = if Some(m) == yes_winner {
                Value::Tri(Tri::Yes)
            } else if kind == TypeKind::Tristate && matches!(cur, Some(Value::Tri(Tri::Mod))) {
                Value::Tri(Tri::Mod)
            } else {
                Value::Tri(Tri::No)
            };
            graph.symbol_mut(m).computed_value = Some(new);
        }
    }
}
