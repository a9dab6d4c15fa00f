//! Environment mapping consulted by the parser during macro/path expansion.
//!
//! Values may arrive as a single string or as a `?`-separated list of
//! fallback alternatives (see the environment-dump tool's wire format,
//! `{"root": .., "env": {name: value|[alts]}}`). Both shapes normalize to
//! [`EnvValue::Alternatives`].

use std::collections::HashMap;
use std::env as process_env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvValue {
    Alternatives(Vec<String>),
}

impl EnvValue {
    pub fn single(value: impl Into<String>) -> EnvValue {
        EnvValue::Alternatives(vec![value.into()])
    }

    /// A string that may itself contain `?`-separated alternatives.
    pub fn from_raw(raw: &str) -> EnvValue {
        if raw.contains('?') {
            EnvValue::Alternatives(raw.split('?').map(|s| s.to_string()).collect())
        } else {
            EnvValue::single(raw)
        }
    }

    /// First non-empty alternative, or empty string if all are empty/absent.
    pub fn first_non_empty(&self) -> &str {
        let EnvValue::Alternatives(alts) = self;
        alts.iter()
            .map(|s| s.as_str())
            .find(|s| !s.is_empty())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env(pub HashMap<String, EnvValue>);

impl Env {
    pub fn new() -> Env {
        Env(HashMap::new())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|v| v.first_non_empty())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: EnvValue) {
        self.0.insert(name.into(), value);
    }
}

/// A warning produced while expanding `$(NAME)` references.
#[derive(Debug, Clone)]
pub struct ExpandWarning {
    pub name: String,
}

/// Replace every `$(NAME)` substring of `text` with its value in `env`.
/// An unresolved name expands to the empty string and appends a warning.
pub fn expand_vars(text: &str, env: &Env, warnings: &mut Vec<ExpandWarning>) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'(') {
            if let Some(close) = text[i + 2..].find(')') {
                let name = &text[i + 2..i + 2 + close];
                match env.get(name) {
                    Some(val) => out.push_str(val),
                    None => warnings.push(ExpandWarning {
                        name: name.to_string(),
                    }),
                }
                i += 2 + close + 1;
                continue;
            }
        }
        let ch = text[i..].chars().next().unwrap_or('\u{0}');
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Scoped acquisition of the process environment: snapshot the variables the
/// parser is about to overwrite, apply the context's environment, and
/// restore the snapshot on drop. Bounds the damage of two contexts sharing
/// conflicting environments (the process environment is the one piece of
/// truly global state the parser consults).
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    pub fn apply(env: &Env) -> EnvGuard {
        let mut previous = Vec::with_capacity(env.0.len());
        for (name, value) in &env.0 {
            previous.push((name.clone(), process_env::var(name).ok()));
            // SAFETY: the core is single-threaded; no other
            // thread reads/writes process environment concurrently.
            unsafe {
                process_env::set_var(name, value.first_non_empty());
            }
        }
        EnvGuard { previous }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (name, value) in self.previous.drain(..) {
            match value {
                Some(v) => unsafe { process_env::set_var(&name, v) },
                None => unsafe { process_env::remove_var(&name) },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_var() {
        let mut env = Env::new();
        env.insert("BOARD", EnvValue::single("nrf52dk"));
        let mut warnings = Vec::new();
        let out = expand_vars("$(BOARD_DIR)/$(BOARD)_defconfig", &env, &mut warnings);
        assert_eq!(out, "/nrf52dk_defconfig");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].name, "BOARD_DIR");
    }

    #[test]
    fn from_raw_splits_alternatives() {
        let v = EnvValue::from_raw("arm?arm64");
        assert_eq!(v.first_non_empty(), "arm");
    }

    #[test]
    fn empty_first_alternative_falls_through() {
        let v = EnvValue::Alternatives(vec![String::new(), "fallback".into()]);
        assert_eq!(v.first_non_empty(), "fallback");
    }
}
