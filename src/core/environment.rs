//! Injected snapshot of process environment variables.
//!
//! Nothing in the resolver reads `std::env` directly. The CLI captures the
//! process environment once and passes it down, tests build one from pairs.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current process environment. Non-UTF-8 entries are skipped.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// First variable in `names` (priority order) holding a non-empty value.
    /// Returns the variable name together with its value.
    pub fn first_non_empty<'a, S: AsRef<str>>(&'a self, names: &'a [S]) -> Option<(&'a str, &'a str)> {
        names.iter().find_map(|name| {
            let name = name.as_ref();
            self.get(name)
                .filter(|value| !value.is_empty())
                .map(|value| (name, value))
        })
    }

    pub fn home(&self) -> Option<&str> {
        self.get("HOME").or_else(|| self.get("USERPROFILE"))
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.vars
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect::<Map<String, Value>>(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_non_empty_respects_priority_order() {
        let env = Environment::from_pairs([("CONTEXT", "Staging"), ("TYPO3_CONTEXT", "Development")]);

        let found = env.first_non_empty(&["ENVIRONMENT", "CONTEXT", "TYPO3_CONTEXT"]);
        assert_eq!(found, Some(("CONTEXT", "Staging")));
    }

    #[test]
    fn first_non_empty_skips_empty_values() {
        let env = Environment::from_pairs([("ENVIRONMENT", ""), ("TYPO3_CONTEXT", "Development")]);

        let found = env.first_non_empty(&["ENVIRONMENT", "CONTEXT", "TYPO3_CONTEXT"]);
        assert_eq!(found, Some(("TYPO3_CONTEXT", "Development")));
    }

    #[test]
    fn first_non_empty_none_when_nothing_set() {
        let env = Environment::new();
        assert_eq!(env.first_non_empty(&["BUILD_NUMBER"]), None);
    }

    #[test]
    fn to_value_contains_every_variable() {
        let env = Environment::from_pairs([("A", "1"), ("B", "two")]);
        let value = env.to_value();
        assert_eq!(value["A"], "1");
        assert_eq!(value["B"], "two");
        assert_eq!(value.as_object().map(|m| m.len()), Some(2));
    }
}
