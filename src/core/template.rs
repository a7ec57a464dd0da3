//! Placeholder expansion over configuration trees.
//!
//! Two placeholder forms are recognized, both naming a dotted path into the
//! context: `<<props.targetPath>>` and `<%= props.targetPath %>`. Expansion is
//! a single textual pass; substituted text is never scanned again.

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::config::get_path;
use crate::error::{Error, Result};

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"<<\s*([^<>]+?)\s*>>|<%=\s*(.+?)\s*%>").expect("placeholder pattern is valid")
    })
}

/// Expand every string in `tree` against `context`, returning a new tree.
pub fn expand(tree: &Value, context: &Value) -> Result<Value> {
    match tree {
        Value::Object(map) => {
            let mut expanded = Map::with_capacity(map.len());
            for (key, value) in map {
                expanded.insert(key.clone(), expand(value, context)?);
            }
            Ok(Value::Object(expanded))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| expand(item, context))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::String(s) => expand_str(s, context).map(Value::String),
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(tree.clone()),
    }
}

/// Expand the placeholders of a single string.
pub fn expand_str(template: &str, context: &Value) -> Result<String> {
    if !has_placeholders(template) {
        return Ok(template.to_string());
    }

    let mut output = String::with_capacity(template.len());
    let mut last = 0;

    for caps in placeholder_pattern().captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let path = captured_path(&caps);

        let value = get_path(context, path)
            .ok_or_else(|| Error::template_unresolved(path, whole.as_str()))?;

        output.push_str(&template[last..whole.start()]);
        output.push_str(&render_value(value));
        last = whole.end();
    }

    output.push_str(&template[last..]);
    Ok(output)
}

pub fn has_placeholders(s: &str) -> bool {
    placeholder_pattern().is_match(s)
}

/// First placeholder still present anywhere in `tree`, as `(path, expression)`.
pub fn find_placeholder(tree: &Value) -> Option<(String, String)> {
    match tree {
        Value::Object(map) => map.values().find_map(find_placeholder),
        Value::Array(items) => items.iter().find_map(find_placeholder),
        Value::String(s) => placeholder_pattern()
            .captures(s)
            .and_then(|caps| Some((captured_path(&caps).to_string(), caps.get(0)?.as_str().to_string()))),
        Value::Null | Value::Bool(_) | Value::Number(_) => None,
    }
}

fn captured_path<'t>(caps: &Captures<'t>) -> &'t str {
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim())
        .unwrap_or_default()
}

/// Text form of a resolved value: strings verbatim, null as empty,
/// containers as compact JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_dotted_path() {
        let tree = json!({"a": "<<foo.bar>>"});
        let context = json!({"foo": {"bar": "X"}});

        assert_eq!(expand(&tree, &context).unwrap(), json!({"a": "X"}));
    }

    #[test]
    fn missing_path_is_an_error() {
        let err = expand(&json!({"a": "<<missing.path>>"}), &json!({})).unwrap_err();

        assert_eq!(err.code.as_str(), "template.unresolved");
        assert_eq!(err.details["path"], "missing.path");
    }

    #[test]
    fn tree_without_placeholders_is_copied() {
        let tree = json!({
            "clean": ["dist/*.css", "dist/*.js"],
            "level": 9,
            "enabled": true,
            "nothing": null,
            "nested": {"text": "plain < text > here"}
        });

        assert_eq!(expand(&tree, &json!({})).unwrap(), tree);
    }

    #[test]
    fn erb_style_placeholders_are_expanded() {
        let context = json!({"props": {"targetPath": "dist", "buildId": 42}});

        let out = expand_str("<%= props.targetPath %>/styles.<%= props.buildId %>.css", &context)
            .unwrap();
        assert_eq!(out, "dist/styles.42.css");
    }

    #[test]
    fn non_string_values_are_coerced_to_text() {
        let context = json!({"n": 7, "flag": false, "empty": null, "list": [1, 2]});

        assert_eq!(expand_str("n=<<n>>", &context).unwrap(), "n=7");
        assert_eq!(expand_str("<<flag>>", &context).unwrap(), "false");
        assert_eq!(expand_str("[<<empty>>]", &context).unwrap(), "[]");
        assert_eq!(expand_str("<<list>>", &context).unwrap(), "[1,2]");
    }

    #[test]
    fn expansion_is_single_pass() {
        let context = json!({"a": "<<b>>", "b": "never"});

        assert_eq!(expand_str("<<a>>", &context).unwrap(), "<<b>>");
    }

    #[test]
    fn sequence_index_segments_resolve() {
        let context = json!({"hosts": ["one", "two"]});
        assert_eq!(expand_str("<< hosts.1 >>", &context).unwrap(), "two");
    }

    #[test]
    fn expansion_is_idempotent_once_resolved() {
        let tree = json!({"path": "<<dir>>/out"});
        let context = json!({"dir": "dist"});

        let once = expand(&tree, &context).unwrap();
        let twice = expand(&once, &context).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn find_placeholder_reports_leftover_marker() {
        let tree = json!({"sftp": {"deploy": {"files": ["ok", "<%= props.targetPath %>/current.tgz"]}}});

        assert_eq!(
            find_placeholder(&tree),
            Some(("props.targetPath".to_string(), "<%= props.targetPath %>".to_string()))
        );
        assert_eq!(find_placeholder(&json!({"a": ["plain", 1, null]})), None);
    }
}
