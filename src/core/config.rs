use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::path::Path;

// ============================================================================
// YAML Document Loading
// ============================================================================

/// Load a YAML document whose root must be a mapping.
///
/// A missing or unreadable file is `config.load_failed`; a parse failure or a
/// non-mapping root is `config.invalid_yaml`. An empty document loads as an
/// empty mapping.
pub fn load_yaml_mapping(path: &Path) -> Result<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        let problem = if e.kind() == std::io::ErrorKind::NotFound {
            "file not found".to_string()
        } else {
            e.to_string()
        };
        Error::config_load_failed(path.display().to_string(), problem)
    })?;

    parse_yaml_mapping(&raw, &path.display().to_string())
}

/// Parse YAML text into a mapping. `origin` names the source in errors.
pub fn parse_yaml_mapping(raw: &str, origin: &str) -> Result<Map<String, Value>> {
    let value: Value = serde_yml::from_str(raw)
        .map_err(|e| Error::config_invalid_yaml(origin, e.to_string()))?;

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(Error::config_invalid_yaml(
            origin,
            format!("document root must be a mapping, found {}", value_type_name(&other)),
        )),
    }
}

pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

// ============================================================================
// Merge
// ============================================================================

/// Right-biased recursive merge.
///
/// Keys only in `target` are kept, keys in `source` win. Two mappings under
/// the same key are merged recursively; anything else (scalars, sequences,
/// mismatched kinds) is replaced wholesale by the source value. Neither input
/// is modified.
pub fn merge(target: &Value, source: &Value) -> Value {
    let mut merged = target.clone();
    deep_merge(&mut merged, source);
    merged
}

/// Same as [`merge`] for two mappings.
pub fn merge_maps(target: &Map<String, Value>, source: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = target.clone();
    for (key, value) in source {
        deep_merge(merged.entry(key.clone()).or_insert(Value::Null), value);
    }
    merged
}

fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_obj), Value::Object(patch_obj)) => {
            for (key, value) in patch_obj {
                match base_obj.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_obj.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

// ============================================================================
// Path Helpers
// ============================================================================

/// Look up a dotted path (`ssh.host`, `servers.0.name`) in a tree.
///
/// Segments index mappings by key and sequences by decimal position.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Non-empty string at a dotted path, if any.
pub fn get_str<'a>(root: &'a Value, path: &str) -> Option<&'a str> {
    get_path(root, path)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
