//! Flattening of nested documents into path-keyed leaves.

use std::collections::BTreeMap;

use serde_yaml::Value;

use crate::store::keypath;

/// How sequence elements are named in the flattened path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ListIndex {
    /// `/servers/0`, `/servers/1`, ...
    #[default]
    Positional,
    /// `/servers/<value of field>`, falling back to the position when the
    /// element has no such scalar field.
    NameField(String),
}

/// Walks `value` and returns every scalar leaf keyed by its absolute path.
pub fn flatten(value: &Value, list_index: &ListIndex) -> BTreeMap<String, String> {
    let mut leaves = BTreeMap::new();
    walk(value, "/", list_index, &mut leaves);
    leaves
}

fn walk(
    node: &Value,
    path: &str,
    list_index: &ListIndex,
    leaves: &mut BTreeMap<String, String>,
) {
    match node {
        Value::Mapping(map) => {
            for (key, child) in map {
                if let Some(segment) = scalar_to_string(key) {
                    walk(child, &keypath::join(&[path, segment.as_str()]), list_index, leaves);
                }
            }
        }
        Value::Sequence(items) => {
            for (position, child) in items.iter().enumerate() {
                let segment = element_name(child, position, list_index);
                walk(child, &keypath::join(&[path, segment.as_str()]), list_index, leaves);
            }
        }
        Value::Tagged(tagged) => walk(&tagged.value, path, list_index, leaves),
        scalar => {
            if let Some(value) = scalar_to_string(scalar) {
                leaves.insert(path.to_string(), value);
            }
        }
    }
}

fn element_name(element: &Value, position: usize, list_index: &ListIndex) -> String {
    if let ListIndex::NameField(field) = list_index {
        if let Some(name) = element.get(field.as_str()).and_then(scalar_to_string) {
            if !name.is_empty() {
                return name;
            }
        }
    }
    position.to_string()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_flatten_nested_maps() {
        let doc = parse(
            r#"
database:
  host: db.local
  port: 5432
  tls: true
"#,
        );

        let leaves = flatten(&doc, &ListIndex::Positional);
        assert_eq!(leaves.get("/database/host").unwrap(), "db.local");
        assert_eq!(leaves.get("/database/port").unwrap(), "5432");
        assert_eq!(leaves.get("/database/tls").unwrap(), "true");
        assert_eq!(leaves.len(), 3);
    }

    #[test]
    fn test_flatten_positional_lists() {
        let doc = parse(
            r#"
upstreams:
  - 10.0.0.1
  - 10.0.0.2
"#,
        );

        let leaves = flatten(&doc, &ListIndex::Positional);
        assert_eq!(leaves.get("/upstreams/0").unwrap(), "10.0.0.1");
        assert_eq!(leaves.get("/upstreams/1").unwrap(), "10.0.0.2");
    }

    #[test]
    fn test_flatten_named_lists() {
        let doc = parse(
            r#"
servers:
  - name: web
    port: 80
  - port: 9000
"#,
        );

        let leaves = flatten(&doc, &ListIndex::NameField("name".to_string()));
        assert_eq!(leaves.get("/servers/web/port").unwrap(), "80");
        assert_eq!(leaves.get("/servers/web/name").unwrap(), "web");
        assert_eq!(leaves.get("/servers/1/port").unwrap(), "9000");
    }

    #[test]
    fn test_flatten_scalars() {
        let doc = parse(
            r#"
ratio: 0.5
empty: ~
"#,
        );

        let leaves = flatten(&doc, &ListIndex::Positional);
        assert_eq!(leaves.get("/ratio").unwrap(), "0.5");
        assert_eq!(leaves.get("/empty").unwrap(), "");
    }

    #[test]
    fn test_flatten_top_level_scalar() {
        let leaves = flatten(&Value::String("solo".to_string()), &ListIndex::Positional);
        assert_eq!(leaves.get("/").unwrap(), "solo");
    }
}
