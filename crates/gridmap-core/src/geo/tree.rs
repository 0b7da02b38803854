use serde::Serialize;
use serde_json::{Map, Value};

/// Generic label/children node for tree inspectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub title: String,
    /// Path from the root, segments joined with `/`.
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

/// Flatten a JSON document into display nodes.
///
/// Objects and arrays become branches titled with their key (array indices
/// are keys too); scalars become leaves titled `"key: value"`. A scalar root
/// produces no nodes.
pub fn flatten_to_tree(value: &Value) -> Vec<TreeNode> {
    flatten_under(value, None)
}

fn flatten_under(value: &Value, prefix: Option<&str>) -> Vec<TreeNode> {
    let entries: Vec<(String, &Value)> = match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => return Vec::new(),
    };

    entries
        .into_iter()
        .map(|(key, child)| {
            let full_key = match prefix {
                Some(prefix) => format!("{prefix}/{key}"),
                None => key.clone(),
            };

            match child {
                Value::Object(_) | Value::Array(_) => TreeNode {
                    children: Some(flatten_under(child, Some(&full_key))),
                    title: key,
                    key: full_key,
                },
                scalar => TreeNode {
                    title: format!("{key}: {}", render_scalar(scalar)),
                    key: full_key,
                    children: None,
                },
            }
        })
        .collect()
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Undo the stringification map renderers apply to nested properties.
///
/// String values holding valid JSON are replaced by the parsed value; all
/// other values are kept as they are.
pub fn parse_feature_properties(properties: &Map<String, Value>) -> Map<String, Value> {
    properties
        .iter()
        .map(|(key, value)| {
            let parsed = match value {
                Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| value.clone()),
                other => other.clone(),
            };
            (key.clone(), parsed)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf(title: &str, key: &str) -> TreeNode {
        TreeNode {
            title: title.to_string(),
            key: key.to_string(),
            children: None,
        }
    }

    #[test]
    fn test_flatten_nested_document() {
        let doc = json!({
            "fruits": ["an apple", "a pear"],
            "trees": { "first": "Apple", "second": "Pear" }
        });

        let tree = flatten_to_tree(&doc);

        assert_eq!(
            tree,
            vec![
                TreeNode {
                    title: "fruits".into(),
                    key: "fruits".into(),
                    children: Some(vec![
                        leaf("0: an apple", "fruits/0"),
                        leaf("1: a pear", "fruits/1"),
                    ]),
                },
                TreeNode {
                    title: "trees".into(),
                    key: "trees".into(),
                    children: Some(vec![
                        leaf("first: Apple", "trees/first"),
                        leaf("second: Pear", "trees/second"),
                    ]),
                },
            ]
        );
    }

    #[test]
    fn test_flatten_scalars_and_nulls() {
        let tree = flatten_to_tree(&json!({ "a": { "b": { "c": null, "d": 1.5, "e": true } } }));
        let c = &tree[0].children.as_ref().unwrap()[0].children.as_ref().unwrap();
        assert_eq!(c[0], leaf("c: null", "a/b/c"));
        assert_eq!(c[1], leaf("d: 1.5", "a/b/d"));
        assert_eq!(c[2], leaf("e: true", "a/b/e"));
    }

    #[test]
    fn test_flatten_scalar_root_is_empty() {
        assert!(flatten_to_tree(&json!(3)).is_empty());
    }

    #[test]
    fn test_parse_feature_properties() {
        let mut props = Map::new();
        props.insert("fruits".into(), json!("{\"apple\": \"sun\"}"));
        props.insert("name".into(), json!("CabinCrk"));
        props.insert("base_kv".into(), json!(132.0));

        let parsed = parse_feature_properties(&props);

        assert_eq!(parsed["fruits"], json!({ "apple": "sun" }));
        assert_eq!(parsed["name"], json!("CabinCrk"));
        assert_eq!(parsed["base_kv"], json!(132.0));
    }
}
