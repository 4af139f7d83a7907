use std::collections::HashSet;
use std::io;

use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter, Serializer};
use serde_json::Value;

use crate::utils::JsonMap;

/// Bookkeeping fields of the source documents that never belong in a prompt.
pub const DEFAULT_IGNORE_KEYS: [&str; 7] = [
    "id",
    "fk_processo",
    "active",
    "order",
    "code",
    "created_at",
    "updated_at",
];

/// Set of object keys that [clean_json] removes at any nesting depth.
///
/// The default set is [DEFAULT_IGNORE_KEYS].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreKeys(HashSet<String>);

impl IgnoreKeys {
    pub fn new<I, S>(keys: I) -> Self
        where I: IntoIterator<Item=S>,
              S: Into<String> {
        Self(keys.into_iter().map(Into::into).collect())
    }

    /// An ignore set that keeps every key.
    pub fn none() -> Self {
        Self(HashSet::new())
    }

    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }
}

impl Default for IgnoreKeys {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORE_KEYS)
    }
}

/// `true` for the values that get pruned after cleaning: `null`, `""`, `[]` and `{}`.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[inline]
fn is_null_like(value: &Value) -> bool {
    matches!(value, Value::Null) || value.as_str() == Some("null")
}

/// Recursively removes ignored keys, nulls and empty branches from a JSON value.
///
/// Objects drop entries whose key is ignored, whose value is `null` or the string `"null"`, or whose
/// cleaned value is empty. Arrays drop elements whose cleaned value is empty and keep the order of the
/// rest. Scalars are returned as they are. The input is never modified.
///
/// # Example
/// ```
/// use serde_json::json;
/// use automgr::utils::json::{clean_json, IgnoreKeys};
///
/// let raw = json!({"id": 7, "titulo": "ETP", "itens": [{"code": 1}, {"nome": "x", "obs": "null"}]});
/// let cleaned = clean_json(&raw, &IgnoreKeys::default());
/// assert_eq!(cleaned, json!({"titulo": "ETP", "itens": [{"nome": "x"}]}));
/// ```
pub fn clean_json(value: &Value, ignore_keys: &IgnoreKeys) -> Value {
    match value {
        Value::Object(map) => {
            let cleaned: JsonMap = map
                .iter()
                .filter(|(key, inner)| !ignore_keys.contains(key) && !is_null_like(inner))
                .map(|(key, inner)| (key.clone(), clean_json(inner, ignore_keys)))
                .filter(|(_, inner)| !is_empty_value(inner))
                .collect();
            Value::Object(cleaned)
        }
        Value::Array(items) => {
            let cleaned = items
                .iter()
                .map(|item| clean_json(item, ignore_keys))
                .filter(|item| !is_empty_value(item))
                .collect();
            Value::Array(cleaned)
        }
        scalar => scalar.clone(),
    }
}

/// Plain text form of a value as it is substituted into a prompt.
///
/// Strings are not quoted, `null` becomes an empty string, other scalars use their JSON text and
/// nested structures are rendered as single-line JSON.
pub fn plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Object(_) | Value::Array(_) => render_structure(value, None),
        other => other.to_string(),
    }
}

/// Cleans `value` with the default [IgnoreKeys] and renders it for embedding in a prompt.
///
/// See [json_to_string_with].
pub fn json_to_string(value: &Value, indent: Option<usize>) -> String {
    json_to_string_with(value, indent, &IgnoreKeys::default())
}

/// Cleans `value` with `ignore_keys` and renders it for embedding in a prompt.
///
/// Objects and arrays are serialized as JSON with non-ASCII text kept literal, pretty-printed with
/// `indent` spaces, or on a single line with `", "` and `": "` separators when `indent` is `None` or zero. A structure that is empty after
/// cleaning renders as an empty string. Scalars use [plain_string].
///
/// # Example
/// ```
/// use serde_json::json;
/// use automgr::utils::json::json_to_string;
///
/// let content = json!({"id": 1, "descrição": "ok"});
/// assert_eq!(json_to_string(&content, Some(2)), "{\n  \"descrição\": \"ok\"\n}");
/// assert_eq!(json_to_string(&content, None), "{\"descrição\": \"ok\"}");
/// assert_eq!(json_to_string(&json!([{"id": 1}]), Some(2)), "");
/// ```
pub fn json_to_string_with(value: &Value, indent: Option<usize>, ignore_keys: &IgnoreKeys) -> String {
    let cleaned = clean_json(value, ignore_keys);
    match cleaned {
        Value::Object(_) | Value::Array(_) if is_empty_value(&cleaned) => String::new(),
        Value::Object(_) | Value::Array(_) => render_structure(&cleaned, indent),
        scalar => plain_string(&scalar),
    }
}

/// Single-line JSON with a space after every `,` and `:`.
struct SpacedCompactFormatter;

impl Formatter for SpacedCompactFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

fn serialize_with<F: Formatter>(value: &Value, formatter: F) -> Option<String> {
    let mut buffer = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer).ok()?;
    String::from_utf8(buffer).ok()
}

fn render_structure(value: &Value, indent: Option<usize>) -> String {
    let rendered = match indent {
        Some(width) if width > 0 => {
            let indent = " ".repeat(width);
            serialize_with(value, PrettyFormatter::with_indent(indent.as_bytes()))
        }
        _ => serialize_with(value, SpacedCompactFormatter),
    };
    rendered.unwrap_or_else(|| value.to_string())
}

#[cfg(test)]
mod test_json {
    use serde_json::{json, Value};

    use super::{clean_json, is_empty_value, json_to_string, json_to_string_with, plain_string, IgnoreKeys};

    fn clean(value: &Value) -> Value {
        clean_json(value, &IgnoreKeys::default())
    }

    #[test]
    fn test_ignore_keys_at_any_depth() {
        let raw = json!({
            "id": 1,
            "secoes": [{"fk_processo": 3, "titulo": "Objeto", "sub": {"created_at": "2024", "texto": "a"}}],
            "meta": {"active": true, "order": 2, "code": "X", "updated_at": "2024"}
        });
        let cleaned = clean(&raw);
        assert_eq!(cleaned, json!({"secoes": [{"titulo": "Objeto", "sub": {"texto": "a"}}]}));
    }

    #[test]
    fn test_null_and_empty_pruning() {
        let raw = json!({
            "a": null,
            "b": "null",
            "c": {},
            "d": [],
            "e": "",
            "f": {"only_id": {"id": 5}},
            "g": [null, "", {}, [[]]],
            "keep": 0,
            "flag": false
        });
        assert_eq!(clean(&raw), json!({"keep": 0, "flag": false}));
    }

    #[test]
    fn test_null_string_survives_inside_arrays() {
        let raw = json!(["null", null, "x"]);
        assert_eq!(clean(&raw), json!(["null", "x"]));
    }

    #[test]
    fn test_order_preservation() {
        let raw = json!([3, {"id": 1}, "b", null, 1, "a"]);
        assert_eq!(clean(&raw), json!([3, "b", 1, "a"]));

        let raw = json!({"z": 1, "id": 0, "a": 2, "m": 3});
        let keys: Vec<String> = clean(&raw).as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_idempotence() {
        let samples = [
            json!({"id": 1, "x": {"y": [null, {"code": 2}, {"z": "null"}]}, "w": ["null", ""]}),
            json!([[], [[]], [{"a": [{}]}], "s"]),
            json!("plain"),
            json!(null),
            json!(12.5),
        ];
        for sample in samples {
            let once = clean(&sample);
            assert_eq!(clean(&once), once);
        }
    }

    #[test]
    fn test_input_not_mutated() {
        let raw = json!({"id": 1, "a": null});
        let snapshot = raw.clone();
        let _ = clean(&raw);
        assert_eq!(raw, snapshot);
    }

    #[test]
    fn test_custom_ignore_keys() {
        let raw = json!({"id": 1, "secret": "x", "a": "b"});
        assert_eq!(clean_json(&raw, &IgnoreKeys::new(["secret"])), json!({"id": 1, "a": "b"}));
        assert_eq!(clean_json(&raw, &IgnoreKeys::none()), raw);
    }

    #[test]
    fn test_stringify_indent() {
        let content = json!({"a": 1, "id": 99, "b": [true]});
        assert_eq!(json_to_string(&content, Some(2)), "{\n  \"a\": 1,\n  \"b\": [\n    true\n  ]\n}");
        assert_eq!(json_to_string(&content, Some(4)), "{\n    \"a\": 1,\n    \"b\": [\n        true\n    ]\n}");
        assert_eq!(json_to_string(&content, None), "{\"a\": 1, \"b\": [true]}");
        assert_eq!(json_to_string(&content, Some(0)), "{\"a\": 1, \"b\": [true]}");
    }

    #[test]
    fn test_stringify_keeps_non_ascii() {
        let content = json!({"justificativa": "aquisição de serviços"});
        assert_eq!(json_to_string(&content, None), "{\"justificativa\": \"aquisição de serviços\"}");
    }

    #[test]
    fn test_single_line_separators() {
        let content = json!({"a": 1, "b": [true, "ç", {"c": [1, 2]}]});
        assert_eq!(json_to_string(&content, None), r#"{"a": 1, "b": [true, "ç", {"c": [1, 2]}]}"#);
        assert_eq!(json_to_string(&json!([{"x": "a, b: c"}]), None), r#"[{"x": "a, b: c"}]"#);
    }

    #[test]
    fn test_stringify_scalars_and_empties() {
        assert_eq!(json_to_string(&json!("texto livre"), Some(2)), "texto livre");
        assert_eq!(json_to_string(&json!(42), Some(2)), "42");
        assert_eq!(json_to_string(&json!(true), Some(2)), "true");
        assert_eq!(json_to_string(&json!(null), Some(2)), "");
        assert_eq!(json_to_string(&json!(""), Some(2)), "");
        assert_eq!(json_to_string(&json!([]), Some(2)), "");
        assert_eq!(json_to_string(&json!({"id": 1}), Some(2)), "");
    }

    #[test]
    fn test_stringify_is_deterministic() {
        let content = json!({"b": {"c": [1, 2]}, "a": "x"});
        assert_eq!(json_to_string(&content, Some(2)), json_to_string(&content, Some(2)));
    }

    #[test]
    fn test_stringify_with_custom_keys() {
        let content = json!({"id": 1, "nome": "n"});
        assert_eq!(json_to_string_with(&content, None, &IgnoreKeys::none()), "{\"id\": 1, \"nome\": \"n\"}");
    }

    #[test]
    fn test_plain_string() {
        assert_eq!(plain_string(&json!("ACME")), "ACME");
        assert_eq!(plain_string(&json!(2024)), "2024");
        assert_eq!(plain_string(&json!(1.5)), "1.5");
        assert_eq!(plain_string(&json!(false)), "false");
        assert_eq!(plain_string(&json!(null)), "");
        assert_eq!(plain_string(&json!({"a": [1, 2]})), "{\"a\": [1, 2]}");
    }

    #[test]
    fn test_is_empty_value() {
        assert!(is_empty_value(&json!(null)));
        assert!(is_empty_value(&json!("")));
        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!(" ")));
    }
}
