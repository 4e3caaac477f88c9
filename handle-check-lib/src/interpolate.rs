//! Username substitution into URL and header templates.
//!
//! Templates mark the username position with `{}`. Header blocks may nest
//! objects and arrays, so substitution walks a `serde_json::Value` and only
//! rewrites string leaves.

use serde_json::Value;

/// Token replaced by the username in every template.
pub const PLACEHOLDER: &str = "{}";

/// Replace every placeholder in a template string.
pub fn interpolate_str(template: &str, username: &str) -> String {
    template.replace(PLACEHOLDER, username)
}

/// Replace every placeholder in a value, recursing into objects and arrays.
///
/// Object keys, numbers, booleans and nulls are returned unchanged.
pub fn interpolate(value: &Value, username: &str) -> Value {
    match value {
        Value::String(template) => Value::String(interpolate_str(template, username)),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, inner)| (key.clone(), interpolate(inner, username)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| interpolate(item, username)).collect())
        }
        scalar => scalar.clone(),
    }
}

/// Username as it is placed into URLs: spaces become `%20`.
pub fn url_username(username: &str) -> String {
    username.replace(' ', "%20")
}
