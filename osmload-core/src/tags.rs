//! JSON encoding for the `tags` text column.

use serde_json::{Map, Value};

use crate::Tags;

/// Encode tags as a compact JSON object.
///
/// Keys and values are escaped per the JSON string grammar; non-ASCII text is
/// emitted as UTF-8. An empty mapping yields `{}`.
///
/// # Examples
/// ```
/// use osmload_core::{Tags, encode_tags};
///
/// let tags = Tags::from([("amenity".into(), "cafe".into())]);
/// assert_eq!(encode_tags(&tags), r#"{"amenity":"cafe"}"#);
/// assert_eq!(encode_tags(&Tags::new()), "{}");
/// ```
#[must_use]
pub fn encode_tags(tags: &Tags) -> String {
    let object: Map<String, Value> = tags
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();
    // `Display` for `Value` writes compact JSON and cannot fail.
    Value::Object(object).to_string()
}
