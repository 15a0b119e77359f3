//! Cache key derivation

use std::fmt::{self, Debug, Display};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::domain::llm::Message;
use crate::domain::CacheError;

/// Length of a hex-encoded SHA-256 digest
pub const CACHE_KEY_LEN: usize = 64;

/// Fingerprint identifying a request's slot in the exact store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Parses a hex digest, as printed by `Display`
    pub fn from_hex(hex_digest: impl Into<String>) -> Result<Self, CacheError> {
        let hex_digest = hex_digest.into().to_ascii_lowercase();

        if hex_digest.len() != CACHE_KEY_LEN || hex::decode(&hex_digest).is_err() {
            return Err(CacheError::invalid_request(format!(
                "Cache key must be {} hex characters, got '{}'",
                CACHE_KEY_LEN, hex_digest
            )));
        }

        Ok(Self(hex_digest))
    }

    fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The identifying material of one backend request
///
/// Only read by the cache; `extras` carries any auxiliary parameter that
/// affects the output (temperature, max tokens, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMaterial {
    model: String,
    messages: Vec<Message>,
    #[serde(default, deserialize_with = "deserialize_extras")]
    extras: Map<String, Value>,
}

fn deserialize_extras<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let extras: Option<Map<String, Value>> = Option::deserialize(deserializer)?;
    Ok(extras.unwrap_or_default())
}

impl RequestMaterial {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            extras: Map::new(),
        }
    }

    /// Replaces the extras with any value serializing to a JSON object
    ///
    /// `null` (e.g. `None`) is accepted as the empty mapping.
    pub fn with_extras<T: Serialize + ?Sized>(mut self, extras: &T) -> Result<Self, CacheError> {
        let value = serde_json::to_value(extras).map_err(|e| {
            CacheError::invalid_request(format!("Extras are not serializable: {}", e))
        })?;

        self.extras = match value {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(CacheError::invalid_request(format!(
                    "Extras must serialize to an object, got {}",
                    json_type_name(&other)
                )));
            }
        };

        Ok(self)
    }

    /// Adds a single extra parameter
    pub fn with_extra<T: Serialize + ?Sized>(
        mut self,
        name: impl Into<String>,
        value: &T,
    ) -> Result<Self, CacheError> {
        let name = name.into();
        let value = serde_json::to_value(value).map_err(|e| {
            CacheError::invalid_request(format!("Extra '{}' is not serializable: {}", name, e))
        })?;

        self.extras.insert(name, value);
        Ok(self)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn extras(&self) -> &Map<String, Value> {
        &self.extras
    }

    /// Canonical text of `{model, messages, extras}`
    pub fn canonical_json(&self) -> Result<String, CacheError> {
        let messages = serde_json::to_value(&self.messages).map_err(|e| {
            CacheError::invalid_request(format!("Messages are not serializable: {}", e))
        })?;

        let mut composite = Map::new();
        composite.insert("model".to_string(), Value::String(self.model.clone()));
        composite.insert("messages".to_string(), messages);
        composite.insert("extras".to_string(), Value::Object(self.extras.clone()));

        Ok(canonical_json(&Value::Object(composite)))
    }
}

/// Serializes a JSON value with object keys sorted at every depth and no
/// whitespace, so equal structures always produce byte-identical text.
///
/// Non-ASCII characters are written verbatim as UTF-8. Floats use the
/// shortest round-trip digits with Python's `repr` layout (`1.0`, `1e-07`,
/// `1e+16`) so keys match other implementations of the same scheme.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Number(number) => match number.as_f64() {
            Some(float) if number.is_f64() => out.push_str(&format_float(float)),
            _ => out.push_str(&number.to_string()),
        },
        leaf => out.push_str(&leaf.to_string()),
    }
}

/// Formats a finite float the way Python's `float.__repr__` does
fn format_float(value: f64) -> String {
    // `{:e}` yields the shortest round-trip digits, e.g. "-1.5e-7"
    let scientific = format!("{:e}", value);
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let point = exponent + 1;

    let body = if point <= -4 || point > 16 {
        let (head, tail) = digits.split_at(1);
        let fraction = if tail.is_empty() {
            String::new()
        } else {
            format!(".{}", tail)
        };
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        format!("{}{}e{}{:02}", head, fraction, exp_sign, exponent.unsigned_abs())
    } else if point <= 0 {
        format!("0.{}{}", "0".repeat(point.unsigned_abs() as usize), digits)
    } else {
        let point = point as usize;
        if point < digits.len() {
            format!("{}.{}", &digits[..point], &digits[point..])
        } else {
            format!("{}{}.0", digits, "0".repeat(point - digits.len()))
        }
    };

    format!("{}{}", sign, body)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Strategy for turning request material into a cache key
pub trait CacheKeyDeriver: Send + Sync + Debug {
    fn derive_key(&self, request: &RequestMaterial) -> Result<CacheKey, CacheError>;
}

/// SHA-256 over the canonical JSON of the request material
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256KeyDeriver;

impl Sha256KeyDeriver {
    pub fn new() -> Self {
        Self
    }
}

impl CacheKeyDeriver for Sha256KeyDeriver {
    fn derive_key(&self, request: &RequestMaterial) -> Result<CacheKey, CacheError> {
        let canonical = request.canonical_json()?;
        let digest = Sha256::digest(canonical.as_bytes());
        Ok(CacheKey::from_digest(&digest))
    }
}

/// Derives the default key for `(model, messages, extras)`
pub fn derive_key<T: Serialize + ?Sized>(
    model: &str,
    messages: &[Message],
    extras: &T,
) -> Result<CacheKey, CacheError> {
    let request = RequestMaterial::new(model, messages.to_vec()).with_extras(extras)?;
    Sha256KeyDeriver.derive_key(&request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn hello_request() -> RequestMaterial {
        RequestMaterial::new("m", vec![Message::user("hello")])
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let request = hello_request();
        assert_eq!(
            request.canonical_json().unwrap(),
            r#"{"extras":{},"messages":[{"content":"hello","role":"user"}],"model":"m"}"#
        );
    }

    #[test]
    fn test_known_digest() {
        let key = Sha256KeyDeriver.derive_key(&hello_request()).unwrap();
        assert_eq!(
            key.as_str(),
            "d3a2986197b67b12a30e9d1eefbc1776effa87a971d69fac83c52e262e3a3f57"
        );
    }

    #[test]
    fn test_known_digest_with_extras_and_unicode() {
        let key = derive_key(
            "m",
            &[Message::user("привет")],
            &json!({"temperature": 0.5, "max_tokens": 600}),
        )
        .unwrap();

        assert_eq!(
            key.as_str(),
            "00d58544b7fb4e2e9c026e1515b3fa2375923e177bcfe3cceabbff1571db9740"
        );
    }

    #[test]
    fn test_known_digest_with_float_extras() {
        let request = hello_request()
            .with_extras(&json!({
                "x": 1e-7, "y": 1e16, "z": 1.0, "w": 0.0001,
                "v": 1.5e-5, "u": -2.5e300, "t": 1e15
            }))
            .unwrap();

        assert_eq!(
            request.canonical_json().unwrap(),
            concat!(
                r#"{"extras":{"t":1000000000000000.0,"u":-2.5e+300,"v":1.5e-05,"w":0.0001,"#,
                r#""x":1e-07,"y":1e+16,"z":1.0},"#,
                r#""messages":[{"content":"hello","role":"user"}],"model":"m"}"#
            )
        );
        assert_eq!(
            Sha256KeyDeriver.derive_key(&request).unwrap().as_str(),
            "87c89c806e51af5317bc9e3559b2c8c3c67cba36da2eada92b683f1cb057e9c4"
        );
    }

    #[test]
    fn test_float_formatting() {
        let cases = [
            (0.0, "0.0"),
            (-0.0, "-0.0"),
            (0.1, "0.1"),
            (123.456, "123.456"),
            (1e22, "1e+22"),
            (5e-324, "5e-324"),
            (1.7976931348623157e308, "1.7976931348623157e+308"),
        ];

        for (value, expected) in cases {
            assert_eq!(format_float(value), expected);
        }
    }

    #[test]
    fn test_known_digest_with_custom_role() {
        let request: RequestMaterial = serde_json::from_value(json!({
            "model": "m",
            "messages": [
                {"role": "developer", "content": "Be terse"},
                {"role": "user", "content": "hello"}
            ]
        }))
        .unwrap();

        assert_eq!(
            Sha256KeyDeriver.derive_key(&request).unwrap().as_str(),
            "b7199e2e91e2e60e2b847b4053c55cd380f824bc197945b434bbeb664f290027"
        );
    }

    #[test]
    fn test_extras_order_does_not_matter() {
        let mut forward = HashMap::new();
        let mut backward = HashMap::new();
        let params = [("temperature", json!(0.5)), ("max_tokens", json!(600)), ("top_p", json!(1))];

        for (name, value) in params.iter() {
            forward.insert(name.to_string(), value.clone());
        }
        for (name, value) in params.iter().rev() {
            backward.insert(name.to_string(), value.clone());
        }

        let a = derive_key("m", &[Message::user("hello")], &forward).unwrap();
        let b = derive_key("m", &[Message::user("hello")], &backward).unwrap();
        let c = derive_key(
            "m",
            &[Message::user("hello")],
            &json!({"top_p": 1, "max_tokens": 600, "temperature": 0.5}),
        )
        .unwrap();

        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_nested_extras_are_canonicalized() {
        let a = derive_key("m", &[], &json!({"opts": {"b": 1, "a": [{"y": 2, "x": 1}]}})).unwrap();
        let b = derive_key("m", &[], &json!({"opts": {"a": [{"x": 1, "y": 2}], "b": 1}})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_extras_equal_empty_extras() {
        let none = derive_key("m", &[Message::user("hello")], &None::<()>).unwrap();
        let empty = derive_key("m", &[Message::user("hello")], &json!({})).unwrap();
        assert_eq!(none, empty);
    }

    #[test]
    fn test_message_order_matters() {
        let a = derive_key("m", &[Message::user("a"), Message::user("b")], &json!({})).unwrap();
        let b = derive_key("m", &[Message::user("b"), Message::user("a")], &json!({})).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_model_changes_key() {
        let a = derive_key("model-a", &[Message::user("hello")], &json!({})).unwrap();
        let b = derive_key("model-b", &[Message::user("hello")], &json!({})).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_non_object_extras_rejected() {
        let result = hello_request().with_extras(&json!([1, 2, 3]));
        assert!(matches!(
            result,
            Err(CacheError::InvalidRequestMaterial { .. })
        ));
    }

    #[test]
    fn test_non_string_map_keys_rejected() {
        let mut extras = HashMap::new();
        extras.insert(vec![1u8], 1);

        let result = hello_request().with_extras(&extras);
        assert!(matches!(
            result,
            Err(CacheError::InvalidRequestMaterial { .. })
        ));
    }

    #[test]
    fn test_with_extra() {
        let request = hello_request()
            .with_extra("temperature", &0.5)
            .unwrap();

        assert_eq!(request.extras().get("temperature"), Some(&json!(0.5)));
    }

    #[test]
    fn test_request_material_from_json() {
        let request: RequestMaterial = serde_json::from_value(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hello"}],
            "extras": null
        }))
        .unwrap();

        assert_eq!(request, hello_request());
    }

    #[test]
    fn test_cache_key_from_hex() {
        let key = Sha256KeyDeriver.derive_key(&hello_request()).unwrap();
        let parsed = CacheKey::from_hex(key.as_str().to_uppercase()).unwrap();
        assert_eq!(parsed, key);

        assert!(CacheKey::from_hex("abc").is_err());
        assert!(CacheKey::from_hex("z".repeat(CACHE_KEY_LEN)).is_err());
    }
}
