//! Lenient decoders for API fields whose JSON type varies between endpoints.

use std::collections::BTreeMap;

use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

/// `null` decodes to the type's default instead of failing.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Server ids arrive as numbers or strings; state keeps them as decimal strings.
pub fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => match (n.as_u64(), n.as_i64(), n.as_f64()) {
            (Some(u), _, _) => Ok(u.to_string()),
            (_, Some(i), _) => Ok(i.to_string()),
            (_, _, Some(f)) if f.fract() == 0.0 => Ok(format!("{}", f as i64)),
            _ => Err(de::Error::custom(format!("expected an integer id, got {}", n))),
        },
        other => Err(de::Error::custom(format!("expected an id, got {}", other))),
    }
}

/// Integers that some endpoints send as numeric strings.
pub fn int_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| de::Error::custom(format!("expected an integer, got {}", n))),
        Value::String(s) if s.trim().is_empty() => Ok(0),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("expected an integer, got {:?}", s))),
        other => Err(de::Error::custom(format!(
            "expected an integer, got {}",
            other
        ))),
    }
}

/// Renders any scalar JSON value as the string a user would have written.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A single scalar of any JSON type, stringified.
pub fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(|value| stringify(&value))
}

/// Object of mixed scalar values, stringified.
pub fn string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(map.iter().map(|(k, v)| (k.clone(), stringify(v))).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(deserialize_with = "id_string")]
        id: String,
        #[serde(default, deserialize_with = "int_or_string")]
        port: i64,
        #[serde(default, deserialize_with = "nullable")]
        name: String,
        #[serde(default, deserialize_with = "string_map")]
        args: BTreeMap<String, String>,
    }

    #[test]
    fn decodes_mixed_types() {
        let sample: Sample = serde_json::from_value(json!({
            "id": 1234.0,
            "port": "8080",
            "name": null,
            "args": {"max_model_len": 4096, "dtype": "half", "trust": true, "temp": 0.5}
        }))
        .unwrap();
        assert_eq!(sample.id, "1234");
        assert_eq!(sample.port, 8080);
        assert_eq!(sample.name, "");
        assert_eq!(sample.args["max_model_len"], "4096");
        assert_eq!(sample.args["dtype"], "half");
        assert_eq!(sample.args["trust"], "true");
        assert_eq!(sample.args["temp"], "0.5");
    }

    #[test]
    fn rejects_garbage_integers() {
        let err = serde_json::from_value::<Sample>(json!({"id": "1", "port": "eighty"}));
        assert!(err.unwrap_err().to_string().contains("eighty"));
    }
}
