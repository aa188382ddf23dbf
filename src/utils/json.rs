use serde_json::Value;

/// How an optional text field appeared in a PATCH body.
#[derive(Debug, PartialEq, Eq)]
pub enum NullableValue {
    Omitted,
    Null,
    String(String),
}

pub fn classify_nullable(value: Option<&Value>) -> Result<NullableValue, String> {
    match value {
        None => Ok(NullableValue::Omitted),
        Some(Value::Null) => Ok(NullableValue::Null),
        Some(Value::String(text)) => Ok(NullableValue::String(text.clone())),
        Some(other) => Err(format!("expected string or null, got {other}")),
    }
}
