use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};

/// The value carried by a single form field.
///
/// `Empty` is the state of a field nobody has filled yet and projects to `""`.
/// `Json` holds compound values (lists, objects) that the form treats opaquely.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum FieldValue {
    #[default]
    Empty,
    Null,
    Bool(bool),
    Number(Decimal),
    Text(String),
    Json(Value),
}

impl FieldValue {
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(flag),
            Value::Number(number) => match decimal_from_number(&number) {
                Some(decimal) => Self::Number(decimal),
                None => Self::Json(Value::Number(number)),
            },
            Value::String(text) if text.is_empty() => Self::Empty,
            Value::String(text) => Self::Text(text),
            compound @ (Value::Array(_) | Value::Object(_)) => Self::Json(compound),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Empty => Value::String(String::new()),
            Self::Null => Value::Null,
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Number(decimal) => number_from_decimal(decimal)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(decimal.to_string())),
            Self::Text(text) => Value::String(text.clone()),
            Self::Json(value) => value.clone(),
        }
    }

    /// Whether the value counts as "not filled in" for completion purposes.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty | Self::Null => true,
            Self::Bool(_) | Self::Number(_) => false,
            Self::Text(text) => text.trim().is_empty(),
            Self::Json(Value::Null) => true,
            Self::Json(Value::String(text)) => text.trim().is_empty(),
            Self::Json(Value::Array(items)) => items.is_empty(),
            Self::Json(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Empty => Some(""),
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Number(decimal) => Some(*decimal),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::Json(Value::Null))
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Null => f.write_str("null"),
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Number(decimal) => write!(f, "{decimal}"),
            Self::Text(text) => f.write_str(text),
            Self::Json(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            Self::Empty
        } else {
            Self::Text(value.to_string())
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        if value.is_empty() {
            Self::Empty
        } else {
            Self::Text(value)
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Number(Decimal::from(value))
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Number(Decimal::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Number(Decimal::from(value))
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::from_json(value)
    }
}

impl<T> From<Option<T>> for FieldValue
where
    T: Into<FieldValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_json)
    }
}

fn decimal_from_number(number: &Number) -> Option<Decimal> {
    if let Some(int) = number.as_i64() {
        return Some(Decimal::from(int));
    }
    if let Some(uint) = number.as_u64() {
        return Some(Decimal::from(uint));
    }
    let float = number.as_f64()?;
    if !float.is_finite() {
        return None;
    }
    Decimal::from_str(&number.to_string())
        .or_else(|_| Decimal::from_scientific(&number.to_string()))
        .ok()
}

fn number_from_decimal(decimal: &Decimal) -> Option<Number> {
    Number::from_str(&decimal.normalize().to_string()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_string_maps_to_empty_sentinel() {
        assert_eq!(FieldValue::from_json(json!("")), FieldValue::Empty);
        assert_eq!(FieldValue::Empty.to_json(), json!(""));
        assert_eq!(FieldValue::from(""), FieldValue::Empty);
    }

    #[test]
    fn numbers_become_decimals_and_project_back() {
        let value = FieldValue::from_json(json!(12.5));
        assert_eq!(value, FieldValue::Number(Decimal::new(125, 1)));
        assert_eq!(value.to_json(), json!(12.5));

        let int = FieldValue::from_json(json!(42));
        assert_eq!(int.to_json(), json!(42));
    }

    #[test]
    fn blank_detection_matches_completion_rules() {
        assert!(FieldValue::Empty.is_blank());
        assert!(FieldValue::Null.is_blank());
        assert!(FieldValue::from("   ").is_blank());
        assert!(FieldValue::Json(json!([])).is_blank());
        assert!(!FieldValue::Bool(false).is_blank());
        assert!(!FieldValue::from(0).is_blank());
        assert!(!FieldValue::Json(json!({"id": 1})).is_blank());
    }
}
