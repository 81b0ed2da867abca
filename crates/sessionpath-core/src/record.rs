//! Record model: one parsed user-action event
//!
//! A [`Record`] is a map from field name to a typed [`FieldValue`]. Field
//! order carries no meaning; the map is kept sorted so that serialization is
//! deterministic and replaying the same input yields byte-identical output.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known field names
pub mod fields {
    pub const SESSION_ID: &str = "session_id";
    pub const TIME_TAG: &str = "time_tag";
    pub const ACTIVE_NAME: &str = "active_name";
    pub const IP: &str = "ip";
    pub const REQ_URL: &str = "req_url";
    pub const DEVICE_ID: &str = "device_id";
    pub const USER_ID: &str = "user_id";
    pub const PRODUCT_ID: &str = "product_id";
    pub const ORDER_ID: &str = "order_id";
    pub const ADDRESS: &str = "address";
    pub const ACTION_PATH: &str = "action_path";

    /// Fields that survive projection regardless of the retained field list
    pub const ALWAYS_RETAINED: [&str; 3] = [SESSION_ID, TIME_TAG, ACTIVE_NAME];
}

/// A typed field value
///
/// Variant order matters for untagged deserialization: integers must be
/// tried before floats so that `100` stays an `Integer`, and integers above
/// `i64::MAX` land in `Unsigned` rather than losing precision as a float.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    String(String),
    Array(Vec<FieldValue>),
    Object(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// Name of the variant, used in type mismatch errors
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Integer(_) => "integer",
            FieldValue::Unsigned(_) => "unsigned",
            FieldValue::Float(_) => "float",
            FieldValue::String(_) => "string",
            FieldValue::Array(_) => "array",
            FieldValue::Object(_) => "object",
        }
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Boolean(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Integer(i)
                } else if let Some(u) = n.as_u64() {
                    FieldValue::Unsigned(u)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => FieldValue::String(s),
            serde_json::Value::Array(items) => {
                FieldValue::Array(items.into_iter().map(FieldValue::from).collect())
            }
            serde_json::Value::Object(map) => FieldValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, FieldValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Unsigned(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

/// One parsed event: field name to typed value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a field, returning the previous value
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    /// Merge every entry of a JSON object into this record, overwriting
    /// fields that already exist
    pub fn merge_json_object(&mut self, object: serde_json::Map<String, serde_json::Value>) {
        for (name, value) in object {
            self.fields.insert(name, FieldValue::from(value));
        }
    }

    /// Keep only the named fields plus [`fields::ALWAYS_RETAINED`]
    pub fn project<S: AsRef<str>>(&mut self, retained: &[S]) {
        self.fields.retain(|name, _| {
            fields::ALWAYS_RETAINED.contains(&name.as_str())
                || retained.iter().any(|r| r.as_ref() == name)
        });
    }

    /// Required string field
    pub fn get_str(&self, name: &str) -> Result<&str> {
        match self.require(name)? {
            FieldValue::String(s) => Ok(s),
            other => Err(mismatch(name, "string", other)),
        }
    }

    /// Optional string field: absent or null is `None`, any other
    /// non-string value is still a type mismatch
    pub fn opt_str(&self, name: &str) -> Result<Option<&str>> {
        match self.fields.get(name) {
            None | Some(FieldValue::Null) => Ok(None),
            Some(FieldValue::String(s)) => Ok(Some(s)),
            Some(other) => Err(mismatch(name, "string", other)),
        }
    }

    /// Required integer field
    pub fn get_i64(&self, name: &str) -> Result<i64> {
        match self.require(name)? {
            FieldValue::Integer(i) => Ok(*i),
            other => Err(mismatch(name, "integer", other)),
        }
    }

    /// Required floating point field
    pub fn get_f64(&self, name: &str) -> Result<f64> {
        match self.require(name)? {
            FieldValue::Float(f) => Ok(*f),
            other => Err(mismatch(name, "float", other)),
        }
    }

    /// Required nested object field
    pub fn get_object(&self, name: &str) -> Result<&BTreeMap<String, FieldValue>> {
        match self.require(name)? {
            FieldValue::Object(map) => Ok(map),
            other => Err(mismatch(name, "object", other)),
        }
    }

    fn require(&self, name: &str) -> Result<&FieldValue> {
        self.fields
            .get(name)
            .ok_or_else(|| Error::MissingField(name.to_string()))
    }

    pub(crate) fn into_fields(self) -> BTreeMap<String, FieldValue> {
        self.fields
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

fn mismatch(field: &str, expected: &'static str, found: &FieldValue) -> Error {
    Error::TypeMismatch {
        field: field.to_string(),
        expected,
        found: found.type_name(),
    }
}

#[cfg(test)]
mod tests;
