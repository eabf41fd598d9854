use serde::Deserialize;
use serde_json::Value;

use super::ApiError;

/// One decoded response from a collection endpoint.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPage {
    Paged {
        records: Vec<Value>,
        #[serde(default)]
        next_token: Option<String>,
    },
    Bare(Vec<Value>),
}

/// Normalized page: records in provider order plus the continuation cursor, if any.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Page {
    pub records: Vec<Value>,
    pub next_token: Option<String>,
}

impl Page {
    /// Decode a `{records, next_token}` page or a bare array. A bare array is
    /// always the whole result; any other shape is rejected.
    pub(crate) fn decode(body: Value) -> Result<Self, ApiError> {
        let describe = shape_of(&body);
        match serde_json::from_value::<RawPage>(body) {
            Ok(RawPage::Paged {
                records,
                next_token,
            }) => Ok(Self {
                records,
                next_token: next_token.filter(|token| !token.is_empty()),
            }),
            Ok(RawPage::Bare(records)) => Ok(Self {
                records,
                next_token: None,
            }),
            Err(_) => Err(ApiError::UnexpectedShape(describe)),
        }
    }
}

fn shape_of(body: &Value) -> String {
    match body {
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).take(8).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
        Value::Array(_) => "array".into(),
        Value::String(_) => "string".into(),
        Value::Number(_) => "number".into(),
        Value::Bool(_) => "bool".into(),
        Value::Null => "null".into(),
    }
}
