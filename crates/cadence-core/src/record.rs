//! Persisted record shapes.
//!
//! A trigger persists as one JSON document. Checkers and actions nest inside it as
//! tagged objects whose `type` field selects the constructor in the type registry.

use std::collections::BTreeMap;

use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TriggerError, TriggerResult};
use crate::trigger::{TriggerId, TriggerStatus};

/// Key holding the type tag in every checker and action record.
pub const TYPE_KEY: &str = "type";

/// Serialized condition: checker records keyed by id plus the expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRecord {
    pub checkers: BTreeMap<String, Value>,
    pub expr: String,
}

/// Serialized trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRecord {
    #[serde(default)]
    pub trigger_id: Option<TriggerId>,
    pub source: String,
    pub submit_user: String,
    #[serde(with = "ts_milliseconds")]
    pub create_time: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub submit_time: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub last_modify_time: DateTime<Utc>,
    pub trigger_condition: ConditionRecord,
    pub expire_condition: ConditionRecord,
    #[serde(default)]
    pub actions: Vec<Value>,
    #[serde(default)]
    pub expire_actions: Vec<Value>,
    pub reset_on_trigger: bool,
    pub reset_on_expire: bool,
    pub status: TriggerStatus,
    #[serde(default)]
    pub info: BTreeMap<String, String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl TriggerRecord {
    pub fn to_json(&self) -> TriggerResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> TriggerResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| TriggerError::malformed(format!("trigger record: {e}")))
    }
}

/// Serialize `body` and stamp it with a type tag.
pub fn tagged<T: Serialize>(tag: &str, body: &T) -> TriggerResult<Value> {
    let mut value = serde_json::to_value(body)?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| TriggerError::malformed(format!("{tag} record must be an object")))?;
    object.insert(TYPE_KEY.to_string(), Value::String(tag.to_string()));
    Ok(value)
}

/// Read the type tag of a record.
pub fn type_tag(record: &Value) -> TriggerResult<&str> {
    record
        .get(TYPE_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| TriggerError::malformed("record has no type tag"))
}

/// Decode the body of a record after checking its tag.
pub fn decode<T: DeserializeOwned>(tag: &str, record: &Value) -> TriggerResult<T> {
    let found = type_tag(record)?;
    if found != tag {
        return Err(TriggerError::malformed(format!(
            "cannot build {tag} from a {found} record"
        )));
    }
    serde_json::from_value(record.clone())
        .map_err(|e| TriggerError::malformed(format!("{tag}: {e}")))
}
