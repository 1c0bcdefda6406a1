use serde::Deserialize;
use serde_json::Value;

#[allow(dead_code)]
#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttributeKv {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    pub last_update_ts: Option<i64>,
}
