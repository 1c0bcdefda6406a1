use serde::Deserialize;
use serde_json::Value;

// Entry of a timeseries response: `{ "<key>": [{ "ts": 1700000000000, "value": "..." }] }`
#[derive(Debug, Deserialize, PartialEq)]
pub struct TsValue {
    pub ts: i64,
    #[serde(default)]
    pub value: Value,
}
