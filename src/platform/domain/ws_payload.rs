use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionCommands {
    pub ts_sub_cmds: Vec<TsSubCmd>,
    pub history_cmds: Vec<Value>,
    pub attr_sub_cmds: Vec<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TsSubCmd {
    pub entity_type: String,
    pub entity_id: String,
    pub scope: String,
    pub cmd_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<String>,
}

impl SubscriptionCommands {
    pub fn latest_telemetry(device_id: &str, cmd_id: i64, keys: &[String]) -> Self {
        SubscriptionCommands {
            ts_sub_cmds: vec![TsSubCmd {
                entity_type: "DEVICE".to_string(),
                entity_id: device_id.to_string(),
                scope: "LATEST_TELEMETRY".to_string(),
                cmd_id,
                keys: (!keys.is_empty()).then(|| keys.join(",")),
            }],
            history_cmds: vec![],
            attr_sub_cmds: vec![],
        }
    }
}

// Inbound message: `{ "subscriptionId": 1, "errorCode": 0, "data": { "<key>": [[ts, value], ...] } }`, most recent
// entry first
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionUpdate {
    pub subscription_id: i64,
    #[serde(default)]
    pub error_code: i64,
    pub error_msg: Option<String>,
    #[serde(default)]
    pub data: BTreeMap<String, Vec<(i64, Value)>>,
}
