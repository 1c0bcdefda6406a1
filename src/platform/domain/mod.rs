mod attribute_kv;
mod auth;
mod ts_value;
mod ws_payload;

pub use attribute_kv::AttributeKv;
pub use auth::{LoginRequest, LoginResponse, User};
pub use ts_value::TsValue;
pub use ws_payload::{SubscriptionCommands, SubscriptionUpdate};
