mod attributes;
mod auth;
mod client;
mod domain;
mod subscriber;
mod telemetry;

pub use auth::{current_user, login};
pub use client::{PlatformClient, PlatformError, new_client};
