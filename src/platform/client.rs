use crate::app_config::AppConfig;
use crate::domain::session::Session;
use reqwest::header::HeaderValue;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const AUTHORIZATION_HEADER: &str = "X-Authorization";

pub fn new_client(config: &AppConfig) -> Result<Client, PlatformError> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

    let mut builder = Client::builder().default_headers(headers);
    if let Some(timeout) = config.platform().request_timeout() {
        builder = builder.timeout(timeout);
    }

    Ok(builder.build()?)
}

/// Talks to the telemetry platform's REST and push APIs on behalf of the device views.
#[derive(Debug)]
pub struct PlatformClient {
    pub(super) client: Client,
    pub(super) config: Arc<AppConfig>,
    next_cmd_id: AtomicI64,
}

impl PlatformClient {
    pub fn new(client: Client, config: Arc<AppConfig>) -> Self {
        PlatformClient {
            client,
            config,
            next_cmd_id: AtomicI64::new(1),
        }
    }

    pub(super) fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.platform().url(), path)
    }

    pub(super) fn next_cmd_id(&self) -> i64 {
        self.next_cmd_id.fetch_add(1, Ordering::Relaxed)
    }
}

pub(crate) fn authorized(request: RequestBuilder, session: &Session) -> Result<RequestBuilder, PlatformError> {
    let mut value = HeaderValue::from_str(&session.authorization())?;
    value.set_sensitive(true);
    Ok(request.header(AUTHORIZATION_HEADER, value))
}

/// Maps non-success responses onto the error taxonomy: 401 is an authentication failure, anything else is kept with
/// its body for diagnostics.
pub(crate) async fn check_status(response: Response) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(PlatformError::Unauthorized);
    }

    let body = response.text().await.unwrap_or_else(|e| {
        warn!("⚠️ Unable to read the error response body: {}", e);
        String::new()
    });
    Err(PlatformError::Status { status, body })
}

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("platform client set an invalid header value: {0}")]
    InvalidHeaderValue(#[from] header::InvalidHeaderValue),
    #[error("not authenticated, log in again")]
    Unauthorized,
    #[error("platform responded with {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("push channel did not connect within {0:?}")]
    ConnectTimeout(Duration),
    #[error("push channel error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("subscription rejected with code {code}: {message}")]
    Subscription { code: i64, message: String },
}

impl PlatformError {
    pub fn is_unauthorized(&self) -> bool {
        match self {
            PlatformError::Unauthorized => true,
            PlatformError::Request(e) => e.status() == Some(StatusCode::UNAUTHORIZED),
            _ => false,
        }
    }
}
