use std::fmt::{Debug, Formatter};

/// An authenticated session against the telemetry platform. Passed explicitly to every data-access call.
#[derive(Clone, PartialEq)]
pub struct Session {
    token: String,
    refresh_token: Option<String>,
}

impl Session {
    pub fn new(token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Session {
            token: token.into(),
            refresh_token,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("token", &"<redacted>").finish()
    }
}
