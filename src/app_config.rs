use crate::domain::device_profile::{DeviceProfile, ProfileError};
use config::{Config, ConfigError};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    core: Core,
    platform: Platform,
    #[serde(default)]
    history: History,
    devices: Vec<DeviceProfile>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config: AppConfig = Config::builder()
            .add_source(config::File::with_name("config").required(true))
            .add_source(config::File::with_name("config_local").required(false))
            .add_source(config::Environment::with_prefix("COLDWATCH").separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate().map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ProfileError> {
        let mut seen = HashSet::new();
        for profile in &self.devices {
            profile.validate()?;
            if !seen.insert(profile.id.as_str()) {
                return Err(ProfileError::Duplicate(profile.id.clone()));
            }
        }
        Ok(())
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn devices(&self) -> &[DeviceProfile] {
        &self.devices
    }
}

#[derive(Debug, Deserialize)]
pub struct Core {
    queue_buffer_size: usize,
}

impl Core {
    pub fn queue_buffer_size(&self) -> usize {
        self.queue_buffer_size
    }
}

#[derive(Debug, Deserialize)]
pub struct Platform {
    url: String,
    ws_url: String,
    username: String,
    password: String,
    #[serde(default, with = "humantime_serde")]
    request_timeout: Option<Duration>,
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    connect_timeout: Duration,
    #[serde(default)]
    connect_retries: usize,
    #[serde(default = "default_retry_ms")]
    retry_ms: u64,
}

fn default_retry_ms() -> u64 {
    500
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Platform {
    pub fn url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    pub fn ws_url(&self) -> &str {
        self.ws_url.trim_end_matches('/')
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn connect_retries(&self) -> usize {
        self.connect_retries
    }

    pub fn retry_ms(&self) -> u64 {
        self.retry_ms
    }
}

#[derive(Debug, Deserialize)]
pub struct History {
    #[serde(with = "humantime_serde")]
    window: Duration,
}

impl History {
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for History {
    fn default() -> Self {
        History {
            window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[cfg(test)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

#[cfg(test)]
impl AppConfigBuilder {
    pub fn new() -> Self {
        AppConfigBuilder {
            config: AppConfig {
                core: Core { queue_buffer_size: 16 },
                platform: Platform {
                    url: "https://platform.url".to_string(),
                    ws_url: "wss://platform.url".to_string(),
                    username: "operator@coldwatch.local".to_string(),
                    password: "secret".to_string(),
                    request_timeout: None,
                    connect_timeout: Duration::from_secs(2),
                    connect_retries: 0,
                    retry_ms: 10,
                },
                history: History::default(),
                devices: vec![crate::domain::device_profile::warehouse_profile()],
            },
        }
    }

    pub fn platform_url(mut self, url: String) -> Self {
        self.config.platform.url = url;
        self
    }

    pub fn ws_url(mut self, url: String) -> Self {
        self.config.platform.ws_url = url;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.platform.request_timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.platform.connect_timeout = timeout;
        self
    }

    pub fn connect_retries(mut self, retries: usize) -> Self {
        self.config.platform.connect_retries = retries;
        self
    }

    pub fn devices(mut self, devices: Vec<DeviceProfile>) -> Self {
        self.config.devices = devices;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}
