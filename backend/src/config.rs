//! # Configuration
//!
//! All settings are read once at startup into [`Config`] and passed down
//! explicitly. Nothing below `main` touches the process environment.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_DATABASE_URL: &str = "sqlite:reminders.db";
const DEFAULT_CRON_BASE_URL: &str = "https://api.cron-job.org";
const DEFAULT_VOICE_BASE_URL: &str = "https://api.elevenlabs.io";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),
    #[error("{var} has an invalid value: {value}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    /// Shared secret every /api request must present
    pub api_key: String,
    pub database_url: String,
    /// Externally reachable base URL of this server, used as the cron callback target
    pub public_base_url: String,
    pub cron: CronConfig,
    pub voice: VoiceConfig,
}

#[derive(Clone)]
pub struct CronConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Clone)]
pub struct VoiceConfig {
    pub api_key: String,
    pub agent_id: String,
    pub phone_number_id: String,
    pub base_url: String,
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &'static str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |var: &'static str| get(var).ok_or(ConfigError::Missing(var));
        let or_default = |var: &'static str, default: &str| get(var).unwrap_or_else(|| default.to_string());

        let host_raw = or_default("HOST", DEFAULT_HOST);
        let host: IpAddr = host_raw
            .parse()
            .map_err(|_| ConfigError::Invalid { var: "HOST", value: host_raw.clone() })?;

        let port = match get("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid { var: "PORT", value: raw })?,
            None => DEFAULT_PORT,
        };

        let public_base_url = required("PUBLIC_BASE_URL")?;
        if !public_base_url.starts_with("http://") && !public_base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                var: "PUBLIC_BASE_URL",
                value: public_base_url,
            });
        }

        Ok(Self {
            host,
            port,
            api_key: required("API_KEY")?,
            database_url: or_default("DATABASE_URL", DEFAULT_DATABASE_URL),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            cron: CronConfig {
                api_key: required("CRON_JOB_API_KEY")?,
                base_url: trim_url(or_default("CRON_JOB_BASE_URL", DEFAULT_CRON_BASE_URL)),
            },
            voice: VoiceConfig {
                api_key: required("ELEVENLABS_API_KEY")?,
                agent_id: required("ELEVENLABS_AGENT_ID")?,
                phone_number_id: required("ELEVENLABS_PHONE_NUMBER_ID")?,
                base_url: trim_url(or_default("ELEVENLABS_BASE_URL", DEFAULT_VOICE_BASE_URL)),
            },
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// URL the cron service calls to fire a reminder
    pub fn trigger_url(&self, reminder_id: i64) -> String {
        format!("{}/api/reminders/{}/trigger", self.public_base_url, reminder_id)
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

// Secrets stay out of logs
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("api_key", &"<redacted>")
            .field("database_url", &self.database_url)
            .field("public_base_url", &self.public_base_url)
            .field("cron", &self.cron)
            .field("voice", &self.voice)
            .finish()
    }
}

impl fmt::Debug for CronConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl fmt::Debug for VoiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceConfig")
            .field("api_key", &"<redacted>")
            .field("agent_id", &self.agent_id)
            .field("phone_number_id", &self.phone_number_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
impl Config {
    /// Configuration pointing both upstream services at test servers
    pub fn for_test(cron_base_url: &str, voice_base_url: &str) -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 0,
            api_key: "test-api-key".to_string(),
            database_url: "sqlite::memory:".to_string(),
            public_base_url: "https://bridge.example.com".to_string(),
            cron: CronConfig {
                api_key: "cron-key".to_string(),
                base_url: cron_base_url.trim_end_matches('/').to_string(),
            },
            voice: VoiceConfig {
                api_key: "voice-key".to_string(),
                agent_id: "agent_123".to_string(),
                phone_number_id: "phnum_456".to_string(),
                base_url: voice_base_url.trim_end_matches('/').to_string(),
            },
        }
    }
}
