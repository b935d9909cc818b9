//! Daemon configuration parsed from environment variables

use anyhow::{anyhow, Result};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::bridge::BridgeSettings;
use crate::telegram::DEFAULT_API_URL;

/// Default socket path for the control socket
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/tierbridge.sock";

const DEFAULT_IDLE_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_EVICT_INTERVAL_SECS: u64 = 24 * 60 * 60;

#[derive(Clone)]
pub struct Config {
    pub b2_key_id: Option<String>,
    pub b2_key: Option<String>,
    pub b2_bucket: Option<String>,
    /// Share link base; derived from the B2 download URL when unset
    pub b2_public_url: Option<String>,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_api_url: String,
    pub db_path: PathBuf,
    pub inbox_root: String,
    pub sync_root: String,
    pub idle_secs: u64,
    pub evict_interval: Duration,
    /// `None` disables periodic sync
    pub sync_interval: Option<Duration>,
    pub socket_path: PathBuf,
}

/// Credentials for the primary store
pub struct B2Credentials<'a> {
    pub key_id: &'a str,
    pub key: &'a str,
    pub bucket: &'a str,
}

/// Credentials for the secondary store
pub struct TelegramCredentials<'a> {
    pub api_url: &'a str,
    pub token: &'a str,
    pub chat_id: &'a str,
}

impl Config {
    /// Parse configuration from environment variables
    ///
    /// Credentials are optional here so local commands (`list`, `help`)
    /// work without them; network commands call the `*_credentials`
    /// accessors, which fail on missing values.
    pub fn from_env() -> Self {
        let db_path = env::var("TIERBRIDGE_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_db_path());

        let idle_secs = env::var("TIERBRIDGE_IDLE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_IDLE_SECS);

        let evict_interval = env::var("TIERBRIDGE_EVICT_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|secs: &u64| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_EVICT_INTERVAL_SECS));

        let sync_interval = env::var("TIERBRIDGE_SYNC_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|secs: &u64| *secs > 0)
            .map(Duration::from_secs);

        Self {
            b2_key_id: non_empty("B2_KEY_ID"),
            b2_key: non_empty("B2_KEY"),
            b2_bucket: non_empty("B2_BUCKET"),
            b2_public_url: non_empty("B2_PUBLIC_URL"),
            telegram_token: non_empty("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: non_empty("TELEGRAM_CHAT_ID"),
            telegram_api_url: env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            db_path,
            inbox_root: env::var("TIERBRIDGE_INBOX").unwrap_or_else(|_| "/inbox".to_string()),
            sync_root: env::var("TIERBRIDGE_SYNC_DIR").unwrap_or_else(|_| "/".to_string()),
            idle_secs,
            evict_interval,
            sync_interval,
            socket_path: env::var("TIERBRIDGE_SOCKET")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_SOCKET_PATH)),
        }
    }

    pub fn b2_credentials(&self) -> Result<B2Credentials<'_>> {
        Ok(B2Credentials {
            key_id: required(&self.b2_key_id, "B2_KEY_ID")?,
            key: required(&self.b2_key, "B2_KEY")?,
            bucket: required(&self.b2_bucket, "B2_BUCKET")?,
        })
    }

    pub fn telegram_credentials(&self) -> Result<TelegramCredentials<'_>> {
        Ok(TelegramCredentials {
            api_url: &self.telegram_api_url,
            token: required(&self.telegram_token, "TELEGRAM_BOT_TOKEN")?,
            chat_id: required(&self.telegram_chat_id, "TELEGRAM_CHAT_ID")?,
        })
    }

    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            inbox_root: self.inbox_root.clone(),
            sync_root: self.sync_root.clone(),
            idle_secs: self.idle_secs,
        }
    }
}

// Secrets stay out of logs
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("b2_bucket", &self.b2_bucket)
            .field("b2_public_url", &self.b2_public_url)
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field("db_path", &self.db_path)
            .field("inbox_root", &self.inbox_root)
            .field("sync_root", &self.sync_root)
            .field("idle_secs", &self.idle_secs)
            .field("evict_interval", &self.evict_interval)
            .field("sync_interval", &self.sync_interval)
            .field("socket_path", &self.socket_path)
            .finish_non_exhaustive()
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| anyhow!("{} is not set", name))
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("tierbridge")
        .join("mappings.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> Config {
        Config {
            b2_key_id: None,
            b2_key: None,
            b2_bucket: None,
            b2_public_url: None,
            telegram_token: None,
            telegram_chat_id: None,
            telegram_api_url: DEFAULT_API_URL.to_string(),
            db_path: PathBuf::from("/tmp/test.db"),
            inbox_root: "/inbox".to_string(),
            sync_root: "/".to_string(),
            idle_secs: DEFAULT_IDLE_SECS,
            evict_interval: Duration::from_secs(DEFAULT_EVICT_INTERVAL_SECS),
            sync_interval: None,
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }

    #[test]
    fn test_missing_credentials_are_reported_by_name() {
        let config = blank();
        let err = config.b2_credentials().err().unwrap();
        assert!(err.to_string().contains("B2_KEY_ID"));
        let err = config.telegram_credentials().err().unwrap();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn test_credentials_present() {
        let mut config = blank();
        config.b2_key_id = Some("004abc".to_string());
        config.b2_key = Some("K004".to_string());
        config.b2_bucket = Some("bucket".to_string());
        let creds = config.b2_credentials().unwrap();
        assert_eq!(creds.bucket, "bucket");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let mut config = blank();
        config.b2_key = Some("super-secret-key".to_string());
        config.telegram_token = Some("123:bot-token".to_string());
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret-key"));
        assert!(!rendered.contains("bot-token"));
    }

    #[test]
    fn test_bridge_settings_follow_config() {
        let mut config = blank();
        config.idle_secs = 42;
        config.inbox_root = "/uploads".to_string();
        let settings = config.bridge_settings();
        assert_eq!(settings.idle_secs, 42);
        assert_eq!(settings.inbox_root, "/uploads");
    }

    #[test]
    fn test_default_db_path_ends_with_app_dir() {
        let path = default_db_path();
        assert!(path.ends_with("tierbridge/mappings.db"));
    }
}
