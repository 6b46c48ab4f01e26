// src/config/bot.rs
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf};

use crate::watermark::BootPolicy;

pub const DEFAULT_BOT_CONFIG_PATH: &str = "config/bot.toml";
pub const ENV_BOT_CONFIG_PATH: &str = "BOT_CONFIG_PATH";

fn default_poll_interval_secs() -> u64 {
    10
}
fn default_broadcast_enabled() -> bool {
    true
}
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_shutdown_grace_secs() -> u64 {
    15
}
fn default_store_timeout_secs() -> u64 {
    5
}
fn default_max_connections() -> u32 {
    2
}
fn default_onebot_timeout_secs() -> u64 {
    5
}
fn default_onebot_retries() -> u8 {
    3
}

/// Upper bound on send attempts per message; a failing send must not stall the poll loop.
pub const MAX_ONEBOT_RETRIES: u8 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneBotConfig {
    /// Base URL of the OneBot v11 HTTP API, e.g. `http://127.0.0.1:5700`.
    /// Unset means dry-run: messages are only logged.
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_onebot_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_onebot_retries")]
    pub max_retries: u8,
    /// Shared secret for inbound event signatures (`X-Signature`).
    /// Unset means the event webhook rejects every request.
    #[serde(default)]
    pub secret: Option<String>,
}

impl Default for OneBotConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            access_token: None,
            timeout_secs: default_onebot_timeout_secs(),
            max_retries: default_onebot_retries(),
            secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub postgres_dsn: String,
    #[serde(default)]
    pub game_id: i32,
    /// Poll interval; also the lookback used by `BootPolicy::Deliver`.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub boot_policy: BootPolicy,
    /// Gate state at process start. Never persisted.
    #[serde(default = "default_broadcast_enabled")]
    pub broadcast_enabled: bool,
    /// Chat groups that receive notices and may issue commands.
    #[serde(default)]
    pub groups: Vec<i64>,
    /// Users allowed to toggle the broadcast gate.
    #[serde(default)]
    pub admins: Vec<i64>,
    #[serde(default)]
    pub onebot: OneBotConfig,
    /// Bearer token guarding the HTTP broadcast switch; unset disables it.
    #[serde(default)]
    pub admin_token: Option<String>,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            postgres_dsn: String::new(),
            game_id: 0,
            poll_interval_secs: default_poll_interval_secs(),
            boot_policy: BootPolicy::default(),
            broadcast_enabled: default_broadcast_enabled(),
            groups: Vec::new(),
            admins: Vec::new(),
            onebot: OneBotConfig::default(),
            admin_token: None,
            bind_addr: default_bind_addr(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            store_timeout_secs: default_store_timeout_secs(),
            max_connections: default_max_connections(),
        }
    }
}

impl BotConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: BotConfig = toml::from_str(s).context("parse bot config TOML")?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading bot config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    /// Resolve the config file and apply environment overrides:
    /// 1) $BOT_CONFIG_PATH (must exist)
    /// 2) config/bot.toml
    /// 3) built-in defaults
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match env::var(ENV_BOT_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(anyhow!("BOT_CONFIG_PATH points to non-existent path"));
                }
                Self::load_from_file(&pb)?
            }
            Err(_) => {
                let pb = PathBuf::from(DEFAULT_BOT_CONFIG_PATH);
                if pb.exists() {
                    Self::load_from_file(&pb)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env_overrides()?;
        cfg.sanitize();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(v) = env::var("POSTGRES_DSN") {
            self.postgres_dsn = v;
        }
        if let Ok(v) = env::var("TARGET_GAME_ID") {
            self.game_id = v
                .trim()
                .parse()
                .with_context(|| format!("TARGET_GAME_ID is not an integer: {v}"))?;
        }
        if let Some(v) = env::var("POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            self.poll_interval_secs = v;
        }
        if let Ok(v) = env::var("ONEBOT_API_URL") {
            self.onebot.api_url = Some(v);
        }
        if let Ok(v) = env::var("ONEBOT_ACCESS_TOKEN") {
            self.onebot.access_token = Some(v);
        }
        if let Ok(v) = env::var("ONEBOT_SECRET") {
            self.onebot.secret = Some(v);
        }
        if let Ok(v) = env::var("BROADCAST_ENABLED") {
            self.broadcast_enabled = parse_bool(&v)
                .ok_or_else(|| anyhow!("BROADCAST_ENABLED must be a boolean, got {v}"))?;
        }
        if let Ok(v) = env::var("ADMIN_TOKEN") {
            self.admin_token = Some(v);
        }
        if let Ok(v) = env::var("BIND_ADDR") {
            self.bind_addr = v;
        }
        Ok(())
    }

    fn sanitize(&mut self) {
        self.poll_interval_secs = self.poll_interval_secs.max(1);
        self.store_timeout_secs = self.store_timeout_secs.max(1);
        self.onebot.timeout_secs = self.onebot.timeout_secs.max(1);
        self.max_connections = self.max_connections.max(1);
        self.onebot.max_retries = self.onebot.max_retries.clamp(1, MAX_ONEBOT_RETRIES);
        self.onebot.api_url = self
            .onebot
            .api_url
            .take()
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());
        self.admin_token = non_blank(self.admin_token.take());
        self.onebot.secret = non_blank(self.onebot.secret.take());
        self.groups.sort_unstable();
        self.groups.dedup();
        self.admins.sort_unstable();
        self.admins.dedup();
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::RelayError;
        if self.postgres_dsn.trim().is_empty() {
            return Err(RelayError::Config("postgres_dsn is empty".into()));
        }
        if self.game_id <= 0 {
            return Err(RelayError::Config(format!(
                "game_id must be positive, got {}",
                self.game_id
            )));
        }
        Ok(())
    }
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg = BotConfig::from_toml_str(
            r#"
postgres_dsn = "postgres://ctf@localhost/gzctf"
game_id = 3
"#,
        )
        .unwrap();
        assert_eq!(cfg.poll_interval_secs, 10);
        assert!(cfg.broadcast_enabled);
        assert_eq!(cfg.boot_policy, BootPolicy::Suppress);
        assert_eq!(cfg.onebot.max_retries, 3);
        assert!(cfg.onebot.api_url.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn sanitize_clamps_and_dedups() {
        let cfg = BotConfig::from_toml_str(
            r#"
poll_interval_secs = 0
groups = [30, 10, 30]
admins = [7, 7]
boot_policy = "deliver"

[onebot]
api_url = " http://127.0.0.1:5700/ "
max_retries = 0
"#,
        )
        .unwrap();
        assert_eq!(cfg.poll_interval_secs, 1);
        assert_eq!(cfg.groups, vec![10, 30]);
        assert_eq!(cfg.admins, vec![7]);
        assert_eq!(cfg.boot_policy, BootPolicy::Deliver);
        assert_eq!(cfg.onebot.api_url.as_deref(), Some("http://127.0.0.1:5700"));
        assert_eq!(cfg.onebot.max_retries, 1);
        assert!(cfg.onebot.secret.is_none());
    }

    #[test]
    fn retries_are_capped_and_secret_trimmed() {
        let cfg = BotConfig::from_toml_str(
            r#"
[onebot]
max_retries = 200
secret = "  hush  "
"#,
        )
        .unwrap();
        assert_eq!(cfg.onebot.max_retries, MAX_ONEBOT_RETRIES);
        assert_eq!(cfg.onebot.secret.as_deref(), Some("hush"));
    }

    #[test]
    fn validate_rejects_missing_game() {
        let cfg = BotConfig {
            postgres_dsn: "postgres://x".into(),
            ..BotConfig::default()
        };
        assert!(cfg.validate().is_err());
        assert!(BotConfig::default().validate().is_err());
    }

    #[test]
    fn bool_parsing() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
