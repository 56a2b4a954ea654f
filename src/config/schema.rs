use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Profile directory holding config and credentials - computed, not serialized
    #[serde(skip)]
    pub profile_dir: PathBuf,

    /// Base URL of the CSV file manager API.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Override for the credential file location. Defaults to
    /// `credentials.json` inside the profile directory.
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,

    #[serde(default)]
    pub realtime: RealtimeConfig,
}

// ── Realtime notification channel ─────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Explicit websocket URL. When unset it is derived from `server_url`
    /// (`http` → `ws`, `https` → `wss`, path `/ws`).
    #[serde(default)]
    pub url: Option<String>,

    /// Liveness probe interval while the connection is open.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Delay before a reconnect attempt.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Switch the reconnect policy from a fixed delay to exponential
    /// backoff doubling from `reconnect_delay_secs`.
    #[serde(default)]
    pub backoff: bool,

    /// Backoff ceiling.
    #[serde(default = "default_max_reconnect_delay_secs")]
    pub max_reconnect_delay_secs: u64,
}

fn default_server_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_reconnect_delay_secs() -> u64 {
    3
}

fn default_max_reconnect_delay_secs() -> u64 {
    60
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: None,
            heartbeat_secs: default_heartbeat_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            backoff: false,
            max_reconnect_delay_secs: default_max_reconnect_delay_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());
        let profile_dir = home.join(".csvdock");

        Self {
            config_path: profile_dir.join("config.toml"),
            profile_dir,
            server_url: default_server_url(),
            credentials_path: None,
            realtime: RealtimeConfig::default(),
        }
    }
}

impl Config {
    /// Load `~/.csvdock/config.toml`, creating the profile directory and a
    /// default config file on first run.
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let profile_dir = home.join(".csvdock");
        let config_path = profile_dir.join("config.toml");

        if !profile_dir.exists() {
            fs::create_dir_all(&profile_dir).context("Failed to create .csvdock directory")?;
        }

        if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path;
            config.profile_dir = profile_dir;
            config.apply_env_overrides();
            Ok(config)
        } else {
            let mut config = Config::default();
            config.config_path = config_path;
            config.profile_dir = profile_dir;
            config.save()?;
            config.apply_env_overrides();
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, contents)
            .with_context(|| format!("Failed to write {}", self.config_path.display()))?;
        Ok(())
    }

    /// Environment variables win over the config file so scripted runs can
    /// point at a different deployment without editing it.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("CSVDOCK_SERVER_URL") {
            if !url.is_empty() {
                self.server_url = url;
            }
        }
        if let Ok(url) = std::env::var("CSVDOCK_WS_URL") {
            if !url.is_empty() {
                self.realtime.url = Some(url);
            }
        }
    }

    /// Resolved websocket endpoint for the realtime channel.
    pub fn ws_url(&self) -> String {
        if let Some(ref url) = self.realtime.url {
            return url.clone();
        }
        let base = self.server_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}/ws")
    }

    /// Resolved credential file location.
    pub fn credentials_path(&self) -> PathBuf {
        self.credentials_path
            .clone()
            .unwrap_or_else(|| self.profile_dir.join("credentials.json"))
    }
}

// ── Tests ───────────────────────────────────────────────────────────
