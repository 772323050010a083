use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides `[api] base_url`.
pub const API_URL_ENV: &str = "SOCIALMARKET_API_URL";

/// Environment variable that pins the client session id.
pub const SESSION_ENV: &str = "SOCIALMARKET_SESSION";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Session file in the per-login runtime directory.
    #[default]
    File,
    /// Process memory only.
    Memory,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::File => write!(f, "file"),
            StoreKind::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StoreKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(StoreKind::File),
            "memory" => Ok(StoreKind::Memory),
            other => Err(format!("unknown store kind: {other} (expected file or memory)")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub store: StoreKind,
    /// Fixed session id. When unset the client derives one per shell session.
    #[serde(default)]
    pub id: Option<String>,
}

/// Upstream provider whose key the backend proxies with.
#[derive(Debug, Clone)]
pub struct ProviderDef {
    pub id: &'static str,
    pub name: &'static str,
    pub header: &'static str,
    pub key_prefix: &'static str,
    pub console_url: &'static str,
}

pub const BUILT_IN_PROVIDERS: &[ProviderDef] = &[
    ProviderDef { id: "anthropic", name: "Anthropic", header: "X-Anthropic-Key",
                  key_prefix: "sk-ant-",
                  console_url: "https://console.anthropic.com/settings/keys" },
    ProviderDef { id: "openai", name: "OpenAI", header: "X-OpenAI-Key",
                  key_prefix: "sk-",
                  console_url: "https://platform.openai.com/api-keys" },
];

pub fn find_provider_def(id: &str) -> Option<&'static ProviderDef> {
    BUILT_IN_PROVIDERS
        .iter()
        .find(|p| p.id.eq_ignore_ascii_case(id))
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let config = if path.exists() {
            let content =
                std::fs::read_to_string(&path).context("Failed to read config file")?;
            Self::parse(&content)?
        } else {
            Self::default()
        };
        Ok(config.with_overrides(|name| std::env::var(name).ok()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Applies environment overrides through `lookup` so callers can test without
    /// touching the process environment.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV).filter(|u| !u.trim().is_empty()) {
            tracing::debug!(base_url = %url, "API base URL overridden from environment");
            self.api.base_url = url;
        }
        if let Some(id) = lookup(SESSION_ENV).filter(|s| !s.trim().is_empty()) {
            self.session.id = Some(id);
        }
        self.api.base_url = self.api.base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("socialmarket")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Per-login directory for session-scoped state. Prefers the runtime dir,
    /// which the OS empties at logout and reboot; otherwise a per-user
    /// directory under the system temp dir.
    pub fn session_root() -> PathBuf {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok();
        session_root_in(dirs::runtime_dir(), &std::env::temp_dir(), user.as_deref())
    }

    pub fn ensure_dirs() -> Result<()> {
        std::fs::create_dir_all(Self::config_dir())?;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        Self::ensure_dirs()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&path, content).context("Failed to write config file")?;
        Ok(())
    }
}

fn session_root_in(runtime: Option<PathBuf>, temp: &std::path::Path, user: Option<&str>) -> PathBuf {
    match runtime {
        Some(dir) => dir.join("socialmarket").join("sessions"),
        None => {
            let user: String = user
                .unwrap_or("user")
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
                .collect();
            let user = if user.is_empty() { "user".to_string() } else { user };
            temp.join(format!("socialmarket-{user}")).join("sessions")
        }
    }
}
