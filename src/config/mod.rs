use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Third-party conversion service
    pub upstream: UpstreamConfig,

    /// Relay HTTP server
    pub server: ServerConfig,

    /// Orchestrator poll loop
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Service root, without trailing slash
    pub base_url: String,

    /// Browser user agent sent on every call
    pub user_agent: String,

    pub accept_language: String,

    /// Per-request timeout
    pub request_timeout_secs: u64,

    /// oEmbed endpoint used for the video title
    pub oembed_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,

    pub port: u16,

    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Status checks before giving up on a job
    pub max_attempts: u32,

    /// Fixed wait before every status check
    pub delay_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://v2.ytmp3.wtf".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            request_timeout_secs: 30,
            oembed_url: "https://www.youtube.com/oembed".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_origins: Vec::new(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            delay_ms: 3000,
        }
    }
}

impl PollingConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Config {
    /// Load configuration from file (or defaults) and apply environment overrides
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;
            Self::from_yaml(&content)?
        } else {
            tracing::debug!("No config file at {}, using defaults", config_path.display());
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to file, returning where it was written
    pub async fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(config_path)
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("convert-relay").join("config.yaml"))
    }

    /// Apply `HOST`, `PORT` and `CONVERT_RELAY_UPSTREAM` overrides
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }

        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a number, got '{}'", port))?;
        }

        if let Some(base_url) = lookup("CONVERT_RELAY_UPSTREAM") {
            self.upstream.base_url = base_url.trim_end_matches('/').to_string();
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.polling.max_attempts == 0 {
            anyhow::bail!("polling.max_attempts must be at least 1");
        }

        crate::utils::validate_url(&self.upstream.oembed_url)
            .context("upstream.oembed_url is not a valid URL")?;

        crate::utils::validate_url(&self.upstream.base_url)
            .context("upstream.base_url is not a valid HTTP(S) URL")?;

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Upstream: {}", self.upstream.base_url);
        println!("  Upstream Timeout: {}s", self.upstream.request_timeout_secs);
        println!("  Metadata: {}", self.upstream.oembed_url);
        println!("  Relay Address: {}:{}", self.server.host, self.server.port);
        if self.server.cors_origins.is_empty() {
            println!("  CORS Origins: any");
        } else {
            println!("  CORS Origins: {}", self.server.cors_origins.join(", "));
        }
        println!(
            "  Polling: {} attempts, {}ms apart",
            self.polling.max_attempts, self.polling.delay_ms
        );
    }
}
