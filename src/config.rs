use crate::logs::DEFAULT_LOG_CAPACITY;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Settings for the control plane itself
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Gateway home directory holding `config.json` and `cron/` (default: ~/.picoclaw)
    #[serde(default = "default_home")]
    pub home: String,

    /// Control surface settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Supervised gateway process settings
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Bind address (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// HTTP port for the control surface (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for the control surface (default: admin)
    #[serde(default = "default_admin_username")]
    pub admin_username: String,

    /// Password for the control surface.
    /// If not set, a random password is generated at startup and logged
    pub admin_password: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
            admin_username: default_admin_username(),
            admin_password: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Command line used to launch the gateway (split with shell quoting rules)
    #[serde(default = "default_gateway_command")]
    pub command: String,

    /// Working directory for the gateway process
    pub working_dir: Option<String>,

    /// Extra environment variables for the gateway process
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Seconds to wait after SIGTERM before the gateway is killed
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Number of output lines retained
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// Start the gateway on boot when a provider API key is configured
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            command: default_gateway_command(),
            working_dir: None,
            env: HashMap::new(),
            stop_timeout_secs: default_stop_timeout(),
            log_capacity: default_log_capacity(),
            auto_start: default_auto_start(),
        }
    }
}

impl GatewayConfig {
    /// Build a config for an explicit program and arguments
    pub fn command(program: &str, args: &[&str]) -> Self {
        let mut words = vec![program.to_string()];
        words.extend(args.iter().map(|a| a.to_string()));
        Self {
            command: shell_words::join(words),
            ..Default::default()
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Split the command line into program and arguments
    pub fn argv(&self) -> anyhow::Result<Vec<String>> {
        let words = shell_words::split(&self.command)
            .map_err(|e| anyhow::anyhow!("Invalid gateway command '{}': {}", self.command, e))?;
        if words.is_empty() {
            anyhow::bail!("Gateway command is empty");
        }
        Ok(words)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            home: default_home(),
            server: ServerConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

fn default_home() -> String {
    "~/.picoclaw".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_gateway_command() -> String {
    "picoclaw gateway".to_string()
}

fn default_stop_timeout() -> u64 {
    10
}

fn default_log_capacity() -> usize {
    DEFAULT_LOG_CAPACITY
}

fn default_auto_start() -> bool {
    true
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load settings from `path` when it exists (defaults otherwise), then
    /// apply `PORT`, `ADMIN_USERNAME`, `ADMIN_PASSWORD` and `PICOCLAW_HOME`
    /// from the environment.
    pub fn from_env_or_file(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_or_default(path)?,
            None => Config::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse `path` if it exists, otherwise fall back to the defaults
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Settings file not found, using defaults");
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply environment overrides using the provided lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid PORT '{}': {}", port, e))?;
        }
        if let Some(username) = lookup("ADMIN_USERNAME") {
            self.server.admin_username = username;
        }
        if let Some(password) = lookup("ADMIN_PASSWORD").filter(|p| !p.is_empty()) {
            self.server.admin_password = Some(password);
        }
        if let Some(home) = lookup("PICOCLAW_HOME") {
            self.home = home;
        }
        Ok(())
    }

    /// Gateway home with a leading `~` expanded
    pub fn home_dir(&self) -> PathBuf {
        expand_home(&self.home)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.gateway.argv()?;
        if self.gateway.log_capacity == 0 {
            anyhow::bail!("gateway.log_capacity must be greater than zero");
        }
        if self.server.port == 0 {
            anyhow::bail!("server.port must be greater than zero");
        }
        if self.server.admin_username.is_empty() {
            anyhow::bail!("server.admin_username must not be empty");
        }
        Ok(())
    }
}

fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match dirs_next::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}
