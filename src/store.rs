//! On-disk storage for the gateway configuration document
//!
//! Reads never fail: a missing or unparsable file yields the built-in
//! default document. Writes replace the whole file atomically, and
//! [`ConfigStore::update`] serializes read-modify-write cycles so two
//! concurrent writers cannot both merge against the same stale snapshot.

use crate::error::StoreError;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name of the gateway configuration inside the home directory
pub const CONFIG_FILE_NAME: &str = "config.json";

pub struct ConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store for `<home>/config.json`
    pub fn in_home(home: &Path) -> Self {
        Self::new(home.join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored document, falling back to the defaults
    pub fn load(&self) -> Value {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored config, using defaults");
                return default_document();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read config, using defaults");
                return default_document();
            }
        };

        match serde_json::from_str(&content) {
            Ok(document) => document,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to parse config, using defaults");
                default_document()
            }
        }
    }

    /// Replace the stored document
    pub fn save(&self, document: &Value) -> Result<(), StoreError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|source| StoreError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let body = serde_json::to_string_pretty(document)?;
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        // Write next to the target so the rename stays on one filesystem
        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        file.write_all(body.as_bytes()).map_err(write_err)?;
        file.as_file().sync_all().map_err(write_err)?;
        file.persist(&self.path).map_err(|e| write_err(e.error))?;

        info!(path = %self.path.display(), "Config saved");
        Ok(())
    }

    /// Load, transform and save the document while holding the write lock.
    /// Returns the document that was saved.
    pub fn update<F>(&self, f: F) -> Result<Value, StoreError>
    where
        F: FnOnce(&Value) -> Value,
    {
        let _guard = self.write_lock.lock();
        let existing = self.load();
        let updated = f(&existing);
        self.save(&updated)?;
        Ok(updated)
    }
}

/// The document used when nothing has been stored yet
pub fn default_document() -> Value {
    json!({
        "agents": {
            "defaults": {
                "workspace": "~/.picoclaw/workspace",
                "restrict_to_workspace": true,
                "provider": "",
                "model": "glm-4.7",
                "max_tokens": 8192,
                "temperature": 0.7,
                "max_tool_iterations": 20
            }
        },
        "channels": {
            "telegram": {"enabled": false, "token": "", "proxy": "", "allow_from": []},
            "discord": {"enabled": false, "token": "", "allow_from": []},
            "slack": {"enabled": false, "bot_token": "", "app_token": "", "allow_from": []},
            "whatsapp": {"enabled": false, "bridge_url": "ws://localhost:3001", "allow_from": []},
            "feishu": {
                "enabled": false,
                "app_id": "",
                "app_secret": "",
                "encrypt_key": "",
                "verification_token": "",
                "allow_from": []
            },
            "dingtalk": {"enabled": false, "client_id": "", "client_secret": "", "allow_from": []},
            "qq": {"enabled": false, "app_id": "", "app_secret": "", "allow_from": []},
            "line": {
                "enabled": false,
                "channel_secret": "",
                "channel_access_token": "",
                "webhook_host": "0.0.0.0",
                "webhook_port": 18791,
                "webhook_path": "/webhook/line",
                "allow_from": []
            },
            "maixcam": {"enabled": false, "host": "0.0.0.0", "port": 18790, "allow_from": []}
        },
        "providers": {
            "anthropic": {"api_key": ""},
            "openai": {"api_key": "", "api_base": ""},
            "openrouter": {"api_key": ""},
            "deepseek": {"api_key": ""},
            "groq": {"api_key": ""},
            "gemini": {"api_key": ""},
            "zhipu": {"api_key": "", "api_base": ""},
            "vllm": {"api_key": "", "api_base": ""},
            "nvidia": {"api_key": "", "api_base": ""},
            "moonshot": {"api_key": ""}
        },
        "gateway": {"host": "0.0.0.0", "port": 18790},
        "tools": {
            "web": {
                "brave": {"enabled": false, "api_key": "", "max_results": 5},
                "duckduckgo": {"enabled": true, "max_results": 5}
            }
        },
        "heartbeat": {"enabled": true, "interval": 30},
        "devices": {"enabled": false, "monitor_usb": false}
    })
}
