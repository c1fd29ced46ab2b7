use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub git: GitSettings,
    pub sessions: SessionSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StorageSettings {
    /// Shared remotes live under `<data_root>/remotes`.
    pub data_root: PathBuf,
    /// Parent directory for per-session scratch filesystems.
    pub scratch_root: Option<PathBuf>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        let data_root = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("gitgym");
        Self {
            data_root,
            scratch_root: None,
        }
    }
}

impl StorageSettings {
    pub fn remotes_dir(&self) -> PathBuf {
        self.data_root.join("remotes")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct GitSettings {
    pub author_name: String,
    pub author_email: String,
    pub default_branch: String,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            author_name: "GitGym User".to_string(),
            author_email: "user@gitgym.local".to_string(),
            default_branch: "main".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SessionSettings {
    pub reflog_limit: usize,
    /// Zero disables idle eviction.
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            reflog_limit: 1000,
            idle_timeout_secs: 3600,
            sweep_interval_secs: 60,
        }
    }
}

impl SessionSettings {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}
