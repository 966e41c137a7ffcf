use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "classhub.toml";

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RemoteConfig {
    #[default]
    None,
    Memory,
    Shared {
        path: PathBuf,
        #[serde(default = "default_poll_interval_ms")]
        poll_interval_ms: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub access_code_sha256: Option<String>,
    pub auto_reset: bool,
    pub roster_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::None,
            access_code_sha256: None,
            auto_reset: false,
            roster_file: PathBuf::from("roster.json"),
        }
    }
}

impl Config {
    /// Reads `classhub.toml` from the workspace (defaults when missing), then
    /// applies `CLASSHUB_*` environment overrides.
    pub fn load(workspace: &Path) -> anyhow::Result<Self> {
        let path = workspace.join(CONFIG_FILE);
        let mut cfg = if path.is_file() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            Self::parse(&text).with_context(|| format!("parsing {}", path.display()))?
        } else {
            Self::default()
        };
        cfg.apply_overrides(|key| std::env::var(key).ok());
        cfg.resolve_paths(workspace);
        Ok(cfg)
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("CLASSHUB_REMOTE_PATH").filter(|v| !v.trim().is_empty()) {
            let poll_interval_ms = match &self.remote {
                RemoteConfig::Shared {
                    poll_interval_ms, ..
                } => *poll_interval_ms,
                _ => DEFAULT_POLL_INTERVAL_MS,
            };
            self.remote = RemoteConfig::Shared {
                path: PathBuf::from(path.trim()),
                poll_interval_ms,
            };
        }
        if let Some(hash) = var("CLASSHUB_ACCESS_CODE_SHA256").filter(|v| !v.trim().is_empty()) {
            self.access_code_sha256 = Some(hash.trim().to_ascii_lowercase());
        }
        if let Some(flag) = var("CLASSHUB_AUTO_RESET") {
            match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.auto_reset = true,
                "0" | "false" | "no" | "off" => self.auto_reset = false,
                _ => {}
            }
        }
    }

    fn resolve_paths(&mut self, workspace: &Path) {
        if self.roster_file.is_relative() {
            self.roster_file = workspace.join(&self.roster_file);
        }
        if let RemoteConfig::Shared { path, .. } = &mut self.remote {
            if path.is_relative() {
                *path = workspace.join(&*path);
            }
        }
    }
}
