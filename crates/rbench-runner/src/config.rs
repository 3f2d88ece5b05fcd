use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rbench_env::{default_bind, default_scrub, EnvironmentSettings, ResolverSettings};
use rbench_exec::RuntimeSettings;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeSettings,
    #[serde(default)]
    pub resolver: ResolverSettings,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Tilde-expanded; relative paths are taken from the repo root.
    pub work_root: String,
    #[serde(default)]
    pub keep: bool,
    #[serde(default = "default_scrub")]
    pub scrub: Vec<String>,
    #[serde(default = "default_bind")]
    pub bind: BTreeMap<String, String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            work_root: ".rbench/envs".to_string(),
            keep: false,
            scrub: default_scrub(),
            bind: default_bind(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Config {
    pub fn default_for_repo() -> Self {
        Self {
            runtime: RuntimeSettings::default(),
            resolver: ResolverSettings::default(),
            environment: EnvironmentConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse rbench.toml")?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn work_root(&self, repo_root: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(&self.environment.work_root);
        let path = PathBuf::from(expanded.as_ref());
        if path.is_relative() {
            repo_root.join(path)
        } else {
            path
        }
    }

    pub fn environment_settings(&self, repo_root: &Path) -> EnvironmentSettings {
        EnvironmentSettings {
            work_root: self.work_root(repo_root),
            keep: self.environment.keep,
            scrub: self.environment.scrub.clone(),
            bind: self.environment.bind.clone(),
        }
    }

    pub fn script_timeout(&self) -> Option<Duration> {
        self.execution.timeout_secs.map(Duration::from_secs)
    }

    pub fn config_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".rbench").join("rbench.toml")
    }

    pub fn db_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".rbench").join("rbench.db")
    }
}
