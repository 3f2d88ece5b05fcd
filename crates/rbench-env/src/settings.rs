use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How to invoke the host's dependency resolver against a generated manifest.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolverSettings {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub manifest_name: String,
    pub lockfile_name: String,
    /// Install location, relative to the environment working directory.
    pub install_dir: String,
    /// Package index written at the top of every manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            program: "bundle".to_string(),
            args: vec!["install".to_string(), "--quiet".to_string()],
            manifest_name: "Gemfile".to_string(),
            lockfile_name: "Gemfile.lock".to_string(),
            install_dir: "vendor/bundle".to_string(),
            source: Some("https://rubygems.org".to_string()),
            timeout_secs: None,
        }
    }
}

/// Where environments live and how subprocesses are bound to them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentSettings {
    pub work_root: PathBuf,
    /// Leave the working directory behind after the run for the caller to clean up.
    #[serde(default)]
    pub keep: bool,
    /// Host variables removed from every subprocess.
    #[serde(default)]
    pub scrub: Vec<String>,
    /// Variables set on every subprocess. Values may use `{workdir}`,
    /// `{manifest}`, `{lockfile}` and `{install_dir}`.
    #[serde(default)]
    pub bind: BTreeMap<String, String>,
}

impl EnvironmentSettings {
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
            keep: false,
            scrub: default_scrub(),
            bind: default_bind(),
        }
    }
}

pub fn default_scrub() -> Vec<String> {
    [
        "BUNDLE_GEMFILE",
        "BUNDLE_PATH",
        "BUNDLE_APP_CONFIG",
        "BUNDLE_BIN_PATH",
        "BUNDLER_SETUP",
        "BUNDLER_VERSION",
        "RUBYOPT",
        "RUBYLIB",
        "GEM_HOME",
        "GEM_PATH",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

pub fn default_bind() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("BUNDLE_GEMFILE".to_string(), "{manifest}".to_string()),
        ("BUNDLE_PATH".to_string(), "{install_dir}".to_string()),
        ("BUNDLE_APP_CONFIG".to_string(), "{workdir}/.bundle".to_string()),
    ])
}
