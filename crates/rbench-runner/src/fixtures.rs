//! Configurations for exercising the pipeline on hosts without a Ruby toolchain.
//!
//! The runtime is `sh`, so benchmark scripts are shell scripts. The resolver is
//! a small shell program that rejects any manifest mentioning a gem named
//! `nonexistent` and otherwise "locks" the manifest by copying it.

use std::path::Path;

use rbench_env::ResolverSettings;
use rbench_exec::RuntimeSettings;

use crate::config::{Config, EnvironmentConfig, ExecutionConfig};

/// Prints a fingerprint of the `sh` binary. The fixture runtime reports it as
/// its version, and scripts can compute the same value for themselves.
pub const SH_VERSION_COMMAND: &str = r#"cksum < "$(command -v sh)" | cut -d ' ' -f 1"#;

const FIXTURE_RESOLVER: &str = r#"
if grep -q '"nonexistent"' "$BUNDLE_GEMFILE"; then
  echo "Could not find gem 'nonexistent' in rubygems repository https://rubygems.org/ or installed locally." >&2
  exit 7
fi
cp "$BUNDLE_GEMFILE" Gemfile.lock
"#;

pub fn shell_config(work_root: &Path) -> Config {
    Config {
        runtime: RuntimeSettings {
            program: "sh".to_string(),
            args: vec![],
            version_args: vec!["-c".to_string(), SH_VERSION_COMMAND.to_string()],
            script_name: "benchmark.sh".to_string(),
        },
        resolver: ResolverSettings {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), FIXTURE_RESOLVER.to_string()],
            ..ResolverSettings::default()
        },
        environment: EnvironmentConfig {
            work_root: work_root.to_string_lossy().into_owned(),
            keep: false,
            scrub: rbench_env::default_scrub(),
            bind: rbench_env::default_bind(),
        },
        execution: ExecutionConfig { timeout_secs: Some(30) },
    }
}

