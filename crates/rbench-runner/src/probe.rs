use anyhow::{anyhow, Context, Result};
use rbench_exec::RuntimeSettings;

use crate::util::run_cmd;

/// Ask the host runtime for its version, for snapshotting onto new builds.
pub async fn probe_runtime_version(runtime: &RuntimeSettings) -> Result<String> {
    let version = run_cmd(&runtime.program, &runtime.version_args)
        .await
        .with_context(|| format!("probe version of `{}`", runtime.program))?;
    if version.is_empty() {
        return Err(anyhow!("`{}` printed no version", runtime.program));
    }
    tracing::debug!(program = %runtime.program, %version, "runtime version");
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime(version_args: &[&str]) -> RuntimeSettings {
        RuntimeSettings {
            program: "sh".into(),
            version_args: version_args.iter().map(|s| s.to_string()).collect(),
            ..RuntimeSettings::default()
        }
    }

    #[tokio::test]
    async fn reads_trimmed_stdout() {
        let v = probe_runtime_version(&runtime(&["-c", "echo ' 3.3.0 '"])).await.unwrap();
        assert_eq!(v, "3.3.0");
    }

    #[tokio::test]
    async fn empty_or_failing_probe_is_an_error() {
        assert!(probe_runtime_version(&runtime(&["-c", "true"])).await.is_err());
        assert!(probe_runtime_version(&runtime(&["-c", "exit 1"])).await.is_err());
    }
}
