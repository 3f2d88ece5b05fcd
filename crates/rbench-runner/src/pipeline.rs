use std::fmt;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rbench_core::{BuildId, PipelineError, Report, RunId};
use rbench_env::{EnvironmentBuilder, EnvironmentHandle};
use rbench_exec::{decode_output, ScriptExecutor};
use rbench_storage::Storage;
use tracing::{info, info_span, warn, Instrument};

use crate::persist::ReportPersister;
use crate::Config;

/// Where a run is. Every stage can end in `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Started,
    BuildLookedUp,
    EnvironmentBuilt,
    ScriptExecuted,
    OutputDecoded,
    Persisted,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Started => "started",
            Stage::BuildLookedUp => "build_looked_up",
            Stage::EnvironmentBuilt => "environment_built",
            Stage::ScriptExecuted => "script_executed",
            Stage::OutputDecoded => "output_decoded",
            Stage::Persisted => "persisted",
            Stage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Runs one benchmark script against one build, end to end.
///
/// Steps run strictly in order and the first failure stops the run. Nothing
/// is written to storage unless every step before persisting succeeded.
pub struct Pipeline {
    storage: Arc<dyn Storage>,
    builder: EnvironmentBuilder,
    executor: ScriptExecutor,
    persister: ReportPersister,
}

impl Pipeline {
    pub fn new(storage: Arc<dyn Storage>, builder: EnvironmentBuilder, executor: ScriptExecutor) -> Self {
        Self {
            persister: ReportPersister::new(storage.clone()),
            storage,
            builder,
            executor,
        }
    }

    pub fn from_config(cfg: &Config, repo_root: &Path, storage: Arc<dyn Storage>) -> Self {
        let builder = EnvironmentBuilder::new(cfg.resolver.clone(), cfg.environment_settings(repo_root));
        let executor = ScriptExecutor::new(cfg.runtime.clone(), cfg.script_timeout());
        Self::new(storage, builder, executor)
    }

    pub async fn run(&self, build_id: &BuildId, encoded_script: &str) -> Result<Report, PipelineError> {
        let run_id = RunId::new();
        let span = info_span!("run", run_id = %run_id, build_id = %build_id);
        async {
            let mut stage = Stage::Started;
            info!(%stage, "run started");
            match self.run_stages(build_id, encoded_script, &mut stage).await {
                Ok(report) => Ok(report),
                Err(err) => {
                    let after = std::mem::replace(&mut stage, Stage::Failed);
                    warn!(%stage, %after, kind = %err.kind(), error = %err, "run failed");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_stages(&self, build_id: &BuildId, encoded_script: &str, stage: &mut Stage) -> Result<Report, PipelineError> {
        // Nothing touches the filesystem until the build is known.
        let build = self
            .storage
            .find_build(build_id)
            .map_err(PipelineError::Storage)?
            .ok_or_else(|| PipelineError::BuildNotFound(build_id.clone()))?;
        advance(stage, Stage::BuildLookedUp);

        let source = decode_script(encoded_script)?;

        let env = self.builder.build(&build.target).await?;
        advance(stage, Stage::EnvironmentBuilt);

        let executed = self.executor.execute(&env, &source).await;
        release(env);
        let output = executed?;
        advance(stage, Stage::ScriptExecuted);

        let payload = decode_output(&output.stdout)?;
        advance(stage, Stage::OutputDecoded);

        let report = self.persister.persist(&build.id, payload)?;
        advance(stage, Stage::Persisted);
        info!(report_id = %report.id, elapsed_ms = output.elapsed.as_millis() as u64, "report stored");
        Ok(report)
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    *stage = next;
    info!(stage = %next, "stage");
}

fn release(env: EnvironmentHandle) {
    match env.close() {
        Ok(Some(kept)) => info!(workdir = %kept.display(), "environment kept"),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "failed to remove environment"),
    }
}

/// Decode a base64 script. Line breaks and other whitespace are ignored, so
/// MIME-wrapped encodings are accepted.
pub fn decode_script(encoded: &str) -> Result<String, PipelineError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| PipelineError::InvalidScript(format!("not base64: {e}")))?;
    String::from_utf8(bytes).map_err(|_| PipelineError::InvalidScript("script is not UTF-8".to_string()))
}

pub fn encode_script(source: &str) -> String {
    STANDARD.encode(source.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbench_core::ErrorKind;

    #[test]
    fn decodes_wrapped_base64() {
        let source = "require 'json'\nputs({ok: true}.to_json)\n".repeat(4);
        let encoded = encode_script(&source);
        let wrapped: String = encoded
            .as_bytes()
            .chunks(60)
            .map(|c| format!("{}\n", std::str::from_utf8(c).unwrap()))
            .collect();
        assert_eq!(decode_script(&wrapped).unwrap(), source);
    }

    #[test]
    fn rejects_bad_encodings() {
        assert_eq!(decode_script("%%%not base64%%%").unwrap_err().kind(), ErrorKind::InvalidScript);
        let latin1 = STANDARD.encode([0xff, 0xfe, 0x41]);
        assert_eq!(decode_script(&latin1).unwrap_err().kind(), ErrorKind::InvalidScript);
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::BuildLookedUp.to_string(), "build_looked_up");
        assert_eq!(Stage::Failed.to_string(), "failed");
    }
}
