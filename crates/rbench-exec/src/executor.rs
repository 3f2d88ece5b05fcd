use std::process::Stdio;
use std::time::{Duration, Instant};

use rbench_core::PipelineError;
use rbench_env::EnvironmentHandle;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// The host runtime that benchmark scripts are run with.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeSettings {
    pub program: String,
    /// Arguments placed before the script path. The default preloads
    /// `bundler/setup` so only the resolved dependency set is loadable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Arguments that make the runtime print its own version.
    #[serde(default)]
    pub version_args: Vec<String>,
    pub script_name: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            program: "ruby".to_string(),
            args: vec!["-rbundler/setup".to_string()],
            version_args: vec!["-e".to_string(), "print RUBY_VERSION".to_string()],
            script_name: "benchmark.rb".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

pub struct ScriptExecutor {
    runtime: RuntimeSettings,
    timeout: Option<Duration>,
}

impl ScriptExecutor {
    pub fn new(runtime: RuntimeSettings, timeout: Option<Duration>) -> Self {
        Self { runtime, timeout }
    }

    /// Run `script_source` with the host runtime, bound to `env`.
    ///
    /// Exactly one child process is spawned. It runs in its own process
    /// group, and the whole group is killed before this returns, so nothing
    /// the script started outlives the call. With a timeout, the deadline
    /// covers both the exit and the draining of stdout and stderr.
    pub async fn execute(&self, env: &EnvironmentHandle, script_source: &str) -> Result<CapturedOutput, PipelineError> {
        let script_path = env.workdir().join(&self.runtime.script_name);
        tokio::fs::write(&script_path, script_source)
            .await
            .map_err(|e| PipelineError::setup(format!("write script {}", script_path.display()), e))?;

        let mut cmd = Command::new(&self.runtime.program);
        cmd.args(&self.runtime.args)
            .arg(&script_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // own group, so everything the script starts can be signalled at once
        #[cfg(unix)]
        cmd.process_group(0);
        env.apply(&mut cmd);

        debug!(program = %self.runtime.program, script = %script_path.display(), "spawning script");
        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| PipelineError::setup(format!("spawn runtime `{}`", self.runtime.program), e))?;
        let group = child.id();

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        // The script is done once it has exited and both streams are closed.
        let collect = async {
            let (status, stdout, stderr) = tokio::join!(
                child.wait(),
                read_all(stdout_pipe.as_mut()),
                read_all(stderr_pipe.as_mut())
            );
            Ok::<_, std::io::Error>((status?, stdout?, stderr?))
        };
        let collected = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, collect).await.ok(),
            None => Some(collect.await),
        };

        kill_group(group);

        let (status, stdout, stderr) = match collected {
            Some(res) => res.map_err(|e| PipelineError::setup("collect script output", e))?,
            None => {
                let limit = self.timeout.unwrap_or_default();
                warn!(timeout_ms = limit.as_millis() as u64, "script timed out; killed");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to reap timed out script");
                }
                return Err(PipelineError::ScriptTimeout { timeout: limit });
            }
        };

        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();
        let elapsed = started.elapsed();

        write_log(env, "stdout.log", &stdout).await;
        write_log(env, "stderr.log", &stderr).await;

        if !stderr.trim().is_empty() {
            debug!(stderr = %stderr.trim(), "script stderr");
        }

        if !status.success() {
            return Err(PipelineError::ScriptExecution {
                code: status.code(),
                stderr: stderr.trim().to_string(),
                stdout,
            });
        }

        debug!(elapsed_ms = elapsed.as_millis() as u64, "script finished");
        Ok(CapturedOutput {
            stdout,
            stderr,
            exit_code: status.code(),
            elapsed,
        })
    }
}

async fn read_all<R>(pipe: Option<&mut R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(r) = pipe {
        r.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// SIGKILL every process left in the script's group.
#[cfg(unix)]
fn kill_group(group: Option<u32>) {
    let Some(pgid) = group.and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    // SAFETY: a negative pid addresses the process group created at spawn.
    // ESRCH (group already empty) is expected after a clean exit.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_group: Option<u32>) {}

// Best-effort: logs only matter for kept environments.
async fn write_log(env: &EnvironmentHandle, name: &str, text: &str) {
    let path = env.workdir().join(name);
    if let Err(e) = tokio::fs::write(&path, text).await {
        debug!(path = %path.display(), error = %e, "could not write run log");
    }
}
