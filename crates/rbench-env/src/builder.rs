use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use rbench_core::{Declaration, PipelineError};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

use crate::manifest::render_manifest;
use crate::settings::{EnvironmentSettings, ResolverSettings};

/// Resolved dependency set as recorded by the resolver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockState {
    pub path: PathBuf,
    pub sha256: String,
}

/// A materialized environment owned by exactly one run.
///
/// Dropping the handle removes the working directory unless the environment
/// was built with `keep = true`.
#[derive(Debug)]
pub struct EnvironmentHandle {
    workdir: PathBuf,
    manifest_path: PathBuf,
    lock: Option<LockState>,
    bindings: BTreeMap<String, String>,
    scrub: Vec<String>,
    guard: Option<TempDir>,
}

impl EnvironmentHandle {
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn lock(&self) -> Option<&LockState> {
        self.lock.as_ref()
    }

    pub fn bindings(&self) -> &BTreeMap<String, String> {
        &self.bindings
    }

    /// Rebind `cmd` to this environment: scrubbed host variables are removed,
    /// bound ones are set, and the working directory is the environment's.
    pub fn apply(&self, cmd: &mut Command) {
        for key in &self.scrub {
            cmd.env_remove(key);
        }
        cmd.envs(&self.bindings);
        cmd.current_dir(&self.workdir);
    }

    /// Remove the working directory now. Kept environments are left alone and
    /// their path is returned.
    pub fn close(mut self) -> std::io::Result<Option<PathBuf>> {
        match self.guard.take() {
            Some(dir) => {
                dir.close()?;
                Ok(None)
            }
            None => Ok(Some(self.workdir.clone())),
        }
    }
}

pub struct EnvironmentBuilder {
    resolver: ResolverSettings,
    settings: EnvironmentSettings,
}

impl EnvironmentBuilder {
    pub fn new(resolver: ResolverSettings, settings: EnvironmentSettings) -> Self {
        Self { resolver, settings }
    }

    /// Generate the manifest for `target` in a private working directory and
    /// run the resolver against it.
    ///
    /// On any failure the working directory is removed before returning.
    pub async fn build(&self, target: &[Declaration]) -> Result<EnvironmentHandle, PipelineError> {
        let root = &self.settings.work_root;
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| PipelineError::setup(format!("create work root {}", root.display()), e))?;

        let dir = tempfile::Builder::new()
            .prefix("env-")
            .tempdir_in(root)
            .map_err(|e| PipelineError::setup(format!("create environment under {}", root.display()), e))?;
        let workdir = dir.path().to_path_buf();

        let manifest_path = workdir.join(&self.resolver.manifest_name);
        let lockfile_path = workdir.join(&self.resolver.lockfile_name);
        let install_dir = workdir.join(&self.resolver.install_dir);

        let manifest = render_manifest(self.resolver.source.as_deref(), target);
        tokio::fs::write(&manifest_path, manifest)
            .await
            .map_err(|e| PipelineError::setup(format!("write {}", manifest_path.display()), e))?;
        debug!(manifest = %manifest_path.display(), entries = target.len(), "manifest written");

        let bindings = expand_bindings(&self.settings.bind, &workdir, &manifest_path, &lockfile_path, &install_dir);

        let mut handle = EnvironmentHandle {
            workdir,
            manifest_path,
            lock: None,
            bindings,
            scrub: self.settings.scrub.clone(),
            guard: Some(dir),
        };

        self.resolve(&handle).await?;

        handle.lock = read_lock_state(&lockfile_path).await?;
        info!(
            workdir = %handle.workdir.display(),
            lock = handle.lock.as_ref().map(|l| l.sha256.as_str()).unwrap_or("none"),
            "environment resolved"
        );

        if self.settings.keep {
            if let Some(dir) = handle.guard.take() {
                let _ = dir.keep();
            }
        }
        Ok(handle)
    }

    async fn resolve(&self, handle: &EnvironmentHandle) -> Result<(), PipelineError> {
        let mut cmd = Command::new(&self.resolver.program);
        cmd.args(&self.resolver.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        handle.apply(&mut cmd);

        debug!(program = %self.resolver.program, args = ?self.resolver.args, "running resolver");

        let output = cmd.output();
        let output = match self.resolver.timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), output).await {
                Ok(res) => res,
                Err(_) => {
                    return Err(PipelineError::DependencyResolution {
                        code: None,
                        diagnostic: format!("resolver timed out after {secs}s"),
                    })
                }
            },
            None => output.await,
        }
        .map_err(|e| PipelineError::setup(format!("spawn resolver `{}`", self.resolver.program), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let diagnostic = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(PipelineError::DependencyResolution {
                code: output.status.code(),
                diagnostic: diagnostic.trim().to_string(),
            });
        }
        Ok(())
    }
}

fn expand_bindings(
    bind: &BTreeMap<String, String>,
    workdir: &Path,
    manifest: &Path,
    lockfile: &Path,
    install_dir: &Path,
) -> BTreeMap<String, String> {
    bind.iter()
        .map(|(k, v)| {
            let value = v
                .replace("{workdir}", &workdir.to_string_lossy())
                .replace("{manifest}", &manifest.to_string_lossy())
                .replace("{lockfile}", &lockfile.to_string_lossy())
                .replace("{install_dir}", &install_dir.to_string_lossy());
            (k.clone(), value)
        })
        .collect()
}

async fn read_lock_state(path: &Path) -> Result<Option<LockState>, PipelineError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PipelineError::setup(format!("read {}", path.display()), e)),
    };
    let digest = Sha256::digest(&bytes);
    Ok(Some(LockState {
        path: path.to_path_buf(),
        sha256: hex::encode(digest),
    }))
}
