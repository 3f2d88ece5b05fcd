use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use rbench_core::{Build, BuildId, PipelineError, Report, Target};
use rbench_storage::Storage;
use rbench_storage_sqlite::SqliteStorage;

use crate::{doctor::doctor, pipeline::Pipeline, probe::probe_runtime_version, Config};

/// A repo-scoped handle on config, storage and the pipeline.
pub struct Runner {
    pub repo_root: PathBuf,
    pub cfg: Config,
    pub storage: Arc<dyn Storage>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub builds: u64,
    pub reports: u64,
}

impl Runner {
    pub fn open(repo_root: PathBuf) -> Result<Self> {
        let cfg_path = Config::config_path(&repo_root);
        let cfg = if cfg_path.exists() {
            Config::load_from(&cfg_path)?
        } else {
            let cfg = Config::default_for_repo();
            cfg.save_to(&cfg_path)?;
            cfg
        };

        let storage = SqliteStorage::open(&Config::db_path(&repo_root))?;
        Ok(Self::with_storage(repo_root, cfg, Arc::new(storage)))
    }

    pub fn with_storage(repo_root: PathBuf, cfg: Config, storage: Arc<dyn Storage>) -> Self {
        Self { repo_root, cfg, storage }
    }

    pub fn init_repo(repo_root: &Path) -> Result<()> {
        let cfg_path = Config::config_path(repo_root);
        if !cfg_path.exists() {
            Config::default_for_repo().save_to(&cfg_path)?;
        }
        // create db
        let _ = SqliteStorage::open(&Config::db_path(repo_root))?;
        Ok(())
    }

    pub async fn doctor(&self) -> Result<()> {
        doctor(&self.repo_root, &self.cfg).await
    }

    /// Store a new build, snapshotting the host runtime version onto it.
    pub async fn create_build(&self, target: Target) -> Result<Build> {
        let runtime_version = probe_runtime_version(&self.cfg.runtime).await?;
        let build = Build::new(target, runtime_version);
        self.storage.insert_build(build.clone())?;
        tracing::info!(build_id = %build.id, runtime_version = %build.runtime_version, "build created");
        Ok(build)
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::from_config(&self.cfg, &self.repo_root, self.storage.clone())
    }

    pub async fn run(&self, build_id: &BuildId, encoded_script: &str) -> Result<Report, PipelineError> {
        self.pipeline().run(build_id, encoded_script).await
    }

    pub fn status(&self) -> Result<Status> {
        Ok(Status {
            builds: self.storage.count_builds()?,
            reports: self.storage.count_reports()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::shell_config;
    use rbench_core::Declaration;
    use tempfile::tempdir;

    #[test]
    fn init_writes_config_and_db() {
        let dir = tempdir().unwrap();
        Runner::init_repo(dir.path()).unwrap();
        assert!(Config::config_path(dir.path()).exists());
        assert!(Config::db_path(dir.path()).exists());

        let runner = Runner::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(runner.cfg.runtime.program, "ruby");
        assert_eq!(runner.status().unwrap(), Status { builds: 0, reports: 0 });
    }

    #[tokio::test]
    async fn create_build_snapshots_runtime_version() {
        let dir = tempdir().unwrap();
        shell_config(&dir.path().join("envs"))
            .save_to(&Config::config_path(dir.path()))
            .unwrap();
        let runner = Runner::open(dir.path().to_path_buf()).unwrap();

        let build = runner.create_build(vec![Declaration::named("sqlite3")]).await.unwrap();
        assert!(!build.runtime_version.is_empty());
        assert!(build.runtime_version.chars().all(|c| c.is_ascii_digit()));
        let stored = runner.storage.find_build(&build.id).unwrap().unwrap();
        assert_eq!(stored.target, build.target);
        assert_eq!(runner.status().unwrap().builds, 1);
    }
}
