use anyhow::{anyhow, Context, Result};
use std::path::Path;

use crate::util::spawnable;
use crate::Config;

/// Check that this host can run benchmarks with `cfg`.
pub async fn doctor(repo_root: &Path, cfg: &Config) -> Result<()> {
    if !spawnable(&cfg.runtime.program).await {
        return Err(anyhow!(
            "runtime `{}` not found on PATH; set [runtime].program in {}",
            cfg.runtime.program,
            Config::config_path(repo_root).display()
        ));
    }

    if !spawnable(&cfg.resolver.program).await {
        return Err(anyhow!(
            "resolver `{}` not found on PATH; set [resolver].program in {}",
            cfg.resolver.program,
            Config::config_path(repo_root).display()
        ));
    }

    // work root must accept new environments
    let root = cfg.work_root(repo_root);
    std::fs::create_dir_all(&root).with_context(|| format!("create work root {}", root.display()))?;
    tempfile::Builder::new()
        .prefix("doctor-")
        .tempdir_in(&root)
        .with_context(|| format!("work root {} is not writable", root.display()))?;
    Ok(())
}
