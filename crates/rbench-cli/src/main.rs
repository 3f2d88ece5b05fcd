use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rbench_core::{parse_target, BuildId};
use rbench_queue::{BenchmarkJob, WorkQueue};
use rbench_runner::{encode_script, Runner};
use rbench_storage::Storage;

#[derive(Parser)]
#[command(name = "rbench", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize rbench in the current directory (creates .rbench/, config, db)
    Init,

    /// Check that the runtime and resolver are usable
    Doctor,

    /// Show build and report counts
    Status,

    /// Manage builds
    #[command(subcommand)]
    Build(BuildCommand),

    /// Run one script against a build and store its report
    Run {
        #[arg(long)]
        build: String,
        #[command(flatten)]
        script: ScriptArg,
        /// Override [execution].timeout_secs for this run
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Print stored reports as JSON lines
    Reports {
        #[arg(long)]
        build: Option<String>,
    },

    /// Run a file of jobs, one JSON object per line: {"build_id": ..., "encoded_script": ...}
    Batch {
        #[arg(long)]
        jobs: PathBuf,
        #[arg(long, default_value_t = 2)]
        concurrency: usize,
    },
}

#[derive(Subcommand)]
enum BuildCommand {
    /// Create a build from a JSON target, e.g. '[["sqlite3"], ["rails", "4.0.0"]]'
    Add {
        #[arg(long)]
        target: String,
    },
    /// List builds
    List,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ScriptArg {
    /// Path to the script source
    #[arg(long)]
    script: Option<PathBuf>,
    /// Base64 script source
    #[arg(long)]
    encoded: Option<String>,
}

impl ScriptArg {
    fn encoded(&self) -> anyhow::Result<String> {
        match (&self.script, &self.encoded) {
            (Some(path), _) => {
                let source = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
                Ok(encode_script(&source))
            }
            (None, Some(encoded)) => Ok(encoded.clone()),
            (None, None) => Err(anyhow!("one of --script or --encoded is required")),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let repo_root = std::env::current_dir()?;

    match cli.cmd {
        Command::Init => {
            Runner::init_repo(&repo_root)?;
            println!("Initialized rbench in {}", repo_root.display());
        }
        Command::Doctor => {
            let r = Runner::open(repo_root)?;
            r.doctor().await?;
            println!("OK");
        }
        Command::Status => {
            let r = Runner::open(repo_root)?;
            let status = r.status()?;
            println!("Builds: {}", status.builds);
            println!("Reports: {}", status.reports);
        }
        Command::Build(BuildCommand::Add { target }) => {
            let r = Runner::open(repo_root)?;
            let target = parse_target(&target)?;
            let build = r.create_build(target).await?;
            println!("Added build {} (runtime {})", build.id, build.runtime_version);
        }
        Command::Build(BuildCommand::List) => {
            let r = Runner::open(repo_root)?;
            for b in r.storage.list_builds()? {
                println!("- {} [{}] {}", b.id, b.runtime_version, serde_json::to_string(&b.target)?);
            }
        }
        Command::Run {
            build,
            script,
            timeout_secs,
        } => {
            let mut r = Runner::open(repo_root)?;
            if timeout_secs.is_some() {
                r.cfg.execution.timeout_secs = timeout_secs;
            }
            let encoded = script.encoded()?;
            match r.run(&BuildId::from_str(build), &encoded).await {
                Ok(report) => println!("{}", serde_json::to_string(&report.payload)?),
                Err(err) => bail!("run failed [{}]: {err}", err.kind()),
            }
        }
        Command::Reports { build } => {
            let r = Runner::open(repo_root)?;
            let reports = match build {
                Some(id) => r.storage.reports_for_build(&BuildId::from_str(id))?,
                None => {
                    let mut all = vec![];
                    for b in r.storage.list_builds()? {
                        all.extend(r.storage.reports_for_build(&b.id)?);
                    }
                    all
                }
            };
            for report in reports {
                println!("{}", serde_json::to_string(&report.payload)?);
            }
        }
        Command::Batch { jobs, concurrency } => {
            let r = Runner::open(repo_root)?;
            let text = std::fs::read_to_string(&jobs).with_context(|| format!("read {}", jobs.display()))?;
            let mut parsed = vec![];
            for (n, line) in text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
                let job: BenchmarkJob =
                    serde_json::from_str(line).with_context(|| format!("{}:{}: bad job", jobs.display(), n + 1))?;
                parsed.push(job);
            }

            let outcomes = WorkQueue::new(Arc::new(r.pipeline()), concurrency).run_all(parsed).await?;
            let mut failed = 0;
            for o in &outcomes {
                match &o.result {
                    Ok(report) => println!("ok   {} build={} report={} attempts={}", o.job.id, o.job.build_id, report.id, o.attempts),
                    Err(err) => {
                        failed += 1;
                        println!("fail {} build={} [{}] attempts={}: {err}", o.job.id, o.job.build_id, err.kind(), o.attempts);
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} of {} job(s) failed", outcomes.len());
            }
        }
    }

    Ok(())
}
