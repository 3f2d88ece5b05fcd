use std::sync::Arc;

use anyhow::{anyhow, Result};
use rbench_core::{BuildId, JobId, PipelineError, Report};
use rbench_runner::Pipeline;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};

use crate::{RetryDecision, RetryPolicy};

/// One request to run a script against a build.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BenchmarkJob {
    #[serde(default)]
    pub id: JobId,
    pub build_id: BuildId,
    /// Base64 script source.
    pub encoded_script: String,
}

impl BenchmarkJob {
    pub fn new(build_id: BuildId, encoded_script: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            build_id,
            encoded_script: encoded_script.into(),
        }
    }

    /// A single attempt; retries are the queue's business.
    pub async fn perform(&self, pipeline: &Pipeline) -> Result<Report, PipelineError> {
        pipeline.run(&self.build_id, &self.encoded_script).await
    }
}

#[derive(Debug)]
pub struct JobOutcome {
    pub job: BenchmarkJob,
    pub attempts: u32,
    pub result: Result<Report, PipelineError>,
}

/// Dispatches jobs to a fixed number of workers sharing one pipeline.
pub struct WorkQueue {
    pipeline: Arc<Pipeline>,
    concurrency: usize,
    policy: RetryPolicy,
}

/// A started queue. Submit jobs, then `finish` to collect every outcome.
pub struct QueueHandle {
    jobs: mpsc::Sender<BenchmarkJob>,
    outcomes: mpsc::UnboundedReceiver<JobOutcome>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkQueue {
    pub fn new(pipeline: Arc<Pipeline>, concurrency: usize) -> Self {
        Self {
            pipeline,
            concurrency: concurrency.max(1),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn start(self) -> QueueHandle {
        let (job_tx, job_rx) = mpsc::channel::<BenchmarkJob>(self.concurrency * 2);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let workers = (0..self.concurrency)
            .map(|n| {
                let jobs = job_rx.clone();
                let outcomes = out_tx.clone();
                let pipeline = self.pipeline.clone();
                let policy = self.policy.clone();
                tokio::spawn(
                    async move {
                        loop {
                            let next = jobs.lock().await.recv().await;
                            let Some(job) = next else { break };
                            let outcome = run_with_retries(&pipeline, &policy, job).await;
                            if outcomes.send(outcome).is_err() {
                                break;
                            }
                        }
                    }
                    .instrument(info_span!("worker", worker = n)),
                )
            })
            .collect();

        QueueHandle {
            jobs: job_tx,
            outcomes: out_rx,
            workers,
        }
    }

    /// Run every job in `jobs` and return their outcomes in completion order.
    pub async fn run_all(self, jobs: Vec<BenchmarkJob>) -> Result<Vec<JobOutcome>> {
        let mut handle = self.start();
        for job in jobs {
            handle.submit(job).await?;
        }
        handle.finish().await
    }
}

impl QueueHandle {
    pub async fn submit(&mut self, job: BenchmarkJob) -> Result<()> {
        self.jobs
            .send(job)
            .await
            .map_err(|e| anyhow!("queue closed; job {} not accepted", e.0.id))
    }

    /// Stop accepting jobs, wait for the workers to drain the queue and
    /// return all outcomes.
    pub async fn finish(self) -> Result<Vec<JobOutcome>> {
        let QueueHandle {
            jobs,
            mut outcomes,
            workers,
        } = self;
        drop(jobs);
        for worker in workers {
            worker.await.map_err(|e| anyhow!("worker panicked: {e}"))?;
        }
        let mut out = vec![];
        while let Some(outcome) = outcomes.recv().await {
            out.push(outcome);
        }
        Ok(out)
    }
}

async fn run_with_retries(pipeline: &Pipeline, policy: &RetryPolicy, job: BenchmarkJob) -> JobOutcome {
    let span = info_span!("job", job_id = %job.id, build_id = %job.build_id);
    async move {
        let mut attempt = 1;
        loop {
            let result = job.perform(pipeline).await;
            let err = match result {
                Ok(report) => {
                    info!(attempt, report_id = %report.id, "job done");
                    return JobOutcome {
                        job,
                        attempts: attempt,
                        result: Ok(report),
                    };
                }
                Err(err) => err,
            };
            match policy.decide(&err, attempt) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(attempt, kind = %err.kind(), delay_ms = delay.as_millis() as u64, "job failed; retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::GiveUp { reason } => {
                    warn!(attempt, %reason, error = %err, "job failed; giving up");
                    return JobOutcome {
                        job,
                        attempts: attempt,
                        result: Err(err),
                    };
                }
            }
        }
    }
    .instrument(span)
    .await
}
