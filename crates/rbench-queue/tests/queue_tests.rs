use std::sync::Arc;

use rbench_core::{Build, BuildId, ErrorKind};
use rbench_queue::{BenchmarkJob, RetryPolicy, WorkQueue};
use rbench_runner::fixtures::shell_config;
use rbench_runner::{encode_script, Config, Pipeline};
use rbench_storage::{InMemoryStorage, Storage};
use tempfile::tempdir;

fn setup(cfg: &Config, root: &std::path::Path) -> (Arc<dyn Storage>, Arc<Pipeline>, BuildId) {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let build_id = storage.insert_build(Build::new(vec![], "3.3.0")).unwrap();
    let pipeline = Arc::new(Pipeline::from_config(cfg, root, storage.clone()));
    (storage, pipeline, build_id)
}

#[tokio::test]
async fn runs_every_job_across_workers() {
    let dir = tempdir().unwrap();
    let cfg = shell_config(&dir.path().join("envs"));
    let (storage, pipeline, build_id) = setup(&cfg, dir.path());

    let jobs: Vec<_> = (0..5)
        .map(|i| BenchmarkJob::new(build_id.clone(), encode_script(&format!("echo '{{\"i\":{i}}}'"))))
        .collect();
    let outcomes = WorkQueue::new(pipeline, 2)
        .with_policy(RetryPolicy::immediate(3))
        .run_all(jobs)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 5);
    assert!(outcomes.iter().all(|o| o.result.is_ok() && o.attempts == 1));
    assert_eq!(storage.count_reports().unwrap(), 5);
}

#[tokio::test]
async fn deterministic_failure_is_not_retried() {
    let dir = tempdir().unwrap();
    let cfg = shell_config(&dir.path().join("envs"));
    let (storage, pipeline, _) = setup(&cfg, dir.path());

    let job = BenchmarkJob::new(BuildId::from_str("missing"), encode_script("echo '{}'"));
    let outcomes = WorkQueue::new(pipeline, 1)
        .with_policy(RetryPolicy::immediate(3))
        .run_all(vec![job])
        .await
        .unwrap();

    assert_eq!(outcomes[0].attempts, 1);
    assert_eq!(outcomes[0].result.as_ref().unwrap_err().kind(), ErrorKind::BuildNotFound);
    assert_eq!(storage.count_reports().unwrap(), 0);
}

#[tokio::test]
async fn crashing_script_uses_every_attempt() {
    let dir = tempdir().unwrap();
    let cfg = shell_config(&dir.path().join("envs"));
    let (storage, pipeline, build_id) = setup(&cfg, dir.path());

    let job = BenchmarkJob::new(build_id, encode_script("exit 3"));
    let outcomes = WorkQueue::new(pipeline, 1)
        .with_policy(RetryPolicy::immediate(3))
        .run_all(vec![job])
        .await
        .unwrap();

    assert_eq!(outcomes[0].attempts, 3);
    assert_eq!(outcomes[0].result.as_ref().unwrap_err().kind(), ErrorKind::ScriptExecution);
    assert_eq!(storage.count_reports().unwrap(), 0);
}

#[tokio::test]
async fn flaky_resolution_succeeds_on_retry() {
    let dir = tempdir().unwrap();
    let marker = dir.path().join("resolved-once");
    let mut cfg = shell_config(&dir.path().join("envs"));
    cfg.environment
        .bind
        .insert("RBENCH_FLAKE_MARKER".into(), marker.to_string_lossy().into_owned());
    cfg.resolver.args = vec![
        "-c".into(),
        r#"if [ ! -f "$RBENCH_FLAKE_MARKER" ]; then touch "$RBENCH_FLAKE_MARKER"; echo 'Net::OpenTimeout' >&2; exit 1; fi; cp Gemfile Gemfile.lock"#
            .into(),
    ];
    let (storage, pipeline, build_id) = setup(&cfg, dir.path());

    let job = BenchmarkJob::new(build_id, encode_script("echo '{\"ok\":true}'"));
    let outcomes = WorkQueue::new(pipeline, 1)
        .with_policy(RetryPolicy::immediate(3))
        .run_all(vec![job])
        .await
        .unwrap();

    assert_eq!(outcomes[0].attempts, 2);
    assert!(outcomes[0].result.is_ok());
    assert_eq!(storage.count_reports().unwrap(), 1);
}

#[test]
fn jobs_deserialize_without_an_id() {
    let job: BenchmarkJob = serde_json::from_str(r#"{"build_id":"b1","encoded_script":"ZWNobyB7fQ=="}"#).unwrap();
    assert_eq!(job.build_id.as_str(), "b1");
    assert!(!job.id.as_str().is_empty());
}
