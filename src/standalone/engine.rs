use std::sync::Arc;

use anyhow::{ensure, Result};
use bytes::Bytes;
use tokio::task::JoinSet;
use tracing::info;

use super::Job;
use crate::scheduler::{JobSnapshot, Scheduler, SchedulerConfig};
use crate::store::{BlobStore, LocalBlobStore};
use crate::worker::{Worker, WorkerConfig};
use crate::{utils, workload, Workload};

/// Run `job` against a blob store rooted at its output directory.
pub async fn run_job(job: &Job) -> Result<JobSnapshot> {
    let workload = workload::named(&job.workload)?;
    let inputs = utils::expand_inputs(&[&job.input])?;
    let aux = utils::encode_aux_args(&job.args)?;
    let store = Arc::new(LocalBlobStore::new(&job.output));
    info!(
        inputs = inputs.len(),
        n_reduce = job.n_reduce,
        workers = job.workers,
        output = %job.output.display(),
        "starting standalone job"
    );

    let config = SchedulerConfig {
        n_reduce: job.n_reduce,
        ..Default::default()
    };
    run_with_store(inputs, store, workload, aux, config, job.workers, WorkerConfig::default()).await
}

/// Drive a job over `inputs` with `workers` concurrent workers sharing one
/// scheduler and one store. Returns the final state of every unit.
pub async fn run_with_store<B>(
    inputs: Vec<String>,
    store: Arc<B>,
    workload: Workload,
    aux: Bytes,
    config: SchedulerConfig,
    workers: usize,
    worker_config: WorkerConfig,
) -> Result<JobSnapshot>
where
    B: BlobStore + 'static,
{
    let scheduler = Arc::new(Scheduler::new(inputs, config)?);

    let mut tasks = JoinSet::new();
    for _ in 0..workers.max(1) {
        let worker = Worker::new(scheduler.clone(), store.clone(), workload, aux.clone())
            .with_config(worker_config.clone());
        tasks.spawn(async move { worker.run().await });
    }
    while let Some(joined) = tasks.join_next().await {
        let summary = joined??;
        info!(?summary, "worker finished");
    }

    ensure!(scheduler.is_done(), "every worker exited before the job was done");
    Ok(scheduler.snapshot())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::scheduler::Phase;
    use crate::store::{MemoryBlobStore, OUTPUT_PREFIX};
    use tempfile::TempDir;

    fn fast() -> WorkerConfig {
        WorkerConfig {
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
        }
    }

    async fn output_lines<B: BlobStore>(store: &B) -> Vec<String> {
        let mut lines = Vec::new();
        for name in store.list(OUTPUT_PREFIX).await.unwrap() {
            let content = utils::string_from_bytes(store.read(&name).await.unwrap()).unwrap();
            lines.extend(content.lines().map(str::to_string));
        }
        lines.sort();
        lines
    }

    #[tokio::test]
    async fn many_workers_produce_each_key_once() {
        let animals = ["ant", "bee", "cat"];
        let inputs: Vec<(String, String)> = (0..12u8)
            .map(|i| {
                let unique = format!("u{}", char::from(b'a' + i));
                let text = format!("common {unique} {}", animals[i as usize % 3]);
                (format!("in-{i}"), text)
            })
            .collect();
        let names = inputs.iter().map(|(name, _)| name.clone()).collect();
        let store = Arc::new(MemoryBlobStore::with_blobs(inputs));

        let config = SchedulerConfig {
            n_reduce: 4,
            ..Default::default()
        };
        let snapshot = run_with_store(
            names,
            store.clone(),
            workload::named("wc").unwrap(),
            Bytes::new(),
            config,
            5,
            fast(),
        )
        .await
        .unwrap();
        assert_eq!(snapshot.phase, Phase::Done);
        assert_eq!(snapshot.reduce_units.len(), 4);
        assert_eq!(snapshot.maps_remaining + snapshot.reduces_remaining, 0);

        let lines = output_lines(&*store).await;
        assert_eq!(lines.len(), 1 + 12 + 3);
        for expected in ["common 12", "ant 4", "cat 4", "ua 1", "ul 1"] {
            assert!(lines.contains(&expected.to_string()), "{expected} in {lines:?}");
        }
    }

    #[tokio::test]
    async fn single_bucket_holds_every_key() {
        let store = Arc::new(MemoryBlobStore::with_blobs([("x", "b a b"), ("y", "c")]));
        let config = SchedulerConfig {
            n_reduce: 1,
            ..Default::default()
        };
        run_with_store(
            vec!["x".into(), "y".into()],
            store.clone(),
            workload::named("wc").unwrap(),
            Bytes::new(),
            config,
            2,
            fast(),
        )
        .await
        .unwrap();

        assert_eq!(store.list(OUTPUT_PREFIX).await.unwrap(), ["mr-out-0"]);
        assert_eq!(store.read("mr-out-0").await.unwrap(), "a 1\nb 2\nc 1\n");
    }

    #[tokio::test]
    async fn job_runs_from_disk_to_disk() {
        let input_dir = TempDir::new().unwrap();
        let output_dir = TempDir::new().unwrap();
        std::fs::write(input_dir.path().join("1.txt"), "roses are red\n").unwrap();
        std::fs::write(input_dir.path().join("2.txt"), "violets are blue\nred alert\n").unwrap();

        let job = Job {
            input: format!("{}/*.txt", input_dir.path().display()),
            workload: "grep".into(),
            output: output_dir.path().to_path_buf(),
            n_reduce: 2,
            workers: 2,
            args: vec!["--term".into(), "red".into()],
        };
        let snapshot = run_job(&job).await.unwrap();
        assert_eq!(snapshot.map_units.len(), 2);
        assert_eq!(snapshot.phase, Phase::Done);

        let store = LocalBlobStore::new(output_dir.path());
        let lines = output_lines(&store).await;
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().any(|l| l.ends_with("1.txt:1 roses are red")));
        assert!(lines.iter().any(|l| l.ends_with("2.txt:2 red alert")));
    }

    #[tokio::test]
    async fn empty_input_set_still_finishes() {
        let store = Arc::new(MemoryBlobStore::new());
        let config = SchedulerConfig {
            n_reduce: 3,
            ..Default::default()
        };
        let snapshot = run_with_store(
            vec![],
            store.clone(),
            workload::named("wc").unwrap(),
            Bytes::new(),
            config,
            2,
            fast(),
        )
        .await
        .unwrap();
        assert_eq!(snapshot.phase, Phase::Done);
        assert_eq!(store.list(OUTPUT_PREFIX).await.unwrap().len(), 3);
    }
}
