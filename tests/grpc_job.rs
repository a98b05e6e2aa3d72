//! A whole job over real gRPC: coordinator on an ephemeral port, workers
//! talking to it through `RemoteCoordinator`, blobs in a temporary directory.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use mapred::coordinator;
use mapred::rpc::RemoteCoordinator;
use mapred::scheduler::{Phase, Scheduler, SchedulerConfig, UnitStatus};
use mapred::store::{BlobStore, LocalBlobStore, OUTPUT_PREFIX};
use mapred::worker::{Worker, WorkerConfig};
use mapred::workload;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

fn fast() -> WorkerConfig {
    WorkerConfig {
        min_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(50),
    }
}

async fn start_coordinator(
    inputs: Vec<String>,
    n_reduce: u32,
) -> (Arc<Scheduler>, SocketAddr, JoinHandle<anyhow::Result<()>>) {
    let config = SchedulerConfig {
        n_reduce,
        ..Default::default()
    };
    let scheduler = Arc::new(Scheduler::new(inputs, config).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(coordinator::serve_with_listener(
        scheduler.clone(),
        listener,
        Duration::from_millis(500),
    ));
    (scheduler, addr, server)
}

fn write_inputs(dir: &TempDir, contents: &[&str]) -> Vec<String> {
    contents
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let name = format!("in-{i}.txt");
            std::fs::write(dir.path().join(&name), text).unwrap();
            name
        })
        .collect()
}

async fn run_workers(addr: SocketAddr, dir: &TempDir, count: usize) {
    let mut handles = Vec::new();
    for _ in 0..count {
        let source = RemoteCoordinator::connect(&addr.to_string()).await.unwrap();
        let store = LocalBlobStore::new(dir.path());
        let worker = Worker::new(source, store, workload::named("wc").unwrap(), Bytes::new())
            .with_config(fast());
        handles.push(tokio::spawn(async move { worker.run().await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
}

async fn outputs(dir: &TempDir) -> Vec<(String, Vec<String>)> {
    let store = LocalBlobStore::new(dir.path());
    let mut outputs = Vec::new();
    for name in store.list(OUTPUT_PREFIX).await.unwrap() {
        let content = String::from_utf8(store.read(&name).await.unwrap().to_vec()).unwrap();
        outputs.push((name, content.lines().map(str::to_string).collect()));
    }
    outputs
}

#[tokio::test]
async fn word_count_over_grpc() {
    let dir = TempDir::new().unwrap();
    let inputs = write_inputs(&dir, &["a b a", "b c", "a"]);
    let (scheduler, addr, server) = start_coordinator(inputs, 2).await;

    run_workers(addr, &dir, 2).await;
    assert!(scheduler.is_done());

    let client = RemoteCoordinator::connect(&addr.to_string()).await.unwrap();
    assert!(client.is_done().await.unwrap());
    let status = client.status().await.unwrap();
    assert_eq!(status.phase, Phase::Done);
    assert!(status
        .map_units
        .iter()
        .all(|unit| unit.status == UnitStatus::Completed));

    let outputs = outputs(&dir).await;
    assert_eq!(outputs.len(), 2);
    let mut lines: Vec<_> = outputs.iter().flat_map(|(_, lines)| lines.clone()).collect();
    lines.sort();
    assert_eq!(lines, ["a 3", "b 2", "c 1"]);
    for key in ["a", "b", "c"] {
        let holders = outputs
            .iter()
            .filter(|(_, lines)| lines.iter().any(|l| l.starts_with(&format!("{key} "))))
            .count();
        assert_eq!(holders, 1, "{key} appears in more than one bucket");
    }

    drop(client);
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("coordinator did not shut down after the job")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn single_bucket_over_grpc() {
    let dir = TempDir::new().unwrap();
    let inputs = write_inputs(&dir, &["x y", "y z z"]);
    let (_scheduler, addr, server) = start_coordinator(inputs, 1).await;

    run_workers(addr, &dir, 1).await;

    let outputs = outputs(&dir).await;
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].0, "mr-out-0");
    assert_eq!(outputs[0].1, ["x 1", "y 2", "z 2"]);

    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn crashed_worker_unit_is_reclaimed() {
    let dir = TempDir::new().unwrap();
    let inputs = write_inputs(&dir, &["p q", "q"]);
    let config = SchedulerConfig {
        n_reduce: 2,
        task_timeout: Duration::from_millis(200),
    };
    let scheduler = Arc::new(Scheduler::new(inputs, config).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(coordinator::serve_with_listener(
        scheduler.clone(),
        listener,
        Duration::from_millis(500),
    ));

    // A worker that takes a unit and never reports back.
    let ghost = RemoteCoordinator::connect(&addr.to_string()).await.unwrap();
    let taken = mapred::worker::TaskSource::assign_map_unit(&ghost)
        .await
        .unwrap()
        .assignment
        .unit()
        .unwrap();
    assert_eq!(taken.input_index, 0);

    run_workers(addr, &dir, 1).await;
    assert!(scheduler.is_done());

    let mut lines: Vec<_> = outputs(&dir)
        .await
        .into_iter()
        .flat_map(|(_, lines)| lines)
        .collect();
    lines.sort();
    assert_eq!(lines, ["p 1", "q 2"]);

    drop(ghost);
    server.await.unwrap().unwrap();
}
