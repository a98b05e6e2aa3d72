use anyhow::{Context, Result};
use bytes::Bytes;

use crate::codec;
use crate::partition::Buckets;
use crate::scheduler::MapTask;
use crate::store::{intermediate_name, BlobStore};
use crate::{KeyValue, MapFn, Workload};

/// Execute one map unit against `store`.
///
/// Reads the input, runs the map function, routes every emitted pair to its
/// reduce bucket and writes each non-empty bucket as shard `mr-{m}-{r}`.
/// Returns the names of the shards written, in bucket order.
pub async fn perform_map<B>(
    store: &B,
    workload: Workload,
    aux: &Bytes,
    task: &MapTask,
) -> Result<Vec<String>>
where
    B: BlobStore + ?Sized,
{
    let content = store
        .read(&task.input_identifier)
        .await
        .with_context(|| format!("reading map input `{}`", task.input_identifier))?;

    let input = KeyValue::new(task.input_identifier.clone(), content);
    let buckets = partition(workload.map_fn, input, aux.clone(), task.reduce_count)
        .with_context(|| format!("mapping `{}`", task.input_identifier))?;

    let mut produced = Vec::new();
    for (bucket, records) in buckets.into_non_empty() {
        let name = intermediate_name(task.input_index, bucket);
        store
            .write(&name, codec::encode(&records))
            .await
            .with_context(|| format!("writing shard `{name}`"))?;
        produced.push(name);
    }
    Ok(produced)
}

// The map output iterator is not `Send`; it is drained here, before any await.
fn partition(map_fn: MapFn, input: KeyValue, aux: Bytes, n_reduce: u32) -> Result<Buckets> {
    let mut buckets = Buckets::new(n_reduce)?;
    for item in map_fn(input, aux)? {
        buckets.push(item?);
    }
    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::bucket_for;
    use crate::store::MemoryBlobStore;
    use crate::workload;

    fn task(input: &str, index: u32, reduce_count: u32) -> MapTask {
        MapTask {
            input_identifier: input.to_string(),
            input_index: index,
            reduce_count,
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn shards_hold_each_key_in_its_bucket() {
        let store = MemoryBlobStore::with_blobs([("pg.txt", "the cat the hat")]);
        let wc = workload::named("wc").unwrap();

        let produced = perform_map(&store, wc, &Bytes::new(), &task("pg.txt", 4, 3))
            .await
            .unwrap();
        assert!(!produced.is_empty());

        let mut seen = Vec::new();
        for bucket in 0..3 {
            let name = intermediate_name(4, bucket);
            let Ok(shard) = store.read(&name).await else {
                assert!(!produced.contains(&name));
                continue;
            };
            assert!(produced.contains(&name));
            for kv in codec::decode(shard).unwrap() {
                assert_eq!(bucket_for(&kv.key, 3), bucket);
                seen.push(String::from_utf8(kv.key.to_vec()).unwrap());
            }
        }
        seen.sort();
        assert_eq!(seen, ["cat", "hat", "the", "the"]);
    }

    #[tokio::test]
    async fn empty_input_writes_nothing() {
        let store = MemoryBlobStore::with_blobs([("empty.txt", "")]);
        let wc = workload::named("wc").unwrap();

        let produced = perform_map(&store, wc, &Bytes::new(), &task("empty.txt", 0, 2))
            .await
            .unwrap();
        assert!(produced.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn map_function_errors_surface() {
        let store = MemoryBlobStore::with_blobs([("bin", vec![0xffu8, 0xfe])]);
        let wc = workload::named("wc").unwrap();

        let err = perform_map(&store, wc, &Bytes::new(), &task("bin", 0, 1))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("mapping `bin`"));
    }
}
