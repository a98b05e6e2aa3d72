use anyhow::{Context, Result};
use bytes::{BufMut, Bytes, BytesMut};
use itertools::Itertools;
use tracing::debug;

use crate::codec;
use crate::scheduler::ReduceTask;
use crate::store::{intermediate_name, output_name, BlobStore};
use crate::{KeyValue, ReduceFn, Workload};

/// Execute one reduce unit against `store`.
///
/// Merges shard `mr-{m}-{r}` of every map unit `m`, groups the records by key
/// and writes one `key result` line per distinct key to `mr-out-{r}`. A missing
/// shard means that map unit emitted nothing for this bucket.
/// Returns the name of the output blob.
pub async fn perform_reduce<B>(
    store: &B,
    workload: Workload,
    aux: &Bytes,
    task: &ReduceTask,
) -> Result<String>
where
    B: BlobStore + ?Sized,
{
    let mut records = Vec::new();
    for map_index in 0..task.map_unit_count {
        let name = intermediate_name(map_index, task.bucket_index);
        match store.read(&name).await {
            Ok(shard) => {
                let decoded =
                    codec::decode(shard).with_context(|| format!("decoding shard `{name}`"))?;
                records.extend(decoded);
            }
            Err(e) if e.is_not_found() => debug!(shard = %name, "no shard, bucket is empty"),
            Err(e) => return Err(e).with_context(|| format!("reading shard `{name}`")),
        }
    }

    let output = reduce_records(workload.reduce_fn, records, aux)
        .with_context(|| format!("reducing bucket {}", task.bucket_index))?;

    let name = output_name(task.bucket_index);
    store
        .write(&name, output)
        .await
        .with_context(|| format!("writing output `{name}`"))?;
    Ok(name)
}

fn reduce_records(reduce_fn: ReduceFn, mut records: Vec<KeyValue>, aux: &Bytes) -> Result<Bytes> {
    // Stable, so values keep their shard order within a key.
    records.sort_by_key(KeyValue::key);

    let mut out = BytesMut::new();
    for (key, group) in &records.into_iter().chunk_by(KeyValue::key) {
        let result = reduce_fn(key.clone(), Box::new(group.map(KeyValue::into_value)), aux.clone())?;
        out.put_slice(&key);
        out.put_u8(b' ');
        out.put_slice(&result);
        out.put_u8(b'\n');
    }
    Ok(out.freeze())
}
