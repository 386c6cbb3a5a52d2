use std::{
    fs::{self, File},
    io::BufWriter,
    path::Path,
};

use anyhow::{bail, Context};
use tracing::debug;

use crate::{
    codec::RecordWriter,
    common::{partition_of, reduce_name, KeyValue},
};

/// Runs map task `map_task` over `in_file`, splitting the emitted records
/// into one shard per reduce partition under `dir`. All `n_reduce` shards are
/// created, even the empty ones.
pub fn do_map<F>(
    dir: &Path,
    job_name: &str,
    map_task: usize,
    in_file: &Path,
    n_reduce: usize,
    map_f: F,
) -> anyhow::Result<usize>
where
    F: FnOnce(String, String) -> Vec<KeyValue>,
{
    if n_reduce == 0 {
        bail!("map task {} needs at least one reduce partition", map_task);
    }

    let contents = fs::read_to_string(in_file)
        .with_context(|| format!("failed to read {}", in_file.display()))?;
    let filename = in_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let key_values = map_f(filename, contents);

    let mut writers = (0..n_reduce)
        .map(|reduce_task| {
            let path = dir.join(reduce_name(job_name, map_task, reduce_task));
            let file = File::create(&path)
                .with_context(|| format!("failed to create shard {}", path.display()))?;
            Ok(RecordWriter::new(BufWriter::new(file)))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    for kv in &key_values {
        writers[partition_of(&kv.key, n_reduce)]
            .write(kv)
            .with_context(|| format!("map task {} failed to write shard", map_task))?;
    }

    for (reduce_task, writer) in writers.into_iter().enumerate() {
        writer
            .into_inner()
            .into_inner()
            .map_err(|e| e.into_error())
            .and_then(|file| file.sync_all())
            .with_context(|| {
                format!(
                    "failed to flush shard {}",
                    reduce_name(job_name, map_task, reduce_task)
                )
            })?;
    }

    debug!(
        job = %job_name,
        map_task,
        input = %in_file.display(),
        records = key_values.len(),
        "map task finished"
    );
    Ok(key_values.len())
}
