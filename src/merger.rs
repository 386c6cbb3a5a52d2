use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use tracing::info;

use crate::{
    codec::RecordReader,
    common::{merge_name, result_name, KeyValue},
};

type Source = RecordReader<BufReader<File>>;

/// Combines the outputs of all `n_reduce` reduce tasks into
/// `result_name(job_name)` under `dir`, one `key: value` line per record in
/// ascending key order. Returns the path written.
///
/// Every reduce output is already sorted, so this is a streaming k-way merge
/// and never holds more than one record per reduce task in memory.
pub fn merge_outputs(dir: &Path, job_name: &str, n_reduce: usize) -> anyhow::Result<PathBuf> {
    let mut sources: Vec<(PathBuf, Source)> = Vec::with_capacity(n_reduce);
    for reduce_task in 0..n_reduce {
        let path = dir.join(merge_name(job_name, reduce_task));
        let file = File::open(&path)
            .with_context(|| format!("failed to open reduce output {}", path.display()))?;
        sources.push((path, RecordReader::new(BufReader::new(file))));
    }

    let mut heap = BinaryHeap::new();
    for (index, source) in sources.iter_mut().enumerate() {
        if let Some(kv) = next_record(source)? {
            heap.push(Reverse((kv.key, index, kv.value)));
        }
    }

    let out_path = dir.join(result_name(job_name));
    let tmp_path = dir.join(format!(".{}.tmp", result_name(job_name)));
    let written = match write_merged(&tmp_path, &mut sources, heap) {
        Ok(written) => written,
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
    };
    fs::rename(&tmp_path, &out_path).with_context(|| {
        format!("failed to move {} to {}", tmp_path.display(), out_path.display())
    })?;

    info!(job = %job_name, n_reduce, records = written, output = %out_path.display(), "merge finished");
    Ok(out_path)
}

/// Drains `heap` into `path`, refilling from the source each popped record
/// came from. The file is synced before returning.
fn write_merged(
    path: &Path,
    sources: &mut [(PathBuf, Source)],
    mut heap: BinaryHeap<Reverse<(String, usize, String)>>,
) -> anyhow::Result<usize> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);

    let mut last_key: Option<String> = None;
    let mut written = 0usize;
    while let Some(Reverse((key, index, value))) = heap.pop() {
        if last_key.as_deref() > Some(key.as_str()) {
            bail!(
                "reduce output {} is not sorted at key {:?}",
                sources[index].0.display(),
                key
            );
        }
        writeln!(out, "{}: {}", key, value)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written += 1;

        if let Some(kv) = next_record(&mut sources[index])? {
            heap.push(Reverse((kv.key, index, kv.value)));
        }
        last_key = Some(key);
    }

    out.into_inner()
        .map_err(|e| e.into_error())
        .and_then(|file| file.sync_all())
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(written)
}

fn next_record((path, source): &mut (PathBuf, Source)) -> anyhow::Result<Option<KeyValue>> {
    source
        .next()
        .transpose()
        .with_context(|| format!("failed to decode reduce output {}", path.display()))
}
