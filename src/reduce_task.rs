use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{self, BufReader, BufWriter},
    path::{Path, PathBuf},
    time::Instant,
};

use tracing::{debug, info};

use crate::{
    codec::{RecordReader, RecordWriter},
    common::{reduce_name, KeyValue},
    error::ReduceError,
};

/// Runs reduce task `reduce_task` of `job_name` with shards resolved against
/// the current directory.
///
/// Reads the shards of all `n_map` map tasks, groups values by key and calls
/// `reduce_f` once per distinct key in ascending byte order, appending one
/// record per key to `out_file`.
pub fn run_reduce<F>(
    job_name: &str,
    reduce_task: usize,
    out_file: impl AsRef<Path>,
    n_map: usize,
    reduce_f: F,
) -> Result<(), ReduceError>
where
    F: FnMut(String, Vec<String>) -> String,
{
    ReduceTask::new(job_name, reduce_task, n_map, out_file.as_ref())
        .run(reduce_f)
        .map(|_| ())
}

#[derive(Debug, Clone)]
pub struct ReduceTask {
    pub job_name: String,
    pub reduce_task: usize,
    pub n_map: usize,
    pub out_file: PathBuf,
    /// directory the shard names are resolved against
    pub shard_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReduceSummary {
    pub records_in: usize,
    pub keys_out: usize,
}

impl ReduceTask {
    pub fn new(
        job_name: impl Into<String>,
        reduce_task: usize,
        n_map: usize,
        out_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            reduce_task,
            n_map,
            out_file: out_file.into(),
            shard_dir: PathBuf::from("."),
        }
    }

    pub fn with_shard_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shard_dir = dir.into();
        self
    }

    pub fn shard_path(&self, map_task: usize) -> PathBuf {
        self.shard_dir
            .join(reduce_name(&self.job_name, map_task, self.reduce_task))
    }

    /// Every shard is merged before the first call to `reduce_f`, and the
    /// output file is only opened once all shards decoded cleanly.
    pub fn run<F>(&self, mut reduce_f: F) -> Result<ReduceSummary, ReduceError>
    where
        F: FnMut(String, Vec<String>) -> String,
    {
        let started = Instant::now();

        let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
        let mut records_in = 0;
        for map_task in 0..self.n_map {
            let path = self.shard_path(map_task);
            let count = read_shard(&path, &mut grouped)?;
            debug!(shard = %path.display(), records = count, "shard merged");
            records_in += count;
        }

        let mut grouped: Vec<(String, Vec<String>)> = grouped.into_iter().collect();
        grouped.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let mut writer = open_output(&self.out_file)?;
        for (key, values) in grouped {
            let value = reduce_f(key.clone(), values);
            writer
                .write(&KeyValue { key, value })
                .map_err(|source| self.output_error(source))?;
        }
        let keys_out = writer.written();
        finish_output(writer).map_err(|source| self.output_error(source))?;

        info!(
            job = %self.job_name,
            reduce_task = self.reduce_task,
            records_in,
            keys_out,
            elapsed = ?started.elapsed(),
            "reduce task finished"
        );

        Ok(ReduceSummary {
            records_in,
            keys_out,
        })
    }

    fn output_error(&self, source: io::Error) -> ReduceError {
        ReduceError::OutputWrite {
            path: self.out_file.clone(),
            source,
        }
    }
}

/// Appends the values of every record in `path` to `grouped`, in file order.
fn read_shard(
    path: &Path,
    grouped: &mut HashMap<String, Vec<String>>,
) -> Result<usize, ReduceError> {
    let file = File::open(path).map_err(|source| ReduceError::ShardUnavailable {
        path: path.to_path_buf(),
        source,
    })?;

    let mut count = 0;
    for record in RecordReader::new(BufReader::new(file)) {
        let kv = record.map_err(|err| {
            if err.is_io() {
                ReduceError::ShardUnavailable {
                    path: path.to_path_buf(),
                    source: io::Error::from(err),
                }
            } else {
                ReduceError::MalformedRecord {
                    path: path.to_path_buf(),
                    record: count,
                    source: err,
                }
            }
        })?;
        grouped.entry(kv.key).or_default().push(kv.value);
        count += 1;
    }
    Ok(count)
}

fn open_output(path: &Path) -> Result<RecordWriter<BufWriter<File>>, ReduceError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| ReduceError::OutputWrite {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(RecordWriter::new(BufWriter::new(file)))
}

fn finish_output(writer: RecordWriter<BufWriter<File>>) -> io::Result<()> {
    let file = writer.into_inner().into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_shard(dir: &Path, job: &str, map_task: usize, reduce_task: usize, kvs: &[(&str, &str)]) {
        let mut writer = RecordWriter::new(Vec::new());
        for (k, v) in kvs {
            writer.write(&KeyValue::new(*k, *v)).unwrap();
        }
        fs::write(
            dir.join(reduce_name(job, map_task, reduce_task)),
            writer.into_inner(),
        )
        .unwrap();
    }

    fn read_output(path: &Path) -> Vec<(String, String)> {
        let file = File::open(path).unwrap();
        RecordReader::new(BufReader::new(file))
            .map(|r| {
                let kv = r.unwrap();
                (kv.key, kv.value)
            })
            .collect()
    }

    fn sum(_key: String, values: Vec<String>) -> String {
        values
            .iter()
            .map(|v| v.parse::<i64>().unwrap())
            .sum::<i64>()
            .to_string()
    }

    fn task(dir: &TempDir, job: &str, n_map: usize) -> ReduceTask {
        ReduceTask::new(job, 0, n_map, dir.path().join("out")).with_shard_dir(dir.path())
    }

    #[test]
    fn sums_values_across_shards() {
        let dir = TempDir::new().unwrap();
        write_shard(dir.path(), "job", 0, 0, &[("a", "1"), ("b", "2")]);
        write_shard(dir.path(), "job", 1, 0, &[("a", "3")]);

        let summary = task(&dir, "job", 2).run(sum).unwrap();

        assert_eq!(summary, ReduceSummary { records_in: 3, keys_out: 2 });
        assert_eq!(
            read_output(&dir.path().join("out")),
            vec![("a".into(), "4".into()), ("b".into(), "2".into())]
        );
    }

    #[test]
    fn empty_partition_writes_empty_output() {
        let dir = TempDir::new().unwrap();
        write_shard(dir.path(), "job", 0, 0, &[]);
        write_shard(dir.path(), "job", 1, 0, &[]);

        let summary = task(&dir, "job", 2).run(sum).unwrap();

        assert_eq!(summary.keys_out, 0);
        let out = dir.path().join("out");
        assert!(out.exists());
        assert!(fs::read(out).unwrap().is_empty());
    }

    #[test]
    fn missing_shard_fails_without_output() {
        let dir = TempDir::new().unwrap();
        write_shard(dir.path(), "job", 0, 0, &[("a", "1")]);

        let err = task(&dir, "job", 2).run(sum).unwrap_err();

        assert!(matches!(err, ReduceError::ShardUnavailable { .. }));
        assert!(err.is_input_error());
        assert_eq!(err.path(), &dir.path().join(reduce_name("job", 1, 0)));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn malformed_record_aborts_task() {
        let dir = TempDir::new().unwrap();
        write_shard(dir.path(), "job", 0, 0, &[("a", "1")]);
        fs::write(
            dir.path().join(reduce_name("job", 1, 0)),
            "{\"Key\":\"a\",\"Value\":\"2\"}\nnot json\n",
        )
        .unwrap();

        let mut calls = 0;
        let err = task(&dir, "job", 2)
            .run(|k, v| {
                calls += 1;
                sum(k, v)
            })
            .unwrap_err();

        match err {
            ReduceError::MalformedRecord { record, .. } => assert_eq!(record, 1),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls, 0);
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn invalid_utf8_is_a_malformed_record() {
        let dir = TempDir::new().unwrap();
        let mut bytes = b"{\"Key\":\"a\",\"Value\":\"".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(b"\"}\n");
        fs::write(dir.path().join(reduce_name("job", 0, 0)), bytes).unwrap();

        let err = task(&dir, "job", 1).run(sum).unwrap_err();

        match err {
            ReduceError::MalformedRecord { record, .. } => assert_eq!(record, 0),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn read_failure_is_an_unavailable_shard() {
        let dir = TempDir::new().unwrap();
        write_shard(dir.path(), "job", 0, 0, &[("a", "1")]);
        fs::create_dir(dir.path().join(reduce_name("job", 1, 0))).unwrap();

        let err = task(&dir, "job", 2).run(sum).unwrap_err();

        match &err {
            ReduceError::ShardUnavailable { path, source } => {
                assert_eq!(path, &dir.path().join(reduce_name("job", 1, 0)));
                assert_eq!(source.kind(), io::ErrorKind::IsADirectory);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn groups_all_values_once_per_key() {
        let dir = TempDir::new().unwrap();
        write_shard(dir.path(), "job", 0, 0, &[("k", "x"), ("j", "1"), ("k", "x")]);
        write_shard(dir.path(), "job", 1, 0, &[("k", "y")]);
        write_shard(dir.path(), "job", 2, 0, &[("k", "z"), ("j", "2")]);

        let mut seen: Vec<(String, Vec<String>)> = Vec::new();
        task(&dir, "job", 3)
            .run(|key, values| {
                seen.push((key, values.clone()));
                values.len().to_string()
            })
            .unwrap();

        assert_eq!(
            seen,
            vec![
                ("j".to_string(), vec!["1".to_string(), "2".to_string()]),
                (
                    "k".to_string(),
                    vec!["x".to_string(), "x".to_string(), "y".to_string(), "z".to_string()]
                ),
            ]
        );
    }

    #[test]
    fn keys_are_in_byte_order() {
        let dir = TempDir::new().unwrap();
        write_shard(
            dir.path(),
            "job",
            0,
            0,
            &[("é", "1"), ("b", "1"), ("B", "1"), ("a", "1"), ("aa", "1"), ("", "1")],
        );

        task(&dir, "job", 1).run(sum).unwrap();

        let keys: Vec<String> = read_output(&dir.path().join("out"))
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["", "B", "a", "aa", "b", "é"]);
    }

    #[test]
    fn output_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let words: Vec<String> = (0..200).map(|i| format!("w{}", i % 37)).collect();
        let pairs: Vec<(&str, &str)> = words.iter().map(|w| (w.as_str(), "1")).collect();
        write_shard(dir.path(), "job", 0, 0, &pairs);
        write_shard(dir.path(), "job", 1, 0, &pairs[50..]);

        let first = dir.path().join("first");
        let second = dir.path().join("second");
        ReduceTask::new("job", 0, 2, &first)
            .with_shard_dir(dir.path())
            .run(sum)
            .unwrap();
        ReduceTask::new("job", 0, 2, &second)
            .with_shard_dir(dir.path())
            .run(sum)
            .unwrap();

        assert_eq!(fs::read(first).unwrap(), fs::read(second).unwrap());
    }

    #[test]
    fn appends_to_existing_output() {
        let dir = TempDir::new().unwrap();
        write_shard(dir.path(), "job", 0, 0, &[("a", "1")]);
        let out = dir.path().join("out");
        fs::write(&out, "{\"Key\":\"0\",\"Value\":\"old\"}\n").unwrap();

        task(&dir, "job", 1).run(sum).unwrap();

        assert_eq!(
            read_output(&out),
            vec![("0".into(), "old".into()), ("a".into(), "1".into())]
        );
    }

    #[test]
    fn unwritable_output_is_reported() {
        let dir = TempDir::new().unwrap();
        write_shard(dir.path(), "job", 0, 0, &[("a", "1")]);

        let err = ReduceTask::new("job", 0, 1, dir.path().join("missing").join("out"))
            .with_shard_dir(dir.path())
            .run(sum)
            .unwrap_err();

        assert!(matches!(err, ReduceError::OutputWrite { .. }));
        assert!(!err.is_input_error());
    }

    #[test]
    fn zero_map_tasks_yield_empty_output() {
        let dir = TempDir::new().unwrap();
        let summary = task(&dir, "job", 0).run(sum).unwrap();
        assert_eq!(summary, ReduceSummary { records_in: 0, keys_out: 0 });
    }
}
