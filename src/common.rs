use async_trait::async_trait;
use fnv::FnvHasher;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    hash::Hasher,
    path::{Path, PathBuf},
};

use crate::config::JobConfig;

/// One intermediate or output record.
///
/// Field names are capitalised on the wire so shards and reduce outputs stay
/// readable by the map and merge phases of existing jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl From<(String, String)> for KeyValue {
    fn from((key, value): (String, String)) -> Self {
        Self { key, value }
    }
}

pub trait MapReduceApp: Send + Sync {
    fn map(&self, filename: String, contents: String) -> Vec<(String, String)>;
    fn reduce(&self, key: String, values: Vec<String>) -> String;
}

/// Outcome of a whole local job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_name: String,
    /// merged result file
    pub output: PathBuf,
    pub map_tasks: usize,
    pub reduce_tasks: usize,
}

#[async_trait]
pub trait MapReduce {
    fn new(config: JobConfig, inputs: Vec<PathBuf>, mr_app: Box<dyn MapReduceApp>) -> Self;
    async fn run(self) -> anyhow::Result<JobReport>;
}

/// Shard written by map task `map_task` for reduce partition `reduce_task`.
pub fn reduce_name(job_name: &str, map_task: usize, reduce_task: usize) -> String {
    format!("mrtmp.{}-{}-{}", job_name, map_task, reduce_task)
}

/// Output of reduce task `reduce_task`.
pub fn merge_name(job_name: &str, reduce_task: usize) -> String {
    format!("mrtmp.{}-res-{}", job_name, reduce_task)
}

/// Final merged output of the job.
pub fn result_name(job_name: &str) -> String {
    format!("mrtmp.{}", job_name)
}

/// FNV-1a of the key bytes, low 31 bits. Decides which reduce partition owns
/// a key.
pub fn ihash(key: &str) -> u32 {
    let mut hasher = FnvHasher::default();
    hasher.write(key.as_bytes());
    (hasher.finish() & 0x7fff_ffff) as u32
}

pub fn partition_of(key: &str, n_reduce: usize) -> usize {
    ihash(key) as usize % n_reduce
}

/// Regular files under `input`, or `input` itself if it is a file. Sorted so
/// map task indices are stable between runs.
pub fn read_files_from_dir(input: impl AsRef<Path>) -> anyhow::Result<Vec<PathBuf>> {
    let input = input.as_ref();
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    let mut files: Vec<_> = Vec::new();
    for entry in fs::read_dir(input)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
