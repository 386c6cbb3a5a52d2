use std::path::PathBuf;

use anyhow::bail;
use clap::Args;
use uuid::Uuid;

/// Settings shared by every task of one local job.
#[derive(Debug, Clone, Args)]
pub struct JobConfig {
    /// Name that prefixes every intermediate and output file
    #[arg(long, env = "MR_JOB_NAME", default_value_t = default_job_name())]
    pub job_name: String,

    /// Number of reduce partitions
    #[arg(long, env = "MR_N_REDUCE", default_value_t = 3)]
    pub n_reduce: usize,

    /// Directory holding shards and outputs
    #[arg(long, env = "MR_WORKDIR", default_value = ".")]
    pub workdir: PathBuf,

    /// Leave shard files and per-partition outputs in place after the merge
    #[arg(long)]
    pub keep_intermediates: bool,
}

pub fn default_job_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("mr-{}", &id[..8])
}

impl JobConfig {
    pub fn new(job_name: impl Into<String>, n_reduce: usize) -> Self {
        Self {
            job_name: job_name.into(),
            n_reduce,
            workdir: PathBuf::from("."),
            keep_intermediates: false,
        }
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    pub fn keep_intermediates(mut self, keep: bool) -> Self {
        self.keep_intermediates = keep;
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.n_reduce == 0 {
            bail!("n_reduce must be at least 1");
        }
        if self.job_name.is_empty() {
            bail!("job name must not be empty");
        }
        Ok(())
    }
}
