use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    common::{merge_name, reduce_name, JobReport, KeyValue, MapReduce, MapReduceApp},
    config::JobConfig,
    map_task::do_map,
    merger::merge_outputs,
    reduce_task::{ReduceSummary, ReduceTask},
};

pub struct SequentialMapReduce {
    config: JobConfig,
    inputs: Vec<PathBuf>,
    mr_app: Box<dyn MapReduceApp>,
}

impl SequentialMapReduce {
    pub fn run_sync(self) -> anyhow::Result<JobReport> {
        self.config.validate()?;
        let config = &self.config;
        let app = self.mr_app.as_ref();
        prepare_workdir(&config.workdir)?;

        for (map_task, input) in self.inputs.iter().enumerate() {
            map_one(config, map_task, input, app)?;
        }

        let n_map = self.inputs.len();
        for reduce_task in 0..config.n_reduce {
            reduce_one(config, reduce_task, n_map, app)?;
        }

        finish_job(config, n_map)
    }
}

#[async_trait]
impl MapReduce for SequentialMapReduce {
    fn new(config: JobConfig, inputs: Vec<PathBuf>, mr_app: Box<dyn MapReduceApp>) -> Self {
        Self {
            config,
            inputs,
            mr_app,
        }
    }

    async fn run(self) -> anyhow::Result<JobReport> {
        self.run_sync()
    }
}

pub(crate) fn prepare_workdir(workdir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(workdir)
        .with_context(|| format!("failed to create {}", workdir.display()))
}

pub(crate) fn map_one(
    config: &JobConfig,
    map_task: usize,
    input: &Path,
    app: &dyn MapReduceApp,
) -> anyhow::Result<usize> {
    do_map(
        &config.workdir,
        &config.job_name,
        map_task,
        input,
        config.n_reduce,
        |filename, contents| {
            app.map(filename, contents)
                .into_iter()
                .map(KeyValue::from)
                .collect()
        },
    )
}

/// Reduce outputs are opened for append, so a leftover from an earlier run
/// with the same job name is removed first.
pub(crate) fn reduce_one(
    config: &JobConfig,
    reduce_task: usize,
    n_map: usize,
    app: &dyn MapReduceApp,
) -> anyhow::Result<ReduceSummary> {
    let out_file = config.workdir.join(merge_name(&config.job_name, reduce_task));
    remove_if_exists(&out_file)?;

    ReduceTask::new(config.job_name.as_str(), reduce_task, n_map, out_file)
        .with_shard_dir(&config.workdir)
        .run(|key, values| app.reduce(key, values))
        .with_context(|| format!("reduce task {} of job {} failed", reduce_task, config.job_name))
}

pub(crate) fn finish_job(config: &JobConfig, n_map: usize) -> anyhow::Result<JobReport> {
    let output = merge_outputs(&config.workdir, &config.job_name, config.n_reduce)?;

    if !config.keep_intermediates {
        cleanup_intermediates(config, n_map)?;
    }

    info!(job = %config.job_name, output = %output.display(), "job finished");
    Ok(JobReport {
        job_name: config.job_name.clone(),
        output,
        map_tasks: n_map,
        reduce_tasks: config.n_reduce,
    })
}

fn cleanup_intermediates(config: &JobConfig, n_map: usize) -> anyhow::Result<()> {
    for reduce_task in 0..config.n_reduce {
        for map_task in 0..n_map {
            remove_if_exists(
                &config
                    .workdir
                    .join(reduce_name(&config.job_name, map_task, reduce_task)),
            )?;
        }
        remove_if_exists(&config.workdir.join(merge_name(&config.job_name, reduce_task)))?;
    }
    debug!(job = %config.job_name, "intermediate files removed");
    Ok(())
}

fn remove_if_exists(path: &Path) -> anyhow::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
}
