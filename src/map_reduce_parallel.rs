use async_trait::async_trait;
use futures::future::try_join_all;
use std::{path::PathBuf, sync::Arc};
use tokio::task;
use tracing::debug;

use crate::{
    common::{JobReport, MapReduce, MapReduceApp},
    config::JobConfig,
    map_reduce_seq::{finish_job, map_one, prepare_workdir, reduce_one},
};

/// Runs all map tasks at once, then all reduce tasks at once, each on the
/// blocking pool. Partitions never share files, so reduce tasks need no
/// coordination beyond waiting for every map task to finish first.
pub struct ParallelMapReduce {
    config: Arc<JobConfig>,
    inputs: Vec<PathBuf>,
    mr_app: Arc<dyn MapReduceApp>,
}

#[async_trait]
impl MapReduce for ParallelMapReduce {
    fn new(config: JobConfig, inputs: Vec<PathBuf>, mr_app: Box<dyn MapReduceApp>) -> Self {
        Self {
            config: Arc::new(config),
            inputs,
            mr_app: Arc::from(mr_app),
        }
    }

    async fn run(self) -> anyhow::Result<JobReport> {
        self.config.validate()?;
        prepare_workdir(&self.config.workdir)?;
        let n_map = self.inputs.len();

        let maps = self.inputs.into_iter().enumerate().map(|(map_task, input)| {
            let config = Arc::clone(&self.config);
            let app = Arc::clone(&self.mr_app);
            task::spawn_blocking(move || map_one(&config, map_task, &input, app.as_ref()))
        });
        let emitted = try_join_all(maps)
            .await?
            .into_iter()
            .collect::<anyhow::Result<Vec<_>>>()?;
        debug!(
            job = %self.config.job_name,
            records = emitted.iter().sum::<usize>(),
            "map phase finished"
        );

        let reduces = (0..self.config.n_reduce).map(|reduce_task| {
            let config = Arc::clone(&self.config);
            let app = Arc::clone(&self.mr_app);
            task::spawn_blocking(move || reduce_one(&config, reduce_task, n_map, app.as_ref()))
        });
        let summaries = try_join_all(reduces)
            .await?
            .into_iter()
            .collect::<anyhow::Result<Vec<_>>>()?;
        debug!(
            job = %self.config.job_name,
            keys = summaries.iter().map(|s| s.keys_out).sum::<usize>(),
            "reduce phase finished"
        );

        finish_job(&self.config, n_map)
    }
}
