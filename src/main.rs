use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use mr_reduce::{
    common::{read_files_from_dir, MapReduce, MapReduceApp},
    config::JobConfig,
    map_reduce_apps::{InvertedIndex, WordCount},
    map_reduce_parallel::ParallelMapReduce,
    map_reduce_seq::SequentialMapReduce,
    merger::merge_outputs,
    reduce_task::ReduceTask,
};

#[derive(Parser)]
#[command(name = "mr-reduce", about = "Local map/reduce jobs and single reduce tasks")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reduce task over the shards of every map task
    Reduce {
        #[arg(long)]
        job_name: String,
        #[arg(long)]
        reduce_task: usize,
        /// Number of map tasks that wrote shards for this partition
        #[arg(long)]
        n_map: usize,
        /// Output file, appended to if it already exists
        #[arg(long)]
        output: PathBuf,
        /// Directory holding the shard files
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
        #[arg(long, value_enum, default_value_t = App::Wc)]
        app: App,
    },
    /// Run a whole job over input files or directories
    Run {
        #[command(flatten)]
        job: JobConfig,
        /// Run map and reduce tasks concurrently
        #[arg(long)]
        parallel: bool,
        #[arg(long, value_enum, default_value_t = App::Wc)]
        app: App,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Merge the outputs of every reduce task of a job
    Merge {
        #[arg(long)]
        job_name: String,
        #[arg(long)]
        n_reduce: usize,
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum App {
    /// word count
    Wc,
    /// inverted index
    Ii,
}

impl App {
    fn build(self) -> Box<dyn MapReduceApp> {
        match self {
            App::Wc => Box::new(WordCount::new()),
            App::Ii => Box::new(InvertedIndex::new()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.verbose >= 2)
        .init();

    match cli.command {
        Commands::Reduce {
            job_name,
            reduce_task,
            n_map,
            output,
            workdir,
            app,
        } => {
            let app = app.build();
            let summary = ReduceTask::new(job_name, reduce_task, n_map, output)
                .with_shard_dir(workdir)
                .run(|key, values| app.reduce(key, values))?;
            debug!(?summary, "reduce done");
        }
        Commands::Run {
            job,
            parallel,
            app,
            inputs,
        } => {
            let mut files = Vec::new();
            for input in &inputs {
                files.extend(
                    read_files_from_dir(input)
                        .with_context(|| format!("failed to list {}", input.display()))?,
                );
            }
            info!(job = %job.job_name, inputs = files.len(), parallel, "starting job");

            let report = if parallel {
                ParallelMapReduce::new(job, files, app.build()).run().await?
            } else {
                SequentialMapReduce::new(job, files, app.build()).run().await?
            };
            println!("{}", report.output.display());
        }
        Commands::Merge {
            job_name,
            n_reduce,
            workdir,
        } => {
            let output = merge_outputs(&workdir, &job_name, n_reduce)?;
            println!("{}", output.display());
        }
    }

    Ok(())
}
