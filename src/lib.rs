pub mod codec;
pub mod common;
pub mod config;
pub mod error;
pub mod map_reduce_apps;
pub mod map_reduce_parallel;
pub mod map_reduce_seq;
pub mod map_task;
pub mod merger;
pub mod reduce_task;

pub use common::{KeyValue, MapReduce, MapReduceApp};
pub use error::ReduceError;
pub use reduce_task::{run_reduce, ReduceSummary, ReduceTask};
