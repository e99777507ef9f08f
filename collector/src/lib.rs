pub mod engine;
pub mod error;
pub mod group_count;
pub mod merge;
pub mod pipeline;
pub mod side_effects;
pub mod sink;
pub mod submitter;
pub mod transform;

pub use engine::{ExecutionEngine, HttpEngine, LocalEngine};
pub use error::{CollectError, PipelineError, SubmitError};
pub use group_count::GroupCount;
pub use merge::ShardMergeIterator;
pub use pipeline::{execute_map_reduce, execute_map_reduce_blocking};
pub use side_effects::SideEffects;
pub use sink::{EventSink, MemorySink, TracingSink};
pub use submitter::{describe_job, JobSubmitter, Outcome, Plan};
pub use transform::MapReduce;
