pub mod config;
pub mod descriptor;
pub mod job;
pub mod key;
pub mod record;
pub mod shard;
pub mod stage;

pub use config::{ConfigError, JobConfig, OutputFormat};
pub use descriptor::{DescriptorError, TransformDescriptor};
pub use job::{ExecutionRoles, JobDescription, JobId, JobInfo, JobStatus};
pub use key::sanitize_key;
pub use record::KvPair;
pub use stage::{Stage, StageSet};
