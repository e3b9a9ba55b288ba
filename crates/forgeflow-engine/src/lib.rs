pub mod condition;
pub mod config;
pub mod error;
pub mod executor;
pub mod job;
pub mod submitter;
pub mod workflow;

pub use condition::{check_inputs_exist, check_up_to_date, is_up_to_date, missing_or_stale_outputs};
pub use config::WorkflowConfig;
pub use error::WorkflowError;
pub use executor::{DetachedExecutor, Executor, LocalExecutor, RunOptions, TouchExecutor};
pub use job::{Condition, IndexPart, Job, JobIndex, JobState, JobView, MultiIndex};
pub use submitter::{LocalProcessSubmitter, SubmitContext, Submitter};
pub use workflow::{run_workflow, JobSpec, Workflow, WorkflowApp};
