use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("missing input file(s) for job `{job}`: {files:?}")]
    MissingInputs { job: String, files: Vec<PathBuf> },

    #[error("missing or out-dated output file(s) for {} job(s)", .jobs.len())]
    IncompleteOutputs { jobs: Vec<(String, Vec<PathBuf>)> },

    #[error("duplicate job `{0}`")]
    DuplicateJob(String),

    #[error("job `{job}` failed: {reason}")]
    JobFailed {
        job: String,
        reason: String,
        exit_code: i32,
    },

    #[error("{failed} of {total} batch job(s) failed")]
    JobBatchFailed {
        failed: usize,
        total: usize,
        failures: Vec<WorkflowError>,
    },

    #[error("{failed} of {total} detached job(s) failed")]
    DetachedJobsFailed {
        failed: usize,
        total: usize,
        jobs: Vec<String>,
    },

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error(transparent)]
    Core(#[from] forgeflow_core::CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
