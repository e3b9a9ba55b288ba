use std::collections::HashSet;

use forgeflow_core::Workdir;

use crate::error::WorkflowError;
use crate::job::Job;

/// Option bag made available to a [`Submitter`], mirroring the source's
/// introspected `{workdir, debug_flags}` selection.
#[derive(Debug, Clone)]
pub struct SubmitContext {
    pub workdir: Workdir,
    pub debug_flags: HashSet<String>,
}

/// Pluggable mapping from a batch of jobs (already wrapped for status
/// tracking) to one opaque external id per job, in order.
pub trait Submitter: Send + Sync {
    fn submit(&self, jobs: &[Job], context: &SubmitContext) -> Result<Vec<String>, WorkflowError>;
}

/// A local-process demo submitter: launches each job as a detached child
/// process and returns its OS pid as the opaque id. Exercises the
/// `DetachedExecutor` path end to end without a real cluster scheduler,
/// in the spirit of the source's `interfaces/slurm.py` example plugin.
#[derive(Debug, Default)]
pub struct LocalProcessSubmitter;

impl Submitter for LocalProcessSubmitter {
    fn submit(&self, jobs: &[Job], _context: &SubmitContext) -> Result<Vec<String>, WorkflowError> {
        let mut ids = Vec::with_capacity(jobs.len());
        for job in jobs {
            let argv = job.action.to_command()?;
            let mut command = std::process::Command::new(&argv[0]);
            command.args(&argv[1..]);
            if let Some(log) = &job.log {
                let file = std::fs::File::create(log)?;
                command.stdout(file.try_clone()?).stderr(file);
            } else {
                command.stdout(std::process::Stdio::null()).stderr(std::process::Stdio::null());
            }
            let child = command.spawn()?;
            ids.push(child.id().to_string());
        }
        Ok(ids)
    }
}
