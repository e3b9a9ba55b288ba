use std::collections::VecDeque;
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use forgeflow_core::Action;
use log::{debug, info, warn};

use crate::error::WorkflowError;
use crate::job::{Job, JobState};
use crate::submitter::{SubmitContext, Submitter};

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub dry_run: bool,
    pub force: bool,
    pub print_commands: bool,
    pub threads: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            dry_run: false,
            force: false,
            print_commands: false,
            threads: 1,
        }
    }
}

/// Strategy that takes a batch of jobs and runs them.
pub trait Executor {
    fn requires_status_tracking(&self) -> bool {
        false
    }

    fn run(&self, jobs: &mut [Job], opts: &RunOptions) -> Result<(), WorkflowError> {
        if opts.dry_run {
            dry_run(jobs, opts.print_commands);
            Ok(())
        } else {
            self.run_jobs(jobs, opts)
        }
    }

    fn run_jobs(&self, jobs: &mut [Job], opts: &RunOptions) -> Result<(), WorkflowError>;
}

fn dry_run(jobs: &mut [Job], print_commands: bool) {
    for job in jobs.iter_mut() {
        if print_commands {
            println!("{}", job.display());
        }
        job.done();
    }
}

fn discard_outputs(job: &Job) -> std::io::Result<()> {
    for path in job.outputs.iter() {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
    }
    Ok(())
}

/// Runs jobs in-process: serially, or with a worker-per-admitted-job model
/// bounded by `threads`.
#[derive(Debug, Default)]
pub struct LocalExecutor;

impl Executor for LocalExecutor {
    fn run_jobs(&self, jobs: &mut [Job], opts: &RunOptions) -> Result<(), WorkflowError> {
        if opts.threads <= 1 || jobs.len() <= 1 {
            Self::run_serial(jobs, opts)
        } else {
            Self::run_parallel(jobs, opts)
        }
    }
}

impl LocalExecutor {
    fn run_serial(jobs: &mut [Job], opts: &RunOptions) -> Result<(), WorkflowError> {
        let mut failures = Vec::new();
        for job in jobs.iter_mut() {
            if let Err(e) = Self::execute_job(job, opts.force, opts.print_commands) {
                failures.push(e);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::JobBatchFailed {
                failed: failures.len(),
                total: jobs.len(),
                failures,
            })
        }
    }

    fn run_parallel(jobs: &mut [Job], opts: &RunOptions) -> Result<(), WorkflowError> {
        let total_threads = opts.threads.max(1);
        let force = opts.force;
        let print_commands = opts.print_commands;

        let shared: Vec<Arc<Mutex<Job>>> = jobs.iter().cloned().map(|j| Arc::new(Mutex::new(j))).collect();
        let available = Arc::new(Mutex::new(total_threads));
        let failures: Arc<Mutex<Vec<WorkflowError>>> = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = crossbeam_channel::unbounded::<()>();

        let mut pending: VecDeque<usize> = (0..shared.len()).collect();
        let mut in_flight = 0usize;
        let mut handles = Vec::new();

        while !pending.is_empty() || in_flight > 0 {
            let mut i = 0;
            while i < pending.len() {
                let idx = pending[i];
                let needed = shared[idx].lock().expect("job lock poisoned").threads();

                if needed > total_threads {
                    pending.remove(i);
                    let mut job = shared[idx].lock().expect("job lock poisoned");
                    let reason = format!(
                        "job requests {needed} thread(s) but the pool only has {total_threads}"
                    );
                    job.failed(1);
                    failures.lock().expect("failures lock poisoned").push(WorkflowError::JobFailed {
                        job: job.fullname(),
                        reason,
                        exit_code: 1,
                    });
                    continue;
                }

                let mut avail = available.lock().expect("available lock poisoned");
                if needed <= *avail {
                    *avail -= needed;
                    drop(avail);
                    pending.remove(i);
                    in_flight += 1;

                    let job_arc = Arc::clone(&shared[idx]);
                    let available = Arc::clone(&available);
                    let failures = Arc::clone(&failures);
                    let tx = tx.clone();
                    handles.push(thread::spawn(move || {
                        let result = {
                            let mut job = job_arc.lock().expect("job lock poisoned");
                            LocalExecutor::execute_job(&mut job, force, print_commands)
                        };
                        if let Err(e) = result {
                            failures.lock().expect("failures lock poisoned").push(e);
                        }
                        *available.lock().expect("available lock poisoned") += needed;
                        let _ = tx.send(());
                    }));
                } else {
                    i += 1;
                }
            }

            if pending.is_empty() && in_flight == 0 {
                break;
            }

            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(()) => in_flight -= 1,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }

        for handle in handles {
            let _ = handle.join();
        }

        for (slot, arc) in jobs.iter_mut().zip(shared.into_iter()) {
            let job = match Arc::try_unwrap(arc) {
                Ok(mutex) => mutex.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner),
                Err(arc) => arc.lock().expect("job lock poisoned").clone(),
            };
            *slot = job;
        }

        let failures = Arc::try_unwrap(failures)
            .map(|m| m.into_inner().unwrap_or_default())
            .unwrap_or_default();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::JobBatchFailed {
                failed: failures.len(),
                total: jobs.len(),
                failures,
            })
        }
    }

    fn execute_job(job: &mut Job, force: bool, print_commands: bool) -> Result<(), WorkflowError> {
        if force {
            discard_outputs(job)?;
        }
        if print_commands {
            println!("{}", job.display());
        }
        debug!("running job {}", job.fullname());

        match job.action.clone() {
            Action::Code(code) => match code.call() {
                Ok(()) => {
                    job.done();
                    Ok(())
                }
                Err(reason) => {
                    job.failed(1);
                    if let Some(log_path) = &job.log {
                        let _ = std::fs::write(log_path, &reason);
                    }
                    Err(WorkflowError::JobFailed {
                        job: job.fullname(),
                        reason,
                        exit_code: 1,
                    })
                }
            },
            Action::Shell(_) => {
                let argv = job.action.to_command()?;
                let mut command = Command::new(&argv[0]);
                command.args(&argv[1..]);

                let status = match &job.log {
                    Some(path) => {
                        let file = std::fs::File::create(path)?;
                        command.stdout(file.try_clone()?).stderr(file);
                        command.status()?
                    }
                    None => command.status()?,
                };

                if status.success() {
                    job.done();
                    Ok(())
                } else {
                    let code = status.code().unwrap_or(1);
                    job.failed(code);
                    Err(WorkflowError::JobFailed {
                        job: job.fullname(),
                        reason: format!("process exited with status {code}"),
                        exit_code: code,
                    })
                }
            }
        }
    }
}

/// Submits jobs to an external scheduler and polls their status files.
pub struct DetachedExecutor {
    submitter: Box<dyn Submitter>,
    context: SubmitContext,
    check_delay: Duration,
}

impl DetachedExecutor {
    pub fn new(submitter: Box<dyn Submitter>, context: SubmitContext, check_delay: Duration) -> Self {
        DetachedExecutor {
            submitter,
            context,
            check_delay,
        }
    }
}

impl Executor for DetachedExecutor {
    fn requires_status_tracking(&self) -> bool {
        true
    }

    fn run_jobs(&self, jobs: &mut [Job], _opts: &RunOptions) -> Result<(), WorkflowError> {
        for job in jobs.iter() {
            info!("submitting {}", job.display());
        }

        let ids = self.submitter.submit(jobs, &self.context)?;
        if ids.len() != jobs.len() {
            return Err(WorkflowError::IllegalArgument(format!(
                "submitter returned {} id(s) for {} job(s)",
                ids.len(),
                jobs.len()
            )));
        }
        for (job, id) in jobs.iter_mut().zip(ids) {
            job.id = Some(id);
        }

        loop {
            if jobs.iter().all(|j| j.state.is_terminal()) {
                break;
            }
            thread::sleep(self.check_delay);
            for job in jobs.iter_mut() {
                if job.state != JobState::Waiting {
                    continue;
                }
                let status = job.action.get_status()?;
                if status >= 0 {
                    if status == 0 {
                        job.done();
                    } else {
                        job.failed(status);
                    }
                }
            }
        }

        let failed: Vec<String> = jobs
            .iter()
            .filter(|j| j.state == JobState::Failed)
            .map(Job::describe)
            .collect();
        if failed.is_empty() {
            Ok(())
        } else {
            warn!("{} detached job(s) failed", failed.len());
            Err(WorkflowError::DetachedJobsFailed {
                failed: failed.len(),
                total: jobs.len(),
                jobs: failed,
            })
        }
    }
}

/// Forced by the `touch` flag: executes no commands, only refreshes mtimes
/// of existing outputs.
#[derive(Debug, Default)]
pub struct TouchExecutor;

impl Executor for TouchExecutor {
    fn run_jobs(&self, jobs: &mut [Job], _opts: &RunOptions) -> Result<(), WorkflowError> {
        let now = filetime::FileTime::now();
        for job in jobs.iter_mut() {
            for path in job.outputs.iter() {
                if path.exists() {
                    filetime::set_file_mtime(path, now)?;
                }
            }
            job.done();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeflow_core::{Action as CoreAction, FileList, PythonCode, Resources};

    fn job_with_code(name: &str, ok: bool) -> Job {
        Job {
            name: name.to_string(),
            index: None,
            exec_local: true,
            inputs: FileList::new(),
            outputs: FileList::new(),
            action: CoreAction::Code(PythonCode::new(name, move || {
                if ok {
                    Ok(())
                } else {
                    Err("boom".to_string())
                }
            })),
            log: None,
            resources: Resources::new(),
            pre_conditions: Vec::new(),
            post_conditions: Vec::new(),
            state: JobState::Waiting,
            exit_code: -1,
            id: None,
        }
    }

    #[test]
    fn serial_execution_runs_all_jobs() {
        let mut jobs = vec![job_with_code("a", true), job_with_code("b", true)];
        let opts = RunOptions { threads: 1, ..Default::default() };
        LocalExecutor.run(&mut jobs, &opts).unwrap();
        assert!(jobs.iter().all(|j| j.state == JobState::Done));
    }

    #[test]
    fn failing_job_surfaces_as_batch_failure() {
        let mut jobs = vec![job_with_code("a", true), job_with_code("b", false)];
        let opts = RunOptions { threads: 1, ..Default::default() };
        let err = LocalExecutor.run(&mut jobs, &opts).unwrap_err();
        assert!(matches!(err, WorkflowError::JobBatchFailed { failed: 1, total: 2, .. }));
    }

    #[test]
    fn parallel_execution_runs_all_jobs() {
        let mut jobs: Vec<Job> = (0..8).map(|i| job_with_code(&format!("job{i}"), true)).collect();
        let opts = RunOptions { threads: 4, ..Default::default() };
        LocalExecutor.run(&mut jobs, &opts).unwrap();
        assert!(jobs.iter().all(|j| j.state == JobState::Done));
    }

    #[test]
    fn dry_run_marks_done_without_running() {
        let mut jobs = vec![job_with_code("a", false)];
        let opts = RunOptions { dry_run: true, ..Default::default() };
        LocalExecutor.run(&mut jobs, &opts).unwrap();
        assert_eq!(jobs[0].state, JobState::Done);
    }
}
