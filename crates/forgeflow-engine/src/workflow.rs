use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use forgeflow_core::{Action, FileList, IntoFileList, Resources, RootResources, Workdir};
use log::info;

use crate::condition::{check_inputs_exist, check_up_to_date, is_up_to_date, missing_or_stale_outputs};
use crate::config::WorkflowConfig;
use crate::error::WorkflowError;
use crate::executor::{DetachedExecutor, Executor, LocalExecutor, RunOptions, TouchExecutor};
use crate::job::{Condition, Job, JobIndex, JobState, JobView};
use crate::submitter::{SubmitContext, Submitter};

fn validate_identifier(name: &str) -> Result<(), WorkflowError> {
    let valid = !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(WorkflowError::IllegalArgument(format!("`{name}` is not a valid job name")))
    }
}

fn default_pre_conditions() -> Vec<Condition> {
    vec![std::sync::Arc::new(check_inputs_exist)]
}

fn default_post_conditions() -> Vec<Condition> {
    vec![std::sync::Arc::new(check_up_to_date)]
}

fn union_file_list<'a>(lists: impl Iterator<Item = &'a FileList>) -> FileList {
    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for list in lists {
        for path in list.iter() {
            if seen.insert(path.to_path_buf()) {
                items.push(path.to_path_buf());
            }
        }
    }
    FileList::from_positional(items)
}

/// Builder for a single `collect_job` call, replacing the source's
/// keyword-argument call with a typed fluent builder.
pub struct JobSpec {
    name: String,
    index: Option<JobIndex>,
    exec_local: bool,
    inputs: FileList,
    outputs: FileList,
    action: Action,
    log: Option<PathBuf>,
    resources: Option<Resources>,
    pre_conditions: Vec<Condition>,
    post_conditions: Vec<Condition>,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, action: Action) -> Self {
        let exec_local = action.local_only();
        JobSpec {
            name: name.into(),
            index: None,
            exec_local,
            inputs: FileList::new(),
            outputs: FileList::new(),
            action,
            log: None,
            resources: None,
            pre_conditions: Vec::new(),
            post_conditions: Vec::new(),
        }
    }

    pub fn index(mut self, index: impl Into<JobIndex>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn exec_local(mut self, value: bool) -> Self {
        self.exec_local = value;
        self
    }

    pub fn inputs(mut self, inputs: impl IntoFileList) -> Self {
        self.inputs = inputs.into_file_list();
        self
    }

    pub fn outputs(mut self, outputs: impl IntoFileList) -> Self {
        self.outputs = outputs.into_file_list();
        self
    }

    pub fn log(mut self, log: impl Into<PathBuf>) -> Self {
        self.log = Some(log.into());
        self
    }

    pub fn resources(mut self, resources: Resources) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn pre_condition(mut self, condition: Condition) -> Self {
        self.pre_conditions.push(condition);
        self
    }

    pub fn post_condition(mut self, condition: Condition) -> Self {
        self.post_conditions.push(condition);
        self
    }
}

enum RegistryEntry {
    Single(usize),
    Indexed(HashMap<JobIndex, usize>),
}

struct GroupFrame {
    name: String,
    temp_intermediates: bool,
    pre_conditions: Vec<Condition>,
    post_conditions: Vec<Condition>,
    batches: Vec<Vec<usize>>,
}

/// The orchestrator: owns the job registry, the pending queue, the group
/// stack, the two executors, and the up-to-date decision.
pub struct Workflow {
    config: WorkflowConfig,
    root_resources: RootResources,
    workdir: Workdir,
    jobs: Vec<Job>,
    registry: HashMap<String, RegistryEntry>,
    pending: Vec<usize>,
    group_stack: Vec<GroupFrame>,
    local_executor: LocalExecutor,
    executor: Box<dyn Executor>,
}

impl Workflow {
    pub fn new(config: WorkflowConfig) -> Result<Self, WorkflowError> {
        Self::with_submitter(config, None)
    }

    pub fn with_submitter(config: WorkflowConfig, submitter: Option<Box<dyn Submitter>>) -> Result<Self, WorkflowError> {
        let config = config.normalize()?;

        let root_resources = match &config.resources {
            Some(path) => RootResources::load(path)?,
            None => RootResources::empty(),
        };

        let workdir = Workdir::new(config.workflow_root.join(&config.workflow_dir));
        workdir.acquire_dir(".", false, true)?;

        let executor: Box<dyn Executor> = if config.touch {
            Box::new(TouchExecutor)
        } else if let Some(submitter) = submitter {
            let context = SubmitContext {
                workdir: workdir.acquire_dir("job-scripts", false, true)?,
                debug_flags: config.debug_flags.clone(),
            };
            Box::new(DetachedExecutor::new(submitter, context, config.check_delay))
        } else {
            Box::new(LocalExecutor)
        };

        Ok(Workflow {
            config,
            root_resources,
            workdir,
            jobs: Vec::new(),
            registry: HashMap::new(),
            pending: Vec::new(),
            group_stack: Vec::new(),
            local_executor: LocalExecutor,
            executor,
        })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        match self.registry.get(name)? {
            RegistryEntry::Single(idx) => Some(&self.jobs[*idx]),
            RegistryEntry::Indexed(_) => None,
        }
    }

    pub fn indexed_job(&self, name: &str, index: &JobIndex) -> Option<&Job> {
        match self.registry.get(name)? {
            RegistryEntry::Indexed(map) => map.get(index).map(|&idx| &self.jobs[idx]),
            RegistryEntry::Single(_) => None,
        }
    }

    fn insert_registry(&mut self, name: &str, index: Option<JobIndex>, slot: usize) -> Result<(), WorkflowError> {
        match index {
            None => {
                if self.registry.contains_key(name) {
                    return Err(WorkflowError::DuplicateJob(name.to_string()));
                }
                self.registry.insert(name.to_string(), RegistryEntry::Single(slot));
            }
            Some(idx) => {
                let entry = self
                    .registry
                    .entry(name.to_string())
                    .or_insert_with(|| RegistryEntry::Indexed(HashMap::new()));
                match entry {
                    RegistryEntry::Single(_) => return Err(WorkflowError::DuplicateJob(name.to_string())),
                    RegistryEntry::Indexed(map) => {
                        if map.contains_key(&idx) {
                            return Err(WorkflowError::DuplicateJob(format!("{name}.{idx}")));
                        }
                        map.insert(idx, slot);
                    }
                }
            }
        }
        Ok(())
    }

    /// Builds and registers a job from `spec`; queues it if collection-time
    /// freshness checking says it's not up to date (or `force`, or inside a
    /// group).
    pub fn collect_job(&mut self, spec: JobSpec) -> Result<(), WorkflowError> {
        validate_identifier(&spec.name)?;
        if spec.action.local_only() && !spec.exec_local {
            return Err(WorkflowError::IllegalArgument(format!(
                "action for job `{}` is local-only but exec_local=false",
                spec.name
            )));
        }

        let resources = spec
            .resources
            .unwrap_or_else(|| self.root_resources.for_job(&spec.name));
        let pre_conditions = if spec.pre_conditions.is_empty() {
            default_pre_conditions()
        } else {
            spec.pre_conditions
        };
        let post_conditions = if spec.post_conditions.is_empty() {
            default_post_conditions()
        } else {
            spec.post_conditions
        };

        let job = Job {
            name: spec.name.clone(),
            index: spec.index.clone(),
            exec_local: spec.exec_local,
            inputs: spec.inputs,
            outputs: spec.outputs,
            action: spec.action,
            log: spec.log,
            resources,
            pre_conditions,
            post_conditions,
            state: JobState::Waiting,
            exit_code: -1,
            id: None,
        };

        let in_group = !self.group_stack.is_empty();
        let should_queue = self.config.force || in_group || !job.is_post_ok();
        // Outside a group, a queued job's inputs must already exist, so the
        // check can run immediately and fail with no side effects. Inside a
        // group, an upstream batch may still be about to produce this job's
        // inputs, so the check is deferred to `run_batch`, right before the
        // job actually runs.
        if should_queue && !in_group {
            job.check_pre_conditions()?;
        }

        let slot = self.jobs.len();
        self.insert_registry(&spec.name, job.index.clone(), slot)?;
        self.jobs.push(job);
        if should_queue {
            self.pending.push(slot);
        }
        Ok(())
    }

    /// Flush: the only point where an executor is invoked. Inside a group
    /// scope, stashes the pending queue as a batch instead of running it.
    pub fn execute_jobs(&mut self) -> Result<(), WorkflowError> {
        if let Some(frame) = self.group_stack.last_mut() {
            let batch = std::mem::take(&mut self.pending);
            frame.batches.push(batch);
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        self.run_batch(&pending)
    }

    fn run_with_executor(&mut self, indices: &[usize], opts: &RunOptions, local: bool) -> Result<(), WorkflowError> {
        if indices.is_empty() {
            return Ok(());
        }
        let mut batch: Vec<Job> = indices
            .iter()
            .map(|&i| std::mem::replace(&mut self.jobs[i], Job::placeholder()))
            .collect();

        let requires_tracking = if local {
            self.local_executor.requires_status_tracking()
        } else {
            self.executor.requires_status_tracking()
        };
        if requires_tracking {
            for job in batch.iter_mut() {
                let status_path = self.workdir.acquire_file(format!("status/{}", job.hash()), true)?;
                job.enable_tracking(status_path);
            }
        }

        let result = if local {
            self.local_executor.run(&mut batch, opts)
        } else {
            self.executor.run(&mut batch, opts)
        };

        for (&i, job) in indices.iter().zip(batch.into_iter()) {
            self.jobs[i] = job;
        }
        result
    }

    fn run_batch(&mut self, indices: &[usize]) -> Result<(), WorkflowError> {
        if indices.is_empty() {
            return Ok(());
        }
        for &i in indices {
            self.jobs[i].check_pre_conditions()?;
        }

        let (local_idx, normal_idx): (Vec<usize>, Vec<usize>) =
            indices.iter().copied().partition(|&i| self.jobs[i].exec_local);

        let opts = RunOptions {
            dry_run: self.config.dry_run,
            force: self.config.force,
            print_commands: self.config.print_commands,
            threads: self.config.threads,
        };

        let result = self
            .run_with_executor(&normal_idx, &opts, false)
            .and_then(|_| self.run_with_executor(&local_idx, &opts, true));

        if let Err(e) = result {
            for &i in indices {
                if self.jobs[i].state == JobState::Failed {
                    for path in self.jobs[i].outputs.iter() {
                        let _ = std::fs::remove_file(path);
                    }
                }
            }
            return Err(e);
        }

        let mut incomplete = Vec::new();
        for &i in indices {
            let job = &self.jobs[i];
            let stale = missing_or_stale_outputs(&job.inputs, &job.outputs);
            if !stale.is_empty() {
                incomplete.push((job.fullname(), stale));
            }
        }
        if !incomplete.is_empty() {
            return Err(WorkflowError::IncompleteOutputs { jobs: incomplete });
        }
        Ok(())
    }

    fn group_is_up_to_date(&self, frame: &GroupFrame, group_inputs: &FileList, group_outputs: &FileList) -> bool {
        if !is_up_to_date(group_inputs, group_outputs) {
            return false;
        }
        let view = JobView {
            name: &frame.name,
            index: None,
            inputs: group_inputs,
            outputs: group_outputs,
            state: JobState::Waiting,
            exit_code: -1,
        };
        frame.post_conditions.iter().all(|c| c(&view).is_ok())
    }

    fn finish_group(&mut self, frame: GroupFrame) -> Result<(), WorkflowError> {
        if frame.batches.is_empty() {
            return Ok(());
        }
        let group_inputs = union_file_list(frame.batches[0].iter().map(|&i| &self.jobs[i].inputs));
        let last = frame.batches.len() - 1;
        let group_outputs = union_file_list(frame.batches[last].iter().map(|&i| &self.jobs[i].outputs));

        let entry_view = JobView {
            name: &frame.name,
            index: None,
            inputs: &group_inputs,
            outputs: &group_outputs,
            state: JobState::Waiting,
            exit_code: -1,
        };
        for condition in &frame.pre_conditions {
            condition(&entry_view)?;
        }
        for &i in &frame.batches[0] {
            self.jobs[i].check_pre_conditions()?;
        }

        let up_to_date = self.group_is_up_to_date(&frame, &group_inputs, &group_outputs);
        let ran = if up_to_date && !self.config.force {
            info!("group `{}` is up to date, skipping", frame.name);
            false
        } else {
            for batch in &frame.batches {
                self.run_batch(batch)?;
            }
            true
        };

        if frame.temp_intermediates && (ran || self.config.force_delete_temp) && !self.config.keep_temp {
            let mut seen_files = HashSet::new();
            for batch in &frame.batches {
                for &i in batch {
                    seen_files.extend(self.jobs[i].inputs.iter().map(|p| p.to_path_buf()));
                    seen_files.extend(self.jobs[i].outputs.iter().map(|p| p.to_path_buf()));
                }
            }
            let keep: HashSet<PathBuf> = group_inputs
                .iter()
                .chain(group_outputs.iter())
                .map(|p| p.to_path_buf())
                .collect();
            for file in seen_files.difference(&keep) {
                let _ = std::fs::remove_file(file);
            }
        }
        Ok(())
    }

    /// Opens a group scope: inside `body`, `collect_job` always queues and
    /// `execute_jobs` stashes a batch instead of running it; on return, the
    /// whole-group freshness gate and (if applicable) intermediate cleanup
    /// run once.
    pub fn grouped_jobs<F>(
        &mut self,
        name: impl Into<String>,
        temp_intermediates: bool,
        pre_conditions: Vec<Condition>,
        post_conditions: Vec<Condition>,
        body: F,
    ) -> Result<(), WorkflowError>
    where
        F: FnOnce(&mut Workflow) -> Result<(), WorkflowError>,
    {
        if self.config.force && !self.config.delete_outputs {
            return body(self);
        }

        self.group_stack.push(GroupFrame {
            name: name.into(),
            temp_intermediates: temp_intermediates && !self.config.delete_outputs,
            pre_conditions,
            post_conditions,
            batches: Vec::new(),
        });
        let body_result = body(self);
        let frame = self.group_stack.pop().expect("group frame missing");
        body_result?;
        self.finish_group(frame)
    }

    /// Final flush plus, if `delete_outputs` is set, unlinking the outputs
    /// of every collected job in reverse order.
    pub fn finish(&mut self) -> Result<(), WorkflowError> {
        if !self.pending.is_empty() {
            self.execute_jobs()?;
        }
        if self.config.delete_outputs {
            for job in self.jobs.iter().rev() {
                for path in job.outputs.iter() {
                    if path.exists() {
                        std::fs::remove_file(path)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Overridable hooks substituting the source's `Workflow` subclass
/// interface; a plain struct implementing this trait plays the role of a
/// concrete workflow "script".
pub trait WorkflowApp {
    fn pre_run(&mut self, _workflow: &mut Workflow) -> Result<(), WorkflowError> {
        Ok(())
    }

    fn run(&mut self, workflow: &mut Workflow) -> Result<(), WorkflowError>;

    fn post_run(&mut self, _workflow: &mut Workflow) -> Result<(), WorkflowError> {
        Ok(())
    }
}

/// Runs `app` against `workflow`, then performs the final flush — the
/// substitute for the source's `@workflow` decorator.
pub fn run_workflow<A: WorkflowApp>(app: &mut A, workflow: &mut Workflow) -> Result<(), WorkflowError> {
    app.pre_run(workflow)?;
    app.run(workflow)?;
    app.post_run(workflow)?;
    workflow.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeflow_core::ShellScript;
    use std::fs;

    fn test_config(root: &std::path::Path) -> WorkflowConfig {
        WorkflowConfig {
            workflow_root: root.to_path_buf(),
            ..Default::default()
        }
    }

    fn shell_job(name: &str, script: &str, inputs: Vec<PathBuf>, outputs: Vec<PathBuf>) -> JobSpec {
        JobSpec::new(name, Action::Shell(ShellScript::new(vec![script.into()])))
            .inputs(FileList::from_positional(inputs))
            .outputs(FileList::from_positional(outputs))
    }

    #[test]
    fn duplicate_unindexed_job_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut wf = Workflow::new(test_config(dir.path())).unwrap();
        wf.collect_job(JobSpec::new("a", Action::Shell(ShellScript::new(vec!["true".into()]))))
            .unwrap();
        let err = wf
            .collect_job(JobSpec::new("a", Action::Shell(ShellScript::new(vec!["true".into()]))))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicateJob(_)));
    }

    #[test]
    fn basic_two_stage_pipeline_runs_once_then_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let foo_in = dir.path().join("foo.in");
        let foo_out = dir.path().join("foo.out");
        fs::write(&foo_in, "foo-data\n").unwrap();

        let mut wf = Workflow::new(test_config(dir.path())).unwrap();
        wf.collect_job(shell_job(
            "transform_foo",
            &format!(
                "tr a-z A-Z < {} > {}",
                foo_in.display(),
                foo_out.display()
            ),
            vec![foo_in.clone()],
            vec![foo_out.clone()],
        ))
        .unwrap();
        wf.execute_jobs().unwrap();
        assert_eq!(fs::read_to_string(&foo_out).unwrap(), "FOO-DATA\n");

        // second run: nothing should be queued since the job is now fresh.
        let mut wf2 = Workflow::new(test_config(dir.path())).unwrap();
        wf2.collect_job(shell_job(
            "transform_foo",
            &format!(
                "tr a-z A-Z < {} > {}",
                foo_in.display(),
                foo_out.display()
            ),
            vec![foo_in],
            vec![foo_out],
        ))
        .unwrap();
        assert!(wf2.pending.is_empty());
    }

    #[test]
    fn force_queues_even_when_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        fs::write(&out, "data").unwrap();

        let mut config = test_config(dir.path());
        config.force = true;
        let mut wf = Workflow::new(config).unwrap();
        wf.collect_job(
            JobSpec::new("sink", Action::Shell(ShellScript::new(vec!["true".into()])))
                .outputs(FileList::from_positional([out])),
        )
        .unwrap();
        assert_eq!(wf.pending.len(), 1);
    }

    #[test]
    fn failing_job_leaves_outputs_absent() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");

        let mut wf = Workflow::new(test_config(dir.path())).unwrap();
        wf.collect_job(
            JobSpec::new(
                "doomed",
                Action::Shell(ShellScript::new(vec![format!("touch {}; exit 1", out.display()).into()])),
            )
            .outputs(FileList::from_positional([out.clone()])),
        )
        .unwrap();
        let err = wf.execute_jobs().unwrap_err();
        assert!(matches!(err, WorkflowError::JobBatchFailed { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn group_with_temp_intermediates_removes_only_intermediates() {
        let dir = tempfile::tempdir().unwrap();
        let a_in = dir.path().join("a.in");
        let a_out = dir.path().join("a.out");
        let result_out = dir.path().join("result.out");
        fs::write(&a_in, "a-data\n").unwrap();

        let mut wf = Workflow::new(test_config(dir.path())).unwrap();
        wf.grouped_jobs("stage", true, Vec::new(), Vec::new(), |wf| {
            wf.collect_job(shell_job(
                "make_a",
                &format!("cp {} {}", a_in.display(), a_out.display()),
                vec![a_in.clone()],
                vec![a_out.clone()],
            ))?;
            wf.execute_jobs()?;
            wf.collect_job(shell_job(
                "combine",
                &format!("cp {} {}", a_out.display(), result_out.display()),
                vec![a_out.clone()],
                vec![result_out.clone()],
            ))?;
            wf.execute_jobs()
        })
        .unwrap();

        assert!(result_out.exists());
        assert!(!a_out.exists());
    }
}
