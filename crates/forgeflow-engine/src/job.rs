use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use forgeflow_core::{Action, FileList, Resources};

use crate::error::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Waiting,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Waiting)
    }
}

/// One part of a [`MultiIndex`]: a single value or an inclusive range.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexPart {
    Single(i64),
    Range(i64, i64),
}

impl fmt::Display for IndexPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexPart::Single(v) => write!(f, "{v}"),
            IndexPart::Range(lo, hi) => write!(f, "{lo}-{hi}"),
        }
    }
}

/// A tuple of [`IndexPart`]s rendered joined by a separator, used for
/// batch/array-style job indices (e.g. a SLURM array task id).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MultiIndex {
    parts: Vec<IndexPart>,
    sep: String,
}

impl MultiIndex {
    pub fn new(parts: Vec<IndexPart>) -> Self {
        MultiIndex { parts, sep: ".".to_string() }
    }

    pub fn with_separator(parts: Vec<IndexPart>, sep: impl Into<String>) -> Self {
        MultiIndex { parts, sep: sep.into() }
    }
}

impl fmt::Display for MultiIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .parts
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(&self.sep);
        write!(f, "{rendered}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobIndex {
    Single(i64),
    Multi(MultiIndex),
}

impl From<i64> for JobIndex {
    fn from(v: i64) -> Self {
        JobIndex::Single(v)
    }
}

impl From<MultiIndex> for JobIndex {
    fn from(v: MultiIndex) -> Self {
        JobIndex::Multi(v)
    }
}

impl fmt::Display for JobIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobIndex::Single(v) => write!(f, "{v}"),
            JobIndex::Multi(m) => write!(f, "{m}"),
        }
    }
}

/// The structural subset of a job's fields passed to pre/post condition
/// closures, in place of the source's reflection-based parameter binding.
pub struct JobView<'a> {
    pub name: &'a str,
    pub index: Option<&'a JobIndex>,
    pub inputs: &'a FileList,
    pub outputs: &'a FileList,
    pub state: JobState,
    pub exit_code: i32,
}

impl<'a> JobView<'a> {
    pub fn fullname(&self) -> String {
        match self.index {
            Some(index) => format!("{}.{index}", self.name),
            None => self.name.to_string(),
        }
    }
}

pub type Condition = Arc<dyn Fn(&JobView) -> Result<(), WorkflowError> + Send + Sync>;

/// Named unit of work: inputs, outputs, the action that turns one into the
/// other, and the bookkeeping needed to decide whether it's up to date.
#[derive(Clone)]
pub struct Job {
    pub name: String,
    pub index: Option<JobIndex>,
    pub exec_local: bool,
    pub inputs: FileList,
    pub outputs: FileList,
    pub action: Action,
    pub log: Option<PathBuf>,
    pub resources: Resources,
    pub pre_conditions: Vec<Condition>,
    pub post_conditions: Vec<Condition>,
    pub state: JobState,
    pub exit_code: i32,
    pub id: Option<String>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("state", &self.state)
            .field("exit_code", &self.exit_code)
            .finish()
    }
}

impl Job {
    /// Inert stand-in used to swap a real job out of a slice by value
    /// (`mem::replace`) while it's handed to an executor.
    pub(crate) fn placeholder() -> Job {
        Job {
            name: String::new(),
            index: None,
            exec_local: true,
            inputs: FileList::new(),
            outputs: FileList::new(),
            action: Action::Code(forgeflow_core::PythonCode::new("__placeholder__", || Ok(()))),
            log: None,
            resources: Resources::new(),
            pre_conditions: Vec::new(),
            post_conditions: Vec::new(),
            state: JobState::Waiting,
            exit_code: -1,
            id: None,
        }
    }

    pub fn fullname(&self) -> String {
        match &self.index {
            Some(index) => format!("{}.{index}", self.name),
            None => self.name.clone(),
        }
    }

    /// MD5 hex of the fullname, used as the status file's name.
    pub fn hash(&self) -> String {
        format!("{:x}", md5::compute(self.fullname().as_bytes()))
    }

    pub fn threads(&self) -> u32 {
        self.resources.threads()
    }

    pub fn describe(&self) -> String {
        match &self.id {
            Some(id) => format!("{} (id={id})", self.fullname()),
            None => self.fullname(),
        }
    }

    pub fn view(&self) -> JobView<'_> {
        JobView {
            name: &self.name,
            index: self.index.as_ref(),
            inputs: &self.inputs,
            outputs: &self.outputs,
            state: self.state,
            exit_code: self.exit_code,
        }
    }

    pub fn done(&mut self) {
        assert_eq!(self.state, JobState::Waiting, "job {} is not WAITING", self.fullname());
        self.state = JobState::Done;
        self.exit_code = 0;
        self.action.clean_up_tracking_status_file();
    }

    pub fn failed(&mut self, exit_code: i32) {
        assert_eq!(self.state, JobState::Waiting, "job {} is not WAITING", self.fullname());
        self.state = JobState::Failed;
        self.exit_code = exit_code;
        self.action.clean_up_tracking_status_file();
    }

    pub fn enable_tracking(&mut self, status_path: PathBuf) {
        self.action.enable_tracking(status_path);
    }

    pub fn check_pre_conditions(&self) -> Result<(), WorkflowError> {
        let view = self.view();
        for condition in &self.pre_conditions {
            condition(&view)?;
        }
        Ok(())
    }

    pub fn check_post_conditions(&self) -> Result<(), WorkflowError> {
        let view = self.view();
        for condition in &self.post_conditions {
            condition(&view)?;
        }
        Ok(())
    }

    pub fn is_post_ok(&self) -> bool {
        self.check_post_conditions().is_ok()
    }

    pub fn display(&self) -> String {
        let rendered = self.action.to_string();
        match &self.log {
            Some(log) => format!("{rendered} > {}", log.display()),
            None => rendered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeflow_core::ShellScript;

    fn sample_job(name: &str) -> Job {
        Job {
            name: name.to_string(),
            index: None,
            exec_local: false,
            inputs: FileList::new(),
            outputs: FileList::new(),
            action: Action::Shell(ShellScript::new(vec!["true".into()])),
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
    fn fullname_includes_index() {
        let mut job = sample_job("generate");
        job.index = Some(JobIndex::Single(3));
        assert_eq!(job.fullname(), "generate.3");
    }

    #[test]
    fn hash_is_md5_of_fullname() {
        let job = sample_job("transform_foo");
        let expected = format!("{:x}", md5::compute(b"transform_foo"));
        assert_eq!(job.hash(), expected);
    }

    #[test]
    fn done_transitions_from_waiting_once() {
        let mut job = sample_job("transform_foo");
        job.done();
        assert_eq!(job.state, JobState::Done);
        assert_eq!(job.exit_code, 0);
    }

    #[test]
    #[should_panic]
    fn done_twice_panics() {
        let mut job = sample_job("transform_foo");
        job.done();
        job.done();
    }
}
