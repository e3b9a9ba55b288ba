use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::WorkflowError;

/// Immutable-after-construction workflow configuration (§6 of the
/// requirements). The CLI binary owns the `clap`-derived struct that
/// collects these from the command line and builds one of these.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub workflow_root: PathBuf,
    pub workflow_dir: PathBuf,
    pub dry_run: bool,
    pub force: bool,
    pub touch: bool,
    pub delete_outputs: bool,
    pub keep_temp: bool,
    pub force_delete_temp: bool,
    pub threads: u32,
    pub resources: Option<PathBuf>,
    pub check_delay: Duration,
    pub debug_flags: HashSet<String>,
    pub print_commands: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        WorkflowConfig {
            workflow_root: PathBuf::from("."),
            workflow_dir: PathBuf::from(".workflow"),
            dry_run: false,
            force: false,
            touch: false,
            delete_outputs: false,
            keep_temp: false,
            force_delete_temp: false,
            threads: 1,
            resources: None,
            check_delay: Duration::from_secs(5),
            debug_flags: HashSet::new(),
            print_commands: false,
        }
    }
}

impl WorkflowConfig {
    /// Applies the flag implications described in §6/§9 and rejects
    /// contradictory combinations.
    pub fn normalize(mut self) -> Result<Self, WorkflowError> {
        if self.touch && self.delete_outputs {
            return Err(WorkflowError::IllegalArgument(
                "`touch` and `delete_outputs` are mutually exclusive".to_string(),
            ));
        }
        if self.keep_temp && self.force_delete_temp {
            return Err(WorkflowError::IllegalArgument(
                "`keep_temp` and `force_delete_temp` are mutually exclusive".to_string(),
            ));
        }
        if self.delete_outputs {
            self.dry_run = true;
            self.force = true;
            self.keep_temp = true;
            self.force_delete_temp = false;
        }
        Ok(self)
    }
}
