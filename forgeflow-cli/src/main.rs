use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use forgeflow_core::{Action, FileList, PythonCode, ShellScript};
use forgeflow_engine::{run_workflow, JobSpec, Workflow, WorkflowApp, WorkflowConfig, WorkflowError};
use log::error;

/// Runs a small file-based build pipeline.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root directory the pipeline's inputs and outputs are resolved under
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Directory under `root` used for status files and job scratch space
    #[arg(long, default_value = ".forgeflow")]
    workflow_dir: PathBuf,

    /// Print the commands that would run without running them
    #[arg(long)]
    dry_run: bool,

    /// Re-run every job regardless of freshness
    #[arg(long)]
    force: bool,

    /// Only refresh output mtimes; run no commands
    #[arg(long)]
    touch: bool,

    /// Remove every job's declared outputs and exit
    #[arg(long)]
    delete_outputs: bool,

    /// Keep group-scoped intermediate files that would otherwise be cleaned up
    #[arg(long)]
    keep_temp: bool,

    /// Number of worker threads for in-process jobs
    #[arg(long, default_value_t = 1)]
    threads: u32,

    /// Path to a YAML or JSON per-job resources file
    #[arg(long)]
    resources: Option<PathBuf>,

    /// Print each job's rendered command before running it
    #[arg(long)]
    print_commands: bool,

    /// Debug flags forwarded to a detached-execution submitter, if any
    #[arg(long)]
    debug: Vec<String>,
}

impl Cli {
    fn into_config(self) -> WorkflowConfig {
        WorkflowConfig {
            workflow_root: self.root,
            workflow_dir: self.workflow_dir,
            dry_run: self.dry_run,
            force: self.force,
            touch: self.touch,
            delete_outputs: self.delete_outputs,
            keep_temp: self.keep_temp,
            force_delete_temp: false,
            threads: self.threads,
            resources: self.resources,
            check_delay: Duration::from_secs(5),
            debug_flags: self.debug.into_iter().collect::<HashSet<_>>(),
            print_commands: self.print_commands,
        }
    }
}

/// Demo pipeline: two independent transforms grouped with a final combine
/// step, matching the scenario worked through in this repo's tests.
struct BasicPipeline;

impl WorkflowApp for BasicPipeline {
    fn run(&mut self, workflow: &mut Workflow) -> Result<(), WorkflowError> {
        let root = workflow.config().workflow_root.clone();
        let foo_in = root.join("foo.in");
        let bar_in = root.join("bar.in");
        let foo_out = root.join("foo.out");
        let bar_out = root.join("bar.out");
        let combined = root.join("combined.out");

        workflow.collect_job(
            JobSpec::new(
                "transform_foo",
                Action::Shell(ShellScript::new(vec![format!(
                    "tr a-z A-Z < {} > {}",
                    foo_in.display(),
                    foo_out.display()
                )
                .into()])),
            )
            .inputs(FileList::from_positional([foo_in]))
            .outputs(FileList::from_positional([foo_out.clone()])),
        )?;

        workflow.collect_job(
            JobSpec::new(
                "transform_bar",
                Action::Shell(ShellScript::new(vec![format!(
                    "tr a-z A-Z < {} > {}",
                    bar_in.display(),
                    bar_out.display()
                )
                .into()])),
            )
            .inputs(FileList::from_positional([bar_in]))
            .outputs(FileList::from_positional([bar_out.clone()])),
        )?;
        workflow.execute_jobs()?;

        // A plain dry run never actually produces `foo.out`/`bar.out`, so
        // there is nothing truthful left to plan for the stage that
        // consumes them. `--delete-outputs` also implies `dry_run`, but
        // still needs every job collected so its outputs get unlinked.
        if workflow.config().dry_run && !workflow.config().delete_outputs {
            return Ok(());
        }

        workflow.collect_job(
            JobSpec::new(
                "combine_results",
                Action::Shell(ShellScript::new(vec![format!(
                    "cat {} {} > {}",
                    foo_out.display(),
                    bar_out.display(),
                    combined.display()
                )
                .into()])),
            )
            .inputs(FileList::from_positional([foo_out, bar_out]))
            .outputs(FileList::from_positional([combined])),
        )?;
        workflow.execute_jobs()
    }
}

/// A job that runs in-process rather than as a subprocess, demonstrating
/// `Action::Code`.
#[allow(dead_code)]
fn count_lines_job(name: &str, input: PathBuf) -> JobSpec {
    JobSpec::new(
        name,
        Action::Code(PythonCode::new(name.to_string(), move || {
            std::fs::read_to_string(&input)
                .map(|contents| {
                    eprintln!("{} has {} line(s)", input.display(), contents.lines().count());
                })
                .map_err(|e| e.to_string())
        })),
    )
    .exec_local(true)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = cli.into_config();

    let mut workflow = Workflow::new(config).context("failed to set up workflow")?;
    let mut app = BasicPipeline;

    if let Err(e) = run_workflow(&mut app, &mut workflow) {
        error!("pipeline failed: {e}");
        return Err(e.into());
    }
    Ok(())
}
