use std::fs;
use std::path::Path;
use std::time::SystemTime;

use forgeflow_core::FileList;

use crate::error::WorkflowError;
use crate::job::JobView;

fn mtime_secs(path: &Path) -> Option<f64> {
    let meta = fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    let secs = modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Some(secs)
}

/// Pre-condition: every declared input must exist.
pub fn check_inputs_exist(view: &JobView) -> Result<(), WorkflowError> {
    let missing: Vec<_> = view.inputs.iter().filter(|p| !p.exists()).map(|p| p.to_path_buf()).collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::MissingInputs {
            job: view.fullname(),
            files: missing,
        })
    }
}

/// Up-to-date rule: `min(mtime(outputs)) >= max(mtime(inputs))`.
///
/// `I = -inf` when there are no inputs; `O = +inf` when there are no
/// declared outputs, `O = -inf` if any declared output is missing. A job
/// with no inputs at all is fresh only while every output exists: this
/// preserves the source's deliberate conflation of "no inputs, one
/// existing output" with freshness, documented as an open question.
pub fn is_up_to_date(inputs: &FileList, outputs: &FileList) -> bool {
    missing_or_stale_outputs(inputs, outputs).is_empty()
}

/// Returns the output paths that are missing, or all declared outputs if
/// any input is newer than the oldest output. Empty means up to date.
pub fn missing_or_stale_outputs(inputs: &FileList, outputs: &FileList) -> Vec<std::path::PathBuf> {
    let input_mtime = inputs
        .iter()
        .filter_map(mtime_secs)
        .fold(f64::NEG_INFINITY, f64::max);

    let all_outputs: Vec<_> = outputs.iter().collect();
    if all_outputs.is_empty() {
        return Vec::new();
    }

    let mut output_mtime = f64::INFINITY;
    let mut missing = Vec::new();
    for path in &all_outputs {
        match mtime_secs(path) {
            Some(m) => output_mtime = output_mtime.min(m),
            None => {
                output_mtime = f64::NEG_INFINITY;
                missing.push(path.to_path_buf());
            }
        }
    }

    if !missing.is_empty() {
        return missing;
    }
    if input_mtime > output_mtime {
        return all_outputs.iter().map(|p| p.to_path_buf()).collect();
    }
    Vec::new()
}

/// Post-condition built from [`is_up_to_date`].
pub fn check_up_to_date(view: &JobView) -> Result<(), WorkflowError> {
    let stale = missing_or_stale_outputs(view.inputs, view.outputs);
    if stale.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::IncompleteOutputs {
            jobs: vec![(view.fullname(), stale)],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeflow_core::FileList;
    use std::fs;

    #[test]
    fn job_with_no_inputs_is_fresh_only_if_output_exists() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let inputs = FileList::new();
        let outputs = FileList::from_positional([out.clone()]);

        assert!(!is_up_to_date(&inputs, &outputs));
        fs::write(&out, b"data").unwrap();
        assert!(is_up_to_date(&inputs, &outputs));
    }

    #[test]
    fn stale_when_input_newer_than_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        fs::write(&output, b"old").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(&input, b"new").unwrap();

        let inputs = FileList::from_positional([input]);
        let outputs = FileList::from_positional([output]);
        assert!(!is_up_to_date(&inputs, &outputs));
    }

    #[test]
    fn no_declared_outputs_is_always_fresh() {
        let inputs = FileList::new();
        let outputs = FileList::new();
        assert!(is_up_to_date(&inputs, &outputs));
    }
}
