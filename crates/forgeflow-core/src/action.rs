use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::CoreError;

/// One fragment of a shell script line. A `Safe` fragment is emitted
/// verbatim; any other fragment is shell-escaped at render time.
#[derive(Debug, Clone)]
pub enum Fragment {
    Safe(String),
    Escaped(String),
}

impl Fragment {
    pub fn safe(s: impl Into<String>) -> Self {
        Fragment::Safe(s.into())
    }

    fn render(&self) -> String {
        match self {
            Fragment::Safe(s) => s.clone(),
            Fragment::Escaped(s) => shell_escape::escape(s.clone().into()).into_owned(),
        }
    }
}

impl From<&str> for Fragment {
    fn from(s: &str) -> Self {
        Fragment::Escaped(s.to_string())
    }
}

impl From<String> for Fragment {
    fn from(s: String) -> Self {
        Fragment::Escaped(s)
    }
}

/// One line of a [`ShellScript`]: a raw string, or fragments to be joined
/// with a space after each non-`Safe` fragment is individually escaped.
#[derive(Debug, Clone)]
pub enum ScriptLine {
    Plain(String),
    Fragments(Vec<Fragment>),
}

impl ScriptLine {
    fn render(&self) -> String {
        match self {
            ScriptLine::Plain(s) => s.clone(),
            ScriptLine::Fragments(fragments) => fragments
                .iter()
                .map(Fragment::render)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

impl From<&str> for ScriptLine {
    fn from(s: &str) -> Self {
        ScriptLine::Plain(s.to_string())
    }
}

impl From<String> for ScriptLine {
    fn from(s: String) -> Self {
        ScriptLine::Plain(s)
    }
}

impl From<Vec<Fragment>> for ScriptLine {
    fn from(fragments: Vec<Fragment>) -> Self {
        ScriptLine::Fragments(fragments)
    }
}

/// Ordered sequence of lines rendered into one compound script, run under a
/// shell interpreter argv (default `/bin/bash -c`).
#[derive(Debug, Clone)]
pub struct ShellScript {
    lines: Vec<ScriptLine>,
    shell: Vec<String>,
    safe_mode: Option<String>,
    tracking_status_path: Option<PathBuf>,
}

impl ShellScript {
    pub fn new(lines: Vec<ScriptLine>) -> Self {
        ShellScript {
            lines,
            shell: vec!["/bin/bash".to_string(), "-c".to_string()],
            safe_mode: Some("set -euo pipefail".to_string()),
            tracking_status_path: None,
        }
    }

    pub fn append(&mut self, lines: Vec<ScriptLine>) {
        self.lines.extend(lines);
    }

    fn body(&self) -> String {
        self.lines
            .iter()
            .map(ScriptLine::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn rendered_script(&self) -> String {
        let body = self.body();
        let with_safe_mode = match &self.safe_mode {
            Some(preamble) => format!("{preamble}; {body}"),
            None => body,
        };
        match &self.tracking_status_path {
            Some(status) => {
                let status = shell_escape::escape(status.to_string_lossy().into_owned().into());
                format!("touch {status}; ( {with_safe_mode} ); S=$?; echo $S > {status}; exit $S")
            }
            None => with_safe_mode,
        }
    }

    fn to_command(&self) -> Vec<String> {
        let mut argv = self.shell.clone();
        argv.push(self.rendered_script());
        argv
    }
}

/// An in-process callable action. Local-only: it has no command-line
/// rendering.
#[derive(Clone)]
pub struct PythonCode {
    name: String,
    func: Arc<dyn Fn() -> Result<(), String> + Send + Sync>,
    tracking_status_path: Option<PathBuf>,
}

impl fmt::Debug for PythonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PythonCode").field("name", &self.name).finish()
    }
}

impl PythonCode {
    pub fn new(name: impl Into<String>, func: impl Fn() -> Result<(), String> + Send + Sync + 'static) -> Self {
        PythonCode {
            name: name.into(),
            func: Arc::new(func),
            tracking_status_path: None,
        }
    }

    pub fn call(&self) -> Result<(), String> {
        (self.func)()
    }
}

/// Tagged variant: a rendering of work, either a subprocess argv or an
/// in-process callable.
#[derive(Debug, Clone)]
pub enum Action {
    Shell(ShellScript),
    Code(PythonCode),
}

impl Action {
    pub fn local_only(&self) -> bool {
        matches!(self, Action::Code(_))
    }

    pub fn to_command(&self) -> Result<Vec<String>, CoreError> {
        match self {
            Action::Shell(script) => Ok(script.to_command()),
            Action::Code(_) => Err(CoreError::LocalOnlyAction),
        }
    }

    pub fn enable_tracking(&mut self, status_path: PathBuf) {
        match self {
            Action::Shell(script) => script.tracking_status_path = Some(status_path),
            Action::Code(code) => code.tracking_status_path = Some(status_path),
        }
    }

    fn tracking_status_path(&self) -> Option<&Path> {
        match self {
            Action::Shell(script) => script.tracking_status_path.as_deref(),
            Action::Code(code) => code.tracking_status_path.as_deref(),
        }
    }

    /// `-2` missing, `-1` empty, else the integer parsed from the first
    /// bytes of the status file.
    pub fn get_status(&self) -> Result<i32, CoreError> {
        let Some(path) = self.tracking_status_path() else {
            return Ok(-2);
        };
        let contents = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(-2),
            Err(e) => return Err(e.into()),
        };
        let head = &contents[..contents.len().min(16)];
        let text = String::from_utf8_lossy(head);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(-1);
        }
        trimmed
            .parse::<i32>()
            .map_err(|_| CoreError::ResourcesParse {
                path: path.to_path_buf(),
                reason: format!("non-numeric status file contents: {trimmed:?}"),
            })
    }

    pub fn clean_up_tracking_status_file(&self) {
        if let Some(path) = self.tracking_status_path() {
            let _ = std::fs::remove_file(path);
        }
    }

    pub fn call(&self) -> Result<(), String> {
        match self {
            Action::Code(code) => code.call(),
            Action::Shell(_) => Err("cannot invoke a ShellScript in-process".to_string()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Shell(script) => {
                let rendered = script
                    .to_command()
                    .iter()
                    .map(|part| shell_escape::escape(part.clone().into()).into_owned())
                    .collect::<Vec<_>>()
                    .join(" ");
                write!(f, "{rendered}")
            }
            Action::Code(code) => write!(f, "{}()", code.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_script_wraps_safe_mode() {
        let script = ShellScript::new(vec!["tr a-z A-Z < foo.in > foo.out".into()]);
        let action = Action::Shell(script);
        let argv = action.to_command().unwrap();
        assert_eq!(argv[0], "/bin/bash");
        assert_eq!(argv[1], "-c");
        assert!(argv[2].starts_with("set -euo pipefail; "));
    }

    #[test]
    fn tracking_wraps_with_status_capture() {
        let mut script = ShellScript::new(vec!["true".into()]);
        script.tracking_status_path = Some(PathBuf::from("/tmp/status/abc"));
        let action = Action::Shell(script);
        let argv = action.to_command().unwrap();
        let body = &argv[2];
        assert!(body.starts_with("touch "));
        assert!(body.contains("echo $S >"));
        assert!(body.ends_with("exit $S"));
    }

    #[test]
    fn safe_fragment_is_not_escaped() {
        let line = ScriptLine::Fragments(vec![Fragment::from("echo"), Fragment::safe("$HOME")]);
        let rendered = line.render();
        assert!(rendered.contains("$HOME"));
    }

    #[test]
    fn untracked_status_is_missing() {
        let action = Action::Shell(ShellScript::new(vec!["true".into()]));
        assert_eq!(action.get_status().unwrap(), -2);
    }

    #[test]
    fn code_action_is_local_only() {
        let action = Action::Code(PythonCode::new("noop", || Ok(())));
        assert!(action.local_only());
        assert!(action.to_command().is_err());
        assert!(action.call().is_ok());
    }
}
