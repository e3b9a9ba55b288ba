use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file list positional index {0} out of range")]
    IndexOutOfRange(usize),

    #[error("unknown file list key `{0}`")]
    UnknownKey(String),

    #[error("resources file `{0}` does not contain a mapping at its root")]
    ResourcesNotAMapping(PathBuf),

    #[error("resources file `{0}` has no `__default__` section")]
    ResourcesMissingDefault(PathBuf),

    #[error("unsupported resources file extension in `{0}`; expected one of .yaml, .yml, .json")]
    UnsupportedResourcesExtension(PathBuf),

    #[error("failed to parse resources file `{path}`: {reason}")]
    ResourcesParse { path: PathBuf, reason: String },

    #[error("working path `{0}` has already been acquired")]
    WorkpathAlreadyAcquired(PathBuf),

    #[error("working file already exists: {0}")]
    WorkFileExists(PathBuf),

    #[error("action is local-only and cannot be rendered to a command")]
    LocalOnlyAction,
}
