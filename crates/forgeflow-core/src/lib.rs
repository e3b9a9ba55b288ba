pub mod action;
pub mod error;
pub mod file_list;
pub mod resources;
pub mod workdir;

pub use action::{Action, Fragment, PythonCode, ScriptLine, ShellScript};
pub use error::CoreError;
pub use file_list::{FileList, FileListItem, IntoFileList};
pub use resources::{CliRenderOptions, KeyTransform, Resources, RootResources};
pub use workdir::Workdir;
