//! Built-in tools. Each reads its arguments from the calling agent's
//! resolved inputs, so argument names double as data-channel names
//! (`file_path`, `path`, `query`, `pattern`, `command`).

pub mod file_search;
pub mod grep_search;
pub mod list_dir;
pub mod read_file;
pub mod run_terminal;

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use mswarm_core::error::{MswarmError, Result};

pub(crate) fn resolve_path(path: &str, working_dir: &Path) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        working_dir.join(path)
    }
}

pub(crate) fn parse_input<T: DeserializeOwned>(tool: &str, input: serde_json::Value) -> Result<T> {
    serde_json::from_value(input).map_err(|e| MswarmError::ToolValidation(format!("{}: {}", tool, e)))
}

pub(crate) fn exec_error(tool: &str, message: impl std::fmt::Display) -> MswarmError {
    MswarmError::ToolExecution {
        tool: tool.to_string(),
        message: message.to_string(),
    }
}
