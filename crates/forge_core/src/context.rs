//! Stack context: which deployment a run belongs to.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identifies one deployment of a project and where its state lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackContext {
    /// Project identifier
    pub project: String,
    /// Stack / environment label (e.g. "prod")
    pub stack: String,
    /// Directory for persisted stack state; `None` keeps state in memory only
    pub state_dir: Option<PathBuf>,
}

impl StackContext {
    pub fn new(project: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            stack: stack.into(),
            state_dir: None,
        }
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    /// Path of the state file for this stack, if persistence is enabled.
    pub fn state_path(&self) -> Option<PathBuf> {
        self.state_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", self.stack)))
    }
}
