//! Topology loading from the JSON file written by the discovery script.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;

use super::TopologySnapshot;

/// Errors raised while loading a topology snapshot.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// Topology file could not be read.
    #[error("failed to read topology file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Topology file is not a valid topology document.
    #[error("failed to parse topology file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Refresh command could not be started.
    #[error("failed to run topology command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Refresh command exited unsuccessfully.
    #[error("topology command '{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Where topology snapshots come from.
///
/// When a command is configured it runs to completion before every load;
/// it is expected to (re)write the JSON file at `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologySource {
    path: PathBuf,
    command: Vec<String>,
}

impl TopologySource {
    /// Source reading the JSON file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            command: Vec::new(),
        }
    }

    /// Run `command` (program followed by its arguments) before each load.
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load a fresh snapshot.
    pub async fn load(&self) -> Result<TopologySnapshot, TopologyError> {
        self.run_command().await?;

        tracing::debug!(path = %self.path.display(), "Reading topology");
        let content = tokio::fs::read(&self.path)
            .await
            .map_err(|source| TopologyError::Io {
                path: self.path.clone(),
                source,
            })?;

        TopologySnapshot::from_json(&content).map_err(|source| TopologyError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    async fn run_command(&self) -> Result<(), TopologyError> {
        let Some((program, args)) = self.command.split_first() else {
            return Ok(());
        };
        let command_line = self.command.join(" ");

        tracing::debug!(command = %command_line, "Running topology command");
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|source| TopologyError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(TopologyError::CommandFailed {
                command: command_line,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(())
    }
}
