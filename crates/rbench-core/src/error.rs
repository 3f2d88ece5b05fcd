use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::ids::BuildId;

/// Every way a benchmark run can fail. Nothing is persisted for any of these.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("build not found: {0}")]
    BuildNotFound(BuildId),

    #[error("invalid script: {0}")]
    InvalidScript(String),

    #[error("dependency resolution failed (exit={code:?}): {diagnostic}")]
    DependencyResolution { code: Option<i32>, diagnostic: String },

    #[error("environment setup failed: {message}")]
    EnvironmentSetup {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("script failed (exit={code:?}): {stderr}")]
    ScriptExecution {
        code: Option<i32>,
        stderr: String,
        /// Partial stdout, kept for diagnostics only.
        stdout: String,
    },

    #[error("script timed out after {}ms", .timeout.as_millis())]
    ScriptTimeout { timeout: Duration },

    #[error("malformed output ({reason}): {line:?}")]
    MalformedOutput { line: String, reason: String },

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BuildNotFound,
    InvalidScript,
    DependencyResolution,
    EnvironmentSetup,
    ScriptExecution,
    ScriptTimeout,
    MalformedOutput,
    Storage,
}

impl PipelineError {
    pub fn setup(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::EnvironmentSetup {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BuildNotFound(_) => ErrorKind::BuildNotFound,
            Self::InvalidScript(_) => ErrorKind::InvalidScript,
            Self::DependencyResolution { .. } => ErrorKind::DependencyResolution,
            Self::EnvironmentSetup { .. } => ErrorKind::EnvironmentSetup,
            Self::ScriptExecution { .. } => ErrorKind::ScriptExecution,
            Self::ScriptTimeout { .. } => ErrorKind::ScriptTimeout,
            Self::MalformedOutput { .. } => ErrorKind::MalformedOutput,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BuildNotFound => "build_not_found",
            Self::InvalidScript => "invalid_script",
            Self::DependencyResolution => "dependency_resolution",
            Self::EnvironmentSetup => "environment_setup",
            Self::ScriptExecution => "script_execution",
            Self::ScriptTimeout => "script_timeout",
            Self::MalformedOutput => "malformed_output",
            Self::Storage => "storage",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let err = PipelineError::BuildNotFound(BuildId::from_str("b1"));
        assert_eq!(err.kind(), ErrorKind::BuildNotFound);
        assert_eq!(err.to_string(), "build not found: b1");

        let err = PipelineError::ScriptTimeout {
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.kind().to_string(), "script_timeout");
        assert_eq!(err.to_string(), "script timed out after 250ms");
    }
}
