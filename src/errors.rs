//! Typed error hierarchy for Nightwatch.
//!
//! One enum per subsystem:
//! - `GatewayError`: remote-repository operations
//! - `SandboxError`: container provisioning and command execution
//! - `WorkflowError`: worker lifecycle, slot assignment and role delegation
//! - `ToolError`: a role's tool invocation
//! - `ConfigError`: configuration files and environment

use thiserror::Error;

/// Errors from the remote-repository gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The platform answered with an error status. `message` is the platform's own text.
    #[error("{message} (HTTP {status})")]
    Platform { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Branch '{0}' does not exist. Use create_branch_with_files first")]
    BranchMissing(String),

    #[error("'{0}' is a directory, not a file")]
    IsDirectory(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to reach GitHub: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Unexpected response from GitHub: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GatewayError::NotFound(_) | GatewayError::Platform { status: 404, .. }
        )
    }

    /// The platform's message text, when the error came from the platform.
    pub fn platform_message(&self) -> Option<&str> {
        match self {
            GatewayError::Platform { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Transport(err)
        }
    }
}

/// Errors from the sandbox executor.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Docker is not available: {0}")]
    Unavailable(String),

    #[error("Failed to provision container from image {image}: {message}")]
    Provision { image: String, message: String },

    #[error("Failed to build file archive: {0}")]
    Archive(#[source] std::io::Error),

    #[error("Command execution failed: {0}")]
    Exec(String),

    #[error("Invalid memory limit '{0}'")]
    InvalidMemory(String),

    #[error(transparent)]
    Docker(#[from] bollard::errors::Error),
}

/// Errors from the worker, coordinator and sequencer layers.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Invalid issue transition for #{issue}: {from} -> {to}")]
    InvalidTransition {
        issue: u64,
        from: String,
        to: String,
    },

    #[error("Slot {0} is already assigned")]
    SlotAlreadyAssigned(String),

    #[error("Unknown worker slot {0}")]
    UnknownSlot(String),

    #[error("{role} delegation failed: {message}")]
    Delegation { role: String, message: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from a single role tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool '{0}'")]
    Unknown(String),

    #[error("Tool {tool} is not available to the {role} role")]
    NotAllowed { tool: String, role: String },

    #[error("Invalid input for {tool}: {message}")]
    InvalidInput { tool: String, message: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {message}", path.display())]
    Parse {
        path: std::path::PathBuf,
        message: String,
    },

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_platform_error_keeps_platform_text() {
        let err = GatewayError::Platform {
            status: 422,
            message: "Reference already exists".to_string(),
        };
        assert_eq!(err.platform_message(), Some("Reference already exists"));
        assert!(err.to_string().contains("Reference already exists"));
        assert!(err.to_string().contains("422"));
    }

    #[test]
    fn gateway_not_found_matches_both_shapes() {
        assert!(GatewayError::NotFound("src/lib.rs".into()).is_not_found());
        let platform = GatewayError::Platform {
            status: 404,
            message: "Not Found".into(),
        };
        assert!(platform.is_not_found());
        let conflict = GatewayError::Platform {
            status: 409,
            message: "Conflict".into(),
        };
        assert!(!conflict.is_not_found());
    }

    #[test]
    fn branch_missing_message_names_the_fix() {
        let err = GatewayError::BranchMissing("fix-issue-42".into());
        let msg = err.to_string();
        assert!(msg.contains("fix-issue-42"));
        assert!(msg.contains("create_branch_with_files"));
    }

    #[test]
    fn workflow_error_transition_is_matchable() {
        let err = WorkflowError::InvalidTransition {
            issue: 7,
            from: "pending".into(),
            to: "completed".into(),
        };
        match &err {
            WorkflowError::InvalidTransition { issue, .. } => assert_eq!(*issue, 7),
            _ => panic!("Expected InvalidTransition variant"),
        }
        assert!(err.to_string().contains("pending -> completed"));
    }

    #[test]
    fn workflow_error_from_gateway() {
        let err: WorkflowError = GatewayError::NotFound("issue #9".into()).into();
        assert!(matches!(err, WorkflowError::Gateway(_)));
        assert!(err.to_string().contains("issue #9"));
    }

    #[test]
    fn tool_error_names_tool_and_role() {
        let err = ToolError::NotAllowed {
            tool: "add_comment".into(),
            role: "developer".into(),
        };
        assert_eq!(err.to_string(), "Tool add_comment is not available to the developer role");
        let err: ToolError = GatewayError::NotFound("pull request #9".into()).into();
        assert!(err.to_string().contains("pull request #9"));
    }

    #[test]
    fn sandbox_error_unavailable_message() {
        let err = SandboxError::Unavailable("socket not found".into());
        assert!(err.to_string().starts_with("Docker is not available"));
    }

    #[test]
    fn config_error_invalid_value_display() {
        let err = ConfigError::InvalidValue {
            key: "FOUNDRY_MAX_WORKERS".into(),
            value: "many".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value for FOUNDRY_MAX_WORKERS: 'many'"
        );
    }
}
