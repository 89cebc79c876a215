use std::collections::BTreeMap;
use std::time::Duration;

use super::{ExecutionRequest, ExecutionStatus, SandboxBackend, SandboxConfig, shell_quote};

const CHECK_TIMEOUT: Duration = Duration::from_secs(30);
const CHECK_MEMORY: &str = "256m";
const NODE_IMAGE: &str = "node:22-slim";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxLanguage {
    Python,
    Json,
    Yaml,
    Javascript,
}

impl SyntaxLanguage {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "python" | "py" => Some(Self::Python),
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "javascript" | "js" => Some(Self::Javascript),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyntaxLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Python => "Python",
            Self::Json => "JSON",
            Self::Yaml => "YAML",
            Self::Javascript => "JavaScript",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxCheck {
    Valid,
    Invalid(String),
    /// The checker could not run (e.g. no container backend).
    Unchecked(String),
}

impl SyntaxCheck {
    pub fn to_report(&self, filename: &str, language: SyntaxLanguage) -> String {
        match self {
            SyntaxCheck::Valid => format!("**Syntax Valid:** {} has no {} syntax errors.", filename, language),
            SyntaxCheck::Invalid(message) => {
                format!("**{} Syntax Error in {}:**\n```\n{}\n```", language, filename, message.trim())
            }
            SyntaxCheck::Unchecked(reason) => {
                format!("Cannot validate {} syntax of {}: {}", language, filename, reason)
            }
        }
    }
}

/// Check that `content` parses as `language`. JSON and YAML are checked
/// in-process; Python and JavaScript run their own checker in a sandbox.
pub async fn validate_syntax(
    backend: &dyn SandboxBackend,
    config: &SandboxConfig,
    filename: &str,
    content: &str,
    language: SyntaxLanguage,
) -> SyntaxCheck {
    match language {
        SyntaxLanguage::Json => match serde_json::from_str::<serde_json::Value>(content) {
            Ok(_) => SyntaxCheck::Valid,
            Err(e) => SyntaxCheck::Invalid(format!("Line {}, Column {}: {}", e.line(), e.column(), e)),
        },
        SyntaxLanguage::Yaml => match serde_yaml::from_str::<serde_yaml::Value>(content) {
            Ok(_) => SyntaxCheck::Valid,
            Err(e) => SyntaxCheck::Invalid(e.to_string()),
        },
        SyntaxLanguage::Python => {
            let command = format!("python -m py_compile {}", shell_quote(filename));
            run_checker(backend, config, &config.image, filename, content, command).await
        }
        SyntaxLanguage::Javascript => {
            let command = format!("node --check {}", shell_quote(filename));
            run_checker(backend, config, NODE_IMAGE, filename, content, command).await
        }
    }
}

async fn run_checker(
    backend: &dyn SandboxBackend,
    config: &SandboxConfig,
    image: &str,
    filename: &str,
    content: &str,
    command: String,
) -> SyntaxCheck {
    let req = ExecutionRequest::new(config, command)
        .image(image)
        .files(BTreeMap::from([(filename.to_string(), content.to_string())]))
        .timeout(CHECK_TIMEOUT)
        .memory(CHECK_MEMORY);
    let result = backend.execute(&req).await;
    match result.status() {
        ExecutionStatus::Success => SyntaxCheck::Valid,
        ExecutionStatus::Failure => SyntaxCheck::Invalid(if result.stderr.trim().is_empty() {
            result.stdout
        } else {
            result.stderr
        }),
        ExecutionStatus::Timeout | ExecutionStatus::Error => SyntaxCheck::Unchecked(result.stderr),
    }
}
