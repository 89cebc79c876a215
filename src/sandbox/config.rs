use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::errors::ConfigError;

/// Resource defaults for sandbox containers.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxConfig {
    pub image: String,
    pub memory: String,
    pub cpus: f64,
    /// Seconds.
    pub timeout: u64,
    pub network: String,
    /// Named volume → container path, for dependency caches.
    pub volumes: HashMap<String, String>,
    pub env: HashMap<String, String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "python:3.11-slim".to_string(),
            memory: "512m".to_string(),
            cpus: 1.0,
            timeout: 300,
            network: "bridge".to_string(),
            volumes: HashMap::new(),
            env: HashMap::new(),
        }
    }
}

/// Raw TOML structure for `.nightwatch/sandbox.toml`
#[derive(Debug, Deserialize)]
struct SandboxToml {
    sandbox: Option<SandboxSection>,
}

#[derive(Debug, Deserialize)]
struct SandboxSection {
    image: Option<String>,
    memory: Option<String>,
    cpus: Option<f64>,
    timeout: Option<u64>,
    network: Option<String>,
    volumes: Option<HashMap<String, String>>,
    env: Option<HashMap<String, String>>,
}

impl SandboxConfig {
    /// Load sandbox config from `.nightwatch/sandbox.toml` in the project directory.
    /// Returns defaults if the file doesn't exist.
    pub fn load(project_path: &Path) -> Result<Self, ConfigError> {
        let config_path = project_path.join(".nightwatch").join("sandbox.toml");
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;

        let toml: SandboxToml = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path.clone(),
            message: e.to_string(),
        })?;

        let mut config = Self::default();
        if let Some(section) = toml.sandbox {
            if let Some(image) = section.image {
                config.image = image;
            }
            if let Some(memory) = section.memory {
                config.memory = memory;
            }
            if let Some(cpus) = section.cpus {
                config.cpus = cpus;
            }
            if let Some(timeout) = section.timeout {
                config.timeout = timeout;
            }
            if let Some(network) = section.network {
                config.network = network;
            }
            if let Some(volumes) = section.volumes {
                config.volumes = volumes;
            }
            if let Some(env) = section.env {
                config.env = env;
            }
        }

        Ok(config)
    }

    /// Apply `SANDBOX_*` overrides from the given lookup (normally the process env).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(image) = lookup("SANDBOX_DEFAULT_IMAGE") {
            self.image = image;
        }
        if let Some(memory) = lookup("SANDBOX_MEMORY_LIMIT") {
            parse_memory_limit(&memory).map_err(|_| ConfigError::InvalidValue {
                key: "SANDBOX_MEMORY_LIMIT".into(),
                value: memory.clone(),
            })?;
            self.memory = memory;
        }
        if let Some(raw) = lookup("SANDBOX_CPU_LIMIT") {
            self.cpus = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "SANDBOX_CPU_LIMIT".into(),
                value: raw.clone(),
            })?;
        }
        if let Some(raw) = lookup("SANDBOX_TIMEOUT") {
            self.timeout = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "SANDBOX_TIMEOUT".into(),
                value: raw.clone(),
            })?;
        }
        Ok(())
    }
}

/// Parse a Docker-style memory limit (`512m`, `2g`, `1024k`, `1000000`) into bytes.
pub fn parse_memory_limit(raw: &str) -> Result<i64, crate::errors::SandboxError> {
    let trimmed = raw.trim().to_ascii_lowercase();
    let invalid = || crate::errors::SandboxError::InvalidMemory(raw.to_string());
    let (digits, multiplier) = match trimmed.chars().last() {
        Some('k') => (&trimmed[..trimmed.len() - 1], 1024_i64),
        Some('m') => (&trimmed[..trimmed.len() - 1], 1024 * 1024),
        Some('g') => (&trimmed[..trimmed.len() - 1], 1024 * 1024 * 1024),
        Some(c) if c.is_ascii_digit() => (trimmed.as_str(), 1),
        _ => return Err(invalid()),
    };
    let value: i64 = digits.parse().map_err(|_| invalid())?;
    if value <= 0 {
        return Err(invalid());
    }
    value.checked_mul(multiplier).ok_or_else(invalid)
}
