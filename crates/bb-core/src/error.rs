//! Core error types for BastionBuddy

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::types::{ConnectionKind, TunnelId};

/// Result alias used throughout the core crate
pub type Result<T, E = BastionError> = std::result::Result<T, E>;

/// Top-level error type for tunnel lifecycle and persistent state
#[derive(Error, Debug)]
pub enum BastionError {
    /// No valid credential; the user must log in first
    #[error("Not logged in to Azure: {0}")]
    AuthRequired(String),

    /// Unknown tunnel id or saved profile name
    #[error("{0}")]
    NotFound(#[from] NotFound),

    /// The tunnel process exited early or its port never opened
    #[error("Tunnel on port {port} failed to start: {reason}{}", format_output(.output))]
    StartupFailure {
        port: u16,
        reason: String,
        output: String,
    },

    /// Read, write or parse error against the store
    #[error("Failed to {action} {path:?}: {source}")]
    PersistenceFailure {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The tunnel process could not be killed
    #[error("Failed to terminate tunnel {id}: {reason}")]
    TerminationFailure { id: String, reason: String },

    /// The tunnel executable could not be launched at all
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A previous initialization attempt failed; the cached cause is returned
    #[error("Initialization failed: {0}")]
    Initialization(Arc<BastionError>),
}

/// Lookup failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFound {
    /// No tracked tunnel with this identifier
    #[error("Tunnel {0} not found")]
    Tunnel(TunnelId),

    /// No saved profile with this name
    #[error("{} configuration '{name}' not found", kind_label(.kind))]
    Profile {
        kind: Option<ConnectionKind>,
        name: String,
    },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl BastionError {
    /// Build a persistence error for `path`
    pub fn persistence(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PersistenceFailure {
            action,
            path: path.into(),
            source,
        }
    }

    /// Unwrap cached initialization failures to the underlying cause
    pub fn root(&self) -> &BastionError {
        match self {
            Self::Initialization(inner) => inner.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound(_))
    }

    pub fn is_auth_required(&self) -> bool {
        matches!(self.root(), Self::AuthRequired(_))
    }

    pub fn is_startup_failure(&self) -> bool {
        matches!(self.root(), Self::StartupFailure { .. })
    }
}

fn format_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\nOutput: {}", trimmed)
    }
}

fn kind_label(kind: &Option<ConnectionKind>) -> &'static str {
    match kind {
        Some(ConnectionKind::Tunnel) => "Tunnel",
        Some(ConnectionKind::Ssh) => "SSH",
        Some(ConnectionKind::Rdp) => "RDP",
        None => "Saved",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_failure_includes_output() {
        let err = BastionError::StartupFailure {
            port: 5000,
            reason: "process exited immediately".to_string(),
            output: "ERROR: bastion not found\n".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("port 5000"));
        assert!(msg.contains("Output: ERROR: bastion not found"));
    }

    #[test]
    fn test_startup_failure_without_output() {
        let err = BastionError::StartupFailure {
            port: 5000,
            reason: "port never opened".to_string(),
            output: "  ".to_string(),
        };
        assert!(!err.to_string().contains("Output"));
    }

    #[test]
    fn test_root_looks_through_initialization() {
        let err = BastionError::Initialization(Arc::new(BastionError::AuthRequired(
            "run az login".to_string(),
        )));
        assert!(err.is_auth_required());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_profile_not_found_message() {
        let err = BastionError::from(NotFound::Profile {
            kind: Some(ConnectionKind::Ssh),
            name: "jump".to_string(),
        });
        assert_eq!(err.to_string(), "SSH configuration 'jump' not found");
        assert!(err.is_not_found());
    }
}
