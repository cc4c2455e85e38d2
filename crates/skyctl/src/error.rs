//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use skyctl_config::ConfigError;
use skyctl_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const REJECTED: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to device server at {url}")]
    #[diagnostic(
        code(skyctl::connection_failed),
        help(
            "Check that the INDIGO server is running and reachable.\n\
             Reason: {reason}\n\
             Try: skyctl --simulate devices"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Lost the connection to the device server")]
    #[diagnostic(code(skyctl::disconnected))]
    Disconnected,

    // ── Dispatch ─────────────────────────────────────────────────────
    #[error("Timed out after {timeout_ms}ms waiting for {key}")]
    #[diagnostic(
        code(skyctl::timeout),
        help("Increase the timeout with --timeout, or check the device with: skyctl props")
    )]
    Timeout { key: String, timeout_ms: u64 },

    #[error("Device rejected {key}: {message}")]
    #[diagnostic(code(skyctl::rejected))]
    Rejected { key: String, message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(skyctl::not_found),
        help("Run: skyctl {list_command} to see what the server announced")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(skyctl::validation))]
    Validation { field: String, reason: String },

    // ── Pointing model ───────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(skyctl::pointing_model),
        help("Collect more sync points with: skyctl mount grid --log <FILE>")
    )]
    PointingModel { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(skyctl::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: skyctl config init --name {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(skyctl::config))]
    Config(#[from] ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(skyctl::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected => exit_code::CONNECTION,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Validation { .. } | Self::Config(ConfigError::Validation { .. }) => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }

    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },
            CoreError::Disconnected => CliError::Disconnected,
            CoreError::Timeout { key, timeout_ms } => CliError::Timeout { key, timeout_ms },
            CoreError::Rejected { key, message } => CliError::Rejected { key, message },

            CoreError::DeviceNotFound { name } => CliError::NotFound {
                resource_type: "device".into(),
                identifier: name,
                list_command: "devices".into(),
            },
            CoreError::PropertyNotFound { key } => CliError::NotFound {
                resource_type: "property".into(),
                identifier: key,
                list_command: "props".into(),
            },
            CoreError::ElementNotFound { key } => CliError::NotFound {
                resource_type: "element".into(),
                identifier: key,
                list_command: "props".into(),
            },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            err @ (CoreError::InsufficientSyncPoints { .. } | CoreError::ModelFile { .. }) => {
                CliError::PointingModel {
                    message: err.to_string(),
                }
            }

            CoreError::Io(e) => CliError::Io(e),
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_have_distinct_exit_codes() {
        let timeout: CliError = CoreError::Timeout {
            key: "/Mount/MOUNT_PARK".into(),
            timeout_ms: 1000,
        }
        .into();
        assert_eq!(timeout.exit_code(), exit_code::TIMEOUT);

        let rejected: CliError = CoreError::Rejected {
            key: "/Mount/MOUNT_PARK".into(),
            message: "mount is parked".into(),
        }
        .into();
        assert_eq!(rejected.exit_code(), exit_code::REJECTED);

        let missing: CliError = CoreError::DeviceNotFound { name: "Focuser".into() }.into();
        assert_eq!(missing.exit_code(), exit_code::NOT_FOUND);

        let lost: CliError = CoreError::Disconnected.into();
        assert_eq!(lost.exit_code(), exit_code::CONNECTION);
    }

    #[test]
    fn pointing_errors_keep_their_message() {
        let err: CliError = CoreError::InsufficientSyncPoints {
            pier: "east".into(),
            needed: 5,
            available: 2,
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::GENERAL);
        assert!(err.to_string().contains("east"));
    }
}
