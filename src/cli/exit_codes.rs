//! CLI Exit Codes
//!
//! Exit codes for CLI operations and automation.

use crate::config::ConfigError;
use crate::core::error::Error;
use crate::core::network::FixtureError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Controller did not answer
    pub const UNREACHABLE: u8 = 3;

    /// Write rejected by the controller
    pub const ACCESS_DENIED: u8 = 5;

    /// File not found
    pub const FILE_NOT_FOUND: u8 = 6;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Protocol error or malformed answer
    pub const PROTOCOL_ERROR: u8 = 9;

    /// User cancelled
    pub const CANCELLED: u8 = 11;

    /// Point not found
    pub const POINT_NOT_FOUND: u8 = 12;

    /// Polling re-configured from an inconsistent state
    pub const POLL_CONFLICT: u8 = 13;

    /// Internal error
    pub const INTERNAL_ERROR: u8 = 127;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Error with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<&Error> for CliResult {
    fn from(err: &Error) -> Self {
        let code = match err {
            Error::NotFound(_) => ExitCodes::POINT_NOT_FOUND,
            Error::Unreachable(_) => ExitCodes::UNREACHABLE,
            Error::AccessDenied(_) => ExitCodes::ACCESS_DENIED,
            Error::ConfigurationConflict(_) => ExitCodes::POLL_CONFLICT,
            Error::InvalidArgument(_) => ExitCodes::INVALID_ARGS,
            Error::MalformedResponse(_) | Error::Protocol(_) => ExitCodes::PROTOCOL_ERROR,
            Error::Detached(_) | Error::Runtime(_) => ExitCodes::INTERNAL_ERROR,
        };
        Self::Error(code, err.to_string())
    }
}

fn io_exit_code(kind: std::io::ErrorKind) -> u8 {
    use std::io::ErrorKind;

    match kind {
        ErrorKind::NotFound => ExitCodes::FILE_NOT_FOUND,
        ErrorKind::TimedOut => ExitCodes::UNREACHABLE,
        _ => ExitCodes::ERROR,
    }
}

impl From<std::io::Error> for CliResult {
    fn from(err: std::io::Error) -> Self {
        Self::Error(io_exit_code(err.kind()), err.to_string())
    }
}

/// Exit code for one link of an error chain, if it is a known error
fn chain_exit_code(err: &(dyn std::error::Error + 'static)) -> Option<u8> {
    if let Some(core) = err.downcast_ref::<Error>() {
        return Some(CliResult::from(core).code());
    }
    if let Some(io) = err.downcast_ref::<std::io::Error>() {
        return Some(io_exit_code(io.kind()));
    }
    match (err.downcast_ref::<FixtureError>(), err.downcast_ref::<ConfigError>()) {
        (Some(FixtureError::Parse(_)), _) | (_, Some(ConfigError::Parse(_) | ConfigError::UnknownProfile(_))) => {
            Some(ExitCodes::CONFIG_ERROR)
        }
        _ => None,
    }
}

/// Map an error raised by a command. The chain is searched outermost first,
/// so an I/O error wrapped by a fixture or config error is still found.
impl From<&anyhow::Error> for CliResult {
    fn from(err: &anyhow::Error) -> Self {
        let code = err.chain().find_map(chain_exit_code).unwrap_or(ExitCodes::ERROR);
        Self::Error(code, format!("{:#}", err))
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Controller unreachable",
        5 => "Access denied",
        6 => "File not found",
        8 => "Configuration error",
        9 => "Protocol error",
        11 => "Operation cancelled",
        12 => "Point not found",
        13 => "Polling conflict",
        127 => "Internal error",
        _ => "Unknown error",
    }
}

/// All defined exit codes, ascending
pub const ALL_EXIT_CODES: [u8; 12] = [0, 1, 2, 3, 5, 6, 8, 9, 11, 12, 13, 127];

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in ALL_EXIT_CODES {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::network::ControllerFixture;

    #[test]
    fn test_cli_result() {
        let success = CliResult::success();
        assert!(success.is_success());
        assert_eq!(success.code(), 0);

        let error = CliResult::error(3, "Controller unreachable");
        assert!(!error.is_success());
        assert_eq!(error.code(), 3);
        assert_eq!(error.message(), Some("Controller unreachable"));
    }

    #[test]
    fn test_from_core_error() {
        let result = CliResult::from(&Error::NotFound("ZN-T".to_string()));
        assert_eq!(result.code(), ExitCodes::POINT_NOT_FOUND);
        assert_eq!(result.message(), Some("Unknown point name: ZN-T"));

        let result = CliResult::from(&Error::ConfigurationConflict("x".to_string()));
        assert_eq!(result.code(), ExitCodes::POLL_CONFLICT);
    }

    #[test]
    fn test_from_anyhow_error() {
        let err = anyhow::Error::new(Error::Unreachable("2:5".to_string()));
        assert_eq!(CliResult::from(&err).code(), ExitCodes::UNREACHABLE);

        let err = anyhow::anyhow!("boom");
        assert_eq!(CliResult::from(&err).code(), ExitCodes::ERROR);
    }

    #[test]
    fn test_missing_fixture_is_file_not_found() {
        let missing = std::path::Path::new("/nonexistent/bacpoll/controller.toml");
        let err = anyhow::Error::new(ControllerFixture::load(missing).unwrap_err())
            .context("Could not load fixture /nonexistent/bacpoll/controller.toml");

        let result = CliResult::from(&err);
        assert_eq!(result.code(), ExitCodes::FILE_NOT_FOUND);
        assert!(result.message().unwrap().starts_with("Could not load fixture"));
    }

    #[test]
    fn test_bad_fixture_is_config_error() {
        let err = anyhow::Error::new(ControllerFixture::from_toml_str("name = 3").unwrap_err());
        assert_eq!(CliResult::from(&err).code(), ExitCodes::CONFIG_ERROR);

        let err = anyhow::Error::new(ConfigError::UnknownProfile("rtu".to_string()));
        assert_eq!(CliResult::from(&err).code(), ExitCodes::CONFIG_ERROR);
    }

    #[test]
    fn test_descriptions_defined() {
        for code in ALL_EXIT_CODES {
            assert_ne!(exit_code_description(code), "Unknown error");
        }
    }

    #[test]
    fn test_from_io_error() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let result = CliResult::from(err);
        assert_eq!(result.code(), ExitCodes::FILE_NOT_FOUND);
    }
}
