use log::error;
use thiserror::Error;

/// Exit status for an unknown rule or a missing/invalid option.
pub const EXIT_INVALID_CONFIG: i32 = 22;
pub const EXIT_INTERRUPTED: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

/// Errors raised while resolving a rule. Always fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No section: '{rule}'")]
    MissingSection { rule: String },

    #[error("No option '{option}' in section: '{rule}'")]
    MissingOption { rule: String, option: String },

    #[error("Invalid value for '{option}' in section '{rule}': {value:?} ({expected})")]
    InvalidValue {
        rule: String,
        option: String,
        value: String,
        expected: &'static str,
    },

    #[error("Failed to parse configuration file {path}: {message}")]
    Parse { path: String, message: String },
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Authentication failed, please check the password provided in the configuration file")]
    StoredPasswordRejected,

    #[error("Authentication failed after {attempts} password attempts")]
    PasswordAttemptsExhausted { attempts: usize },

    #[error("Interrupted")]
    Interrupted,

    #[error("Not a directory: {path}")]
    NotADirectory { path: String },

    #[error("Unexpected output from `{command}`: {output:?}")]
    InvalidRemoteId { command: String, output: String },

    #[error("`{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("Host key for {host} does not match the one in known_hosts")]
    HostKeyMismatch { host: String },
}

/// Log `err` and pick the process exit status for it.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(config_error) = err.downcast_ref::<ConfigError>() {
        error!("{}", config_error);
        return EXIT_INVALID_CONFIG;
    }
    if let Some(TransferError::Interrupted) = err.downcast_ref::<TransferError>() {
        error!("Interrupted.");
        return EXIT_INTERRUPTED;
    }
    error!("{:#}", err);
    EXIT_FAILURE
}
