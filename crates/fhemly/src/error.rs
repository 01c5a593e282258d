//! CLI error types with miette diagnostics.
//!
//! Maps `fhemly_api::Error` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use fhemly_api::ErrorKind;
use fhemly_config::ConfigError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the gateway at {url}")]
    #[diagnostic(
        code(fhemly::connection_failed),
        help(
            "Check that FHEM is running and its web frontend is reachable.\n\
             Raise --expiration-ms to keep retrying while it starts up."
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: fhemly_api::Error,
    },

    #[error("Request timed out")]
    #[diagnostic(
        code(fhemly::timeout),
        help("Increase the timeout with --timeout-ms or check the gateway's load.")
    )]
    Timeout {
        #[source]
        source: fhemly_api::Error,
    },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed")]
    #[diagnostic(
        code(fhemly::auth_failed),
        help(
            "Verify the username and password for this gateway.\n\
             Set them in your profile or pass --username / --password."
        )
    )]
    AuthFailed,

    #[error("No password configured for user '{username}' in profile '{profile}'")]
    #[diagnostic(
        code(fhemly::no_credentials),
        help(
            "Set `password_env` in the profile, store it in the system keyring \
             under service 'fhemly' account '{profile}/password', or set FHEMLY_PASSWORD."
        )
    )]
    NoCredentials { profile: String, username: String },

    // ── Gateway ──────────────────────────────────────────────────────
    #[error("Gateway redirected to '{location}'")]
    #[diagnostic(
        code(fhemly::wrong_base_path),
        help("The URL must include the web frontend's path, e.g. http://host:8083/fhem")
    )]
    WrongBasePath { location: String },

    #[error(transparent)]
    #[diagnostic(code(fhemly::gateway))]
    Gateway(fhemly_api::Error),

    #[error(transparent)]
    #[diagnostic(
        code(fhemly::remote),
        help("The gateway evaluated the request but reported an error.")
    )]
    Remote(fhemly_api::Error),

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(fhemly::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(fhemly::profile_not_found),
        help("Available profiles: {available}\nEdit the config file shown by: fhemly config path")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No gateway configured")]
    #[diagnostic(
        code(fhemly::no_config),
        help(
            "Pass --url (or set FHEMLY_URL), or add a profile to\n\
             {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(fhemly::config))]
    Config(ConfigError),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── fhemly_api::Error → CliError mapping ─────────────────────────────

impl CliError {
    /// Wrap a client error, attaching the gateway URL where it helps.
    pub fn from_api(err: fhemly_api::Error, url: &str) -> Self {
        match err.kind() {
            ErrorKind::ConnectionRefused
            | ErrorKind::NetworkUnreachable
            | ErrorKind::ConnectionReset
            | ErrorKind::ResponseError
            | ErrorKind::ResponseAborted
            | ErrorKind::OtherRequestError => Self::ConnectionFailed {
                url: url.to_owned(),
                source: err,
            },
            ErrorKind::ConnectTimeout => Self::Timeout { source: err },
            ErrorKind::AuthFailed => Self::AuthFailed,
            ErrorKind::InvalidConfigurationUrl | ErrorKind::InvalidArgument => Self::Validation {
                field: "input".into(),
                reason: err.to_string(),
            },
            ErrorKind::RemoteInvocationFailed | ErrorKind::OddLengthListForMapping => {
                Self::Remote(err)
            }
            ErrorKind::WrongBasePath => match err {
                fhemly_api::Error::WrongBasePath { location } => Self::WrongBasePath { location },
                other => Self::Gateway(other),
            },
            ErrorKind::TokenRequiredButAbsent | ErrorKind::UnexpectedStatus => Self::Gateway(err),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::ProfileNotFound { name, available } => Self::ProfileNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            },
            ConfigError::NoPassword { profile, username } => {
                Self::NoCredentials { profile, username }
            }
            other => Self::Config(other),
        }
    }
}
