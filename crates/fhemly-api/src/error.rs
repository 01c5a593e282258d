use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

/// Machine-readable classification of every [`Error`].
///
/// The kebab-case string form (`"connection-refused"`, ...) is what retry
/// overrides use in configuration files.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    InvalidConfigurationUrl,
    ResponseError,
    ResponseAborted,
    ConnectTimeout,
    ConnectionRefused,
    NetworkUnreachable,
    ConnectionReset,
    OtherRequestError,
    AuthFailed,
    WrongBasePath,
    TokenRequiredButAbsent,
    UnexpectedStatus,
    RemoteInvocationFailed,
    OddLengthListForMapping,
    InvalidArgument,
}

/// Top-level error type for the `fhemly-api` crate.
///
/// Transport faults, gateway protocol faults and remote evaluation faults
/// all land here. The retry layer decides what to re-attempt from
/// [`Error::kind`]; everything else surfaces to the caller unchanged.
#[derive(Debug, Error)]
pub enum Error {
    // ── Configuration ───────────────────────────────────────────────
    /// The configured gateway URL is not a usable absolute http(s) URL.
    #[error("Invalid gateway URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    // ── Transport ───────────────────────────────────────────────────
    /// The response could not be read.
    #[error("Response error: {message}")]
    Response { message: String },

    /// The gateway closed the connection before the response was complete.
    #[error("Response aborted: {message}")]
    ResponseAborted { message: String },

    /// The request did not complete within the configured timeout.
    #[error("Request timed out after {timeout_ms}ms")]
    ConnectTimeout { timeout_ms: u64 },

    #[error("Connection refused: {message}")]
    ConnectionRefused { message: String },

    #[error("Network unreachable: {message}")]
    NetworkUnreachable { message: String },

    /// The connection was reset by the peer.
    #[error("Connection reset: {message}")]
    ConnectionReset { message: String },

    /// Any other transport failure (DNS, TLS, client construction, ...).
    #[error("HTTP request failed: {message}")]
    Request { message: String },

    // ── Gateway protocol ────────────────────────────────────────────
    /// HTTP 401.
    #[error("Authentication failed: wrong username or password")]
    Authentication,

    /// HTTP 302: the base path does not point at the web frontend.
    #[error("Gateway redirected to '{location}' -- check the configured base path")]
    WrongBasePath { location: String },

    /// HTTP 400 without a fresh token: the gateway wants a CSRF token
    /// but never hands one out.
    #[error("Gateway requires a CSRF token but did not send one")]
    TokenMissing,

    #[error("Unexpected HTTP status {status} {reason}")]
    UnexpectedStatus { status: u16, reason: String },

    // ── Remote evaluation ───────────────────────────────────────────
    /// The remote interpreter answered with its own error text instead of
    /// the expected result array.
    #[error("Remote invocation failed: {message}")]
    RemoteInvocation { message: String },

    #[error("Cannot form a mapping from an odd-length list ({len} elements)")]
    OddLengthList { len: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// The machine-readable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl { .. } => ErrorKind::InvalidConfigurationUrl,
            Self::Response { .. } => ErrorKind::ResponseError,
            Self::ResponseAborted { .. } => ErrorKind::ResponseAborted,
            Self::ConnectTimeout { .. } => ErrorKind::ConnectTimeout,
            Self::ConnectionRefused { .. } => ErrorKind::ConnectionRefused,
            Self::NetworkUnreachable { .. } => ErrorKind::NetworkUnreachable,
            Self::ConnectionReset { .. } => ErrorKind::ConnectionReset,
            Self::Request { .. } => ErrorKind::OtherRequestError,
            Self::Authentication => ErrorKind::AuthFailed,
            Self::WrongBasePath { .. } => ErrorKind::WrongBasePath,
            Self::TokenMissing => ErrorKind::TokenRequiredButAbsent,
            Self::UnexpectedStatus { .. } => ErrorKind::UnexpectedStatus,
            Self::RemoteInvocation { .. } => ErrorKind::RemoteInvocationFailed,
            Self::OddLengthList { .. } => ErrorKind::OddLengthListForMapping,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    /// Returns `true` if the default retry policy carries a delay for
    /// this error's kind.
    pub fn is_retryable_by_default(&self) -> bool {
        crate::retry::RetryPolicy::default()
            .delay_for(self.kind())
            .is_some()
    }

    /// Build a transport error of the given kind.
    ///
    /// Kinds that are not transport kinds fall back to [`Error::Request`].
    pub(crate) fn transport(kind: ErrorKind, message: String, timeout_ms: u64) -> Self {
        match kind {
            ErrorKind::ResponseError => Self::Response { message },
            ErrorKind::ResponseAborted => Self::ResponseAborted { message },
            ErrorKind::ConnectTimeout => Self::ConnectTimeout { timeout_ms },
            ErrorKind::ConnectionRefused => Self::ConnectionRefused { message },
            ErrorKind::NetworkUnreachable => Self::NetworkUnreachable { message },
            ErrorKind::ConnectionReset => Self::ConnectionReset { message },
            _ => Self::Request { message },
        }
    }
}
