// HTTP transport for the gateway connection.
//
// Builds the single `reqwest::Client` the gateway client talks through,
// performs read-to-completion GET requests with an actively enforced
// timeout, and classifies transport failures into `ErrorKind`s.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CONNECTION, HeaderMap};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::{Error, ErrorKind};
use crate::logger::Logger;

/// TLS verification mode.
#[derive(Debug, Clone)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (for gateways with self-signed certificates).
    DangerAcceptInvalid,
}

/// Transport options requested from the HTTP stack.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Per-request deadline covering connect, headers and body.
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Keep the connection open between requests.
    pub keep_alive: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::DangerAcceptInvalid,
            timeout: Some(Duration::from_secs(30)),
            keep_alive: true,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// Redirects are never followed: a redirect from the gateway means the
    /// base path is wrong and must reach the caller as a status code.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("fhemly/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none());

        builder = if self.keep_alive {
            builder
                .pool_max_idle_per_host(1)
                .tcp_keepalive(Duration::from_secs(60))
        } else {
            builder.pool_max_idle_per_host(0)
        };

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path).map_err(|e| Error::Request {
                    message: format!("failed to read CA cert: {e}"),
                })?;
                let cert = reqwest::Certificate::from_pem(&cert_pem).map_err(|e| {
                    Error::Request {
                        message: format!("invalid CA cert: {e}"),
                    }
                })?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder.build().map_err(|e| Error::Request {
            message: format!("failed to build HTTP client: {e}"),
        })
    }

    pub(crate) fn timeout_ms(&self) -> u64 {
        self.timeout
            .map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Basic-auth credentials for the gateway.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// A fully read response.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// Where in the exchange a transport failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Connecting, sending, or waiting for response headers.
    Send,
    /// Reading the response body.
    Body,
}

/// The request/response primitive. Owns the reusable connection state.
pub(crate) struct Transport {
    http: reqwest::Client,
    config: TransportConfig,
    credentials: Option<Credentials>,
    connection_open: bool,
}

impl Transport {
    pub(crate) fn new(
        config: TransportConfig,
        credentials: Option<Credentials>,
    ) -> Result<Self, Error> {
        let http = config.build_client()?;
        Ok(Self {
            http,
            config,
            credentials,
            connection_open: false,
        })
    }

    /// Perform a GET and read the response to completion.
    pub(crate) async fn get(
        &mut self,
        url: Url,
        logger: &dyn Logger,
    ) -> Result<RawResponse, Error> {
        let endpoint = endpoint_label(&url);
        if self.connection_open {
            logger.debug(format_args!("sending to {endpoint} over kept-alive client"));
        } else {
            logger.debug(format_args!("sending to {endpoint} on a fresh connection"));
        }

        let mut request = self.http.get(url);
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(creds.password.expose_secret()));
        }

        let exchange = async {
            let resp = request.send().await.map_err(|e| (Phase::Send, e))?;
            let status = resp.status();
            let headers = resp.headers().clone();
            let bytes = resp.bytes().await.map_err(|e| (Phase::Body, e))?;
            Ok::<_, (Phase, reqwest::Error)>(RawResponse {
                status,
                headers,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            })
        };

        // Dropping the exchange future cancels the in-flight request, so the
        // abort never surfaces as a reset of its own.
        let outcome = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.connection_open = false;
                    logger.info(format_args!(
                        "aborted request to {endpoint} after {}ms",
                        self.config.timeout_ms()
                    ));
                    return Err(Error::ConnectTimeout {
                        timeout_ms: self.config.timeout_ms(),
                    });
                }
            },
            None => exchange.await,
        };

        match outcome {
            Ok(resp) => {
                let close_requested = resp
                    .headers
                    .get(CONNECTION)
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|v| v.eq_ignore_ascii_case("close"));
                self.connection_open = self.config.keep_alive && !close_requested;
                if !self.connection_open {
                    logger.debug(format_args!("connection to {endpoint} closed"));
                }
                Ok(resp)
            }
            Err((phase, err)) => {
                self.connection_open = false;
                let kind = classify(&err, phase);
                logger.debug(format_args!(
                    "connection to {endpoint} failed ({kind}): {err}"
                ));
                Err(Error::transport(
                    kind,
                    err.to_string(),
                    self.config.timeout_ms(),
                ))
            }
        }
    }
}

fn endpoint_label(url: &Url) -> String {
    match (url.host_str(), url.port_or_known_default()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_owned(),
        _ => url.to_string(),
    }
}

// ── Failure classification ──────────────────────────────────────────

/// Classify a `reqwest` failure.
pub(crate) fn classify(err: &reqwest::Error, phase: Phase) -> ErrorKind {
    if err.is_timeout() {
        return ErrorKind::ConnectTimeout;
    }
    if let Some(kind) = io_error_kind(err) {
        return classify_io(kind, phase);
    }
    match phase {
        Phase::Send if err.is_connect() => ErrorKind::OtherRequestError,
        Phase::Send => ErrorKind::ResponseError,
        Phase::Body if err.is_decode() => ErrorKind::ResponseError,
        Phase::Body => ErrorKind::ResponseAborted,
    }
}

/// Classify an OS-level socket failure.
pub(crate) fn classify_io(kind: io::ErrorKind, phase: Phase) -> ErrorKind {
    match kind {
        io::ErrorKind::TimedOut => ErrorKind::ConnectTimeout,
        io::ErrorKind::ConnectionRefused => ErrorKind::ConnectionRefused,
        io::ErrorKind::NetworkUnreachable | io::ErrorKind::HostUnreachable => {
            ErrorKind::NetworkUnreachable
        }
        io::ErrorKind::ConnectionReset => ErrorKind::ConnectionReset,
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::BrokenPipe => ErrorKind::ResponseAborted,
        _ => match phase {
            Phase::Send => ErrorKind::OtherRequestError,
            Phase::Body => ErrorKind::ResponseError,
        },
    }
}

/// Walk the source chain looking for the underlying `io::Error`.
fn io_error_kind(err: &(dyn std::error::Error + 'static)) -> Option<io::ErrorKind> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        current = e.source();
    }
    None
}
