// Gateway client
//
// Owns the session (connection, CSRF token) and runs every public
// operation through the retry loop. The request/status handling lives in
// `command.rs`; snippet building and result decoding in `function.rs`.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::time::Instant;
use url::Url;

use crate::csrf::CsrfToken;
use crate::error::{Error, ErrorKind};
use crate::function::FunctionCall;
use crate::logger::{Logger, TracingLogger};
use crate::reply::Reply;
use crate::retry::RetryPolicy;
use crate::transport::{Credentials, Transport, TransportConfig};

/// Upper bound for the retry deadline when the expiration is too large to
/// add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Everything needed to construct a [`FhemClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Web frontend base URL, e.g. `https://homeserver:8083/fhem`.
    pub url: String,
    pub credentials: Option<Credentials>,
    pub transport: TransportConfig,
    /// Merged over the default per-kind retry delays.
    pub retry_overrides: Vec<(ErrorKind, Duration)>,
    /// Total retry budget per operation. Zero disables retries.
    pub expiration: Duration,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credentials: None,
            transport: TransportConfig::default(),
            retry_overrides: Vec::new(),
            expiration: Duration::ZERO,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: SecretString) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password,
        });
        self
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_retry_delay(mut self, kind: ErrorKind, delay: Duration) -> Self {
        self.retry_overrides.push((kind, delay));
        self
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }
}

/// Result of a single attempt at an operation.
#[derive(Debug)]
pub(crate) enum Attempt<T> {
    Done(T),
    /// The CSRF token was refreshed; reissue without delay.
    RetryNow,
}

/// What a retried operation does on each attempt.
#[derive(Debug)]
enum Operation<'a> {
    Command(&'a str),
    Invoke {
        call: &'a FunctionCall,
        command: String,
    },
}

/// Async client for one gateway.
///
/// Requests are strictly sequential: every operation takes `&mut self`, so
/// at most one request is in flight per client. Use separate clients for
/// concurrent work.
pub struct FhemClient {
    pub(crate) base_url: Url,
    pub(crate) transport: Transport,
    pub(crate) csrf: CsrfToken,
    retry: RetryPolicy,
    expiration: Duration,
    pub(crate) logger: Arc<dyn Logger>,
}

impl FhemClient {
    /// Create a client. The URL is validated immediately; no request is
    /// made until the first operation.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let base_url = parse_base_url(&config.url)?;
        let transport = Transport::new(config.transport, config.credentials)?;
        let retry = RetryPolicy::default().with_overrides(config.retry_overrides);
        Ok(Self {
            base_url,
            transport,
            csrf: CsrfToken::default(),
            retry,
            expiration: config.expiration,
            logger: Arc::new(TracingLogger),
        })
    }

    /// Route log output to `logger` instead of `tracing`.
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Current retry budget per operation.
    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    /// Change the retry budget for subsequent operations.
    pub fn set_expiration(&mut self, expiration: Duration) {
        self.expiration = expiration;
    }

    // ── Public operations ───────────────────────────────────────────

    /// Run a gateway command, e.g. `set lamp on` or `list`.
    pub async fn execute_command(&mut self, command: &str) -> Result<Reply, Error> {
        self.run_with_retry(Operation::Command(command)).await
    }

    /// Evaluate Perl code on the gateway. The code is wrapped in braces so
    /// only the value of its last expression is returned.
    pub async fn execute_snippet(&mut self, code: &str) -> Result<Reply, Error> {
        let command = format!("{{{code}}}");
        self.run_with_retry(Operation::Command(&command)).await
    }

    /// Call a Perl function on the gateway and decode its return values.
    pub async fn invoke_function(&mut self, call: &FunctionCall) -> Result<Reply, Error> {
        let snippet = call.to_snippet()?;
        self.logger.info(format_args!(
            "invoking {} on {}",
            call.describe(),
            call.device()
        ));
        let command = format!("{{{snippet}}}");
        self.run_with_retry(Operation::Invoke { call, command }).await
    }

    // ── Retry loop ──────────────────────────────────────────────────

    async fn run_with_retry(&mut self, op: Operation<'_>) -> Result<Reply, Error> {
        let started = Instant::now();
        let deadline = started
            .checked_add(self.expiration)
            .unwrap_or_else(|| started + FAR_FUTURE);

        loop {
            match self.attempt(&op).await {
                Ok(Attempt::Done(reply)) => return Ok(reply),
                Ok(Attempt::RetryNow) => {
                    self.logger
                        .debug(format_args!("CSRF token refreshed, reissuing request"));
                }
                Err(err) => {
                    let kind = err.kind();
                    let Some(delay) =
                        self.retry
                            .next_delay(kind, self.expiration, Instant::now(), deadline)
                    else {
                        return Err(err);
                    };
                    self.logger.warn(format_args!(
                        "request failed ({kind}): {err}; retrying in {}ms",
                        delay.as_millis()
                    ));
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(&mut self, op: &Operation<'_>) -> Result<Attempt<Reply>, Error> {
        match op {
            Operation::Command(command) => Ok(match self.send_command(command).await? {
                Attempt::Done(body) => Attempt::Done(Reply::from_body(&body)),
                Attempt::RetryNow => Attempt::RetryNow,
            }),
            Operation::Invoke { call, command } => Ok(match self.send_command(command).await? {
                Attempt::Done(body) => Attempt::Done(call.decode(&body)?),
                Attempt::RetryNow => Attempt::RetryNow,
            }),
        }
    }
}

fn parse_base_url(raw: &str) -> Result<Url, Error> {
    let invalid = |reason: String| Error::InvalidUrl {
        url: raw.to_owned(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".into()));
    }
    Ok(url)
}
