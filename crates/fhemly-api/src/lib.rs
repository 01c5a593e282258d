// fhemly-api: Async Rust client for the FHEM web gateway

pub mod client;
mod command;
mod csrf;
pub mod error;
pub mod function;
pub mod logger;
pub mod reply;
pub mod retry;
pub mod transport;

pub use client::{ClientConfig, FhemClient};
pub use error::{Error, ErrorKind};
pub use function::{FnArg, FunctionCall};
pub use logger::{Logger, NoopLogger, TracingLogger};
pub use reply::{Reply, Scalar};
pub use retry::RetryPolicy;
pub use transport::{Credentials, TlsMode, TransportConfig};
