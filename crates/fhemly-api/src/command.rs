// Command execution
//
// Every operation ends up as `GET <base>?XHR=1&cmd=<text>&fwcsrf=<token>`.
// This module builds that request, probes for the CSRF token on first use,
// and maps the gateway's status codes onto outcomes.

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, LOCATION};
use url::Url;
use url::form_urlencoded;

use crate::client::{Attempt, FhemClient};
use crate::csrf::{TOKEN_PARAM, TokenState};
use crate::error::Error;

/// Asks the web frontend for the bare command output instead of HTML.
const MINIMAL_RESPONSE_PARAM: (&str, &str) = ("XHR", "1");

/// Query parameter carrying the command text.
const COMMAND_PARAM: &str = "cmd";

impl FhemClient {
    /// Send one command and classify the response.
    ///
    /// Returns the raw body (trailing newlines intact) on 200, or
    /// [`Attempt::RetryNow`] after adopting a refreshed token on 400.
    pub(crate) async fn send_command(&mut self, command: &str) -> Result<Attempt<String>, Error> {
        if self.csrf.needs_probe() {
            self.probe_token().await?;
        }

        let url = command_url(&self.base_url, Some(command), self.csrf.current());
        let resp = self.transport.get(url, &*self.logger).await?;

        match resp.status {
            StatusCode::OK => {
                self.logger.debug(format_args!(
                    "command '{command}' returned {} bytes",
                    resp.body.len()
                ));
                Ok(Attempt::Done(resp.body))
            }
            StatusCode::BAD_REQUEST => {
                self.csrf.invalidate(&resp.headers)?;
                self.logger
                    .info(format_args!("CSRF token was rejected, adopted a fresh one"));
                Ok(Attempt::RetryNow)
            }
            status => Err(status_error(status, &resp.headers)),
        }
    }

    /// Fetch the CSRF token with a request that runs no command.
    async fn probe_token(&mut self) -> Result<(), Error> {
        let url = command_url(&self.base_url, None, None);
        let resp = self.transport.get(url, &*self.logger).await?;
        if resp.status != StatusCode::OK {
            return Err(status_error(resp.status, &resp.headers));
        }

        self.csrf.adopt_probe(&resp.headers);
        match self.csrf.state() {
            TokenState::Known(_) => self.logger.debug(format_args!("obtained CSRF token")),
            _ => self
                .logger
                .info(format_args!("gateway does not use a CSRF token")),
        }
        Ok(())
    }
}

/// Map a non-success status to its fatal error.
fn status_error(status: StatusCode, headers: &HeaderMap) -> Error {
    match status {
        StatusCode::UNAUTHORIZED => Error::Authentication,
        StatusCode::FOUND => Error::WrongBasePath {
            location: headers
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_owned(),
        },
        other => Error::UnexpectedStatus {
            status: other.as_u16(),
            reason: other.canonical_reason().unwrap_or_default().to_owned(),
        },
    }
}

/// Build the request URL. Spaces are sent as `%20` rather than `+`.
fn command_url(base: &Url, command: Option<&str>, token: Option<&str>) -> Url {
    let mut pairs = vec![MINIMAL_RESPONSE_PARAM];
    if let Some(command) = command {
        pairs.push((COMMAND_PARAM, command));
        if let Some(token) = token {
            pairs.push((TOKEN_PARAM, token));
        }
    }

    let mut query = base.query().map(str::to_owned).unwrap_or_default();
    for (key, value) in pairs {
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&encode_component(key));
        query.push('=');
        query.push_str(&encode_component(value));
    }

    let mut url = base.clone();
    url.set_query(Some(&query));
    url
}

fn encode_component(s: &str) -> String {
    // byte_serialize escapes a literal '+' as %2B, so any '+' left is a space.
    form_urlencoded::byte_serialize(s.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
