// CSRF token management
//
// The gateway hands out its anti-forgery token in a response header and
// expects it back as the `fwcsrf` query parameter on every command. The
// token is fetched lazily with a probe request and replaced whenever the
// gateway rejects a stale one.

use reqwest::header::HeaderMap;

use crate::error::Error;

/// Response header carrying the gateway's current token (`X-FHEM-csrfToken`).
pub(crate) const TOKEN_HEADER: &str = "x-fhem-csrftoken";

/// Query parameter used to echo the token back.
pub(crate) const TOKEN_PARAM: &str = "fwcsrf";

/// What we know about the gateway's token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum TokenState {
    /// Not probed yet.
    #[default]
    Unknown,
    /// The gateway issued this token.
    Known(String),
    /// A successful probe carried no token: the gateway does not use one.
    NotRequired,
}

#[derive(Debug, Default)]
pub(crate) struct CsrfToken {
    state: TokenState,
}

impl CsrfToken {
    pub(crate) fn state(&self) -> &TokenState {
        &self.state
    }

    /// Whether a probe is needed before the next command.
    pub(crate) fn needs_probe(&self) -> bool {
        self.state == TokenState::Unknown
    }

    /// The token to attach to a command request, if any.
    pub(crate) fn current(&self) -> Option<&str> {
        match &self.state {
            TokenState::Known(token) => Some(token),
            TokenState::Unknown | TokenState::NotRequired => None,
        }
    }

    /// Record the result of a successful probe.
    pub(crate) fn adopt_probe(&mut self, headers: &HeaderMap) {
        self.state = match token_from_headers(headers) {
            Some(token) => TokenState::Known(token),
            None => TokenState::NotRequired,
        };
    }

    /// Handle a token-mismatch response.
    ///
    /// A fresh token in the response is adopted and the caller should
    /// reissue the request. No token at all means the gateway requires one
    /// but will never hand it out, which no retry can fix.
    pub(crate) fn invalidate(&mut self, headers: &HeaderMap) -> Result<(), Error> {
        let token = token_from_headers(headers).ok_or(Error::TokenMissing)?;
        self.state = TokenState::Known(token);
        Ok(())
    }
}

fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}
