// Remote function invocation
//
// Calls a named Perl function inside the gateway by generating a snippet
// for its command interface. The snippet captures the function's return
// values and serializes them as a compact JSON array (numbers unquoted,
// everything else as strings), or the bare word `undef` when the first
// value is undefined. Rendering and decoding are pure so they can be
// tested without a gateway.

use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::error::Error;
use crate::reply::{Reply, Scalar};

/// Literal text used for an absent argument before the snippet swaps in
/// Perl's `undef`.
const UNDEFINED_PLACEHOLDER: &str = "undefined";

/// Result text for an undefined first return value.
const UNDEF_RESULT: &str = "undef";

/// A positional argument passed to a remote function.
#[derive(Debug, Clone, PartialEq)]
pub enum FnArg {
    Str(String),
    Number(f64),
    Bool(bool),
    /// Passed as Perl `undef`.
    Undefined,
}

impl From<&str> for FnArg {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for FnArg {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<f64> for FnArg {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for FnArg {
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<i32> for FnArg {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<bool> for FnArg {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<FnArg>> From<Option<T>> for FnArg {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Undefined, Into::into)
    }
}

/// Description of a remote function call.
///
/// ```
/// use fhemly_api::FunctionCall;
///
/// let call = FunctionCall::new("lamp", "getState")
///     .pass_handle(true)
///     .arg("brightness")
///     .arg(3);
/// assert_eq!(call.device(), "lamp");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    device: String,
    function: String,
    pass_handle: bool,
    as_mapping: bool,
    args: Vec<FnArg>,
}

impl FunctionCall {
    pub fn new(device: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            function: function.into(),
            pass_handle: false,
            as_mapping: false,
            args: Vec::new(),
        }
    }

    /// Pass the device's internal hash (`$defs{device}`) as the first
    /// argument instead of its name.
    pub fn pass_handle(mut self, pass: bool) -> Self {
        self.pass_handle = pass;
        self
    }

    /// Pair up an evenly sized result list into a key/value mapping.
    pub fn as_mapping(mut self, as_mapping: bool) -> Self {
        self.as_mapping = as_mapping;
        self
    }

    pub fn arg(mut self, arg: impl Into<FnArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<FnArg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    /// Human-readable call line for logs. The device hash is shown as a
    /// placeholder since its contents mean nothing in a log.
    pub(crate) fn describe(&self) -> String {
        let first = if self.pass_handle {
            "<device hash>".to_owned()
        } else {
            perl_quote(&self.device)
        };
        let mut rendered = vec![first];
        rendered.extend(self.args.iter().map(|arg| match arg {
            FnArg::Undefined => "undef".to_owned(),
            other => render_arg(other),
        }));
        format!("{}({})", self.function, rendered.join(", "))
    }

    // ── Snippet rendering ───────────────────────────────────────────

    /// Render the Perl statements (without the outer braces) that perform
    /// the call and serialize its result.
    ///
    /// Statements are separated with `;;` because the gateway's command
    /// line splits on single semicolons.
    pub fn to_snippet(&self) -> Result<String, Error> {
        if !is_perl_identifier(&self.function) {
            return Err(Error::InvalidArgument(format!(
                "'{}' is not a valid function name",
                self.function
            )));
        }
        if self.device.is_empty() {
            return Err(Error::InvalidArgument("device name is empty".into()));
        }
        if let Some(FnArg::Number(n)) = self
            .args
            .iter()
            .find(|a| matches!(a, FnArg::Number(n) if !n.is_finite()))
        {
            return Err(Error::InvalidArgument(format!(
                "cannot pass non-finite number {n}"
            )));
        }

        let first = if self.pass_handle {
            format!("$defs{{{}}}", perl_quote(&self.device))
        } else {
            perl_quote(&self.device)
        };

        let mut list = vec![first];
        list.extend(self.args.iter().map(render_arg));

        let mut snippet = format!("my @a = ({});;", list.join(","));
        // Argument 0 is the device; user arguments start at index 1.
        for (idx, _) in self
            .args
            .iter()
            .enumerate()
            .filter(|(_, a)| **a == FnArg::Undefined)
        {
            let _ = write!(snippet, " $a[{}] = undef;;", idx + 1);
        }
        let _ = write!(snippet, " my @r = {}(@a);;", self.function);
        snippet.push_str(concat!(
            " if (!@r || !defined $r[0]) { 'undef' } else {",
            " '[' . join(',', map {",
            " my $v = $_ // '';;",
            r" if ($v =~ /^-?(?:0|[1-9]\d*)(?:\.\d+)?(?:[eE][-+]?\d+)?$/) { $v } else {",
            r#" $v =~ s/(["\\])/\\$1/g;;"#,
            r" $v =~ s/([\x00-\x1f])/sprintf('\\u%04x', ord($1))/ge;;",
            r#" '"' . $v . '"' }"#,
            " } @r) . ']' }",
        ));
        Ok(snippet)
    }

    // ── Result decoding ─────────────────────────────────────────────

    /// Decode the text returned by the gateway for this call.
    pub fn decode(&self, text: &str) -> Result<Reply, Error> {
        decode_result(text, self.as_mapping)
    }
}

/// Decode a serialized result list.
///
/// Anything that is neither `undef` nor a JSON array of numbers and
/// strings is the remote interpreter's own error text.
pub(crate) fn decode_result(text: &str, as_mapping: bool) -> Result<Reply, Error> {
    let text = text.trim();
    if text == UNDEF_RESULT {
        return Ok(Reply::None);
    }

    let values: Vec<serde_json::Value> =
        serde_json::from_str(text).map_err(|_| Error::RemoteInvocation {
            message: text.to_owned(),
        })?;

    let mut items = values
        .into_iter()
        .map(|value| match value {
            serde_json::Value::Number(n) => n.as_f64().map(Scalar::Number).ok_or_else(|| {
                Error::RemoteInvocation {
                    message: format!("number out of range: {n}"),
                }
            }),
            serde_json::Value::String(s) => Ok(Scalar::String(s)),
            other => Err(Error::RemoteInvocation {
                message: format!("unexpected element in result list: {other}"),
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    match items.len() {
        0 => Ok(Reply::None),
        1 => Ok(items.pop().map_or(Reply::None, Reply::Scalar)),
        len if as_mapping => {
            if len % 2 != 0 {
                return Err(Error::OddLengthList { len });
            }
            let mut map = IndexMap::with_capacity(len / 2);
            let mut iter = items.into_iter();
            while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
                map.insert(key.to_string(), value);
            }
            Ok(Reply::Map(map))
        }
        _ => Ok(Reply::List(items)),
    }
}

fn render_arg(arg: &FnArg) -> String {
    match arg {
        FnArg::Str(s) => perl_quote(s),
        FnArg::Number(n) => n.to_string(),
        FnArg::Bool(true) => "1".to_owned(),
        FnArg::Bool(false) => "''".to_owned(),
        FnArg::Undefined => perl_quote(UNDEFINED_PLACEHOLDER),
    }
}

/// Single-quoted Perl literal. Backslash and quote are escaped; `;` is
/// doubled for the gateway's command splitter.
fn perl_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' | '\'' => {
                out.push('\\');
                out.push(c);
            }
            ';' => out.push_str(";;"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn is_perl_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}
