//! Output formatting: plain text or JSON.

use std::io::{self, Write};

use fhemly_api::Reply;

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Render a gateway reply in the chosen format.
///
/// Plain output of [`Reply::None`] is empty, JSON output is `null`.
pub fn render_reply(format: OutputFormat, reply: &Reply) -> Result<String, CliError> {
    match format {
        OutputFormat::Plain => Ok(reply.to_string()),
        OutputFormat::Json => render_json(reply, false),
        OutputFormat::JsonCompact => render_json(reply, true),
    }
}

pub(crate) fn render_json<T: serde::Serialize + ?Sized>(
    data: &T,
    compact: bool,
) -> Result<String, CliError> {
    let rendered = if compact {
        serde_json::to_string(data)?
    } else {
        serde_json::to_string_pretty(data)?
    };
    Ok(rendered)
}

/// Print rendered output to stdout. Empty output prints nothing.
pub fn print_output(output: &str) {
    if output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}
