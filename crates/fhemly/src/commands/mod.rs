//! Command handlers, dispatched from `main`.

pub mod config_cmd;
pub mod exec;

use fhemly_api::FhemClient;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a command that talks to the gateway.
pub async fn dispatch(
    cmd: Command,
    client: &mut FhemClient,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Cmd { text } => exec::run_command(client, &text.join(" "), global).await,
        Command::Perl { code } => exec::run_snippet(client, &code.join(" "), global).await,
        Command::Call(args) => exec::call_function(client, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions { .. } => unreachable!(),
    }
}
