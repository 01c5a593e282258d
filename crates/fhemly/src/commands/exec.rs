//! Handlers for `cmd`, `perl` and `call`.

use fhemly_api::{FhemClient, FnArg, FunctionCall, Reply, Scalar};

use crate::cli::{CallArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub async fn run_command(
    client: &mut FhemClient,
    text: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let reply = client
        .execute_command(text)
        .await
        .map_err(|e| CliError::from_api(e, client.base_url().as_str()))?;
    print_reply(&reply, global)
}

pub async fn run_snippet(
    client: &mut FhemClient,
    code: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let reply = client
        .execute_snippet(code)
        .await
        .map_err(|e| CliError::from_api(e, client.base_url().as_str()))?;
    print_reply(&reply, global)
}

pub async fn call_function(
    client: &mut FhemClient,
    args: CallArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let call = FunctionCall::new(args.device, args.function)
        .pass_handle(args.pass_handle)
        .as_mapping(args.map)
        .args(args.args.iter().map(String::as_str).map(parse_arg));

    let reply = client
        .invoke_function(&call)
        .await
        .map_err(|e| CliError::from_api(e, client.base_url().as_str()))?;
    print_reply(&reply, global)
}

fn print_reply(reply: &Reply, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_reply(global.output, reply)?;
    output::print_output(&out);
    Ok(())
}

/// Interpret a command-line word as a function argument.
///
/// `undef` is the undefined value, `true`/`false` are booleans, numeric
/// text is a number, anything else is passed as a string.
pub fn parse_arg(raw: &str) -> FnArg {
    match raw {
        "undef" => FnArg::Undefined,
        "true" => FnArg::Bool(true),
        "false" => FnArg::Bool(false),
        _ => match Scalar::from_text(raw) {
            Scalar::Number(n) => FnArg::Number(n),
            Scalar::String(s) => FnArg::Str(s),
        },
    }
}
