//! Clap derive structures for the `fhemly` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fhemly -- talk to a FHEM gateway from the command line
#[derive(Debug, Parser)]
#[command(
    name = "fhemly",
    version,
    about = "Run commands, Perl snippets and device functions on a FHEM gateway",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Gateway profile to use
    #[arg(long, short = 'p', env = "FHEMLY_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Gateway URL including the web path (overrides profile)
    #[arg(long, short = 'u', env = "FHEMLY_URL", global = true)]
    pub url: Option<String>,

    /// Basic-auth username (overrides profile)
    #[arg(long, env = "FHEMLY_USERNAME", global = true)]
    pub username: Option<String>,

    /// Basic-auth password
    #[arg(long, env = "FHEMLY_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Verify the gateway's TLS certificate
    #[arg(long, env = "FHEMLY_VERIFY_TLS", global = true)]
    pub verify_tls: bool,

    /// Request timeout in milliseconds
    #[arg(long, env = "FHEMLY_TIMEOUT_MS", global = true)]
    pub timeout_ms: Option<u64>,

    /// Retry budget per operation in milliseconds (0 disables retries)
    #[arg(long, env = "FHEMLY_EXPIRATION_MS", global = true)]
    pub expiration_ms: Option<u64>,

    /// Output format
    #[arg(long, short = 'o', default_value = "plain", global = true)]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Plain text: scalars as-is, lists one per line, mappings as `key: value`
    Plain,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a gateway command (e.g. `set lamp on`)
    Cmd {
        /// Command text; multiple words are joined with spaces
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        text: Vec<String>,
    },

    /// Evaluate a Perl expression on the gateway
    Perl {
        /// Perl code; multiple words are joined with spaces
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        code: Vec<String>,
    },

    /// Call a Perl function with a device as its first argument
    Call(CallArgs),

    /// Inspect configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct CallArgs {
    /// Device name
    pub device: String,

    /// Function name
    pub function: String,

    /// Arguments: numbers, `true`/`false`, `undef`, or text
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Pass the device's internal hash instead of its name
    #[arg(long)]
    pub pass_handle: bool,

    /// Pair up an evenly sized result list into a mapping
    #[arg(long, short = 'm')]
    pub map: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,
    /// Print the configuration with secrets masked
    Show,
}
