//! Config subcommand handlers.

use fhemly_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

const MASK: &str = "****";

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&fhemly_config::config_path().display().to_string());
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = redacted(fhemly_config::load_config()?);
            let out = match global.output {
                OutputFormat::Plain => toml::to_string_pretty(&cfg)?,
                OutputFormat::Json => output::render_json(&cfg, false)?,
                OutputFormat::JsonCompact => output::render_json(&cfg, true)?,
            };
            output::print_output(out.trim_end());
            Ok(())
        }
    }
}

/// Mask plaintext passwords. Env var names are not secret and stay visible.
fn redacted(mut cfg: Config) -> Config {
    for profile in cfg.profiles.values_mut() {
        if profile.password.is_some() {
            profile.password = Some(MASK.into());
        }
    }
    cfg
}
