//! Resolve the effective `ClientConfig` from the config file, the selected
//! profile and command-line overrides.
//!
//! Flags win over the profile, the profile wins over `[defaults]`.

use secrecy::SecretString;

use fhemly_api::{ClientConfig, Credentials};
use fhemly_config::{Config, Profile};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Load the config file and resolve the client configuration for `global`.
pub fn build_client_config(global: &GlobalOpts) -> Result<ClientConfig, CliError> {
    let cfg = fhemly_config::load_config()?;
    resolve_client_config(global, &cfg)
}

pub fn resolve_client_config(global: &GlobalOpts, cfg: &Config) -> Result<ClientConfig, CliError> {
    let profile_name = cfg.active_profile_name(global.profile.as_deref());

    let mut profile = match cfg.profile(&profile_name) {
        Ok(profile) => profile.clone(),
        // An explicitly requested profile must exist.
        Err(err) if global.profile.is_some() => return Err(err.into()),
        Err(_) if global.url.is_some() => Profile::default(),
        Err(_) => {
            return Err(CliError::NoConfig {
                path: fhemly_config::config_path().display().to_string(),
            });
        }
    };

    apply_overrides(&mut profile, global);

    // A password given on the command line bypasses env/keyring lookup.
    let flag_credentials = match (&global.password, profile.username.take()) {
        (Some(password), Some(username)) => Some(Credentials {
            username,
            password: SecretString::from(password.clone()),
        }),
        (Some(_), None) => {
            return Err(CliError::Validation {
                field: "password".into(),
                reason: "a password was given without a username".into(),
            });
        }
        (None, username) => {
            profile.username = username;
            None
        }
    };

    let mut config = fhemly_config::profile_to_client_config(&profile, &profile_name, &cfg.defaults)?;
    if flag_credentials.is_some() {
        config.credentials = flag_credentials;
    }
    tracing::debug!(profile = %profile_name, url = %config.url, "resolved gateway config");
    Ok(config)
}

fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(ref url) = global.url {
        profile.url.clone_from(url);
    }
    if let Some(ref username) = global.username {
        profile.username = Some(username.clone());
    }
    if global.verify_tls {
        profile.verify_tls = Some(true);
    }
    if let Some(ms) = global.timeout_ms {
        profile.timeout_ms = Some(ms);
    }
    if let Some(ms) = global.expiration_ms {
        profile.expiration_ms = Some(ms);
    }
}
