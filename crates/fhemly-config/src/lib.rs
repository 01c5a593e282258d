//! Shared configuration for fhemly.
//!
//! TOML profiles, password resolution (env + keyring + plaintext), and
//! translation to `fhemly_api::ClientConfig`. The CLI layers its flag
//! overrides on top.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use thiserror::Error;

use fhemly_api::{ClientConfig, Credentials, ErrorKind, TlsMode, TransportConfig};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String, available: Vec<String> },

    #[error("no password configured for user '{username}' in profile '{profile}'")]
    NoPassword { profile: String, username: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named gateway profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Verify the gateway's TLS certificate. Off by default since most
    /// gateways run with self-signed certificates.
    #[serde(default)]
    pub verify_tls: bool,

    #[serde(default = "default_keep_alive")]
    pub keep_alive: bool,

    /// Retry budget per operation in milliseconds (0 disables retries).
    #[serde(default)]
    pub expiration_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            verify_tls: false,
            keep_alive: default_keep_alive(),
            expiration_ms: 0,
        }
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}
fn default_keep_alive() -> bool {
    true
}

/// A named gateway profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Web frontend URL (e.g., "https://homeserver:8083/fhem").
    pub url: String,

    /// Username for basic auth.
    pub username: Option<String>,

    /// Password (plaintext -- prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Path to custom CA certificate. Implies TLS verification.
    pub ca_cert: Option<PathBuf>,

    /// Override TLS verification.
    pub verify_tls: Option<bool>,

    /// Override request timeout (ms).
    pub timeout_ms: Option<u64>,

    /// Override connection reuse.
    pub keep_alive: Option<bool>,

    /// Override retry budget (ms).
    pub expiration_ms: Option<u64>,

    /// Per-kind retry delays in ms, e.g. `connection-refused = 2000`.
    #[serde(default)]
    pub retry: BTreeMap<String, u64>,
}

impl Config {
    /// Resolve the effective profile name: explicit > configured default > "default".
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.into(),
                available: {
                    let mut names: Vec<String> = self.profiles.keys().cloned().collect();
                    names.sort();
                    names
                },
            })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "fhemly", "fhemly").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("fhemly");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the Config from `path`, with `FHEMLY_` environment overrides
/// (nested keys separated by `__`, e.g. `FHEMLY_DEFAULTS__TIMEOUT_MS`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("FHEMLY_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve basic-auth credentials for a profile.
///
/// Returns `None` when the profile has no username. The password is looked
/// up in order: `password_env`, system keyring, plaintext.
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<Option<Credentials>, ConfigError> {
    let Some(username) = profile.username.clone() else {
        return Ok(None);
    };

    // 1. Profile's password_env → env var lookup
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(Some(Credentials {
                username,
                password: SecretString::from(val),
            }));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new("fhemly", &format!("{profile_name}/password")) {
        if let Ok(pw) = entry.get_password() {
            return Ok(Some(Credentials {
                username,
                password: SecretString::from(pw),
            }));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(Some(Credentials {
            username,
            password: SecretString::from(pw.clone()),
        }));
    }

    Err(ConfigError::NoPassword {
        profile: profile_name.into(),
        username,
    })
}

/// Parse the `[retry]` table into typed overrides.
pub fn parse_retry_overrides(
    table: &BTreeMap<String, u64>,
) -> Result<Vec<(ErrorKind, Duration)>, ConfigError> {
    table
        .iter()
        .map(|(name, ms)| {
            let kind = name.parse::<ErrorKind>().map_err(|_| ConfigError::Validation {
                field: format!("retry.{name}"),
                reason: format!(
                    "unknown error kind, expected one of: {}",
                    ErrorKind::iter()
                        .map(|k| k.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            })?;
            Ok((kind, Duration::from_millis(*ms)))
        })
        .collect()
}

/// Build a `ClientConfig` from a profile and the global defaults.
pub fn profile_to_client_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ClientConfig, ConfigError> {
    if profile.url.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "url".into(),
            reason: format!("profile '{profile_name}' has no gateway URL"),
        });
    }

    let tls = if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else if profile.verify_tls.unwrap_or(defaults.verify_tls) {
        TlsMode::System
    } else {
        TlsMode::DangerAcceptInvalid
    };

    let timeout_ms = profile.timeout_ms.unwrap_or(defaults.timeout_ms);
    let transport = TransportConfig {
        tls,
        timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
        keep_alive: profile.keep_alive.unwrap_or(defaults.keep_alive),
    };

    let mut config = ClientConfig::new(profile.url.clone())
        .with_transport(transport)
        .with_expiration(Duration::from_millis(
            profile.expiration_ms.unwrap_or(defaults.expiration_ms),
        ));
    config.credentials = resolve_credentials(profile, profile_name)?;
    config.retry_overrides = parse_retry_overrides(&profile.retry)?;
    Ok(config)
}
