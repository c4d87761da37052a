//! Engine connection and build defaults.
//!
//! Connection options come from three places, in increasing priority: the
//! built-in defaults, a `pier.toml` config file, and `key=value` option
//! strings given on the command line.

use crate::engine::{BuildContext, BuildOptions};
use crate::error::{PierError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// How to reach the container engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine endpoint (`unix://...`, `tcp://...` or `http://...`).
    /// Local defaults and Podman sockets are tried when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Connect over TLS with client certificates
    #[serde(default)]
    pub tls: bool,
    /// Directory holding `key.pem`, `cert.pem` and `ca.pem`.
    /// `DOCKER_CERT_PATH`, then `~/.docker`, when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<PathBuf>,
    /// Engine API version as `major.minor`; bollard's default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

fn default_timeout() -> u64 {
    crate::env::DEFAULT_ENGINE_TIMEOUT_SECS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: default_timeout(),
            tls: false,
            cert_path: None,
            version: None,
        }
    }
}

impl EngineConfig {
    /// Build a config from `key=value` option strings on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for unknown keys, entries without `=`, or values
    /// that do not parse.
    pub fn from_options<I, S>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::default().with_options(options)
    }

    /// Apply `key=value` option strings over this config.
    ///
    /// Recognized keys are `base_url` (alias `host`), `timeout`, `tls`
    /// (`true`/`false`, `yes`/`no`, `on`/`off`, `1`/`0`), `cert_path` and
    /// `version`.
    pub fn with_options<I, S>(mut self, options: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for option in options {
            let option = option.as_ref();
            let (name, value) = option.split_once('=').ok_or_else(|| {
                PierError::ConfigError(format!("expected key=value, got '{}'", option))
            })?;

            match name.trim() {
                "base_url" | "host" => self.base_url = Some(value.trim().to_string()),
                "timeout" => {
                    self.timeout = value.trim().parse().map_err(|_| {
                        PierError::ConfigError(format!("invalid timeout '{}'", value))
                    })?;
                }
                "tls" => self.tls = parse_bool(value.trim())?,
                "cert_path" => self.cert_path = Some(PathBuf::from(value.trim())),
                "version" => {
                    parse_api_version(value.trim())?;
                    self.version = Some(value.trim().to_string());
                }
                other => {
                    return Err(PierError::ConfigError(format!(
                        "unknown engine option '{}'",
                        other
                    )));
                }
            }
        }

        Ok(self)
    }

    /// The configured API version as `(major, minor)`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the version is not `major.minor`.
    pub fn api_version(&self) -> Result<Option<(usize, usize)>> {
        self.version.as_deref().map(parse_api_version).transpose()
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Ok(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Ok(false),
        _ => Err(PierError::ConfigError(format!(
            "invalid boolean '{}'",
            value
        ))),
    }
}

fn parse_api_version(value: &str) -> Result<(usize, usize)> {
    let invalid = || PierError::ConfigError(format!("invalid API version '{}'", value));
    let (major, minor) = value.split_once('.').ok_or_else(invalid)?;
    Ok((
        major.parse().map_err(|_| invalid())?,
        minor.parse().map_err(|_| invalid())?,
    ))
}

/// Default flags for image builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDefaults {
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
    #[serde(default = "default_true")]
    pub rm: bool,
    #[serde(default = "default_true")]
    pub forcerm: bool,
    #[serde(default)]
    pub nocache: bool,
    #[serde(default)]
    pub pull: bool,
}

fn default_dockerfile() -> String {
    crate::env::DEFAULT_DOCKERFILE.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for BuildDefaults {
    fn default() -> Self {
        Self {
            dockerfile: default_dockerfile(),
            rm: true,
            forcerm: true,
            nocache: false,
            pull: false,
        }
    }
}

impl BuildDefaults {
    /// Build options for `context` carrying these defaults.
    pub fn options_for(&self, context: BuildContext) -> BuildOptions {
        BuildOptions::new(context)
            .dockerfile(self.dockerfile.clone())
            .rm(self.rm)
            .forcerm(self.forcerm)
            .nocache(self.nocache)
            .pull(self.pull)
    }
}

/// Contents of a `pier.toml` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PierConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub build: BuildDefaults,
}

impl PierConfig {
    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            PierError::ConfigError(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Save to TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PierError::ConfigError(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }
}
