//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 1. Current directory: ./pier.toml or ./.pier/config.toml
//! 2. User config: ~/.pier/config.toml
//! 3. System config: /etc/pier/config.toml
//! 4. Built-in defaults

use super::args::ConnectionConfig;
use crate::config::PierConfig;
use crate::env;
use crate::error::Result;
use std::env as std_env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Discover and load configuration using the hierarchy
    pub fn discover_config() -> Result<PierConfig> {
        match Self::find_config_file() {
            Some(config_path) => {
                info!("Loading configuration from: {:?}", config_path);
                PierConfig::from_toml_file(config_path)
            }
            None => {
                info!("No configuration file found, using defaults");
                Ok(PierConfig::default())
            }
        }
    }

    /// Load the explicit config file if one is given, otherwise discover one,
    /// then apply the command line engine options on top.
    pub fn load(connection: &ConnectionConfig) -> Result<PierConfig> {
        let mut config = match &connection.config_override {
            Some(path) => {
                info!("Loading configuration override from: {:?}", path);
                PierConfig::from_toml_file(path)?
            }
            None => Self::discover_config()?,
        };

        config.engine = config.engine.with_options(&connection.engine_opts)?;
        Ok(config)
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        let current_dir = std_env::current_dir().ok();
        let home_dir = Self::get_home_dir();
        Self::first_existing(Self::candidates(
            current_dir.as_deref(),
            home_dir.as_deref(),
        ))
    }

    fn first_existing(candidates: Vec<PathBuf>) -> Option<PathBuf> {
        for candidate in candidates {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate);
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    /// Configuration file candidates in priority order
    fn candidates(current_dir: Option<&Path>, home_dir: Option<&Path>) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Some(current_dir) = current_dir {
            candidates.push(current_dir.join(env::LOCAL_CONFIG_FILE_NAME));
            candidates.push(env::config_file_path(current_dir));
        }

        if let Some(home_dir) = home_dir {
            candidates.push(env::config_file_path(home_dir));
        }

        #[cfg(unix)]
        candidates.push(PathBuf::from(env::SYSTEM_CONFIG_FILE));

        #[cfg(windows)]
        if let Ok(program_data) = std_env::var("PROGRAMDATA") {
            candidates.push(
                PathBuf::from(program_data)
                    .join("pier")
                    .join(env::CONFIG_FILE_NAME),
            );
        }

        candidates
    }

    fn get_home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }

    /// Show configuration discovery information for debugging
    pub fn show_discovery_info() {
        println!("Configuration Discovery Hierarchy:");
        println!();

        let current_dir = std_env::current_dir().ok();
        let home_dir = Self::get_home_dir();
        let candidates = Self::candidates(current_dir.as_deref(), home_dir.as_deref());
        for (i, candidate) in candidates.iter().enumerate() {
            let status = if candidate.exists() {
                if candidate.is_file() {
                    "✓ EXISTS"
                } else {
                    "✗ NOT A FILE"
                }
            } else {
                "✗ NOT FOUND"
            };

            println!("  {}. {:?} - {}", i + 1, candidate, status);
        }

        println!();
        match Self::first_existing(candidates) {
            Some(found) => println!("Active configuration: {:?}", found),
            None => println!("Active configuration: Built-in defaults"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_candidate_order() {
        let candidates =
            ConfigDiscovery::candidates(Some(Path::new("/work")), Some(Path::new("/home/dev")));

        assert_eq!(candidates[0], PathBuf::from("/work/pier.toml"));
        assert_eq!(candidates[1], PathBuf::from("/work/.pier/config.toml"));
        assert_eq!(candidates[2], PathBuf::from("/home/dev/.pier/config.toml"));
        #[cfg(unix)]
        assert_eq!(candidates[3], PathBuf::from("/etc/pier/config.toml"));
    }

    #[test]
    fn test_local_file_wins_over_user_file() {
        let project = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();

        fs::create_dir_all(home.path().join(".pier")).unwrap();
        fs::write(home.path().join(".pier/config.toml"), "").unwrap();
        fs::write(project.path().join("pier.toml"), "").unwrap();

        let found = ConfigDiscovery::first_existing(ConfigDiscovery::candidates(
            Some(project.path()),
            Some(home.path()),
        ));
        assert_eq!(found, Some(project.path().join("pier.toml")));
    }

    #[test]
    fn test_directory_is_not_a_config_file() {
        let project = TempDir::new().unwrap();
        fs::create_dir_all(project.path().join("pier.toml")).unwrap();

        let found = ConfigDiscovery::first_existing(vec![project.path().join("pier.toml")]);
        assert_eq!(found, None);
    }

    #[test]
    fn test_load_applies_engine_options_over_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("ci.toml");
        fs::write(
            &config_path,
            "[engine]\nbase_url = \"unix:///var/run/docker.sock\"\ntimeout = 60\n\n[build]\nnocache = true\n",
        )
        .unwrap();

        let config = ConfigDiscovery::load(&ConnectionConfig {
            config_override: Some(config_path),
            engine_opts: vec!["timeout=5".to_string()],
        })
        .unwrap();

        assert_eq!(
            config.engine.base_url.as_deref(),
            Some("unix:///var/run/docker.sock")
        );
        assert_eq!(config.engine.timeout, 5);
        assert!(config.build.nocache);
    }

    #[test]
    fn test_load_missing_override_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = ConfigDiscovery::load(&ConnectionConfig {
            config_override: Some(temp_dir.path().join("missing.toml")),
            engine_opts: vec![],
        });
        assert!(result.is_err());
    }
}
