//! Constants and path utilities.
//!
//! Centralizes the file names, directories and defaults used by the config
//! discovery and the engine connection.

use std::path::{Path, PathBuf};

/// Project-local config file name
pub const LOCAL_CONFIG_FILE_NAME: &str = "pier.toml";

/// Hidden directory for per-project and per-user settings
pub const PIER_DIR_NAME: &str = ".pier";

/// Configuration file name inside [`PIER_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// System-wide config file (Unix-like systems)
pub const SYSTEM_CONFIG_FILE: &str = "/etc/pier/config.toml";

/// Dockerfile looked up in a build context when none is named
pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";

/// Engine request timeout in seconds
pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 120;

/// Engine address used for TLS connections when neither a URL nor
/// `DOCKER_HOST` is given
pub const DEFAULT_TLS_HOST: &str = "tcp://localhost:2376";

/// Client certificate locations for TLS connections
pub mod tls {
    /// Environment variable naming the certificate directory
    pub const CERT_PATH_VAR: &str = "DOCKER_CERT_PATH";

    /// Certificate directory under the home directory
    pub const DOCKER_DIR_NAME: &str = ".docker";

    pub const KEY_FILE: &str = "key.pem";
    pub const CERT_FILE: &str = "cert.pem";
    pub const CA_FILE: &str = "ca.pem";
}

/// Podman sockets tried when the local Docker defaults fail
pub mod podman {
    /// Rootless socket, relative to the user's home directory
    pub const ROOTLESS_SOCKET: &str = "run/podman/podman.sock";

    /// System-wide socket
    pub const SYSTEM_SOCKET: &str = "unix:///run/podman/podman.sock";
}

/// Build the `.pier` directory path from a base directory
pub fn pier_dir_path(base: &Path) -> PathBuf {
    base.join(PIER_DIR_NAME)
}

/// Build the `.pier/config.toml` path from a base directory
pub fn config_file_path(base: &Path) -> PathBuf {
    pier_dir_path(base).join(CONFIG_FILE_NAME)
}

/// Build the rootless Podman socket URL for a home directory
pub fn rootless_podman_socket(home: &Path) -> String {
    format!("unix://{}", home.join(podman::ROOTLESS_SOCKET).display())
}
