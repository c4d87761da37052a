//! Host directory bind mounts.
//!
//! A [`VolumeBinding`] maps a host path to a mount point inside a container.
//! Containers own their bindings; the engine only ever sees them converted to
//! its bind-mount representation.

use crate::error::{PierError, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Mount side of a bind: where the host path appears and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindSpec {
    /// Absolute path inside the container
    pub mount_point: String,
    /// Whether the container sees the mount read-only
    pub read_only: bool,
}

/// A host path bound into a container at a fixed mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBinding {
    host_path: PathBuf,
    mount_point: String,
    read_only: bool,
}

impl VolumeBinding {
    /// Create a read-write binding.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `mount_point` is not an absolute path.
    pub fn new<P, S>(host_path: P, mount_point: S) -> Result<Self>
    where
        P: Into<PathBuf>,
        S: Into<String>,
    {
        let mount_point = mount_point.into();
        if !mount_point.starts_with('/') {
            return Err(PierError::InvalidArgument(format!(
                "mount point must be an absolute path, got '{}'",
                mount_point
            )));
        }

        Ok(Self {
            host_path: host_path.into(),
            mount_point,
            read_only: false,
        })
    }

    /// Set the access mode of this binding.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn host_path(&self) -> &Path {
        &self.host_path
    }

    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Convert into the engine's bind representation: host path to mount spec.
    pub fn to_bind_spec(&self) -> (String, BindSpec) {
        (
            self.host_path.to_string_lossy().into_owned(),
            BindSpec {
                mount_point: self.mount_point.clone(),
                read_only: self.read_only,
            },
        )
    }

    /// Render the `host:mount:mode` form the Docker API takes in `HostConfig.Binds`.
    pub fn to_bind_string(&self) -> String {
        let (host, spec) = self.to_bind_spec();
        spec.to_bind_string(&host)
    }
}

impl BindSpec {
    /// Render `host:mount:mode` for this spec mounted from `host`.
    pub fn to_bind_string(&self, host: &str) -> String {
        let mode = if self.read_only { "ro" } else { "rw" };
        format!("{}:{}:{}", host, self.mount_point, mode)
    }
}

impl FromStr for VolumeBinding {
    type Err = PierError;

    /// Parse `host:mount[:ro|:rw]`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        let (host, mount, read_only) = match parts.as_slice() {
            [host, mount] => (*host, *mount, false),
            [host, mount, "ro"] => (*host, *mount, true),
            [host, mount, "rw"] => (*host, *mount, false),
            _ => {
                return Err(PierError::InvalidArgument(format!(
                    "expected host:mount[:ro|:rw], got '{}'",
                    s
                )));
            }
        };

        if host.is_empty() {
            return Err(PierError::InvalidArgument(format!(
                "empty host path in '{}'",
                s
            )));
        }

        Ok(VolumeBinding::new(host, mount)?.read_only(read_only))
    }
}
