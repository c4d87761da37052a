//! The container engine seen from pier.
//!
//! Everything pier does to an engine goes through the [`EngineClient`] trait:
//! builds, container creation, start/stop/remove, logs and wait. The
//! production implementation is [`BollardEngine`], which talks to Docker or
//! Podman over the bollard API; tests use the in-memory `RecordingEngine`
//! from the `testing` feature.
//!
//! Engine failures are returned as raw `bollard::errors::Error` values so
//! that every implementation reports rejections the same way. The handles in
//! [`crate::image`] and [`crate::container`] lift them into
//! [`PierError`](crate::PierError).

mod client;
mod context;

pub use client::BollardEngine;
pub use context::BuildContext;

use crate::volume::BindSpec;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;

/// One undecoded record of a build event stream.
pub type BuildEvent = serde_json::Value;

/// Result of a single engine call.
pub type EngineResult<T> = std::result::Result<T, bollard::errors::Error>;

/// Lazy stream of raw build events.
pub type BuildEventStream<'a> = BoxStream<'a, EngineResult<BuildEvent>>;

/// Stream of container output chunks.
pub type LogStream<'a> = BoxStream<'a, EngineResult<LogChunk>>;

/// Bind mounts in engine form, in declaration order: host path to mount spec.
pub type Binds = Vec<(String, BindSpec)>;

/// Operations pier consumes from a container engine.
///
/// Implementations must be safe to share between handles; none of the
/// methods mutate handle state.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Build an image tagged `tag`, returning its event stream.
    ///
    /// The stream is lazy: nothing is guaranteed to happen on the engine
    /// until it is polled, and engine-side cleanup finishes only once it has
    /// been drained.
    fn build<'a>(&'a self, tag: &str, options: &BuildOptions) -> BuildEventStream<'a>;

    /// Create a container and return its engine-assigned id.
    async fn create_container(
        &self,
        options: &ContainerOptions,
        binds: &[(String, BindSpec)],
    ) -> EngineResult<String>;

    /// Start a created container with the given bind mounts.
    async fn start(
        &self,
        container_id: &str,
        binds: &[(String, BindSpec)],
        options: &StartOptions,
    ) -> EngineResult<()>;

    /// Report the current state of a container.
    async fn inspect_container(&self, container_id: &str) -> EngineResult<ContainerState>;

    async fn stop(&self, container_id: &str) -> EngineResult<()>;

    async fn remove_container(&self, container_id: &str) -> EngineResult<()>;

    async fn remove_image(&self, image_id: &str) -> EngineResult<()>;

    /// Read container output.
    ///
    /// With `follow` the stream stays open until the container exits;
    /// without it the stream ends after the output produced so far.
    fn logs<'a>(
        &'a self,
        container_id: &str,
        follow: bool,
        options: &LogOptions,
    ) -> LogStream<'a>;

    /// Wait until the container reaches the requested condition.
    async fn wait(&self, container_id: &str, options: &WaitOptions) -> EngineResult<ExitStatus>;
}

/// Options for an image build, passed through to the engine.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Build context sent to the engine
    pub context: BuildContext,
    /// Dockerfile path relative to the context root
    pub dockerfile: String,
    /// Remove intermediate containers after a successful build
    pub rm: bool,
    /// Always remove intermediate containers, even after a failed build
    pub forcerm: bool,
    /// Do not use the build cache
    pub nocache: bool,
    /// Always attempt to pull newer base images
    pub pull: bool,
    /// Build-time variables
    pub build_args: HashMap<String, String>,
}

impl BuildOptions {
    pub fn new(context: BuildContext) -> Self {
        Self {
            context,
            dockerfile: crate::env::DEFAULT_DOCKERFILE.to_string(),
            rm: true,
            forcerm: true,
            nocache: false,
            pull: false,
            build_args: HashMap::new(),
        }
    }

    pub fn dockerfile<S: Into<String>>(mut self, dockerfile: S) -> Self {
        self.dockerfile = dockerfile.into();
        self
    }

    pub fn rm(mut self, rm: bool) -> Self {
        self.rm = rm;
        self
    }

    pub fn forcerm(mut self, forcerm: bool) -> Self {
        self.forcerm = forcerm;
        self
    }

    pub fn nocache(mut self, nocache: bool) -> Self {
        self.nocache = nocache;
        self
    }

    pub fn pull(mut self, pull: bool) -> Self {
        self.pull = pull;
        self
    }

    pub fn build_arg<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.build_args.insert(key.into(), value.into());
        self
    }
}

/// Options for creating a container.
///
/// Bind mounts are not configured here: they come from the
/// [`VolumeBinding`](crate::VolumeBinding)s the container is created with.
#[derive(Debug, Clone, Default)]
pub struct ContainerOptions {
    /// Container name (engine-generated if None)
    pub name: Option<String>,
    /// Image to create the container from
    pub image: Option<String>,
    pub cmd: Option<Vec<String>>,
    pub entrypoint: Option<Vec<String>>,
    pub working_dir: Option<String>,
    /// Environment as `KEY=value` entries
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    pub user: Option<String>,
    /// Raw bind strings; always rejected by
    /// [`ContainerHandle::create`](crate::ContainerHandle::create)
    pub binds: Option<Vec<String>>,
}

impl ContainerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn image<S: Into<String>>(mut self, image: S) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = Some(cmd.into_iter().map(|s| s.into()).collect());
        self
    }

    pub fn entrypoint<I, S>(mut self, entrypoint: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entrypoint = Some(entrypoint.into_iter().map(|s| s.into()).collect());
        self
    }

    pub fn working_dir<S: Into<String>>(mut self, dir: S) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.push(format!("{}={}", key.into(), value.into()));
        self
    }

    pub fn label<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn user<S: Into<String>>(mut self, user: S) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Options for starting a container.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Key sequence for detaching from the container
    pub detach_keys: Option<String>,
    /// Raw bind strings; always rejected by
    /// [`ContainerHandle::start`](crate::ContainerHandle::start)
    pub binds: Option<Vec<String>>,
}

/// Options for reading container logs.
#[derive(Debug, Clone)]
pub struct LogOptions {
    pub stdout: bool,
    pub stderr: bool,
    pub timestamps: bool,
    /// Number of lines from the end, or "all"
    pub tail: String,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            stdout: true,
            stderr: true,
            timestamps: false,
            tail: "all".to_string(),
        }
    }
}

/// Condition a wait call blocks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitCondition {
    #[default]
    NotRunning,
    NextExit,
    Removed,
}

impl WaitCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitCondition::NotRunning => "not-running",
            WaitCondition::NextExit => "next-exit",
            WaitCondition::Removed => "removed",
        }
    }
}

/// Options for waiting on a container.
#[derive(Debug, Clone, Default)]
pub struct WaitOptions {
    pub condition: WaitCondition,
}

/// Exit status reported by the engine once a container stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: i64,
    /// Error the engine attached to the exit, if any
    pub error: Option<String>,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.code == 0 && self.error.is_none()
    }
}

/// One chunk of container output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogChunk {
    StdOut(String),
    StdErr(String),
    StdIn(String),
    /// Output of a container attached to a TTY
    Console(String),
}

impl LogChunk {
    pub fn message(&self) -> &str {
        match self {
            LogChunk::StdOut(m)
            | LogChunk::StdErr(m)
            | LogChunk::StdIn(m)
            | LogChunk::Console(m) => m,
        }
    }
}

impl std::fmt::Display for LogChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Container state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// Container is running
    Running,
    /// Container is paused
    Paused,
    /// Container is restarting
    Restarting,
    /// Container is stopped
    Stopped,
    /// Container is dead
    Dead,
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerState::Running => write!(f, "running"),
            ContainerState::Paused => write!(f, "paused"),
            ContainerState::Restarting => write!(f, "restarting"),
            ContainerState::Stopped => write!(f, "stopped"),
            ContainerState::Dead => write!(f, "dead"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_options_defaults() {
        let options = BuildOptions::new(BuildContext::Archive(Vec::new()));
        assert_eq!(options.dockerfile, "Dockerfile");
        assert!(options.rm);
        assert!(options.forcerm);
        assert!(options.build_args.is_empty());
    }

    #[test]
    fn test_container_options_builder() {
        let options = ContainerOptions::new()
            .image("alpine:latest")
            .cmd(["echo", "hi"])
            .env("RUST_LOG", "debug")
            .label("owner", "pier");

        assert_eq!(options.image.as_deref(), Some("alpine:latest"));
        assert_eq!(options.cmd, Some(vec!["echo".to_string(), "hi".to_string()]));
        assert_eq!(options.env, vec!["RUST_LOG=debug".to_string()]);
        assert!(options.binds.is_none());
    }

    #[test]
    fn test_exit_status_success() {
        assert!(ExitStatus { code: 0, error: None }.success());
        assert!(!ExitStatus { code: 2, error: None }.success());
        assert!(
            !ExitStatus {
                code: 0,
                error: Some("oom".to_string())
            }
            .success()
        );
    }

    #[test]
    fn test_wait_condition_wire_names() {
        assert_eq!(WaitCondition::default().as_str(), "not-running");
        assert_eq!(WaitCondition::Removed.as_str(), "removed");
    }
}
