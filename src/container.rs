//! Container handles.
//!
//! A [`ContainerHandle`] is bound to an engine-assigned container id and to
//! the volume bindings it was created with. Its lifecycle is
//! created → started → stopped and removed; removal is terminal.

use crate::engine::{
    Binds, ContainerOptions, ContainerState, EngineClient, ExitStatus, LogChunk, LogOptions,
    LogStream, StartOptions, WaitOptions,
};
use crate::error::{PierError, Result};
use crate::volume::VolumeBinding;
use futures::stream::TryStreamExt;
use std::sync::Arc;
use tracing::{debug, info};

/// A container on the engine.
#[derive(Clone)]
pub struct ContainerHandle {
    id: String,
    engine: Arc<dyn EngineClient>,
    volumes: Arc<[VolumeBinding]>,
}

impl ContainerHandle {
    /// Create a container and bind a handle to its id.
    ///
    /// Bind mounts are derived from `volumes` only; `options` must not carry
    /// raw binds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `options.binds` is set (no engine call is
    /// made), or `ApiError` if the engine rejects the creation.
    pub async fn create(
        engine: Arc<dyn EngineClient>,
        volumes: Vec<VolumeBinding>,
        options: &ContainerOptions,
    ) -> Result<Self> {
        if options.binds.is_some() {
            return Err(PierError::InvalidArgument(
                "Volumes should be specified as VolumeBinding values, not raw binds".to_string(),
            ));
        }

        let binds = binds_for(&volumes);
        debug!(
            "Creating container from {:?} with {} volume(s)",
            options.image,
            volumes.len()
        );

        let id = engine.create_container(options, &binds).await?;
        info!("Created container: {}", id);

        Ok(Self {
            id,
            engine,
            volumes: volumes.into(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Volume bindings fixed at creation.
    pub fn volumes(&self) -> &[VolumeBinding] {
        &self.volumes
    }

    /// Bind mounts in engine form, in volume order.
    pub fn binds(&self) -> Binds {
        binds_for(&self.volumes)
    }

    /// Start the container with its volume bindings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `options.binds` is set (no engine call is
    /// made), or `ApiError` if the engine rejects the start.
    pub async fn start(&self, options: &StartOptions) -> Result<()> {
        if options.binds.is_some() {
            return Err(PierError::InvalidArgument(
                "Volumes should be specified as VolumeBinding values, not raw binds".to_string(),
            ));
        }

        debug!("Starting container: {}", self.id);
        self.engine.start(&self.id, &self.binds(), options).await?;
        info!("Started container: {}", self.id);
        Ok(())
    }

    /// Current state as reported by the engine.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if inspection fails.
    pub async fn inspect(&self) -> Result<ContainerState> {
        Ok(self.engine.inspect_container(&self.id).await?)
    }

    /// Stream container output.
    ///
    /// With `follow` the stream stays open while the container runs and
    /// cannot be replayed; without it, it ends after the output so far.
    pub fn logs(&self, follow: bool, options: &LogOptions) -> LogStream<'_> {
        self.engine.logs(&self.id, follow, options)
    }

    /// Read the output produced so far. Each call re-reads from the engine.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the engine fails to return logs.
    pub async fn log_snapshot(&self, options: &LogOptions) -> Result<Vec<LogChunk>> {
        Ok(self.logs(false, options).try_collect().await?)
    }

    /// Wait for the container to stop and return its exit status.
    ///
    /// There is no timeout; wrap the call in `tokio::time::timeout` when a
    /// bound is needed.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the wait call fails.
    pub async fn wait(&self, options: &WaitOptions) -> Result<ExitStatus> {
        debug!("Waiting for container: {}", self.id);
        let status = self.engine.wait(&self.id, options).await?;
        info!("Container {} exited with code {}", self.id, status.code);
        Ok(status)
    }

    /// Stop, then remove the container.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the stop fails (nothing was removed), or
    /// `ContainerStoppedNotRemoved` if the container stopped but the engine
    /// refused to remove it.
    pub async fn remove(&self) -> Result<()> {
        debug!("Stopping container: {}", self.id);
        self.engine.stop(&self.id).await?;

        debug!("Removing container: {}", self.id);
        self.engine
            .remove_container(&self.id)
            .await
            .map_err(|source| PierError::ContainerStoppedNotRemoved {
                container_id: self.id.clone(),
                source,
            })?;

        info!("Removed container: {}", self.id);
        Ok(())
    }
}

impl std::fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("id", &self.id)
            .field("volumes", &self.volumes)
            .finish()
    }
}

fn binds_for(volumes: &[VolumeBinding]) -> Binds {
    volumes.iter().map(VolumeBinding::to_bind_spec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EngineCall, Operation, RecordingEngine};
    use crate::volume::BindSpec;

    fn volumes() -> Vec<VolumeBinding> {
        vec![
            VolumeBinding::new("/src", "/workspace").unwrap().read_only(true),
            VolumeBinding::new("/tmp/cache", "/cache").unwrap(),
        ]
    }

    async fn created(engine: &Arc<RecordingEngine>) -> ContainerHandle {
        engine.add_image("app");
        ContainerHandle::create(
            engine.clone(),
            volumes(),
            &ContainerOptions::new().image("app"),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_applies_volume_binds() {
        let engine = Arc::new(RecordingEngine::new());
        let container = created(&engine).await;

        container.start(&StartOptions::default()).await.unwrap();

        let expected = vec![
            (
                "/src".to_string(),
                BindSpec {
                    mount_point: "/workspace".to_string(),
                    read_only: true,
                },
            ),
            (
                "/tmp/cache".to_string(),
                BindSpec {
                    mount_point: "/cache".to_string(),
                    read_only: false,
                },
            ),
        ];
        assert_eq!(engine.start_binds(container.id()), Some(expected));
        assert_eq!(container.inspect().await.unwrap(), ContainerState::Running);
    }

    #[tokio::test]
    async fn test_start_with_raw_binds_is_rejected() {
        let engine = Arc::new(RecordingEngine::new());
        let container = created(&engine).await;
        let calls_before = engine.calls().len();

        let options = StartOptions {
            binds: Some(vec!["/etc:/etc".to_string()]),
            ..Default::default()
        };
        let err = container.start(&options).await.unwrap_err();

        assert!(matches!(err, PierError::InvalidArgument(_)));
        assert_eq!(engine.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn test_create_with_raw_binds_is_rejected() {
        let engine = Arc::new(RecordingEngine::new());
        let options = ContainerOptions {
            binds: Some(vec!["/etc:/etc".to_string()]),
            ..ContainerOptions::new().image("app")
        };

        let err = ContainerHandle::create(engine.clone(), vec![], &options)
            .await
            .unwrap_err();

        assert!(matches!(err, PierError::InvalidArgument(_)));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_remove_stops_then_removes() {
        let engine = Arc::new(RecordingEngine::new());
        let container = created(&engine).await;
        container.start(&StartOptions::default()).await.unwrap();

        container.remove().await.unwrap();

        let tail: Vec<EngineCall> = engine.calls().into_iter().rev().take(2).rev().collect();
        assert_eq!(
            tail,
            vec![
                EngineCall::Stop {
                    container_id: container.id().to_string()
                },
                EngineCall::RemoveContainer {
                    container_id: container.id().to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_remove_twice_is_an_engine_error() {
        let engine = Arc::new(RecordingEngine::new());
        let container = created(&engine).await;

        container.remove().await.unwrap();
        let err = container.remove().await.unwrap_err();

        assert!(err.is_api_error());
        assert_eq!(err.status_code(), Some(404));
    }

    #[tokio::test]
    async fn test_stopped_but_not_removed_is_reported() {
        let engine = Arc::new(RecordingEngine::new());
        let container = created(&engine).await;
        engine.fail(Operation::RemoveContainer, 409);

        let err = container.remove().await.unwrap_err();

        assert!(matches!(
            &err,
            PierError::ContainerStoppedNotRemoved { container_id, .. } if container_id == container.id()
        ));
        assert!(engine.container_exists(container.id()));
        assert_eq!(container.inspect().await.unwrap(), ContainerState::Stopped);
    }

    #[tokio::test]
    async fn test_wait_and_logs() {
        let engine = Arc::new(RecordingEngine::new());
        engine.set_exit_code(3);
        engine.set_logs(vec![
            LogChunk::StdOut("hello\n".to_string()),
            LogChunk::StdErr("warning\n".to_string()),
        ]);
        let container = created(&engine).await;
        container.start(&StartOptions::default()).await.unwrap();

        let status = container.wait(&WaitOptions::default()).await.unwrap();
        assert_eq!(status.code, 3);
        assert!(!status.success());

        let first = container.log_snapshot(&LogOptions::default()).await.unwrap();
        let second = container.log_snapshot(&LogOptions::default()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].message(), "hello\n");
    }
}
