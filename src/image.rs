//! Image handles.
//!
//! An [`ImageHandle`] names an image on the engine and carries the shared
//! engine reference used to build it, remove it, and create containers
//! from it.

use crate::build::{BuildResult, BuildRunner};
use crate::container::ContainerHandle;
use crate::engine::{BuildOptions, ContainerOptions, EngineClient};
use crate::error::{PierError, Result};
use crate::volume::VolumeBinding;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An image on the engine, identified by tag or id.
#[derive(Clone)]
pub struct ImageHandle {
    id: String,
    engine: Arc<dyn EngineClient>,
}

impl ImageHandle {
    /// Handle for a not-yet-built image with a fresh random id.
    pub fn new(engine: Arc<dyn EngineClient>) -> Self {
        Self::with_id(engine, generate_image_id())
    }

    /// Handle for an existing image.
    pub fn with_id<S: Into<String>>(engine: Arc<dyn EngineClient>, id: S) -> Self {
        Self {
            id: id.into(),
            engine,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The engine this image lives on.
    pub fn engine(&self) -> &Arc<dyn EngineClient> {
        &self.engine
    }

    /// Build this image, tagging it with its id.
    ///
    /// A failed build still returns a [`BuildResult`]; check
    /// [`BuildResult::error`].
    pub async fn build(&self, options: &BuildOptions) -> BuildResult {
        BuildRunner::run(self.clone(), options).await
    }

    /// Remove the image from the engine.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the engine rejects the removal, e.g. because a
    /// container still uses the image.
    pub async fn remove(&self) -> Result<()> {
        debug!("Removing image: {}", self.id);
        self.engine.remove_image(&self.id).await?;
        info!("Removed image: {}", self.id);
        Ok(())
    }

    /// Run `body` with a container created from this image, then remove it.
    ///
    /// The container is created with `volumes` and `options` (the image is
    /// always this one). Removal runs after `body` completes, whether it
    /// returned `Ok` or `Err`; an error from `body` wins over a removal
    /// error. If the future is dropped or `body` panics, the container is
    /// left behind.
    ///
    /// # Errors
    ///
    /// Returns the creation error, `body`'s error, or the removal error.
    pub async fn temporary_container<F, Fut, T, E>(
        &self,
        volumes: Vec<VolumeBinding>,
        options: ContainerOptions,
        body: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(ContainerHandle) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<PierError>,
    {
        let options = ContainerOptions {
            image: Some(self.id.clone()),
            ..options
        };
        let container = ContainerHandle::create(self.engine.clone(), volumes, &options).await?;

        let outcome = body(container.clone()).await;
        let cleanup = container.remove().await;

        match (outcome, cleanup) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup_error)) => {
                warn!(
                    "Failed to remove temporary container {}: {}",
                    container.id(),
                    cleanup_error
                );
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageHandle").field("id", &self.id).finish()
    }
}

/// Random image tag: 32 lowercase hex digits.
pub fn generate_image_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EngineCall, Operation, RecordingEngine};

    #[test]
    fn test_generated_ids_are_unique_hex() {
        let a = generate_image_id();
        let b = generate_image_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn test_remove_issues_engine_call() {
        let engine = Arc::new(RecordingEngine::new());
        engine.add_image("app");
        let image = ImageHandle::with_id(engine.clone(), "app");

        image.remove().await.unwrap();
        assert_eq!(
            engine.calls(),
            vec![EngineCall::RemoveImage {
                image_id: "app".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_remove_rejected_by_engine() {
        let engine = Arc::new(RecordingEngine::new());
        engine.add_image("app");
        engine.fail(Operation::RemoveImage, 409);
        let image = ImageHandle::with_id(engine, "app");

        let err = image.remove().await.unwrap_err();
        assert!(err.is_api_error());
        assert_eq!(err.status_code(), Some(409));
    }

    #[tokio::test]
    async fn test_temporary_container_uses_this_image() {
        let engine = Arc::new(RecordingEngine::new());
        engine.add_image("app");
        let image = ImageHandle::with_id(engine.clone(), "app");

        let id = image
            .temporary_container(
                vec![],
                ContainerOptions::new().image("ignored"),
                |container| async move { Ok::<_, PierError>(container.id().to_string()) },
            )
            .await
            .unwrap();

        assert_eq!(engine.container_image(&id), Some("app".to_string()));
        assert!(engine.removed_containers().contains(&id));
    }
}
