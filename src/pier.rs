//! Process-level entry point.
//!
//! [`Pier`] owns the shared engine reference and hands out image handles,
//! including the scoped temporary images used for build-and-run workflows.

use crate::build::BuildResult;
use crate::config::{BuildDefaults, PierConfig};
use crate::engine::{BollardEngine, BuildContext, BuildOptions, EngineClient};
use crate::error::{PierError, Result};
use crate::image::ImageHandle;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// High-level access to a container engine.
#[derive(Clone)]
pub struct Pier {
    engine: Arc<dyn EngineClient>,
    build_defaults: BuildDefaults,
}

impl Pier {
    pub fn new(engine: Arc<dyn EngineClient>) -> Self {
        Self {
            engine,
            build_defaults: BuildDefaults::default(),
        }
    }

    /// Connect to the engine described by `config`.
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot be reached.
    pub async fn connect(config: &PierConfig) -> Result<Self> {
        let engine = BollardEngine::with_config(&config.engine).await?;
        Ok(Self::new(Arc::new(engine)).with_build_defaults(config.build.clone()))
    }

    pub fn with_build_defaults(mut self, defaults: BuildDefaults) -> Self {
        self.build_defaults = defaults;
        self
    }

    pub fn engine(&self) -> &Arc<dyn EngineClient> {
        &self.engine
    }

    /// Build options for `context` with the configured defaults.
    pub fn build_options(&self, context: BuildContext) -> BuildOptions {
        self.build_defaults.options_for(context)
    }

    /// Handle for an existing image.
    pub fn image<S: Into<String>>(&self, id: S) -> ImageHandle {
        ImageHandle::with_id(self.engine.clone(), id)
    }

    /// Run `body` with a freshly built image, then try to remove it.
    ///
    /// The image gets a random id and is built with `rm` forced on. `body`
    /// receives the image even when the build failed; the failure is logged
    /// but not raised, so callers needing the outcome should use
    /// [`Pier::temporary_build`].
    ///
    /// Removal runs after `body` returns, `Ok` or `Err`, and its failure is
    /// only logged: the engine may still be using the image (for example
    /// through a leftover container). A dropped future or a panic in `body`
    /// skips removal.
    pub async fn temporary_image<F, Fut, T, E>(
        &self,
        options: BuildOptions,
        body: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(ImageHandle) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<PierError>,
    {
        self.temporary_build(options, |build| async move {
            if let Some(failure) = build.error() {
                warn!(
                    "Handing out image {} although its build failed: {}",
                    build.image().id(),
                    failure
                );
            }
            body(build.image().clone()).await
        })
        .await
    }

    /// Like [`Pier::temporary_image`], but `body` receives the whole
    /// [`BuildResult`] so it can inspect the log and failure.
    pub async fn temporary_build<F, Fut, T, E>(
        &self,
        options: BuildOptions,
        body: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(BuildResult) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<PierError>,
    {
        let options = options.rm(true);
        let image = ImageHandle::new(self.engine.clone());

        let build = image.build(&options).await;
        let outcome = body(build).await;

        remove_quietly(&image).await;
        outcome
    }
}

/// Best-effort image removal; failures are logged and dropped.
async fn remove_quietly(image: &ImageHandle) {
    match image.remove().await {
        Ok(()) => debug!("Cleaned up temporary image {}", image.id()),
        Err(e) => warn!("Could not remove temporary image {}: {}", image.id(), e),
    }
}

impl std::fmt::Debug for Pier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pier")
            .field("build_defaults", &self.build_defaults)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EngineCall, Operation, RecordingEngine};
    use serde_json::json;

    fn pier(engine: &Arc<RecordingEngine>) -> Pier {
        Pier::new(engine.clone())
    }

    fn options() -> BuildOptions {
        BuildOptions::new(BuildContext::Archive(Vec::new())).rm(false)
    }

    #[tokio::test]
    async fn test_temporary_image_is_built_then_removed() {
        let engine = Arc::new(RecordingEngine::new());
        engine.script_build(vec![json!({"stream": "Successfully built 0123abcd\n"})]);

        let id = pier(&engine)
            .temporary_image(options(), |image| async move {
                Ok::<_, PierError>(image.id().to_string())
            })
            .await
            .unwrap();

        assert_eq!(id.len(), 32);
        let calls = engine.calls();
        assert!(matches!(&calls[0], EngineCall::Build { tag, rm: true } if *tag == id));
        assert_eq!(
            calls.last(),
            Some(&EngineCall::RemoveImage { image_id: id.clone() })
        );
        assert!(!engine.image_exists(&id));
    }

    #[tokio::test]
    async fn test_removal_failure_is_suppressed() {
        let engine = Arc::new(RecordingEngine::new());
        engine.script_build(vec![json!({"stream": "done\n"})]);
        engine.fail(Operation::RemoveImage, 409);

        let value = pier(&engine)
            .temporary_image(options(), |_| async { Ok::<_, PierError>(7) })
            .await
            .unwrap();

        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_body_error_survives_failed_cleanup() {
        let engine = Arc::new(RecordingEngine::new());
        engine.script_build(vec![json!({"stream": "done\n"})]);
        engine.fail(Operation::RemoveImage, 500);

        let err = pier(&engine)
            .temporary_image(options(), |_| async {
                Err::<(), _>(PierError::InvalidArgument("from body".to_string()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PierError::InvalidArgument(m) if m == "from body"));
        assert!(
            engine
                .calls()
                .iter()
                .any(|c| matches!(c, EngineCall::RemoveImage { .. }))
        );
    }

    #[tokio::test]
    async fn test_failed_build_is_still_handed_out() {
        let engine = Arc::new(RecordingEngine::new());
        engine.script_build(vec![
            json!({"stream": "Step 1/1 : RUN false\n"}),
            json!({"errorDetail": {"message": "returned a non-zero code: 1"}}),
        ]);

        let handed_out = pier(&engine)
            .temporary_image(options(), |image| async move {
                Ok::<_, PierError>(image.id().to_string())
            })
            .await
            .unwrap();

        // The failed build never created the image, so cleanup hits a 404
        // which is swallowed.
        assert!(!engine.image_exists(&handed_out));
    }

    #[tokio::test]
    async fn test_temporary_build_exposes_log_and_error() {
        let engine = Arc::new(RecordingEngine::new());
        engine.script_build(vec![
            json!({"stream": "Step 1/1 : RUN false\n"}),
            json!({"errorDetail": {"message": "returned a non-zero code: 1"}}),
            json!({"stream": "Removing intermediate container 0123\n"}),
        ]);

        let (log, error) = pier(&engine)
            .temporary_build(options(), |build| async move {
                Ok::<_, PierError>((
                    build.log().to_vec(),
                    build.error_message().map(str::to_string),
                ))
            })
            .await
            .unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(error.as_deref(), Some("returned a non-zero code: 1"));
    }
}
