//! Driving a build stream to completion.

use super::event::{ParsedEvent, parse_build_event};
use super::{BuildFailure, BuildResult};
use crate::engine::{BuildEvent, BuildOptions, EngineResult};
use crate::image::ImageHandle;
use futures::stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

/// Runs image builds against the engine an image handle is bound to.
pub struct BuildRunner;

impl BuildRunner {
    /// Build `image` and collect the outcome.
    ///
    /// The image id is used as the build tag. The event stream is always
    /// drained, so engine-side work (context upload, intermediate container
    /// removal) has finished by the time this returns, whether or not the
    /// build failed.
    pub async fn run(image: ImageHandle, options: &BuildOptions) -> BuildResult {
        info!("Building image: {}", image.id());

        let (log, error) = {
            let events = image.engine().build(image.id(), options);
            Self::drain(events).await
        };

        match &error {
            None => info!("Successfully built image: {}", image.id()),
            Some(failure) => warn!("Build of image {} failed: {}", image.id(), failure),
        }

        BuildResult::new(image, log, error)
    }

    /// Consume a raw event stream into log lines and the first failure.
    ///
    /// Error events, malformed records and transport errors all count as
    /// failures; only the first one is kept, but every later log line is
    /// still collected.
    pub async fn drain<S>(events: S) -> (Vec<String>, Option<BuildFailure>)
    where
        S: Stream<Item = EngineResult<BuildEvent>>,
    {
        let mut events = std::pin::pin!(events);
        let mut log = Vec::new();
        let mut error: Option<BuildFailure> = None;

        while let Some(item) = events.next().await {
            let failure = match item {
                Ok(event) => match parse_build_event(&event) {
                    Ok(ParsedEvent::Log(line)) => {
                        debug!("Build: {}", line.trim_end());
                        log.push(line);
                        continue;
                    }
                    Ok(ParsedEvent::Fatal(message)) => BuildFailure::error_event(message),
                    Err(e) => BuildFailure::malformed(e.to_string()),
                },
                Err(e) => BuildFailure::engine(e.to_string()),
            };

            if error.is_none() {
                error = Some(failure);
            } else {
                debug!("Ignoring later build failure: {}", failure);
            }
        }

        (log, error)
    }
}
