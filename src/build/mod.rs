//! Image builds.
//!
//! A build is driven by [`BuildRunner`], which consumes the engine's event
//! stream through the decoder in [`event`] and turns it into a
//! [`BuildResult`]. A failed build is not an `Err`: callers check
//! [`BuildResult::error`] (or opt into an error with
//! [`BuildResult::into_image`]).

pub mod event;
mod runner;

pub use event::{ParsedEvent, parse_build_event, parse_build_event_json};
pub use runner::BuildRunner;

use crate::error::{PierError, Result};
use crate::image::ImageHandle;

/// Where a build failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildFailureKind {
    /// The engine reported an `errorDetail` event
    ErrorEvent,
    /// A record matched no known event schema
    MalformedEvent,
    /// The event stream itself failed
    Engine,
}

/// The failure recorded for a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
    kind: BuildFailureKind,
    message: String,
}

impl BuildFailure {
    pub fn error_event<S: Into<String>>(message: S) -> Self {
        Self {
            kind: BuildFailureKind::ErrorEvent,
            message: message.into(),
        }
    }

    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self {
            kind: BuildFailureKind::MalformedEvent,
            message: message.into(),
        }
    }

    pub fn engine<S: Into<String>>(message: S) -> Self {
        Self {
            kind: BuildFailureKind::Engine,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> BuildFailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of an image build.
#[derive(Debug, Clone)]
pub struct BuildResult {
    image: ImageHandle,
    log: Vec<String>,
    error: Option<BuildFailure>,
}

impl BuildResult {
    pub fn new(image: ImageHandle, log: Vec<String>, error: Option<BuildFailure>) -> Self {
        Self { image, log, error }
    }

    /// The image the build targeted, whether or not it succeeded.
    pub fn image(&self) -> &ImageHandle {
        &self.image
    }

    /// Build output lines in stream order.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// The first failure of the build, if any.
    pub fn error(&self) -> Option<&BuildFailure> {
        self.error.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(BuildFailure::message)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Take the built image, turning a failed build into an error.
    ///
    /// # Errors
    ///
    /// Returns `BuildFailed` with the recorded failure message.
    pub fn into_image(self) -> Result<ImageHandle> {
        match self.error {
            None => Ok(self.image),
            Some(failure) => Err(PierError::BuildFailed(failure.message)),
        }
    }
}
