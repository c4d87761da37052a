//! # Pier
//!
//! A high-level API over a container engine (Docker or Podman). Instead of
//! raw API calls, callers work with structured handles for images,
//! containers and volume bindings.
//!
//! ## Architecture Overview
//!
//! - **[`engine`]**: the [`EngineClient`] trait pier consumes, and the bollard
//!   based [`BollardEngine`] implementing it
//! - **[`build`]**: build event decoding and the [`BuildRunner`] that turns an
//!   event stream into a [`BuildResult`]
//! - **[`image`]**: [`ImageHandle`] (build, remove, temporary containers)
//! - **[`container`]**: [`ContainerHandle`] (create, start, logs, wait, remove)
//! - **[`volume`]**: [`VolumeBinding`] bind mounts
//! - **[`pier`]**: the [`Pier`] entry point with temporary images
//! - **[`config`]**: engine connection options and build defaults
//! - **[`cli`]**: argument parsing, config discovery and the `pier` subcommands
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pier::{BuildContext, ContainerOptions, PierConfig, Pier, StartOptions, VolumeBinding, WaitOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pier = Pier::connect(&PierConfig::default()).await?;
//!     let options = pier.build_options(BuildContext::directory("."));
//!     let volumes = vec![VolumeBinding::new("/srv/data", "/data")?.read_only(true)];
//!
//!     let code = pier
//!         .temporary_image(options, |image| async move {
//!             image
//!                 .temporary_container(volumes, ContainerOptions::new(), |container| async move {
//!                     container.start(&StartOptions::default()).await?;
//!                     let status = container.wait(&WaitOptions::default()).await?;
//!                     Ok::<_, anyhow::Error>(status.code)
//!                 })
//!                 .await
//!         })
//!         .await?;
//!
//!     println!("exit code {}", code);
//!     Ok(())
//! }
//! ```

pub mod build;
pub mod config;
pub mod container;
pub mod engine;
pub mod env;
pub mod error;
pub mod image;
pub mod pier;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod volume;

pub mod cli;

pub use build::{BuildFailure, BuildFailureKind, BuildResult, BuildRunner};
pub use config::{BuildDefaults, EngineConfig, PierConfig};
pub use container::ContainerHandle;
pub use engine::{
    BollardEngine, BuildContext, BuildOptions, ContainerOptions, ContainerState, EngineClient,
    ExitStatus, LogChunk, LogOptions, StartOptions, WaitCondition, WaitOptions,
};
pub use error::{PierError, Result};
pub use image::ImageHandle;
pub use pier::Pier;
pub use volume::{BindSpec, VolumeBinding};
