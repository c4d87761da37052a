//! Subcommand execution
//!
//! Each subcommand returns the process exit code it wants; engine and
//! configuration failures are returned as errors.

use super::args::{BuildConfig, RunConfig};
use super::config::ConfigDiscovery;
use crate::build::{BuildFailure, BuildFailureKind, BuildResult};
use crate::engine::{
    BuildContext, BuildOptions, ContainerOptions, LogChunk, LogOptions, StartOptions, WaitOptions,
};
use crate::error::{PierError, Result};
use crate::image::ImageHandle;
use crate::pier::Pier;
use futures::StreamExt;
use std::io::{self, Write};
use std::path::Path;
use tracing::{info, warn};

/// Build an image and print its log. A generated image is removed unless
/// `keep` is set; an image built under `--tag` is always kept.
pub async fn run_build(config: BuildConfig) -> Result<i32> {
    let pier_config = ConfigDiscovery::load(&config.connection)?;
    let pier = Pier::connect(&pier_config).await?;
    build_image(&pier, &config).await
}

async fn build_image(pier: &Pier, config: &BuildConfig) -> Result<i32> {
    let mut options = build_options(pier, &config.context, config.dockerfile.as_deref());
    if config.no_cache {
        options = options.nocache(true);
    }
    for (key, value) in &config.build_args {
        options = options.build_arg(key, value);
    }

    let image = match &config.tag {
        Some(tag) => pier.image(tag.clone()),
        None => ImageHandle::new(pier.engine().clone()),
    };

    info!("Building {} from {:?}", image.id(), config.context);
    let build = image.build(&options).await;
    print_build_log(&build);

    if stops_command(&build) {
        return Ok(1);
    }

    if config.keep || config.tag.is_some() {
        println!("{}", image.id());
    } else if let Err(e) = image.remove().await {
        warn!("Could not remove image {}: {}", image.id(), e);
    }

    Ok(0)
}

/// Build a temporary image, run one container from it, and return the
/// container's exit code. Both resources are removed afterwards.
pub async fn run_run(config: RunConfig) -> Result<i32> {
    let pier_config = ConfigDiscovery::load(&config.connection)?;
    let pier = Pier::connect(&pier_config).await?;
    run_container(&pier, config).await
}

async fn run_container(pier: &Pier, config: RunConfig) -> Result<i32> {
    let options = build_options(pier, &config.context, config.dockerfile.as_deref());

    let verbose = config.verbose;
    let volumes = config.volumes;
    let mut container_options = ContainerOptions::new();
    if !config.cmd.is_empty() {
        container_options = container_options.cmd(config.cmd);
    }
    for (key, value) in config.env {
        container_options = container_options.env(key, value);
    }

    pier.temporary_build(options, |build| async move {
        if verbose || !build.is_success() {
            print_build_log(&build);
        }
        if stops_command(&build) {
            return Ok::<_, PierError>(1);
        }

        build
            .image()
            .temporary_container(volumes, container_options, |container| async move {
                container.start(&StartOptions::default()).await?;

                let mut logs = container.logs(true, &LogOptions::default());
                while let Some(chunk) = logs.next().await {
                    match chunk? {
                        LogChunk::StdErr(message) => eprint!("{}", message),
                        other => print!("{}", other),
                    }
                }
                drop(logs);
                let _ = io::stdout().flush();

                let status = container.wait(&WaitOptions::default()).await?;
                if let Some(error) = &status.error {
                    warn!("Container {} reported: {}", container.id(), error);
                }
                Ok::<_, PierError>(i32::try_from(status.code).unwrap_or(1))
            })
            .await
    })
    .await
}

/// Report a failed build. Records the parser does not recognise (`aux`,
/// pull `status`) are warned about and the command goes on.
fn stops_command(build: &BuildResult) -> bool {
    match build.error() {
        Some(failure) if is_fatal(failure) => {
            eprintln!("Build failed: {}", failure);
            true
        }
        Some(failure) => {
            warn!("Unrecognised build output: {}", failure);
            false
        }
        None => false,
    }
}

fn is_fatal(failure: &BuildFailure) -> bool {
    match failure.kind() {
        BuildFailureKind::ErrorEvent | BuildFailureKind::Engine => true,
        BuildFailureKind::MalformedEvent => false,
    }
}

fn build_options(pier: &Pier, context: &Path, dockerfile: Option<&str>) -> BuildOptions {
    let options = pier.build_options(BuildContext::directory(context));
    match dockerfile {
        Some(dockerfile) => options.dockerfile(dockerfile),
        None => options,
    }
}

fn print_build_log(build: &BuildResult) {
    for line in build.log() {
        print!("{}", line);
    }
    let _ = io::stdout().flush();
}
