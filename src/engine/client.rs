//! Docker/Podman engine over the bollard API.
//!
//! Handles connection (TLS, explicit endpoint, local defaults, Podman sockets) and
//! translates [`EngineClient`] calls into bollard requests.

use super::{
    BuildEvent, BuildEventStream, BuildOptions, ContainerOptions, ContainerState, EngineClient,
    EngineResult, ExitStatus, LogChunk, LogOptions, LogStream, StartOptions, WaitOptions,
};
use crate::config::EngineConfig;
use crate::env::tls;
use crate::error::{PierError, Result};
use crate::volume::BindSpec;
use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::models::BuildInfo;
use bollard::service::HostConfig;
use bollard::{ClientVersion, Docker};
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Container engine reached through bollard.
#[derive(Clone)]
pub struct BollardEngine {
    docker: Arc<Docker>,
    stop_timeout: i64,
}

impl BollardEngine {
    /// Connect with default configuration.
    ///
    /// # Errors
    ///
    /// Returns error if neither Docker nor Podman are reachable.
    pub async fn connect() -> Result<Self> {
        Self::with_config(&EngineConfig::default()).await
    }

    /// Connect using `config` and verify the engine answers.
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is invalid or the engine does not answer.
    pub async fn with_config(config: &EngineConfig) -> Result<Self> {
        let docker = Self::open(config)?;
        let engine = Self::from_docker(docker);
        engine.ping().await?;
        Ok(engine)
    }

    /// Wrap an existing bollard connection.
    pub fn from_docker(docker: Docker) -> Self {
        Self {
            docker: Arc::new(docker),
            stop_timeout: 10,
        }
    }

    /// Seconds the engine waits for a container to stop before killing it.
    pub fn with_stop_timeout(mut self, seconds: i64) -> Self {
        self.stop_timeout = seconds;
        self
    }

    /// Open a connection without contacting the engine.
    ///
    /// Tries, in order:
    /// 1. TLS, if `config.tls` is set or `base_url` is `https://`
    /// 2. `config.base_url`, if set
    /// 3. Local defaults (Unix socket, Windows named pipe, DOCKER_HOST)
    /// 4. Rootless then system Podman socket
    fn open(config: &EngineConfig) -> Result<Docker> {
        let client_version = match config.api_version()? {
            Some((major_version, minor_version)) => ClientVersion {
                major_version,
                minor_version,
            },
            None => *bollard::API_DEFAULT_VERSION,
        };

        let wants_tls = config.tls
            || config
                .base_url
                .as_deref()
                .is_some_and(|url| url.starts_with("https://"));
        if wants_tls {
            return Self::open_tls(config, &client_version);
        }

        if let Some(url) = &config.base_url {
            debug!("Connecting to container engine at {}", url);
            let docker = if url.starts_with("unix://") {
                Docker::connect_with_socket(url, config.timeout, &client_version)?
            } else if url.starts_with("tcp://") || url.starts_with("http://") {
                Docker::connect_with_http(url, config.timeout, &client_version)?
            } else {
                return Err(PierError::ConfigError(format!(
                    "unsupported engine url '{}', expected unix://, tcp://, http:// or https://",
                    url
                )));
            };
            info!("Connected to container engine at {}", url);
            return Ok(docker);
        }

        debug!("Attempting to connect to container engine...");

        match Docker::connect_with_local_defaults() {
            Ok(docker) => {
                info!("Connected to container engine via local defaults");
                return Ok(docker.with_timeout(Duration::from_secs(config.timeout)));
            }
            Err(e) => {
                debug!("Local defaults failed: {}", e);
            }
        }

        #[cfg(unix)]
        {
            let mut sockets = Vec::new();
            if let Ok(home) = std::env::var("HOME") {
                sockets.push(crate::env::rootless_podman_socket(std::path::Path::new(
                    &home,
                )));
            }
            sockets.push(crate::env::podman::SYSTEM_SOCKET.to_string());

            for socket in sockets {
                debug!("Trying Podman socket: {}", socket);
                match Docker::connect_with_socket(&socket, config.timeout, &client_version) {
                    Ok(docker) => {
                        info!("Connected to Podman via {}", socket);
                        return Ok(docker);
                    }
                    Err(e) => {
                        debug!("Podman socket {} failed: {}", socket, e);
                    }
                }
            }
        }

        Err(PierError::ConfigError(
            "Failed to connect to Docker or Podman. Please ensure Docker or Podman is installed and running.".to_string(),
        ))
    }

    fn open_tls(config: &EngineConfig, client_version: &ClientVersion) -> Result<Docker> {
        let url = config
            .base_url
            .clone()
            .or_else(|| std::env::var("DOCKER_HOST").ok())
            .unwrap_or_else(|| crate::env::DEFAULT_TLS_HOST.to_string());
        let cert_dir = config
            .cert_path
            .clone()
            .or_else(default_cert_dir)
            .ok_or_else(|| {
                PierError::ConfigError(
                    "TLS requested but no certificate directory is known; set cert_path or DOCKER_CERT_PATH".to_string(),
                )
            })?;

        debug!(
            "Connecting to container engine at {} over TLS (certificates in {:?})",
            url, cert_dir
        );
        let docker = Docker::connect_with_ssl(
            &url,
            &cert_dir.join(tls::KEY_FILE),
            &cert_dir.join(tls::CERT_FILE),
            &cert_dir.join(tls::CA_FILE),
            config.timeout,
            client_version,
        )?;
        info!("Connected to container engine at {} over TLS", url);
        Ok(docker)
    }

    /// Ping the engine to verify connectivity.
    ///
    /// # Errors
    ///
    /// Returns error if ping fails.
    pub async fn ping(&self) -> Result<()> {
        self.docker.ping().await?;
        debug!("Container engine ping successful");
        Ok(())
    }

    /// Get the underlying bollard client.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }
}

fn default_cert_dir() -> Option<PathBuf> {
    std::env::var(tls::CERT_PATH_VAR)
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(tls::DOCKER_DIR_NAME))
        })
}

/// Rebuild the raw record the engine sent from bollard's decoded form.
fn to_build_event(info: BuildInfo) -> BuildEvent {
    let mut record = Map::new();

    if let Some(id) = info.id {
        record.insert("id".to_string(), Value::String(id));
    }
    if let Some(stream) = info.stream {
        record.insert("stream".to_string(), Value::String(stream));
    }
    if let Some(error) = info.error {
        record.insert("error".to_string(), Value::String(error));
    }
    if let Some(detail) = info.error_detail {
        let mut fields = Map::new();
        if let Some(code) = detail.code {
            fields.insert("code".to_string(), Value::from(code));
        }
        if let Some(message) = detail.message {
            fields.insert("message".to_string(), Value::String(message));
        }
        record.insert("errorDetail".to_string(), Value::Object(fields));
    }
    if let Some(status) = info.status {
        record.insert("status".to_string(), Value::String(status));
    }
    if let Some(progress) = info.progress {
        record.insert("progress".to_string(), Value::String(progress));
    }
    if let Some(detail) = info.progress_detail {
        let mut fields = Map::new();
        if let Some(current) = detail.current {
            fields.insert("current".to_string(), Value::from(current));
        }
        if let Some(total) = detail.total {
            fields.insert("total".to_string(), Value::from(total));
        }
        record.insert("progressDetail".to_string(), Value::Object(fields));
    }
    if let Some(aux) = info.aux {
        let mut fields = Map::new();
        if let Some(id) = aux.id {
            fields.insert("ID".to_string(), Value::String(id));
        }
        record.insert("aux".to_string(), Value::Object(fields));
    }

    Value::Object(record)
}

/// bollard turns every record carrying `error` into a stream error and
/// keeps only its text; restore it as an error-detail record.
fn to_build_item(item: EngineResult<BuildInfo>) -> EngineResult<BuildEvent> {
    match item {
        Ok(info) => Ok(to_build_event(info)),
        Err(bollard::errors::Error::DockerStreamError { error }) => {
            let mut detail = Map::new();
            detail.insert("message".to_string(), Value::String(error));
            let mut record = Map::new();
            record.insert("errorDetail".to_string(), Value::Object(detail));
            Ok(Value::Object(record))
        }
        Err(e) => Err(e),
    }
}

fn to_log_chunk(output: LogOutput) -> LogChunk {
    match output {
        LogOutput::StdOut { message } => {
            LogChunk::StdOut(String::from_utf8_lossy(&message).into_owned())
        }
        LogOutput::StdErr { message } => {
            LogChunk::StdErr(String::from_utf8_lossy(&message).into_owned())
        }
        LogOutput::StdIn { message } => {
            LogChunk::StdIn(String::from_utf8_lossy(&message).into_owned())
        }
        LogOutput::Console { message } => {
            LogChunk::Console(String::from_utf8_lossy(&message).into_owned())
        }
    }
}

fn bind_strings(binds: &[(String, BindSpec)]) -> Vec<String> {
    binds
        .iter()
        .map(|(host, spec)| spec.to_bind_string(host))
        .collect()
}

#[async_trait]
impl EngineClient for BollardEngine {
    fn build<'a>(&'a self, tag: &str, options: &BuildOptions) -> BuildEventStream<'a> {
        debug!("Building image {} (dockerfile {})", tag, options.dockerfile);

        let build_options = bollard::image::BuildImageOptions {
            t: tag.to_string(),
            dockerfile: options.dockerfile.clone(),
            rm: options.rm,
            forcerm: options.forcerm,
            nocache: options.nocache,
            pull: options.pull,
            buildargs: options.build_args.clone(),
            ..Default::default()
        };
        let context = options.context.clone();
        let docker: &'a Docker = &self.docker;

        stream::once(async move {
            // Packing a directory walks the file system.
            let archive = tokio::task::spawn_blocking(move || context.to_archive())
                .await
                .map_err(std::io::Error::other)
                .and_then(|packed| packed);

            match archive {
                Ok(archive) => docker
                    .build_image(build_options, None, Some(bollard::body_full(archive.into())))
                    .map(to_build_item)
                    .boxed(),
                Err(e) => {
                    let error = bollard::errors::Error::from(e);
                    stream::once(async move { Err(error) }).boxed()
                }
            }
        })
        .flatten()
        .boxed()
    }

    async fn create_container(
        &self,
        options: &ContainerOptions,
        binds: &[(String, BindSpec)],
    ) -> EngineResult<String> {
        use bollard::container::Config as BollardConfig;

        let create_options =
            options
                .name
                .as_deref()
                .map(|name| bollard::container::CreateContainerOptions {
                    name,
                    ..Default::default()
                });

        // Engine API >= 1.24 only accepts bind mounts at creation time.
        let host_config = HostConfig {
            binds: (!binds.is_empty()).then(|| bind_strings(binds)),
            ..Default::default()
        };

        let bollard_config = BollardConfig {
            image: options.image.clone(),
            cmd: options.cmd.clone(),
            entrypoint: options.entrypoint.clone(),
            working_dir: options.working_dir.clone(),
            env: (!options.env.is_empty()).then(|| options.env.clone()),
            labels: (!options.labels.is_empty()).then(|| options.labels.clone()),
            user: options.user.clone(),
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(create_options, bollard_config)
            .await?;

        for warning in &response.warnings {
            debug!("Engine warning for {}: {}", response.id, warning);
        }

        Ok(response.id)
    }

    async fn start(
        &self,
        container_id: &str,
        binds: &[(String, BindSpec)],
        options: &StartOptions,
    ) -> EngineResult<()> {
        debug!(
            "Starting container {} with {} bind(s) applied at creation",
            container_id,
            binds.len()
        );

        let start_options = options.detach_keys.as_ref().map(|keys| {
            bollard::container::StartContainerOptions {
                detach_keys: keys.clone(),
            }
        });

        self.docker
            .start_container(container_id, start_options)
            .await
    }

    async fn inspect_container(&self, container_id: &str) -> EngineResult<ContainerState> {
        let inspect = self
            .docker
            .inspect_container(
                container_id,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await?;

        let state = inspect.state.unwrap_or_default();

        if state.running.unwrap_or(false) {
            Ok(ContainerState::Running)
        } else if state.paused.unwrap_or(false) {
            Ok(ContainerState::Paused)
        } else if state.restarting.unwrap_or(false) {
            Ok(ContainerState::Restarting)
        } else if state.dead.unwrap_or(false) {
            Ok(ContainerState::Dead)
        } else {
            Ok(ContainerState::Stopped)
        }
    }

    async fn stop(&self, container_id: &str) -> EngineResult<()> {
        // bollard answers 304 (already stopped) with Ok
        self.docker
            .stop_container(
                container_id,
                Some(bollard::container::StopContainerOptions {
                    t: self.stop_timeout,
                }),
            )
            .await
    }

    async fn remove_container(&self, container_id: &str) -> EngineResult<()> {
        self.docker
            .remove_container(
                container_id,
                Some(bollard::container::RemoveContainerOptions {
                    v: true,
                    ..Default::default()
                }),
            )
            .await
    }

    async fn remove_image(&self, image_id: &str) -> EngineResult<()> {
        self.docker
            .remove_image(
                image_id,
                Some(bollard::image::RemoveImageOptions::default()),
                None,
            )
            .await
            .map(|_| ())
    }

    fn logs<'a>(
        &'a self,
        container_id: &str,
        follow: bool,
        options: &LogOptions,
    ) -> LogStream<'a> {
        self.docker
            .logs(
                container_id,
                Some(bollard::container::LogsOptions {
                    follow,
                    stdout: options.stdout,
                    stderr: options.stderr,
                    timestamps: options.timestamps,
                    tail: options.tail.clone(),
                    ..Default::default()
                }),
            )
            .map(|item| item.map(to_log_chunk))
            .boxed()
    }

    async fn wait(&self, container_id: &str, options: &WaitOptions) -> EngineResult<ExitStatus> {
        let mut stream = self.docker.wait_container(
            container_id,
            Some(bollard::container::WaitContainerOptions {
                condition: options.condition.as_str(),
            }),
        );

        match stream.next().await {
            Some(Ok(response)) => Ok(ExitStatus {
                code: response.status_code,
                error: response.error.and_then(|e| e.message),
            }),
            // bollard reports a non-zero exit as an error
            Some(Err(bollard::errors::Error::DockerContainerWaitError { error, code })) => {
                Ok(ExitStatus {
                    code,
                    error: (!error.is_empty()).then_some(error),
                })
            }
            Some(Err(e)) => Err(e),
            None => Err(bollard::errors::Error::from(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("wait stream for {} ended without a status", container_id),
            ))),
        }
    }
}
