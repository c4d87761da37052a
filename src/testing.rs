//! In-memory engine for tests.
//!
//! [`RecordingEngine`] implements [`EngineClient`] without a daemon. It keeps
//! a small model of images and containers, records every call in order, and
//! can be scripted with build events, container output, exit codes and
//! per-operation failures.

use crate::engine::{
    BuildEvent, BuildEventStream, BuildOptions, ContainerOptions, ContainerState, EngineClient,
    EngineResult, ExitStatus, LogChunk, LogOptions, LogStream, StartOptions, WaitOptions,
};
use crate::volume::BindSpec;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Engine operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Build,
    CreateContainer,
    Start,
    Inspect,
    Stop,
    RemoveContainer,
    RemoveImage,
    Logs,
    Wait,
}

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Build {
        tag: String,
        rm: bool,
    },
    CreateContainer {
        image: Option<String>,
        binds: Vec<(String, BindSpec)>,
    },
    Start {
        container_id: String,
        binds: Vec<(String, BindSpec)>,
    },
    Inspect {
        container_id: String,
    },
    Stop {
        container_id: String,
    },
    RemoveContainer {
        container_id: String,
    },
    RemoveImage {
        image_id: String,
    },
    Logs {
        container_id: String,
        follow: bool,
    },
    Wait {
        container_id: String,
    },
}

#[derive(Debug, Clone)]
struct ContainerRecord {
    image: Option<String>,
    running: bool,
    start_binds: Option<Vec<(String, BindSpec)>>,
}

#[derive(Default)]
struct Inner {
    calls: Mutex<Vec<EngineCall>>,
    build_script: Mutex<Vec<BuildEvent>>,
    build_stream_error: Mutex<Option<String>>,
    events_polled: Arc<AtomicUsize>,
    images: Mutex<HashSet<String>>,
    containers: Mutex<HashMap<String, ContainerRecord>>,
    created_images: Mutex<HashMap<String, Option<String>>>,
    removed_containers: Mutex<Vec<String>>,
    next_container: AtomicUsize,
    failures: Mutex<HashMap<Operation, u16>>,
    logs: Mutex<Vec<LogChunk>>,
    exit_code: Mutex<i64>,
}

/// Recording, scriptable [`EngineClient`].
#[derive(Clone, Default)]
pub struct RecordingEngine {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn rejected(status_code: u16, message: impl Into<String>) -> bollard::errors::Error {
    bollard::errors::Error::DockerResponseServerError {
        status_code,
        message: message.into(),
    }
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events every subsequent build will emit.
    ///
    /// A build registers its tag as an image unless the script contains an
    /// `errorDetail` record.
    pub fn script_build(&self, events: Vec<BuildEvent>) {
        *lock(&self.inner.build_script) = events;
    }

    /// End every subsequent build stream with a transport error.
    pub fn script_build_stream_error<S: Into<String>>(&self, message: S) {
        *lock(&self.inner.build_stream_error) = Some(message.into());
    }

    /// Output returned by every logs call.
    pub fn set_logs(&self, chunks: Vec<LogChunk>) {
        *lock(&self.inner.logs) = chunks;
    }

    /// Exit code reported by every wait call.
    pub fn set_exit_code(&self, code: i64) {
        *lock(&self.inner.exit_code) = code;
    }

    /// Make every call of `operation` fail with `status_code`.
    pub fn fail(&self, operation: Operation, status_code: u16) {
        lock(&self.inner.failures).insert(operation, status_code);
    }

    /// Let `operation` succeed again.
    pub fn recover(&self, operation: Operation) {
        lock(&self.inner.failures).remove(&operation);
    }

    /// Register an existing image.
    pub fn add_image<S: Into<String>>(&self, id: S) {
        lock(&self.inner.images).insert(id.into());
    }

    pub fn image_exists(&self, id: &str) -> bool {
        lock(&self.inner.images).contains(id)
    }

    pub fn container_exists(&self, id: &str) -> bool {
        lock(&self.inner.containers).contains_key(id)
    }

    /// Image a container was created from, even after it was removed.
    pub fn container_image(&self, id: &str) -> Option<String> {
        lock(&self.inner.created_images).get(id).cloned().flatten()
    }

    /// Binds the container was last started with.
    pub fn start_binds(&self, id: &str) -> Option<Vec<(String, BindSpec)>> {
        lock(&self.inner.containers)
            .get(id)
            .and_then(|c| c.start_binds.clone())
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        lock(&self.inner.calls).clone()
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count_calls<P>(&self, predicate: P) -> usize
    where
        P: Fn(&EngineCall) -> bool,
    {
        lock(&self.inner.calls).iter().filter(|c| predicate(c)).count()
    }

    /// Ids of successfully removed containers, in removal order.
    pub fn removed_containers(&self) -> Vec<String> {
        lock(&self.inner.removed_containers).clone()
    }

    /// Build records consumers have pulled from build streams.
    pub fn build_events_polled(&self) -> usize {
        self.inner.events_polled.load(Ordering::SeqCst)
    }

    fn record(&self, call: EngineCall) {
        lock(&self.inner.calls).push(call);
    }

    fn check(&self, operation: Operation) -> EngineResult<()> {
        match lock(&self.inner.failures).get(&operation) {
            Some(status_code) => Err(rejected(
                *status_code,
                format!("injected {:?} failure", operation),
            )),
            None => Ok(()),
        }
    }

    fn with_container<T, F>(&self, id: &str, f: F) -> EngineResult<T>
    where
        F: FnOnce(&mut ContainerRecord) -> T,
    {
        lock(&self.inner.containers)
            .get_mut(id)
            .map(f)
            .ok_or_else(|| rejected(404, format!("No such container: {}", id)))
    }
}

#[async_trait]
impl EngineClient for RecordingEngine {
    fn build<'a>(&'a self, tag: &str, options: &BuildOptions) -> BuildEventStream<'a> {
        self.record(EngineCall::Build {
            tag: tag.to_string(),
            rm: options.rm,
        });

        if let Err(e) = self.check(Operation::Build) {
            return stream::once(async move { Err(e) }).boxed();
        }

        let events = lock(&self.inner.build_script).clone();
        let stream_error = lock(&self.inner.build_stream_error).clone();

        let failed = stream_error.is_some()
            || events
                .iter()
                .any(|event| event.get("errorDetail").is_some());
        if !failed {
            self.add_image(tag);
        }

        let mut items: Vec<EngineResult<BuildEvent>> = events.into_iter().map(Ok).collect();
        if let Some(message) = stream_error {
            items.push(Err(rejected(500, message)));
        }

        let polled = self.inner.events_polled.clone();
        stream::iter(items)
            .inspect(move |_| {
                polled.fetch_add(1, Ordering::SeqCst);
            })
            .boxed()
    }

    async fn create_container(
        &self,
        options: &ContainerOptions,
        binds: &[(String, BindSpec)],
    ) -> EngineResult<String> {
        self.record(EngineCall::CreateContainer {
            image: options.image.clone(),
            binds: binds.to_vec(),
        });
        self.check(Operation::CreateContainer)?;

        if let Some(image) = &options.image {
            if !self.image_exists(image) {
                return Err(rejected(404, format!("No such image: {}", image)));
            }
        }

        let n = self.inner.next_container.fetch_add(1, Ordering::SeqCst) + 1;
        let id = options
            .name
            .clone()
            .unwrap_or_else(|| format!("container-{}", n));

        lock(&self.inner.containers).insert(
            id.clone(),
            ContainerRecord {
                image: options.image.clone(),
                running: false,
                start_binds: None,
            },
        );
        lock(&self.inner.created_images).insert(id.clone(), options.image.clone());

        Ok(id)
    }

    async fn start(
        &self,
        container_id: &str,
        binds: &[(String, BindSpec)],
        _options: &StartOptions,
    ) -> EngineResult<()> {
        self.record(EngineCall::Start {
            container_id: container_id.to_string(),
            binds: binds.to_vec(),
        });
        self.check(Operation::Start)?;

        self.with_container(container_id, |c| {
            c.running = true;
            c.start_binds = Some(binds.to_vec());
        })
    }

    async fn inspect_container(&self, container_id: &str) -> EngineResult<ContainerState> {
        self.record(EngineCall::Inspect {
            container_id: container_id.to_string(),
        });
        self.check(Operation::Inspect)?;

        self.with_container(container_id, |c| {
            if c.running {
                ContainerState::Running
            } else {
                ContainerState::Stopped
            }
        })
    }

    async fn stop(&self, container_id: &str) -> EngineResult<()> {
        self.record(EngineCall::Stop {
            container_id: container_id.to_string(),
        });
        self.check(Operation::Stop)?;

        self.with_container(container_id, |c| c.running = false)
    }

    async fn remove_container(&self, container_id: &str) -> EngineResult<()> {
        self.record(EngineCall::RemoveContainer {
            container_id: container_id.to_string(),
        });
        self.check(Operation::RemoveContainer)?;

        let mut containers = lock(&self.inner.containers);
        match containers.get(container_id) {
            None => Err(rejected(404, format!("No such container: {}", container_id))),
            Some(c) if c.running => Err(rejected(
                409,
                format!("cannot remove running container {}", container_id),
            )),
            Some(_) => {
                containers.remove(container_id);
                lock(&self.inner.removed_containers).push(container_id.to_string());
                Ok(())
            }
        }
    }

    async fn remove_image(&self, image_id: &str) -> EngineResult<()> {
        self.record(EngineCall::RemoveImage {
            image_id: image_id.to_string(),
        });
        self.check(Operation::RemoveImage)?;

        let in_use = lock(&self.inner.containers)
            .values()
            .any(|c| c.image.as_deref() == Some(image_id));
        if in_use {
            return Err(rejected(
                409,
                format!("image {} is being used by a container", image_id),
            ));
        }

        if lock(&self.inner.images).remove(image_id) {
            Ok(())
        } else {
            Err(rejected(404, format!("No such image: {}", image_id)))
        }
    }

    fn logs<'a>(
        &'a self,
        container_id: &str,
        follow: bool,
        _options: &LogOptions,
    ) -> LogStream<'a> {
        self.record(EngineCall::Logs {
            container_id: container_id.to_string(),
            follow,
        });

        let known = self
            .check(Operation::Logs)
            .and_then(|()| self.with_container(container_id, |_| ()));
        if let Err(e) = known {
            return stream::once(async move { Err(e) }).boxed();
        }

        let chunks = lock(&self.inner.logs).clone();
        stream::iter(chunks.into_iter().map(Ok)).boxed()
    }

    async fn wait(&self, container_id: &str, _options: &WaitOptions) -> EngineResult<ExitStatus> {
        self.record(EngineCall::Wait {
            container_id: container_id.to_string(),
        });
        self.check(Operation::Wait)?;

        self.with_container(container_id, |c| c.running = false)?;
        Ok(ExitStatus {
            code: *lock(&self.inner.exit_code),
            error: None,
        })
    }
}
