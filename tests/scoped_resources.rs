//! Integration tests for temporary images and containers.
//!
//! Runs the full build, create, start, wait and cleanup cycle against the
//! in-memory recording engine.

use pier::testing::{EngineCall, Operation, RecordingEngine};
use pier::{
    BindSpec, BuildContext, BuildOptions, ContainerOptions, ContainerState, ImageHandle, LogChunk,
    LogOptions, Pier, PierError, StartOptions, VolumeBinding, WaitOptions,
};
use serde_json::json;
use std::sync::Arc;
use test_tag::tag;

fn setup() -> (Arc<RecordingEngine>, Pier) {
    let engine = Arc::new(RecordingEngine::new());
    engine.script_build(vec![
        json!({"stream": "Step 1/1 : FROM alpine:3.20\n"}),
        json!({"stream": "Successfully built 1d34ffeaf190\n"}),
    ]);
    let pier = Pier::new(engine.clone());
    (engine, pier)
}

fn options() -> BuildOptions {
    BuildOptions::new(BuildContext::Archive(Vec::new()))
}

fn removals_of(engine: &RecordingEngine, id: &str) -> usize {
    engine.count_calls(|call| {
        matches!(call, EngineCall::RemoveContainer { container_id } if container_id == id)
    })
}

fn existing_image(engine: &Arc<RecordingEngine>) -> ImageHandle {
    engine.add_image("alpine:3.20");
    ImageHandle::with_id(engine.clone(), "alpine:3.20")
}

#[tokio::test]
#[tag(integration)]
async fn test_build_and_run_cleans_up_everything() {
    let (engine, pier) = setup();
    engine.set_logs(vec![LogChunk::StdOut("hello from the container\n".to_string())]);
    let volumes = vec![VolumeBinding::new("/srv/data", "/data").unwrap().read_only(true)];

    let (image_id, container_id, code, output) = pier
        .temporary_image(options(), |image| async move {
            let image_id = image.id().to_string();
            let (container_id, code, output) = image
                .temporary_container(
                    volumes,
                    ContainerOptions::new().cmd(["cat", "/data/motd"]),
                    |container| async move {
                        container.start(&StartOptions::default()).await?;
                        assert_eq!(container.inspect().await?, ContainerState::Running);

                        let status = container.wait(&WaitOptions::default()).await?;
                        let output = container.log_snapshot(&LogOptions::default()).await?;
                        Ok::<_, PierError>((container.id().to_string(), status.code, output))
                    },
                )
                .await?;
            Ok::<_, PierError>((image_id, container_id, code, output))
        })
        .await
        .unwrap();

    assert_eq!(code, 0);
    assert_eq!(output[0].message(), "hello from the container\n");
    assert_eq!(engine.container_image(&container_id), Some(image_id.clone()));
    assert_eq!(removals_of(&engine, &container_id), 1);
    assert!(!engine.container_exists(&container_id));
    assert!(!engine.image_exists(&image_id));

    // The container goes before the image.
    let calls = engine.calls();
    let container_removed = calls
        .iter()
        .position(|c| matches!(c, EngineCall::RemoveContainer { .. }))
        .unwrap();
    let image_removed = calls
        .iter()
        .position(|c| matches!(c, EngineCall::RemoveImage { .. }))
        .unwrap();
    assert!(container_removed < image_removed);
}

#[tokio::test]
#[tag(integration)]
async fn test_container_removed_once_when_body_fails() {
    let engine = Arc::new(RecordingEngine::new());
    let image = existing_image(&engine);

    let mut seen_id = None;
    let err = image
        .temporary_container(vec![], ContainerOptions::new(), |container| {
            seen_id = Some(container.id().to_string());
            async move {
                container.start(&StartOptions::default()).await?;
                Err::<(), _>(PierError::InvalidArgument("test body failed".to_string()))
            }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PierError::InvalidArgument(m) if m == "test body failed"));
    let id = seen_id.unwrap();
    assert_eq!(removals_of(&engine, &id), 1);
    assert!(!engine.container_exists(&id));
}

#[tokio::test]
#[tag(integration)]
async fn test_body_error_wins_over_cleanup_error() {
    let engine = Arc::new(RecordingEngine::new());
    let image = existing_image(&engine);
    engine.fail(Operation::Stop, 500);

    let err = image
        .temporary_container(vec![], ContainerOptions::new(), |_| async {
            Err::<(), _>(PierError::InvalidArgument("body".to_string()))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PierError::InvalidArgument(m) if m == "body"));
}

#[tokio::test]
#[tag(integration)]
async fn test_cleanup_error_surfaces_after_successful_body() {
    let engine = Arc::new(RecordingEngine::new());
    let image = existing_image(&engine);
    engine.fail(Operation::RemoveContainer, 409);

    let err = image
        .temporary_container(vec![], ContainerOptions::new(), |_| async {
            Ok::<_, PierError>(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PierError::ContainerStoppedNotRemoved { .. }));
}

#[tokio::test]
#[tag(integration)]
async fn test_image_removal_failure_never_escapes() {
    let (engine, pier) = setup();
    engine.fail(Operation::RemoveImage, 409);

    let value = pier
        .temporary_image(options(), |_| async { Ok::<_, PierError>("result") })
        .await
        .unwrap();
    assert_eq!(value, "result");

    let err = pier
        .temporary_image(options(), |_| async {
            Err::<(), _>(PierError::InvalidArgument("caller error".to_string()))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PierError::InvalidArgument(m) if m == "caller error"));
}

#[tokio::test]
#[tag(integration)]
async fn test_image_in_use_cannot_be_removed() {
    let (engine, pier) = setup();
    engine.fail(Operation::RemoveContainer, 500);

    // The leftover container keeps the image alive; cleanup of the image
    // fails quietly.
    let result = pier
        .temporary_image(options(), |image| async move {
            image
                .temporary_container(vec![], ContainerOptions::new(), |_| async {
                    Ok::<_, PierError>(())
                })
                .await
                .map(|()| image.id().to_string())
        })
        .await;

    assert!(matches!(
        result,
        Err(PierError::ContainerStoppedNotRemoved { .. })
    ));
    assert_eq!(
        engine.count_calls(|c| matches!(c, EngineCall::RemoveImage { .. })),
        1
    );
}

#[tokio::test]
#[tag(integration)]
async fn test_start_with_raw_binds_makes_no_engine_call() {
    let engine = Arc::new(RecordingEngine::new());
    let image = existing_image(&engine);

    image
        .temporary_container(vec![], ContainerOptions::new(), |container| {
            let engine = engine.clone();
            async move {
                let before = engine.calls().len();
                let options = StartOptions {
                    binds: Some(vec!["/:/host".to_string()]),
                    ..Default::default()
                };

                let err = container.start(&options).await.unwrap_err();
                assert!(matches!(err, PierError::InvalidArgument(_)));
                assert_eq!(engine.calls().len(), before);
                Ok::<_, PierError>(())
            }
        })
        .await
        .unwrap();
}

#[tokio::test]
#[tag(integration)]
async fn test_volumes_reach_the_engine_as_binds() {
    let engine = Arc::new(RecordingEngine::new());
    let image = existing_image(&engine);
    let volumes = vec![
        VolumeBinding::new("/host", "/mnt").unwrap().read_only(true),
        "/var/cache/app:/cache".parse().unwrap(),
    ];

    let binds = image
        .temporary_container(volumes, ContainerOptions::new(), |container| {
            let engine = engine.clone();
            async move {
                container.start(&StartOptions::default()).await?;
                Ok::<_, PierError>(engine.start_binds(container.id()))
            }
        })
        .await
        .unwrap();

    assert_eq!(
        binds,
        Some(vec![
            (
                "/host".to_string(),
                BindSpec {
                    mount_point: "/mnt".to_string(),
                    read_only: true,
                }
            ),
            (
                "/var/cache/app".to_string(),
                BindSpec {
                    mount_point: "/cache".to_string(),
                    read_only: false,
                }
            ),
        ])
    );
}

#[tokio::test]
#[tag(integration)]
async fn test_removing_a_removed_container_is_an_engine_error() {
    let engine = Arc::new(RecordingEngine::new());
    let image = existing_image(&engine);

    let container = image
        .temporary_container(vec![], ContainerOptions::new(), |container| async move {
            Ok::<_, PierError>(container)
        })
        .await
        .unwrap();

    let err = container.remove().await.unwrap_err();
    assert!(err.is_api_error());
    assert_eq!(err.status_code(), Some(404));
}
