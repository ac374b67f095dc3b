mod capture;
mod classifier;
mod dispatch;
mod queue;
mod router;
mod scene;
mod sink;
mod storage;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use capture::CapturePath;
use classifier::MotionClassifier;
use dispatch::{MotionDispatcher, PictureDispatcher, SceneDispatcher};
use router::{EventRouter, LatestImage, RouterQueues};
use scene::SceneStateMachine;
use scene_watch_common::config::Config;
use scene_watch_source::{FrameSource, ReplaySource};
use sink::{CaptionClient, RetryPolicy, TelemetryClient};
use storage::PictureStore;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    let geometry = config.geometry();
    let classifier = MotionClassifier::from_config(&config, &geometry);
    let falloff = config.falloff();

    info!(
        width = config.camera.width,
        height = config.camera.height,
        fps = config.camera.fps,
        rotation = config.camera.rotation,
        falloff_ms = falloff.as_millis() as u64,
        max_attempts = config.retry.max_attempts,
        backoff_ms = config.retry_backoff().as_millis() as u64,
        data_folder = %config.storage.data_folder.display(),
        device_id = config.telemetry.device_id,
        telemetry = config.telemetry.endpoint.as_deref().unwrap_or("log"),
        "starting scene-watch"
    );
    info!(
        "MD if >{} out of {} blocks show >{} pixel movement in a {} wide frame",
        classifier.min_blocks,
        geometry.blocks(),
        classifier.min_magnitude,
        config.camera.width
    );

    let store = PictureStore::new(&config.storage.data_folder);
    if let Err(e) = store.ensure_dir().await {
        error!(error = %e, "failed to prepare picture folder");
        std::process::exit(1);
    }

    let policy = RetryPolicy::from_config(&config.retry);
    let captioner = match CaptionClient::from_config(&config.captioning, policy) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to build captioning client");
            std::process::exit(1);
        }
    };
    let telemetry = match TelemetryClient::from_config(&config.telemetry, policy) {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "failed to build telemetry client");
            std::process::exit(1);
        }
    };

    let (motion_tx, motion_rx) = queue::bounded("motion", config.queues.motion);
    let (picture_tx, picture_rx) = queue::bounded("picture", config.queues.picture);
    let (scene_tx, scene_rx) = queue::bounded("scene", config.queues.scene);

    let quality = config.storage.jpeg_quality;
    let dispatchers = [
        (
            "motion",
            dispatch::spawn(motion_rx, MotionDispatcher::new(telemetry.clone(), geometry)),
        ),
        (
            "picture",
            dispatch::spawn(picture_rx, PictureDispatcher::new(store, quality)),
        ),
        (
            "scene",
            dispatch::spawn(scene_rx, SceneDispatcher::new(captioner, telemetry, quality)),
        ),
    ];

    let latest = LatestImage::default();
    let router = EventRouter::new(
        RouterQueues {
            motion: motion_tx,
            picture: picture_tx,
            scene: scene_tx,
        },
        latest.clone(),
        quality,
    );
    let capture = CapturePath::new(geometry, classifier, SceneStateMachine::new(falloff), router);

    let shutdown = Arc::new(AtomicBool::new(false));
    let signal_flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping capture");
            signal_flag.store(true, Ordering::SeqCst);
        }
    });

    let source: Box<dyn FrameSource> = Box::new(ReplaySource::new(
        config.source.replay_path.clone(),
        config.source.realtime,
    ));
    let capture_result = tokio::task::spawn_blocking(move || {
        capture::run(source, capture, latest, &shutdown)
    })
    .await;

    let capture_failed = match capture_result {
        Ok(Ok(())) => false,
        Ok(Err(_)) => true,
        Err(e) => {
            error!(error = %e, "capture thread panicked");
            true
        }
    };

    info!("waiting for dispatchers to drain");
    for (name, task) in dispatchers {
        match task.await {
            Ok(stats) => info!(
                dispatcher = name,
                delivered = stats.delivered,
                failed = stats.failed,
                dropped = stats.dropped,
                "dispatcher finished"
            ),
            Err(e) => error!(dispatcher = name, error = %e, "dispatcher task failed"),
        }
    }

    if capture_failed {
        std::process::exit(1);
    }
    info!("scene-watch stopped");
}
