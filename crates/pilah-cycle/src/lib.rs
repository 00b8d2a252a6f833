//! Capture → classify cycle coordinating camera, vision, and classifier.

use std::{path::PathBuf, sync::Arc, time::Instant};

use chrono::Utc;
use pilah_camera::{CameraSource, CameraStream};
use pilah_classifier::Classifier;
use pilah_events::EventBus;
use pilah_ops::TelemetryStore;
use pilah_types::{
    classification::{ClassificationFailure, ClassificationResult},
    config::PilahConfig,
    cycle::CycleState,
    events::{CycleEvent, EventPayload},
    telemetry::CycleLatency,
    vision::{FacingMode, StillFrame},
    PilahError, Result,
};
use pilah_vision::{freeze_frame, persist_capture};
use tracing::{debug, info, warn};

mod driver;

pub use driver::{CycleCommand, CycleDriver};

pub const STATUS_AWAITING: &str = "Waiting for image...";
pub const STATUS_CLASSIFYING: &str = "Classifying...";
pub const STATUS_LOADING_MODEL: &str = "Loading model...";
pub const STATUS_MODEL_READY: &str = "Model ready. Take a picture!";
pub const STATUS_MODEL_FAILED: &str = "Failed to load model.";
pub const STATUS_CLASSIFY_FAILED: &str = "Classification failed.";
pub const STATUS_CAMERA_UNAVAILABLE: &str = "Camera unavailable.";
pub const NOTICE_CAMERA_DENIED: &str =
    "Failed to access the camera. Make sure permission is granted and no other application is using it.";
pub const NOTICE_NOT_READY: &str = "Video feed is not ready. Try again.";

#[derive(Debug, Clone, Default)]
pub struct CycleConfig {
    pub facing: FacingMode,
    pub mirror: bool,
    pub capture_dir: Option<PathBuf>,
}

impl From<&PilahConfig> for CycleConfig {
    fn from(config: &PilahConfig) -> Self {
        Self {
            facing: config.camera.facing,
            mirror: config.camera.mirror,
            capture_dir: config.vision.capture_dir.as_ref().map(PathBuf::from),
        }
    }
}

struct CaptureSession {
    stream: Box<dyn CameraStream>,
    opened_at: Instant,
}

pub struct CaptureClassifyCycle<C, K, B>
where
    C: CameraSource,
    K: Classifier,
    B: EventBus,
{
    camera: C,
    classifier: Arc<K>,
    bus: B,
    telemetry: TelemetryStore,
    config: CycleConfig,
    session: Option<CaptureSession>,
    still: Option<StillFrame>,
    state: CycleState,
}

impl<C, K, B> CaptureClassifyCycle<C, K, B>
where
    C: CameraSource,
    K: Classifier,
    B: EventBus,
{
    pub fn new(
        config: CycleConfig,
        camera: C,
        classifier: K,
        bus: B,
        telemetry: TelemetryStore,
    ) -> Self {
        Self {
            camera,
            classifier: Arc::new(classifier),
            bus,
            telemetry,
            config,
            session: None,
            still: None,
            state: CycleState::Idle,
        }
    }

    pub fn state(&self) -> &CycleState {
        &self.state
    }

    /// Frame frozen by the last capture, until the next start.
    pub fn still(&self) -> Option<&StillFrame> {
        self.still.as_ref()
    }

    pub fn has_live_session(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| session.stream.is_live())
            .unwrap_or(false)
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn telemetry(&self) -> &TelemetryStore {
        &self.telemetry
    }

    /// Shared handle for loading the model outside of `&mut self` calls.
    pub fn classifier(&self) -> Arc<K> {
        Arc::clone(&self.classifier)
    }

    /// Start the camera, then load the classifier's model if it has one.
    ///
    /// Neither failure is fatal: both are reported as events and leave the
    /// cycle recoverable.
    pub async fn boot(&mut self) -> Result<()> {
        if let Err(err) = self.start().await {
            warn!("Camera unavailable at boot: {}", err);
        }
        if self.begin_model_load().await? {
            let outcome = self.classifier.load_model().await;
            self.finish_model_load(outcome).await?;
        }
        Ok(())
    }

    /// Announce a model load. Returns `false` when the classifier is already
    /// ready and nothing needs loading.
    pub async fn begin_model_load(&self) -> Result<bool> {
        if self.classifier.is_ready() {
            return Ok(false);
        }
        self.publish(EventPayload::Status(STATUS_LOADING_MODEL.into()))
            .await?;
        Ok(true)
    }

    /// Report the outcome of [`Classifier::load_model`]. A failed load is
    /// published, not returned.
    pub async fn finish_model_load(&self, outcome: Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => {
                info!("{} classifier ready", self.classifier.name());
                self.publish(EventPayload::Status(STATUS_MODEL_READY.into()))
                    .await
            }
            Err(err) => {
                self.publish(EventPayload::Status(STATUS_MODEL_FAILED.into()))
                    .await?;
                self.report_failure(
                    &err,
                    format!(
                        "Failed to load model: {}. Make sure the model exists and its path is correct.",
                        err.detail()
                    ),
                )
                .await
            }
        }
    }

    /// Request the camera and return to the live preview.
    pub async fn start(&mut self) -> Result<()> {
        self.release_session();
        self.still = None;

        match self.camera.open(self.config.facing).await {
            Ok(stream) => {
                self.session = Some(CaptureSession {
                    stream,
                    opened_at: Instant::now(),
                });
                self.transition(CycleState::Live).await?;
                self.publish(EventPayload::Status(STATUS_AWAITING.into()))
                    .await?;
                Ok(())
            }
            Err(err) => {
                let err = match err {
                    PilahError::CameraAccessDenied(_) => err,
                    other => PilahError::CameraAccessDenied(other.detail()),
                };
                warn!("Camera request failed: {}", err);
                self.transition(CycleState::Unavailable(err.detail()))
                    .await?;
                self.publish(EventPayload::Status(STATUS_CAMERA_UNAVAILABLE.into()))
                    .await?;
                self.report_failure(&err, NOTICE_CAMERA_DENIED.to_string())
                    .await?;
                Err(err)
            }
        }
    }

    /// Freeze the current frame, release the camera, and classify the still.
    pub async fn capture(&mut self) -> Result<ClassificationResult> {
        if !self.state.can_capture() {
            return Err(PilahError::InvalidState(format!(
                "cannot capture while {:?}",
                self.state.phase()
            )));
        }
        if !self.classifier.is_ready() {
            let err = PilahError::ModelNotReady("model is not loaded yet; wait or restart".into());
            self.report_failure(&err, "Model is not loaded yet. Please wait or restart.".into())
                .await?;
            return Err(err);
        }

        let started = Instant::now();
        let still = match self.freeze().await? {
            Some(still) => still,
            None => {
                let err =
                    PilahError::FrameNotReady("video feed has not buffered a frame yet".into());
                warn!("{}; restarting camera", err);
                self.publish(EventPayload::Notice(NOTICE_NOT_READY.into()))
                    .await?;
                if let Err(restart) = self.start().await {
                    warn!("Camera restart after not-ready capture failed: {}", restart);
                }
                return Err(err);
            }
        };
        let freeze_ms = started.elapsed().as_millis() as u64;

        if let Some(dir) = &self.config.capture_dir {
            match persist_capture(&still, dir) {
                Ok(path) => info!("Saved still to {:?}", path),
                Err(err) => warn!("Could not save still: {}", err),
            }
        }

        self.transition(CycleState::Stilled).await?;
        self.publish(EventPayload::Status(STATUS_CLASSIFYING.into()))
            .await?;

        let classify_started = Instant::now();
        let outcome = self.classifier.classify(&still).await;
        let classify_ms = classify_started.elapsed().as_millis() as u64;
        self.still = Some(still);
        self.telemetry
            .record_latency(CycleLatency {
                freeze_ms,
                classify_ms,
                total_ms: started.elapsed().as_millis() as u64,
                captured_at: Utc::now(),
            })
            .await?;

        match outcome {
            Ok(result) => {
                info!(
                    "Classified still as {} ({})",
                    result.label(),
                    result.confidence_percent()
                );
                self.transition(CycleState::Resulted(result.clone()))
                    .await?;
                self.publish(EventPayload::Status(result.label_line()))
                    .await?;
                self.publish(EventPayload::Result(result.clone())).await?;
                Ok(result)
            }
            Err(err) => {
                warn!("Classification failed: {}", err);
                self.transition(CycleState::Failed(ClassificationFailure::from(&err)))
                    .await?;
                self.publish(EventPayload::Status(STATUS_CLASSIFY_FAILED.into()))
                    .await?;
                self.report_failure(&err, format!("Failed to classify image: {}", err.detail()))
                    .await?;
                Err(err)
            }
        }
    }

    /// Drop the still and go back to the live preview.
    pub async fn retake(&mut self) -> Result<()> {
        self.still = None;
        self.start().await
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.release_session();
        self.still = None;
        self.transition(CycleState::Idle).await
    }

    /// Freeze the live frame and release the camera. `None` when the stream
    /// has not buffered enough data yet; the session is left untouched then.
    async fn freeze(&mut self) -> Result<Option<StillFrame>> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| PilahError::InvalidState("no live camera session".into()))?;
        let Some((width, height)) = session.stream.dimensions() else {
            return Ok(None);
        };

        let frozen = session
            .stream
            .read_frame()
            .and_then(|frame| freeze_frame(&frame, self.config.mirror));
        let stopped = self.release_session();
        debug!("Released {} camera track(s) after freeze", stopped);

        match frozen {
            Ok(still) => {
                debug!(
                    "Froze {}x{} still from {}x{} stream",
                    still.width, still.height, width, height
                );
                Ok(Some(still))
            }
            Err(err) => {
                self.transition(CycleState::Failed(ClassificationFailure::from(&err)))
                    .await?;
                self.report_failure(&err, format!("Failed to capture image: {}", err.detail()))
                    .await?;
                Err(err)
            }
        }
    }

    fn release_session(&mut self) -> usize {
        match self.session.take() {
            Some(mut session) => {
                debug!(
                    "Closing camera session after {}ms",
                    session.opened_at.elapsed().as_millis()
                );
                session.stream.stop_all_tracks()
            }
            None => 0,
        }
    }

    async fn transition(&mut self, next: CycleState) -> Result<()> {
        let from = self.state.phase();
        let to = next.phase();
        self.state = next;
        if from != to {
            debug!("Cycle {:?} -> {:?}", from, to);
        }
        self.publish(EventPayload::StateChanged { from, to }).await
    }

    async fn report_failure(&self, err: &PilahError, notice: String) -> Result<()> {
        self.publish(EventPayload::Failure(ClassificationFailure::from(err)))
            .await?;
        self.publish(EventPayload::Notice(notice)).await
    }

    async fn publish(&self, payload: EventPayload) -> Result<()> {
        let event = CycleEvent::new(payload);
        self.telemetry.record_event(event.clone()).await?;
        self.bus.publish(event).await
    }
}
