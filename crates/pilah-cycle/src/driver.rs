use pilah_camera::CameraSource;
use pilah_classifier::Classifier;
use pilah_events::EventBus;
use pilah_types::Result;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::CaptureClassifyCycle;

/// User intents forwarded from an interactive surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleCommand {
    Capture,
    Retake,
    Shutdown,
}

/// Serializes commands onto one cycle so capture and retake never overlap.
pub struct CycleDriver<C, K, B>
where
    C: CameraSource,
    K: Classifier,
    B: EventBus,
{
    cycle: CaptureClassifyCycle<C, K, B>,
    commands: mpsc::Receiver<CycleCommand>,
}

impl<C, K, B> CycleDriver<C, K, B>
where
    C: CameraSource,
    K: Classifier,
    B: EventBus,
{
    pub fn new(
        cycle: CaptureClassifyCycle<C, K, B>,
        commands: mpsc::Receiver<CycleCommand>,
    ) -> Self {
        Self { cycle, commands }
    }

    /// Start the cycle and handle commands until shutdown or the sender closes.
    ///
    /// The model loads alongside command handling, so a capture issued before
    /// it is ready fails with `ModelNotReady` instead of waiting. Step
    /// failures are already published as events and only get logged here.
    pub async fn run(mut self) -> Result<CaptureClassifyCycle<C, K, B>> {
        if let Err(err) = self.cycle.start().await {
            warn!("Camera unavailable at boot: {}", err);
        }
        let mut loading = self.cycle.begin_model_load().await?;
        let classifier = self.cycle.classifier();
        let mut load = Box::pin(async move { classifier.load_model().await });

        loop {
            tokio::select! {
                outcome = &mut load, if loading => {
                    loading = false;
                    self.cycle.finish_model_load(outcome).await?;
                }
                command = self.commands.recv() => match command {
                    Some(CycleCommand::Capture) => {
                        if let Err(err) = self.cycle.capture().await {
                            warn!("Capture did not produce a result: {}", err);
                        }
                    }
                    Some(CycleCommand::Retake) => {
                        if let Err(err) = self.cycle.retake().await {
                            warn!("Retake failed: {}", err);
                        }
                    }
                    Some(CycleCommand::Shutdown) | None => break,
                },
            }
        }
        info!("Cycle driver stopping");
        self.cycle.shutdown().await?;
        Ok(self.cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CycleConfig;
    use async_trait::async_trait;
    use futures::StreamExt;
    use pilah_camera::SyntheticCamera;
    use pilah_events::LocalEventBus;
    use pilah_ops::TelemetryStore;
    use pilah_classifier::{InferenceModel, LocalClassifier, ModelLoader};
    use pilah_types::{
        classification::{ClassificationResult, WasteCategory},
        config::LocalConfig,
        cycle::CycleState,
        events::EventPayload,
        vision::StillFrame,
        ErrorKind,
    };
    use pilah_vision::InputTensor;
    use std::{path::Path, sync::Arc, time::Duration};

    struct Always(WasteCategory);

    #[async_trait]
    impl Classifier for Always {
        fn name(&self) -> &'static str {
            "always"
        }

        async fn classify(&self, _frame: &StillFrame) -> Result<ClassificationResult> {
            ClassificationResult::new(self.0, 0.75)
        }
    }

    #[tokio::test]
    async fn commands_drive_capture_and_retake() {
        let camera = SyntheticCamera::new(32, 32);
        let bus = LocalEventBus::new(256);
        let mut results = bus.on_result();
        let cycle = CaptureClassifyCycle::new(
            CycleConfig::default(),
            camera.clone(),
            Always(WasteCategory::Organik),
            bus,
            TelemetryStore::new(),
        );
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(CycleDriver::new(cycle, rx).run());

        tx.send(CycleCommand::Capture).await.expect("send");
        let first = results.next().await.expect("first result");
        assert_eq!(first.confidence_line(), "Confidence: 75.00%");

        tx.send(CycleCommand::Capture).await.expect("send");
        tx.send(CycleCommand::Retake).await.expect("send");
        tx.send(CycleCommand::Capture).await.expect("send");
        tx.send(CycleCommand::Shutdown).await.expect("send");

        let cycle = handle.await.expect("join").expect("driver");
        assert_eq!(cycle.state(), &CycleState::Idle);
        assert!(results.next().await.is_some());
        let metrics = camera.metrics();
        assert_eq!(metrics.open_requests, 2);
        assert_eq!(metrics.frames_read, 2);
    }

    #[tokio::test]
    async fn closed_sender_stops_the_driver() {
        let cycle = CaptureClassifyCycle::new(
            CycleConfig::default(),
            SyntheticCamera::new(8, 8),
            Always(WasteCategory::Anorganik),
            LocalEventBus::default(),
            TelemetryStore::new(),
        );
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        let cycle = CycleDriver::new(cycle, rx).run().await.expect("driver");
        assert_eq!(cycle.state(), &CycleState::Idle);
    }

    struct FixedScores;

    impl InferenceModel for FixedScores {
        fn predict(&self, _input: &InputTensor) -> Result<Vec<f32>> {
            Ok(vec![0.2, 0.8])
        }
    }

    /// Loader that blocks for `delay` before handing out a model.
    struct SlowLoader {
        delay: Duration,
    }

    impl ModelLoader for SlowLoader {
        fn load(&self, _path: &Path, _input_size: u32) -> Result<Arc<dyn InferenceModel>> {
            std::thread::sleep(self.delay);
            Ok(Arc::new(FixedScores))
        }
    }

    #[tokio::test]
    async fn capture_during_model_load_fails_fast() {
        let bus = LocalEventBus::new(256);
        let mut events = bus.subscribe();
        let cycle = CaptureClassifyCycle::new(
            CycleConfig::default(),
            SyntheticCamera::new(64, 64),
            LocalClassifier::new(
                LocalConfig::default(),
                Arc::new(SlowLoader {
                    delay: Duration::from_millis(300),
                }),
            ),
            bus,
            TelemetryStore::new(),
        );
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(CycleDriver::new(cycle, rx).run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(CycleCommand::Capture).await.expect("send");

        let mut seen = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.next())
                .await
                .expect("event in time")
                .expect("bus open");
            let ready = matches!(&event.payload, EventPayload::Status(s) if s == crate::STATUS_MODEL_READY);
            seen.push(event.payload);
            if ready {
                break;
            }
        }
        let failure_at = seen
            .iter()
            .position(|p| matches!(p, EventPayload::Failure(f) if f.kind == ErrorKind::ModelNotReady))
            .expect("capture rejected while loading");
        let ready_at = seen.len() - 1;
        assert!(failure_at < ready_at);
        assert!(!seen.iter().any(|p| matches!(p, EventPayload::Result(_))));

        tx.send(CycleCommand::Capture).await.expect("send");
        let result = loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.next())
                .await
                .expect("event in time")
                .expect("bus open");
            if let EventPayload::Result(result) = event.payload {
                break result;
            }
        };
        assert_eq!(result.label(), WasteCategory::Anorganik);

        tx.send(CycleCommand::Shutdown).await.expect("send");
        let cycle = handle.await.expect("join").expect("driver");
        assert_eq!(cycle.state(), &CycleState::Idle);
    }
}
