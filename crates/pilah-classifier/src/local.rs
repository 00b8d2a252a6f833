use std::{
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use pilah_types::{
    classification::{ClassificationResult, WasteCategory},
    config::LocalConfig,
    vision::StillFrame,
    PilahError, Result,
};
use pilah_vision::{preprocess, InputTensor};
use tracing::{info, warn};

use crate::{inference_error, Classifier};

/// Loaded model able to run one forward pass.
pub trait InferenceModel: Send + Sync {
    /// Output probability vector for a `[1, size, size, 3]` input.
    fn predict(&self, input: &InputTensor) -> Result<Vec<f32>>;
}

pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path, input_size: u32) -> Result<Arc<dyn InferenceModel>>;
}

enum ModelSlot {
    Unloaded,
    Loading,
    Ready(Arc<dyn InferenceModel>),
    Failed(String),
}

/// Classifier running a preloaded model in-process.
pub struct LocalClassifier {
    config: LocalConfig,
    loader: Arc<dyn ModelLoader>,
    slot: RwLock<ModelSlot>,
}

impl LocalClassifier {
    pub fn new(config: LocalConfig, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            config,
            loader,
            slot: RwLock::new(ModelSlot::Unloaded),
        }
    }

    fn set_slot(&self, slot: ModelSlot) -> Result<()> {
        let mut guard = self
            .slot
            .write()
            .map_err(|_| PilahError::ModelLoadFailure("model slot poisoned".into()))?;
        *guard = slot;
        Ok(())
    }

    fn ready_model(&self) -> Result<Arc<dyn InferenceModel>> {
        let guard = self
            .slot
            .read()
            .map_err(|_| PilahError::ModelNotReady("model slot poisoned".into()))?;
        match &*guard {
            ModelSlot::Ready(model) => Ok(Arc::clone(model)),
            ModelSlot::Unloaded => Err(PilahError::ModelNotReady(
                "model is not loaded yet; wait or restart".into(),
            )),
            ModelSlot::Loading => Err(PilahError::ModelNotReady(
                "model is still loading; wait a moment".into(),
            )),
            ModelSlot::Failed(reason) => Err(PilahError::ModelNotReady(format!(
                "model failed to load: {reason}"
            ))),
        }
    }
}

/// Pick the most probable category through the fixed label table.
pub fn select_label(probabilities: &[f32]) -> Result<ClassificationResult> {
    if probabilities.len() != WasteCategory::ALL.len() {
        return Err(inference_error(format!(
            "model produced {} scores, expected {}",
            probabilities.len(),
            WasteCategory::ALL.len()
        )));
    }
    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in probabilities.iter().enumerate() {
        if score.is_nan() {
            return Err(inference_error(format!("score {idx} is NaN")));
        }
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((idx, score));
        }
    }
    let (idx, score) = best.ok_or_else(|| inference_error("model produced no scores"))?;
    let label = WasteCategory::from_index(idx)
        .ok_or_else(|| inference_error(format!("no label for index {idx}")))?;
    ClassificationResult::new(label, score)
}

#[async_trait]
impl Classifier for LocalClassifier {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn load_model(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }
        self.set_slot(ModelSlot::Loading)?;
        let loader = Arc::clone(&self.loader);
        let path = PathBuf::from(&self.config.model_path);
        let input_size = self.config.input_size;
        info!("Loading model from {:?}", path);

        let loaded = tokio::task::spawn_blocking(move || loader.load(&path, input_size))
            .await
            .map_err(|err| PilahError::ModelLoadFailure(format!("model load task failed: {err}")))
            .and_then(|res| res);

        match loaded {
            Ok(model) => {
                self.set_slot(ModelSlot::Ready(model))?;
                info!("Model ready");
                Ok(())
            }
            Err(err) => {
                warn!("Model load failed: {}", err);
                self.set_slot(ModelSlot::Failed(err.detail()))?;
                Err(match err {
                    PilahError::ModelLoadFailure(_) => err,
                    other => PilahError::ModelLoadFailure(other.detail()),
                })
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.slot
            .read()
            .map(|slot| matches!(*slot, ModelSlot::Ready(_)))
            .unwrap_or(false)
    }

    async fn classify(&self, frame: &StillFrame) -> Result<ClassificationResult> {
        let model = self.ready_model()?;
        let input = preprocess(frame, self.config.input_size)?;
        // Input and output buffers live only inside this task.
        let probabilities = tokio::task::spawn_blocking(move || model.predict(&input))
            .await
            .map_err(|err| inference_error(format!("inference task failed: {err}")))??;
        select_label(&probabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedModel {
        scores: Vec<f32>,
        calls: Arc<AtomicUsize>,
    }

    impl InferenceModel for FixedModel {
        fn predict(&self, input: &InputTensor) -> Result<Vec<f32>> {
            assert_eq!(input.shape, [1, 224, 224, 3]);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.scores.clone())
        }
    }

    struct FixedLoader {
        scores: Vec<f32>,
        calls: Arc<AtomicUsize>,
        loads: Arc<AtomicUsize>,
        fail: bool,
    }

    impl ModelLoader for FixedLoader {
        fn load(&self, path: &Path, input_size: u32) -> Result<Arc<dyn InferenceModel>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            assert_eq!(input_size, 224);
            if self.fail {
                return Err(PilahError::ModelLoadFailure(format!("{:?} not found", path)));
            }
            Ok(Arc::new(FixedModel {
                scores: self.scores.clone(),
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    fn classifier(scores: Vec<f32>, fail: bool) -> (LocalClassifier, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let loads = Arc::new(AtomicUsize::new(0));
        let loader = FixedLoader {
            scores,
            calls: Arc::clone(&calls),
            loads: Arc::clone(&loads),
            fail,
        };
        (
            LocalClassifier::new(LocalConfig::default(), Arc::new(loader)),
            calls,
            loads,
        )
    }

    fn still() -> StillFrame {
        StillFrame::from_rgba(320, 240, vec![120; 320 * 240 * 4], false).expect("still")
    }

    #[test]
    fn argmax_picks_anorganik() {
        let result = select_label(&[0.2, 0.8]).expect("label");
        assert_eq!(result.label(), WasteCategory::Anorganik);
        assert!((result.confidence() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn argmax_rejects_bad_vectors() {
        assert!(select_label(&[0.1, 0.2, 0.7]).is_err());
        assert!(select_label(&[]).is_err());
        assert!(select_label(&[f32::NAN, 0.5]).is_err());
        assert!(select_label(&[3.5, -1.0]).is_err());
    }

    #[tokio::test]
    async fn classify_before_load_never_runs_inference() {
        let (classifier, calls, _) = classifier(vec![0.9, 0.1], false);
        assert!(!classifier.is_ready());
        let err = classifier.classify(&still()).await.unwrap_err();
        assert!(matches!(err, PilahError::ModelNotReady(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn loaded_model_classifies() {
        let (classifier, calls, loads) = classifier(vec![0.2, 0.8], false);
        classifier.load_model().await.expect("load");
        classifier.load_model().await.expect("second load is a no-op");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(classifier.is_ready());

        let result = classifier.classify(&still()).await.expect("classify");
        assert_eq!(result.label(), WasteCategory::Anorganik);
        assert!((result.confidence() - 0.8).abs() < 1e-6);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_load_keeps_classifier_not_ready() {
        let (classifier, calls, _) = classifier(vec![0.5, 0.5], true);
        let err = classifier.load_model().await.unwrap_err();
        assert!(matches!(err, PilahError::ModelLoadFailure(_)));
        assert!(!classifier.is_ready());

        let err = classifier.classify(&still()).await.unwrap_err();
        assert!(matches!(err, PilahError::ModelNotReady(_)));
        assert!(err.detail().contains("failed to load"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
