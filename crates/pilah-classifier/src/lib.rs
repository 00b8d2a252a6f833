//! Classification strategies mapping a still frame to a waste category.

use std::sync::Arc;

use async_trait::async_trait;
use pilah_types::{
    classification::ClassificationResult,
    config::{ClassifierStrategy, PilahConfig},
    vision::StillFrame,
    PilahError, Result,
};

mod local;
mod remote;
mod tract_model;

pub use local::{select_label, InferenceModel, LocalClassifier, ModelLoader};
pub use remote::{interpret_response, RemoteClassifier};
pub use tract_model::TractLoader;

#[async_trait]
pub trait Classifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prepare any model the strategy needs. Strategies without one succeed.
    async fn load_model(&self) -> Result<()> {
        Ok(())
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn classify(&self, frame: &StillFrame) -> Result<ClassificationResult>;
}

#[async_trait]
impl<T: Classifier + ?Sized> Classifier for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn load_model(&self) -> Result<()> {
        (**self).load_model().await
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    async fn classify(&self, frame: &StillFrame) -> Result<ClassificationResult> {
        (**self).classify(frame).await
    }
}

#[async_trait]
impl<T: Classifier + ?Sized> Classifier for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn load_model(&self) -> Result<()> {
        (**self).load_model().await
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    async fn classify(&self, frame: &StillFrame) -> Result<ClassificationResult> {
        (**self).classify(frame).await
    }
}

/// Build the strategy selected by configuration.
pub fn classifier_from_config(config: &PilahConfig) -> Box<dyn Classifier> {
    match config.classifier.strategy {
        ClassifierStrategy::Remote => Box::new(RemoteClassifier::new(
            config.classifier.remote.clone(),
            config.vision.jpeg_quality,
        )),
        ClassifierStrategy::Local => Box::new(LocalClassifier::new(
            config.classifier.local.clone(),
            Arc::new(TractLoader),
        )),
    }
}

pub fn network_error(message: impl Into<String>) -> PilahError {
    PilahError::NetworkFailure(message.into())
}

pub fn inference_error(message: impl Into<String>) -> PilahError {
    PilahError::InferenceFailure(message.into())
}
