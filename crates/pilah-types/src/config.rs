use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{classification::ConfidenceScale, vision::FacingMode, PilahError, Result};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000/predict";
pub const DEFAULT_MODEL_PATH: &str = "models/waste_classifier.onnx";
pub const DEFAULT_INPUT_SIZE: u32 = 224;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraSourceKind {
    /// Generated test pattern.
    #[default]
    Synthetic,
    /// Image file, or a directory of images served round-robin.
    Still,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub source: CameraSourceKind,
    pub facing: FacingMode,
    /// Draw the frozen frame mirrored, matching a selfie-style preview.
    pub mirror: bool,
    pub width: u32,
    pub height: u32,
    pub still_path: Option<String>,
    /// Time a new synthetic stream needs before it has buffered a frame.
    pub warmup_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: CameraSourceKind::Synthetic,
            facing: FacingMode::Environment,
            mirror: true,
            width: 640,
            height: 480,
            still_path: None,
            warmup_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub jpeg_quality: u8,
    pub capture_dir: Option<String>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            capture_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierStrategy {
    #[default]
    Remote,
    Local,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    /// `{"image": "data:image/jpeg;base64,..."}`
    #[default]
    Json,
    /// multipart/form-data with a `file` field.
    Multipart,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub payload: PayloadEncoding,
    pub confidence_scale: ConfidenceScale,
    pub timeout_ms: Option<u64>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            payload: PayloadEncoding::Json,
            confidence_scale: ConfidenceScale::Unit,
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub model_path: String,
    pub input_size: u32,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            model_path: DEFAULT_MODEL_PATH.into(),
            input_size: DEFAULT_INPUT_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub strategy: ClassifierStrategy,
    pub remote: RemoteConfig,
    pub local: LocalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub log_level: String,
    /// Log destination; stdout when unset.
    pub log_file: Option<String>,
    /// JSON dump of session telemetry written on shutdown.
    pub telemetry_file: Option<String>,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_file: None,
            telemetry_file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PilahConfig {
    pub camera: CameraConfig,
    pub vision: VisionConfig,
    pub classifier: ClassifierConfig,
    pub ops: OpsConfig,
}

impl PilahConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            PilahError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            PilahError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.vision.jpeg_quality) {
            return Err(PilahError::Configuration(
                "vision.jpeg_quality must be between 1 and 100".into(),
            ));
        }
        if self.classifier.strategy == ClassifierStrategy::Remote
            && self.classifier.remote.endpoint.trim().is_empty()
        {
            return Err(PilahError::Configuration(
                "classifier.remote.endpoint must be set for the remote strategy".into(),
            ));
        }
        if self.classifier.local.input_size == 0 {
            return Err(PilahError::Configuration(
                "classifier.local.input_size must be greater than zero".into(),
            ));
        }
        match self.camera.source {
            CameraSourceKind::Synthetic => {
                if self.camera.width == 0 || self.camera.height == 0 {
                    return Err(PilahError::Configuration(
                        "camera.width and camera.height must be greater than zero".into(),
                    ));
                }
            }
            CameraSourceKind::Still => {
                if self.camera.still_path.is_none() {
                    return Err(PilahError::Configuration(
                        "camera.still_path is required for the still source".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// One-line description for status bars and startup logs.
    pub fn summary(&self) -> String {
        let classifier = match self.classifier.strategy {
            ClassifierStrategy::Remote => format!("remote {}", self.classifier.remote.endpoint),
            ClassifierStrategy::Local => format!("local {}", self.classifier.local.model_path),
        };
        format!(
            "camera={:?}/{} classifier={}",
            self.camera.source,
            self.camera.facing.as_str(),
            classifier
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn load_pilah_config_from_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("pilah.toml");
        let mut config = PilahConfig::default();
        config.classifier.strategy = ClassifierStrategy::Local;
        config.classifier.local.model_path = "models/custom.onnx".into();
        config.classifier.remote.confidence_scale = ConfidenceScale::Percent;
        config.camera.facing = FacingMode::User;

        let doc = toml::to_string(&config).expect("serialize config");
        fs::write(&path, doc).expect("write temp config");

        let loaded = PilahConfig::from_file(&path).expect("load config");
        assert_eq!(loaded.classifier.strategy, ClassifierStrategy::Local);
        assert_eq!(loaded.classifier.local.model_path, "models/custom.onnx");
        assert_eq!(
            loaded.classifier.remote.confidence_scale,
            ConfidenceScale::Percent
        );
        assert_eq!(loaded.camera.facing, FacingMode::User);
    }

    #[test]
    fn partial_documents_fall_back_to_defaults() {
        let doc = r#"
            [classifier]
            strategy = "remote"

            [classifier.remote]
            endpoint = "http://classifier.local/predict"
            payload = "multipart"
        "#;
        let config: PilahConfig = toml::from_str(doc).expect("parse");
        assert_eq!(config.classifier.remote.payload, PayloadEncoding::Multipart);
        assert_eq!(config.vision.jpeg_quality, DEFAULT_JPEG_QUALITY);
        assert_eq!(config.classifier.local.input_size, DEFAULT_INPUT_SIZE);
        assert!(config.camera.mirror);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = PilahConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, PilahError::Configuration(_)));
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }

    #[test]
    fn validate_configuration_rules() {
        let mut config = PilahConfig::default();
        assert!(config.validate().is_ok());

        config.vision.jpeg_quality = 0;
        assert!(config.validate().is_err());
        config.vision.jpeg_quality = 101;
        assert!(config.validate().is_err());
        config.vision.jpeg_quality = 90;

        config.classifier.remote.endpoint = "  ".into();
        assert!(config.validate().is_err());
        config.classifier.strategy = ClassifierStrategy::Local;
        assert!(config.validate().is_ok());

        config.classifier.local.input_size = 0;
        assert!(config.validate().is_err());
        config.classifier.local.input_size = 224;

        config.camera.width = 0;
        assert!(config.validate().is_err());
        config.camera.width = 640;

        config.camera.source = CameraSourceKind::Still;
        assert!(config.validate().is_err());
        config.camera.still_path = Some("samples/leaf.jpg".into());
        assert!(config.validate().is_ok());
    }
}
