//! Operational helpers: logging and telemetry persistence.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::Arc,
};

use pilah_types::{
    config::OpsConfig,
    events::{CycleEvent, EventPayload},
    telemetry::{CycleLatency, SessionTelemetry},
    PilahError, Result,
};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| PilahError::Ops(format!("failed to create log filter: {err}")))?;

    match &config.log_file {
        Some(path) => {
            ensure_parent_dir(path)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| PilahError::Ops(format!("failed to open log file {path}: {err}")))?;
            fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .try_init()
                .map_err(|err| PilahError::Ops(format!("tracing init error: {err}")))?;
        }
        None => {
            fmt()
                .with_env_filter(filter)
                .try_init()
                .map_err(|err| PilahError::Ops(format!("tracing init error: {err}")))?;
        }
    }
    Ok(())
}

/// In-memory telemetry for one process lifetime.
#[derive(Clone, Default)]
pub struct TelemetryStore {
    events: Arc<Mutex<Vec<CycleEvent>>>,
    session: Arc<Mutex<SessionTelemetry>>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_event(&self, event: CycleEvent) -> Result<()> {
        {
            let mut session = self.session.lock().await;
            match &event.payload {
                EventPayload::Result(_) => session.results += 1,
                EventPayload::Failure(_) => session.failures += 1,
                _ => {}
            }
        }
        self.events.lock().await.push(event);
        Ok(())
    }

    pub async fn record_latency(&self, sample: CycleLatency) -> Result<()> {
        self.session.lock().await.latency_samples.push(sample);
        Ok(())
    }

    pub async fn snapshot_events(&self) -> Vec<CycleEvent> {
        self.events.lock().await.clone()
    }

    pub async fn session(&self) -> SessionTelemetry {
        self.session.lock().await.clone()
    }

    /// Write the session summary as pretty JSON.
    pub async fn export_json(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref().to_path_buf();
        ensure_parent_dir(&path)?;
        let session = self.session().await;
        let doc = serde_json::to_string_pretty(&session)
            .map_err(|err| PilahError::Ops(format!("failed to serialize telemetry: {err}")))?;
        fs::write(&path, doc)
            .map_err(|err| PilahError::Ops(format!("failed to write telemetry: {err}")))?;
        info!("Telemetry written to {:?}", path);
        Ok(path)
    }
}

pub fn ensure_parent_dir(path: impl AsRef<Path>) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|err| PilahError::Ops(format!("failed to create dir {:?}: {err}", parent)))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pilah_types::{
        classification::{ClassificationFailure, ClassificationResult, WasteCategory},
        ErrorKind,
    };

    #[tokio::test]
    async fn counts_results_and_failures() {
        let store = TelemetryStore::new();
        let result = ClassificationResult::new(WasteCategory::Organik, 0.7).expect("result");
        store
            .record_event(CycleEvent::new(EventPayload::Result(result)))
            .await
            .expect("record");
        store
            .record_event(CycleEvent::new(EventPayload::Failure(
                ClassificationFailure::new(ErrorKind::NetworkFailure, "offline"),
            )))
            .await
            .expect("record");
        store
            .record_event(CycleEvent::new(EventPayload::Status("idle".into())))
            .await
            .expect("record");

        let session = store.session().await;
        assert_eq!(session.results, 1);
        assert_eq!(session.failures, 1);
        assert_eq!(store.snapshot_events().await.len(), 3);
    }

    #[tokio::test]
    async fn exports_session_json() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = TelemetryStore::new();
        store
            .record_latency(CycleLatency {
                freeze_ms: 2,
                classify_ms: 40,
                total_ms: 42,
                captured_at: Utc::now(),
            })
            .await
            .expect("latency");

        let path = store
            .export_json(dir.path().join("nested").join("telemetry.json"))
            .await
            .expect("export");
        let doc = fs::read_to_string(path).expect("read");
        let parsed: SessionTelemetry = serde_json::from_str(&doc).expect("parse");
        assert_eq!(parsed.latency_samples.len(), 1);
        assert_eq!(parsed.latency_samples[0].total_ms, 42);
    }
}
