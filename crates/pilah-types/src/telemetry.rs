use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timing of one capture, from the freeze through the classifier reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleLatency {
    pub freeze_ms: u64,
    pub classify_ms: u64,
    pub total_ms: u64,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionTelemetry {
    pub latency_samples: Vec<CycleLatency>,
    pub results: u64,
    pub failures: u64,
}
