use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    classification::{ClassificationFailure, ClassificationResult},
    cycle::CyclePhase,
};

/// Event kinds moving from the capture cycle to its adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    StateChanged,
    Status,
    Result,
    Failure,
    Notice,
}

/// Immutable event envelope for rendering, logging, and replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    StateChanged { from: CyclePhase, to: CyclePhase },
    /// Replacement text for the main status line.
    Status(String),
    Result(ClassificationResult),
    Failure(ClassificationFailure),
    /// Dismissible notification.
    Notice(String),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::StateChanged { .. } => EventKind::StateChanged,
            EventPayload::Status(_) => EventKind::Status,
            EventPayload::Result(_) => EventKind::Result,
            EventPayload::Failure(_) => EventKind::Failure,
            EventPayload::Notice(_) => EventKind::Notice,
        }
    }
}

impl CycleEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}
