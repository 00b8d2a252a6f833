use serde::{Deserialize, Serialize};

use crate::classification::{ClassificationFailure, ClassificationResult};

/// Position of a capture cycle in its state machine.
///
/// `Idle → Live → Stilled → Resulted | Failed → (retake) → Live`, and
/// `Idle → Unavailable` when the camera cannot be opened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum CycleState {
    #[default]
    Idle,
    Live,
    Stilled,
    Resulted(ClassificationResult),
    Failed(ClassificationFailure),
    Unavailable(String),
}

impl CycleState {
    pub fn phase(&self) -> CyclePhase {
        match self {
            CycleState::Idle => CyclePhase::Idle,
            CycleState::Live => CyclePhase::Live,
            CycleState::Stilled => CyclePhase::Stilled,
            CycleState::Resulted(_) => CyclePhase::Resulted,
            CycleState::Failed(_) => CyclePhase::Failed,
            CycleState::Unavailable(_) => CyclePhase::Unavailable,
        }
    }

    pub fn can_capture(&self) -> bool {
        matches!(self, CycleState::Live)
    }

    /// Retake is offered once a still exists or the camera could not start.
    pub fn can_retake(&self) -> bool {
        matches!(
            self,
            CycleState::Resulted(_) | CycleState::Failed(_) | CycleState::Unavailable(_)
        )
    }
}

/// Payload-free view of [`CycleState`] used in events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CyclePhase {
    Idle,
    Live,
    Stilled,
    Resulted,
    Failed,
    Unavailable,
}
