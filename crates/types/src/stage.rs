// crates/types/src/stage.rs
//! Per-stage state for a flash job, with the partial-update merge used
//! by the registry.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Stage names used by the flashing pipeline. Callers pick the subset
/// a job needs at creation time; the set is fixed afterwards.
pub const STAGE_CONNECT: &str = "connect";
pub const STAGE_DOWNLOAD: &str = "download";
pub const STAGE_ERASE: &str = "erase";
pub const STAGE_FLASH: &str = "flash";

/// One named phase of a flash job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../ui/src/types/generated/")]
#[serde(rename_all = "camelCase")]
pub struct FlashStage {
    pub started: bool,
    pub completed: bool,
    /// Percentage in [0, 100].
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Partial update for one stage: fields that are present overwrite,
/// absent fields are preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageUpdate {
    pub started: Option<bool>,
    pub completed: Option<bool>,
    pub progress: Option<f64>,
    pub error: Option<String>,
}

impl StageUpdate {
    pub fn started() -> Self {
        Self {
            started: Some(true),
            ..Self::default()
        }
    }

    pub fn completed() -> Self {
        Self {
            completed: Some(true),
            ..Self::default()
        }
    }

    pub fn progress(percent: f64) -> Self {
        Self {
            progress: Some(percent),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

impl FlashStage {
    /// Merge a partial update while enforcing the stage invariants:
    ///
    /// - progress clamps to [0, 100] and never decreases;
    /// - completion forces progress to 100 and freezes the stage, so
    ///   later progress or error writes are ignored;
    /// - error and completion are mutually exclusive: the first
    ///   terminal state wins and is never overwritten.
    pub fn apply(&mut self, update: StageUpdate) {
        if let Some(started) = update.started {
            self.started = started;
        }

        // A completed stage is frozen at 100.
        if self.completed {
            return;
        }

        if let Some(percent) = update.progress {
            let percent = percent.clamp(0.0, 100.0);
            if percent > self.progress {
                self.progress = percent;
            }
        }

        if update.error.is_some() && self.error.is_none() {
            self.error = update.error;
        }

        if update.completed == Some(true) && self.error.is_none() {
            self.completed = true;
            self.progress = 100.0;
        }
    }
}
