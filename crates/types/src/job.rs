// crates/types/src/job.rs
//! The flash job record shared between the registry and its consumers.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::stage::FlashStage;

/// Opaque job identifier. ULID in practice: time-ordered, globally
/// unique within the process lifetime, URL-safe.
pub type JobId = String;

/// One user-initiated flashing attempt.
///
/// `stages` preserves the caller-supplied order; the key set is fixed
/// at creation and only stage contents mutate afterwards. `cancelled`
/// is monotonic (false to true, never reset). `error` carries failures
/// that cannot be attributed to any stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../ui/src/types/generated/")]
#[serde(rename_all = "camelCase")]
pub struct FlashJob {
    pub id: JobId,
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub stages: IndexMap<String, FlashStage>,
}

impl FlashJob {
    /// Build a job with every named stage in its default state.
    pub fn new(id: JobId, stage_names: &[&str]) -> Self {
        Self {
            id,
            cancelled: false,
            error: None,
            created_at: Utc::now(),
            stages: stage_names
                .iter()
                .map(|name| (name.to_string(), FlashStage::default()))
                .collect(),
        }
    }

    pub fn stage(&self, name: &str) -> Option<&FlashStage> {
        self.stages.get(name)
    }
}
