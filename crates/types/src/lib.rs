// crates/types/src/lib.rs
//! Shared data model for the flash job system.
//!
//! Wire types are camelCase over serde and exported to TypeScript via
//! ts-rs for the front end.

pub mod job;
pub mod stage;

pub use job::{FlashJob, JobId};
pub use stage::{
    FlashStage, StageUpdate, STAGE_CONNECT, STAGE_DOWNLOAD, STAGE_ERASE, STAGE_FLASH,
};
