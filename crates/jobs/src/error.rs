// crates/jobs/src/error.rs
//! Failures that escape every stage of a flash job.
//!
//! Stage-attributable errors never appear here; they are recorded as
//! messages on the failing stage and observed through job state.

use thiserror::Error;
use txflash_types::JobId;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("flash job not found: {0}")]
    JobNotFound(JobId),

    #[error("firmware spec carries neither inline data nor a download url")]
    MissingFirmwareSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_error_display() {
        let err = JobError::JobNotFound("01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string());
        assert!(err.to_string().contains("01ARZ3NDEKTSV4RRFFQ69G5FAV"));

        let err = JobError::MissingFirmwareSource;
        assert!(err.to_string().contains("neither"));
    }
}
