// crates/jobs/src/flasher.rs
//! Stage mapper: drives one DFU write operation and translates the
//! transport's event stream into `erase`/`flash` stage updates.

use txflash_types::{JobId, StageUpdate, STAGE_ERASE, STAGE_FLASH};

use crate::registry::JobRegistry;
use crate::transport::{DfuTransport, TransportEvent};

/// Fallback block size when the device does not report a transfer
/// capability.
pub const DEFAULT_BLOCK_SIZE: u32 = 1024;

/// Flash `firmware` through an open transport, mapping protocol events
/// onto the job's `erase` and `flash` stages.
///
/// Returns `true` on completion, `false` on any error. Error detail is
/// recorded only on the failing stage's `error` field; callers needing
/// diagnostics must read job state, not the return value.
pub async fn flash(
    registry: &JobRegistry,
    job_id: &JobId,
    transport: &dyn DfuTransport,
    firmware: &[u8],
) -> bool {
    let block_size = transport.transfer_size().unwrap_or(DEFAULT_BLOCK_SIZE);
    let total_bytes = firmware.len() as f64;

    let mut events = match transport.write(block_size, firmware.to_vec(), true).await {
        Ok(events) => events,
        Err(e) => {
            registry.update_stage(job_id, STAGE_ERASE, StageUpdate::error(e.to_string()));
            return false;
        }
    };

    // Errors are attributed to whichever stage the cursor points at;
    // it moves from erase to flash on the first write-start event.
    let mut active = STAGE_ERASE;

    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::EraseStart => {
                registry.update_stage(job_id, STAGE_ERASE, StageUpdate::started());
            }
            TransportEvent::EraseProgress(bytes) => {
                registry.update_stage(
                    job_id,
                    STAGE_ERASE,
                    StageUpdate::progress(percent(bytes, total_bytes)),
                );
            }
            TransportEvent::EraseEnd => {
                registry.update_stage(job_id, STAGE_ERASE, StageUpdate::completed());
            }
            TransportEvent::WriteStart => {
                active = STAGE_FLASH;
                registry.update_stage(job_id, STAGE_FLASH, StageUpdate::started());
            }
            TransportEvent::WriteProgress(bytes) => {
                registry.update_stage(
                    job_id,
                    STAGE_FLASH,
                    StageUpdate::progress(percent(bytes, total_bytes)),
                );
            }
            TransportEvent::End => {
                registry.update_stage(job_id, STAGE_FLASH, StageUpdate::completed());
                return true;
            }
            TransportEvent::Error(message) => {
                registry.update_stage(job_id, active, StageUpdate::error(message));
                return false;
            }
        }
    }

    // The stream ended without a terminal event: the transport went
    // away, typically because a cancellation closed it mid-operation.
    registry.update_stage(
        job_id,
        active,
        StageUpdate::error("transport closed before the operation finished"),
    );
    false
}

fn percent(bytes: u64, total_bytes: f64) -> f64 {
    if total_bytes <= 0.0 {
        return 0.0;
    }
    bytes as f64 / total_bytes * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use txflash_types::STAGE_CONNECT;

    use crate::transport::TransportError;

    /// Transport stub that replays a scripted event sequence.
    struct ScriptedTransport {
        transfer_size: Option<u32>,
        events: Mutex<Vec<TransportEvent>>,
        fail_write: bool,
        last_block_size: Mutex<Option<u32>>,
    }

    impl ScriptedTransport {
        fn new(events: Vec<TransportEvent>) -> Arc<Self> {
            Arc::new(Self {
                transfer_size: None,
                events: Mutex::new(events),
                fail_write: false,
                last_block_size: Mutex::new(None),
            })
        }

        fn with_transfer_size(events: Vec<TransportEvent>, size: u32) -> Arc<Self> {
            Arc::new(Self {
                transfer_size: Some(size),
                events: Mutex::new(events),
                fail_write: false,
                last_block_size: Mutex::new(None),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                transfer_size: None,
                events: Mutex::new(Vec::new()),
                fail_write: true,
                last_block_size: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl DfuTransport for ScriptedTransport {
        fn transfer_size(&self) -> Option<u32> {
            self.transfer_size
        }

        async fn write(
            &self,
            block_size: u32,
            _firmware: Vec<u8>,
            _reset: bool,
        ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
            *self.last_block_size.lock().unwrap() = Some(block_size);
            if self.fail_write {
                return Err(TransportError::Write {
                    message: "device not in DFU mode".to_string(),
                });
            }
            let events: Vec<TransportEvent> = self.events.lock().unwrap().drain(..).collect();
            let (tx, rx) = mpsc::channel(64);
            for event in events {
                tx.send(event).await.unwrap();
            }
            Ok(rx)
        }

        async fn close(&self) {}
    }

    fn registry_with_job() -> (JobRegistry, JobId) {
        let registry = JobRegistry::new();
        let job = registry.create_job(&[STAGE_CONNECT, STAGE_ERASE, STAGE_FLASH]);
        (registry, job.id)
    }

    #[tokio::test]
    async fn test_full_sequence_completes_both_stages() {
        let (registry, id) = registry_with_job();
        let transport = ScriptedTransport::new(vec![
            TransportEvent::EraseStart,
            TransportEvent::EraseProgress(100),
            TransportEvent::EraseEnd,
            TransportEvent::WriteStart,
            TransportEvent::WriteProgress(100),
            TransportEvent::WriteProgress(200),
            TransportEvent::End,
        ]);

        let ok = flash(&registry, &id, transport.as_ref(), &[0u8; 200]).await;
        assert!(ok);

        let job = registry.get_job(&id).unwrap();
        let erase = job.stage(STAGE_ERASE).unwrap();
        assert!(erase.started && erase.completed);
        assert_eq!(erase.progress, 100.0);
        let flash_stage = job.stage(STAGE_FLASH).unwrap();
        assert!(flash_stage.started && flash_stage.completed);
        assert_eq!(flash_stage.progress, 100.0);
    }

    #[tokio::test]
    async fn test_erase_progress_is_scaled_by_image_size() {
        // 200-byte image, 50 bytes erased: 25%.
        let (registry, id) = registry_with_job();
        let transport = ScriptedTransport::new(vec![
            TransportEvent::EraseStart,
            TransportEvent::EraseProgress(50),
            TransportEvent::Error("interrupted".to_string()),
        ]);

        flash(&registry, &id, transport.as_ref(), &[0u8; 200]).await;

        let job = registry.get_job(&id).unwrap();
        assert_eq!(job.stage(STAGE_ERASE).unwrap().progress, 25.0);
    }

    #[tokio::test]
    async fn test_error_after_write_start_lands_on_flash_stage() {
        let (registry, id) = registry_with_job();
        let transport = ScriptedTransport::new(vec![
            TransportEvent::EraseStart,
            TransportEvent::EraseEnd,
            TransportEvent::WriteStart,
            TransportEvent::Error("bad ack".to_string()),
        ]);

        let ok = flash(&registry, &id, transport.as_ref(), &[0u8; 200]).await;
        assert!(!ok);

        let job = registry.get_job(&id).unwrap();
        assert_eq!(job.stage(STAGE_FLASH).unwrap().error.as_deref(), Some("bad ack"));
        // The erase stage keeps its completed state.
        let erase = job.stage(STAGE_ERASE).unwrap();
        assert!(erase.completed);
        assert!(erase.error.is_none());
    }

    #[tokio::test]
    async fn test_error_before_write_start_lands_on_erase_stage() {
        let (registry, id) = registry_with_job();
        let transport = ScriptedTransport::new(vec![
            TransportEvent::EraseStart,
            TransportEvent::Error("erase timeout".to_string()),
        ]);

        let ok = flash(&registry, &id, transport.as_ref(), &[0u8; 64]).await;
        assert!(!ok);

        let job = registry.get_job(&id).unwrap();
        assert_eq!(
            job.stage(STAGE_ERASE).unwrap().error.as_deref(),
            Some("erase timeout")
        );
        assert!(job.stage(STAGE_FLASH).unwrap().error.is_none());
    }

    #[tokio::test]
    async fn test_failed_write_call_is_attributed_to_erase() {
        let (registry, id) = registry_with_job();
        let transport = ScriptedTransport::failing();

        let ok = flash(&registry, &id, transport.as_ref(), &[0u8; 64]).await;
        assert!(!ok);

        let job = registry.get_job(&id).unwrap();
        let erase = job.stage(STAGE_ERASE).unwrap();
        assert!(erase.error.as_deref().unwrap().contains("device not in DFU mode"));
    }

    #[tokio::test]
    async fn test_stream_ending_without_terminal_event_fails() {
        let (registry, id) = registry_with_job();
        let transport = ScriptedTransport::new(vec![
            TransportEvent::EraseStart,
            TransportEvent::EraseEnd,
            TransportEvent::WriteStart,
        ]);

        let ok = flash(&registry, &id, transport.as_ref(), &[0u8; 64]).await;
        assert!(!ok);

        let job = registry.get_job(&id).unwrap();
        assert!(job
            .stage(STAGE_FLASH)
            .unwrap()
            .error
            .as_deref()
            .unwrap()
            .contains("transport closed"));
    }

    #[tokio::test]
    async fn test_block_size_prefers_device_capability() {
        let (registry, id) = registry_with_job();
        let transport =
            ScriptedTransport::with_transfer_size(vec![TransportEvent::End], 4096);
        flash(&registry, &id, transport.as_ref(), &[0u8; 8]).await;
        assert_eq!(*transport.last_block_size.lock().unwrap(), Some(4096));

        let transport = ScriptedTransport::new(vec![TransportEvent::End]);
        flash(&registry, &id, transport.as_ref(), &[0u8; 8]).await;
        assert_eq!(
            *transport.last_block_size.lock().unwrap(),
            Some(DEFAULT_BLOCK_SIZE)
        );
    }
}
