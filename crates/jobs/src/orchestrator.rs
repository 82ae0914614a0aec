// crates/jobs/src/orchestrator.rs
//! Per-job lifecycle driver: connect, optional download, then the
//! erase/write operation, as one cooperative task per job.
//!
//! Cancellation is wired through the coalescing publisher, so it is
//! best-effort: a cancelled job's task still runs to its next check
//! point (after connect, after download) or until the transport reacts
//! to the close request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;

use txflash_types::{FlashJob, JobId, StageUpdate, STAGE_CONNECT, STAGE_DOWNLOAD};

use crate::error::JobError;
use crate::firmware::{FirmwareSpec, FirmwareStore};
use crate::flasher;
use crate::registry::JobRegistry;
use crate::transport::{DfuTransport, TransportFactory, UsbDeviceInfo};

/// External collaborators resolved by the caller.
#[derive(Clone)]
pub struct Collaborators {
    pub transport_factory: Arc<dyn TransportFactory>,
    pub firmware_store: Arc<dyn FirmwareStore>,
}

type TransportSlot = Arc<tokio::sync::Mutex<Option<Arc<dyn DfuTransport>>>>;

/// Start executing a previously created job.
///
/// Returns the handle of the spawned task so callers can await or
/// abort it; progress and failures are observed only through
/// `JobRegistry::get_job` and subscriptions, never through the handle.
pub fn start_execution(
    registry: Arc<JobRegistry>,
    job_id: JobId,
    device: UsbDeviceInfo,
    firmware: FirmwareSpec,
    collaborators: Collaborators,
) -> JoinHandle<()> {
    if registry.get_job(&job_id).is_none() {
        tracing::warn!(job_id = %job_id, "start_execution for unknown job id");
        return tokio::spawn(async {});
    }

    let cancelled = Arc::new(AtomicBool::new(false));
    let transport_slot: TransportSlot = Arc::default();

    // Subscribe before the first stage update so no cancellation can
    // slip past the listener.
    let updates = registry.subscribe(&job_id);
    let listener = spawn_cancellation_listener(
        updates,
        Arc::clone(&cancelled),
        Arc::clone(&transport_slot),
    );

    tokio::spawn(async move {
        let outcome = run(
            &registry,
            &job_id,
            &device,
            firmware,
            &collaborators,
            &cancelled,
            &transport_slot,
        )
        .await;

        // Close is idempotent per the transport contract, so closing
        // again after a cancellation-triggered close is safe.
        if let Some(transport) = transport_slot.lock().await.take() {
            transport.close().await;
        }
        listener.abort();

        if let Err(e) = outcome {
            tracing::error!(job_id = %job_id, error = %e, "flash job failed outside any stage");
            registry.record_internal_error(&job_id, e.to_string());
        }
    })
}

/// Watches published job state; on `cancelled` it raises the local
/// flag, closes the transport if one is open, and ends (which is the
/// unsubscribe).
fn spawn_cancellation_listener(
    mut updates: Receiver<FlashJob>,
    cancelled: Arc<AtomicBool>,
    transport_slot: TransportSlot,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(job) if job.cancelled => {
                    cancelled.store(true, Ordering::SeqCst);
                    if let Some(transport) = transport_slot.lock().await.as_ref() {
                        transport.close().await;
                    }
                    break;
                }
                Ok(_) => {}
                // Only the latest state matters to this listener.
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn run(
    registry: &JobRegistry,
    job_id: &JobId,
    device: &UsbDeviceInfo,
    firmware: FirmwareSpec,
    collaborators: &Collaborators,
    cancelled: &AtomicBool,
    transport_slot: &TransportSlot,
) -> Result<(), JobError> {
    registry.update_stage(job_id, STAGE_CONNECT, StageUpdate::started());

    let transport = match collaborators.transport_factory.connect(device).await {
        Ok(transport) => transport,
        Err(e) => {
            // A connect error that lands while cancellation arrives is
            // still recorded; both are observable on the job.
            registry.update_stage(job_id, STAGE_CONNECT, StageUpdate::error(e.to_string()));
            return Ok(());
        }
    };
    *transport_slot.lock().await = Some(Arc::clone(&transport));
    registry.update_stage(job_id, STAGE_CONNECT, StageUpdate::completed());

    if cancelled.load(Ordering::SeqCst) {
        return Ok(());
    }

    let data = match firmware.data {
        Some(data) => data,
        None => {
            registry.update_stage(job_id, STAGE_DOWNLOAD, StageUpdate::started());
            let url = firmware
                .url
                .as_deref()
                .ok_or(JobError::MissingFirmwareSource)?;
            match collaborators
                .firmware_store
                .fetch_firmware(url, &firmware.target)
                .await
            {
                Ok(data) => {
                    registry.update_stage(job_id, STAGE_DOWNLOAD, StageUpdate::completed());
                    if cancelled.load(Ordering::SeqCst) {
                        return Ok(());
                    }
                    data
                }
                Err(e) => {
                    registry.update_stage(
                        job_id,
                        STAGE_DOWNLOAD,
                        StageUpdate::error(e.to_string()),
                    );
                    return Ok(());
                }
            }
        }
    };

    flasher::flash(registry, job_id, transport.as_ref(), &data).await;
    Ok(())
}
