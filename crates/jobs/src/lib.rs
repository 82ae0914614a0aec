// crates/jobs/src/lib.rs
//! Flash job orchestration for USB-attached radio transmitters.
//!
//! Provides:
//! - `JobRegistry` — in-memory job store, the single serialization
//!   point for state mutation
//! - `CoalescingPublisher` — debounced job-state notifications
//! - `flasher` — maps DFU transport events onto erase/flash stages
//! - `orchestrator::start_execution` — drives the connect → download →
//!   erase/write lifecycle with best-effort cancellation
//!
//! The byte-level DFU transport and the firmware store are consumed
//! through the traits in `transport` and `firmware`; this crate never
//! talks to hardware directly.

pub mod error;
pub mod firmware;
pub mod flasher;
pub mod orchestrator;
pub mod publisher;
pub mod registry;
pub mod transport;

pub use error::JobError;
pub use firmware::{FirmwareError, FirmwareSpec, FirmwareStore};
pub use orchestrator::{start_execution, Collaborators};
pub use publisher::{CoalescingPublisher, DEFAULT_DEBOUNCE_WINDOW};
pub use registry::JobRegistry;
pub use transport::{
    DfuTransport, TransportError, TransportEvent, TransportFactory, UsbDeviceInfo,
};
