// crates/jobs/src/transport.rs
//! Device-transport contract consumed by the flash pipeline.
//!
//! The byte-level DFU implementation lives behind these traits; the
//! core only consumes its event stream.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// USB device selector handed through to the transport factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    /// USB Vendor ID.
    pub vid: u16,
    /// USB Product ID.
    pub pid: u16,
    /// Device serial number (if available).
    pub serial_number: Option<String>,
}

/// Events emitted by one DFU write operation.
///
/// A well-behaved transport emits these in protocol order: erase-phase
/// events strictly precede write-phase events, and the stream ends
/// with either `End` or `Error`. Progress values are absolute byte
/// counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    EraseStart,
    EraseProgress(u64),
    EraseEnd,
    WriteStart,
    WriteProgress(u64),
    End,
    Error(String),
}

/// Errors surfaced by the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("DFU connect failed: {message}")]
    Connect { message: String },

    #[error("DFU write failed: {message}")]
    Write { message: String },

    #[error("DFU protocol error: {message}")]
    Protocol { message: String },
}

/// An open DFU connection to one device.
///
/// Each flash job owns its transport exclusively. `close` may race
/// with an in-flight write, so it must be idempotent and safe to call
/// repeatedly.
#[async_trait]
pub trait DfuTransport: Send + Sync {
    /// Device-reported maximum transfer size, if the device advertises
    /// one.
    fn transfer_size(&self) -> Option<u32>;

    /// Start one erase-and-write operation covering the whole image,
    /// optionally resetting the device afterwards. Events arrive on
    /// the returned channel in protocol order.
    async fn write(
        &self,
        block_size: u32,
        firmware: Vec<u8>,
        reset: bool,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError>;

    /// Close the connection. Idempotent.
    async fn close(&self);
}

/// Opens DFU connections to USB devices.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(&self, device: &UsbDeviceInfo)
        -> Result<Arc<dyn DfuTransport>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Connect {
            message: "device went away".to_string(),
        };
        assert_eq!(err.to_string(), "DFU connect failed: device went away");

        let err = TransportError::Write {
            message: "bad ack".to_string(),
        };
        assert!(err.to_string().contains("bad ack"));
    }
}
