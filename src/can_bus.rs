use crate::types::ReplayFrame;
use std::fmt;
use tokio::sync::broadcast;

/// Bus write failures, split by whether the caller should retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Transient condition (controller busy, queue full); retry the write
    Busy,
    /// The frame itself is unacceptable; retrying cannot help
    Rejected(String),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::Busy => write!(f, "bus busy, write should be retried"),
            BusError::Rejected(reason) => write!(f, "frame rejected: {}", reason),
        }
    }
}

impl std::error::Error for BusError {}

/// Seam to the hardware bus access layer. The replay core never opens or
/// tears down a channel itself; it is handed one already on-bus and only
/// writes frames to it.
pub trait BusChannel: Send + Sync {
    fn write_frame(&self, frame: &ReplayFrame) -> Result<(), BusError>;
}

/// Virtual CAN bus
/// Uses a broadcast channel to simulate a real bus where all nodes see all
/// messages. Stands in for a physical channel in tests and demo runs.
#[derive(Clone)]
pub struct VirtualCanBus {
    tx: broadcast::Sender<ReplayFrame>,
}

impl VirtualCanBus {
    /// Create a new virtual bus with a specified buffer size
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _rx) = broadcast::channel(buffer_size);
        Self { tx }
    }

    /// Subscribe to receive frames from the bus
    pub fn subscribe(&self) -> broadcast::Receiver<ReplayFrame> {
        self.tx.subscribe()
    }

    /// Get the number of active receivers
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl BusChannel for VirtualCanBus {
    fn write_frame(&self, frame: &ReplayFrame) -> Result<(), BusError> {
        if !frame.is_valid() {
            return Err(BusError::Rejected(format!(
                "data length {} exceeds 8 bytes",
                frame.data.len()
            )));
        }
        // a bus with no listeners accepts and drops the frame, like real
        // hardware with no other node on the wire
        let _ = self.tx.send(frame.clone());
        Ok(())
    }
}
