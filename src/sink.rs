use crate::can_bus::{BusChannel, BusError};
use crate::network::send_line;
use crate::types::{FrameClass, LabeledRecord};
use chrono::{DateTime, Utc};
use colored::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Header line of the persistence log
pub const LOG_HEADER: &str = "Sequence,Timestamp,Arbitration_ID,DLC,Data,Class";

/// How often a retryable bus write is retried before the frame is dropped
const BUS_WRITE_RETRIES: u32 = 3;

/// The mirror socket, shared between the injection listener (which opens and
/// reopens it after each accepted producer) and the sink (which sends on it
/// and disables it on failure).
pub type SharedMirror = Arc<Mutex<Option<TcpStream>>>;

/// Fatal sink failure: the operation that failed plus the underlying cause
#[derive(Debug)]
pub struct SinkError {
    operation: &'static str,
    cause: std::io::Error,
}

impl SinkError {
    pub fn new(operation: &'static str, cause: std::io::Error) -> Self {
        Self { operation, cause }
    }

    pub fn operation(&self) -> &str {
        self.operation
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to {}: {}", self.operation, self.cause)
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Ground-truth persistence log: one flushed CSV line per emitted record.
/// Opened once before the run starts, closed at run end.
pub struct LabelLog {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl LabelLog {
    pub fn create<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", LOG_HEADER)?;
        writer.flush()?;
        Ok(Self {
            writer,
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush, so the log is valid up to the last
    /// emitted frame even on abnormal termination.
    pub fn append(&mut self, record: &LabeledRecord) -> std::io::Result<()> {
        writeln!(self.writer, "{}", record.log_record())?;
        self.writer.flush()
    }

    pub fn finish(mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// End-of-run summary written next to the persistence log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub capture_path: String,
    pub run_speed: f64,
    pub normal_frames: u64,
    pub attack_frames: u64,
    /// Injected messages still pending when the capture ran out
    pub dropped_pending: u64,
    pub wall_seconds: f64,
    pub interrupted: bool,
}

impl RunSummary {
    /// Save to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let json = serde_json::to_string_pretty(&self).map_err(|e| e.to_string())?;
        std::fs::write(path.as_ref(), json).map_err(|e| {
            format!(
                "Failed to write run summary to {}: {}",
                path.as_ref().display(),
                e
            )
        })?;

        println!(
            "{} Run summary saved to {}",
            "✓".green(),
            path.as_ref().display().to_string().bright_white()
        );
        Ok(())
    }

    /// Load from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let json = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            format!(
                "Failed to read run summary from {}: {}",
                path.as_ref().display(),
                e
            )
        })?;
        serde_json::from_str(&json).map_err(|e| format!("Failed to parse run summary: {}", e))
    }
}

/// Fan-out of the merged, labeled stream.
///
/// The primary observer gets every record and its failure is fatal. The
/// mirror gets only the Attack contribution and failures merely disable it
/// until the listener's next successful reconnect. The persistence log gets
/// every record, flushed per line. An optional bus channel receives each
/// frame as a write-through.
pub struct StreamSink {
    primary: TcpStream,
    mirror: Option<SharedMirror>,
    log: Option<LabelLog>,
    bus: Option<Arc<dyn BusChannel>>,
}

impl StreamSink {
    /// Open the persistent outbound connection to the primary observer
    pub async fn connect(addr: &str) -> Result<Self, SinkError> {
        let primary = TcpStream::connect(addr)
            .await
            .map_err(|e| SinkError::new("connect to primary observer", e))?;
        Ok(Self {
            primary,
            mirror: None,
            log: None,
            bus: None,
        })
    }

    pub fn with_mirror(mut self, mirror: SharedMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn with_log(mut self, log: LabelLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_bus(mut self, bus: Arc<dyn BusChannel>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Deliver one record to every configured destination.
    ///
    /// Primary and log failures are fatal; mirror and bus failures are
    /// contained here.
    pub async fn deliver(&mut self, record: &LabeledRecord) -> Result<(), SinkError> {
        let line = record.wire_record();

        send_line(&mut self.primary, &line)
            .await
            .map_err(|e| SinkError::new("send to primary observer", e))?;

        if record.class == FrameClass::Attack {
            if let Some(mirror) = &self.mirror {
                let mut slot = mirror.lock().await;
                if let Some(stream) = slot.as_mut() {
                    if let Err(e) = send_line(stream, &line).await {
                        println!(
                            "{} Mirror send failed ({}), mirror disabled until next producer connect",
                            "⚠".yellow(),
                            e
                        );
                        *slot = None;
                    }
                }
            }
        }

        if let Some(log) = &mut self.log {
            log.append(record)
                .map_err(|e| SinkError::new("append to persistence log", e))?;
        }

        if let Some(bus) = self.bus.clone() {
            self.write_bus(bus, record).await;
        }

        Ok(())
    }

    /// Bounded retry on transient bus errors, matching a real channel that
    /// reports busy while its transmit queue drains.
    async fn write_bus(&self, bus: Arc<dyn BusChannel>, record: &LabeledRecord) {
        let mut attempts = 0;
        loop {
            match bus.write_frame(&record.frame) {
                Ok(()) => return,
                Err(BusError::Busy) if attempts < BUS_WRITE_RETRIES => {
                    attempts += 1;
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                Err(e) => {
                    println!(
                        "{} Bus write dropped frame {}: {}",
                        "⚠".yellow(),
                        record.frame.id_hex(),
                        e
                    );
                    return;
                }
            }
        }
    }

    /// Flush and close everything. Called on both normal completion and
    /// interrupt.
    pub async fn finish(mut self) -> Result<(), SinkError> {
        if let Some(log) = self.log.take() {
            log.finish()
                .map_err(|e| SinkError::new("flush persistence log", e))?;
        }
        use tokio::io::AsyncWriteExt;
        self.primary.shutdown().await.ok();
        if let Some(mirror) = &self.mirror {
            *mirror.lock().await = None;
        }
        Ok(())
    }
}
