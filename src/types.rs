use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum payload size of a classical CAN frame
pub const MAX_FRAME_BYTES: usize = 8;

/// Ground-truth label attached to every emitted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameClass {
    /// Frame originated from the recorded capture
    Normal,
    /// Frame originated from the live injection stream
    Attack,
}

impl FrameClass {
    pub fn as_str(&self) -> &str {
        match self {
            FrameClass::Normal => "Normal",
            FrameClass::Attack => "Attack",
        }
    }
}

impl fmt::Display for FrameClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reasons a delimited frame row fails validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// Row did not split into exactly [timestamp, id, dlc, data]
    FieldCount(usize),
    /// Timestamp field is not a valid float
    Timestamp(String),
    /// Arbitration ID field is not valid hex
    ArbitrationId(String),
    /// DLC field is not a valid integer
    Dlc(String),
    /// DLC is outside 0..=8
    DlcRange(usize),
    /// A payload byte is not valid hex
    DataByte(String),
    /// Payload byte count does not match the DLC field
    DlcMismatch { dlc: usize, got: usize },
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::FieldCount(got) => {
                write!(f, "expected 4 fields (timestamp,id,dlc,data), got {}", got)
            }
            FieldError::Timestamp(raw) => write!(f, "invalid timestamp '{}'", raw),
            FieldError::ArbitrationId(raw) => write!(f, "invalid arbitration ID '{}'", raw),
            FieldError::Dlc(raw) => write!(f, "invalid DLC '{}'", raw),
            FieldError::DlcRange(dlc) => write!(f, "DLC {} exceeds 8 bytes", dlc),
            FieldError::DataByte(raw) => write!(f, "invalid payload byte '{}'", raw),
            FieldError::DlcMismatch { dlc, got } => {
                write!(f, "DLC is {} but payload has {} bytes", dlc, got)
            }
        }
    }
}

impl std::error::Error for FieldError {}

/// One bus message, either read from a capture or received from the
/// injection stream. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayFrame {
    /// Seconds since the start of the capture (or the producer's own clock)
    pub timestamp: f64,
    /// Arbitration ID (11-bit standard or 29-bit extended)
    pub id: u32,
    /// Declared data length code
    pub dlc: usize,
    /// Payload bytes (0-8)
    pub data: Vec<u8>,
}

impl ReplayFrame {
    pub fn new(timestamp: f64, id: u32, data: Vec<u8>) -> Self {
        Self {
            timestamp,
            id,
            dlc: data.len(),
            data,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.data.len() <= MAX_FRAME_BYTES && self.dlc == self.data.len()
    }

    /// Build a frame from the four delimited fields
    /// [timestamp, arbitration_id, dlc, data].
    pub fn from_fields(fields: &[&str]) -> Result<Self, FieldError> {
        if fields.len() != 4 {
            return Err(FieldError::FieldCount(fields.len()));
        }

        let raw_ts = fields[0].trim();
        let timestamp: f64 = raw_ts
            .parse()
            .map_err(|_| FieldError::Timestamp(raw_ts.to_string()))?;

        let raw_id = fields[1].trim();
        let id = u32::from_str_radix(raw_id, 16)
            .map_err(|_| FieldError::ArbitrationId(raw_id.to_string()))?;

        let raw_dlc = fields[2].trim();
        let dlc: usize = raw_dlc
            .parse()
            .map_err(|_| FieldError::Dlc(raw_dlc.to_string()))?;
        if dlc > MAX_FRAME_BYTES {
            return Err(FieldError::DlcRange(dlc));
        }

        let mut data = Vec::with_capacity(dlc);
        for byte in fields[3].split_whitespace() {
            let value = u8::from_str_radix(byte, 16)
                .map_err(|_| FieldError::DataByte(byte.to_string()))?;
            data.push(value);
        }
        if data.len() != dlc {
            return Err(FieldError::DlcMismatch {
                dlc,
                got: data.len(),
            });
        }

        Ok(Self {
            timestamp,
            id,
            dlc,
            data,
        })
    }

    /// Arbitration ID formatted the way captures store it (zero-padded hex)
    pub fn id_hex(&self) -> String {
        format!("{:03X}", self.id)
    }

    /// Payload formatted as space-separated hex bytes
    pub fn data_hex(&self) -> String {
        self.data
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One merged, labeled output record. Created at emission time, append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRecord {
    /// Gapless emission counter, starts at 0
    pub sequence: u64,
    /// Wall-clock seconds since replay start (pause time excluded)
    pub elapsed: f64,
    pub frame: ReplayFrame,
    pub class: FrameClass,
}

impl LabeledRecord {
    /// The broadcast wire format: `elapsed,arbitration_id,dlc,data,class`
    /// (no trailing newline; the transport appends it).
    pub fn wire_record(&self) -> String {
        format!(
            "{:.6},{},{},{},{}",
            self.elapsed,
            self.frame.id_hex(),
            self.frame.dlc,
            self.frame.data_hex(),
            self.class
        )
    }

    /// The persistence log format: the wire record prefixed with the
    /// sequence number.
    pub fn log_record(&self) -> String {
        format!("{},{}", self.sequence, self.wire_record())
    }
}
