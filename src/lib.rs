pub mod can_bus;
pub mod capture;
pub mod injection;
pub mod network;
pub mod playback;
pub mod scheduler;
pub mod sink;
pub mod types;

pub use can_bus::{BusChannel, BusError, VirtualCanBus};
pub use capture::{Capture, CaptureError};
pub use injection::InjectionListener;
pub use network::{LineAssembler, RecvEvent};
pub use playback::PlaybackControl;
pub use scheduler::{ReplayConfig, ReplayScheduler, RunStats};
pub use sink::{LabelLog, RunSummary, SharedMirror, SinkError, StreamSink, LOG_HEADER};
pub use types::{FieldError, FrameClass, LabeledRecord, ReplayFrame};
