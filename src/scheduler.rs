use crate::capture::Capture;
use crate::playback::PlaybackControl;
use crate::sink::{SinkError, StreamSink};
use crate::types::{FrameClass, LabeledRecord, ReplayFrame};
use colored::*;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Emission loop granularity. Small enough to keep injected-message latency
/// well under typical inter-frame spacing.
const TICK: Duration = Duration::from_millis(1);

/// Progress line cadence, in recorded frames
const PROGRESS_EVERY: u64 = 1000;

/// One configuration structure with named toggles; every run shape
/// (persisted, mirrored, pausable) is a combination of these.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Time-dilation factor: recorded intervals are divided by this
    pub run_speed: f64,
    /// Poll the keyboard for interactive pause/resume
    pub enable_pause: bool,
    /// Open an attacker-observer mirror after each accepted producer
    pub enable_mirror: bool,
    /// Prefix for the persistence log and run summary, if any
    pub persist_path: Option<PathBuf>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            run_speed: 1.0,
            enable_pause: true,
            enable_mirror: false,
            persist_path: None,
        }
    }
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub normal: u64,
    pub attack: u64,
    /// Injected messages still pending when the capture ran out
    pub dropped_pending: u64,
    pub wall: Duration,
    pub interrupted: bool,
}

/// Deterministic, wall-clock-synchronized interleaving of the recorded
/// stream and the pending injection queue into one labeled output.
///
/// Each tick the scheduler checks whether the next recorded frame is due at
/// the scaled elapsed time; if so it is emitted as Normal. Otherwise the
/// oldest pending injected message, if any, is emitted as Attack. Recorded
/// frames always win ties; injected frames fill the idle gaps.
pub struct ReplayScheduler {
    frames: Vec<ReplayFrame>,
    pending: mpsc::UnboundedReceiver<ReplayFrame>,
    control: PlaybackControl,
    sink: StreamSink,
    run_speed: f64,
    shutdown: watch::Receiver<bool>,
}

impl ReplayScheduler {
    pub fn new(
        capture: Capture,
        pending: mpsc::UnboundedReceiver<ReplayFrame>,
        control: PlaybackControl,
        sink: StreamSink,
        run_speed: f64,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            frames: capture.into_frames(),
            pending,
            control,
            sink,
            run_speed,
            shutdown,
        }
    }

    /// Drive the emission loop to completion or interrupt. Flushes and
    /// closes the sinks in both cases.
    pub async fn run(mut self) -> Result<RunStats, SinkError> {
        let total = self.frames.len() as u64;
        let t0 = match self.frames.first() {
            Some(first) => first.timestamp,
            None => {
                self.sink.finish().await?;
                return Ok(RunStats::default());
            }
        };

        let mut stats = RunStats::default();
        let mut cursor = 0usize;
        let mut sequence = 0u64;

        self.control.reset();

        loop {
            if *self.shutdown.borrow() {
                stats.interrupted = true;
                break;
            }
            if cursor >= self.frames.len() {
                break;
            }
            if self.control.is_paused() {
                tokio::time::sleep(TICK).await;
                continue;
            }

            let elapsed = self.control.elapsed().as_secs_f64();
            let due = (self.frames[cursor].timestamp - t0) / self.run_speed;

            if elapsed >= due {
                let frame = self.frames[cursor].clone();
                cursor += 1;
                self.emit(&mut sequence, elapsed, frame, FrameClass::Normal)
                    .await?;
                stats.normal += 1;

                if stats.normal % PROGRESS_EVERY == 0 {
                    println!(
                        "{} Replayed {}/{} frames ({} injected, {:.1}s elapsed)",
                        "→".cyan(),
                        stats.normal,
                        total,
                        stats.attack,
                        elapsed
                    );
                }
            } else if let Ok(frame) = self.pending.try_recv() {
                self.emit(&mut sequence, elapsed, frame, FrameClass::Attack)
                    .await?;
                stats.attack += 1;
            } else {
                tokio::time::sleep(TICK).await;
            }
        }

        // the run is bounded by the recorded stream; whatever is still
        // pending is counted, not emitted
        while self.pending.try_recv().is_ok() {
            stats.dropped_pending += 1;
        }

        stats.wall = self.control.elapsed();
        self.sink.finish().await?;
        Ok(stats)
    }

    async fn emit(
        &mut self,
        sequence: &mut u64,
        elapsed: f64,
        frame: ReplayFrame,
        class: FrameClass,
    ) -> Result<(), SinkError> {
        let record = LabeledRecord {
            sequence: *sequence,
            elapsed,
            frame,
            class,
        };
        self.sink.deliver(&record).await?;
        *sequence += 1;
        Ok(())
    }
}
