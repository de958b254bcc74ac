use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct ClockState {
    /// Replay time zero. Shifted forward by the paused duration on resume,
    /// so elapsed time continues seamlessly across a pause.
    origin: Instant,
    /// Set while paused; elapsed time is frozen at `paused_at - origin`
    paused_at: Option<Instant>,
}

/// Pause/resume control shared between the scheduler (reader) and the
/// interactive poller (writer). Single writer, single reader; the mutex is
/// held only for the snapshot, never across an await.
#[derive(Debug, Clone)]
pub struct PlaybackControl {
    state: Arc<Mutex<ClockState>>,
}

impl PlaybackControl {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockState {
                origin: Instant::now(),
                paused_at: None,
            })),
        }
    }

    /// Re-anchor replay time zero to now. The scheduler calls this once
    /// when the emission loop starts.
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("playback clock poisoned");
        state.origin = Instant::now();
        state.paused_at = None;
    }

    /// Replay-time elapsed since the origin, excluding paused time.
    /// Frozen while paused.
    pub fn elapsed(&self) -> Duration {
        let state = self.state.lock().expect("playback clock poisoned");
        match state.paused_at {
            Some(paused_at) => paused_at.saturating_duration_since(state.origin),
            None => state.origin.elapsed(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.state
            .lock()
            .expect("playback clock poisoned")
            .paused_at
            .is_some()
    }

    /// No-op if already paused
    pub fn pause(&self) {
        let mut state = self.state.lock().expect("playback clock poisoned");
        if state.paused_at.is_none() {
            state.paused_at = Some(Instant::now());
        }
    }

    /// Shifts the origin forward by the paused duration. No-op if running.
    pub fn resume(&self) {
        let mut state = self.state.lock().expect("playback clock poisoned");
        if let Some(paused_at) = state.paused_at.take() {
            state.origin += paused_at.elapsed();
        }
    }

    /// Toggle pause state; returns true if now paused
    pub fn toggle(&self) -> bool {
        if self.is_paused() {
            self.resume();
            false
        } else {
            self.pause();
            true
        }
    }
}

impl Default for PlaybackControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_elapsed_advances_while_running() {
        let control = PlaybackControl::new();
        sleep(Duration::from_millis(20));
        assert!(control.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_pause_freezes_elapsed() {
        let control = PlaybackControl::new();
        sleep(Duration::from_millis(10));
        control.pause();
        let frozen = control.elapsed();
        sleep(Duration::from_millis(30));
        assert_eq!(control.elapsed(), frozen);
    }

    #[test]
    fn test_resume_excludes_paused_time() {
        let control = PlaybackControl::new();
        sleep(Duration::from_millis(10));
        control.pause();
        let before = control.elapsed();
        sleep(Duration::from_millis(50));
        control.resume();
        sleep(Duration::from_millis(10));
        let after = control.elapsed();

        // paused 50ms must not count; only ~10ms of running time was added
        assert!(after >= before + Duration::from_millis(10));
        assert!(after < before + Duration::from_millis(45));
    }

    #[test]
    fn test_immediate_pause_resume_is_idempotent() {
        let control = PlaybackControl::new();
        sleep(Duration::from_millis(10));
        let before = control.elapsed();
        control.pause();
        control.resume();
        let after = control.elapsed();
        // a zero-length pause must not rewind or jump the clock
        assert!(after >= before);
        assert!(after < before + Duration::from_millis(10));
    }

    #[test]
    fn test_toggle() {
        let control = PlaybackControl::new();
        assert!(!control.is_paused());
        assert!(control.toggle());
        assert!(control.is_paused());
        assert!(!control.toggle());
        assert!(!control.is_paused());
    }

    #[test]
    fn test_double_pause_keeps_first_anchor() {
        let control = PlaybackControl::new();
        control.pause();
        let first = control.elapsed();
        sleep(Duration::from_millis(20));
        control.pause();
        assert_eq!(control.elapsed(), first);
    }
}
