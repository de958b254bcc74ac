use crate::types::ReplayFrame;
use colored::*;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Errors opening a capture file
#[derive(Debug)]
pub enum CaptureError {
    Io(std::io::Error),
    /// No parseable rows in the file
    Empty,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Io(e) => write!(f, "failed to read capture: {}", e),
            CaptureError::Empty => write!(f, "capture contains no valid frames"),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<std::io::Error> for CaptureError {
    fn from(e: std::io::Error) -> Self {
        CaptureError::Io(e)
    }
}

/// A recorded capture: an ordered sequence of timestamped frames.
///
/// Rows are `timestamp,arbitration_id,dlc,data` with the payload as
/// space-separated hex bytes. A `Timestamp,Arbitration_ID,DLC,Data` header
/// row is recognized and skipped. Blank or incomplete rows are dropped;
/// malformed rows are skipped with a warning so a partially corrupted
/// capture still replays.
#[derive(Debug, Clone)]
pub struct Capture {
    frames: Vec<ReplayFrame>,
    skipped: usize,
}

impl Capture {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);

        let mut frames = Vec::new();
        let mut skipped = 0usize;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line_no == 0 && line.to_ascii_lowercase().starts_with("timestamp") {
                continue;
            }

            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() < 4 {
                // incomplete row, dropped without comment
                continue;
            }

            match ReplayFrame::from_fields(&fields) {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    skipped += 1;
                    eprintln!(
                        "{} skipping capture row {}: {}",
                        "⚠".yellow(),
                        line_no + 1,
                        e
                    );
                }
            }
        }

        if frames.is_empty() {
            return Err(CaptureError::Empty);
        }

        Ok(Self { frames, skipped })
    }

    /// Build a capture from already-parsed frames (tests, synthetic runs)
    pub fn from_frames(frames: Vec<ReplayFrame>) -> Self {
        Self { frames, skipped: 0 }
    }

    pub fn frames(&self) -> &[ReplayFrame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<ReplayFrame> {
        self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Rows skipped due to malformed fields
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Recorded time span from first to last frame, in seconds
    pub fn duration(&self) -> f64 {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_capture(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("can_replay_sim_{}_{}", std::process::id(), name));
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_open_with_header_and_blank_rows() {
        let path = write_temp_capture(
            "header.csv",
            "Timestamp,Arbitration_ID,DLC,Data\n\
             0.0,100,1,FF\n\
             \n\
             1.0,101,1,00\n",
        );
        let capture = Capture::open(&path).unwrap();
        assert_eq!(capture.len(), 2);
        assert_eq!(capture.frames()[0].id, 0x100);
        assert_eq!(capture.frames()[1].data, vec![0x00]);
        assert_eq!(capture.skipped(), 0);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_malformed_rows_skipped_not_fatal() {
        let path = write_temp_capture(
            "corrupt.csv",
            "0.0,100,1,FF\n\
             garbage,not,a,row\n\
             0.5,101\n\
             1.0,102,1,AA\n",
        );
        let capture = Capture::open(&path).unwrap();
        assert_eq!(capture.len(), 2);
        assert_eq!(capture.skipped(), 1); // the 2-field row is dropped, not counted
        assert_eq!(capture.frames()[1].id, 0x102);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_empty_capture_is_an_error() {
        let path = write_temp_capture("empty.csv", "Timestamp,Arbitration_ID,DLC,Data\n");
        assert!(matches!(Capture::open(&path), Err(CaptureError::Empty)));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_duration() {
        let capture = Capture::from_frames(vec![
            ReplayFrame::new(2.0, 0x100, vec![]),
            ReplayFrame::new(5.5, 0x101, vec![]),
        ]);
        assert_eq!(capture.duration(), 3.5);
    }
}
