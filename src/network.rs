use crate::types::{FieldError, ReplayFrame};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// One decoded step of the producer byte stream.
///
/// Each socket-level condition gets its own tag so the receive paths can be
/// asserted independently: a complete valid message, a complete line that
/// failed validation, a read that only extended the partial-line buffer, and
/// an orderly close.
#[derive(Debug, PartialEq)]
pub enum RecvEvent {
    /// A complete, valid injected message ready for the pending queue
    Message(ReplayFrame),
    /// A complete line that failed validation; reported and dropped
    Malformed { line: String, error: FieldError },
    /// No complete line yet; the fragment stays buffered until more data
    WouldBlock,
    /// Zero-length read: the producer closed the connection
    PeerClosed,
}

/// Parse one complete injected line (comma-delimited, no terminator).
pub fn decode_message(line: &str) -> Result<ReplayFrame, FieldError> {
    let fields: Vec<&str> = line.split(',').collect();
    ReplayFrame::from_fields(&fields)
}

/// Reassembles newline-delimited messages from arbitrary TCP chunk
/// boundaries. A trailing fragment carries over to the next `feed` call and
/// is never surfaced until its terminator arrives.
#[derive(Debug, Default)]
pub struct LineAssembler {
    carry: String,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk as read from the socket. An empty chunk means the
    /// peer performed an orderly close.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RecvEvent> {
        if chunk.is_empty() {
            return vec![RecvEvent::PeerClosed];
        }

        self.carry.push_str(&String::from_utf8_lossy(chunk));

        let mut events = Vec::new();
        while let Some(pos) = self.carry.find('\n') {
            let raw: String = self.carry.drain(..=pos).collect();
            let line = raw.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }
            match decode_message(line) {
                Ok(frame) => events.push(RecvEvent::Message(frame)),
                Err(error) => events.push(RecvEvent::Malformed {
                    line: line.to_string(),
                    error,
                }),
            }
        }

        if events.is_empty() {
            events.push(RecvEvent::WouldBlock);
        }
        events
    }

    /// The unterminated fragment currently buffered
    pub fn buffered(&self) -> &str {
        &self.carry
    }
}

/// Write one record line to a stream: payload, newline, flush.
pub async fn send_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_chunk_delivery() {
        let mut assembler = LineAssembler::new();
        let events = assembler.feed(b"0,100,8,00 00 00 00 00 00 00 00\n");
        assert_eq!(events.len(), 1);
        match &events[0] {
            RecvEvent::Message(frame) => {
                assert_eq!(frame.id, 0x100);
                assert_eq!(frame.dlc, 8);
                assert_eq!(frame.data, vec![0u8; 8]);
            }
            other => panic!("expected Message, got {:?}", other),
        }
        assert!(assembler.buffered().is_empty());
    }

    #[test]
    fn test_split_read_reconstructs_identically() {
        let mut assembler = LineAssembler::new();

        let first = assembler.feed(b"0,100,8,00 00 00 00 00 00 00 ");
        assert_eq!(first, vec![RecvEvent::WouldBlock]);
        assert_eq!(assembler.buffered(), "0,100,8,00 00 00 00 00 00 00 ");

        let second = assembler.feed(b"00\n");
        assert_eq!(second.len(), 1);
        match &second[0] {
            RecvEvent::Message(frame) => {
                assert_eq!(frame.id, 0x100);
                assert_eq!(frame.data, vec![0u8; 8]);
            }
            other => panic!("expected Message, got {:?}", other),
        }
        assert!(assembler.buffered().is_empty());
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let mut assembler = LineAssembler::new();
        let events = assembler.feed(b"0.1,100,1,FF\n0.2,101,1,AA\n0.3,1");
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], RecvEvent::Message(f) if f.id == 0x100));
        assert!(matches!(&events[1], RecvEvent::Message(f) if f.id == 0x101));
        assert_eq!(assembler.buffered(), "0.3,1");
    }

    #[test]
    fn test_malformed_line_is_tagged_not_queued() {
        let mut assembler = LineAssembler::new();
        let events = assembler.feed(b"not,a,frame\n");
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            RecvEvent::Malformed { error: FieldError::FieldCount(3), .. }
        ));
    }

    #[test]
    fn test_peer_closed_on_empty_chunk() {
        let mut assembler = LineAssembler::new();
        assert_eq!(assembler.feed(b""), vec![RecvEvent::PeerClosed]);
    }

    #[test]
    fn test_crlf_terminators() {
        let mut assembler = LineAssembler::new();
        let events = assembler.feed(b"0.1,100,1,FF\r\n");
        assert!(matches!(&events[0], RecvEvent::Message(f) if f.id == 0x100));
    }
}
