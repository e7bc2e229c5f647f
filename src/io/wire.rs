//! Length-prefixed JSON framing.
//!
//! Every TCP message in both directions uses the same framing:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Payload (variable)       │
//! │ Big-endian u32   │ UTF-8 JSON               │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! - **Maximum payload**: 64 MiB. A dense RGB-D frame is tens of MB as JSON.
//! - **Oversized length**: the connection is closed.
//! - **Malformed JSON**: the message is logged and skipped; the connection
//!   stays open.
//!
//! Readers run with a socket read timeout so they can check the shutdown
//! flag. [`FrameReader`] keeps partial progress across timeouts, so a large
//! frame arriving slowly is never torn.

use std::io::{ErrorKind, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{BhumiError, Result};

/// Largest accepted payload in bytes.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const LEN_PREFIX: usize = 4;

/// Serialize `msg` as one framed message.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(msg)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(BhumiError::Wire(format!(
            "Message too large: {} bytes",
            payload.len()
        )));
    }
    let mut buf = Vec::with_capacity(LEN_PREFIX + payload.len());
    // Checked above: fits in u32
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Serialize and write one framed message.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> Result<()> {
    let buf = encode(msg)?;
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

/// Deserialize a payload produced by [`encode`].
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(payload)?)
}

/// Incremental reader for framed messages.
#[derive(Debug)]
pub struct FrameReader {
    header: [u8; LEN_PREFIX],
    header_filled: usize,
    payload: Vec<u8>,
    payload_filled: usize,
    in_payload: bool,
    max_len: usize,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::with_max_len(MAX_FRAME_LEN)
    }

    /// Reader that rejects payloads above `max_len` bytes.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            header: [0; LEN_PREFIX],
            header_filled: 0,
            payload: Vec::new(),
            payload_filled: 0,
            in_payload: false,
            max_len,
        }
    }

    /// Read until one full payload is available.
    ///
    /// Returns `Ok(None)` if the reader timed out (or would block) first;
    /// partial progress is kept for the next call. End of stream, socket
    /// errors and oversized lengths are errors, after which the connection
    /// should be dropped.
    pub fn poll<R: Read>(&mut self, reader: &mut R) -> Result<Option<Vec<u8>>> {
        loop {
            if !self.in_payload {
                let n = match reader.read(&mut self.header[self.header_filled..]) {
                    Ok(n) => n,
                    Err(e) if is_idle(&e) => return Ok(None),
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                };
                if n == 0 {
                    return Err(eof(self.header_filled > 0));
                }
                self.header_filled += n;
                if self.header_filled < LEN_PREFIX {
                    continue;
                }

                let len = u32::from_be_bytes(self.header) as usize;
                if len > self.max_len {
                    return Err(BhumiError::Wire(format!(
                        "Message too large: {} bytes (max {})",
                        len, self.max_len
                    )));
                }
                self.payload = vec![0; len];
                self.payload_filled = 0;
                self.in_payload = true;
            }

            if self.payload_filled < self.payload.len() {
                let n = match reader.read(&mut self.payload[self.payload_filled..]) {
                    Ok(n) => n,
                    Err(e) if is_idle(&e) => return Ok(None),
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                };
                if n == 0 {
                    return Err(eof(true));
                }
                self.payload_filled += n;
                if self.payload_filled < self.payload.len() {
                    continue;
                }
            }

            self.header_filled = 0;
            self.in_payload = false;
            return Ok(Some(std::mem::take(&mut self.payload)));
        }
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn is_idle(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn eof(mid_message: bool) -> BhumiError {
    let msg = if mid_message {
        "Connection closed mid-message"
    } else {
        "Connection closed"
    };
    BhumiError::Io(std::io::Error::new(ErrorKind::UnexpectedEof, msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::VecDeque;
    use std::io::Cursor;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        id: u32,
        note: String,
    }

    /// Reader that yields scripted chunks and timeouts.
    struct Scripted(VecDeque<Option<Vec<u8>>>);

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.0.pop_front() {
                None => Ok(0),
                Some(None) => Err(std::io::Error::new(ErrorKind::TimedOut, "timeout")),
                Some(Some(mut chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.0.push_front(Some(chunk.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }
    }

    #[test]
    fn test_prefix_is_big_endian_length() {
        let buf = encode(&Ping {
            id: 1,
            note: "a".into(),
        })
        .unwrap();
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(len, buf.len() - 4);
        assert_eq!(&buf[4..], br#"{"id":1,"note":"a"}"#);
    }

    #[test]
    fn test_reads_back_to_back_messages() {
        let mut stream = Vec::new();
        for id in 0..3 {
            write_frame(
                &mut stream,
                &Ping {
                    id,
                    note: format!("n{}", id),
                },
            )
            .unwrap();
        }

        let mut cursor = Cursor::new(stream);
        let mut reader = FrameReader::new();
        for id in 0..3 {
            let payload = reader.poll(&mut cursor).unwrap().unwrap();
            let ping: Ping = decode(&payload).unwrap();
            assert_eq!(ping.id, id);
        }
        assert!(matches!(reader.poll(&mut cursor), Err(BhumiError::Io(_))));
    }

    #[test]
    fn test_timeouts_keep_partial_progress() {
        let bytes = encode(&Ping {
            id: 42,
            note: "split".into(),
        })
        .unwrap();
        let (a, rest) = bytes.split_at(2);
        let (b, c) = rest.split_at(5);
        let mut src = Scripted(VecDeque::from(vec![
            Some(a.to_vec()),
            None,
            Some(b.to_vec()),
            None,
            Some(c.to_vec()),
        ]));

        let mut reader = FrameReader::new();
        assert!(reader.poll(&mut src).unwrap().is_none());
        assert!(reader.poll(&mut src).unwrap().is_none());
        let payload = reader.poll(&mut src).unwrap().unwrap();
        let ping: Ping = decode(&payload).unwrap();
        assert_eq!(ping.id, 42);
    }

    #[test]
    fn test_oversized_length_is_rejected() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&1000u32.to_be_bytes());
        stream.extend_from_slice(&[b' '; 1000]);
        let mut reader = FrameReader::with_max_len(100);
        let err = reader.poll(&mut Cursor::new(stream)).unwrap_err();
        assert!(matches!(err, BhumiError::Wire(_)));
    }

    #[test]
    fn test_eof_mid_message_is_unexpected_eof() {
        let bytes = encode(&Ping {
            id: 7,
            note: "cut".into(),
        })
        .unwrap();
        let mut cursor = Cursor::new(bytes[..bytes.len() - 3].to_vec());
        let mut reader = FrameReader::new();
        match reader.poll(&mut cursor) {
            Err(BhumiError::Io(e)) => assert_eq!(e.kind(), ErrorKind::UnexpectedEof),
            other => panic!("expected UnexpectedEof, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json_is_wire_error() {
        let err = decode::<Ping>(b"{not json").unwrap_err();
        assert!(matches!(err, BhumiError::Wire(_)));
    }
}
