//! Text-event-stream framing for envelopes.
//!
//! Each message on the wire is exactly `data: <JSON envelope>\n\n`. No
//! other framing (`event:`, `id:`, comments, CRLF) is produced or accepted.

use super::{Envelope, EnvelopeError};

const DATA_PREFIX: &str = "data: ";
const FRAME_TERMINATOR: &[u8] = b"\n\n";

/// Encodes an envelope into one complete wire frame.
pub fn encode_frame(envelope: &Envelope) -> Result<String, EnvelopeError> {
    let json = serde_json::to_string(envelope)?;
    Ok(format!("{DATA_PREFIX}{json}\n\n"))
}

/// Decodes one frame, with or without its trailing blank line.
pub fn decode_frame(frame: &str) -> Result<Envelope, EnvelopeError> {
    let body = frame.strip_suffix("\n\n").unwrap_or(frame);

    let json = body
        .strip_prefix(DATA_PREFIX)
        .ok_or_else(|| EnvelopeError::MalformedFrame("missing `data: ` prefix".to_string()))?;

    if json.contains('\n') || json.contains('\r') {
        return Err(EnvelopeError::MalformedFrame(
            "frame spans multiple lines".to_string(),
        ));
    }

    Ok(serde_json::from_str(json)?)
}

/// Largest frame the decoder buffers before giving up on it.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Incremental decoder for a byte stream of frames.
///
/// Transport chunks may split a frame anywhere, including inside a
/// multi-byte UTF-8 sequence; bytes are buffered until a full terminator
/// arrives. A frame longer than [`MAX_FRAME_BYTES`] yields one
/// `MalformedFrame` error and the rest of it is discarded up to the next
/// terminator.
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched for a terminator.
    scanned: usize,
    discarding: bool,
}

impl SseFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every frame it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Envelope, EnvelopeError>> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(end) = self.next_terminator() {
            let raw: Vec<u8> = self.buffer.drain(..end + FRAME_TERMINATOR.len()).collect();
            self.scanned = 0;

            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if end > MAX_FRAME_BYTES {
                frames.push(Err(oversized_frame()));
                continue;
            }
            let frame = match std::str::from_utf8(&raw[..end]) {
                Ok(text) => decode_frame(text),
                Err(_) => Err(EnvelopeError::InvalidUtf8),
            };
            frames.push(frame);
        }

        if self.buffer.len() > MAX_FRAME_BYTES {
            if !self.discarding {
                frames.push(Err(oversized_frame()));
                self.discarding = true;
            }
            // Keep the tail so a terminator split across chunks is still found.
            let keep = FRAME_TERMINATOR.len() - 1;
            let cut = self.buffer.len() - keep;
            self.buffer.drain(..cut);
            self.scanned = 0;
        }
        frames
    }

    /// Bytes received but not yet terminated.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    fn next_terminator(&mut self) -> Option<usize> {
        let from = self.scanned;
        match find_terminator(&self.buffer[from..]) {
            Some(offset) => Some(from + offset),
            None => {
                // A terminator may start in the last byte once more arrives.
                self.scanned = self
                    .buffer
                    .len()
                    .saturating_sub(FRAME_TERMINATOR.len() - 1);
                None
            }
        }
    }
}

fn oversized_frame() -> EnvelopeError {
    EnvelopeError::MalformedFrame(format!("frame exceeds {MAX_FRAME_BYTES} bytes"))
}

fn find_terminator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(FRAME_TERMINATOR.len())
        .position(|window| window == FRAME_TERMINATOR)
}
