//! Line assembly for operator input.
//!
//! Bytes arrive one at a time from the transport. The codec collects them
//! into a line and produces the bytes to echo back:
//! - `\r` or `\n` ends the line; a `\n` straight after `\r` is swallowed
//! - backspace (`0x08`) and delete (`0x7F`) erase the last byte
//! - Ctrl-C (`0x03`) discards the line
//! - other control bytes are ignored, as is input beyond [`MAX_LINE_LENGTH`]

use bytes::{BufMut, BytesMut};

/// Maximum accepted line length in bytes.
pub const MAX_LINE_LENGTH: usize = 128;

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7F;
const CTRL_C: u8 = 0x03;

/// What a byte did to the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// The line is still being typed.
    Pending,
    /// A terminator arrived; the completed line, without the terminator.
    Line(String),
    /// The operator discarded the line.
    Cancelled,
}

/// Accumulates one line of operator input.
#[derive(Debug)]
pub struct LineCodec {
    buffer: BytesMut,
    after_cr: bool,
    dropped: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        LineCodec {
            buffer: BytesMut::with_capacity(MAX_LINE_LENGTH),
            after_cr: false,
            dropped: 0,
        }
    }

    /// Feed one byte. Bytes to echo to the operator are appended to `echo`.
    pub fn push(&mut self, byte: u8, echo: &mut BytesMut) -> LineEvent {
        let after_cr = std::mem::take(&mut self.after_cr);

        match byte {
            b'\n' if after_cr => LineEvent::Pending,
            b'\r' | b'\n' => {
                self.after_cr = byte == b'\r';
                echo.put_slice(b"\r\n");
                LineEvent::Line(self.take_line())
            }
            BACKSPACE | DELETE => {
                if !self.buffer.is_empty() {
                    self.buffer.truncate(self.buffer.len() - 1);
                    echo.put_slice(b"\x08 \x08");
                }
                LineEvent::Pending
            }
            CTRL_C => {
                self.clear();
                echo.put_slice(b"^C\r\n");
                LineEvent::Cancelled
            }
            b if b < 0x20 => LineEvent::Pending,
            b => {
                if self.buffer.len() < MAX_LINE_LENGTH {
                    self.buffer.put_u8(b);
                    echo.put_u8(b);
                } else {
                    self.dropped += 1;
                }
                LineEvent::Pending
            }
        }
    }

    /// Bytes typed so far on the current line.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Bytes dropped from the current line for exceeding [`MAX_LINE_LENGTH`].
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Discard the current line.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.dropped = 0;
    }

    fn take_line(&mut self) -> String {
        let line = self.buffer.split();
        self.dropped = 0;
        String::from_utf8_lossy(&line).into_owned()
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(codec: &mut LineCodec, input: &[u8]) -> (Vec<LineEvent>, Vec<u8>) {
        let mut echo = BytesMut::new();
        let events = input
            .iter()
            .map(|&b| codec.push(b, &mut echo))
            .filter(|e| *e != LineEvent::Pending)
            .collect();
        (events, echo.to_vec())
    }

    #[test]
    fn test_crlf_is_one_terminator() {
        let mut codec = LineCodec::new();
        let (events, echo) = feed(&mut codec, b"?\r\nfeature status\n");
        assert_eq!(
            events,
            vec![
                LineEvent::Line("?".into()),
                LineEvent::Line("feature status".into()),
            ]
        );
        assert_eq!(echo, b"?\r\nfeature status\r\n");
    }

    #[test]
    fn test_blank_lines_after_lf() {
        let mut codec = LineCodec::new();
        let (events, _) = feed(&mut codec, b"\n\n");
        assert_eq!(events, vec![LineEvent::Line(String::new()), LineEvent::Line(String::new())]);
    }

    #[test]
    fn test_backspace() {
        let mut codec = LineCodec::new();
        let (events, echo) = feed(&mut codec, b"\x08cusx\x7Ftom\r");
        assert_eq!(events, vec![LineEvent::Line("custom".into())]);
        // Backspace on an empty line echoes nothing.
        assert_eq!(echo, b"cusx\x08 \x08tom\r\n");
    }

    #[test]
    fn test_ctrl_c_discards() {
        let mut codec = LineCodec::new();
        let (events, echo) = feed(&mut codec, b"feat\x03");
        assert_eq!(events, vec![LineEvent::Cancelled]);
        assert!(codec.is_empty());
        assert_eq!(echo, b"feat^C\r\n");
    }

    #[test]
    fn test_control_bytes_ignored() {
        let mut codec = LineCodec::new();
        let (_, echo) = feed(&mut codec, b"a\x1b\x07b");
        assert_eq!(echo, b"ab");
        assert_eq!(codec.len(), 2);
    }

    #[test]
    fn test_overflow_dropped() {
        let mut codec = LineCodec::new();
        let long = vec![b'x'; MAX_LINE_LENGTH + 10];
        let (_, echo) = feed(&mut codec, &long);
        assert_eq!(codec.len(), MAX_LINE_LENGTH);
        assert_eq!(codec.dropped(), 10);
        assert_eq!(echo.len(), MAX_LINE_LENGTH);

        let (events, _) = feed(&mut codec, b"\r");
        assert_eq!(events, vec![LineEvent::Line("x".repeat(MAX_LINE_LENGTH))]);
        assert_eq!(codec.dropped(), 0);
    }
}
