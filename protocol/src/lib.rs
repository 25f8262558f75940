//! Wire format shared by the music room server and its clients.
//!
//! Clients send one command per line. The server answers with CRLF terminated
//! text lines and, for music broadcasts, an announcement line followed by the
//! raw file bytes:
//!
//! ```text
//! music <name> <len>\r\n<len raw bytes>
//! ```

use std::cmp;
use std::io::{Error, ErrorKind};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

// encode and decode bypasses traditional libraries
// like serde or message pack

pub const CRLF: &[u8] = b"\r\n";
pub const MUSIC: &str = "music";

const LF: u8 = b'\n';
const CR: u8 = b'\r';

pub const LINES_MAX_LEN: usize = 256;

/// Server to client frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Line(String),
    Music {
        name: String,
        data: Bytes,
    },
}

impl Frame {
    pub fn line(text: impl Into<String>) -> Self {
        Frame::Line(text.into())
    }

    pub fn music(name: impl Into<String>, data: Bytes) -> Self {
        Frame::Music { name: name.into(), data }
    }
}

/// Client to server line, as seen by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Line(String),
    // line went past the max length and was dropped up to its newline
    TooLong,
}

/// Server side codec: decodes command lines, encodes frames
#[derive(Debug, Clone)]
pub struct ServerCodec {
    max_length: usize,
    next_index: usize,
    discarding: bool,
}

impl ServerCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length: cmp::max(max_length, 1),
            next_index: 0,
            discarding: false,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for ServerCodec {
    fn default() -> Self {
        Self::new(LINES_MAX_LEN)
    }
}

impl Decoder for ServerCodec {
    type Item = Inbound;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // room for the CR of a CRLF terminator
        let limit = self.max_length.saturating_add(1);

        loop {
            // never look past limit + 1, the extra byte being the newline
            let read_to = cmp::min(limit.saturating_add(1), src.len());
            let newline = src[self.next_index..read_to].iter().position(|b| *b == LF);

            match (self.discarding, newline) {
                (true, Some(offset)) => {
                    src.advance(self.next_index + offset + 1);
                    self.discarding = false;
                    self.next_index = 0;
                    return Ok(Some(Inbound::TooLong));
                },
                (true, None) => {
                    src.advance(read_to);
                    self.next_index = 0;
                    if src.is_empty() {
                        return Ok(None);
                    }
                },
                (false, Some(offset)) => {
                    let index = self.next_index + offset;
                    self.next_index = 0;
                    let line = src.split_to(index + 1);
                    return Ok(Some(self.bounded(&line[..index])));
                },
                (false, None) if src.len() > limit => {
                    debug!("line exceeded {} bytes, discarding", self.max_length);
                    self.discarding = true;
                },
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                },
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(inbound) = self.decode(src)? {
            return Ok(Some(inbound));
        }

        self.next_index = 0;

        if self.discarding {
            self.discarding = false;
            src.clear();
            return Ok(Some(Inbound::TooLong));
        }

        if src.is_empty() {
            return Ok(None);
        }

        // unterminated trailing bytes still count as a final line
        let line = src.split_to(src.len());
        Ok(Some(self.bounded(&line)))
    }
}

impl ServerCodec {
    // the limit applies to the text alone, whichever terminator was used
    fn bounded(&self, line: &[u8]) -> Inbound {
        let text = match line.last() {
            Some(&CR) => &line[..line.len() - 1],
            _ => line,
        };

        if text.len() > self.max_length {
            debug!("line exceeded {} bytes, discarding", self.max_length);
            return Inbound::TooLong;
        }
        Inbound::Line(String::from_utf8_lossy(text).into_owned())
    }
}

impl Encoder<Frame> for ServerCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Frame::Line(text) => {
                dst.reserve(text.len() + CRLF.len());
                dst.put_slice(text.as_bytes());
                dst.put_slice(CRLF);
            },
            Frame::Music { name, data } => {
                let announce = format!("{} {} {}", MUSIC, name, data.len());
                // announcement and payload are written back to back
                dst.reserve(announce.len() + CRLF.len() + data.len());
                dst.put_slice(announce.as_bytes());
                dst.put_slice(CRLF);
                dst.extend_from_slice(&data);
            },
        }

        Ok(())
    }
}

/// Client side codec: decodes frames, encodes command lines
#[derive(Debug, Clone)]
pub struct ClientCodec {
    max_length: usize,
    pending: Option<(String, usize)>, // announced music name and payload length
}

impl ClientCodec {
    pub fn new() -> Self {
        Self::with_max_length(LINES_MAX_LEN * 256)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length: cmp::max(max_length, 1),
            pending: None,
        }
    }
}

impl Default for ClientCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ClientCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if let Some((_, len)) = self.pending.as_ref() {
                let len = *len;
                if src.len() < len {
                    src.reserve(len - src.len());
                    return Ok(None);
                }

                let data = src.split_to(len).freeze();
                let name = self.pending.take().map(|(name, _)| name).unwrap_or_default();
                return Ok(Some(Frame::Music { name, data }));
            }

            let index = match src.iter().position(|b| *b == LF) {
                Some(i) => i,
                None if src.len() > self.max_length => {
                    return Err(Error::new(ErrorKind::InvalidData, "server line too long"))
                },
                None => return Ok(None),
            };

            let line = src.split_to(index + 1);
            let text = decode_line(&line[..index]);

            match parse_announce(&text) {
                Some(Ok(announced)) => {
                    self.pending = Some(announced);
                    continue; // payload may already be buffered
                },
                Some(Err(e)) => return Err(e),
                None => return Ok(Some(Frame::Line(text))),
            }
        }
    }
}

impl Encoder<String> for ClientCodec {
    type Error = Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() + CRLF.len());
        dst.put_slice(item.as_bytes());
        dst.put_slice(CRLF);
        Ok(())
    }
}

// strip an optional carriage return left over from the CRLF terminator
fn decode_line(bytes: &[u8]) -> String {
    let bytes = match bytes.last() {
        Some(&CR) => &bytes[..bytes.len() - 1],
        _ => bytes,
    };
    String::from_utf8_lossy(bytes).into_owned()
}

// "music <name> <len>" -> (name, len), None if the line is not an announcement
fn parse_announce(line: &str) -> Option<Result<(String, usize), Error>> {
    let rest = line.strip_prefix(MUSIC)?.strip_prefix(' ')?;

    let parsed = rest.rsplit_once(' ')
        .and_then(|(name, len)| len.parse::<usize>().ok().map(|len| (name.to_owned(), len)))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("malformed announcement {:?}", line)));

    Some(parsed)
}
