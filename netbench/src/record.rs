//! Wire format for measurement records.
//!
//! Every unit exchanged between a sender and a receiver is a [`Record`]:
//! either a sequenced, timestamped [`Measurement`] or the [`Record::Stop`]
//! termination marker.  This module is responsible for:
//! - Rendering a [`Record`] as UTF-8 text.
//! - Framing that text for a given transport ([`Framing`]).
//! - Parsing raw bytes back into a [`Record`], returning [`RecordError`] for
//!   anything that does not match the grammar.
//! - Reassembling newline-delimited records from a byte stream
//!   ([`LineBuffer`]).
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! ```text
//! record      = measurement | "STOP"
//! measurement = DIGIT+ ":" FLOAT ":" PAYLOAD
//! ```
//!
//! | Framing      | Delimiter                    | Unit               |
//! |--------------|------------------------------|--------------------|
//! | [`Framing::Line`]     | `\n` after every record | stream chunk(s)    |
//! | [`Framing::Datagram`] | none                    | exactly one datagram |
//!
//! The timestamp is written with `f64`'s `Display`, which emits the shortest
//! decimal that parses back to the identical value.

use thiserror::Error;

/// Literal bytes of the termination marker.
pub const STOP_MARKER: &[u8] = b"STOP";

/// Record separator on the stream transport.
pub const RECORD_SEPARATOR: u8 = b'\n';

/// Separator between the three fields of a measurement.
const FIELD_SEPARATOR: char = ':';

/// How records are delimited on a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Newline-terminated records on an ordered byte stream.
    Line,
    /// One record per datagram, no delimiter.
    Datagram,
}

impl std::fmt::Display for Framing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Framing::Line => write!(f, "TCP"),
            Framing::Datagram => write!(f, "UDP"),
        }
    }
}

/// A single sequenced, timestamped message.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Position in the run, starting at 0.
    pub sequence: u64,
    /// Seconds since the Unix epoch when the record was encoded.
    pub send_timestamp: f64,
    /// Filler content.
    pub payload: String,
}

/// Anything that can appear on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Data(Measurement),
    Stop,
}

impl Measurement {
    pub fn new(sequence: u64, send_timestamp: f64, payload: impl Into<String>) -> Self {
        Self {
            sequence,
            send_timestamp,
            payload: payload.into(),
        }
    }
}

impl Record {
    /// Render the record as unframed text bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Record::Stop => STOP_MARKER.to_vec(),
            Record::Data(m) => format!(
                "{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}",
                m.sequence, m.send_timestamp, m.payload
            )
            .into_bytes(),
        }
    }

    /// Render the record and apply `framing`.
    ///
    /// Fails with [`RecordError::SeparatorInPayload`] if a line-framed payload
    /// contains the record separator, since the receiver could not split it
    /// back out.
    pub fn encode_framed(&self, framing: Framing) -> Result<Vec<u8>, RecordError> {
        let mut bytes = self.encode();
        if framing == Framing::Line {
            if let Record::Data(m) = self {
                if m.payload.as_bytes().contains(&RECORD_SEPARATOR) {
                    return Err(RecordError::SeparatorInPayload);
                }
            }
            bytes.push(RECORD_SEPARATOR);
        }
        Ok(bytes)
    }

    /// Parse one unframed record.
    ///
    /// The payload is everything after the second `:`, so it may itself
    /// contain `:`.
    pub fn decode(buf: &[u8]) -> Result<Self, RecordError> {
        if buf == STOP_MARKER {
            return Ok(Record::Stop);
        }

        let text = std::str::from_utf8(buf).map_err(|_| RecordError::NotUtf8)?;
        let fields: Vec<&str> = text.splitn(3, FIELD_SEPARATOR).collect();
        let &[sequence, timestamp, payload] = fields.as_slice() else {
            return Err(RecordError::FieldCount(fields.len()));
        };

        Ok(Record::Data(Measurement {
            sequence: parse_sequence(sequence)?,
            send_timestamp: parse_timestamp(timestamp)?,
            payload: payload.to_string(),
        }))
    }
}

/// Accepts only a non-empty run of ASCII digits; `u64::from_str` alone would
/// also let a leading `+` through.
fn parse_sequence(field: &str) -> Result<u64, RecordError> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RecordError::BadSequence(field.to_string()));
    }
    field
        .parse()
        .map_err(|_| RecordError::BadSequence(field.to_string()))
}

fn parse_timestamp(field: &str) -> Result<f64, RecordError> {
    match field.parse::<f64>() {
        Ok(ts) if ts.is_finite() => Ok(ts),
        _ => Err(RecordError::BadTimestamp(field.to_string())),
    }
}

/// Reasons a record could not be encoded or decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("malformed record: not valid UTF-8")]
    NotUtf8,
    #[error("malformed record: expected 3 fields, found {0}")]
    FieldCount(usize),
    #[error("malformed record: sequence {0:?} is not a non-negative integer")]
    BadSequence(String),
    #[error("malformed record: timestamp {0:?} is not a finite number")]
    BadTimestamp(String),
    #[error("payload contains the record separator")]
    SeparatorInPayload,
}

// ---------------------------------------------------------------------------
// LineBuffer
// ---------------------------------------------------------------------------

/// Reassembles newline-delimited records from arbitrarily sized chunks.
///
/// A line is only yielded once its separator has arrived, so a record split
/// across two reads stays buffered until the second read completes it.
///
/// Consumed lines are tracked by a read offset; the buffer is compacted once
/// per [`extend`](Self::extend), not once per line.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    /// Start of the first unconsumed byte in `buf`.
    start: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly received bytes.
    pub fn extend(&mut self, chunk: &[u8]) {
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.start = 0;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete line, without its separator.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let rest = &self.buf[self.start..];
        let pos = rest.iter().position(|&b| b == RECORD_SEPARATOR)?;
        let line = rest[..pos].to_vec();
        self.start += pos + 1;
        Some(line)
    }

    /// Bytes received after the last separator.
    pub fn pending(&self) -> usize {
        self.buf.len() - self.start
    }
}
