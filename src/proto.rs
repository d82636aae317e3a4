//! StatsD wire format parsing.
//!
//! A datagram payload is UTF-8 text carrying one event per line:
//!
//! ```text
//! <bucket>:<value>|<type>[@<sample_rate>]
//! ```
//!
//! Type tokens are `c` (counter), `g` (gauge), `ms` (timer), `h` (histogram)
//! and `s` (meter). Parsing is pure and per-line: a malformed line yields an
//! error in place and never aborts the rest of the batch.

use memchr::{memchr, memchr_iter};
use serde::Serialize;
use std::error::Error;
use std::fmt;

/// The five metric kinds of the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Timer,
    Histogram,
    Meter,
}

impl MetricKind {
    /// Maps a wire type token to its kind. Tokens are case sensitive.
    pub fn from_wire(token: &str) -> Option<MetricKind> {
        match token {
            "c" => Some(MetricKind::Counter),
            "g" => Some(MetricKind::Gauge),
            "ms" => Some(MetricKind::Timer),
            "h" => Some(MetricKind::Histogram),
            "s" => Some(MetricKind::Meter),
            _ => None,
        }
    }

    /// The token this kind uses on the wire.
    pub fn wire_token(self) -> &'static str {
        match self {
            MetricKind::Counter => "c",
            MetricKind::Gauge => "g",
            MetricKind::Timer => "ms",
            MetricKind::Histogram => "h",
            MetricKind::Meter => "s",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Timer => "timer",
            MetricKind::Histogram => "histogram",
            MetricKind::Meter => "meter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single decoded metric event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub bucket: String,
    pub value: f64,
    pub kind: MetricKind,
    /// Probability the sender applied when deciding to emit this sample.
    /// 1.0 when the line carries no `@rate` suffix.
    pub sample_rate: f64,
}

/// A line that failed to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line does not match the event grammar.
    Malformed { line: String },
    /// The line is shaped like an event but carries a type token this
    /// server does not know.
    UnknownKind { line: String, token: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Malformed { line } => write!(f, "bad event: {:?}", line),
            ParseError::UnknownKind { line, token } => {
                write!(f, "bad event type {:?}: {:?}", token, line)
            }
        }
    }
}

impl Error for ParseError {}

/// Decodes a whole datagram payload.
///
/// The payload is decoded as UTF-8 (lossily), trimmed, and split on
/// newlines; zero-length line segments are skipped silently. Results come
/// back in line order, one entry per surviving line, so callers can process
/// valid events and report bad lines independently.
pub fn parse_payload(payload: &[u8]) -> Vec<Result<Event, ParseError>> {
    let text = String::from_utf8_lossy(payload);
    let trimmed = text.trim();
    let bytes = trimmed.as_bytes();

    let mut results = Vec::new();
    let mut start = 0;
    for newline in memchr_iter(b'\n', bytes) {
        collect_line(&trimmed[start..newline], &mut results);
        start = newline + 1;
    }
    collect_line(&trimmed[start..], &mut results);
    results
}

fn collect_line(segment: &str, results: &mut Vec<Result<Event, ParseError>>) {
    if !segment.is_empty() {
        results.push(parse_line(segment));
    }
}

/// Decodes one event line. Surrounding whitespace is ignored; errors carry
/// the line as received.
pub fn parse_line(line: &str) -> Result<Event, ParseError> {
    let malformed = || ParseError::Malformed {
        line: line.to_string(),
    };

    let event = line.trim();
    let colon = memchr(b':', event.as_bytes()).ok_or_else(malformed)?;
    let (bucket, rest) = (&event[..colon], &event[colon + 1..]);
    if bucket.is_empty() {
        return Err(malformed());
    }

    let pipe = memchr(b'|', rest.as_bytes()).ok_or_else(malformed)?;
    let value = parse_decimal(&rest[..pipe], true).ok_or_else(malformed)?;

    let suffix = &rest[pipe + 1..];
    let (token, sample_rate) = match memchr(b'@', suffix.as_bytes()) {
        Some(at) => {
            let rate = parse_decimal(&suffix[at + 1..], false).ok_or_else(malformed)?;
            (&suffix[..at], rate)
        }
        None => (suffix, 1.0),
    };
    if sample_rate <= 0.0 {
        return Err(malformed());
    }

    let kind = match MetricKind::from_wire(token) {
        Some(kind) => kind,
        None if !token.is_empty() && token.bytes().all(|b| b.is_ascii_alphabetic()) => {
            return Err(ParseError::UnknownKind {
                line: line.to_string(),
                token: token.to_string(),
            });
        }
        None => return Err(malformed()),
    };

    Ok(Event {
        bucket: bucket.to_string(),
        value,
        kind,
        sample_rate,
    })
}

/// Accepts `digits[.digits]`, with an optional leading minus when `signed`.
/// Signs elsewhere, exponents, and bare or trailing dots are all rejected,
/// as is any parsed value that is not finite.
fn parse_decimal(text: &str, signed: bool) -> Option<f64> {
    let body = if signed {
        text.strip_prefix('-').unwrap_or(text)
    } else {
        text
    };
    let (int_part, frac_part) = match body.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (body, None),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Some(frac) = frac_part {
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }
    text.parse::<f64>().ok().filter(|value| value.is_finite())
}
