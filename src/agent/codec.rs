//! Wire format of inference frames carried in packet payloads.
//!
//! ```text
//! off  size  field
//!   0     4  magic "SNIA" (0x41494E53, little-endian)
//!   4     1  version (1)
//!   5     1  kind: 1 request, 2 response
//!   6     1  status (responses): 0 completed, 1 timed out, 2 failed, 3 shutting down
//!   7     1  reserved
//!   8     8  correlation id
//!  16     2  max tokens (requests; 0 selects the configured default)
//!  18     2  payload length
//!  20     n  UTF-8 payload
//! ```

use thiserror::Error;

use crate::dispatch::RequestOutcome;

pub const MAGIC: u32 = 0x4149_4E53;
pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = 20;

const KIND_REQUEST: u8 = 1;
const KIND_RESPONSE: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    #[error("bad magic {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown frame kind {0}")]
    UnknownKind(u8),
    #[error("unknown response status {0}")]
    UnknownStatus(u8),
    #[error("payload length {declared} does not match {actual} bytes present")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("payload of {len} bytes exceeds limit {max}")]
    PayloadTooLarge { len: usize, max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseStatus {
    Completed = 0,
    TimedOut = 1,
    Failed = 2,
    ShuttingDown = 3,
}

impl ResponseStatus {
    fn from_u8(raw: u8) -> Result<Self, CodecError> {
        match raw {
            0 => Ok(Self::Completed),
            1 => Ok(Self::TimedOut),
            2 => Ok(Self::Failed),
            3 => Ok(Self::ShuttingDown),
            other => Err(CodecError::UnknownStatus(other)),
        }
    }
}

/// A decoded frame borrowing its text from the packet buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    Request {
        correlation_id: u64,
        max_tokens: u16,
        text: &'a str,
    },
    Response {
        correlation_id: u64,
        status: ResponseStatus,
        text: &'a str,
    },
}

impl Frame<'_> {
    pub fn correlation_id(&self) -> u64 {
        match self {
            Frame::Request { correlation_id, .. } | Frame::Response { correlation_id, .. } => {
                *correlation_id
            }
        }
    }
}

pub fn decode(buf: &[u8]) -> Result<Frame<'_>, CodecError> {
    if buf.len() < HEADER_LEN {
        return Err(CodecError::TooShort(buf.len()));
    }
    let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if magic != MAGIC {
        return Err(CodecError::BadMagic(magic));
    }
    if buf[4] != VERSION {
        return Err(CodecError::UnsupportedVersion(buf[4]));
    }
    let kind = buf[5];
    let status = buf[6];
    let mut id = [0u8; 8];
    id.copy_from_slice(&buf[8..16]);
    let correlation_id = u64::from_le_bytes(id);
    let max_tokens = u16::from_le_bytes([buf[16], buf[17]]);
    let declared = u16::from_le_bytes([buf[18], buf[19]]) as usize;

    let body = &buf[HEADER_LEN..];
    if body.len() != declared {
        return Err(CodecError::LengthMismatch { declared, actual: body.len() });
    }
    let text = std::str::from_utf8(body).map_err(|_| CodecError::InvalidUtf8)?;

    match kind {
        KIND_REQUEST => Ok(Frame::Request { correlation_id, max_tokens, text }),
        KIND_RESPONSE => Ok(Frame::Response {
            correlation_id,
            status: ResponseStatus::from_u8(status)?,
            text,
        }),
        other => Err(CodecError::UnknownKind(other)),
    }
}

/// Largest payload that fits a frame of `frame_size` bytes.
pub fn max_payload(frame_size: usize) -> usize {
    frame_size.saturating_sub(HEADER_LEN).min(u16::MAX as usize)
}

fn encode_into(
    out: &mut Vec<u8>,
    kind: u8,
    status: u8,
    correlation_id: u64,
    max_tokens: u16,
    text: &str,
    frame_size: usize,
) -> Result<(), CodecError> {
    let max = max_payload(frame_size);
    if text.len() > max {
        return Err(CodecError::PayloadTooLarge { len: text.len(), max });
    }
    out.clear();
    out.reserve(HEADER_LEN + text.len());
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.push(VERSION);
    out.push(kind);
    out.push(status);
    out.push(0);
    out.extend_from_slice(&correlation_id.to_le_bytes());
    out.extend_from_slice(&max_tokens.to_le_bytes());
    out.extend_from_slice(&(text.len() as u16).to_le_bytes());
    out.extend_from_slice(text.as_bytes());
    Ok(())
}

pub fn encode_request(
    out: &mut Vec<u8>,
    correlation_id: u64,
    max_tokens: u16,
    text: &str,
    frame_size: usize,
) -> Result<(), CodecError> {
    encode_into(out, KIND_REQUEST, 0, correlation_id, max_tokens, text, frame_size)
}

pub fn encode_response(
    out: &mut Vec<u8>,
    correlation_id: u64,
    status: ResponseStatus,
    text: &str,
    frame_size: usize,
) -> Result<(), CodecError> {
    encode_into(out, KIND_RESPONSE, status as u8, correlation_id, 0, text, frame_size)
}

/// Encode the response frame for a finished request. Text that does not
/// fit is cut at a character boundary.
pub fn encode_outcome(
    out: &mut Vec<u8>,
    correlation_id: u64,
    outcome: &RequestOutcome,
    frame_size: usize,
) -> Result<(), CodecError> {
    let failure;
    let (status, text) = match outcome {
        RequestOutcome::Completed(text) => (ResponseStatus::Completed, text.as_str()),
        RequestOutcome::TimedOut => (ResponseStatus::TimedOut, ""),
        RequestOutcome::Failed(e) => {
            failure = e.to_string();
            (ResponseStatus::Failed, failure.as_str())
        }
        RequestOutcome::ShuttingDown => (ResponseStatus::ShuttingDown, ""),
    };
    let text = truncate_utf8(text, max_payload(frame_size));
    encode_response(out, correlation_id, status, text, frame_size)
}

fn truncate_utf8(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
