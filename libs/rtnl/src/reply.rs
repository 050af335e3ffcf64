//! Reply parsing.
//!
//! Requests are sent with `NLM_F_ACK`, so the kernel answers every one with
//! an `NLMSG_ERROR` message: error code 0 acknowledges, a negative code is
//! the errno of a rejection. Everything else in the datagram is skipped.

use std::fmt;

use thiserror::Error;

use crate::consts::{NLMSG_ERROR, NLMSG_HDRLEN};

/// Errors from malformed reply datagrams.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplyError {
    #[error("truncated netlink header at offset {offset}")]
    TruncatedHeader { offset: usize },

    #[error("netlink message at offset {offset} claims {len} bytes, {available} available")]
    BadLength {
        offset: usize,
        len: usize,
        available: usize,
    },

    #[error("error message for sequence {seq} is missing its error code")]
    TruncatedError { seq: u32 },

    #[error("error message for sequence {seq} carries unrepresentable code {code}")]
    BadErrorCode { seq: u32, code: i32 },
}

/// A positive errno value reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(pub i32);

impl Errno {
    pub const EEXIST: Errno = Errno(libc::EEXIST);

    pub fn code(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", std::io::Error::from_raw_os_error(self.0))
    }
}

/// Outcome carried by a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Ack,
    Error(Errno),
}

/// A reply correlated by sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub sequence: u32,
    pub status: ReplyStatus,
}

impl Reply {
    pub fn ack(sequence: u32) -> Self {
        Self {
            sequence,
            status: ReplyStatus::Ack,
        }
    }

    pub fn error(sequence: u32, errno: i32) -> Self {
        Self {
            sequence,
            status: ReplyStatus::Error(Errno(errno)),
        }
    }

    /// Encode as an `NLMSG_ERROR` datagram (the reverse of [`parse_replies`]).
    pub fn to_bytes(&self) -> Vec<u8> {
        let code: i32 = match self.status {
            ReplyStatus::Ack => 0,
            ReplyStatus::Error(errno) => errno.code().wrapping_neg(),
        };

        let len = (NLMSG_HDRLEN + 4 + NLMSG_HDRLEN) as u32;
        let mut out = Vec::with_capacity(len as usize);
        out.extend_from_slice(&len.to_ne_bytes());
        out.extend_from_slice(&NLMSG_ERROR.to_ne_bytes());
        out.extend_from_slice(&0u16.to_ne_bytes());
        out.extend_from_slice(&self.sequence.to_ne_bytes());
        out.extend_from_slice(&0u32.to_ne_bytes());
        out.extend_from_slice(&code.to_ne_bytes());
        // Echoed request header; only its length matters to readers
        out.extend_from_slice(&[0u8; NLMSG_HDRLEN]);
        out
    }
}

/// Parse every acknowledgment or error in a datagram.
pub fn parse_replies(buf: &[u8]) -> Result<Vec<Reply>, ReplyError> {
    let mut replies = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        let rest = &buf[offset..];
        if rest.len() < NLMSG_HDRLEN {
            return Err(ReplyError::TruncatedHeader { offset });
        }

        let len = u32::from_ne_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        let msg_type = u16::from_ne_bytes([rest[4], rest[5]]);
        let seq = u32::from_ne_bytes([rest[8], rest[9], rest[10], rest[11]]);
        if len < NLMSG_HDRLEN || len > rest.len() {
            return Err(ReplyError::BadLength {
                offset,
                len,
                available: rest.len(),
            });
        }

        if msg_type == NLMSG_ERROR {
            let body = &rest[NLMSG_HDRLEN..len];
            let raw: [u8; 4] = body
                .get(..4)
                .and_then(|b| b.try_into().ok())
                .ok_or(ReplyError::TruncatedError { seq })?;
            let code = i32::from_ne_bytes(raw);
            replies.push(if code == 0 {
                Reply::ack(seq)
            } else {
                let errno = code
                    .checked_neg()
                    .ok_or(ReplyError::BadErrorCode { seq, code })?;
                Reply::error(seq, errno)
            });
        }

        offset += (len + 3) & !3;
    }

    Ok(replies)
}
