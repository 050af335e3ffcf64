//! Attribute keys, typed values, and TLV iteration.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{BufMut, BytesMut};

use crate::consts::NLA_TYPE_MASK;

/// Size of `struct rtattr`.
pub const RTA_HDRLEN: usize = 4;

const RTA_ALIGNTO: usize = 4;

/// Round a length up to the attribute alignment.
pub const fn rta_align(len: usize) -> usize {
    (len + RTA_ALIGNTO - 1) & !(RTA_ALIGNTO - 1)
}

/// An attribute type paired with its symbolic name.
///
/// The name travels with the key so an encode failure can say which
/// attribute it was trying to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttrKey {
    id: u16,
    name: &'static str,
}

impl AttrKey {
    /// Create a key.
    pub const fn new(id: u16, name: &'static str) -> Self {
        Self { id, name }
    }

    /// Numeric attribute type.
    pub const fn id(&self) -> u16 {
        self.id
    }

    /// Symbolic name, e.g. `IFLA_VXLAN_TTL`.
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for AttrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A typed attribute payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    U8(u8),
    U32(u32),
    /// Boolean carried as a single byte (0 or 1).
    Flag(bool),
    InAddr(Ipv4Addr),
    In6Addr(Ipv6Addr),
    /// NUL-terminated string.
    Str(String),
    Bytes(Vec<u8>),
}

impl AttrValue {
    /// Length of the payload without header or padding.
    pub fn payload_len(&self) -> usize {
        match self {
            Self::U8(_) | Self::Flag(_) => 1,
            Self::U32(_) | Self::InAddr(_) => 4,
            Self::In6Addr(_) => 16,
            Self::Str(s) => s.len() + 1,
            Self::Bytes(b) => b.len(),
        }
    }

    pub(crate) fn put(&self, buf: &mut BytesMut) {
        match self {
            Self::U8(v) => buf.put_u8(*v),
            Self::Flag(v) => buf.put_u8(u8::from(*v)),
            Self::U32(v) => buf.put_slice(&v.to_ne_bytes()),
            Self::InAddr(a) => buf.put_slice(&a.octets()),
            Self::In6Addr(a) => buf.put_slice(&a.octets()),
            Self::Str(s) => {
                buf.put_slice(s.as_bytes());
                buf.put_u8(0);
            }
            Self::Bytes(b) => buf.put_slice(b),
        }
    }
}

impl From<u8> for AttrValue {
    fn from(v: u8) -> Self {
        Self::U8(v)
    }
}

impl From<u32> for AttrValue {
    fn from(v: u32) -> Self {
        Self::U32(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        Self::Flag(v)
    }
}

impl From<Ipv4Addr> for AttrValue {
    fn from(v: Ipv4Addr) -> Self {
        Self::InAddr(v)
    }
}

impl From<Ipv6Addr> for AttrValue {
    fn from(v: Ipv6Addr) -> Self {
        Self::In6Addr(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

/// An attribute borrowed from a message buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NlAttr<'a> {
    /// Attribute type with the nested/byte-order bits masked off.
    pub kind: u16,
    /// Payload without header or padding.
    pub payload: &'a [u8],
}

impl<'a> NlAttr<'a> {
    pub fn is(&self, key: AttrKey) -> bool {
        self.kind == key.id()
    }

    pub fn as_u8(&self) -> Option<u8> {
        match self.payload {
            [v] => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        let raw: [u8; 4] = self.payload.try_into().ok()?;
        Some(u32::from_ne_bytes(raw))
    }

    pub fn as_ipv4(&self) -> Option<Ipv4Addr> {
        let raw: [u8; 4] = self.payload.try_into().ok()?;
        Some(Ipv4Addr::from(raw))
    }

    pub fn as_ipv6(&self) -> Option<Ipv6Addr> {
        let raw: [u8; 16] = self.payload.try_into().ok()?;
        Some(Ipv6Addr::from(raw))
    }

    /// String payload with the trailing NUL removed.
    pub fn as_str(&self) -> Option<&'a str> {
        let bytes = self.payload.strip_suffix(&[0]).unwrap_or(self.payload);
        std::str::from_utf8(bytes).ok()
    }

    /// Iterate the attributes nested inside this one.
    pub fn nested(&self) -> AttrIter<'a> {
        AttrIter::new(self.payload)
    }
}

/// Iterator over a run of TLV attributes.
///
/// Stops at the first malformed header instead of erroring; callers that
/// need strictness compare what they found against what they expected.
#[derive(Debug, Clone)]
pub struct AttrIter<'a> {
    buf: &'a [u8],
}

impl<'a> AttrIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Find the first attribute with the given key.
    pub fn find_key(self, key: AttrKey) -> Option<NlAttr<'a>> {
        self.into_iter().find(|a| a.is(key))
    }
}

impl<'a> Iterator for AttrIter<'a> {
    type Item = NlAttr<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.len() < RTA_HDRLEN {
            return None;
        }

        let len = u16::from_ne_bytes([self.buf[0], self.buf[1]]) as usize;
        let kind = u16::from_ne_bytes([self.buf[2], self.buf[3]]) & NLA_TYPE_MASK;
        if len < RTA_HDRLEN || len > self.buf.len() {
            self.buf = &[];
            return None;
        }

        let payload = &self.buf[RTA_HDRLEN..len];
        let advance = rta_align(len).min(self.buf.len());
        self.buf = &self.buf[advance..];

        Some(NlAttr { kind, payload })
    }
}
