//! Request builder.
//!
//! A [`MessageBuilder`] serializes exactly one request. Attributes are
//! written in call order. The first failed append poisons the builder:
//! the partial buffer is dropped, every later call returns the same error,
//! and [`MessageBuilder::finish`] reports it.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::attr::{rta_align, AttrIter, AttrKey, AttrValue, NlAttr, RTA_HDRLEN};
use crate::consts::{
    IFINFOMSG_LEN, NLMSG_HDRLEN, NLM_F_ACK, NLM_F_CREATE, NLM_F_EXCL, NLM_F_REQUEST, RTM_NEWLINK,
};

/// Default request size limit (the kernel's default receive page).
pub const DEFAULT_CAPACITY: usize = 8192;

/// Errors raised while building a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The attribute would push the message past its capacity.
    #[error("could not append {key}: message would exceed {capacity} bytes")]
    Overflow { key: &'static str, capacity: usize },

    /// The payload is longer than an attribute header can describe.
    #[error("could not append {key}: {len} byte payload does not fit an attribute")]
    PayloadTooLarge { key: &'static str, len: usize },

    /// A nest was closed while an inner one was still open.
    #[error("could not close {key}: not the innermost open container")]
    UnbalancedNest { key: &'static str },

    /// `finish` was called with a nest still open.
    #[error("could not finish message: {key} left open")]
    UnclosedNest { key: &'static str },
}

impl EncodeError {
    /// Name of the attribute that failed.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Overflow { key, .. }
            | Self::PayloadTooLarge { key, .. }
            | Self::UnbalancedNest { key }
            | Self::UnclosedNest { key } => key,
        }
    }
}

/// Message type plus header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageKind {
    pub msg_type: u16,
    pub flags: u16,
}

impl MessageKind {
    /// Exclusive link creation with an acknowledgment requested.
    pub const fn new_link() -> Self {
        Self {
            msg_type: RTM_NEWLINK,
            flags: NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
        }
    }
}

/// Handle for an open nested attribute.
///
/// Not `Clone`: each nest is closed exactly once.
#[derive(Debug)]
#[must_use = "a nest must be closed with end_nested"]
pub struct NestToken {
    offset: usize,
    key: AttrKey,
}

/// Single-use request builder.
#[derive(Debug)]
pub struct MessageBuilder {
    buf: BytesMut,
    capacity: usize,
    open: Vec<NestToken>,
    failed: Option<EncodeError>,
}

impl MessageBuilder {
    /// Open a request with the default capacity.
    pub fn new(kind: MessageKind) -> Self {
        Self::with_capacity(kind, DEFAULT_CAPACITY)
    }

    /// Open a request limited to `capacity` bytes.
    pub fn with_capacity(kind: MessageKind, capacity: usize) -> Self {
        let mut buf = BytesMut::with_capacity(capacity.min(DEFAULT_CAPACITY));

        // nlmsghdr: len and seq are patched later, pid 0 addresses the kernel
        buf.put_slice(&0u32.to_ne_bytes());
        buf.put_slice(&kind.msg_type.to_ne_bytes());
        buf.put_slice(&kind.flags.to_ne_bytes());
        buf.put_slice(&0u32.to_ne_bytes());
        buf.put_slice(&0u32.to_ne_bytes());

        // ifinfomsg: AF_UNSPEC, no index, no flag changes
        buf.put_bytes(0, IFINFOMSG_LEN);

        Self {
            buf,
            capacity,
            open: Vec::new(),
            failed: None,
        }
    }

    /// Current encoded length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append one typed attribute.
    pub fn append(&mut self, key: AttrKey, value: impl Into<AttrValue>) -> Result<(), EncodeError> {
        self.check()?;

        let value = value.into();
        let len = RTA_HDRLEN + value.payload_len();
        if len > u16::MAX as usize {
            return Err(self.fail(EncodeError::PayloadTooLarge {
                key: key.name(),
                len: value.payload_len(),
            }));
        }
        self.reserve(key, rta_align(len))?;

        self.buf.put_slice(&(len as u16).to_ne_bytes());
        self.buf.put_slice(&key.id().to_ne_bytes());
        value.put(&mut self.buf);
        self.buf.put_bytes(0, rta_align(len) - len);

        Ok(())
    }

    pub fn append_u8(&mut self, key: AttrKey, value: u8) -> Result<(), EncodeError> {
        self.append(key, AttrValue::U8(value))
    }

    pub fn append_u32(&mut self, key: AttrKey, value: u32) -> Result<(), EncodeError> {
        self.append(key, AttrValue::U32(value))
    }

    pub fn append_flag(&mut self, key: AttrKey, value: bool) -> Result<(), EncodeError> {
        self.append(key, AttrValue::Flag(value))
    }

    pub fn append_string(&mut self, key: AttrKey, value: &str) -> Result<(), EncodeError> {
        self.append(key, AttrValue::Str(value.to_string()))
    }

    /// Open a nested attribute; everything appended until the matching
    /// [`end_nested`](Self::end_nested) lands inside it.
    pub fn begin_nested(&mut self, key: AttrKey) -> Result<NestToken, EncodeError> {
        self.check()?;
        self.reserve(key, RTA_HDRLEN)?;

        let offset = self.buf.len();
        self.buf.put_slice(&0u16.to_ne_bytes());
        self.buf.put_slice(&key.id().to_ne_bytes());
        self.open.push(NestToken { offset, key });

        Ok(NestToken { offset, key })
    }

    /// Close a nested attribute opened by [`begin_nested`](Self::begin_nested).
    pub fn end_nested(&mut self, token: NestToken) -> Result<(), EncodeError> {
        self.check()?;

        if self.open.last().map(|t| t.offset) != Some(token.offset) {
            return Err(self.fail(EncodeError::UnbalancedNest {
                key: token.key.name(),
            }));
        }
        self.open.pop();

        let len = self.buf.len() - token.offset;
        if len > u16::MAX as usize {
            return Err(self.fail(EncodeError::PayloadTooLarge {
                key: token.key.name(),
                len,
            }));
        }
        self.buf[token.offset..token.offset + 2].copy_from_slice(&(len as u16).to_ne_bytes());

        Ok(())
    }

    /// Close the request.
    pub fn finish(mut self) -> Result<Request, EncodeError> {
        self.check()?;

        if let Some(open) = self.open.last() {
            let key = open.key.name();
            return Err(self.fail(EncodeError::UnclosedNest { key }));
        }

        let len = self.buf.len() as u32;
        self.buf[0..4].copy_from_slice(&len.to_ne_bytes());

        Ok(Request { buf: self.buf })
    }

    fn check(&self) -> Result<(), EncodeError> {
        match &self.failed {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn reserve(&mut self, key: AttrKey, additional: usize) -> Result<(), EncodeError> {
        if self.buf.len() + additional > self.capacity {
            return Err(self.fail(EncodeError::Overflow {
                key: key.name(),
                capacity: self.capacity,
            }));
        }
        Ok(())
    }

    fn fail(&mut self, err: EncodeError) -> EncodeError {
        self.buf.clear();
        self.open.clear();
        self.failed = Some(err.clone());
        err
    }
}

/// A finished request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    buf: BytesMut,
}

impl Request {
    /// Stamp the correlation sequence number into the header.
    pub fn set_sequence(&mut self, seq: u32) {
        self.buf[8..12].copy_from_slice(&seq.to_ne_bytes());
    }

    pub fn sequence(&self) -> u32 {
        u32::from_ne_bytes([self.buf[8], self.buf[9], self.buf[10], self.buf[11]])
    }

    pub fn message_type(&self) -> u16 {
        u16::from_ne_bytes([self.buf[4], self.buf[5]])
    }

    pub fn flags(&self) -> u16 {
        u16::from_ne_bytes([self.buf[6], self.buf[7]])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Top-level attributes following the fixed headers.
    pub fn attributes(&self) -> AttrIter<'_> {
        AttrIter::new(&self.buf[NLMSG_HDRLEN + IFINFOMSG_LEN..])
    }

    /// First top-level attribute with the given key.
    pub fn attribute(&self, key: AttrKey) -> Option<NlAttr<'_>> {
        self.attributes().find_key(key)
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::consts::{
        IFLA_IFNAME, IFLA_INFO_DATA, IFLA_INFO_KIND, IFLA_LINKINFO, IFLA_VXLAN_GROUP,
        IFLA_VXLAN_ID, IFLA_VXLAN_TTL,
    };

    #[test]
    fn test_header_layout() {
        let mut builder = MessageBuilder::new(MessageKind::new_link());
        builder.append_string(IFLA_IFNAME, "vx0").unwrap();
        let mut request = builder.finish().unwrap();
        request.set_sequence(42);

        let bytes = request.as_bytes();
        let len = u32::from_ne_bytes(bytes[0..4].try_into().unwrap());
        assert_eq!(len as usize, bytes.len());
        assert_eq!(request.message_type(), RTM_NEWLINK);
        assert_eq!(
            request.flags(),
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL
        );
        assert_eq!(request.sequence(), 42);

        // 16 + 16 header bytes, then "vx0\0" padded into an 8-byte TLV
        assert_eq!(bytes.len(), 40);
        assert_eq!(request.attribute(IFLA_IFNAME).unwrap().as_str(), Some("vx0"));
    }

    #[test]
    fn test_attributes_keep_call_order() {
        let mut builder = MessageBuilder::new(MessageKind::new_link());
        builder.append_u32(IFLA_VXLAN_ID, 7).unwrap();
        builder.append_u8(IFLA_VXLAN_TTL, 64).unwrap();
        builder
            .append(IFLA_VXLAN_GROUP, Ipv4Addr::new(239, 1, 1, 1))
            .unwrap();
        let request = builder.finish().unwrap();

        let kinds: Vec<u16> = request.attributes().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![IFLA_VXLAN_ID.id(), IFLA_VXLAN_TTL.id(), IFLA_VXLAN_GROUP.id()]
        );

        let ttl = request.attribute(IFLA_VXLAN_TTL).unwrap();
        assert_eq!(ttl.as_u8(), Some(64));
    }

    #[test]
    fn test_nested_attributes() {
        let mut builder = MessageBuilder::new(MessageKind::new_link());
        let linkinfo = builder.begin_nested(IFLA_LINKINFO).unwrap();
        builder.append_string(IFLA_INFO_KIND, "vxlan").unwrap();
        let data = builder.begin_nested(IFLA_INFO_DATA).unwrap();
        builder.append_u32(IFLA_VXLAN_ID, 100).unwrap();
        builder.end_nested(data).unwrap();
        builder.end_nested(linkinfo).unwrap();
        let request = builder.finish().unwrap();

        let linkinfo = request.attribute(IFLA_LINKINFO).unwrap();
        let kind = linkinfo.nested().find_key(IFLA_INFO_KIND).unwrap();
        assert_eq!(kind.as_str(), Some("vxlan"));

        let data = linkinfo.nested().find_key(IFLA_INFO_DATA).unwrap();
        let id = data.nested().find_key(IFLA_VXLAN_ID).unwrap();
        assert_eq!(id.as_u32(), Some(100));
    }

    #[test]
    fn test_overflow_names_key_and_poisons() {
        let mut builder = MessageBuilder::with_capacity(MessageKind::new_link(), 40);
        builder.append_u32(IFLA_VXLAN_ID, 1).unwrap();

        let err = builder.append_u8(IFLA_VXLAN_TTL, 1).unwrap_err();
        assert_eq!(err.key(), "IFLA_VXLAN_TTL");
        assert!(builder.is_empty());

        // Later appends and finish report the original failure
        let again = builder.append_u32(IFLA_VXLAN_ID, 2).unwrap_err();
        assert_eq!(again, err);
        assert_eq!(builder.finish().unwrap_err(), err);
    }

    #[test]
    fn test_out_of_order_nest_close() {
        let mut builder = MessageBuilder::new(MessageKind::new_link());
        let outer = builder.begin_nested(IFLA_LINKINFO).unwrap();
        let _inner = builder.begin_nested(IFLA_INFO_DATA).unwrap();

        let err = builder.end_nested(outer).unwrap_err();
        assert!(matches!(err, EncodeError::UnbalancedNest { key: "IFLA_LINKINFO" }));
    }

    #[test]
    fn test_unclosed_nest_fails_finish() {
        let mut builder = MessageBuilder::new(MessageKind::new_link());
        let _linkinfo = builder.begin_nested(IFLA_LINKINFO).unwrap();

        let err = builder.finish().unwrap_err();
        assert_eq!(err.key(), "IFLA_LINKINFO");
    }

    #[test]
    fn test_payload_too_large() {
        let mut builder = MessageBuilder::with_capacity(MessageKind::new_link(), 1 << 20);
        let err = builder
            .append(IFLA_IFNAME, AttrValue::Bytes(vec![0; 70_000]))
            .unwrap_err();
        assert!(matches!(err, EncodeError::PayloadTooLarge { .. }));
    }
}
