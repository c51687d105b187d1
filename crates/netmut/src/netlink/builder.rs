//! Request construction.

use zerocopy::{Immutable, IntoBytes};

use super::attr::{NLA_F_NESTED, NlAttr, nla_align};
use super::message::{NLMSG_HDRLEN, NlMsgHdr, nlmsg_align};

/// Open nest returned by [`MessageBuilder::nest_start`].
#[derive(Debug, Clone, Copy)]
#[must_use = "a nest must be closed with nest_end"]
pub struct NestToken {
    at: usize,
}

/// One netlink request under construction.
///
/// The header is kept apart from the body and only serialized by
/// [`finish`](Self::finish), which fills in the final length. The body is a
/// fixed family header followed by 4-byte aligned attributes.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    header: NlMsgHdr,
    body: Vec<u8>,
}

impl MessageBuilder {
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self {
            header: NlMsgHdr::new(msg_type, flags),
            body: Vec::with_capacity(64),
        }
    }

    /// Encoded length so far, header included.
    pub fn len(&self) -> usize {
        NLMSG_HDRLEN + self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn msg_type(&self) -> u16 {
        self.header.nlmsg_type
    }

    pub fn flags(&self) -> u16 {
        self.header.nlmsg_flags
    }

    pub fn set_seq(&mut self, seq: u32) {
        self.header.nlmsg_seq = seq;
    }

    pub fn set_pid(&mut self, pid: u32) {
        self.header.nlmsg_pid = pid;
    }

    fn pad(&mut self, to: fn(usize) -> usize) {
        let end = to(self.body.len());
        self.body.resize(end, 0);
    }

    /// Raw bytes, padded to the message alignment.
    pub fn append_bytes(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
        self.pad(nlmsg_align);
    }

    /// Fixed family header such as `ifinfomsg` or `nfgenmsg`.
    pub fn append<T: IntoBytes + Immutable>(&mut self, data: &T) {
        self.append_bytes(data.as_bytes());
    }

    pub fn append_attr(&mut self, attr_type: u16, data: &[u8]) {
        let attr = NlAttr::new(attr_type, data.len());
        self.body.extend_from_slice(attr.as_bytes());
        self.body.extend_from_slice(data);
        self.pad(nla_align);
    }

    pub fn append_attr_u8(&mut self, attr_type: u16, value: u8) {
        self.append_attr(attr_type, &[value]);
    }

    /// Host byte order, as rtnetlink expects.
    pub fn append_attr_u32(&mut self, attr_type: u16, value: u32) {
        self.append_attr(attr_type, &value.to_ne_bytes());
    }

    /// Network byte order, as nfnetlink expects.
    pub fn append_attr_u32_be(&mut self, attr_type: u16, value: u32) {
        self.append_attr(attr_type, &value.to_be_bytes());
    }

    pub fn append_attr_u64_be(&mut self, attr_type: u16, value: u64) {
        self.append_attr(attr_type, &value.to_be_bytes());
    }

    /// String with its trailing NUL.
    pub fn append_attr_str(&mut self, attr_type: u16, value: &str) {
        let attr = NlAttr::new(attr_type, value.len() + 1);
        self.body.extend_from_slice(attr.as_bytes());
        self.body.extend_from_slice(value.as_bytes());
        self.body.push(0);
        self.pad(nla_align);
    }

    pub fn nest_start(&mut self, attr_type: u16) -> NestToken {
        let at = self.body.len();
        let attr = NlAttr::new(attr_type | NLA_F_NESTED, 0);
        self.body.extend_from_slice(attr.as_bytes());
        NestToken { at }
    }

    /// Close a nest. Nests close innermost first; each covers everything
    /// written since its start.
    pub fn nest_end(&mut self, token: NestToken) {
        let len = (self.body.len() - token.at) as u16;
        self.body[token.at..token.at + 2].copy_from_slice(&len.to_ne_bytes());
        self.pad(nla_align);
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.header.nlmsg_len = self.len() as u32;
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(self.header.as_bytes());
        out.append(&mut self.body);
        out
    }
}
