//! Netlink message header, flags and datagram walking.

use super::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Round `len` up to the next 4-byte boundary.
#[inline]
pub const fn nlmsg_align(len: usize) -> usize {
    (len + 3) & !3
}

/// Bytes taken by an aligned `nlmsghdr`.
pub const NLMSG_HDRLEN: usize = nlmsg_align(std::mem::size_of::<NlMsgHdr>());

pub const NLM_F_REQUEST: u16 = 0x001;
pub const NLM_F_MULTI: u16 = 0x002;
pub const NLM_F_ACK: u16 = 0x004;
pub const NLM_F_ECHO: u16 = 0x008;
/// `NLM_F_ROOT | NLM_F_MATCH`.
pub const NLM_F_DUMP: u16 = 0x300;
pub const NLM_F_EXCL: u16 = 0x200;
pub const NLM_F_CREATE: u16 = 0x400;
pub const NLM_F_APPEND: u16 = 0x800;

/// Fixed header in front of every netlink message, in host byte order.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlMsgHdr {
    pub nlmsg_len: u32,
    pub nlmsg_type: u16,
    pub nlmsg_flags: u16,
    pub nlmsg_seq: u32,
    pub nlmsg_pid: u32,
}

impl NlMsgHdr {
    /// Header for an empty message; the builder patches the length and
    /// sequence before sending.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self {
            nlmsg_len: NLMSG_HDRLEN as u32,
            nlmsg_type: msg_type,
            nlmsg_flags: flags,
            ..Self::default()
        }
    }

    /// Error payloads double as ACKs when their errno is zero.
    pub fn is_error(&self) -> bool {
        self.nlmsg_type == NlMsgType::ERROR
    }

    pub fn is_done(&self) -> bool {
        self.nlmsg_type == NlMsgType::DONE
    }

    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        prefix(data)
    }
}

fn prefix<T: FromBytes + Immutable + KnownLayout>(data: &[u8]) -> Result<&T> {
    match T::ref_from_prefix(data) {
        Ok((value, _)) => Ok(value),
        Err(_) => Err(Error::Truncated {
            expected: std::mem::size_of::<T>(),
            actual: data.len(),
        }),
    }
}

/// Control and rtnetlink message types.
pub struct NlMsgType;

impl NlMsgType {
    pub const NOOP: u16 = 1;
    pub const ERROR: u16 = 2;
    pub const DONE: u16 = 3;

    pub const RTM_NEWLINK: u16 = 16;
    pub const RTM_DELLINK: u16 = 17;
    pub const RTM_GETLINK: u16 = 18;
    pub const RTM_SETLINK: u16 = 19;
    pub const RTM_NEWADDR: u16 = 20;
    pub const RTM_DELADDR: u16 = 21;
}

/// Walks the messages packed into one received datagram.
///
/// A header whose length overruns the buffer yields one error and ends
/// the walk, since nothing after it can be trusted.
pub struct MessageIter<'a> {
    rest: &'a [u8],
}

impl<'a> MessageIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { rest: data }
    }
}

impl<'a> Iterator for MessageIter<'a> {
    type Item = Result<(&'a NlMsgHdr, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.len() < NLMSG_HDRLEN {
            return None;
        }
        let data = std::mem::take(&mut self.rest);

        let header = match NlMsgHdr::from_bytes(data) {
            Ok(header) => header,
            Err(e) => return Some(Err(e)),
        };
        let len = header.nlmsg_len as usize;
        if !(NLMSG_HDRLEN..=data.len()).contains(&len) {
            return Some(Err(Error::InvalidMessage(format!(
                "message length {} outside datagram of {} bytes",
                len,
                data.len()
            ))));
        }

        self.rest = data.get(nlmsg_align(len)..).unwrap_or_default();
        Some(Ok((header, &data[NLMSG_HDRLEN..len])))
    }
}

/// Payload of an `NLMSG_ERROR` message.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
pub struct NlMsgError {
    /// Negative errno, or zero for an ACK.
    pub error: i32,
    /// Header of the request being answered.
    pub msg: NlMsgHdr,
}

impl NlMsgError {
    /// Extended-ACK attributes after the echoed header are ignored.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        prefix(data)
    }

    pub fn into_result(&self) -> Result<()> {
        match self.error {
            0 => Ok(()),
            errno => Err(Error::from_errno(errno)),
        }
    }
}
