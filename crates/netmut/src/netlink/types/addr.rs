//! rtnetlink address ABI.

use zerocopy::{Immutable, IntoBytes};

/// `struct ifaddrmsg`. Scope and flags stay zero: addresses are added
/// with global scope and no IFA_F_* bits.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, IntoBytes, Immutable)]
pub struct IfAddrMsg {
    pub ifa_family: u8,
    pub ifa_prefixlen: u8,
    pub ifa_flags: u8,
    pub ifa_scope: u8,
    pub ifa_index: u32,
}

impl IfAddrMsg {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_family(mut self, family: u8) -> Self {
        self.ifa_family = family;
        self
    }

    pub fn with_prefixlen(mut self, prefixlen: u8) -> Self {
        self.ifa_prefixlen = prefixlen;
        self
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.ifa_index = index;
        self
    }
}

/// IFA_LOCAL is the interface's own address; IFA_ADDRESS the peer, or the
/// same address on broadcast links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum IfaAttr {
    Address = 1,
    Local = 2,
}

pub const AF_INET: u8 = libc::AF_INET as u8;
pub const AF_INET6: u8 = libc::AF_INET6 as u8;
