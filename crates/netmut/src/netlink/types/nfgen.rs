//! nfnetlink generic header.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::netlink::error::{Error, Result};

/// nfgenmsg header (4 bytes). `res_id` is kept in network order.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NfGenMsg {
    pub nfgen_family: u8,
    /// NFNETLINK_V0.
    pub version: u8,
    res_id: [u8; 2],
}

/// NFNETLINK_V0.
pub const NFNETLINK_V0: u8 = 0;

impl NfGenMsg {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(family: u8) -> Self {
        Self {
            nfgen_family: family,
            version: NFNETLINK_V0,
            res_id: [0; 2],
        }
    }

    pub fn with_res_id(mut self, res_id: u16) -> Self {
        self.res_id = res_id.to_be_bytes();
        self
    }

    pub fn res_id(&self) -> u16 {
        u16::from_be_bytes(self.res_id)
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: Self::SIZE,
                actual: data.len(),
            })
    }
}
