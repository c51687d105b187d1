//! Attribute (`nlattr`) framing shared by rtnetlink and nfnetlink.

use super::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const NLA_HDRLEN: usize = 4;

/// Set on attributes whose payload is itself an attribute stream.
pub const NLA_F_NESTED: u16 = 0x8000;
/// Strips `NLA_F_NESTED` and `NLA_F_NET_BYTEORDER` from a type.
pub const NLA_TYPE_MASK: u16 = 0x3fff;

#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + 3) & !3
}

/// Attribute header; `nla_len` counts the header but not the padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    pub nla_len: u16,
    pub nla_type: u16,
}

impl NlAttr {
    pub fn new(attr_type: u16, payload_len: usize) -> Self {
        Self {
            nla_len: (NLA_HDRLEN + payload_len) as u16,
            nla_type: attr_type,
        }
    }

    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    pub fn is_nested(&self) -> bool {
        self.nla_type & NLA_F_NESTED != 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        match Self::ref_from_prefix(data) {
            Ok((attr, _)) => Ok(attr),
            Err(_) => Err(Error::Truncated {
                expected: NLA_HDRLEN,
                actual: data.len(),
            }),
        }
    }
}

/// Yields `(kind, payload)` for each attribute in a stream.
///
/// Unknown kinds are left for the caller to skip. A length that does not
/// fit ends the walk.
pub struct AttrIter<'a> {
    data: &'a [u8],
}

impl<'a> AttrIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for AttrIter<'a> {
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let header = NlAttr::from_bytes(self.data).ok()?;
        let len = header.nla_len as usize;
        let kind = header.kind();

        let payload = match self.data.get(NLA_HDRLEN..len) {
            Some(payload) => payload,
            None => {
                // Overrun or undersized header: the rest is unreadable.
                self.data = &[];
                return None;
            }
        };
        self.data = self.data.get(nla_align(len)..).unwrap_or_default();
        Some((kind, payload))
    }
}

/// Typed extraction from attribute payloads.
pub mod get {
    use super::*;

    fn fixed<const N: usize>(data: &[u8], what: &str) -> Result<[u8; N]> {
        data.get(..N)
            .and_then(|b| <[u8; N]>::try_from(b).ok())
            .ok_or_else(|| Error::InvalidAttribute(format!("truncated {} attribute", what)))
    }

    pub fn u8(data: &[u8]) -> Result<u8> {
        fixed::<1>(data, "u8").map(|b| b[0])
    }

    /// Host-endian u32 (routing attributes).
    pub fn u32_ne(data: &[u8]) -> Result<u32> {
        fixed(data, "u32").map(u32::from_ne_bytes)
    }

    /// Network-order u32 (netfilter attributes).
    pub fn u32_be(data: &[u8]) -> Result<u32> {
        fixed(data, "u32").map(u32::from_be_bytes)
    }

    /// Network-order u64 (netfilter object handles).
    pub fn u64_be(data: &[u8]) -> Result<u64> {
        fixed(data, "u64").map(u64::from_be_bytes)
    }

    /// NUL-terminated string; the terminator is optional.
    pub fn string(data: &[u8]) -> Result<&str> {
        let len = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        std::str::from_utf8(&data[..len])
            .map_err(|e| Error::InvalidAttribute(format!("invalid UTF-8: {}", e)))
    }
}
