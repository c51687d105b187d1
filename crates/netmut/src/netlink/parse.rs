//! winnow-based parsing of kernel replies.

use winnow::binary::{Endianness, u16 as nl_u16};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take;

use super::attr::{NLA_HDRLEN, NLA_TYPE_MASK, nla_align};
use super::error::{Error, Result};

/// Result type for winnow parsers.
pub type PResult<T> = core::result::Result<T, ErrMode<ContextError>>;

/// Types that can be parsed from a netlink message payload
/// (everything after the nlmsghdr).
pub trait FromNetlink: Sized {
    /// Parse from a mutable byte slice reference.
    /// The slice is advanced past the consumed bytes.
    fn parse(input: &mut &[u8]) -> PResult<Self>;

    /// Parse from a complete payload.
    fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::parse
            .parse(data)
            .map_err(|e| Error::InvalidMessage(format!("{}", e)))
    }

    /// Write the family header required for dump requests.
    fn write_dump_header(_buf: &mut Vec<u8>) {}
}

/// Parse one attribute and return `(kind, payload)` with flags masked.
pub fn parse_attr<'a>(input: &mut &'a [u8]) -> PResult<(u16, &'a [u8])> {
    let len = nl_u16(Endianness::Native).parse_next(input)? as usize;
    let attr_type = nl_u16(Endianness::Native).parse_next(input)?;

    if len < NLA_HDRLEN {
        return Err(ErrMode::Cut(ContextError::new()));
    }

    let payload: &[u8] = take(len - NLA_HDRLEN).parse_next(input)?;

    let padding = (nla_align(len) - len).min(input.len());
    let _: &[u8] = take(padding).parse_next(input)?;

    Ok((attr_type & NLA_TYPE_MASK, payload))
}

/// Parse all remaining attributes, stopping quietly at a truncated tail.
pub fn parse_attrs<'a>(input: &mut &'a [u8]) -> PResult<Vec<(u16, &'a [u8])>> {
    let mut attrs = Vec::new();
    while input.len() >= NLA_HDRLEN {
        match parse_attr(input) {
            Ok(attr) => attrs.push(attr),
            Err(_) => break,
        }
    }
    Ok(attrs)
}

/// Lossy string from a NUL-terminated attribute payload.
pub fn parse_string_from_bytes(data: &[u8]) -> String {
    let len = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..len]).into_owned()
}
