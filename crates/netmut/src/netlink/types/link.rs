//! rtnetlink link ABI: `ifinfomsg`, IFLA attribute ids and flag bits.

use std::fmt;
use std::str::FromStr;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::netlink::error::{Error, Result};

/// `struct ifinfomsg`, the fixed header of every RTM_*LINK message.
///
/// Only bits set in `ifi_change` are applied from `ifi_flags` on a
/// SETLINK; a zero mask leaves the device flags alone.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IfInfoMsg {
    pub ifi_family: u8,
    pub __ifi_pad: u8,
    pub ifi_type: u16,
    pub ifi_index: i32,
    pub ifi_flags: u32,
    pub ifi_change: u32,
}

impl IfInfoMsg {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.ifi_index = index as i32;
        self
    }

    pub fn with_flags(mut self, flags: u32, change: u32) -> Self {
        self.ifi_flags = flags;
        self.ifi_change = change;
        self
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        let (msg, _) = Self::ref_from_prefix(data).map_err(|_| Error::Truncated {
            expected: Self::SIZE,
            actual: data.len(),
        })?;
        Ok(msg)
    }
}

/// Top-level IFLA_* attributes this crate reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum IflaAttr {
    Address = 1,
    Broadcast = 2,
    Ifname = 3,
    Mtu = 4,
    Link = 5,
    Master = 10,
    TxqLen = 13,
    Operstate = 16,
    Linkinfo = 18,
    NetNsPid = 19,
    Group = 27,
    NetNsFd = 28,
    NewIfindex = 49,
}

/// Nested IFLA_LINKINFO attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum IflaInfo {
    Kind = 1,
    Data = 2,
}

/// `VETH_INFO_PEER`: an `ifinfomsg` plus attributes describing the peer.
pub const VETH_INFO_PEER: u16 = 1;

pub mod iff {
    pub const UP: u32 = 1 << 0;
    pub const RUNNING: u32 = 1 << 6;
    pub const LOWER_UP: u32 = 1 << 16;
}

/// RFC 2863 operational state, as carried in IFLA_OPERSTATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum OperState {
    Unknown = 0,
    NotPresent = 1,
    Down = 2,
    LowerLayerDown = 3,
    Testing = 4,
    Dormant = 5,
    Up = 6,
}

impl From<u8> for OperState {
    fn from(val: u8) -> Self {
        match val {
            1 => Self::NotPresent,
            2 => Self::Down,
            3 => Self::LowerLayerDown,
            4 => Self::Testing,
            5 => Self::Dormant,
            6 => Self::Up,
            _ => Self::Unknown,
        }
    }
}

impl OperState {
    /// Name as printed by iproute2.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::NotPresent => "NOT_PRESENT",
            Self::Down => "DOWN",
            Self::LowerLayerDown => "LOWERLAYERDOWN",
            Self::Testing => "TESTING",
            Self::Dormant => "DORMANT",
            Self::Up => "UP",
        }
    }
}

impl fmt::Display for OperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "dormant" => Ok(Self::Dormant),
            "testing" => Ok(Self::Testing),
            "lowerlayerdown" => Ok(Self::LowerLayerDown),
            "notpresent" => Ok(Self::NotPresent),
            "unknown" => Ok(Self::Unknown),
            _ => Err(Error::ParseFailed(format!("unknown link state '{}'", s))),
        }
    }
}
