//! Decoded RTM_NEWLINK messages.

use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take;
use zerocopy::IntoBytes;

use crate::netlink::attr::{AttrIter, get};
use crate::netlink::parse::{FromNetlink, PResult, parse_attrs, parse_string_from_bytes};
use crate::netlink::types::link::{IfInfoMsg, IflaInfo, OperState, iff};
use crate::util::addr::format_mac;

const RUNNING_MASK: u32 = iff::UP | iff::LOWER_UP;

/// A link as reported by the kernel in a dump or single-link reply.
#[derive(Debug, Clone, Default)]
pub struct LinkMessage {
    pub(crate) header: IfInfoMsg,
    pub(crate) name: Option<String>,
    pub(crate) address: Option<Vec<u8>>,
    pub(crate) broadcast: Option<Vec<u8>>,
    pub(crate) mtu: Option<u32>,
    pub(crate) txqlen: Option<u32>,
    pub(crate) operstate: Option<OperState>,
    pub(crate) group: Option<u32>,
    pub(crate) master: Option<u32>,
    pub(crate) link: Option<u32>,
    pub(crate) kind: Option<String>,
}

impl LinkMessage {
    pub fn ifindex(&self) -> u32 {
        self.header.ifi_index as u32
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Get the name or a default value.
    pub fn name_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(default)
    }

    /// Device flags (IFF_*).
    pub fn flags(&self) -> u32 {
        self.header.ifi_flags
    }

    pub fn is_up(&self) -> bool {
        self.header.ifi_flags & iff::UP != 0
    }

    pub fn mtu(&self) -> Option<u32> {
        self.mtu
    }

    pub fn txqlen(&self) -> Option<u32> {
        self.txqlen
    }

    /// Raw IF_OPER_* value as reported.
    pub fn operstate(&self) -> OperState {
        self.operstate.unwrap_or(OperState::Unknown)
    }

    /// Operational state with software devices taken into account.
    ///
    /// Drivers without carrier tracking (dummy, bridge without ports)
    /// report `UNKNOWN` while the device is up and passing traffic.
    pub fn effective_state(&self) -> OperState {
        match self.operstate() {
            OperState::Unknown if self.flags() & RUNNING_MASK == RUNNING_MASK => OperState::Up,
            state => state,
        }
    }

    pub fn group(&self) -> u32 {
        self.group.unwrap_or(0)
    }

    /// Master device index, if enslaved.
    pub fn master(&self) -> Option<u32> {
        self.master.filter(|&m| m != 0)
    }

    /// Peer/parent link index (IFLA_LINK).
    pub fn link(&self) -> Option<u32> {
        self.link
    }

    /// Hardware address formatted as `aa:bb:cc:dd:ee:ff`.
    pub fn mac_address(&self) -> Option<String> {
        self.address.as_deref().filter(|a| !a.is_empty()).map(format_mac)
    }

    pub fn broadcast(&self) -> Option<String> {
        self.broadcast.as_deref().filter(|a| !a.is_empty()).map(format_mac)
    }

    /// Link kind from IFLA_LINKINFO (e.g. "dummy", "veth", "bridge").
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }
}

mod attr_ids {
    use crate::netlink::types::link::IflaAttr;

    pub const IFLA_ADDRESS: u16 = IflaAttr::Address as u16;
    pub const IFLA_BROADCAST: u16 = IflaAttr::Broadcast as u16;
    pub const IFLA_IFNAME: u16 = IflaAttr::Ifname as u16;
    pub const IFLA_MTU: u16 = IflaAttr::Mtu as u16;
    pub const IFLA_LINK: u16 = IflaAttr::Link as u16;
    pub const IFLA_MASTER: u16 = IflaAttr::Master as u16;
    pub const IFLA_TXQLEN: u16 = IflaAttr::TxqLen as u16;
    pub const IFLA_OPERSTATE: u16 = IflaAttr::Operstate as u16;
    pub const IFLA_LINKINFO: u16 = IflaAttr::Linkinfo as u16;
    pub const IFLA_GROUP: u16 = IflaAttr::Group as u16;
}

impl FromNetlink for LinkMessage {
    fn write_dump_header(buf: &mut Vec<u8>) {
        buf.extend_from_slice(IfInfoMsg::new().as_bytes());
    }

    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let header_bytes: &[u8] = take(IfInfoMsg::SIZE).parse_next(input)?;
        let header = *IfInfoMsg::from_bytes(header_bytes)
            .map_err(|_| ErrMode::Cut(ContextError::new()))?;

        let mut msg = LinkMessage {
            header,
            ..Default::default()
        };

        for (kind, data) in parse_attrs(input)? {
            match kind {
                attr_ids::IFLA_IFNAME => msg.name = Some(parse_string_from_bytes(data)),
                attr_ids::IFLA_ADDRESS => msg.address = Some(data.to_vec()),
                attr_ids::IFLA_BROADCAST => msg.broadcast = Some(data.to_vec()),
                attr_ids::IFLA_MTU => msg.mtu = get::u32_ne(data).ok(),
                attr_ids::IFLA_TXQLEN => msg.txqlen = get::u32_ne(data).ok(),
                attr_ids::IFLA_GROUP => msg.group = get::u32_ne(data).ok(),
                attr_ids::IFLA_MASTER => msg.master = get::u32_ne(data).ok(),
                attr_ids::IFLA_LINK => msg.link = get::u32_ne(data).ok(),
                attr_ids::IFLA_OPERSTATE => msg.operstate = get::u8(data).ok().map(OperState::from),
                attr_ids::IFLA_LINKINFO => {
                    msg.kind = AttrIter::new(data)
                        .find(|(k, _)| *k == IflaInfo::Kind as u16)
                        .map(|(_, v)| parse_string_from_bytes(v));
                }
                _ => {}
            }
        }

        Ok(msg)
    }
}
