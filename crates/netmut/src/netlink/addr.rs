//! IP addresses attached to an [`Interface`].
//!
//! Addresses are keyed by the literal string the caller used, so
//! `"10.0.0.1/24"` and `"10.0.0.1"` are tracked separately.

use std::net::IpAddr;

use super::builder::MessageBuilder;
use super::error::Result;
use super::interface::Interface;
use super::message::{NLM_F_ACK, NLM_F_CREATE, NLM_F_EXCL, NLM_F_REQUEST, NlMsgType};
use super::session::Session;
use super::socket::{Backend, Protocol};
use super::types::addr::{AF_INET, AF_INET6, IfAddrMsg, IfaAttr};
use crate::util::addr::parse_prefix;

/// Where an address is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AddressState {
    /// Parsed, not yet acknowledged by the kernel.
    Pending,
    Applied,
    Removed,
}

/// An IP address bound to one interface index.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Address {
    literal: String,
    addr: IpAddr,
    prefix_len: u8,
    ifindex: u32,
    state: AddressState,
}

impl Address {
    /// Parse `literal` (`addr` or `addr/prefix`) for the interface at `ifindex`.
    pub fn parse(literal: &str, ifindex: u32) -> Result<Self> {
        let (addr, prefix_len) = parse_prefix(literal)?;
        Ok(Self {
            literal: literal.to_string(),
            addr,
            prefix_len,
            ifindex,
            state: AddressState::Pending,
        })
    }

    pub fn literal(&self) -> &str {
        &self.literal
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }

    pub fn state(&self) -> AddressState {
        self.state
    }

    fn family(&self) -> u8 {
        match self.addr {
            IpAddr::V4(_) => AF_INET,
            IpAddr::V6(_) => AF_INET6,
        }
    }

    fn octets(&self) -> Vec<u8> {
        match self.addr {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        }
    }

    fn message(&self, msg_type: u16, flags: u16) -> MessageBuilder {
        let mut builder = MessageBuilder::new(msg_type, flags);
        builder.append(
            &IfAddrMsg::new()
                .with_family(self.family())
                .with_prefixlen(self.prefix_len)
                .with_index(self.ifindex),
        );
        let octets = self.octets();
        builder.append_attr(IfaAttr::Local as u16, &octets);
        builder.append_attr(IfaAttr::Address as u16, &octets);
        builder
    }

    fn apply<B: Backend + ?Sized>(&mut self, backend: &B) -> Result<()> {
        let builder = self.message(
            NlMsgType::RTM_NEWADDR,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
        );
        let mut session = Session::open(backend, Protocol::Route)?;
        session.request_ack(builder)?;
        self.state = AddressState::Applied;
        Ok(())
    }

    fn withdraw<B: Backend + ?Sized>(&mut self, backend: &B) -> Result<()> {
        let builder = self.message(NlMsgType::RTM_DELADDR, NLM_F_REQUEST | NLM_F_ACK);
        let mut session = Session::open(backend, Protocol::Route)?;
        session.request_ack(builder)?;
        self.state = AddressState::Removed;
        Ok(())
    }
}

/// Add `ip` to `iface` unless it is already tracked there.
pub(crate) fn add_address<B: Backend + ?Sized>(
    backend: &B,
    iface: &mut Interface,
    ip: &str,
) -> Result<()> {
    if iface.has_address(ip) {
        return Ok(());
    }

    let mut address = Address::parse(ip, iface.resolve_index()?)?;
    tracing::debug!(link = iface.name(), address = ip, "adding address");
    address
        .apply(backend)
        .map_err(|e| e.with_context(format!("Unable to set ip address for {} link", iface.name())))?;

    iface.addresses.insert(ip.to_string(), address);
    Ok(())
}

/// Remove `ip` from `iface`, tracked or not.
pub(crate) fn remove_address<B: Backend + ?Sized>(
    backend: &B,
    iface: &mut Interface,
    ip: &str,
) -> Result<()> {
    let mut address = match iface.addresses.get(ip) {
        Some(tracked) => tracked.clone(),
        None => Address::parse(ip, iface.resolve_index()?)?,
    };

    tracing::debug!(link = iface.name(), address = ip, "removing address");
    address.withdraw(backend).map_err(|e| {
        e.with_context(format!("Unable to remove ip address from {} link", iface.name()))
    })?;

    iface.addresses.remove(ip);
    Ok(())
}
