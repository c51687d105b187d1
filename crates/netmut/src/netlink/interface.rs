//! The kernel-side identity shared by links and veth sides.
//!
//! A [`Link`](super::link::Link) owns one [`Interface`], a
//! [`Veth`](super::veth::Veth) owns two. Queries, sparse updates, deletion
//! and address bookkeeping are implemented once here and reached through
//! [`Interface::resolve_index`], whatever kind of interface is involved.

use std::collections::HashMap;
use std::fmt;

use super::addr::Address;
use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::NlMsgType;
use super::messages::LinkMessage;
use super::parse::FromNetlink;
use super::session::{Session, ack_request, get_request};
use super::socket::{Backend, Protocol};
use super::types::link::{IfInfoMsg, IflaAttr, OperState, iff};

/// One half of a veth pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Side {
    Veth,
    Peer,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Side::Veth => Side::Peer,
            Side::Peer => Side::Veth,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Veth => f.write_str("veth"),
            Side::Peer => f.write_str("peer"),
        }
    }
}

/// What an interface is to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    Plain,
    Veth(Side),
}

/// Whether an interface is backed by a kernel object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Not (or no longer) resolved in this namespace.
    Unbound,
    Bound(u32),
    /// Deleted through this handle. Terminal.
    Deleted,
}

/// A named kernel interface and the addresses this process tracks on it.
#[derive(Debug, Clone)]
pub struct Interface {
    name: String,
    kind: InterfaceKind,
    binding: Binding,
    pub(crate) addresses: HashMap<String, Address>,
}

impl Interface {
    pub(crate) fn new(name: impl Into<String>, kind: InterfaceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            binding: Binding::Unbound,
            addresses: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> InterfaceKind {
        self.kind
    }

    pub fn binding(&self) -> Binding {
        self.binding
    }

    /// True while the interface is bound to a kernel object.
    pub fn exists(&self) -> bool {
        matches!(self.binding, Binding::Bound(_))
    }

    /// Kernel index, or [`Error::LinkNotFound`] when unbound or deleted.
    pub fn resolve_index(&self) -> Result<u32> {
        match self.binding {
            Binding::Bound(index) => Ok(index),
            Binding::Unbound | Binding::Deleted => Err(Error::LinkNotFound {
                name: self.name.clone(),
            }),
        }
    }

    pub(crate) fn bind(&mut self, index: u32) {
        self.binding = Binding::Bound(index);
    }

    /// Forget the kernel object without touching it.
    ///
    /// Tracked addresses are dropped with the binding.
    pub fn release(&mut self) {
        if self.binding != Binding::Deleted {
            self.binding = Binding::Unbound;
        }
        self.addresses.clear();
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.binding = Binding::Deleted;
        self.addresses.clear();
    }

    /// Addresses added or adopted through this handle.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.addresses.values()
    }

    /// Whether `ip` (as written when added) is tracked.
    pub fn has_address(&self, ip: &str) -> bool {
        self.addresses.contains_key(ip)
    }

    /// Fetch the current kernel view of this interface.
    pub(crate) fn query<B: Backend + ?Sized>(&self, backend: &B) -> Result<LinkMessage> {
        let index = self.resolve_index()?;
        let mut builder = get_request(NlMsgType::RTM_GETLINK);
        builder.append(&IfInfoMsg::new().with_index(index));

        let mut session = Session::open(backend, Protocol::Route)?;
        let payload = session.request(builder)?;
        LinkMessage::from_bytes(&payload)
    }

    /// Submit a sparse RTM_SETLINK carrying only what `fill` writes.
    pub(crate) fn change<B, F>(&self, backend: &B, what: &str, fill: F) -> Result<()>
    where
        B: Backend + ?Sized,
        F: FnOnce(&mut MessageBuilder),
    {
        self.change_flags(backend, what, 0, 0, fill)
    }

    /// Like [`change`](Self::change), also updating the `IFF_*` bits in `mask`.
    pub(crate) fn change_flags<B, F>(
        &self,
        backend: &B,
        what: &str,
        flags: u32,
        mask: u32,
        fill: F,
    ) -> Result<()>
    where
        B: Backend + ?Sized,
        F: FnOnce(&mut MessageBuilder),
    {
        let index = self.resolve_index()?;
        let mut builder = ack_request(NlMsgType::RTM_SETLINK);
        builder.append(&IfInfoMsg::new().with_index(index).with_flags(flags, mask));
        fill(&mut builder);

        tracing::debug!(link = %self.name, index, what, "changing link");
        let mut session = Session::open(backend, Protocol::Route)?;
        session
            .request_ack(builder)
            .map_err(|e| e.with_context(format!("Unable to set {} for {} link", what, self.name)))
    }

    /// Operational state as a user would read it.
    pub(crate) fn state<B: Backend + ?Sized>(&self, backend: &B) -> Result<OperState> {
        Ok(self.query(backend)?.effective_state())
    }

    /// Bring the interface up or down and record the operational state.
    pub(crate) fn set_state<B: Backend + ?Sized>(&self, backend: &B, state: OperState) -> Result<()> {
        let (flags, mask) = match state {
            OperState::Up => (iff::UP, iff::UP),
            OperState::Down => (0, iff::UP),
            _ => (0, 0),
        };
        self.change_flags(backend, "state", flags, mask, |b| {
            b.append_attr_u8(IflaAttr::Operstate as u16, state as u8);
        })
    }

    /// Delete the kernel object. On success the interface is terminal.
    pub(crate) fn delete<B: Backend + ?Sized>(&mut self, backend: &B) -> Result<()> {
        let index = self.resolve_index()?;
        let mut builder = ack_request(NlMsgType::RTM_DELLINK);
        builder.append(&IfInfoMsg::new().with_index(index));

        tracing::debug!(link = %self.name, index, "deleting link");
        let mut session = Session::open(backend, Protocol::Route)?;
        session
            .request_ack(builder)
            .map_err(|e| e.with_context(format!("Unable to delete {} link", self.name)))?;

        self.mark_deleted();
        Ok(())
    }
}
