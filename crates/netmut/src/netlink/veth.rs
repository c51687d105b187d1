//! Veth pairs.
//!
//! Both ends are created by one RTM_NEWLINK: the peer travels nested as
//! `IFLA_LINKINFO > IFLA_INFO_DATA > VETH_INFO_PEER`, carrying its own
//! ifinfomsg and name. Each side keeps its own address map.

use super::addr::{self, Address};
use super::builder::MessageBuilder;
use super::cache::LinkCache;
use super::error::{Error, Result};
use super::interface::{Interface, InterfaceKind, Side};
use super::message::{NLM_F_ACK, NLM_F_CREATE, NLM_F_EXCL, NLM_F_REQUEST, NlMsgType};
use super::session::Session;
use super::socket::{Backend, Protocol, SystemBackend};
use super::types::link::{IfInfoMsg, IflaAttr, IflaInfo, OperState, VETH_INFO_PEER};
use crate::util::ifname;

/// A veth pair and the addresses tracked on each end.
pub struct Veth<B: Backend = SystemBackend> {
    backend: B,
    veth: Interface,
    peer: Interface,
}

impl Veth<SystemBackend> {
    /// Adopt the pair `veth <-> peer`, creating it when neither side exists.
    pub fn create(veth: &str, peer: &str) -> Result<Self> {
        Self::with_backend(SystemBackend::new(), veth, peer)
    }
}

impl<B: Backend> Veth<B> {
    /// Adopt or create the pair through `backend`.
    ///
    /// When exactly one side already exists the call fails with
    /// [`Error::VethPairIncomplete`] and nothing is changed; see
    /// [`Veth::remove_orphan`].
    pub fn with_backend(backend: B, veth: &str, peer: &str) -> Result<Self> {
        validate_pair(veth, peer)?;

        let mut pair = Self {
            backend,
            veth: Interface::new(veth, InterfaceKind::Veth(Side::Veth)),
            peer: Interface::new(peer, InterfaceKind::Veth(Side::Peer)),
        };

        let cache = LinkCache::refresh(&pair.backend)?;
        match (cache.index_of(veth), cache.index_of(peer)) {
            (Some(v), Some(p)) => {
                if !is_veth_pair(&cache, veth, peer) {
                    return Err(Error::InvalidState(format!(
                        "{} and {} exist but are not a veth pair",
                        veth, peer
                    )));
                }
                tracing::debug!(veth, peer, "adopting existing veth pair");
                pair.veth.bind(v);
                pair.peer.bind(p);
                return Ok(pair);
            }
            (Some(_), None) => return Err(incomplete(veth, peer)),
            (None, Some(_)) => return Err(incomplete(peer, veth)),
            (None, None) => {}
        }

        create_pair(&pair.backend, veth, peer)?;

        let cache = LinkCache::refresh(&pair.backend)?;
        match (cache.index_of(veth), cache.index_of(peer)) {
            (Some(v), Some(p)) => {
                pair.veth.bind(v);
                pair.peer.bind(p);
                Ok(pair)
            }
            (Some(_), None) => Err(incomplete(veth, peer)),
            (None, Some(_)) => Err(incomplete(peer, veth)),
            (None, None) => Err(Error::LinkNotFound {
                name: veth.to_string(),
            }),
        }
    }

    pub fn veth(&self) -> &Interface {
        &self.veth
    }

    pub fn peer(&self) -> &Interface {
        &self.peer
    }

    pub fn side(&self, side: Side) -> &Interface {
        match side {
            Side::Veth => &self.veth,
            Side::Peer => &self.peer,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// True while both sides are bound.
    pub fn exists(&self) -> bool {
        self.veth.exists() && self.peer.exists()
    }

    pub fn state(&self, side: Side) -> Result<OperState> {
        self.side(side).state(&self.backend)
    }

    pub fn set_state(&self, side: Side, state: OperState) -> Result<()> {
        self.side(side).set_state(&self.backend, state)
    }

    pub fn add_address(&mut self, side: Side, ip: &str) -> Result<()> {
        let Self { backend, veth, peer } = self;
        let iface = match side {
            Side::Veth => veth,
            Side::Peer => peer,
        };
        addr::add_address(backend, iface, ip)
    }

    pub fn remove_address(&mut self, side: Side, ip: &str) -> Result<()> {
        let Self { backend, veth, peer } = self;
        let iface = match side {
            Side::Veth => veth,
            Side::Peer => peer,
        };
        addr::remove_address(backend, iface, ip)
    }

    pub fn addresses(&self, side: Side) -> impl Iterator<Item = &Address> {
        self.side(side).addresses()
    }

    /// Delete the pair. Removing one end removes the other, so a single
    /// RTM_DELLINK is sent and both sides become terminal.
    pub fn delete(&mut self) -> Result<()> {
        self.veth.delete(&self.backend)?;
        self.peer.mark_deleted();
        Ok(())
    }

    /// Delete whichever single side of `veth <-> peer` exists.
    ///
    /// Returns the side that was removed, or `None` when the pair is
    /// complete or entirely absent (nothing is changed in either case).
    pub fn remove_orphan(backend: &B, veth: &str, peer: &str) -> Result<Option<Side>> {
        validate_pair(veth, peer)?;

        let cache = LinkCache::refresh(backend)?;
        let (side, name, index) = match (cache.index_of(veth), cache.index_of(peer)) {
            (Some(index), None) => (Side::Veth, veth, index),
            (None, Some(index)) => (Side::Peer, peer, index),
            _ => return Ok(None),
        };

        tracing::warn!(link = name, %side, "removing orphaned veth side");
        let mut orphan = Interface::new(name, InterfaceKind::Veth(side));
        orphan.bind(index);
        orphan.delete(backend)?;
        Ok(Some(side))
    }
}

fn validate_pair(veth: &str, peer: &str) -> Result<()> {
    ifname::validate(veth)?;
    ifname::validate(peer)?;
    if veth == peer {
        return Err(Error::InvalidName(format!(
            "{}: veth and peer names must differ",
            veth
        )));
    }
    Ok(())
}

/// Both links are veths and each names the other through IFLA_LINK.
fn is_veth_pair(cache: &LinkCache, veth: &str, peer: &str) -> bool {
    let (Some(v), Some(p)) = (cache.lookup(veth), cache.lookup(peer)) else {
        return false;
    };
    v.kind() == Some("veth")
        && p.kind() == Some("veth")
        && v.link() == Some(p.ifindex())
        && p.link() == Some(v.ifindex())
}

fn incomplete(present: &str, missing: &str) -> Error {
    tracing::warn!(present, missing, "incomplete veth pair");
    Error::VethPairIncomplete {
        present: present.to_string(),
        missing: missing.to_string(),
    }
}

fn create_pair<B: Backend + ?Sized>(backend: &B, veth: &str, peer: &str) -> Result<()> {
    let mut builder = MessageBuilder::new(
        NlMsgType::RTM_NEWLINK,
        NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
    );
    builder.append(&IfInfoMsg::new());
    builder.append_attr_str(IflaAttr::Ifname as u16, veth);

    let linkinfo = builder.nest_start(IflaAttr::Linkinfo as u16);
    builder.append_attr_str(IflaInfo::Kind as u16, "veth");
    let data = builder.nest_start(IflaInfo::Data as u16);
    let peer_info = builder.nest_start(VETH_INFO_PEER);
    builder.append(&IfInfoMsg::new());
    builder.append_attr_str(IflaAttr::Ifname as u16, peer);
    builder.nest_end(peer_info);
    builder.nest_end(data);
    builder.nest_end(linkinfo);

    tracing::debug!(veth, peer, "creating veth pair");
    let mut session = Session::open(backend, Protocol::Route)?;
    session
        .request_ack(builder)
        .map_err(|e| e.with_context(format!("Unable to add veth pair {} <-> {}", veth, peer)))
}
