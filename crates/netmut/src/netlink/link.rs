//! Create-or-adopt handles for single links.
//!
//! # Example
//!
//! ```ignore
//! use netmut::netlink::link::Link;
//! use netmut::netlink::types::link::OperState;
//!
//! let link = Link::open("eth-test")?;   // dummy link, created if missing
//! link.set_state(OperState::Up)?;
//! link.set_mtu(9000)?;
//! ```

use std::os::unix::io::RawFd;

use super::addr::{self, Address};
use super::builder::MessageBuilder;
use super::cache::LinkCache;
use super::error::{Error, Result};
use super::interface::{Interface, InterfaceKind};
use super::message::{NLM_F_ACK, NLM_F_CREATE, NLM_F_EXCL, NLM_F_REQUEST, NlMsgType};
use super::session::Session;
use super::socket::{Backend, Protocol, SystemBackend};
use super::types::link::{IfInfoMsg, IflaAttr, IflaInfo, OperState};
use crate::util::addr::{format_mac, parse_mac};
use crate::util::ifname;

/// Driver used when a missing link is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkKind {
    /// Software-only interface with no backing hardware.
    #[default]
    Dummy,
    Bridge,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Dummy => "dummy",
            LinkKind::Bridge => "bridge",
        }
    }
}

/// How [`Link::with_options`] resolves a name.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    create_if_missing: bool,
    kind: LinkKind,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            kind: LinkKind::Dummy,
        }
    }
}

impl LinkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the link when the name does not resolve (default: true).
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn kind(mut self, kind: LinkKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Target network namespace for [`Link::set_namespace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// Namespace of a process.
    Pid(u32),
    /// Open namespace file descriptor.
    Fd(RawFd),
}

/// A kernel link bound by name.
///
/// Getters query the kernel each time. Setters send one sparse
/// RTM_SETLINK carrying only the changed attribute.
pub struct Link<B: Backend = SystemBackend> {
    backend: B,
    iface: Interface,
}

impl Link<SystemBackend> {
    /// Adopt `name`, creating a dummy link when it does not exist.
    pub fn open(name: &str) -> Result<Self> {
        Self::with_options(SystemBackend::new(), name, LinkOptions::default())
    }

    /// Adopt an existing link; never creates.
    pub fn lookup(name: &str) -> Result<Self> {
        Self::with_options(
            SystemBackend::new(),
            name,
            LinkOptions::default().create_if_missing(false),
        )
    }
}

impl<B: Backend> Link<B> {
    /// Resolve `name` through `backend`, creating it if `options` allow.
    pub fn with_options(backend: B, name: &str, options: LinkOptions) -> Result<Self> {
        ifname::validate(name)?;
        let mut iface = Interface::new(name, InterfaceKind::Plain);

        if let Some(index) = LinkCache::refresh(&backend)?.index_of(name) {
            tracing::debug!(link = name, index, "adopting existing link");
            iface.bind(index);
            return Ok(Self { backend, iface });
        }

        if !options.create_if_missing {
            return Err(Error::LinkNotFound {
                name: name.to_string(),
            });
        }

        create_link(&backend, name, options.kind)?;

        // The create ACK carries no index; re-dump to find it.
        let index = LinkCache::refresh(&backend)?
            .index_of(name)
            .ok_or_else(|| Error::LinkNotFound {
                name: name.to_string(),
            })?;
        iface.bind(index);
        Ok(Self { backend, iface })
    }

    pub fn name(&self) -> &str {
        self.iface.name()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn interface(&self) -> &Interface {
        &self.iface
    }

    /// False once deleted or moved to another namespace.
    pub fn exists(&self) -> bool {
        self.iface.exists()
    }

    // ---- getters ----

    pub fn state(&self) -> Result<OperState> {
        self.iface.state(&self.backend)
    }

    pub fn index(&self) -> Result<u32> {
        Ok(self.iface.query(&self.backend)?.ifindex())
    }

    pub fn group(&self) -> Result<u32> {
        Ok(self.iface.query(&self.backend)?.group())
    }

    /// Hardware address as `aa:bb:cc:dd:ee:ff`.
    pub fn mac(&self) -> Result<Option<String>> {
        Ok(self.iface.query(&self.backend)?.mac_address())
    }

    pub fn mtu(&self) -> Result<Option<u32>> {
        Ok(self.iface.query(&self.backend)?.mtu())
    }

    pub fn tx_queue_length(&self) -> Result<Option<u32>> {
        Ok(self.iface.query(&self.backend)?.txqlen())
    }

    /// Index of the bridge this link is enslaved to.
    pub fn master(&self) -> Result<Option<u32>> {
        Ok(self.iface.query(&self.backend)?.master())
    }

    // ---- setters ----

    pub fn set_state(&self, state: OperState) -> Result<()> {
        self.iface.set_state(&self.backend, state)
    }

    /// Ask the kernel to renumber the link.
    ///
    /// Outside a namespace move the kernel acknowledges IFLA_NEW_IFINDEX
    /// without applying it, so the handle only follows the index the
    /// kernel reports afterwards. An unchanged index is an error.
    pub fn set_index(&mut self, index: u32) -> Result<()> {
        self.iface.change(&self.backend, "index", |b| {
            b.append_attr_u32(IflaAttr::NewIfindex as u16, index);
        })?;

        let name = self.name().to_string();
        match LinkCache::refresh(&self.backend)?.index_of(&name) {
            Some(actual) if actual == index => {
                self.iface.bind(actual);
                Ok(())
            }
            Some(actual) => {
                tracing::debug!(link = %name, requested = index, actual, "index change ignored");
                self.iface.bind(actual);
                Err(Error::InvalidState(format!(
                    "kernel kept {} at index {} instead of {}",
                    name, actual, index
                )))
            }
            None => {
                self.iface.release();
                Err(Error::LinkNotFound { name })
            }
        }
    }

    pub fn set_group(&self, group: u32) -> Result<()> {
        self.iface.change(&self.backend, "group", |b| {
            b.append_attr_u32(IflaAttr::Group as u16, group);
        })
    }

    pub fn set_mtu(&self, mtu: u32) -> Result<()> {
        self.iface.change(&self.backend, "mtu", |b| {
            b.append_attr_u32(IflaAttr::Mtu as u16, mtu);
        })
    }

    pub fn set_tx_queue_length(&self, txqlen: u32) -> Result<()> {
        self.iface.change(&self.backend, "tx queue length", |b| {
            b.append_attr_u32(IflaAttr::TxqLen as u16, txqlen);
        })
    }

    /// Set the hardware address from `aa:bb:cc:dd:ee:ff`.
    pub fn set_mac(&self, mac: &str) -> Result<()> {
        let bytes = parse_mac(mac)?;
        tracing::debug!(link = self.name(), mac = %format_mac(&bytes), "setting mac");
        self.iface.change(&self.backend, "mac address", |b| {
            b.append_attr(IflaAttr::Address as u16, &bytes);
        })
    }

    /// Enslave this link to `master` (usually a bridge).
    pub fn set_master(&self, master: &Link<B>) -> Result<()> {
        let master_index = master.iface.resolve_index()?;
        self.iface.change(&self.backend, "master", |b| {
            b.append_attr_u32(IflaAttr::Master as u16, master_index);
        })
    }

    pub fn release_master(&self) -> Result<()> {
        self.iface.change(&self.backend, "master", |b| {
            b.append_attr_u32(IflaAttr::Master as u16, 0);
        })
    }

    /// Move the link into another network namespace.
    ///
    /// The link no longer resolves here afterwards, so the handle is released.
    pub fn set_namespace(&mut self, ns: Namespace) -> Result<()> {
        self.iface.change(&self.backend, "namespace", |b| match ns {
            Namespace::Pid(pid) => b.append_attr_u32(IflaAttr::NetNsPid as u16, pid),
            Namespace::Fd(fd) => b.append_attr_u32(IflaAttr::NetNsFd as u16, fd as u32),
        })?;
        self.iface.release();
        Ok(())
    }

    // ---- addresses ----

    pub fn add_address(&mut self, ip: &str) -> Result<()> {
        addr::add_address(&self.backend, &mut self.iface, ip)
    }

    pub fn remove_address(&mut self, ip: &str) -> Result<()> {
        addr::remove_address(&self.backend, &mut self.iface, ip)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.iface.addresses()
    }

    pub fn has_address(&self, ip: &str) -> bool {
        self.iface.has_address(ip)
    }

    /// Delete the link. The handle cannot be reused afterwards.
    pub fn delete(&mut self) -> Result<()> {
        self.iface.delete(&self.backend)
    }
}

fn create_link<B: Backend + ?Sized>(backend: &B, name: &str, kind: LinkKind) -> Result<()> {
    let mut builder = MessageBuilder::new(
        NlMsgType::RTM_NEWLINK,
        NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
    );
    builder.append(&IfInfoMsg::new());
    builder.append_attr_str(IflaAttr::Ifname as u16, name);
    let linkinfo = builder.nest_start(IflaAttr::Linkinfo as u16);
    builder.append_attr_str(IflaInfo::Kind as u16, kind.as_str());
    builder.nest_end(linkinfo);

    tracing::debug!(link = name, kind = kind.as_str(), "creating link");
    let mut session = Session::open(backend, Protocol::Route)?;
    session.request_ack(builder).map_err(|e| {
        e.with_context(format!("Unable to create {} link {}", kind.as_str(), name))
    })
}
