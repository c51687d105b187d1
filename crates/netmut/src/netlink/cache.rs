//! Snapshot of the kernel's links, keyed by name.

use std::collections::HashMap;

use super::error::{Error, Result};
use super::message::NlMsgType;
use super::messages::LinkMessage;
use super::session::Session;
use super::socket::{Backend, Protocol};

/// Links as reported by one RTM_GETLINK dump.
///
/// The cache is never updated in place. Callers that need a fresh view
/// (for instance right after creating a link) refresh it again.
#[derive(Debug, Clone, Default)]
pub struct LinkCache {
    links: HashMap<String, LinkMessage>,
}

impl LinkCache {
    /// Dump every link over a routing session.
    pub fn refresh<B: Backend + ?Sized>(backend: &B) -> Result<Self> {
        Self::fetch(backend).map_err(|e| Error::CacheAllocationFailed(Box::new(e)))
    }

    fn fetch<B: Backend + ?Sized>(backend: &B) -> Result<Self> {
        let mut session = Session::open(backend, Protocol::Route)?;
        let links: Vec<LinkMessage> = session.dump_typed(NlMsgType::RTM_GETLINK)?;

        let links: HashMap<_, _> = links
            .into_iter()
            .filter_map(|link| link.name().map(str::to_string).map(|name| (name, link)))
            .collect();

        tracing::trace!(count = links.len(), "link cache refreshed");
        Ok(Self { links })
    }

    pub fn lookup(&self, name: &str) -> Option<&LinkMessage> {
        self.links.get(name)
    }

    /// Index of the link called `name`, if present.
    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.lookup(name).map(LinkMessage::ifindex)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Names of all cached links, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.links.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LinkMessage> {
        self.links.values()
    }
}
