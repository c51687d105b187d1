//! Synchronous netlink configuration for Linux.
//!
//! Every operation opens its own [`Session`] on a fresh socket and closes it
//! when done, so objects never hold kernel resources between calls.
//!
//! # Quick Start
//!
//! ```ignore
//! use netmut::netlink::{Link, Veth, OperState, Side};
//!
//! // Create (or adopt) a dummy link and configure it
//! let mut link = Link::open("eth-test")?;
//! link.set_state(OperState::Up)?;
//! link.add_address("192.168.100.1/24")?;
//!
//! // Veth pairs track addresses per side
//! let mut pair = Veth::create("v0", "v0p")?;
//! pair.add_address(Side::Peer, "10.0.0.2/24")?;
//! ```
//!
//! # nftables
//!
//! Tables, chains and rules are committed through nfnetlink batches:
//!
//! ```ignore
//! use netmut::netlink::nftables::Table;
//!
//! let table = Table::create("nat-test", "inet")?;
//! println!("handle {:?}", table.handle());
//! ```
//!
//! # Namespaces
//!
//! [`SystemBackend::in_namespace`] opens every socket inside a named
//! network namespace; [`Backend`] can be implemented to substitute the
//! kernel entirely.

pub mod addr;
pub mod attr;
pub mod batch;
mod builder;
pub mod cache;
mod error;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod interface;
pub mod link;
pub mod message;
pub mod messages;
pub mod nftables;
pub mod parse;
pub mod session;
mod socket;
pub mod types;
pub mod veth;

pub use addr::{Address, AddressState};
pub use attr::{AttrIter, NlAttr};
pub use batch::{Batch, BatchReceipt, BatchState};
pub use builder::{MessageBuilder, NestToken};
pub use cache::LinkCache;
pub use error::{Error, Result};
pub use interface::{Binding, Interface, InterfaceKind, Side};
pub use link::{Link, LinkKind, LinkOptions, Namespace};
pub use message::{MessageIter, NLMSG_HDRLEN, NlMsgHdr, NlMsgType};
pub use messages::LinkMessage;
pub use parse::FromNetlink;
pub use session::Session;
pub use socket::{Backend, NetlinkSocket, Protocol, SystemBackend, Transport};
pub use types::link::OperState;
pub use veth::Veth;
