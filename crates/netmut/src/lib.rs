//! Netlink link, address, veth and nftables configuration for Linux.
//!
//! `netmut` talks to the kernel directly over netlink sockets, without
//! shelling out to `ip` or `nft`. It provides:
//!
//! - dummy and bridge links with state, MTU, MAC, group, master and
//!   namespace changes
//! - IPv4/IPv6 address management tracked per interface
//! - veth pairs with per-side addresses
//! - nftables tables, chains and rules committed in atomic batches
//!
//! All calls are blocking.
//!
//! # Features
//!
//! - `serde` - `Serialize` on decoded messages and state enums
//! - `integration` - builds the root-only integration test suite
//!
//! # Example
//!
//! ```ignore
//! use netmut::netlink::{Link, OperState};
//!
//! fn main() -> netmut::Result<()> {
//!     let mut link = Link::open("eth-test")?;
//!     link.set_state(OperState::Up)?;
//!     link.add_address("192.168.100.1/24")?;
//!     println!("{} is {}", link.name(), link.state()?);
//!     Ok(())
//! }
//! ```

pub mod netlink;
pub mod util;

pub use netlink::{Error, Link, Result, SystemBackend, Veth};
