//! nf_tables tables, chains and rules.
//!
//! Every object is sent inside a [`Batch`](super::batch::Batch). Tables,
//! chains and rules differ only in their command numbers and attributes;
//! they implement [`NftObject`] and share one submit path.
//!
//! # Example
//!
//! ```ignore
//! use netmut::netlink::nftables::{Chain, ChainType, Hook, Rule, Table};
//!
//! let table = Table::create("nat-test", "inet")?;
//! let mut chain = Chain::new(&table, "prerouting")
//!     .hook(Hook::PreRouting, -100)
//!     .chain_type(ChainType::Nat);
//! chain.create_with(&SystemBackend::new())?;
//!
//! let mut rule = Rule::new(&chain)
//!     .match_tcp_dport(8080)
//!     .dnat("10.0.0.2".parse()?, Some(80));
//! rule.create_with(&SystemBackend::new())?;
//! ```

pub mod consts;

mod chain;
mod expr;
mod rule;
mod table;

use std::fmt;
use std::str::FromStr;

pub use chain::{Chain, ChainType, Hook, Policy};
pub use expr::{CmpOp, Expr, ImmediateData, MetaKey, NatKind, PayloadBase, Register, Verdict};
pub use rule::Rule;
pub use table::Table;

use super::attr::{AttrIter, get};
use super::batch::{Batch, BatchReceipt};
use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{NLM_F_ACK, NLM_F_ECHO, NLM_F_REQUEST};
use super::socket::Backend;
use super::types::nfgen::NfGenMsg;
use consts::{nfproto, nft_msg_type};

/// Table family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Family {
    Ip,
    Ip6,
    Inet,
    Arp,
    Bridge,
}

impl Family {
    /// NFPROTO_* value carried in the nfgenmsg header.
    pub fn nfproto(&self) -> u8 {
        match self {
            Family::Ip => nfproto::IPV4,
            Family::Ip6 => nfproto::IPV6,
            Family::Inet => nfproto::INET,
            Family::Arp => nfproto::ARP,
            Family::Bridge => nfproto::BRIDGE,
        }
    }

    /// Name as accepted by [`FromStr`] and printed by nft.
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Ip => "ip",
            Family::Ip6 => "ipv6",
            Family::Inet => "inet",
            Family::Arp => "arp",
            Family::Bridge => "bridge",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Family {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ip" => Ok(Family::Ip),
            "ipv6" => Ok(Family::Ip6),
            "inet" => Ok(Family::Inet),
            "arp" => Ok(Family::Arp),
            "bridge" => Ok(Family::Bridge),
            _ => Err(Error::UnsupportedFamily(s.to_string())),
        }
    }
}

/// Whether a message creates or deletes its object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Delete,
}

/// An nf_tables object that can be sent in a batch.
pub trait NftObject {
    /// "table", "chain" or "rule".
    fn kind(&self) -> &'static str;

    /// Human-readable identity for logs and error context.
    fn describe(&self) -> String;

    fn family(&self) -> Family;

    fn new_command(&self) -> u8;

    fn del_command(&self) -> u8;

    /// NLM_F_* bits added to a create on top of REQUEST | ACK | ECHO.
    fn create_flags(&self) -> u16;

    /// Attribute carrying the kernel handle in echoed notifications.
    fn handle_attr(&self) -> u16;

    /// Write the attributes for `op`.
    fn write_attrs(&self, builder: &mut MessageBuilder, op: Op) -> Result<()>;

    fn handle(&self) -> Option<u64>;

    fn set_handle(&mut self, handle: u64);
}

/// Encode `obj` as one nf_tables message.
pub fn message(obj: &dyn NftObject, op: Op) -> Result<MessageBuilder> {
    let (cmd, flags) = match op {
        Op::Create => (
            obj.new_command(),
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_ECHO | obj.create_flags(),
        ),
        Op::Delete => (obj.del_command(), NLM_F_REQUEST | NLM_F_ACK),
    };

    let mut builder = MessageBuilder::new(nft_msg_type(cmd), flags);
    builder.append(&NfGenMsg::new(obj.family().nfproto()));
    obj.write_attrs(&mut builder, op)?;
    Ok(builder)
}

/// Create or delete a single object in its own batch.
pub fn submit<B: Backend + ?Sized>(backend: &B, obj: &mut dyn NftObject, op: Op) -> Result<()> {
    let mut tx = Transaction::new();
    match op {
        Op::Create => tx.add(obj),
        Op::Delete => tx.delete(obj),
    };
    tx.commit(backend)
}

fn echoed_handle(receipt: &BatchReceipt, seq: u32, attr: u16) -> Option<u64> {
    let echo = receipt.echo(seq)?;
    let attrs = echo.payload.get(NfGenMsg::SIZE..)?;
    AttrIter::new(attrs)
        .find(|(kind, _)| *kind == attr)
        .and_then(|(_, value)| get::u64_be(value).ok())
}

/// Several objects committed in one batch, in insertion order.
#[derive(Default)]
pub struct Transaction<'a> {
    entries: Vec<(&'a mut dyn NftObject, Op)>,
}

impl<'a> Transaction<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, obj: &'a mut dyn NftObject) -> &mut Self {
        self.entries.push((obj, Op::Create));
        self
    }

    pub fn delete(&mut self, obj: &'a mut dyn NftObject) -> &mut Self {
        self.entries.push((obj, Op::Delete));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode every object, send the batch and record created handles.
    ///
    /// Encoding errors are reported before the kernel is contacted.
    pub fn commit<B: Backend + ?Sized>(self, backend: &B) -> Result<()> {
        if self.entries.is_empty() {
            return Ok(());
        }

        let messages = self
            .entries
            .iter()
            .map(|(obj, op)| message(&**obj, *op))
            .collect::<Result<Vec<_>>>()?;

        let context = match self.entries.as_slice() {
            [(obj, op)] => format!(
                "Unable to {} {} {}",
                if *op == Op::Create { "create" } else { "delete" },
                obj.kind(),
                obj.describe()
            ),
            entries => format!("Unable to commit nftables batch of {} objects", entries.len()),
        };

        let receipt = Self::send(backend, messages).map_err(|e| e.with_context(context))?;

        for ((obj, op), seq) in self.entries.into_iter().zip(receipt.1) {
            if op != Op::Create {
                continue;
            }
            match echoed_handle(&receipt.0, seq, obj.handle_attr()) {
                Some(handle) => obj.set_handle(handle),
                None => tracing::debug!(kind = obj.kind(), object = %obj.describe(), "no handle echoed"),
            }
        }
        Ok(())
    }

    fn send<B: Backend + ?Sized>(
        backend: &B,
        messages: Vec<MessageBuilder>,
    ) -> Result<(BatchReceipt, Vec<u32>)> {
        let mut batch = Batch::open(backend)?;
        batch.begin(Batch::<B::Transport>::initial_seq())?;
        let seqs = messages
            .into_iter()
            .map(|msg| batch.append(msg))
            .collect::<Result<Vec<_>>>()?;
        batch.end()?;
        Ok((batch.send()?, seqs))
    }
}
