use std::str::FromStr;

use super::consts::{chain, msg};
use super::{Family, NftObject, Op, Table, submit};
use crate::netlink::builder::MessageBuilder;
use crate::netlink::error::{Error, Result};
use crate::netlink::message::NLM_F_CREATE;
use crate::netlink::socket::Backend;

/// Netfilter hook a base chain attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    PreRouting = 0,
    Input = 1,
    Forward = 2,
    Output = 3,
    PostRouting = 4,
}

impl FromStr for Hook {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "prerouting" => Ok(Hook::PreRouting),
            "input" => Ok(Hook::Input),
            "forward" => Ok(Hook::Forward),
            "output" => Ok(Hook::Output),
            "postrouting" => Ok(Hook::PostRouting),
            _ => Err(Error::InvalidMessage(format!("unknown hook: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainType {
    #[default]
    Filter,
    Nat,
    Route,
}

impl ChainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainType::Filter => "filter",
            ChainType::Nat => "nat",
            ChainType::Route => "route",
        }
    }
}

impl FromStr for ChainType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "filter" => Ok(ChainType::Filter),
            "nat" => Ok(ChainType::Nat),
            "route" => Ok(ChainType::Route),
            _ => Err(Error::InvalidMessage(format!("unknown chain type: {}", s))),
        }
    }
}

/// Default verdict of a base chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Drop = 0,
    Accept = 1,
}

impl FromStr for Policy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "accept" => Ok(Policy::Accept),
            "drop" => Ok(Policy::Drop),
            _ => Err(Error::InvalidMessage(format!("unknown policy: {}", s))),
        }
    }
}

/// A chain inside a [`Table`].
///
/// Without a hook this is a regular chain, reachable only through jumps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    table: String,
    family: Family,
    name: String,
    hook: Option<(Hook, i32)>,
    chain_type: Option<ChainType>,
    policy: Option<Policy>,
    handle: Option<u64>,
}

impl Chain {
    pub fn new(table: &Table, name: impl Into<String>) -> Self {
        Self {
            table: table.name().to_string(),
            family: table.family(),
            name: name.into(),
            hook: None,
            chain_type: None,
            policy: None,
            handle: None,
        }
    }

    /// Attach to `hook` at `priority`, making this a base chain.
    pub fn hook(mut self, hook: Hook, priority: i32) -> Self {
        self.hook = Some((hook, priority));
        self
    }

    pub fn chain_type(mut self, chain_type: ChainType) -> Self {
        self.chain_type = Some(chain_type);
        self
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn create_with<B: Backend + ?Sized>(&mut self, backend: &B) -> Result<()> {
        tracing::debug!(table = %self.table, chain = %self.name, "creating chain");
        submit(backend, self, Op::Create)
    }

    pub fn delete_with<B: Backend + ?Sized>(&mut self, backend: &B) -> Result<()> {
        tracing::debug!(table = %self.table, chain = %self.name, "deleting chain");
        submit(backend, self, Op::Delete)?;
        self.handle = None;
        Ok(())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn is_base(&self) -> bool {
        self.hook.is_some()
    }

    pub fn handle(&self) -> Option<u64> {
        self.handle
    }
}

impl NftObject for Chain {
    fn kind(&self) -> &'static str {
        "chain"
    }

    fn describe(&self) -> String {
        format!("{} {} {}", self.family, self.table, self.name)
    }

    fn family(&self) -> Family {
        self.family
    }

    fn new_command(&self) -> u8 {
        msg::NEWCHAIN
    }

    fn del_command(&self) -> u8 {
        msg::DELCHAIN
    }

    fn create_flags(&self) -> u16 {
        NLM_F_CREATE
    }

    fn handle_attr(&self) -> u16 {
        chain::HANDLE
    }

    fn write_attrs(&self, builder: &mut MessageBuilder, op: Op) -> Result<()> {
        builder.append_attr_str(chain::TABLE, &self.table);
        builder.append_attr_str(chain::NAME, &self.name);
        if op == Op::Delete {
            return Ok(());
        }

        if let Some((hook, priority)) = self.hook {
            let nest = builder.nest_start(chain::HOOK);
            builder.append_attr_u32_be(chain::hook::HOOKNUM, hook as u32);
            builder.append_attr_u32_be(chain::hook::PRIORITY, priority as u32);
            builder.nest_end(nest);

            if let Some(policy) = self.policy {
                builder.append_attr_u32_be(chain::POLICY, policy as u32);
            }
            // Base chains always carry a type.
            let chain_type = self.chain_type.unwrap_or_default();
            builder.append_attr_str(chain::TYPE, chain_type.as_str());
        } else if self.policy.is_some() {
            return Err(Error::InvalidState(format!(
                "chain {} has a policy but no hook",
                self.name
            )));
        }
        Ok(())
    }

    fn handle(&self) -> Option<u64> {
        self.handle
    }

    fn set_handle(&mut self, handle: u64) {
        self.handle = Some(handle);
    }
}
