use super::consts::{msg, table};
use super::{Family, NftObject, Op, submit};
use crate::netlink::builder::MessageBuilder;
use crate::netlink::error::Result;
use crate::netlink::message::NLM_F_CREATE;
use crate::netlink::socket::{Backend, SystemBackend};

/// An nf_tables table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
    family: Family,
    flags: u32,
    handle: Option<u64>,
}

impl Table {
    /// Describe a table without touching the kernel.
    pub fn new(name: impl Into<String>, family: Family) -> Self {
        Self {
            name: name.into(),
            family,
            flags: 0,
            handle: None,
        }
    }

    /// Create `name` in `family` ("ip", "ipv6", "inet", "arp" or "bridge").
    ///
    /// An unknown family fails with
    /// [`Error::UnsupportedFamily`](crate::netlink::Error::UnsupportedFamily)
    /// before any socket is opened.
    pub fn create(name: &str, family: &str) -> Result<Self> {
        Self::create_in(&SystemBackend::new(), name, family)
    }

    pub fn create_in<B: Backend + ?Sized>(backend: &B, name: &str, family: &str) -> Result<Self> {
        let mut table = Self::new(name, family.parse()?);
        table.create_with(backend)?;
        Ok(table)
    }

    pub fn create_with<B: Backend + ?Sized>(&mut self, backend: &B) -> Result<()> {
        tracing::debug!(table = %self.name, family = %self.family, "creating table");
        submit(backend, self, Op::Create)
    }

    /// Delete the table together with everything it contains.
    pub fn delete_with<B: Backend + ?Sized>(&mut self, backend: &B) -> Result<()> {
        tracing::debug!(table = %self.name, family = %self.family, "deleting table");
        submit(backend, self, Op::Delete)?;
        self.handle = None;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// Kernel handle, known once the table has been created.
    pub fn handle(&self) -> Option<u64> {
        self.handle
    }
}

impl NftObject for Table {
    fn kind(&self) -> &'static str {
        "table"
    }

    fn describe(&self) -> String {
        format!("{} {}", self.family, self.name)
    }

    fn family(&self) -> Family {
        self.family
    }

    fn new_command(&self) -> u8 {
        msg::NEWTABLE
    }

    fn del_command(&self) -> u8 {
        msg::DELTABLE
    }

    fn create_flags(&self) -> u16 {
        NLM_F_CREATE
    }

    fn handle_attr(&self) -> u16 {
        table::HANDLE
    }

    fn write_attrs(&self, builder: &mut MessageBuilder, op: Op) -> Result<()> {
        builder.append_attr_str(table::NAME, &self.name);
        if op == Op::Create {
            builder.append_attr_u32_be(table::FLAGS, self.flags);
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
