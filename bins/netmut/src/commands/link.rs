//! netmut link command implementation.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use netmut::netlink::{LinkCache, LinkKind, LinkMessage, LinkOptions, OperState};
use netmut::{Link, SystemBackend};
use serde::Serialize;
use std::io::{self, Write};

use crate::output::{OutputFormat, Printable, emit};

#[derive(Args)]
pub struct LinkCmd {
    #[command(subcommand)]
    action: Option<LinkAction>,
}

#[derive(Subcommand)]
enum LinkAction {
    /// Show links.
    Show {
        /// Interface name.
        name: Option<String>,
    },

    /// Create a dummy link (or a bridge), adopting an existing one.
    Add {
        name: String,

        /// Create a bridge instead of a dummy link.
        #[arg(long)]
        bridge: bool,
    },

    /// Delete a link.
    Del { name: String },

    /// Change link attributes.
    Set {
        name: String,

        #[arg(long, conflicts_with = "down")]
        up: bool,

        #[arg(long)]
        down: bool,

        #[arg(long)]
        mtu: Option<u32>,

        /// Transmit queue length.
        #[arg(long)]
        txqlen: Option<u32>,

        #[arg(long)]
        group: Option<u32>,

        /// MAC address (e.g., 02:00:00:00:00:01).
        #[arg(long)]
        address: Option<String>,

        /// Enslave to this bridge.
        #[arg(long, conflicts_with = "nomaster")]
        master: Option<String>,

        /// Release from its master.
        #[arg(long)]
        nomaster: bool,
    },
}

#[derive(Serialize)]
struct LinkRow {
    index: u32,
    name: String,
    kind: Option<String>,
    state: OperState,
    mtu: Option<u32>,
    txqlen: Option<u32>,
    group: u32,
    master: Option<u32>,
    address: Option<String>,
}

impl From<&LinkMessage> for LinkRow {
    fn from(msg: &LinkMessage) -> Self {
        Self {
            index: msg.ifindex(),
            name: msg.name_or("?").to_string(),
            kind: msg.kind().map(str::to_string),
            state: msg.effective_state(),
            mtu: msg.mtu(),
            txqlen: msg.txqlen(),
            group: msg.group(),
            master: msg.master(),
            address: msg.mac_address(),
        }
    }
}

impl Printable for LinkRow {
    fn print_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write!(w, "{}: {}: <{}>", self.index, self.name, self.state)?;
        if let Some(mtu) = self.mtu {
            write!(w, " mtu {}", mtu)?;
        }
        if let Some(master) = self.master {
            write!(w, " master {}", master)?;
        }
        if let Some(qlen) = self.txqlen {
            write!(w, " qlen {}", qlen)?;
        }
        writeln!(w, " group {}", self.group)?;

        write!(w, "    link/{}", self.kind.as_deref().unwrap_or("none"))?;
        if let Some(addr) = &self.address {
            write!(w, " {}", addr)?;
        }
        writeln!(w)
    }
}

fn open(backend: &SystemBackend, name: &str) -> netmut::Result<Link> {
    Link::with_options(
        backend.clone(),
        name,
        LinkOptions::new().create_if_missing(false),
    )
}

impl LinkCmd {
    pub fn run(self, backend: &SystemBackend, format: OutputFormat) -> Result<()> {
        match self.action.unwrap_or(LinkAction::Show { name: None }) {
            LinkAction::Show { name } => Self::show(backend, name.as_deref(), format),
            LinkAction::Add { name, bridge } => {
                let kind = if bridge { LinkKind::Bridge } else { LinkKind::Dummy };
                let link = Link::with_options(backend.clone(), &name, LinkOptions::new().kind(kind))?;
                tracing::debug!(link = link.name(), index = link.index()?, "link ready");
                Ok(())
            }
            LinkAction::Del { name } => {
                open(backend, &name)?.delete()?;
                Ok(())
            }
            LinkAction::Set {
                name,
                up,
                down,
                mtu,
                txqlen,
                group,
                address,
                master,
                nomaster,
            } => {
                let link = open(backend, &name)?;
                if let Some(mtu) = mtu {
                    link.set_mtu(mtu)?;
                }
                if let Some(txqlen) = txqlen {
                    link.set_tx_queue_length(txqlen)?;
                }
                if let Some(group) = group {
                    link.set_group(group)?;
                }
                if let Some(mac) = address {
                    link.set_mac(&mac)?;
                }
                if let Some(master) = master {
                    link.set_master(&open(backend, &master)?)?;
                }
                if nomaster {
                    link.release_master()?;
                }
                if up {
                    link.set_state(OperState::Up)?;
                } else if down {
                    link.set_state(OperState::Down)?;
                }
                Ok(())
            }
        }
    }

    fn show(backend: &SystemBackend, name: Option<&str>, format: OutputFormat) -> Result<()> {
        let cache = LinkCache::refresh(backend)?;

        let rows: Vec<LinkRow> = match name {
            Some(name) => match cache.lookup(name) {
                Some(msg) => vec![LinkRow::from(msg)],
                None => bail!("link not found: {}", name),
            },
            None => {
                let mut rows: Vec<LinkRow> = cache.iter().map(LinkRow::from).collect();
                rows.sort_by_key(|r| r.index);
                rows
            }
        };

        emit(&rows, format)?;
        Ok(())
    }
}
