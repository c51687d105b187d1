//! netmut veth command implementation.

use anyhow::Result;
use clap::{Args, Subcommand};
use netmut::netlink::Side;
use netmut::{SystemBackend, Veth};
use serde::Serialize;
use std::io::{self, Write};

use crate::output::{OutputFormat, Printable, emit};

#[derive(Args)]
pub struct VethCmd {
    #[command(subcommand)]
    action: VethAction,
}

#[derive(Subcommand)]
enum VethAction {
    /// Create a veth pair, adopting it if both ends exist.
    Add { name: String, peer: String },

    /// Delete the surviving end of a half-created pair.
    Repair { name: String, peer: String },
}

#[derive(Serialize)]
struct Repair {
    removed: Option<Side>,
    name: Option<String>,
}

impl Printable for Repair {
    fn print_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match (&self.removed, &self.name) {
            (Some(side), Some(name)) => writeln!(w, "removed orphaned {} side {}", side, name),
            _ => writeln!(w, "nothing to repair"),
        }
    }
}

impl VethCmd {
    pub fn run(self, backend: &SystemBackend, format: OutputFormat) -> Result<()> {
        match self.action {
            VethAction::Add { name, peer } => {
                Veth::with_backend(backend.clone(), &name, &peer)?;
                Ok(())
            }
            VethAction::Repair { name, peer } => {
                let removed = Veth::remove_orphan(backend, &name, &peer)?;
                let name = removed.map(|side| match side {
                    Side::Veth => name,
                    Side::Peer => peer,
                });
                emit(&Repair { removed, name }, format)?;
                Ok(())
            }
        }
    }
}
