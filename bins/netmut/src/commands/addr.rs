//! netmut addr command implementation.

use anyhow::Result;
use clap::{Args, Subcommand};
use netmut::netlink::LinkOptions;
use netmut::{Link, SystemBackend};

use crate::output::OutputFormat;

#[derive(Args)]
pub struct AddrCmd {
    #[command(subcommand)]
    action: AddrAction,
}

#[derive(Subcommand)]
enum AddrAction {
    /// Add an address.
    Add {
        /// Address with prefix (e.g., 192.168.1.1/24).
        address: String,

        /// Device name.
        #[arg(long, short)]
        dev: String,
    },

    /// Delete an address.
    Del {
        /// Address with prefix.
        address: String,

        /// Device name.
        #[arg(long, short)]
        dev: String,
    },
}

impl AddrCmd {
    pub fn run(self, backend: &SystemBackend, _format: OutputFormat) -> Result<()> {
        let (address, dev, add) = match self.action {
            AddrAction::Add { address, dev } => (address, dev, true),
            AddrAction::Del { address, dev } => (address, dev, false),
        };

        let mut link = Link::with_options(
            backend.clone(),
            &dev,
            LinkOptions::new().create_if_missing(false),
        )?;
        if add {
            link.add_address(&address)?;
        } else {
            link.remove_address(&address)?;
        }
        Ok(())
    }
}
