//! netmut nft command implementation.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use netmut::SystemBackend;
use netmut::netlink::nftables::{Chain, ChainType, Family, Hook, Policy, Rule, Table};
use serde::Serialize;
use std::io::{self, Write};
use std::net::{IpAddr, SocketAddr};

use crate::output::{OutputFormat, Printable, emit};

#[derive(Args)]
pub struct NftCmd {
    #[command(subcommand)]
    object: NftObjectCmd,
}

#[derive(Subcommand)]
enum NftObjectCmd {
    /// Manage tables.
    Table {
        #[command(subcommand)]
        action: TableAction,
    },

    /// Manage chains.
    Chain {
        #[command(subcommand)]
        action: ChainAction,
    },

    /// Manage rules.
    Rule {
        #[command(subcommand)]
        action: RuleAction,
    },
}

#[derive(Args)]
struct FamilyArg {
    /// Table family (ip, ipv6, inet, arp, bridge).
    #[arg(long, short, default_value = "ip")]
    family: String,
}

impl FamilyArg {
    fn parse(&self) -> netmut::Result<Family> {
        self.family.parse()
    }
}

#[derive(Subcommand)]
enum TableAction {
    /// Create a table.
    Add {
        name: String,
        #[command(flatten)]
        family: FamilyArg,
    },

    /// Delete a table and everything in it.
    Del {
        name: String,
        #[command(flatten)]
        family: FamilyArg,
    },
}

#[derive(Subcommand)]
enum ChainAction {
    /// Create a chain; with --hook it becomes a base chain.
    Add {
        table: String,
        name: String,
        #[command(flatten)]
        family: FamilyArg,

        /// prerouting, input, forward, output or postrouting.
        #[arg(long)]
        hook: Option<String>,

        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        priority: i32,

        /// filter, nat or route.
        #[arg(long = "type")]
        chain_type: Option<String>,

        /// accept or drop.
        #[arg(long)]
        policy: Option<String>,
    },

    /// Delete a chain.
    Del {
        table: String,
        name: String,
        #[command(flatten)]
        family: FamilyArg,
    },
}

#[derive(Subcommand)]
enum RuleAction {
    /// Append a rule to a chain.
    Add {
        table: String,
        chain: String,
        #[command(flatten)]
        family: FamilyArg,

        /// Match this TCP destination port.
        #[arg(long)]
        dport: Option<u16>,

        /// Match this destination address.
        #[arg(long)]
        daddr: Option<IpAddr>,

        #[arg(long, group = "action")]
        accept: bool,

        #[arg(long, group = "action")]
        drop: bool,

        /// Jump to another chain.
        #[arg(long, group = "action")]
        jump: Option<String>,

        /// Rewrite the destination (ADDR or ADDR:PORT).
        #[arg(long, group = "action")]
        dnat: Option<String>,

        /// Rewrite the source (ADDR or ADDR:PORT).
        #[arg(long, group = "action")]
        snat: Option<String>,
    },

    /// Delete a rule by handle.
    Del {
        table: String,
        chain: String,
        #[command(flatten)]
        family: FamilyArg,

        #[arg(long)]
        handle: u64,
    },
}

#[derive(Serialize)]
struct Created {
    kind: &'static str,
    handle: Option<u64>,
}

impl Printable for Created {
    fn print_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self.handle {
            Some(handle) => writeln!(w, "{} handle {}", self.kind, handle),
            None => Ok(()),
        }
    }
}

fn nat_target(s: &str) -> Result<(IpAddr, Option<u16>)> {
    if let Ok(sa) = s.parse::<SocketAddr>() {
        return Ok((sa.ip(), Some(sa.port())));
    }
    match s.parse::<IpAddr>() {
        Ok(ip) => Ok((ip, None)),
        Err(_) => bail!("invalid NAT target: {}", s),
    }
}

impl NftCmd {
    pub fn run(self, backend: &SystemBackend, format: OutputFormat) -> Result<()> {
        match self.object {
            NftObjectCmd::Table { action } => Self::table(backend, action, format),
            NftObjectCmd::Chain { action } => Self::chain(backend, action, format),
            NftObjectCmd::Rule { action } => Self::rule(backend, action, format),
        }
    }

    fn table(backend: &SystemBackend, action: TableAction, format: OutputFormat) -> Result<()> {
        match action {
            TableAction::Add { name, family } => {
                let table = Table::create_in(backend, &name, &family.family)?;
                emit(
                    &Created {
                        kind: "table",
                        handle: table.handle(),
                    },
                    format,
                )?;
            }
            TableAction::Del { name, family } => {
                Table::new(name, family.parse()?).delete_with(backend)?;
            }
        }
        Ok(())
    }

    fn chain(backend: &SystemBackend, action: ChainAction, format: OutputFormat) -> Result<()> {
        match action {
            ChainAction::Add {
                table,
                name,
                family,
                hook,
                priority,
                chain_type,
                policy,
            } => {
                let table = Table::new(table, family.parse()?);
                let mut chain = Chain::new(&table, name);
                if let Some(hook) = hook {
                    chain = chain.hook(hook.parse::<Hook>()?, priority);
                }
                if let Some(t) = chain_type {
                    chain = chain.chain_type(t.parse::<ChainType>()?);
                }
                if let Some(p) = policy {
                    chain = chain.policy(p.parse::<Policy>()?);
                }
                chain.create_with(backend)?;
                emit(
                    &Created {
                        kind: "chain",
                        handle: chain.handle(),
                    },
                    format,
                )?;
            }
            ChainAction::Del {
                table,
                name,
                family,
            } => {
                let table = Table::new(table, family.parse()?);
                Chain::new(&table, name).delete_with(backend)?;
            }
        }
        Ok(())
    }

    fn rule(backend: &SystemBackend, action: RuleAction, format: OutputFormat) -> Result<()> {
        match action {
            RuleAction::Add {
                table,
                chain,
                family,
                dport,
                daddr,
                accept,
                drop,
                jump,
                dnat,
                snat,
            } => {
                let table = Table::new(table, family.parse()?);
                let chain = Chain::new(&table, chain);
                let mut rule = Rule::new(&chain);

                if let Some(ip) = daddr {
                    rule = rule.match_ip_daddr(ip);
                }
                if let Some(port) = dport {
                    rule = rule.match_tcp_dport(port);
                }

                rule = if accept {
                    rule.accept()
                } else if drop {
                    rule.drop_packet()
                } else if let Some(target) = jump {
                    rule.jump(target)
                } else if let Some(target) = dnat {
                    let (ip, port) = nat_target(&target)?;
                    rule.dnat(ip, port)
                } else if let Some(target) = snat {
                    let (ip, port) = nat_target(&target)?;
                    rule.snat(ip, port)
                } else {
                    rule
                };

                rule.create_with(backend)?;
                emit(
                    &Created {
                        kind: "rule",
                        handle: rule.handle(),
                    },
                    format,
                )?;
            }
            RuleAction::Del {
                table,
                chain,
                family,
                handle,
            } => {
                let table = Table::new(table, family.parse()?);
                let chain = Chain::new(&table, chain);
                Rule::new(&chain).with_handle(handle).delete_with(backend)?;
            }
        }
        Ok(())
    }
}
