//! netmut command - link, address, veth and nftables configuration.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use netmut::SystemBackend;
use output::OutputFormat;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "netmut", version, about = "Link, address, veth and nftables configuration")]
struct Cli {
    /// Log every kernel request.
    #[arg(short, long)]
    verbose: bool,

    /// Output JSON.
    #[arg(short = 'j', long)]
    json: bool,

    /// Operate inside the named network namespace.
    #[arg(short = 'n', long)]
    netns: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage network interfaces.
    #[command(visible_alias = "l")]
    Link(commands::link::LinkCmd),

    /// Manage IP addresses.
    #[command(visible_alias = "a", visible_alias = "address")]
    Addr(commands::addr::AddrCmd),

    /// Manage veth pairs.
    Veth(commands::veth::VethCmd),

    /// Manage nftables tables, chains and rules.
    Nft(commands::nft::NftCmd),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let backend = match &cli.netns {
        Some(name) => SystemBackend::in_namespace(format!("/var/run/netns/{}", name)),
        None => SystemBackend::new(),
    };

    let result = match cli.command {
        Command::Link(cmd) => cmd.run(&backend, format),
        Command::Addr(cmd) => cmd.run(&backend, format),
        Command::Veth(cmd) => cmd.run(&backend, format),
        Command::Nft(cmd) => cmd.run(&backend, format),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
