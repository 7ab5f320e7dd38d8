use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::{debug, info};
use serde::Serialize;
use std::path::PathBuf;

use ipam::config_loader::{self, CliOverrides};
use ipam::Ipam;

/// IP address management: subnet registry and per-subnet address pools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Record store file, overrides the configuration
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace), overrides the configuration
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Register a subnet given in CIDR notation
    Register { cidr: String },
    /// List registered subnets
    List {
        /// Only subnets of this address family (4 or 6)
        #[arg(short, long)]
        family: Option<String>,
    },
    /// Show one subnet
    Get { id: String },
    /// Delete a subnet and all of its allocations
    Delete { id: String },
    /// Allocate the lowest free address of a subnet
    Allocate {
        /// Subnet id, defaults to the configured default subnet
        #[arg(long)]
        subnet: Option<String>,
    },
    /// Release an allocated address
    Deallocate {
        /// Subnet id, defaults to the configured default subnet
        #[arg(long)]
        subnet: Option<String>,
        address: Option<String>,
    },
    /// List the allocated addresses of a subnet
    Allocations {
        id: String,
        /// Include allocation timestamps
        #[arg(short, long)]
        verbose: bool,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).wrap_err("Failed to serialize result")?
    );
    Ok(())
}

fn run(ipam: &Ipam, command: Command) -> Result<()> {
    match command {
        Command::Register { cidr } => print_json(&ipam.register_subnet(&cidr)?),
        Command::List { family } => print_json(&ipam.list_subnets(family.as_deref())?),
        Command::Get { id } => print_json(&ipam.get_subnet(&id)?),
        Command::Delete { id } => {
            ipam.delete_subnet(&id)?;
            info!("Subnet {} deleted", id);
            Ok(())
        }
        Command::Allocate { subnet } => print_json(&ipam.allocate_address(subnet.as_deref())?),
        Command::Deallocate { subnet, address } => {
            ipam.deallocate_address(subnet.as_deref(), address.as_deref())?;
            info!("Address released");
            Ok(())
        }
        Command::Allocations { id, verbose: false } => print_json(&ipam.list_allocations(&id)?),
        Command::Allocations { id, verbose: true } => print_json(&ipam.allocation_entries(&id)?),
    }
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse command-line arguments
    let args = Args::parse();

    let mut config = config_loader::load_or_default(args.config.as_deref())?;
    let overrides = CliOverrides {
        store_path: args.store.clone(),
        log_level: args.log_level.clone(),
    };
    config_loader::apply_overrides(&mut config, &overrides)?;

    // Initialize logging with the configured default filter level
    env_logger::Builder::from_env(Env::default().default_filter_or(config.log_level.as_str())).init();

    debug!("Using record store {:?} ({:?} backend)", config.store.path, config.store.backend);

    let store = config
        .store
        .open()
        .wrap_err_with(|| format!("Failed to open record store '{}'", config.store.path.display()))?;
    let ipam = Ipam::new(store).with_default_subnet(config.default_subnet());

    run(&ipam, args.command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipam::store::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from(["ipam", "--store", "db.ini", "register", "10.0.0.0/8"]);

        assert_eq!(args.store, Some(PathBuf::from("db.ini")));
        assert_eq!(args.config, None);
        assert_eq!(
            args.command,
            Command::Register {
                cidr: "10.0.0.0/8".to_string()
            }
        );
    }

    #[test]
    fn test_deallocate_args() {
        let args = Args::parse_from(["ipam", "deallocate", "--subnet", "2", "10.0.0.1"]);

        assert_eq!(
            args.command,
            Command::Deallocate {
                subnet: Some("2".to_string()),
                address: Some("10.0.0.1".to_string()),
            }
        );
    }

    #[test]
    fn test_run_against_memory_store() {
        let ipam = Ipam::new(Arc::new(MemoryStore::new()));

        run(&ipam, Command::Register { cidr: "10.0.0.0/30".to_string() }).unwrap();
        run(&ipam, Command::Allocate { subnet: None }).unwrap();
        run(&ipam, Command::Allocations { id: "1".to_string(), verbose: true }).unwrap();
        assert!(run(&ipam, Command::Allocations { id: "x".to_string(), verbose: true }).is_err());
        assert!(run(&ipam, Command::Get { id: "7".to_string() }).is_err());
        run(&ipam, Command::Delete { id: "1".to_string() }).unwrap();
        assert!(ipam.list_subnets(None).unwrap().is_empty());
    }
}
