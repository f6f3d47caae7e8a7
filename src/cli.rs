//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::pki::LeafKind;

/// VPN management console - admin sessions and a certificate authority for mutual TLS
#[derive(Parser, Debug)]
#[command(name = "vpn-console")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "VPN_CONSOLE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "VPN_CONSOLE_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "VPN_CONSOLE_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "VPN_CONSOLE_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "VPN_CONSOLE_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the console server (default)
    Serve,

    /// Print a bcrypt hash for `auth.password_hash`
    HashPassword {
        /// Plaintext password
        #[arg(required = true)]
        password: String,

        /// bcrypt work factor
        #[arg(long, default_value_t = crate::password::DEFAULT_COST)]
        cost: u32,
    },

    /// Certificate authority commands
    #[command(subcommand)]
    Pki(PkiCommand),
}

/// Certificate authority subcommands
#[derive(Subcommand, Debug)]
pub enum PkiCommand {
    /// Create a root CA and write `ca.crt` / `ca.key`
    InitCa {
        /// Output directory (defaults to `pki.dir`)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// RSA key size (defaults to `pki.key_bits`)
        #[arg(long)]
        bits: Option<u32>,
    },

    /// Issue a server or client certificate signed by the CA
    Issue {
        /// Certificate role
        #[arg(long, value_enum)]
        kind: LeafKindArg,

        /// Common name, also used as the DNS SAN and file stem
        #[arg(long, required = true)]
        cn: String,

        /// Directory holding `ca.crt` / `ca.key` (defaults to `pki.dir`)
        #[arg(long)]
        ca_dir: Option<PathBuf>,

        /// Output directory (defaults to the CA directory)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// RSA key size (defaults to `pki.key_bits`)
        #[arg(long)]
        bits: Option<u32>,
    },

    /// Print a certificate's fields as JSON
    Inspect {
        /// Path to a PEM certificate
        #[arg(required = true)]
        file: PathBuf,
    },
}

/// Leaf role as accepted on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeafKindArg {
    /// VPN server certificate
    Server,
    /// VPN client certificate
    Client,
}

impl From<LeafKindArg> for LeafKind {
    fn from(arg: LeafKindArg) -> Self {
        match arg {
            LeafKindArg::Server => Self::Server,
            LeafKindArg::Client => Self::Client,
        }
    }
}
