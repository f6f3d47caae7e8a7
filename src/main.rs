//! VPN Console - admin sessions and certificate authority for a VPN management UI

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{error, info};

use vpn_console::{
    cli::{Cli, Command, PkiCommand},
    config::Config,
    gateway::Gateway,
    password,
    pki::{CA_COMMON_NAME, Certificate, CertificateAuthority, LeafKind},
    random::SystemRandom,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    // Handle subcommands
    match cli.command {
        Some(Command::HashPassword { password, cost }) => run_hash_password(&password, cost),
        Some(Command::Pki(pki_cmd)) => {
            let outcome = Config::load(cli.config.as_deref())
                .context("loading configuration")
                .and_then(|config| run_pki_command(pki_cmd, &config));
            match outcome {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("❌ {e:#}");
                    ExitCode::FAILURE
                }
            }
        }
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Print a bcrypt hash for the config file
fn run_hash_password(plaintext: &str, cost: u32) -> ExitCode {
    match password::hash_password(plaintext, cost) {
        Ok(hash) => {
            println!("{hash}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Failed to hash password: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run certificate authority commands
fn run_pki_command(cmd: PkiCommand, config: &Config) -> anyhow::Result<()> {
    let ca = CertificateAuthority::new(Arc::new(SystemRandom));

    match cmd {
        PkiCommand::InitCa { out, bits } => {
            let dir = out.unwrap_or_else(|| config.pki.dir.clone());
            let key_path = dir.join(format!("{CA_COMMON_NAME}.key"));
            if key_path.exists() {
                bail!(
                    "{} already exists, refusing to overwrite the CA",
                    key_path.display()
                );
            }

            let root = ca.init_ca(bits.unwrap_or(config.pki.key_bits))?;
            root.write_to_dir(&dir, CA_COMMON_NAME)?;

            let info = root.certificate.info();
            println!("✅ Root CA written to {}/", dir.display());
            println!("   Serial:    {}", info.serial);
            println!("   Not after: {}", info.not_after);
        }

        PkiCommand::Issue {
            kind,
            cn,
            ca_dir,
            out,
            bits,
        } => {
            let ca_dir = ca_dir.unwrap_or_else(|| config.pki.dir.clone());
            let out = out.unwrap_or_else(|| ca_dir.clone());

            let kind = LeafKind::from(kind);
            let leaf = ca
                .issue_to_dir(
                    kind,
                    &cn,
                    bits.unwrap_or(config.pki.key_bits),
                    &ca_dir,
                    &out,
                )
                .with_context(|| format!("issuing {kind} certificate for {cn}"))?;

            let info = leaf.certificate.info();
            println!("✅ {kind} certificate for {cn} written to {}/", out.display());
            println!("   Serial:    {}", info.serial);
            println!("   Not after: {}", info.not_after);
        }

        PkiCommand::Inspect { file } => {
            let certificate = load_certificate(&file)?;
            println!("{}", serde_json::to_string_pretty(certificate.info())?);
        }
    }

    Ok(())
}

fn load_certificate(path: &Path) -> anyhow::Result<Certificate> {
    let pem = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    Certificate::from_pem(&pem).with_context(|| format!("parsing {}", path.display()))
}

/// Run the console server
async fn run_server(cli: Cli) -> ExitCode {
    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        "Starting VPN console"
    );

    // Run with graceful shutdown
    if let Err(e) = Gateway::new(config).run().await {
        error!("Console error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Console shutdown complete");
    ExitCode::SUCCESS
}
