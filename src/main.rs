//! ACME Vault command line
//!
//! Thin front end over the `acme_vault` library: initialize a vault, list
//! its identifiers and certificates, and export certificate artifacts.
//!
//! ```bash
//! acme-vault --root ./vault init
//! acme-vault --root ./vault certificates
//! acme-vault --root ./vault certificate www --export-pkcs12 www.p12
//! ```
//!
//! Challenge submission ([`acme_vault::challenge::submit_challenge`]) needs a
//! protocol client talking to the certificate authority, which this binary
//! does not ship; it is available to library callers only.
//!
//! Logging goes to stderr and follows `RUST_LOG` (default `info`), or
//! `--verbose` for debug output.

use acme_vault::configs::AppConfig;
use acme_vault::crypto::OpensslEngine;
use acme_vault::export::{self, CertificateExports};
use acme_vault::storage::VaultStore;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::metadata::LevelFilter;
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "acme-vault", version, about = "Manage a local ACME vault")]
struct Cli {
    /// Configuration file (defaults to ./acme-vault.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Vault root directory
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Named vault profile from the configuration
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a new vault root
    Init {
        /// Initialize even if the root is not empty
        #[arg(long)]
        force: bool,
    },
    /// List identifiers with their sequence numbers
    Identifiers,
    /// List certificates with their sequence numbers
    Certificates,
    /// Show one certificate and export its artifacts
    Certificate {
        /// Sequence number, alias, label or id
        reference: String,
        #[arg(long)]
        export_key_pem: Option<PathBuf>,
        #[arg(long)]
        export_csr_pem: Option<PathBuf>,
        #[arg(long)]
        export_certificate_pem: Option<PathBuf>,
        #[arg(long)]
        export_certificate_der: Option<PathBuf>,
        #[arg(long)]
        export_pkcs12: Option<PathBuf>,
        /// Replace existing export files
        #[arg(long)]
        overwrite: bool,
    },
}

fn log_init(verbose: bool) {
    if verbose {
        SubscriberBuilder::default()
            .with_max_level(LevelFilter::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        SubscriberBuilder::default()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    log_init(cli.verbose);

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::load()?,
    };

    let mut store =
        VaultStore::from_settings(cli.root.as_deref(), cli.profile.as_deref(), &config.vault)
            .context("Failed to resolve vault root")?;

    match cli.command {
        Command::Init { force } => {
            store.init(force).context("Failed to initialize vault")?;
            println!("✓ Vault initialized at {}", store.root_path().display());
        }
        Command::Identifiers => {
            store.open(false).context("Failed to open vault")?;
            let vault = store.load(false)?.unwrap_or_default();
            for (seq, identifier) in export::list_identifiers(&vault) {
                println!(
                    "{:>3}  {:<24} {:<12} {}",
                    seq,
                    identifier.dns,
                    identifier.alias.as_deref().unwrap_or("-"),
                    identifier.challenges.keys().cloned().collect::<Vec<_>>().join(",")
                );
            }
        }
        Command::Certificates => {
            store.open(false).context("Failed to open vault")?;
            let vault = store.load(false)?.unwrap_or_default();
            for (seq, cert) in export::list_certificates(&vault) {
                println!(
                    "{:>3}  {:<24} {:<12} {}",
                    seq,
                    cert.identifier_dns,
                    cert.alias.as_deref().unwrap_or("-"),
                    cert.label.as_deref().unwrap_or("")
                );
            }
        }
        Command::Certificate {
            reference,
            export_key_pem,
            export_csr_pem,
            export_certificate_pem,
            export_certificate_der,
            export_pkcs12,
            overwrite,
        } => {
            store.open(false).context("Failed to open vault")?;
            let vault = store.load_required()?;
            let exports = CertificateExports {
                key_pem: export_key_pem,
                csr_pem: export_csr_pem,
                crt_pem: export_certificate_pem,
                crt_der: export_certificate_der,
                pkcs12: export_pkcs12,
                overwrite: overwrite || config.export.overwrite,
            };
            let engine = OpensslEngine::with_archive_password(config.export.pkcs12_password.clone());
            let cert = export::export_certificate(&store, &vault, &reference, &exports, &engine)
                .context(format!("Failed to export certificate {}", reference))?;
            println!("{}", serde_json::to_string_pretty(cert)?);
            if !exports.is_empty() {
                println!("✓ Exported artifacts of certificate {}", reference);
            }
        }
    }

    store.close();
    Ok(())
}
