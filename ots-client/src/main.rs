//! OTS timestamping CLI

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

use ots_client::{
    storage, BitcoinRpc, ClientConfig, OtsClient,
};
use ots_core::{DetachedTimestampFile, Op};

#[derive(Parser)]
#[command(name = "ots")]
#[command(about = "Create and verify calendar-anchored timestamp proofs", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Calendar server URL (repeatable; overrides configuration)
    #[arg(long = "calendar")]
    calendars: Vec<String>,

    /// Calendar responses required for a stamp to succeed
    #[arg(short, long)]
    quorum: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Timestamp one or more files, writing a .ots sidecar next to each
    Stamp {
        /// Files to timestamp
        files: Vec<PathBuf>,
    },

    /// Refresh pending attestations in a proof from their calendars
    Upgrade {
        /// The .ots proof file
        ots: PathBuf,
    },

    /// Verify a file against its proof using a Bitcoin node
    Verify {
        /// The original file
        file: PathBuf,

        /// Proof path (defaults to <file>.ots)
        #[arg(long)]
        ots: Option<PathBuf>,
    },

    /// Show the proof tree of a .ots file
    Info {
        /// The .ots proof file
        ots: PathBuf,
    },
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ClientConfig::default(),
    };

    if !cli.calendars.is_empty() {
        config.calendars = cli.calendars.clone();
    }
    if let Some(quorum) = cli.quorum {
        config.quorum = quorum;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let client = OtsClient::from_config(&config)?;

    match &cli.command {
        Commands::Stamp { files } => {
            if files.is_empty() {
                bail!("nothing to stamp");
            }

            let mut detached = Vec::with_capacity(files.len());
            for path in files {
                let data = std::fs::read(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                detached.push(DetachedTimestampFile::from_data(Op::Sha256, &data)?);
            }

            client.stamp_many(&mut detached).await?;

            for (path, proof) in files.iter().zip(&detached) {
                let sidecar = storage::ots_path(path);
                storage::write_ots_file(&sidecar, proof)?;
                println!("{} -> {}", path.display(), sidecar.display());
            }
        }

        Commands::Upgrade { ots } => {
            let mut detached = storage::read_ots_file(ots)?;

            let changed = client.upgrade(&mut detached.timestamp).await?;
            if changed {
                storage::write_ots_file(ots, &detached)?;
                println!("Proof upgraded");
            } else {
                println!("Proof unchanged");
            }

            if detached.timestamp.is_complete() {
                println!("Proof is complete and can be verified offline");
            } else {
                println!("Proof still has pending attestations; try again later");
            }
        }

        Commands::Verify { file, ots } => {
            let sidecar = ots.clone().unwrap_or_else(|| storage::ots_path(file));
            let detached = storage::read_ots_file(&sidecar)?;

            // Recompute the digest from the original content; the proof is
            // never trusted for it
            let data = std::fs::read(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let digest = detached.digest_op().call(&data);

            let rpc_config = config
                .bitcoin
                .clone()
                .context("verification needs a [bitcoin] RPC section in the config")?;
            let rpc = BitcoinRpc::new(rpc_config)?;

            let results = client.verify(&detached.timestamp, &digest, &rpc).await?;

            if results.is_empty() {
                println!("No block-header attestations to check yet; run upgrade first");
            } else {
                for (chain, result) in &results {
                    println!("{chain}: {result}");
                }
            }
        }

        Commands::Info { ots } => {
            let detached = storage::read_ots_file(ots)?;
            print!("{}", detached.info());
        }
    }

    Ok(())
}
