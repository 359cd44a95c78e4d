//! priv8 - condition-gated encrypted bucket storage

use anyhow::Context;
use clap::{Parser, Subcommand};
use priv8_cli::{commands, Settings};
use priv8_client::ObjectRef;
use priv8_crypto::{Address, IdentitySigner};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "priv8")]
#[command(about = "Encrypt data under on-chain conditions and store it in buckets")]
#[command(version)]
struct Args {
    /// Settings file
    #[arg(short, long, env = "PRIV8_CONFIG")]
    config: Option<PathBuf>,

    /// Wallet secret key (hex)
    #[arg(long, env = "PRIV8_WALLET_KEY", hide_env_values = true)]
    wallet_key: Option<String>,

    /// Storage gateway URL
    #[arg(long, env = "PRIV8_STORAGE_ENDPOINT")]
    storage_endpoint: Option<String>,

    /// Key network relay URL
    #[arg(long, env = "PRIV8_NETWORK_ENDPOINT")]
    network_endpoint: Option<String>,

    /// Chain the conditions are evaluated on
    #[arg(long, env = "PRIV8_CHAIN")]
    chain: Option<String>,

    /// Use an in-memory key network and storage (nothing persists)
    #[arg(long, env = "PRIV8_OFFLINE")]
    offline: bool,

    /// Enable debug logging
    #[arg(short, long, env = "PRIV8_DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the wallet address
    Address,

    /// Encrypt a file or JSON value and upload it
    Upload {
        #[arg(short, long, default_value = "test123")]
        bucket: String,

        /// Object name; generated when omitted
        #[arg(short, long)]
        name: Option<String>,

        /// File to upload
        #[arg(short, long, conflicts_with = "json", required_unless_present = "json")]
        file: Option<PathBuf>,

        /// JSON document to upload
        #[arg(long)]
        json: Option<String>,

        /// Minimum native balance (wei) required to decrypt
        #[arg(long, default_value = "1000000000000000")]
        min_balance_wei: String,

        /// Capacity delegation funding the session
        #[arg(long)]
        delegation: Option<PathBuf>,

        /// Download and decrypt after uploading
        #[arg(long)]
        verify: bool,
    },

    /// Download and decrypt an object (the last upload by default)
    Download {
        #[arg(short, long, requires = "name")]
        bucket: Option<String>,

        #[arg(short, long, requires = "bucket")]
        name: Option<String>,

        /// Write plaintext here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Capacity delegation funding the session
        #[arg(long)]
        delegation: Option<PathBuf>,
    },

    /// Delegate capacity to other wallets
    Delegate {
        /// Delegatee address (repeatable)
        #[arg(long = "delegatee", required = true)]
        delegatees: Vec<Address>,

        /// Maximum number of sessions the delegation may fund
        #[arg(long, default_value = "1")]
        uses: u64,

        /// Lifetime in seconds
        #[arg(long, default_value = "600")]
        ttl_secs: i64,

        /// Capacity credit token id
        #[arg(long, env = "PRIV8_CAPACITY_TOKEN")]
        capacity_token: String,

        /// Write the delegation here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// List buckets
    Buckets,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("priv8_cli={0},priv8_client={0},priv8_crypto={0}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut settings = Settings::load(args.config.as_deref()).context("failed to load settings")?;
    if let Some(endpoint) = args.storage_endpoint {
        settings.storage_endpoint = endpoint;
    }
    if let Some(endpoint) = args.network_endpoint {
        settings.network_endpoint = endpoint;
    }
    if let Some(chain) = args.chain {
        settings.chain = chain;
    }

    let wallet = Arc::new(commands::load_wallet(args.wallet_key.as_deref(), args.offline)?);

    if args.offline {
        tracing::warn!("Using in-memory key network and storage - nothing will persist!");
    } else {
        tracing::info!("Storage gateway: {}", settings.storage_endpoint);
        tracing::info!("Key network: {} ({})", settings.network, settings.network_endpoint);
    }

    match args.command {
        Command::Address => {
            println!("{}", wallet.address());
        }

        Command::Upload {
            bucket,
            name,
            file,
            json,
            min_balance_wei,
            delegation,
            verify,
        } => {
            let plaintext = match (file, json) {
                (Some(path), _) => {
                    std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?
                }
                (None, Some(json)) => {
                    let value: serde_json::Value = serde_json::from_str(&json).context("--json is not valid JSON")?;
                    serde_json::to_vec(&value)?
                }
                (None, None) => anyhow::bail!("pass --file or --json"),
            };
            let conditions = commands::balance_conditions(&settings.chain, &min_balance_wei)?;

            let mut client = commands::build_orchestrator(&settings, wallet, args.offline)?;
            if let Some(path) = delegation {
                client = client.with_capacity_delegation(commands::read_delegation(&path)?);
            }

            let object = commands::upload(&client, &bucket, name, &plaintext, &conditions, verify || args.offline).await?;
            println!("{}", object);
        }

        Command::Download {
            bucket,
            name,
            out,
            delegation,
        } => {
            let mut client = commands::build_orchestrator(&settings, wallet, args.offline)?;
            if let Some(path) = delegation {
                client = client.with_capacity_delegation(commands::read_delegation(&path)?);
            }

            let target = bucket.zip(name).map(|(bucket, name)| ObjectRef::new(bucket, name));
            let (object, plaintext) = commands::download(&client, target).await?;
            tracing::info!("Decrypted {} ({} bytes)", object, plaintext.len());
            match out {
                Some(path) => std::fs::write(&path, &plaintext)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => println!("{}", String::from_utf8_lossy(&plaintext)),
            }
        }

        Command::Delegate {
            delegatees,
            uses,
            ttl_secs,
            capacity_token,
            out,
        } => {
            let delegation = commands::delegate(&wallet, &capacity_token, delegatees, uses, ttl_secs).await?;
            let body = serde_json::to_string_pretty(&delegation)?;
            match out {
                Some(path) => std::fs::write(&path, body)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => println!("{}", body),
            }
        }

        Command::Buckets => {
            let client = commands::build_orchestrator(&settings, wallet, args.offline)?;
            for bucket in client.list_buckets().await? {
                println!("{}", bucket.name);
            }
        }
    }

    Ok(())
}
