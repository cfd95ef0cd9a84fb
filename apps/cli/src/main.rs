//! FetchCraft CLI
//!
//! Command-line client for the FetchCraft retrieval network: gateway lookup,
//! offer discovery and signing key management.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use fetchcraft_client::{ClientSettings, RetrievalClient, DEFAULT_REGISTER_URL};
use fetchcraft_core::{ContentId, GatewayRegistration, NodeId, ProviderRegistration, SubCidOffer};
use fetchcraft_crypto::{build_group_offer, sub_offer_for, KeyAlgorithm, KeyVersion, SigningKeypair};
use fetchcraft_gateway_api::MemoryGateway;
use fetchcraft_keystore::{
    default_keyfile, expand_path, load_or_generate_signing_keypair, load_signing_keypair,
};
use fetchcraft_logging::{LogLevel, LogTarget};
use fetchcraft_registry::MemoryRegistry;

/// FetchCraft - Verified content discovery over untrusted gateways
#[derive(Parser)]
#[command(name = "fetchcraft")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// This client's node id (64 hex characters)
    #[arg(long, env = "CLIENT_ID", global = true)]
    client_id: Option<String>,

    /// Path to the client signing key
    #[arg(long, env = "KEYFILE", global = true)]
    keyfile: Option<PathBuf>,

    /// Version of the signing key, carried in every signature
    #[arg(long, env = "KEY_VERSION", default_value = "1", global = true)]
    key_version: u32,

    /// Signing key algorithm
    #[arg(long, env = "KEY_ALGORITHM", default_value = "ed25519", global = true)]
    key_algorithm: KeyAlgorithm,

    /// Registry base URL
    #[arg(long, env = "REGISTER_URL", default_value = DEFAULT_REGISTER_URL, global = true)]
    register_url: String,

    /// Session lifetime in seconds
    #[arg(long, env = "ESTABLISHMENT_TTL", default_value = "100", global = true)]
    establishment_ttl: u64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Log destination (STDOUT or STDERR)
    #[arg(long, env = "LOG_TARGET", default_value = "STDOUT", global = true)]
    log_target: LogTarget,

    /// Increase verbosity (-v debug, -vv trace); overrides --log-level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Signing key management
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// List registered gateways in a region
    Gateways {
        /// Region code to match
        #[arg(short, long)]
        location: String,

        /// Maximum number of gateways to list
        #[arg(short, long, default_value = "16")]
        max: usize,
    },

    /// Discover verified offers for a content id
    Offers {
        /// Content id (64 hex characters)
        cid: String,

        /// Region to pick gateways from
        #[arg(short, long)]
        location: String,

        /// Maximum number of gateways to use
        #[arg(long, default_value = "16")]
        max_gateways: usize,

        /// Only show offers strictly cheaper than this
        #[arg(long)]
        max_price: Option<u64>,

        /// Latency ceiling in milliseconds (accepted, not yet enforced)
        #[arg(long)]
        max_latency_ms: Option<u64>,
    },

    /// Run the full discovery flow against in-process registry and gateways
    Smoke {
        /// Number of simulated gateways
        #[arg(long, default_value = "3")]
        gateways: u8,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Generate a signing key if none exists and print its public key
    Generate,
    /// Print the public key of the existing signing key
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let level = if cli.verbose > 0 {
        LogLevel::from_verbosity(cli.verbose)
    } else {
        cli.log_level
    };
    fetchcraft_logging::try_init(level, cli.log_target)
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    let keyfile = cli.keyfile.clone().unwrap_or_else(default_keyfile);

    match cli.command {
        Commands::Key { ref action } => key_cmd(action, &keyfile)?,
        Commands::Gateways { ref location, max } => {
            let client = connect(&cli, &keyfile)?;
            let result = list_gateways(&client, location, max).await;
            client.shutdown().await;
            result?;
        }
        Commands::Offers {
            ref cid,
            ref location,
            max_gateways,
            max_price,
            max_latency_ms,
        } => {
            let cid = ContentId::parse(cid).context("Invalid content id")?;
            let client = connect(&cli, &keyfile)?;
            let result = find_offers(
                &client,
                &cid,
                location,
                max_gateways,
                max_price,
                max_latency_ms.map(Duration::from_millis),
            )
            .await;
            client.shutdown().await;
            result?;
        }
        Commands::Smoke { gateways } => smoke(gateways).await?,
    }

    Ok(())
}

fn key_cmd(action: &KeyAction, keyfile: &Path) -> Result<()> {
    let keypair = match action {
        KeyAction::Generate => load_or_generate_signing_keypair(keyfile),
        KeyAction::Show => load_signing_keypair(keyfile),
    }
    .context("Failed to load signing key")?;

    println!("FetchCraft Signing Key");
    println!("======================");
    println!("Public key: {}", keypair.public_key_hex());
    println!("Keyfile:    {:?}", expand_path(keyfile));
    Ok(())
}

/// Build a client from flags, environment and the key file
fn connect(cli: &Cli, keyfile: &Path) -> Result<RetrievalClient> {
    let keypair = load_signing_keypair(keyfile).context("Failed to load signing key")?;

    let mut builder = ClientSettings::builder()
        .signing_keypair(keypair)
        .key_version(KeyVersion(cli.key_version))
        .key_algorithm(cli.key_algorithm)
        .register_url(cli.register_url.clone())
        .establishment_ttl(Duration::from_secs(cli.establishment_ttl));
    if let Some(id) = &cli.client_id {
        builder = builder.client_id(NodeId::parse(id).context("Invalid CLIENT_ID")?);
    }
    let settings = builder.build()?;

    info!("Using registry {}", settings.register_url());
    Ok(RetrievalClient::new(settings)?)
}

async fn list_gateways(client: &RetrievalClient, location: &str, max: usize) -> Result<()> {
    let ids = client
        .find_gateways(location, max)
        .await
        .context("Registry lookup failed")?;

    println!("Gateways in {} ({})", location, ids.len());
    println!("================");
    for id in ids {
        println!("{}", id);
    }
    Ok(())
}

async fn find_offers(
    client: &RetrievalClient,
    cid: &ContentId,
    location: &str,
    max_gateways: usize,
    max_price: Option<u64>,
    max_latency: Option<Duration>,
) -> Result<()> {
    let ids = client
        .find_gateways(location, max_gateways)
        .await
        .context("Registry lookup failed")?;
    if ids.is_empty() {
        println!("No gateways registered in {}", location);
        return Ok(());
    }

    let added = client.add_gateways_to_use(&ids).await;
    let active = client.add_active_gateways(&ids).await;
    info!("{} gateways usable, {} sessions established", added, active);

    let offers = match max_price {
        Some(max_price) => client.find_best_offers(cid, max_price, max_latency).await?,
        None => client.find_offers_standard_discovery(cid).await?,
    };
    print_offers(cid, &offers);
    Ok(())
}

fn print_offers(cid: &ContentId, offers: &[SubCidOffer]) {
    println!("Offers for {} ({})", cid, offers.len());
    println!("================");
    for offer in offers {
        println!(
            "provider {}  price {:>10}  qos {:>5}  expires {}",
            offer.provider_id, offer.price, offer.qos, offer.expiry
        );
    }
}

/// Offline end-to-end run: registry and gateways live in this process,
/// every gateway relays one honest and one tampered offer.
async fn smoke(gateway_count: u8) -> Result<()> {
    let registry = Arc::new(MemoryRegistry::new());
    let gateways = Arc::new(MemoryGateway::new());

    let provider_keypair = SigningKeypair::generate();
    let provider_id = NodeId::from_bytes([0xee; 32]);
    registry.insert_provider(ProviderRegistration {
        node_id: provider_id,
        hostname: "provider.local".to_string(),
        region_code: "LOCAL".to_string(),
        signing_key: provider_keypair.public_key_hex(),
    });

    let piece = ContentId::from_bytes([0x42; 32]);
    for n in 1..=gateway_count {
        let id = NodeId::from_bytes([n; 32]);
        registry.insert_gateway(GatewayRegistration {
            node_id: id,
            hostname: format!("127.0.0.1:{}", 9000 + u16::from(n)),
            region_code: "LOCAL".to_string(),
            country_code: "ZZ".to_string(),
            subdivision_code: "ZZ-1".to_string(),
            signing_key: SigningKeypair::generate().public_key_hex(),
        });
        gateways.add_gateway(id);

        let group = build_group_offer(
            &provider_keypair,
            KeyVersion::default(),
            provider_id,
            vec![piece, ContentId::from_bytes([n; 32])],
            100 * u64::from(n),
            i64::MAX,
            1,
        );
        let honest = sub_offer_for(&group, &piece)
            .ok_or_else(|| anyhow!("content id missing from group offer"))?;
        let mut tampered = honest.clone();
        tampered.price = 1;
        gateways.add_offer(&id, honest);
        gateways.add_offer(&id, tampered);
    }

    let settings = ClientSettings::builder()
        .client_id(NodeId::from_bytes([0xcc; 32]))
        .signing_keypair(SigningKeypair::generate())
        .build()?;
    let client = RetrievalClient::with_components(settings, registry, gateways)?;

    let ids = client.find_gateways("LOCAL", usize::from(gateway_count)).await?;
    let added = client.add_gateways_to_use(&ids).await;
    let active = client.add_active_gateways(&ids).await;
    println!("Gateways: {} found, {} added, {} active", ids.len(), added, active);

    let offers = client.find_best_offers(&piece, u64::MAX, None).await?;
    print_offers(&piece, &offers);
    client.shutdown().await;

    if offers.len() != usize::from(gateway_count) {
        return Err(anyhow!(
            "expected {} verified offers, got {}",
            gateway_count,
            offers.len()
        ));
    }
    println!("Smoke run OK");
    Ok(())
}
