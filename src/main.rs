/// badge-claim - Main entry point
///
/// Command line front-end for tracking claims, migrating badges to the
/// canonical chain and watching transactions.

use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use ethers::types::H256;
use tokio::signal;
use tracing::{error, info, warn};

use badge_claim::{
    config::{ClaimConfig, ConfigManager, ExplorerConfig},
    greeting, init_logging,
    notifications::TracingNotifier,
    types::{parse_address, TokenInfo},
    AppState, ClaimOutcome, MigrationOutcome, PollOutcome, ReceiptVerdict,
};

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config/badge_claim.yaml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands
#[derive(Subcommand)]
enum Commands {
    /// Generate default configuration
    Init,

    /// Poll a claim until its mint passes or fails
    Track {
        /// QR hash of the claim
        qr_hash: String,
    },

    /// Claim a QR hash for an address, ENS name or email
    Claim {
        qr_hash: String,

        /// Address, ENS name or email receiving the badge
        beneficiary: String,

        /// Mint the badge on the canonical chain once claimed
        #[arg(long)]
        migrate: bool,
    },

    /// Migrate an already-minted token to the canonical chain
    Migrate {
        token_id: u64,
    },

    /// Watch a canonical-chain transaction until it is mined
    Watch {
        tx_hash: String,
    },

    /// List the badges held by an address, ENS name or email
    Scan {
        account: String,
    },

    /// Show a token and its owner
    Token {
        token_id: u64,
    },

    /// Redeem the badges sent to an email address into a wallet
    RedeemEmail {
        email: String,

        /// Address or ENS name receiving the badges
        address: String,

        /// Redemption token from the email link
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config_manager = Arc::new(ConfigManager::new(&cli.config));
    config_manager.load().await?;
    let config = config_manager.get_config().await;

    let log_level = cli.log_level.clone().unwrap_or_else(|| config.general.log_level.clone());
    init_logging(&log_level)?;
    info!("{}", greeting());

    match cli.command {
        Commands::Init => init_config(config_manager).await,
        Commands::Track { qr_hash } => {
            let state = build_state(config)?;
            until_interrupted(track(state, qr_hash)).await
        }
        Commands::Claim {
            qr_hash,
            beneficiary,
            migrate,
        } => {
            let state = build_state(config)?;
            until_interrupted(claim(state, qr_hash, beneficiary, migrate)).await
        }
        Commands::Migrate { token_id } => {
            let state = build_state(config)?;
            until_interrupted(migrate(state, token_id)).await
        }
        Commands::Watch { tx_hash } => {
            let state = build_state(config)?;
            until_interrupted(watch(state, tx_hash)).await
        }
        Commands::Scan { account } => {
            let state = build_state(config)?;
            until_interrupted(scan(state, account)).await
        }
        Commands::Token { token_id } => {
            let state = build_state(config)?;
            until_interrupted(show_token(state, token_id)).await
        }
        Commands::RedeemEmail { email, address, token } => {
            let state = build_state(config)?;
            until_interrupted(redeem_email(state, email, address, token)).await
        }
    }
}

fn build_state(config: ClaimConfig) -> Result<AppState> {
    AppState::from_config(config, Arc::new(TracingNotifier)).context("Failed to initialize components")
}

/// Run a command until it finishes or Ctrl+C is pressed
///
/// Interrupting drops the command future, which cancels every loop it started.
async fn until_interrupted<F>(task: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tokio::select! {
        result = task => result,
        _ = signal::ctrl_c() => {
            warn!("Interrupted, stopping");
            Ok(())
        }
    }
}

/// Initialize configuration with defaults
async fn init_config(config_manager: Arc<ConfigManager>) -> Result<()> {
    info!("Initializing default configuration at {}", config_manager.config_path);
    config_manager.update_config(ClaimConfig::default()).await?;
    info!("Default configuration generated, edit it before running other commands");
    Ok(())
}

async fn track(state: AppState, qr_hash: String) -> Result<()> {
    let mut tracker = state.poller.track(&qr_hash);
    while let Some(claim) = tracker.next_update().await {
        info!("Claim {} status: {}", claim.qr_hash, claim.tx_status);
    }

    match tracker.outcome().await {
        PollOutcome::Completed(claim) => match claim.minted_token() {
            Some(token) => info!("Claim {} minted token {}", qr_hash, token),
            None => warn!("Claim {} finished with status {}", qr_hash, claim.tx_status),
        },
        PollOutcome::GaveUp(e) => bail!("Gave up tracking claim {}: {}", qr_hash, e),
        PollOutcome::Cancelled => warn!("Tracking of claim {} cancelled", qr_hash),
    }
    Ok(())
}

async fn claim(state: AppState, qr_hash: String, beneficiary: String, migrate: bool) -> Result<()> {
    let flow = state.claim_flow();
    let today = Utc::now().date_naive();

    match flow.claim(&qr_hash, &beneficiary, migrate, today).await? {
        ClaimOutcome::Submitted(claim) => {
            info!("Claim {} submitted, status {}", claim.qr_hash, claim.tx_status)
        }
        ClaimOutcome::Tracked { claim, migration } => {
            info!("Claim {} finished with status {}", claim.qr_hash, claim.tx_status);
            if let Some(outcome) = migration {
                report_migration(outcome)?;
            }
        }
        ClaimOutcome::Unresolved { qr_hash, reason } => match reason {
            Some(e) => bail!("Claim {} is still processing: {}", qr_hash, e),
            None => warn!("Claim {} is still processing", qr_hash),
        },
    }
    Ok(())
}

async fn migrate(state: AppState, token_id: u64) -> Result<()> {
    let mut handle = state.orchestrator.request_migration(token_id);
    while let Some(next) = handle.next_transition().await {
        info!("Migration of token {}: {}", token_id, next);
    }
    report_migration(handle.outcome().await)
}

fn report_migration(outcome: MigrationOutcome) -> Result<()> {
    match outcome {
        MigrationOutcome::Succeeded(receipt) => {
            info!(
                "Migration mined in block {:?} (tx {:?})",
                receipt.block_number, receipt.transaction_hash
            );
            Ok(())
        }
        MigrationOutcome::Failed(e) => bail!("Migration failed: {}", e),
        MigrationOutcome::Inconclusive { tx_hash } => {
            warn!("Transaction {:?} is still pending", tx_hash);
            Ok(())
        }
        MigrationOutcome::Cancelled => {
            warn!("Migration cancelled");
            Ok(())
        }
    }
}

async fn watch(state: AppState, tx_hash: String) -> Result<()> {
    let tx_hash: H256 = tx_hash
        .trim()
        .parse::<H256>()
        .map_err(|e| anyhow!("Invalid transaction hash {}: {:?}", tx_hash, e))?;
    let explorer = state.config.explorer.clone();

    let watch = state.receipts.watch(tx_hash, None);
    match ReceiptVerdict::from_outcome(watch.outcome().await) {
        ReceiptVerdict::Succeeded(receipt) => info!(
            "Transaction mined in block {:?}: {}",
            receipt.block_number,
            explorer.layer_one_tx(tx_hash)
        ),
        ReceiptVerdict::Failed(_) => {
            error!("Transaction reverted: {}", explorer.layer_one_tx(tx_hash));
            bail!("Transaction {:?} reverted", tx_hash);
        }
        ReceiptVerdict::Inconclusive => warn!("No receipt for {:?} yet", tx_hash),
    }
    Ok(())
}

async fn scan(state: AppState, account: String) -> Result<()> {
    let collection = state.collections().scan(&account).await?;
    if collection.tokens.is_empty() {
        info!("{} holds no badges", collection.display_name);
        return Ok(());
    }

    info!(
        "{} ({}) holds {} badge(s)",
        collection.display_name,
        collection.account,
        collection.tokens.len()
    );
    for token in &collection.tokens {
        info!(
            "#{} {} [{}] {}",
            token.token_id,
            token.event.name,
            token.layer.as_deref().unwrap_or("unknown layer"),
            owner_link(&state.config.explorer, token)?
        );
    }
    Ok(())
}

async fn show_token(state: AppState, token_id: u64) -> Result<()> {
    let owned = state.collections().token(token_id).await?;
    info!(
        "Token {} of {} owned by {}",
        owned.token.token_id,
        owned.token.event.name,
        owned.owner_text()
    );
    info!("Owner: {}", owner_link(&state.config.explorer, &owned.token)?);
    if owned.token.is_on_low_fee_layer() {
        info!("Run `migrate {}` to mint it on {}", token_id, state.config.chain.network_name);
    }
    Ok(())
}

/// Explorer link of a token owner on the layer the token lives on
fn owner_link(explorer: &ExplorerConfig, token: &TokenInfo) -> Result<String> {
    if token.is_on_low_fee_layer() {
        Ok(explorer.layer_two_address(&token.owner))
    } else {
        Ok(explorer.layer_one_address(parse_address(&token.owner)?))
    }
}

async fn redeem_email(state: AppState, email: String, address: String, token: String) -> Result<()> {
    let flow = state.claim_flow();
    let message = flow.redeem_email(&email, &address, &token).await?;

    match message.result {
        Some(result) if message.status.is_successful() => info!(
            "Redemption finished: {}",
            state.config.explorer.layer_two_tx(&result.tx_hash)
        ),
        _ => info!("Redemption {} finished with status {}", message.uid, message.status),
    }
    Ok(())
}
