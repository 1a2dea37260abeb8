//! Ledger Bridge demo node
//!
//! Drives one chain through the host wrapper the way a managed runtime
//! would: InitChain once, then BeginBlock / DeliverTx / EndBlock / Commit
//! on a fixed interval until Ctrl+C or the block limit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use clap::Parser;
use tracing::{error, info, warn};
use ledger_bridge::abci::{tx_code, AbciRequest, AbciResponse};
use ledger_bridge::config::BridgeConfig;
use ledger_bridge::host::{self, call_with_timeout, ChainHandle, ConsensusHandle, HostError};
use ledger_bridge::node::{GenesisAccount, GenesisValidator};
use ledger_bridge::validation::Transaction;

/// Ledger Bridge demo node.
#[derive(Parser, Debug)]
#[command(name = "ledger-node", version, about = "Run a local ledger through the C ABI bridge")]
struct Cli {
    /// JSON configuration file. Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after this many blocks (0 runs until Ctrl+C).
    #[arg(long, default_value_t = 0)]
    blocks: u64,

    /// Override the block interval in milliseconds.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Archive blocks under this directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(ms) = cli.interval_ms {
        config.node.block_interval_ms = ms;
    }
    if cli.data_dir.is_some() {
        config.store.path = cli.data_dir.clone();
    }
    if config.node.genesis_validators.is_empty() {
        config.node.genesis_validators = vec![
            GenesisValidator::new("validator-a", 60),
            GenesisValidator::new("validator-b", 30),
            GenesisValidator::new("validator-c", 10),
        ];
    }
    if config.node.genesis_accounts.is_empty() {
        config.node.genesis_accounts = vec![GenesisAccount::new("alice", 1_000_000), GenesisAccount::new("bob", 0)];
    }
    config.validate()?;

    host::bridge::init(&config)?;
    info!(chain_id = %config.chain_id, "ledger node starting");

    let chain = Arc::new(ChainHandle::new()?);
    let consensus = ConsensusHandle::new()?;
    for v in &config.node.genesis_validators {
        consensus.add_validator(&v.address, v.stake)?;
    }

    let init = AbciRequest::InitChain {
        validators: config.node.genesis_validators.clone(),
        genesis_accounts: config.node.genesis_accounts.clone(),
    };
    chain.abci(&init)?;
    info!(
        validators = consensus.validator_count()?,
        state_root = %chain.state_root()?,
        "genesis applied"
    );

    let timeout = Duration::from_millis(config.node.call_timeout_ms);
    let mut ticker = tokio::time::interval(Duration::from_millis(config.node.block_interval_ms));
    let sender = config.node.genesis_accounts[0].address.clone();
    let receiver = config
        .node
        .genesis_accounts
        .get(1)
        .map_or_else(|| sender.clone(), |a| a.address.clone());

    tokio::select! {
        result = async {
            let mut produced = 0u64;
            loop {
                ticker.tick().await;
                let proposer = consensus.select_proposer()?;
                let chain = chain.clone();
                let (from, to) = (sender.clone(), receiver.clone());
                let height = call_with_timeout(timeout, move || run_block(&chain, &proposer, &from, &to)).await?;
                produced += 1;
                if cli.blocks > 0 && produced >= cli.blocks {
                    info!(height, "block limit reached");
                    break;
                }
            }
            Ok::<(), HostError>(())
        } => {
            if let Err(e) = result {
                error!(error = %e, "block loop stopped");
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, stopping node");
        }
    }

    info!(
        height = chain.height()?,
        latest_hash = %chain.latest_hash()?,
        "final chain state"
    );
    consensus.close()?;
    chain.close()?;
    Ok(())
}

/// One full block lifecycle carrying a single transfer
fn run_block(chain: &ChainHandle, proposer: &str, from: &str, to: &str) -> Result<u64, HostError> {
    let height = chain.height()? + 1;
    chain.abci(&AbciRequest::BeginBlock { height, proposer: proposer.to_string() })?;

    let tx = Transaction::new(from, to, 10, chain.get_nonce(from)? + 1);
    let tx_data = serde_json::to_vec(&tx)?;
    match chain.abci(&AbciRequest::DeliverTx { tx_data })? {
        AbciResponse::DeliverTx { code: tx_code::OK, .. } => {}
        AbciResponse::DeliverTx { code, log } => warn!(code, %log, "transfer rejected"),
        other => warn!(?other, "unexpected DeliverTx response"),
    }

    chain.abci(&AbciRequest::EndBlock { height })?;
    if let AbciResponse::Commit { height, app_hash } = chain.abci(&AbciRequest::Commit)? {
        info!(height, %proposer, app_hash = %app_hash, "block committed");
    }
    Ok(height)
}
