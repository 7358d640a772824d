use anyhow::Context;
use clap::Parser;
use ledger_core::{Block, LedgerConfig, Transaction};
use ledger_node::api::router;
use ledger_node::bus::HttpBus;
use ledger_node::constants::DEFAULT_LISTEN;
use ledger_node::NodeState;
use std::collections::HashMap;
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:3000
    #[arg(long, default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Peer base URLs that receive our broadcasts
    #[arg(long, value_delimiter = ',')]
    peers: Vec<String>,

    /// Node to copy the chain and pool from on startup
    #[arg(long)]
    root: Option<String>,

    #[arg(long, default_value_t = ledger_core::constants::MINE_RATE_MS)]
    mine_rate_ms: u64,

    #[arg(long, default_value_t = ledger_core::constants::INITIAL_DIFFICULTY)]
    initial_difficulty: u32,

    #[arg(long, default_value_t = ledger_core::constants::STARTING_BALANCE)]
    starting_balance: u64,

    #[arg(long, default_value_t = ledger_core::constants::MINING_REWARD)]
    mining_reward: u64,
}

impl Args {
    fn config(&self) -> LedgerConfig {
        LedgerConfig {
            mine_rate_ms: self.mine_rate_ms,
            initial_difficulty: self.initial_difficulty,
            starting_balance: self.starting_balance,
            mining_reward: self.mining_reward,
        }
    }
}

async fn sync_with_root(state: &NodeState, root: &str) -> anyhow::Result<()> {
    let root = root.trim_end_matches('/');
    let client = reqwest::Client::new();

    let blocks: Vec<Block> = client
        .get(format!("{root}/api/blocks"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
        .context("decoding root chain")?;
    let height = blocks.len();
    if let Err(e) = state.adopt_chain(blocks).await {
        warn!("root chain of {height} blocks not adopted: {e}");
    }

    let pool: HashMap<String, Transaction> = client
        .get(format!("{root}/api/transaction-pool-map"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
        .context("decoding root transaction pool")?;
    info!("synced {} pending transactions from {root}", pool.len());
    state.replace_pool(pool).await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let bus = HttpBus::new(args.peers.clone());
    info!("broadcasting to {} peers", bus.peers().len());
    let state = NodeState::new(args.config(), Arc::new(bus));
    info!("wallet address {}", state.address().await);

    if let Some(root) = &args.root {
        if let Err(e) = sync_with_root(&state, root).await {
            warn!("could not sync with root node {root}: {e:#}");
        }
    }

    let app = router(state);
    let addr: SocketAddr = args.listen.parse()?;
    info!("ledger-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
