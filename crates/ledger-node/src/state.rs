use ledger_core::bus::{handle_chain, handle_transaction, BusMessage, Channel, Publisher};
use ledger_core::mine::mine_block_parallel;
use ledger_core::{Block, BlockData, Chain, ChainError, LedgerConfig, LedgerError, Miner};
use ledger_core::{Transaction, TransactionPool, Wallet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("a mining search is already running")]
    MiningInProgress,

    #[error("transaction {id} is being mined; retry once the block lands")]
    PendingBeingMined { id: String },

    #[error("mining task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<ChainError> for NodeError {
    fn from(e: ChainError) -> Self {
        NodeError::Ledger(e.into())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInfo {
    pub address: String,
    pub balance: u64,
}

/// The running search: its cancel flag and the ids of the pool entries it
/// is mining.
struct MiningRun {
    cancel: Arc<AtomicBool>,
    batch: HashSet<String>,
}

type MiningSlot = Arc<Mutex<Option<MiningRun>>>;

fn lock_slot(slot: &MiningSlot) -> MutexGuard<'_, Option<MiningRun>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared state of one node. Cheap to clone; every clone sees the same chain,
/// pool and wallet. Locks are always taken chain, then wallet, then pool.
#[derive(Clone)]
pub struct NodeState {
    chain: Arc<RwLock<Chain>>,
    pool: Arc<RwLock<TransactionPool>>,
    wallet: Arc<RwLock<Wallet>>,
    publisher: Arc<dyn Publisher>,
    mining: MiningSlot,
    config: LedgerConfig,
}

/// Owns the running search's cancel flag. Dropping it (including when the
/// request future is dropped) stops the search and frees the slot.
struct MiningGuard {
    slot: MiningSlot,
    cancel: Arc<AtomicBool>,
}

impl MiningGuard {
    fn claim<'a>(&self, ids: impl IntoIterator<Item = &'a str>) {
        let mut slot = lock_slot(&self.slot);
        if let Some(run) = slot.as_mut().filter(|run| Arc::ptr_eq(&run.cancel, &self.cancel)) {
            run.batch.extend(ids.into_iter().map(str::to_string));
        }
    }
}

impl Drop for MiningGuard {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        let mut slot = lock_slot(&self.slot);
        if slot.as_ref().is_some_and(|run| Arc::ptr_eq(&run.cancel, &self.cancel)) {
            *slot = None;
        }
    }
}

impl NodeState {
    pub fn new(config: LedgerConfig, publisher: Arc<dyn Publisher>) -> Self {
        Self::with_wallet(Wallet::new(config), publisher)
    }

    pub fn with_wallet(wallet: Wallet, publisher: Arc<dyn Publisher>) -> Self {
        let config = *wallet.config();
        Self {
            chain: Arc::new(RwLock::new(Chain::new(config))),
            pool: Arc::new(RwLock::new(TransactionPool::new())),
            wallet: Arc::new(RwLock::new(wallet)),
            publisher,
            mining: Arc::new(Mutex::new(None)),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub async fn blocks(&self) -> Vec<Block> {
        self.chain.read().await.blocks().to_vec()
    }

    pub async fn pool_map(&self) -> HashMap<String, Transaction> {
        self.pool.read().await.map().clone()
    }

    pub async fn address(&self) -> String {
        self.wallet.read().await.address().to_string()
    }

    /// Address and balance as derived from the current chain.
    pub async fn wallet_info(&self) -> WalletInfo {
        let chain = self.chain.read().await;
        let wallet = self.wallet.read().await;
        let address = wallet.address().to_string();
        let balance = Wallet::calculate_balance(chain.blocks(), &address, &self.config);
        WalletInfo { address, balance }
    }

    /// Pay `amount` to `recipient`. If this wallet already has a pending
    /// transaction it is extended, otherwise a new one is created against the
    /// chain. The result is pooled and broadcast. A pending transaction that
    /// the running search is mining cannot be extended.
    pub async fn transact(&self, recipient: &str, amount: u64) -> Result<Transaction, NodeError> {
        let tx = {
            let chain = self.chain.read().await;
            let mut wallet = self.wallet.write().await;
            let mut pool = self.pool.write().await;
            let address = wallet.address().to_string();

            match pool.find_by_sender_mut(&address) {
                Some(pending) => {
                    if self.is_being_mined(&pending.id) {
                        return Err(NodeError::PendingBeingMined {
                            id: pending.id.clone(),
                        });
                    }
                    pending.update(&wallet, recipient, amount)?;
                    pending.clone()
                }
                None => {
                    let tx = wallet.create_transaction(recipient, amount, Some(chain.blocks()))?;
                    pool.set(tx.clone());
                    tx
                }
            }
        };

        debug!("pooled transaction {} paying {} to {}", tx.id, amount, recipient);
        self.publisher.broadcast_transaction(&tx);
        Ok(tx)
    }

    /// Mine the valid pool entries plus a reward for this node's wallet.
    pub async fn mine_transactions(&self) -> Result<Block, NodeError> {
        let guard = self.begin_mining()?;
        let (last, batch) = {
            let chain = self.chain.read().await;
            let wallet = self.wallet.read().await;
            let pool = self.pool.read().await;
            let batch = Miner::batch(&pool, &wallet, &self.config);
            // claimed under the pool lock so `transact` cannot slip in between
            guard.claim(batch.iter().map(|tx| tx.id.as_str()));
            (chain.tip().clone(), batch)
        };
        self.mine_and_commit(guard, last, batch.into()).await
    }

    /// Mine an arbitrary payload on top of the tip.
    pub async fn mine_data(&self, data: Value) -> Result<Block, NodeError> {
        let guard = self.begin_mining()?;
        let last = self.chain.read().await.tip().clone();
        self.mine_and_commit(guard, last, data.into()).await
    }

    pub fn is_mining(&self) -> bool {
        lock_slot(&self.mining).is_some()
    }

    /// Whether the running search is mining the pool entry `id`.
    pub fn is_being_mined(&self, id: &str) -> bool {
        lock_slot(&self.mining)
            .as_ref()
            .is_some_and(|run| run.batch.contains(id))
    }

    /// Raise the cancel flag of the running search, if any.
    pub fn abort_mining(&self) {
        if let Some(run) = lock_slot(&self.mining).as_ref() {
            info!("Abandoning in-flight mining search");
            run.cancel.store(true, Ordering::Relaxed);
        }
    }

    /// Apply one payload delivered by the bus.
    pub async fn receive(&self, channel: Channel, payload: &str) -> Result<(), LedgerError> {
        match BusMessage::decode(channel, payload)? {
            BusMessage::Chain(blocks) => self.adopt_chain(blocks).await?,
            BusMessage::Transaction(tx) => {
                let chain = self.chain.read().await;
                // a late echo must not revive an entry the chain already confirmed
                if chain.blocks().iter().any(|b| b.transactions().iter().any(|c| c.id == tx.id)) {
                    debug!("transaction {} is already confirmed", tx.id);
                    return Ok(());
                }
                let mut pool = self.pool.write().await;
                handle_transaction(&mut pool, tx);
            }
        }
        Ok(())
    }

    /// Fork choice against `blocks`; on adoption the pool is pruned and any
    /// running search is abandoned.
    pub async fn adopt_chain(&self, blocks: Vec<Block>) -> Result<(), ChainError> {
        let mut chain = self.chain.write().await;
        let mut pool = self.pool.write().await;
        handle_chain(&mut chain, &mut pool, blocks)?;
        self.abort_mining();
        Ok(())
    }

    pub async fn replace_pool(&self, transactions: HashMap<String, Transaction>) {
        self.pool.write().await.set_all(transactions);
    }

    fn begin_mining(&self) -> Result<MiningGuard, NodeError> {
        let mut slot = lock_slot(&self.mining);
        if slot.is_some() {
            return Err(NodeError::MiningInProgress);
        }
        let cancel = Arc::new(AtomicBool::new(false));
        *slot = Some(MiningRun {
            cancel: cancel.clone(),
            batch: HashSet::new(),
        });
        Ok(MiningGuard {
            slot: self.mining.clone(),
            cancel,
        })
    }

    async fn mine_and_commit(
        &self,
        guard: MiningGuard,
        last: Block,
        data: BlockData,
    ) -> Result<Block, NodeError> {
        let cancel = guard.cancel.clone();
        let config = self.config;
        let block =
            tokio::task::spawn_blocking(move || mine_block_parallel(&last, data, &config, &cancel))
                .await??;

        let snapshot = {
            let mut chain = self.chain.write().await;
            chain.append_mined(block.clone())?;
            // entries that arrived during the search stay pending
            let mut pool = self.pool.write().await;
            pool.prune_confirmed(std::slice::from_ref(&block));
            chain.blocks().to_vec()
        };
        drop(guard);

        info!("Chain extended to {} blocks (tip {})", snapshot.len(), block.hash);
        self.publisher.broadcast_chain(&snapshot);
        Ok(block)
    }
}
