use tracing::info;

use crate::block::Block;
use crate::bus::Publisher;
use crate::chain::Chain;
use crate::config::LedgerConfig;
use crate::error::Result;
use crate::pool::TransactionPool;
use crate::transaction::Transaction;
use crate::wallet::Wallet;

/// Turns the pool into a block. Holds no state of its own.
pub struct Miner;

impl Miner {
    /// Valid pending transactions plus one reward for `wallet`.
    pub fn batch(pool: &TransactionPool, wallet: &Wallet, config: &LedgerConfig) -> Vec<Transaction> {
        let mut txs = pool.valid();
        txs.push(Transaction::reward(wallet, config));
        txs
    }

    /// Mine the pool into a new block, broadcast the chain and clear the pool.
    pub fn mine_transactions<P>(
        chain: &mut Chain,
        pool: &mut TransactionPool,
        wallet: &Wallet,
        publisher: &P,
    ) -> Result<Block>
    where
        P: Publisher + ?Sized,
    {
        let batch = Self::batch(pool, wallet, chain.config());
        let count = batch.len();
        let block = chain.add_block(batch.into())?.clone();
        info!("Mined {} transactions into block {}", count, block.hash);

        publisher.broadcast_chain(chain.blocks());
        pool.clear();
        Ok(block)
    }
}
