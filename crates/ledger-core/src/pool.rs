use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::block::Block;
use crate::transaction::Transaction;

/// Transactions that were broadcast but are not yet in an adopted chain,
/// keyed by id.
#[derive(Clone, Debug, Default)]
pub struct TransactionPool {
    transactions: HashMap<String, Transaction>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite by id.
    pub fn set(&mut self, tx: Transaction) {
        self.transactions.insert(tx.id.clone(), tx);
    }

    pub fn set_all(&mut self, transactions: HashMap<String, Transaction>) {
        self.transactions = transactions;
    }

    pub fn get(&self, id: &str) -> Option<&Transaction> {
        self.transactions.get(id)
    }

    pub fn get_all(&self) -> Vec<Transaction> {
        self.transactions.values().cloned().collect()
    }

    pub fn map(&self) -> &HashMap<String, Transaction> {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// The pending transaction issued by `address`, if any.
    pub fn find_by_sender(&self, address: &str) -> Option<&Transaction> {
        self.transactions
            .values()
            .find(|tx| tx.input.address() == address)
    }

    pub fn find_by_sender_mut(&mut self, address: &str) -> Option<&mut Transaction> {
        self.transactions
            .values_mut()
            .find(|tx| tx.input.address() == address)
    }

    /// Entries that still validate; tampered ones are left out, not removed.
    pub fn valid(&self) -> Vec<Transaction> {
        self.transactions
            .values()
            .filter(|tx| tx.validate())
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.transactions.clear();
    }

    /// Drop every entry whose id appears anywhere in `chain`.
    pub fn prune_confirmed(&mut self, chain: &[Block]) {
        let confirmed: HashSet<&str> = chain
            .iter()
            .flat_map(|block| block.transactions())
            .map(|tx| tx.id.as_str())
            .collect();
        let before = self.transactions.len();
        self.transactions.retain(|id, _| !confirmed.contains(id.as_str()));
        debug!("pruned {} confirmed transactions", before - self.transactions.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::config::LedgerConfig;
    use crate::transaction::Input;
    use crate::wallet::Wallet;

    fn config() -> LedgerConfig {
        LedgerConfig {
            mine_rate_ms: 0,
            ..LedgerConfig::default()
        }
    }

    fn transfer(amount: u64) -> (Wallet, Transaction) {
        let mut wallet = Wallet::new(config());
        let tx = wallet.create_transaction("fake-recipient", amount, None).unwrap();
        (wallet, tx)
    }

    #[test]
    fn set_stores_by_id() {
        let mut pool = TransactionPool::new();
        let (_, tx) = transfer(50);
        pool.set(tx.clone());
        assert_eq!(pool.get(&tx.id), Some(&tx));
        assert_eq!(pool.len(), 1);

        // same id overwrites
        pool.set(tx.clone());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn finds_the_pending_transaction_of_a_sender() {
        let mut pool = TransactionPool::new();
        let (wallet, tx) = transfer(50);
        let (_, other) = transfer(10);
        pool.set(tx.clone());
        pool.set(other);

        assert_eq!(pool.find_by_sender(wallet.address()), Some(&tx));
        assert!(pool.find_by_sender("nobody").is_none());
    }

    #[test]
    fn valid_keeps_good_entries_and_skips_tampered_ones() {
        let mut pool = TransactionPool::new();
        let mut good = Vec::new();
        for i in 0..10u64 {
            let (wallet, mut tx) = transfer(30 + i);
            match i % 3 {
                0 => {
                    tx.output_map.insert(wallet.address().to_string(), 999_999);
                }
                1 => {
                    if let Input::Signed(input) = &mut tx.input {
                        input.signature = Wallet::new(config()).sign("foo").unwrap();
                    }
                }
                _ => good.push(tx.clone()),
            }
            pool.set(tx);
        }

        let mut valid = pool.valid();
        valid.sort_by(|a, b| a.id.cmp(&b.id));
        good.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(valid, good);
        assert_eq!(pool.len(), 10);
    }

    #[test]
    fn clear_empties_the_pool() {
        let mut pool = TransactionPool::new();
        pool.set(transfer(1).1);
        pool.clear();
        assert!(pool.is_empty());
    }

    #[test]
    fn prunes_transactions_confirmed_by_a_chain() {
        let mut chain = Chain::new(config());
        let mut pool = TransactionPool::new();
        let mut expected = HashMap::new();

        for i in 0..6u64 {
            let (_, tx) = transfer(10 + i);
            pool.set(tx.clone());
            if i % 2 == 0 {
                chain.add_block(vec![tx].into()).unwrap();
            } else {
                expected.insert(tx.id.clone(), tx);
            }
        }

        pool.prune_confirmed(chain.blocks());
        assert_eq!(pool.map(), &expected);
    }

    #[test]
    fn set_all_replaces_the_map() {
        let mut pool = TransactionPool::new();
        pool.set(transfer(1).1);
        let (_, tx) = transfer(2);
        pool.set_all(HashMap::from([(tx.id.clone(), tx.clone())]));
        assert_eq!(pool.get_all(), vec![tx]);
    }
}
