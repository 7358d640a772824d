//! Publish/subscribe contract between a node and its peers.
//!
//! The transport is somebody else's problem: it only has to carry a string
//! payload per [`Channel`], at least once, in any order. Handlers here are
//! therefore idempotent and never trust a payload until it parses.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use tracing::{debug, warn};

use crate::block::Block;
use crate::chain::Chain;
use crate::error::{ChainError, LedgerError, Result};
use crate::pool::TransactionPool;
use crate::transaction::{Input, Transaction};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    /// A full chain snapshot.
    Chain,
    /// A single pending transaction.
    Transaction,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Chain, Channel::Transaction];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Chain => "CHAIN",
            Channel::Transaction => "TRANSACTION",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound side of the bus. `publish` is fire-and-forget.
pub trait Publisher: Send + Sync {
    fn publish(&self, channel: Channel, payload: String);

    fn broadcast_chain(&self, chain: &[Block]) {
        match serde_json::to_string(chain) {
            Ok(payload) => self.publish(Channel::Chain, payload),
            Err(e) => warn!("Could not serialize chain for broadcast: {e}"),
        }
    }

    fn broadcast_transaction(&self, tx: &Transaction) {
        match serde_json::to_string(tx) {
            Ok(payload) => self.publish(Channel::Transaction, payload),
            Err(e) => warn!("Could not serialize transaction {} for broadcast: {e}", tx.id),
        }
    }
}

/// A decoded inbound payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusMessage {
    Chain(Vec<Block>),
    Transaction(Transaction),
}

impl BusMessage {
    pub fn decode(channel: Channel, payload: &str) -> Result<Self> {
        let malformed = |source| LedgerError::MalformedPayload { channel, source };
        let message = match channel {
            Channel::Chain => BusMessage::Chain(serde_json::from_str(payload).map_err(malformed)?),
            Channel::Transaction => {
                BusMessage::Transaction(serde_json::from_str(payload).map_err(malformed)?)
            }
        };
        Ok(message)
    }
}

/// Run fork choice on a peer's chain; on adoption drop everything it confirms
/// from `pool`.
pub fn handle_chain(
    chain: &mut Chain,
    pool: &mut TransactionPool,
    candidate: Vec<Block>,
) -> std::result::Result<(), ChainError> {
    chain.replace_chain(candidate, true, |accepted| pool.prune_confirmed(accepted))
}

/// Pool a peer's transaction unless that sender already has a different
/// pending transaction here. Of two versions of the same transaction (same
/// id) the newer one is kept, whatever order they arrive in. Returns whether
/// the pool changed.
pub fn handle_transaction(pool: &mut TransactionPool, tx: Transaction) -> bool {
    if tx.is_reward() {
        warn!("Ignoring reward transaction {} received over the bus", tx.id);
        return false;
    }
    if let Some(existing) = pool.get(&tx.id) {
        if existing.input.address() != tx.input.address() {
            warn!("Transaction {} changed sender; ignoring it", tx.id);
            return false;
        }
    }
    if let Some(existing) = pool.find_by_sender(tx.input.address()) {
        if existing.id != tx.id {
            debug!(
                "Sender {} already has pending transaction {}; ignoring {}",
                tx.input.address(),
                existing.id,
                tx.id
            );
            return false;
        }
        if *existing == tx || !supersedes(&tx, existing) {
            return false;
        }
    }
    pool.set(tx);
    true
}

/// Whether `incoming` is a later version of `existing`. `update` only moves
/// value away from the sender, so less change left means newer; equal change
/// falls back to the signing time.
fn supersedes(incoming: &Transaction, existing: &Transaction) -> bool {
    let change = |tx: &Transaction| tx.output_map.get(tx.input.address()).copied().unwrap_or(0);
    let signed_at = |tx: &Transaction| match &tx.input {
        Input::Signed(input) => input.timestamp,
        Input::Reward(_) => 0,
    };
    match change(incoming).cmp(&change(existing)) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => signed_at(incoming) > signed_at(existing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::wallet::Wallet;
    use serde_json::json;

    fn config() -> LedgerConfig {
        LedgerConfig {
            mine_rate_ms: 0,
            ..LedgerConfig::default()
        }
    }

    #[test]
    fn channel_wire_names() {
        assert_eq!(Channel::Chain.to_string(), "CHAIN");
        assert_eq!(serde_json::to_string(&Channel::Transaction).unwrap(), r#""TRANSACTION""#);
    }

    #[test]
    fn malformed_payloads_are_reported() {
        let err = BusMessage::decode(Channel::Chain, "{not json").unwrap_err();
        assert!(matches!(err, LedgerError::MalformedPayload { channel: Channel::Chain, .. }));

        let err = BusMessage::decode(Channel::Transaction, r#"{"id":1}"#).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::MalformedPayload {
                channel: Channel::Transaction,
                ..
            }
        ));
    }

    #[test]
    fn decodes_a_chain_snapshot() {
        let mut chain = Chain::new(config());
        chain.add_block(json!("data").into()).unwrap();
        let payload = serde_json::to_string(chain.blocks()).unwrap();
        match BusMessage::decode(Channel::Chain, &payload).unwrap() {
            BusMessage::Chain(blocks) => assert_eq!(blocks, chain.blocks()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn adopted_chain_prunes_the_pool() {
        let mut local = Chain::new(config());
        let mut pool = TransactionPool::new();
        let mut remote = Chain::new(config());
        let mut wallet = Wallet::new(config());
        let tx = wallet.create_transaction("bob", 10, None).unwrap();
        pool.set(tx.clone());
        remote
            .add_block(vec![tx, Transaction::reward(&wallet, &config())].into())
            .unwrap();

        let payload = serde_json::to_string(remote.blocks()).unwrap();
        let BusMessage::Chain(blocks) = BusMessage::decode(Channel::Chain, &payload).unwrap() else {
            panic!("expected chain");
        };
        handle_chain(&mut local, &mut pool, blocks).unwrap();
        assert_eq!(local.len(), 2);
        assert!(pool.is_empty());
    }

    #[test]
    fn rejected_chain_leaves_the_pool_alone() {
        let mut local = Chain::new(config());
        let mut pool = TransactionPool::new();
        let mut wallet = Wallet::new(config());
        pool.set(wallet.create_transaction("bob", 10, None).unwrap());

        let same_length = Chain::new(config()).blocks().to_vec();
        assert!(handle_chain(&mut local, &mut pool, same_length).is_err());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn one_pending_transaction_per_sender() {
        let mut pool = TransactionPool::new();
        let mut wallet = Wallet::new(config());
        let first = wallet.create_transaction("bob", 10, None).unwrap();
        let second = wallet.create_transaction("carol", 10, None).unwrap();

        assert!(handle_transaction(&mut pool, first.clone()));
        assert!(!handle_transaction(&mut pool, first.clone()));
        assert!(!handle_transaction(&mut pool, second));
        assert_eq!(pool.len(), 1);

        let mut updated = first.clone();
        updated.update(&wallet, "carol", 5).unwrap();
        assert!(handle_transaction(&mut pool, updated.clone()));
        assert_eq!(pool.get(&first.id), Some(&updated));
    }

    #[test]
    fn late_older_version_does_not_overwrite_an_update() {
        let mut pool = TransactionPool::new();
        let mut wallet = Wallet::new(config());
        let first = wallet.create_transaction("carol", 10, None).unwrap();
        let mut updated = first.clone();
        updated.update(&wallet, "dave", 20).unwrap();

        assert!(handle_transaction(&mut pool, updated.clone()));
        assert!(!handle_transaction(&mut pool, first.clone()));
        assert_eq!(pool.get(&first.id), Some(&updated));
        assert_eq!(pool.get(&first.id).unwrap().output_map["dave"], 20);
    }

    #[test]
    fn zero_amount_update_wins_on_signing_time() {
        let mut pool = TransactionPool::new();
        let mut wallet = Wallet::new(config());
        let first = wallet.create_transaction("carol", 10, None).unwrap();
        let mut resigned = first.clone();
        resigned.update(&wallet, "dave", 0).unwrap();
        if let Input::Signed(input) = &mut resigned.input {
            input.timestamp += 1;
        }
        // same change left for the sender; the later signature wins in either order
        pool.set(resigned.clone());
        assert!(!handle_transaction(&mut pool, first.clone()));
        pool.set(first.clone());
        assert!(handle_transaction(&mut pool, resigned.clone()));
        assert_eq!(pool.get(&first.id), Some(&resigned));
    }

    #[test]
    fn reward_transactions_are_not_pooled() {
        let mut pool = TransactionPool::new();
        let wallet = Wallet::new(config());
        assert!(!handle_transaction(&mut pool, Transaction::reward(&wallet, &config())));
        assert!(pool.is_empty());
    }
}
