use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::LedgerConfig;
use crate::constants::{GENESIS_HASH, GENESIS_LAST_HASH, GENESIS_TIMESTAMP};
use crate::error::Result;
use crate::hasher::crypto_hash_bytes;
use crate::pow::count_leading_zero_bits;
use crate::transaction::Transaction;

/// Milliseconds since the Unix epoch; zero if the clock is before it.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Block payload. Mined transaction batches decode as `Transactions`; anything
/// else (raw mine requests) is kept verbatim as `Opaque`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockData {
    Transactions(Vec<Transaction>),
    Opaque(Value),
}

impl BlockData {
    pub fn transactions(&self) -> &[Transaction] {
        match self {
            BlockData::Transactions(txs) => txs,
            BlockData::Opaque(_) => &[],
        }
    }
}

impl From<Vec<Transaction>> for BlockData {
    fn from(txs: Vec<Transaction>) -> Self {
        BlockData::Transactions(txs)
    }
}

impl From<Value> for BlockData {
    fn from(value: Value) -> Self {
        BlockData::Opaque(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub timestamp: u64,
    pub last_hash: String,
    pub hash: String,
    pub data: BlockData,
    pub nonce: u64,
    pub difficulty: u32,
}

impl Block {
    /// The fixed first block. It is never mined and its hash is not derived
    /// from its contents; chains recognise it by equality.
    pub fn genesis(config: &LedgerConfig) -> Self {
        Self {
            timestamp: GENESIS_TIMESTAMP,
            last_hash: GENESIS_LAST_HASH.to_string(),
            hash: GENESIS_HASH.to_string(),
            data: BlockData::Transactions(Vec::new()),
            nonce: 0,
            difficulty: config.initial_difficulty,
        }
    }

    pub fn transactions(&self) -> &[Transaction] {
        self.data.transactions()
    }

    pub fn hash_fields(
        timestamp: u64,
        last_hash: &str,
        data: &Value,
        nonce: u64,
        difficulty: u32,
    ) -> [u8; 32] {
        crypto_hash_bytes(&[
            Value::from(timestamp),
            Value::from(last_hash),
            data.clone(),
            Value::from(nonce),
            Value::from(difficulty),
        ])
    }

    /// Recompute the hash from the block's own fields.
    pub fn compute_hash(&self) -> Result<String> {
        let data = serde_json::to_value(&self.data)?;
        Ok(hex::encode(Self::hash_fields(
            self.timestamp,
            &self.last_hash,
            &data,
            self.nonce,
            self.difficulty,
        )))
    }

    /// Retarget from the previous block alone: one step up when it came fast,
    /// one step down when it took longer than `mine_rate_ms`.
    pub fn adjust_difficulty(last: &Block, timestamp: u64, mine_rate_ms: u64) -> u32 {
        if last.difficulty < 1 {
            return 1;
        }
        if timestamp.saturating_sub(last.timestamp) > mine_rate_ms {
            return last.difficulty - 1;
        }
        last.difficulty + 1
    }

    /// One proof-of-work attempt on top of `last` with `nonce`.
    pub(crate) fn attempt(
        last: &Block,
        data: &BlockData,
        data_value: &Value,
        nonce: u64,
        config: &LedgerConfig,
    ) -> Option<Block> {
        let timestamp = now_millis();
        let difficulty = Self::adjust_difficulty(last, timestamp, config.mine_rate_ms);
        let hash = Self::hash_fields(timestamp, &last.hash, data_value, nonce, difficulty);
        if count_leading_zero_bits(&hash) < difficulty {
            return None;
        }
        Some(Block {
            timestamp,
            last_hash: last.hash.clone(),
            hash: hex::encode(hash),
            data: data.clone(),
            nonce,
            difficulty,
        })
    }

    /// Search nonces from 1 upwards until the hash meets the retargeted
    /// difficulty. Unbounded; see [`crate::mine::mine_block_parallel`] for a
    /// cancellable search.
    pub fn mine(last: &Block, data: BlockData, config: &LedgerConfig) -> Result<Block> {
        let data_value = serde_json::to_value(&data)?;
        let mut nonce = 0u64;
        loop {
            nonce = nonce.wrapping_add(1);
            if let Some(block) = Self::attempt(last, &data, &data_value, nonce, config) {
                return Ok(block);
            }
        }
    }
}
