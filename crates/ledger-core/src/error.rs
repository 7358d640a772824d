use thiserror::Error;

use crate::bus::Channel;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("amount {amount} exceeds balance {balance}")]
    InsufficientBalance { amount: u64, balance: u64 },

    #[error("transaction {id} was not issued by this wallet")]
    NotSender { id: String },

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("malformed {channel} payload: {source}")]
    MalformedPayload {
        channel: Channel,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("mining was cancelled")]
    MiningCancelled,
}

/// Outcomes of fork choice and local appends that leave the chain untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("incoming chain of length {incoming} is not longer than the current {current}")]
    ShorterOrEqualChain { incoming: usize, current: usize },

    #[error("invalid chain structure: {0}")]
    InvalidChainStructure(#[from] StructureError),

    #[error("invalid transaction data: {0}")]
    InvalidTransactionData(#[from] TransactionDataError),

    #[error("mined block does not extend the current tip")]
    StaleBlock,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StructureError {
    #[error("chain is empty")]
    Empty,
    #[error("first block is not the genesis block")]
    GenesisMismatch,
    #[error("block {index} does not link to its predecessor")]
    BrokenLink { index: usize },
    #[error("block {index} hash does not match its contents")]
    HashMismatch { index: usize },
    #[error("block {index} difficulty moved from {previous} to {current}")]
    DifficultyJump {
        index: usize,
        previous: u32,
        current: u32,
    },
    #[error("block {index} hash has fewer than {difficulty} leading zero bits")]
    InsufficientWork { index: usize, difficulty: u32 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionDataError {
    #[error("block {block} carries more than one miner reward")]
    ExcessRewards { block: usize },
    #[error("block {block} pays a miner reward of {amount:?}")]
    WrongRewardAmount { block: usize, amount: Option<u64> },
    #[error("transaction {id} in block {block} failed validation")]
    InvalidTransaction { block: usize, id: String },
    #[error("transaction {id} in block {block} declares {declared}, balance is {expected}")]
    BalanceMismatch {
        block: usize,
        id: String,
        declared: u64,
        expected: u64,
    },
    #[error("transaction {id} appears more than once in block {block}")]
    DuplicateTransaction { block: usize, id: String },
}
