use serde::{Deserialize, Serialize};

use crate::constants::{INITIAL_DIFFICULTY, MINE_RATE_MS, MINING_REWARD, STARTING_BALANCE};

/// Ledger parameters shared by every node that wants to agree on one chain.
///
/// Two nodes with different values produce different genesis blocks and will
/// reject each other's chains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Target milliseconds between blocks.
    pub mine_rate_ms: u64,
    pub initial_difficulty: u32,
    /// Credit assumed for an address with no spend in the chain.
    pub starting_balance: u64,
    pub mining_reward: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mine_rate_ms: MINE_RATE_MS,
            initial_difficulty: INITIAL_DIFFICULTY,
            starting_balance: STARTING_BALANCE,
            mining_reward: MINING_REWARD,
        }
    }
}
