//! Proof-of-work account ledger: blocks, signed transfers, wallets, fork choice.
//!
//! Everything in this crate is synchronous and free of I/O. Nodes wrap [`Chain`]
//! and [`TransactionPool`] in their own locks and talk to peers through a
//! [`bus::Publisher`].

pub mod block;
pub mod bus;
pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod hasher;
pub mod mine;
pub mod miner;
pub mod pool;
pub mod transaction;
pub mod wallet;

pub use block::{now_millis, Block, BlockData};
pub use chain::Chain;
pub use config::LedgerConfig;
pub use error::{ChainError, LedgerError, Result, StructureError, TransactionDataError};
pub use hasher::{crypto_hash, crypto_hash_bytes};
pub use miner::Miner;
pub use pool::TransactionPool;
pub use transaction::{Input, RewardInput, SignedInput, Transaction};
pub use wallet::{verify_signature, Wallet};

pub mod pow {
    /// Number of leading zero bits in `hash`, scanning bytes most significant first.
    pub fn count_leading_zero_bits(hash: &[u8]) -> u32 {
        let mut total = 0u32;
        for b in hash {
            if *b == 0 {
                total += 8;
            } else {
                total += b.leading_zeros();
                break;
            }
        }
        total
    }

    /// Whether a hex digest carries at least `difficulty` leading zero bits.
    /// Anything that is not hex has none.
    pub fn hash_meets_difficulty(hash: &str, difficulty: u32) -> bool {
        let zeros = hex::decode(hash)
            .map(|bytes| count_leading_zero_bits(&bytes))
            .unwrap_or(0);
        zeros >= difficulty
    }
}
