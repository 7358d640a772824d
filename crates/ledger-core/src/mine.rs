use crate::{Block, BlockData, LedgerConfig, LedgerError, Result};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Mines a block on top of `last` by searching nonces in parallel until a hash meets the
/// retargeted difficulty. `cancel` is checked on every attempt; once it is raised the search
/// stops and `MiningCancelled` is returned.
pub fn mine_block_parallel(
    last: &Block,
    data: BlockData,
    config: &LedgerConfig,
    cancel: &AtomicBool,
) -> Result<Block> {
    let data_value = serde_json::to_value(&data)?;

    // Rayon splits the nonce range across threads; `Some(None)` ends the search on cancel.
    let found = (1u64..u64::MAX).into_par_iter().find_map_any(|nonce| {
        if cancel.load(Ordering::Relaxed) {
            return Some(None);
        }
        Block::attempt(last, &data, &data_value, nonce, config).map(Some)
    });

    match found {
        Some(Some(block)) => {
            info!(
                "Mined block on {} with nonce {} difficulty {} and hash {}",
                last.hash, block.nonce, block.difficulty, block.hash
            );
            Ok(block)
        }
        _ => Err(LedgerError::MiningCancelled),
    }
}
