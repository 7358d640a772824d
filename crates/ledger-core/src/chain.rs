use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::block::{Block, BlockData};
use crate::config::LedgerConfig;
use crate::error::{ChainError, Result, StructureError, TransactionDataError};
use crate::pow::hash_meets_difficulty;
use crate::transaction::Input;
use crate::wallet::Wallet;

/// In-memory chain owned by one node. It always starts at genesis; the only
/// ways to change it are appending a locally mined block or adopting a longer
/// valid chain through [`Chain::replace_chain`], so `blocks` is never empty.
#[derive(Clone, Debug)]
pub struct Chain {
    blocks: Vec<Block>,
    genesis: Block,
    config: LedgerConfig,
}

impl Chain {
    pub fn new(config: LedgerConfig) -> Self {
        let genesis = Block::genesis(&config);
        Self {
            blocks: vec![genesis.clone()],
            genesis,
            config,
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Never true; a chain holds at least genesis.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn tip(&self) -> &Block {
        self.blocks.last().unwrap_or(&self.genesis)
    }

    /// Mine `data` on top of the tip and append it.
    pub fn add_block(&mut self, data: BlockData) -> Result<&Block> {
        let block = Block::mine(self.tip(), data, &self.config)?;
        self.blocks.push(block);
        Ok(self.tip())
    }

    /// Append a block that was mined without holding the chain.
    pub fn append_mined(&mut self, block: Block) -> std::result::Result<(), ChainError> {
        if block.last_hash != self.tip().hash {
            return Err(ChainError::StaleBlock);
        }
        validate_link(self.tip(), &block, self.blocks.len())?;
        self.blocks.push(block);
        Ok(())
    }

    pub fn is_valid(candidate: &[Block], config: &LedgerConfig) -> bool {
        Self::validate_structure(candidate, config).is_ok()
    }

    /// Genesis, links, recomputed hashes, proof of work and difficulty steps.
    pub fn validate_structure(
        candidate: &[Block],
        config: &LedgerConfig,
    ) -> std::result::Result<(), StructureError> {
        let first = candidate.first().ok_or(StructureError::Empty)?;
        if *first != Block::genesis(config) {
            return Err(StructureError::GenesisMismatch);
        }
        for (index, pair) in candidate.windows(2).enumerate() {
            validate_link(&pair[0], &pair[1], index + 1)?;
        }
        Ok(())
    }

    /// Reward and transfer rules for every block after genesis. Expected
    /// balances are replayed from the candidate's own blocks before the one
    /// holding the transaction.
    pub fn valid_transaction_data(
        &self,
        candidate: &[Block],
    ) -> std::result::Result<(), TransactionDataError> {
        for (index, block) in candidate.iter().enumerate().skip(1) {
            let mut seen = HashSet::new();
            let mut rewards = 0usize;

            for tx in block.transactions() {
                if tx.is_reward() {
                    rewards += 1;
                    if rewards > 1 {
                        return Err(TransactionDataError::ExcessRewards { block: index });
                    }
                    let paid = match tx.output_map.values().collect::<Vec<_>>().as_slice() {
                        [amount] => Some(**amount),
                        _ => None,
                    };
                    if paid != Some(self.config.mining_reward) {
                        return Err(TransactionDataError::WrongRewardAmount {
                            block: index,
                            amount: paid,
                        });
                    }
                    continue;
                }

                if !tx.validate() {
                    return Err(TransactionDataError::InvalidTransaction {
                        block: index,
                        id: tx.id.clone(),
                    });
                }

                let declared = match &tx.input {
                    Input::Signed(input) => input.amount,
                    Input::Reward(_) => 0,
                };
                let expected =
                    Wallet::calculate_balance(&candidate[..index], tx.input.address(), &self.config);
                if declared != expected {
                    return Err(TransactionDataError::BalanceMismatch {
                        block: index,
                        id: tx.id.clone(),
                        declared,
                        expected,
                    });
                }

                if !seen.insert(tx) {
                    return Err(TransactionDataError::DuplicateTransaction {
                        block: index,
                        id: tx.id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Fork choice: adopt `candidate` only if it is strictly longer and valid.
    /// `on_accept` runs once, before the swap, with the accepted blocks.
    pub fn replace_chain<F>(
        &mut self,
        candidate: Vec<Block>,
        check_transactions: bool,
        on_accept: F,
    ) -> std::result::Result<(), ChainError>
    where
        F: FnOnce(&[Block]),
    {
        match self.check_candidate(&candidate, check_transactions) {
            Ok(()) => {}
            // peers echo chains we already hold; not worth a warning
            Err(e @ ChainError::ShorterOrEqualChain { .. }) => {
                debug!("Ignoring incoming chain: {e}");
                return Err(e);
            }
            Err(e) => {
                warn!("Rejected incoming chain: {e}");
                return Err(e);
            }
        }

        on_accept(&candidate);
        let tip = candidate.last().map(|b| b.hash.as_str()).unwrap_or_default();
        info!(
            "Replacing chain of length {} with {} (tip {})",
            self.blocks.len(),
            candidate.len(),
            tip
        );
        self.blocks = candidate;
        Ok(())
    }

    fn check_candidate(
        &self,
        candidate: &[Block],
        check_transactions: bool,
    ) -> std::result::Result<(), ChainError> {
        if candidate.len() <= self.blocks.len() {
            return Err(ChainError::ShorterOrEqualChain {
                incoming: candidate.len(),
                current: self.blocks.len(),
            });
        }
        Self::validate_structure(candidate, &self.config)?;
        if check_transactions {
            self.valid_transaction_data(candidate)?;
        }
        Ok(())
    }
}

fn validate_link(
    previous: &Block,
    block: &Block,
    index: usize,
) -> std::result::Result<(), StructureError> {
    if block.last_hash != previous.hash {
        return Err(StructureError::BrokenLink { index });
    }
    match block.compute_hash() {
        Ok(hash) if hash == block.hash => {}
        _ => return Err(StructureError::HashMismatch { index }),
    }
    if previous.difficulty.abs_diff(block.difficulty) > 1 {
        return Err(StructureError::DifficultyJump {
            index,
            previous: previous.difficulty,
            current: block.difficulty,
        });
    }
    if !hash_meets_difficulty(&block.hash, block.difficulty) {
        return Err(StructureError::InsufficientWork {
            index,
            difficulty: block.difficulty,
        });
    }
    Ok(())
}
