use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use crate::block::now_millis;
use crate::config::LedgerConfig;
use crate::constants::REWARD_ADDRESS;
use crate::error::{LedgerError, Result};
use crate::wallet::{verify_signature, Wallet};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignedInput {
    pub timestamp: u64,
    /// Sender balance when the transaction was created.
    pub amount: u64,
    /// Sender public key, hex.
    pub address: String,
    pub signature: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewardInput {
    pub address: String,
}

impl RewardInput {
    pub fn sentinel() -> Self {
        Self {
            address: REWARD_ADDRESS.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Input {
    Signed(SignedInput),
    Reward(RewardInput),
}

impl Input {
    pub fn address(&self) -> &str {
        match self {
            Input::Signed(input) => &input.address,
            Input::Reward(input) => &input.address,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transaction {
    pub id: String,
    pub output_map: BTreeMap<String, u64>,
    pub input: Input,
}

impl Transaction {
    /// Transfer `amount` to `recipient`, leaving the rest of the sender's
    /// balance in the sender's own output.
    pub fn create(sender: &Wallet, recipient: &str, amount: u64) -> Result<Self> {
        let balance = sender.balance();
        let remaining = balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance { amount, balance })?;

        let mut output_map = BTreeMap::new();
        output_map.insert(recipient.to_string(), amount);
        output_map.insert(sender.address().to_string(), remaining);

        let input = Self::sign_input(sender, balance, &output_map)?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            output_map,
            input: Input::Signed(input),
        })
    }

    /// Credit to the miner of a block. Unsigned; carries the reward sentinel.
    pub fn reward(miner: &Wallet, config: &LedgerConfig) -> Self {
        let mut output_map = BTreeMap::new();
        output_map.insert(miner.address().to_string(), config.mining_reward);
        Self {
            id: Uuid::new_v4().to_string(),
            output_map,
            input: Input::Reward(RewardInput::sentinel()),
        }
    }

    fn sign_input(
        sender: &Wallet,
        amount: u64,
        output_map: &BTreeMap<String, u64>,
    ) -> Result<SignedInput> {
        Ok(SignedInput {
            timestamp: now_millis(),
            amount,
            address: sender.address().to_string(),
            signature: sender.sign(output_map)?,
        })
    }

    /// Fold another transfer from the same sender into this pending transaction
    /// and re-sign it.
    pub fn update(&mut self, sender: &Wallet, recipient: &str, amount: u64) -> Result<()> {
        let snapshot = match &self.input {
            Input::Signed(input) if input.address == sender.address() => input.amount,
            _ => {
                return Err(LedgerError::NotSender {
                    id: self.id.clone(),
                })
            }
        };

        let remaining = self.output_map.get(sender.address()).copied().unwrap_or(0);
        if amount > remaining {
            return Err(LedgerError::InsufficientBalance {
                amount,
                balance: remaining,
            });
        }

        let credited = self
            .output_map
            .get(recipient)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or(LedgerError::InsufficientBalance {
                amount,
                balance: remaining,
            })?;
        self.output_map.insert(recipient.to_string(), credited);
        // recipient may be the sender itself; read back after the credit
        let sender_entry = self.output_map.entry(sender.address().to_string()).or_insert(0);
        *sender_entry -= amount;

        self.input = Input::Signed(Self::sign_input(sender, snapshot, &self.output_map)?);
        Ok(())
    }

    pub fn is_reward(&self) -> bool {
        matches!(&self.input, Input::Reward(input) if input.address == REWARD_ADDRESS)
    }

    /// Sum of all outputs, `None` on overflow.
    pub fn output_total(&self) -> Option<u64> {
        self.output_map
            .values()
            .try_fold(0u64, |acc, v| acc.checked_add(*v))
    }

    /// A signed transaction is valid when its outputs add up to the input
    /// amount and the signature covers the output map.
    pub fn validate(&self) -> bool {
        let Input::Signed(input) = &self.input else {
            debug!(id = %self.id, "transaction has no signed input");
            return false;
        };
        if self.output_total() != Some(input.amount) {
            debug!(id = %self.id, "outputs do not add up to input amount {}", input.amount);
            return false;
        }
        if !verify_signature(&input.address, &self.output_map, &input.signature) {
            debug!(id = %self.id, "signature does not verify for {}", input.address);
            return false;
        }
        true
    }
}
