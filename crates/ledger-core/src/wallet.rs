use once_cell::sync::Lazy;
use secp256k1::{ecdsa::Signature, All, Message, PublicKey, Secp256k1, SecretKey};
use serde::Serialize;
use std::fmt;

use crate::block::Block;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::hasher::crypto_hash_bytes;
use crate::transaction::Transaction;

/// Shared secp256k1 context; building one is expensive.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

fn digest_message<T: Serialize + ?Sized>(data: &T) -> Result<Message> {
    let value = serde_json::to_value(data)?;
    Ok(Message::from_digest(crypto_hash_bytes(&[value])))
}

/// Verifies a hex compact ECDSA signature over the hash of `data` under a hex
/// public key. Malformed keys or signatures simply fail to verify.
pub fn verify_signature<T: Serialize + ?Sized>(public_key: &str, data: &T, signature: &str) -> bool {
    let Ok(key_bytes) = hex::decode(public_key) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature) else {
        return false;
    };
    let (Ok(key), Ok(sig)) = (
        PublicKey::from_slice(&key_bytes),
        Signature::from_compact(&sig_bytes),
    ) else {
        return false;
    };
    let Ok(message) = digest_message(data) else {
        return false;
    };
    SECP256K1_CONTEXT.verify_ecdsa(&message, &sig, &key).is_ok()
}

pub struct Wallet {
    secret_key: SecretKey,
    public_key: String,
    balance: u64,
    config: LedgerConfig,
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("public_key", &self.public_key)
            .field("balance", &self.balance)
            .finish_non_exhaustive()
    }
}

impl Wallet {
    /// Fresh random keypair holding the configured starting balance.
    pub fn new(config: LedgerConfig) -> Self {
        let secret_key = SecretKey::new(&mut rand::thread_rng());
        Self::from_secret_key(secret_key, config)
    }

    pub fn from_secret_key(secret_key: SecretKey, config: LedgerConfig) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        Self {
            secret_key,
            public_key: hex::encode(public_key.serialize_uncompressed()),
            balance: config.starting_balance,
            config,
        }
    }

    /// Hex-encoded uncompressed public key; doubles as the wallet's address.
    pub fn address(&self) -> &str {
        &self.public_key
    }

    /// Last known balance. Only refreshed by [`Wallet::create_transaction`]
    /// when it is given a chain.
    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Hex compact ECDSA signature over the hash of `data`.
    pub fn sign<T: Serialize + ?Sized>(&self, data: &T) -> Result<String> {
        let message = digest_message(data)?;
        let signature = SECP256K1_CONTEXT.sign_ecdsa(&message, &self.secret_key);
        Ok(hex::encode(signature.serialize_compact()))
    }

    pub fn create_transaction(
        &mut self,
        recipient: &str,
        amount: u64,
        chain: Option<&[Block]>,
    ) -> Result<Transaction> {
        if let Some(chain) = chain {
            self.balance = Self::calculate_balance(chain, &self.public_key, &self.config);
        }
        if amount > self.balance {
            return Err(LedgerError::InsufficientBalance {
                amount,
                balance: self.balance,
            });
        }
        Transaction::create(self, recipient, amount)
    }

    /// Replays `chain` from the tip backwards. Every output to `address` is a
    /// credit; the scan stops after the newest block in which `address` spent,
    /// because that transaction's own change output already carries everything
    /// earlier. Without any spend the starting balance is added.
    pub fn calculate_balance(chain: &[Block], address: &str, config: &LedgerConfig) -> u64 {
        let mut has_spent = false;
        let mut credits = 0u64;

        for block in chain.iter().skip(1).rev() {
            for tx in block.transactions() {
                if tx.input.address() == address {
                    has_spent = true;
                }
                if let Some(amount) = tx.output_map.get(address) {
                    credits = credits.saturating_add(*amount);
                }
            }
            if has_spent {
                break;
            }
        }

        if has_spent {
            credits
        } else {
            config.starting_balance.saturating_add(credits)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;

    fn config() -> LedgerConfig {
        LedgerConfig {
            mine_rate_ms: 0,
            ..LedgerConfig::default()
        }
    }

    #[test]
    fn new_wallet_has_starting_balance_and_hex_key() {
        let wallet = Wallet::new(config());
        assert_eq!(wallet.balance(), config().starting_balance);
        assert_eq!(wallet.address().len(), 130);
        assert!(wallet.address().starts_with("04"));
    }

    #[test]
    fn signatures_verify_only_for_the_signer_and_data() {
        let wallet = Wallet::new(config());
        let other = Wallet::new(config());
        let data = vec!["foo"];
        let sig = wallet.sign(&data).unwrap();

        assert!(verify_signature(wallet.address(), &data, &sig));
        assert!(!verify_signature(other.address(), &data, &sig));
        assert!(!verify_signature(wallet.address(), &vec!["bar"], &sig));
        assert!(!verify_signature(&other.sign(&data).unwrap(), &data, &sig));
    }

    #[test]
    fn malformed_key_does_not_verify() {
        let wallet = Wallet::new(config());
        let sig = wallet.sign("foo").unwrap();
        assert!(!verify_signature("zz", "foo", &sig));
        assert!(!verify_signature("04abcd", "foo", &sig));
    }

    #[test]
    fn create_transaction_rejects_amount_above_balance() {
        let mut wallet = Wallet::new(config());
        let err = wallet.create_transaction("foo", 999_999, None).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[test]
    fn create_transaction_signs_for_the_recipient() {
        let mut wallet = Wallet::new(config());
        let tx = wallet.create_transaction("foo-recipient", 50, None).unwrap();
        assert_eq!(tx.input.address(), wallet.address());
        assert_eq!(tx.output_map["foo-recipient"], 50);
        assert!(tx.validate());
    }

    #[test]
    fn create_transaction_refreshes_balance_from_chain() {
        let cfg = config();
        let mut chain = Chain::new(cfg);
        let mut wallet = Wallet::new(cfg);
        let payer_a = Wallet::new(cfg);
        let payer_b = Wallet::new(cfg);
        let a = Transaction::create(&payer_a, wallet.address(), 65).unwrap();
        let b = Transaction::create(&payer_b, wallet.address(), 60).unwrap();
        chain.add_block(vec![a, b].into()).unwrap();

        let tx = wallet.create_transaction("foo", 10, Some(chain.blocks())).unwrap();
        assert_eq!(wallet.balance(), cfg.starting_balance + 125);
        match &tx.input {
            crate::transaction::Input::Signed(input) => {
                assert_eq!(input.amount, cfg.starting_balance + 125)
            }
            crate::transaction::Input::Reward(_) => panic!("expected signed input"),
        }
    }

    #[test]
    fn balance_without_history_is_the_starting_balance() {
        let cfg = config();
        let chain = Chain::new(cfg);
        let wallet = Wallet::new(cfg);
        assert_eq!(
            Wallet::calculate_balance(chain.blocks(), wallet.address(), &cfg),
            cfg.starting_balance
        );
        assert_eq!(Wallet::calculate_balance(&[], wallet.address(), &cfg), cfg.starting_balance);
    }

    #[test]
    fn balance_adds_credits_to_the_starting_balance() {
        let cfg = config();
        let mut chain = Chain::new(cfg);
        let wallet = Wallet::new(cfg);
        let payer_a = Wallet::new(cfg);
        let payer_b = Wallet::new(cfg);
        let a = Transaction::create(&payer_a, wallet.address(), 50).unwrap();
        let b = Transaction::create(&payer_b, wallet.address(), 60).unwrap();
        chain.add_block(vec![a, b].into()).unwrap();

        assert_eq!(
            Wallet::calculate_balance(chain.blocks(), wallet.address(), &cfg),
            cfg.starting_balance + 110
        );
    }

    #[test]
    fn balance_after_own_spend_counts_only_later_credits() {
        let cfg = config();
        let mut chain = Chain::new(cfg);
        let mut wallet = Wallet::new(cfg);
        let payer = Wallet::new(cfg);

        // credit before the spend is superseded by the spend's change output
        let early = Transaction::create(&payer, wallet.address(), 30).unwrap();
        chain.add_block(vec![early].into()).unwrap();

        let spend = wallet.create_transaction("foo", 100, Some(chain.blocks())).unwrap();
        let change = spend.output_map[wallet.address()];
        assert_eq!(change, cfg.starting_balance + 30 - 100);
        chain.add_block(vec![spend].into()).unwrap();
        assert_eq!(Wallet::calculate_balance(chain.blocks(), wallet.address(), &cfg), change);

        // credits in the spend block itself and in later blocks both count
        let same_block = Transaction::create(&Wallet::new(cfg), wallet.address(), 7).unwrap();
        let spend2 = wallet.create_transaction("bar", 10, Some(chain.blocks())).unwrap();
        let change2 = spend2.output_map[wallet.address()];
        chain.add_block(vec![spend2, same_block].into()).unwrap();
        let later = Transaction::create(&Wallet::new(cfg), wallet.address(), 75).unwrap();
        chain.add_block(vec![later].into()).unwrap();

        assert_eq!(
            Wallet::calculate_balance(chain.blocks(), wallet.address(), &cfg),
            change2 + 7 + 75
        );
    }
}
