//! Ordinary (account-model) transaction

use crate::crypto::{self, Signature};
use crate::{codec, Address, CoreError, CoreResult, Gas, Hash, Nonce, Wei};
use serde::{Deserialize, Serialize};

/// Transaction data structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    /// Chain id for replay protection
    pub chain_id: u64,
    /// Transaction nonce (number of transactions sent from this address)
    pub nonce: Nonce,
    /// Maximum price per gas the sender pays, base fee included
    pub gas_price: Wei,
    /// Maximum tip per gas; `None` means the whole surplus over the base fee
    pub max_priority_fee: Option<Wei>,
    /// Maximum gas to use for this transaction
    pub gas_limit: Gas,
    /// Recipient address (None for contract creation)
    pub to: Option<Address>,
    /// Value to transfer in wei
    pub value: Wei,
    /// Transaction data/input
    pub data: Vec<u8>,
    /// Transaction signature
    pub signature: Option<Signature>,
}

/// Helper struct for encoding transaction data for signing
#[derive(bincode::Encode)]
struct TransactionForSigning<'a> {
    chain_id: u64,
    nonce: Nonce,
    gas_price: Wei,
    max_priority_fee: Option<Wei>,
    gas_limit: Gas,
    to: Option<Address>,
    value: Wei,
    data: &'a [u8],
}

impl Transaction {
    /// Create a simple transfer transaction
    pub fn transfer(
        chain_id: u64,
        nonce: Nonce,
        to: Address,
        value: Wei,
        gas_price: Wei,
        gas_limit: Gas,
    ) -> Self {
        Self {
            chain_id,
            nonce,
            gas_price,
            max_priority_fee: None,
            gas_limit,
            to: Some(to),
            value,
            data: Vec::new(),
            signature: None,
        }
    }

    /// Cap the tip paid on top of the base fee
    pub fn with_max_priority_fee(mut self, tip: Wei) -> Self {
        self.max_priority_fee = Some(tip);
        self
    }

    /// Calculate transaction hash (including signature)
    pub fn hash(&self) -> CoreResult<Hash> {
        Ok(crypto::keccak256(&codec::encode(self)?))
    }

    /// Calculate hash for signing (without signature)
    pub fn signing_hash(&self) -> CoreResult<Hash> {
        let unsigned = TransactionForSigning {
            chain_id: self.chain_id,
            nonce: self.nonce,
            gas_price: self.gas_price,
            max_priority_fee: self.max_priority_fee,
            gas_limit: self.gas_limit,
            to: self.to,
            value: self.value,
            data: &self.data,
        };
        Ok(crypto::keccak256(&codec::encode(&unsigned)?))
    }

    /// Sign the transaction with private key
    pub fn sign(&mut self, private_key: &[u8]) -> CoreResult<()> {
        let digest = self.signing_hash()?;
        self.signature = Some(crypto::sign_digest(&digest, private_key)?);
        Ok(())
    }

    /// Get the sender address from signature
    pub fn sender(&self) -> CoreResult<Address> {
        let signature = self.signature.as_ref().ok_or(CoreError::InvalidSignature)?;
        crypto::recover_address(&self.signing_hash()?, signature)
    }

    /// Tip per gas actually paid at `base_fee`, or `None` if the gas price
    /// does not cover the base fee
    pub fn effective_tip(&self, base_fee: Wei) -> Option<Wei> {
        let surplus = self.gas_price.checked_sub(base_fee)?;
        Some(match self.max_priority_fee {
            Some(cap) => cap.min(surplus),
            None => surplus,
        })
    }
}
