//! Entries moved across the chain boundary
//!
//! The external ledger side uses unspent outputs owned by sets of short
//! ids; the account side uses plain `(address, amount, asset)` entries.

use super::{AtomicResult, AtomicTxError};
use delta_core::crypto::keccak256;
use delta_core::params::protocol::COST_PER_SIGNATURE;
use delta_core::{codec, Address, Gas, Id, Nonce, ShortId};
use serde::{Deserialize, Serialize};

fn invalid(what: &'static str, reason: impl Into<String>) -> AtomicTxError {
    AtomicTxError::InvalidEntry {
        what,
        reason: reason.into(),
    }
}

/// True when every element is strictly greater than the previous one
pub fn is_sorted_and_unique_by<T, K: Ord>(items: &[T], key: impl Fn(&T) -> K) -> bool {
    items.windows(2).all(|pair| key(&pair[0]) < key(&pair[1]))
}

/// True when no element is smaller than the previous one
pub fn is_sorted_by<T, K: Ord>(items: &[T], key: impl Fn(&T) -> K) -> bool {
    items.windows(2).all(|pair| key(&pair[0]) <= key(&pair[1]))
}

/// Reference to one output of a transaction
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub struct UtxoId {
    pub tx_id: Id,
    pub output_index: u32,
}

impl UtxoId {
    pub fn new(tx_id: Id, output_index: u32) -> Self {
        Self {
            tx_id,
            output_index,
        }
    }

    /// Key of this output in shared memory
    pub fn input_id(&self) -> Id {
        let mut bytes = [0u8; 36];
        bytes[..32].copy_from_slice(self.tx_id.as_bytes());
        bytes[32..].copy_from_slice(&self.output_index.to_be_bytes());
        keccak256(&bytes).into()
    }
}

/// Who may spend an output and from when
#[derive(
    Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct OutputOwners {
    /// Earliest unix time at which the output is spendable
    pub locktime: u64,
    /// Number of owner signatures required
    pub threshold: u32,
    /// Owners, sorted and unique
    pub addrs: Vec<ShortId>,
}

impl OutputOwners {
    /// Single owner, spendable immediately
    pub fn single(owner: ShortId) -> Self {
        Self {
            locktime: 0,
            threshold: 1,
            addrs: vec![owner],
        }
    }

    pub fn verify(&self) -> AtomicResult<()> {
        if self.threshold as usize > self.addrs.len() {
            return Err(invalid("output owners", "threshold exceeds owner count"));
        }
        if self.threshold == 0 && !self.addrs.is_empty() {
            return Err(invalid("output owners", "owners listed with zero threshold"));
        }
        if !is_sorted_and_unique_by(&self.addrs, |a| *a) {
            return Err(invalid("output owners", "addresses not sorted and unique"));
        }
        Ok(())
    }
}

/// Amount locked to a set of owners
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TransferOutput {
    pub amount: u64,
    pub owners: OutputOwners,
}

impl TransferOutput {
    pub fn verify(&self) -> AtomicResult<()> {
        if self.amount == 0 {
            return Err(invalid("transfer output", "zero amount"));
        }
        self.owners.verify()
    }
}

/// Spend of a transfer output; `sig_indices` select the signing owners
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TransferInput {
    pub amount: u64,
    pub sig_indices: Vec<u32>,
}

impl TransferInput {
    pub fn verify(&self) -> AtomicResult<()> {
        if self.amount == 0 {
            return Err(invalid("transfer input", "zero amount"));
        }
        if !is_sorted_and_unique_by(&self.sig_indices, |i| *i) {
            return Err(invalid("transfer input", "signature indices not sorted and unique"));
        }
        Ok(())
    }

    /// Gas for verifying this input's signatures
    pub fn cost(&self) -> AtomicResult<Gas> {
        (self.sig_indices.len() as u64)
            .checked_mul(COST_PER_SIGNATURE)
            .ok_or(AtomicTxError::Overflow("input cost"))
    }
}

/// Input consuming an external-ledger output
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TransferableInput {
    pub utxo_id: UtxoId,
    pub asset_id: Id,
    pub input: TransferInput,
}

impl TransferableInput {
    pub fn verify(&self) -> AtomicResult<()> {
        self.input.verify()
    }

    pub fn input_id(&self) -> Id {
        self.utxo_id.input_id()
    }
}

/// Output created on the external ledger
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TransferableOutput {
    pub asset_id: Id,
    pub output: TransferOutput,
}

impl TransferableOutput {
    pub fn verify(&self) -> AtomicResult<()> {
        self.output.verify()
    }

    /// Canonical ordering key: asset, then the output fields in encoding
    /// order. Every field encodes big-endian at a fixed width, so comparing
    /// keys orders outputs the same way as comparing their encoded bytes.
    pub fn sort_key(&self) -> (Id, u64, u64, u32, usize, Vec<ShortId>) {
        let owners = &self.output.owners;
        (
            self.asset_id,
            self.output.amount,
            owners.locktime,
            owners.threshold,
            owners.addrs.len(),
            owners.addrs.clone(),
        )
    }
}

/// Sort exported outputs into canonical order
pub fn sort_transferable_outputs(outputs: &mut [TransferableOutput]) {
    outputs.sort_by_cached_key(TransferableOutput::sort_key);
}

/// Unspent output as stored in shared memory
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Utxo {
    pub utxo_id: UtxoId,
    pub asset_id: Id,
    pub output: TransferOutput,
}

impl Utxo {
    pub fn input_id(&self) -> Id {
        self.utxo_id.input_id()
    }

    pub fn to_bytes(&self) -> AtomicResult<Vec<u8>> {
        Ok(codec::encode(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> AtomicResult<Self> {
        Ok(codec::decode(bytes)?)
    }
}

/// Credit to an account
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct AccountOutput {
    pub address: Address,
    pub amount: u64,
    pub asset_id: Id,
}

impl AccountOutput {
    pub fn verify(&self) -> AtomicResult<()> {
        if self.amount == 0 {
            return Err(invalid("account output", "zero amount"));
        }
        Ok(())
    }

    /// Canonical ordering key
    pub fn sort_key(&self) -> (Address, Id) {
        (self.address, self.asset_id)
    }
}

/// Debit from an account, gated on its nonce
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct AccountInput {
    pub address: Address,
    pub amount: u64,
    pub asset_id: Id,
    pub nonce: Nonce,
}

impl AccountInput {
    pub fn verify(&self) -> AtomicResult<()> {
        if self.amount == 0 {
            return Err(invalid("account input", "zero amount"));
        }
        Ok(())
    }

    pub fn sort_key(&self) -> (Address, Id) {
        (self.address, self.asset_id)
    }

    /// Conflict key: nonce, address length, address
    pub fn input_id(&self) -> Id {
        let mut raw = [0u8; 32];
        raw[..8].copy_from_slice(&self.nonce.to_be_bytes());
        raw[8..12].copy_from_slice(&(Address::LEN as u32).to_be_bytes());
        raw[12..].copy_from_slice(self.address.as_bytes());
        Id::new(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(byte: u8) -> ShortId {
        ShortId::new([byte; 20])
    }

    #[test]
    fn test_owners_verify() {
        assert!(OutputOwners::single(owner(1)).verify().is_ok());
        assert!(OutputOwners::default().verify().is_ok());

        let too_high = OutputOwners {
            locktime: 0,
            threshold: 2,
            addrs: vec![owner(1)],
        };
        assert!(too_high.verify().is_err());

        let unsorted = OutputOwners {
            locktime: 0,
            threshold: 1,
            addrs: vec![owner(2), owner(1)],
        };
        assert!(unsorted.verify().is_err());

        let zero_threshold = OutputOwners {
            locktime: 0,
            threshold: 0,
            addrs: vec![owner(1)],
        };
        assert!(zero_threshold.verify().is_err());
    }

    #[test]
    fn test_input_cost_and_verify() {
        let input = TransferInput {
            amount: 5,
            sig_indices: vec![0, 2],
        };
        assert!(input.verify().is_ok());
        assert_eq!(input.cost().unwrap(), 2 * COST_PER_SIGNATURE);

        let repeated = TransferInput {
            amount: 5,
            sig_indices: vec![1, 1],
        };
        assert!(repeated.verify().is_err());
        let empty = TransferInput {
            amount: 0,
            sig_indices: vec![],
        };
        assert!(empty.verify().is_err());
    }

    #[test]
    fn test_account_input_id_layout() {
        let input = AccountInput {
            address: Address::new([0xab; 20]),
            amount: 1,
            asset_id: Id::zero(),
            nonce: 0x0102,
        };
        let id = input.input_id();
        let bytes = id.as_bytes();
        assert_eq!(&bytes[..8], &[0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(&bytes[8..12], &[0, 0, 0, 20]);
        assert_eq!(&bytes[12..], &[0xab; 20]);
    }

    #[test]
    fn test_utxo_id_distinct_per_index() {
        let tx = Id::new([3u8; 32]);
        assert_ne!(UtxoId::new(tx, 0).input_id(), UtxoId::new(tx, 1).input_id());
        assert_eq!(UtxoId::new(tx, 0).input_id(), UtxoId::new(tx, 0).input_id());
    }

    #[test]
    fn test_utxo_bytes() {
        let utxo = Utxo {
            utxo_id: UtxoId::new(Id::new([1u8; 32]), 4),
            asset_id: Id::new([2u8; 32]),
            output: TransferOutput {
                amount: 99,
                owners: OutputOwners::single(owner(7)),
            },
        };
        let bytes = utxo.to_bytes().unwrap();
        assert_eq!(Utxo::from_bytes(&bytes).unwrap(), utxo);
        assert!(Utxo::from_bytes(&bytes[1..]).is_err());
    }

    #[test]
    fn test_sort_transferable_outputs() {
        let out = |asset: u8, amount: u64| TransferableOutput {
            asset_id: Id::new([asset; 32]),
            output: TransferOutput {
                amount,
                owners: OutputOwners::single(owner(1)),
            },
        };
        let mut outputs = vec![out(2, 1), out(1, 9), out(1, 3)];
        assert!(!is_sorted_by(&outputs, TransferableOutput::sort_key));
        sort_transferable_outputs(&mut outputs);
        assert!(is_sorted_by(&outputs, TransferableOutput::sort_key));
        assert_eq!(outputs[0], out(1, 3));
        assert_eq!(outputs[2], out(2, 1));
    }

    #[test]
    fn test_sort_key_follows_encoded_order() {
        let out = |amount: u64, locktime: u64, threshold: u32, addrs: Vec<ShortId>| {
            TransferableOutput {
                asset_id: Id::new([1u8; 32]),
                output: TransferOutput {
                    amount,
                    owners: OutputOwners {
                        locktime,
                        threshold,
                        addrs,
                    },
                },
            }
        };
        let outputs = vec![
            out(256, 0, 1, vec![owner(1)]),
            out(1, 0, 1, vec![owner(9)]),
            out(1, 0, 1, vec![owner(1), owner(2)]),
            out(1, 0, 2, vec![owner(1), owner(2)]),
            out(1, 1 << 40, 1, vec![owner(1)]),
            out(1, 0, 0, vec![]),
        ];
        for a in &outputs {
            for b in &outputs {
                let by_key = a.sort_key().cmp(&b.sort_key());
                let by_bytes = codec::encode(a).unwrap().cmp(&codec::encode(b).unwrap());
                assert_eq!(by_key, by_bytes, "{:?} vs {:?}", a.output, b.output);
            }
        }
    }
}
