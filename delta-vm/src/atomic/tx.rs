//! Signed atomic transactions
//!
//! An unsigned import or export plus one credential per input. The tx id is
//! the Keccak256 of the signed encoding; signatures cover the Keccak256 of
//! the unsigned encoding.

use super::context::{ChainContext, SemanticContext};
use super::export::UnsignedExportTx;
use super::import::UnsignedImportTx;
use super::shared_memory::Requests;
use super::{AtomicResult, AtomicTxError};
use crate::state::StateDB;
use delta_core::crypto::{keccak256, sign_digest, Signature};
use delta_core::{codec, Gas, Hash, Id, Rules};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Signatures authorizing one input
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Credential {
    pub sigs: Vec<Signature>,
}

/// The two directions of cross-chain movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum UnsignedAtomicTx {
    Import(UnsignedImportTx),
    Export(UnsignedExportTx),
}

impl UnsignedAtomicTx {
    /// Canonical unsigned encoding
    pub fn bytes(&self) -> AtomicResult<Vec<u8>> {
        Ok(codec::encode(self)?)
    }

    /// Digest every credential signs
    pub fn signing_hash(&self) -> AtomicResult<Hash> {
        Ok(keccak256(&self.bytes()?))
    }

    pub fn verify(&self, ctx: &ChainContext, rules: &Rules) -> AtomicResult<()> {
        match self {
            Self::Import(tx) => tx.verify(ctx, rules),
            Self::Export(tx) => tx.verify(ctx, rules),
        }
    }

    /// Ids this tx spends; two txs sharing one conflict
    pub fn input_utxos(&self) -> BTreeSet<Id> {
        match self {
            Self::Import(tx) => tx.input_utxos(),
            Self::Export(tx) => tx.input_utxos(),
        }
    }

    /// Amount of `asset` consumed but not produced
    pub fn burned(&self, asset: &Id) -> AtomicResult<u64> {
        match self {
            Self::Import(tx) => tx.burned(asset),
            Self::Export(tx) => tx.burned(asset),
        }
    }

    /// Number of credentials a signed tx must carry
    pub fn input_count(&self) -> usize {
        match self {
            Self::Import(tx) => tx.imported_inputs.len(),
            Self::Export(tx) => tx.ins.len(),
        }
    }
}

/// Signed atomic transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Tx {
    pub unsigned: UnsignedAtomicTx,
    pub creds: Vec<Credential>,
}

impl Tx {
    pub fn new(unsigned: UnsignedAtomicTx) -> Self {
        Self {
            unsigned,
            creds: Vec::new(),
        }
    }

    /// Sign with one key list per input, in input order
    pub fn sign(&mut self, signers: &[Vec<[u8; 32]>]) -> AtomicResult<()> {
        let digest = self.unsigned.signing_hash()?;
        self.creds = signers
            .iter()
            .map(|keys| -> AtomicResult<Credential> {
                let sigs = keys
                    .iter()
                    .map(|key| sign_digest(&digest, key))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Credential { sigs })
            })
            .collect::<AtomicResult<Vec<_>>>()?;
        Ok(())
    }

    /// Signed encoding
    pub fn signed_bytes(&self) -> AtomicResult<Vec<u8>> {
        Ok(codec::encode(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> AtomicResult<Self> {
        Ok(codec::decode(bytes)?)
    }

    pub fn id(&self) -> AtomicResult<Id> {
        Ok(keccak256(&self.signed_bytes()?).into())
    }

    /// Gas charged for this tx; `fixed_fee` adds the flat per-tx surcharge
    pub fn gas_used(&self, fixed_fee: bool) -> AtomicResult<Gas> {
        let len = self.signed_bytes()?.len();
        match &self.unsigned {
            UnsignedAtomicTx::Import(tx) => tx.gas_used(len, fixed_fee),
            UnsignedAtomicTx::Export(tx) => tx.gas_used(len, fixed_fee),
        }
    }

    pub fn input_utxos(&self) -> BTreeSet<Id> {
        self.unsigned.input_utxos()
    }

    pub fn semantic_verify(&self, env: &SemanticContext<'_>) -> AtomicResult<()> {
        match &self.unsigned {
            UnsignedAtomicTx::Import(tx) => tx.semantic_verify(self, env),
            UnsignedAtomicTx::Export(tx) => tx.semantic_verify(self, env),
        }
    }

    /// Shared-memory requests this tx issues on acceptance, keyed by peer
    /// chain
    pub fn atomic_ops(&self) -> AtomicResult<(Id, Requests)> {
        match &self.unsigned {
            UnsignedAtomicTx::Import(tx) => Ok(tx.atomic_ops()),
            UnsignedAtomicTx::Export(tx) => tx.atomic_ops(self.id()?),
        }
    }

    /// Apply this tx to the account model
    pub fn state_transfer(&self, ctx: &ChainContext, state: &mut dyn StateDB) -> AtomicResult<()> {
        match &self.unsigned {
            UnsignedAtomicTx::Import(tx) => tx.state_transfer(ctx, state),
            UnsignedAtomicTx::Export(tx) => tx.state_transfer(ctx, state),
        }
    }

    pub(crate) fn check_credential_count(&self) -> AtomicResult<()> {
        let inputs = self.unsigned.input_count();
        if inputs != self.creds.len() {
            return Err(AtomicTxError::CredentialCount {
                inputs,
                credentials: self.creds.len(),
            });
        }
        Ok(())
    }
}

/// Encode the atomic payload of a block. With `batch` the payload is a
/// list; otherwise it holds the single tx, if any.
pub fn encode_atomic_txs(txs: &[Tx], batch: bool) -> AtomicResult<Vec<u8>> {
    match txs {
        [] => Ok(Vec::new()),
        _ if batch => Ok(codec::encode(&txs.to_vec())?),
        [tx] => tx.signed_bytes(),
        _ => Err(AtomicTxError::TooManyTxs { count: txs.len() }),
    }
}

/// Decode the atomic payload of a block; an empty payload holds no txs
pub fn extract_atomic_txs(bytes: &[u8], batch: bool) -> AtomicResult<Vec<Tx>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    if batch {
        Ok(codec::decode(bytes)?)
    } else {
        Ok(vec![Tx::from_bytes(bytes)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atomic::components::{AccountInput, OutputOwners, TransferOutput, TransferableOutput};
    use crate::atomic::fixtures::*;
    use proptest::prelude::*;

    fn export(nonce: u64) -> Tx {
        export_amount(nonce, 500_000)
    }

    fn export_amount(nonce: u64, amount: u64) -> Tx {
        let mut tx = Tx::new(UnsignedAtomicTx::Export(UnsignedExportTx {
            network_id: NETWORK_ID,
            blockchain_id: CHAIN_ID,
            destination_chain: X_CHAIN_ID,
            ins: vec![AccountInput {
                address: address(&KEY),
                amount: 1_000_000,
                asset_id: NATIVE,
                nonce,
            }],
            exported_outputs: vec![TransferableOutput {
                asset_id: NATIVE,
                output: TransferOutput {
                    amount,
                    owners: OutputOwners::single(short_id(&KEY)),
                },
            }],
        }));
        tx.sign(&[vec![KEY]]).unwrap();
        tx
    }

    #[test]
    fn test_signed_bytes_and_id() {
        let tx = export(0);
        let bytes = tx.signed_bytes().unwrap();
        let decoded = Tx::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.id().unwrap(), tx.id().unwrap());
        assert_eq!(tx.id().unwrap(), Id::from(keccak256(&bytes)));
        assert_ne!(export(1).id().unwrap(), tx.id().unwrap());
    }

    #[test]
    fn test_signatures_cover_unsigned_bytes() {
        let tx = export(0);
        let digest = tx.unsigned.signing_hash().unwrap();
        let signer = delta_core::crypto::recover_address(&digest, &tx.creds[0].sigs[0]).unwrap();
        assert_eq!(signer, address(&KEY));
    }

    #[test]
    fn test_gas_includes_signed_length() {
        let tx = export(0);
        let len = tx.signed_bytes().unwrap().len() as u64;
        assert_eq!(tx.gas_used(false).unwrap(), len + 1_000);
        assert_eq!(tx.gas_used(true).unwrap(), len + 1_000 + 10_000);
    }

    #[test]
    fn test_credential_count() {
        let mut tx = export(0);
        assert!(tx.check_credential_count().is_ok());
        tx.creds.push(Credential::default());
        assert!(matches!(
            tx.check_credential_count(),
            Err(AtomicTxError::CredentialCount { inputs: 1, credentials: 2 })
        ));
    }

    #[test]
    fn test_atomic_payload_modes() {
        let first = export(0);
        let second = export(1);

        assert!(encode_atomic_txs(&[], false).unwrap().is_empty());
        assert!(encode_atomic_txs(&[], true).unwrap().is_empty());
        assert!(extract_atomic_txs(&[], true).unwrap().is_empty());

        let single = encode_atomic_txs(std::slice::from_ref(&first), false).unwrap();
        assert_eq!(single, first.signed_bytes().unwrap());
        assert_eq!(extract_atomic_txs(&single, false).unwrap(), vec![first.clone()]);

        let both = vec![first.clone(), second.clone()];
        let batch = encode_atomic_txs(&both, true).unwrap();
        assert_eq!(extract_atomic_txs(&batch, true).unwrap(), both);

        assert!(matches!(
            encode_atomic_txs(&both, false),
            Err(AtomicTxError::TooManyTxs { count: 2 })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_atomic_payload_round_trip(
            specs in proptest::collection::vec((any::<u64>(), 1u64..=1_000_000), 0..4),
            batch in any::<bool>(),
        ) {
            let txs: Vec<Tx> = specs
                .iter()
                .map(|(nonce, amount)| export_amount(*nonce, *amount))
                .collect();
            let txs = if batch { txs } else { txs.into_iter().take(1).collect() };

            let payload = encode_atomic_txs(&txs, batch).unwrap();
            let decoded = extract_atomic_txs(&payload, batch).unwrap();
            prop_assert_eq!(decoded.len(), txs.len());
            for (got, want) in decoded.iter().zip(&txs) {
                prop_assert_eq!(got.id().unwrap(), want.id().unwrap());
            }
            prop_assert_eq!(encode_atomic_txs(&decoded, batch).unwrap(), payload);
        }
    }
}
