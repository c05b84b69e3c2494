//! Spend authorization for external-ledger outputs

use super::components::{TransferInput, TransferOutput};
use super::tx::Credential;
use super::{AtomicResult, AtomicTxError};
use delta_core::crypto::{keccak256, public_key_to_short_id, recover_public_key};

/// Checks that a credential may spend an output
pub trait Fx: Send + Sync {
    /// `unsigned_bytes` is the unsigned encoding of the spending tx
    fn verify_transfer(
        &self,
        unsigned_bytes: &[u8],
        input: &TransferInput,
        cred: &Credential,
        output: &TransferOutput,
    ) -> AtomicResult<()>;
}

/// Threshold secp256k1 ownership with an optional locktime
#[derive(Debug, Clone, Default)]
pub struct SecpTransferFx {
    fixed_now: Option<u64>,
}

impl SecpTransferFx {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate locktimes against `now` instead of the wall clock
    pub fn with_fixed_time(now: u64) -> Self {
        Self {
            fixed_now: Some(now),
        }
    }

    fn now(&self) -> u64 {
        self.fixed_now
            .unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64)
    }
}

impl Fx for SecpTransferFx {
    fn verify_transfer(
        &self,
        unsigned_bytes: &[u8],
        input: &TransferInput,
        cred: &Credential,
        output: &TransferOutput,
    ) -> AtomicResult<()> {
        if input.amount != output.amount {
            return Err(AtomicTxError::InvalidEntry {
                what: "transfer input",
                reason: format!(
                    "amount {} does not match utxo amount {}",
                    input.amount, output.amount
                ),
            });
        }

        let owners = &output.owners;
        let now = self.now();
        if owners.locktime > now {
            return Err(AtomicTxError::Locked {
                locktime: owners.locktime,
                now,
            });
        }

        let threshold = owners.threshold as usize;
        if input.sig_indices.len() != threshold {
            return Err(AtomicTxError::SignatureCount {
                expected: threshold,
                actual: input.sig_indices.len(),
            });
        }
        if cred.sigs.len() != threshold {
            return Err(AtomicTxError::SignatureCount {
                expected: threshold,
                actual: cred.sigs.len(),
            });
        }

        let digest = keccak256(unsigned_bytes);
        for (index, sig) in input.sig_indices.iter().zip(&cred.sigs) {
            let owner = owners
                .addrs
                .get(*index as usize)
                .ok_or_else(|| AtomicTxError::InvalidEntry {
                    what: "transfer input",
                    reason: format!("signature index {index} out of range"),
                })?;
            let signer = public_key_to_short_id(&recover_public_key(&digest, sig)?);
            if signer != *owner {
                return Err(AtomicTxError::SignatureMismatch);
            }
        }
        Ok(())
    }
}
