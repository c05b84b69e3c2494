//! Gas metering and scheduling
//!
//! Atomic transactions are priced in gas like ordinary ones: a per-byte
//! cost on their signed encoding, a per-signature cost, and a fixed
//! surcharge once it is enabled. The resulting gas is converted to a fee in
//! the external ledger's native unit at the block's base fee.

use crate::{VmError, VmResult};
use delta_core::params::protocol::{
    ATOMIC_GAS_LIMIT, ATOMIC_TX_BASE_COST, COST_PER_SIGNATURE, TX_BYTES_GAS, X2C_RATE,
};
use delta_core::{Gas, Wei};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Gas costs charged to atomic transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtomicGasSchedule {
    /// Cost per byte of the signed encoding
    pub tx_bytes_gas: Gas,
    /// Cost per signature verified
    pub cost_per_signature: Gas,
    /// Flat surcharge per transaction once enabled
    pub atomic_tx_base_cost: Gas,
    /// Gas available to atomic transactions in one block
    pub atomic_gas_limit: Gas,
}

impl Default for AtomicGasSchedule {
    fn default() -> Self {
        Self {
            tx_bytes_gas: TX_BYTES_GAS,
            cost_per_signature: COST_PER_SIGNATURE,
            atomic_tx_base_cost: ATOMIC_TX_BASE_COST,
            atomic_gas_limit: ATOMIC_GAS_LIMIT,
        }
    }
}

impl AtomicGasSchedule {
    /// Load gas schedule from TOML configuration
    pub fn from_toml(toml_str: &str) -> VmResult<Self> {
        toml::from_str(toml_str)
            .map_err(|e| VmError::Config(format!("Failed to parse gas schedule: {}", e)))
    }

    /// Convert to TOML string
    pub fn to_toml(&self) -> VmResult<String> {
        toml::to_string(self)
            .map_err(|e| VmError::Config(format!("Failed to serialize gas schedule: {}", e)))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> VmResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Gas for the encoded bytes of a transaction
    pub fn bytes_cost(&self, len: usize) -> VmResult<Gas> {
        (len as u64)
            .checked_mul(self.tx_bytes_gas)
            .ok_or(VmError::Overflow("atomic byte cost"))
    }

    /// Gas for verifying `count` signatures
    pub fn signature_cost(&self, count: usize) -> VmResult<Gas> {
        (count as u64)
            .checked_mul(self.cost_per_signature)
            .ok_or(VmError::Overflow("atomic signature cost"))
    }
}

/// Gas meter for tracking gas consumption
#[derive(Debug, Clone)]
pub struct GasMeter {
    limit: Gas,
    consumed: Gas,
}

impl GasMeter {
    /// Create a new gas meter
    pub fn new(limit: Gas) -> Self {
        Self { limit, consumed: 0 }
    }

    /// Get remaining gas
    pub fn remaining(&self) -> Gas {
        self.limit.saturating_sub(self.consumed)
    }

    /// Get consumed gas
    pub fn consumed(&self) -> Gas {
        self.consumed
    }

    /// Get gas limit
    pub fn limit(&self) -> Gas {
        self.limit
    }

    /// Check if we have enough gas for an operation
    pub fn check_gas(&self, required: Gas) -> VmResult<()> {
        if required > self.remaining() {
            return Err(VmError::OutOfGas {
                required,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    /// Consume gas for an operation
    pub fn consume(&mut self, amount: Gas) -> VmResult<()> {
        self.check_gas(amount)?;
        self.consumed += amount;
        Ok(())
    }
}

/// Fee in the external ledger's native unit for `gas` at `base_fee`:
/// `ceil(gas * base_fee / X2C_RATE)`
pub fn calculate_dynamic_fee(gas: Gas, base_fee: Option<Wei>) -> VmResult<u64> {
    let base_fee = base_fee.ok_or(VmError::MissingBaseFee)?;
    let fee = u128::from(gas)
        .checked_mul(base_fee)
        .ok_or(VmError::Overflow("dynamic fee"))?;
    let rate = u128::from(X2C_RATE);
    let fee = fee.div_ceil(rate);
    u64::try_from(fee).map_err(|_| VmError::Overflow("dynamic fee"))
}
