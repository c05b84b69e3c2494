//! Block data structures and operations
//!
//! The header carries the usual execution-layer fields plus the extension
//! fields used by the fee engine and the atomic subsystem:
//! - `extra`: the 80-byte gas consumption window once dynamic fees are on
//! - `ext_data_hash`: commitment to the atomic transaction payload
//! - `base_fee`, `ext_data_gas_used`, `block_gas_cost`

use crate::crypto::keccak256;
use crate::{codec, Address, BlockNumber, CoreResult, Hash, Timestamp, Transaction, Wei};
use serde::{Deserialize, Serialize};

/// Block header
#[derive(
    Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Header {
    /// Hash of the parent block
    pub parent_hash: Hash,
    /// Hash of the (always empty) uncle list
    pub uncle_hash: Hash,
    /// Fee recipient, pinned to the burn address
    pub coinbase: Address,
    /// Root hash of the state
    pub state_root: Hash,
    /// Commitment to the ordinary transactions
    pub tx_hash: Hash,
    /// Commitment to the receipts
    pub receipt_hash: Hash,
    pub difficulty: u64,
    /// Block number (height)
    pub number: BlockNumber,
    /// Gas limit for all ordinary transactions in this block
    pub gas_limit: u64,
    /// Gas used by ordinary transactions in this block
    pub gas_used: u64,
    /// Block timestamp in seconds
    pub time: Timestamp,
    /// Extra data; the consumption window once dynamic fees are active
    pub extra: Vec<u8>,
    pub mix_digest: Hash,
    pub nonce: u64,
    /// Hash of the atomic transaction payload
    pub ext_data_hash: Hash,
    /// Base fee per gas
    pub base_fee: Option<Wei>,
    /// Gas consumed by atomic transactions
    pub ext_data_gas_used: Option<u64>,
    /// Block gas cost surcharge
    pub block_gas_cost: Option<u128>,
}

impl Header {
    /// Calculate the hash of this block header
    pub fn hash(&self) -> CoreResult<Hash> {
        Ok(keccak256(&codec::encode(self)?))
    }
}

/// Hash committing to the atomic transaction payload
pub fn calc_ext_data_hash(ext_data: &[u8]) -> CoreResult<Hash> {
    Ok(keccak256(&codec::encode(&ext_data)?))
}

/// Hash committing to the uncle list
pub fn calc_uncle_hash(uncles: &[Header]) -> CoreResult<Hash> {
    Ok(keccak256(&codec::encode(&uncles)?))
}

/// Commitment to an ordered list of transactions: Keccak256 over the
/// concatenated transaction hashes, zero for an empty list
pub fn derive_tx_hash(transactions: &[Transaction]) -> CoreResult<Hash> {
    if transactions.is_empty() {
        return Ok(Hash::zero());
    }

    let mut concatenated = Vec::with_capacity(transactions.len() * 32);
    for tx in transactions {
        concatenated.extend_from_slice(tx.hash()?.as_bytes());
    }
    Ok(keccak256(&concatenated))
}

/// Complete block with header, body and atomic payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    /// Block header
    pub header: Header,
    /// Ordinary transactions
    pub transactions: Vec<Transaction>,
    /// Uncles; never valid in a verified block
    pub uncles: Vec<Header>,
    /// Body format version
    pub version: u32,
    /// Opaque atomic transaction payload
    pub ext_data: Option<Vec<u8>>,
}

impl Block {
    /// Assemble a block, deriving the transaction and uncle commitments.
    /// With `recalc_ext_hash` the header's `ext_data_hash` is derived from
    /// `ext_data` as well.
    pub fn new(
        mut header: Header,
        transactions: Vec<Transaction>,
        uncles: Vec<Header>,
        ext_data: Option<Vec<u8>>,
        recalc_ext_hash: bool,
    ) -> CoreResult<Self> {
        header.tx_hash = derive_tx_hash(&transactions)?;
        header.uncle_hash = calc_uncle_hash(&uncles)?;
        if recalc_ext_hash {
            header.ext_data_hash = calc_ext_data_hash(ext_data.as_deref().unwrap_or_default())?;
        }
        Ok(Self {
            header,
            transactions,
            uncles,
            version: 0,
            ext_data,
        })
    }

    /// Get the block hash (same as header hash)
    pub fn hash(&self) -> CoreResult<Hash> {
        self.header.hash()
    }

    /// Atomic transaction payload, empty when absent
    pub fn ext_data(&self) -> &[u8] {
        self.ext_data.as_deref().unwrap_or_default()
    }

    pub fn number(&self) -> BlockNumber {
        self.header.number
    }

    pub fn time(&self) -> Timestamp {
        self.header.time
    }

    pub fn parent_hash(&self) -> Hash {
        self.header.parent_hash
    }

    /// Wire encoding
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        codec::encode(self)
    }

    /// Parse from wire encoding
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        codec::decode(bytes)
    }
}
