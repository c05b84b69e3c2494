//! Hashing, recoverable secp256k1 signatures and key-to-address derivation

use crate::{Address, CoreError, CoreResult, Hash, ShortId};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Keccak-256 of `data`
pub fn keccak256(data: &[u8]) -> Hash {
    let digest = Keccak256::digest(data);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(digest.as_slice());
    Hash::new(bytes)
}

/// Recoverable signature
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

impl Signature {
    /// Create new signature
    pub fn new(r: [u8; 32], s: [u8; 32], v: u8) -> Self {
        Self { r, s, v }
    }

    /// Convert to bytes (65 bytes total)
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[0..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    /// Create from bytes
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != 65 {
            return Err(CoreError::InvalidSignature);
        }

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[0..32]);
        s.copy_from_slice(&bytes[32..64]);

        Ok(Self { r, s, v: bytes[64] })
    }
}

/// Sign a 32-byte digest with a raw secret key
pub fn sign_digest(digest: &Hash, private_key: &[u8]) -> CoreResult<Signature> {
    let secp = Secp256k1::new();
    let secret_key =
        SecretKey::from_slice(private_key).map_err(|e| CoreError::Crypto(e.to_string()))?;
    let message = Message::from_digest(*digest.as_bytes());

    let sig = secp.sign_ecdsa_recoverable(message, &secret_key);
    let (recovery_id, sig_bytes) = sig.serialize_compact();

    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&sig_bytes[0..32]);
    s.copy_from_slice(&sig_bytes[32..64]);

    Ok(Signature::new(r, s, i32::from(recovery_id) as u8))
}

/// Recover the public key that produced `signature` over `digest`
pub fn recover_public_key(digest: &Hash, signature: &Signature) -> CoreResult<PublicKey> {
    let secp = Secp256k1::new();
    let recovery_id = RecoveryId::from_u8_masked(signature.v);

    let mut sig_bytes = [0u8; 64];
    sig_bytes[0..32].copy_from_slice(&signature.r);
    sig_bytes[32..64].copy_from_slice(&signature.s);

    let recoverable = RecoverableSignature::from_compact(&sig_bytes, recovery_id)
        .map_err(|e| CoreError::Crypto(e.to_string()))?;
    let message = Message::from_digest(*digest.as_bytes());

    secp.recover_ecdsa(message, &recoverable)
        .map_err(|e| CoreError::Crypto(e.to_string()))
}

/// Account address of a public key: last 20 bytes of Keccak256 over the
/// uncompressed key without its 0x04 tag
pub fn public_key_to_address(public_key: &PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash.as_bytes()[12..32]);
    Address::new(addr)
}

/// External ledger owner id of a public key. Same derivation as the
/// account address so one key controls both sides.
pub fn public_key_to_short_id(public_key: &PublicKey) -> ShortId {
    ShortId::new(*public_key_to_address(public_key).as_bytes())
}

/// Recover the signer's account address
pub fn recover_address(digest: &Hash, signature: &Signature) -> CoreResult<Address> {
    recover_public_key(digest, signature).map(|pk| public_key_to_address(&pk))
}

/// Address controlled by a raw secret key
pub fn address_of(private_key: &[u8]) -> CoreResult<Address> {
    let secp = Secp256k1::new();
    let secret_key =
        SecretKey::from_slice(private_key).map_err(|e| CoreError::Crypto(e.to_string()))?;
    Ok(public_key_to_address(&PublicKey::from_secret_key(
        &secp,
        &secret_key,
    )))
}
