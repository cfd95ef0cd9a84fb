use ed25519_dalek::{Signature, Signer, Verifier, VerifyingKey};
use serde::Serialize;

use fetchcraft_core::{canonical, CidGroupOffer, SubCidOffer};

use crate::keys::{KeyVersion, SigningKeypair};
use crate::{CryptoError, Result};

/// Sign data with a signing keypair
pub fn sign_data(keypair: &SigningKeypair, data: &[u8]) -> [u8; 64] {
    let signature: Signature = keypair.signing_key.sign(data);
    signature.to_bytes()
}

/// Verify a signature
pub fn verify_signature(pubkey: &[u8; 32], data: &[u8], signature: &[u8; 64]) -> bool {
    let verifying_key = match VerifyingKey::from_bytes(pubkey) {
        Ok(vk) => vk,
        Err(_) => return false,
    };

    let signature = Signature::from_bytes(signature);

    verifying_key.verify(data, &signature).is_ok()
}

/// Signature as it travels in a `signature` JSON field:
/// hex of `key_version (u32 big-endian) || ed25519 signature (64 bytes)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireSignature {
    pub version: KeyVersion,
    pub bytes: [u8; 64],
}

impl WireSignature {
    const ENCODED_LEN: usize = 4 + 64;

    pub fn new(version: KeyVersion, bytes: [u8; 64]) -> Self {
        Self { version, bytes }
    }

    pub fn encode(&self) -> String {
        let mut raw = Vec::with_capacity(Self::ENCODED_LEN);
        raw.extend_from_slice(&self.version.0.to_be_bytes());
        raw.extend_from_slice(&self.bytes);
        hex::encode(raw)
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let raw = hex::decode(encoded).map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        if raw.len() != Self::ENCODED_LEN {
            return Err(CryptoError::InvalidSignature(format!(
                "expected {} bytes, got {}",
                Self::ENCODED_LEN,
                raw.len()
            )));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&raw[..4]);
        let version = KeyVersion(u32::from_be_bytes(version));
        if !version.is_valid() {
            return Err(CryptoError::InvalidSignature(format!("invalid key version {version}")));
        }
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(&raw[4..]);
        Ok(Self { version, bytes })
    }

    /// Check this signature over `data` with `pubkey`.
    pub fn verify(&self, pubkey: &[u8; 32], data: &[u8]) -> bool {
        verify_signature(pubkey, data, &self.bytes)
    }
}

/// Sign a protocol message over its canonical encoding (all fields except
/// `signature`) and return the wire form of the signature.
pub fn sign_message<T: Serialize>(
    keypair: &SigningKeypair,
    version: KeyVersion,
    message: &T,
) -> Result<String> {
    let data = canonical::signable_bytes(message)?;
    Ok(WireSignature::new(version, sign_data(keypair, &data)).encode())
}

/// Verify a protocol message's wire signature against its canonical encoding.
pub fn verify_message<T: Serialize>(pubkey: &[u8; 32], message: &T, signature: &str) -> bool {
    let Ok(signature) = WireSignature::decode(signature) else {
        return false;
    };
    match canonical::signable_bytes(message) {
        Ok(data) => signature.verify(pubkey, &data),
        Err(_) => false,
    }
}

/// Verify a protocol message and return the key version it was signed with.
///
/// `None` if the signature is malformed or does not verify.
pub fn verified_key_version<T: Serialize>(
    pubkey: &[u8; 32],
    message: &T,
    signature: &str,
) -> Option<KeyVersion> {
    let signature = WireSignature::decode(signature).ok()?;
    let data = canonical::signable_bytes(message).ok()?;
    signature.verify(pubkey, &data).then_some(signature.version)
}

/// Sign a group offer's terms and store the signature on it
pub fn sign_group_offer(keypair: &SigningKeypair, version: KeyVersion, offer: &mut CidGroupOffer) {
    let signature = sign_data(keypair, &offer.signable_data());
    offer.signature = WireSignature::new(version, signature).encode();
}

/// Verify a sub-CID offer's signature with the provider's public key
pub fn verify_offer_signature(pubkey: &[u8; 32], offer: &SubCidOffer) -> bool {
    match WireSignature::decode(&offer.signature) {
        Ok(signature) => signature.verify(pubkey, &offer.signable_data()),
        Err(_) => false,
    }
}
