//! This module includes functions like:
//! - signing with an enrolled identity
//! - validating signatures against an identity
//! - generating proposal nonces
//!
//! Identities are issued elsewhere. `DefaultSigner` is what the sandbox and tests enroll
//! with; any other key scheme only has to implement `Signer`.

use rand::RngCore;
use std::convert::TryFrom;
use thiserror::Error;
use threshold_crypto::{serde_impl::SerdeSecret, PublicKey, SecretKey, Signature, PK_SIZE, SIG_SIZE};
use tx_data::{Nonce, SerializedIdentity, NONCE_SIZE};

#[derive(Debug, Clone, Error)]
pub enum SignErr {
    #[error("identity of {0} doesn't carry a valid public key")]
    MalformedIdentity(String),

    #[error("malformed signature with {0} bytes")]
    MalformedSignature(usize),

    #[error("failed to decode secret key: {0}")]
    KeyDecode(String),
}

/// Opaque signing capability of an enrolled identity.
pub trait Signer: Send + Sync {
    fn identity(&self) -> &SerializedIdentity;

    fn sign(&self, msg: &[u8]) -> Vec<u8>;
}

#[derive(Clone)]
pub struct DefaultSigner {
    identity: SerializedIdentity,
    sk: SecretKey,
}

impl DefaultSigner {
    /// The identity bytes are the public key of `sk`.
    pub fn new(msp_id: impl Into<String>, sk: SecretKey) -> Self {
        let id_bytes = sk.public_key().to_bytes().to_vec();
        DefaultSigner {
            identity: SerializedIdentity::new(msp_id, id_bytes),
            sk,
        }
    }

    pub fn random(msp_id: impl Into<String>) -> Self {
        Self::new(msp_id, SecretKey::random())
    }

    pub fn public_key(&self) -> PublicKey {
        self.sk.public_key()
    }

    /// Secret key as base64(json), the format kept in config files.
    pub fn secret_to_string(&self) -> Result<String, SignErr> {
        serde_json::to_vec(&SerdeSecret(&self.sk))
            .map(base64::encode)
            .map_err(|e| SignErr::KeyDecode(e.to_string()))
    }

    pub fn from_secret_string(msp_id: impl Into<String>, secret: &str) -> Result<Self, SignErr> {
        let raw = base64::decode(secret.trim()).map_err(|e| SignErr::KeyDecode(e.to_string()))?;
        let sk = serde_json::from_slice::<SerdeSecret<SecretKey>>(&raw)
            .map_err(|e| SignErr::KeyDecode(e.to_string()))?;
        Ok(Self::new(msp_id, sk.0))
    }
}

impl Signer for DefaultSigner {
    fn identity(&self) -> &SerializedIdentity {
        &self.identity
    }

    fn sign(&self, msg: &[u8]) -> Vec<u8> {
        self.sk.sign(msg).to_bytes().to_vec()
    }
}

/// Verify `sig` over `msg` with the public key carried by `identity`.
pub fn verify(identity: &SerializedIdentity, msg: &[u8], sig: &[u8]) -> Result<bool, SignErr> {
    let pk_bytes = <[u8; PK_SIZE]>::try_from(identity.id_bytes.as_slice())
        .map_err(|_| SignErr::MalformedIdentity(identity.msp_id.clone()))?;
    let pk = PublicKey::from_bytes(pk_bytes)
        .map_err(|_| SignErr::MalformedIdentity(identity.msp_id.clone()))?;

    let sig_bytes = <[u8; SIG_SIZE]>::try_from(sig).map_err(|_| SignErr::MalformedSignature(sig.len()))?;
    let sig = Signature::from_bytes(sig_bytes).map_err(|_| SignErr::MalformedSignature(sig.len()))?;

    Ok(pk.verify(&sig, msg))
}

/// Fresh random nonce for a proposal.
pub fn new_nonce() -> Nonce {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}
