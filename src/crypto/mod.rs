//! Crypto core (spec §4.2): digesting, PKCS#1 v1.5 sign/verify, RSA-OAEP key wrap, and
//! AES content encryption. Every operation here is written to fail the same way
//! regardless of which sub-step went wrong — see `common::error::HubError::Crypto`.

pub mod hsm;
pub mod keys;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use rand::RngCore;
use rsa::{Oaep, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::sync::Arc;

use crate::common::algo::Alg;
use crate::common::error::HubError;
use hsm::{HsmClient, HsmOp};
use keys::KeyRef;

/// Computes a raw digest for `alg` over `data` (spec §4.2 — the digest step feeding
/// both the `DigestValue` element and the PKCS#1 v1.5 prehash).
pub fn hash(alg: Alg, data: &[u8]) -> Vec<u8> {
    match alg {
        Alg::Sha1 => Sha1::digest(data).to_vec(),
        Alg::Sha256 => Sha256::digest(data).to_vec(),
        Alg::Sha384 => Sha384::digest(data).to_vec(),
        Alg::Sha512 => Sha512::digest(data).to_vec(),
    }
}

/// A private-key operation: either performed against local key material, or delegated to
/// an HSM over RPC. Both arms fold any failure into a single opaque `Crypto` error.
pub struct Signer {
    key: KeyRef,
    hsm: Arc<dyn HsmClient>,
}

impl Signer {
    pub fn new(key: KeyRef, hsm: Arc<dyn HsmClient>) -> Self {
        Self { key, hsm }
    }

    /// Signs a prehashed digest with PKCS#1 v1.5 padding for `alg`.
    pub async fn sign(&self, alg: Alg, digest: &[u8]) -> Result<Vec<u8>, HubError> {
        match &self.key {
            KeyRef::Local(private) => sign_pkcs1v15(private, alg, digest),
            KeyRef::Hsm { label, endpoint } => {
                self.hsm
                    .call(endpoint, HsmOp::Sign, label, alg, digest)
                    .await
            }
        }
    }

    /// Unwraps an RSA-OAEP-encrypted content key.
    pub async fn decrypt_oaep(&self, alg: Alg, ciphertext: &[u8]) -> Result<Vec<u8>, HubError> {
        match &self.key {
            KeyRef::Local(private) => decrypt_oaep(private, alg, ciphertext),
            KeyRef::Hsm { label, endpoint } => {
                self.hsm
                    .call(endpoint, HsmOp::Decrypt, label, alg, ciphertext)
                    .await
            }
        }
    }
}

fn pkcs1v15_padding(alg: Alg) -> Result<Pkcs1v15Sign, HubError> {
    Ok(match alg {
        Alg::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
        Alg::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        Alg::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        Alg::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
    })
}

fn sign_pkcs1v15(key: &RsaPrivateKey, alg: Alg, digest: &[u8]) -> Result<Vec<u8>, HubError> {
    let padding = pkcs1v15_padding(alg)?;
    key.sign(padding, digest)
        .map_err(|_| HubError::crypto("signing"))
}

/// Verifies a PKCS#1 v1.5 signature against each candidate certificate's public key,
/// returning true on the first match (signing-key rollover, spec §4.2/§4.3).
pub fn verify_pkcs1v15(candidates: &[RsaPublicKey], alg: Alg, digest: &[u8], sig: &[u8]) -> bool {
    let padding = match pkcs1v15_padding(alg) {
        Ok(p) => p,
        Err(_) => return false,
    };
    candidates
        .iter()
        .any(|pk| pk.verify(padding.clone(), digest, sig).is_ok())
}

fn oaep_padding(alg: Alg) -> Result<Oaep, HubError> {
    Ok(match alg {
        Alg::Sha1 => Oaep::new::<Sha1>(),
        Alg::Sha256 => Oaep::new::<Sha256>(),
        _ => return Err(HubError::crypto("oaep digest")),
    })
}

/// Wraps a content-encryption key for the recipient's certificate (RSA-OAEP, spec §4.2).
pub fn encrypt_oaep(recipient: &RsaPublicKey, alg: Alg, key: &[u8]) -> Result<Vec<u8>, HubError> {
    let padding = oaep_padding(alg)?;
    let mut rng = rand::thread_rng();
    recipient
        .encrypt(&mut rng, padding, key)
        .map_err(|_| HubError::crypto("oaep wrap"))
}

fn decrypt_oaep(key: &RsaPrivateKey, alg: Alg, ciphertext: &[u8]) -> Result<Vec<u8>, HubError> {
    let padding = oaep_padding(alg)?;
    key.decrypt(padding, ciphertext)
        .map_err(|_| HubError::crypto("oaep unwrap"))
}

/// Seals `plaintext` under a fresh random 256-bit key with AES-256-GCM, returning the
/// key and a frame of `nonce(12) || ciphertext || tag(16)` (spec §4.2).
pub fn aes_seal(plaintext: &[u8]) -> Result<([u8; 32], Vec<u8>), HubError> {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    let mut nonce_bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| HubError::crypto("seal"))?;
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| HubError::crypto("seal"))?;

    let mut frame = Vec::with_capacity(12 + ciphertext.len());
    frame.extend_from_slice(&nonce_bytes);
    frame.extend_from_slice(&ciphertext);
    Ok((key, frame))
}

/// Opens a content frame under `key`, accepting either AES-256-GCM (`nonce(12) ||
/// ciphertext || tag(16)`) or legacy AES-CBC/PKCS#7 (`iv(16) || ciphertext`) framing
/// (spec §4.2). GCM is tried first; CBC is the fallback for interoperability with
/// partners who have not migrated.
pub fn aes_open(key: &[u8], frame: &[u8]) -> Result<Vec<u8>, HubError> {
    if key.len() == 32 {
        if let Ok(pt) = aes_gcm_open(key, frame) {
            return Ok(pt);
        }
    }
    aes_cbc_open(key, frame)
}

fn aes_gcm_open(key: &[u8], frame: &[u8]) -> Result<Vec<u8>, HubError> {
    if frame.len() < 40 {
        return Err(HubError::crypto("open"));
    }
    let (nonce_bytes, ciphertext) = frame.split_at(12);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| HubError::crypto("open"))?;
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| HubError::crypto("open"))
}

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

fn aes_cbc_open(key: &[u8], frame: &[u8]) -> Result<Vec<u8>, HubError> {
    if frame.len() < 32 || (frame.len() - 16) % 16 != 0 {
        return Err(HubError::crypto("open"));
    }
    let (iv, ciphertext) = frame.split_at(16);
    let mut buf = ciphertext.to_vec();

    let plaintext = match key.len() {
        16 => Aes128CbcDec::new(key.into(), iv.into())
            .decrypt_padded_mut::<cbc::cipher::block_padding::Pkcs7>(&mut buf)
            .map_err(|_| HubError::crypto("open"))?
            .to_vec(),
        32 => Aes256CbcDec::new(key.into(), iv.into())
            .decrypt_padded_mut::<cbc::cipher::block_padding::Pkcs7>(&mut buf)
            .map_err(|_| HubError::crypto("open"))?
            .to_vec(),
        _ => return Err(HubError::crypto("open")),
    };
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPublicKey};
    use rsa::traits::PublicKeyParts;

    fn test_key() -> RsaPrivateKey {
        let mut rng = rand::thread_rng();
        RsaPrivateKey::new(&mut rng, 2048).unwrap()
    }

    #[test]
    fn aes_gcm_round_trips() {
        let (key, frame) = aes_seal(b"hello saml").unwrap();
        let pt = aes_open(&key, &frame).unwrap();
        assert_eq!(pt, b"hello saml");
    }

    #[test]
    fn aes_gcm_rejects_tampered_frame() {
        let (key, mut frame) = aes_seal(b"hello saml").unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(aes_open(&key, &frame).is_err());
    }

    #[tokio::test]
    async fn pkcs1v15_sign_then_verify() {
        let key = test_key();
        let public = key.to_public_key();
        let digest = hash(Alg::Sha256, b"payload");
        let sig = sign_pkcs1v15(&key, Alg::Sha256, &digest).unwrap();
        assert!(verify_pkcs1v15(&[public], Alg::Sha256, &digest, &sig));
    }

    #[test]
    fn oaep_round_trips() {
        let key = test_key();
        let public = key.to_public_key();
        let wrapped = encrypt_oaep(&public, Alg::Sha256, b"0123456789abcdef0123456789abcdef").unwrap();
        let unwrapped = decrypt_oaep(&key, Alg::Sha256, &wrapped).unwrap();
        assert_eq!(unwrapped, b"0123456789abcdef0123456789abcdef");
    }

    // keep `to_pkcs1_der`/PublicKeyParts imports exercised without dead_code warnings
    #[test]
    fn public_key_exposes_modulus() {
        let key = test_key();
        let public = key.to_public_key();
        assert!(!public.n().to_bytes_be().is_empty());
        assert!(public.to_pkcs1_der().is_ok());
    }
}
