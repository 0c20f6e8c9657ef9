//! Cryptographic primitives: RSA-2048 keys, SHA-256 document hashes,
//! SHA256withRSA signatures and AES-256-GCM wrapping of private keys.
//!
//! The signing message is the UTF-8 text of the base64 encoded SHA-256 digest,
//! not the raw digest. Existing ledger rows depend on this, do not change it.

use crate::config::MasterKey;
use crate::{Error, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use rsa::{
    pkcs1v15::{Signature, SigningKey, VerifyingKey},
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
    signature::{SignatureEncoding, Signer, Verifier},
    RsaPrivateKey, RsaPublicKey,
};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

pub const RSA_KEY_BITS: usize = 2048;
/// Size of the AES-256-GCM nonce in bytes.
pub const IV_LEN: usize = 12;
/// Size of the AES-256-GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Generate a fresh RSA-2048 key pair from the OS random source.
pub fn generate_keypair() -> Result<(RsaPublicKey, RsaPrivateKey)> {
    let private_key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
        .map_err(|err| Error::crypto(format!("RSA key generation failed: {}", err)))?;
    let public_key = RsaPublicKey::from(&private_key);
    Ok((public_key, private_key))
}

/// SHA-256 of `bytes`, base64 encoded.
pub fn hash(bytes: &[u8]) -> String {
    base64::encode(Sha256::digest(bytes))
}

/// SHA256withRSA (PKCS#1 v1.5) over the UTF-8 bytes of `message`.
pub fn sign(message: &str, private_key: &RsaPrivateKey) -> Result<Vec<u8>> {
    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let signature = signing_key
        .try_sign(message.as_bytes())
        .map_err(|_| Error::crypto("RSA signing failed"))?;
    Ok(signature.to_vec())
}

/// Check a SHA256withRSA signature.
/// A signature that does not match is `Ok(false)`, only undecodable input is an error.
pub fn verify(message: &str, signature: &[u8], public_key: &RsaPublicKey) -> Result<bool> {
    if signature.is_empty() {
        return Err(Error::validation("Signature is empty"));
    }
    let signature = match Signature::try_from(signature) {
        Ok(signature) => signature,
        Err(_) => return Err(Error::validation("Signature bytes are malformed")),
    };
    let verifying_key = VerifyingKey::<Sha256>::new(public_key.clone());
    Ok(verifying_key.verify(message.as_bytes(), &signature).is_ok())
}

/// Same as [`verify`] but takes the base64 stored form of the signature.
pub fn verify_base64(
    message: &str,
    signature_b64: &str,
    public_key: &RsaPublicKey,
) -> Result<bool> {
    let signature = base64::decode(signature_b64)?;
    verify(message, &signature, public_key)
}

/// Base64 of the DER encoded SubjectPublicKeyInfo.
pub fn encode_public_key(public_key: &RsaPublicKey) -> Result<String> {
    let der = public_key
        .to_public_key_der()
        .map_err(|err| Error::crypto(format!("Can not encode public key: {}", err)))?;
    Ok(base64::encode(der.as_bytes()))
}

pub fn decode_public_key(encoded: &str) -> Result<RsaPublicKey> {
    let der = base64::decode(encoded)
        .map_err(|_| Error::crypto("Stored public key is not valid base64"))?;
    RsaPublicKey::from_public_key_der(&der)
        .map_err(|err| Error::crypto(format!("Stored public key is malformed: {}", err)))
}

/// Encrypt the PKCS#8 form of `private_key` with AES-256-GCM.
/// Output: `IV (12 bytes) || ciphertext || tag (16 bytes)`.
pub fn wrap_private(private_key: &RsaPrivateKey, master_key: &MasterKey) -> Result<Vec<u8>> {
    let der = private_key
        .to_pkcs8_der()
        .map_err(|_| Error::crypto("Can not encode private key"))?;
    let cipher = Aes256Gcm::new_from_slice(master_key.as_bytes())
        .map_err(|_| Error::crypto("Invalid master key"))?;

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), der.as_bytes())
        .map_err(|_| Error::crypto("Private key encryption failed"))?;

    let mut wrapped = Vec::with_capacity(IV_LEN + ciphertext.len());
    wrapped.extend_from_slice(&iv);
    wrapped.extend_from_slice(&ciphertext);
    Ok(wrapped)
}

/// Authenticated decrypt of a blob produced by [`wrap_private`].
/// Fails on a wrong master key or any modified byte.
pub fn unwrap_private(wrapped: &[u8], master_key: &MasterKey) -> Result<RsaPrivateKey> {
    if wrapped.len() < IV_LEN + TAG_LEN + 1 {
        return Err(Error::crypto("Wrapped private key is truncated"));
    }
    let cipher = Aes256Gcm::new_from_slice(master_key.as_bytes())
        .map_err(|_| Error::crypto("Invalid master key"))?;
    let (iv, ciphertext) = wrapped.split_at(IV_LEN);
    let der = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| Error::crypto("Private key authentication failed"))?,
    );
    RsaPrivateKey::from_pkcs8_der(&der)
        .map_err(|_| Error::crypto("Unwrapped private key is malformed"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::OnceLock;

    /// Key generation is slow, share one pair between tests.
    pub(crate) fn shared_keypair() -> &'static (RsaPublicKey, RsaPrivateKey) {
        static KEYPAIR: OnceLock<(RsaPublicKey, RsaPrivateKey)> = OnceLock::new();
        KEYPAIR.get_or_init(|| generate_keypair().unwrap())
    }

    #[test]
    fn test_hash_is_base64_sha256() {
        // SHA-256 of the empty string.
        assert_eq!(hash(b""), "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=");
        assert_eq!(base64::decode(hash(b"abc")).unwrap().len(), 32);
    }

    #[test]
    fn test_sign_then_verify() {
        let (public_key, private_key) = shared_keypair();
        let message = hash(b"%PDF-1.5 contract");
        let signature = sign(&message, private_key).unwrap();
        assert_eq!(signature.len(), RSA_KEY_BITS / 8);
        assert!(verify(&message, &signature, public_key).unwrap());
        assert!(verify_base64(&message, &base64::encode(&signature), public_key).unwrap());
    }

    #[test]
    fn test_verify_rejects_other_message() {
        let (public_key, private_key) = shared_keypair();
        let signature = sign(&hash(b"original"), private_key).unwrap();
        assert!(!verify(&hash(b"tampered"), &signature, public_key).unwrap());
    }

    #[test]
    fn test_verify_errors_only_on_malformed_input() {
        let (public_key, _) = shared_keypair();
        assert!(verify("msg", &[], public_key).is_err());
        assert!(verify_base64("msg", "***", public_key).is_err());
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let (_, private_key) = shared_keypair();
        let master = MasterKey::new([0x01; 32]);
        let wrapped = wrap_private(private_key, &master).unwrap();
        assert!(wrapped.len() > IV_LEN + TAG_LEN);
        let unwrapped = unwrap_private(&wrapped, &master).unwrap();
        assert_eq!(&unwrapped, private_key);
    }

    #[test]
    fn test_wrap_uses_fresh_iv() {
        let (_, private_key) = shared_keypair();
        let master = MasterKey::new([0x01; 32]);
        let first = wrap_private(private_key, &master).unwrap();
        let second = wrap_private(private_key, &master).unwrap();
        assert_ne!(first[..IV_LEN], second[..IV_LEN]);
    }

    #[test]
    fn test_unwrap_with_wrong_master_key_fails() {
        let (_, private_key) = shared_keypair();
        let wrapped = wrap_private(private_key, &MasterKey::new([0x01; 32])).unwrap();
        let result = unwrap_private(&wrapped, &MasterKey::new([0x02; 32]));
        assert!(matches!(result, Err(Error::Crypto(_))));
    }

    #[test]
    fn test_unwrap_detects_tampering() {
        let (_, private_key) = shared_keypair();
        let master = MasterKey::new([0x01; 32]);
        let mut wrapped = wrap_private(private_key, &master).unwrap();
        wrapped[IV_LEN + 5] ^= 0xFF;
        assert!(unwrap_private(&wrapped, &master).is_err());
        assert!(unwrap_private(&wrapped[..20], &master).is_err());
    }

    #[test]
    fn test_public_key_encoding_roundtrip() {
        let (public_key, _) = shared_keypair();
        let encoded = encode_public_key(public_key).unwrap();
        assert_eq!(&decode_public_key(&encoded).unwrap(), public_key);
        assert!(decode_public_key("bm90IGEga2V5").is_err());
    }
}
