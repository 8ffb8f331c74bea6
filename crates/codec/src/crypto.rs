use rsa::{
    Oaep, RsaPrivateKey, RsaPublicKey,
    pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding},
};
use sha2::Sha256;

/// RSA modulus size for peer key pairs.
pub const KEY_BITS: usize = 2048;

#[derive(Debug)]
pub enum CryptoError {
    KeygenFailed,
    InvalidPublicKey,
    EncryptFailed,
    DecryptFailed,
}

impl std::error::Error for CryptoError {}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Per-peer RSA key material.
///
/// Generated once at startup; the PEM-encoded public half is published
/// through the directory record so that other peers can address encrypted
/// payloads to this peer. The private half never leaves the process.
pub struct KeyChain {
    private_key: RsaPrivateKey,
    public_pem: String,
}

impl KeyChain {
    pub fn generate() -> Result<Self, CryptoError> {
        let mut rng = rand::thread_rng();
        let private_key =
            RsaPrivateKey::new(&mut rng, KEY_BITS).map_err(|_| CryptoError::KeygenFailed)?;

        let public_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|_| CryptoError::KeygenFailed)?;

        Ok(Self {
            private_key,
            public_pem,
        })
    }

    /// The PEM-encoded public key, as published in the directory record.
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    /// OAEP decryption with this peer's private key.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.private_key
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map_err(|_| CryptoError::DecryptFailed)
    }
}

/// OAEP encryption for the holder of `recipient_pem`.
///
/// The plaintext must fit one RSA block (modulus size minus the OAEP
/// overhead); larger inputs fail with `EncryptFailed`.
pub fn encrypt(plaintext: &[u8], recipient_pem: &str) -> Result<Vec<u8>, CryptoError> {
    let key = RsaPublicKey::from_public_key_pem(recipient_pem)
        .map_err(|_| CryptoError::InvalidPublicKey)?;

    key.encrypt(&mut rand::thread_rng(), Oaep::new::<Sha256>(), plaintext)
        .map_err(|_| CryptoError::EncryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_through_published_pem() {
        let keys = KeyChain::generate().unwrap();
        assert!(keys.public_key_pem().starts_with("-----BEGIN PUBLIC KEY-----"));

        let ciphertext = encrypt(b"telemetry burst", keys.public_key_pem()).unwrap();
        assert_ne!(ciphertext.as_slice(), b"telemetry burst");

        let plaintext = keys.decrypt(&ciphertext).unwrap();
        assert_eq!(plaintext.as_slice(), b"telemetry burst");
    }

    #[test]
    fn rejects_garbage_keys_and_ciphertext() {
        assert!(matches!(
            encrypt(b"x", "not a pem"),
            Err(CryptoError::InvalidPublicKey)
        ));

        let keys = KeyChain::generate().unwrap();
        assert!(matches!(
            keys.decrypt(&[0u8; 16]),
            Err(CryptoError::DecryptFailed)
        ));
    }
}
