use anyhow::{anyhow, Context};
use rand_core::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{OracleError, OracleResult};

/// key: decryption-oracle
/// Private-key operation behind the pipeline. Callers length-check first; the
/// oracle re-checks and otherwise reports every failure as one opaque kind.
pub trait Decryptor: Send + Sync {
    /// Byte length every ciphertext must have.
    fn modulus_len(&self) -> usize;

    fn decrypt(&self, ciphertext: &[u8]) -> OracleResult<Vec<u8>>;
}

/// RSA-OAEP with SHA-256 for both the label digest and MGF1.
pub struct RsaOaepOracle {
    key: RsaPrivateKey,
}

impl RsaOaepOracle {
    pub fn new(key: RsaPrivateKey) -> Self {
        Self { key }
    }

    /// Accepts PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1 (`BEGIN RSA PRIVATE KEY`) PEM.
    pub fn from_pem(pem: &str) -> anyhow::Result<Self> {
        let pem = pem.trim();
        let key = match RsaPrivateKey::from_pkcs8_pem(pem) {
            Ok(key) => key,
            Err(pkcs8_err) => RsaPrivateKey::from_pkcs1_pem(pem).map_err(|pkcs1_err| {
                anyhow!("private key is neither PKCS#8 ({pkcs8_err}) nor PKCS#1 ({pkcs1_err}) PEM")
            })?,
        };
        key.validate().context("private key failed consistency checks")?;
        Ok(Self::new(key))
    }

    pub fn key_bits(&self) -> usize {
        self.key.n().bits()
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.key.to_public_key()
    }
}

impl Decryptor for RsaOaepOracle {
    fn modulus_len(&self) -> usize {
        self.key.size()
    }

    fn decrypt(&self, ciphertext: &[u8]) -> OracleResult<Vec<u8>> {
        let expected = self.modulus_len();
        if ciphertext.len() != expected {
            return Err(OracleError::InvalidCiphertextLength {
                expected,
                actual: ciphertext.len(),
            });
        }
        // Blinding keeps the private-key operation's timing independent of the input.
        self.key
            .decrypt_blinded(&mut OsRng, Oaep::new::<Sha256>(), ciphertext)
            .map_err(|err| OracleError::DecryptionFailure(err.to_string()))
    }
}
