//! Deterministic Ed25519 fixtures for the external identity provider path.
//!
//! A [`TestKeypair`] signs provider tokens and renders itself as a JWKS
//! document that a mock JWKS endpoint can serve.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
}

/// Ed25519 keypair with a key id.
///
/// The same seed always produces the same keypair.
pub struct TestKeypair {
    kid: String,
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl TestKeypair {
    /// Derive a keypair from `seed`.
    ///
    /// # Example
    /// ```rust,ignore
    /// let keypair = TestKeypair::from_seed(1, "idp-key-1")?;
    /// let token = keypair.sign_token(&claims)?;
    /// ```
    pub fn from_seed(seed: u8, kid: &str) -> Result<Self, FixtureError> {
        let mut seed_bytes = [0u8; 32];
        seed_bytes[0] = seed;
        for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
            *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
        }

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .map_err(|e| FixtureError::Crypto(format!("Failed to derive test keypair: {e:?}")))?;

        Ok(Self {
            kid: kid.to_string(),
            pkcs8: build_pkcs8_from_seed(&seed_bytes),
            public_key: key_pair.public_key().as_ref().to_vec(),
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Public key as the JWK `x` parameter (base64url, no padding).
    pub fn public_key_x(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.public_key)
    }

    /// This key as a single JWK.
    pub fn jwk(&self) -> Value {
        json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "kid": self.kid,
            "x": self.public_key_x(),
            "alg": "EdDSA",
            "use": "sig",
        })
    }

    /// A JWKS document containing only this key.
    pub fn jwks(&self) -> Value {
        jwks_document(&[self])
    }

    /// Sign `claims` with EdDSA, setting `kid` in the header.
    pub fn sign_token<T: Serialize>(&self, claims: &T) -> Result<String, FixtureError> {
        self.sign_token_with_kid(claims, &self.kid)
    }

    /// Sign `claims` but advertise a different `kid` in the header.
    pub fn sign_token_with_kid<T: Serialize>(
        &self,
        claims: &T,
        kid: &str,
    ) -> Result<String, FixtureError> {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(kid.to_string());

        encode(&header, claims, &EncodingKey::from_ed_der(&self.pkcs8))
            .map_err(|e| FixtureError::Crypto(format!("Failed to sign test token: {e}")))
    }
}

/// JWKS document containing `keys`.
pub fn jwks_document(keys: &[&TestKeypair]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() })
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// This is a test-only utility. Production code must use ring::rand::SystemRandom.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    let mut pkcs8 = Vec::with_capacity(48);

    // Outer SEQUENCE, 46 bytes
    pkcs8.extend_from_slice(&[0x30, 0x2e]);
    // Version: INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);
    // AlgorithmIdentifier: SEQUENCE { OID 1.3.101.112 }
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    // privateKey: OCTET STRING { OCTET STRING seed }
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);

    pkcs8
}
