use coralpds_core::{PdsError, PdsResult, StoredKey};
use p256::elliptic_curve::scalar::IsHigh;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;

use k256::ecdsa::{
    Signature as K256Signature, SigningKey as K256SigningKey, VerifyingKey as K256VerifyingKey,
};
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{
    Signature as P256Signature, SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey,
};

/// Length of a raw `R ‖ S` signature.
pub const SIGNATURE_LEN: usize = 64;

/// A repository signing key over one of the two supported curves.
pub enum SigningKey {
    P256(P256SigningKey),
    K256(K256SigningKey),
}

/// The verification half of a [`SigningKey`].
pub enum PublicKey {
    P256(P256VerifyingKey),
    K256(K256VerifyingKey),
}

impl SigningKey {
    /// Generate a new random P-256 signing key.
    pub fn generate_p256() -> Self {
        SigningKey::P256(P256SigningKey::random(&mut OsRng))
    }

    /// Generate a new random secp256k1 (K-256) signing key.
    pub fn generate_k256() -> Self {
        SigningKey::K256(K256SigningKey::random(&mut OsRng))
    }

    /// Generate a key for a curve named by configuration.
    pub fn generate(curve: &str) -> PdsResult<Self> {
        match curve {
            "p256" | "P256" => Ok(Self::generate_p256()),
            "k256" | "K256" | "secp256k1" => Ok(Self::generate_k256()),
            other => Err(PdsError::Crypto(format!("unknown curve: {other}"))),
        }
    }

    /// The curve label used when persisting this key.
    pub fn curve(&self) -> &'static str {
        match self {
            SigningKey::P256(_) => "p256",
            SigningKey::K256(_) => "k256",
        }
    }

    /// Sign a 32-byte digest.
    ///
    /// The output is `R ‖ S`, each big-endian and zero-padded to 32 bytes,
    /// with `S` normalized to the low half of the curve order so every
    /// `(key, digest)` pair has exactly one valid encoding.
    pub fn sign(&self, digest: &[u8; 32]) -> PdsResult<[u8; SIGNATURE_LEN]> {
        let bytes: Vec<u8> = match self {
            SigningKey::P256(key) => {
                let sig: P256Signature = key
                    .sign_prehash(digest)
                    .map_err(|e| PdsError::Crypto(format!("P-256 signing failed: {e}")))?;
                let sig = sig.normalize_s().unwrap_or(sig);
                sig.to_bytes().to_vec()
            }
            SigningKey::K256(key) => {
                let sig: K256Signature = key
                    .sign_prehash(digest)
                    .map_err(|e| PdsError::Crypto(format!("K-256 signing failed: {e}")))?;
                let sig = sig.normalize_s().unwrap_or(sig);
                sig.to_bytes().to_vec()
            }
        };
        bytes
            .try_into()
            .map_err(|_| PdsError::Crypto("signature is not 64 bytes".to_string()))
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            SigningKey::P256(key) => PublicKey::P256(*key.verifying_key()),
            SigningKey::K256(key) => PublicKey::K256(*key.verifying_key()),
        }
    }

    /// Compressed SEC1 encoding of the public key.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        match self {
            SigningKey::P256(key) => key.verifying_key().to_encoded_point(true).as_bytes().to_vec(),
            SigningKey::K256(key) => key.verifying_key().to_encoded_point(true).as_bytes().to_vec(),
        }
    }

    /// Export the private scalar for the key store.
    pub fn to_stored(&self) -> StoredKey {
        let secret = match self {
            SigningKey::P256(key) => key.to_bytes().to_vec(),
            SigningKey::K256(key) => key.to_bytes().to_vec(),
        };
        StoredKey {
            curve: self.curve().to_string(),
            secret,
        }
    }

    /// Reload a key previously exported with [`SigningKey::to_stored`].
    pub fn from_stored(stored: &StoredKey) -> PdsResult<Self> {
        match stored.curve.as_str() {
            "p256" | "P256" => P256SigningKey::from_slice(&stored.secret)
                .map(SigningKey::P256)
                .map_err(|e| PdsError::Crypto(format!("bad P-256 key: {e}"))),
            "k256" | "K256" | "secp256k1" => K256SigningKey::from_slice(&stored.secret)
                .map(SigningKey::K256)
                .map_err(|e| PdsError::Crypto(format!("bad K-256 key: {e}"))),
            other => Err(PdsError::Crypto(format!("unknown key type: {other}"))),
        }
    }
}

impl PublicKey {
    pub fn from_sec1_bytes(curve: &str, bytes: &[u8]) -> PdsResult<Self> {
        match curve {
            "p256" | "P256" => P256VerifyingKey::from_sec1_bytes(bytes)
                .map(PublicKey::P256)
                .map_err(|e| PdsError::Crypto(format!("bad P-256 public key: {e}"))),
            "k256" | "K256" | "secp256k1" => K256VerifyingKey::from_sec1_bytes(bytes)
                .map(PublicKey::K256)
                .map_err(|e| PdsError::Crypto(format!("bad K-256 public key: {e}"))),
            other => Err(PdsError::Crypto(format!("unknown key type: {other}"))),
        }
    }

    /// Verify a raw `R ‖ S` signature over a 32-byte digest.
    ///
    /// Only the canonical low-S form is accepted; a high-S signature
    /// verifies as `false` even when the curve math would accept it.
    /// A signature of the wrong length is invalid input, not a mismatch.
    pub fn verify(&self, digest: &[u8; 32], sig: &[u8]) -> PdsResult<bool> {
        if sig.len() != SIGNATURE_LEN {
            return Err(PdsError::InvalidRequest(format!(
                "signature must be 64 bytes, got {}",
                sig.len()
            )));
        }
        match self {
            PublicKey::P256(key) => {
                let Ok(sig) = P256Signature::from_slice(sig) else {
                    return Ok(false);
                };
                if bool::from(sig.s().is_high()) {
                    return Ok(false);
                }
                Ok(key.verify_prehash(digest, &sig).is_ok())
            }
            PublicKey::K256(key) => {
                let Ok(sig) = K256Signature::from_slice(sig) else {
                    return Ok(false);
                };
                if bool::from(sig.s().is_high()) {
                    return Ok(false);
                }
                Ok(key.verify_prehash(digest, &sig).is_ok())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;

    fn check_roundtrip(key: SigningKey) {
        let digest = sha256(b"commit bytes");
        let sig = key.sign(&digest).unwrap();
        assert_eq!(sig.len(), 64);
        let public = key.public_key();
        assert!(public.verify(&digest, &sig).unwrap());

        let other = sha256(b"different bytes");
        assert!(!public.verify(&other, &sig).unwrap());
    }

    #[test]
    fn sign_verify_p256() {
        check_roundtrip(SigningKey::generate_p256());
    }

    #[test]
    fn sign_verify_k256() {
        check_roundtrip(SigningKey::generate_k256());
    }

    #[test]
    fn signatures_are_low_s() {
        // Run a batch so both halves of the order are exercised.
        let key = SigningKey::generate_p256();
        for i in 0..32u8 {
            let digest = sha256(&[i]);
            let sig = key.sign(&digest).unwrap();
            let parsed = P256Signature::from_slice(&sig).unwrap();
            assert!(!bool::from(parsed.s().is_high()), "high-S signature escaped");
        }
    }

    #[test]
    fn high_s_is_rejected_on_verify() {
        use k256::Scalar;
        use k256::elliptic_curve::ff::PrimeField;

        let key = SigningKey::generate_k256();
        let digest = sha256(b"payload");
        let sig = key.sign(&digest).unwrap();
        // Flip S to the equivalent high form; the curve math accepts it,
        // the canonical check must not.
        let s = Scalar::from_repr(k256::FieldBytes::clone_from_slice(&sig[32..])).unwrap();
        let mut high = [0u8; 64];
        high[..32].copy_from_slice(&sig[..32]);
        high[32..].copy_from_slice(&(-s).to_bytes());
        assert!(!key.public_key().verify(&digest, &high).unwrap());
    }

    #[test]
    fn wrong_length_signature_is_invalid_input() {
        let key = SigningKey::generate_p256();
        let digest = sha256(b"x");
        assert!(key.public_key().verify(&digest, &[0u8; 63]).is_err());
    }

    #[test]
    fn stored_key_roundtrips() {
        for key in [SigningKey::generate_p256(), SigningKey::generate_k256()] {
            let stored = key.to_stored();
            let restored = SigningKey::from_stored(&stored).unwrap();
            assert_eq!(key.public_key_bytes(), restored.public_key_bytes());
        }
    }

    #[test]
    fn public_key_bytes_are_compressed_sec1() {
        let key = SigningKey::generate_p256();
        let bytes = key.public_key_bytes();
        assert_eq!(bytes.len(), 33);
        assert!(bytes[0] == 0x02 || bytes[0] == 0x03);
        let restored = PublicKey::from_sec1_bytes("p256", &bytes).unwrap();
        let digest = sha256(b"roundtrip");
        let sig = key.sign(&digest).unwrap();
        assert!(restored.verify(&digest, &sig).unwrap());
    }
}
