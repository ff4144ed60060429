//! HMAC-SHA256 signatures binding a token to its instance/finding pair.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// The signed message: `instanceId|findingId|token`.
pub fn approval_message(instance_id: &str, finding_id: &str, token: &str) -> String {
    format!("{instance_id}|{finding_id}|{token}")
}

/// Signs and verifies approval links with a shared secret.
///
/// Built from freshly fetched key material for each issuance or
/// verification; the key is zeroized on drop.
pub struct ApprovalSigner {
    key: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for ApprovalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalSigner")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl ApprovalSigner {
    pub fn new(secret: &[u8]) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::EmptyKey);
        }
        Ok(Self {
            key: Zeroizing::new(secret.to_vec()),
        })
    }

    fn digest(&self, instance_id: &str, finding_id: &str, token: &str) -> Result<Vec<u8>, CryptoError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        mac.update(approval_message(instance_id, finding_id, token).as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Hex-encoded signature for the given link fields.
    pub fn sign(&self, instance_id: &str, finding_id: &str, token: &str) -> Result<String, CryptoError> {
        Ok(hex::encode(self.digest(instance_id, finding_id, token)?))
    }

    /// Recompute the signature and compare it with `signature` in constant time.
    ///
    /// A signature that is not valid hex simply fails verification.
    pub fn verify(
        &self,
        instance_id: &str,
        finding_id: &str,
        token: &str,
        signature: &str,
    ) -> Result<bool, CryptoError> {
        let Ok(supplied) = hex::decode(signature) else {
            return Ok(false);
        };
        let expected = self.digest(instance_id, finding_id, token)?;
        Ok(expected.ct_eq(&supplied).into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn signer() -> ApprovalSigner {
        ApprovalSigner::new(b"test-approval-secret").unwrap()
    }

    #[test]
    fn message_layout() {
        assert_eq!(approval_message("i-1", "f-1", "abc"), "i-1|f-1|abc");
    }

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2: key "Jefe", data "what do ya want for nothing?"
        let signer = ApprovalSigner::new(b"Jefe").unwrap();
        let mut mac = HmacSha256::new_from_slice(b"Jefe").unwrap();
        mac.update(b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(mac.finalize().into_bytes()),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
        // And the signer produces the HMAC of the pipe-joined message.
        let sig = signer.sign("a", "b", "c").unwrap();
        let mut mac = HmacSha256::new_from_slice(b"Jefe").unwrap();
        mac.update(b"a|b|c");
        assert_eq!(sig, hex::encode(mac.finalize().into_bytes()));
    }

    #[test]
    fn sign_and_verify() {
        let s = signer();
        let sig = s.sign("i-1", "f-1", "tok").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(s.verify("i-1", "f-1", "tok", &sig).unwrap());
    }

    #[test]
    fn any_altered_field_fails() {
        let s = signer();
        let sig = s.sign("i-1", "f-1", "tok").unwrap();
        assert!(!s.verify("i-2", "f-1", "tok", &sig).unwrap());
        assert!(!s.verify("i-1", "f-2", "tok", &sig).unwrap());
        assert!(!s.verify("i-1", "f-1", "tok2", &sig).unwrap());
    }

    #[test]
    fn field_boundaries_are_not_ambiguous_for_distinct_ids() {
        let s = signer();
        let sig = s.sign("i-1", "f-1", "tok").unwrap();
        assert!(!s.verify("i-1|f-1", "", "tok", &sig).unwrap());
    }

    #[test]
    fn wrong_secret_fails() {
        let sig = signer().sign("i-1", "f-1", "tok").unwrap();
        let other = ApprovalSigner::new(b"rotated-secret").unwrap();
        assert!(!other.verify("i-1", "f-1", "tok", &sig).unwrap());
    }

    #[test]
    fn garbage_signature_fails() {
        let s = signer();
        assert!(!s.verify("i-1", "f-1", "tok", "not-hex").unwrap());
        assert!(!s.verify("i-1", "f-1", "tok", "").unwrap());
        assert!(!s.verify("i-1", "f-1", "tok", "abcd").unwrap());
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(ApprovalSigner::new(b""), Err(CryptoError::EmptyKey)));
    }

    #[test]
    fn debug_redacts_key() {
        let dbg = format!("{:?}", signer());
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("test-approval-secret"));
    }
}
