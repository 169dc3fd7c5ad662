//! Hashing and signature primitives used by the beacon.
//!
//! * Commitments and digests are SHA-256.
//! * Group keys and relay entries are BLS12-381 in the min-sig setting:
//!   96-byte compressed G2 public keys, 48-byte compressed G1 signatures.
//! * Individual members sign DKG results and inactivity claims with the
//!   ed25519 key behind their operator identity.

use {
    blst::{
        min_sig::{PublicKey as BlsPublicKey, Signature as BlsSignature},
        BLST_ERROR,
    },
    ed25519_dalek::{PublicKey as MemberPublicKey, Signature as MemberSignature},
    sha2::{Digest, Sha256},
    solana_hash::Hash,
    solana_pubkey::Pubkey,
};

/// Domain separation tag for group signatures (hash-to-G1, SSWU, RO).
pub const GROUP_SIGNATURE_DST: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_NUL_";

/// Length of a compressed group public key.
pub const GROUP_PUBKEY_LEN: usize = 96;

/// Length of a compressed group signature, and therefore of a relay entry.
pub const GROUP_SIGNATURE_LEN: usize = 48;

/// Length of an individual member signature.
pub const MEMBER_SIGNATURE_LEN: usize = 64;

/// SHA-256 over the concatenation of `parts`.
pub fn hashv(parts: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    Hash::new_from_array(hasher.finalize().into())
}

/// The message a group signs to produce the relay entry for a request.
pub fn relay_entry_message(previous_entry: &[u8], request_id: u64) -> Vec<u8> {
    let mut message = Vec::with_capacity(previous_entry.len().saturating_add(8));
    message.extend_from_slice(previous_entry);
    message.extend_from_slice(&request_id.to_be_bytes());
    message
}

/// Returns true if `bytes` is a compressed, in-subgroup, non-identity G2 point.
pub fn is_valid_group_public_key(bytes: &[u8]) -> bool {
    bytes.len() == GROUP_PUBKEY_LEN && BlsPublicKey::key_validate(bytes).is_ok()
}

/// Verify a group signature over `message` under `group_pub_key`.
pub fn verify_group_signature(group_pub_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    if group_pub_key.len() != GROUP_PUBKEY_LEN || signature.len() != GROUP_SIGNATURE_LEN {
        return false;
    }
    let Ok(public_key) = BlsPublicKey::from_bytes(group_pub_key) else {
        return false;
    };
    let Ok(signature) = BlsSignature::from_bytes(signature) else {
        return false;
    };
    signature.verify(true, message, GROUP_SIGNATURE_DST, &[], &public_key, true)
        == BLST_ERROR::BLST_SUCCESS
}

/// Verify a member's ed25519 signature over `message`. The operator identity
/// doubles as the member's ed25519 public key.
pub fn verify_member_signature(operator: &Pubkey, message: &[u8], signature: &[u8]) -> bool {
    let Ok(public_key) = MemberPublicKey::from_bytes(operator.as_ref()) else {
        return false;
    };
    let Ok(signature) = MemberSignature::try_from(signature) else {
        return false;
    };
    public_key.verify_strict(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use {super::*, crate::test_utils::{TestGroupKey, TestOperator}};

    #[test]
    fn test_hashv_matches_single_update() {
        let joined = hashv(&[b"abc", b"def"]);
        let single = hashv(&[b"abcdef"]);
        assert_eq!(joined, single);
        assert_ne!(joined, hashv(&[b"abcdeg"]));
    }

    #[test]
    fn test_relay_entry_message_layout() {
        let message = relay_entry_message(&[1, 2, 3], 7);
        assert_eq!(message, vec![1, 2, 3, 0, 0, 0, 0, 0, 0, 0, 7]);
    }

    #[test]
    fn test_group_signature_verifies() {
        let key = TestGroupKey::new(1);
        let message = relay_entry_message(b"previous", 1);
        let signature = key.sign(&message);
        assert_eq!(signature.len(), GROUP_SIGNATURE_LEN);
        assert!(verify_group_signature(&key.public_key(), &message, &signature));
    }

    #[test]
    fn test_group_signature_rejects_other_key_and_message() {
        let key = TestGroupKey::new(1);
        let other = TestGroupKey::new(2);
        let message = relay_entry_message(b"previous", 1);
        let signature = key.sign(&message);
        assert!(!verify_group_signature(&other.public_key(), &message, &signature));
        assert!(!verify_group_signature(
            &key.public_key(),
            &relay_entry_message(b"previous", 2),
            &signature
        ));
        assert!(!verify_group_signature(&key.public_key(), &message, &[0u8; 48]));
        assert!(!verify_group_signature(&key.public_key(), &message, &[]));
    }

    #[test]
    fn test_group_public_key_validation() {
        let key = TestGroupKey::new(3);
        assert!(is_valid_group_public_key(&key.public_key()));
        assert!(!is_valid_group_public_key(&[0u8; GROUP_PUBKEY_LEN]));
        assert!(!is_valid_group_public_key(&key.public_key()[..95]));
    }

    #[test]
    fn test_member_signature() {
        let operator = TestOperator::new(4);
        let signature = operator.sign(b"result digest");
        assert!(verify_member_signature(
            &operator.pubkey(),
            b"result digest",
            &signature
        ));
        assert!(!verify_member_signature(
            &operator.pubkey(),
            b"other digest",
            &signature
        ));
        assert!(!verify_member_signature(
            &TestOperator::new(5).pubkey(),
            b"result digest",
            &signature
        ));
        assert!(!verify_member_signature(
            &operator.pubkey(),
            b"result digest",
            &signature[..63]
        ));
    }
}
