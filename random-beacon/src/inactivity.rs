//! Inactivity claims.
//!
//! A group may declare some of its members inactive with a claim signed by
//! at least `group_threshold` of its other members. Each group carries a
//! nonce that a claim must quote and that increments on every accepted
//! claim, so a claim cannot be replayed.

use {
    crate::{
        crypto::{verify_member_signature, MEMBER_SIGNATURE_LEN},
        error::{BeaconError, Result, ValidationError},
        types::{are_valid_member_indices, member_signatures, GroupId, InactivityClaim},
    },
    log::*,
    solana_pubkey::Pubkey,
    std::collections::HashMap,
};

#[derive(Debug, Clone, Default)]
pub struct InactivityClaims {
    nonces: HashMap<GroupId, u64>,
}

impl InactivityClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nonce the next claim for `group_id` must carry.
    pub fn nonce(&self, group_id: GroupId) -> u64 {
        self.nonces.get(&group_id).copied().unwrap_or(0)
    }

    /// Validate `claim` against the group's public key and ordered member
    /// keys, then consume the nonce. Returns the 0-based positions of the
    /// inactive members.
    pub fn accept(
        &mut self,
        claim: &InactivityClaim,
        group_pub_key: &[u8],
        members: &[Pubkey],
        group_threshold: u16,
    ) -> Result<Vec<usize>> {
        let expected = self.nonce(claim.group_id);
        if claim.nonce != expected {
            return Err(BeaconError::InvalidNonce {
                expected,
                actual: claim.nonce,
            });
        }
        validate_claim(claim, group_pub_key, members, group_threshold)
            .map_err(BeaconError::InvalidInactivityClaim)?;

        self.nonces
            .insert(claim.group_id, expected.saturating_add(1));
        info!(
            "group {} declared members {:?} inactive",
            claim.group_id, claim.inactive_members_indices
        );
        Ok(claim
            .inactive_members_indices
            .iter()
            .map(|&index| usize::from(index).saturating_sub(1))
            .collect())
    }
}

fn validate_claim(
    claim: &InactivityClaim,
    group_pub_key: &[u8],
    members: &[Pubkey],
    group_threshold: u16,
) -> std::result::Result<(), ValidationError> {
    if claim.inactive_members_indices.is_empty()
        || !are_valid_member_indices(&claim.inactive_members_indices, members.len())
    {
        return Err(ValidationError::InvalidInactiveIndices);
    }
    if !are_valid_member_indices(&claim.signing_members_indices, members.len()) {
        return Err(ValidationError::InvalidSigningIndices);
    }
    let count = claim.signing_members_indices.len();
    if count < usize::from(group_threshold) {
        return Err(ValidationError::TooFewSignatures {
            count,
            threshold: group_threshold,
        });
    }
    let expected = count.saturating_mul(MEMBER_SIGNATURE_LEN);
    if claim.signatures.len() != expected {
        return Err(ValidationError::SignatureLengthMismatch {
            actual: claim.signatures.len(),
            expected,
        });
    }

    let digest = claim.signing_digest(group_pub_key);
    for (&index, signature) in claim
        .signing_members_indices
        .iter()
        .zip(member_signatures(&claim.signatures))
    {
        if claim.inactive_members_indices.contains(&index) {
            return Err(ValidationError::InactiveSigner(index));
        }
        let signer = members
            .get(usize::from(index).saturating_sub(1))
            .ok_or(ValidationError::InvalidSigningIndices)?;
        if !verify_member_signature(signer, digest.as_ref(), signature) {
            debug!("inactivity claim signature of member {index} does not verify");
            return Err(ValidationError::InvalidMemberSignature(index));
        }
    }
    Ok(())
}
