//! DKG result validation.
//!
//! Validation runs in two depths. Submission only performs the structural
//! checks that are cheap to evaluate: the members are the ones sortition
//! selected for the seed, indices are well formed and enough members signed.
//! The full check, run when a result is challenged, additionally verifies
//! the group public key, that no registered group already uses it, and every
//! member signature.

use {
    crate::{
        config::GroupCreationParameters,
        crypto::{is_valid_group_public_key, verify_member_signature, MEMBER_SIGNATURE_LEN},
        error::ValidationError,
        groups::Groups,
        sortition::SortitionPool,
        types::{are_valid_member_indices, member_signatures, members_hash, DkgResult},
    },
    log::*,
    solana_hash::Hash,
};

/// Structural checks performed when a result is submitted.
pub fn validate_fields(
    result: &DkgResult,
    seed: &Hash,
    pool: &SortitionPool,
    params: &GroupCreationParameters,
) -> Result<(), ValidationError> {
    let selected = pool
        .select_group(params.group_size, seed)
        .map_err(|_| ValidationError::MembersMismatch)?;
    if result.members != selected {
        return Err(ValidationError::MembersMismatch);
    }
    let group_size = result.members.len();

    if result.member(result.submitter_member_index).is_none() {
        return Err(ValidationError::SubmitterIndexOutOfRange(
            result.submitter_member_index,
        ));
    }

    if !are_valid_member_indices(&result.misbehaved_members_indices, group_size) {
        return Err(ValidationError::InvalidMisbehavedIndices);
    }
    let active = group_size.saturating_sub(result.misbehaved_members_indices.len());
    if active < usize::from(params.group_threshold) {
        return Err(ValidationError::TooFewActiveMembers {
            active,
            threshold: params.group_threshold,
        });
    }
    if members_hash(&result.active_members()) != result.members_hash {
        return Err(ValidationError::MembersHashMismatch);
    }

    if !are_valid_member_indices(&result.signing_members_indices, group_size) {
        return Err(ValidationError::InvalidSigningIndices);
    }
    let count = result.signing_members_indices.len();
    if count < usize::from(params.dkg_result_signature_threshold) {
        return Err(ValidationError::TooFewSignatures {
            count,
            threshold: params.dkg_result_signature_threshold,
        });
    }
    let expected = count.saturating_mul(MEMBER_SIGNATURE_LEN);
    if result.signatures.len() != expected {
        return Err(ValidationError::SignatureLengthMismatch {
            actual: result.signatures.len(),
            expected,
        });
    }
    Ok(())
}

/// Full validation of a result for the DKG that started at `start_block`.
pub fn validate(
    result: &DkgResult,
    seed: &Hash,
    start_block: u64,
    pool: &SortitionPool,
    groups: &Groups,
    params: &GroupCreationParameters,
) -> Result<(), ValidationError> {
    validate_fields(result, seed, pool, params)?;

    if !is_valid_group_public_key(&result.group_pub_key) {
        return Err(ValidationError::InvalidGroupPublicKey);
    }
    if let Some(group) = groups.get_by_pub_key(&result.group_pub_key) {
        return Err(ValidationError::DuplicateGroupPublicKey(group.group_id));
    }

    let digest = result.signing_digest(start_block);
    for (&index, signature) in result
        .signing_members_indices
        .iter()
        .zip(member_signatures(&result.signatures))
    {
        if result.misbehaved_members_indices.contains(&index) {
            return Err(ValidationError::MisbehavedSigner(index));
        }
        let signer = result
            .member(index)
            .and_then(|id| pool.operator(id))
            .map(|entry| entry.operator)
            .ok_or(ValidationError::InvalidSigningIndices)?;
        if !verify_member_signature(&signer, digest.as_ref(), signature) {
            debug!("DKG result signature of member {index} does not verify");
            return Err(ValidationError::InvalidMemberSignature(index));
        }
    }
    Ok(())
}
