//! Core types for the random beacon.
//!
//! Defines identifiers, groups, DKG results, relay entry requests and
//! inactivity claims, together with the commitments and signing digests
//! computed over them.

use {
    crate::crypto::{hashv, MEMBER_SIGNATURE_LEN},
    borsh::{BorshDeserialize, BorshSerialize},
    solana_hash::Hash,
    solana_pubkey::Pubkey,
};

/// Dense identifier assigned to an operator on first pool insertion.
/// Starts at 1 and is never reused.
pub type OperatorId = u32;

/// Monotonic group identifier, starting at 0.
pub type GroupId = u64;

/// Monotonic relay request identifier, starting at 1.
pub type RequestId = u64;

/// 1-based position of a member in its group.
pub type MemberIndex = u8;

/// The `previous_entry` of the very first relay request: the first 77
/// digits of pi as a big-endian 256-bit integer.
pub const GENESIS_SEED: [u8; 32] = [
    0x45, 0x74, 0xc8, 0xc7, 0x5d, 0x6e, 0x88, 0xac, 0xd2, 0x8f, 0x7e, 0x46, 0x7d, 0xac, 0x97,
    0xb5, 0xc6, 0x0c, 0x38, 0x38, 0xd9, 0xda, 0xd9, 0x93, 0x90, 0x0b, 0xdf, 0x40, 0x21, 0x52,
    0x22, 0x8e,
];

const DKG_RESULT_DOMAIN: &[u8] = b"trv1-beacon:dkg-result";
const INACTIVITY_CLAIM_DOMAIN: &[u8] = b"trv1-beacon:inactivity-claim";

/// Commitment to an ordered list of member IDs.
pub fn members_hash(members: &[OperatorId]) -> Hash {
    let bytes: Vec<u8> = members.iter().flat_map(|id| id.to_be_bytes()).collect();
    hashv(&[&bytes])
}

/// Returns true if `indices` are strictly ascending and within `1..=len`.
pub fn are_valid_member_indices(indices: &[MemberIndex], len: usize) -> bool {
    indices.first().map_or(true, |&first| first >= 1)
        && indices.windows(2).all(|pair| pair[0] < pair[1])
        && indices.last().map_or(true, |&last| usize::from(last) <= len)
}

/// Splits a concatenated signature blob into member signatures.
pub fn member_signatures(blob: &[u8]) -> impl Iterator<Item = &[u8]> {
    blob.chunks(MEMBER_SIGNATURE_LEN)
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// A threshold group that produced a shared BLS key through DKG.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Group {
    pub group_id: GroupId,
    /// Compressed G2 group public key.
    pub group_pub_key: Vec<u8>,
    /// Commitment to the ordered active member IDs.
    pub members_hash: Hash,
    pub registration_block: u64,
    pub terminated: bool,
}

impl Group {
    /// A group expires `lifetime` blocks after registration.
    pub fn is_expired(&self, now: u64, lifetime: u64) -> bool {
        now > self.registration_block.saturating_add(lifetime)
    }

    /// Returns true if the group may serve new relay requests.
    pub fn is_active(&self, now: u64, lifetime: u64) -> bool {
        !self.terminated && !self.is_expired(now, lifetime)
    }
}

// ---------------------------------------------------------------------------
// DKG results
// ---------------------------------------------------------------------------

/// The outcome of an off-ledger DKG round, as submitted by one member.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct DkgResult {
    /// 1-based index of the submitting member in `members`.
    pub submitter_member_index: MemberIndex,
    /// Compressed G2 group public key produced by the DKG.
    pub group_pub_key: Vec<u8>,
    /// Strictly ascending indices of members excluded from the group.
    pub misbehaved_members_indices: Vec<MemberIndex>,
    /// Concatenated 64-byte member signatures over `signing_digest`.
    pub signatures: Vec<u8>,
    /// Strictly ascending indices of the members behind `signatures`.
    pub signing_members_indices: Vec<MemberIndex>,
    /// Operator IDs in the order they were selected by sortition.
    pub members: Vec<OperatorId>,
    /// Commitment to `members` minus the misbehaved ones.
    pub members_hash: Hash,
}

impl DkgResult {
    /// Hash identifying this result on the ledger.
    pub fn hash(&self) -> Hash {
        hashv(&[&borsh::to_vec(self).unwrap_or_default()])
    }

    /// Members that were not flagged misbehaved, in selection order.
    pub fn active_members(&self) -> Vec<OperatorId> {
        self.members
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                !self
                    .misbehaved_members_indices
                    .iter()
                    .any(|&index| usize::from(index) == i.saturating_add(1))
            })
            .map(|(_, &id)| id)
            .collect()
    }

    /// The member at a 1-based index.
    pub fn member(&self, index: MemberIndex) -> Option<OperatorId> {
        usize::from(index)
            .checked_sub(1)
            .and_then(|i| self.members.get(i))
            .copied()
    }

    /// The digest members sign to support this result for the DKG that
    /// started at `start_block`.
    pub fn signing_digest(&self, start_block: u64) -> Hash {
        hashv(&[
            DKG_RESULT_DOMAIN,
            &self.group_pub_key,
            &self.misbehaved_members_indices,
            &start_block.to_be_bytes(),
        ])
    }
}

// ---------------------------------------------------------------------------
// Relay entries
// ---------------------------------------------------------------------------

/// The single outstanding request for a new relay entry.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RelayEntryRequest {
    pub request_id: RequestId,
    pub group_id: GroupId,
    pub previous_entry: Vec<u8>,
    pub request_block: u64,
    /// Consumer notified with the new entry, if any.
    pub callback: Option<Pubkey>,
}

// ---------------------------------------------------------------------------
// Inactivity claims
// ---------------------------------------------------------------------------

/// A group's signed statement that some of its members were inactive.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct InactivityClaim {
    pub group_id: GroupId,
    /// Must equal the group's current inactivity nonce.
    pub nonce: u64,
    /// Strictly ascending indices of the inactive members.
    pub inactive_members_indices: Vec<MemberIndex>,
    /// Concatenated 64-byte member signatures over `signing_digest`.
    pub signatures: Vec<u8>,
    /// Strictly ascending indices of the members behind `signatures`.
    pub signing_members_indices: Vec<MemberIndex>,
}

impl InactivityClaim {
    /// The digest members sign to support this claim.
    pub fn signing_digest(&self, group_pub_key: &[u8]) -> Hash {
        hashv(&[
            INACTIVITY_CLAIM_DOMAIN,
            &self.group_id.to_be_bytes(),
            &self.nonce.to_be_bytes(),
            group_pub_key,
            &self.inactive_members_indices,
        ])
    }
}
