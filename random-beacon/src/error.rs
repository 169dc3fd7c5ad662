//! Error types for the random beacon.

use {
    crate::{
        config::ConfigError,
        dkg::DkgState,
        slashing::Violation,
        types::{GroupId, MemberIndex},
    },
    solana_pubkey::Pubkey,
};

/// Reasons a DKG result or an inactivity claim fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("submitter member index {0} is out of range")]
    SubmitterIndexOutOfRange(MemberIndex),
    #[error("members do not match the group selected for the DKG seed")]
    MembersMismatch,
    #[error("members hash does not commit to the active members")]
    MembersHashMismatch,
    #[error("misbehaved member indices are not strictly ascending or out of range")]
    InvalidMisbehavedIndices,
    #[error("inactive member indices are empty, unordered or out of range")]
    InvalidInactiveIndices,
    #[error("signing member indices are not strictly ascending or out of range")]
    InvalidSigningIndices,
    #[error("too few signatures: {count} < {threshold}")]
    TooFewSignatures { count: usize, threshold: u16 },
    #[error("too few active members: {active} < {threshold}")]
    TooFewActiveMembers { active: usize, threshold: u16 },
    #[error("signature blob is {actual} bytes, expected {expected}")]
    SignatureLengthMismatch { actual: usize, expected: usize },
    #[error("signing member {0} is flagged misbehaved")]
    MisbehavedSigner(MemberIndex),
    #[error("signing member {0} is flagged inactive")]
    InactiveSigner(MemberIndex),
    #[error("invalid signature from member {0}")]
    InvalidMemberSignature(MemberIndex),
    #[error("group public key is not a valid BLS12-381 G2 point")]
    InvalidGroupPublicKey,
    #[error("group public key is already registered to group {0}")]
    DuplicateGroupPublicKey(GroupId),
}

/// Errors returned by beacon operations. Every error leaves beacon state
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BeaconError {
    // -- sortition pool --------------------------------------------------
    #[error("operator {0:?} is already in the sortition pool")]
    AlreadyRegistered(Pubkey),
    #[error("authorized stake {stake} is too low for a non-zero pool weight")]
    InsufficientStake { stake: u128 },
    #[error("operator {0:?} is not known to the sortition pool")]
    UnknownOperator(Pubkey),
    #[error("not enough eligible operators: requested {requested}, available {available}")]
    PoolEmpty { requested: u16, available: usize },
    #[error("group size must be > 0")]
    InvalidGroupSize,
    #[error("sortition pool is locked while DKG is in progress")]
    PoolLocked,
    #[error("operator {0:?} cannot restore reward eligibility yet")]
    CannotRestoreRewardEligibility(Pubkey),

    // -- authorization -----------------------------------------------------
    #[error("staking provider {0:?} already has an operator")]
    OperatorAlreadySet(Pubkey),
    #[error("operator {0:?} is already in use by another staking provider")]
    OperatorInUse(Pubkey),
    #[error("operator {0:?} is not registered by any staking provider")]
    OperatorNotRegistered(Pubkey),
    #[error("staking provider {0:?} has no registered operator")]
    UnknownStakingProvider(Pubkey),
    #[error("authorization {amount} is below the minimum {minimum}")]
    AuthorizationBelowMinimum { amount: u128, minimum: u128 },
    #[error("authorization decrease from {from} to {to} is invalid")]
    InvalidAuthorizationDecrease { from: u128, to: u128 },
    #[error("pending authorization decrease cannot be changed until block {0}")]
    AuthorizationDecreaseChangeLocked(u64),
    #[error("no pending authorization decrease for {0:?}")]
    NoPendingAuthorizationDecrease(Pubkey),
    #[error("authorization decrease cannot be approved before block {0}")]
    AuthorizationDecreaseNotDue(u64),
    #[error("operator {0:?} must update its pool status first")]
    OperatorNotUpToDate(Pubkey),

    // -- DKG -----------------------------------------------------------------
    #[error("operation is not allowed in DKG state {0:?}")]
    InvalidDkgState(DkgState),
    #[error("genesis was already performed")]
    GenesisAlreadyPerformed,
    #[error("invalid DKG result: {0}")]
    InvalidDkgResult(ValidationError),
    #[error("a DKG result was already submitted for this seed")]
    DkgResultAlreadySubmitted,
    #[error("caller {0:?} is not the declared submitter")]
    NotSubmitter(Pubkey),
    #[error("result does not match the submitted DKG result")]
    DkgResultHashMismatch,
    #[error("DKG result challenge period is over")]
    ChallengePeriodOver,
    #[error("DKG result challenge period is not over yet")]
    ChallengePeriodNotOver,
    #[error("only the submitter may approve during the precedence period")]
    SubmitterPrecedencePeriod,
    #[error("the challenged DKG result is valid")]
    UnjustifiedChallenge,
    #[error("DKG result submission timed out")]
    DkgTimedOut,
    #[error("DKG has not timed out")]
    DkgNotTimedOut,
    #[error("DKG seed has not timed out")]
    SeedNotTimedOut,

    // -- relay entries -------------------------------------------------------
    #[error("requester {0:?} is not authorized")]
    UnauthorizedRequester(Pubkey),
    #[error("another relay request is in progress")]
    RequestInProgress,
    #[error("there are no active groups")]
    NoActiveGroups,
    #[error("there is no pending relay request")]
    NoPendingRequest,
    #[error("invalid group signature")]
    InvalidSignature,
    #[error("relay request timed out")]
    RelayEntryTimedOut,
    #[error("relay request has not timed out")]
    RequestNotTimedOut,
    #[error("caller {0:?} is not a member of the group")]
    NotGroupMember(Pubkey),

    // -- groups --------------------------------------------------------------
    #[error("group {0} does not exist")]
    UnknownGroup(GroupId),
    #[error("group {0} is terminated")]
    GroupTerminated(GroupId),
    #[error("group {0} is expired")]
    GroupExpired(GroupId),
    #[error("group members do not match the group commitment")]
    InvalidGroupMembers,
    #[error("a group with this public key is already registered")]
    DuplicateGroupPublicKey,
    #[error("no further group IDs are available")]
    GroupRegistryFull,

    // -- inactivity ----------------------------------------------------------
    #[error("invalid inactivity claim nonce: expected {expected}, got {actual}")]
    InvalidNonce { expected: u64, actual: u64 },
    #[error("invalid inactivity claim: {0}")]
    InvalidInactivityClaim(ValidationError),

    // -- slashing ------------------------------------------------------------
    #[error("violation {0:?} was already slashed")]
    AlreadySlashed(Violation),

    // -- governance ----------------------------------------------------------
    #[error("caller {0:?} is not the governance")]
    NotGovernance(Pubkey),
    #[error("caller {0:?} is not the staking contract")]
    NotStakingContract(Pubkey),
    #[error("invalid parameters: {0}")]
    InvalidParameters(#[from] ConfigError),
    #[error("staking registry rejected the operation: {0}")]
    Staking(#[from] crate::staking::StakingError),
}

pub type Result<T> = std::result::Result<T, BeaconError>;
