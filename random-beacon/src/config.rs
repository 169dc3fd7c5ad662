//! Governance parameters for the random beacon.
//!
//! Parameters are grouped the way governance updates them: group creation,
//! relay entries, slashing, rewards and authorization. Every group carries
//! its protocol defaults and a `validate` check, and the full set can be
//! loaded from JSON.
//!
//! All durations are expressed in blocks. Token amounts use 18 decimals.

use {
    borsh::{BorshDeserialize, BorshSerialize},
    serde::{Deserialize, Serialize},
    std::path::Path,
};

/// One whole token in base units.
pub const TOKEN: u128 = 1_000_000_000_000_000_000;

/// Largest group the protocol can address with one-byte member indices.
pub const MAX_GROUP_SIZE: u16 = u8::MAX as u16;

// ---------------------------------------------------------------------------
// Group creation
// ---------------------------------------------------------------------------

/// Parameters controlling group selection, DKG and group lifetime.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
#[serde(default)]
pub struct GroupCreationParameters {
    /// Number of members selected into a new group.
    /// Default: 64.
    pub group_size: u16,

    /// Minimum number of members needed to produce a group signature.
    /// Used for relay entries and inactivity claims.
    /// Default: 33.
    pub group_threshold: u16,

    /// Minimum number of member signatures supporting a DKG result.
    /// Default: 58.
    pub dkg_result_signature_threshold: u16,

    /// A new group is created on every n-th relay request.
    /// Default: 5.
    pub group_creation_frequency: u64,

    /// Number of blocks a group may be selected for new relay requests.
    /// Default: 403_200 (~8 weeks).
    pub group_lifetime: u64,

    /// Length of the DKG result challenge window.
    /// Default: 11_520 (~48 hours).
    pub dkg_result_challenge_period_length: u64,

    /// Blocks after `DkgStarted` before the DKG can be reported as timed out.
    /// Default: 536.
    pub dkg_result_submission_timeout: u64,

    /// Blocks after the challenge window during which only the submitter
    /// may approve the result.
    /// Default: 20.
    pub dkg_submitter_precedence_period_length: u64,
}

impl Default for GroupCreationParameters {
    fn default() -> Self {
        Self {
            group_size: 64,
            group_threshold: 33,
            dkg_result_signature_threshold: 58,
            group_creation_frequency: 5,
            group_lifetime: 403_200,
            dkg_result_challenge_period_length: 11_520,
            dkg_result_submission_timeout: 536,
            dkg_submitter_precedence_period_length: 20,
        }
    }
}

impl GroupCreationParameters {
    /// Validate group creation parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.group_size == 0 || self.group_size > MAX_GROUP_SIZE {
            return Err(ConfigError::InvalidGroupSize(self.group_size));
        }
        if self.group_threshold == 0 || self.group_threshold > self.group_size {
            return Err(ConfigError::InvalidGroupThreshold {
                threshold: self.group_threshold,
                group_size: self.group_size,
            });
        }
        if self.dkg_result_signature_threshold < self.group_threshold
            || self.dkg_result_signature_threshold > self.group_size
        {
            return Err(ConfigError::InvalidSignatureThreshold {
                threshold: self.dkg_result_signature_threshold,
                group_threshold: self.group_threshold,
                group_size: self.group_size,
            });
        }
        if self.group_creation_frequency == 0 {
            return Err(ConfigError::ZeroGroupCreationFrequency);
        }
        if self.group_lifetime == 0 {
            return Err(ConfigError::ZeroGroupLifetime);
        }
        if self.dkg_result_challenge_period_length == 0 {
            return Err(ConfigError::ZeroChallengePeriod);
        }
        if self.dkg_result_submission_timeout == 0 {
            return Err(ConfigError::ZeroSubmissionTimeout);
        }
        if self.dkg_submitter_precedence_period_length >= self.dkg_result_submission_timeout {
            return Err(ConfigError::PrecedencePeriodTooLong {
                precedence: self.dkg_submitter_precedence_period_length,
                submission_timeout: self.dkg_result_submission_timeout,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Relay entries
// ---------------------------------------------------------------------------

/// Relay entry timeouts.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
#[serde(default)]
pub struct RelayEntryParameters {
    /// Blocks after the request during which the entry can be submitted
    /// without penalty.
    /// Default: 35.
    pub relay_entry_soft_timeout: u64,

    /// Blocks after the soft timeout during which a late entry is still
    /// accepted with a growing delay penalty.
    /// Default: 100.
    pub relay_entry_hard_timeout: u64,
}

impl Default for RelayEntryParameters {
    fn default() -> Self {
        Self {
            relay_entry_soft_timeout: 35,
            relay_entry_hard_timeout: 100,
        }
    }
}

impl RelayEntryParameters {
    /// Total number of blocks after the request before it can be reported
    /// as timed out.
    pub fn total_timeout(&self) -> u64 {
        self.relay_entry_soft_timeout
            .saturating_add(self.relay_entry_hard_timeout)
    }

    /// Validate relay entry parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay_entry_soft_timeout == 0 {
            return Err(ConfigError::ZeroSoftTimeout);
        }
        if self.relay_entry_hard_timeout == 0 {
            return Err(ConfigError::ZeroHardTimeout);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Slashing
// ---------------------------------------------------------------------------

/// Flat slashing amounts per violation, charged per slashed member.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
#[serde(default)]
pub struct SlashingParameters {
    /// Charged to every member of a group that failed to produce a relay
    /// entry, and the cap of the delay penalty.
    /// Default: 1_000 tokens.
    pub relay_entry_submission_failure_slashing_amount: u128,

    /// Charged to the submitter of a successfully challenged DKG result.
    /// Default: 50_000 tokens.
    pub malicious_dkg_result_slashing_amount: u128,

    /// Charged to every member of a group whose key signed an
    /// unauthorized message.
    /// Default: 100_000 tokens.
    pub unauthorized_signing_slashing_amount: u128,
}

impl Default for SlashingParameters {
    fn default() -> Self {
        Self {
            relay_entry_submission_failure_slashing_amount: 1_000 * TOKEN,
            malicious_dkg_result_slashing_amount: 50_000 * TOKEN,
            unauthorized_signing_slashing_amount: 100_000 * TOKEN,
        }
    }
}

// ---------------------------------------------------------------------------
// Rewards
// ---------------------------------------------------------------------------

/// Sortition pool reward bans and notifier reward multipliers.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
#[serde(default)]
pub struct RewardParameters {
    /// Blocks an operator stays ineligible for pool rewards after being
    /// flagged misbehaved or inactive.
    /// Default: 80_640 (~2 weeks).
    pub sortition_pool_rewards_ban_duration: u64,

    /// Percentage of the seized amount paid to the reporter of a relay
    /// entry timeout.
    /// Default: 40.
    pub relay_entry_timeout_notification_reward_multiplier: u8,

    /// Percentage paid to the reporter of unauthorized signing.
    /// Default: 50.
    pub unauthorized_signing_notification_reward_multiplier: u8,

    /// Percentage paid to the challenger of a malicious DKG result.
    /// Default: 100.
    pub dkg_malicious_result_notification_reward_multiplier: u8,
}

impl Default for RewardParameters {
    fn default() -> Self {
        Self {
            sortition_pool_rewards_ban_duration: 80_640,
            relay_entry_timeout_notification_reward_multiplier: 40,
            unauthorized_signing_notification_reward_multiplier: 50,
            dkg_malicious_result_notification_reward_multiplier: 100,
        }
    }
}

impl RewardParameters {
    /// Validate reward parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for multiplier in [
            self.relay_entry_timeout_notification_reward_multiplier,
            self.unauthorized_signing_notification_reward_multiplier,
            self.dkg_malicious_result_notification_reward_multiplier,
        ] {
            if multiplier > 100 {
                return Err(ConfigError::RewardMultiplierTooHigh(multiplier));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

/// Staking authorization rules for the beacon application.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
#[serde(default)]
pub struct AuthorizationParameters {
    /// Minimum authorized stake an operator needs to join the pool.
    /// Default: 40_000 tokens.
    pub minimum_authorization: u128,

    /// Blocks between an authorization decrease request and its approval.
    /// Default: 403_200.
    pub authorization_decrease_delay: u64,

    /// Blocks before `decreasing_at` during which a pending decrease may be
    /// overwritten by a new request.
    /// Default: 403_200.
    pub authorization_decrease_change_period: u64,
}

impl Default for AuthorizationParameters {
    fn default() -> Self {
        Self {
            minimum_authorization: 40_000 * TOKEN,
            authorization_decrease_delay: 403_200,
            authorization_decrease_change_period: 403_200,
        }
    }
}

impl AuthorizationParameters {
    /// Validate authorization parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.authorization_decrease_change_period > self.authorization_decrease_delay {
            return Err(ConfigError::ChangePeriodExceedsDelay {
                change_period: self.authorization_decrease_change_period,
                delay: self.authorization_decrease_delay,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Full parameter set
// ---------------------------------------------------------------------------

/// Every tunable of the beacon, owned by governance.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
#[serde(default)]
pub struct GovernanceParameters {
    pub group_creation: GroupCreationParameters,
    pub relay_entry: RelayEntryParameters,
    pub slashing: SlashingParameters,
    pub reward: RewardParameters,
    pub authorization: AuthorizationParameters,
    /// Authorized stake per unit of sortition weight.
    /// Default: one token.
    pub pool_weight_divisor: PoolWeightDivisor,
}

/// Authorized stake per unit of sortition weight.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
#[serde(transparent)]
pub struct PoolWeightDivisor(pub u128);

impl Default for PoolWeightDivisor {
    fn default() -> Self {
        Self(TOKEN)
    }
}

impl GovernanceParameters {
    /// Blocks the DKG may wait for its seed before it can be reported as
    /// timed out: the full relay entry timeout of the seeding request.
    pub fn dkg_seed_timeout(&self) -> u64 {
        self.relay_entry.total_timeout()
    }

    /// Validate the full parameter set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.group_creation.validate()?;
        self.relay_entry.validate()?;
        self.reward.validate()?;
        self.authorization.validate()?;
        if self.pool_weight_divisor.0 == 0 {
            return Err(ConfigError::ZeroPoolWeightDivisor);
        }
        Ok(())
    }

    /// Parse and validate parameters from a JSON document. Missing fields
    /// take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let params: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Load and validate parameters from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json_str(&json)
    }
}

/// Errors in beacon parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("group_size must be in [1, 255], got {0}")]
    InvalidGroupSize(u16),
    #[error("group_threshold must be in [1, {group_size}], got {threshold}")]
    InvalidGroupThreshold { threshold: u16, group_size: u16 },
    #[error(
        "dkg_result_signature_threshold must be in [{group_threshold}, {group_size}], got \
         {threshold}"
    )]
    InvalidSignatureThreshold {
        threshold: u16,
        group_threshold: u16,
        group_size: u16,
    },
    #[error("group_creation_frequency must be > 0")]
    ZeroGroupCreationFrequency,
    #[error("group_lifetime must be > 0")]
    ZeroGroupLifetime,
    #[error("dkg_result_challenge_period_length must be > 0")]
    ZeroChallengePeriod,
    #[error("dkg_result_submission_timeout must be > 0")]
    ZeroSubmissionTimeout,
    #[error(
        "dkg_submitter_precedence_period_length {precedence} must be < submission timeout \
         {submission_timeout}"
    )]
    PrecedencePeriodTooLong {
        precedence: u64,
        submission_timeout: u64,
    },
    #[error("relay_entry_soft_timeout must be > 0")]
    ZeroSoftTimeout,
    #[error("relay_entry_hard_timeout must be > 0")]
    ZeroHardTimeout,
    #[error("notification reward multiplier must be <= 100, got {0}")]
    RewardMultiplierTooHigh(u8),
    #[error("authorization_decrease_change_period {change_period} must be <= delay {delay}")]
    ChangePeriodExceedsDelay { change_period: u64, delay: u64 },
    #[error("pool_weight_divisor must be > 0")]
    ZeroPoolWeightDivisor,
    #[error("failed to read parameters: {0}")]
    Io(String),
    #[error("failed to parse parameters: {0}")]
    Parse(String),
}
