//! # TRv1 Random Beacon
//!
//! A threshold random beacon coordinated on the TRv1 ledger.
//!
//! Staked operators join a weighted **sortition pool**. Groups of operators
//! are selected from the pool with a public seed and run an off-ledger
//! **distributed key generation** (DKG); one member submits the result,
//! which can be challenged before it is approved and the group registered.
//! Registered groups answer **relay requests** with a BLS threshold
//! signature over the previous entry, forming a chain of unpredictable and
//! verifiable random values. Late answers, missed answers, leaked group keys
//! and malicious DKG results are **slashed** through the staking registry.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     RandomBeacon facade                       │
//! │   transactions: copy storage → transition → commit → effects  │
//! │  ┌──────────────┐  ┌────────────────┐  ┌──────────────────┐  │
//! │  │ Sortition    │  │ DkgCoordinator │  │ RelayEntry       │  │
//! │  │ Pool+Rewards │◀─│  + validator   │  │ Coordinator      │  │
//! │  └──────────────┘  └────────────────┘  └──────────────────┘  │
//! │  ┌──────────────┐  ┌────────────────┐  ┌──────────────────┐  │
//! │  │ Authori-     │  │ Groups         │  │ Inactivity       │  │
//! │  │ zations      │  │                │  │ Claims           │  │
//! │  └──────────────┘  └────────────────┘  └──────────────────┘  │
//! │  ┌─────────────────────────┐  ┌──────────────────────────┐   │
//! │  │ SlashingEngine          │  │ GovernanceParameters     │   │
//! │  └─────────────────────────┘  └──────────────────────────┘   │
//! └───────────────┬───────────────────────────────┬──────────────┘
//!                 ▼                               ▼
//!         Ledger (storage, blocks,        StakingRegistry (stake,
//!         events, callbacks)              seize, slash)
//! ```
//!
//! All timeouts are block-height deltas, evaluated when an operation is
//! called. Events are written to the ledger log as [`events::LedgerLog`]s
//! and can be consumed through typed [`events::EventBus`] subscriptions.

pub mod authorization;
pub mod beacon;
pub mod config;
pub mod crypto;
pub mod dkg;
pub mod dkg_validator;
pub mod error;
pub mod events;
pub mod groups;
pub mod inactivity;
pub mod ledger;
pub mod relay;
pub mod rewards;
pub mod slashing;
pub mod sortition;
pub mod staking;
#[cfg(any(test, feature = "dev-context-only-utils"))]
pub mod test_utils;
pub mod types;


// Re-exports for convenience.
pub use beacon::RandomBeacon;
pub use config::{ConfigError, GovernanceParameters};
pub use dkg::DkgState;
pub use error::{BeaconError, Result, ValidationError};
pub use events::{BeaconEvent, EventKind};
pub use ledger::{BeaconStorage, Ledger};
pub use relay::RelayState;
pub use staking::{StakingError, StakingRegistry};
pub use types::{DkgResult, Group, GroupId, InactivityClaim, OperatorId, RequestId};
