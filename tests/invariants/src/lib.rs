//! TRv1 Random Beacon Property-Based Invariant Tests
//!
//! Uses proptest to verify critical beacon invariants across:
//! - Sortition selection and reward accounting
//! - Slashing amounts and notifier rewards
//! - Relay request and group creation lifecycles

pub mod lifecycle_invariants;
pub mod slashing_invariants;
pub mod sortition_invariants;
