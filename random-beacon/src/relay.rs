//! Relay entry coordinator.
//!
//! At most one relay request is in flight. A request picks an active group
//! from the previous entry; the group answers with a BLS signature over
//! `previous_entry ‖ request_id`, which becomes the next entry. Answers after
//! the soft timeout are accepted but penalised, and after the hard timeout
//! anybody may report the request as timed out.

use {
    crate::{
        config::RelayEntryParameters,
        crypto::{relay_entry_message, verify_group_signature},
        error::{BeaconError, Result},
        groups::Groups,
        types::{Group, GroupId, RelayEntryRequest, RequestId, GENESIS_SEED},
    },
    log::*,
    solana_pubkey::Pubkey,
};

/// Externally visible relay state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// No request in flight.
    Idle,
    /// A request waits for its entry.
    Requested,
    /// The last request was answered.
    Submitted,
    /// The request in flight passed its hard timeout, or the last request
    /// was reported as timed out.
    TimedOut,
}

/// An accepted relay entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedEntry {
    pub request: RelayEntryRequest,
    /// Blocks past the soft timeout; zero when on time.
    pub blocks_late: u64,
}

#[derive(Debug, Clone)]
pub struct RelayEntryCoordinator {
    request_count: RequestId,
    previous_entry: Vec<u8>,
    current_request: Option<RelayEntryRequest>,
    last_outcome: Option<RelayState>,
}

impl Default for RelayEntryCoordinator {
    fn default() -> Self {
        Self {
            request_count: 0,
            previous_entry: GENESIS_SEED.to_vec(),
            current_request: None,
            last_outcome: None,
        }
    }
}

impl RelayEntryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous_entry(&self) -> &[u8] {
        &self.previous_entry
    }

    pub fn current_request(&self) -> Option<&RelayEntryRequest> {
        self.current_request.as_ref()
    }

    /// Number of requests issued so far; also the ID of the latest one.
    pub fn request_count(&self) -> RequestId {
        self.request_count
    }

    pub fn is_request_in_progress(&self) -> bool {
        self.current_request.is_some()
    }

    fn soft_timeout_block(request: &RelayEntryRequest, params: &RelayEntryParameters) -> u64 {
        request
            .request_block
            .saturating_add(params.relay_entry_soft_timeout)
    }

    fn has_timed_out(request: &RelayEntryRequest, params: &RelayEntryParameters, now: u64) -> bool {
        now > request.request_block.saturating_add(params.total_timeout())
    }

    pub fn state_at(&self, now: u64, params: &RelayEntryParameters) -> RelayState {
        match &self.current_request {
            Some(request) if Self::has_timed_out(request, params, now) => RelayState::TimedOut,
            Some(_) => RelayState::Requested,
            None => RelayState::Idle,
        }
    }

    /// How the last closed request ended.
    pub fn last_outcome(&self) -> Option<RelayState> {
        self.last_outcome
    }

    /// Open a new request served by a group picked from the previous entry.
    pub fn request(
        &mut self,
        groups: &Groups,
        group_lifetime: u64,
        callback: Option<Pubkey>,
        now: u64,
    ) -> Result<RelayEntryRequest> {
        if self.is_request_in_progress() {
            return Err(BeaconError::RequestInProgress);
        }
        let group_id = groups.select_group(&self.previous_entry, now, group_lifetime)?;
        self.request_count = self.request_count.saturating_add(1);
        let request = RelayEntryRequest {
            request_id: self.request_count,
            group_id,
            previous_entry: self.previous_entry.clone(),
            request_block: now,
            callback,
        };
        self.current_request = Some(request.clone());
        info!(
            "relay request {} assigned to group {group_id} at block {now}",
            request.request_id
        );
        Ok(request)
    }

    /// Accept `entry` for the request in flight if it verifies under the
    /// group's key. Invalid entries leave the request untouched.
    pub fn submit(
        &mut self,
        entry: &[u8],
        group_pub_key: &[u8],
        params: &RelayEntryParameters,
        now: u64,
    ) -> Result<AcceptedEntry> {
        let request = self
            .current_request
            .as_ref()
            .ok_or(BeaconError::NoPendingRequest)?;
        if Self::has_timed_out(request, params, now) {
            return Err(BeaconError::RelayEntryTimedOut);
        }
        let message = relay_entry_message(&request.previous_entry, request.request_id);
        if !verify_group_signature(group_pub_key, &message, entry) {
            debug!("relay entry for request {} does not verify", request.request_id);
            return Err(BeaconError::InvalidSignature);
        }

        let blocks_late = now.saturating_sub(Self::soft_timeout_block(request, params));
        let request = self
            .current_request
            .take()
            .ok_or(BeaconError::NoPendingRequest)?;
        self.previous_entry = entry.to_vec();
        self.last_outcome = Some(RelayState::Submitted);
        info!(
            "relay entry for request {} accepted at block {now} ({blocks_late} blocks late)",
            request.request_id
        );
        Ok(AcceptedEntry {
            request,
            blocks_late,
        })
    }

    /// Close a request that outlived its hard timeout.
    pub fn report_timeout(
        &mut self,
        params: &RelayEntryParameters,
        now: u64,
    ) -> Result<RelayEntryRequest> {
        let request = self
            .current_request
            .as_ref()
            .ok_or(BeaconError::NoPendingRequest)?;
        if !Self::has_timed_out(request, params, now) {
            return Err(BeaconError::RequestNotTimedOut);
        }
        let request = self
            .current_request
            .take()
            .ok_or(BeaconError::NoPendingRequest)?;
        self.last_outcome = Some(RelayState::TimedOut);
        warn!(
            "relay request {} of group {} timed out",
            request.request_id, request.group_id
        );
        Ok(request)
    }

    /// Close the request in flight without an entry if `group_id` serves it.
    pub fn abandon(&mut self, group_id: GroupId) -> Option<RelayEntryRequest> {
        if self.current_request.as_ref()?.group_id != group_id {
            return None;
        }
        let request = self.current_request.take()?;
        self.last_outcome = Some(RelayState::TimedOut);
        warn!(
            "relay request {} abandoned, group {group_id} was terminated",
            request.request_id
        );
        Some(request)
    }
}

/// Check that `signed_msg_sender` is the group's signature over `reporter`,
/// which proves the group key leaked outside the threshold protocol.
pub fn verify_unauthorized_signing(
    group: &Group,
    reporter: &Pubkey,
    signed_msg_sender: &[u8],
) -> Result<()> {
    if group.terminated {
        return Err(BeaconError::GroupTerminated(group.group_id));
    }
    if !verify_group_signature(&group.group_pub_key, reporter.as_ref(), signed_msg_sender) {
        return Err(BeaconError::InvalidSignature);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*, crate::test_utils::TestGroupKey, assert_matches::assert_matches,
        solana_hash::Hash,
    };

    const LIFETIME: u64 = 1_000;

    fn params() -> RelayEntryParameters {
        RelayEntryParameters {
            relay_entry_soft_timeout: 10,
            relay_entry_hard_timeout: 20,
        }
    }

    fn single_group(key: &TestGroupKey) -> Groups {
        let mut groups = Groups::new();
        groups
            .add_group(key.public_key(), Hash::default(), 0)
            .unwrap();
        groups
    }

    fn entry_for(key: &TestGroupKey, request: &RelayEntryRequest) -> Vec<u8> {
        key.sign(&relay_entry_message(
            &request.previous_entry,
            request.request_id,
        ))
    }

    #[test]
    fn test_first_request_uses_genesis_seed() {
        let key = TestGroupKey::new(1);
        let groups = single_group(&key);
        let mut relay = RelayEntryCoordinator::new();
        assert_eq!(relay.state_at(0, &params()), RelayState::Idle);
        let request = relay.request(&groups, LIFETIME, None, 5).unwrap();
        assert_eq!(request.request_id, 1);
        assert_eq!(request.group_id, 0);
        assert_eq!(request.previous_entry, GENESIS_SEED.to_vec());
        assert_eq!(relay.state_at(5, &params()), RelayState::Requested);
    }

    #[test]
    fn test_one_request_in_flight() {
        let key = TestGroupKey::new(1);
        let groups = single_group(&key);
        let mut relay = RelayEntryCoordinator::new();
        relay.request(&groups, LIFETIME, None, 5).unwrap();
        assert_matches!(
            relay.request(&groups, LIFETIME, None, 6),
            Err(BeaconError::RequestInProgress)
        );
        assert_eq!(relay.request_count(), 1);
    }

    #[test]
    fn test_request_requires_active_group() {
        let mut relay = RelayEntryCoordinator::new();
        assert_matches!(
            relay.request(&Groups::new(), LIFETIME, None, 5),
            Err(BeaconError::NoActiveGroups)
        );
        assert!(!relay.is_request_in_progress());
    }

    #[test]
    fn test_invalid_then_valid_entry() {
        let key = TestGroupKey::new(1);
        let groups = single_group(&key);
        let mut relay = RelayEntryCoordinator::new();
        let request = relay.request(&groups, LIFETIME, None, 5).unwrap();

        let forged = TestGroupKey::new(2).sign(&relay_entry_message(&request.previous_entry, 1));
        assert_matches!(
            relay.submit(&forged, &key.public_key(), &params(), 6),
            Err(BeaconError::InvalidSignature)
        );
        assert_eq!(relay.state_at(6, &params()), RelayState::Requested);

        let entry = entry_for(&key, &request);
        let accepted = relay.submit(&entry, &key.public_key(), &params(), 7).unwrap();
        assert_eq!(accepted.blocks_late, 0);
        assert_eq!(relay.previous_entry(), entry.as_slice());
        assert_eq!(relay.state_at(7, &params()), RelayState::Idle);
        assert_eq!(relay.last_outcome(), Some(RelayState::Submitted));
        assert!(!relay.is_request_in_progress());
    }

    #[test]
    fn test_late_entry_reports_delay() {
        let key = TestGroupKey::new(1);
        let groups = single_group(&key);
        let mut relay = RelayEntryCoordinator::new();
        let request = relay.request(&groups, LIFETIME, None, 5).unwrap();
        let entry = entry_for(&key, &request);
        // Soft timeout at 15, hard timeout at 35.
        let accepted = relay.submit(&entry, &key.public_key(), &params(), 22).unwrap();
        assert_eq!(accepted.blocks_late, 7);
    }

    #[test]
    fn test_entry_after_hard_timeout() {
        let key = TestGroupKey::new(1);
        let groups = single_group(&key);
        let mut relay = RelayEntryCoordinator::new();
        let request = relay.request(&groups, LIFETIME, None, 5).unwrap();
        let entry = entry_for(&key, &request);
        assert_eq!(relay.state_at(36, &params()), RelayState::TimedOut);
        assert_matches!(
            relay.submit(&entry, &key.public_key(), &params(), 36),
            Err(BeaconError::RelayEntryTimedOut)
        );
        assert!(relay.submit(&entry, &key.public_key(), &params(), 35).is_ok());
    }

    #[test]
    fn test_report_timeout_once() {
        let key = TestGroupKey::new(1);
        let groups = single_group(&key);
        let mut relay = RelayEntryCoordinator::new();
        relay.request(&groups, LIFETIME, None, 5).unwrap();
        assert_matches!(
            relay.report_timeout(&params(), 35),
            Err(BeaconError::RequestNotTimedOut)
        );
        let request = relay.report_timeout(&params(), 36).unwrap();
        assert_eq!(request.request_id, 1);
        assert_matches!(
            relay.report_timeout(&params(), 37),
            Err(BeaconError::NoPendingRequest)
        );
        assert_eq!(relay.state_at(37, &params()), RelayState::Idle);
        assert_eq!(relay.last_outcome(), Some(RelayState::TimedOut));
        assert_eq!(relay.previous_entry(), GENESIS_SEED.as_slice());
    }

    #[test]
    fn test_abandon_only_closes_the_serving_group() {
        let key = TestGroupKey::new(1);
        let groups = single_group(&key);
        let mut relay = RelayEntryCoordinator::new();
        assert_eq!(relay.abandon(0), None);
        relay.request(&groups, LIFETIME, None, 5).unwrap();
        assert_eq!(relay.abandon(1), None);
        assert!(relay.is_request_in_progress());

        let request = relay.abandon(0).unwrap();
        assert_eq!(request.request_id, 1);
        assert_eq!(relay.state_at(6, &params()), RelayState::Idle);
        assert_eq!(relay.last_outcome(), Some(RelayState::TimedOut));
        assert_matches!(
            relay.report_timeout(&params(), 40),
            Err(BeaconError::NoPendingRequest)
        );
    }

    #[test]
    fn test_unauthorized_signing_proof() {
        let key = TestGroupKey::new(1);
        let mut groups = single_group(&key);
        let reporter = Pubkey::new_from_array([42; 32]);
        let proof = key.sign(reporter.as_ref());
        let group = groups.get(0).unwrap().clone();
        assert!(verify_unauthorized_signing(&group, &reporter, &proof).is_ok());
        assert_matches!(
            verify_unauthorized_signing(&group, &Pubkey::new_from_array([43; 32]), &proof),
            Err(BeaconError::InvalidSignature)
        );
        groups.terminate(0).unwrap();
        assert_matches!(
            verify_unauthorized_signing(groups.get(0).unwrap(), &reporter, &proof),
            Err(BeaconError::GroupTerminated(0))
        );
    }
}
