//! Property-based tests for beacon lifecycle invariants.
//!
//! Properties tested:
//! 1. At most one relay request is in flight, and request IDs are sequential
//! 2. Every request is closed at most once, by an entry or a timeout
//! 3. The previous entry is always the last accepted entry
//! 4. Slashing events account for every unit of stake taken
//! 5. Failed operations emit nothing
//! 6. A DKG round accepts a single result

#[cfg(test)]
mod tests {
    use {
        proptest::prelude::*,
        solana_pubkey::Pubkey,
        std::collections::HashSet,
        trv1_random_beacon::{
            test_utils::{test_parameters, BeaconFixture, TestGroupKey},
            types::{GroupId, GENESIS_SEED},
            BeaconError, BeaconEvent, DkgState, EventKind, RelayState,
        },
    };

    // ── Helpers ──

    const STAKE: u128 = 1_000_000;

    #[derive(Debug, Clone)]
    enum Action {
        Advance(u64),
        Request,
        SubmitEntry,
        ReportTimeout,
    }

    fn action_strategy() -> impl Strategy<Value = Action> {
        prop_oneof![
            (1..40u64).prop_map(Action::Advance),
            Just(Action::Request),
            Just(Action::SubmitEntry),
            Just(Action::ReportTimeout),
        ]
    }

    fn apply(
        fixture: &mut BeaconFixture,
        key: &TestGroupKey,
        group_id: GroupId,
        action: &Action,
    ) -> Result<(), BeaconError> {
        let members = fixture.group_members(group_id);
        let submitter = fixture.operator_key(members[0]);
        match action {
            Action::Advance(blocks) => {
                fixture.advance(*blocks);
                Ok(())
            }
            Action::Request => {
                let requester = fixture.requester;
                fixture
                    .beacon
                    .request_relay_entry(requester, None)
                    .map(|_| ())
            }
            Action::SubmitEntry => {
                let entry = match fixture.beacon.current_request() {
                    Some(_) => fixture.relay_entry(key),
                    None => vec![0; 48],
                };
                fixture
                    .beacon
                    .submit_relay_entry(submitter, entry, &members)
            }
            Action::ReportTimeout => fixture
                .beacon
                .report_relay_entry_timeout(Pubkey::new_from_array([0xAB; 32]), &members),
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 1-5. Relay lifecycle
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn relay_lifecycle_invariants(actions in prop::collection::vec(action_strategy(), 1..40)) {
            let mut fixture = BeaconFixture::new(test_parameters(), &[STAKE; 5]);
            let key = TestGroupKey::new(1);
            let group_id = fixture.genesis_group(&key);

            for action in &actions {
                let logs_before = fixture.beacon.ledger().logs().len();
                let result = apply(&mut fixture, &key, group_id, action);
                if result.is_err() {
                    prop_assert_eq!(
                        fixture.beacon.ledger().logs().len(),
                        logs_before,
                        "{:?} failed with {:?} but emitted events", action, result
                    );
                }

                let in_flight = fixture.beacon.current_request().is_some();
                prop_assert_eq!(
                    in_flight,
                    fixture.beacon.relay_entry_state() != RelayState::Idle
                );
            }

            let events = fixture.events();
            let requested: Vec<u64> = events
                .iter()
                .filter_map(|event| match event {
                    BeaconEvent::RelayEntryRequested { request_id, .. } => Some(*request_id),
                    _ => None,
                })
                .collect();
            let expected: Vec<u64> = (1..=requested.len() as u64).collect();
            prop_assert_eq!(&requested, &expected);

            let mut closed = HashSet::new();
            let mut last_entry = GENESIS_SEED.to_vec();
            let mut slashed = 0u128;
            for event in &events {
                match event {
                    BeaconEvent::RelayEntrySubmitted { request_id, entry, .. } => {
                        prop_assert!(closed.insert(*request_id), "request {} closed twice", request_id);
                        last_entry = entry.clone();
                    }
                    BeaconEvent::RelayEntryTimedOut { request_id, .. } => {
                        prop_assert!(closed.insert(*request_id), "request {} closed twice", request_id);
                    }
                    BeaconEvent::RelayEntryDelaySlashed { slashing_amount, group_members, .. }
                    | BeaconEvent::RelayEntryTimeoutSlashed { slashing_amount, group_members, .. } => {
                        slashed += slashing_amount * group_members.len() as u128;
                    }
                    _ => {}
                }
            }
            let open = requested.len() - closed.len();
            prop_assert!(open <= 1);
            prop_assert_eq!(open == 1, fixture.beacon.current_request().is_some());
            prop_assert_eq!(fixture.beacon.previous_entry(), last_entry.as_slice());
            prop_assert_eq!(fixture.beacon.staking().total_slashed(), slashed);
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 6. DKG single winner
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn dkg_accepts_a_single_result(
            submitters in prop::collection::vec(1..=3u8, 1..8),
            gaps in prop::collection::vec(0..8u64, 8),
        ) {
            let mut fixture = BeaconFixture::new(test_parameters(), &[STAKE; 6]);
            let governance = fixture.governance;
            fixture.beacon.genesis(governance).unwrap();
            let key = TestGroupKey::new(1);

            let mut accepted = 0;
            for (submitter_index, gap) in submitters.iter().zip(&gaps) {
                fixture.advance(*gap);
                let result = fixture.dkg_result(&key, *submitter_index, vec![], &[1, 2, 3]);
                let submitter = fixture.submitter_of(&result);
                if fixture.beacon.submit_dkg_result(submitter, result).is_ok() {
                    accepted += 1;
                }
            }

            let submitted = fixture
                .beacon
                .ledger()
                .events_of(EventKind::DkgResultSubmitted)
                .len();
            prop_assert!(accepted <= 1);
            prop_assert_eq!(submitted, accepted);
            if accepted == 1 {
                prop_assert!(matches!(
                    fixture.beacon.group_creation_state(),
                    DkgState::ChallengeWindow | DkgState::ResultSubmitted
                ));
            }
        }
    }
}
