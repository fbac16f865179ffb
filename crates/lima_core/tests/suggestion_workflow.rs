use lima_core::{
    open_db, open_db_in_memory, AddressDelta, AddressRecord, AddressService, AuditService,
    ChangeEventFilter, ChangeKind, CoreError, DecisionOutcome, ManualClock, NewAddress,
    OpOptions, Principal, SharedClock, StorageError, Suggestion, SuggestionFilter,
    SuggestionKind, SuggestionRequest, SuggestionService, SuggestionStatus, SystemClock,
    ValidationError,
};
use rusqlite::Connection;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const PROPOSER: Principal = Principal {
    id: 1,
    access_level: lima_core::AccessLevel::Basic,
};
const REVIEWER: Principal = Principal {
    id: 2,
    access_level: lima_core::AccessLevel::Intermediate,
};
const ADMIN: Principal = Principal {
    id: 3,
    access_level: lima_core::AccessLevel::Super,
};

fn manual_clock() -> (Arc<ManualClock>, SharedClock) {
    let manual = Arc::new(ManualClock::starting_at(1_700_000_000_000));
    let shared: SharedClock = manual.clone();
    (manual, shared)
}

fn seed_address(conn: &Connection, clock: &SharedClock, code: &str) -> AddressRecord {
    let mut address = NewAddress::new(code, "RN", "Natal", "Lagoa Nova", "Av. Salgado Filho");
    address.number = Some("1559".to_string());
    AddressService::new(conn, clock.clone())
        .create(&ADMIN, &address, OpOptions::default())
        .unwrap()
}

fn district(value: &str) -> AddressDelta {
    AddressDelta {
        district: Some(value.to_string()),
        ..AddressDelta::default()
    }
}

fn events_for(conn: &Connection, address_id: i64) -> Vec<lima_core::ChangeEvent> {
    AuditService::new(conn)
        .history_for_address(&ADMIN, address_id)
        .unwrap()
}

#[test]
fn basic_cannot_approve_and_intermediate_approval_applies_modify() {
    let conn = open_db_in_memory().unwrap();
    let (manual, clock) = manual_clock();
    let record = seed_address(&conn, &clock, "rnit08");
    let service = SuggestionService::new(&conn, clock.clone());

    let suggestion = service
        .submit(
            &PROPOSER,
            SuggestionRequest::modify(record.id, district("Centro")),
            OpOptions::default(),
        )
        .unwrap();
    assert_eq!(suggestion.status, SuggestionStatus::Pending);

    let err = service
        .decide(&PROPOSER, suggestion.id, DecisionOutcome::Approve, None, OpOptions::default())
        .unwrap_err();
    assert!(matches!(err, CoreError::Permission { .. }));

    manual.advance(1_000);
    let decided = service
        .decide(&REVIEWER, suggestion.id, DecisionOutcome::Approve, None, OpOptions::default())
        .unwrap();
    assert_eq!(decided.status, SuggestionStatus::Approved);
    assert_eq!(decided.decider_id, Some(REVIEWER.id));

    let updated = AddressService::new(&conn, clock.clone())
        .get(&PROPOSER, record.id)
        .unwrap();
    assert_eq!(updated.district, "Centro");
    assert_eq!(updated.version, record.version + 1);

    let events = events_for(&conn, record.id);
    let modifications: Vec<_> = events
        .iter()
        .filter(|event| event.kind == ChangeKind::Modify)
        .collect();
    assert_eq!(modifications.len(), 1);
    assert_eq!(modifications[0].actor_id, REVIEWER.id);
    assert_eq!(modifications[0].suggestion_id, Some(suggestion.id));
    assert!(modifications[0].occurred_at >= updated.updated_at);
}

#[test]
fn second_decision_is_invalid_state() {
    let conn = open_db_in_memory().unwrap();
    let (_, clock) = manual_clock();
    let record = seed_address(&conn, &clock, "rnit09");
    let service = SuggestionService::new(&conn, clock);

    let suggestion = service
        .submit(
            &PROPOSER,
            SuggestionRequest::modify(record.id, district("Tirol")),
            OpOptions::default(),
        )
        .unwrap();
    service
        .decide(&REVIEWER, suggestion.id, DecisionOutcome::Reject, Some("duplicate"), OpOptions::default())
        .unwrap();

    for outcome in [DecisionOutcome::Approve, DecisionOutcome::Reject] {
        let err = service
            .decide(&ADMIN, suggestion.id, outcome, None, OpOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidState {
                status: SuggestionStatus::Rejected,
                ..
            }
        ));
    }
}

#[test]
fn concurrent_decisions_have_exactly_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("race.db");
    let (_, clock) = manual_clock();

    let conn = open_db(&path).unwrap();
    let record = seed_address(&conn, &clock, "rnit10");
    let suggestion = SuggestionService::new(&conn, clock.clone())
        .submit(
            &PROPOSER,
            SuggestionRequest::modify(record.id, district("Ponta Negra")),
            OpOptions::default(),
        )
        .unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [DecisionOutcome::Approve, DecisionOutcome::Reject]
        .into_iter()
        .map(|outcome| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            let id = suggestion.id;
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let service = SuggestionService::new(&conn, SystemClock::shared());
                barrier.wait();
                service
                    .decide(&REVIEWER, id, outcome, None, OpOptions::default())
                    .map(|decided| decided.status)
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();
    let winners: Vec<_> = results.iter().filter_map(|result| result.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(results
        .iter()
        .any(|result| matches!(result, Err(CoreError::InvalidState { .. }))));

    let final_status = SuggestionService::new(&conn, clock)
        .get(&ADMIN, suggestion.id)
        .unwrap()
        .status;
    assert_eq!(&final_status, winners[0]);

    let modifications = events_for(&conn, record.id)
        .into_iter()
        .filter(|event| event.kind == ChangeKind::Modify)
        .count();
    let expected = usize::from(final_status == SuggestionStatus::Approved);
    assert_eq!(modifications, expected);
}

#[test]
fn remove_without_target_fails_validation() {
    let conn = open_db_in_memory().unwrap();
    let (_, clock) = manual_clock();
    let service = SuggestionService::new(&conn, clock);

    let request = SuggestionRequest {
        kind: SuggestionKind::Remove,
        payload: AddressDelta::default(),
        target_address_id: None,
        detail: None,
    };
    let err = service
        .submit(&PROPOSER, request, OpOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::MissingTarget(SuggestionKind::Remove))
    ));
    assert!(service
        .list(&ADMIN, &SuggestionFilter::default())
        .unwrap()
        .is_empty());
}

#[test]
fn submission_shapes_are_validated() {
    let conn = open_db_in_memory().unwrap();
    let (_, clock) = manual_clock();
    let record = seed_address(&conn, &clock, "rnit11");
    let service = SuggestionService::new(&conn, clock);

    let mut add_with_target = SuggestionRequest::add(district("Centro"));
    add_with_target.target_address_id = Some(record.id);
    assert!(matches!(
        service.submit(&PROPOSER, add_with_target, OpOptions::default()),
        Err(CoreError::Validation(ValidationError::UnexpectedTarget(_)))
    ));

    assert!(matches!(
        service.submit(&PROPOSER, SuggestionRequest::add(district("Centro")), OpOptions::default()),
        Err(CoreError::Validation(ValidationError::IncompletePayload { .. }))
    ));

    assert!(matches!(
        service.submit(
            &PROPOSER,
            SuggestionRequest::modify(record.id, AddressDelta::default()),
            OpOptions::default()
        ),
        Err(CoreError::Validation(ValidationError::EmptyDelta))
    ));

    assert!(matches!(
        service.submit(&PROPOSER, SuggestionRequest::remove(9_999), OpOptions::default()),
        Err(CoreError::Validation(ValidationError::UnresolvableTarget(9_999)))
    ));
}

#[test]
fn approved_add_creates_record_and_links_target() {
    let conn = open_db_in_memory().unwrap();
    let (_, clock) = manual_clock();
    let service = SuggestionService::new(&conn, clock.clone());

    let payload = AddressDelta::from(&NewAddress::new(
        "pbjp01",
        "PB",
        "Joao Pessoa",
        "Tambau",
        "Av. Almirante Tamandare",
    ));
    let suggestion = service
        .submit(
            &PROPOSER,
            SuggestionRequest::add(payload).with_detail("new rooftop site"),
            OpOptions::default(),
        )
        .unwrap();
    assert_eq!(suggestion.target_address_id, None);

    let decided = service
        .decide(&REVIEWER, suggestion.id, DecisionOutcome::Approve, None, OpOptions::default())
        .unwrap();
    let target = decided.target_address_id.unwrap();

    let record = AddressService::new(&conn, clock)
        .get(&PROPOSER, target)
        .unwrap();
    assert_eq!(record.code, "pbjp01");
    assert_eq!(record.version, 1);

    let events = events_for(&conn, target);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, ChangeKind::Add);
    assert_eq!(events[0].actor_id, REVIEWER.id);
    assert_eq!(events[0].suggestion_id, Some(suggestion.id));
}

#[test]
fn approved_add_with_taken_code_conflicts_and_stays_pending() {
    let conn = open_db_in_memory().unwrap();
    let (_, clock) = manual_clock();
    seed_address(&conn, &clock, "rnit12");
    let service = SuggestionService::new(&conn, clock);

    let payload = AddressDelta::from(&NewAddress::new("rnit12", "RN", "Natal", "Centro", "Rua A"));
    let suggestion = service
        .submit(&PROPOSER, SuggestionRequest::add(payload), OpOptions::default())
        .unwrap();

    let err = service
        .decide(&REVIEWER, suggestion.id, DecisionOutcome::Approve, None, OpOptions::default())
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    assert_eq!(
        service.get(&ADMIN, suggestion.id).unwrap().status,
        SuggestionStatus::Pending
    );
}

#[test]
fn approved_remove_soft_deletes_target() {
    let conn = open_db_in_memory().unwrap();
    let (_, clock) = manual_clock();
    let record = seed_address(&conn, &clock, "rnit13");
    let service = SuggestionService::new(&conn, clock.clone());

    let suggestion = service
        .submit(&PROPOSER, SuggestionRequest::remove(record.id), OpOptions::default())
        .unwrap();
    service
        .decide(&REVIEWER, suggestion.id, DecisionOutcome::Approve, None, OpOptions::default())
        .unwrap();

    let err = AddressService::new(&conn, clock)
        .get(&PROPOSER, record.id)
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));

    let kinds: Vec<_> = events_for(&conn, record.id)
        .into_iter()
        .map(|event| event.kind)
        .collect();
    assert_eq!(kinds, vec![ChangeKind::Add, ChangeKind::Remove]);
}

#[test]
fn approval_after_target_removal_fails_and_rolls_back() {
    let conn = open_db_in_memory().unwrap();
    let (_, clock) = manual_clock();
    let record = seed_address(&conn, &clock, "rnit14");
    let service = SuggestionService::new(&conn, clock.clone());

    let suggestion = service
        .submit(
            &PROPOSER,
            SuggestionRequest::modify(record.id, district("Alecrim")),
            OpOptions::default(),
        )
        .unwrap();
    AddressService::new(&conn, clock)
        .remove(&REVIEWER, record.id, OpOptions::default())
        .unwrap();

    let err = service
        .decide(&REVIEWER, suggestion.id, DecisionOutcome::Approve, None, OpOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::UnresolvableTarget(id)) if id == record.id
    ));
    assert_eq!(
        service.get(&ADMIN, suggestion.id).unwrap().status,
        SuggestionStatus::Pending
    );
    assert_eq!(events_for(&conn, record.id).len(), 2);
}

#[test]
fn rejection_changes_nothing_but_the_suggestion() {
    let conn = open_db_in_memory().unwrap();
    let (_, clock) = manual_clock();
    let record = seed_address(&conn, &clock, "rnit15");
    let service = SuggestionService::new(&conn, clock.clone());

    let suggestion = service
        .submit(
            &PROPOSER,
            SuggestionRequest::modify(record.id, district("Quintas")),
            OpOptions::default(),
        )
        .unwrap();
    let rejected = service
        .decide(
            &REVIEWER,
            suggestion.id,
            DecisionOutcome::Reject,
            Some("wrong district"),
            OpOptions::default(),
        )
        .unwrap();

    assert_eq!(rejected.status, SuggestionStatus::Rejected);
    assert_eq!(rejected.decision_reason.as_deref(), Some("wrong district"));
    assert!(rejected.decided_at.is_some());

    let unchanged = AddressService::new(&conn, clock)
        .get(&PROPOSER, record.id)
        .unwrap();
    assert_eq!(unchanged, record);
    assert_eq!(events_for(&conn, record.id).len(), 1);
}

#[test]
fn timed_out_decision_leaves_suggestion_pending() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locked.db");
    let (_, clock) = manual_clock();

    let conn = open_db(&path).unwrap();
    let record = seed_address(&conn, &clock, "rnit16");
    let service = SuggestionService::new(&conn, clock);
    let suggestion = service
        .submit(
            &PROPOSER,
            SuggestionRequest::modify(record.id, district("Nordeste")),
            OpOptions::default(),
        )
        .unwrap();

    let blocker = open_db(&path).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE;").unwrap();

    let err = service
        .decide(
            &REVIEWER,
            suggestion.id,
            DecisionOutcome::Approve,
            None,
            OpOptions::with_timeout(Duration::from_millis(50)),
        )
        .unwrap_err();
    assert!(matches!(err, CoreError::Storage(StorageError::Timeout { .. })));

    blocker.execute_batch("ROLLBACK;").unwrap();
    assert_eq!(
        service.get(&ADMIN, suggestion.id).unwrap().status,
        SuggestionStatus::Pending
    );
    assert_eq!(events_for(&conn, record.id).len(), 1);
}

#[test]
fn expiry_rejects_with_prefixed_reason_through_permission_checks() {
    let conn = open_db_in_memory().unwrap();
    let (manual, clock) = manual_clock();
    let record = seed_address(&conn, &clock, "rnit17");
    let service = SuggestionService::new(&conn, clock);

    let stale = service
        .submit(
            &PROPOSER,
            SuggestionRequest::modify(record.id, district("Lagoa Seca")),
            OpOptions::default(),
        )
        .unwrap();
    manual.advance(Duration::from_secs(40 * 24 * 60 * 60).as_millis() as i64);
    let fresh = service
        .submit(&PROPOSER, SuggestionRequest::remove(record.id), OpOptions::default())
        .unwrap();

    let listed: Vec<_> = service
        .list_stale_pending(&REVIEWER, Duration::from_secs(30 * 24 * 60 * 60), None)
        .unwrap()
        .into_iter()
        .map(|suggestion| suggestion.id)
        .collect();
    assert_eq!(listed, vec![stale.id]);
    assert!(service
        .list_stale_pending(&PROPOSER, Duration::from_secs(1), None)
        .is_err());

    assert!(matches!(
        service.expire(&PROPOSER, stale.id, None, OpOptions::default()),
        Err(CoreError::Permission { .. })
    ));
    let expired = service
        .expire(&REVIEWER, stale.id, Some("no reviewer in 30 days"), OpOptions::default())
        .unwrap();
    assert_eq!(expired.status, SuggestionStatus::Rejected);
    assert!(expired
        .decision_reason
        .as_deref()
        .unwrap()
        .starts_with("expired"));
    assert_eq!(
        service.get(&ADMIN, fresh.id).unwrap().status,
        SuggestionStatus::Pending
    );
}

#[test]
fn basic_principals_only_see_their_own_suggestions() {
    let conn = open_db_in_memory().unwrap();
    let (_, clock) = manual_clock();
    let record = seed_address(&conn, &clock, "rnit18");
    let service = SuggestionService::new(&conn, clock);
    let other = Principal::basic(77);

    let mine = service
        .submit(&PROPOSER, SuggestionRequest::remove(record.id), OpOptions::default())
        .unwrap();
    let theirs = service
        .submit(
            &other,
            SuggestionRequest::modify(record.id, district("Candelaria")),
            OpOptions::default(),
        )
        .unwrap();

    let visible: Vec<Suggestion> = service
        .list(&PROPOSER, &SuggestionFilter::default())
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, mine.id);

    assert!(matches!(
        service.get(&PROPOSER, theirs.id),
        Err(CoreError::Permission { .. })
    ));
    assert_eq!(
        service
            .list(&REVIEWER, &SuggestionFilter::default())
            .unwrap()
            .len(),
        2
    );

    let basic_events = AuditService::new(&conn)
        .count_events(&PROPOSER, ChangeEventFilter::default())
        .unwrap();
    assert_eq!(basic_events, 0);
}
