mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use futures::future::join_all;
use notices_core::error::CoreError;
use notices_core::lifecycle::{NoteAction, NoteStatus};
use notices_core::notification::NotificationKind;
use notices_db::MemoryStore;
use notices_engine::{Engine, EngineConfig, Stores};
use notices_events::EventBus;

use common::*;

#[tokio::test]
async fn concurrent_approvals_by_the_same_head_commit_once() {
    let h = Harness::new();
    let note = h.new_draft().await;
    h.engine.workflow.submit(note.id, &author()).await.unwrap();

    let approver = head();
    let (first, second) = tokio::join!(
        h.engine.workflow.approve(note.id, &approver),
        h.engine.workflow.approve(note.id, &approver),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let failure = outcomes.into_iter().find_map(Result::err).unwrap();
    assert_matches!(failure, CoreError::Conflict(_) | CoreError::InvalidTransition(_));

    let approvals = h
        .engine
        .audit
        .history(note.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.action == NoteAction::Approve)
        .count();
    assert_eq!(approvals, 1);
    let stored = h.engine.workflow.get(note.id).await.unwrap();
    assert_eq!(stored.current_approver_id, Some(DIRECTOR));
}

#[tokio::test]
async fn approval_storm_advances_the_chain_by_one_level() {
    let h = Harness::new();
    let note = h.new_draft().await;
    h.engine.workflow.submit(note.id, &author()).await.unwrap();

    let approver = head();
    let results = join_all((0..8).map(|_| h.engine.workflow.approve(note.id, &approver))).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| e.is_transient() || matches!(e, CoreError::InvalidTransition(_))));

    let stored = h.engine.workflow.get(note.id).await.unwrap();
    assert_eq!(stored.approval_step, 1);
    assert_eq!(stored.version, 3);
}

#[tokio::test]
async fn concurrent_final_approvals_leave_one_approved_transition() {
    let h = Harness::new();
    let note = h.new_draft().await;
    h.engine.workflow.submit(note.id, &author()).await.unwrap();
    h.engine.workflow.approve(note.id, &head()).await.unwrap();

    let approver = director();
    let (first, second) = tokio::join!(
        h.engine.workflow.approve(note.id, &approver),
        h.engine.workflow.approve(note.id, &approver),
    );
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(CoreError::InvalidTransition(_)))));

    let approved = h
        .notifications_for(AUTHOR)
        .await
        .into_iter()
        .filter(|n| n.kind == NotificationKind::NoteApproved)
        .count();
    assert_eq!(approved, 1);
}

#[tokio::test]
async fn waiting_past_the_lock_timeout_is_busy() {
    let config = EngineConfig {
        lock_timeout: Duration::from_millis(50),
        ..test_config()
    };
    let (h, faulty) = faulty_harness(config);
    let note = h.new_draft().await;
    faulty.delay_commits(Duration::from_millis(300));

    let (author_a, author_b) = (author(), author());
    let (first, second) = tokio::join!(
        h.engine.workflow.submit(note.id, &author_a),
        h.engine.workflow.submit(note.id, &author_b),
    );

    assert_eq!(first.unwrap().status, NoteStatus::PendingValidation);
    assert_matches!(second, Err(CoreError::Busy(_)));
    assert_eq!(h.engine.audit.history(note.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn two_dispatchers_send_a_due_note_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let faulty = Arc::new(FaultyStore::new(Arc::clone(&store)));

    let h = Harness::over(
        Arc::clone(&store),
        Stores::shared(Arc::clone(&faulty)),
        directory(),
        test_config(),
    );
    // Separate engine, separate in-process locks, same storage.
    let other = Engine::new(
        Stores::shared(Arc::clone(&faulty)),
        Arc::new(directory()),
        Arc::new(EventBus::default()),
        test_config(),
    );

    let (note, due) = h.scheduled_note().await;
    faulty.delay_commits(Duration::from_millis(50));

    let (a, b) = tokio::join!(h.engine.scheduler.sweep(due), other.scheduler.sweep(due));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.sent.len() + b.sent.len(), 1);
    assert!(a.undelivered.is_empty() && b.undelivered.is_empty());

    let sends = h
        .engine
        .audit
        .history(note.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.action == NoteAction::Send)
        .count();
    assert_eq!(sends, 1);

    let records = h.engine.tracker.records_for_note(note.id).await.unwrap();
    let mut recipients: Vec<_> = records.iter().map(|r| r.recipient_id).collect();
    recipients.sort_unstable();
    assert_eq!(recipients, vec![R1, R2]);

    for recipient_id in [R1, R2] {
        let new_note = h
            .notifications_for(recipient_id)
            .await
            .into_iter()
            .filter(|n| n.kind == NotificationKind::NewNote)
            .count();
        assert_eq!(new_note, 1, "recipient {recipient_id}");
    }
}

#[tokio::test]
async fn different_notes_proceed_in_parallel() {
    let h = Harness::new();
    let first = h.new_draft().await;
    let second = h.new_draft().await;

    let (author_a, author_b) = (author(), author());
    let (a, b) = tokio::join!(
        h.engine.workflow.submit(first.id, &author_a),
        h.engine.workflow.submit(second.id, &author_b),
    );
    assert_eq!(a.unwrap().status, NoteStatus::PendingValidation);
    assert_eq!(b.unwrap().status, NoteStatus::PendingValidation);
    assert_eq!(h.engine.workflow.validation_inbox(HEAD).await.unwrap().len(), 2);
}
