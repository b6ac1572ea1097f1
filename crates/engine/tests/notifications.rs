mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use notices_core::error::CoreError;
use notices_core::notification::NotificationKind;
use notices_core::types::DbId;
use notices_engine::background::retention;

use common::*;

async fn kinds_for(h: &Harness, user_id: DbId) -> Vec<NotificationKind> {
    let mut kinds: Vec<_> = h
        .notifications_for(user_id)
        .await
        .into_iter()
        .map(|n| n.kind)
        .collect();
    kinds.sort_by_key(|k| k.as_str());
    kinds
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validation_chain_notifies_each_party_once() {
    let h = Harness::new();
    h.approved_note().await;

    assert_eq!(kinds_for(&h, HEAD).await, vec![NotificationKind::ValidationRequired]);
    assert_eq!(kinds_for(&h, DIRECTOR).await, vec![NotificationKind::ValidationRequired]);
    assert_eq!(kinds_for(&h, AUTHOR).await, vec![NotificationKind::NoteApproved]);
    assert!(h.notifications_for(R1).await.is_empty());
}

#[tokio::test]
async fn schedule_and_archive_notify_nobody() {
    let h = Harness::new();
    let (note, _) = h.scheduled_note().await;
    h.engine.workflow.archive(note.id, &admin()).await.unwrap();

    assert_eq!(kinds_for(&h, AUTHOR).await, vec![NotificationKind::NoteApproved]);
    assert!(h.notifications_for(R1).await.is_empty());
    assert!(h.notifications_for(ADMIN).await.is_empty());
}

#[tokio::test]
async fn comment_notifies_author_and_prior_commenters_but_not_commenter() {
    let h = Harness::new();
    let note = h.new_draft().await;

    let fan_out = h
        .engine
        .workflow
        .comment_added(note.id, R1, 7, &[R2, R1, R2])
        .await
        .unwrap();
    let mut recipients: Vec<_> = fan_out.created.iter().map(|n| n.recipient_id).collect();
    recipients.sort_unstable();
    assert_eq!(recipients, vec![AUTHOR, R2]);
    assert!(fan_out.created.iter().all(|n| n.kind == NotificationKind::CommentAdded));
    assert!(h.notifications_for(R1).await.is_empty());

    let replay = h
        .engine
        .workflow
        .comment_added(note.id, R1, 7, &[R2])
        .await
        .unwrap();
    assert!(replay.created.is_empty());
    assert_eq!(replay.duplicates, 2);

    let next = h
        .engine
        .workflow
        .comment_added(note.id, AUTHOR, 8, &[R1, R2])
        .await
        .unwrap();
    assert_eq!(next.created.len(), 2);
}

#[tokio::test]
async fn one_failing_recipient_does_not_block_the_others() {
    let (h, faulty) = faulty_harness(test_config());
    let (note, due) = h.scheduled_note().await;
    faulty.fail_notifications_for(R1, 3);

    let report = h.engine.scheduler.sweep(due).await.unwrap();
    assert_eq!(report.sent, vec![note.id]);

    assert!(h.notifications_for(R1).await.is_empty());
    assert_eq!(kinds_for(&h, R2).await, vec![NotificationKind::NewNote]);
    assert_eq!(h.engine.tracker.records_for_note(note.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn transient_notification_failure_is_retried() {
    let (h, faulty) = faulty_harness(test_config());
    let note = h.new_draft().await;
    faulty.fail_notifications_for(HEAD, 2);

    h.engine.workflow.submit(note.id, &author()).await.unwrap();
    assert_eq!(kinds_for(&h, HEAD).await, vec![NotificationKind::ValidationRequired]);
}

#[tokio::test]
async fn exhausted_new_note_notification_is_redriven_by_next_sweep() {
    let (h, faulty) = faulty_harness(test_config());
    let (note, due) = h.scheduled_note().await;
    faulty.fail_notifications_for(R2, 3);

    let first = h.engine.scheduler.sweep(due).await.unwrap();
    assert_eq!(first.sent, vec![note.id]);
    assert!(first.renotified.is_empty());
    assert!(h.notifications_for(R2).await.is_empty());
    assert_eq!(h.engine.notifications.queued_retries().await, 1);

    let second = h
        .engine
        .scheduler
        .sweep(due + chrono::Duration::minutes(1))
        .await
        .unwrap();
    assert!(second.sent.is_empty());
    assert_eq!(second.renotified, vec![(note.id, R2)]);
    assert_eq!(kinds_for(&h, R2).await, vec![NotificationKind::NewNote]);
    assert_eq!(kinds_for(&h, R1).await, vec![NotificationKind::NewNote]);
    assert_eq!(h.engine.notifications.queued_retries().await, 0);
}

#[tokio::test]
async fn exhausted_transition_notification_is_redriven_by_next_sweep() {
    let (h, faulty) = faulty_harness(test_config());
    let note = h.new_draft().await;
    faulty.fail_notifications_for(HEAD, 3);

    h.engine.workflow.submit(note.id, &author()).await.unwrap();
    assert!(h.notifications_for(HEAD).await.is_empty());

    let report = h.engine.scheduler.sweep(Utc::now()).await.unwrap();
    assert_eq!(report.renotified, vec![(note.id, HEAD)]);
    assert_eq!(kinds_for(&h, HEAD).await, vec![NotificationKind::ValidationRequired]);

    // Nothing left to re-drive.
    let again = h.engine.scheduler.sweep(Utc::now()).await.unwrap();
    assert!(again.renotified.is_empty());
}

#[tokio::test]
async fn notification_failing_again_stays_queued() {
    let (h, faulty) = faulty_harness(test_config());
    let note = h.new_draft().await;
    faulty.fail_notifications_for(HEAD, 6);

    h.engine.workflow.submit(note.id, &author()).await.unwrap();
    let report = h.engine.scheduler.sweep(Utc::now()).await.unwrap();
    assert!(report.renotified.is_empty());
    assert_eq!(h.engine.notifications.queued_retries().await, 1);

    let report = h.engine.scheduler.sweep(Utc::now()).await.unwrap();
    assert_eq!(report.renotified, vec![(note.id, HEAD)]);
    assert_eq!(kinds_for(&h, HEAD).await, vec![NotificationKind::ValidationRequired]);
}

// ---------------------------------------------------------------------------
// Recipient operations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mark_read_checks_ownership_and_is_idempotent() {
    let h = Harness::new();
    let note = h.new_draft().await;
    h.engine.workflow.submit(note.id, &author()).await.unwrap();
    let notifications = &h.engine.notifications;

    let id = h.notifications_for(HEAD).await[0].id;
    assert_matches!(
        notifications.mark_read(AUTHOR, id).await,
        Err(CoreError::Forbidden(_))
    );
    assert_matches!(
        notifications.mark_read(HEAD, 9999).await,
        Err(CoreError::NotFound { entity: "notification", .. })
    );

    notifications.mark_read(HEAD, id).await.unwrap();
    let read_at = h.notifications_for(HEAD).await[0].read_at;
    assert!(read_at.is_some());

    notifications.mark_read(HEAD, id).await.unwrap();
    assert_eq!(h.notifications_for(HEAD).await[0].read_at, read_at);
    assert_eq!(notifications.unread_count(HEAD).await.unwrap(), 0);
}

#[tokio::test]
async fn list_pages_and_filters_unread() {
    let h = Harness::new();
    let note = h.new_draft().await;
    for comment_id in 1..=3 {
        h.engine
            .workflow
            .comment_added(note.id, R1, comment_id, &[])
            .await
            .unwrap();
    }
    let notifications = &h.engine.notifications;

    let page = notifications.list(AUTHOR, false, 2, 0).await.unwrap();
    assert_eq!(page.len(), 2);
    let rest = notifications.list(AUTHOR, false, 2, 2).await.unwrap();
    assert_eq!(rest.len(), 1);

    // A non-positive limit is clamped to one item.
    assert_eq!(notifications.list(AUTHOR, false, 0, 0).await.unwrap().len(), 1);

    notifications.mark_read(AUTHOR, page[0].id).await.unwrap();
    let unread = notifications.list(AUTHOR, true, 50, 0).await.unwrap();
    assert_eq!(unread.len(), 2);
    assert!(unread.iter().all(|n| !n.is_read));
    assert_eq!(notifications.unread_count(AUTHOR).await.unwrap(), 2);

    assert_eq!(notifications.mark_all_read(AUTHOR).await.unwrap(), 2);
    assert_eq!(notifications.unread_count(AUTHOR).await.unwrap(), 0);
    assert_eq!(notifications.mark_all_read(AUTHOR).await.unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Background work
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stale_validation_earns_one_reminder_per_round() {
    let h = Harness::new();
    let note = h.new_draft().await;
    let pending = h.engine.workflow.submit(note.id, &author()).await.unwrap();
    let reminders = &h.engine.reminders;

    let too_early = pending.updated_at + Duration::hours(47);
    assert_eq!(reminders.sweep(too_early).await.unwrap(), 0);

    let first_round = pending.updated_at + Duration::hours(49);
    assert_eq!(reminders.sweep(first_round).await.unwrap(), 1);
    assert_eq!(reminders.sweep(first_round).await.unwrap(), 0);

    let second_round = pending.updated_at + Duration::hours(97);
    assert_eq!(reminders.sweep(second_round).await.unwrap(), 1);

    let reminded = h
        .notifications_for(HEAD)
        .await
        .into_iter()
        .filter(|n| n.kind == NotificationKind::Reminder)
        .count();
    assert_eq!(reminded, 2);
}

#[tokio::test]
async fn reminders_follow_the_chain() {
    let h = Harness::new();
    let note = h.new_draft().await;
    h.engine.workflow.submit(note.id, &author()).await.unwrap();
    let advanced = h.engine.workflow.approve(note.id, &head()).await.unwrap();

    let later = advanced.updated_at + Duration::hours(49);
    assert_eq!(h.engine.reminders.sweep(later).await.unwrap(), 1);
    assert!(kinds_for(&h, DIRECTOR).await.contains(&NotificationKind::Reminder));
    assert!(!kinds_for(&h, HEAD).await.contains(&NotificationKind::Reminder));
}

#[tokio::test]
async fn retention_purges_only_old_read_notifications() {
    let h = Harness::new();
    let note = h.new_draft().await;
    h.engine
        .workflow
        .comment_added(note.id, R1, 1, &[R2])
        .await
        .unwrap();
    let author_notice = h.notifications_for(AUTHOR).await[0].id;
    h.engine.notifications.mark_read(AUTHOR, author_notice).await.unwrap();

    let retention_window = h.engine.config().notification_retention;
    let now = Utc::now();
    let purged = retention::purge(h.store.as_ref(), now, retention_window)
        .await
        .unwrap();
    assert_eq!(purged, 0);

    let later = now + retention_window + Duration::days(1);
    let purged = retention::purge(h.store.as_ref(), later, retention_window)
        .await
        .unwrap();
    assert_eq!(purged, 1);

    assert!(h.notifications_for(AUTHOR).await.is_empty());
    assert_eq!(h.notifications_for(R2).await.len(), 1);
}
