//! Integration tests for the conversation store: uniqueness, ordering, and
//! append bookkeeping.

mod test_utils;

use std::sync::Arc;

use chrono::{Duration, Utc};
use engage::repositories::conversation::ParticipantInfo;
use engage::repositories::{ConversationRepository, MessageRepository, NewMessage};
use test_utils::{create_account, setup_db};

fn participant(id: &str) -> ParticipantInfo {
    ParticipantInfo {
        participant_id: id.to_string(),
        username: Some(format!("user-{}", id)),
        avatar_url: None,
    }
}

#[tokio::test]
async fn account_with_no_conversations_lists_empty() {
    let db = setup_db().await;
    let account_id = create_account(&db).await;

    let repo = ConversationRepository::new(Arc::new(db.clone()));
    let conversations = repo.list_by_account(&account_id).await.unwrap();

    assert!(conversations.is_empty());
}

#[tokio::test]
async fn conversation_unique_per_participant() {
    let db = setup_db().await;
    let account_id = create_account(&db).await;
    let repo = ConversationRepository::new(Arc::new(db.clone()));

    let first = repo
        .upsert_for_participant(&account_id, "instagram", &participant("fan-1"), true)
        .await
        .unwrap();
    let second = repo
        .upsert_for_participant(&account_id, "instagram", &participant("fan-1"), true)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);

    // Same participant on a different platform is a different conversation
    let other_platform = repo
        .upsert_for_participant(&account_id, "tiktok", &participant("fan-1"), true)
        .await
        .unwrap();
    assert_ne!(first.id, other_platform.id);
}

#[tokio::test]
async fn upsert_does_not_overwrite_operator_toggle() {
    let db = setup_db().await;
    let account_id = create_account(&db).await;
    let repo = ConversationRepository::new(Arc::new(db.clone()));

    let conversation = repo
        .upsert_for_participant(&account_id, "instagram", &participant("fan-1"), true)
        .await
        .unwrap();
    assert!(conversation.ai_enabled);

    repo.set_ai_enabled(&account_id, &conversation.id, false)
        .await
        .unwrap();

    // A later sweep upsert must not flip the toggle back on
    let again = repo
        .upsert_for_participant(&account_id, "instagram", &participant("fan-1"), true)
        .await
        .unwrap();
    assert!(!again.ai_enabled);
}

#[tokio::test]
async fn append_bumps_count_and_last_message_at() {
    let db = setup_db().await;
    let account_id = create_account(&db).await;
    let conversations = ConversationRepository::new(Arc::new(db.clone()));
    let messages = MessageRepository::new(Arc::new(db.clone()));

    let conversation = conversations
        .upsert_for_participant(&account_id, "instagram", &participant("fan-1"), true)
        .await
        .unwrap();
    assert_eq!(conversation.message_count, 0);
    assert!(conversation.last_message_at.is_none());

    let sent_at = Utc::now();
    messages
        .append(
            &conversation.id,
            NewMessage::fan(
                "fan".to_string(),
                "hello!".to_string(),
                "mid-1".to_string(),
                Some(sent_at),
            ),
        )
        .await
        .unwrap();

    let updated = conversations
        .find_by_id(&account_id, &conversation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.message_count, 1);
    assert_eq!(
        updated.last_message_at.unwrap().with_timezone(&Utc),
        sent_at
    );
}

#[tokio::test]
async fn last_message_at_never_moves_backwards() {
    let db = setup_db().await;
    let account_id = create_account(&db).await;
    let conversations = ConversationRepository::new(Arc::new(db.clone()));
    let messages = MessageRepository::new(Arc::new(db.clone()));

    let conversation = conversations
        .upsert_for_participant(&account_id, "instagram", &participant("fan-1"), true)
        .await
        .unwrap();

    let newer = Utc::now();
    let older = newer - Duration::minutes(10);

    messages
        .append(
            &conversation.id,
            NewMessage::fan(
                "fan".to_string(),
                "newest".to_string(),
                "mid-2".to_string(),
                Some(newer),
            ),
        )
        .await
        .unwrap();

    // A delayed append of an older message must not rewind the timestamp
    messages
        .append(
            &conversation.id,
            NewMessage::fan(
                "fan".to_string(),
                "older".to_string(),
                "mid-1".to_string(),
                Some(older),
            ),
        )
        .await
        .unwrap();

    let updated = conversations
        .find_by_id(&account_id, &conversation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.message_count, 2);
    assert_eq!(updated.last_message_at.unwrap().with_timezone(&Utc), newer);
}

#[tokio::test]
async fn list_messages_is_non_decreasing_for_any_interleaving() {
    let db = setup_db().await;
    let account_id = create_account(&db).await;
    let conversations = ConversationRepository::new(Arc::new(db.clone()));
    let messages = MessageRepository::new(Arc::new(db.clone()));

    let conversation = conversations
        .upsert_for_participant(&account_id, "instagram", &participant("fan-1"), true)
        .await
        .unwrap();

    // Appends arrive out of chronological order, as concurrent writers
    // (poll sweep, AI reply, manual reply) would produce
    let base = Utc::now();
    let offsets = [3i64, 1, 4, 0, 2];
    for (index, offset) in offsets.iter().enumerate() {
        messages
            .append(
                &conversation.id,
                NewMessage::fan(
                    "fan".to_string(),
                    format!("message {}", index),
                    format!("mid-{}", index),
                    Some(base + Duration::seconds(*offset)),
                ),
            )
            .await
            .unwrap();
    }

    let listed = messages
        .list_by_conversation(&conversation.id)
        .await
        .unwrap();
    assert_eq!(listed.len(), offsets.len());
    for window in listed.windows(2) {
        assert!(
            window[0].created_at <= window[1].created_at,
            "messages must be in non-decreasing created_at order"
        );
    }
}

#[tokio::test]
async fn conversations_list_newest_activity_first() {
    let db = setup_db().await;
    let account_id = create_account(&db).await;
    let conversations = ConversationRepository::new(Arc::new(db.clone()));
    let messages = MessageRepository::new(Arc::new(db.clone()));

    let base = Utc::now();
    for (participant_id, minutes_ago) in [("fan-a", 30i64), ("fan-b", 5), ("fan-c", 60)] {
        let conversation = conversations
            .upsert_for_participant(&account_id, "instagram", &participant(participant_id), true)
            .await
            .unwrap();
        messages
            .append(
                &conversation.id,
                NewMessage::fan(
                    participant_id.to_string(),
                    "hi".to_string(),
                    format!("mid-{}", participant_id),
                    Some(base - Duration::minutes(minutes_ago)),
                ),
            )
            .await
            .unwrap();
    }

    let listed = conversations.list_by_account(&account_id).await.unwrap();
    let order: Vec<&str> = listed
        .iter()
        .map(|conv| conv.participant_id.as_str())
        .collect();
    assert_eq!(order, vec!["fan-b", "fan-a", "fan-c"]);
}

#[tokio::test]
async fn conversation_pagination_walks_all_rows() {
    let db = setup_db().await;
    let account_id = create_account(&db).await;
    let conversations = ConversationRepository::new(Arc::new(db.clone()));
    let messages = MessageRepository::new(Arc::new(db.clone()));

    let base = Utc::now();
    for index in 0..5 {
        let conversation = conversations
            .upsert_for_participant(
                &account_id,
                "instagram",
                &participant(&format!("fan-{}", index)),
                true,
            )
            .await
            .unwrap();
        messages
            .append(
                &conversation.id,
                NewMessage::fan(
                    "fan".to_string(),
                    "hi".to_string(),
                    format!("mid-{}", index),
                    Some(base + Duration::seconds(index)),
                ),
            )
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let (page, next) = conversations
            .list_by_account_paginated(&account_id, 2, cursor)
            .await
            .unwrap();
        seen.extend(page.into_iter().map(|conv| conv.participant_id));
        match next {
            Some(next_cursor) => cursor = Some(next_cursor),
            None => break,
        }
    }

    assert_eq!(seen.len(), 5);
    // Newest activity first: fan-4 down to fan-0
    assert_eq!(seen[0], "fan-4");
    assert_eq!(seen[4], "fan-0");
}

#[tokio::test]
async fn advance_cursor_persists() {
    let db = setup_db().await;
    let account_id = create_account(&db).await;
    let conversations = ConversationRepository::new(Arc::new(db.clone()));

    let conversation = conversations
        .upsert_for_participant(&account_id, "instagram", &participant("fan-1"), true)
        .await
        .unwrap();
    assert!(conversation.last_processed_message_id.is_none());

    conversations
        .advance_cursor(&conversation.id, "mid-42")
        .await
        .unwrap();

    let updated = conversations
        .find_by_id(&account_id, &conversation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.last_processed_message_id.as_deref(), Some("mid-42"));
}
