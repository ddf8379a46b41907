//! Conversation store: chats, messages, and tracking events
//!
//! Thin sqlx layer over the `chats` / `messages` / `message_events` /
//! `pii_events` tables. The consistency engine only depends on
//! `get_messages` returning each conversation's history in order; a
//! nonexistent chat id yields an empty list, not an error.

use crate::models::{ChatSummary, Message};
use sqlx::PgPool;
use uuid::Uuid;

const DEFAULT_TITLE: &str = "New Conversation";

/// Create a new empty chat owned by the given device.
pub async fn create_chat(
    pool: &PgPool,
    device_id: &str,
    title: Option<&str>,
) -> Result<ChatSummary, sqlx::Error> {
    let summary: ChatSummary = sqlx::query_as(
        r#"
        INSERT INTO chats (chat_id, device_id, title, created_at, updated_at)
        VALUES ($1, $2, $3, now(), now())
        RETURNING chat_id, title, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(device_id)
    .bind(title.unwrap_or(DEFAULT_TITLE))
    .fetch_one(pool)
    .await?;

    Ok(summary)
}

/// Auto-create the chat row for a client-generated id, keeping an existing
/// row untouched.
pub async fn ensure_chat(pool: &PgPool, chat_id: Uuid, device_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO chats (chat_id, device_id, title, created_at, updated_at)
        VALUES ($1, $2, $3, now(), now())
        ON CONFLICT (chat_id) DO NOTHING
        "#,
    )
    .bind(chat_id)
    .bind(device_id)
    .bind(DEFAULT_TITLE)
    .execute(pool)
    .await?;

    Ok(())
}

/// Whether the chat exists and belongs to the device.
pub async fn chat_belongs_to_device(
    pool: &PgPool,
    chat_id: Uuid,
    device_id: &str,
) -> Result<bool, sqlx::Error> {
    let row: Option<(i32,)> =
        sqlx::query_as("SELECT 1 FROM chats WHERE chat_id = $1 AND device_id = $2")
            .bind(chat_id)
            .bind(device_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.is_some())
}

/// List a device's chats, newest first.
pub async fn list_chats(
    pool: &PgPool,
    device_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<ChatSummary>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT chat_id, title, created_at, updated_at
        FROM chats
        WHERE device_id = $1
        ORDER BY updated_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(device_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Full ordered history for a chat. Empty for an unknown id.
pub async fn get_messages(pool: &PgPool, chat_id: Uuid) -> Result<Vec<Message>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT role, content, created_at
        FROM messages
        WHERE chat_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await
}

/// Last `limit` messages for a chat, in conversation order.
pub async fn get_last_messages(
    pool: &PgPool,
    chat_id: Uuid,
    limit: i64,
) -> Result<Vec<Message>, sqlx::Error> {
    let mut messages: Vec<Message> = sqlx::query_as(
        r#"
        SELECT role, content, created_at
        FROM messages
        WHERE chat_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2
        "#,
    )
    .bind(chat_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    messages.reverse();
    Ok(messages)
}

/// Append one message to a chat's history.
pub async fn append_message(
    pool: &PgPool,
    chat_id: Uuid,
    role: &str,
    content: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO messages (chat_id, role, content, created_at)
        VALUES ($1, $2, $3, now())
        "#,
    )
    .bind(chat_id)
    .bind(role)
    .bind(content)
    .execute(pool)
    .await?;

    Ok(())
}

/// Bump a chat's `updated_at` so it sorts to the top of the device's list.
pub async fn touch_chat(pool: &PgPool, chat_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE chats SET updated_at = now() WHERE chat_id = $1")
        .bind(chat_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Hard-delete a chat; `messages` and event rows cascade.
pub async fn delete_chat(pool: &PgPool, chat_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM chats WHERE chat_id = $1")
        .bind(chat_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Record one tracked message for counting, carrying the classifier label.
pub async fn record_message_event(
    pool: &PgPool,
    chat_id: Uuid,
    device_id: &str,
    role: &str,
    category: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO message_events (chat_id, device_id, role, category, created_at)
        VALUES ($1, $2, $3, $4, now())
        "#,
    )
    .bind(chat_id)
    .bind(device_id)
    .bind(role)
    .bind(category)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record one blocked message.
pub async fn record_pii_event(
    pool: &PgPool,
    chat_id: Uuid,
    device_id: &str,
    pii_type: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO pii_events (chat_id, device_id, pii_type, created_at)
        VALUES ($1, $2, $3, now())
        "#,
    )
    .bind(chat_id)
    .bind(device_id)
    .bind(pii_type)
    .execute(pool)
    .await?;

    Ok(())
}
