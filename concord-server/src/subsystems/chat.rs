//! Chat turn orchestration
//!
//! One turn: PII gate, store the user message, build the prompt from the
//! configured system prompt plus recent history, call the chat provider,
//! store the reply. A gated message is recorded to `pii_events` and answered
//! with a canned warning; the blocked text is never stored or forwarded.

use concord_core::completions::{ChatBackend, PromptMessage};
use concord_core::config::ChatConfig;
use concord_core::models::Role;
use concord_core::{pii, store, taxonomy};
use sqlx::PgPool;
use uuid::Uuid;

const PII_BLOCK_REPLY: &str = "Your message looks like it includes personal details such as a name, \
address, phone number, or ID number. For your safety it was not saved or sent anywhere. \
Please ask your question again without personal information.";

const PII_BLOCK_WARNING: &str = "Personal information detected. Message ignored for your safety.";

#[derive(Debug, Clone)]
pub struct ChatTurnOutcome {
    pub reply: String,
    pub pii_blocked: bool,
    pub warning: Option<String>,
}

/// Run one chat turn for a device's conversation.
///
/// The chat row is auto-created for a client-generated id. Provider errors
/// propagate to the caller; nothing from a failed turn is stored beyond the
/// user message itself.
pub async fn run_chat_turn(
    pool: &PgPool,
    backend: &dyn ChatBackend,
    config: &ChatConfig,
    device_id: &str,
    chat_id: Uuid,
    message: &str,
) -> anyhow::Result<ChatTurnOutcome> {
    let user_msg = message.trim();
    if user_msg.is_empty() {
        anyhow::bail!("empty message");
    }

    store::ensure_chat(pool, chat_id, device_id).await?;

    if pii::contains_pii(user_msg) {
        store::record_pii_event(pool, chat_id, device_id, "generic").await?;
        tracing::info!(chat_id = %chat_id, "message blocked by PII gate");

        return Ok(ChatTurnOutcome {
            reply: PII_BLOCK_REPLY.to_string(),
            pii_blocked: true,
            warning: Some(PII_BLOCK_WARNING.to_string()),
        });
    }

    store::append_message(pool, chat_id, Role::User.as_str(), user_msg).await?;
    store::record_message_event(
        pool,
        chat_id,
        device_id,
        Role::User.as_str(),
        taxonomy::classify(user_msg),
    )
    .await?;
    store::touch_chat(pool, chat_id).await?;

    let prompt = build_prompt(pool, config, chat_id).await?;
    let reply = backend.complete(&prompt).await?;

    store::append_message(pool, chat_id, Role::Assistant.as_str(), &reply).await?;
    store::record_message_event(
        pool,
        chat_id,
        device_id,
        Role::Assistant.as_str(),
        taxonomy::classify(&reply),
    )
    .await?;
    store::touch_chat(pool, chat_id).await?;

    Ok(ChatTurnOutcome {
        reply,
        pii_blocked: false,
        warning: None,
    })
}

/// Configured system prompt plus the last N stored turns, the just-stored
/// user message included.
async fn build_prompt(
    pool: &PgPool,
    config: &ChatConfig,
    chat_id: Uuid,
) -> anyhow::Result<Vec<PromptMessage>> {
    let recent = store::get_last_messages(pool, chat_id, config.history_turns as i64).await?;

    let mut prompt = Vec::with_capacity(recent.len() + 1);
    prompt.push(PromptMessage::new(
        Role::System.as_str(),
        config.system_prompt.clone(),
    ));
    for message in recent {
        prompt.push(PromptMessage::new(message.role, message.content));
    }

    Ok(prompt)
}
