//! Basic aggregates: plain grouped counting over chats and tracked events
//!
//! Independent of the consistency engine; the analytics handler merges both
//! into one payload. Every query has a device-scoped and a system-wide form,
//! selected by the optional device filter. Also selects the recent
//! conversation-id set the consistency engine runs over.

use concord_core::config::AnalyticsConfig;
use concord_core::taxonomy;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Totals {
    pub chats: i64,
    pub devices: i64,
    pub pii_flags: i64,
    pub pii_devices: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone)]
pub struct BasicAggregates {
    pub totals: Totals,
    pub top_categories: Vec<CategoryCount>,
    pub by_day: Vec<DayCount>,
    /// Recent conversations, newest first, handed to the consistency engine.
    pub chat_ids: Vec<Uuid>,
}

pub async fn fetch_basic_aggregates(
    pool: &PgPool,
    device_id: Option<&str>,
    opts: &AnalyticsConfig,
) -> Result<BasicAggregates, sqlx::Error> {
    let total_chats: (i64,) = match device_id {
        Some(device) => {
            sqlx::query_as("SELECT COUNT(*) FROM chats WHERE device_id = $1")
                .bind(device)
                .fetch_one(pool)
                .await?
        }
        None => {
            sqlx::query_as("SELECT COUNT(*) FROM chats")
                .fetch_one(pool)
                .await?
        }
    };

    let devices: (i64,) = match device_id {
        Some(device) => {
            sqlx::query_as("SELECT COUNT(DISTINCT device_id) FROM chats WHERE device_id = $1")
                .bind(device)
                .fetch_one(pool)
                .await?
        }
        None => {
            sqlx::query_as("SELECT COUNT(DISTINCT device_id) FROM chats")
                .fetch_one(pool)
                .await?
        }
    };

    let (pii_flags, pii_devices) = match device_id {
        Some(device) => {
            // for a single device: how many times it hit the gate, and
            // whether it ever did
            let flags: (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM pii_events WHERE device_id = $1")
                    .bind(device)
                    .fetch_one(pool)
                    .await?;
            (flags.0, if flags.0 > 0 { 1 } else { 0 })
        }
        None => {
            let flags: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pii_events")
                .fetch_one(pool)
                .await?;
            let devices: (i64,) =
                sqlx::query_as("SELECT COUNT(DISTINCT device_id) FROM pii_events")
                    .fetch_one(pool)
                    .await?;
            (flags.0, devices.0)
        }
    };

    let category_rows: Vec<(Option<String>, i64)> = match device_id {
        Some(device) => {
            sqlx::query_as(
                r#"
                SELECT me.category, COUNT(*)
                FROM message_events me
                JOIN chats c ON c.chat_id = me.chat_id
                WHERE me.role = 'user' AND c.device_id = $1
                GROUP BY me.category
                ORDER BY COUNT(*) DESC
                "#,
            )
            .bind(device)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                r#"
                SELECT category, COUNT(*)
                FROM message_events
                WHERE role = 'user'
                GROUP BY category
                ORDER BY COUNT(*) DESC
                "#,
            )
            .fetch_all(pool)
            .await?
        }
    };

    let top_categories = category_rows
        .into_iter()
        .map(|(category, count)| CategoryCount {
            category: category.unwrap_or_else(|| taxonomy::FALLBACK_CATEGORY.to_string()),
            count,
        })
        .collect();

    let day_rows: Vec<(String, i64)> = match device_id {
        Some(device) => {
            sqlx::query_as(
                r#"
                SELECT TO_CHAR(me.created_at::date, 'YYYY-MM-DD') AS d, COUNT(*)
                FROM message_events me
                JOIN chats c ON c.chat_id = me.chat_id
                WHERE me.role = 'user'
                  AND c.device_id = $1
                  AND me.created_at >= CURRENT_DATE - make_interval(days => $2)
                GROUP BY d
                ORDER BY d
                "#,
            )
            .bind(device)
            .bind(opts.usage_window_days)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                r#"
                SELECT TO_CHAR(created_at::date, 'YYYY-MM-DD') AS d, COUNT(*)
                FROM message_events
                WHERE role = 'user'
                  AND created_at >= CURRENT_DATE - make_interval(days => $1)
                GROUP BY d
                ORDER BY d
                "#,
            )
            .bind(opts.usage_window_days)
            .fetch_all(pool)
            .await?
        }
    };

    let by_day = day_rows
        .into_iter()
        .map(|(date, count)| DayCount { date, count })
        .collect();

    let chat_rows: Vec<(Uuid,)> = match device_id {
        Some(device) => {
            sqlx::query_as(
                r#"
                SELECT chat_id FROM chats
                WHERE device_id = $1
                ORDER BY updated_at DESC
                LIMIT $2
                "#,
            )
            .bind(device)
            .bind(opts.recent_chat_limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                r#"
                SELECT chat_id FROM chats
                ORDER BY updated_at DESC
                LIMIT $1
                "#,
            )
            .bind(opts.recent_chat_limit)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(BasicAggregates {
        totals: Totals {
            chats: total_chats.0,
            devices: devices.0,
            pii_flags,
            pii_devices,
        },
        top_categories,
        by_day,
        chat_ids: chat_rows.into_iter().map(|(id,)| id).collect(),
    })
}
