use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use hearth_common::time::Window;
use hearth_common::types::CanonicalEvent;

use super::{from_doc, to_doc, PgStore};
use crate::traits::EventStore;

#[async_trait]
impl EventStore for PgStore {
    async fn get_event(&self, id: &str) -> Result<Option<CanonicalEvent>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT doc FROM events WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool())
                .await?;

        row.map(|(doc,)| from_doc(doc)).transpose()
    }

    async fn get_events(&self, ids: &[String]) -> Result<Vec<CanonicalEvent>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<(String, serde_json::Value)> =
            sqlx::query_as("SELECT id, doc FROM events WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(self.pool())
                .await?;

        let mut by_id = std::collections::HashMap::new();
        for (id, doc) in rows {
            by_id.insert(id, from_doc::<CanonicalEvent>(doc)?);
        }

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn save_event(
        &self,
        event: &CanonicalEvent,
        raw_snapshot: &serde_json::Value,
        existing: Option<&CanonicalEvent>,
    ) -> Result<bool> {
        sqlx::query(
            r#"
            INSERT INTO events (id, start_time, tags, doc, raw)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET start_time = EXCLUDED.start_time,
                tags = EXCLUDED.tags,
                doc = EXCLUDED.doc,
                raw = EXCLUDED.raw
            "#,
        )
        .bind(&event.id)
        .bind(event.start_time)
        .bind(&event.tags)
        .bind(to_doc(event)?)
        .bind(raw_snapshot)
        .execute(self.pool())
        .await?;

        Ok(existing.is_none())
    }

    async fn touch_event(&self, id: &str, fetched_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE events SET doc = jsonb_set(doc, '{lastFetchedAt}', $2::jsonb, true)
             WHERE id = $1",
        )
        .bind(id)
        .bind(serde_json::json!(fetched_at))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn update_event_series_info(
        &self,
        event_id: &str,
        series_id: &str,
        category_id: Option<&str>,
        category_name: Option<&str>,
    ) -> Result<()> {
        let mut patch = serde_json::Map::new();
        patch.insert("seriesId".to_string(), serde_json::json!(series_id));
        if let Some(cid) = category_id {
            patch.insert("seriesCategoryId".to_string(), serde_json::json!(cid));
        }
        if let Some(name) = category_name {
            patch.insert("seriesCategoryName".to_string(), serde_json::json!(name));
        }

        sqlx::query("UPDATE events SET doc = doc || $2::jsonb WHERE id = $1")
            .bind(event_id)
            .bind(serde_json::Value::Object(patch))
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn events_in_window(
        &self,
        window: Window,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<CanonicalEvent>> {
        let rows: Vec<(serde_json::Value,)> = if tags.is_empty() {
            sqlx::query_as(
                "SELECT doc FROM events
                 WHERE start_time >= $1 AND start_time < $2
                 ORDER BY start_time, id
                 LIMIT $3",
            )
            .bind(window.start)
            .bind(window.end)
            .bind(limit as i64)
            .fetch_all(self.pool())
            .await?
        } else {
            sqlx::query_as(
                "SELECT doc FROM events
                 WHERE start_time >= $1 AND start_time < $2 AND tags && $3
                 ORDER BY start_time, id
                 LIMIT $4",
            )
            .bind(window.start)
            .bind(window.end)
            .bind(tags)
            .bind(limit as i64)
            .fetch_all(self.pool())
            .await?
        };

        rows.into_iter().map(|(doc,)| from_doc(doc)).collect()
    }
}
