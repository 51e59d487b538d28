use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use hearth_common::ids::series_id as build_series_id;
use hearth_common::time::Window;
use hearth_common::types::{CanonicalEvent, EventSeries};

use super::{from_doc, to_doc, PgStore};
use crate::logic::merge_attachment;
use crate::traits::{AttachContext, AttachOutcome, SeriesStore};

#[async_trait]
impl SeriesStore for PgStore {
    async fn attach_event(
        &self,
        event: &CanonicalEvent,
        ctx: &AttachContext,
        now: DateTime<Utc>,
    ) -> Result<AttachOutcome> {
        let sid = build_series_id(&ctx.host_id, &event.title);

        let mut tx = self.pool().begin().await?;

        // Row lock serializes concurrent attaches to the same series
        let existing: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT doc FROM event_series WHERE id = $1 FOR UPDATE")
                .bind(&sid)
                .fetch_optional(&mut *tx)
                .await?;

        let existing = existing.map(|(doc,)| from_doc(doc)).transpose()?;
        let (series, created) = merge_attachment(existing, event, ctx, &sid, now);

        sqlx::query(
            r#"
            INSERT INTO event_series (id, host_id, category_id, next_start_time, tags, doc)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET host_id = EXCLUDED.host_id,
                category_id = EXCLUDED.category_id,
                next_start_time = EXCLUDED.next_start_time,
                tags = EXCLUDED.tags,
                doc = EXCLUDED.doc
            "#,
        )
        .bind(&series.id)
        .bind(&series.host.id)
        .bind(&series.category_id)
        .bind(series.next_start_time)
        .bind(&series.tags)
        .bind(to_doc(&series)?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(AttachOutcome {
            series_id: series.id.clone(),
            host: series.host.clone(),
            created,
        })
    }

    async fn get_series(&self, id: &str) -> Result<Option<EventSeries>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT doc FROM event_series WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool())
                .await?;

        row.map(|(doc,)| from_doc(doc)).transpose()
    }

    async fn get_series_many(&self, ids: &[String]) -> Result<Vec<EventSeries>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<(String, serde_json::Value)> =
            sqlx::query_as("SELECT id, doc FROM event_series WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(self.pool())
                .await?;

        let mut by_id = std::collections::HashMap::new();
        for (id, doc) in rows {
            by_id.insert(id, from_doc::<EventSeries>(doc)?);
        }

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn series_in_window(
        &self,
        window: Window,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<EventSeries>> {
        let rows: Vec<(serde_json::Value,)> = if tags.is_empty() {
            sqlx::query_as(
                "SELECT doc FROM event_series
                 WHERE next_start_time >= $1 AND next_start_time < $2
                 ORDER BY next_start_time, id
                 LIMIT $3",
            )
            .bind(window.start)
            .bind(window.end)
            .bind(limit as i64)
            .fetch_all(self.pool())
            .await?
        } else {
            sqlx::query_as(
                "SELECT doc FROM event_series
                 WHERE next_start_time >= $1 AND next_start_time < $2 AND tags && $3
                 ORDER BY next_start_time, id
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

    async fn update_series_category(
        &self,
        series_id: &str,
        category_id: &str,
        category_name: &str,
        category_slug: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let patch = serde_json::json!({
            "categoryId": category_id,
            "categoryName": category_name,
            "categorySlug": category_slug,
            "updatedAt": now,
        });

        sqlx::query(
            "UPDATE event_series SET doc = doc || $2::jsonb, category_id = $3 WHERE id = $1",
        )
        .bind(series_id)
        .bind(patch)
        .bind(category_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
