use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use hearth_common::slug::name_key;
use hearth_common::types::EventCategory;

use super::{from_doc, to_doc, PgStore};
use crate::logic::{apply_series_addition, apply_series_removal};
use crate::traits::CategoryStore;

#[async_trait]
impl CategoryStore for PgStore {
    async fn get_category(&self, id: &str) -> Result<Option<EventCategory>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT doc FROM event_categories WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool())
                .await?;

        row.map(|(doc,)| from_doc(doc)).transpose()
    }

    async fn get_categories(&self, ids: &[String]) -> Result<Vec<EventCategory>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<(serde_json::Value,)> =
            sqlx::query_as("SELECT doc FROM event_categories WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(self.pool())
                .await?;

        rows.into_iter().map(|(doc,)| from_doc(doc)).collect()
    }

    async fn categories_for_host(&self, host_id: &str) -> Result<Vec<EventCategory>> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT doc FROM event_categories WHERE host_id = $1 ORDER BY doc->>'name'",
        )
        .bind(host_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(|(doc,)| from_doc(doc)).collect()
    }

    async fn create_category(&self, category: &EventCategory) -> Result<()> {
        sqlx::query(
            "INSERT INTO event_categories (id, host_id, name_key, doc) VALUES ($1, $2, $3, $4)",
        )
        .bind(&category.id)
        .bind(&category.host_id)
        .bind(name_key(&category.name))
        .bind(to_doc(category)?)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn add_series_to_category(
        &self,
        category_id: &str,
        series_id: &str,
        series_title: &str,
        series_tags: &[String],
        now: DateTime<Utc>,
    ) -> Result<EventCategory> {
        let mut tx = self.pool().begin().await?;

        // Version bump and change-log append must commit together; the row
        // lock gives concurrent additions a linear version sequence.
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT doc FROM event_categories WHERE id = $1 FOR UPDATE")
                .bind(category_id)
                .fetch_optional(&mut *tx)
                .await?;

        let doc = row.ok_or_else(|| anyhow!("category not found: {category_id}"))?.0;
        let mut category: EventCategory = from_doc(doc)?;

        if apply_series_addition(&mut category, series_id, series_title, series_tags, now) {
            sqlx::query("UPDATE event_categories SET doc = $2 WHERE id = $1")
                .bind(category_id)
                .bind(to_doc(&category)?)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(category)
    }

    async fn remove_series_from_category(
        &self,
        category_id: &str,
        series_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT doc FROM event_categories WHERE id = $1 FOR UPDATE")
                .bind(category_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((doc,)) = row else {
            tx.commit().await?;
            return Ok(());
        };

        let mut category: EventCategory = from_doc(doc)?;
        if apply_series_removal(&mut category, series_id, now) {
            sqlx::query("UPDATE event_categories SET doc = $2 WHERE id = $1")
                .bind(category_id)
                .bind(to_doc(&category)?)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
