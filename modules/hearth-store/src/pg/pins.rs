use anyhow::Result;
use async_trait::async_trait;

use hearth_common::time::Window;
use hearth_common::types::{PinnedEvent, PinnedSeries};

use super::{from_doc, to_doc, PgStore};
use crate::traits::PinStore;

#[async_trait]
impl PinStore for PgStore {
    async fn set_event_pin(&self, user_id: &str, pin: &PinnedEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pinned_events (user_id, event_id, event_start_time, doc)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, event_id) DO UPDATE
            SET event_start_time = EXCLUDED.event_start_time,
                doc = EXCLUDED.doc
            "#,
        )
        .bind(user_id)
        .bind(&pin.event_id)
        .bind(pin.event_start_time)
        .bind(to_doc(pin)?)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn remove_event_pin(&self, user_id: &str, event_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM pinned_events WHERE user_id = $1 AND event_id = $2")
            .bind(user_id)
            .bind(event_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn set_series_pin(&self, user_id: &str, pin: &PinnedSeries) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pinned_series (user_id, series_id, doc)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, series_id) DO UPDATE SET doc = EXCLUDED.doc
            "#,
        )
        .bind(user_id)
        .bind(&pin.series_id)
        .bind(to_doc(pin)?)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn remove_series_pin(&self, user_id: &str, series_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM pinned_series WHERE user_id = $1 AND series_id = $2")
            .bind(user_id)
            .bind(series_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn event_pins_in_window(
        &self,
        user_id: &str,
        window: Window,
    ) -> Result<Vec<PinnedEvent>> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT doc FROM pinned_events
             WHERE user_id = $1 AND event_start_time >= $2 AND event_start_time < $3
             ORDER BY event_start_time, event_id",
        )
        .bind(user_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(|(doc,)| from_doc(doc)).collect()
    }

    async fn series_pins(&self, user_id: &str) -> Result<Vec<PinnedSeries>> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT doc FROM pinned_series WHERE user_id = $1 ORDER BY series_id",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(|(doc,)| from_doc(doc)).collect()
    }
}
