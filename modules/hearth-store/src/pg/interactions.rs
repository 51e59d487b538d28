use anyhow::Result;
use async_trait::async_trait;

use hearth_common::types::UserInteraction;

use super::{from_doc, to_doc, PgStore};
use crate::traits::InteractionStore;

#[async_trait]
impl InteractionStore for PgStore {
    async fn append_interactions(&self, interactions: &[UserInteraction]) -> Result<()> {
        if interactions.is_empty() {
            return Ok(());
        }

        // One transaction = the whole batch lands or none of it does
        let mut tx = self.pool().begin().await?;
        for interaction in interactions {
            sqlx::query(
                r#"
                INSERT INTO interactions (id, user_id, ts, doc)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&interaction.id)
            .bind(&interaction.user_id)
            .bind(interaction.timestamp)
            .bind(to_doc(interaction)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn recent_interactions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<UserInteraction>> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT doc FROM interactions
             WHERE user_id = $1
             ORDER BY ts DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(|(doc,)| from_doc(doc)).collect()
    }
}
