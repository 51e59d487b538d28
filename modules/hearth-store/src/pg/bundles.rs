use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use hearth_common::types::UserCategoryBundleState;

use super::PgStore;
use crate::traits::BundleStateStore;

#[async_trait]
impl BundleStateStore for PgStore {
    async fn bundle_states(
        &self,
        user_id: &str,
        category_ids: &[String],
    ) -> Result<HashMap<String, UserCategoryBundleState>> {
        if category_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(String, i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT category_id, last_seen_version, last_seen_at
             FROM category_bundle_state
             WHERE user_id = $1 AND category_id = ANY($2)",
        )
        .bind(user_id)
        .bind(category_ids)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(category_id, version, seen_at)| {
                (
                    category_id.clone(),
                    UserCategoryBundleState {
                        user_id: user_id.to_string(),
                        category_id,
                        last_seen_version: version.max(0) as u64,
                        last_seen_at: seen_at,
                    },
                )
            })
            .collect())
    }

    async fn mark_seen(
        &self,
        user_id: &str,
        category_id: &str,
        version: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO category_bundle_state (user_id, category_id, last_seen_version, last_seen_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, category_id) DO UPDATE
            SET last_seen_version = EXCLUDED.last_seen_version,
                last_seen_at = EXCLUDED.last_seen_at
            "#,
        )
        .bind(user_id)
        .bind(category_id)
        .bind(version as i64)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
