use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use hearth_common::types::{ProposalStatus, TagProposal, PROPOSAL_TAGS_PER_EVENT};

use super::{from_doc, to_doc, PgStore};
use crate::logic::apply_proposal_increment;
use crate::traits::ProposalStore;

#[async_trait]
impl ProposalStore for PgStore {
    async fn record_tags(
        &self,
        slugs: &[String],
        source_id: &str,
        event_id: &str,
        event_title: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        for slug in slugs.iter().take(PROPOSAL_TAGS_PER_EVENT) {
            let mut tx = self.pool().begin().await?;

            let row: Option<(serde_json::Value,)> =
                sqlx::query_as("SELECT doc FROM tag_proposals WHERE slug = $1 FOR UPDATE")
                    .bind(slug)
                    .fetch_optional(&mut *tx)
                    .await?;

            let existing = row.map(|(doc,)| from_doc(doc)).transpose()?;
            let proposal =
                apply_proposal_increment(existing, slug, source_id, event_id, event_title, now);
            let status = match proposal.status {
                ProposalStatus::Pending => "pending",
                ProposalStatus::Accepted => "accepted",
                ProposalStatus::Rejected => "rejected",
            };

            sqlx::query(
                r#"
                INSERT INTO tag_proposals (slug, status, occurrence_count, last_seen_at, doc)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (slug) DO UPDATE
                SET status = EXCLUDED.status,
                    occurrence_count = EXCLUDED.occurrence_count,
                    last_seen_at = EXCLUDED.last_seen_at,
                    doc = EXCLUDED.doc
                "#,
            )
            .bind(&proposal.slug)
            .bind(status)
            .bind(proposal.occurrence_count as i64)
            .bind(proposal.last_seen_at)
            .bind(to_doc(&proposal)?)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
        }
        Ok(())
    }

    async fn top_proposals(&self, limit: usize) -> Result<Vec<TagProposal>> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT doc FROM tag_proposals
             WHERE status = 'pending'
             ORDER BY occurrence_count DESC, last_seen_at DESC
             LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(|(doc,)| from_doc(doc)).collect()
    }
}
