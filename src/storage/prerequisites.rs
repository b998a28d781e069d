//! Explicit prerequisite edges between content items.
//!
//! An edge `(content_item_id, prerequisite_id)` means the content item stays
//! locked until the prerequisite is completed. Cycle and same-course checks
//! happen before these writes; the table only guards self-edges.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};

use super::database::{Database, DatabaseError};

/// One stored edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct PrerequisiteEdge {
    pub content_item_id: String,
    pub prerequisite_id: String,
}

impl Database {
    /// Direct prerequisites of one content item.
    pub async fn prerequisites_of(&self, content_item_id: &str) -> Result<Vec<String>, DatabaseError> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT prerequisite_id FROM content_item_prerequisites
            WHERE content_item_id = ?1 ORDER BY prerequisite_id
            "#,
        )
        .bind(content_item_id)
        .fetch_all(self.pool())
        .await?;
        Ok(ids)
    }

    /// Every edge whose dependent item is one of `content_item_ids`.
    pub async fn prerequisite_edges(
        &self,
        content_item_ids: &[String],
    ) -> Result<Vec<PrerequisiteEdge>, DatabaseError> {
        if content_item_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT content_item_id, prerequisite_id FROM content_item_prerequisites \
             WHERE content_item_id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in content_item_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let edges = builder
            .build_query_as::<PrerequisiteEdge>()
            .fetch_all(self.pool())
            .await?;
        Ok(edges)
    }

    /// Replaces the full prerequisite set of an item in one transaction.
    pub async fn replace_prerequisites(
        &self,
        content_item_id: &str,
        prerequisite_ids: &[String],
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM content_item_prerequisites WHERE content_item_id = ?1")
            .bind(content_item_id)
            .execute(&mut *tx)
            .await?;

        for prerequisite_id in prerequisite_ids {
            sqlx::query(
                r#"
                INSERT INTO content_item_prerequisites (content_item_id, prerequisite_id, created_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(content_item_id)
            .bind(prerequisite_id)
            .bind(at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Transaction(e.to_string()))?;
        Ok(())
    }

    /// Adds one edge; `false` when it already existed.
    pub async fn add_prerequisite(
        &self,
        content_item_id: &str,
        prerequisite_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO content_item_prerequisites (content_item_id, prerequisite_id, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(content_item_id)
        .bind(prerequisite_id)
        .bind(at)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replace_prerequisites() {
        let db = Database::open_in_memory().await.unwrap();
        let at = Utc::now();

        db.replace_prerequisites("c", &["a".into(), "b".into()], at).await.unwrap();
        assert_eq!(db.prerequisites_of("c").await.unwrap(), vec!["a", "b"]);

        db.replace_prerequisites("c", &["b".into()], at).await.unwrap();
        assert_eq!(db.prerequisites_of("c").await.unwrap(), vec!["b"]);

        db.replace_prerequisites("c", &[], at).await.unwrap();
        assert!(db.prerequisites_of("c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_prerequisite_and_list_edges() {
        let db = Database::open_in_memory().await.unwrap();
        let at = Utc::now();

        assert!(db.add_prerequisite("b", "a", at).await.unwrap());
        assert!(!db.add_prerequisite("b", "a", at).await.unwrap());
        assert!(db.add_prerequisite("c", "b", at).await.unwrap());

        let edges = db
            .prerequisite_edges(&["b".to_string(), "x".to_string()])
            .await
            .unwrap();
        assert_eq!(
            edges,
            vec![PrerequisiteEdge {
                content_item_id: "b".into(),
                prerequisite_id: "a".into(),
            }]
        );
        assert!(db.prerequisite_edges(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_self_edge_rejected_by_schema() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(db.add_prerequisite("a", "a", Utc::now()).await.is_err());
    }
}
