//! Content unlock decisions and prerequisite edge maintenance.
//!
//! Each course's ordering and prerequisite edges are loaded into a
//! [`CourseGraph`] and cached together with the catalog's course revision.
//! A lookup whose revision no longer matches rebuilds the graph, so catalog
//! edits made by other writers are picked up on the next query. Edge writes
//! go through this type so the cycle check and the write happen under one
//! lock.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::graph::CourseGraph;
use crate::catalog::Catalog;
use crate::error::EngineError;
use crate::model::ContentItem;
use crate::storage::Database;

struct CachedGraph {
    revision: i64,
    graph: Arc<CourseGraph>,
}

pub struct PrerequisiteGate {
    db: Database,
    catalog: Arc<dyn Catalog>,
    graphs: RwLock<HashMap<String, CachedGraph>>,
    write_lock: Mutex<()>,
}

impl PrerequisiteGate {
    pub fn new(db: Database, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            db,
            catalog,
            graphs: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// The graph of a course as of its current catalog revision.
    pub async fn graph(&self, course_id: &str) -> Result<Arc<CourseGraph>, EngineError> {
        // Revision is read before the build; a racing change leaves an older stamp.
        let revision = self.catalog.course_revision(course_id).await?;

        if let Some(revision) = revision {
            if let Some(cached) = self.graphs.read().await.get(course_id) {
                if cached.revision == revision {
                    return Ok(cached.graph.clone());
                }
            }
        }

        let graph = self.build(course_id).await?;

        match revision {
            Some(revision) => {
                self.graphs.write().await.insert(
                    course_id.to_string(),
                    CachedGraph {
                        revision,
                        graph: graph.clone(),
                    },
                );
            }
            None => self.invalidate(course_id).await,
        }
        Ok(graph)
    }

    async fn build(&self, course_id: &str) -> Result<Arc<CourseGraph>, EngineError> {
        let course = self
            .catalog
            .course(course_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Course", course_id))?;
        let items = self.catalog.course_content(course_id).await?;
        let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
        let edges = self.db.prerequisite_edges(&ids).await?;

        let graph = Arc::new(CourseGraph::build(&course, &items, &edges));
        tracing::debug!(course_id, nodes = graph.len(), edges = edges.len(), "Built course graph");
        Ok(graph)
    }

    /// Drops the cached graph of a course so the next query rebuilds it.
    pub async fn invalidate(&self, course_id: &str) {
        self.graphs.write().await.remove(course_id);
    }

    /// Whether the user may open the content item.
    pub async fn is_unlocked(&self, user_id: &str, content_item_id: &str) -> Result<bool, EngineError> {
        let item = self.require_item(content_item_id).await?;
        self.is_item_unlocked(user_id, &item).await
    }

    pub async fn is_item_unlocked(&self, user_id: &str, item: &ContentItem) -> Result<bool, EngineError> {
        let graph = self.graph(&item.course_id).await?;
        let completed = self.db.completed_content_ids(user_id, &item.course_id).await?;
        Ok(graph.is_unlocked(&item.id, &completed))
    }

    /// Whether an item ordered after `item` exists and is unlocked for the user.
    pub async fn next_unlocked(&self, user_id: &str, item: &ContentItem) -> Result<bool, EngineError> {
        let graph = self.graph(&item.course_id).await?;
        let Some(next) = graph.next_after(&item.id) else {
            return Ok(false);
        };
        let completed = self.db.completed_content_ids(user_id, &item.course_id).await?;
        Ok(graph.is_unlocked(&next.id, &completed))
    }

    pub async fn prerequisites(&self, content_item_id: &str) -> Result<Vec<String>, EngineError> {
        self.require_item(content_item_id).await?;
        Ok(self.db.prerequisites_of(content_item_id).await?)
    }

    /// Replaces the prerequisite set of an item.
    ///
    /// Either every edge is valid and the whole set is stored, or nothing
    /// changes.
    pub async fn set_prerequisites(
        &self,
        content_item_id: &str,
        prerequisite_ids: &[String],
    ) -> Result<Vec<String>, EngineError> {
        let item = self.require_item(content_item_id).await?;
        let mut ids: Vec<String> = prerequisite_ids.to_vec();
        ids.sort();
        ids.dedup();

        let _guard = self.write_lock.lock().await;
        for id in &ids {
            self.check_edge(&item, id).await?;
        }

        let graph = self.graph(&item.course_id).await?;
        if graph.would_cycle(&item.id, &ids) {
            return Err(cycle_rejected(&item.id, &ids.join(", ")));
        }

        self.db
            .replace_prerequisites(&item.id, &ids, Utc::now())
            .await?;
        self.invalidate(&item.course_id).await;

        tracing::info!(content_item_id, prerequisites = ids.len(), "Prerequisites replaced");
        Ok(ids)
    }

    /// Adds one prerequisite edge; `false` when it already existed.
    pub async fn add_prerequisite(&self, content_item_id: &str, prerequisite_id: &str) -> Result<bool, EngineError> {
        let item = self.require_item(content_item_id).await?;

        let _guard = self.write_lock.lock().await;
        self.check_edge(&item, prerequisite_id).await?;

        let graph = self.graph(&item.course_id).await?;
        if graph.edge_would_cycle(&item.id, prerequisite_id) {
            return Err(cycle_rejected(&item.id, prerequisite_id));
        }

        let added = self
            .db
            .add_prerequisite(&item.id, prerequisite_id, Utc::now())
            .await?;
        if added {
            self.invalidate(&item.course_id).await;
            tracing::info!(content_item_id, prerequisite_id, "Prerequisite added");
        }
        Ok(added)
    }

    async fn require_item(&self, content_item_id: &str) -> Result<ContentItem, EngineError> {
        self.catalog
            .content_item(content_item_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Content item", content_item_id))
    }

    /// Self edges and cross-course edges are rejected; unknown IDs are missing.
    async fn check_edge(&self, item: &ContentItem, prerequisite_id: &str) -> Result<(), EngineError> {
        if prerequisite_id == item.id {
            tracing::warn!(content_item_id = %item.id, "Rejected self prerequisite");
            return Err(EngineError::BadRequest(format!(
                "Content item '{}' cannot be its own prerequisite",
                item.id
            )));
        }

        let prerequisite = self.require_item(prerequisite_id).await?;
        if prerequisite.course_id != item.course_id {
            tracing::warn!(
                content_item_id = %item.id,
                prerequisite_id,
                "Rejected cross-course prerequisite"
            );
            return Err(EngineError::BadRequest(format!(
                "Prerequisite '{}' belongs to a different course",
                prerequisite_id
            )));
        }
        Ok(())
    }
}

fn cycle_rejected(content_item_id: &str, prerequisites: &str) -> EngineError {
    tracing::warn!(content_item_id, prerequisites, "Rejected cyclic prerequisite");
    EngineError::BadRequest(format!(
        "Prerequisites [{}] would create a cycle through '{}'",
        prerequisites, content_item_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::error::ErrorCode;
    use crate::model::{ContentType, Course};

    async fn setup(course: Course) -> (Database, PrerequisiteGate) {
        let db = Database::open_in_memory().await.unwrap();
        let catalog = SqliteCatalog::new(&db);
        let course_id = course.id.clone();
        catalog.put_course(&course).await.unwrap();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            catalog
                .put_content_item(&ContentItem::new(*id, course_id.as_str(), ContentType::Html, i as i64 + 1))
                .await
                .unwrap();
        }
        catalog.put_course(&Course::new("other")).await.unwrap();
        catalog
            .put_content_item(&ContentItem::new("x", "other", ContentType::Html, 1))
            .await
            .unwrap();
        let gate = PrerequisiteGate::new(db.clone(), Arc::new(catalog));
        (db, gate)
    }

    #[tokio::test]
    async fn test_reverse_edge_is_rejected_and_not_stored() {
        let (db, gate) = setup(Course::new("c1")).await;

        assert!(gate.add_prerequisite("b", "a").await.unwrap());
        let err = gate.add_prerequisite("a", "b").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);
        assert!(db.prerequisites_of("a").await.unwrap().is_empty());

        let err = gate.set_prerequisites("a", &["c".into(), "b".into()]).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);
        assert!(db.prerequisites_of("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_self_cross_course_and_unknown_edges() {
        let (_db, gate) = setup(Course::new("c1")).await;

        assert_eq!(gate.add_prerequisite("a", "a").await.unwrap_err().code(), ErrorCode::BadRequest);
        assert_eq!(gate.add_prerequisite("a", "x").await.unwrap_err().code(), ErrorCode::BadRequest);
        assert_eq!(gate.add_prerequisite("a", "ghost").await.unwrap_err().code(), ErrorCode::NotFound);
        assert_eq!(gate.prerequisites("ghost").await.unwrap_err().code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_edges_gate_unlocking_and_refresh_cache() {
        let (db, gate) = setup(Course::new("c1")).await;
        assert!(gate.is_unlocked("u1", "c").await.unwrap());

        gate.set_prerequisites("c", &["a".into(), "a".into()]).await.unwrap();
        assert_eq!(gate.prerequisites("c").await.unwrap(), vec!["a"]);
        assert!(!gate.is_unlocked("u1", "c").await.unwrap());

        db.insert_content_completion("u1", "c1", "a", Utc::now()).await.unwrap();
        assert!(gate.is_unlocked("u1", "c").await.unwrap());

        // Replacing with an empty set clears the edges.
        gate.set_prerequisites("c", &[]).await.unwrap();
        assert!(gate.is_unlocked("u2", "c").await.unwrap());
    }

    #[tokio::test]
    async fn test_next_unlocked_follows_sequence() {
        let (db, gate) = setup(Course::new("c1").sequential(false)).await;
        let catalog_item = |id: &str| ContentItem::new(id, "c1", ContentType::Html, 0);

        let mut a = catalog_item("a");
        a.order = 1;
        assert!(!gate.next_unlocked("u1", &a).await.unwrap());

        db.insert_content_completion("u1", "c1", "a", Utc::now()).await.unwrap();
        assert!(gate.next_unlocked("u1", &a).await.unwrap());

        let mut c = catalog_item("c");
        c.order = 3;
        assert!(!gate.next_unlocked("u1", &c).await.unwrap());
    }

    #[tokio::test]
    async fn test_catalog_changes_after_warm_cache_are_seen() {
        let (db, gate) = setup(Course::new("c1")).await;
        let catalog = SqliteCatalog::new(&db);
        assert!(gate.is_unlocked("u1", "a").await.unwrap());

        catalog
            .put_content_item(&ContentItem::new("late", "c1", ContentType::Pdf, 4))
            .await
            .unwrap();
        assert!(gate.is_unlocked("u1", "late").await.unwrap());
        assert_eq!(gate.graph("c1").await.unwrap().len(), 4);

        catalog.put_course(&Course::new("c1").sequential(false)).await.unwrap();
        assert!(!gate.is_unlocked("u1", "late").await.unwrap());
        assert!(gate.is_unlocked("u1", "a").await.unwrap());

        catalog.put_course(&Course::new("c1").sequential(true)).await.unwrap();
        assert!(gate.is_unlocked("u1", "late").await.unwrap());
    }

    #[tokio::test]
    async fn test_unchanged_course_reuses_graph() {
        let (_db, gate) = setup(Course::new("c1")).await;
        let first = gate.graph("c1").await.unwrap();
        let second = gate.graph("c1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
