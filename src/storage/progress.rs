//! Video and document progress rows.
//!
//! Both tables are upserted with last-write-wins semantics for the reported
//! fields while `completed` only ever moves from 0 to 1. `completed_at` is kept
//! from the first completing write, which is how a caller learns whether its
//! own write performed the transition.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::database::{get_u32, opt_time, opt_u32, Database, DatabaseError};
use crate::model::{ContentProgress, ProgressWrite, VideoProgress};

const VIDEO_COLUMNS: &str = "user_id, content_item_id, watch_time, total_duration, last_position, \
                             times_watched, completed, completed_at, updated_at";

const CONTENT_COLUMNS: &str = "user_id, content_item_id, progress, pages_viewed, last_page, \
                               total_pages, completed, completed_at, updated_at";

/// Values for a video progress upsert.
#[derive(Debug, Clone)]
pub struct VideoProgressUpsert<'a> {
    pub user_id: &'a str,
    pub content_item_id: &'a str,
    pub watch_time: f64,
    pub total_duration: f64,
    pub last_position: f64,
    /// Kept from the stored row when `None`.
    pub times_watched: Option<u32>,
    /// Whether this report alone meets the completion threshold.
    pub meets_threshold: bool,
    pub at: DateTime<Utc>,
}

/// Values for a document progress upsert.
#[derive(Debug, Clone)]
pub struct ContentProgressUpsert<'a> {
    pub user_id: &'a str,
    pub content_item_id: &'a str,
    pub progress: f64,
    pub pages_viewed: Option<u32>,
    pub last_page: Option<u32>,
    pub total_pages: Option<u32>,
    pub meets_threshold: bool,
    pub at: DateTime<Utc>,
}

impl Database {
    /// Upserts the video row and reports whether this write completed it.
    pub async fn upsert_video_progress(
        &self,
        write: &VideoProgressUpsert<'_>,
    ) -> Result<ProgressWrite<VideoProgress>, DatabaseError> {
        let completed_at = write.meets_threshold.then_some(write.at);

        // Sticky completion: `completed` never reverts, reported fields are last-write-wins.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO video_progress ({cols})
            VALUES (?1, ?2, ?3, ?4, ?5, COALESCE(?6, 0), ?7, ?8, ?9)
            ON CONFLICT(user_id, content_item_id) DO UPDATE SET
                watch_time = excluded.watch_time,
                total_duration = excluded.total_duration,
                last_position = excluded.last_position,
                times_watched = COALESCE(?6, video_progress.times_watched),
                completed = MAX(video_progress.completed, excluded.completed),
                completed_at = COALESCE(video_progress.completed_at, excluded.completed_at),
                updated_at = excluded.updated_at
            RETURNING {cols}
            "#,
            cols = VIDEO_COLUMNS
        ))
        .bind(write.user_id)
        .bind(write.content_item_id)
        .bind(write.watch_time)
        .bind(write.total_duration)
        .bind(write.last_position)
        .bind(write.times_watched.map(i64::from))
        .bind(write.meets_threshold)
        .bind(completed_at)
        .bind(write.at)
        .fetch_one(self.pool())
        .await?;

        let row = video_from_row(&row)?;
        let newly_completed = write.meets_threshold && row.completed_at == completed_at;
        Ok(ProgressWrite {
            row,
            newly_completed,
        })
    }

    pub async fn get_video_progress(
        &self,
        user_id: &str,
        content_item_id: &str,
    ) -> Result<Option<VideoProgress>, DatabaseError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM video_progress WHERE user_id = ?1 AND content_item_id = ?2",
            VIDEO_COLUMNS
        ))
        .bind(user_id)
        .bind(content_item_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.as_ref().map(video_from_row).transpose()?)
    }

    /// Upserts the document row and reports whether this write completed it.
    pub async fn upsert_content_progress(
        &self,
        write: &ContentProgressUpsert<'_>,
    ) -> Result<ProgressWrite<ContentProgress>, DatabaseError> {
        let completed_at = write.meets_threshold.then_some(write.at);

        // Sticky completion: `completed` never reverts, reported fields are last-write-wins.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO content_progress ({cols})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(user_id, content_item_id) DO UPDATE SET
                progress = excluded.progress,
                pages_viewed = COALESCE(excluded.pages_viewed, content_progress.pages_viewed),
                last_page = COALESCE(excluded.last_page, content_progress.last_page),
                total_pages = COALESCE(excluded.total_pages, content_progress.total_pages),
                completed = MAX(content_progress.completed, excluded.completed),
                completed_at = COALESCE(content_progress.completed_at, excluded.completed_at),
                updated_at = excluded.updated_at
            RETURNING {cols}
            "#,
            cols = CONTENT_COLUMNS
        ))
        .bind(write.user_id)
        .bind(write.content_item_id)
        .bind(write.progress)
        .bind(write.pages_viewed.map(i64::from))
        .bind(write.last_page.map(i64::from))
        .bind(write.total_pages.map(i64::from))
        .bind(write.meets_threshold)
        .bind(completed_at)
        .bind(write.at)
        .fetch_one(self.pool())
        .await?;

        let row = content_from_row(&row)?;
        let newly_completed = write.meets_threshold && row.completed_at == completed_at;
        Ok(ProgressWrite {
            row,
            newly_completed,
        })
    }

    pub async fn get_content_progress(
        &self,
        user_id: &str,
        content_item_id: &str,
    ) -> Result<Option<ContentProgress>, DatabaseError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM content_progress WHERE user_id = ?1 AND content_item_id = ?2",
            CONTENT_COLUMNS
        ))
        .bind(user_id)
        .bind(content_item_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.as_ref().map(content_from_row).transpose()?)
    }
}

fn video_from_row(row: &SqliteRow) -> Result<VideoProgress, sqlx::Error> {
    Ok(VideoProgress {
        user_id: row.try_get("user_id")?,
        content_item_id: row.try_get("content_item_id")?,
        watch_time: row.try_get("watch_time")?,
        total_duration: row.try_get("total_duration")?,
        last_position: row.try_get("last_position")?,
        times_watched: get_u32(row, "times_watched")?,
        completed: row.try_get("completed")?,
        completed_at: opt_time(row, "completed_at")?,
        updated_at: opt_time(row, "updated_at")?,
    })
}

fn content_from_row(row: &SqliteRow) -> Result<ContentProgress, sqlx::Error> {
    Ok(ContentProgress {
        user_id: row.try_get("user_id")?,
        content_item_id: row.try_get("content_item_id")?,
        progress: row.try_get("progress")?,
        pages_viewed: opt_u32(row, "pages_viewed")?,
        last_page: opt_u32(row, "last_page")?,
        total_pages: opt_u32(row, "total_pages")?,
        completed: row.try_get("completed")?,
        completed_at: opt_time(row, "completed_at")?,
        updated_at: opt_time(row, "updated_at")?,
    })
}
