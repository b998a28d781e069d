//! Per-user progress rows for videos and documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Video playback state for one (user, content item).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProgress {
    pub user_id: String,
    pub content_item_id: String,
    /// Seconds watched as last reported by the client.
    pub watch_time: f64,
    pub total_duration: f64,
    /// Playhead as a fraction of the video.
    pub last_position: f64,
    pub times_watched: u32,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl VideoProgress {
    /// Snapshot returned when nothing has been recorded yet.
    pub fn empty(user_id: &str, content_item_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            content_item_id: content_item_id.to_string(),
            watch_time: 0.0,
            total_duration: 0.0,
            last_position: 0.0,
            times_watched: 0,
            completed: false,
            completed_at: None,
            updated_at: None,
        }
    }

    pub fn completion_percentage(&self) -> f64 {
        if self.total_duration > 0.0 {
            self.watch_time / self.total_duration * 100.0
        } else {
            0.0
        }
    }
}

/// Document/page progress for PDF, PPT, HTML and EXTERNAL content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentProgress {
    pub user_id: String,
    pub content_item_id: String,
    pub progress: f64,
    pub pages_viewed: Option<u32>,
    pub last_page: Option<u32>,
    pub total_pages: Option<u32>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ContentProgress {
    pub fn empty(user_id: &str, content_item_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            content_item_id: content_item_id.to_string(),
            progress: 0.0,
            pages_viewed: None,
            last_page: None,
            total_pages: None,
            completed: false,
            completed_at: None,
            updated_at: None,
        }
    }
}

/// Client report of video playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProgressReport {
    pub content_item_id: String,
    pub watch_time: f64,
    pub total_duration: f64,
    pub last_position: f64,
    #[serde(default)]
    pub times_watched: Option<u32>,
}

/// Client report of document progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentProgressReport {
    pub content_item_id: String,
    pub progress: f64,
    #[serde(default)]
    pub pages_viewed: Option<u32>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub last_page: Option<u32>,
}

/// Result of an upsert: the stored row plus whether this write completed it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressWrite<T> {
    pub row: T,
    pub newly_completed: bool,
}
