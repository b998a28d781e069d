//! Events driving the completion cascade.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentCompletedEvent {
    pub user_id: String,
    pub course_id: String,
    pub content_item_id: String,
}

impl ContentCompletedEvent {
    pub fn new(user_id: &str, course_id: &str, content_item_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            content_item_id: content_item_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseCompletedEvent {
    pub user_id: String,
    pub course_id: String,
}

/// Everything the aggregator reacts to, content level first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CompletionEvent {
    ContentCompleted(ContentCompletedEvent),
    CourseCompleted(CourseCompletedEvent),
}

impl From<ContentCompletedEvent> for CompletionEvent {
    fn from(event: ContentCompletedEvent) -> Self {
        CompletionEvent::ContentCompleted(event)
    }
}

impl From<CourseCompletedEvent> for CompletionEvent {
    fn from(event: CourseCompletedEvent) -> Self {
        CompletionEvent::CourseCompleted(event)
    }
}
