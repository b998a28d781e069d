//! Catalog types owned by the course-authoring flow.
//!
//! The engine only reads these; identity and ordering are authoritative
//! here, everything else is metadata.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default fraction of a video/document that must be consumed.
pub const DEFAULT_COMPLETION_THRESHOLD: f64 = 0.8;

/// Kind of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Video,
    Pdf,
    Ppt,
    Html,
    External,
    Test,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Video => "VIDEO",
            ContentType::Pdf => "PDF",
            ContentType::Ppt => "PPT",
            ContentType::Html => "HTML",
            ContentType::External => "EXTERNAL",
            ContentType::Test => "TEST",
        }
    }

    /// Whether progress for this type is tracked as generic document progress.
    pub fn is_document(&self) -> bool {
        !matches!(self, ContentType::Video | ContentType::Test)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "VIDEO" => Ok(ContentType::Video),
            "PDF" => Ok(ContentType::Pdf),
            "PPT" => Ok(ContentType::Ppt),
            "HTML" => Ok(ContentType::Html),
            "EXTERNAL" => Ok(ContentType::External),
            "TEST" => Ok(ContentType::Test),
            other => Err(format!("unknown content type '{}'", other)),
        }
    }
}

/// A unit of content inside exactly one course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    pub course_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    /// Position inside the course; lower comes first.
    pub order: i64,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default = "default_threshold")]
    pub completion_threshold: f64,
}

fn default_required() -> bool {
    true
}

fn default_threshold() -> f64 {
    DEFAULT_COMPLETION_THRESHOLD
}

impl ContentItem {
    pub fn new(
        id: impl Into<String>,
        course_id: impl Into<String>,
        content_type: ContentType,
        order: i64,
    ) -> Self {
        Self {
            id: id.into(),
            course_id: course_id.into(),
            title: String::new(),
            content_type,
            order,
            required: true,
            completion_threshold: DEFAULT_COMPLETION_THRESHOLD,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.completion_threshold = threshold;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// Course-level flags consulted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Content must be consumed in `order`.
    #[serde(default)]
    pub sequential_required: bool,
    /// Lifts the sequential restriction while keeping order advisory.
    #[serde(default)]
    pub allow_skipping: bool,
    #[serde(default)]
    pub certificate_enabled: bool,
    #[serde(default)]
    pub badge_enabled: bool,
}

impl Course {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn sequential(mut self, allow_skipping: bool) -> Self {
        self.sequential_required = true;
        self.allow_skipping = allow_skipping;
        self
    }

    pub fn with_awards(mut self, certificate: bool, badge: bool) -> Self {
        self.certificate_enabled = certificate;
        self.badge_enabled = badge;
        self
    }

    pub fn awards(&self) -> AwardFlags {
        AwardFlags {
            certificate: self.certificate_enabled,
            badge: self.badge_enabled,
        }
    }
}

/// An ordered bundle of courses with its own awards.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPlan {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub course_ids: Vec<String>,
    #[serde(default)]
    pub certificate_enabled: bool,
    #[serde(default)]
    pub badge_enabled: bool,
}

impl LearningPlan {
    pub fn new(id: impl Into<String>, course_ids: Vec<String>) -> Self {
        Self {
            id: id.into(),
            course_ids,
            ..Default::default()
        }
    }

    pub fn with_awards(mut self, certificate: bool, badge: bool) -> Self {
        self.certificate_enabled = certificate;
        self.badge_enabled = badge;
        self
    }

    pub fn awards(&self) -> AwardFlags {
        AwardFlags {
            certificate: self.certificate_enabled,
            badge: self.badge_enabled,
        }
    }
}

/// Certificate/badge switches of a course or plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AwardFlags {
    pub certificate: bool,
    pub badge: bool,
}

impl AwardFlags {
    pub fn any(&self) -> bool {
        self.certificate || self.badge
    }
}
