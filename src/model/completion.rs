//! Completion records and enrollments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which unit a completion row stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionLevel {
    Content,
    Course,
    Plan,
}

impl CompletionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionLevel::Content => "content",
            CompletionLevel::Course => "course",
            CompletionLevel::Plan => "plan",
        }
    }
}

/// The canonical "this unit is done" record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub id: String,
    pub user_id: String,
    pub course_id: Option<String>,
    pub content_item_id: Option<String>,
    pub learning_plan_id: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub certificate_url: Option<String>,
    pub certificate_generated_at: Option<DateTime<Utc>>,
    pub badge_awarded: bool,
    pub badge_awarded_at: Option<DateTime<Utc>>,
}

impl Completion {
    pub fn level(&self) -> CompletionLevel {
        if self.learning_plan_id.is_some() {
            CompletionLevel::Plan
        } else if self.content_item_id.is_some() {
            CompletionLevel::Content
        } else {
            CompletionLevel::Course
        }
    }
}

/// A completion row together with whether the write created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionWrite {
    pub completion: Completion,
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Enrolled,
    PendingApproval,
    InProgress,
    Completed,
    Dropped,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Enrolled => "ENROLLED",
            EnrollmentStatus::PendingApproval => "PENDING_APPROVAL",
            EnrollmentStatus::InProgress => "IN_PROGRESS",
            EnrollmentStatus::Completed => "COMPLETED",
            EnrollmentStatus::Dropped => "DROPPED",
        }
    }

    /// Whether an enrollment in this state grants access to the target.
    pub fn grants_access(&self) -> bool {
        matches!(
            self,
            EnrollmentStatus::Enrolled | EnrollmentStatus::InProgress | EnrollmentStatus::Completed
        )
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrollmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENROLLED" => Ok(EnrollmentStatus::Enrolled),
            "PENDING_APPROVAL" => Ok(EnrollmentStatus::PendingApproval),
            "IN_PROGRESS" => Ok(EnrollmentStatus::InProgress),
            "COMPLETED" => Ok(EnrollmentStatus::Completed),
            "DROPPED" => Ok(EnrollmentStatus::Dropped),
            other => Err(format!("unknown enrollment status '{}'", other)),
        }
    }
}

/// What an enrollment points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum EnrollmentTarget {
    Course(String),
    LearningPlan(String),
}

impl EnrollmentTarget {
    pub fn course_id(&self) -> Option<&str> {
        match self {
            EnrollmentTarget::Course(id) => Some(id),
            EnrollmentTarget::LearningPlan(_) => None,
        }
    }

    pub fn plan_id(&self) -> Option<&str> {
        match self {
            EnrollmentTarget::LearningPlan(id) => Some(id),
            EnrollmentTarget::Course(_) => None,
        }
    }
}

impl fmt::Display for EnrollmentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrollmentTarget::Course(id) => write!(f, "course:{}", id),
            EnrollmentTarget::LearningPlan(id) => write!(f, "plan:{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub user_id: String,
    pub target: EnrollmentTarget,
    pub status: EnrollmentStatus,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
