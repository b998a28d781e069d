//! Domain model for progress tracking.
//!
//! - **catalog**: content items, courses and learning plans (read-only here)
//! - **assessment**: tests, questions, attempts and graded answers
//! - **progress**: video and document progress rows
//! - **completion**: completion records and enrollments
//! - **events**: the content → course → plan cascade events

pub mod assessment;
pub mod catalog;
pub mod completion;
pub mod events;
pub mod progress;

pub use assessment::{
    Question, QuestionOption, QuestionType, SubmittedAnswer, Test, TestAnswer, TestAttempt,
};
pub use catalog::{
    AwardFlags, ContentItem, ContentType, Course, LearningPlan, DEFAULT_COMPLETION_THRESHOLD,
};
pub use completion::{
    Completion, CompletionLevel, CompletionWrite, Enrollment, EnrollmentStatus, EnrollmentTarget,
};
pub use events::{CompletionEvent, ContentCompletedEvent, CourseCompletedEvent};
pub use progress::{
    ContentProgress, ContentProgressReport, ProgressWrite, VideoProgress, VideoProgressReport,
};
