use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::EngineError;
use crate::model::{Enrollment, EnrollmentStatus, EnrollmentTarget};
use crate::storage::Database;

/// Manages enrollment state transitions.
///
/// Progress only ever moves an enrollment forward; approval and dropping
/// belong to the enrollment flow but are modelled so every writer agrees on
/// what is legal.
pub struct EnrollmentLifecycle {
    valid_transitions: HashMap<EnrollmentStatus, Vec<EnrollmentStatus>>,
}

impl EnrollmentLifecycle {
    /// Create a lifecycle with the standard transition rules.
    ///
    /// Valid transitions:
    /// - PendingApproval -> Enrolled (approved)
    /// - PendingApproval -> Dropped (rejected)
    /// - Enrolled -> InProgress (first progress report or submission)
    /// - Enrolled -> Completed (course finished without a prior report, e.g. recompute)
    /// - Enrolled -> Dropped
    /// - InProgress -> Completed
    /// - InProgress -> Dropped
    /// - Dropped -> Enrolled (re-enrolled)
    pub fn new() -> Self {
        let mut valid_transitions = HashMap::new();

        valid_transitions.insert(
            EnrollmentStatus::PendingApproval,
            vec![EnrollmentStatus::Enrolled, EnrollmentStatus::Dropped],
        );

        valid_transitions.insert(
            EnrollmentStatus::Enrolled,
            vec![
                EnrollmentStatus::InProgress,
                EnrollmentStatus::Completed,
                EnrollmentStatus::Dropped,
            ],
        );

        valid_transitions.insert(
            EnrollmentStatus::InProgress,
            vec![EnrollmentStatus::Completed, EnrollmentStatus::Dropped],
        );

        valid_transitions.insert(EnrollmentStatus::Completed, vec![]);

        valid_transitions.insert(EnrollmentStatus::Dropped, vec![EnrollmentStatus::Enrolled]);

        Self { valid_transitions }
    }

    /// Check if a transition between two statuses is allowed.
    pub fn can_transition(&self, from: EnrollmentStatus, to: EnrollmentStatus) -> bool {
        self.valid_transitions
            .get(&from)
            .map(|targets| targets.contains(&to))
            .unwrap_or(false)
    }

    /// Statuses that may move to `to`, in a stable order.
    pub fn sources_for(&self, to: EnrollmentStatus) -> Vec<EnrollmentStatus> {
        let mut sources: Vec<EnrollmentStatus> = self
            .valid_transitions
            .iter()
            .filter(|(_, targets)| targets.contains(&to))
            .map(|(from, _)| *from)
            .collect();
        sources.sort_by_key(|s| s.as_str());
        sources
    }

    /// Apply a transition to an in-memory enrollment.
    ///
    /// # Errors
    /// Returns `BadRequest` when the transition is not allowed.
    pub fn transition(
        &self,
        enrollment: &mut Enrollment,
        new_status: EnrollmentStatus,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let current = enrollment.status;
        if !self.can_transition(current, new_status) {
            return Err(EngineError::BadRequest(format!(
                "Enrollment {} cannot move from {} to {}",
                enrollment.id, current, new_status
            )));
        }

        enrollment.status = new_status;
        if new_status == EnrollmentStatus::Completed {
            enrollment.completed_at.get_or_insert(at);
        }
        Ok(())
    }

    /// Advance a stored enrollment if its current status allows it.
    ///
    /// Missing enrollments and disallowed transitions are silently skipped.
    pub async fn advance(
        &self,
        db: &Database,
        user_id: &str,
        target: &EnrollmentTarget,
        to: EnrollmentStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let from = self.sources_for(to);
        Ok(db.advance_enrollment(user_id, target, &from, to, at).await?)
    }
}

impl Default for EnrollmentLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrollment(status: EnrollmentStatus) -> Enrollment {
        Enrollment {
            id: "e1".to_string(),
            user_id: "u1".to_string(),
            target: EnrollmentTarget::Course("c1".to_string()),
            status,
            enrolled_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn test_valid_transitions() {
        let lifecycle = EnrollmentLifecycle::new();

        assert!(lifecycle.can_transition(EnrollmentStatus::Enrolled, EnrollmentStatus::InProgress));
        assert!(lifecycle.can_transition(EnrollmentStatus::InProgress, EnrollmentStatus::Completed));
        assert!(!lifecycle.can_transition(EnrollmentStatus::InProgress, EnrollmentStatus::Enrolled));

        // Pending enrollments cannot make progress.
        assert!(!lifecycle.can_transition(
            EnrollmentStatus::PendingApproval,
            EnrollmentStatus::InProgress
        ));

        // Completed is terminal.
        assert!(!lifecycle.can_transition(EnrollmentStatus::Completed, EnrollmentStatus::InProgress));
        assert!(!lifecycle.can_transition(EnrollmentStatus::Completed, EnrollmentStatus::Dropped));
    }

    #[test]
    fn test_sources_for_completed() {
        let lifecycle = EnrollmentLifecycle::new();
        assert_eq!(
            lifecycle.sources_for(EnrollmentStatus::Completed),
            vec![EnrollmentStatus::Enrolled, EnrollmentStatus::InProgress]
        );
        assert_eq!(
            lifecycle.sources_for(EnrollmentStatus::InProgress),
            vec![EnrollmentStatus::Enrolled]
        );
    }

    #[test]
    fn test_transition_sets_completed_at_once() {
        let lifecycle = EnrollmentLifecycle::new();
        let mut e = enrollment(EnrollmentStatus::InProgress);
        let at = Utc::now();

        lifecycle.transition(&mut e, EnrollmentStatus::Completed, at).unwrap();
        assert_eq!(e.status, EnrollmentStatus::Completed);
        assert_eq!(e.completed_at, Some(at));

        let err = lifecycle
            .transition(&mut e, EnrollmentStatus::InProgress, at)
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::BadRequest);
    }

    #[tokio::test]
    async fn test_advance_respects_rules() {
        let db = Database::open_in_memory().await.unwrap();
        let lifecycle = EnrollmentLifecycle::new();
        let target = EnrollmentTarget::Course("c1".to_string());
        db.upsert_enrollment("u1", &target, EnrollmentStatus::PendingApproval, Utc::now())
            .await
            .unwrap();

        let moved = lifecycle
            .advance(&db, "u1", &target, EnrollmentStatus::InProgress, Utc::now())
            .await
            .unwrap();
        assert!(!moved);
    }
}
