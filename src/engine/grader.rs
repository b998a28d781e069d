//! Deterministic test grading.
//!
//! Grading is a pure function of the test, its question bank and the
//! submitted answers. Nothing here touches storage; the graded answers are
//! persisted as-is by [`TestSubmissions`](super::submissions::TestSubmissions)
//! and never re-graded.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use crate::model::{Question, QuestionType, SubmittedAnswer, Test, TestAnswer};

/// Outcome of grading one submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedAttempt {
    /// One entry per question of the test, in question order.
    pub answers: Vec<TestAnswer>,
    pub points_earned: u32,
    pub total_points: u32,
    /// `points_earned / total_points`, 0 when the test has no points.
    pub score: f64,
    pub passed: bool,
}

/// Grades `submitted` against `questions`.
///
/// Answers naming unknown questions are ignored. When a question is answered
/// more than once, the first answer counts. Unanswered questions earn zero.
/// The returned answers carry an empty `attempt_id`; storage assigns it.
pub fn grade_attempt(test: &Test, questions: &[Question], submitted: &[SubmittedAnswer]) -> GradedAttempt {
    let mut by_question: HashMap<&str, &SubmittedAnswer> = HashMap::new();
    for answer in submitted {
        by_question.entry(answer.question_id.as_str()).or_insert(answer);
    }

    let mut answers = Vec::with_capacity(questions.len());
    let mut points_earned = 0u32;
    let mut total_points = 0u32;

    for question in questions {
        total_points = total_points.saturating_add(question.points);
        let answer = by_question.get(question.id.as_str()).copied();
        let is_correct = answer.is_some_and(|a| is_correct(question, a));
        let earned = if is_correct { question.points } else { 0 };
        points_earned = points_earned.saturating_add(earned);

        answers.push(TestAnswer {
            attempt_id: String::new(),
            question_id: question.id.clone(),
            answer_text: answer.and_then(|a| a.answer_text.clone()),
            selected_options: answer.and_then(|a| a.selected_options.clone()),
            is_correct,
            points_earned: earned,
        });
    }

    let score = if total_points == 0 {
        0.0
    } else {
        f64::from(points_earned) / f64::from(total_points)
    };

    GradedAttempt {
        answers,
        points_earned,
        total_points,
        score,
        passed: score >= test.passing_score,
    }
}

/// Whether one submitted answer satisfies a question.
pub fn is_correct(question: &Question, answer: &SubmittedAnswer) -> bool {
    match question.question_type {
        QuestionType::SingleChoice => grade_single_choice(question, answer),
        QuestionType::MultipleChoice => grade_multiple_choice(question, answer),
        QuestionType::TrueFalse => grade_true_false(question, answer),
        QuestionType::ShortAnswer | QuestionType::FillBlank => grade_text(question, answer),
    }
}

fn grade_single_choice(question: &Question, answer: &SubmittedAnswer) -> bool {
    // No option flagged correct means the question cannot be answered correctly.
    let Some(correct) = question.options.iter().position(|o| o.is_correct) else {
        return false;
    };

    let selected = match answer.selected_options.as_deref() {
        Some([index]) => Some(*index),
        Some(_) => None,
        None => answer
            .answer_text
            .as_deref()
            .and_then(|text| text.trim().parse::<u32>().ok()),
    };
    selected.is_some_and(|index| index as usize == correct)
}

fn grade_multiple_choice(question: &Question, answer: &SubmittedAnswer) -> bool {
    let correct: BTreeSet<u32> = question.correct_option_indices().into_iter().collect();
    let selected: BTreeSet<u32> = answer
        .selected_options
        .as_deref()
        .unwrap_or_default()
        .iter()
        .copied()
        .collect();
    // An empty selection never matches, even against an empty key.
    !selected.is_empty() && selected == correct
}

fn grade_true_false(question: &Question, answer: &SubmittedAnswer) -> bool {
    match (question.correct_boolean, answer.answer_text.as_deref().and_then(parse_bool)) {
        (Some(expected), Some(given)) => expected == given,
        _ => false,
    }
}

fn grade_text(question: &Question, answer: &SubmittedAnswer) -> bool {
    let Some(given) = answer.answer_text.as_deref() else {
        return false;
    };
    let given = normalize(given);
    question
        .acceptable_answers
        .iter()
        .any(|accepted| normalize(accepted) == given)
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Boolean coercion of a free-text answer.
fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "1" => Some(true),
        "false" | "f" | "no" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionOption;

    fn options(correct: &[usize], count: usize) -> Vec<QuestionOption> {
        (0..count)
            .map(|i| QuestionOption::new(format!("option {}", i), correct.contains(&i)))
            .collect()
    }

    #[test]
    fn test_multiple_choice_is_order_independent() {
        let q = Question::multiple_choice("q1", "t1", 2, options(&[0, 2], 4));
        assert!(is_correct(&q, &SubmittedAnswer::options("q1", &[2, 0])));
        assert!(!is_correct(&q, &SubmittedAnswer::options("q1", &[0, 1])));
        assert!(!is_correct(&q, &SubmittedAnswer::options("q1", &[0])));
        assert!(!is_correct(&q, &SubmittedAnswer::options("q1", &[])));
    }

    #[test]
    fn test_single_choice() {
        let q = Question::single_choice("q1", "t1", 1, options(&[1], 3));
        assert!(is_correct(&q, &SubmittedAnswer::options("q1", &[1])));
        assert!(is_correct(&q, &SubmittedAnswer::text("q1", " 1 ")));
        assert!(!is_correct(&q, &SubmittedAnswer::options("q1", &[0])));
        assert!(!is_correct(&q, &SubmittedAnswer::options("q1", &[1, 2])));

        let unanswerable = Question::single_choice("q2", "t1", 1, options(&[], 3));
        assert!(!is_correct(&unanswerable, &SubmittedAnswer::options("q2", &[0])));
    }

    #[test]
    fn test_true_false_coerces_text() {
        let q = Question::true_false("q1", "t1", 1, true);
        for accepted in ["true", "TRUE", " yes ", "1", "t"] {
            assert!(is_correct(&q, &SubmittedAnswer::text("q1", accepted)), "{}", accepted);
        }
        assert!(!is_correct(&q, &SubmittedAnswer::text("q1", "false")));
        assert!(!is_correct(&q, &SubmittedAnswer::text("q1", "maybe")));
    }

    #[test]
    fn test_text_answers_fold_case_and_trim() {
        let q = Question::text("q1", "t1", QuestionType::ShortAnswer, 1, &["Ferris", "the crab"]);
        assert!(is_correct(&q, &SubmittedAnswer::text("q1", "  ferris ")));
        assert!(is_correct(&q, &SubmittedAnswer::text("q1", "THE CRAB")));
        assert!(!is_correct(&q, &SubmittedAnswer::text("q1", "ferris the crab")));

        let blank = Question::text("q2", "t1", QuestionType::FillBlank, 1, &["borrow"]);
        assert!(!is_correct(&blank, &SubmittedAnswer::options("q2", &[0])));
    }

    #[test]
    fn test_grade_attempt_scores_and_passes() {
        let test = Test::new("t1", "item", 0.7);
        let questions = vec![
            Question::true_false("q1", "t1", 1, false),
            Question::multiple_choice("q2", "t1", 3, options(&[0, 2], 3)),
            Question::text("q3", "t1", QuestionType::FillBlank, 1, &["ok"]),
        ];
        let submitted = vec![
            SubmittedAnswer::text("q1", "false"),
            SubmittedAnswer::options("q2", &[2, 0]),
            SubmittedAnswer::text("unknown", "x"),
        ];

        let graded = grade_attempt(&test, &questions, &submitted);
        assert_eq!(graded.total_points, 5);
        assert_eq!(graded.points_earned, 4);
        assert!((graded.score - 0.8).abs() < 1e-9);
        assert!(graded.passed);
        assert_eq!(graded.answers.len(), 3);
        assert!(!graded.answers[2].is_correct);
        assert_eq!(graded.answers[2].points_earned, 0);
        assert!(graded.answers[2].answer_text.is_none());
    }

    #[test]
    fn test_first_duplicate_answer_wins() {
        let test = Test::new("t1", "item", 1.0);
        let questions = vec![Question::true_false("q1", "t1", 1, true)];
        let submitted = vec![SubmittedAnswer::text("q1", "no"), SubmittedAnswer::text("q1", "yes")];
        assert!(!grade_attempt(&test, &questions, &submitted).passed);
    }

    #[test]
    fn test_zero_points_scores_zero() {
        let test = Test::new("t1", "item", 0.0);
        let graded = grade_attempt(&test, &[], &[]);
        assert_eq!(graded.score, 0.0);
        assert!(graded.passed);
    }
}
