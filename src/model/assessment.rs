//! Tests, question banks, attempts and graded answers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A test attached 1:1 to a TEST content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    pub id: String,
    pub content_item_id: String,
    /// Fraction in [0, 1] required to pass.
    pub passing_score: f64,
    /// `None` means unlimited attempts.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Minutes; informational.
    #[serde(default)]
    pub time_limit: Option<u32>,
    #[serde(default)]
    pub show_correct_answers: bool,
}

impl Test {
    pub fn new(id: impl Into<String>, content_item_id: impl Into<String>, passing_score: f64) -> Self {
        Self {
            id: id.into(),
            content_item_id: content_item_id.into(),
            passing_score,
            max_attempts: None,
            time_limit: None,
            show_correct_answers: false,
        }
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    /// Attempts left after `used` submissions, `None` when unlimited.
    pub fn remaining_attempts(&self, used: u32) -> Option<u32> {
        self.max_attempts.map(|max| max.saturating_sub(used))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    FillBlank,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "SINGLE_CHOICE",
            QuestionType::MultipleChoice => "MULTIPLE_CHOICE",
            QuestionType::TrueFalse => "TRUE_FALSE",
            QuestionType::ShortAnswer => "SHORT_ANSWER",
            QuestionType::FillBlank => "FILL_BLANK",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SINGLE_CHOICE" => Ok(QuestionType::SingleChoice),
            "MULTIPLE_CHOICE" => Ok(QuestionType::MultipleChoice),
            "TRUE_FALSE" => Ok(QuestionType::TrueFalse),
            "SHORT_ANSWER" => Ok(QuestionType::ShortAnswer),
            "FILL_BLANK" => Ok(QuestionType::FillBlank),
            other => Err(format!("unknown question type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

impl QuestionOption {
    pub fn new(text: impl Into<String>, is_correct: bool) -> Self {
        Self {
            text: text.into(),
            is_correct,
        }
    }
}

/// A question of a test; which answer fields matter depends on `question_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub test_id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub prompt: String,
    pub points: u32,
    #[serde(default)]
    pub position: u32,
    /// Choice questions only, in display order.
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    /// TRUE_FALSE only.
    #[serde(default)]
    pub correct_boolean: Option<bool>,
    /// SHORT_ANSWER / FILL_BLANK only.
    #[serde(default)]
    pub acceptable_answers: Vec<String>,
}

impl Question {
    fn base(id: &str, test_id: &str, question_type: QuestionType, points: u32) -> Self {
        Self {
            id: id.to_string(),
            test_id: test_id.to_string(),
            question_type,
            prompt: String::new(),
            points,
            position: 0,
            options: Vec::new(),
            correct_boolean: None,
            acceptable_answers: Vec::new(),
        }
    }

    pub fn single_choice(id: &str, test_id: &str, points: u32, options: Vec<QuestionOption>) -> Self {
        Self {
            options,
            ..Self::base(id, test_id, QuestionType::SingleChoice, points)
        }
    }

    pub fn multiple_choice(
        id: &str,
        test_id: &str,
        points: u32,
        options: Vec<QuestionOption>,
    ) -> Self {
        Self {
            options,
            ..Self::base(id, test_id, QuestionType::MultipleChoice, points)
        }
    }

    pub fn true_false(id: &str, test_id: &str, points: u32, correct: bool) -> Self {
        Self {
            correct_boolean: Some(correct),
            ..Self::base(id, test_id, QuestionType::TrueFalse, points)
        }
    }

    pub fn text(
        id: &str,
        test_id: &str,
        question_type: QuestionType,
        points: u32,
        acceptable: &[&str],
    ) -> Self {
        Self {
            acceptable_answers: acceptable.iter().map(|s| s.to_string()).collect(),
            ..Self::base(id, test_id, question_type, points)
        }
    }

    /// Indices of the options flagged correct, ascending.
    pub fn correct_option_indices(&self) -> Vec<u32> {
        self.options
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_correct)
            .map(|(i, _)| i as u32)
            .collect()
    }
}

/// One answer as submitted by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: String,
    #[serde(default)]
    pub answer_text: Option<String>,
    #[serde(default)]
    pub selected_options: Option<Vec<u32>>,
}

impl SubmittedAnswer {
    pub fn text(question_id: &str, answer: &str) -> Self {
        Self {
            question_id: question_id.to_string(),
            answer_text: Some(answer.to_string()),
            selected_options: None,
        }
    }

    pub fn options(question_id: &str, selected: &[u32]) -> Self {
        Self {
            question_id: question_id.to_string(),
            answer_text: None,
            selected_options: Some(selected.to_vec()),
        }
    }
}

/// A persisted, immutable test submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAttempt {
    pub id: String,
    pub test_id: String,
    pub user_id: String,
    pub attempt_number: u32,
    pub score: f64,
    pub points_earned: u32,
    pub total_points: u32,
    pub passed: bool,
    pub time_spent: u32,
    pub submitted_at: DateTime<Utc>,
}

/// The graded outcome of one question inside an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAnswer {
    pub attempt_id: String,
    pub question_id: String,
    pub answer_text: Option<String>,
    pub selected_options: Option<Vec<u32>>,
    pub is_correct: bool,
    pub points_earned: u32,
}
