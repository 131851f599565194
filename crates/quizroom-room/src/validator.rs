//! Input validation for submissions and authored questions.

use std::collections::BTreeSet;

use quizroom_protocol::{AnswerIndex, NewQuestion};

use crate::{QuizConfig, ValidationError};

/// Checks client-supplied values against the deployment's answer set.
///
/// Stateless apart from the allowed set. Runs before anything reaches a
/// room, so a rejected value never touches room state.
#[derive(Debug, Clone)]
pub struct SubmissionValidator {
    allowed: BTreeSet<AnswerIndex>,
}

impl SubmissionValidator {
    pub fn new(config: &QuizConfig) -> Self {
        Self {
            allowed: config.allowed_answers.iter().copied().collect(),
        }
    }

    /// Accepts `raw` iff it is one of the allowed answer indices.
    pub fn validate_answer(&self, raw: i64) -> Result<AnswerIndex, ValidationError> {
        u8::try_from(raw)
            .ok()
            .map(AnswerIndex)
            .filter(|idx| self.allowed.contains(idx))
            .ok_or(ValidationError::AnswerOutOfRange(raw))
    }

    /// Checks an operator-authored question.
    ///
    /// The title must be non-empty, there must be at least two options,
    /// option ids must be allowed and distinct, and the correct answer must
    /// be one of the options.
    pub fn validate_question(&self, question: &NewQuestion) -> Result<(), ValidationError> {
        if question.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if question.options.len() < 2 {
            return Err(ValidationError::TooFewOptions(question.options.len()));
        }

        let mut seen = BTreeSet::new();
        for option in &question.options {
            if !self.allowed.contains(&option.id) {
                return Err(ValidationError::OptionOutOfRange(option.id));
            }
            if !seen.insert(option.id) {
                return Err(ValidationError::DuplicateOption(option.id));
            }
        }

        if !seen.contains(&question.answer) {
            return Err(ValidationError::AnswerNotAnOption(question.answer));
        }
        Ok(())
    }

    /// The allowed indices, ascending.
    pub fn allowed(&self) -> impl Iterator<Item = AnswerIndex> + '_ {
        self.allowed.iter().copied()
    }
}

impl Default for SubmissionValidator {
    fn default() -> Self {
        Self::new(&QuizConfig::default())
    }
}
