//! crates/quizicist_core/src/domain.rs
//!
//! Defines the pure, core data structures for the quiz client.
//! These structs are independent of the wire format; the HTTP adapter owns
//! the serialized records and converts them into these types.

/// Server-assigned identifier of a generation.
pub type GenerationId = i64;
/// Server-assigned identifier of a question. Negative values are local placeholders.
pub type QuestionId = i64;
/// Server-assigned identifier of an answer choice.
pub type AnswerId = i64;

/// The reviewer's verdict on an answer choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FeedbackState {
    #[default]
    Unselected,
    Correct,
    Incorrect,
}

impl FeedbackState {
    /// Computes the state after a reviewer clicks `requested`.
    ///
    /// Clicking the active value clears it; clicking a different value switches to it.
    pub fn toggled(self, requested: FeedbackState) -> FeedbackState {
        if requested == self {
            FeedbackState::Unselected
        } else {
            requested
        }
    }

    /// The integer code used by the backend.
    pub fn code(self) -> u8 {
        match self {
            FeedbackState::Unselected => 0,
            FeedbackState::Correct => 1,
            FeedbackState::Incorrect => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(FeedbackState::Unselected),
            1 => Some(FeedbackState::Correct),
            2 => Some(FeedbackState::Incorrect),
            _ => None,
        }
    }
}

/// One uploaded content-to-quiz job and its resulting question set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub id: GenerationId,
    pub filename: String,
    pub unique_filename: Option<String>,
    pub questions: Vec<Question>,
}

/// A generated (or custom) multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: QuestionId,
    pub question: String,
    /// The text as first generated, kept for the reviewer diff.
    pub original_question: String,
    pub is_custom_question: bool,
    pub position: u32,
    pub shard: u32,
    pub deleted: bool,
    pub answers: Vec<AnswerChoice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerChoice {
    pub id: AnswerId,
    pub text: String,
    pub original_text: String,
    pub position: u32,
    pub predicted_feedback: Option<FeedbackState>,
    pub user_feedback: FeedbackState,
    pub deleted: bool,
}

impl Generation {
    pub fn question(&self, question_id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn question_mut(&mut self, question_id: QuestionId) -> Option<&mut Question> {
        self.questions.iter_mut().find(|q| q.id == question_id)
    }

    /// Questions that are not tombstoned, in display order.
    pub fn visible_questions(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter().filter(|q| !q.deleted)
    }
}

impl Question {
    pub fn answer(&self, answer_id: AnswerId) -> Option<&AnswerChoice> {
        self.answers.iter().find(|a| a.id == answer_id)
    }

    pub fn answer_mut(&mut self, answer_id: AnswerId) -> Option<&mut AnswerChoice> {
        self.answers.iter_mut().find(|a| a.id == answer_id)
    }

    pub fn visible_answers(&self) -> impl Iterator<Item = &AnswerChoice> {
        self.answers.iter().filter(|a| !a.deleted)
    }
}
