//! crates/quizicist_core/src/mutation.rs
//!
//! The closed set of writes the client can perform against the backend.
//!
//! Each variant knows which cache entry it targets, which endpoint it posts to,
//! what body it sends and how to predict its own outcome.

use std::fmt;

use crate::domain::{AnswerId, FeedbackState, GenerationId, QuestionId};
use crate::optimistic::{current_feedback, OptimisticPatch};
use crate::ports::{ApiError, ApiResult};
use crate::resource::{CacheKey, Resource};

pub const MAX_UPLOAD_QUESTIONS: u32 = 15;
pub const MAX_MORE_QUESTIONS: u32 = 10;
pub const DEFAULT_MORE_ANSWERS: u32 = 4;

/// How uploaded content should be parsed by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Markdown,
    Text,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Markdown => "Markdown",
            ContentType::Text => "Text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub title: String,
    pub content: String,
    pub content_type: ContentType,
    pub count: u32,
}

/// A distractor supplied when editing a question. Locked ones survive a reroll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distractor {
    pub text: String,
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionEdit {
    pub question: String,
    pub correct_answer: Option<String>,
    pub distractors: Vec<Distractor>,
}

//=========================================================================================
// Mutations
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreateGeneration(Upload),
    DeleteGeneration {
        generation_id: GenerationId,
    },
    RenameGeneration {
        generation_id: GenerationId,
        filename: String,
    },
    AddQuestions {
        generation_id: GenerationId,
        count: u32,
    },
    CustomQuestion {
        generation_id: GenerationId,
        question: String,
        correct_answer: String,
    },
    UpdateQuestion {
        generation_id: GenerationId,
        question_id: QuestionId,
        edit: QuestionEdit,
    },
    RerollQuestion {
        generation_id: GenerationId,
        question_id: QuestionId,
    },
    DeleteQuestion {
        generation_id: GenerationId,
        question_id: QuestionId,
    },
    AddAnswers {
        generation_id: GenerationId,
        question_id: QuestionId,
        answers: u32,
    },
    DeleteAnswer {
        generation_id: GenerationId,
        question_id: QuestionId,
        answer_id: AnswerId,
    },
    SetFeedback {
        generation_id: GenerationId,
        question_id: QuestionId,
        answer_id: AnswerId,
        requested: FeedbackState,
    },
}

/// The typed body of a mutation request, one shape per endpoint family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationBody {
    Empty,
    Upload(Upload),
    Rename { filename: String },
    Count { count: u32 },
    CustomQuestion { question: String, correct_answer: String },
    QuestionEdit(QuestionEdit),
    Answers { answers: u32 },
    Feedback { answer: AnswerId, value: FeedbackState },
}

/// What goes on the wire for one mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRequest {
    pub target: CacheKey,
    pub path: String,
    pub body: MutationBody,
}

/// The backend's acknowledgement of a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MutationAck {
    pub message: Option<String>,
    /// A new canonical value for the target key, when the backend returned one.
    pub canonical: Option<Resource>,
}

/// Cache maintenance owed to entries other than the mutation's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Followup {
    Evict(CacheKey),
    RefreshIfCached(CacheKey),
}

/// A mutation resolved against the cached value at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedMutation {
    pub request: MutationRequest,
    pub patch: Option<OptimisticPatch>,
}

impl Mutation {
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::CreateGeneration(_) => "create_generation",
            Mutation::DeleteGeneration { .. } => "delete_generation",
            Mutation::RenameGeneration { .. } => "rename_generation",
            Mutation::AddQuestions { .. } => "add_questions",
            Mutation::CustomQuestion { .. } => "custom_question",
            Mutation::UpdateQuestion { .. } => "update_question",
            Mutation::RerollQuestion { .. } => "reroll_question",
            Mutation::DeleteQuestion { .. } => "delete_question",
            Mutation::AddAnswers { .. } => "add_answers",
            Mutation::DeleteAnswer { .. } => "delete_answer",
            Mutation::SetFeedback { .. } => "set_feedback",
        }
    }

    /// The cache entry this mutation writes through.
    pub fn target(&self) -> CacheKey {
        match self {
            Mutation::CreateGeneration(_) | Mutation::DeleteGeneration { .. } => {
                CacheKey::AllGenerations
            }
            Mutation::RenameGeneration { generation_id, .. }
            | Mutation::AddQuestions { generation_id, .. }
            | Mutation::CustomQuestion { generation_id, .. }
            | Mutation::UpdateQuestion { generation_id, .. }
            | Mutation::RerollQuestion { generation_id, .. }
            | Mutation::DeleteQuestion { generation_id, .. }
            | Mutation::AddAnswers { generation_id, .. }
            | Mutation::DeleteAnswer { generation_id, .. }
            | Mutation::SetFeedback { generation_id, .. } => CacheKey::Generation(*generation_id),
        }
    }

    /// The backend path this mutation posts to.
    pub fn path(&self) -> String {
        match self {
            Mutation::CreateGeneration(_) => "/api/upload".to_string(),
            Mutation::DeleteGeneration { generation_id } => {
                format!("/api/generated/{}/delete", generation_id)
            }
            Mutation::RenameGeneration { generation_id, .. } => {
                format!("/api/generated/{}/update", generation_id)
            }
            Mutation::AddQuestions { generation_id, .. } => {
                format!("/api/generated/{}/more", generation_id)
            }
            Mutation::CustomQuestion { generation_id, .. } => {
                format!("/api/generated/{}/new", generation_id)
            }
            Mutation::UpdateQuestion { question_id, .. } => {
                format!("/api/question/{}/update", question_id)
            }
            Mutation::RerollQuestion { question_id, .. } => {
                format!("/api/question/{}/reroll", question_id)
            }
            Mutation::DeleteQuestion { question_id, .. } => {
                format!("/api/question/{}/delete", question_id)
            }
            Mutation::AddAnswers { question_id, .. } => {
                format!("/api/question/{}/more", question_id)
            }
            Mutation::DeleteAnswer {
                question_id,
                answer_id,
                ..
            } => format!("/api/question/{}/{}/delete", question_id, answer_id),
            Mutation::SetFeedback { question_id, .. } => {
                format!("/api/question/{}/feedback", question_id)
            }
        }
    }

    /// Rejects requests the backend is known to refuse, before anything is sent.
    pub fn validate(&self) -> ApiResult<()> {
        self.check_ids()?;
        match self {
            Mutation::CreateGeneration(upload) => {
                if upload.title.trim().is_empty() {
                    return Err(ApiError::invalid("Title is a required field"));
                }
                if upload.content.trim().is_empty() {
                    return Err(ApiError::invalid("Content is a required field"));
                }
                check_count(upload.count, MAX_UPLOAD_QUESTIONS)
            }
            Mutation::RenameGeneration { filename, .. } if filename.trim().is_empty() => {
                Err(ApiError::invalid("Name must not be empty"))
            }
            Mutation::AddQuestions { count, .. } => check_count(*count, MAX_MORE_QUESTIONS),
            Mutation::CustomQuestion {
                question,
                correct_answer,
                ..
            } => {
                if question.trim().is_empty() {
                    return Err(ApiError::invalid("Question is a required field"));
                }
                if correct_answer.trim().is_empty() {
                    return Err(ApiError::invalid("Correct answer is a required field"));
                }
                Ok(())
            }
            Mutation::UpdateQuestion { edit, .. } if edit.question.trim().is_empty() => {
                Err(ApiError::invalid("Question is a required field"))
            }
            Mutation::AddAnswers { answers: 0, .. } => {
                Err(ApiError::invalid("At least one answer must be requested"))
            }
            _ => Ok(()),
        }
    }

    /// Placeholder ids exist only in the cache and are never sent.
    fn check_ids(&self) -> ApiResult<()> {
        let (question_id, answer_id) = match self {
            Mutation::UpdateQuestion { question_id, .. }
            | Mutation::RerollQuestion { question_id, .. }
            | Mutation::DeleteQuestion { question_id, .. }
            | Mutation::AddAnswers { question_id, .. } => (Some(*question_id), None),
            Mutation::DeleteAnswer {
                question_id,
                answer_id,
                ..
            }
            | Mutation::SetFeedback {
                question_id,
                answer_id,
                ..
            } => (Some(*question_id), Some(*answer_id)),
            _ => (None, None),
        };
        if question_id.is_some_and(|id| id <= 0) {
            return Err(ApiError::invalid("This question has not been saved yet"));
        }
        if answer_id.is_some_and(|id| id <= 0) {
            return Err(ApiError::invalid("This answer has not been saved yet"));
        }
        Ok(())
    }

    /// Resolves the request body and optimistic patch against the cached value.
    ///
    /// `seq` is the per-key sequence number the patch will be recorded under;
    /// it seeds placeholder ids for entities the backend has not created yet.
    pub fn prepare(&self, current: Option<&Resource>, seq: u64) -> PreparedMutation {
        let (body, patch) = match self {
            Mutation::CreateGeneration(upload) => (MutationBody::Upload(upload.clone()), None),
            Mutation::DeleteGeneration { generation_id } => (
                MutationBody::Empty,
                Some(OptimisticPatch::RemoveGeneration {
                    generation_id: *generation_id,
                }),
            ),
            Mutation::RenameGeneration { filename, .. } => (
                MutationBody::Rename {
                    filename: filename.clone(),
                },
                Some(OptimisticPatch::Rename {
                    filename: filename.clone(),
                }),
            ),
            Mutation::AddQuestions { count, .. } => (MutationBody::Count { count: *count }, None),
            Mutation::CustomQuestion {
                question,
                correct_answer,
                ..
            } => (
                MutationBody::CustomQuestion {
                    question: question.clone(),
                    correct_answer: correct_answer.clone(),
                },
                Some(OptimisticPatch::AppendCustomQuestion {
                    placeholder_id: placeholder_id(seq),
                    question: question.clone(),
                    correct_answer: correct_answer.clone(),
                }),
            ),
            Mutation::UpdateQuestion {
                question_id, edit, ..
            } => (
                MutationBody::QuestionEdit(edit.clone()),
                Some(OptimisticPatch::ReplaceQuestionText {
                    question_id: *question_id,
                    text: edit.question.clone(),
                }),
            ),
            Mutation::RerollQuestion { .. } => (MutationBody::Empty, None),
            Mutation::DeleteQuestion { question_id, .. } => (
                MutationBody::Empty,
                Some(OptimisticPatch::MarkQuestionDeleted {
                    question_id: *question_id,
                }),
            ),
            Mutation::AddAnswers { answers, .. } => {
                (MutationBody::Answers { answers: *answers }, None)
            }
            Mutation::DeleteAnswer {
                question_id,
                answer_id,
                ..
            } => (
                MutationBody::Empty,
                Some(OptimisticPatch::MarkAnswerDeleted {
                    question_id: *question_id,
                    answer_id: *answer_id,
                }),
            ),
            Mutation::SetFeedback {
                question_id,
                answer_id,
                requested,
                ..
            } => {
                let existing = current
                    .and_then(Resource::as_generation)
                    .and_then(|g| current_feedback(g, *question_id, *answer_id));
                match existing {
                    Some(existing) => {
                        let value = existing.toggled(*requested);
                        (
                            MutationBody::Feedback {
                                answer: *answer_id,
                                value,
                            },
                            Some(OptimisticPatch::AssignFeedback {
                                question_id: *question_id,
                                answer_id: *answer_id,
                                value,
                            }),
                        )
                    }
                    // Nothing cached to toggle against; send the click as-is.
                    None => (
                        MutationBody::Feedback {
                            answer: *answer_id,
                            value: *requested,
                        },
                        None,
                    ),
                }
            }
        };

        PreparedMutation {
            request: MutationRequest {
                target: self.target(),
                path: self.path(),
                body,
            },
            patch,
        }
    }

    /// Work on other cache entries that may hold stale copies once this mutation succeeds.
    pub fn followups(&self) -> Vec<Followup> {
        let mut followups = Vec::new();
        if let Mutation::DeleteGeneration { generation_id } = self {
            followups.push(Followup::Evict(CacheKey::Generation(*generation_id)));
        }
        followups.push(Followup::RefreshIfCached(CacheKey::AdminGenerations));
        followups
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.kind(), self.target())
    }
}

fn check_count(count: u32, max: u32) -> ApiResult<()> {
    if count < 1 || count > max {
        return Err(ApiError::invalid(format!(
            "Number of questions must be between 1 and {}",
            max
        )));
    }
    Ok(())
}

/// Placeholder ids are negative so they can never collide with server ids.
pub fn placeholder_id(seq: u64) -> QuestionId {
    -(seq as i64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnswerChoice, Generation, Question};

    fn generation_with_feedback(feedback: FeedbackState) -> Resource {
        Resource::Generation(Generation {
            id: 5,
            filename: "notes.md".into(),
            unique_filename: None,
            questions: vec![Question {
                id: 50,
                question: "Q?".into(),
                original_question: "Q?".into(),
                is_custom_question: false,
                position: 0,
                shard: 0,
                deleted: false,
                answers: vec![AnswerChoice {
                    id: 500,
                    text: "A".into(),
                    original_text: "A".into(),
                    position: 0,
                    predicted_feedback: None,
                    user_feedback: feedback,
                    deleted: false,
                }],
            }],
        })
    }

    fn feedback(requested: FeedbackState) -> Mutation {
        Mutation::SetFeedback {
            generation_id: 5,
            question_id: 50,
            answer_id: 500,
            requested,
        }
    }

    #[test]
    fn paths_follow_the_backend_routes() {
        assert_eq!(
            Mutation::DeleteAnswer {
                generation_id: 1,
                question_id: 2,
                answer_id: 3
            }
            .path(),
            "/api/question/2/3/delete"
        );
        assert_eq!(
            Mutation::AddQuestions {
                generation_id: 9,
                count: 3
            }
            .path(),
            "/api/generated/9/more"
        );
        assert_eq!(
            Mutation::DeleteGeneration { generation_id: 9 }.target(),
            CacheKey::AllGenerations
        );
        assert_eq!(feedback(FeedbackState::Correct).target(), CacheKey::Generation(5));
    }

    #[test]
    fn feedback_body_carries_the_toggled_value() {
        let cached = generation_with_feedback(FeedbackState::Correct);
        let prepared = feedback(FeedbackState::Correct).prepare(Some(&cached), 1);

        assert_eq!(
            prepared.request.body,
            MutationBody::Feedback {
                answer: 500,
                value: FeedbackState::Unselected
            }
        );
        assert_eq!(
            prepared.patch,
            Some(OptimisticPatch::AssignFeedback {
                question_id: 50,
                answer_id: 500,
                value: FeedbackState::Unselected
            })
        );
    }

    #[test]
    fn feedback_without_cache_sends_the_click() {
        let prepared = feedback(FeedbackState::Incorrect).prepare(None, 1);
        assert_eq!(
            prepared.request.body,
            MutationBody::Feedback {
                answer: 500,
                value: FeedbackState::Incorrect
            }
        );
        assert_eq!(prepared.patch, None);
    }

    #[test]
    fn counts_are_bounded() {
        let more = |count| Mutation::AddQuestions {
            generation_id: 1,
            count,
        };
        assert!(more(0).validate().is_err());
        assert!(more(1).validate().is_ok());
        assert!(more(10).validate().is_ok());
        assert!(more(11).validate().is_err());

        let upload = |count| {
            Mutation::CreateGeneration(Upload {
                title: "Chapter 1".into(),
                content: "Some text".into(),
                content_type: ContentType::Markdown,
                count,
            })
        };
        assert!(upload(15).validate().is_ok());
        assert!(upload(16).validate().is_err());
    }

    #[test]
    fn empty_fields_are_rejected_locally() {
        let custom = Mutation::CustomQuestion {
            generation_id: 1,
            question: "What is Rust?".into(),
            correct_answer: "  ".into(),
        };
        assert!(matches!(
            custom.validate(),
            Err(ApiError::Validation { status: None, .. })
        ));
    }

    #[test]
    fn placeholder_ids_are_rejected_locally() {
        assert!(Mutation::DeleteQuestion {
            generation_id: 1,
            question_id: placeholder_id(3),
        }
        .validate()
        .is_err());
        assert!(Mutation::DeleteAnswer {
            generation_id: 1,
            question_id: 4,
            answer_id: -4,
        }
        .validate()
        .is_err());
        assert!(feedback(FeedbackState::Correct).validate().is_ok());
    }

    #[test]
    fn placeholders_are_negative() {
        assert_eq!(placeholder_id(3), -3);
        assert_eq!(placeholder_id(0), -1);
        let prepared = Mutation::CustomQuestion {
            generation_id: 1,
            question: "Q".into(),
            correct_answer: "A".into(),
        }
        .prepare(None, 7);
        assert!(matches!(
            prepared.patch,
            Some(OptimisticPatch::AppendCustomQuestion {
                placeholder_id: -7,
                ..
            })
        ));
    }

    #[test]
    fn deleting_a_generation_evicts_its_detail() {
        let followups = Mutation::DeleteGeneration { generation_id: 4 }.followups();
        assert!(followups.contains(&Followup::Evict(CacheKey::Generation(4))));
        assert!(followups.contains(&Followup::RefreshIfCached(CacheKey::AdminGenerations)));
    }
}
