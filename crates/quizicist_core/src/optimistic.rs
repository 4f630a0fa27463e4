//! crates/quizicist_core/src/optimistic.rs
//!
//! Predictions of post-mutation state, applied to the cache before the
//! backend answers.
//!
//! Transforms take the generation by value (the caller hands in its own copy)
//! and never touch siblings of the targeted entity. Missing ids are a benign
//! race with a concurrent refetch and leave the graph unchanged.

use crate::domain::{
    AnswerChoice, AnswerId, FeedbackState, Generation, GenerationId, Question, QuestionId,
};
use crate::resource::Resource;

/// Tombstones a question. The question stays in place so positions are stable
/// until the next full refetch.
pub fn delete_question(mut generation: Generation, question_id: QuestionId) -> Generation {
    if let Some(question) = generation.question_mut(question_id) {
        question.deleted = true;
    }
    generation
}

/// Tombstones one answer choice of a question.
pub fn delete_answer(
    mut generation: Generation,
    question_id: QuestionId,
    answer_id: AnswerId,
) -> Generation {
    if let Some(answer) = generation
        .question_mut(question_id)
        .and_then(|q| q.answer_mut(answer_id))
    {
        answer.deleted = true;
    }
    generation
}

/// Applies a reviewer click: the requested value, or `Unselected` if it was already active.
pub fn set_feedback(
    generation: Generation,
    question_id: QuestionId,
    answer_id: AnswerId,
    requested: FeedbackState,
) -> Generation {
    match current_feedback(&generation, question_id, answer_id) {
        Some(current) => assign_feedback(
            generation,
            question_id,
            answer_id,
            current.toggled(requested),
        ),
        None => generation,
    }
}

/// Writes an already computed feedback value.
pub fn assign_feedback(
    mut generation: Generation,
    question_id: QuestionId,
    answer_id: AnswerId,
    value: FeedbackState,
) -> Generation {
    if let Some(answer) = generation
        .question_mut(question_id)
        .and_then(|q| q.answer_mut(answer_id))
    {
        answer.user_feedback = value;
    }
    generation
}

pub fn current_feedback(
    generation: &Generation,
    question_id: QuestionId,
    answer_id: AnswerId,
) -> Option<FeedbackState> {
    generation
        .question(question_id)
        .and_then(|q| q.answer(answer_id))
        .map(|a| a.user_feedback)
}

//=========================================================================================
// Recorded patches
//=========================================================================================

/// A prediction recorded against a cache entry while its mutation is in flight.
///
/// Patches hold computed target state rather than requests, so replaying one
/// over a newer base gives the same answer every time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimisticPatch {
    MarkQuestionDeleted {
        question_id: QuestionId,
    },
    MarkAnswerDeleted {
        question_id: QuestionId,
        answer_id: AnswerId,
    },
    AssignFeedback {
        question_id: QuestionId,
        answer_id: AnswerId,
        value: FeedbackState,
    },
    Rename {
        filename: String,
    },
    ReplaceQuestionText {
        question_id: QuestionId,
        text: String,
    },
    AppendCustomQuestion {
        placeholder_id: QuestionId,
        question: String,
        correct_answer: String,
    },
    RemoveGeneration {
        generation_id: GenerationId,
    },
}

impl OptimisticPatch {
    /// Replays the patch over `resource`. Patches aimed at another resource shape are no-ops.
    pub fn apply(&self, resource: Resource) -> Resource {
        match (self, resource) {
            (OptimisticPatch::RemoveGeneration { generation_id }, Resource::GenerationList(ids)) => {
                Resource::GenerationList(ids.into_iter().filter(|id| id != generation_id).collect())
            }
            (patch, Resource::Generation(generation)) => {
                Resource::Generation(patch.apply_to_generation(generation))
            }
            (_, other) => other,
        }
    }

    /// Whether the patch invents an entity the backend has not assigned an id to yet.
    pub fn creates_placeholder(&self) -> bool {
        matches!(self, OptimisticPatch::AppendCustomQuestion { .. })
    }

    fn apply_to_generation(&self, mut generation: Generation) -> Generation {
        match self {
            OptimisticPatch::MarkQuestionDeleted { question_id } => {
                delete_question(generation, *question_id)
            }
            OptimisticPatch::MarkAnswerDeleted {
                question_id,
                answer_id,
            } => delete_answer(generation, *question_id, *answer_id),
            OptimisticPatch::AssignFeedback {
                question_id,
                answer_id,
                value,
            } => assign_feedback(generation, *question_id, *answer_id, *value),
            OptimisticPatch::Rename { filename } => {
                generation.filename = filename.clone();
                generation
            }
            OptimisticPatch::ReplaceQuestionText { question_id, text } => {
                if let Some(question) = generation.question_mut(*question_id) {
                    question.question = text.clone();
                }
                generation
            }
            OptimisticPatch::AppendCustomQuestion {
                placeholder_id,
                question,
                correct_answer,
            } => {
                if generation.question(*placeholder_id).is_none() {
                    let position = generation.questions.len() as u32;
                    generation
                        .questions
                        .push(placeholder_question(*placeholder_id, position, question, correct_answer));
                }
                generation
            }
            OptimisticPatch::RemoveGeneration { .. } => generation,
        }
    }
}

fn placeholder_question(
    placeholder_id: QuestionId,
    position: u32,
    question: &str,
    correct_answer: &str,
) -> Question {
    Question {
        id: placeholder_id,
        question: question.to_string(),
        original_question: question.to_string(),
        is_custom_question: true,
        position,
        shard: 0,
        deleted: false,
        answers: vec![AnswerChoice {
            id: placeholder_id,
            text: correct_answer.to_string(),
            original_text: correct_answer.to_string(),
            position: 0,
            predicted_feedback: None,
            user_feedback: FeedbackState::Unselected,
            deleted: false,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(id: AnswerId, position: u32, feedback: FeedbackState) -> AnswerChoice {
        AnswerChoice {
            id,
            text: format!("answer {}", id),
            original_text: format!("answer {}", id),
            position,
            predicted_feedback: None,
            user_feedback: feedback,
            deleted: false,
        }
    }

    fn sample() -> Generation {
        Generation {
            id: 1,
            filename: "chapter1.md".into(),
            unique_filename: None,
            questions: vec![
                Question {
                    id: 10,
                    question: "First?".into(),
                    original_question: "First?".into(),
                    is_custom_question: false,
                    position: 0,
                    shard: 0,
                    deleted: false,
                    answers: vec![
                        answer(100, 0, FeedbackState::Unselected),
                        answer(101, 1, FeedbackState::Correct),
                    ],
                },
                Question {
                    id: 11,
                    question: "Second?".into(),
                    original_question: "Second?".into(),
                    is_custom_question: false,
                    position: 1,
                    shard: 0,
                    deleted: false,
                    answers: vec![answer(110, 0, FeedbackState::Unselected)],
                },
            ],
        }
    }

    #[test]
    fn delete_question_tombstones_in_place() {
        let before = sample();
        let after = delete_question(before.clone(), 11);

        assert_eq!(after.questions.len(), before.questions.len());
        assert!(after.question(11).unwrap().deleted);
        assert_eq!(after.questions[0], before.questions[0]);
    }

    #[test]
    fn delete_question_with_unknown_id_is_a_no_op() {
        let before = sample();
        assert_eq!(delete_question(before.clone(), 999), before);
    }

    #[test]
    fn delete_answer_only_touches_the_target() {
        let before = sample();
        let after = delete_answer(before.clone(), 10, 101);

        let question = after.question(10).unwrap();
        assert!(question.answer(101).unwrap().deleted);
        assert!(!question.answer(100).unwrap().deleted);
        assert!(!question.deleted);
        assert_eq!(after.questions[1], before.questions[1]);
    }

    #[test]
    fn delete_answer_with_missing_ids_is_a_no_op() {
        let before = sample();
        assert_eq!(delete_answer(before.clone(), 999, 100), before);
        assert_eq!(delete_answer(before.clone(), 10, 999), before);
    }

    #[test]
    fn set_feedback_twice_returns_to_unselected() {
        for value in [FeedbackState::Correct, FeedbackState::Incorrect] {
            let once = set_feedback(sample(), 10, 100, value);
            assert_eq!(current_feedback(&once, 10, 100), Some(value));

            let twice = set_feedback(once, 10, 100, value);
            assert_eq!(current_feedback(&twice, 10, 100), Some(FeedbackState::Unselected));
        }
    }

    #[test]
    fn set_feedback_switching_values_overwrites() {
        let g = set_feedback(sample(), 10, 100, FeedbackState::Correct);
        let g = set_feedback(g, 10, 100, FeedbackState::Incorrect);
        assert_eq!(current_feedback(&g, 10, 100), Some(FeedbackState::Incorrect));
    }

    #[test]
    fn set_feedback_with_missing_ids_is_a_no_op() {
        let before = sample();
        assert_eq!(
            set_feedback(before.clone(), 10, 999, FeedbackState::Correct),
            before
        );
    }

    #[test]
    fn patches_are_idempotent() {
        let patches = [
            OptimisticPatch::MarkQuestionDeleted { question_id: 10 },
            OptimisticPatch::MarkAnswerDeleted {
                question_id: 11,
                answer_id: 110,
            },
            OptimisticPatch::AssignFeedback {
                question_id: 10,
                answer_id: 100,
                value: FeedbackState::Incorrect,
            },
            OptimisticPatch::Rename {
                filename: "renamed.md".into(),
            },
            OptimisticPatch::AppendCustomQuestion {
                placeholder_id: -4,
                question: "Custom?".into(),
                correct_answer: "Yes".into(),
            },
        ];

        for patch in patches {
            let once = patch.apply(Resource::Generation(sample()));
            let twice = patch.apply(once.clone());
            assert_eq!(once, twice, "{:?} is not idempotent", patch);
        }
    }

    #[test]
    fn appended_placeholder_keeps_existing_order() {
        let patch = OptimisticPatch::AppendCustomQuestion {
            placeholder_id: -1,
            question: "Custom?".into(),
            correct_answer: "Yes".into(),
        };
        let generation = patch
            .apply(Resource::Generation(sample()))
            .into_generation()
            .unwrap();

        let ids: Vec<_> = generation.questions.iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![10, 11, -1]);
        assert!(generation.questions[2].is_custom_question);
        assert_eq!(generation.questions[2].position, 2);
    }

    #[test]
    fn remove_generation_only_applies_to_lists() {
        let patch = OptimisticPatch::RemoveGeneration { generation_id: 2 };
        assert_eq!(
            patch.apply(Resource::GenerationList(vec![3, 2, 1])),
            Resource::GenerationList(vec![3, 1])
        );
        assert_eq!(
            patch.apply(Resource::Generation(sample())),
            Resource::Generation(sample())
        );
    }
}
