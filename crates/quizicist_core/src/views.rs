//! crates/quizicist_core/src/views.rs
//!
//! Read-only state derived from a generation on every render. Nothing here is cached.

use crate::domain::{AnswerChoice, FeedbackState, Generation, Question};

/// Visible questions that still have a visible answer without feedback.
pub fn unscored_questions(generation: &Generation) -> Vec<&Question> {
    generation
        .visible_questions()
        .filter(|q| is_unscored(q))
        .collect()
}

/// 1-based display numbers of the unscored questions, for a jump-to-question index.
pub fn unscored_positions(generation: &Generation) -> Vec<usize> {
    generation
        .visible_questions()
        .enumerate()
        .filter(|(_, q)| is_unscored(q))
        .map(|(index, _)| index + 1)
        .collect()
}

/// Gates the export action.
pub fn all_scored(generation: &Generation) -> bool {
    !generation.visible_questions().any(is_unscored)
}

fn is_unscored(question: &Question) -> bool {
    question
        .visible_answers()
        .any(|a| a.user_feedback == FeedbackState::Unselected)
}

//=========================================================================================
// Plain-text export
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub include_deleted_questions: bool,
    pub include_deleted_answers: bool,
    pub include_custom: bool,
    /// Render the text as first generated instead of the edited text.
    pub original_text: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_deleted_questions: false,
            include_deleted_answers: false,
            include_custom: true,
            original_text: false,
        }
    }
}

impl ExportOptions {
    /// The generation as the model first produced it: everything it generated,
    /// in its own words, without questions the user wrote.
    pub fn original() -> Self {
        Self {
            include_deleted_questions: true,
            include_deleted_answers: true,
            include_custom: false,
            original_text: true,
        }
    }
}

/// Renders questions and their answers as
/// `Question: {text}` followed by one `    {letter}: {answer}` line per answer.
/// Question blocks are separated by a blank line.
pub fn export_text(generation: &Generation, options: &ExportOptions) -> String {
    generation
        .questions
        .iter()
        .filter(|q| options.include_deleted_questions || !q.deleted)
        .filter(|q| options.include_custom || !q.is_custom_question)
        .map(|q| render_question(q, options))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_question(question: &Question, options: &ExportOptions) -> String {
    let text = if options.original_text {
        &question.original_question
    } else {
        &question.question
    };

    let answers = question
        .answers
        .iter()
        .filter(|a| options.include_deleted_answers || !a.deleted)
        .map(|a| render_answer(a, options))
        .collect::<Vec<_>>();

    format!("Question: {}\n{}\n", text, answers.join("\n"))
}

fn render_answer(answer: &AnswerChoice, options: &ExportOptions) -> String {
    let text = if options.original_text {
        &answer.original_text
    } else {
        &answer.text
    };
    format!("    {}: {}", answer_letter(answer.position), text)
}

/// `a` for position 0, `b` for 1, and so on.
pub fn answer_letter(position: u32) -> char {
    char::from_u32('a' as u32 + position).unwrap_or('?')
}

//=========================================================================================
// Reviewer diff
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine {
    Same(String),
    Removed(String),
    Added(String),
}

impl std::fmt::Display for DiffLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffLine::Same(line) => write!(f, "  {}", line),
            DiffLine::Removed(line) => write!(f, "- {}", line),
            DiffLine::Added(line) => write!(f, "+ {}", line),
        }
    }
}

/// The original generation next to the user's current version of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationDiff {
    pub original: String,
    pub current: String,
}

impl GenerationDiff {
    pub fn of(generation: &Generation) -> Self {
        Self {
            original: export_text(generation, &ExportOptions::original()),
            current: export_text(generation, &ExportOptions::default()),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.original == self.current
    }

    /// Line-level diff from `original` to `current` (longest common subsequence).
    pub fn lines(&self) -> Vec<DiffLine> {
        let old: Vec<&str> = self.original.lines().collect();
        let new: Vec<&str> = self.current.lines().collect();

        // lcs[i][j] = length of the LCS of old[i..] and new[j..]
        let mut lcs = vec![vec![0usize; new.len() + 1]; old.len() + 1];
        for i in (0..old.len()).rev() {
            for j in (0..new.len()).rev() {
                lcs[i][j] = if old[i] == new[j] {
                    lcs[i + 1][j + 1] + 1
                } else {
                    lcs[i + 1][j].max(lcs[i][j + 1])
                };
            }
        }

        let mut lines = Vec::with_capacity(old.len().max(new.len()));
        let (mut i, mut j) = (0, 0);
        while i < old.len() && j < new.len() {
            if old[i] == new[j] {
                lines.push(DiffLine::Same(old[i].to_string()));
                i += 1;
                j += 1;
            } else if lcs[i + 1][j] >= lcs[i][j + 1] {
                lines.push(DiffLine::Removed(old[i].to_string()));
                i += 1;
            } else {
                lines.push(DiffLine::Added(new[j].to_string()));
                j += 1;
            }
        }
        lines.extend(old[i..].iter().map(|l| DiffLine::Removed(l.to_string())));
        lines.extend(new[j..].iter().map(|l| DiffLine::Added(l.to_string())));
        lines
    }
}
