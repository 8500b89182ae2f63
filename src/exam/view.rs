// src/exam/view.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::exam::scoring::{ExamReport, is_correct};
use crate::exam::session::{AnswerSlot, ExamSession, Phase};
use crate::exam::{ExamLength, ExamMode};
use crate::models::question::{AnswerKey, Letter};

/// What a client sees of the current question.
///
/// The canonical answer and explanation only appear once revealed in
/// practice mode.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub question_text: String,
    pub options: BTreeMap<Letter, String>,
    pub multiple: bool,
    /// Letters a complete answer needs.
    pub answer_count: usize,
    pub selected: AnswerSlot,
    pub revealed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<AnswerKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExamView {
    pub id: Uuid,
    pub mode: ExamMode,
    pub length: ExamLength,
    pub phase: Phase,
    pub position: usize,
    pub total: usize,
    pub answered: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_secs: Option<u32>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<QuestionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ExamReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_result_id: Option<String>,
}

impl From<&ExamSession> for ExamView {
    fn from(session: &ExamSession) -> Self {
        let current = (session.phase() != Phase::Completed).then(|| {
            let question = session.current_question();
            let selected = session.current_answer().clone();
            let revealed = session.is_revealed();
            QuestionView {
                id: question.id.clone(),
                question_text: question.question_text.clone(),
                options: question.options.clone(),
                multiple: question.is_multiple(),
                answer_count: question.answer.len(),
                correct_answer: revealed.then(|| question.answer.clone()),
                is_correct: revealed.then(|| is_correct(&question.answer, &selected)),
                explanation: if revealed {
                    question.explanation().map(str::to_string)
                } else {
                    None
                },
                selected,
                revealed,
            }
        });

        ExamView {
            id: session.id(),
            mode: session.mode(),
            length: session.length(),
            phase: session.phase(),
            position: session.position(),
            total: session.len(),
            answered: session.answered_count(),
            remaining_secs: session.remaining_secs(),
            started_at: session.started_at(),
            current,
            report: session.report().cloned(),
            saved_result_id: session.result_id().map(str::to_string),
        }
    }
}
