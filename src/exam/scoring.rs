// src/exam/scoring.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{MAX_SCORE, PASSING_SCORE};
use crate::exam::session::AnswerSlot;
use crate::exam::{ExamLength, ExamMode};
use crate::models::question::{AnswerKey, Difficulty, Letter, Question};

/// Compares a recorded answer with the canonical one.
///
/// Multi-select answers must match the canonical set exactly; an unset slot
/// never matches.
pub fn is_correct(key: &AnswerKey, slot: &AnswerSlot) -> bool {
    match (key, slot) {
        (AnswerKey::Single(expected), AnswerSlot::Single(chosen)) => expected == chosen,
        (AnswerKey::Multiple(expected), AnswerSlot::Multiple(chosen)) => {
            expected.len() == chosen.len() && expected.iter().all(|l| chosen.contains(l))
        }
        _ => false,
    }
}

/// `round(correct / total * 1000)`.
pub fn score(correct: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((correct as f64 / total as f64) * MAX_SCORE as f64).round() as u32
}

pub fn passed(score: u32) -> bool {
    score >= PASSING_SCORE
}

/// Review entry for one question of a finished exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionReview {
    pub index: usize,
    pub question_id: String,
    pub question_text: String,
    pub options: BTreeMap<Letter, String>,
    pub user_answer: AnswerSlot,
    pub correct_answer: AnswerKey,
    pub is_correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Correct answers out of the questions in one group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub total: usize,
    pub correct: usize,
}

impl Tally {
    fn record(&mut self, correct: bool) {
        self.total += 1;
        if correct {
            self.correct += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamReport {
    pub mode: ExamMode,
    pub length: ExamLength,
    pub total_questions: usize,
    pub correct_answers: usize,
    pub score: u32,
    pub passed: bool,
    pub time_taken_secs: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub questions: Vec<QuestionReview>,
    #[serde(default)]
    pub by_category: BTreeMap<String, Tally>,
    #[serde(default)]
    pub by_difficulty: BTreeMap<Difficulty, Tally>,
}

/// Timing facts of a run, captured when it is graded.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub time_taken_secs: i64,
}

pub fn grade(
    mode: ExamMode,
    length: ExamLength,
    questions: &[Question],
    answers: &[AnswerSlot],
    timing: Timing,
) -> ExamReport {
    let reviews: Vec<QuestionReview> = questions
        .iter()
        .enumerate()
        .map(|(index, question)| {
            let user_answer = answers.get(index).cloned().unwrap_or_default();
            QuestionReview {
                index,
                question_id: question.id.clone(),
                question_text: question.question_text.clone(),
                options: question.options.clone(),
                is_correct: is_correct(&question.answer, &user_answer),
                user_answer,
                correct_answer: question.answer.clone(),
                explanation: question.explanation().map(str::to_string),
            }
        })
        .collect();

    let correct_answers = reviews.iter().filter(|r| r.is_correct).count();

    let mut by_category: BTreeMap<String, Tally> = BTreeMap::new();
    let mut by_difficulty: BTreeMap<Difficulty, Tally> = BTreeMap::new();
    for (question, review) in questions.iter().zip(&reviews) {
        by_category
            .entry(question.category.clone())
            .or_default()
            .record(review.is_correct);
        by_difficulty
            .entry(question.difficulty)
            .or_default()
            .record(review.is_correct);
    }
    let score = score(correct_answers, questions.len());

    ExamReport {
        mode,
        length,
        total_questions: questions.len(),
        correct_answers,
        score,
        passed: passed(score),
        time_taken_secs: timing.time_taken_secs,
        started_at: timing.started_at,
        completed_at: timing.completed_at,
        questions: reviews,
        by_category,
        by_difficulty,
    }
}
