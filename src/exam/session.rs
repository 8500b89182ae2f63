// src/exam/session.rs

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::exam::draw::DrawPlan;
use crate::exam::resume::ResumeSnapshot;
use crate::exam::scoring::{self, ExamReport, Timing};
use crate::exam::{ExamLength, ExamMode, is_resumable};
use crate::models::question::{AnswerKey, Letter, Question};

/// The answer recorded for one position.
///
/// Serialized as `null`, `"A"` or `["A","C"]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerSlot {
    #[default]
    Unset,
    Single(Letter),
    Multiple(BTreeSet<Letter>),
}

impl AnswerSlot {
    pub fn is_set(&self) -> bool {
        !matches!(self, AnswerSlot::Unset)
    }

    pub fn chosen(&self) -> usize {
        match self {
            AnswerSlot::Unset => 0,
            AnswerSlot::Single(_) => 1,
            AnswerSlot::Multiple(set) => set.len(),
        }
    }

    /// Whether this slot has the shape the question's answer requires.
    pub fn fits(&self, key: &AnswerKey) -> bool {
        match (self, key) {
            (AnswerSlot::Unset, _) => true,
            (AnswerSlot::Single(_), AnswerKey::Single(_)) => true,
            (AnswerSlot::Multiple(set), AnswerKey::Multiple(_)) => !set.is_empty(),
            _ => false,
        }
    }

    /// Stored form used by result detail rows: `""`, `"A"` or a JSON array.
    pub fn to_stored(&self) -> String {
        match self {
            AnswerSlot::Unset => String::new(),
            AnswerSlot::Single(letter) => letter.to_string(),
            AnswerSlot::Multiple(set) => {
                serde_json::to_string(set).unwrap_or_else(|_| "[]".to_string())
            }
        }
    }

    pub fn parse_stored(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return AnswerSlot::Unset;
        }
        match AnswerKey::parse_stored(trimmed) {
            Ok(AnswerKey::Single(letter)) => AnswerSlot::Single(letter),
            Ok(AnswerKey::Multiple(set)) => AnswerSlot::Multiple(set),
            Err(_) => AnswerSlot::Unset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Timed exam drawn but the countdown has not been confirmed yet.
    AwaitingStart,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExamError {
    EmptyBank,
    WrongPhase { expected: Phase, actual: Phase },
    UnknownOption(Letter),
    AnswerLocked,
    RevealUnavailable,
    NothingSelected,
}

impl fmt::Display for ExamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExamError::EmptyBank => write!(f, "No questions are available yet. Please try again later."),
            ExamError::WrongPhase { expected, actual } => {
                write!(f, "Exam is {:?}, expected {:?}", actual, expected)
            }
            ExamError::UnknownOption(letter) => {
                write!(f, "Option {} does not exist for this question", letter)
            }
            ExamError::AnswerLocked => write!(f, "The answer has already been revealed"),
            ExamError::RevealUnavailable => {
                write!(f, "Answers are only revealed during practice runs")
            }
            ExamError::NothingSelected => write!(f, "Select an answer first"),
        }
    }
}

impl std::error::Error for ExamError {}

impl From<ExamError> for AppError {
    fn from(err: ExamError) -> Self {
        match err {
            ExamError::EmptyBank => AppError::NotFound(err.to_string()),
            ExamError::WrongPhase { .. } => AppError::Conflict(err.to_string()),
            _ => AppError::BadRequest(err.to_string()),
        }
    }
}

/// Result of a finish attempt.
#[derive(Debug, Clone)]
pub struct FinishOutcome {
    pub report: ExamReport,
    /// False when the session had already been completed before this call.
    pub newly_completed: bool,
}

/// Result of `next()`.
#[derive(Debug, Clone)]
pub enum Step {
    Moved(usize),
    Finished(FinishOutcome),
}

/// What a cancelled session leaves behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled {
    pub snapshot_retained: bool,
}

/// One user's run through a drawn set of questions.
#[derive(Debug, Clone)]
pub struct ExamSession {
    id: Uuid,
    owner: Option<String>,
    mode: ExamMode,
    length: ExamLength,
    questions: Vec<Question>,
    answers: Vec<AnswerSlot>,
    position: usize,
    revealed: bool,
    phase: Phase,
    time_limit: Option<u32>,
    remaining: Option<u32>,
    started_at: DateTime<Utc>,
    report: Option<ExamReport>,
    result_id: Option<String>,
    /// A store of the completed report is in flight.
    persisting: bool,
}

impl ExamSession {
    /// Draws questions for a new run. Timed runs wait for `confirm_start`.
    pub fn start<R: Rng>(
        bank: &[Question],
        mode: ExamMode,
        length: ExamLength,
        owner: Option<String>,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<Self, ExamError> {
        if bank.is_empty() {
            return Err(ExamError::EmptyBank);
        }

        let plan = DrawPlan::for_exam(mode, length);
        let questions = plan.draw(bank, rng);
        let time_limit = if mode.is_timed() { plan.time_limit_secs } else { None };

        Ok(Self::assemble(
            owner,
            mode,
            length,
            questions,
            time_limit,
            now,
        ))
    }

    fn assemble(
        owner: Option<String>,
        mode: ExamMode,
        length: ExamLength,
        questions: Vec<Question>,
        time_limit: Option<u32>,
        now: DateTime<Utc>,
    ) -> Self {
        let phase = if time_limit.is_some() {
            Phase::AwaitingStart
        } else {
            Phase::InProgress
        };
        ExamSession {
            id: Uuid::new_v4(),
            owner,
            mode,
            length,
            answers: vec![AnswerSlot::Unset; questions.len()],
            questions,
            position: 0,
            revealed: false,
            phase,
            time_limit,
            remaining: time_limit,
            started_at: now,
            report: None,
            result_id: None,
            persisting: false,
        }
    }

    /// Rebuilds a full-length practice run from a saved snapshot.
    ///
    /// Ids are resolved against the current bank; if any of them is gone the
    /// whole bank is used in stored order and the saved answers are dropped.
    /// Returns `None` when the bank is too small to resume past the first
    /// question.
    pub fn restore(
        snapshot: &ResumeSnapshot,
        bank: &[Question],
        owner: Option<String>,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let by_id: HashMap<&str, &Question> =
            bank.iter().map(|q| (q.id.as_str(), q)).collect();
        let resolved: Option<Vec<Question>> = snapshot
            .question_ids
            .iter()
            .map(|id| by_id.get(id.as_str()).map(|q| (*q).clone()))
            .collect();

        let (questions, saved_answers) = match resolved {
            Some(questions) if !questions.is_empty() => (questions, snapshot.answers.as_slice()),
            _ => {
                tracing::warn!(
                    "Resume snapshot references questions that no longer exist; using the full bank"
                );
                (bank.to_vec(), &[][..])
            }
        };

        if questions.len() < 2 {
            return None;
        }

        let mut session = Self::assemble(
            owner,
            ExamMode::Practice,
            ExamLength::Full,
            questions,
            None,
            now,
        );
        session.started_at = snapshot.started_at;
        for (slot, saved) in session.answers.iter_mut().zip(saved_answers) {
            *slot = saved.clone();
        }
        for (slot, question) in session.answers.iter_mut().zip(&session.questions) {
            if !slot.fits(&question.answer) {
                *slot = AnswerSlot::Unset;
            }
        }
        session.position = snapshot.position.clamp(1, session.questions.len() - 1);
        Some(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn mode(&self) -> ExamMode {
        self.mode
    }

    pub fn length(&self) -> ExamLength {
        self.length
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answers(&self) -> &[AnswerSlot] {
        &self.answers
    }

    pub fn current_question(&self) -> &Question {
        &self.questions[self.position]
    }

    pub fn current_answer(&self) -> &AnswerSlot {
        &self.answers[self.position]
    }

    pub fn is_revealed(&self) -> bool {
        self.revealed
    }

    pub fn time_limit_secs(&self) -> Option<u32> {
        self.time_limit
    }

    pub fn remaining_secs(&self) -> Option<u32> {
        self.remaining
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn report(&self) -> Option<&ExamReport> {
        self.report.as_ref()
    }

    pub fn result_id(&self) -> Option<&str> {
        self.result_id.as_deref()
    }

    /// Claims the right to store the completed report.
    ///
    /// Succeeds while the run is completed, not yet stored and no other
    /// caller holds the claim. Every successful claim must be settled.
    pub fn claim_persist(&mut self) -> bool {
        if self.phase != Phase::Completed || self.result_id.is_some() || self.persisting {
            return false;
        }
        self.persisting = true;
        true
    }

    /// Releases a claim. `None` leaves the run unstored so a later finish can
    /// try again.
    pub fn settle_persist(&mut self, result_id: Option<String>) {
        self.persisting = false;
        if result_id.is_some() {
            self.result_id = result_id;
        }
    }

    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|slot| slot.is_set()).count()
    }

    pub fn is_resumable(&self) -> bool {
        is_resumable(self.mode, self.length)
    }

    fn expect_phase(&self, expected: Phase) -> Result<(), ExamError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(ExamError::WrongPhase {
                expected,
                actual: self.phase,
            })
        }
    }

    /// Starts the countdown of a timed run.
    pub fn confirm_start(&mut self, now: DateTime<Utc>) -> Result<(), ExamError> {
        self.expect_phase(Phase::AwaitingStart)?;
        self.phase = Phase::InProgress;
        self.started_at = now;
        Ok(())
    }

    /// Records a choice for the current question.
    ///
    /// Single-answer questions replace the slot; multi-answer questions toggle
    /// the letter. In practice mode the answer is revealed as soon as it is
    /// complete and further input is refused.
    pub fn select_answer(&mut self, letter: Letter) -> Result<&AnswerSlot, ExamError> {
        self.expect_phase(Phase::InProgress)?;
        if self.revealed {
            return Err(ExamError::AnswerLocked);
        }

        let question = &self.questions[self.position];
        if !question.has_option(letter) {
            return Err(ExamError::UnknownOption(letter));
        }

        let slot = &mut self.answers[self.position];
        match &question.answer {
            AnswerKey::Single(_) => *slot = AnswerSlot::Single(letter),
            AnswerKey::Multiple(_) => {
                let mut chosen = match std::mem::take(slot) {
                    AnswerSlot::Multiple(set) => set,
                    _ => BTreeSet::new(),
                };
                if !chosen.remove(&letter) {
                    chosen.insert(letter);
                }
                *slot = if chosen.is_empty() {
                    AnswerSlot::Unset
                } else {
                    AnswerSlot::Multiple(chosen)
                };
            }
        }

        if self.mode == ExamMode::Practice && slot.chosen() >= question.answer.len() {
            self.revealed = true;
        }
        Ok(&self.answers[self.position])
    }

    /// Reveals correctness of the current answer (practice only).
    pub fn reveal(&mut self) -> Result<bool, ExamError> {
        self.expect_phase(Phase::InProgress)?;
        if self.mode != ExamMode::Practice {
            return Err(ExamError::RevealUnavailable);
        }
        if !self.current_answer().is_set() {
            return Err(ExamError::NothingSelected);
        }
        self.revealed = true;
        Ok(scoring::is_correct(
            &self.current_question().answer,
            self.current_answer(),
        ))
    }

    /// Whether the revealed answer is correct; `None` while hidden.
    pub fn revealed_correctness(&self) -> Option<bool> {
        self.revealed
            .then(|| scoring::is_correct(&self.current_question().answer, self.current_answer()))
    }

    pub fn next(&mut self, now: DateTime<Utc>) -> Result<Step, ExamError> {
        self.expect_phase(Phase::InProgress)?;
        if self.position + 1 >= self.questions.len() {
            return self.finish(now).map(Step::Finished);
        }
        self.position += 1;
        self.revealed = false;
        Ok(Step::Moved(self.position))
    }

    pub fn previous(&mut self) -> Result<usize, ExamError> {
        self.expect_phase(Phase::InProgress)?;
        self.position = self.position.saturating_sub(1);
        self.revealed = false;
        Ok(self.position)
    }

    /// Grades the run. Calling it again after completion returns the same
    /// report with `newly_completed == false`.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Result<FinishOutcome, ExamError> {
        if let Some(report) = &self.report {
            return Ok(FinishOutcome {
                report: report.clone(),
                newly_completed: false,
            });
        }
        self.expect_phase(Phase::InProgress)?;

        let time_taken_secs = match (self.time_limit, self.remaining) {
            (Some(limit), Some(remaining)) => i64::from(limit.saturating_sub(remaining)),
            _ => (now - self.started_at).num_seconds().max(0),
        };
        let report = scoring::grade(
            self.mode,
            self.length,
            &self.questions,
            &self.answers,
            Timing {
                started_at: self.started_at,
                completed_at: now,
                time_taken_secs,
            },
        );

        self.phase = Phase::Completed;
        self.revealed = false;
        self.report = Some(report.clone());
        tracing::info!(
            "Exam {} completed: {}/{} correct, score {}",
            self.id,
            report.correct_answers,
            report.total_questions,
            report.score
        );

        Ok(FinishOutcome {
            report,
            newly_completed: true,
        })
    }

    /// Advances the countdown by one second. Expiry finishes the run with
    /// whatever has been answered.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<FinishOutcome> {
        if self.phase != Phase::InProgress {
            return None;
        }
        let remaining = self.remaining.as_mut()?;
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            tracing::info!("Exam {} ran out of time", self.id);
            return self.finish(now).ok();
        }
        None
    }

    /// Discards the run. Full-length practice keeps its resume snapshot.
    pub fn cancel(self) -> Cancelled {
        Cancelled {
            snapshot_retained: self.is_resumable(),
        }
    }

    /// Snapshot of a resumable run, once it is past the first question.
    pub fn to_snapshot(&self) -> Option<ResumeSnapshot> {
        if !self.is_resumable() || self.position < 1 || self.phase != Phase::InProgress {
            return None;
        }
        Some(ResumeSnapshot {
            question_ids: self.questions.iter().map(|q| q.id.clone()).collect(),
            position: self.position,
            answers: self.answers.clone(),
            started_at: self.started_at,
        })
    }
}
