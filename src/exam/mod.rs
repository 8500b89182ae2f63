// src/exam/mod.rs

//! Exam session core: drawing questions, the per-session state machine,
//! scoring and the resume snapshot format. Nothing in here talks to the
//! database or HTTP layer directly.

pub mod draw;
pub mod registry;
pub mod resume;
pub mod scoring;
pub mod session;
pub mod shuffle;
pub mod timer;
pub mod view;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Practice runs reveal answers as you go; exam runs are timed and only
/// grade at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamMode {
    Practice,
    #[serde(alias = "timed")]
    Exam,
}

impl ExamMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExamMode::Practice => "practice",
            ExamMode::Exam => "exam",
        }
    }

    pub fn is_timed(self) -> bool {
        self == ExamMode::Exam
    }
}

impl FromStr for ExamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "practice" => Ok(ExamMode::Practice),
            "exam" | "timed" => Ok(ExamMode::Exam),
            other => Err(format!("unknown exam mode '{}'", other)),
        }
    }
}

impl fmt::Display for ExamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamLength {
    Short,
    Full,
}

impl ExamLength {
    pub fn as_str(self) -> &'static str {
        match self {
            ExamLength::Short => "short",
            ExamLength::Full => "full",
        }
    }
}

impl FromStr for ExamLength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short" => Ok(ExamLength::Short),
            "full" => Ok(ExamLength::Full),
            other => Err(format!("unknown exam length '{}'", other)),
        }
    }
}

impl fmt::Display for ExamLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Only full-length practice runs can be resumed later.
pub fn is_resumable(mode: ExamMode, length: ExamLength) -> bool {
    mode == ExamMode::Practice && length == ExamLength::Full
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::{BTreeMap, BTreeSet};

    use crate::models::question::{AnswerKey, Difficulty, Letter, Question};

    pub fn letter(c: char) -> Letter {
        Letter::new(c).unwrap()
    }

    pub fn options(keys: &str) -> BTreeMap<Letter, String> {
        keys.chars()
            .map(|c| (letter(c), format!("Option {}", c)))
            .collect()
    }

    pub fn single(id: &str, answer: char) -> Question {
        Question {
            id: id.to_string(),
            question_text: format!("Question {}", id),
            options: options("ABCD"),
            answer: AnswerKey::Single(letter(answer)),
            explanation: Some(format!("Because {}", answer)),
            category: "SAA".to_string(),
            difficulty: Difficulty::Medium,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn multiple(id: &str, answers: &str) -> Question {
        let set: BTreeSet<Letter> = answers.chars().map(letter).collect();
        Question {
            answer: AnswerKey::Multiple(set),
            options: options("ABCDE"),
            explanation: None,
            ..single(id, 'A')
        }
    }

    /// `n` single-answer questions whose answer is always `A`.
    pub fn bank(n: usize) -> Vec<Question> {
        (0..n).map(|i| single(&format!("q{}", i), 'A')).collect()
    }
}
