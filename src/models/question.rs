// src/models/question.rs

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// An option key, `A` through `F`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Letter(char);

impl Letter {
    pub const ALLOWED: &'static str = "ABCDEF";

    pub fn new(c: char) -> Result<Self, String> {
        let upper = c.to_ascii_uppercase();
        if Self::ALLOWED.contains(upper) {
            Ok(Letter(upper))
        } else {
            Err(format!("'{}' is not an option key (expected A-F)", c))
        }
    }

    pub fn as_char(self) -> char {
        self.0
    }
}

impl FromStr for Letter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Letter::new(c),
            _ => Err(format!("'{}' is not an option key (expected A-F)", s)),
        }
    }
}

impl TryFrom<String> for Letter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Letter> for String {
    fn from(letter: Letter) -> Self {
        letter.0.to_string()
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The canonical answer of a question.
///
/// Whether a question is single- or multi-select is decided once, when the
/// stored row is normalized, and never re-derived afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerKey {
    Single(Letter),
    Multiple(BTreeSet<Letter>),
}

impl AnswerKey {
    pub fn is_multiple(&self) -> bool {
        matches!(self, AnswerKey::Multiple(_))
    }

    pub fn letters(&self) -> Vec<Letter> {
        match self {
            AnswerKey::Single(letter) => vec![*letter],
            AnswerKey::Multiple(set) => set.iter().copied().collect(),
        }
    }

    /// Number of letters a complete answer contains.
    pub fn len(&self) -> usize {
        match self {
            AnswerKey::Single(_) => 1,
            AnswerKey::Multiple(set) => set.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parses the stored column: array-looking text is a letter set,
    /// anything else is a single letter.
    pub fn parse_stored(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.starts_with('[') {
            let letters: BTreeSet<Letter> =
                serde_json::from_str(trimmed).map_err(|e| format!("bad answer array: {}", e))?;
            if letters.is_empty() {
                return Err("answer array is empty".to_string());
            }
            Ok(AnswerKey::Multiple(letters))
        } else {
            Ok(AnswerKey::Single(trimmed.parse()?))
        }
    }

    pub fn to_stored(&self) -> String {
        match self {
            AnswerKey::Single(letter) => letter.to_string(),
            AnswerKey::Multiple(set) => {
                serde_json::to_string(set).unwrap_or_else(|_| "[]".to_string())
            }
        }
    }
}

impl fmt::Display for AnswerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.letters().iter().map(|l| l.to_string()).collect();
        write!(f, "{}", joined.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty '{}'", other)),
        }
    }
}

fn default_category() -> String {
    "SAA".to_string()
}

/// A question of the bank, normalized into typed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub question_text: String,
    pub options: BTreeMap<Letter, String>,
    pub answer: AnswerKey,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Question {
    pub fn is_multiple(&self) -> bool {
        self.answer.is_multiple()
    }

    pub fn has_option(&self, letter: Letter) -> bool {
        self.options.contains_key(&letter)
    }

    /// Explanation text, if any non-blank explanation was recorded.
    pub fn explanation(&self) -> Option<&str> {
        self.explanation
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// Raw row of the `questions` table, before normalization.
#[derive(Debug, Clone, FromRow)]
pub struct QuestionRow {
    pub id: String,
    pub question_text: String,
    pub options: String,
    pub answer: String,
    pub explanation: Option<String>,
    pub category: String,
    pub difficulty: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = String;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        let options: BTreeMap<Letter, String> = serde_json::from_str(&row.options)
            .map_err(|e| format!("question {}: bad options: {}", row.id, e))?;
        let answer = AnswerKey::parse_stored(&row.answer)
            .map_err(|e| format!("question {}: {}", row.id, e))?;
        check_answer_in_options(&options, &answer)
            .map_err(|e| format!("question {}: {}", row.id, e))?;

        Ok(Question {
            id: row.id,
            question_text: row.question_text,
            options,
            answer,
            explanation: row.explanation,
            category: row.category,
            difficulty: row.difficulty.parse().unwrap_or_default(),
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

/// Every canonical letter must be an option key.
pub fn check_answer_in_options(
    options: &BTreeMap<Letter, String>,
    answer: &AnswerKey,
) -> Result<(), String> {
    if answer.is_empty() {
        return Err("answer must not be empty".to_string());
    }
    match answer.letters().into_iter().find(|l| !options.contains_key(l)) {
        Some(missing) => Err(format!("answer '{}' is not one of the options", missing)),
        None => Ok(()),
    }
}

/// DTO for creating a question; also the merged form of an update.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuestionDraft {
    #[validate(
        length(max = 5000),
        custom(function = validate_not_blank, message = "Question text is required.")
    )]
    pub question_text: String,
    #[validate(custom(function = validate_options))]
    pub options: BTreeMap<Letter, String>,
    pub answer: AnswerKey,
    #[validate(length(max = 5000))]
    pub explanation: Option<String>,
    #[validate(length(max = 100), custom(function = validate_not_blank))]
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl QuestionDraft {
    /// Field validation plus the answer-in-options invariant.
    pub fn check(&self) -> Result<(), crate::error::AppError> {
        self.validate()?;
        check_answer_in_options(&self.options, &self.answer)
            .map_err(crate::error::AppError::BadRequest)
    }

    /// Strips markup from every free-text field.
    pub fn sanitized(mut self) -> Self {
        use crate::utils::html::clean_html;

        self.question_text = clean_html(&self.question_text);
        self.options = self
            .options
            .into_iter()
            .map(|(k, v)| (k, clean_html(&v)))
            .collect();
        self.explanation = self.explanation.map(|e| clean_html(&e));
        self.category = clean_html(&self.category);
        self
    }

    pub fn apply(mut self, patch: QuestionPatch) -> Self {
        if let Some(text) = patch.question_text {
            self.question_text = text;
        }
        if let Some(options) = patch.options {
            self.options = options;
        }
        if let Some(answer) = patch.answer {
            self.answer = answer;
        }
        if let Some(explanation) = patch.explanation {
            self.explanation = Some(explanation);
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(difficulty) = patch.difficulty {
            self.difficulty = difficulty;
        }
        self
    }
}

impl From<Question> for QuestionDraft {
    fn from(q: Question) -> Self {
        QuestionDraft {
            question_text: q.question_text,
            options: q.options,
            answer: q.answer,
            explanation: q.explanation,
            category: q.category,
            difficulty: q.difficulty,
        }
    }
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Default, Deserialize)]
pub struct QuestionPatch {
    pub question_text: Option<String>,
    pub options: Option<BTreeMap<Letter, String>>,
    pub answer: Option<AnswerKey>,
    pub explanation: Option<String>,
    pub category: Option<String>,
    pub difficulty: Option<Difficulty>,
}

impl QuestionPatch {
    pub fn is_empty(&self) -> bool {
        self.question_text.is_none()
            && self.options.is_none()
            && self.answer.is_none()
            && self.explanation.is_none()
            && self.category.is_none()
            && self.difficulty.is_none()
    }
}

/// Query parameters for the admin question listing.
#[derive(Debug, Default, Deserialize)]
pub struct QuestionListParams {
    /// Case-insensitive keyword matched against the question text.
    pub q: Option<String>,
    pub offset: Option<i64>,
    /// Number of items to return (default: 20, max: 100).
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct QuestionPage {
    pub items: Vec<Question>,
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}

fn validate_not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("must_not_be_blank"));
    }
    Ok(())
}

fn validate_options(options: &BTreeMap<Letter, String>) -> Result<(), validator::ValidationError> {
    if options.len() < 4 || options.len() > 6 {
        return Err(validator::ValidationError::new("options_must_have_4_to_6_entries"));
    }
    for text in options.values() {
        if text.trim().is_empty() {
            return Err(validator::ValidationError::new("option_cannot_be_empty"));
        }
        if text.len() > 1000 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}
