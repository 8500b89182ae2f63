// src/exam/draw.rs

use rand::Rng;

use crate::config::{
    FULL_EXAM_QUESTION_COUNT, FULL_EXAM_SECONDS, PRACTICE_SHORT_COUNT, SHORT_EXAM_QUESTION_COUNT,
    SHORT_EXAM_SECONDS,
};
use crate::exam::shuffle::shuffle_with;
use crate::exam::{ExamLength, ExamMode};
use crate::models::question::Question;

/// How a session picks its questions out of the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawPlan {
    /// Upper bound on drawn questions; `None` takes the whole bank.
    pub count: Option<usize>,
    pub shuffle: bool,
    /// Countdown budget in seconds, timed mode only.
    pub time_limit_secs: Option<u32>,
}

impl DrawPlan {
    pub fn for_exam(mode: ExamMode, length: ExamLength) -> Self {
        match (mode, length) {
            (ExamMode::Practice, ExamLength::Short) => DrawPlan {
                count: Some(PRACTICE_SHORT_COUNT),
                shuffle: true,
                time_limit_secs: None,
            },
            // Stored order keeps resumed runs stable.
            (ExamMode::Practice, ExamLength::Full) => DrawPlan {
                count: None,
                shuffle: false,
                time_limit_secs: None,
            },
            (ExamMode::Exam, ExamLength::Full) => DrawPlan {
                count: Some(FULL_EXAM_QUESTION_COUNT),
                shuffle: true,
                time_limit_secs: Some(FULL_EXAM_SECONDS),
            },
            (ExamMode::Exam, ExamLength::Short) => DrawPlan {
                count: Some(SHORT_EXAM_QUESTION_COUNT),
                shuffle: true,
                time_limit_secs: Some(SHORT_EXAM_SECONDS),
            },
        }
    }

    /// Number of questions a bank of `bank_size` yields under this plan.
    pub fn question_count(&self, bank_size: usize) -> usize {
        self.count.map_or(bank_size, |n| n.min(bank_size))
    }

    pub fn draw<R: Rng>(&self, bank: &[Question], rng: &mut R) -> Vec<Question> {
        let take = self.question_count(bank.len());
        if self.shuffle {
            let mut drawn = shuffle_with(bank, rng);
            drawn.truncate(take);
            drawn
        } else {
            bank[..take].to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::fixtures::bank;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    #[test]
    fn full_practice_keeps_stored_order() {
        let bank = bank(5);
        let plan = DrawPlan::for_exam(ExamMode::Practice, ExamLength::Full);
        let drawn = plan.draw(&bank, &mut StdRng::seed_from_u64(3));
        assert_eq!(drawn, bank);
        assert_eq!(plan.time_limit_secs, None);
    }

    #[test]
    fn full_exam_draws_65_unique_questions() {
        let bank = bank(200);
        let plan = DrawPlan::for_exam(ExamMode::Exam, ExamLength::Full);
        let drawn = plan.draw(&bank, &mut StdRng::seed_from_u64(9));
        assert_eq!(drawn.len(), 65);
        let ids: HashSet<_> = drawn.iter().map(|q| q.id.clone()).collect();
        assert_eq!(ids.len(), 65);
        assert_eq!(plan.time_limit_secs, Some(7800));
    }

    #[test]
    fn short_exam_uses_twenty_minutes() {
        let plan = DrawPlan::for_exam(ExamMode::Exam, ExamLength::Short);
        assert_eq!(plan.question_count(200), 20);
        assert_eq!(plan.time_limit_secs, Some(20 * 60));
    }

    #[test]
    fn small_bank_is_used_whole() {
        let bank = bank(12);
        let plan = DrawPlan::for_exam(ExamMode::Practice, ExamLength::Short);
        let drawn = plan.draw(&bank, &mut StdRng::seed_from_u64(5));
        assert_eq!(drawn.len(), 12);
        let mut ids: Vec<_> = drawn.iter().map(|q| q.id.clone()).collect();
        let mut expected: Vec<_> = bank.iter().map(|q| q.id.clone()).collect();
        ids.sort();
        expected.sort();
        assert_eq!(ids, expected);
    }
}
