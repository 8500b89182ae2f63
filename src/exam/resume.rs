// src/exam/resume.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::exam::session::{AnswerSlot, ExamSession};
use crate::store::DeviceStorage;

/// Saved progress of a full-length practice run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeSnapshot {
    pub question_ids: Vec<String>,
    pub position: usize,
    #[serde(default)]
    pub answers: Vec<AnswerSlot>,
    pub started_at: DateTime<Utc>,
}

impl ResumeSnapshot {
    /// Validates a stored value.
    ///
    /// Anything that is not an object with a non-empty array of string ids and
    /// an integer position of at least 1 is rejected. Unreadable answers are
    /// dropped rather than rejecting the snapshot.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;

        let ids = object.get("question_ids")?.as_array()?;
        if ids.is_empty() {
            return None;
        }
        let question_ids = ids
            .iter()
            .map(|id| id.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()?;

        let position = object.get("position")?.as_u64()?;
        if position < 1 {
            return None;
        }

        let answers = object
            .get("answers")
            .and_then(|raw| serde_json::from_value::<Vec<AnswerSlot>>(raw.clone()).ok())
            .unwrap_or_default();

        let started_at = object
            .get("started_at")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Some(ResumeSnapshot {
            question_ids,
            position: usize::try_from(position).ok()?,
            answers,
            started_at,
        })
    }

    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str::<Value>(raw)
            .ok()
            .and_then(|value| Self::from_value(&value))
    }
}

fn resume_key(user_id: &str) -> String {
    format!("resume:{}:practice-full", user_id)
}

/// Resume snapshots of one device, one per user.
#[derive(Clone)]
pub struct ResumeStore {
    device: DeviceStorage,
}

impl ResumeStore {
    pub fn new(device: DeviceStorage) -> Self {
        Self { device }
    }

    /// Overwrites the user's snapshot. Returns false when the session is not
    /// in a resumable state and nothing was written.
    pub async fn save(&self, user_id: &str, session: &ExamSession) -> Result<bool, AppError> {
        match session.to_snapshot() {
            Some(snapshot) => self.save_snapshot(user_id, &snapshot).await.map(|_| true),
            None => Ok(false),
        }
    }

    pub async fn save_snapshot(&self, user_id: &str, snapshot: &ResumeSnapshot) -> Result<(), AppError> {
        self.device.set_json(&resume_key(user_id), snapshot).await
    }

    pub async fn load(&self, user_id: &str) -> Result<Option<ResumeSnapshot>, AppError> {
        let key = resume_key(user_id);
        let Some(raw) = self.device.get(&key).await? else {
            return Ok(None);
        };
        let snapshot = ResumeSnapshot::from_json(&raw);
        if snapshot.is_none() {
            tracing::warn!("Ignoring invalid resume snapshot on device {}", self.device.device_id());
        }
        Ok(snapshot)
    }

    pub async fn clear(&self, user_id: &str) -> Result<(), AppError> {
        self.device.remove(&resume_key(user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::fixtures::{bank, letter};
    use crate::exam::{ExamLength, ExamMode};
    use crate::store::MemoryLocalStore;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> ResumeStore {
        ResumeStore::new(DeviceStorage::new(Arc::new(MemoryLocalStore::new()), "dev"))
    }

    fn session(mode: ExamMode, length: ExamLength) -> ExamSession {
        ExamSession::start(
            &bank(4),
            mode,
            length,
            Some("u1".into()),
            &mut StdRng::seed_from_u64(1),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_invalid_shapes() {
        let invalid = [
            json!(null),
            json!([1, 2]),
            json!({"position": 2}),
            json!({"question_ids": [], "position": 2}),
            json!({"question_ids": ["a", 3], "position": 2}),
            json!({"question_ids": ["a"], "position": 0}),
            json!({"question_ids": ["a"], "position": 1.5}),
            json!({"question_ids": ["a"], "position": -1}),
            json!({"question_ids": "a", "position": 1}),
        ];
        for value in invalid {
            assert!(ResumeSnapshot::from_value(&value).is_none(), "{}", value);
        }
    }

    #[test]
    fn accepts_minimal_snapshot() {
        let snapshot =
            ResumeSnapshot::from_value(&json!({"question_ids": ["a", "b"], "position": 1}))
                .unwrap();
        assert_eq!(snapshot.question_ids, vec!["a", "b"]);
        assert_eq!(snapshot.position, 1);
        assert!(snapshot.answers.is_empty());
    }

    #[test]
    fn unreadable_answers_are_dropped() {
        let snapshot = ResumeSnapshot::from_value(&json!({
            "question_ids": ["a", "b"],
            "position": 1,
            "answers": "oops"
        }))
        .unwrap();
        assert!(snapshot.answers.is_empty());
    }

    #[tokio::test]
    async fn save_load_clear() {
        let store = store();
        let mut run = session(ExamMode::Practice, ExamLength::Full);
        run.select_answer(letter('A')).unwrap();
        run.next(Utc::now()).unwrap();

        assert!(store.save("u1", &run).await.unwrap());
        let loaded = store.load("u1").await.unwrap().unwrap();
        assert_eq!(loaded, run.to_snapshot().unwrap());
        assert!(store.load("u2").await.unwrap().is_none());

        store.clear("u1").await.unwrap();
        assert!(store.load("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_skips_ineligible_sessions() {
        let store = store();
        let fresh = session(ExamMode::Practice, ExamLength::Full);
        assert!(!store.save("u1", &fresh).await.unwrap());

        let mut short = session(ExamMode::Practice, ExamLength::Short);
        short.next(Utc::now()).unwrap();
        assert!(!store.save("u1", &short).await.unwrap());
        assert!(store.load("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_value_loads_as_absent() {
        let device = DeviceStorage::new(Arc::new(MemoryLocalStore::new()), "dev");
        device.set("resume:u1:practice-full", "not json").await.unwrap();
        let store = ResumeStore::new(device);
        assert!(store.load("u1").await.unwrap().is_none());
    }
}
