// src/exam/registry.rs

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::{COMPLETED_SESSION_TTL_MINS, IDLE_SESSION_TTL_MINS, MAX_ANONYMOUS_SESSIONS};
use crate::error::AppError;
use crate::exam::session::{ExamSession, Phase};

/// How long sessions are kept around.
#[derive(Debug, Clone, Copy)]
pub struct Retention {
    pub completed_ttl: Duration,
    pub idle_ttl: Duration,
    pub max_anonymous: usize,
}

impl Default for Retention {
    fn default() -> Self {
        Retention {
            completed_ttl: Duration::minutes(COMPLETED_SESSION_TTL_MINS),
            idle_ttl: Duration::minutes(IDLE_SESSION_TTL_MINS),
            max_anonymous: MAX_ANONYMOUS_SESSIONS,
        }
    }
}

impl Retention {
    fn expired(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        let idle = now - entry.touched;
        let ttl = if entry.session.phase() == Phase::Completed {
            self.completed_ttl
        } else {
            self.idle_ttl
        };
        idle > ttl
    }
}

struct Entry {
    session: ExamSession,
    /// Last request made against the session. Countdown ticks do not count.
    touched: DateTime<Utc>,
}

/// Active sessions, keyed by id.
///
/// Every transition runs under the lock; callers clone whatever they need to
/// persist and release the lock before doing any I/O.
#[derive(Clone, Default)]
pub struct ExamRegistry {
    sessions: Arc<Mutex<HashMap<Uuid, Entry>>>,
    retention: Retention,
}

fn not_found() -> AppError {
    AppError::NotFound("Exam session not found".to_string())
}

/// Sessions with an owner are only visible to that owner. Anonymous sessions
/// are reachable by anyone holding the id.
fn visible_to(session: &ExamSession, viewer: Option<&str>) -> bool {
    match session.owner() {
        Some(owner) => viewer == Some(owner),
        None => true,
    }
}

fn evict(
    sessions: &mut HashMap<Uuid, Entry>,
    retention: &Retention,
    now: DateTime<Utc>,
) -> usize {
    let before = sessions.len();
    sessions.retain(|_, entry| !retention.expired(entry, now));
    before - sessions.len()
}

impl ExamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Retention) -> Self {
        Self {
            sessions: Arc::default(),
            retention,
        }
    }

    /// Adds a session, dropping expired ones first. A new anonymous session
    /// over the cap pushes out the least recently used anonymous one.
    pub async fn insert(&self, session: ExamSession) -> Uuid {
        let id = session.id();
        let now = Utc::now();
        let mut sessions = self.sessions.lock().await;
        evict(&mut sessions, &self.retention, now);

        if session.owner().is_none() {
            let anonymous: Vec<(Uuid, DateTime<Utc>)> = sessions
                .iter()
                .filter(|(_, entry)| entry.session.owner().is_none())
                .map(|(id, entry)| (*id, entry.touched))
                .collect();
            if anonymous.len() >= self.retention.max_anonymous {
                let mut by_age = anonymous;
                by_age.sort_by_key(|(_, touched)| *touched);
                let excess = by_age.len() + 1 - self.retention.max_anonymous;
                for (stale, _) in by_age.into_iter().take(excess) {
                    sessions.remove(&stale);
                }
                tracing::warn!("Anonymous session cap reached; dropped {} oldest", excess);
            }
        }

        sessions.insert(id, Entry { session, touched: now });
        id
    }

    /// Runs `f` against a session while holding the registry lock.
    pub async fn with_session<F, R>(&self, id: Uuid, viewer: Option<&str>, f: F) -> Result<R, AppError>
    where
        F: FnOnce(&mut ExamSession) -> R,
    {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(&id)
            .filter(|e| visible_to(&e.session, viewer))
            .ok_or_else(not_found)?;
        entry.touched = Utc::now();
        Ok(f(&mut entry.session))
    }

    /// Like `with_session`, without the owner check. Used by the countdown.
    pub async fn with_any<F, R>(&self, id: Uuid, f: F) -> Option<R>
    where
        F: FnOnce(&mut ExamSession) -> R,
    {
        let mut sessions = self.sessions.lock().await;
        sessions.get_mut(&id).map(|entry| f(&mut entry.session))
    }

    pub async fn remove(&self, id: Uuid, viewer: Option<&str>) -> Result<ExamSession, AppError> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(&id) {
            Some(entry) if visible_to(&entry.session, viewer) => sessions
                .remove(&id)
                .map(|entry| entry.session)
                .ok_or_else(not_found),
            _ => Err(not_found()),
        }
    }

    /// Drops completed and idle sessions past their retention. Returns how
    /// many went.
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.lock().await;
        evict(&mut sessions, &self.retention, now)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::fixtures::bank;
    use crate::exam::{ExamLength, ExamMode};
    use chrono::Utc;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn session(owner: Option<&str>) -> ExamSession {
        ExamSession::start(
            &bank(3),
            ExamMode::Practice,
            ExamLength::Short,
            owner.map(str::to_string),
            &mut StdRng::seed_from_u64(2),
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn owned_sessions_are_private() {
        let registry = ExamRegistry::new();
        let id = registry.insert(session(Some("alice"))).await;

        assert!(registry.with_session(id, Some("alice"), |s| s.len()).await.is_ok());
        assert!(registry.with_session(id, Some("bob"), |s| s.len()).await.is_err());
        assert!(registry.with_session(id, None, |s| s.len()).await.is_err());
        assert!(registry.remove(id, Some("bob")).await.is_err());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn completed_sessions_go_before_idle_ones() {
        let registry = ExamRegistry::new();
        let done = registry.insert(session(Some("alice"))).await;
        let running = registry.insert(session(None)).await;
        registry
            .with_session(done, Some("alice"), |s| s.finish(Utc::now()))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(registry.evict_expired(Utc::now()).await, 0);

        let later = Utc::now() + Duration::minutes(COMPLETED_SESSION_TTL_MINS + 1);
        assert_eq!(registry.evict_expired(later).await, 1);
        assert!(registry.with_any(done, |_| ()).await.is_none());
        assert!(registry.with_any(running, |_| ()).await.is_some());

        let much_later = Utc::now() + Duration::minutes(IDLE_SESSION_TTL_MINS + 1);
        assert_eq!(registry.evict_expired(much_later).await, 1);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn anonymous_sessions_are_capped() {
        let registry = ExamRegistry::with_retention(Retention {
            max_anonymous: 3,
            ..Retention::default()
        });
        let owned = registry.insert(session(Some("alice"))).await;
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(registry.insert(session(None)).await);
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        assert_eq!(registry.len().await, 4);
        assert!(registry.with_any(owned, |_| ()).await.is_some());
        for id in &ids[..2] {
            assert!(registry.with_any(*id, |_| ()).await.is_none());
        }
        for id in &ids[2..] {
            assert!(registry.with_any(*id, |_| ()).await.is_some());
        }
    }

    #[tokio::test]
    async fn anonymous_sessions_open_by_id() {
        let registry = ExamRegistry::new();
        let id = registry.insert(session(None)).await;
        assert_eq!(registry.with_session(id, None, |s| s.len()).await.unwrap(), 3);

        registry.remove(id, None).await.unwrap();
        assert!(registry.is_empty().await);
        assert!(registry.with_any(id, |s| s.len()).await.is_none());
    }
}
