// src/services/exam.rs

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::exam::registry::ExamRegistry;
use crate::exam::resume::{ResumeSnapshot, ResumeStore};
use crate::exam::session::{Cancelled, ExamSession, FinishOutcome, Phase, Step};
use crate::exam::timer::spawn_periodic;
use crate::exam::view::ExamView;
use crate::exam::{ExamLength, ExamMode};
use crate::models::question::Letter;
use crate::models::user::User;
use crate::services::bank::QuestionBank;
use crate::services::results::ResultService;
use crate::store::DeviceStorage;

const TICK: Duration = Duration::from_secs(1);
const SWEEP: Duration = Duration::from_secs(60);

/// Summary of a saved full-length practice run.
#[derive(Debug, Clone, Serialize)]
pub struct ResumeInfo {
    pub position: usize,
    pub total: usize,
    pub answered: usize,
    pub started_at: DateTime<Utc>,
}

impl From<&ResumeSnapshot> for ResumeInfo {
    fn from(snapshot: &ResumeSnapshot) -> Self {
        ResumeInfo {
            position: snapshot.position,
            total: snapshot.question_ids.len(),
            answered: snapshot.answers.iter().filter(|a| a.is_set()).count(),
            started_at: snapshot.started_at,
        }
    }
}

/// Work left over after a transition, done once the registry lock is released.
struct Followup {
    owner: Option<String>,
    resumable: bool,
    snapshot: Option<ResumeSnapshot>,
    finished: Option<FinishOutcome>,
    /// This caller holds the session's persist claim.
    persist: bool,
}

impl Followup {
    fn capture(session: &mut ExamSession, finished: Option<FinishOutcome>) -> Self {
        let persist = finished.is_some() && session.claim_persist();
        Followup {
            owner: session.owner().map(str::to_string),
            resumable: session.is_resumable(),
            snapshot: session.to_snapshot(),
            finished,
            persist,
        }
    }
}

/// Drives exam sessions: drawing, answering, navigation, completion and resume.
#[derive(Clone)]
pub struct ExamService {
    registry: ExamRegistry,
    bank: QuestionBank,
    results: ResultService,
}

fn viewer_id(viewer: Option<&User>) -> Option<&str> {
    viewer.map(|u| u.id.as_str())
}

impl ExamService {
    pub fn new(bank: QuestionBank, results: ResultService) -> Self {
        Self {
            registry: ExamRegistry::new(),
            bank,
            results,
        }
    }

    pub fn registry(&self) -> &ExamRegistry {
        &self.registry
    }

    /// Periodically drops expired sessions for the lifetime of the process.
    pub fn spawn_sweeper(&self) {
        let registry = self.registry.clone();
        spawn_periodic(SWEEP, move || {
            let registry = registry.clone();
            async move {
                let evicted = registry.evict_expired(Utc::now()).await;
                if evicted > 0 {
                    tracing::debug!("Evicted {} expired exam sessions", evicted);
                }
                true
            }
        });
    }

    pub async fn start(
        &self,
        viewer: Option<&User>,
        mode: ExamMode,
        length: ExamLength,
    ) -> Result<ExamView, AppError> {
        let bank = self.bank.load().await?;
        let session = {
            let mut rng = rand::thread_rng();
            ExamSession::start(
                &bank,
                mode,
                length,
                viewer.map(|u| u.id.clone()),
                &mut rng,
                Utc::now(),
            )?
        };
        let view = ExamView::from(&session);
        self.registry.insert(session).await;

        tracing::info!(
            "Exam {} started: {} {} with {} questions",
            view.id,
            mode,
            length,
            view.total
        );
        Ok(view)
    }

    pub async fn view(&self, id: Uuid, viewer: Option<&User>) -> Result<ExamView, AppError> {
        self.registry
            .with_session(id, viewer_id(viewer), |s| ExamView::from(&*s))
            .await
    }

    /// Starts the countdown of a timed run.
    pub async fn confirm(&self, id: Uuid, viewer: Option<&User>) -> Result<ExamView, AppError> {
        let view = self
            .registry
            .with_session(id, viewer_id(viewer), |s| {
                s.confirm_start(Utc::now())?;
                Ok::<_, AppError>(ExamView::from(&*s))
            })
            .await??;

        let service = self.clone();
        spawn_periodic(TICK, move || {
            let service = service.clone();
            async move { service.tick(id).await }
        });
        Ok(view)
    }

    /// One countdown step. Returns false once there is nothing left to count.
    pub async fn tick(&self, id: Uuid) -> bool {
        let step = self
            .registry
            .with_any(id, |s| {
                let finished = s.tick(Utc::now());
                let running = s.phase() != Phase::Completed;
                (running, finished.map(|f| Followup::capture(s, Some(f))))
            })
            .await;

        match step {
            None => false,
            Some((running, followup)) => {
                if let Some(followup) = followup {
                    if let Err(e) = self.follow_up(id, followup, None).await {
                        tracing::error!("Failed to store timed-out exam {}: {:?}", id, e);
                    }
                }
                running
            }
        }
    }

    pub async fn answer(
        &self,
        id: Uuid,
        viewer: Option<&User>,
        letter: Letter,
    ) -> Result<ExamView, AppError> {
        self.registry
            .with_session(id, viewer_id(viewer), |s| {
                s.select_answer(letter)?;
                Ok::<_, AppError>(ExamView::from(&*s))
            })
            .await?
    }

    pub async fn reveal(&self, id: Uuid, viewer: Option<&User>) -> Result<ExamView, AppError> {
        self.registry
            .with_session(id, viewer_id(viewer), |s| {
                s.reveal()?;
                Ok::<_, AppError>(ExamView::from(&*s))
            })
            .await?
    }

    /// Moves forward, finishing the run from the last question.
    pub async fn next(
        &self,
        id: Uuid,
        viewer: Option<&User>,
        device: &DeviceStorage,
    ) -> Result<ExamView, AppError> {
        let followup = self
            .registry
            .with_session(id, viewer_id(viewer), |s| {
                let finished = match s.next(Utc::now())? {
                    Step::Moved(_) => None,
                    Step::Finished(outcome) => Some(outcome),
                };
                Ok::<_, AppError>(Followup::capture(s, finished))
            })
            .await??;

        self.follow_up(id, followup, Some(device)).await?;
        self.view(id, viewer).await
    }

    pub async fn previous(
        &self,
        id: Uuid,
        viewer: Option<&User>,
        device: &DeviceStorage,
    ) -> Result<ExamView, AppError> {
        let followup = self
            .registry
            .with_session(id, viewer_id(viewer), |s| {
                s.previous()?;
                Ok::<_, AppError>(Followup::capture(s, None))
            })
            .await??;

        self.follow_up(id, followup, Some(device)).await?;
        self.view(id, viewer).await
    }

    pub async fn finish(
        &self,
        id: Uuid,
        viewer: Option<&User>,
        device: &DeviceStorage,
    ) -> Result<ExamView, AppError> {
        let followup = self
            .registry
            .with_session(id, viewer_id(viewer), |s| {
                let outcome = s.finish(Utc::now())?;
                Ok::<_, AppError>(Followup::capture(s, Some(outcome)))
            })
            .await??;

        self.follow_up(id, followup, Some(device)).await?;
        self.view(id, viewer).await
    }

    /// Saves resume progress, or stores the result of a completed run.
    ///
    /// Only the holder of the session's persist claim stores anything. A
    /// failed store releases the claim, so finishing again retries it.
    async fn follow_up(
        &self,
        id: Uuid,
        followup: Followup,
        device: Option<&DeviceStorage>,
    ) -> Result<(), AppError> {
        let resume = device.cloned().map(ResumeStore::new);

        let Some(outcome) = followup.finished else {
            if let (Some(owner), Some(snapshot), Some(resume)) =
                (&followup.owner, &followup.snapshot, &resume)
            {
                resume.save_snapshot(owner, snapshot).await?;
            }
            return Ok(());
        };

        if outcome.newly_completed {
            tracing::info!("Exam {} completed with score {}", id, outcome.report.score);
        }
        if !followup.persist {
            return Ok(());
        }

        let result_id = match self
            .results
            .persist(followup.owner.as_deref(), &outcome.report)
            .await
        {
            Ok(result_id) => result_id,
            Err(e) => {
                self.registry.with_any(id, |s| s.settle_persist(None)).await;
                return Err(e);
            }
        };
        self.registry
            .with_any(id, |s| s.settle_persist(result_id))
            .await;

        if let (true, Some(owner), Some(resume)) = (followup.resumable, &followup.owner, &resume) {
            resume.clear(owner).await?;
        }
        Ok(())
    }

    /// Discards a run. A saved full-length practice snapshot is left alone.
    pub async fn cancel(&self, id: Uuid, viewer: Option<&User>) -> Result<Cancelled, AppError> {
        let session = self.registry.remove(id, viewer_id(viewer)).await?;
        tracing::info!("Exam {} cancelled", id);
        Ok(session.cancel())
    }

    pub async fn saved_progress(
        &self,
        user: &User,
        device: &DeviceStorage,
    ) -> Result<Option<ResumeInfo>, AppError> {
        let snapshot = ResumeStore::new(device.clone()).load(&user.id).await?;
        Ok(snapshot.as_ref().map(ResumeInfo::from))
    }

    /// Rebuilds the saved full-length practice run as a new live session.
    pub async fn resume(&self, user: &User, device: &DeviceStorage) -> Result<ExamView, AppError> {
        let store = ResumeStore::new(device.clone());
        let no_progress = || AppError::NotFound("No saved progress to resume".to_string());

        let snapshot = store.load(&user.id).await?.ok_or_else(no_progress)?;
        let bank = self.bank.load().await?;

        let Some(session) =
            ExamSession::restore(&snapshot, &bank, Some(user.id.clone()), Utc::now())
        else {
            store.clear(&user.id).await?;
            return Err(no_progress());
        };

        let view = ExamView::from(&session);
        self.registry.insert(session).await;
        tracing::info!("Exam {} resumed at question {}", view.id, view.position + 1);
        Ok(view)
    }

    pub async fn discard_progress(&self, user: &User, device: &DeviceStorage) -> Result<(), AppError> {
        ResumeStore::new(device.clone()).clear(&user.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::session::AnswerSlot;
    use crate::models::question::{AnswerKey, Difficulty, QuestionDraft};
    use crate::exam::scoring::ExamReport;
    use crate::models::exam_result::{ExamResult, QuestionResult, ResultWithUser};
    use crate::store::{
        IdentityProvider, MemoryLocalStore, QuestionStore, ResultStore, SqlIdentityProvider,
        SqlQuestionStore, SqlResultStore, test_pool,
    };
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails its first insert, then delegates.
    struct FlakyResults {
        inner: SqlResultStore,
        inserts: AtomicUsize,
    }

    #[async_trait]
    impl ResultStore for FlakyResults {
        async fn insert(&self, user_id: &str, report: &ExamReport) -> Result<String, AppError> {
            if self.inserts.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(AppError::InternalServerError("network".into()));
            }
            self.inner.insert(user_id, report).await
        }

        async fn history(&self, user_id: &str) -> Result<Vec<ExamResult>, AppError> {
            self.inner.history(user_id).await
        }

        async fn wrong_answers(&self, user_id: &str) -> Result<Vec<QuestionResult>, AppError> {
            self.inner.wrong_answers(user_id).await
        }

        async fn all_with_users(&self) -> Result<Vec<ResultWithUser>, AppError> {
            self.inner.all_with_users().await
        }
    }

    struct Fixture {
        service: ExamService,
        results: ResultService,
        user: User,
        device: DeviceStorage,
    }

    async fn fixture(questions: usize) -> Fixture {
        let pool = test_pool().await;
        let store = SqlQuestionStore::new(pool.clone());
        for i in 0..questions {
            let options = "ABCD"
                .chars()
                .map(|c| (Letter::new(c).unwrap(), format!("Option {}", c)))
                .collect();
            store
                .create(&QuestionDraft {
                    question_text: format!("Question {}", i),
                    options,
                    answer: AnswerKey::Single(Letter::new('A').unwrap()),
                    explanation: None,
                    category: "SAA".into(),
                    difficulty: Difficulty::Medium,
                })
                .await
                .unwrap();
        }
        let identity = SqlIdentityProvider::new(pool.clone(), "s".into(), 60);
        let user = identity.sign_up("alice", "secret1").await.unwrap().user;
        let results = ResultService::new(Arc::new(SqlResultStore::new(pool)));

        Fixture {
            service: ExamService::new(QuestionBank::new(Arc::new(store)), results.clone()),
            results,
            user,
            device: DeviceStorage::new(Arc::new(MemoryLocalStore::new()), "laptop"),
        }
    }

    fn a() -> Letter {
        Letter::new('A').unwrap()
    }

    #[tokio::test]
    async fn signed_in_finish_is_stored_once() {
        let f = fixture(3).await;
        let view = f.service.start(Some(&f.user), ExamMode::Practice, ExamLength::Short).await.unwrap();
        f.service.answer(view.id, Some(&f.user), a()).await.unwrap();

        let done = f.service.finish(view.id, Some(&f.user), &f.device).await.unwrap();
        assert_eq!(done.phase, Phase::Completed);
        assert!(done.saved_result_id.is_some());
        assert_eq!(done.report.unwrap().score, 333);

        f.service.finish(view.id, Some(&f.user), &f.device).await.unwrap();
        assert_eq!(f.results.history(&f.user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_store_is_retried_by_the_next_finish() {
        let f = fixture(3).await;
        let pool = test_pool().await;
        let identity = SqlIdentityProvider::new(pool.clone(), "s".into(), 60);
        let user = identity.sign_up("alice", "secret1").await.unwrap().user;
        let flaky = Arc::new(FlakyResults {
            inner: SqlResultStore::new(pool),
            inserts: AtomicUsize::new(0),
        });
        let results = ResultService::new(flaky.clone());
        let service = ExamService::new(f.service.bank.clone(), results.clone());

        let view = service.start(Some(&user), ExamMode::Practice, ExamLength::Short).await.unwrap();
        assert!(matches!(
            service.finish(view.id, Some(&user), &f.device).await,
            Err(AppError::InternalServerError(_))
        ));
        let stalled = service.view(view.id, Some(&user)).await.unwrap();
        assert_eq!(stalled.phase, Phase::Completed);
        assert!(stalled.saved_result_id.is_none());

        let done = service.finish(view.id, Some(&user), &f.device).await.unwrap();
        assert!(done.saved_result_id.is_some());
        assert_eq!(results.history(&user.id).await.unwrap().len(), 1);

        service.finish(view.id, Some(&user), &f.device).await.unwrap();
        assert_eq!(flaky.inserts.load(Ordering::SeqCst), 2);
        assert_eq!(results.history(&user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn anonymous_finish_is_not_stored() {
        let f = fixture(3).await;
        let view = f.service.start(None, ExamMode::Practice, ExamLength::Short).await.unwrap();
        let done = f.service.finish(view.id, None, &f.device).await.unwrap();
        assert!(done.report.is_some());
        assert!(done.saved_result_id.is_none());
        assert!(f.results.history(&f.user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn countdown_expiry_stores_the_result() {
        let f = fixture(3).await;
        let view = f.service.start(Some(&f.user), ExamMode::Exam, ExamLength::Short).await.unwrap();
        assert_eq!(view.phase, Phase::AwaitingStart);
        assert!(f.service.tick(view.id).await, "waiting sessions keep their countdown");

        f.service
            .registry()
            .with_any(view.id, |s| s.confirm_start(Utc::now()))
            .await
            .unwrap()
            .unwrap();
        let mut ticks = 0;
        while f.service.tick(view.id).await {
            ticks += 1;
        }
        assert_eq!(ticks, 1199);

        let done = f.service.view(view.id, Some(&f.user)).await.unwrap();
        assert_eq!(done.phase, Phase::Completed);
        assert!(done.saved_result_id.is_some());

        // A manual finish racing the countdown does not store a second copy.
        f.service.finish(view.id, Some(&f.user), &f.device).await.unwrap();
        assert_eq!(f.results.history(&f.user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn full_practice_saves_and_resumes() {
        let f = fixture(4).await;
        let user = Some(&f.user);
        let view = f.service.start(user, ExamMode::Practice, ExamLength::Full).await.unwrap();
        assert!(f.service.saved_progress(&f.user, &f.device).await.unwrap().is_none());

        f.service.answer(view.id, user, a()).await.unwrap();
        f.service.next(view.id, user, &f.device).await.unwrap();
        f.service.next(view.id, user, &f.device).await.unwrap();

        let saved = f.service.saved_progress(&f.user, &f.device).await.unwrap().unwrap();
        assert_eq!(saved.position, 2);
        assert_eq!(saved.total, 4);
        assert_eq!(saved.answered, 1);

        let cancelled = f.service.cancel(view.id, user).await.unwrap();
        assert!(cancelled.snapshot_retained);
        assert!(f.service.saved_progress(&f.user, &f.device).await.unwrap().is_some());

        let resumed = f.service.resume(&f.user, &f.device).await.unwrap();
        assert_ne!(resumed.id, view.id);
        assert_eq!(resumed.position, 2);
        assert_eq!(resumed.answered, 1);

        f.service.finish(resumed.id, user, &f.device).await.unwrap();
        assert!(f.service.saved_progress(&f.user, &f.device).await.unwrap().is_none());
        assert!(f.service.resume(&f.user, &f.device).await.is_err());
    }

    #[tokio::test]
    async fn other_users_cannot_touch_a_session() {
        let f = fixture(3).await;
        let view = f.service.start(Some(&f.user), ExamMode::Practice, ExamLength::Short).await.unwrap();
        let mut intruder = f.user.clone();
        intruder.id = "someone-else".into();

        assert!(matches!(
            f.service.answer(view.id, Some(&intruder), a()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(f.service.view(view.id, None).await.is_err());
    }

    #[tokio::test]
    async fn answer_rejected_in_wrong_phase() {
        let f = fixture(3).await;
        let view = f.service.start(None, ExamMode::Exam, ExamLength::Full).await.unwrap();
        assert!(matches!(
            f.service.answer(view.id, None, a()).await,
            Err(AppError::Conflict(_))
        ));
        let confirmed = f.service.confirm(view.id, None).await.unwrap();
        assert_eq!(confirmed.phase, Phase::InProgress);
        let answered = f.service.answer(view.id, None, a()).await.unwrap();
        assert_eq!(answered.current.unwrap().selected, AnswerSlot::Single(a()));
        f.service.cancel(view.id, None).await.unwrap();
    }
}
