//! Entity storage.
//!
//! [`QuestStore`] is the transactional repository the services are written
//! against. Multi-entity writes ([`create_quiz`](QuestStore::create_quiz),
//! [`commit_evaluation`](QuestStore::commit_evaluation)) are all-or-nothing.
//! [`InMemoryQuestStore`] implements it behind one `tokio::sync::RwLock`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{QuestError, Result};
use crate::model::{
    Achievement, AchievementKind, Document, DocumentStatus, LearnerId, Profile, Progress, Question, Quiz,
    Topic,
};

/// Every write produced by evaluating one quiz.
///
/// `profile.version` and `progress.version` carry the versions that were
/// read; the store rejects the commit with [`QuestError::Conflict`] if the
/// stored rows changed since. A progress row that did not exist when read
/// has version 0.
#[derive(Debug, Clone)]
pub struct EvaluationCommit {
    pub quiz: Quiz,
    pub questions: Vec<Question>,
    pub profile: Profile,
    pub progress: Progress,
    pub achievements: Vec<Achievement>,
}

/// Transactional repository for the quiz domain.
#[async_trait]
pub trait QuestStore: Send + Sync {
    async fn insert_topic(&self, topic: Topic) -> Result<()>;
    async fn topic(&self, id: Uuid) -> Result<Option<Topic>>;

    async fn insert_document(&self, document: Document) -> Result<()>;
    async fn document(&self, id: Uuid) -> Result<Option<Document>>;
    /// Overwrite an existing document row.
    async fn update_document(&self, document: &Document) -> Result<()>;
    /// Atomically move a `pending` or `failed` document to `processing`.
    ///
    /// Returns the stored document and whether this call made the
    /// transition. A `processing` or `completed` document is returned
    /// unchanged with `false`.
    ///
    /// # Errors
    ///
    /// Returns [`QuestError::NotFound`] if the document does not exist.
    async fn begin_processing(&self, id: Uuid) -> Result<(Document, bool)>;
    async fn documents_for_topic(&self, topic_id: Uuid) -> Result<Vec<Document>>;
    async fn delete_document(&self, id: Uuid) -> Result<()>;

    /// Insert a quiz together with its questions, atomically.
    async fn create_quiz(&self, quiz: Quiz, questions: Vec<Question>) -> Result<()>;
    async fn quiz(&self, id: Uuid) -> Result<Option<Quiz>>;
    async fn questions(&self, quiz_id: Uuid) -> Result<Vec<Question>>;
    /// A learner's quizzes, newest first, optionally limited to one topic.
    async fn quizzes_for_learner(&self, learner_id: LearnerId, topic_id: Option<Uuid>) -> Result<Vec<Quiz>>;

    /// Insert a profile. Fails with [`QuestError::Conflict`] if one exists.
    async fn insert_profile(&self, profile: Profile) -> Result<()>;
    async fn profile(&self, learner_id: LearnerId) -> Result<Option<Profile>>;

    async fn progress(&self, learner_id: LearnerId, topic_id: Uuid) -> Result<Option<Progress>>;
    /// Insert a progress row unless one exists for the same learner and
    /// topic; returns the stored row either way.
    async fn insert_progress(&self, progress: Progress) -> Result<Progress>;
    async fn progress_for_learner(&self, learner_id: LearnerId) -> Result<Vec<Progress>>;

    /// A learner's achievements, newest first.
    async fn achievements(&self, learner_id: LearnerId) -> Result<Vec<Achievement>>;
    async fn has_achievement(&self, learner_id: LearnerId, name: &str) -> Result<bool>;

    /// Apply every write of one evaluation, or none of them.
    ///
    /// # Errors
    ///
    /// - [`QuestError::NotFound`] if the quiz or profile is missing
    /// - [`QuestError::Validation`] if the quiz was already evaluated
    /// - [`QuestError::Conflict`] on a version mismatch or a repeated
    ///   milestone achievement
    async fn commit_evaluation(&self, commit: EvaluationCommit) -> Result<()>;
}

#[derive(Debug, Default)]
struct State {
    topics: HashMap<Uuid, Topic>,
    documents: HashMap<Uuid, Document>,
    quizzes: HashMap<Uuid, Quiz>,
    questions: HashMap<Uuid, Vec<Question>>,
    profiles: HashMap<LearnerId, Profile>,
    progress: HashMap<(LearnerId, Uuid), Progress>,
    achievements: Vec<Achievement>,
}

impl State {
    fn check_evaluation(&self, commit: &EvaluationCommit) -> Result<()> {
        let quiz = self
            .quizzes
            .get(&commit.quiz.id)
            .ok_or_else(|| QuestError::not_found("quiz", commit.quiz.id))?;
        if quiz.is_evaluated() {
            return Err(QuestError::Validation(format!("quiz {} was already evaluated", quiz.id)));
        }

        let learner_id = commit.profile.learner_id;
        let profile = self
            .profiles
            .get(&learner_id)
            .ok_or_else(|| QuestError::not_found("profile", learner_id))?;
        if profile.version != commit.profile.version {
            return Err(QuestError::Conflict(format!(
                "profile of {learner_id} changed (read v{}, stored v{})",
                commit.profile.version, profile.version
            )));
        }

        let key = (commit.progress.learner_id, commit.progress.topic_id);
        let stored_version = self.progress.get(&key).map_or(0, |p| p.version);
        if stored_version != commit.progress.version {
            return Err(QuestError::Conflict(format!(
                "progress of {learner_id} on {} changed (read v{}, stored v{stored_version})",
                commit.progress.topic_id, commit.progress.version
            )));
        }

        for achievement in &commit.achievements {
            let repeated = achievement.kind == AchievementKind::Milestone
                && self
                    .achievements
                    .iter()
                    .any(|a| a.learner_id == achievement.learner_id && a.name == achievement.name);
            if repeated {
                return Err(QuestError::Conflict(format!(
                    "milestone '{}' already awarded to {}",
                    achievement.name, achievement.learner_id
                )));
            }
        }

        Ok(())
    }
}

/// In-memory [`QuestStore`] for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryQuestStore {
    state: RwLock<State>,
}

impl InMemoryQuestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
    items
}

#[async_trait]
impl QuestStore for InMemoryQuestStore {
    async fn insert_topic(&self, topic: Topic) -> Result<()> {
        let mut state = self.state.write().await;
        if state.topics.values().any(|t| t.name == topic.name) {
            return Err(QuestError::Conflict(format!("topic '{}' already exists", topic.name)));
        }
        state.topics.insert(topic.id, topic);
        Ok(())
    }

    async fn topic(&self, id: Uuid) -> Result<Option<Topic>> {
        Ok(self.state.read().await.topics.get(&id).cloned())
    }

    async fn insert_document(&self, document: Document) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.topics.contains_key(&document.topic_id) {
            return Err(QuestError::not_found("topic", document.topic_id));
        }
        state.documents.insert(document.id, document);
        Ok(())
    }

    async fn document(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.state.read().await.documents.get(&id).cloned())
    }

    async fn update_document(&self, document: &Document) -> Result<()> {
        let mut state = self.state.write().await;
        let slot = state
            .documents
            .get_mut(&document.id)
            .ok_or_else(|| QuestError::not_found("document", document.id))?;
        *slot = document.clone();
        debug!(document.id = %document.id, status = ?document.status, "updated document");
        Ok(())
    }

    async fn begin_processing(&self, id: Uuid) -> Result<(Document, bool)> {
        let mut state = self.state.write().await;
        let document = state.documents.get_mut(&id).ok_or_else(|| QuestError::not_found("document", id))?;
        if !document.status.can_start() {
            return Ok((document.clone(), false));
        }
        document.status = DocumentStatus::Processing;
        debug!(document.id = %id, "claimed document for processing");
        Ok((document.clone(), true))
    }

    async fn documents_for_topic(&self, topic_id: Uuid) -> Result<Vec<Document>> {
        let state = self.state.read().await;
        let documents = state.documents.values().filter(|d| d.topic_id == topic_id).cloned().collect();
        Ok(newest_first(documents, |d: &Document| d.created_at))
    }

    async fn delete_document(&self, id: Uuid) -> Result<()> {
        self.state
            .write()
            .await
            .documents
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| QuestError::not_found("document", id))
    }

    async fn create_quiz(&self, quiz: Quiz, questions: Vec<Question>) -> Result<()> {
        if let Some(stray) = questions.iter().find(|q| q.quiz_id != quiz.id) {
            return Err(QuestError::Validation(format!(
                "question {} belongs to quiz {}, not {}",
                stray.id, stray.quiz_id, quiz.id
            )));
        }

        let mut state = self.state.write().await;
        if state.quizzes.contains_key(&quiz.id) {
            return Err(QuestError::Conflict(format!("quiz {} already exists", quiz.id)));
        }
        state.questions.insert(quiz.id, questions);
        state.quizzes.insert(quiz.id, quiz);
        Ok(())
    }

    async fn quiz(&self, id: Uuid) -> Result<Option<Quiz>> {
        Ok(self.state.read().await.quizzes.get(&id).cloned())
    }

    async fn questions(&self, quiz_id: Uuid) -> Result<Vec<Question>> {
        Ok(self.state.read().await.questions.get(&quiz_id).cloned().unwrap_or_default())
    }

    async fn quizzes_for_learner(&self, learner_id: LearnerId, topic_id: Option<Uuid>) -> Result<Vec<Quiz>> {
        let state = self.state.read().await;
        let quizzes = state
            .quizzes
            .values()
            .filter(|q| q.learner_id == learner_id && topic_id.is_none_or(|t| q.topic_id == t))
            .cloned()
            .collect();
        Ok(newest_first(quizzes, |q: &Quiz| q.created_at))
    }

    async fn insert_profile(&self, profile: Profile) -> Result<()> {
        let mut state = self.state.write().await;
        if state.profiles.contains_key(&profile.learner_id) {
            return Err(QuestError::Conflict(format!("profile of {} already exists", profile.learner_id)));
        }
        state.profiles.insert(profile.learner_id, profile);
        Ok(())
    }

    async fn profile(&self, learner_id: LearnerId) -> Result<Option<Profile>> {
        Ok(self.state.read().await.profiles.get(&learner_id).cloned())
    }

    async fn progress(&self, learner_id: LearnerId, topic_id: Uuid) -> Result<Option<Progress>> {
        Ok(self.state.read().await.progress.get(&(learner_id, topic_id)).cloned())
    }

    async fn insert_progress(&self, progress: Progress) -> Result<Progress> {
        let mut state = self.state.write().await;
        let stored = state
            .progress
            .entry((progress.learner_id, progress.topic_id))
            .or_insert(progress);
        Ok(stored.clone())
    }

    async fn progress_for_learner(&self, learner_id: LearnerId) -> Result<Vec<Progress>> {
        let state = self.state.read().await;
        let rows = state.progress.values().filter(|p| p.learner_id == learner_id).cloned().collect();
        Ok(newest_first(rows, |p: &Progress| p.updated_at))
    }

    async fn achievements(&self, learner_id: LearnerId) -> Result<Vec<Achievement>> {
        let state = self.state.read().await;
        let earned = state.achievements.iter().filter(|a| a.learner_id == learner_id).cloned().collect();
        Ok(newest_first(earned, |a: &Achievement| a.earned_at))
    }

    async fn has_achievement(&self, learner_id: LearnerId, name: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.achievements.iter().any(|a| a.learner_id == learner_id && a.name == name))
    }

    async fn commit_evaluation(&self, commit: EvaluationCommit) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_evaluation(&commit)?;

        let EvaluationCommit { quiz, questions, mut profile, mut progress, achievements } = commit;
        profile.version += 1;
        progress.version += 1;

        state.questions.insert(quiz.id, questions);
        state.quizzes.insert(quiz.id, quiz);
        state.profiles.insert(profile.learner_id, profile);
        state.progress.insert((progress.learner_id, progress.topic_id), progress);
        state.achievements.extend(achievements);
        Ok(())
    }
}
