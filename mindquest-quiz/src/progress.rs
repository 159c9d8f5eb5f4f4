//! Learner progress, achievements and the dashboard summary.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::{QuestError, Result};
use crate::model::{Achievement, LearnerId, Profile, Progress, level_for_xp, percentage};
use crate::store::QuestStore;

/// Achievements shown on the dashboard.
pub const RECENT_ACHIEVEMENTS: usize = 5;

/// Aggregated view of a learner across every topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub total_xp: u64,
    pub level: u32,
    pub current_streak: u32,
    pub total_quizzes: u32,
    pub total_questions: u32,
    pub average_accuracy: f64,
    pub recent_achievements: Vec<Achievement>,
    pub progress: Vec<Progress>,
}

/// Read side of learner progress, plus cold-start creation.
#[derive(Clone)]
pub struct ProgressService {
    store: Arc<dyn QuestStore>,
}

impl ProgressService {
    pub fn new(store: Arc<dyn QuestStore>) -> Self {
        Self { store }
    }

    /// The learner's profile, created with zero XP on first use.
    ///
    /// # Errors
    ///
    /// Returns [`QuestError::Storage`] if the store fails.
    pub async fn ensure_profile(&self, learner_id: LearnerId) -> Result<Profile> {
        if let Some(profile) = self.store.profile(learner_id).await? {
            return Ok(profile);
        }
        match self.store.insert_profile(Profile::new(learner_id)).await {
            Ok(()) | Err(QuestError::Conflict(_)) => {}
            Err(e) => return Err(e),
        }
        self.store.profile(learner_id).await?.ok_or_else(|| QuestError::not_found("profile", learner_id))
    }

    /// Progress on one topic, created with zero values on first access.
    ///
    /// # Errors
    ///
    /// Returns [`QuestError::NotFound`] if the topic does not exist.
    pub async fn topic_progress(&self, learner_id: LearnerId, topic_id: Uuid) -> Result<Progress> {
        if let Some(progress) = self.store.progress(learner_id, topic_id).await? {
            return Ok(progress);
        }
        if self.store.topic(topic_id).await?.is_none() {
            return Err(QuestError::not_found("topic", topic_id));
        }

        let progress = self.store.insert_progress(Progress::cold_start(learner_id, topic_id, Utc::now())).await?;
        info!(learner.id = %learner_id, topic.id = %topic_id, "created initial progress");
        Ok(progress)
    }

    /// Progress on every topic the learner has touched.
    ///
    /// # Errors
    ///
    /// Returns [`QuestError::Storage`] if the store fails.
    pub async fn all_progress(&self, learner_id: LearnerId) -> Result<Vec<Progress>> {
        self.store.progress_for_learner(learner_id).await
    }

    /// Every achievement of the learner, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`QuestError::Storage`] if the store fails.
    pub async fn achievements(&self, learner_id: LearnerId) -> Result<Vec<Achievement>> {
        self.store.achievements(learner_id).await
    }

    /// # Errors
    ///
    /// Returns [`QuestError::NotFound`] if the learner has no profile.
    pub async fn dashboard(&self, learner_id: LearnerId) -> Result<Dashboard> {
        let profile = self
            .store
            .profile(learner_id)
            .await?
            .ok_or_else(|| QuestError::not_found("profile", learner_id))?;
        let progress = self.store.progress_for_learner(learner_id).await?;
        let mut recent_achievements = self.store.achievements(learner_id).await?;
        recent_achievements.truncate(RECENT_ACHIEVEMENTS);

        let total_questions = progress.iter().map(|p| p.questions_answered).sum();
        let total_correct = progress.iter().map(|p| p.correct_answers).sum();

        Ok(Dashboard {
            total_xp: profile.xp,
            level: level_for_xp(profile.xp),
            current_streak: profile.current_streak,
            total_quizzes: progress.iter().map(|p| p.total_quizzes).sum(),
            total_questions,
            average_accuracy: percentage(total_correct, total_questions),
            recent_achievements,
            progress,
        })
    }
}
