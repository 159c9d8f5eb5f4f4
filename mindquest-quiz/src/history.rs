//! Past quizzes of a learner.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{QuestError, Result};
use crate::model::{LearnerId, Question, Quiz};
use crate::store::QuestStore;

/// Default page size of [`QuizHistory::history`].
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// A quiz with its (possibly graded) questions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizDetail {
    pub quiz: Quiz,
    pub questions: Vec<Question>,
}

/// Totals over a learner's evaluated quizzes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QuizStats {
    pub total_quizzes: u32,
    pub average_score: f64,
    pub total_xp: u64,
    pub average_accuracy: f64,
}

#[derive(Clone)]
pub struct QuizHistory {
    store: Arc<dyn QuestStore>,
}

impl QuizHistory {
    pub fn new(store: Arc<dyn QuestStore>) -> Self {
        Self { store }
    }

    /// A page of the learner's quizzes, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`QuestError::Storage`] if the store fails.
    pub async fn history(
        &self,
        learner_id: LearnerId,
        topic_id: Option<Uuid>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Quiz>> {
        let quizzes = self.store.quizzes_for_learner(learner_id, topic_id).await?;
        Ok(quizzes.into_iter().skip(offset).take(limit).collect())
    }

    /// One quiz with its questions. Quizzes of other learners are reported
    /// as missing.
    ///
    /// # Errors
    ///
    /// Returns [`QuestError::NotFound`] if the quiz does not exist or is not
    /// the learner's.
    pub async fn quiz_detail(&self, learner_id: LearnerId, quiz_id: Uuid) -> Result<QuizDetail> {
        let quiz = self
            .store
            .quiz(quiz_id)
            .await?
            .filter(|q| q.learner_id == learner_id)
            .ok_or_else(|| QuestError::not_found("quiz", quiz_id))?;
        let questions = self.store.questions(quiz_id).await?;
        Ok(QuizDetail { quiz, questions })
    }

    /// # Errors
    ///
    /// Returns [`QuestError::Storage`] if the store fails.
    pub async fn stats(&self, learner_id: LearnerId) -> Result<QuizStats> {
        let evaluated: Vec<Quiz> = self
            .store
            .quizzes_for_learner(learner_id, None)
            .await?
            .into_iter()
            .filter(Quiz::is_evaluated)
            .collect();
        if evaluated.is_empty() {
            return Ok(QuizStats::default());
        }

        let count = evaluated.len() as f64;
        let total_score: u32 = evaluated.iter().filter_map(|q| q.score).sum();
        let total_questions: u32 = evaluated.iter().map(|q| q.total_questions).sum();
        let total_xp = evaluated.iter().filter_map(|q| q.xp_earned).map(u64::from).sum();

        Ok(QuizStats {
            total_quizzes: u32::try_from(evaluated.len()).unwrap_or(u32::MAX),
            average_score: f64::from(total_score) / count,
            total_xp,
            average_accuracy: crate::model::percentage(total_score, total_questions),
        })
    }
}
