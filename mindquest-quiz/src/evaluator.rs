//! Grading and adaptive bookkeeping for submitted quizzes.
//!
//! One evaluation grades every question, then updates the quiz, the
//! learner's profile (XP, level, streak), the topic progress (totals,
//! difficulty, weak domains) and achievements in a single store commit.
//! Evaluations of the same learner run one at a time.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{QuestError, Result};
use crate::model::{
    Achievement, AchievementKind, Answer, Difficulty, LearnerId, Progress, Question, QuestionType,
    WeakDomain, level_for_xp, percentage,
};
use crate::store::{EvaluationCommit, QuestStore};

/// Domains below this accuracy (percent) are reported as weak.
pub const WEAK_DOMAIN_THRESHOLD: f64 = 60.0;
/// Accuracy (percent) at or above which the next quiz gets harder.
pub const STEP_UP_THRESHOLD: f64 = 80.0;
/// Accuracy (percent) below which the next quiz gets easier.
pub const STEP_DOWN_THRESHOLD: f64 = 50.0;

pub const STREAK_ACHIEVEMENT: &str = "7-Day Streak";
pub const PERFECT_SCORE_ACHIEVEMENT: &str = "Perfect Score";
pub const QUESTIONS_MILESTONE: &str = "100 Questions";

const STREAK_TARGET: u32 = 7;
const PERFECT_SCORE_ACCURACY: f64 = 90.0;
const QUESTIONS_MILESTONE_COUNT: u32 = 100;

/// Outcome of one evaluation, as reported to the learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub quiz_id: Uuid,
    pub score: u32,
    pub total_questions: u32,
    pub accuracy: f64,
    pub xp_earned: u32,
    pub new_level: u32,
    pub new_streak: u32,
    /// Names of achievements awarded by this evaluation.
    pub achievements: Vec<String>,
    pub weak_domains: Vec<WeakDomain>,
    pub next_difficulty: Difficulty,
}

/// Whether `submitted` answers a question correctly.
///
/// Multi-select answers must match the correct set exactly, in any order.
/// Other types need exact equality. A missing or empty answer is wrong.
pub fn grade(question_type: QuestionType, correct: &Answer, submitted: Option<&Answer>) -> bool {
    let Some(submitted) = submitted.filter(|a| !a.is_empty()) else {
        return false;
    };
    match question_type {
        QuestionType::MultiSelect => submitted.as_set() == correct.as_set(),
        QuestionType::SingleChoice | QuestionType::TrueFalse => submitted == correct,
    }
}

/// Step up at ≥ 80 %, down below 50 %, otherwise stay.
pub fn next_difficulty(current: Difficulty, accuracy: f64) -> Difficulty {
    if accuracy >= STEP_UP_THRESHOLD {
        current.step_up()
    } else if accuracy < STEP_DOWN_THRESHOLD {
        current.step_down()
    } else {
        current
    }
}

/// Streak after a quiz taken on `today`.
///
/// First quiz: 1. The day after the last quiz: +1. Later: back to 1.
/// Same day: unchanged.
pub fn next_streak(current: u32, last_quiz_date: Option<NaiveDate>, today: NaiveDate) -> u32 {
    let Some(last) = last_quiz_date else {
        return 1;
    };
    match (today - last).num_days() {
        1 => current + 1,
        days if days > 1 => 1,
        _ => current,
    }
}

/// Correct and total answers for one domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DomainTally {
    pub correct: u32,
    pub total: u32,
}

impl DomainTally {
    pub fn accuracy(&self) -> f64 {
        percentage(self.correct, self.total)
    }
}

/// Domains whose accuracy is below [`WEAK_DOMAIN_THRESHOLD`], with floored accuracy.
pub fn weak_domains(tallies: &BTreeMap<String, DomainTally>) -> Vec<WeakDomain> {
    tallies
        .iter()
        .filter(|(_, tally)| tally.accuracy() < WEAK_DOMAIN_THRESHOLD)
        .map(|(name, tally)| WeakDomain { name: name.clone(), accuracy: tally.accuracy().floor() as u32 })
        .collect()
}

/// Per-learner async locks. Entries are dropped when nobody holds them.
#[derive(Debug, Default)]
struct LearnerLocks {
    locks: Mutex<HashMap<LearnerId, Arc<tokio::sync::Mutex<()>>>>,
}

impl LearnerLocks {
    fn handle(&self, learner_id: LearnerId) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| QuestError::Storage("learner lock table poisoned".into()))?;
        Ok(locks.entry(learner_id).or_default().clone())
    }

    fn release(&self, learner_id: LearnerId, handle: Arc<tokio::sync::Mutex<()>>) {
        if let Ok(mut locks) = self.locks.lock() {
            // the table and `handle` are the only owners
            if Arc::strong_count(&handle) == 2 {
                locks.remove(&learner_id);
            }
        }
    }
}

/// Grades submissions and commits the resulting progress updates.
pub struct EvaluationEngine {
    store: Arc<dyn QuestStore>,
    locks: LearnerLocks,
}

impl EvaluationEngine {
    pub fn new(store: Arc<dyn QuestStore>) -> Self {
        Self { store, locks: LearnerLocks::default() }
    }

    /// Evaluate a quiz now. See [`evaluate_at`](Self::evaluate_at).
    ///
    /// # Errors
    ///
    /// See [`evaluate_at`](Self::evaluate_at).
    pub async fn evaluate(
        &self,
        learner_id: LearnerId,
        quiz_id: Uuid,
        answers: &HashMap<Uuid, Answer>,
    ) -> Result<EvaluationResult> {
        self.evaluate_at(learner_id, quiz_id, answers, Utc::now()).await
    }

    /// Evaluate a quiz as of `now` (which decides the streak day).
    ///
    /// # Errors
    ///
    /// - [`QuestError::NotFound`] if the quiz or the learner's profile is missing
    /// - [`QuestError::Validation`] if the quiz belongs to another learner, was
    ///   already evaluated, or `answers` names a question outside the quiz
    /// - [`QuestError::Conflict`] if the progress rows changed concurrently
    pub async fn evaluate_at(
        &self,
        learner_id: LearnerId,
        quiz_id: Uuid,
        answers: &HashMap<Uuid, Answer>,
        now: DateTime<Utc>,
    ) -> Result<EvaluationResult> {
        let handle = self.locks.handle(learner_id)?;
        let result = {
            let _guard = handle.lock().await;
            self.evaluate_locked(learner_id, quiz_id, answers, now).await
        };
        self.locks.release(learner_id, handle);
        result
    }

    async fn evaluate_locked(
        &self,
        learner_id: LearnerId,
        quiz_id: Uuid,
        answers: &HashMap<Uuid, Answer>,
        now: DateTime<Utc>,
    ) -> Result<EvaluationResult> {
        let mut quiz = self.store.quiz(quiz_id).await?.ok_or_else(|| QuestError::not_found("quiz", quiz_id))?;
        if quiz.learner_id != learner_id {
            return Err(QuestError::Validation(format!("quiz {quiz_id} does not belong to learner {learner_id}")));
        }
        if quiz.is_evaluated() {
            return Err(QuestError::Validation(format!("quiz {quiz_id} was already evaluated")));
        }

        let mut questions = self.store.questions(quiz_id).await?;
        if let Some(unknown) = answers.keys().find(|id| !questions.iter().any(|q| q.id == **id)) {
            return Err(QuestError::Validation(format!("question {unknown} is not part of quiz {quiz_id}")));
        }

        let graded = grade_questions(&mut questions, answers);
        let total_questions = u32::try_from(questions.len()).unwrap_or(u32::MAX);
        let accuracy = percentage(graded.score, total_questions);

        let mut profile = self
            .store
            .profile(learner_id)
            .await?
            .ok_or_else(|| QuestError::not_found("profile", learner_id))?;
        let today = now.date_naive();
        let new_streak = next_streak(profile.current_streak, profile.last_quiz_date, today);
        profile.xp += u64::from(graded.xp);
        profile.current_streak = new_streak;
        profile.last_quiz_date = Some(today);
        let new_level = level_for_xp(profile.xp);

        let weak = weak_domains(&graded.domains);
        let next = next_difficulty(quiz.difficulty, accuracy);

        let mut progress = self
            .store
            .progress(learner_id, quiz.topic_id)
            .await?
            .unwrap_or_else(|| Progress::cold_start(learner_id, quiz.topic_id, now));
        progress.total_xp += u64::from(graded.xp);
        progress.total_quizzes += 1;
        progress.questions_answered += total_questions;
        progress.correct_answers += graded.score;
        progress.current_difficulty = next;
        progress.weak_domains = weak.clone();
        for (domain, tally) in &graded.domains {
            let current = progress.domain_difficulties.get(domain).copied().unwrap_or(quiz.difficulty);
            progress.domain_difficulties.insert(domain.clone(), next_difficulty(current, tally.accuracy()));
        }
        progress.updated_at = now;

        let mut achievements = Vec::new();
        if new_streak == STREAK_TARGET {
            achievements.push(Achievement::new(
                learner_id,
                AchievementKind::Streak,
                STREAK_ACHIEVEMENT,
                "Completed quizzes for 7 consecutive days",
                now,
            ));
        }
        if accuracy >= PERFECT_SCORE_ACCURACY {
            achievements.push(Achievement::new(
                learner_id,
                AchievementKind::Accuracy,
                PERFECT_SCORE_ACHIEVEMENT,
                "Achieved 90% or higher accuracy on a quiz",
                now,
            ));
        }
        if progress.questions_answered >= QUESTIONS_MILESTONE_COUNT
            && !self.store.has_achievement(learner_id, QUESTIONS_MILESTONE).await?
        {
            achievements.push(Achievement::new(
                learner_id,
                AchievementKind::Milestone,
                QUESTIONS_MILESTONE,
                "Answered 100 questions",
                now,
            ));
        }
        let awarded: Vec<String> = achievements.iter().map(|a| a.name.clone()).collect();

        quiz.score = Some(graded.score);
        quiz.xp_earned = Some(graded.xp);
        quiz.completed_at = Some(now);

        self.store
            .commit_evaluation(EvaluationCommit { quiz, questions, profile, progress, achievements })
            .await
            .map_err(|e| {
                warn!(quiz.id = %quiz_id, learner.id = %learner_id, error = %e, "evaluation commit failed");
                e
            })?;

        info!(
            quiz.id = %quiz_id,
            learner.id = %learner_id,
            score = graded.score,
            total_questions,
            xp = graded.xp,
            accuracy,
            next_difficulty = %next,
            "quiz evaluated"
        );

        Ok(EvaluationResult {
            quiz_id,
            score: graded.score,
            total_questions,
            accuracy,
            xp_earned: graded.xp,
            new_level,
            new_streak,
            achievements: awarded,
            weak_domains: weak,
            next_difficulty: next,
        })
    }
}

struct Graded {
    score: u32,
    xp: u32,
    domains: BTreeMap<String, DomainTally>,
}

fn grade_questions(questions: &mut [Question], answers: &HashMap<Uuid, Answer>) -> Graded {
    let mut graded = Graded { score: 0, xp: 0, domains: BTreeMap::new() };
    for question in questions {
        let submitted = answers.get(&question.id);
        let correct = grade(question.question_type, &question.correct_answer, submitted);
        let xp = if correct { question.difficulty.xp_per_correct() } else { 0 };

        question.submitted_answer = submitted.cloned();
        question.is_correct = Some(correct);
        question.xp_earned = xp;

        graded.xp += xp;
        let tally = graded.domains.entry(question.domain.clone()).or_default();
        tally.total += 1;
        if correct {
            graded.score += 1;
            tally.correct += 1;
        }
    }
    graded
}
