//! Domain entities: topics, documents, quizzes, questions, learner progress,
//! profiles and achievements.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QuestError;

/// Learner identity (issued by the authentication layer).
pub type LearnerId = Uuid;

/// A certification or subject area.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Topic {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Topic {
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        Self { id: Uuid::new_v4(), name: name.into(), description, created_at: Utc::now() }
    }
}

/// Quiz and question difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// One level harder, capped at [`Hard`](Difficulty::Hard).
    pub fn step_up(self) -> Self {
        match self {
            Self::Easy => Self::Medium,
            Self::Medium | Self::Hard => Self::Hard,
        }
    }

    /// One level easier, capped at [`Easy`](Difficulty::Easy).
    pub fn step_down(self) -> Self {
        match self {
            Self::Hard => Self::Medium,
            Self::Medium | Self::Easy => Self::Easy,
        }
    }

    /// XP awarded for a correct answer at this difficulty.
    pub fn xp_per_correct(self) -> u32 {
        match self {
            Self::Easy => 5,
            Self::Medium => 10,
            Self::Hard => 20,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = QuestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(QuestError::Validation(format!("unknown difficulty '{other}'"))),
        }
    }
}

/// Processing state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    /// Whether the pipeline may start processing from this state.
    pub fn can_start(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

/// A study document belonging to a topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub topic_id: Uuid,
    pub filename: String,
    /// Object locator returned when the bytes were stored.
    pub locator: String,
    pub status: DocumentStatus,
    /// Set only when processing completes.
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// A new `pending` document.
    pub fn new(topic_id: Uuid, filename: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic_id,
            filename: filename.into(),
            locator: locator.into(),
            status: DocumentStatus::Pending,
            processed_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Shape of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Exactly one correct option.
    #[serde(rename = "multiple_choice", alias = "single_choice")]
    SingleChoice,
    /// Two or more correct options, graded as a set.
    MultiSelect,
    /// `"True"` or `"False"`.
    TrueFalse,
}

/// A correct or submitted answer: one value, or a set of values for
/// multi-select questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Single(String),
    Multiple(Vec<String>),
}

impl Answer {
    /// Whether no answer was actually given.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Single(value) => value.trim().is_empty(),
            Self::Multiple(values) => values.is_empty(),
        }
    }

    /// The answer as a set of values.
    pub fn as_set(&self) -> BTreeSet<&str> {
        match self {
            Self::Single(value) => BTreeSet::from([value.as_str()]),
            Self::Multiple(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for Answer {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl<const N: usize> From<[&str; N]> for Answer {
    fn from(values: [&str; N]) -> Self {
        Self::Multiple(values.iter().map(|v| v.to_string()).collect())
    }
}

/// A quiz question. Grading fields stay `None` until the quiz is evaluated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub text: String,
    pub question_type: QuestionType,
    pub options: Vec<String>,
    pub correct_answer: Answer,
    pub explanation: Option<String>,
    pub difficulty: Difficulty,
    pub domain: String,
    pub submitted_answer: Option<Answer>,
    pub is_correct: Option<bool>,
    pub xp_earned: u32,
}

/// A generated quiz. `score`, `xp_earned` and `completed_at` are written once,
/// by evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quiz {
    pub id: Uuid,
    pub learner_id: LearnerId,
    pub topic_id: Uuid,
    pub difficulty: Difficulty,
    pub total_questions: u32,
    pub score: Option<u32>,
    pub xp_earned: Option<u32>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub generation_latency_ms: u64,
    pub generation_model: String,
}

impl Quiz {
    pub fn is_evaluated(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Percentage of correct answers, `None` before evaluation.
    pub fn accuracy(&self) -> Option<f64> {
        self.score.map(|score| percentage(score, self.total_questions))
    }
}

/// A domain whose accuracy in one quiz fell below the weak threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeakDomain {
    pub name: String,
    /// Floored percentage.
    pub accuracy: u32,
}

/// Cumulative progress of one learner on one topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Progress {
    pub id: Uuid,
    pub learner_id: LearnerId,
    pub topic_id: Uuid,
    pub total_xp: u64,
    pub total_quizzes: u32,
    pub questions_answered: u32,
    pub correct_answers: u32,
    pub current_difficulty: Difficulty,
    pub domain_difficulties: BTreeMap<String, Difficulty>,
    pub weak_domains: Vec<WeakDomain>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped by the store on every write.
    pub version: u64,
}

impl Progress {
    /// Zero-valued progress for a learner's first contact with a topic.
    pub fn cold_start(learner_id: LearnerId, topic_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            learner_id,
            topic_id,
            total_xp: 0,
            total_quizzes: 0,
            questions_answered: 0,
            correct_answers: 0,
            current_difficulty: Difficulty::Easy,
            domain_difficulties: BTreeMap::new(),
            weak_domains: Vec::new(),
            updated_at: now,
            version: 0,
        }
    }

    /// `correct_answers / questions_answered * 100`, 0 before any answer.
    pub fn accuracy(&self) -> f64 {
        percentage(self.correct_answers, self.questions_answered)
    }
}

/// Per-learner XP, streak and level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub learner_id: LearnerId,
    pub xp: u64,
    pub current_streak: u32,
    pub last_quiz_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped by the store on every write.
    pub version: u64,
}

impl Profile {
    pub fn new(learner_id: LearnerId) -> Self {
        Self {
            learner_id,
            xp: 0,
            current_streak: 0,
            last_quiz_date: None,
            created_at: Utc::now(),
            version: 0,
        }
    }

    pub fn level(&self) -> u32 {
        level_for_xp(self.xp)
    }
}

/// `floor(xp / 100) + 1`.
pub fn level_for_xp(xp: u64) -> u32 {
    u32::try_from(xp / 100).unwrap_or(u32::MAX - 1) + 1
}

/// Achievement category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AchievementKind {
    Streak,
    Accuracy,
    /// Count-based, awarded at most once per learner.
    Milestone,
}

/// An earned badge. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Achievement {
    pub id: Uuid,
    pub learner_id: LearnerId,
    pub kind: AchievementKind,
    pub name: String,
    pub description: String,
    pub earned_at: DateTime<Utc>,
}

impl Achievement {
    pub fn new(
        learner_id: LearnerId,
        kind: AchievementKind,
        name: impl Into<String>,
        description: impl Into<String>,
        earned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            learner_id,
            kind,
            name: name.into(),
            description: description.into(),
            earned_at,
        }
    }
}

/// `part / whole * 100`, or 0 when `whole` is 0.
pub(crate) fn percentage(part: u32, whole: u32) -> f64 {
    if whole == 0 { 0.0 } else { f64::from(part) / f64::from(whole) * 100.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_steps_are_capped() {
        assert_eq!(Difficulty::Easy.step_up(), Difficulty::Medium);
        assert_eq!(Difficulty::Medium.step_up(), Difficulty::Hard);
        assert_eq!(Difficulty::Hard.step_up(), Difficulty::Hard);
        assert_eq!(Difficulty::Hard.step_down(), Difficulty::Medium);
        assert_eq!(Difficulty::Easy.step_down(), Difficulty::Easy);
    }

    #[test]
    fn difficulty_parses_case_insensitively() {
        assert_eq!("Medium".parse::<Difficulty>().unwrap(), Difficulty::Medium);
        assert!("extreme".parse::<Difficulty>().is_err());
    }

    #[test]
    fn level_is_floor_xp_over_100_plus_one() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(99), 1);
        assert_eq!(level_for_xp(100), 2);
        assert_eq!(level_for_xp(250), 3);
    }

    #[test]
    fn answers_deserialize_untagged() {
        let single: Answer = serde_json::from_str(r#""S3""#).unwrap();
        let multi: Answer = serde_json::from_str(r#"["A","B"]"#).unwrap();
        assert_eq!(single, Answer::from("S3"));
        assert_eq!(multi, Answer::from(["A", "B"]));
    }

    #[test]
    fn question_type_uses_stored_names() {
        assert_eq!(serde_json::to_string(&QuestionType::SingleChoice).unwrap(), r#""multiple_choice""#);
        assert_eq!(serde_json::to_string(&QuestionType::MultiSelect).unwrap(), r#""multi_select""#);
        let parsed: QuestionType = serde_json::from_str(r#""single_choice""#).unwrap();
        assert_eq!(parsed, QuestionType::SingleChoice);
    }

    #[test]
    fn empty_answers_are_detected() {
        assert!(Answer::from("  ").is_empty());
        assert!(Answer::Multiple(vec![]).is_empty());
        assert!(!Answer::from("True").is_empty());
    }

    #[test]
    fn cold_start_progress_has_zero_accuracy() {
        let progress = Progress::cold_start(Uuid::new_v4(), Uuid::new_v4(), Utc::now());
        assert_eq!(progress.accuracy(), 0.0);
        assert_eq!(progress.current_difficulty, Difficulty::Easy);
    }
}
