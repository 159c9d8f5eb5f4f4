//! Adaptive certification quizzes for MindQuest.
//!
//! This crate provides:
//! - The document processing state machine and a background ingestion queue
//! - Document upload, listing and removal
//! - Quiz generation grounded in diversity-retrieved study material
//! - Evaluation with XP, streaks, weak-domain detection, adaptive difficulty
//!   and achievements
//! - Progress, dashboard and quiz history views
//!
//! Storage, object storage and question generation are traits
//! ([`QuestStore`], [`ObjectLocator`], [`QuestionGenerator`]) with in-memory
//! implementations for development and tests.
//!
//! # Feature flags
//!
//! - `openai`: [`OpenAIQuestionGenerator`] (and the OpenAI embedding provider)
//! - `qdrant`: the Qdrant vector store backend
//! - `full`: both

mod config;
mod documents;
mod error;
mod evaluator;
mod generation;
mod generator;
mod history;
mod locator;
mod model;
mod pipeline;
mod progress;
mod queue;
mod store;

#[cfg(feature = "openai")]
mod openai;

pub use config::{DEFAULT_FOCUS_DOMAINS, ENV_PREFIX, QuestConfig};
pub use documents::DocumentService;
pub use error::{QuestError, Result};
pub use evaluator::{
    DomainTally, EvaluationEngine, EvaluationResult, PERFECT_SCORE_ACHIEVEMENT, QUESTIONS_MILESTONE,
    STREAK_ACHIEVEMENT, grade, next_difficulty, next_streak, weak_domains,
};
pub use generation::{
    ContextPassage, GeneratedQuestion, GeneratedQuestionSet, GenerationRequest, MAX_FOCUS_DOMAINS,
    QUESTIONS_PER_QUIZ, QuestionGenerator, parse_question_set, render_prompt, validate_question_set,
};
pub use generator::{GeneratedQuiz, QuizGenerator, compose_query};
pub use history::{DEFAULT_HISTORY_LIMIT, QuizDetail, QuizHistory, QuizStats};
pub use locator::{FileSystemLocator, InMemoryLocator, ObjectLocator, document_key};
pub use model::{
    Achievement, AchievementKind, Answer, Difficulty, Document, DocumentStatus, LearnerId, Profile,
    Progress, Question, QuestionType, Quiz, Topic, WeakDomain, level_for_xp,
};
pub use pipeline::{DocumentPipeline, ProcessOutcome};
pub use progress::{Dashboard, ProgressService, RECENT_ACHIEVEMENTS};
pub use queue::{IngestionQueue, QueueStats};
pub use store::{EvaluationCommit, InMemoryQuestStore, QuestStore};

#[cfg(feature = "openai")]
pub use openai::OpenAIQuestionGenerator;
