//! Quiz generation grounded in retrieved study material.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use mindquest_rag::DiversityRetriever;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::QuestConfig;
use crate::error::{QuestError, Result};
use crate::generation::{
    ContextPassage, GenerationRequest, MAX_FOCUS_DOMAINS, QuestionGenerator, validate_question_set,
};
use crate::model::{Difficulty, DocumentStatus, LearnerId, Progress, Question, Quiz, Topic, WeakDomain};
use crate::pipeline::DocumentPipeline;
use crate::store::QuestStore;

/// A persisted quiz with its questions.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedQuiz {
    pub quiz: Quiz,
    pub questions: Vec<Question>,
}

/// Builds generation requests, validates the result and persists quizzes.
#[derive(Clone)]
pub struct QuizGenerator {
    store: Arc<dyn QuestStore>,
    pipeline: DocumentPipeline,
    retriever: DiversityRetriever,
    generator: Arc<dyn QuestionGenerator>,
    default_focus_domains: Vec<String>,
    context_chunks: usize,
}

impl QuizGenerator {
    pub fn new(
        store: Arc<dyn QuestStore>,
        pipeline: DocumentPipeline,
        generator: Arc<dyn QuestionGenerator>,
        config: &QuestConfig,
    ) -> Self {
        let ingest = pipeline.ingest();
        let retriever =
            DiversityRetriever::new(ingest.embedder().clone(), ingest.index().clone(), &config.rag);
        Self {
            store,
            pipeline,
            retriever,
            generator,
            default_focus_domains: config.default_focus_domains.clone(),
            context_chunks: config.rag.context_chunks,
        }
    }

    /// Generate a quiz at the learner's current difficulty, focused on their
    /// weak domains for the topic.
    ///
    /// # Errors
    ///
    /// See [`generate`](Self::generate).
    pub async fn generate_adaptive(&self, learner_id: LearnerId, topic_id: Uuid) -> Result<GeneratedQuiz> {
        let progress = self
            .store
            .progress(learner_id, topic_id)
            .await?
            .unwrap_or_else(|| Progress::cold_start(learner_id, topic_id, Utc::now()));
        self.generate(learner_id, topic_id, progress.current_difficulty, &progress.weak_domains).await
    }

    /// Generate and persist a five-question quiz.
    ///
    /// Outstanding (`pending` or `failed`) documents of the topic are
    /// processed first, synchronously. Retrieval problems degrade to a
    /// request without context.
    ///
    /// # Errors
    ///
    /// - [`QuestError::Validation`] if the topic does not exist
    /// - [`QuestError::Generation`] if the generation call fails
    /// - [`QuestError::GenerationSchema`] if its output has the wrong shape
    /// - [`QuestError::Storage`] if the quiz cannot be persisted
    pub async fn generate(
        &self,
        learner_id: LearnerId,
        topic_id: Uuid,
        difficulty: Difficulty,
        weak_domains: &[WeakDomain],
    ) -> Result<GeneratedQuiz> {
        let topic = self
            .store
            .topic(topic_id)
            .await?
            .ok_or_else(|| QuestError::Validation(format!("topic {topic_id} not found")))?;

        let indexed = self.prepare_documents(topic_id).await?;
        let focus_domains = self.focus_domains(weak_domains);
        info!(learner.id = %learner_id, topic.id = %topic_id, %difficulty, ?focus_domains, "generating quiz");

        let context = if indexed { self.retrieve_context(&topic, &focus_domains).await } else { Vec::new() };
        let request = GenerationRequest {
            certification: topic.name.clone(),
            difficulty,
            focus_domains,
            context,
        };

        let started = Instant::now();
        let set = self.generator.generate(&request).await.map_err(|e| {
            error!(topic.id = %topic_id, error = %e, "question generation failed");
            e
        })?;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        validate_question_set(&set).map_err(|e| {
            error!(topic.id = %topic_id, error = %e, "generated questions rejected");
            e
        })?;

        let quiz = Quiz {
            id: Uuid::new_v4(),
            learner_id,
            topic_id,
            difficulty,
            total_questions: u32::try_from(set.questions.len()).unwrap_or(u32::MAX),
            score: None,
            xp_earned: None,
            completed_at: None,
            created_at: Utc::now(),
            generation_latency_ms: latency_ms,
            generation_model: self.generator.model().to_string(),
        };
        let questions: Vec<Question> = set
            .questions
            .into_iter()
            .map(|q| Question {
                id: Uuid::new_v4(),
                quiz_id: quiz.id,
                text: q.question_text,
                question_type: q.question_type,
                options: q.options,
                correct_answer: q.correct_answer,
                explanation: q.explanation,
                difficulty: q.difficulty,
                domain: q.domain,
                submitted_answer: None,
                is_correct: None,
                xp_earned: 0,
            })
            .collect();

        self.store.create_quiz(quiz.clone(), questions.clone()).await?;
        info!(quiz.id = %quiz.id, latency_ms, model = %quiz.generation_model, "quiz generated");
        Ok(GeneratedQuiz { quiz, questions })
    }

    /// Process outstanding documents; returns whether any document is indexed.
    async fn prepare_documents(&self, topic_id: Uuid) -> Result<bool> {
        let documents = self.store.documents_for_topic(topic_id).await?;
        if documents.iter().any(|d| d.status.can_start()) {
            let completed = self.pipeline.process_outstanding(topic_id).await?;
            info!(topic.id = %topic_id, completed, "processed outstanding documents");
            let documents = self.store.documents_for_topic(topic_id).await?;
            return Ok(documents.iter().any(|d| d.status == DocumentStatus::Completed));
        }
        Ok(documents.iter().any(|d| d.status == DocumentStatus::Completed))
    }

    fn focus_domains(&self, weak_domains: &[WeakDomain]) -> Vec<String> {
        let weak: Vec<String> = weak_domains
            .iter()
            .map(|d| d.name.trim())
            .filter(|name| !name.is_empty())
            .take(MAX_FOCUS_DOMAINS)
            .map(str::to_string)
            .collect();
        if weak.is_empty() {
            self.default_focus_domains.iter().take(MAX_FOCUS_DOMAINS).cloned().collect()
        } else {
            weak
        }
    }

    async fn retrieve_context(&self, topic: &Topic, focus_domains: &[String]) -> Vec<ContextPassage> {
        let query = compose_query(&topic.name, focus_domains);
        match self.retriever.retrieve(&topic.id.to_string(), &query, self.context_chunks).await {
            Ok(results) => results
                .into_iter()
                .map(|r| ContextPassage { page_number: r.provenance.page_number, text: r.text })
                .collect(),
            Err(e) => {
                warn!(topic.id = %topic.id, error = %e, "retrieval failed, generating without context");
                Vec::new()
            }
        }
    }
}

/// Natural-language retrieval query for a certification and its focus domains.
pub fn compose_query(certification: &str, focus_domains: &[String]) -> String {
    if focus_domains.is_empty() {
        format!("{certification} exam topics")
    } else {
        format!("{certification} exam topics: {}", focus_domains.join(", "))
    }
}
