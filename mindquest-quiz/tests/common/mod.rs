//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mindquest_quiz::{
    Answer, Difficulty, DocumentPipeline, DocumentService, GeneratedQuestion, GeneratedQuestionSet,
    GenerationRequest, InMemoryLocator, InMemoryQuestStore, LearnerId, ProgressService, QuestConfig,
    QuestError, QuestStore, Question, QuestionGenerator, QuestionType, Quiz, Topic,
};
use mindquest_rag::{
    EmbeddingProvider, InMemoryVectorStore, IngestPipeline, RagConfig, RagError, VectorIndex,
};
use uuid::Uuid;

pub const DIMS: usize = 64;

/// Bag-of-words embedding. Fails every call while `failing` is set.
#[derive(Default)]
pub struct HashEmbeddingProvider {
    pub failing: AtomicBool,
}

impl HashEmbeddingProvider {
    fn embed_text(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMS];
        for word in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            v[(hasher.finish() as usize) % DIMS] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed_batch(&self, texts: &[&str]) -> mindquest_rag::Result<Vec<Vec<f32>>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RagError::Embedding { provider: "hash".into(), message: "unavailable".into() });
        }
        Ok(texts.iter().map(|t| Self::embed_text(t)).collect())
    }

    fn dimensions(&self) -> usize {
        DIMS
    }
}

/// Returns a fixed question set and records every request.
pub struct ScriptedGenerator {
    pub output: Mutex<GeneratedQuestionSet>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(output: GeneratedQuestionSet) -> Self {
        Self { output: Mutex::new(output), requests: Mutex::new(Vec::new()) }
    }

    pub fn last_request(&self) -> GenerationRequest {
        self.requests.lock().unwrap().last().cloned().expect("no generation request recorded")
    }
}

#[async_trait]
impl QuestionGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> mindquest_quiz::Result<GeneratedQuestionSet> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.output.lock().unwrap().clone())
    }

    fn model(&self) -> &str {
        "scripted-v1"
    }
}

/// Always fails, like an unreachable model endpoint.
pub struct DownGenerator;

#[async_trait]
impl QuestionGenerator for DownGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> mindquest_quiz::Result<GeneratedQuestionSet> {
        Err(QuestError::Generation("connection refused".into()))
    }

    fn model(&self) -> &str {
        "down"
    }
}

fn generated(kind: QuestionType, answer: Answer, domain: &str, difficulty: Difficulty) -> GeneratedQuestion {
    let options = match kind {
        QuestionType::TrueFalse => vec!["True".into(), "False".into()],
        _ => vec!["A".into(), "B".into(), "C".into(), "D".into()],
    };
    GeneratedQuestion {
        question_text: format!("{domain} question"),
        question_type: kind,
        options,
        correct_answer: answer,
        explanation: Some("Because.".into()),
        difficulty,
        domain: domain.into(),
    }
}

/// A valid five-question set: three single-choice (answer A), one
/// multi-select (A and C), one true/false (True).
pub fn question_set(difficulty: Difficulty, domains: [&str; 5]) -> GeneratedQuestionSet {
    GeneratedQuestionSet {
        questions: vec![
            generated(QuestionType::SingleChoice, Answer::from("A"), domains[0], difficulty),
            generated(QuestionType::SingleChoice, Answer::from("A"), domains[1], difficulty),
            generated(QuestionType::SingleChoice, Answer::from("A"), domains[2], difficulty),
            generated(QuestionType::MultiSelect, Answer::from(["A", "C"]), domains[3], difficulty),
            generated(QuestionType::TrueFalse, Answer::from("True"), domains[4], difficulty),
        ],
    }
}

pub struct Fixture {
    pub config: QuestConfig,
    pub store: Arc<InMemoryQuestStore>,
    pub locator: Arc<InMemoryLocator>,
    pub vectors: Arc<InMemoryVectorStore>,
    pub embedder: Arc<HashEmbeddingProvider>,
    pub pipeline: DocumentPipeline,
    pub documents: DocumentService,
    pub progress: ProgressService,
    pub topic: Topic,
    pub learner: LearnerId,
}

impl Fixture {
    pub async fn new() -> Self {
        // A second test in the same binary finds the subscriber already set.
        let _ = mindquest_telemetry::init_telemetry("mindquest-quiz-tests");

        let rag = RagConfig::builder()
            .chunk_size(120)
            .chunk_overlap(20)
            .embedding_max_attempts(2)
            .embedding_retry_delay(Duration::from_millis(1))
            .context_chunks(3)
            .build()
            .unwrap();
        let config = QuestConfig { embedding_dimensions: DIMS, rag, ..QuestConfig::default() };

        let store = Arc::new(InMemoryQuestStore::new());
        let locator = Arc::new(InMemoryLocator::new());
        let vectors = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(HashEmbeddingProvider::default());

        let ingest = IngestPipeline::builder()
            .config(config.rag.clone())
            .embedding_provider(embedder.clone())
            .vector_store(vectors.clone())
            .dimensions(config.embedding_dimensions)
            .build()
            .unwrap();
        let index = VectorIndex::new(vectors.clone(), config.embedding_dimensions, &config.rag);
        let pipeline = DocumentPipeline::new(store.clone(), locator.clone(), ingest);
        let documents = DocumentService::new(store.clone(), locator.clone(), index);
        let progress = ProgressService::new(store.clone());

        let topic = Topic::new("AWS Certified Cloud Practitioner", Some("Foundational".into()));
        store.insert_topic(topic.clone()).await.unwrap();
        let learner = Uuid::new_v4();
        progress.ensure_profile(learner).await.unwrap();

        Self { config, store, locator, vectors, embedder, pipeline, documents, progress, topic, learner }
    }

    pub fn collection(&self) -> String {
        mindquest_rag::collection_name(&self.topic.id.to_string())
    }
}

pub const STUDY_GUIDE: &str = "IAM users and roles\n\
    IAM policies are JSON documents that grant or deny permissions to principals.\n\
    Use IAM roles to give EC2 instances temporary credentials.\x0c\
    Amazon S3 storage classes\n\
    S3 Standard stores objects redundantly across availability zones.\n\
    S3 Glacier archives objects that are rarely accessed.";

/// Insert a quiz with five questions directly into the store.
///
/// Correct answers: questions 1-3 `A`, question 4 `[A, C]`, question 5 `True`.
pub async fn seed_quiz(
    store: &dyn QuestStore,
    learner: LearnerId,
    topic_id: Uuid,
    difficulty: Difficulty,
    domains: [&str; 5],
) -> (Quiz, Vec<Question>) {
    let quiz = Quiz {
        id: Uuid::new_v4(),
        learner_id: learner,
        topic_id,
        difficulty,
        total_questions: 5,
        score: None,
        xp_earned: None,
        completed_at: None,
        created_at: chrono::Utc::now(),
        generation_latency_ms: 12,
        generation_model: "seeded".into(),
    };
    let questions: Vec<Question> = question_set(difficulty, domains)
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
    store.create_quiz(quiz.clone(), questions.clone()).await.unwrap();
    (quiz, questions)
}

/// Answers with the first `correct` questions right and the rest wrong.
pub fn answers(questions: &[Question], correct: usize) -> std::collections::HashMap<Uuid, Answer> {
    questions
        .iter()
        .enumerate()
        .map(|(i, q)| {
            let answer = if i < correct {
                q.correct_answer.clone()
            } else {
                match q.question_type {
                    QuestionType::MultiSelect => Answer::from(["A"]),
                    QuestionType::TrueFalse => Answer::from("False"),
                    QuestionType::SingleChoice => Answer::from("D"),
                }
            };
            (q.id, answer)
        })
        .collect()
}
