//! Document state machine, ingestion queue and document service.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{Fixture, STUDY_GUIDE};
use mindquest_quiz::{
    Achievement, Document, DocumentPipeline, DocumentStatus, EvaluationCommit, InMemoryLocator,
    InMemoryQuestStore, IngestionQueue, LearnerId, ObjectLocator, ProcessOutcome, Profile, Progress,
    QuestError, QuestStore, Question, Quiz, Topic,
};
use uuid::Uuid;

#[tokio::test]
async fn pending_document_completes_and_is_searchable() {
    let fx = Fixture::new().await;
    let doc = fx.documents.upload(fx.topic.id, "guide.txt", STUDY_GUIDE.as_bytes()).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Pending);
    assert!(doc.processed_at.is_none());

    let outcome = fx.pipeline.process(doc.id).await.unwrap();
    let ProcessOutcome::Completed { chunk_count } = outcome else { panic!("unexpected outcome {outcome:?}") };
    assert!(chunk_count >= 2);

    let stored = fx.store.document(doc.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Completed);
    assert!(stored.processed_at.is_some());
    assert_eq!(fx.vectors.len(&fx.collection()).await, Some(chunk_count));
}

#[tokio::test]
async fn completed_document_is_left_alone() {
    let fx = Fixture::new().await;
    let doc = fx.documents.upload(fx.topic.id, "guide.txt", STUDY_GUIDE.as_bytes()).await.unwrap();
    fx.pipeline.process(doc.id).await.unwrap();
    let before = fx.vectors.len(&fx.collection()).await;

    assert_eq!(fx.pipeline.process(doc.id).await.unwrap(), ProcessOutcome::AlreadyCompleted);
    assert_eq!(fx.vectors.len(&fx.collection()).await, before);
}

#[tokio::test]
async fn embedding_outage_marks_document_failed_and_retry_recovers() {
    let fx = Fixture::new().await;
    let doc = fx.documents.upload(fx.topic.id, "guide.txt", STUDY_GUIDE.as_bytes()).await.unwrap();

    fx.embedder.failing.store(true, Ordering::SeqCst);
    let outcome = fx.pipeline.process(doc.id).await.unwrap();
    assert_eq!(outcome.status(), DocumentStatus::Failed);
    let stored = fx.store.document(doc.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Failed);
    assert!(stored.processed_at.is_none());

    fx.embedder.failing.store(false, Ordering::SeqCst);
    let outcome = fx.pipeline.process(doc.id).await.unwrap();
    assert_eq!(outcome.status(), DocumentStatus::Completed);
}

#[tokio::test]
async fn unreadable_document_fails() {
    let fx = Fixture::new().await;
    let doc = fx.documents.upload(fx.topic.id, "scan.pdf", &[0xff, 0xfe, 0x00, 0x9f]).await.unwrap();

    let outcome = fx.pipeline.process(doc.id).await.unwrap();
    assert!(matches!(outcome, ProcessOutcome::Failed { ref reason } if reason.contains("Extraction")));
    assert_eq!(fx.vectors.len(&fx.collection()).await, None);
}

#[tokio::test]
async fn processing_document_is_rejected() {
    let fx = Fixture::new().await;
    let mut doc = fx.documents.upload(fx.topic.id, "guide.txt", STUDY_GUIDE.as_bytes()).await.unwrap();
    doc.status = DocumentStatus::Processing;
    fx.store.update_document(&doc).await.unwrap();

    let err = fx.pipeline.process(doc.id).await.unwrap_err();
    assert!(matches!(err, QuestError::Validation(_)));
}

#[tokio::test]
async fn missing_document_is_not_found() {
    let fx = Fixture::new().await;
    let err = fx.pipeline.process(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, QuestError::NotFound { entity: "document", .. }));
}

/// Records the document status the store holds while the bytes are fetched.
struct StatusRecordingLocator {
    inner: InMemoryLocator,
    store: Arc<dyn QuestStore>,
    document_id: Mutex<Option<Uuid>>,
    seen: Mutex<Vec<DocumentStatus>>,
}

#[async_trait]
impl ObjectLocator for StatusRecordingLocator {
    async fn put(&self, key: &str, bytes: &[u8]) -> mindquest_quiz::Result<String> {
        self.inner.put(key, bytes).await
    }

    async fn fetch(&self, locator: &str) -> mindquest_quiz::Result<Vec<u8>> {
        let id = *self.document_id.lock().unwrap();
        if let Some(id) = id {
            let status = self.store.document(id).await?.map(|d| d.status);
            self.seen.lock().unwrap().extend(status);
        }
        self.inner.fetch(locator).await
    }

    async fn remove(&self, locator: &str) -> mindquest_quiz::Result<()> {
        self.inner.remove(locator).await
    }
}

#[tokio::test]
async fn processing_status_is_committed_before_external_work() {
    let fx = Fixture::new().await;
    let recording = Arc::new(StatusRecordingLocator {
        inner: InMemoryLocator::new(),
        store: fx.store.clone(),
        document_id: Mutex::new(None),
        seen: Mutex::new(Vec::new()),
    });
    let pipeline = DocumentPipeline::new(fx.store.clone(), recording.clone(), fx.pipeline.ingest().clone());

    let locator = recording.put("certifications/t/guide.txt", STUDY_GUIDE.as_bytes()).await.unwrap();
    let doc = Document::new(fx.topic.id, "guide.txt", locator);
    fx.store.insert_document(doc.clone()).await.unwrap();
    *recording.document_id.lock().unwrap() = Some(doc.id);

    pipeline.process(doc.id).await.unwrap();
    assert_eq!(*recording.seen.lock().unwrap(), vec![DocumentStatus::Processing]);
}

#[tokio::test]
async fn process_outstanding_handles_pending_and_failed() {
    let fx = Fixture::new().await;
    let good = fx.documents.upload(fx.topic.id, "good.txt", STUDY_GUIDE.as_bytes()).await.unwrap();
    let bad = fx.documents.upload(fx.topic.id, "bad.pdf", &[0xff, 0xfe]).await.unwrap();

    let completed = fx.pipeline.process_outstanding(fx.topic.id).await.unwrap();
    assert_eq!(completed, 1);
    assert_eq!(fx.store.document(good.id).await.unwrap().unwrap().status, DocumentStatus::Completed);
    assert_eq!(fx.store.document(bad.id).await.unwrap().unwrap().status, DocumentStatus::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queue_processes_every_submitted_document() {
    let fx = Fixture::new().await;
    let queue = Arc::new(IngestionQueue::start(fx.pipeline.clone(), 2, 8));
    let documents = fx.documents.clone().with_queue(queue.clone());

    let mut ids = Vec::new();
    for i in 0..3 {
        let text = format!("{STUDY_GUIDE}\x0cAppendix {i}\nCloudTrail records API calls.");
        ids.push(documents.upload_and_enqueue(fx.topic.id, &format!("part{i}.txt"), text.as_bytes()).await.unwrap().id);
    }
    queue.shutdown().await;

    let stats = queue.stats();
    assert_eq!(stats.submitted, 3);
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.in_flight(), 0);
    for id in ids {
        assert_eq!(fx.store.document(id).await.unwrap().unwrap().status, DocumentStatus::Completed);
    }
}

#[tokio::test]
async fn full_queue_rejects_without_blocking() {
    let fx = Fixture::new().await;
    // The current-thread runtime does not run the dispatcher until the test yields.
    let queue = IngestionQueue::start(fx.pipeline.clone(), 1, 1);

    queue.submit(Uuid::new_v4()).unwrap();
    let err = queue.submit(Uuid::new_v4()).unwrap_err();
    assert!(matches!(err, QuestError::QueueFull));
    assert_eq!(queue.stats().submitted, 1);

    queue.shutdown().await;
    assert!(matches!(queue.submit(Uuid::new_v4()).unwrap_err(), QuestError::QueueClosed));
    assert_eq!(queue.stats().failed, 1);
}

#[tokio::test]
async fn upload_validates_name_content_and_topic() {
    let fx = Fixture::new().await;

    let err = fx.documents.upload(fx.topic.id, "notes.docx", b"text").await.unwrap_err();
    assert!(matches!(err, QuestError::Validation(_)));
    let err = fx.documents.upload(fx.topic.id, "../etc/passwd.txt", b"text").await.unwrap_err();
    assert!(matches!(err, QuestError::Validation(_)));
    let err = fx.documents.upload(fx.topic.id, "empty.txt", b"").await.unwrap_err();
    assert!(matches!(err, QuestError::Validation(_)));
    let err = fx.documents.upload(Uuid::new_v4(), "guide.txt", b"text").await.unwrap_err();
    assert!(matches!(err, QuestError::NotFound { entity: "topic", .. }));

    let doc = fx.documents.upload(fx.topic.id, "Guide.PDF", b"%PDF-1.4 not really").await.unwrap();
    assert!(doc.locator.ends_with(&format!("certifications/{}/{}/Guide.PDF", fx.topic.id, doc.id)));
    assert_eq!(fx.documents.documents(fx.topic.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn enqueue_without_queue_is_a_config_error() {
    let fx = Fixture::new().await;
    let err = fx.documents.upload_and_enqueue(fx.topic.id, "guide.txt", b"text").await.unwrap_err();
    assert!(matches!(err, QuestError::Config(_)));
}

#[tokio::test]
async fn delete_document_removes_vectors_bytes_and_row() {
    let fx = Fixture::new().await;
    let keep = fx.documents.upload(fx.topic.id, "keep.txt", STUDY_GUIDE.as_bytes()).await.unwrap();
    let drop = fx.documents.upload(fx.topic.id, "drop.txt", STUDY_GUIDE.as_bytes()).await.unwrap();
    fx.pipeline.process_outstanding(fx.topic.id).await.unwrap();
    let total = fx.vectors.len(&fx.collection()).await.unwrap();

    fx.documents.delete_document(drop.id).await.unwrap();

    assert_eq!(fx.vectors.len(&fx.collection()).await, Some(total / 2));
    assert!(fx.store.document(drop.id).await.unwrap().is_none());
    assert!(fx.locator.fetch(&drop.locator).await.is_err());
    assert!(fx.store.document(keep.id).await.unwrap().is_some());

    fx.documents.delete_topic_index(fx.topic.id).await.unwrap();
    assert_eq!(fx.vectors.len(&fx.collection()).await, None);
}

#[tokio::test]
async fn same_file_name_uploads_keep_separate_bytes() {
    let fx = Fixture::new().await;
    let first = fx.documents.upload(fx.topic.id, "guide.txt", STUDY_GUIDE.as_bytes()).await.unwrap();
    let second = fx.documents.upload(fx.topic.id, "guide.txt", b"S3 Glacier archives rarely accessed objects.").await.unwrap();

    assert_ne!(first.locator, second.locator);
    assert_eq!(fx.locator.fetch(&first.locator).await.unwrap(), STUDY_GUIDE.as_bytes());

    fx.documents.delete_document(first.id).await.unwrap();
    let outcome = fx.pipeline.process(second.id).await.unwrap();
    assert_eq!(outcome.status(), DocumentStatus::Completed);
}

#[tokio::test]
async fn processing_document_cannot_be_deleted() {
    let fx = Fixture::new().await;
    let mut doc = fx.documents.upload(fx.topic.id, "guide.txt", STUDY_GUIDE.as_bytes()).await.unwrap();
    doc.status = DocumentStatus::Processing;
    fx.store.update_document(&doc).await.unwrap();

    let err = fx.documents.delete_document(doc.id).await.unwrap_err();

    assert!(matches!(err, QuestError::Validation(_)));
    assert!(fx.store.document(doc.id).await.unwrap().is_some());
    assert!(fx.locator.fetch(&doc.locator).await.is_ok());
}

/// Hands control back to the runtime before every document read and claim,
/// like a store behind a network round trip.
struct YieldingStore {
    inner: Arc<InMemoryQuestStore>,
}

#[async_trait]
impl QuestStore for YieldingStore {
    async fn insert_topic(&self, topic: Topic) -> mindquest_quiz::Result<()> {
        self.inner.insert_topic(topic).await
    }
    async fn topic(&self, id: Uuid) -> mindquest_quiz::Result<Option<Topic>> {
        self.inner.topic(id).await
    }
    async fn insert_document(&self, document: Document) -> mindquest_quiz::Result<()> {
        self.inner.insert_document(document).await
    }
    async fn document(&self, id: Uuid) -> mindquest_quiz::Result<Option<Document>> {
        let document = self.inner.document(id).await;
        tokio::task::yield_now().await;
        document
    }
    async fn update_document(&self, document: &Document) -> mindquest_quiz::Result<()> {
        self.inner.update_document(document).await
    }
    async fn begin_processing(&self, id: Uuid) -> mindquest_quiz::Result<(Document, bool)> {
        tokio::task::yield_now().await;
        self.inner.begin_processing(id).await
    }
    async fn documents_for_topic(&self, topic_id: Uuid) -> mindquest_quiz::Result<Vec<Document>> {
        self.inner.documents_for_topic(topic_id).await
    }
    async fn delete_document(&self, id: Uuid) -> mindquest_quiz::Result<()> {
        self.inner.delete_document(id).await
    }
    async fn create_quiz(&self, quiz: Quiz, questions: Vec<Question>) -> mindquest_quiz::Result<()> {
        self.inner.create_quiz(quiz, questions).await
    }
    async fn quiz(&self, id: Uuid) -> mindquest_quiz::Result<Option<Quiz>> {
        self.inner.quiz(id).await
    }
    async fn questions(&self, quiz_id: Uuid) -> mindquest_quiz::Result<Vec<Question>> {
        self.inner.questions(quiz_id).await
    }
    async fn quizzes_for_learner(&self, learner_id: LearnerId, topic_id: Option<Uuid>) -> mindquest_quiz::Result<Vec<Quiz>> {
        self.inner.quizzes_for_learner(learner_id, topic_id).await
    }
    async fn insert_profile(&self, profile: Profile) -> mindquest_quiz::Result<()> {
        self.inner.insert_profile(profile).await
    }
    async fn profile(&self, learner_id: LearnerId) -> mindquest_quiz::Result<Option<Profile>> {
        self.inner.profile(learner_id).await
    }
    async fn progress(&self, learner_id: LearnerId, topic_id: Uuid) -> mindquest_quiz::Result<Option<Progress>> {
        self.inner.progress(learner_id, topic_id).await
    }
    async fn insert_progress(&self, progress: Progress) -> mindquest_quiz::Result<Progress> {
        self.inner.insert_progress(progress).await
    }
    async fn progress_for_learner(&self, learner_id: LearnerId) -> mindquest_quiz::Result<Vec<Progress>> {
        self.inner.progress_for_learner(learner_id).await
    }
    async fn achievements(&self, learner_id: LearnerId) -> mindquest_quiz::Result<Vec<Achievement>> {
        self.inner.achievements(learner_id).await
    }
    async fn has_achievement(&self, learner_id: LearnerId, name: &str) -> mindquest_quiz::Result<bool> {
        self.inner.has_achievement(learner_id, name).await
    }
    async fn commit_evaluation(&self, commit: EvaluationCommit) -> mindquest_quiz::Result<()> {
        self.inner.commit_evaluation(commit).await
    }
}

/// Counts fetches, i.e. how many runs got past the claim.
struct CountingLocator {
    inner: InMemoryLocator,
    fetches: AtomicUsize,
}

#[async_trait]
impl ObjectLocator for CountingLocator {
    async fn put(&self, key: &str, bytes: &[u8]) -> mindquest_quiz::Result<String> {
        self.inner.put(key, bytes).await
    }

    async fn fetch(&self, locator: &str) -> mindquest_quiz::Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(locator).await
    }

    async fn remove(&self, locator: &str) -> mindquest_quiz::Result<()> {
        self.inner.remove(locator).await
    }
}

#[tokio::test]
async fn concurrent_runs_process_a_document_once() {
    let fx = Fixture::new().await;
    let store = Arc::new(YieldingStore { inner: fx.store.clone() });
    let locator = Arc::new(CountingLocator { inner: InMemoryLocator::new(), fetches: AtomicUsize::new(0) });
    let pipeline = DocumentPipeline::new(store, locator.clone(), fx.pipeline.ingest().clone());

    let key = format!("certifications/{}/guide.txt", fx.topic.id);
    let doc = Document::new(fx.topic.id, "guide.txt", locator.put(&key, STUDY_GUIDE.as_bytes()).await.unwrap());
    fx.store.insert_document(doc.clone()).await.unwrap();

    let (a, b) = tokio::join!(pipeline.process(doc.id), pipeline.process(doc.id));

    assert_eq!(locator.fetches.load(Ordering::SeqCst), 1);
    let completed = [&a, &b].iter().filter(|r| matches!(r, Ok(ProcessOutcome::Completed { .. }))).count();
    assert_eq!(completed, 1, "a={a:?} b={b:?}");
    for outcome in [a, b] {
        assert!(matches!(
            outcome,
            Ok(ProcessOutcome::Completed { .. } | ProcessOutcome::AlreadyCompleted) | Err(QuestError::Validation(_))
        ));
    }
    assert_eq!(fx.store.document(doc.id).await.unwrap().unwrap().status, DocumentStatus::Completed);
}
