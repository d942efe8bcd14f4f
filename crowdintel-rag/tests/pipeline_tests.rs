//! End-to-end tests: ingest a corpus directory, retrieve and synthesize.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crowdintel_rag::mock::{MockEmbeddingProvider, MockGenerator};
use crowdintel_rag::{
    AnswerOutcome, AnswerSynthesizer, EmbeddingEncoder, FALLBACK_ANSWER, FileVectorStore,
    IngestionPipeline, RagError, RetrievalEngine, RetryPolicy, VectorStore,
};

const ALIAS: &str = "crowdfunding_docs";

fn write_corpus(dir: &Path, files: &[(&str, &str)]) {
    fs::create_dir_all(dir).unwrap();
    for (name, text) in files {
        fs::write(dir.join(name), text).unwrap();
    }
}

fn scenario_corpus(dir: &Path) {
    write_corpus(
        dir,
        &[
            ("a.txt", "Design campaigns favor modular products."),
            ("b.txt", "Film campaigns rely on trailer quality."),
        ],
    );
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::default().with_initial_delay(1).without_jitter()
}

struct Harness {
    _temp: tempfile::TempDir,
    corpus: std::path::PathBuf,
    store: Arc<FileVectorStore>,
    encoder: EmbeddingEncoder,
}

impl Harness {
    async fn new() -> Self {
        Self::with_provider(MockEmbeddingProvider::default()).await
    }

    async fn with_provider(provider: MockEmbeddingProvider) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let corpus = temp.path().join("docs");
        let store = Arc::new(FileVectorStore::open(temp.path().join("chroma_store")).await.unwrap());
        let encoder = EmbeddingEncoder::new(Arc::new(provider)).with_retry(fast_retry());
        Self { _temp: temp, corpus, store, encoder }
    }

    fn pipeline(&self) -> IngestionPipeline {
        IngestionPipeline::new(self.encoder.clone(), self.store.clone(), &self.corpus, ALIAS)
    }

    fn engine(&self) -> RetrievalEngine {
        RetrievalEngine::new(self.encoder.clone(), self.store.clone(), ALIAS)
    }

    fn synthesizer(&self, generator: Arc<MockGenerator>) -> AnswerSynthesizer {
        AnswerSynthesizer::new(self.engine(), generator).with_retry(fast_retry())
    }

    async fn published_ids(&self) -> BTreeSet<String> {
        let current = self.store.resolve(ALIAS).await.unwrap();
        let ids = self.store.document_ids(&current).await.unwrap();
        let unique: BTreeSet<String> = ids.iter().cloned().collect();
        assert_eq!(unique.len(), ids.len(), "duplicate ids in {current}: {ids:?}");
        unique
    }
}

#[tokio::test]
async fn design_question_retrieves_and_cites_the_design_document() {
    let harness = Harness::new().await;
    scenario_corpus(&harness.corpus);
    harness.pipeline().rebuild().await.unwrap();

    let question = "What matters for design campaigns?";
    let retrieved = harness.engine().retrieve(question, 1).await.unwrap();
    assert_eq!(retrieved.len(), 1);
    assert_eq!(retrieved[0].id, "a.txt");

    let generator = Arc::new(MockGenerator::new("Modular products matter. [Source: a.txt]"));
    let answer = harness.synthesizer(generator.clone()).answer(question, 1).await.unwrap();

    assert_eq!(answer.outcome, AnswerOutcome::Generated);
    assert_eq!(answer.documents, retrieved);
    let prompt = answer.prompt.unwrap();
    assert!(prompt.contains(
        "[Source: a.txt] Design campaigns favor modular products.\nDesign campaigns favor modular products."
    ));
    assert!(prompt.contains(question));
    assert!(!prompt.contains("[Source: b.txt]"));
    assert_eq!(generator.calls().len(), 1);
}

#[tokio::test]
async fn token_level_embeddings_are_flattened_consistently() {
    let harness = Harness::with_provider(MockEmbeddingProvider::default().per_token()).await;
    scenario_corpus(&harness.corpus);
    harness.pipeline().rebuild().await.unwrap();

    let retrieved = harness.engine().retrieve("What matters for design campaigns?", 2).await.unwrap();
    let ids: Vec<&str> = retrieved.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["a.txt", "b.txt"]);
}

#[tokio::test]
async fn rebuilding_twice_stores_each_file_exactly_once() {
    let harness = Harness::new().await;
    scenario_corpus(&harness.corpus);

    harness.pipeline().rebuild().await.unwrap();
    harness.pipeline().rebuild().await.unwrap();

    let expected: BTreeSet<String> = ["a.txt", "b.txt"].iter().map(|s| s.to_string()).collect();
    assert_eq!(harness.published_ids().await, expected);
}

#[tokio::test]
async fn rebuild_drops_documents_removed_from_the_corpus() {
    let harness = Harness::new().await;
    scenario_corpus(&harness.corpus);
    harness.pipeline().rebuild().await.unwrap();

    fs::remove_file(harness.corpus.join("b.txt")).unwrap();
    harness.pipeline().rebuild().await.unwrap();

    assert_eq!(harness.published_ids().await, BTreeSet::from(["a.txt".to_string()]));
}

#[tokio::test]
async fn empty_corpus_answers_with_fallback_without_calling_the_generator() {
    let harness = Harness::new().await;
    write_corpus(&harness.corpus, &[]);
    let report = harness.pipeline().rebuild().await.unwrap();
    assert_eq!(report.document_count, 0);
    assert_eq!(report.dimensions, None);

    let generator = Arc::new(MockGenerator::new("should not be used"));
    let answer =
        harness.synthesizer(generator.clone()).answer("What matters?", 3).await.unwrap();

    assert_eq!(answer.answer, FALLBACK_ANSWER);
    assert_eq!(answer.outcome, AnswerOutcome::NoContext);
    assert!(answer.documents.is_empty());
    assert!(answer.prompt.is_none());

    let blank = harness.synthesizer(generator.clone()).answer("", 3).await.unwrap();
    assert_eq!(blank.answer, FALLBACK_ANSWER);
    assert_eq!(blank.outcome, AnswerOutcome::NoContext);
    assert!(generator.calls().is_empty());
}

#[tokio::test]
async fn long_documents_contribute_exactly_the_character_budget() {
    let harness = Harness::new().await;
    let body = "x".repeat(4500);
    let text = format!("Long campaign notes\n{body}");
    write_corpus(&harness.corpus, &[("long.txt", &text)]);
    harness.pipeline().rebuild().await.unwrap();

    let generator = Arc::new(MockGenerator::new("ok"));
    let answer = harness.synthesizer(generator).answer("campaign notes", 1).await.unwrap();
    let prompt = answer.prompt.unwrap();

    let kept: String = text.chars().take(4000).collect();
    let one_more: String = text.chars().take(4001).collect();
    assert!(prompt.contains(&format!("[Source: long.txt] Long campaign notes\n{kept}")));
    assert!(!prompt.contains(&one_more));
    // The stored document itself is never truncated.
    assert_eq!(answer.documents[0].text.chars().count(), text.chars().count());
}

#[tokio::test]
async fn zero_top_k_is_rejected_without_side_effects() {
    let harness = Harness::new().await;
    scenario_corpus(&harness.corpus);
    harness.pipeline().rebuild().await.unwrap();

    let generator = Arc::new(MockGenerator::new("unused"));
    let err = harness.synthesizer(generator.clone()).answer("What matters?", 0).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidArgument(_)));
    assert!(generator.calls().is_empty());
}

#[tokio::test]
async fn rollback_restores_the_previous_corpus() {
    let harness = Harness::new().await;
    write_corpus(&harness.corpus, &[("a.txt", "Design campaigns favor modular products.")]);
    let first = harness.pipeline().rebuild().await.unwrap();

    write_corpus(&harness.corpus, &[("b.txt", "Film campaigns rely on trailer quality.")]);
    let second = harness.pipeline().rebuild().await.unwrap();
    assert_eq!(second.previous.as_deref(), Some(first.collection.as_str()));
    assert_eq!(harness.published_ids().await.len(), 2);

    let restored = harness.pipeline().rollback().await.unwrap();
    assert_eq!(restored, first.collection);
    assert_eq!(harness.published_ids().await, BTreeSet::from(["a.txt".to_string()]));
}

#[tokio::test]
async fn failed_rebuild_keeps_serving_the_published_generation() {
    let harness = Harness::new().await;
    scenario_corpus(&harness.corpus);
    let published = harness.pipeline().rebuild().await.unwrap();

    let failing = EmbeddingEncoder::new(Arc::new(
        MockEmbeddingProvider::default().with_transient_failures(1),
    ))
    .with_retry(RetryPolicy::none());
    let pipeline = IngestionPipeline::new(failing, harness.store.clone(), &harness.corpus, ALIAS);
    let err = pipeline.rebuild().await.unwrap_err();
    assert!(matches!(err, RagError::Transport { .. }));

    assert_eq!(harness.store.resolve(ALIAS).await.unwrap(), published.collection);
    assert_eq!(harness.store.list_collections().await.unwrap().len(), 1);
}

#[tokio::test]
async fn transient_embedding_failures_are_retried() {
    let harness =
        Harness::with_provider(MockEmbeddingProvider::default().with_transient_failures(2)).await;
    scenario_corpus(&harness.corpus);

    let report = harness.pipeline().rebuild().await.unwrap();
    assert_eq!(report.document_count, 2);
}

#[tokio::test]
async fn query_with_a_different_embedding_model_is_refused() {
    let harness = Harness::new().await;
    scenario_corpus(&harness.corpus);
    harness.pipeline().rebuild().await.unwrap();

    let other = EmbeddingEncoder::new(Arc::new(
        MockEmbeddingProvider::default().with_model("other-model"),
    ));
    let engine = RetrievalEngine::new(other, harness.store.clone(), ALIAS);
    let err = engine.retrieve("What matters?", 1).await.unwrap_err();
    assert!(matches!(err, RagError::ModelMismatch { .. }));
}

#[tokio::test]
async fn published_index_survives_reopening_the_store() {
    let harness = Harness::new().await;
    scenario_corpus(&harness.corpus);
    harness.pipeline().rebuild().await.unwrap();

    let reopened = Arc::new(FileVectorStore::open(harness.store.root()).await.unwrap());
    let engine = RetrievalEngine::new(harness.encoder.clone(), reopened, ALIAS);
    let retrieved = engine.retrieve("What matters for design campaigns?", 1).await.unwrap();
    assert_eq!(retrieved[0].id, "a.txt");
}

#[tokio::test]
async fn missing_corpus_directory_fails_ingestion() {
    let harness = Harness::new().await;
    let err = harness.pipeline().rebuild().await.unwrap_err();
    assert!(matches!(err, RagError::CorpusNotFound { .. }));
    assert!(harness.store.list_collections().await.unwrap().is_empty());
}
