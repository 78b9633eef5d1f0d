#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end tests for upload and question answering over the local index

mod common;

use std::sync::Arc;
use std::thread;

use tempfile::TempDir;

use common::{DIMENSION, ExtractiveModel, HashingEmbedder};
use doc_qa::answer::NOT_IN_CONTEXT;
use doc_qa::embeddings::ChunkingConfig;
use doc_qa::index::{IndexStore, LocalIndexStore, QueryOutcome};
use doc_qa::pipeline::{Answer, KnowledgeBase, NOT_READY_MESSAGE};

fn knowledge_base(temp_dir: &TempDir) -> KnowledgeBase {
    let index = LocalIndexStore::new(temp_dir.path().join("index.json"), DIMENSION);
    KnowledgeBase::new(Box::new(HashingEmbedder), Box::new(index))
        .with_language_model(Box::new(ExtractiveModel::default()))
}

#[test]
fn upload_then_ask() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let kb = knowledge_base(&temp_dir);

    let result = kb.ingest("capitals.txt", b"Paris is the capital of France.");
    assert_eq!(
        KnowledgeBase::upload_message("capitals.txt", &result),
        "File 'capitals.txt' processed and added to the knowledge base."
    );

    let answer = kb
        .ask("What is the capital of France?")
        .expect("ask should succeed");

    let Answer::Answered { text, sources } = answer else {
        panic!("knowledge base should be ready");
    };
    assert!(text.contains("Paris"));
    assert_eq!(sources, vec!["capitals.txt"]);
}

#[test]
fn question_outside_the_documents() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let kb = knowledge_base(&temp_dir);
    kb.ingest("fruit.txt", b"Bananas are yellow.")
        .expect("ingest should succeed");

    assert_eq!(kb.respond("Who wrote Hamlet?"), NOT_IN_CONTEXT);
}

#[test]
fn fresh_knowledge_base_is_not_ready() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let kb = knowledge_base(&temp_dir);

    assert_eq!(kb.respond("What is in the documents?"), NOT_READY_MESSAGE);
}

#[test]
fn later_uploads_add_to_earlier_ones() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let kb = knowledge_base(&temp_dir);

    kb.ingest("france.txt", b"Paris is the capital of France.")
        .expect("ingest should succeed");
    kb.ingest("germany.txt", b"Berlin is the capital of Germany.")
        .expect("ingest should succeed");

    assert_eq!(kb.status().expect("status should succeed").entries, 2);
    assert!(kb.respond("Tell me about Germany").contains("Berlin"));
    assert!(kb.respond("Tell me about France").contains("Paris"));
}

#[test]
fn index_survives_restart() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    knowledge_base(&temp_dir)
        .ingest("capitals.txt", b"Paris is the capital of France.")
        .expect("ingest should succeed");

    let restarted = knowledge_base(&temp_dir);

    assert!(restarted.respond("What is the capital of France?").contains("Paris"));
}

#[test]
fn long_document_is_chunked_with_overlap() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let kb = knowledge_base(&temp_dir).with_chunking(ChunkingConfig::new(120, 30));
    let text: String = (0..40)
        .map(|i| format!("Sentence number {} talks about topic {}.\n", i, i % 7))
        .collect();

    let report = kb
        .ingest("long.txt", text.as_bytes())
        .expect("ingest should succeed");

    assert!(report.chunks > 10);
    assert_eq!(report.characters, text.chars().count());

    let store = LocalIndexStore::new(temp_dir.path().join("index.json"), DIMENSION);
    let file = store
        .load()
        .expect("index should load")
        .expect("index should exist");
    let chunks: Vec<_> = file.entries.iter().map(|e| e.chunk.clone()).collect();
    assert!(chunks.iter().all(|c| c.char_len() <= 120));
    assert_eq!(doc_qa::embeddings::reassemble(&chunks, 30), text);
}

#[test]
fn concurrent_uploads_keep_every_entry() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let kb = Arc::new(knowledge_base(&temp_dir).with_chunking(ChunkingConfig::new(60, 10)));

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let kb = Arc::clone(&kb);
            thread::spawn(move || {
                let text = format!("Worker {worker} wrote this document. ").repeat(10);
                kb.ingest(&format!("worker-{worker}.txt"), text.as_bytes())
                    .expect("ingest should succeed")
                    .chunks
            })
        })
        .collect();

    let expected: usize = handles
        .into_iter()
        .map(|handle| handle.join().expect("worker should not panic"))
        .sum();

    let store = LocalIndexStore::new(temp_dir.path().join("index.json"), DIMENSION);
    assert_eq!(store.count().expect("count should succeed"), expected);

    let file = store
        .load()
        .expect("index should load")
        .expect("index should exist");
    for worker in 0..4 {
        let source = format!("worker-{worker}.txt");
        assert!(file.entries.iter().any(|e| e.chunk.source == source));
    }
}

#[test]
fn separate_handles_on_one_file_do_not_lose_writes() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("index.json");

    let handles: Vec<_> = (0..2)
        .map(|worker| {
            let path = path.clone();
            thread::spawn(move || {
                let store = LocalIndexStore::new(path, DIMENSION);
                for i in 0..10 {
                    let chunk = doc_qa::embeddings::Chunk {
                        text: format!("worker {worker} entry {i}"),
                        source: format!("worker-{worker}.txt"),
                        index: i,
                        start: 0,
                    };
                    let vector = common::hash_embed(&chunk.text);
                    store
                        .upsert(&[chunk], &[vector])
                        .expect("upsert should succeed");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker should not panic");
    }

    let store = LocalIndexStore::new(path, DIMENSION);
    assert_eq!(store.count().expect("count should succeed"), 20);
    assert!(matches!(
        store.query(&common::hash_embed("worker 1 entry 9"), 1),
        Ok(QueryOutcome::Matches(hits)) if hits.len() == 1
    ));
}
