use super::*;
use crate::test_support::{FakeEmbedder, letter_profile};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn options_in(root: &Path) -> EngineOptions {
    let documents_dir = root.join("documents");
    fs::create_dir_all(&documents_dir).expect("create documents dir");

    EngineOptions {
        documents_dir,
        batch_size: 10,
        index_path: root.join("rag/vectors.index"),
        chunks_path: root.join("rag/chunks.json"),
        chunking: ChunkingConfig::default(),
    }
}

fn write_doc(options: &EngineOptions, name: &str, text: &str) {
    fs::write(options.documents_dir.join(name), text).expect("write document");
}

fn construct(options: &EngineOptions, embedder: &Arc<FakeEmbedder>) -> RetrievalEngine {
    let embedder: Arc<dyn Embedder> = Arc::<FakeEmbedder>::clone(embedder);
    RetrievalEngine::construct(options, embedder).expect("construct should succeed")
}

#[test]
fn empty_corpus_makes_no_embedding_calls() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let options = options_in(temp_dir.path());
    let embedder = Arc::new(FakeEmbedder::new());

    let engine = construct(&options, &embedder);

    assert!(engine.is_empty());
    assert_eq!(engine.stats().index, IndexOrigin::Empty);
    assert_eq!(engine.stats().dimension, None);
    assert!(engine.retrieve("anything", 3).expect("retrieve").is_empty());
    assert_eq!(embedder.batch_calls(), 0);
}

#[test]
fn two_chunk_corpus_returns_everything_for_large_k() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let options = options_in(temp_dir.path());
    write_doc(&options, "long.txt", &("abc".repeat(866) + "ab"));
    let embedder = Arc::new(FakeEmbedder::new());

    let engine = construct(&options, &embedder);

    assert_eq!(engine.len(), 2);
    assert_eq!(engine.chunks().len(), engine.sources().len());
    assert_eq!(engine.stats().documents, 1);
    assert_eq!(engine.stats().dimension, Some(3));
    assert_eq!(engine.stats().index, IndexOrigin::Rebuilt);
    assert!(!engine.stats().manifest_reused);
    assert_eq!(embedder.embedded_texts(), 2);

    let results = engine.retrieve("abc", 5).expect("retrieve");
    assert_eq!(results.len(), 2);
    assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
    assert!(results.iter().all(|r| r.source.ends_with("long.txt")));

    let persisted = FlatIndex::load(&options.index_path).expect("index persisted");
    assert_eq!(persisted.size(), engine.len());
}

#[test]
fn nearest_chunk_comes_first() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let options = options_in(temp_dir.path());
    write_doc(&options, "a.txt", "aaaaaaab");
    write_doc(&options, "b.txt", "bbbbbbbb");
    write_doc(&options, "c.md", "# ccc\n\ncccc");
    let embedder = Arc::new(FakeEmbedder::new());

    let engine = construct(&options, &embedder);
    let results = engine.retrieve("bb", 2).expect("retrieve");

    assert_eq!(results.len(), 2);
    assert!(results[0].source.ends_with("b.txt"));
    assert_eq!(results[0].chunk, "bbbbbbbb");
    assert!(results[0].distance.abs() < f32::EPSILON);
    assert!(results[1].source.ends_with("a.txt"));
}

#[test]
fn zero_k_returns_nothing() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let options = options_in(temp_dir.path());
    write_doc(&options, "a.txt", "aaaa");
    let embedder = Arc::new(FakeEmbedder::new());

    let engine = construct(&options, &embedder);
    let calls_after_build = embedder.batch_calls();

    assert!(engine.retrieve("a", 0).expect("retrieve").is_empty());
    assert_eq!(embedder.batch_calls(), calls_after_build);
}

#[test]
fn chunks_are_embedded_in_batches() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let mut options = options_in(temp_dir.path());
    options.batch_size = 2;
    for name in ["1.txt", "2.txt", "3.txt", "4.txt", "5.txt"] {
        write_doc(&options, name, name);
    }
    let embedder = Arc::new(FakeEmbedder::new());

    let engine = construct(&options, &embedder);

    assert_eq!(engine.len(), 5);
    assert_eq!(embedder.batch_calls(), 3);
    assert_eq!(embedder.embedded_texts(), 5);
}

#[test]
fn unchanged_corpus_reuses_both_caches() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let options = options_in(temp_dir.path());
    write_doc(&options, "a.txt", "aaaa");
    write_doc(&options, "b.txt", "bbbb");

    let first = construct(&options, &Arc::new(FakeEmbedder::new()));
    let embedder = Arc::new(FakeEmbedder::new());
    let second = construct(&options, &embedder);

    assert_eq!(embedder.batch_calls(), 0);
    assert!(second.stats().manifest_reused);
    assert_eq!(second.stats().index, IndexOrigin::Reused);
    assert_eq!(second.stats().fingerprint, first.stats().fingerprint);
    assert_eq!(second.chunks(), first.chunks());
}

#[test]
fn added_document_triggers_rebuild() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let options = options_in(temp_dir.path());
    write_doc(&options, "a.txt", "aaaa");
    construct(&options, &Arc::new(FakeEmbedder::new()));

    write_doc(&options, "b.txt", "bbbb");
    let embedder = Arc::new(FakeEmbedder::new());
    let engine = construct(&options, &embedder);

    assert_eq!(engine.len(), 2);
    assert!(!engine.stats().manifest_reused);
    assert_eq!(engine.stats().index, IndexOrigin::Rebuilt);
    assert_eq!(embedder.embedded_texts(), 2);
}

#[test]
fn renamed_document_with_same_chunk_count_triggers_rebuild() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let options = options_in(temp_dir.path());
    write_doc(&options, "a.txt", "aaaa");
    write_doc(&options, "b.txt", "bbbb");
    construct(&options, &Arc::new(FakeEmbedder::new()));

    fs::rename(
        options.documents_dir.join("a.txt"),
        options.documents_dir.join("z.txt"),
    )
    .expect("rename document");
    let embedder = Arc::new(FakeEmbedder::new());
    let engine = construct(&options, &embedder);

    assert_eq!(engine.stats().index, IndexOrigin::Rebuilt);
    assert_eq!(embedder.embedded_texts(), 2);
    assert!(engine.sources()[1].ends_with("z.txt"));

    let results = engine.retrieve("a", 1).expect("retrieve");
    assert!(results[0].source.ends_with("z.txt"));
}

#[test]
fn index_with_wrong_size_is_rebuilt() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let options = options_in(temp_dir.path());
    write_doc(&options, "a.txt", "aaaa");
    write_doc(&options, "b.txt", "bbbb");
    construct(&options, &Arc::new(FakeEmbedder::new()));

    FlatIndex::build(&[letter_profile("a")])
        .expect("build")
        .expect("index")
        .persist(&options.index_path)
        .expect("persist stale index");

    let embedder = Arc::new(FakeEmbedder::new());
    let engine = construct(&options, &embedder);

    assert_eq!(engine.stats().index, IndexOrigin::Rebuilt);
    let persisted = FlatIndex::load(&options.index_path).expect("index persisted");
    assert_eq!(persisted.size(), 2);
}

#[test]
fn untagged_index_of_matching_size_is_reused() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let options = options_in(temp_dir.path());
    write_doc(&options, "a.txt", "aaaa");
    write_doc(&options, "b.txt", "bbbb");

    FlatIndex::build(&[letter_profile("a"), letter_profile("b")])
        .expect("build")
        .expect("index")
        .persist(&options.index_path)
        .expect("persist index");

    let embedder = Arc::new(FakeEmbedder::new());
    let engine = construct(&options, &embedder);

    assert_eq!(engine.stats().index, IndexOrigin::Reused);
    assert_eq!(embedder.batch_calls(), 0);
}

#[test]
fn changed_chunking_parameters_trigger_rebuild() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let mut options = options_in(temp_dir.path());
    write_doc(&options, "long.txt", &("abc".repeat(866) + "ab"));
    let first = construct(&options, &Arc::new(FakeEmbedder::new()));

    options.chunking = ChunkingConfig {
        chunk_size: 1000,
        overlap: 100,
    };
    let embedder = Arc::new(FakeEmbedder::new());
    let engine = construct(&options, &embedder);

    assert_eq!(engine.len(), 3);
    assert_ne!(engine.stats().fingerprint, first.stats().fingerprint);
    assert!(!engine.stats().manifest_reused);
    assert_eq!(engine.stats().index, IndexOrigin::Rebuilt);
    assert_eq!(embedder.embedded_texts(), 3);
}

#[test]
fn switching_to_a_wider_model_rebuilds_the_index() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let options = options_in(temp_dir.path());
    write_doc(&options, "a.txt", "aaaa");
    construct(&options, &Arc::new(FakeEmbedder::new()));

    let wider = Arc::new(FakeEmbedder::named("letters-abcde", &['a', 'b', 'c', 'd', 'e']));
    let engine = construct(&options, &wider);

    assert!(engine.stats().manifest_reused);
    assert_eq!(engine.stats().index, IndexOrigin::Rebuilt);
    assert_eq!(engine.stats().dimension, Some(5));
    assert_eq!(wider.embedded_texts(), 1);

    let results = engine.retrieve("ddd", 1).expect("retrieve with the new model");
    assert_eq!(results.len(), 1);

    let persisted = FlatIndex::load(&options.index_path).expect("index persisted");
    assert_eq!(persisted.embedding_model(), Some("letters-abcde"));
}

#[test]
fn switching_to_a_same_width_model_rebuilds_the_index() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let options = options_in(temp_dir.path());
    write_doc(&options, "a.txt", "aaaa");
    write_doc(&options, "b.txt", "bbbb");
    construct(&options, &Arc::new(FakeEmbedder::new()));

    let reordered = Arc::new(FakeEmbedder::named("letters-cba", &['c', 'b', 'a']));
    let engine = construct(&options, &reordered);

    assert_eq!(engine.stats().index, IndexOrigin::Rebuilt);
    assert_eq!(reordered.embedded_texts(), 2);

    let reused = construct(&options, &Arc::new(FakeEmbedder::named("letters-cba", &['c', 'b', 'a'])));
    assert_eq!(reused.stats().index, IndexOrigin::Reused);
}

#[test]
fn embedding_failure_aborts_construction() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let options = options_in(temp_dir.path());
    write_doc(&options, "a.txt", "aaaa");

    let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::offline());
    let result = RetrievalEngine::construct(&options, embedder);

    assert!(matches!(result, Err(RagError::Embedding(_))));
    assert!(!options.index_path.exists());
}

#[test]
fn engine_state_names() {
    assert_eq!(EngineState::Uninitialized.to_string(), "uninitialized");
    assert_eq!(EngineState::Building.to_string(), "building");
    assert_eq!(EngineState::Ready.to_string(), "ready");
}
