//! Property and durability tests for the persistent vector index.

use std::collections::HashSet;
use std::sync::Arc;

use docmind_rag::{RagError, VectorIndex, normalize};
use proptest::prelude::*;

/// Generate an embedding with at least one clearly non-zero component.
fn arb_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter(
        "non-zero embedding",
        |v| v.iter().map(|x| x * x).sum::<f32>().sqrt() > 1e-3,
    )
}

fn texts(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("document {i}")).collect()
}

fn unit(dim: usize, hot: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[hot] = 1.0;
    v
}

/// Normalizing is idempotent and always yields unit length.
mod prop_normalization {
    use super::*;

    proptest! {
        #[test]
        fn normalize_is_idempotent(v in arb_embedding(32)) {
            let once = normalize(&v).unwrap();
            let twice = normalize(&once).unwrap();

            let norm: f32 = once.iter().map(|x| x * x).sum::<f32>().sqrt();
            prop_assert!((norm - 1.0).abs() < 1e-4, "norm was {norm}");
            for (a, b) in once.iter().zip(&twice) {
                prop_assert!((a - b).abs() < 1e-5);
            }
        }

        #[test]
        fn scaling_does_not_change_direction(v in arb_embedding(8), factor in 0.5f32..50.0) {
            let scaled: Vec<f32> = v.iter().map(|x| x * factor).collect();
            let a = normalize(&v).unwrap();
            let b = normalize(&scaled).unwrap();
            for (x, y) in a.iter().zip(&b) {
                prop_assert!((x - y).abs() < 1e-4);
            }
        }

        #[test]
        fn extreme_scales_do_not_change_direction(v in arb_embedding(8), exponent in -30i32..30) {
            let factor = 10f32.powi(exponent);
            let scaled: Vec<f32> = v.iter().map(|x| x * factor).collect();
            let a = normalize(&v).unwrap();
            let b = normalize(&scaled).unwrap();
            for (x, y) in a.iter().zip(&b) {
                prop_assert!((x - y).abs() < 1e-4, "{x} vs {y} at 1e{exponent}");
            }
        }
    }
}

/// Search results are ordered by descending score and bounded by both
/// `top_k` and the collection size.
mod prop_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            embeddings in proptest::collection::vec(arb_embedding(DIM), 1..20),
            query in arb_embedding(DIM),
            top_k in 1usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (results, count) = rt.block_on(async {
                let dir = tempfile::tempdir().unwrap();
                let index = VectorIndex::open(dir.path()).unwrap();
                index.add_documents("test", &texts(embeddings.len()), &embeddings, None).await.unwrap();
                let results = index.search("test", &query, top_k).await.unwrap();
                (results, embeddings.len())
            });

            prop_assert_eq!(results.len(), top_k.min(count));
            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }
            for result in &results {
                prop_assert!(result.score <= 1.0 + 1e-5 && result.score >= -1.0 - 1e-5);
            }
        }
    }
}

#[tokio::test]
async fn ties_break_by_insertion_order() {
    let dir = tempfile::tempdir().unwrap();
    let index = VectorIndex::open(dir.path()).unwrap();

    let same = vec![unit(4, 0); 4];
    let ids = index.add_documents("ties", &texts(4), &same, None).await.unwrap();

    let results = index.search("ties", &unit(4, 0), 4).await.unwrap();
    let returned: Vec<&str> = results.iter().map(|r| r.document_id.as_str()).collect();
    let expected: Vec<&str> = ids.iter().map(String::as_str).collect();
    assert_eq!(returned, expected);
}

#[tokio::test]
async fn reload_reproduces_identical_results() {
    let dir = tempfile::tempdir().unwrap();
    let embeddings =
        vec![vec![0.9, 0.1, 0.0], vec![0.1, 0.9, 0.2], vec![0.5, 0.5, 0.5], vec![0.0, 0.2, 3.0]];
    let query = vec![0.4, 0.6, 0.1];

    let before = {
        let index = VectorIndex::open(dir.path()).unwrap();
        index.add_documents("durable", &texts(4), &embeddings, None).await.unwrap();
        index.search("durable", &query, 3).await.unwrap()
    };

    let reopened = VectorIndex::open(dir.path()).unwrap();
    let after = reopened.search("durable", &query, 3).await.unwrap();

    assert_eq!(before, after);
    assert_eq!(reopened.document_count("durable").await.unwrap(), 4);
}

#[tokio::test]
async fn width_mismatch_leaves_collection_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let index = VectorIndex::open(dir.path()).unwrap();

    index.add_documents("guard", &texts(2), &vec![vec![0.5; 384]; 2], None).await.unwrap();

    let err = index.add_documents("guard", &texts(1), &[vec![0.5; 768]], None).await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 384, actual: 768 }));
    assert_eq!(index.document_count("guard").await.unwrap(), 2);

    let err = index.search("guard", &vec![0.5; 768], 1).await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { .. }));
}

#[tokio::test]
async fn deleted_documents_never_reappear() {
    let dir = tempfile::tempdir().unwrap();
    let index = VectorIndex::open(dir.path()).unwrap();

    let embeddings: Vec<Vec<f32>> = (0..6).map(|i| unit(6, i)).collect();
    let ids = index.add_documents("prune", &texts(6), &embeddings, None).await.unwrap();

    let doomed = vec![ids[1].clone(), ids[4].clone(), "unknown-id".to_string()];
    assert_eq!(index.delete_documents("prune", &doomed).await.unwrap(), 2);

    let reopened = VectorIndex::open(dir.path()).unwrap();
    for hot in 0..6 {
        let results = reopened.search("prune", &unit(6, hot), 10).await.unwrap();
        assert_eq!(results.len(), 4);
        let returned: HashSet<&str> = results.iter().map(|r| r.document_id.as_str()).collect();
        assert!(!returned.contains(ids[1].as_str()));
        assert!(!returned.contains(ids[4].as_str()));
    }

    let top = reopened.search("prune", &unit(6, 3), 1).await.unwrap();
    assert_eq!(top[0].document_id, ids[3]);
    assert_eq!(top[0].text, "document 3");
}

#[tokio::test]
async fn clearing_a_collection_allows_a_new_width() {
    let dir = tempfile::tempdir().unwrap();
    let index = VectorIndex::open(dir.path()).unwrap();

    let ids = index.add_documents("reset", &texts(2), &vec![vec![1.0; 3]; 2], None).await.unwrap();
    index.delete_documents("reset", &ids).await.unwrap();

    let info = index.collection_info("reset").await.unwrap();
    assert_eq!(info.document_count, 0);
    assert_eq!(info.dimension, None);
    assert_eq!(info.index_type, None);

    index.add_documents("reset", &texts(1), &[vec![1.0; 5]], None).await.unwrap();
    assert_eq!(index.collection_info("reset").await.unwrap().dimension, Some(5));
}

#[tokio::test]
async fn empty_collection_search_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let index = VectorIndex::open(dir.path()).unwrap();

    let results = index.search("fresh", &[0.3, 0.4], 5).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn collections_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let index = VectorIndex::open(dir.path()).unwrap();

    index.add_documents("left", &texts(1), &[vec![1.0, 0.0]], None).await.unwrap();
    index.add_documents("right", &texts(2), &vec![vec![0.0, 1.0, 0.0]; 2], None).await.unwrap();

    assert_eq!(index.document_count("left").await.unwrap(), 1);
    assert_eq!(index.document_count("right").await.unwrap(), 2);
    assert_eq!(index.collection_info("right").await.unwrap().dimension, Some(3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_to_one_collection_are_serialized() {
    const WRITERS: usize = 8;
    const BATCH: usize = 5;
    const DIM: usize = 4;

    let dir = tempfile::tempdir().unwrap();
    let index = Arc::new(VectorIndex::open(dir.path()).unwrap());

    let mut tasks = Vec::new();
    for writer in 0..WRITERS {
        let index = Arc::clone(&index);
        tasks.push(tokio::spawn(async move {
            let texts: Vec<String> = (0..BATCH).map(|i| format!("writer {writer} doc {i}")).collect();
            let embeddings = vec![unit(DIM, writer % DIM); BATCH];
            index.add_documents("shared", &texts, &embeddings, None).await.unwrap()
        }));
    }
    for _ in 0..WRITERS {
        let index = Arc::clone(&index);
        tasks.push(tokio::spawn(async move {
            // Readers see whole batches only.
            let results = index.search("shared", &unit(DIM, 0), 1000).await.unwrap();
            assert_eq!(results.len() % BATCH, 0);
            Vec::new()
        }));
    }

    let mut ids = HashSet::new();
    for task in tasks {
        ids.extend(task.await.unwrap());
    }
    assert_eq!(ids.len(), WRITERS * BATCH);
    assert_eq!(index.document_count("shared").await.unwrap(), WRITERS * BATCH);
    drop(index);

    let reopened = VectorIndex::open(dir.path()).unwrap();
    assert_eq!(reopened.document_count("shared").await.unwrap(), WRITERS * BATCH);
    let results = reopened.search("shared", &unit(DIM, 1), WRITERS * BATCH).await.unwrap();
    let returned: HashSet<String> = results.into_iter().map(|r| r.document_id).collect();
    assert_eq!(returned, ids);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn collections_mutate_in_parallel_without_interference() {
    let dir = tempfile::tempdir().unwrap();
    let index = Arc::new(VectorIndex::open(dir.path()).unwrap());

    let mut tasks = Vec::new();
    for (name, dim) in [("alpha", 2), ("beta", 3), ("gamma", 5)] {
        for round in 0..4 {
            let index = Arc::clone(&index);
            tasks.push(tokio::spawn(async move {
                let ids = index
                    .add_documents(name, &texts(3), &vec![unit(dim, round % dim); 3], None)
                    .await
                    .unwrap();
                index.delete_documents(name, &ids[..1]).await.unwrap();
            }));
        }
    }
    for task in tasks {
        task.await.unwrap();
    }

    let reopened = VectorIndex::open(dir.path()).unwrap();
    for (name, dim) in [("alpha", 2), ("beta", 3), ("gamma", 5)] {
        let info = reopened.collection_info(name).await.unwrap();
        assert_eq!(info.document_count, 8, "{name}");
        assert_eq!(info.dimension, Some(dim), "{name}");
    }
}
