//! Property tests for vector search and retrieval ordering.

use std::collections::HashSet;
use std::sync::Arc;

use neurosurf_semantic::{
    CapabilityPolicy, Document, DocumentStore, EmbeddingProvider, HashingEmbedder,
    InMemoryDocumentStore, InMemoryVectorIndex, Retriever, VectorIndex,
};
use proptest::prelude::*;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

mod prop_index_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_k(
            entries in proptest::collection::vec(("[a-z]{3,8}", arb_normalized_embedding(DIM)), 1..20),
            query in arb_normalized_embedding(DIM),
            k in 1usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (hits, unique_count) = rt.block_on(async {
                let index = InMemoryVectorIndex::new();
                for (id, embedding) in &entries {
                    index.insert(id, embedding.clone()).await.unwrap();
                }
                let unique: HashSet<&String> = entries.iter().map(|(id, _)| id).collect();
                (index.search(&query, k).await.unwrap(), unique.len())
            });

            prop_assert!(hits.len() <= k);
            prop_assert_eq!(hits.len(), k.min(unique_count));
            for window in hits.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }
        }
    }
}

mod prop_retrieve_ordering {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn retrieve_returns_at_most_k_in_non_increasing_order(
            texts in proptest::collection::vec("[a-z]{2,6}( [a-z]{2,6}){0,8}", 1..15),
            query in "[a-z]{2,6}( [a-z]{2,6}){0,4}",
            k in 1usize..20,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let embedder = Arc::new(HashingEmbedder::new(32));
                let index = Arc::new(InMemoryVectorIndex::new());
                let store = Arc::new(InMemoryDocumentStore::new());
                for (i, text) in texts.iter().enumerate() {
                    let id = format!("doc-{i}");
                    store.put(Document::new(&id, text)).await.unwrap();
                    index.insert(&id, embedder.embed(text).await.unwrap()).await.unwrap();
                }
                let retriever =
                    Retriever::new(embedder, index, store, CapabilityPolicy::default(), -1.0);
                retriever.retrieve(&query, k).await.unwrap()
            });

            prop_assert!(results.len() <= k);
            prop_assert_eq!(results.len(), k.min(texts.len()));
            for window in results.windows(2) {
                prop_assert!(window[0].score >= window[1].score);
            }
        }
    }
}
