pub mod embeddings;
pub mod filter;
pub mod intent;
pub mod vector_store;

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use futures::future::join_all;

use self::embeddings::EmbeddingClient;
use self::filter::SearchFilter;
use self::intent::IntentAnalysis;
use self::vector_store::GarmentIndex;
use crate::error::ServiceError;
use crate::models::{ClothingPart, Gender, Intent, PartOutcome, PartQuery, Season};

pub const DEFAULT_TOP_K: u64 = 5;
pub const DEFAULT_PART_TIMEOUT: Duration = Duration::from_secs(30);

/// Text-to-vector service handle consumed by the engine.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, ServiceError>> + Send;
}

/// Filtered per-part ANN search handle consumed by the engine.
pub trait PartSearcher: Send + Sync {
    fn search(
        &self,
        part: ClothingPart,
        vector: Vec<f32>,
        filter: &SearchFilter,
        top_k: u64,
    ) -> impl Future<Output = Result<Vec<i64>, ServiceError>> + Send;
}

impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        EmbeddingClient::embed(self, text).await
    }
}

impl PartSearcher for GarmentIndex {
    async fn search(
        &self,
        part: ClothingPart,
        vector: Vec<f32>,
        filter: &SearchFilter,
        top_k: u64,
    ) -> Result<Vec<i64>, ServiceError> {
        GarmentIndex::search(self, part, vector, filter, top_k).await
    }
}

/// Attach the caller's gender/season context to the LLM analysis. With no
/// additional info at all the safe defaults apply: unisex-equivalent
/// gender and no season restriction, so an under-specified request is
/// never over-restricted.
pub fn resolve_intent(
    analysis: IntentAnalysis,
    gender: Option<Gender>,
    seasons: Option<Vec<Season>>,
) -> Intent {
    Intent {
        greeting: analysis.greeting,
        parts: analysis.parts,
        gender: gender.unwrap_or(Gender::Other),
        seasons: seasons.unwrap_or_default(),
    }
}

/// Retrieval orchestrator. Fans out over the intent's parts concurrently;
/// each part embeds its summary and searches its own collection with the
/// request-scoped filter. One part's failure or timeout never aborts its
/// siblings — the failed part is reported with an explicit status.
pub struct ConsultingEngine<E, S> {
    embedder: E,
    searcher: S,
    top_k: u64,
    part_timeout: Duration,
}

impl<E: Embedder, S: PartSearcher> ConsultingEngine<E, S> {
    pub fn new(embedder: E, searcher: S) -> Self {
        Self {
            embedder,
            searcher,
            top_k: DEFAULT_TOP_K,
            part_timeout: DEFAULT_PART_TIMEOUT,
        }
    }

    pub fn with_top_k(mut self, top_k: u64) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_part_timeout(mut self, timeout: Duration) -> Self {
        self.part_timeout = timeout;
        self
    }

    pub async fn consult(&self, intent: &Intent) -> HashMap<ClothingPart, PartOutcome> {
        // The filter is request-scoped: built once, reused by every part.
        let search_filter = SearchFilter::new(intent.gender, &intent.seasons);
        tracing::debug!(
            filter = %search_filter,
            parts = intent.parts.len(),
            "running per-part retrieval"
        );

        let outcomes = join_all(
            intent
                .parts
                .iter()
                .map(|query| self.run_part(query, &search_filter)),
        )
        .await;

        outcomes.into_iter().collect()
    }

    async fn run_part(
        &self,
        query: &PartQuery,
        search_filter: &SearchFilter,
    ) -> (ClothingPart, PartOutcome) {
        let work = self.embed_and_search(query, search_filter);
        let outcome = match tokio::time::timeout(self.part_timeout, work).await {
            Ok(Ok(item_ids)) => PartOutcome::Matched { item_ids },
            Ok(Err(e)) => {
                tracing::warn!("Retrieval for part '{}' failed: {}", query.part, e);
                PartOutcome::Failed {
                    reason: e.to_string(),
                }
            }
            Err(_) => {
                tracing::warn!(
                    "Retrieval for part '{}' timed out after {:?}",
                    query.part,
                    self.part_timeout
                );
                PartOutcome::Failed {
                    reason: format!("timed out after {:?}", self.part_timeout),
                }
            }
        };
        (query.part, outcome)
    }

    async fn embed_and_search(
        &self,
        query: &PartQuery,
        search_filter: &SearchFilter,
    ) -> Result<Vec<i64>, ServiceError> {
        let vector = self.embedder.embed(&query.summary).await?;
        self.searcher
            .search(query.part, vector, search_filter, self.top_k)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedEmbedder;

    impl Embedder for FixedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
            if text.trim().is_empty() {
                return Err(ServiceError::EmptyInput);
            }
            Ok(vec![0.1, 0.2, 0.3, 0.4])
        }
    }

    struct StalledEmbedder;

    impl Embedder for StalledEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ServiceError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    /// Returns a fixed ranking per part, fails for the configured parts,
    /// and records every filter expression it was handed.
    struct ScriptedSearcher {
        failing: Vec<ClothingPart>,
        ranking: Vec<i64>,
        seen_filters: Mutex<Vec<String>>,
    }

    impl ScriptedSearcher {
        fn new(failing: Vec<ClothingPart>, ranking: Vec<i64>) -> Self {
            Self {
                failing,
                ranking,
                seen_filters: Mutex::new(Vec::new()),
            }
        }
    }

    impl PartSearcher for ScriptedSearcher {
        async fn search(
            &self,
            part: ClothingPart,
            _vector: Vec<f32>,
            filter: &SearchFilter,
            top_k: u64,
        ) -> Result<Vec<i64>, ServiceError> {
            self.seen_filters.lock().unwrap().push(filter.expr());
            if self.failing.contains(&part) {
                return Err(ServiceError::IndexUnavailable("connection refused".into()));
            }
            Ok(self.ranking.iter().copied().take(top_k as usize).collect())
        }
    }

    fn intent_for(parts: &[(ClothingPart, &str)], gender: Gender, seasons: &[Season]) -> Intent {
        Intent {
            greeting: "hello".into(),
            parts: parts
                .iter()
                .map(|(part, summary)| PartQuery {
                    part: *part,
                    summary: (*summary).into(),
                })
                .collect(),
            gender,
            seasons: seasons.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_per_part_isolation() {
        let searcher = ScriptedSearcher::new(vec![ClothingPart::Pants], vec![11, 22]);
        let engine = ConsultingEngine::new(FixedEmbedder, searcher);
        let intent = intent_for(
            &[
                (ClothingPart::Tops, "black sweater"),
                (ClothingPart::Pants, "wind-prevention pants"),
                (ClothingPart::Outerwear, "blue jacket"),
            ],
            Gender::Man,
            &[],
        );

        let results = engine.consult(&intent).await;
        assert_eq!(results.len(), 3);
        assert_eq!(
            results[&ClothingPart::Tops],
            PartOutcome::Matched {
                item_ids: vec![11, 22]
            }
        );
        assert_eq!(
            results[&ClothingPart::Outerwear],
            PartOutcome::Matched {
                item_ids: vec![11, 22]
            }
        );
        assert!(matches!(
            results[&ClothingPart::Pants],
            PartOutcome::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_filter_is_request_scoped() {
        let searcher = ScriptedSearcher::new(vec![], vec![1]);
        let engine = ConsultingEngine::new(FixedEmbedder, searcher);
        let intent = intent_for(
            &[
                (ClothingPart::Tops, "sweater"),
                (ClothingPart::DressSkirt, "pleated skirt"),
            ],
            Gender::Woman,
            &[Season::Winter, Season::Spring],
        );

        engine.consult(&intent).await;
        let seen = engine.searcher.seen_filters.lock().unwrap();
        assert_eq!(seen.len(), 2);
        for expr in seen.iter() {
            assert_eq!(expr, "gender in [2,3] and spring == 1 and winter == 1");
        }
    }

    #[tokio::test]
    async fn test_ranking_preserved_and_bounded() {
        let searcher = ScriptedSearcher::new(vec![], vec![9, 5, 7, 1, 3, 8, 2]);
        let engine = ConsultingEngine::new(FixedEmbedder, searcher).with_top_k(5);
        let intent = intent_for(&[(ClothingPart::Tops, "sweater")], Gender::Other, &[]);

        let results = engine.consult(&intent).await;
        assert_eq!(
            results[&ClothingPart::Tops],
            PartOutcome::Matched {
                item_ids: vec![9, 5, 7, 1, 3]
            }
        );
    }

    #[tokio::test]
    async fn test_empty_parts_give_empty_map() {
        let searcher = ScriptedSearcher::new(vec![], vec![1]);
        let engine = ConsultingEngine::new(FixedEmbedder, searcher);
        let intent = intent_for(&[], Gender::Other, &[]);
        assert!(engine.consult(&intent).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_part_timeout_is_a_part_failure() {
        let searcher = ScriptedSearcher::new(vec![], vec![1]);
        let engine = ConsultingEngine::new(StalledEmbedder, searcher)
            .with_part_timeout(Duration::from_secs(5));
        let intent = intent_for(&[(ClothingPart::Tops, "sweater")], Gender::Other, &[]);

        let results = engine.consult(&intent).await;
        match &results[&ClothingPart::Tops] {
            PartOutcome::Failed { reason } => assert!(reason.contains("timed out")),
            other => panic!("expected timeout failure, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_intent_defaults() {
        let analysis = IntentAnalysis {
            greeting: "hi".into(),
            parts: vec![PartQuery {
                part: ClothingPart::Tops,
                summary: "black sweater".into(),
            }],
        };
        let intent = resolve_intent(analysis, None, None);
        assert_eq!(intent.gender, Gender::Other);
        assert!(intent.seasons.is_empty());
        // The maximally-inclusive default keeps unisex items reachable.
        assert_eq!(
            SearchFilter::new(intent.gender, &intent.seasons).expr(),
            "gender in [3]"
        );
    }

    #[test]
    fn test_resolve_intent_keeps_caller_context() {
        let analysis = IntentAnalysis {
            greeting: "hi".into(),
            parts: Vec::new(),
        };
        let intent = resolve_intent(
            analysis,
            Some(Gender::Man),
            Some(vec![Season::Summer, Season::Spring]),
        );
        assert_eq!(intent.gender, Gender::Man);
        assert_eq!(
            SearchFilter::new(intent.gender, &intent.seasons).expr(),
            "gender in [1,3] and spring == 1 and summer == 1"
        );
    }
}
