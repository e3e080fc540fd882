//! Multi-provider web-search aggregation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use fame_domain::config::FanoutConfig;
use fame_domain::error::Result;
use fame_domain::result::HandlerResult;

use crate::engine::{FanoutEngine, FanoutTask};
use crate::url::canonicalize;

/// One search result from one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
    pub provider: String,
}

/// A search backend the aggregator can fan out to.
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn id(&self) -> &str;

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
}

/// The merged outcome of one search fan-out.
#[derive(Debug, Clone)]
pub struct SearchAggregation {
    /// Deduped, ranked hits.
    pub hits: Vec<SearchHit>,
    /// Raw per-provider results, for error reporting.
    pub provider_results: Vec<HandlerResult>,
}

/// Fan out the query to every provider, then merge:
/// - dedup by canonical URL (first hit from the best-ranked provider wins);
/// - order by the configured provider priority, keeping each provider's
///   own result order within its block;
/// - cap at `max_results`.
pub async fn aggregate_search(
    engine: &FanoutEngine,
    providers: &[Arc<dyn SearchProvider>],
    query_id: &str,
    query: &str,
    deadline: Duration,
    cancel: CancellationToken,
    config: &FanoutConfig,
) -> SearchAggregation {
    let tasks: Vec<FanoutTask> = providers
        .iter()
        .map(|provider| {
            let provider = provider.clone();
            let query = query.to_owned();
            let id = provider.id().to_owned();
            FanoutTask::new(
                id.clone(),
                Box::pin(async move {
                    let hits = provider.search(&query).await?;
                    let count = hits.len();
                    Ok(HandlerResult::success(id, format!("{count} results"), 0.6)
                        .with_structured(serde_json::json!({ "hits": hits })))
                }),
            )
        })
        .collect();

    let provider_results = engine.run(query_id, tasks, deadline, cancel).await;

    // Collect hits tagged with their provider's priority rank.
    let mut ranked: Vec<(usize, usize, SearchHit)> = Vec::new();
    for result in provider_results.iter().filter(|r| r.ok) {
        let rank = provider_rank(&result.handler_id, config);
        let hits: Vec<SearchHit> = result
            .structured
            .as_ref()
            .and_then(|s| s.get("hits"))
            .and_then(|h| serde_json::from_value(h.clone()).ok())
            .unwrap_or_default();
        for (position, hit) in hits.into_iter().enumerate() {
            ranked.push((rank, position, hit));
        }
    }
    ranked.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut seen: HashSet<String> = HashSet::new();
    let mut hits: Vec<SearchHit> = Vec::new();
    for (_, _, hit) in ranked {
        if hits.len() >= config.max_results {
            break;
        }
        if seen.insert(canonicalize(&hit.url)) {
            hits.push(hit);
        }
    }

    SearchAggregation {
        hits,
        provider_results,
    }
}

/// Position in the configured priority list; unknown providers sort last.
fn provider_rank(provider_id: &str, config: &FanoutConfig) -> usize {
    config
        .provider_priority
        .iter()
        .position(|p| p == provider_id)
        .unwrap_or(config.provider_priority.len())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use fame_domain::error::Error;
    use fame_domain::result::ErrorKind;

    struct StubProvider {
        id: String,
        hits: Vec<(&'static str, &'static str)>,
        fail: bool,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl SearchProvider for StubProvider {
        fn id(&self) -> &str {
            &self.id
        }

        async fn search(&self, _query: &str) -> Result<Vec<SearchHit>> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(Error::Other("provider down".into()));
            }
            Ok(self
                .hits
                .iter()
                .map(|(title, url)| SearchHit {
                    title: (*title).to_owned(),
                    url: (*url).to_owned(),
                    snippet: String::new(),
                    provider: self.id.clone(),
                })
                .collect())
        }
    }

    fn provider(
        id: &str,
        hits: Vec<(&'static str, &'static str)>,
    ) -> Arc<dyn SearchProvider> {
        Arc::new(StubProvider {
            id: id.into(),
            hits,
            fail: false,
            delay: Duration::from_millis(1),
        })
    }

    #[tokio::test]
    async fn dedups_by_canonical_url() {
        let providers = vec![
            provider("serpapi", vec![("A", "https://Example.com/a/")]),
            provider("bing", vec![("A again", "https://example.com/a")]),
            provider("news", vec![("A tracked", "https://example.com/a?utm_source=x")]),
        ];
        let agg = aggregate_search(
            &FanoutEngine::new(),
            &providers,
            "q1",
            "anything",
            Duration::from_secs(5),
            CancellationToken::new(),
            &FanoutConfig::default(),
        )
        .await;

        assert_eq!(agg.hits.len(), 1);
        // The highest-priority provider's copy survives.
        assert_eq!(agg.hits[0].provider, "serpapi");
    }

    #[tokio::test]
    async fn orders_by_provider_priority() {
        let providers = vec![
            provider("news", vec![("N", "https://n.example/1")]),
            provider("serpapi", vec![("S", "https://s.example/1")]),
            provider("bing", vec![("B", "https://b.example/1")]),
        ];
        let agg = aggregate_search(
            &FanoutEngine::new(),
            &providers,
            "q1",
            "anything",
            Duration::from_secs(5),
            CancellationToken::new(),
            &FanoutConfig::default(),
        )
        .await;

        let order: Vec<&str> = agg.hits.iter().map(|h| h.provider.as_str()).collect();
        assert_eq!(order, vec!["serpapi", "bing", "news"]);
    }

    #[tokio::test]
    async fn slow_provider_times_out_others_survive() {
        let slow: Arc<dyn SearchProvider> = Arc::new(StubProvider {
            id: "google_cse".into(),
            hits: vec![("G", "https://g.example/1")],
            fail: false,
            delay: Duration::from_secs(120),
        });
        let providers = vec![
            provider("serpapi", vec![("S", "https://s.example/1")]),
            slow,
        ];
        let agg = aggregate_search(
            &FanoutEngine::new(),
            &providers,
            "q1",
            "anything",
            Duration::from_millis(200),
            CancellationToken::new(),
            &FanoutConfig::default(),
        )
        .await;

        assert_eq!(agg.hits.len(), 1);
        assert_eq!(agg.hits[0].provider, "serpapi");
        let timed_out = agg
            .provider_results
            .iter()
            .find(|r| r.handler_id == "google_cse")
            .unwrap();
        assert_eq!(timed_out.error_kind, Some(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn failed_provider_is_reported_not_fatal() {
        let failing: Arc<dyn SearchProvider> = Arc::new(StubProvider {
            id: "bing".into(),
            hits: vec![],
            fail: true,
            delay: Duration::from_millis(1),
        });
        let providers = vec![provider("serpapi", vec![("S", "https://s.example/1")]), failing];
        let agg = aggregate_search(
            &FanoutEngine::new(),
            &providers,
            "q1",
            "anything",
            Duration::from_secs(5),
            CancellationToken::new(),
            &FanoutConfig::default(),
        )
        .await;

        assert_eq!(agg.hits.len(), 1);
        assert!(agg
            .provider_results
            .iter()
            .any(|r| !r.ok && r.handler_id == "bing"));
    }

    #[tokio::test]
    async fn result_cap_is_enforced() {
        let many: Vec<(&'static str, &'static str)> = vec![
            ("1", "https://e.example/1"),
            ("2", "https://e.example/2"),
            ("3", "https://e.example/3"),
        ];
        let providers = vec![provider("serpapi", many)];
        let config = FanoutConfig {
            max_results: 2,
            ..FanoutConfig::default()
        };
        let agg = aggregate_search(
            &FanoutEngine::new(),
            &providers,
            "q1",
            "anything",
            Duration::from_secs(5),
            CancellationToken::new(),
            &config,
        )
        .await;
        assert_eq!(agg.hits.len(), 2);
    }
}
