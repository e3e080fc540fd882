//! Web-search aggregation as a handler.
//!
//! [`WebSearchAggregator`] is both a regular handler (capability
//! `web_search`) and the router's fallback target. It fans out to the
//! configured HTTP providers under the request deadline, dedups by
//! canonical URL, and reports per-provider failures in its structured
//! payload so they surface in the response envelope.

use std::sync::Arc;
use std::time::Duration;

use fame_domain::capability::Capability;
use fame_domain::config::{Config, FanoutConfig, SearchProviderConfig};
use fame_domain::error::{Error, Result};
use fame_domain::result::{ErrorKind, HandlerResult};
use fame_fanout::{aggregate_search, FanoutEngine, SearchHit, SearchProvider};
use fame_plugins::{Handler, HandlerDescriptor, HandlerRequest, PluginContext};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP provider adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Generic JSON search endpoint adapter.
///
/// Queries `endpoint?q=<query>` and expects a `results` array of objects
/// with `title`, `url`/`link`, and optional `snippet` fields. The provider
/// API key, when configured, is read from the environment once at build
/// time and sent as a bearer token.
pub struct HttpSearchProvider {
    id: String,
    endpoint: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpSearchProvider {
    pub fn from_config(pc: &SearchProviderConfig) -> Result<HttpSearchProvider> {
        let api_key = match &pc.api_key_env {
            Some(env_name) => match std::env::var(env_name) {
                Ok(key) if !key.is_empty() => Some(key),
                _ => {
                    return Err(Error::Config(format!(
                        "search provider '{}': {env_name} is not set",
                        pc.id
                    )));
                }
            },
            None => None,
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(pc.timeout_ms))
            .build()
            .map_err(|e| Error::Http(format!("building search client: {e}")))?;
        Ok(HttpSearchProvider {
            id: pc.id.clone(),
            endpoint: pc.endpoint.clone(),
            api_key,
            http,
        })
    }
}

#[async_trait::async_trait]
impl SearchProvider for HttpSearchProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let mut request = self.http.get(&self.endpoint).query(&[("q", query)]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::Http(format!("{}: {e}", self.id)))?;
        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "{}: HTTP {}",
                self.id,
                response.status()
            )));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("{}: invalid JSON: {e}", self.id)))?;

        let results = body
            .get("results")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(results
            .iter()
            .filter_map(|entry| {
                let url = entry
                    .get("url")
                    .or_else(|| entry.get("link"))
                    .and_then(|v| v.as_str())?;
                Some(SearchHit {
                    title: entry
                        .get("title")
                        .and_then(|v| v.as_str())
                        .unwrap_or(url)
                        .to_owned(),
                    url: url.to_owned(),
                    snippet: entry
                        .get("snippet")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_owned(),
                    provider: self.id.clone(),
                })
            })
            .collect())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Aggregator handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct WebSearchAggregator {
    providers: Vec<Arc<dyn SearchProvider>>,
    engine: FanoutEngine,
    fanout: FanoutConfig,
}

impl WebSearchAggregator {
    /// Build the aggregator from the configured providers. Providers whose
    /// key env var is missing are skipped with a log line; an empty
    /// provider list is still a valid (always-unavailable) handler.
    pub fn from_config(config: &Config) -> Result<WebSearchAggregator> {
        let mut providers: Vec<Arc<dyn SearchProvider>> = Vec::new();
        for pc in &config.plugins.search_providers {
            match HttpSearchProvider::from_config(pc) {
                Ok(provider) => providers.push(Arc::new(provider)),
                Err(e) => {
                    tracing::warn!(provider = %pc.id, error = %e, "search provider skipped");
                }
            }
        }
        tracing::info!(providers = providers.len(), "web search aggregator ready");
        Ok(WebSearchAggregator {
            providers,
            engine: FanoutEngine::new(),
            fanout: config.fanout.clone(),
        })
    }

    /// Test/bench constructor with explicit providers.
    pub fn with_providers(
        providers: Vec<Arc<dyn SearchProvider>>,
        fanout: FanoutConfig,
    ) -> WebSearchAggregator {
        WebSearchAggregator {
            providers,
            engine: FanoutEngine::new(),
            fanout,
        }
    }
}

#[async_trait::async_trait]
impl Handler for WebSearchAggregator {
    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor::new("web_search", vec![Capability::WebSearch]).with_priority(80)
    }

    async fn init(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    async fn handle(&self, req: HandlerRequest) -> Result<HandlerResult> {
        if self.providers.is_empty() {
            return Ok(HandlerResult::failed("web_search", ErrorKind::Unavailable));
        }

        // Return before the caller's own cutoff so slow providers are
        // reported as provider errors instead of timing out this handler.
        let deadline = Duration::from_millis(req.deadline_ms.saturating_sub(250).max(50));
        let aggregation = aggregate_search(
            &self.engine,
            &self.providers,
            &req.query.id,
            &req.query.text,
            deadline,
            req.cancel.clone(),
            &self.fanout,
        )
        .await;

        let provider_errors: Vec<serde_json::Value> = aggregation
            .provider_results
            .iter()
            .filter(|r| !r.ok)
            .map(|r| {
                serde_json::json!({
                    "handler_id": r.handler_id,
                    "kind": r.error_kind.unwrap_or(ErrorKind::Exception),
                })
            })
            .collect();

        if aggregation.hits.is_empty() {
            return Ok(HandlerResult::failed("web_search", ErrorKind::Unavailable)
                .with_structured(serde_json::json!({ "provider_errors": provider_errors })));
        }

        let text = render_hits(&aggregation.hits);
        let sources: Vec<String> = aggregation.hits.iter().map(|h| h.url.clone()).collect();
        Ok(HandlerResult::success("web_search", text, 0.7)
            .with_sources(sources)
            .with_structured(serde_json::json!({
                "hits": aggregation.hits,
                "provider_errors": provider_errors,
            })))
    }
}

fn render_hits(hits: &[SearchHit]) -> String {
    let mut lines = vec!["Here's what I found:".to_owned()];
    for hit in hits.iter().take(5) {
        if hit.snippet.is_empty() {
            lines.push(format!("- {} — {}", hit.title, hit.url));
        } else {
            lines.push(format!("- {}: {} — {}", hit.title, hit.snippet, hit.url));
        }
    }
    lines.join("\n")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
