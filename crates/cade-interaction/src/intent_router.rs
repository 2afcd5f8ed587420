//! First-turn intent routing.
//!
//! Maps a raw query to (intent, depth) and from there to a capability. Used
//! on the first turn of a session and on explicit re-routing; later turns go
//! through the `StateClassifier`.

use crate::prompts::{INTENT_ROUTER_SYSTEM_PROMPT, render_routing_prompt};
use crate::structured::parse_structured;
use cade_core::cache::CacheStore;
use cade_core::capability::catalog::{EXPLAIN_AND_BUILD, capability_for};
use cade_core::completion::{CompletionError, CompletionRequest, CompletionService};
use cade_core::config::{DispatchConfig, RouterConfig};
use cade_core::lexicon;
use cade_core::state::{Depth, Intent, normalize_unit_score};
use cade_infrastructure::memory_cache::InMemoryCacheStore;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const KEYWORD_FALLBACK_CONFIDENCE: f64 = 0.5;
const SHORT_QUERY_WORDS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingSource {
    Classifier,
    Cache,
    KeywordFallback,
}

/// The outcome of routing a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    pub primary_intent: Intent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_intent: Option<Intent>,
    pub depth: Depth,
    pub confidence: f64,
    pub reasoning: String,
    pub suggested_capability: String,
    /// Low confidence; the capability is still usable.
    pub needs_clarification: bool,
    pub needs_retrieval: bool,
    pub source: RoutingSource,
}

/// Snapshot of router counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterMetrics {
    pub total_routes: u64,
    pub fallback_invocations: u64,
    pub cache_hits: u64,
    pub estimated_cost_usd: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRouting {
    #[serde(alias = "primary_intent", alias = "intent")]
    primary_intent: String,
    #[serde(default, alias = "secondary_intent")]
    secondary_intent: Option<String>,
    depth: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Maps the primary/secondary intent pair and depth to a capability.
pub fn select_capability(primary: Intent, secondary: Option<Intent>, depth: Depth) -> &'static str {
    match (primary, secondary) {
        (Intent::Understand, Some(Intent::Create)) => EXPLAIN_AND_BUILD,
        _ => capability_for(primary, depth),
    }
}

/// Whether answering `query` warrants retrieval augmentation.
pub fn needs_retrieval(intent: Intent, depth: Depth, query: &str) -> bool {
    let knowledge_seeking = matches!(
        intent,
        Intent::Understand | Intent::Solve | Intent::Evaluate | Intent::Explore
    );
    let short_surface_question =
        depth == Depth::Surface && query.split_whitespace().count() < SHORT_QUERY_WORDS;
    knowledge_seeking && !short_surface_question
}

pub struct IntentRouter {
    completion: Arc<dyn CompletionService>,
    cache: Arc<dyn CacheStore<RoutingDecision>>,
    config: RouterConfig,
    timeout: Duration,
    temperature: f32,
    cache_ttl: Duration,
    total_routes: AtomicU64,
    fallback_invocations: AtomicU64,
    cache_hits: AtomicU64,
    classifier_calls: AtomicU64,
}

impl IntentRouter {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        cache: Arc<dyn CacheStore<RoutingDecision>>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            completion,
            cache,
            config: config.router.clone(),
            timeout: config.classifier.timeout(),
            temperature: config.classifier.temperature,
            cache_ttl: config.cache.ttl(),
            total_routes: AtomicU64::new(0),
            fallback_invocations: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            classifier_calls: AtomicU64::new(0),
        }
    }

    /// Router with its own bounded in-memory decision cache.
    pub fn with_memory_cache(
        completion: Arc<dyn CompletionService>,
        config: &DispatchConfig,
    ) -> Self {
        let cache: Arc<InMemoryCacheStore<RoutingDecision>> =
            Arc::new(InMemoryCacheStore::new(config.cache.max_entries));
        Self::new(completion, cache, config)
    }

    /// Routes `query`. Never fails; classifier problems fall back to keywords.
    pub async fn route(&self, query: &str, context: Option<&str>) -> RoutingDecision {
        self.total_routes.fetch_add(1, Ordering::Relaxed);
        let key = query.trim();

        if let Some(mut cached) = self.cache.get(key) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(capability = %cached.suggested_capability, "Routing cache hit");
            cached.source = RoutingSource::Cache;
            return cached;
        }

        match self.classify(query, context).await {
            Ok(decision) => {
                self.classifier_calls.fetch_add(1, Ordering::Relaxed);
                self.cache.set(key, decision.clone(), self.cache_ttl);
                decision
            }
            Err(reason) => {
                self.fallback_invocations.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%reason, "Intent routing fell back to keyword matching");
                self.keyword_decision(query)
            }
        }
    }

    pub fn metrics(&self) -> RouterMetrics {
        let calls = self.classifier_calls.load(Ordering::Relaxed);
        RouterMetrics {
            total_routes: self.total_routes.load(Ordering::Relaxed),
            fallback_invocations: self.fallback_invocations.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            estimated_cost_usd: calls as f64 * self.config.estimated_cost_per_call,
        }
    }

    async fn classify(
        &self,
        query: &str,
        context: Option<&str>,
    ) -> Result<RoutingDecision, String> {
        let prompt = render_routing_prompt(query, context).map_err(|e| e.to_string())?;
        let request = CompletionRequest::new(INTENT_ROUTER_SYSTEM_PROMPT, prompt)
            .with_temperature(self.temperature)
            .with_timeout(self.timeout);

        let text = match tokio::time::timeout(self.timeout, self.completion.complete(request)).await
        {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout(self.timeout)),
        }
        .map_err(|e| e.to_string())?;

        let raw: RawRouting = parse_structured(&text)?;
        let primary = Intent::from_str(raw.primary_intent.trim())
            .map_err(|_| format!("unknown intent '{}'", raw.primary_intent))?;
        let depth = Depth::from_str(raw.depth.trim())
            .map_err(|_| format!("unknown depth '{}'", raw.depth))?;
        // An unrecognised secondary intent is dropped rather than failing the decision.
        let secondary = raw
            .secondary_intent
            .as_deref()
            .and_then(|s| Intent::from_str(s.trim()).ok())
            .filter(|s| *s != primary);
        let confidence = raw.confidence.map(normalize_unit_score).unwrap_or(0.0);
        let reasoning = raw
            .reasoning
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "classifier decision".to_string());

        Ok(self.decision(
            query,
            primary,
            secondary,
            depth,
            confidence,
            reasoning,
            RoutingSource::Classifier,
        ))
    }

    fn keyword_decision(&self, query: &str) -> RoutingDecision {
        let intents = lexicon::detect_intents(query);
        let primary = intents.first().copied().unwrap_or(Intent::Understand);
        let secondary = intents.get(1).copied();
        let depth = lexicon::detect_depth(query).unwrap_or(Depth::Surface);
        let reasoning = if intents.is_empty() {
            "no keyword matched; defaulting to understand".to_string()
        } else {
            format!("keyword match: {primary}")
        };
        self.decision(
            query,
            primary,
            secondary,
            depth,
            KEYWORD_FALLBACK_CONFIDENCE,
            reasoning,
            RoutingSource::KeywordFallback,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn decision(
        &self,
        query: &str,
        primary: Intent,
        secondary: Option<Intent>,
        depth: Depth,
        confidence: f64,
        reasoning: String,
        source: RoutingSource,
    ) -> RoutingDecision {
        RoutingDecision {
            primary_intent: primary,
            secondary_intent: secondary,
            depth,
            confidence,
            reasoning,
            suggested_capability: select_capability(primary, secondary, depth).to_string(),
            needs_clarification: confidence <= self.config.clarification_threshold,
            needs_retrieval: needs_retrieval(primary, depth, query),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline_completion::OfflineCompletion;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct FixedCompletion {
        reply: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionService for FixedCompletion {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn fixed(reply: &str) -> Arc<FixedCompletion> {
        Arc::new(FixedCompletion {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_first_turn_keyword_route_for_definition_question() {
        let router = IntentRouter::with_memory_cache(
            Arc::new(OfflineCompletion),
            &DispatchConfig::default(),
        );

        let decision = router.route("What is mitosis?", None).await;

        assert_eq!(decision.primary_intent, Intent::Understand);
        assert_eq!(decision.depth, Depth::Surface);
        assert_eq!(decision.suggested_capability, "quick_explainer");
        assert_eq!(decision.confidence, 0.5);
        assert!(decision.needs_clarification);
        assert!(!decision.needs_retrieval);
        assert_eq!(decision.source, RoutingSource::KeywordFallback);

        let metrics = router.metrics();
        assert_eq!(metrics.total_routes, 1);
        assert_eq!(metrics.fallback_invocations, 1);
        assert_eq!(metrics.estimated_cost_usd, 0.0);
    }

    #[tokio::test]
    async fn test_classifier_decision_is_cached() {
        let completion = fixed(
            r#"{"primaryIntent": "solve", "depth": "guided", "confidence": 0.92, "reasoning": "homework"}"#,
        );
        let router =
            IntentRouter::with_memory_cache(completion.clone(), &DispatchConfig::default());

        let first = router.route("How do I factor x^2 - 9?", None).await;
        let second = router.route("How do I factor x^2 - 9?", None).await;

        assert_eq!(first.suggested_capability, "step_by_step_solver");
        assert!(!first.needs_clarification);
        assert_eq!(first.source, RoutingSource::Classifier);
        assert_eq!(second.source, RoutingSource::Cache);
        assert_eq!(completion.calls.load(Ordering::SeqCst), 1);

        let metrics = router.metrics();
        assert_eq!(metrics.total_routes, 2);
        assert_eq!(metrics.cache_hits, 1);
        assert!((metrics.estimated_cost_usd - 0.0002).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_understand_plus_create_routes_to_combined_capability() {
        let completion = fixed(
            r#"{"primaryIntent": "understand", "secondaryIntent": "create", "depth": "deep", "confidence": 9, "reasoning": "both"}"#,
        );
        let router = IntentRouter::with_memory_cache(completion, &DispatchConfig::default());

        let decision = router
            .route("Explain recursion and then build me a parser", None)
            .await;

        assert_eq!(decision.suggested_capability, EXPLAIN_AND_BUILD);
        assert!((decision.confidence - 0.9).abs() < 1e-9);
        assert!(!decision.needs_clarification);
    }

    #[tokio::test]
    async fn test_malformed_classifier_output_falls_back() {
        let router = IntentRouter::with_memory_cache(
            fixed(r#"{"primaryIntent": "juggling", "depth": "surface"}"#),
            &DispatchConfig::default(),
        );

        let decision = router.route("write me a poem about autumn", None).await;

        assert_eq!(decision.source, RoutingSource::KeywordFallback);
        assert_eq!(decision.primary_intent, Intent::Create);
        assert_eq!(decision.suggested_capability, "brainstormer");
        assert_eq!(router.metrics().fallback_invocations, 1);
    }

    #[test]
    fn test_needs_retrieval() {
        assert!(!needs_retrieval(Intent::Understand, Depth::Surface, "What is mitosis?"));
        assert!(needs_retrieval(
            Intent::Understand,
            Depth::Surface,
            "What is the role of spindle fibers during mitosis?"
        ));
        assert!(needs_retrieval(Intent::Solve, Depth::Guided, "factor this"));
        assert!(!needs_retrieval(
            Intent::Regulate,
            Depth::Deep,
            "I feel stuck on everything lately and need help"
        ));
    }
}
