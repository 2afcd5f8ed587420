//! Next-capability prediction and pre-warming.
//!
//! Predictions are advisory: nothing in the dispatch path waits on them and
//! a wrong prediction only costs an unused warm-up.

use cade_core::cache::CacheStore;
use cade_core::capability::CapabilityRegistry;
use cade_core::config::{PredictorConfig, SessionConfig};
use cade_core::pattern::OrchestrationPattern;
use cade_core::state::ConversationState;
use cade_infrastructure::InMemoryCacheStore;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictorMetrics {
    /// Capabilities currently considered warm.
    pub cache_size: usize,
    pub sessions_tracked: usize,
    pub total_patterns_recorded: u64,
    /// Share of executed capabilities that had been warmed, in [0, 1].
    pub cache_hit_rate: f64,
}

/// Ranks capabilities by how often they appear in `patterns`.
///
/// Ties are broken by co-usage with `suggested` (how many patterns list both),
/// then by name. `suggested` is always part of the result: when the ranking
/// does not already contain it, the list is cut to `limit - 1` and it is
/// appended.
pub fn rank_predictions<'a>(
    patterns: impl IntoIterator<Item = &'a OrchestrationPattern>,
    suggested: &str,
    limit: usize,
) -> Vec<String> {
    let mut frequency: HashMap<&str, usize> = HashMap::new();
    let mut co_usage: HashMap<&str, usize> = HashMap::new();

    for pattern in patterns {
        let with_suggested = pattern.tools.iter().any(|t| t == suggested);
        for tool in &pattern.tools {
            *frequency.entry(tool.as_str()).or_default() += 1;
            if with_suggested && tool != suggested {
                *co_usage.entry(tool.as_str()).or_default() += 1;
            }
        }
    }

    let mut ranked: Vec<(&str, usize)> = frequency.into_iter().collect();
    ranked.sort_by(|(a_name, a_freq), (b_name, b_freq)| {
        b_freq
            .cmp(a_freq)
            .then_with(|| {
                let a_co = co_usage.get(a_name).copied().unwrap_or(0);
                let b_co = co_usage.get(b_name).copied().unwrap_or(0);
                b_co.cmp(&a_co)
            })
            .then_with(|| a_name.cmp(b_name))
    });

    let mut names: Vec<String> = ranked.into_iter().map(|(n, _)| n.to_string()).collect();
    if limit == 0 {
        return Vec::new();
    }
    if names.iter().take(limit).any(|n| n == suggested) {
        names.truncate(limit);
    } else {
        names.retain(|n| n != suggested);
        names.truncate(limit - 1);
        names.push(suggested.to_string());
    }
    names
}

struct SessionHistory {
    recent: VecDeque<OrchestrationPattern>,
    last_seen: Instant,
}

/// Tracks recent patterns per session and warms likely next capabilities.
///
/// History is kept for at most `sessions.max_sessions` sessions; recording a
/// new session drops histories idle past the TTL, then the stalest one.
pub struct ExecutionPredictor {
    registry: Arc<dyn CapabilityRegistry>,
    config: PredictorConfig,
    sessions: SessionConfig,
    warm_ttl: Duration,
    history: RwLock<HashMap<String, SessionHistory>>,
    warm: InMemoryCacheStore<bool>,
    patterns_recorded: AtomicU64,
    warm_hits: AtomicU64,
    warm_misses: AtomicU64,
}

impl ExecutionPredictor {
    pub fn new(
        registry: Arc<dyn CapabilityRegistry>,
        config: PredictorConfig,
        warm_ttl: Duration,
        max_warm_entries: usize,
    ) -> Self {
        Self {
            registry,
            config,
            sessions: SessionConfig::default(),
            warm_ttl,
            history: RwLock::new(HashMap::new()),
            warm: InMemoryCacheStore::new(max_warm_entries),
            patterns_recorded: AtomicU64::new(0),
            warm_hits: AtomicU64::new(0),
            warm_misses: AtomicU64::new(0),
        }
    }

    pub fn with_session_limits(mut self, sessions: SessionConfig) -> Self {
        self.sessions = sessions;
        self
    }

    /// Remembers a pattern for the session, keeping the most recent ones.
    pub async fn record_pattern(&self, session_id: &str, pattern: &OrchestrationPattern) {
        let mut history = self.history.write().await;
        let now = Instant::now();
        if !history.contains_key(session_id) {
            self.make_room(&mut history, now);
        }
        let entry = history
            .entry(session_id.to_string())
            .or_insert_with(|| SessionHistory {
                recent: VecDeque::new(),
                last_seen: now,
            });
        entry.last_seen = now;
        entry.recent.push_back(pattern.clone());
        while entry.recent.len() > self.config.history_cap {
            entry.recent.pop_front();
        }
        self.patterns_recorded.fetch_add(1, Ordering::Relaxed);
    }

    fn make_room(&self, history: &mut HashMap<String, SessionHistory>, now: Instant) {
        let idle_ttl = self.sessions.idle_ttl();
        history.retain(|_, h| now.duration_since(h.last_seen) <= idle_ttl);
        while history.len() >= self.sessions.max_sessions.max(1) {
            let stalest = history
                .iter()
                .min_by_key(|(_, h)| h.last_seen)
                .map(|(id, _)| id.clone());
            match stalest {
                Some(id) => {
                    history.remove(&id);
                }
                None => break,
            }
        }
    }

    /// Capabilities likely to be needed on the session's next turn.
    pub async fn predict_next(&self, session_id: &str, state: &ConversationState) -> Vec<String> {
        let suggested = state.suggested_capability();
        let limit = self.config.prediction_limit;
        let history = self.history.read().await;
        match history.get(session_id) {
            Some(h) => rank_predictions(h.recent.iter(), suggested, limit),
            None => rank_predictions(std::iter::empty(), suggested, limit),
        }
    }

    /// Warms `tools` in the background; capabilities already warm are skipped.
    pub fn pre_warm(self: &Arc<Self>, tools: Vec<String>) -> JoinHandle<()> {
        let predictor = Arc::clone(self);
        tokio::spawn(async move {
            for tool in tools {
                if predictor.warm.get(&tool).is_some() {
                    continue;
                }
                let Some(handle) = predictor.registry.get(&tool) else {
                    tracing::debug!(capability = %tool, "Skipping warm-up of unknown capability");
                    continue;
                };
                match handle.capability().warm_up().await {
                    Ok(()) => {
                        predictor.warm.set(&tool, true, predictor.warm_ttl);
                        tracing::debug!(capability = %tool, "Capability warmed");
                    }
                    Err(e) => {
                        tracing::debug!(capability = %tool, error = %e, "Warm-up failed");
                    }
                }
            }
        })
    }

    pub fn is_warm(&self, tool: &str) -> bool {
        self.warm.get(tool).is_some()
    }

    /// Counts whether an executed capability had been warmed.
    pub fn note_execution(&self, tool: &str) {
        if self.is_warm(tool) {
            self.warm_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.warm_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub async fn metrics(&self) -> PredictorMetrics {
        self.warm.purge_expired();
        let hits = self.warm_hits.load(Ordering::Relaxed);
        let misses = self.warm_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        PredictorMetrics {
            cache_size: self.warm.len(),
            sessions_tracked: self.history.read().await.len(),
            total_patterns_recorded: self.patterns_recorded.load(Ordering::Relaxed),
            cache_hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}
