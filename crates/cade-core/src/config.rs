//! Dispatch configuration model.
//!
//! Every section is defaulted, so an empty TOML document yields the stock
//! configuration. Loading from disk lives in `cade-infrastructure`.

use crate::error::{CadeError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct DispatchConfig {
    pub window: WindowConfig,
    pub cache: CacheConfig,
    pub classifier: ClassifierConfig,
    pub router: RouterConfig,
    pub execution: ExecutionConfig,
    pub predictor: PredictorConfig,
    pub sessions: SessionConfig,
    pub completion: CompletionConfig,
}

/// How much conversation history is shown to the classifier.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub recent_messages: usize,
    /// History length above which older user messages are condensed.
    pub summary_threshold: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            recent_messages: 6,
            summary_threshold: 10,
        }
    }
}

/// Shared by the response cache, the routing cache and the warm set.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 100,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    pub timeout_secs: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub temperature: f32,
    /// Frustration at or above which a distressed user is escalated to emotional support.
    pub emotional_support_threshold: f64,
    /// Turns at one depth after which a confused or frustrated user counts as stuck.
    pub stuck_turn_threshold: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 250,
            temperature: 0.0,
            emotional_support_threshold: 0.6,
            stuck_turn_threshold: 4,
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    /// Decisions at or below this confidence ask for clarification.
    pub clarification_threshold: f64,
    pub estimated_cost_per_call: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            clarification_threshold: 0.8,
            estimated_cost_per_call: 0.0002,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    pub turn_deadline_secs: u64,
    pub speed_budget_ms: u64,
    pub fallback_frustration_threshold: f64,
    pub max_fallback_tools: usize,
    pub chain_output_max_chars: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            turn_deadline_secs: 30,
            speed_budget_ms: 3000,
            fallback_frustration_threshold: 0.7,
            max_fallback_tools: 3,
            chain_output_max_chars: 500,
        }
    }
}

impl ExecutionConfig {
    pub fn turn_deadline(&self) -> Duration {
        Duration::from_secs(self.turn_deadline_secs)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PredictorConfig {
    pub history_cap: usize,
    pub prediction_limit: usize,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            history_cap: 10,
            prediction_limit: 3,
        }
    }
}

/// Bounds on per-session state held in memory.
///
/// Applies to session contexts and predictor history alike.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub max_sessions: usize,
    /// Sessions untouched for longer than this are dropped first.
    pub idle_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            idle_ttl_secs: 1800,
        }
    }
}

impl SessionConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }
}

/// Settings for the HTTP completion client.
///
/// Environment variables take precedence over these values at client construction.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CompletionConfig {
    /// `openai` or `offline`.
    pub provider: String,
    pub model: String,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
        }
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CadeError::config(format!("{name} must be within [0, 1], got {value}")))
    }
}

fn check_positive(name: &str, value: u64) -> Result<()> {
    if value > 0 {
        Ok(())
    } else {
        Err(CadeError::config(format!("{name} must be greater than zero")))
    }
}

impl DispatchConfig {
    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        check_positive("window.recent_messages", self.window.recent_messages as u64)?;
        check_positive("cache.ttl_secs", self.cache.ttl_secs)?;
        check_positive("cache.max_entries", self.cache.max_entries as u64)?;
        check_positive("classifier.timeout_secs", self.classifier.timeout_secs)?;
        check_unit(
            "classifier.emotional_support_threshold",
            self.classifier.emotional_support_threshold,
        )?;
        check_positive(
            "classifier.stuck_turn_threshold",
            self.classifier.stuck_turn_threshold as u64,
        )?;
        if !(0.0..=2.0).contains(&self.classifier.temperature) {
            return Err(CadeError::config(format!(
                "classifier.temperature must be within [0, 2], got {}",
                self.classifier.temperature
            )));
        }
        check_unit(
            "router.clarification_threshold",
            self.router.clarification_threshold,
        )?;
        if self.router.estimated_cost_per_call < 0.0 {
            return Err(CadeError::config(
                "router.estimated_cost_per_call must not be negative",
            ));
        }
        check_positive("execution.turn_deadline_secs", self.execution.turn_deadline_secs)?;
        check_positive("execution.speed_budget_ms", self.execution.speed_budget_ms)?;
        check_unit(
            "execution.fallback_frustration_threshold",
            self.execution.fallback_frustration_threshold,
        )?;
        check_positive(
            "execution.max_fallback_tools",
            self.execution.max_fallback_tools as u64,
        )?;
        check_positive("predictor.history_cap", self.predictor.history_cap as u64)?;
        check_positive(
            "predictor.prediction_limit",
            self.predictor.prediction_limit as u64,
        )?;
        check_positive("sessions.max_sessions", self.sessions.max_sessions as u64)?;
        check_positive("sessions.idle_ttl_secs", self.sessions.idle_ttl_secs)?;
        match self.completion.provider.as_str() {
            "openai" | "offline" => Ok(()),
            other => Err(CadeError::config(format!(
                "unknown completion.provider '{other}'"
            ))),
        }
    }
}
