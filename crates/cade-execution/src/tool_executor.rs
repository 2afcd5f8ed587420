//! Single-capability execution.
//!
//! `ToolExecutor` is the only place the engine calls into capability
//! handlers. Every call is measured, bounded by the turn budget, and
//! isolated: errors, timeouts, cancellation and panics all come back as a
//! failed `ToolExecutionResult`.

use cade_core::capability::{CapabilityInput, CapabilityRegistry};
use cade_core::pattern::ToolExecutionResult;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline and cancellation shared by every call made for one turn.
#[derive(Debug, Clone)]
pub struct ExecutionBudget {
    deadline: Instant,
    cancel: CancellationToken,
}

impl ExecutionBudget {
    pub fn new(timeout: Duration) -> Self {
        Self::with_token(timeout, CancellationToken::new())
    }

    pub fn with_token(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// True once the deadline has passed or the budget was cancelled.
    pub fn is_exhausted(&self) -> bool {
        self.cancel.is_cancelled() || self.remaining().is_zero()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

enum CallOutcome {
    Completed(Result<serde_json::Value, String>),
    TimedOut(Duration),
    Cancelled,
    Panicked(String),
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Executes one named capability.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<dyn CapabilityRegistry>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<dyn CapabilityRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<dyn CapabilityRegistry> {
        &self.registry
    }

    /// Runs `name` with `input`. Never fails outward.
    pub async fn execute(
        &self,
        name: &str,
        input: CapabilityInput,
        budget: &ExecutionBudget,
    ) -> ToolExecutionResult {
        let Some(handle) = self.registry.get(name) else {
            tracing::warn!(capability = %name, "Capability not found");
            return ToolExecutionResult::failed(name, format!("capability '{name}' not found"), 0);
        };

        if budget.token().is_cancelled() {
            return ToolExecutionResult::failed(name, "cancelled before start", 0);
        }
        let remaining = budget.remaining();
        if remaining.is_zero() {
            return ToolExecutionResult::failed(name, "turn deadline exceeded before start", 0);
        }

        let started = Instant::now();
        let call = AssertUnwindSafe(handle.capability().execute(input)).catch_unwind();

        let outcome = tokio::select! {
            biased;
            _ = budget.token().cancelled() => CallOutcome::Cancelled,
            result = tokio::time::timeout(remaining, call) => match result {
                Err(_) => CallOutcome::TimedOut(remaining),
                Ok(Err(panic)) => CallOutcome::Panicked(panic_message(panic)),
                Ok(Ok(output)) => CallOutcome::Completed(output.map_err(|e| e.to_string())),
            },
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            CallOutcome::Completed(Ok(value)) => {
                tracing::debug!(capability = %name, elapsed_ms, "Capability succeeded");
                ToolExecutionResult::succeeded(name, value, elapsed_ms)
            }
            CallOutcome::Completed(Err(error)) => {
                tracing::warn!(capability = %name, elapsed_ms, %error, "Capability failed");
                ToolExecutionResult::failed(name, error, elapsed_ms)
            }
            CallOutcome::TimedOut(limit) => {
                tracing::warn!(capability = %name, elapsed_ms, "Capability timed out");
                ToolExecutionResult::failed(
                    name,
                    format!("timed out after {}ms", limit.as_millis()),
                    elapsed_ms,
                )
            }
            CallOutcome::Cancelled => {
                tracing::warn!(capability = %name, elapsed_ms, "Capability call cancelled");
                ToolExecutionResult::failed(name, "cancelled", elapsed_ms)
            }
            CallOutcome::Panicked(message) => {
                tracing::error!(capability = %name, elapsed_ms, %message, "Capability panicked");
                ToolExecutionResult::failed(
                    name,
                    format!("capability panicked: {message}"),
                    elapsed_ms,
                )
            }
        }
    }
}
