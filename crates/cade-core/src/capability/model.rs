//! Capability contract.
//!
//! A capability is a pluggable handler that produces a response for a given
//! input. Its internals are out of scope; the dispatch engine only talks to
//! it through this trait.

use crate::state::ConversationState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("{0}")]
    Failed(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("capability unavailable: {0}")]
    Unavailable(String),
}

impl CapabilityError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Input handed to a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityInput {
    pub query: String,
    pub session_id: String,
    #[serde(default)]
    pub state: Option<ConversationState>,
    #[serde(default)]
    pub context: HashMap<String, Value>,
}

impl CapabilityInput {
    pub fn new(query: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: session_id.into(),
            state: None,
            context: HashMap::new(),
        }
    }

    pub fn with_state(mut self, state: ConversationState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_context(mut self, context: HashMap<String, Value>) -> Self {
        self.context = context;
        self
    }

    /// Copy of this input with a different query.
    pub fn with_query(&self, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..self.clone()
        }
    }
}

/// A pluggable response handler.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Produces a response payload for `input`.
    async fn execute(&self, input: CapabilityInput) -> Result<Value, CapabilityError>;

    /// Optional preparation ahead of a predicted call.
    ///
    /// Must be side-effect free with respect to correctness; the default does nothing.
    async fn warm_up(&self) -> Result<(), CapabilityError> {
        Ok(())
    }
}

/// A capability resolved by name at registration time.
#[derive(Clone)]
pub struct CapabilityHandle {
    name: Arc<str>,
    capability: Arc<dyn Capability>,
}

impl CapabilityHandle {
    pub fn new(name: impl Into<Arc<str>>, capability: Arc<dyn Capability>) -> Self {
        Self {
            name: name.into(),
            capability,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capability(&self) -> &Arc<dyn Capability> {
        &self.capability
    }
}

impl std::fmt::Debug for CapabilityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Lookup of capabilities by name.
pub trait CapabilityRegistry: Send + Sync {
    /// Resolves a name; `None` if nothing is registered under it.
    fn get(&self, name: &str) -> Option<CapabilityHandle>;

    /// All registered names, sorted.
    fn names(&self) -> Vec<String>;
}
