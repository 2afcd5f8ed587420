//! Built-in template capabilities for the interactive session.
//!
//! They answer from fixed templates so the dispatch path can be exercised
//! end to end without any capability backend.

use async_trait::async_trait;
use cade_core::capability::catalog::all_capabilities;
use cade_core::capability::{Capability, CapabilityError, CapabilityInput};
use cade_execution::InMemoryCapabilityRegistry;
use serde_json::{Value, json};
use std::sync::Arc;

pub struct TemplateCapability {
    name: &'static str,
}

impl TemplateCapability {
    fn opening(&self) -> &'static str {
        match self.name {
            "quick_explainer" | "direct_answer" => "Here's the short version",
            "concept_explorer" | "deep_dive" => "Let's unpack this",
            "emotional_support" | "encouragement" => "That sounds hard, and it's okay to pause",
            "step_by_step_solver" | "practical_guide" => "Let's take it one step at a time",
            "brainstormer" | "writing_coach" | "explain_and_build" => "Let's build something",
            _ => "Working on it",
        }
    }
}

#[async_trait]
impl Capability for TemplateCapability {
    async fn execute(&self, input: CapabilityInput) -> Result<Value, CapabilityError> {
        let query = input.query.trim();
        if query.is_empty() {
            return Err(CapabilityError::InvalidInput("empty query".into()));
        }
        let retrieval = input
            .context
            .get("needsRetrieval")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let mut text = format!("{} ({}): {}", self.opening(), self.name, query);
        if retrieval {
            text.push_str("\n(would consult reference material)");
        }
        Ok(json!({ "text": text }))
    }
}

/// Registry with a template capability under every known name.
pub fn template_registry() -> InMemoryCapabilityRegistry {
    all_capabilities()
        .into_iter()
        .fold(InMemoryCapabilityRegistry::new(), |registry, name| {
            registry.with(name, Arc::new(TemplateCapability { name }))
        })
}
