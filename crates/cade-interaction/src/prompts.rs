//! Prompt templates for classifier and router completions.

use cade_core::session::ConversationWindow;
use cade_core::state::ConversationState;
use minijinja::{Environment, context};
use once_cell::sync::Lazy;

pub const STATE_CLASSIFIER_SYSTEM_PROMPT: &str = r#"You classify the state of a tutoring conversation.
Respond with a single JSON object and nothing else, shaped as:
{
  "sentiment": {"type": "positive|neutral|confused|frustrated|disengaged", "frustrationLevel": 0.0, "confidence": 0.0},
  "intent": {"current": "understand|create|solve|evaluate|organize|regulate|explore|interact", "changed": false, "changeReason": null},
  "depth": {"current": "surface|guided|deep", "requested": null, "changeIndicator": null},
  "tooling": {"currentToolAppropriate": true, "suggestedTool": null, "switchReason": null},
  "dynamics": {"progressionPattern": "exploring|deepening|surfacing|stuck", "topicContinuity": "same|related|new"}
}
frustrationLevel and confidence are numbers between 0 and 1.
Only set suggestedTool when the active capability clearly no longer fits."#;

pub const INTENT_ROUTER_SYSTEM_PROMPT: &str = r#"You route a learner's request to a learning intent and depth.
Respond with a single JSON object and nothing else, shaped as:
{"primaryIntent": "understand|create|solve|evaluate|organize|regulate|explore|interact",
 "secondaryIntent": null,
 "depth": "surface|guided|deep",
 "confidence": 0.0,
 "reasoning": "one short sentence"}
confidence is a number between 0 and 1. Set secondaryIntent only when the request clearly asks for two different things."#;

const STATE_CLASSIFIER_TEMPLATE: &str = r#"{% if summary %}Conversation summary:
{{ summary }}

{% endif %}{% if recent %}Recent messages:
{% for m in recent %}- {{ m.role }}: {{ m.content }}
{% endfor %}
{% endif %}Active capability: {{ capability or "none" }}
{% if previous %}Previous state:
{{ previous }}
{% endif %}
Latest user message:
{{ message }}"#;

const INTENT_ROUTER_TEMPLATE: &str = r#"{% if context %}Context:
{{ context }}

{% endif %}Request:
{{ query }}"#;

static TEMPLATES: Lazy<Environment<'static>> = Lazy::new(|| {
    let mut env = Environment::new();
    env.add_template("state_classifier", STATE_CLASSIFIER_TEMPLATE)
        .expect("state classifier template should parse");
    env.add_template("intent_router", INTENT_ROUTER_TEMPLATE)
        .expect("intent router template should parse");
    env
});

/// Renders the user prompt for conversation-state classification.
pub fn render_state_prompt(
    message: &str,
    window: &ConversationWindow,
    capability: Option<&str>,
    previous: Option<&ConversationState>,
) -> Result<String, minijinja::Error> {
    let previous = previous
        .map(serde_json::to_string)
        .transpose()
        .map_err(|err| {
            minijinja::Error::new(minijinja::ErrorKind::BadSerialization, err.to_string())
        })?;
    TEMPLATES.get_template("state_classifier")?.render(context! {
        message => message,
        summary => window.summary.as_deref(),
        recent => &window.recent,
        capability => capability,
        previous => previous,
    })
}

/// Renders the user prompt for first-turn routing.
pub fn render_routing_prompt(
    query: &str,
    context: Option<&str>,
) -> Result<String, minijinja::Error> {
    TEMPLATES.get_template("intent_router")?.render(context! {
        query => query,
        context => context,
    })
}
