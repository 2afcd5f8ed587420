//! Language-model facing components: completion clients, prompt rendering,
//! conversation state classification and first-turn intent routing.

pub mod intent_router;
pub mod offline_completion;
pub mod openai_completion_client;
pub mod prompts;
pub mod state_classifier;
pub mod structured;

pub use intent_router::{IntentRouter, RouterMetrics, RoutingDecision, RoutingSource};
pub use offline_completion::OfflineCompletion;
pub use openai_completion_client::OpenAiCompletionClient;
pub use state_classifier::{StateClassifier, StateSource, heuristic_state};
