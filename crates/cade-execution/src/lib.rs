//! Capability execution: the registry, the failure-isolated `ToolExecutor`,
//! the `PatternExecutor` strategies, and the dispatch event tracing layer.

pub mod pattern_executor;
pub mod registry;
pub mod tool_executor;
pub mod tracing_layer;

pub use pattern_executor::{PatternExecutor, effectiveness, speed_score};
pub use registry::InMemoryCapabilityRegistry;
pub use tool_executor::{ExecutionBudget, ToolExecutor};
pub use tracing_layer::{DispatchEvent, DispatchEventLayer};
