//! Orchestration pattern domain module.
//!
//! - `model`: `PatternType`, `OrchestrationPattern`, `ToolExecutionResult`,
//!   `PatternExecution`

mod model;

pub use model::{
    OrchestrationPattern, PatternExecution, PatternType, RECOVERY_MESSAGE, SYSTEM_FALLBACK_TOOL,
    ToolExecutionResult, payload_text,
};
