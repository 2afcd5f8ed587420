//! Application layer for CADE.
//!
//! Wires the interaction, execution and infrastructure crates into the
//! per-turn dispatch path exposed by [`DispatchEngine`].

pub mod contextualizer;
pub mod dispatch_engine;
pub mod pattern_selector;
pub mod predictor;
pub mod query_optimizer;
pub mod session_cache;

pub use contextualizer::contextualize;
pub use dispatch_engine::{
    DispatchEngine, DispatchResponse, EngineMetrics, TurnRequest, aggregate_response,
};
pub use pattern_selector::{PatternSelector, SelectionRule};
pub use predictor::{ExecutionPredictor, PredictorMetrics, rank_predictions};
pub use query_optimizer::{QueryOptimization, QueryOptimizer, QueryRequest};
pub use session_cache::SessionContexts;
