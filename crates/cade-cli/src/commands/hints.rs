use super::setup::load_config;
use anyhow::{Context, Result};
use cade_application::{QueryOptimizer, QueryRequest};
use cade_infrastructure::InMemoryCacheStore;
use std::path::Path;
use std::sync::Arc;

pub fn run(
    explicit: Option<&Path>,
    message: String,
    context: Vec<String>,
    capability: Option<String>,
) -> Result<()> {
    let (_, config) = load_config(explicit)?;
    let cache: Arc<InMemoryCacheStore<String>> =
        Arc::new(InMemoryCacheStore::new(config.cache.max_entries));
    let optimizer = QueryOptimizer::new(cache, config.cache.ttl());

    let request = QueryRequest::new(message)
        .with_recent_turns(context)
        .with_requested_capability(capability);
    let hints = optimizer.analyze(&request);
    let rendered = serde_json::to_string_pretty(&hints).context("Failed to render hints")?;
    println!("{rendered}");
    Ok(())
}
