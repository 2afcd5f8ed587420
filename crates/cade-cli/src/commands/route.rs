use super::setup::{completion_service, load_config};
use anyhow::{Context, Result};
use cade_interaction::IntentRouter;
use std::path::Path;

pub async fn run(explicit: Option<&Path>, query: &str, context: Option<&str>) -> Result<()> {
    let (_, config) = load_config(explicit)?;
    let router = IntentRouter::with_memory_cache(completion_service(&config), &config);

    let decision = router.route(query, context).await;
    let rendered = serde_json::to_string_pretty(&decision).context("Failed to render decision")?;
    println!("{rendered}");
    Ok(())
}
